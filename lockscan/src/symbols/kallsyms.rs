//! kallsyms / `nm` text symbol tables

use super::SymbolTable;

/// Parse `<hex address> <type> <name> [module]` lines
///
/// Lines that do not fit the format are skipped. Addresses may carry an
/// optional `0x` prefix.
#[must_use]
pub fn parse(text: &str) -> SymbolTable {
    let mut table = SymbolTable::new();
    for line in text.lines() {
        if let Some((name, addr)) = parse_line(line) {
            table.insert(name, addr);
        }
    }
    table
}

fn parse_line(line: &str) -> Option<(&str, u64)> {
    let mut parts = line.split_whitespace();
    let addr = parts.next()?;
    let kind = parts.next()?;
    let name = parts.next()?;

    if kind.len() != 1 {
        return None;
    }
    let addr = addr.strip_prefix("0x").unwrap_or(addr);
    let addr = u64::from_str_radix(addr, 16).ok()?;
    Some((name, addr))
}
