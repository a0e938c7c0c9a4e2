//! Kernel ELF binaries as a symbol source

use object::{Object, ObjectSymbol};

use super::SymbolTable;

/// Build a table from an ELF file's symbols
///
/// Uses the static symbol table when present, otherwise the dynamic one.
/// Undefined symbols are skipped.
///
/// # Errors
/// Returns the parse error if `data` is not an object file.
pub fn parse(data: &[u8]) -> object::Result<SymbolTable> {
    let obj = object::File::parse(data)?;

    let mut table = SymbolTable::new();
    let mut count = 0;
    for symbol in obj.symbols() {
        count += 1;
        add(&mut table, &symbol);
    }
    if count == 0 {
        for symbol in obj.dynamic_symbols() {
            add(&mut table, &symbol);
        }
    }
    Ok(table)
}

fn add<'data, S: ObjectSymbol<'data>>(table: &mut SymbolTable, symbol: &S) {
    if symbol.is_undefined() {
        return;
    }
    if let Ok(name) = symbol.name() {
        if !name.is_empty() {
            table.insert(name, symbol.address());
        }
    }
}
