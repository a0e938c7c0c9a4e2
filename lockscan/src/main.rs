//! # lockscan - Main Entry Point
//!
//! Scans the kernel's NFSv4 lockfile hash table once and prints two lines:
//! the number of lockfiles and the number of lost ones. Any failure prints a
//! single `error:` line to stderr and exits non-zero with nothing on stdout.

use anyhow::Result;
use clap::Parser;

use lockscan::cli::Args;
use lockscan::config::ScanConfig;
use lockscan::scan;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            EXIT_ERROR
        }
    });
}

fn run() -> Result<()> {
    let config = ScanConfig::from(Args::parse());
    let result = scan::run(&config)?;
    println!("{result}");
    Ok(())
}
