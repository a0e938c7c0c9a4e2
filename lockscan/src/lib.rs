//! # lockscan - NFSv4 Lost Lockfile Scanner
//!
//! lockscan reads kernel memory to count the NFSv4 server's lockfile
//! structures and find the ones that were lost. A lockfile that stays in the
//! server's lock hash table after every open, lock and delegation referring to
//! it has gone can never be freed. Thousands of them slow every lookup in the
//! table and, with it, the whole NFSv4 service.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │   Memory Image           │      │   Symbol Source          │
//! │ /dev/kmem, ELF core      │      │ kernel ELF, kallsyms     │
//! └────────────┬─────────────┘      └────────────┬─────────────┘
//!              │ bounded reads                   │ name -> address
//!              ▼                                 ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     lockscan (This Crate)                   │
//! │                                                             │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐     │
//! │  │   Walker     │──▶│   Decoder    │──▶│  Classifier  │     │
//! │  │ (buckets)    │   │ (layout)     │   │ (lost?)      │     │
//! │  └──────────────┘   └──────────────┘   └──────┬───────┘     │
//! │                                               ▼             │
//! │                                        ┌──────────────┐     │
//! │                                        │  Reporter    │     │
//! │                                        └──────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`image`]: Read-only kernel address spaces ([`image::MemoryImage`])
//!   - `kmem`: the live kernel through `/dev/kmem`
//!   - `elf_core`: ELF cores with virtual addresses, via the `object` crate
//!   - `sparse`: in-memory regions
//! - [`symbols`]: Symbol name resolution from kallsyms text or a kernel ELF
//! - [`decode`]: Decodes raw record bytes against the frozen layout in
//!   `lockscan-layout`
//! - [`walker`]: Single pass over the bucket array and hash chains, with
//!   cycle and runaway protection
//! - [`classify`]: The lost predicate
//! - [`report`]: Totals and the two-line summary
//! - [`scan`]: Drives one scan through its state machine
//! - [`config`], [`cli`]: Configuration with defaults for every option
//! - [`domain`]: Kernel addresses, errors, scan states
//!
//! ## Consistency
//!
//! The kernel keeps mutating the table while it is read and the scanner
//! cannot take the kernel's locks. Each field read is a snapshot; the whole
//! count is a best-effort diagnostic, not a transactional one. Anything that
//! looks torn (a cycle, a back link that does not match) fails the scan
//! rather than producing a number that might be wrong.
//!
//! ## Typical Usage
//!
//! ```bash
//! # Scan the running kernel (/dev/kmem, symbols from /boot/kernel/kernel)
//! sudo lockscan
//!
//! # Scan an ELF core whose program headers carry kernel virtual addresses
//! lockscan --image core.elf --symbols /usr/lib/debug/boot/kernel/kernel.debug
//! ```

pub mod classify;
pub mod cli;
pub mod config;
pub mod decode;
pub mod domain;
pub mod image;
pub mod preflight;
pub mod report;
pub mod scan;
pub mod symbols;
pub mod walker;
