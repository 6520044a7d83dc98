// SPDX-License-Identifier: Apache-2.0

//! API for the cage-runtime syscall boundary
//!
//! `cageport` is a protocol crate for proxying system calls from a sandboxed *cage* to the
//! trusted runtime which services them. A cage only ever sees its own linear memory; every
//! pointer it hands out is relative to that memory and must be translated before the runtime
//! may dereference it.
//!
//! # Mechanism of action
//!
//! Each libc-like entry point is a thin instance of one generic [trampoline](guest::Trampoline):
//!
//! 1. pointer arguments are translated from guest to host addresses through the cage's
//!    [address space](cage::AddressSpace),
//! 2. the call is encoded into a fixed-shape [call record](item::Syscall),
//! 3. the record is handed to the [dispatcher](guest::Dispatch) together with the calling
//!    cage's identifier,
//! 4. the result is mapped back onto the errno convention.
//!
//! Bulk data movement between cages and syscall interposition by privileged cages (*grates*)
//! use two further fixed-shape calls, [`Copy`](item::Copy) and [`Register`](item::Register).
//!
//! # Call record format
//!
//! A [`Syscall`](item::Syscall) record has the following contents:
//!
//! * `num`: `u32` - the syscall number
//! * `name`: `&str` - a diagnostic tag, never used for dispatch
//! * `arg0` .. `arg5`: `u64` - the arguments, widened with their C semantics
//! * `abi`: [`Abi`](item::Abi) - the calling-convention variant
//! * `errno`: [`Errno`](item::Errno) - whether negative results are errno values
//!
//! Unused argument slots MUST contain [`NOTUSED`]. Zero is a legitimate argument value.
//! All pointers MUST be host addresses by the time the record reaches the dispatcher.

#![deny(clippy::all)]
#![warn(rust_2018_idioms)]

pub mod cage;
pub mod config;
pub mod guest;
pub mod host;
pub mod item;
pub mod syscall;
pub mod util;

/// Error type used within this crate.
pub type Error = libc::c_int;

/// Result type returned by functionality exposed by this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Representation of an unused argument slot in a call record.
pub const NOTUSED: u64 = 0xdead_beef_dead_beef;

/// Representation of an unused cage identifier slot.
pub const UNUSED_ID: u64 = 0xcafe_babe_cafe_babe;

/// Largest magnitude of a negative result that is interpreted as an errno value.
pub const MAX_ERRNO: i64 = 255;

/// Longest string, including its terminator, that crosses the boundary.
pub const MAX_STRLEN: u64 = 4096;

/// The cageport version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
