// SPDX-License-Identifier: Apache-2.0

//! Shared `cageport` item definitions.
//!
//! These are the three fixed-shape calls a cage can make to the runtime.

pub mod copy;
pub mod register;
pub mod syscall;

pub use copy::{CopyType, Payload as Copy};
pub use register::{Payload as Register, DEREGISTER};
pub use syscall::{Abi, Errno, Payload as Syscall};
