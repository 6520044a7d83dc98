// SPDX-License-Identifier: Apache-2.0

//! Typed system calls.

mod passthrough;

pub use passthrough::*;
