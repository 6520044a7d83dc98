// SPDX-License-Identifier: Apache-2.0

//! Typed calls and their argument and return types.

pub mod syscall;
pub mod types;
