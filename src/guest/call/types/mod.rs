// SPDX-License-Identifier: Apache-2.0

//! Argument and return types of calls.

mod argv;
mod ret;

pub use argv::{Argv, Widen};
pub use ret::{Exited, Fork, FromRet};
