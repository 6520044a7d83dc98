// SPDX-License-Identifier: Apache-2.0

//! Guest entrypoint into the runtime.
//!
//! The main entrypoint into this module is a [`Trampoline`], which borrows the linear memory of
//! one cage for its lifetime and funnels every call through [`Dispatch`].
//!
//! [`Trampoline`] provides:
//! - API for execution of an arbitrary call described by a [`Signature`](crate::syscall::Signature):
//!     - [`syscall`](Trampoline::syscall)
//!     - [`execute`](Trampoline::execute) for typed [`Passthrough`](call::syscall::Passthrough) calls
//!
//! - [`libc`]-like API for syscall execution, for example:
//!     - [`write`](Trampoline::write) corresponding to [`libc::write`].
//!     - [`unlink`](Trampoline::unlink) corresponding to [`libc::unlink`].
//!     - [`exit`](Trampoline::exit) corresponding to [`libc::exit`].
//!
//! - the cross-cage calls [`copy`](Trampoline::copy) and [`register`](Trampoline::register).
//!
//! # Call lifetime phases
//!
//! ## Translate
//! Every pointer argument is checked against the cage's memory and replaced by its host address.
//! Records containing pointers are [relayed](relay) into scratch memory first. Failures are
//! reported before anything reaches the runtime.
//!
//! ## Dispatch
//! The encoded record is handed to [`Dispatch::dispatch`] along with the cage id. No state is
//! kept between calls; sibling threads of a cage may dispatch concurrently.
//!
//! ## Collect
//! The result is mapped through the call's [`Errno`](crate::item::Errno) handling and, for calls
//! returning pointers, expressed back in guest terms.

pub mod call;
mod handler;
pub mod relay;
mod trampoline;

pub use call::types::{Exited, Fork, FromRet};
pub use relay::Spawned;
pub use trampoline::Trampoline;

use crate::cage::CageId;
use crate::item;
use crate::Result;

use libc::{c_int, EINTR};

/// The three fixed call shapes through which a cage reaches the runtime.
///
/// Every method returns a non-negative value on success and a negative errno value on failure.
pub trait Dispatch {
    /// Services `call` on behalf of `cage`.
    fn dispatch(&self, cage: CageId, call: &item::Syscall) -> i64;

    /// Copies memory between cages.
    fn copy(&self, call: &item::Copy) -> i64;

    /// Installs or removes a handler registration.
    fn register(&self, call: &item::Register) -> i64;

    /// Runs `entry` in the context of `child`, a cage just cloned by the caller, and exits
    /// `child` with the status `entry` returns.
    ///
    /// Returns `None` if the dispatcher does not hand out child contexts. The clone then
    /// returns zero in a context it resumes inside the child.
    fn run_child<F>(&self, _child: CageId, _entry: F) -> Result<Option<Exited>>
    where
        Self: Sized,
        F: FnOnce(&Trampoline<'_, Self>) -> c_int,
    {
        Ok(None)
    }
}

/// Repeats `call` for as long as it is interrupted.
///
/// The trampoline never retries on its own; wrappers of calls that may block use this.
pub fn restart<T>(mut call: impl FnMut() -> Result<T>) -> Result<T> {
    loop {
        match call() {
            Err(EINTR) => continue,
            res => return res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use libc::EAGAIN;

    #[test]
    fn restart_on_eintr_only() {
        let mut results = vec![Ok(3), Err(EINTR), Err(EINTR)];
        assert_eq!(restart(|| results.pop().unwrap()), Ok(3));
        assert!(results.is_empty());

        let mut results = vec![Ok(3), Err(EAGAIN), Err(EINTR)];
        assert_eq!(restart(|| results.pop().unwrap()), Err(EAGAIN));
        assert_eq!(results, [Ok(3)]);
    }
}
