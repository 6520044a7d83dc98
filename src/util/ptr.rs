// SPDX-License-Identifier: Apache-2.0

//! Utility functions for guest pointers

use core::mem::align_of;

/// Validates that the guest address `ptr` is aligned for `T` and non-null
///
/// Returns `Some(ptr)`, if so and `None` if not.
pub fn is_aligned_non_null<T>(ptr: u64) -> Option<u64> {
    if ptr == 0 || ptr % align_of::<T>() as u64 != 0 {
        return None;
    }
    Some(ptr)
}
