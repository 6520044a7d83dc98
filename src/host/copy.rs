// SPDX-License-Identifier: Apache-2.0

use super::Runtime;
use crate::cage::{CageId, GuestAddr, Prot};
use crate::item::{self, CopyType};
use crate::{Result, UNUSED_ID};

use std::sync::Arc;

use libc::{EFAULT, EINVAL};
use log::debug;

fn overlaps(a: u64, b: u64, len: u64) -> bool {
    a < b.saturating_add(len) && b < a.saturating_add(len)
}

impl Runtime {
    /// Executes a cross-cage copy and returns the number of bytes copied.
    ///
    /// Both ranges are validated before anything is written, so a failed copy leaves the
    /// destination untouched.
    pub fn copy_data(&self, call: &item::Copy) -> Result<u64> {
        if call.len == 0 {
            return Ok(0);
        }

        self.live(CageId::from_raw(call.this_cage))?;
        if call.target_cage != UNUSED_ID {
            self.live(CageId::from_raw(call.target_cage))?;
        }
        let copy_type = CopyType::try_from(call.copy_type)?;
        if call.len > self.config.max_linear_memory {
            return Err(EFAULT);
        }

        let src_cage = self.live(CageId::from_raw(call.src_cage))?;
        let dst_cage = self.live(CageId::from_raw(call.dst_cage))?;
        let (src_mem, dst_mem) = (src_cage.memory(), dst_cage.memory());
        let (src, dst) = (GuestAddr(call.src_addr), GuestAddr(call.dst_addr));

        let count = match copy_type {
            CopyType::Memcpy | CopyType::Memmove => call.len,
            CopyType::Strncpy => {
                let avail = src_mem.size().checked_sub(src.0).ok_or(EFAULT)?;
                let limit = avail.min(call.len);
                let start = (src_mem.base() + src.0) as *const u8;
                match (0..limit).find(|i| unsafe { start.add(*i as usize).read_volatile() } == 0) {
                    Some(nul) => nul + 1,
                    None if limit == call.len => call.len,
                    None => return Err(EFAULT),
                }
            }
        };

        src_mem.check(src, count, Prot::READ)?;
        dst_mem.check(dst, count, Prot::WRITE)?;

        if Arc::ptr_eq(&src_cage, &dst_cage)
            && copy_type != CopyType::Memmove
            && overlaps(src.0, dst.0, count)
        {
            return Err(EINVAL);
        }

        let from = (src_mem.base() + src.0) as *const u8;
        let to = (dst_mem.base() + dst.0) as *mut u8;
        unsafe { core::ptr::copy(from, to, count as usize) };

        debug!(
            "copied {} bytes: cage {} {:#x} -> cage {} {:#x}",
            count,
            src_cage.id(),
            src,
            dst_cage.id(),
            dst
        );
        Ok(count)
    }
}
