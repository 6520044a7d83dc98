// SPDX-License-Identifier: Apache-2.0

//! Relay of record arguments containing pointers.
//!
//! Some syscalls take a single pointer to a record which itself holds guest pointers. Such a
//! record is copied out of the cage into scratch memory, its pointer fields are translated in
//! the copy and the runtime is handed the scratch copy. The record in guest memory is never
//! modified.

use super::call::syscall::CloneRecord;
use super::call::types::{Exited, Fork};
use super::{Dispatch, Trampoline};
use crate::cage::{AddressSpace, CageId, Extent, GuestAddr, PAGE_SIZE};
use crate::syscall::Field;
use crate::Result;

use core::mem::size_of;

use libc::{c_int, size_t, E2BIG, EINVAL};

/// Largest record that is relayed.
pub const MAX_RECORD: u64 = PAGE_SIZE;

/// [`CloneArgs::flags`] bit creating a thread sharing the caller's cage.
pub const CLONE_VM: u64 = 0x100;

/// Arguments of a cage creation, laid out like the kernel's `struct clone_args`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct CloneArgs {
    pub flags: u64,
    pub pidfd: u64,
    pub child_tid: u64,
    pub parent_tid: u64,
    pub exit_signal: u64,
    pub stack: u64,
    pub stack_size: u64,
    pub tls: u64,
    pub set_tid: u64,
    pub set_tid_size: u64,
    pub cgroup: u64,
}

impl CloneArgs {
    /// Size of the record, as passed along with it.
    pub const SIZE: u64 = size_of::<Self>() as u64;

    /// Reads a record from a relayed copy.
    ///
    /// Fields beyond `bytes` are zero, so shorter records of older layouts are accepted.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut raw = [0u64; 11];
        for (word, chunk) in raw.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *word = u64::from_ne_bytes(buf);
        }
        Self {
            flags: raw[0],
            pidfd: raw[1],
            child_tid: raw[2],
            parent_tid: raw[3],
            exit_signal: raw[4],
            stack: raw[5],
            stack_size: raw[6],
            tls: raw[7],
            set_tid: raw[8],
            set_tid_size: raw[9],
            cgroup: raw[10],
        }
    }
}

/// Pointers embedded in [`CloneArgs`]: the child's thread id cell.
pub const CLONE_FIELDS: &[Field] = &[Field {
    offset: 16,
    extent: Extent::Bytes(4),
    nullable: true,
}];

/// Host-side copy of a record with its pointers translated.
///
/// The storage is 8-byte aligned. The copy is call-scoped: it is dropped once the call it was
/// relayed for returns.
pub struct Scratch {
    buf: Box<[u64]>,
    len: usize,
}

impl Scratch {
    fn new(len: usize) -> Self {
        Self {
            buf: vec![0u64; (len + 7) / 8].into_boxed_slice(),
            len,
        }
    }

    /// Host address of the copy.
    #[inline]
    pub fn host_addr(&self) -> u64 {
        self.buf.as_ptr() as u64
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.buf.as_ptr() as *const u8, self.len) }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.buf.as_mut_ptr() as *mut u8, self.len) }
    }
}

/// Copies the `len`-byte record at `record` and translates its pointer `fields`.
pub fn relay(mem: &AddressSpace, record: GuestAddr, len: u64, fields: &[Field]) -> Result<Scratch> {
    if record.is_null() {
        return Err(EINVAL);
    }
    if len > MAX_RECORD {
        return Err(E2BIG);
    }

    let mut scratch = Scratch::new(len as usize);
    mem.read(record, scratch.as_bytes_mut())?;

    for field in fields {
        let end = field
            .offset
            .checked_add(8)
            .filter(|end| *end <= scratch.len())
            .ok_or(EINVAL)?;
        let bytes = &mut scratch.as_bytes_mut()[field.offset..end];

        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        let addr = GuestAddr(u64::from_ne_bytes(raw));
        let host = if field.nullable {
            mem.translate_nullable(addr, field.extent)?
        } else {
            mem.translate(addr, field.extent)?
        };
        bytes.copy_from_slice(&host.to_ne_bytes());
    }

    Ok(scratch)
}

/// Outcome of [`Trampoline::spawn`] in the context that observes it.
pub enum Spawned<'a, D: ?Sized> {
    /// The creating context continues with its trampoline, the new id and, if the dispatcher
    /// ran it, the exit of the new context.
    Parent(Trampoline<'a, D>, CageId, Option<Exited>),

    /// The new context ran its entry function and exited.
    Child(Exited),
}

impl<'a, D: Dispatch + ?Sized> Trampoline<'a, D> {
    /// Creates a cage or thread from the [`CloneArgs`] record of `size` bytes at `args`.
    #[inline]
    pub fn clone_args(&self, args: GuestAddr, size: size_t) -> Result<Fork> {
        self.execute(CloneRecord { args, size })
    }

    fn read_clone_args(&self, args: GuestAddr, size: size_t) -> Result<CloneArgs> {
        let mut bytes = vec![0u8; (size as u64).min(CloneArgs::SIZE) as usize];
        self.memory().read(args, &mut bytes)?;
        Ok(CloneArgs::from_bytes(&bytes))
    }
}

impl<'a, D: Dispatch> Trampoline<'a, D> {
    /// Like [`clone_args`](Self::clone_args), but runs `entry` in the new context and exits it
    /// with the returned status.
    ///
    /// A new cage runs `entry` in the context the dispatcher hands out through
    /// [`Dispatch::run_child`]. When the clone instead returns zero here, this context is the
    /// child: a thread keeps the cage id, a cage takes its id from the `child_tid` cell of the
    /// record.
    pub fn spawn(
        self,
        args: GuestAddr,
        size: size_t,
        entry: impl FnOnce(&Trampoline<'_, D>) -> c_int,
    ) -> Result<Spawned<'a, D>> {
        let record = self.read_clone_args(args, size)?;

        match self.clone_args(args, size)? {
            Fork::Parent(tid) if record.flags & CLONE_VM != 0 => {
                Ok(Spawned::Parent(self, tid, None))
            }
            Fork::Parent(child) => {
                let exited = self.host().run_child(child, entry)?;
                Ok(Spawned::Parent(self, child, exited))
            }
            Fork::Child => {
                let id = if record.flags & CLONE_VM != 0 {
                    self.cage()
                } else {
                    let cell = GuestAddr(record.child_tid);
                    if cell.is_null() {
                        return Err(EINVAL);
                    }
                    let mut tid = [0u8; 4];
                    self.memory().read(cell, &mut tid)?;
                    CageId::new(u32::from_ne_bytes(tid).into()).ok_or(EINVAL)?
                };

                let child = Trampoline::new(id, self.memory(), self.host());
                let status = entry(&child);
                child.exit(status).map(Spawned::Child)
            }
        }
    }
}
