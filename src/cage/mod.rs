// SPDX-License-Identifier: Apache-2.0

//! Cages and their state

mod fd;
mod memory;

pub use fd::{Fd, FdTable, MAX_FDS};
pub use memory::{AddressSpace, Extent, GuestAddr, Prot, PAGE_SIZE};

use core::fmt;
use core::num::NonZeroU64;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Identifier of a live cage.
///
/// Zero is reserved and cannot be represented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CageId(NonZeroU64);

impl CageId {
    #[inline]
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Decodes an identifier received over the boundary.
    ///
    /// # Panics
    ///
    /// Observing cage id zero means the runtime or the guest library is misconfigured, which is
    /// fatal.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        match Self::new(raw) {
            Some(id) => id,
            None => panic!("cage id 0 is reserved: runtime misconfigured"),
        }
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for CageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Privilege of a cage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// An ordinary cage.
    Cage,

    /// A cage which may interpose on the syscalls of other cages.
    Grate,
}

/// User and group identity of a cage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
    pub euid: u32,
    pub egid: u32,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            uid: 1000,
            gid: 1000,
            euid: 1000,
            egid: 1000,
        }
    }
}

/// An isolated unit of execution with its own linear memory.
#[derive(Debug)]
pub struct Cage {
    id: CageId,
    parent: Option<CageId>,
    kind: Kind,
    creds: Credentials,
    exiting: AtomicBool,
    next_tid: AtomicU64,
    memory: RwLock<AddressSpace>,
    fds: Mutex<FdTable>,
}

impl Cage {
    pub fn new(
        id: CageId,
        parent: Option<CageId>,
        kind: Kind,
        creds: Credentials,
        memory: AddressSpace,
        fds: FdTable,
    ) -> Self {
        Self {
            id,
            parent,
            kind,
            creds,
            exiting: AtomicBool::new(false),
            next_tid: AtomicU64::new(1),
            memory: RwLock::new(memory),
            fds: Mutex::new(fds),
        }
    }

    #[inline]
    pub fn id(&self) -> CageId {
        self.id
    }

    #[inline]
    pub fn parent(&self) -> Option<CageId> {
        self.parent
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[inline]
    pub fn is_grate(&self) -> bool {
        self.kind == Kind::Grate
    }

    #[inline]
    pub fn credentials(&self) -> Credentials {
        self.creds
    }

    /// Shared access to the linear memory.
    ///
    /// Recursive, so a call in flight may take it again while a remap is queued.
    pub fn memory(&self) -> RwLockReadGuard<'_, AddressSpace> {
        self.memory.read_recursive()
    }

    /// Exclusive access to the linear memory, waiting for calls in flight to finish.
    pub fn memory_mut(&self) -> RwLockWriteGuard<'_, AddressSpace> {
        self.memory.write()
    }

    pub fn fds(&self) -> MutexGuard<'_, FdTable> {
        self.fds.lock()
    }

    #[inline]
    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    /// Marks the cage as exiting; returns `false` if it already was.
    pub(crate) fn begin_exit(&self) -> bool {
        !self.exiting.swap(true, Ordering::AcqRel)
    }

    /// A new image of this cage with `memory` and `fds`, keeping its identity and thread ids.
    pub(crate) fn exec(&self, memory: AddressSpace, fds: FdTable) -> Self {
        let image = Self::new(self.id, self.parent, self.kind, self.creds, memory, fds);
        image
            .next_tid
            .store(self.next_tid.load(Ordering::Relaxed), Ordering::Relaxed);
        image
    }

    /// Allocates a thread id for a thread sharing this cage's memory.
    pub(crate) fn next_tid(&self) -> u64 {
        self.next_tid.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cage_id() {
        assert_eq!(CageId::new(0), None);
        assert_eq!(CageId::new(7).map(CageId::get), Some(7));
        assert_eq!(CageId::from_raw(3).to_string(), "3");
    }

    #[test]
    #[should_panic(expected = "cage id 0 is reserved")]
    fn cage_id_zero_is_fatal() {
        CageId::from_raw(0);
    }

    #[test]
    fn exit_once() {
        let cage = Cage::new(
            CageId::from_raw(1),
            None,
            Kind::Cage,
            Credentials::default(),
            AddressSpace::new(0x1000).unwrap(),
            FdTable::stdio(),
        );
        assert!(!cage.is_exiting());
        assert!(cage.begin_exit());
        assert!(!cage.begin_exit());
        assert!(cage.is_exiting());
        assert_eq!(cage.next_tid(), 2);
        assert_eq!(cage.next_tid(), 3);
    }

    #[test]
    fn exec_image() {
        let cage = Cage::new(
            CageId::from_raw(4),
            Some(CageId::from_raw(1)),
            Kind::Grate,
            Credentials::default(),
            AddressSpace::new(0x1000).unwrap(),
            FdTable::stdio(),
        );
        assert_eq!(cage.next_tid(), 2);

        let image = cage.exec(AddressSpace::new(0x2000).unwrap(), FdTable::default());
        assert_eq!(image.id(), cage.id());
        assert_eq!(image.parent(), cage.parent());
        assert!(image.is_grate());
        assert_eq!(image.memory().size(), 0x2000);
        assert_eq!(image.next_tid(), 3);
    }
}
