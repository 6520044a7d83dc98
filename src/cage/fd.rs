// SPDX-License-Identifier: Apache-2.0

//! Per-cage descriptor table

use crate::Result;

use std::collections::BTreeMap;

use libc::{c_int, EBADF, EINVAL, EMFILE};

/// Highest descriptor number plus one.
pub const MAX_FDS: c_int = 1024;

/// An open descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fd {
    /// Service-defined handle of the underlying object.
    pub handle: u64,

    /// Closed on exec.
    pub cloexec: bool,
}

impl Fd {
    pub fn new(handle: u64) -> Self {
        Self {
            handle,
            cloexec: false,
        }
    }
}

/// Descriptor table of a cage.
///
/// The runtime only maintains the table across fork and exec; services decide what the handles
/// refer to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FdTable {
    entries: BTreeMap<c_int, Fd>,
}

impl FdTable {
    /// A table with the standard streams open, each referring to the handle of the same number.
    pub fn stdio() -> Self {
        let mut table = Self::default();
        for fd in 0..3 {
            table.entries.insert(fd, Fd::new(fd as u64));
        }
        table
    }

    fn lowest_free(&self, from: c_int) -> Result<c_int> {
        (from..MAX_FDS)
            .find(|fd| !self.entries.contains_key(fd))
            .ok_or(EMFILE)
    }

    /// Installs `fd` at the lowest free descriptor number.
    pub fn insert(&mut self, fd: Fd) -> Result<c_int> {
        let num = self.lowest_free(0)?;
        self.entries.insert(num, fd);
        Ok(num)
    }

    pub fn get(&self, fd: c_int) -> Result<Fd> {
        self.entries.get(&fd).copied().ok_or(EBADF)
    }

    pub fn remove(&mut self, fd: c_int) -> Result<Fd> {
        self.entries.remove(&fd).ok_or(EBADF)
    }

    /// Duplicates `old` onto the lowest free number.
    pub fn dup(&mut self, old: c_int) -> Result<c_int> {
        let fd = Fd {
            cloexec: false,
            ..self.get(old)?
        };
        self.insert(fd)
    }

    /// Duplicates `old` onto `new`, replacing whatever `new` referred to.
    pub fn dup2(&mut self, old: c_int, new: c_int, cloexec: bool) -> Result<c_int> {
        if !(0..MAX_FDS).contains(&new) {
            return Err(EBADF);
        }
        let fd = self.get(old)?;
        if old == new {
            return if cloexec { Err(EINVAL) } else { Ok(new) };
        }
        self.entries.insert(new, Fd { cloexec, ..fd });
        Ok(new)
    }

    /// Drops every descriptor marked close-on-exec.
    pub fn exec(&mut self) {
        self.entries.retain(|_, fd| !fd.cloexec);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_free() {
        let mut table = FdTable::stdio();
        assert_eq!(table.insert(Fd::new(7)), Ok(3));
        assert_eq!(table.remove(1), Ok(Fd::new(1)));
        assert_eq!(table.insert(Fd::new(8)), Ok(1));
        assert_eq!(table.get(1), Ok(Fd::new(8)));
        assert_eq!(table.get(4), Err(EBADF));
    }

    #[test]
    fn dup2_replaces_and_exec_closes() {
        let mut table = FdTable::stdio();
        assert_eq!(table.dup2(0, 10, true), Ok(10));
        assert_eq!(table.dup2(1, 2, false), Ok(2));
        assert_eq!(table.get(2), Ok(Fd::new(1)));
        assert_eq!(table.dup2(1, 1, true), Err(EINVAL));
        assert_eq!(table.dup2(1, MAX_FDS, false), Err(EBADF));
        assert_eq!(table.dup(10), Ok(3));
        assert_eq!(table.get(3), Ok(Fd::new(0)));

        table.exec();
        assert_eq!(table.get(10), Err(EBADF));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn table_full() {
        let mut table = FdTable::default();
        for fd in 0..MAX_FDS {
            assert_eq!(table.insert(Fd::new(0)), Ok(fd));
        }
        assert_eq!(table.insert(Fd::new(0)), Err(EMFILE));
    }
}
