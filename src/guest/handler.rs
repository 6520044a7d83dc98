// SPDX-License-Identifier: Apache-2.0

//! [`libc`]-like API of the [`Trampoline`].
//!
//! Every wrapper is a single [`execute`](Trampoline::execute) of a typed call.

use super::call::syscall;
use super::call::types::Fork;
use super::{restart, Dispatch, Trampoline};
use crate::cage::GuestAddr;
use crate::Result;

use libc::{c_int, c_uint, mode_t, off_t, pid_t, size_t};

impl<'a, D: Dispatch + ?Sized> Trampoline<'a, D> {
    /// Executes [`read`](https://man7.org/linux/man-pages/man2/read.2.html) syscall akin to [`libc::read`].
    #[inline]
    pub fn read(&self, fd: c_int, buf: GuestAddr, count: size_t) -> Result<size_t> {
        self.execute(syscall::Read { fd, buf, count })
    }

    /// Executes [`write`](https://man7.org/linux/man-pages/man2/write.2.html) syscall akin to [`libc::write`].
    #[inline]
    pub fn write(&self, fd: c_int, buf: GuestAddr, count: size_t) -> Result<size_t> {
        self.execute(syscall::Write { fd, buf, count })
    }

    #[inline]
    pub fn open(&self, path: GuestAddr, flags: c_int, mode: mode_t) -> Result<c_int> {
        self.execute(syscall::Open { path, flags, mode })
    }

    #[inline]
    pub fn creat(&self, path: GuestAddr, mode: mode_t) -> Result<c_int> {
        self.execute(syscall::Creat { path, mode })
    }

    #[inline]
    pub fn unlink(&self, path: GuestAddr) -> Result<()> {
        self.execute(syscall::Unlink { path })
    }

    /// Executes [`close`](https://man7.org/linux/man-pages/man2/close.2.html) syscall akin to [`libc::close`].
    #[inline]
    pub fn close(&self, fd: c_int) -> Result<()> {
        self.execute(syscall::Close { fd })
    }

    #[inline]
    pub fn dup(&self, oldfd: c_int) -> Result<c_int> {
        self.execute(syscall::Dup { oldfd })
    }

    #[inline]
    pub fn dup2(&self, oldfd: c_int, newfd: c_int) -> Result<c_int> {
        self.execute(syscall::Dup2 { oldfd, newfd })
    }

    #[inline]
    pub fn dup3(&self, oldfd: c_int, newfd: c_int, flags: c_int) -> Result<c_int> {
        self.execute(syscall::Dup3 {
            oldfd,
            newfd,
            flags,
        })
    }

    /// Executes [`mmap`](https://man7.org/linux/man-pages/man2/mmap.2.html) syscall akin to [`libc::mmap`].
    ///
    /// The mapping is returned as a guest address.
    pub fn mmap(
        &self,
        addr: GuestAddr,
        length: size_t,
        prot: c_int,
        flags: c_int,
        fd: c_int,
        offset: off_t,
    ) -> Result<GuestAddr> {
        self.execute(syscall::Mmap {
            addr,
            length,
            prot,
            flags,
            fd,
            offset,
        })
    }

    #[inline]
    pub fn munmap(&self, addr: GuestAddr, length: size_t) -> Result<()> {
        self.execute(syscall::Munmap { addr, length })
    }

    #[inline]
    pub fn getcwd(&self, buf: GuestAddr, size: size_t) -> Result<size_t> {
        self.execute(syscall::Getcwd { buf, size })
    }

    #[inline]
    pub fn getpid(&self) -> Result<pid_t> {
        self.execute(syscall::Getpid)
    }

    #[inline]
    pub fn getppid(&self) -> Result<pid_t> {
        self.execute(syscall::Getppid)
    }

    #[inline]
    pub fn getuid(&self) -> Result<u32> {
        self.execute(syscall::Getuid)
    }

    #[inline]
    pub fn geteuid(&self) -> Result<u32> {
        self.execute(syscall::Geteuid)
    }

    #[inline]
    pub fn getgid(&self) -> Result<u32> {
        self.execute(syscall::Getgid)
    }

    #[inline]
    pub fn getegid(&self) -> Result<u32> {
        self.execute(syscall::Getegid)
    }

    /// Duplicates the cage. See [`Fork`] for the two possible outcomes.
    #[inline]
    pub fn fork(&self) -> Result<Fork> {
        self.execute(syscall::Fork)
    }

    /// Replaces the cage's image with the program at `path`.
    #[inline]
    pub fn exec(&self, path: GuestAddr) -> Result<()> {
        self.execute(syscall::Exec { path })
    }

    /// Executes [`waitpid`](https://man7.org/linux/man-pages/man2/waitpid.2.html) akin to
    /// [`libc::waitpid`], restarting it when interrupted.
    pub fn waitpid(&self, pid: pid_t, status: GuestAddr, options: c_int) -> Result<pid_t> {
        restart(|| {
            self.execute(syscall::Waitpid {
                pid,
                status,
                options,
            })
        })
    }

    /// Executes [`futex`](https://man7.org/linux/man-pages/man2/futex.2.html).
    ///
    /// The result is raw: a negative value is the runtime's errno, not an error.
    pub fn futex(
        &self,
        uaddr: GuestAddr,
        op: c_int,
        val: c_uint,
        timeout: GuestAddr,
        uaddr2: GuestAddr,
        val3: c_uint,
    ) -> Result<i64> {
        self.execute(syscall::Futex {
            uaddr,
            op,
            val,
            timeout,
            uaddr2,
            val3,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::trampoline::tests::Recorder;
    use super::*;
    use crate::cage::{AddressSpace, CageId};
    use crate::syscall::table;

    use libc::{EINTR, ENOSYS};

    #[test]
    fn waitpid_restarts() {
        let mem = AddressSpace::new(0x1000).unwrap();
        let host = Recorder::default().answer(&[-(EINTR as i64), -(EINTR as i64), 9]);
        let tramp = Trampoline::new(CageId::from_raw(1), &mem, &host);

        assert_eq!(tramp.waitpid(-1, GuestAddr(0x100), 0), Ok(9));
        let calls = host.calls.lock();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, call)| call.num == table::WAITPID.num));
        assert_eq!(calls[0].1.argv[0], u64::MAX);
        assert_eq!(calls[0].1.argv[1], mem.base() + 0x100);
    }

    #[test]
    fn other_calls_are_not_restarted() {
        let mem = AddressSpace::new(0x1000).unwrap();
        let host = Recorder::default().answer(&[-(EINTR as i64), -(ENOSYS as i64)]);
        let tramp = Trampoline::new(CageId::from_raw(1), &mem, &host);

        assert_eq!(tramp.read(0, GuestAddr(0x10), 8), Err(EINTR));
        assert_eq!(tramp.getpid(), Err(ENOSYS));
        assert_eq!(host.calls.lock().len(), 2);
    }

    #[test]
    fn fork_outcomes() {
        let mem = AddressSpace::new(0x1000).unwrap();
        let host = Recorder::default().answer(&[4, 0]);
        let tramp = Trampoline::new(CageId::from_raw(1), &mem, &host);

        assert_eq!(tramp.fork(), Ok(Fork::Parent(CageId::from_raw(4))));
        assert_eq!(tramp.fork(), Ok(Fork::Child));
    }
}
