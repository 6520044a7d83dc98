// SPDX-License-Identifier: Apache-2.0

//! Cage lifecycle: fork, clone, exec, exit and wait.

use super::Runtime;
use crate::cage::{AddressSpace, Cage, CageId, GuestAddr, Kind};
use crate::guest::relay::{CloneArgs, CLONE_VM, MAX_RECORD};
use crate::item;
use crate::Result;

use std::ffi::CStr;
use std::sync::Arc;

use libc::{c_char, c_int, E2BIG, ECHILD, EFAULT, EINTR, EINVAL, ESRCH};
use log::{debug, info, warn};

/// Return immediately from `waitpid` if no child has exited.
pub const WNOHANG: c_int = 1;

/// Encodes an exit status the way `waitpid` reports it.
fn wait_status(status: c_int) -> c_int {
    (status & 0xff) << 8
}

impl Runtime {
    /// Duplicates `parent`: memory, descriptors, credentials and redirected syscalls.
    pub(crate) fn fork(&self, parent: &Cage) -> Result<CageId> {
        let memory = parent.memory().try_clone()?;
        let fds = parent.fds().clone();
        let child = self.insert(
            Some(parent.id()),
            Kind::Cage,
            parent.credentials(),
            memory,
            fds,
        )?;

        let inherited = self.registry.inherit(parent.id(), child.id());
        self.service.forked(parent, &child);
        debug!(
            "cage {} forked {} ({} redirects inherited)",
            parent.id(),
            child.id(),
            inherited
        );
        Ok(child.id())
    }

    /// Creates a thread or a cage from a relayed [`CloneArgs`] record.
    pub(crate) fn clone_cage(&self, cage: &Cage, call: &item::Syscall) -> Result<i64> {
        let (record, size) = match (call.arg(0), call.arg(1)) {
            (Some(record), Some(size)) if record != 0 => (record, size),
            _ => return Err(EINVAL),
        };
        if size > MAX_RECORD {
            return Err(E2BIG);
        }

        // The record is a host copy made by the trampoline and outlives this call.
        let bytes = unsafe { core::slice::from_raw_parts(record as *const u8, size as usize) };
        let args = CloneArgs::from_bytes(bytes);

        let id = if args.flags & CLONE_VM != 0 {
            cage.next_tid()
        } else {
            self.fork(cage)?.get()
        };

        if args.child_tid != 0 {
            let mem = cage.memory();
            let addr = mem.untranslate(args.child_tid)?;
            mem.write(addr, &(id as u32).to_ne_bytes())?;
        }
        Ok(id as i64)
    }

    /// Replaces the image of `cage` with a fresh one.
    ///
    /// The cage keeps its identifier, parent, credentials, thread ids and redirected syscalls.
    /// Memory is replaced and close-on-exec descriptors are closed. Callers in flight keep the
    /// old image until they return.
    pub(crate) fn exec(&self, cage: &Cage, call: &item::Syscall) -> Result<i64> {
        let path = call.arg(0).filter(|path| *path != 0).ok_or(EFAULT)?;
        let path = unsafe { CStr::from_ptr(path as *const c_char) };

        let memory = AddressSpace::new(self.config.memory_size)?;
        let mut fds = cage.fds().clone();
        fds.exec();
        let image = Arc::new(cage.exec(memory, fds));

        let mut cages = self.cages.write();
        match cages.get_mut(&cage.id()) {
            Some(current) if core::ptr::eq(&**current, cage) && !cage.is_exiting() => {
                *current = image
            }
            _ => return Err(ESRCH),
        }
        drop(cages);

        info!("cage {} exec {}", cage.id(), path.to_string_lossy());
        Ok(0)
    }

    /// Terminates `cage`, dropping every redirect it owns or is subject to.
    pub(crate) fn exit(&self, cage: &Cage, call: &item::Syscall) -> Result<i64> {
        let status = call.arg(0).unwrap_or(0) as c_int;
        let dropped = self.retire(cage, status)?;
        info!(
            "cage {} exited with {} ({} redirects dropped)",
            cage.id(),
            status,
            dropped
        );
        Ok(0)
    }

    /// Forces cage `id` to exit, as after a fault the cage cannot handle itself.
    ///
    /// The cage is cleaned up as if it had called `exit` with `reason`: its redirects are
    /// dropped, it stops accepting calls and its parent may reap it. Calls already in flight
    /// finish against the old state.
    pub fn terminate(&self, id: CageId, reason: c_int) -> Result<()> {
        let cage = self.live(id)?;
        let dropped = self.retire(&cage, reason)?;
        warn!(
            "cage {} terminated with {} ({} redirects dropped)",
            id, reason, dropped
        );
        Ok(())
    }

    /// Removes `cage` and leaves `status` for its parent; returns the number of dropped
    /// redirects.
    fn retire(&self, cage: &Cage, status: c_int) -> Result<usize> {
        if !cage.begin_exit() {
            return Err(ESRCH);
        }

        let dropped = self.registry.remove_cage(cage.id());
        self.grates.write().remove(&cage.id());

        // Waiters see the child either in the table or as a zombie, never neither.
        let mut waits = self.waits.lock();
        self.cages.write().remove(&cage.id());
        let parent = cage.parent().filter(|parent| self.live(*parent).is_ok());
        waits.zombies.remove(&cage.id());
        waits.interrupted.remove(&cage.id());
        if let Some(parent) = parent {
            waits
                .zombies
                .entry(parent)
                .or_default()
                .push((cage.id(), status));
        }
        self.reaped.notify_all();
        drop(waits);

        self.service.exited(cage);
        Ok(dropped)
    }

    fn has_children(&self, parent: CageId, pid: i64) -> bool {
        self.cages.read().values().any(|cage| {
            cage.parent() == Some(parent) && (pid == -1 || cage.id().get() as i64 == pid)
        })
    }

    /// Reaps an exited child of `cage`, blocking unless [`WNOHANG`] is given.
    pub(crate) fn waitpid(&self, cage: &Cage, call: &item::Syscall) -> Result<i64> {
        let pid = call.arg(0).ok_or(EINVAL)? as i64 as i32 as i64;
        let status = call.arg(1).unwrap_or(0);
        let options = call.arg(2).unwrap_or(0) as c_int;
        if pid == 0 || pid < -1 {
            return Err(EINVAL);
        }

        let mut waits = self.waits.lock();
        loop {
            let reaped = waits.zombies.get_mut(&cage.id()).and_then(|exited| {
                let pos = exited
                    .iter()
                    .position(|(child, _)| pid == -1 || child.get() as i64 == pid)?;
                Some(exited.remove(pos))
            });

            if let Some((child, code)) = reaped {
                drop(waits);
                if status != 0 {
                    let mem = cage.memory();
                    let addr: GuestAddr = mem.untranslate(status)?;
                    mem.write(addr, &wait_status(code).to_ne_bytes())?;
                }
                return Ok(child.get() as i64);
            }

            if !self.has_children(cage.id(), pid) {
                return Err(ECHILD);
            }
            if options & WNOHANG != 0 {
                return Ok(0);
            }
            if waits.interrupted.remove(&cage.id()) {
                return Err(EINTR);
            }
            self.reaped.wait(&mut waits);
        }
    }
}
