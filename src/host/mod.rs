// SPDX-License-Identifier: Apache-2.0

//! Host-side runtime: the dispatcher behind the trampoline.
//!
//! The [`Runtime`] owns every cage, routes each call record either to a registered grate or to
//! its own handlers and finally to the embedder's [`Service`].

mod copy;
mod process;
mod registry;

pub use process::WNOHANG;
pub use registry::{Registration, Registry};

use crate::cage::{AddressSpace, Cage, CageId, Credentials, FdTable, Kind};
use crate::config::Config;
use crate::guest::{Dispatch, Exited, Trampoline};
use crate::item::{self, Abi};
use crate::syscall::{self, lookup};
use crate::{Result, NOTUSED};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use libc::{c_int, EAGAIN, EINVAL, ENOSYS, EPERM, ESRCH};
use log::{debug, error, trace, warn};
use parking_lot::{Condvar, Mutex, RwLock};

/// Services the syscalls the runtime does not handle itself.
pub trait Service: Send + Sync {
    /// Services `call` on behalf of `cage`, returning the raw result.
    ///
    /// Pointer arguments are host addresses inside the cage's memory.
    fn service(&self, rt: &Runtime, cage: &Cage, call: &item::Syscall) -> i64;

    /// Called once `child` was forked from `parent`.
    fn forked(&self, _parent: &Cage, _child: &Cage) {}

    /// Called once `cage` exited and was removed.
    fn exited(&self, _cage: &Cage) {}
}

/// A [`Service`] failing every call with `ENOSYS`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unsupported;

impl Service for Unsupported {
    fn service(&self, _rt: &Runtime, cage: &Cage, call: &item::Syscall) -> i64 {
        debug!("cage {}: unsupported syscall {}", cage.id(), call.name);
        -ENOSYS as i64
    }
}

/// Entry point of a grate, invoked for every call redirected to it.
pub trait Grate: Send + Sync {
    /// Services `call` of `cage` with the grate's `handler`.
    fn call(&self, rt: &Runtime, handler: u64, cage: CageId, call: &item::Syscall) -> i64;
}

impl<F> Grate for F
where
    F: Fn(&Runtime, u64, CageId, &item::Syscall) -> i64 + Send + Sync,
{
    fn call(&self, rt: &Runtime, handler: u64, cage: CageId, call: &item::Syscall) -> i64 {
        self(rt, handler, cage, call)
    }
}

#[inline]
fn ret(res: Result<i64>) -> i64 {
    match res {
        Ok(ret) => ret,
        Err(errno) => -(errno as i64),
    }
}

/// The cage runtime.
pub struct Runtime {
    config: Config,
    service: Box<dyn Service>,
    next_id: AtomicU64,
    cages: RwLock<HashMap<CageId, Arc<Cage>>>,
    grates: RwLock<HashMap<CageId, Arc<dyn Grate>>>,
    registry: Registry,
    waits: Mutex<Waits>,
    reaped: Condvar,
}

/// State of `waitpid`, guarded by one lock so that no wakeup is lost.
#[derive(Default)]
struct Waits {
    /// Exited children not reaped yet, by parent.
    zombies: HashMap<CageId, Vec<(CageId, c_int)>>,

    /// Cages with a pending interruption of their blocking calls.
    interrupted: HashSet<CageId>,
}

impl Runtime {
    pub fn new(config: Config, service: impl Service + 'static) -> Self {
        Self {
            config,
            service: Box::new(service),
            next_id: AtomicU64::new(1),
            cages: RwLock::default(),
            grates: RwLock::default(),
            registry: Registry::default(),
            waits: Mutex::default(),
            reaped: Condvar::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of cages currently known.
    pub fn cages(&self) -> usize {
        self.cages.read().len()
    }

    /// Creates a root cage with the configured memory size.
    pub fn spawn(&self) -> Result<CageId> {
        let memory = AddressSpace::new(self.config.memory_size)?;
        self.insert(None, Kind::Cage, Credentials::default(), memory, FdTable::stdio())
            .map(|cage| cage.id())
    }

    /// Creates a root grate whose redirected calls are serviced by `entry`.
    pub fn spawn_grate(&self, entry: impl Grate + 'static) -> Result<CageId> {
        let memory = AddressSpace::new(self.config.memory_size)?;
        let cage = self.insert(
            None,
            Kind::Grate,
            Credentials::default(),
            memory,
            FdTable::stdio(),
        )?;
        self.grates.write().insert(cage.id(), Arc::new(entry));
        Ok(cage.id())
    }

    pub(crate) fn insert(
        &self,
        parent: Option<CageId>,
        kind: Kind,
        creds: Credentials,
        memory: AddressSpace,
        fds: FdTable,
    ) -> Result<Arc<Cage>> {
        let mut cages = self.cages.write();
        if cages.len() as u64 >= self.config.max_cages {
            warn!("cage limit of {} reached", self.config.max_cages);
            return Err(EAGAIN);
        }

        let id = CageId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cage = Arc::new(Cage::new(id, parent, kind, creds, memory, fds));
        cages.insert(id, cage.clone());
        debug!("cage {} created ({:?})", id, kind);
        Ok(cage)
    }

    /// Looks up a cage, which may be exiting.
    pub fn cage(&self, id: CageId) -> Result<Arc<Cage>> {
        self.cages.read().get(&id).cloned().ok_or(ESRCH)
    }

    /// Looks up a cage which is not exiting.
    pub fn live(&self, id: CageId) -> Result<Arc<Cage>> {
        self.cage(id)
            .and_then(|cage| if cage.is_exiting() { Err(ESRCH) } else { Ok(cage) })
    }

    /// Runs `f` with a trampoline of cage `id`.
    ///
    /// The cage's memory stays mapped at the same place for the duration of `f`.
    pub fn enter<T>(&self, id: CageId, f: impl FnOnce(Trampoline<'_, Self>) -> T) -> Result<T> {
        let cage = self.live(id)?;
        let mem = cage.memory();
        Ok(f(Trampoline::new(id, &mem, self)))
    }

    /// Interrupts the blocking calls of cage `id`; they fail with `EINTR`.
    pub fn interrupt(&self, id: CageId) -> Result<()> {
        self.live(id)?;
        self.waits.lock().interrupted.insert(id);
        self.reaped.notify_all();
        Ok(())
    }

    /// Dispatches `call` issued by `caller` on behalf of `target`.
    ///
    /// A grate forwarding a redirected call passes itself as `caller`, so grates stack: the
    /// call is routed by the grate's own registrations.
    pub fn dispatch_as(&self, caller: CageId, target: CageId, call: &item::Syscall) -> i64 {
        let ret = ret(self.route(caller, target, call));
        trace!("cage {} -> {}: {} = {}", caller, target, call.name, ret);
        match call.abi {
            Abi::Legacy => ret as i32 as i64,
            Abi::Current | Abi::Raw => ret,
        }
    }

    fn route(&self, caller: CageId, target: CageId, call: &item::Syscall) -> Result<i64> {
        let cage = self.live(target)?;

        if self.config.strict_args {
            if let Some(sig) = lookup(call.num) {
                if call.argv[sig.argc()..].iter().any(|arg| *arg != NOTUSED) {
                    warn!("cage {}: {} with stray arguments", target, call.name);
                    return Err(EINVAL);
                }
            }
        }

        if let Some(reg) = self.registry.lookup(caller, call.num) {
            let grate = self.grates.read().get(&reg.grate).cloned();
            return match grate {
                Some(grate) => {
                    trace!("cage {}: {} -> grate {}", target, call.name, reg.grate);
                    Ok(grate.call(self, reg.handler, target, call))
                }
                None => {
                    error!("grate {} has no entry point for {}", reg.grate, call.name);
                    Err(ENOSYS)
                }
            };
        }

        self.handle(&cage, call)
    }

    fn handle(&self, cage: &Arc<Cage>, call: &item::Syscall) -> Result<i64> {
        let creds = cage.credentials();
        match call.num {
            syscall::SYS_GETPID => Ok(cage.id().get() as i64),
            syscall::SYS_GETPPID => Ok(cage.parent().map_or(0, CageId::get) as i64),
            syscall::SYS_GETUID => Ok(creds.uid.into()),
            syscall::SYS_GETEUID => Ok(creds.euid.into()),
            syscall::SYS_GETGID => Ok(creds.gid.into()),
            syscall::SYS_GETEGID => Ok(creds.egid.into()),
            syscall::SYS_FORK => self.fork(cage).map(|child| child.get() as i64),
            syscall::SYS_CLONE => self.clone_cage(cage, call),
            syscall::SYS_EXEC => self.exec(cage, call),
            syscall::SYS_EXIT => self.exit(cage, call),
            syscall::SYS_WAITPID => self.waitpid(cage, call),
            _ => Ok(self.service.service(self, cage, call)),
        }
    }

    /// Validates and applies a registration record.
    fn register_handler(&self, call: &item::Register) -> Result<()> {
        let grate = self.live(CageId::from_raw(call.grate))?;
        if !grate.is_grate() {
            warn!("cage {} is not a grate", grate.id());
            return Err(EPERM);
        }
        let num = u32::try_from(call.num).map_err(|_| EINVAL)?;
        let target = CageId::from_raw(call.target_cage);

        if call.is_deregister() {
            self.registry.unregister(target, num, grate.id());
            return Ok(());
        }

        let target = self.live(target)?;
        self.registry.register(&target, num, call.handler, &grate)?;
        Ok(())
    }
}

impl Dispatch for Runtime {
    fn dispatch(&self, cage: CageId, call: &item::Syscall) -> i64 {
        self.dispatch_as(cage, cage, call)
    }

    fn copy(&self, call: &item::Copy) -> i64 {
        ret(self.copy_data(call).map(|count| count as i64))
    }

    fn register(&self, call: &item::Register) -> i64 {
        ret(self.register_handler(call).map(|()| 0))
    }

    fn run_child<F>(&self, child: CageId, entry: F) -> Result<Option<Exited>>
    where
        F: FnOnce(&Trampoline<'_, Self>) -> c_int,
    {
        self.enter(child, |t| {
            let status = entry(&t);
            t.exit(status)
        })?
        .map(Some)
    }
}
