// SPDX-License-Identifier: Apache-2.0

use super::call::syscall::{Exit, Passthrough};
use super::call::types::{Exited, FromRet};
use super::{relay, Dispatch};
use crate::cage::{AddressSpace, CageId, GuestAddr};
use crate::item::{self, CopyType, Errno, DEREGISTER};
use crate::syscall::{Signature, Slot};
use crate::{Result, NOTUSED, UNUSED_ID};

use libc::{c_int, EINVAL};
use log::trace;

/// The single path from a cage to the runtime.
///
/// A trampoline carries everything a call needs: the calling cage's id, a borrow of its memory
/// and the dispatcher. It holds no other state, so any number of trampolines of the same cage
/// may be used concurrently from sibling threads.
pub struct Trampoline<'a, D: ?Sized> {
    cage: CageId,
    mem: &'a AddressSpace,
    host: &'a D,
}

impl<'a, D: Dispatch + ?Sized> Trampoline<'a, D> {
    pub fn new(cage: CageId, mem: &'a AddressSpace, host: &'a D) -> Self {
        Self { cage, mem, host }
    }

    #[inline]
    pub fn cage(&self) -> CageId {
        self.cage
    }

    #[inline]
    pub fn memory(&self) -> &'a AddressSpace {
        self.mem
    }

    #[inline]
    pub(crate) fn host(&self) -> &'a D {
        self.host
    }

    /// Executes syscall `sig` with up to six raw guest arguments.
    pub fn syscall(&self, sig: &Signature, args: &[u64]) -> Result<i64> {
        if args.len() != sig.argc() {
            return Err(EINVAL);
        }
        let call = item::Syscall::encode(sig.num, sig.name, args, sig.abi)?;
        self.invoke(sig, call.argv)
    }

    /// Executes a typed syscall.
    pub fn execute<T: Passthrough>(&self, call: T) -> Result<T::Ret> {
        let ret = self.invoke(&T::SIG, call.stage().into())?;
        T::Ret::from_ret(ret, self.mem)
    }

    fn invoke(&self, sig: &Signature, mut argv: [u64; 6]) -> Result<i64> {
        // Relayed records must outlive the dispatch.
        let mut scratch = Vec::new();

        for (i, slot) in sig.slots.iter().enumerate() {
            let addr = GuestAddr(argv[i]);
            argv[i] = match *slot {
                Slot::Value => continue,
                Slot::Ptr(len) => self.mem.translate(addr, len.extent(&argv)?)?,
                Slot::OptPtr(len) => self.mem.translate_nullable(addr, len.extent(&argv)?)?,
                Slot::Word => self.mem.translate_aligned::<u32>(addr)?,
                Slot::Record { len, fields } => {
                    let len = argv.get(len).copied().filter(|len| *len != NOTUSED);
                    let record = relay::relay(self.mem, addr, len.ok_or(EINVAL)?, fields)?;
                    let host = record.host_addr();
                    scratch.push(record);
                    host
                }
            };
        }

        let call = item::Syscall::new(sig.num, sig.name, argv, sig.abi).with_errno(sig.errno);

        trace!("cage {}: {}", self.cage, call);
        let ret = self.host.dispatch(self.cage, &call);
        trace!("cage {}: {} = {}", self.cage, call.name, ret);

        drop(scratch);
        call.errno.collect(ret)
    }

    /// Copies `len` bytes from `src` in `src_cage` to `dst` in `dst_cage`.
    ///
    /// Returns the number of bytes copied.
    pub fn copy(
        &self,
        src_cage: CageId,
        src: GuestAddr,
        dst_cage: CageId,
        dst: GuestAddr,
        len: u64,
        copy_type: CopyType,
    ) -> Result<u64> {
        let call = item::Copy {
            this_cage: self.cage.get(),
            target_cage: UNUSED_ID,
            src_addr: src.0,
            src_cage: src_cage.get(),
            dst_addr: dst.0,
            dst_cage: dst_cage.get(),
            len,
            copy_type: copy_type as _,
        };
        Errno::Translate
            .collect(self.host.copy(&call))
            .map(|count| count as u64)
    }

    /// Redirects syscall `num` of `target` to `handler` of this cage, which must be a grate.
    pub fn register(&self, target: CageId, num: u32, handler: u64) -> Result<()> {
        if handler == DEREGISTER {
            return Err(EINVAL);
        }
        self.registration(target, num, handler)
    }

    /// Removes this cage's redirect of syscall `num` of `target`.
    pub fn deregister(&self, target: CageId, num: u32) -> Result<()> {
        self.registration(target, num, DEREGISTER)
    }

    fn registration(&self, target: CageId, num: u32, handler: u64) -> Result<()> {
        let call = item::Register {
            target_cage: target.get(),
            num: num.into(),
            handler,
            grate: self.cage.get(),
        };
        Errno::Translate
            .collect(self.host.register(&call))
            .map(|_| ())
    }

    /// Terminates the cage.
    ///
    /// Consumes the trampoline: nothing can be called from a context that exited.
    pub fn exit(self, status: c_int) -> Result<Exited> {
        self.execute(Exit { status })?;
        Ok(Exited { status })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::item::Abi;
    use crate::syscall::table;

    use parking_lot::Mutex;

    use libc::{EFAULT, EINTR, ENOENT};

    /// Records every call and answers with queued results.
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub calls: Mutex<Vec<(CageId, item::Syscall)>>,
        pub copies: Mutex<Vec<item::Copy>>,
        pub registrations: Mutex<Vec<item::Register>>,
        pub results: Mutex<Vec<i64>>,
    }

    impl Recorder {
        pub fn answer(self, results: &[i64]) -> Self {
            *self.results.lock() = results.iter().rev().copied().collect();
            self
        }

        pub fn last(&self) -> item::Syscall {
            self.calls.lock().last().unwrap().1
        }
    }

    impl Dispatch for Recorder {
        fn dispatch(&self, cage: CageId, call: &item::Syscall) -> i64 {
            self.calls.lock().push((cage, *call));
            self.results.lock().pop().unwrap_or(0)
        }

        fn copy(&self, call: &item::Copy) -> i64 {
            self.copies.lock().push(*call);
            call.len as i64
        }

        fn register(&self, call: &item::Register) -> i64 {
            self.registrations.lock().push(*call);
            0
        }
    }

    fn cage() -> CageId {
        CageId::from_raw(2)
    }

    #[test]
    fn creat_translates_path() {
        let mem = AddressSpace::new(0x10000).unwrap();
        mem.write(GuestAddr(0x40), b"/tmp/file\0").unwrap();
        let host = Recorder::default().answer(&[3]);
        let tramp = Trampoline::new(cage(), &mem, &host);

        assert_eq!(tramp.creat(GuestAddr(0x40), 0o644), Ok(3));

        let call = host.last();
        assert_eq!(call.num, table::CREAT.num);
        assert_eq!(call.argv[0], mem.base() + 0x40);
        assert_eq!(call.argv[1], 0o644);
        assert_eq!(call.argv[2..], [NOTUSED; 4]);
        assert_eq!(host.calls.lock()[0].0, cage());
    }

    #[test]
    fn translation_errors_never_dispatch() {
        let mem = AddressSpace::new(0x1000).unwrap();
        let host = Recorder::default();
        let tramp = Trampoline::new(cage(), &mem, &host);

        assert_eq!(tramp.unlink(GuestAddr::NULL), Err(EINVAL));
        assert_eq!(tramp.write(1, GuestAddr(0xff0), 0x20), Err(EFAULT));
        assert_eq!(
            tramp.futex(GuestAddr(0x42), 0, 0, GuestAddr::NULL, GuestAddr::NULL, 0),
            Err(EINVAL)
        );
        assert!(host.calls.lock().is_empty());
    }

    #[test]
    fn errno_mapping() {
        let mem = AddressSpace::new(0x1000).unwrap();
        let host = Recorder::default().answer(&[-(ENOENT as i64), -(EINTR as i64), -11]);
        let tramp = Trampoline::new(cage(), &mem, &host);
        mem.write(GuestAddr(0x10), b"x\0").unwrap();

        assert_eq!(tramp.unlink(GuestAddr(0x10)), Err(ENOENT));
        assert_eq!(tramp.close(4), Err(EINTR));

        // futex results are raw
        assert_eq!(
            tramp.futex(GuestAddr(0x20), 0, 1, GuestAddr::NULL, GuestAddr::NULL, 0),
            Ok(-11)
        );
        let call = host.last();
        assert_eq!(call.abi, Abi::Raw);
        assert_eq!(call.argv[0], mem.base() + 0x20);
        assert_eq!(call.argv[3], 0);
    }

    #[test]
    fn generic_syscall() {
        let mem = AddressSpace::new(0x1000).unwrap();
        let host = Recorder::default().answer(&[5]);
        let tramp = Trampoline::new(cage(), &mem, &host);

        assert_eq!(tramp.syscall(&table::WRITE, &[1, 0x100, 5]), Ok(5));
        assert_eq!(host.last().argv[..3], [1, mem.base() + 0x100, 5]);
        assert_eq!(host.last().abi, Abi::Legacy);

        assert_eq!(tramp.syscall(&table::WRITE, &[1, 0x100]), Err(EINVAL));
    }

    #[test]
    fn legacy_call_with_raw_results() {
        const WRITE_RAW: Signature = table::WRITE.with_errno(Errno::Raw);

        let mem = AddressSpace::new(0x1000).unwrap();
        let host = Recorder::default().answer(&[-(ENOENT as i64), -(ENOENT as i64)]);
        let tramp = Trampoline::new(cage(), &mem, &host);

        assert_eq!(tramp.syscall(&WRITE_RAW, &[1, 0x100, 5]), Ok(-(ENOENT as i64)));
        let call = host.last();
        assert_eq!(call.abi, Abi::Legacy);
        assert_eq!(call.errno, Errno::Raw);

        assert_eq!(tramp.syscall(&table::WRITE, &[1, 0x100, 5]), Err(ENOENT));
        assert_eq!(host.last().errno, Errno::Translate);
    }

    #[test]
    fn mmap_returns_guest_address() {
        let mem = AddressSpace::new(0x10000).unwrap();
        let host = Recorder::default().answer(&[(mem.base() + 0x4000) as i64]);
        let tramp = Trampoline::new(cage(), &mem, &host);

        let addr = tramp.mmap(GuestAddr::NULL, 0x1000, 3, 0x22, -1, 0);
        assert_eq!(addr, Ok(GuestAddr(0x4000)));
        let call = host.last();
        assert_eq!(call.argv[0], 0);
        assert_eq!(call.argv[4], u64::MAX);
    }

    #[test]
    fn copy_and_register_shapes() {
        let mem = AddressSpace::new(0x1000).unwrap();
        let host = Recorder::default();
        let tramp = Trampoline::new(cage(), &mem, &host);
        let other = CageId::from_raw(5);

        assert_eq!(
            tramp.copy(cage(), GuestAddr(0x10), other, GuestAddr(0x20), 8, CopyType::Strncpy),
            Ok(8)
        );
        assert_eq!(
            host.copies.lock()[0],
            item::Copy {
                this_cage: 2,
                target_cage: UNUSED_ID,
                src_addr: 0x10,
                src_cage: 2,
                dst_addr: 0x20,
                dst_cage: 5,
                len: 8,
                copy_type: 1,
            }
        );

        assert_eq!(tramp.register(other, 3, 7), Ok(()));
        assert_eq!(tramp.register(other, 3, DEREGISTER), Err(EINVAL));
        assert_eq!(tramp.deregister(other, 3), Ok(()));
        let regs = host.registrations.lock();
        assert_eq!(regs.len(), 2);
        assert_eq!(regs[0].handler, 7);
        assert_eq!(regs[0].grate, 2);
        assert!(regs[1].is_deregister());
    }

    #[test]
    fn exit_consumes() {
        let mem = AddressSpace::new(0x1000).unwrap();
        let host = Recorder::default();
        let tramp = Trampoline::new(cage(), &mem, &host);

        assert_eq!(tramp.exit(3), Ok(Exited { status: 3 }));
        assert_eq!(host.last().num, table::EXIT.num);
        assert_eq!(host.last().argv[0], 3);
    }
}
