// SPDX-License-Identifier: Apache-2.0

use super::super::types::{self, Argv, FromRet, Widen};
use crate::cage::GuestAddr;
use crate::syscall::table::{self, Signature};

use libc::{c_int, c_uint, mode_t, off_t, pid_t, size_t};

/// Trait implemented by typed syscalls, which are translated according to their signature and
/// passed through to the runtime.
///
/// # Safety
///
/// This trait is unsafe, because the staged arguments are interpreted through [`Self::SIG`]:
/// a guest pointer staged into a slot the signature declares as a plain value reaches the
/// runtime untranslated.
///
/// # Example
/// ```rust
/// use cageport::guest::call::syscall::Passthrough;
/// use cageport::guest::call::types::{Argv, Widen};
/// use cageport::syscall::{table, Signature};
/// #
/// # use libc::c_int;
///
/// pub struct Exit {
///     pub status: c_int,
/// }
///
/// unsafe impl Passthrough for Exit {
///     const SIG: Signature = table::EXIT;
///
///     type Argv = Argv<1>;
///     type Ret = ();
///
///     fn stage(self) -> Self::Argv {
///         Argv([self.status.widen()])
///     }
/// }
/// ```
pub unsafe trait Passthrough {
    /// Argument-translation description, for example [`table::EXIT`].
    const SIG: Signature;

    /// The syscall argument vector, in guest terms.
    ///
    /// For example, [`Argv<1>`](super::super::types::Argv<1>).
    type Argv: Into<[u64; 6]>;

    /// Syscall return value.
    ///
    /// For example, `()`.
    type Ret: FromRet;

    /// Returns argument vector registers.
    fn stage(self) -> Self::Argv;
}

pub struct Read {
    pub fd: c_int,
    pub buf: GuestAddr,
    pub count: size_t,
}

unsafe impl Passthrough for Read {
    const SIG: Signature = table::READ;

    type Argv = Argv<3>;
    type Ret = size_t;

    fn stage(self) -> Self::Argv {
        Argv([self.fd.widen(), self.buf.widen(), self.count.widen()])
    }
}

pub struct Write {
    pub fd: c_int,
    pub buf: GuestAddr,
    pub count: size_t,
}

unsafe impl Passthrough for Write {
    const SIG: Signature = table::WRITE;

    type Argv = Argv<3>;
    type Ret = size_t;

    fn stage(self) -> Self::Argv {
        Argv([self.fd.widen(), self.buf.widen(), self.count.widen()])
    }
}

pub struct Open {
    pub path: GuestAddr,
    pub flags: c_int,
    pub mode: mode_t,
}

unsafe impl Passthrough for Open {
    const SIG: Signature = table::OPEN;

    type Argv = Argv<3>;
    type Ret = c_int;

    fn stage(self) -> Self::Argv {
        Argv([self.path.widen(), self.flags.widen(), self.mode.widen()])
    }
}

pub struct Creat {
    pub path: GuestAddr,
    pub mode: mode_t,
}

unsafe impl Passthrough for Creat {
    const SIG: Signature = table::CREAT;

    type Argv = Argv<2>;
    type Ret = c_int;

    fn stage(self) -> Self::Argv {
        Argv([self.path.widen(), self.mode.widen()])
    }
}

pub struct Unlink {
    pub path: GuestAddr,
}

unsafe impl Passthrough for Unlink {
    const SIG: Signature = table::UNLINK;

    type Argv = Argv<1>;
    type Ret = ();

    fn stage(self) -> Self::Argv {
        Argv([self.path.widen()])
    }
}

pub struct Close {
    pub fd: c_int,
}

unsafe impl Passthrough for Close {
    const SIG: Signature = table::CLOSE;

    type Argv = Argv<1>;
    type Ret = ();

    fn stage(self) -> Self::Argv {
        Argv([self.fd.widen()])
    }
}

pub struct Dup {
    pub oldfd: c_int,
}

unsafe impl Passthrough for Dup {
    const SIG: Signature = table::DUP;

    type Argv = Argv<1>;
    type Ret = c_int;

    fn stage(self) -> Self::Argv {
        Argv([self.oldfd.widen()])
    }
}

pub struct Dup2 {
    pub oldfd: c_int,
    pub newfd: c_int,
}

unsafe impl Passthrough for Dup2 {
    const SIG: Signature = table::DUP2;

    type Argv = Argv<2>;
    type Ret = c_int;

    fn stage(self) -> Self::Argv {
        Argv([self.oldfd.widen(), self.newfd.widen()])
    }
}

pub struct Dup3 {
    pub oldfd: c_int,
    pub newfd: c_int,
    pub flags: c_int,
}

unsafe impl Passthrough for Dup3 {
    const SIG: Signature = table::DUP3;

    type Argv = Argv<3>;
    type Ret = c_int;

    fn stage(self) -> Self::Argv {
        Argv([self.oldfd.widen(), self.newfd.widen(), self.flags.widen()])
    }
}

pub struct Mmap {
    pub addr: GuestAddr,
    pub length: size_t,
    pub prot: c_int,
    pub flags: c_int,
    pub fd: c_int,
    pub offset: off_t,
}

unsafe impl Passthrough for Mmap {
    const SIG: Signature = table::MMAP;

    type Argv = Argv<6>;
    type Ret = GuestAddr;

    fn stage(self) -> Self::Argv {
        Argv([
            self.addr.widen(),
            self.length.widen(),
            self.prot.widen(),
            self.flags.widen(),
            self.fd.widen(),
            self.offset.widen(),
        ])
    }
}

pub struct Munmap {
    pub addr: GuestAddr,
    pub length: size_t,
}

unsafe impl Passthrough for Munmap {
    const SIG: Signature = table::MUNMAP;

    type Argv = Argv<2>;
    type Ret = ();

    fn stage(self) -> Self::Argv {
        Argv([self.addr.widen(), self.length.widen()])
    }
}

pub struct Getcwd {
    pub buf: GuestAddr,
    pub size: size_t,
}

unsafe impl Passthrough for Getcwd {
    const SIG: Signature = table::GETCWD;

    type Argv = Argv<2>;
    type Ret = size_t;

    fn stage(self) -> Self::Argv {
        Argv([self.buf.widen(), self.size.widen()])
    }
}

pub struct Fork;

unsafe impl Passthrough for Fork {
    const SIG: Signature = table::FORK;

    type Argv = Argv<0>;
    type Ret = types::Fork;

    fn stage(self) -> Self::Argv {
        Argv([])
    }
}

/// Cage creation from a `clone_args` record of `size` bytes.
pub struct CloneRecord {
    pub args: GuestAddr,
    pub size: size_t,
}

unsafe impl Passthrough for CloneRecord {
    const SIG: Signature = table::CLONE;

    type Argv = Argv<2>;
    type Ret = types::Fork;

    fn stage(self) -> Self::Argv {
        Argv([self.args.widen(), self.size.widen()])
    }
}

pub struct Exec {
    pub path: GuestAddr,
}

unsafe impl Passthrough for Exec {
    const SIG: Signature = table::EXEC;

    type Argv = Argv<1>;
    type Ret = ();

    fn stage(self) -> Self::Argv {
        Argv([self.path.widen()])
    }
}

pub struct Exit {
    pub status: c_int,
}

unsafe impl Passthrough for Exit {
    const SIG: Signature = table::EXIT;

    type Argv = Argv<1>;
    type Ret = ();

    fn stage(self) -> Self::Argv {
        Argv([self.status.widen()])
    }
}

pub struct Waitpid {
    pub pid: pid_t,
    pub status: GuestAddr,
    pub options: c_int,
}

unsafe impl Passthrough for Waitpid {
    const SIG: Signature = table::WAITPID;

    type Argv = Argv<3>;
    type Ret = pid_t;

    fn stage(self) -> Self::Argv {
        Argv([self.pid.widen(), self.status.widen(), self.options.widen()])
    }
}

pub struct Futex {
    pub uaddr: GuestAddr,
    pub op: c_int,
    pub val: c_uint,
    pub timeout: GuestAddr,
    pub uaddr2: GuestAddr,
    pub val3: c_uint,
}

unsafe impl Passthrough for Futex {
    const SIG: Signature = table::FUTEX;

    type Argv = Argv<6>;
    type Ret = i64;

    fn stage(self) -> Self::Argv {
        Argv([
            self.uaddr.widen(),
            self.op.widen(),
            self.val.widen(),
            self.timeout.widen(),
            self.uaddr2.widen(),
            self.val3.widen(),
        ])
    }
}

/// Syscalls taking no arguments and returning an id.
macro_rules! getter {
    ($($name:ident => $sig:ident: $ret:ty),+ $(,)?) => {
        $(
            pub struct $name;

            unsafe impl Passthrough for $name {
                const SIG: Signature = table::$sig;

                type Argv = Argv<0>;
                type Ret = $ret;

                fn stage(self) -> Self::Argv {
                    Argv([])
                }
            }
        )+
    };
}

getter! {
    Getpid => GETPID: pid_t,
    Getppid => GETPPID: pid_t,
    Getuid => GETUID: u32,
    Geteuid => GETEUID: u32,
    Getgid => GETGID: u32,
    Getegid => GETEGID: u32,
}
