// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::cage::Extent;
use crate::guest::relay::CLONE_FIELDS;
use crate::item::{Abi, Errno};
use crate::{Result, NOTUSED};

use libc::EINVAL;

/// Length of the memory behind a pointer argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Len {
    /// A fixed number of bytes.
    Bytes(u64),

    /// The value of another argument, by position.
    Arg(usize),

    /// A NUL-terminated string.
    Str,
}

impl Len {
    /// Resolves the length against the raw arguments of a call.
    pub fn extent(self, argv: &[u64; 6]) -> Result<Extent> {
        match self {
            Len::Bytes(len) => Ok(Extent::Bytes(len)),
            Len::Str => Ok(Extent::Str),
            Len::Arg(i) => argv
                .get(i)
                .copied()
                .filter(|len| *len != NOTUSED)
                .map(Extent::Bytes)
                .ok_or(EINVAL),
        }
    }
}

/// A pointer embedded in a record argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    /// Byte offset of the 64-bit pointer within the record.
    pub offset: usize,
    pub extent: Extent,
    pub nullable: bool,
}

/// How an argument crosses the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Passed as is.
    Value,

    /// A non-null guest pointer.
    Ptr(Len),

    /// A guest pointer which may be null.
    OptPtr(Len),

    /// A non-null pointer to a 32-bit word, aligned in guest terms.
    Word,

    /// A pointer to a record whose length is given by another argument and which itself
    /// contains pointers.
    Record { len: usize, fields: &'static [Field] },
}

/// Argument-translation description of a system call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    pub num: u32,
    pub name: &'static str,
    pub abi: Abi,
    /// Interpretation of negative results, defaulting to that of `abi`.
    pub errno: Errno,
    pub slots: &'static [Slot],
}

impl Signature {
    pub const fn new(num: u32, name: &'static str, abi: Abi, slots: &'static [Slot]) -> Self {
        Self {
            num,
            name,
            abi,
            errno: abi.errno(),
            slots,
        }
    }

    /// Overrides the errno handling of the calling convention.
    #[inline]
    pub const fn with_errno(self, errno: Errno) -> Self {
        Self { errno, ..self }
    }

    #[inline]
    pub const fn argc(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub const fn errno(&self) -> Errno {
        self.errno
    }
}

use Slot::{OptPtr, Ptr, Record, Value, Word};

pub const READ: Signature = Signature::new(
    SYS_READ,
    "read",
    Abi::Legacy,
    &[Value, Ptr(Len::Arg(2)), Value],
);
pub const WRITE: Signature = Signature::new(
    SYS_WRITE,
    "write",
    Abi::Legacy,
    &[Value, Ptr(Len::Arg(2)), Value],
);
pub const OPEN: Signature =
    Signature::new(SYS_OPEN, "open", Abi::Current, &[Ptr(Len::Str), Value, Value]);
pub const CLOSE: Signature = Signature::new(SYS_CLOSE, "close", Abi::Current, &[Value]);
pub const MMAP: Signature = Signature::new(
    SYS_MMAP,
    "mmap",
    Abi::Current,
    &[OptPtr(Len::Arg(1)), Value, Value, Value, Value, Value],
);
pub const MUNMAP: Signature =
    Signature::new(SYS_MUNMAP, "munmap", Abi::Current, &[Ptr(Len::Arg(1)), Value]);
pub const DUP: Signature = Signature::new(SYS_DUP, "dup", Abi::Current, &[Value]);
pub const DUP2: Signature = Signature::new(SYS_DUP2, "dup2", Abi::Current, &[Value, Value]);
pub const GETPID: Signature = Signature::new(SYS_GETPID, "getpid", Abi::Current, &[]);
pub const CLONE: Signature = Signature::new(
    SYS_CLONE,
    "clone",
    Abi::Current,
    &[
        Record {
            len: 1,
            fields: CLONE_FIELDS,
        },
        Value,
    ],
);
pub const FORK: Signature = Signature::new(SYS_FORK, "fork", Abi::Current, &[]);
pub const EXEC: Signature = Signature::new(SYS_EXEC, "exec", Abi::Current, &[Ptr(Len::Str)]);
pub const EXIT: Signature = Signature::new(SYS_EXIT, "exit", Abi::Current, &[Value]);
pub const WAITPID: Signature = Signature::new(
    SYS_WAITPID,
    "waitpid",
    Abi::Current,
    &[Value, OptPtr(Len::Bytes(4)), Value],
);
pub const GETCWD: Signature =
    Signature::new(SYS_GETCWD, "getcwd", Abi::Current, &[Ptr(Len::Arg(1)), Value]);
pub const CREAT: Signature =
    Signature::new(SYS_CREAT, "creat", Abi::Current, &[Ptr(Len::Str), Value]);
pub const UNLINK: Signature =
    Signature::new(SYS_UNLINK, "unlink", Abi::Current, &[Ptr(Len::Str)]);
pub const GETUID: Signature = Signature::new(SYS_GETUID, "getuid", Abi::Current, &[]);
pub const GETGID: Signature = Signature::new(SYS_GETGID, "getgid", Abi::Current, &[]);
pub const GETEUID: Signature = Signature::new(SYS_GETEUID, "geteuid", Abi::Current, &[]);
pub const GETEGID: Signature = Signature::new(SYS_GETEGID, "getegid", Abi::Current, &[]);
pub const GETPPID: Signature = Signature::new(SYS_GETPPID, "getppid", Abi::Current, &[]);
pub const FUTEX: Signature = Signature::new(
    SYS_FUTEX,
    "futex",
    Abi::Raw,
    &[
        Word,
        Value,
        Value,
        OptPtr(Len::Bytes(16)),
        OptPtr(Len::Bytes(4)),
        Value,
    ],
);
pub const DUP3: Signature = Signature::new(SYS_DUP3, "dup3", Abi::Current, &[Value, Value, Value]);

/// Every system call the guest library issues through the trampoline.
pub static SIGNATURES: &[Signature] = &[
    READ, WRITE, OPEN, CLOSE, MMAP, MUNMAP, DUP, DUP2, GETPID, CLONE, FORK, EXEC, EXIT, WAITPID,
    GETCWD, CREAT, UNLINK, GETUID, GETGID, GETEUID, GETEGID, GETPPID, FUTEX, DUP3,
];

/// Finds the signature of syscall `num`.
pub fn lookup(num: u32) -> Option<&'static Signature> {
    SIGNATURES.iter().find(|sig| sig.num == num)
}
