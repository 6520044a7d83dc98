// SPDX-License-Identifier: Apache-2.0

//! System call item definitions

use crate::{Error, Result, MAX_ERRNO, NOTUSED};

use core::fmt;

use libc::{c_int, E2BIG, EINVAL};

/// Calling-convention variant of a system call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum Abi {
    /// The stable six-slot shape.
    Current = 0x00,

    /// The six-slot shape with the 32-bit result convention of older runtimes.
    Legacy = 0x01,

    /// Results are handed back untouched, without errno interpretation.
    Raw = 0x02,
}

impl Abi {
    /// Errno handling used by calls of this variant unless overridden.
    #[inline]
    pub const fn errno(self) -> Errno {
        match self {
            Abi::Current | Abi::Legacy => Errno::Translate,
            Abi::Raw => Errno::Raw,
        }
    }
}

impl TryFrom<u64> for Abi {
    type Error = Error;

    #[inline]
    fn try_from(abi: u64) -> core::result::Result<Self, Self::Error> {
        match abi {
            abi if abi == Abi::Current as _ => Ok(Abi::Current),
            abi if abi == Abi::Legacy as _ => Ok(Abi::Legacy),
            abi if abi == Abi::Raw as _ => Ok(Abi::Raw),
            _ => Err(EINVAL),
        }
    }
}

/// Interpretation of negative results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Errno {
    /// Results in `[-MAX_ERRNO, -1]` are errno values.
    Translate,

    /// Every result is a value.
    Raw,
}

impl Errno {
    /// Maps a dispatcher result onto [`Result`].
    #[inline]
    pub fn collect(self, ret: i64) -> Result<i64> {
        match self {
            Errno::Translate if (-MAX_ERRNO..0).contains(&ret) => Err(-ret as c_int),
            _ => Ok(ret),
        }
    }
}

/// Payload of a system call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Payload {
    pub num: u32,
    pub name: &'static str,
    pub argv: [u64; 6],
    pub abi: Abi,
    pub errno: Errno,
}

impl Payload {
    /// Builds a record with the default errno handling of `abi`.
    pub fn new(num: u32, name: &'static str, argv: impl Into<[u64; 6]>, abi: Abi) -> Self {
        Self {
            num,
            name,
            argv: argv.into(),
            abi,
            errno: abi.errno(),
        }
    }

    /// Builds a record from a variable number of already widened arguments.
    ///
    /// Slots past `args` are padded with [`NOTUSED`].
    pub fn encode(num: u32, name: &'static str, args: &[u64], abi: Abi) -> Result<Self> {
        if args.len() > 6 {
            return Err(E2BIG);
        }
        let mut argv = [NOTUSED; 6];
        argv[..args.len()].copy_from_slice(args);
        Ok(Self::new(num, name, argv, abi))
    }

    #[inline]
    pub fn with_errno(self, errno: Errno) -> Self {
        Self { errno, ..self }
    }

    /// Returns argument `i`, or `None` if the slot is unused.
    #[inline]
    pub fn arg(&self, i: usize) -> Option<u64> {
        self.argv.get(i).copied().filter(|arg| *arg != NOTUSED)
    }

    /// Number of slots up to and including the last used one.
    pub fn argc(&self) -> usize {
        self.argv
            .iter()
            .rposition(|arg| *arg != NOTUSED)
            .map_or(0, |last| last + 1)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in (0..6).filter_map(|i| self.arg(i)).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if arg > 0xffff {
                write!(f, "{arg:#x}")?;
            } else {
                write!(f, "{arg}")?;
            }
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use libc::{EINTR, ENOENT};

    #[test]
    fn abi_try_from() {
        for (v, expected) in [
            (0x00, Ok(Abi::Current)),
            (0x01, Ok(Abi::Legacy)),
            (0x02, Ok(Abi::Raw)),
            (0x03, Err(EINVAL)),
            (NOTUSED, Err(EINVAL)),
        ] {
            assert_eq!(v.try_into(), expected, "Invalid mapping for {v}");
        }
    }

    #[test]
    fn encode_pads_with_sentinel() {
        let call = Payload::encode(85, "creat", &[0x7f00_0040, 0o644], Abi::Current).unwrap();
        assert_eq!(call.argv[..2], [0x7f00_0040, 0o644]);
        assert_eq!(call.argv[2..], [NOTUSED; 4]);
        assert_eq!(call.argc(), 2);
        assert_eq!(call.errno, Errno::Translate);

        assert_eq!(
            Payload::encode(1, "x", &[0; 7], Abi::Current),
            Err(E2BIG)
        );
    }

    #[test]
    fn zero_is_an_argument() {
        let call = Payload::encode(3, "close", &[0], Abi::Current).unwrap();
        assert_eq!(call.arg(0), Some(0));
        assert_eq!(call.arg(1), None);
        assert_eq!(call.argc(), 1);

        let none = Payload::encode(39, "getpid", &[], Abi::Current).unwrap();
        assert_eq!(none.argc(), 0);
        assert_eq!(none.arg(0), None);
    }

    #[test]
    fn errno_collect() {
        for (errno, ret, expected) in [
            (Errno::Translate, 0, Ok(0)),
            (Errno::Translate, 42, Ok(42)),
            (Errno::Translate, -(ENOENT as i64), Err(ENOENT)),
            (Errno::Translate, -(EINTR as i64), Err(EINTR)),
            (Errno::Translate, -255, Err(255)),
            (Errno::Translate, -256, Ok(-256)),
            (Errno::Raw, -(ENOENT as i64), Ok(-(ENOENT as i64))),
        ] {
            assert_eq!(errno.collect(ret), expected, "{errno:?} {ret}");
        }
    }

    #[test]
    fn raw_abi_defaults_to_raw_errno() {
        let call = Payload::new(202, "futex", [NOTUSED; 6], Abi::Raw);
        assert_eq!(call.errno, Errno::Raw);
        assert_eq!(call.with_errno(Errno::Translate).errno, Errno::Translate);
    }

    #[test]
    fn display() {
        let call = Payload::encode(1, "write", &[1, 0x7f00_1000, 5], Abi::Legacy).unwrap();
        assert_eq!(call.to_string(), "write(1, 0x7f001000, 5)");
    }
}
