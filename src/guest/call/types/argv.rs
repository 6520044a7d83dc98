// SPDX-License-Identifier: Apache-2.0

use crate::cage::{CageId, GuestAddr};
use crate::NOTUSED;

/// Conversion of an argument into a 64-bit register slot.
///
/// Signed types are sign-extended and unsigned types zero-extended, as a C compiler would when
/// passing them in a wider register. Guest pointers are unsigned.
pub trait Widen {
    fn widen(self) -> u64;
}

macro_rules! widen {
    ($($t:ty),+) => {
        $(
            impl Widen for $t {
                #[inline]
                fn widen(self) -> u64 {
                    self as _
                }
            }
        )+
    };
}

// `as` from a signed type sign-extends, from an unsigned type zero-extends.
widen!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl Widen for bool {
    #[inline]
    fn widen(self) -> u64 {
        self.into()
    }
}

impl Widen for GuestAddr {
    #[inline]
    fn widen(self) -> u64 {
        self.0
    }
}

impl Widen for CageId {
    #[inline]
    fn widen(self) -> u64 {
        self.get()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Argv<const N: usize>(pub [u64; N]);

impl From<Argv<0>> for [u64; 6] {
    #[inline]
    fn from(_: Argv<0>) -> Self {
        [NOTUSED, NOTUSED, NOTUSED, NOTUSED, NOTUSED, NOTUSED]
    }
}

impl From<Argv<1>> for [u64; 6] {
    #[inline]
    fn from(argv: Argv<1>) -> Self {
        [argv.0[0], NOTUSED, NOTUSED, NOTUSED, NOTUSED, NOTUSED]
    }
}

impl From<Argv<2>> for [u64; 6] {
    #[inline]
    fn from(argv: Argv<2>) -> Self {
        [argv.0[0], argv.0[1], NOTUSED, NOTUSED, NOTUSED, NOTUSED]
    }
}

impl From<Argv<3>> for [u64; 6] {
    #[inline]
    fn from(argv: Argv<3>) -> Self {
        [argv.0[0], argv.0[1], argv.0[2], NOTUSED, NOTUSED, NOTUSED]
    }
}

impl From<Argv<4>> for [u64; 6] {
    #[inline]
    fn from(argv: Argv<4>) -> Self {
        [argv.0[0], argv.0[1], argv.0[2], argv.0[3], NOTUSED, NOTUSED]
    }
}

impl From<Argv<5>> for [u64; 6] {
    #[inline]
    fn from(argv: Argv<5>) -> Self {
        [argv.0[0], argv.0[1], argv.0[2], argv.0[3], argv.0[4], NOTUSED]
    }
}

impl From<Argv<6>> for [u64; 6] {
    #[inline]
    fn from(argv: Argv<6>) -> Self {
        argv.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use libc::c_int;

    #[test]
    fn widen() {
        assert_eq!((-1 as c_int).widen(), 0xffff_ffff_ffff_ffff);
        assert_eq!((-100 as c_int).widen(), -100i64 as u64);
        assert_eq!(0xffff_ffff_u32.widen(), 0x0000_0000_ffff_ffff);
        assert_eq!((-1i8).widen(), u64::MAX);
        assert_eq!(0x80u8.widen(), 0x80);
        assert_eq!(GuestAddr(0x8000_0000).widen(), 0x8000_0000);
        assert_eq!(true.widen(), 1);
        assert_eq!(CageId::from_raw(9).widen(), 9);
    }

    #[test]
    fn argv_padding() {
        assert_eq!(<[u64; 6]>::from(Argv([])), [NOTUSED; 6]);
        assert_eq!(
            <[u64; 6]>::from(Argv([0, 1])),
            [0, 1, NOTUSED, NOTUSED, NOTUSED, NOTUSED]
        );
        assert_eq!(
            <[u64; 6]>::from(Argv([1, 2, 3, 4, 5])),
            [1, 2, 3, 4, 5, NOTUSED]
        );
        assert_eq!(<[u64; 6]>::from(Argv([0; 6])), [0; 6]);
    }
}
