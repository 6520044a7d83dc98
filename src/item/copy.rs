// SPDX-License-Identifier: Apache-2.0

//! Cross-cage copy item definitions

use crate::Error;

use libc::EINVAL;

/// Semantics of a cross-cage copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum CopyType {
    /// Copy exactly `len` bytes. Overlapping ranges within one cage are rejected.
    Memcpy = 0x00,

    /// Copy a NUL-terminated string of at most `len` bytes including the terminator.
    /// Overlapping ranges within one cage are rejected.
    Strncpy = 0x01,

    /// Copy exactly `len` bytes; overlapping ranges within one cage are allowed.
    Memmove = 0x02,
}

impl TryFrom<u64> for CopyType {
    type Error = Error;

    #[inline]
    fn try_from(kind: u64) -> Result<Self, Self::Error> {
        match kind {
            kind if kind == CopyType::Memcpy as _ => Ok(CopyType::Memcpy),
            kind if kind == CopyType::Strncpy as _ => Ok(CopyType::Strncpy),
            kind if kind == CopyType::Memmove as _ => Ok(CopyType::Memmove),
            _ => Err(EINVAL),
        }
    }
}

/// Payload of a cross-cage copy.
///
/// Both addresses are guest addresses of their respective cage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct Payload {
    /// The cage issuing the copy.
    pub this_cage: u64,

    /// The cage the copy is performed for, or [`UNUSED_ID`](crate::UNUSED_ID).
    pub target_cage: u64,

    pub src_addr: u64,
    pub src_cage: u64,
    pub dst_addr: u64,
    pub dst_cage: u64,
    pub len: u64,
    pub copy_type: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::NOTUSED;

    use testaso::testaso;

    testaso! {
        struct Payload: 8, 64 => {
            this_cage: 0,
            target_cage: 8,
            src_addr: 16,
            src_cage: 24,
            dst_addr: 32,
            dst_cage: 40,
            len: 48,
            copy_type: 56
        }
    }

    #[test]
    fn copy_type_try_from() {
        for (v, expected) in [
            (0x00, Ok(CopyType::Memcpy)),
            (0x01, Ok(CopyType::Strncpy)),
            (0x02, Ok(CopyType::Memmove)),
            (0x03, Err(EINVAL)),
            (NOTUSED, Err(EINVAL)),
        ] {
            assert_eq!(v.try_into(), expected, "Invalid mapping for {v}");
        }
    }
}
