// SPDX-License-Identifier: Apache-2.0

use crate::cage::{AddressSpace, CageId, GuestAddr};
use crate::Result;

use libc::{c_int, EINVAL, EOVERFLOW};

/// Conversion of a successful dispatcher result into the return type of a call.
pub trait FromRet: Sized {
    /// `mem` is the memory of the calling cage, for results that are host addresses.
    fn from_ret(ret: i64, mem: &AddressSpace) -> Result<Self>;
}

impl FromRet for () {
    #[inline]
    fn from_ret(_: i64, _: &AddressSpace) -> Result<Self> {
        Ok(())
    }
}

impl FromRet for i64 {
    #[inline]
    fn from_ret(ret: i64, _: &AddressSpace) -> Result<Self> {
        Ok(ret)
    }
}

macro_rules! from_ret {
    ($($t:ty),+) => {
        $(
            impl FromRet for $t {
                #[inline]
                fn from_ret(ret: i64, _: &AddressSpace) -> Result<Self> {
                    <$t>::try_from(ret).map_err(|_| EOVERFLOW)
                }
            }
        )+
    };
}

from_ret!(c_int, u32, usize);

/// A host address returned by the runtime, handed back to the guest in its own terms.
impl FromRet for GuestAddr {
    #[inline]
    fn from_ret(ret: i64, mem: &AddressSpace) -> Result<Self> {
        mem.untranslate(ret as u64)
    }
}

/// Which side of a cage creation a context is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fork {
    /// The creating context, holding the new cage's id.
    Parent(CageId),

    /// The new context.
    Child,
}

impl FromRet for Fork {
    #[inline]
    fn from_ret(ret: i64, _: &AddressSpace) -> Result<Self> {
        match ret {
            0 => Ok(Fork::Child),
            id if id > 0 => Ok(Fork::Parent(CageId::from_raw(id as u64))),
            _ => Err(EINVAL),
        }
    }
}

/// Proof that a cage context terminated.
///
/// Only obtainable by consuming the context's [`Trampoline`](crate::guest::Trampoline).
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Exited {
    pub status: c_int,
}
