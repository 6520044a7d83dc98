// SPDX-License-Identifier: Apache-2.0

//! Linear memory of a cage and translation between guest and host addresses
//!
//! A guest address is an offset into the linear memory of the cage that owns it. The host
//! address of the same byte is `base + guest`, where `base` is wherever the runtime placed the
//! memory. The base may move (see [`AddressSpace::remap`]), so translated addresses are only
//! valid for the duration of the call that produced them.

use crate::util::ptr::is_aligned_non_null;
use crate::{Result, MAX_STRLEN};

use core::fmt;
use core::mem::size_of;
use core::ptr::NonNull;

use bitflags::bitflags;
use libc::{EFAULT, EINVAL, ENAMETOOLONG, ENOMEM};

/// Granularity of memory protections.
pub const PAGE_SIZE: u64 = 4096;

bitflags! {
    /// Access permissions of a page of guest memory.
    ///
    /// A page without any permission is unmapped.
    pub struct Prot: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

/// An address relative to the linear memory of a cage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct GuestAddr(pub u64);

impl GuestAddr {
    pub const NULL: Self = Self(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns the address `count` bytes further, if representable.
    #[inline]
    pub fn checked_add(self, count: u64) -> Option<Self> {
        self.0.checked_add(count).map(Self)
    }
}

impl From<u32> for GuestAddr {
    #[inline]
    fn from(addr: u32) -> Self {
        Self(addr.into())
    }
}

impl From<u64> for GuestAddr {
    #[inline]
    fn from(addr: u64) -> Self {
        Self(addr)
    }
}

impl fmt::LowerHex for GuestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// The number of bytes a translated pointer must cover.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extent {
    /// A fixed number of bytes.
    Bytes(u64),

    /// A NUL-terminated string of at most [`MAX_STRLEN`] bytes including the terminator.
    Str,
}

struct Memory {
    ptr: NonNull<u8>,
    size: u64,
    owned: bool,
}

impl Memory {
    fn zeroed(size: u64) -> Result<Self> {
        let len = usize::try_from(size).map_err(|_| ENOMEM)?;
        if len > isize::MAX as usize {
            return Err(ENOMEM);
        }

        let raw = Box::into_raw(vec![0u8; len].into_boxed_slice());
        let ptr = NonNull::new(raw as *mut u8).ok_or(ENOMEM)?;
        Ok(Self {
            ptr,
            size,
            owned: true,
        })
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        if self.owned {
            let raw = core::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.size as usize);
            drop(unsafe { Box::from_raw(raw) });
        }
    }
}

/// The linear memory of a cage.
///
/// All accesses to the memory go through raw host pointers. No Rust reference to the contents is
/// ever handed out, so a shared `&AddressSpace` is enough to read and write guest memory while
/// `&mut AddressSpace` is needed to move or reshape it.
pub struct AddressSpace {
    mem: Memory,
    prot: Vec<Prot>,
}

// The memory is only reached through raw pointers derived from `Memory::ptr`.
unsafe impl Send for AddressSpace {}
unsafe impl Sync for AddressSpace {}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("base", &format_args!("{:#x}", self.base()))
            .field("size", &format_args!("{:#x}", self.size()))
            .finish()
    }
}

#[inline]
fn pages(size: u64) -> usize {
    ((size + PAGE_SIZE - 1) / PAGE_SIZE) as usize
}

impl AddressSpace {
    /// Allocates zeroed linear memory of `size` bytes, rounded up to [`PAGE_SIZE`], readable and
    /// writable throughout.
    pub fn new(size: u64) -> Result<Self> {
        let size = size.checked_add(PAGE_SIZE - 1).ok_or(ENOMEM)? / PAGE_SIZE * PAGE_SIZE;
        let mem = Memory::zeroed(size)?;
        Ok(Self {
            prot: vec![Prot::READ | Prot::WRITE; pages(size)],
            mem,
        })
    }

    /// Wraps linear memory owned by someone else.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `size` bytes for as long as the returned
    /// value lives, and must not be accessed through Rust references in the meantime.
    pub unsafe fn from_raw_parts(base: NonNull<u8>, size: u64) -> Self {
        Self {
            mem: Memory {
                ptr: base,
                size,
                owned: false,
            },
            prot: vec![Prot::READ | Prot::WRITE; pages(size)],
        }
    }

    /// Host address of guest address zero.
    #[inline]
    pub fn base(&self) -> u64 {
        self.mem.ptr.as_ptr() as u64
    }

    /// Size of the linear memory in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.mem.size
    }

    fn range(&self, addr: GuestAddr, len: u64) -> Result<()> {
        match addr.0.checked_add(len) {
            Some(end) if end <= self.size() => Ok(()),
            _ => Err(EFAULT),
        }
    }

    fn pages_of(&self, addr: GuestAddr, len: u64) -> &[Prot] {
        if len == 0 {
            return &[];
        }
        let first = (addr.0 / PAGE_SIZE) as usize;
        let last = ((addr.0 + len - 1) / PAGE_SIZE) as usize;
        &self.prot[first..=last]
    }

    /// Validates that `[addr, addr + len)` lies within the memory and grants `prot`.
    pub fn check(&self, addr: GuestAddr, len: u64, prot: Prot) -> Result<()> {
        self.range(addr, len)?;
        if self.pages_of(addr, len).iter().all(|p| p.contains(prot)) {
            Ok(())
        } else {
            Err(EFAULT)
        }
    }

    /// Changes the protection of the pages covering `[addr, addr + len)`.
    ///
    /// `addr` must be page aligned.
    pub fn protect(&mut self, addr: GuestAddr, len: u64, prot: Prot) -> Result<()> {
        if addr.0 % PAGE_SIZE != 0 {
            return Err(EINVAL);
        }
        self.range(addr, len)?;
        let first = (addr.0 / PAGE_SIZE) as usize;
        let count = pages(len);
        self.prot[first..first + count].fill(prot);
        Ok(())
    }

    fn strlen(&self, addr: GuestAddr) -> Result<u64> {
        let avail = self.size() - addr.0;
        let limit = avail.min(MAX_STRLEN);
        let start = (self.base() + addr.0) as *const u8;

        // Bytes are read one at a time; the guest may be writing to them concurrently.
        match (0..limit).find(|i| unsafe { start.add(*i as usize).read_volatile() } == 0) {
            Some(len) => Ok(len + 1),
            None if limit == MAX_STRLEN => Err(ENAMETOOLONG),
            None => Err(EFAULT),
        }
    }

    fn resolve(&self, addr: GuestAddr, extent: Extent) -> Result<u64> {
        self.range(addr, 0)?;
        let len = match extent {
            Extent::Bytes(len) => len,
            Extent::Str => self.strlen(addr)?,
        };
        self.range(addr, len)?;
        if self.pages_of(addr, len).iter().any(|p| p.is_empty()) {
            return Err(EFAULT);
        }
        Ok(self.base() + addr.0)
    }

    /// Translates a non-null guest address covering `extent` into a host address.
    pub fn translate(&self, addr: GuestAddr, extent: Extent) -> Result<u64> {
        if addr.is_null() {
            return Err(EINVAL);
        }
        self.resolve(addr, extent)
    }

    /// Like [`translate`](Self::translate), but maps a null guest address to a null host address.
    pub fn translate_nullable(&self, addr: GuestAddr, extent: Extent) -> Result<u64> {
        if addr.is_null() {
            return Ok(0);
        }
        self.resolve(addr, extent)
    }

    /// Translates the address of a `T`, which must be suitably aligned in guest terms.
    pub fn translate_aligned<T>(&self, addr: GuestAddr) -> Result<u64> {
        let addr = is_aligned_non_null::<T>(addr.0).ok_or(EINVAL)?;
        self.resolve(GuestAddr(addr), Extent::Bytes(size_of::<T>() as u64))
    }

    /// Expresses a host address inside the memory in guest terms.
    pub fn untranslate(&self, host: u64) -> Result<GuestAddr> {
        match host.checked_sub(self.base()) {
            Some(addr) if addr <= self.size() => Ok(GuestAddr(addr)),
            _ => Err(EFAULT),
        }
    }

    /// Copies guest memory at `addr` into `buf`.
    pub fn read(&self, addr: GuestAddr, buf: &mut [u8]) -> Result<()> {
        self.check(addr, buf.len() as u64, Prot::READ)?;
        let src = (self.base() + addr.0) as *const u8;
        unsafe { core::ptr::copy(src, buf.as_mut_ptr(), buf.len()) };
        Ok(())
    }

    /// Copies `data` into guest memory at `addr`.
    pub fn write(&self, addr: GuestAddr, data: &[u8]) -> Result<()> {
        self.check(addr, data.len() as u64, Prot::WRITE)?;
        let dst = (self.base() + addr.0) as *mut u8;
        unsafe { core::ptr::copy(data.as_ptr(), dst, data.len()) };
        Ok(())
    }

    /// Moves the memory to a fresh allocation of `size` bytes.
    ///
    /// The contents are preserved up to the smaller of both sizes and the base changes. Only
    /// memory allocated by [`new`](Self::new) can be remapped.
    pub fn remap(&mut self, size: u64) -> Result<()> {
        if !self.mem.owned {
            return Err(EINVAL);
        }

        let mut next = Self::new(size)?;
        let keep = self.size().min(next.size());
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.mem.ptr.as_ptr(),
                next.mem.ptr.as_ptr(),
                keep as usize,
            )
        };
        let kept = pages(keep);
        next.prot[..kept].copy_from_slice(&self.prot[..kept]);

        *self = next;
        Ok(())
    }

    /// Duplicates contents and protections into freshly allocated memory.
    pub fn try_clone(&self) -> Result<Self> {
        let next = Self::new(self.size())?;
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.mem.ptr.as_ptr(),
                next.mem.ptr.as_ptr(),
                self.size() as usize,
            )
        };
        Ok(Self {
            prot: self.prot.clone(),
            ..next
        })
    }

    /// Zeroes the memory and makes it readable and writable throughout.
    pub fn reset(&mut self) {
        unsafe { core::ptr::write_bytes(self.mem.ptr.as_ptr(), 0, self.size() as usize) };
        self.prot.fill(Prot::READ | Prot::WRITE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> AddressSpace {
        AddressSpace::new(0x10000).unwrap()
    }

    #[test]
    fn translate_offsets_from_base() {
        let mem = space();
        assert_eq!(
            mem.translate(GuestAddr(0x40), Extent::Bytes(8)),
            Ok(mem.base() + 0x40)
        );
        assert_eq!(
            mem.translate(GuestAddr(0xfff8), Extent::Bytes(8)),
            Ok(mem.base() + 0xfff8)
        );
    }

    #[test]
    fn translate_null() {
        let mem = space();
        assert_eq!(mem.translate(GuestAddr::NULL, Extent::Bytes(1)), Err(EINVAL));
        assert_eq!(mem.translate_nullable(GuestAddr::NULL, Extent::Bytes(1)), Ok(0));
        assert_eq!(
            mem.translate_nullable(GuestAddr(0x10), Extent::Bytes(1)),
            Ok(mem.base() + 0x10)
        );
    }

    #[test]
    fn translate_out_of_range() {
        let mem = space();
        for (addr, len) in [
            (0xfff9, 8),
            (0x10000, 1),
            (0x10001, 0),
            (u64::MAX, 1),
            (0x40, u64::MAX),
        ] {
            assert_eq!(
                mem.translate(GuestAddr(addr), Extent::Bytes(len)),
                Err(EFAULT),
                "{addr:#x}+{len:#x}"
            );
        }
    }

    #[test]
    fn translate_unmapped() {
        let mut mem = space();
        mem.protect(GuestAddr(0x2000), PAGE_SIZE, Prot::empty()).unwrap();
        assert_eq!(
            mem.translate(GuestAddr(0x1ff0), Extent::Bytes(0x20)),
            Err(EFAULT)
        );
        assert!(mem.translate(GuestAddr(0x1ff0), Extent::Bytes(0x10)).is_ok());
    }

    #[test]
    fn translate_str() {
        let mem = space();
        mem.write(GuestAddr(0x40), b"/tmp/file\0").unwrap();
        assert_eq!(
            mem.translate(GuestAddr(0x40), Extent::Str),
            Ok(mem.base() + 0x40)
        );

        // no terminator before the end of memory
        mem.write(GuestAddr(0xfffc), b"abcd").unwrap();
        assert_eq!(mem.translate(GuestAddr(0xfffc), Extent::Str), Err(EFAULT));

        // no terminator within the string limit
        mem.write(GuestAddr(0x1000), &[b'a'; MAX_STRLEN as usize]).unwrap();
        assert_eq!(
            mem.translate(GuestAddr(0x1000), Extent::Str),
            Err(ENAMETOOLONG)
        );
    }

    #[test]
    fn translate_aligned() {
        let mem = space();
        assert_eq!(mem.translate_aligned::<u32>(GuestAddr(0x42)), Err(EINVAL));
        assert_eq!(mem.translate_aligned::<u32>(GuestAddr(0)), Err(EINVAL));
        assert_eq!(
            mem.translate_aligned::<u32>(GuestAddr(0x44)),
            Ok(mem.base() + 0x44)
        );
        assert_eq!(mem.translate_aligned::<u32>(GuestAddr(0x10000)), Err(EFAULT));
    }

    #[test]
    fn round_trip() {
        let mem = space();
        for addr in [1, 0x40, 0x1234, 0xffff] {
            let host = mem.translate(GuestAddr(addr), Extent::Bytes(1)).unwrap();
            assert_eq!(mem.untranslate(host), Ok(GuestAddr(addr)));
        }
        assert_eq!(mem.untranslate(mem.base() - 1), Err(EFAULT));
        assert_eq!(mem.untranslate(mem.base() + 0x10001), Err(EFAULT));
    }

    #[test]
    fn check_protections() {
        let mut mem = space();
        mem.protect(GuestAddr(0x1000), 0x1000, Prot::READ).unwrap();
        assert_eq!(mem.check(GuestAddr(0x1800), 0x10, Prot::READ), Ok(()));
        assert_eq!(mem.check(GuestAddr(0x1800), 0x10, Prot::WRITE), Err(EFAULT));
        assert_eq!(mem.check(GuestAddr(0xff0), 0x20, Prot::WRITE), Err(EFAULT));
        assert_eq!(mem.protect(GuestAddr(0x1001), 1, Prot::READ), Err(EINVAL));
        assert_eq!(mem.write(GuestAddr(0x1000), b"x"), Err(EFAULT));
    }

    #[test]
    fn remap_moves_base() {
        let mut mem = space();
        mem.write(GuestAddr(0x40), b"cage").unwrap();
        let before = mem.base();

        mem.remap(0x20000).unwrap();
        assert_ne!(mem.base(), before);
        assert_eq!(mem.size(), 0x20000);

        let mut buf = [0u8; 4];
        mem.read(GuestAddr(0x40), &mut buf).unwrap();
        assert_eq!(&buf, b"cage");
        assert!(mem.translate(GuestAddr(0x18000), Extent::Bytes(1)).is_ok());
    }

    #[test]
    fn clone_and_reset() {
        let mut mem = space();
        mem.write(GuestAddr(0x80), b"parent").unwrap();
        let copy = mem.try_clone().unwrap();
        assert_ne!(copy.base(), mem.base());

        mem.reset();
        let mut buf = [0u8; 6];
        copy.read(GuestAddr(0x80), &mut buf).unwrap();
        assert_eq!(&buf, b"parent");
        mem.read(GuestAddr(0x80), &mut buf).unwrap();
        assert_eq!(buf, [0; 6]);
    }

    #[test]
    fn size_is_page_rounded() {
        assert_eq!(AddressSpace::new(1).unwrap().size(), PAGE_SIZE);
        assert_eq!(AddressSpace::new(0).unwrap().size(), 0);
    }
}
