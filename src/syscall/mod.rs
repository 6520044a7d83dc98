// SPDX-License-Identifier: Apache-2.0

//! System call numbers and argument signatures
//!
//! Numbers follow the Linux x86-64 table so that guest libraries built against it need no
//! remapping.

pub mod table;

pub use table::{lookup, Field, Len, Signature, Slot, SIGNATURES};

pub const SYS_READ: u32 = 0;
pub const SYS_WRITE: u32 = 1;
pub const SYS_OPEN: u32 = 2;
pub const SYS_CLOSE: u32 = 3;
pub const SYS_MMAP: u32 = 9;
pub const SYS_MUNMAP: u32 = 11;
pub const SYS_DUP: u32 = 32;
pub const SYS_DUP2: u32 = 33;
pub const SYS_GETPID: u32 = 39;
pub const SYS_CLONE: u32 = 56;
pub const SYS_FORK: u32 = 57;
pub const SYS_EXEC: u32 = 59;
pub const SYS_EXIT: u32 = 60;
pub const SYS_WAITPID: u32 = 61;
pub const SYS_GETCWD: u32 = 79;
pub const SYS_CREAT: u32 = 85;
pub const SYS_UNLINK: u32 = 87;
pub const SYS_GETUID: u32 = 102;
pub const SYS_GETGID: u32 = 104;
pub const SYS_GETEUID: u32 = 107;
pub const SYS_GETEGID: u32 = 108;
pub const SYS_GETPPID: u32 = 110;
pub const SYS_FUTEX: u32 = 202;
pub const SYS_DUP3: u32 = 292;
