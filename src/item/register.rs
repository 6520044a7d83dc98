// SPDX-License-Identifier: Apache-2.0

//! Handler registration item definitions

/// Handler index requesting removal of an existing registration.
pub const DEREGISTER: u64 = u64::MAX;

/// Payload of a handler registration.
///
/// Redirects every `num` syscall made by `target_cage` to `handler` in `grate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct Payload {
    pub target_cage: u64,
    pub num: u64,
    pub handler: u64,
    pub grate: u64,
}

impl Payload {
    #[inline]
    pub fn is_deregister(&self) -> bool {
        self.handler == DEREGISTER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use testaso::testaso;

    testaso! {
        struct Payload: 8, 32 => {
            target_cage: 0,
            num: 8,
            handler: 16,
            grate: 24
        }
    }

    #[test]
    fn deregister() {
        let reg = Payload {
            target_cage: 2,
            num: 3,
            handler: 7,
            grate: 1,
        };
        assert!(!reg.is_deregister());
        assert!(Payload {
            handler: DEREGISTER,
            ..reg
        }
        .is_deregister());
    }
}
