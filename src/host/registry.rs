// SPDX-License-Identifier: Apache-2.0

//! Interposition registry
//!
//! Maps a (target cage, syscall number) pair to the grate and handler that services it. At most
//! one registration exists per pair; registering again replaces it.

use crate::cage::{Cage, CageId};
use crate::Result;

use std::collections::HashMap;

use libc::ESRCH;
use log::{debug, trace};
use parking_lot::RwLock;

/// Handler of a redirected syscall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registration {
    /// Opaque handler identifier, meaningful to the grate only.
    pub handler: u64,

    /// The grate owning the handler.
    pub grate: CageId,
}

#[derive(Debug, Default)]
pub struct Registry {
    table: RwLock<HashMap<(CageId, u32), Registration>>,
}

impl Registry {
    /// Redirects syscall `num` of `target` to `handler` of `grate`.
    ///
    /// Both cages are checked for liveness while the table is locked, so a registration never
    /// survives the removal of either cage. Returns the replaced registration, if any.
    pub fn register(
        &self,
        target: &Cage,
        num: u32,
        handler: u64,
        grate: &Cage,
    ) -> Result<Option<Registration>> {
        let mut table = self.table.write();
        if target.is_exiting() || grate.is_exiting() {
            return Err(ESRCH);
        }

        let reg = Registration {
            handler,
            grate: grate.id(),
        };
        let old = table.insert((target.id(), num), reg);
        debug!(
            "cage {} syscall {} -> grate {} handler {:#x}",
            target.id(),
            num,
            grate.id(),
            handler
        );
        Ok(old)
    }

    /// Removes the redirect of syscall `num` of `target`, if it is owned by `grate`.
    pub fn unregister(&self, target: CageId, num: u32, grate: CageId) -> Option<Registration> {
        let mut table = self.table.write();
        match table.get(&(target, num)) {
            Some(reg) if reg.grate == grate => table.remove(&(target, num)),
            _ => None,
        }
    }

    pub fn lookup(&self, target: CageId, num: u32) -> Option<Registration> {
        self.table.read().get(&(target, num)).copied()
    }

    /// Drops every registration owned by or targeting `cage`.
    ///
    /// Returns the number of registrations dropped.
    pub fn remove_cage(&self, cage: CageId) -> usize {
        let mut table = self.table.write();
        let before = table.len();
        table.retain(|(target, _), reg| *target != cage && reg.grate != cage);
        let dropped = before - table.len();
        trace!("cage {}: dropped {} registrations", cage, dropped);
        dropped
    }

    /// Gives `child` a copy of every registration targeting `parent`.
    pub fn inherit(&self, parent: CageId, child: CageId) -> usize {
        let mut table = self.table.write();
        let inherited: Vec<_> = table
            .iter()
            .filter(|((target, _), _)| *target == parent)
            .map(|((_, num), reg)| ((child, *num), *reg))
            .collect();
        let count = inherited.len();
        table.extend(inherited);
        count
    }

    /// Current registrations, ordered by target and syscall number.
    pub fn snapshot(&self) -> Vec<(CageId, u32, Registration)> {
        let mut all: Vec<_> = self
            .table
            .read()
            .iter()
            .map(|((target, num), reg)| (*target, *num, *reg))
            .collect();
        all.sort_by_key(|(target, num, _)| (*target, *num));
        all
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}
