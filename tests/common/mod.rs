// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use cageport::cage::{Cage, CageId};
use cageport::config::Config;
use cageport::host::{Runtime, Service};
use cageport::item::Syscall;
use cageport::syscall::{SYS_CLOSE, SYS_WRITE};

use std::sync::Arc;

use libc::ENOENT;
use parking_lot::Mutex;

/// What a [`Recording`] service observed.
#[derive(Default)]
pub struct Log {
    pub calls: Vec<(CageId, Syscall)>,
    pub forks: Vec<(CageId, CageId)>,
    pub exits: Vec<CageId>,
}

/// A service recording every call it is handed.
///
/// `close` succeeds, `write` reports its count and every other call fails with `ENOENT`.
#[derive(Clone, Default)]
pub struct Recording(pub Arc<Mutex<Log>>);

impl Recording {
    pub fn calls(&self) -> Vec<(CageId, Syscall)> {
        self.0.lock().calls.clone()
    }
}

impl Service for Recording {
    fn service(&self, _rt: &Runtime, cage: &Cage, call: &Syscall) -> i64 {
        self.0.lock().calls.push((cage.id(), *call));
        match call.num {
            SYS_CLOSE => 0,
            SYS_WRITE => call.argv[2] as i64,
            _ => -ENOENT as i64,
        }
    }

    fn forked(&self, parent: &Cage, child: &Cage) {
        self.0.lock().forks.push((parent.id(), child.id()));
    }

    fn exited(&self, cage: &Cage) {
        self.0.lock().exits.push(cage.id());
    }
}

pub fn runtime() -> (Runtime, Recording) {
    let _ = env_logger::builder().is_test(true).try_init();

    let service = Recording::default();
    let config = Config {
        memory_size: 0x10000,
        ..Default::default()
    };
    (Runtime::new(config, service.clone()), service)
}
