// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration, read from a `Cageport.toml` file.

use crate::cage::PAGE_SIZE;

use std::path::Path;
use std::str::FromStr;

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

/// Configuration file template
pub const CONFIG_TEMPLATE: &str = r#"## Configuration of a cage runtime

## Largest number of cages alive at once
# max_cages = 1024

## Largest linear memory of a cage and largest single cross-cage copy, in bytes
# max_linear_memory = 4294967295

## Linear memory of a newly created cage, in bytes
# memory_size = 65536

## Reject call records whose unused argument slots are not marked unused
# strict_args = false
"#;

/// The configuration of a [`Runtime`](crate::host::Runtime).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Largest number of cages alive at once.
    pub max_cages: u64,

    /// Largest linear memory of a cage; also bounds the length of a single copy.
    pub max_linear_memory: u64,

    /// Linear memory of a newly created cage.
    pub memory_size: u64,

    /// Reject calls with stray values in argument slots past the syscall's arity.
    pub strict_args: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_cages: 1024,
            max_linear_memory: 0xffff_ffff,
            memory_size: 0x10000,
            strict_args: false,
        }
    }
}

impl FromStr for Config {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

impl Config {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = text
            .parse()
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values for consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.max_cages > 0, "`max_cages` must not be zero");
        ensure!(
            self.memory_size >= PAGE_SIZE,
            "`memory_size` must be at least one page ({PAGE_SIZE} bytes)"
        );
        ensure!(
            self.memory_size <= self.max_linear_memory,
            "`memory_size` of {:#x} exceeds `max_linear_memory` of {:#x}",
            self.memory_size,
            self.max_linear_memory
        );
        Ok(())
    }
}
