// SPDX-License-Identifier: Apache-2.0

use std::fs::OpenOptions;
use std::io::prelude::*;
use std::path::PathBuf;

use anyhow::bail;
use cageport::config::CONFIG_TEMPLATE;
use clap::Args;

/// Generate a `Cageport.toml` template
#[derive(Args, Debug)]
pub struct Options {
    /// Where to write the template
    #[clap(default_value = "Cageport.toml")]
    path: PathBuf,
}

impl Options {
    pub fn execute(self) -> anyhow::Result<()> {
        if self.path.exists() {
            bail!("{:?} does already exist.", self.path);
        }

        let mut cageport_toml = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&self.path)?;

        cageport_toml.write_all(CONFIG_TEMPLATE.as_bytes())?;
        Ok(())
    }
}
