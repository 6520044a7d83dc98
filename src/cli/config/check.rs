// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use cageport::config::Config;
use clap::Args;
use log::info;

/// Validate a `Cageport.toml` and print the effective configuration
#[derive(Args, Debug)]
pub struct Options {
    /// The configuration file to check
    #[clap(default_value = "Cageport.toml")]
    path: PathBuf,
}

impl Options {
    pub fn execute(self) -> anyhow::Result<()> {
        let config = Config::load(&self.path)?;
        info!("{:?} is valid", self.path);
        print!("{}", toml::to_string(&config)?);
        Ok(())
    }
}
