// SPDX-License-Identifier: Apache-2.0

mod check;
mod init;

use clap::Subcommand;

/// Commands for working with Cageport configuration files.
#[derive(Subcommand, Debug)]
pub enum Subcommands {
    Init(init::Options),
    Check(check::Options),
}

impl Subcommands {
    pub fn dispatch(self) -> anyhow::Result<()> {
        match self {
            Self::Init(cmd) => cmd.execute(),
            Self::Check(cmd) => cmd.execute(),
        }
    }
}
