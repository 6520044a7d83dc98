// SPDX-License-Identifier: Apache-2.0

use cageport::syscall::{Len, Signature, Slot, SIGNATURES};

use clap::Args;

/// List the system calls crossing the boundary and how their arguments are translated
#[derive(Args, Debug)]
pub struct Options {
    /// Only show the syscall with this number or name
    syscall: Option<String>,
}

fn len(len: Len) -> String {
    match len {
        Len::Bytes(n) => n.to_string(),
        Len::Arg(i) => format!("arg{i}"),
        Len::Str => "str".into(),
    }
}

fn slot(slot: &Slot) -> String {
    match *slot {
        Slot::Value => "value".into(),
        Slot::Ptr(l) => format!("ptr[{}]", len(l)),
        Slot::OptPtr(l) => format!("ptr?[{}]", len(l)),
        Slot::Word => "u32*".into(),
        Slot::Record { len, fields } => format!("record[arg{len}; {} ptrs]", fields.len()),
    }
}

fn describe(sig: &Signature) -> String {
    let abi = format!("{:?}", sig.abi);
    let slots: Vec<_> = sig.slots.iter().map(slot).collect();
    format!(
        "{:>4}  {:<8} {:<8} ({})",
        sig.num,
        sig.name,
        abi,
        slots.join(", ")
    )
}

impl Options {
    pub fn execute(self) -> anyhow::Result<()> {
        let selected = |sig: &&Signature| match &self.syscall {
            None => true,
            Some(key) => key == sig.name || key.parse::<u32>().ok() == Some(sig.num),
        };

        let mut found = false;
        for sig in SIGNATURES.iter().filter(selected) {
            println!("{}", describe(sig));
            found = true;
        }
        if !found {
            anyhow::bail!("unknown syscall {:?}", self.syscall.unwrap_or_default());
        }
        Ok(())
    }
}
