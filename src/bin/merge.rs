// SPDX-License-Identifier: BSD-3-Clause
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use bufcmp::{store, MemoryStore};

/// Merge per-file fact stores into one
#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Merged store; its current rows are merged first if it exists
    #[arg()]
    pub output: PathBuf,

    /// Stores to merge, later ones win for the files they cover
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut stores = vec![MemoryStore::load(&args.output)
        .with_context(|| format!("Couldn't load {}", args.output.display()))?];
    for path in &args.inputs {
        stores.push(
            MemoryStore::load(path).with_context(|| format!("Couldn't load {}", path.display()))?,
        );
    }
    let merged = store::merge(&stores);
    merged
        .save(&args.output)
        .with_context(|| format!("Couldn't save {}", args.output.display()))?;
    Ok(())
}
