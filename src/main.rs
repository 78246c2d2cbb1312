// SPDX-License-Identifier: BSD-3-Clause
use std::collections::HashMap;
use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;

use tracing_subscriber::{fmt, prelude::*};

use bufcmp::{analyze, layers, FactStore, JsonStore, MemoryStore, Options, Signatures, Unit};

mod cli;

fn setup_global_subscriber(args: &cli::Args) {
    let fmt_layer = (args.tracing).then(|| fmt::Layer::default().with_writer(io::stderr));
    let nanos_layer = (args.timings).then(layers::NanoCountLayer::default);
    tracing_subscriber::registry()
        .with(args.level)
        .with(fmt_layer)
        .with(nanos_layer)
        .init();
}

fn signatures(args: &cli::Args) -> Result<Signatures> {
    let builtin = Signatures::builtin(args.kernel);
    let Some(path) = &args.signatures else {
        return Ok(builtin);
    };
    let signatures_string = std::fs::read_to_string(path)
        .with_context(|| format!("Couldn't read signatures at {}", path.display()))?;
    let user: HashMap<_, _> = serde_json::from_str(&signatures_string)
        .with_context(|| format!("Couldn't deserialize signatures at {}", path.display()))?;
    builtin
        .extend(user)
        .context("Couldn't construct signatures")
}

fn main() -> Result<()> {
    let args = cli::Args::parse();

    if args.tracing || args.timings {
        setup_global_subscriber(&args);
    }

    let signatures = signatures(&args)?;
    let opts = Options {
        assume_callers_agree: args.assume_callers_agree,
        kernel: args.kernel,
    };

    let mut json_store = match &args.db {
        Some(path) => Some(
            JsonStore::open(path)
                .with_context(|| format!("Couldn't open fact store at {}", path.display()))?,
        ),
        None => None,
    };
    let mut memory_store = MemoryStore::default();
    let store: &mut dyn FactStore = match json_store.as_mut() {
        Some(s) => s,
        None => &mut memory_store,
    };

    let mut stdout = io::stdout().lock();
    for path in &args.units {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Couldn't read translation unit at {}", path.display()))?;
        let unit = Unit::from_json(&text)
            .with_context(|| format!("Couldn't load translation unit at {}", path.display()))?;
        let diagnostics = analyze(&unit, store, &signatures, &opts);
        if !args.quiet {
            for d in &diagnostics {
                writeln!(stdout, "{}", d)?;
            }
        }
    }

    if let Some(s) = &json_store {
        s.save().context("Couldn't save fact store")?;
    }
    Ok(())
}
