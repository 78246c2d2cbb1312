// SPDX-License-Identifier: BSD-3-Clause
use std::path::PathBuf;

use tracing::level_filters::LevelFilter;

/// Buffer-capacity tracking over translation units
#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Assume any one caller's facts when callers disagree about a parameter
    #[arg(long)]
    pub assume_callers_agree: bool,

    /// Fact store, read before and written after the run
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Recognize kernel allocators and size helpers
    #[arg(long)]
    pub kernel: bool,

    /// Level of the tracing output
    #[arg(long, default_value_t = LevelFilter::TRACE)]
    pub level: LevelFilter,

    /// Quiet
    #[arg(long)]
    pub quiet: bool,

    /// Allocator signatures, extending the built-in ones
    #[arg(short, long)]
    pub signatures: Option<PathBuf>,

    /// Report nanoseconds spent per analyzed function
    #[arg(long)]
    pub timings: bool,

    /// Tracing
    #[arg(long)]
    pub tracing: bool,

    /// Translation units (JSON)
    #[arg(required = true)]
    pub units: Vec<PathBuf>,
}
