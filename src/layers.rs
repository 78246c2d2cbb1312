// SPDX-License-Identifier: BSD-3-Clause
mod nanos;
pub use nanos::*;
