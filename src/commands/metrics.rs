// SPDX-License-Identifier: Apache-2.0

//! Metrics tool

use tablegate_core::AdminResult;

use super::ToolOutput;
use crate::metrics;

/// Process-wide tool call counters since start.
pub fn get_metrics() -> AdminResult<ToolOutput> {
    ToolOutput::new(&metrics::snapshot())
}
