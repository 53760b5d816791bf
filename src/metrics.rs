// SPDX-License-Identifier: Apache-2.0

//! Process-wide counters for tool calls and the audit pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct ToolMetrics {
    calls: AtomicU64,
    failed: AtomicU64,
    retryable: AtomicU64,
    timeouts: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_max_ms: AtomicU64,
    audit_dropped: AtomicU64,
    audit_written: AtomicU64,
    audit_failed: AtomicU64,
}

static TOOL_METRICS: OnceLock<ToolMetrics> = OnceLock::new();

fn metrics() -> &'static ToolMetrics {
    TOOL_METRICS.get_or_init(ToolMetrics::default)
}

/// Outcome class of a finished tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failed,
    Retryable,
    TimedOut,
}

pub fn record_call(duration_ms: f64, outcome: CallOutcome) {
    let duration_ms = duration_ms.max(0.0) as u64;
    let metrics = metrics();
    metrics.calls.fetch_add(1, Ordering::Relaxed);
    match outcome {
        CallOutcome::Success => {}
        CallOutcome::Failed => {
            metrics.failed.fetch_add(1, Ordering::Relaxed);
        }
        CallOutcome::Retryable => {
            metrics.failed.fetch_add(1, Ordering::Relaxed);
            metrics.retryable.fetch_add(1, Ordering::Relaxed);
        }
        CallOutcome::TimedOut => {
            metrics.failed.fetch_add(1, Ordering::Relaxed);
            metrics.timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }
    metrics
        .duration_total_ms
        .fetch_add(duration_ms, Ordering::Relaxed);

    let mut current = metrics.duration_max_ms.load(Ordering::Relaxed);
    while duration_ms > current {
        match metrics.duration_max_ms.compare_exchange(
            current,
            duration_ms,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(next) => current = next,
        }
    }
}

pub fn record_audit_dropped() {
    metrics().audit_dropped.fetch_add(1, Ordering::Relaxed);
}

pub fn record_audit_written() {
    metrics().audit_written.fetch_add(1, Ordering::Relaxed);
}

pub fn record_audit_failed() {
    metrics().audit_failed.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub calls: u64,
    pub failed: u64,
    pub retryable: u64,
    pub timeouts: u64,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<u64>,
    pub audit_written: u64,
    pub audit_dropped: u64,
    pub audit_failed: u64,
}

pub fn snapshot() -> MetricsSnapshot {
    let metrics = metrics();
    let calls = metrics.calls.load(Ordering::Relaxed);
    let duration_total = metrics.duration_total_ms.load(Ordering::Relaxed);
    let max_ms = metrics.duration_max_ms.load(Ordering::Relaxed);

    MetricsSnapshot {
        calls,
        failed: metrics.failed.load(Ordering::Relaxed),
        retryable: metrics.retryable.load(Ordering::Relaxed),
        timeouts: metrics.timeouts.load(Ordering::Relaxed),
        avg_ms: (calls > 0).then(|| duration_total as f64 / calls as f64),
        max_ms: (max_ms > 0).then_some(max_ms),
        audit_written: metrics.audit_written.load(Ordering::Relaxed),
        audit_dropped: metrics.audit_dropped.load(Ordering::Relaxed),
        audit_failed: metrics.audit_failed.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_move_by_outcome() {
        // Other tests share the globals; compare deltas only.
        let before = snapshot();

        record_call(12.0, CallOutcome::Success);
        record_call(3.0, CallOutcome::Retryable);
        record_call(5.0, CallOutcome::TimedOut);
        record_audit_dropped();

        let after = snapshot();
        assert!(after.calls >= before.calls + 3);
        assert!(after.failed >= before.failed + 2);
        assert!(after.retryable > before.retryable);
        assert!(after.timeouts > before.timeouts);
        assert!(after.audit_dropped > before.audit_dropped);
    }

    #[test]
    fn max_duration_only_grows() {
        record_call(987_654.0, CallOutcome::Success);
        assert!(snapshot().max_ms.unwrap_or_default() >= 987_654);
        record_call(1.0, CallOutcome::Success);
        assert!(snapshot().max_ms.unwrap_or_default() >= 987_654);
    }
}
