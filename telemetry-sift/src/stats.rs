// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Internal counters shared across the pipeline.
///
/// These never leave the process; the optional reporter task logs a snapshot
/// periodically, and operators can pull one through
/// [`Processor::stats`](crate::processor::Processor::stats).
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub traces_processed: AtomicU64,
    pub traces_dropped: AtomicU64,
    pub metrics_processed: AtomicU64,
    pub metrics_dropped: AtomicU64,
    pub logs_processed: AtomicU64,
    pub logs_dropped: AtomicU64,

    pub rules_installed: AtomicU64,
    pub rules_skipped: AtomicU64,
    pub rules_expired: AtomicU64,
    /// Evaluations that hit a rule with an unsupported condition shape
    pub unsupported_conditions: AtomicU64,

    pub cache_hits: AtomicU64,
    pub llm_requests: AtomicU64,
    pub transport_failures: AtomicU64,
    pub fallback_served: AtomicU64,

    pub cycles_run: AtomicU64,
    pub cycles_skipped_empty: AtomicU64,
    pub cycles_overrun: AtomicU64,

    pub policy_reloads: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub traces_processed: u64,
    pub traces_dropped: u64,
    pub metrics_processed: u64,
    pub metrics_dropped: u64,
    pub logs_processed: u64,
    pub logs_dropped: u64,
    pub rules_installed: u64,
    pub rules_skipped: u64,
    pub rules_expired: u64,
    pub unsupported_conditions: u64,
    pub cache_hits: u64,
    pub llm_requests: u64,
    pub transport_failures: u64,
    pub fallback_served: u64,
    pub cycles_run: u64,
    pub cycles_skipped_empty: u64,
    pub cycles_overrun: u64,
    pub policy_reloads: u64,
}

impl PipelineStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            traces_processed: load(&self.traces_processed),
            traces_dropped: load(&self.traces_dropped),
            metrics_processed: load(&self.metrics_processed),
            metrics_dropped: load(&self.metrics_dropped),
            logs_processed: load(&self.logs_processed),
            logs_dropped: load(&self.logs_dropped),
            rules_installed: load(&self.rules_installed),
            rules_skipped: load(&self.rules_skipped),
            rules_expired: load(&self.rules_expired),
            unsupported_conditions: load(&self.unsupported_conditions),
            cache_hits: load(&self.cache_hits),
            llm_requests: load(&self.llm_requests),
            transport_failures: load(&self.transport_failures),
            fallback_served: load(&self.fallback_served),
            cycles_run: load(&self.cycles_run),
            cycles_skipped_empty: load(&self.cycles_skipped_empty),
            cycles_overrun: load(&self.cycles_overrun),
            policy_reloads: load(&self.policy_reloads),
        }
    }
}
