// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod condition;

pub use condition::CompiledCondition;

use std::{
    collections::HashSet,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use crate::recommendation::FilterRule;
use crate::signal::Signal;
use crate::stats::PipelineStats;

struct ActiveRule {
    rule: FilterRule,
    condition: CompiledCondition,
    installed_at: Instant,
}

#[derive(Default)]
struct ActiveSet {
    rules: Vec<ActiveRule>,
    names: HashSet<String>,
}

/// Holds the active filter rules and evaluates signals against them.
///
/// Read-mostly: the data path takes the read lock per batch; installs,
/// clears and expiry sweeps take the write lock and never interleave with
/// each other, so readers always see a complete rule set.
pub struct FilterManager {
    active: RwLock<ActiveSet>,
    max_rules: usize,
    rule_ttl: Option<Duration>,
    stats: Arc<PipelineStats>,
}

impl FilterManager {
    pub fn new(max_rules: usize, rule_ttl: Option<Duration>, stats: Arc<PipelineStats>) -> Self {
        Self {
            active: RwLock::new(ActiveSet::default()),
            max_rules,
            rule_ttl,
            stats,
        }
    }

    /// Installs new rules, skipping duplicates and anything past the cap.
    /// Returns how many were admitted.
    pub fn install(&self, rules: &[FilterRule]) -> usize {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        let mut installed = 0;
        for rule in rules {
            if active.names.contains(&rule.name) {
                PipelineStats::incr(&self.stats.rules_skipped);
                continue;
            }
            if active.rules.len() >= self.max_rules {
                crate::sift_warn!("Maximum filter rules reached, skipping rule: {}", rule.name);
                PipelineStats::incr(&self.stats.rules_skipped);
                continue;
            }
            let condition = CompiledCondition::parse(&rule.condition);
            if !condition.is_supported() {
                crate::sift_warn!(
                    "Rule {} has unsupported condition, it will never match: {}",
                    rule.name,
                    rule.condition
                );
            }
            active.names.insert(rule.name.clone());
            active.rules.push(ActiveRule {
                rule: rule.clone(),
                condition,
                installed_at: Instant::now(),
            });
            installed += 1;
            PipelineStats::incr(&self.stats.rules_installed);
            crate::sift_info!("Installed filter rule: {}", rule.name);
        }
        installed
    }

    pub fn clear(&self) {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        active.rules.clear();
        active.names.clear();
        crate::sift_info!("Cleared all active filter rules");
    }

    /// True when some installed rule of the signal's kind matches, i.e. the
    /// signal should be dropped. Unsupported conditions fail closed.
    pub fn evaluate(&self, signal: &Signal<'_>) -> bool {
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());
        let kind = signal.kind();
        for entry in &active.rules {
            if entry.rule.signal_type != kind {
                continue;
            }
            if entry.condition == CompiledCondition::Unsupported {
                PipelineStats::incr(&self.stats.unsupported_conditions);
                continue;
            }
            if entry.condition.matches(signal) {
                return true;
            }
        }
        false
    }

    /// Removes rules older than the configured TTL. No-op without one.
    pub fn remove_expired(&self) -> usize {
        let Some(ttl) = self.rule_ttl else {
            return 0;
        };
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        let ActiveSet { rules, names } = &mut *active;
        let before = rules.len();
        let mut kept = Vec::with_capacity(before);
        for entry in rules.drain(..) {
            if entry.installed_at.elapsed() > ttl {
                names.remove(&entry.rule.name);
            } else {
                kept.push(entry);
            }
        }
        *rules = kept;
        let expired = before - rules.len();
        if expired > 0 {
            PipelineStats::add(&self.stats.rules_expired, expired as u64);
            crate::sift_info!("Expired {} filter rules", expired);
        }
        expired
    }

    /// Snapshot of the installed rules, in installation order.
    pub fn active_rules(&self) -> Vec<FilterRule> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .rules
            .iter()
            .map(|entry| entry.rule.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .rules
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
