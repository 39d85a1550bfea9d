// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signal::SignalType;

/// A typed suggestion produced from one advisory reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub priority: Priority,
    pub description: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub filter_rules: Vec<FilterRule>,
    #[serde(default)]
    pub estimated_saving: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    DropSignal,
    LabelPolicy,
    NoiseReduction,
    Optimization,
}

impl fmt::Display for RecommendationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            RecommendationType::DropSignal => "drop_signal",
            RecommendationType::LabelPolicy => "label_policy",
            RecommendationType::NoiseReduction => "noise_reduction",
            RecommendationType::Optimization => "optimization",
        };
        write!(f, "{kind}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let priority = match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        write!(f, "{priority}")
    }
}

/// A single drop rule evaluated against signals of a matching kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Unique within the active set; duplicates are skipped at install time
    pub name: String,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub condition: String,
    pub action: FilterAction,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    #[default]
    Drop,
}

impl fmt::Display for FilterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterAction::Drop => write!(f, "drop"),
        }
    }
}

/// Everything extracted from one advisory reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecommendations {
    pub recommendations: Vec<Recommendation>,
    pub summary: Summary,
    pub generated_at: DateTime<Utc>,
}

impl ParsedRecommendations {
    /// All rules carried by the recommendations, in order, first occurrence
    /// of each name wins.
    pub fn all_rules(&self) -> Vec<FilterRule> {
        let mut seen = std::collections::HashSet::new();
        let mut rules = Vec::new();
        for rec in &self.recommendations {
            for rule in &rec.filter_rules {
                if seen.insert(rule.name.clone()) {
                    rules.push(rule.clone());
                }
            }
        }
        rules
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_recommendations: usize,
    #[serde(default)]
    pub by_type: HashMap<RecommendationType, usize>,
    #[serde(default)]
    pub by_priority: HashMap<Priority, usize>,
    pub estimated_savings: String,
}

impl Summary {
    /// Histogram over a finished recommendation list.
    pub fn for_recommendations(recommendations: &[Recommendation]) -> Self {
        let mut by_type = HashMap::new();
        let mut by_priority = HashMap::new();
        for rec in recommendations {
            *by_type.entry(rec.kind).or_insert(0) += 1;
            *by_priority.entry(rec.priority).or_insert(0) += 1;
        }
        Summary {
            total_recommendations: recommendations.len(),
            by_type,
            by_priority,
            estimated_savings: "Unknown".to_string(),
        }
    }
}
