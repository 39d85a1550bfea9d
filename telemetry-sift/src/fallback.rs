// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use chrono::Utc;

use crate::recommendation::{
    FilterAction, FilterRule, ParsedRecommendations, Priority, Recommendation, RecommendationType,
    Summary,
};
use crate::signal::SignalType;

/// The built-in recommendation set served when the advisory endpoint is
/// unreachable and fallback is enabled. Deliberately small and conservative.
pub fn static_recommendations() -> ParsedRecommendations {
    let recommendations = vec![
        Recommendation {
            id: "static-1".to_string(),
            kind: RecommendationType::DropSignal,
            priority: Priority::Medium,
            description: "Drop debug level logs to reduce noise".to_string(),
            rationale: "Debug logs are typically high volume and low value in production"
                .to_string(),
            filter_rules: vec![FilterRule {
                name: "drop-debug-logs".to_string(),
                signal_type: SignalType::Log,
                condition: r#"attributes["level"] == "DEBUG""#.to_string(),
                action: FilterAction::Drop,
                description: "Drop debug level logs".to_string(),
            }],
            estimated_saving: String::new(),
            created_at: Utc::now(),
        },
        Recommendation {
            id: "static-2".to_string(),
            kind: RecommendationType::LabelPolicy,
            priority: Priority::High,
            description: "Enforce environment label presence".to_string(),
            rationale: "Environment labels are required for proper data organization".to_string(),
            filter_rules: vec![FilterRule {
                name: "require-environment-label".to_string(),
                signal_type: SignalType::Trace,
                condition: r#"resource.attributes["environment"] == nil"#.to_string(),
                action: FilterAction::Drop,
                description: "Drop spans without environment label".to_string(),
            }],
            estimated_saving: String::new(),
            created_at: Utc::now(),
        },
    ];

    let summary = Summary {
        total_recommendations: recommendations.len(),
        by_type: HashMap::from([
            (RecommendationType::DropSignal, 1),
            (RecommendationType::LabelPolicy, 1),
        ]),
        by_priority: HashMap::from([(Priority::High, 1), (Priority::Medium, 1)]),
        estimated_savings: "10-20%".to_string(),
    };

    ParsedRecommendations {
        recommendations,
        summary,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_set_shape() {
        let parsed = static_recommendations();
        assert_eq!(parsed.recommendations.len(), 2);
        assert_eq!(parsed.summary.total_recommendations, 2);
        assert_eq!(parsed.summary.estimated_savings, "10-20%");

        let drop_logs = &parsed.recommendations[0];
        assert_eq!(drop_logs.id, "static-1");
        assert_eq!(drop_logs.kind, RecommendationType::DropSignal);
        assert_eq!(drop_logs.priority, Priority::Medium);
        assert_eq!(drop_logs.filter_rules[0].signal_type, SignalType::Log);
        assert_eq!(
            drop_logs.filter_rules[0].condition,
            r#"attributes["level"] == "DEBUG""#
        );

        let require_env = &parsed.recommendations[1];
        assert_eq!(require_env.id, "static-2");
        assert_eq!(require_env.kind, RecommendationType::LabelPolicy);
        assert_eq!(require_env.priority, Priority::High);
        assert_eq!(require_env.filter_rules[0].signal_type, SignalType::Trace);
        assert_eq!(
            require_env.filter_rules[0].condition,
            r#"resource.attributes["environment"] == nil"#
        );
    }
}
