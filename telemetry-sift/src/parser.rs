// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::Utc;
use regex::Regex;

use crate::error::{Error, Result};
use crate::recommendation::{
    FilterAction, FilterRule, ParsedRecommendations, Priority, Recommendation, RecommendationType,
    Summary,
};
use crate::signal::SignalType;

const HIGH_PRIORITY_KEYWORDS: &[&str] = &[
    "critical",
    "urgent",
    "high volume",
    "expensive",
    "security",
    "compliance",
];
const MEDIUM_PRIORITY_KEYWORDS: &[&str] = &["optimize", "improve", "reduce", "performance"];

/// Turns the advisory reply's free text into structured recommendations.
///
/// The reply is expected to carry four labeled sections (SIGNALS TO DROP,
/// LABEL POLICY VIOLATIONS, OTEL FILTER RULES, RATIONALE). Extraction is
/// text-based and forgiving: a missing or malformed section yields zero items
/// in that category, never an error. Only an entirely empty reply fails.
pub struct RecommendationParser {
    yaml_header: &'static str,
}

impl Default for RecommendationParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RecommendationParser {
    pub fn new() -> Self {
        Self {
            yaml_header: "# Generated OTel filter rules\n# Generated at: ",
        }
    }

    pub fn parse(&self, content: &str) -> Result<ParsedRecommendations> {
        if content.trim().is_empty() {
            return Err(Error::EmptyReply);
        }

        let mut recommendations = Vec::new();
        recommendations.extend(extract_itemized_section(
            content,
            "SIGNALS TO DROP",
            "drop",
            RecommendationType::DropSignal,
        ));
        recommendations.extend(extract_itemized_section(
            content,
            "LABEL POLICY VIOLATIONS",
            "policy",
            RecommendationType::LabelPolicy,
        ));

        // Rationale bullets pair up positionally with the recommendations
        // extracted above.
        for (rec, rationale) in recommendations
            .iter_mut()
            .zip(extract_bullets(section_text(content, "RATIONALE")))
        {
            rec.rationale = rationale;
        }

        let rules = extract_filter_rules(content);
        let unattached = attach_rules(&mut recommendations, rules);
        if !unattached.is_empty() {
            recommendations.push(Recommendation {
                id: format!("rules-{}", recommendations.len()),
                kind: RecommendationType::NoiseReduction,
                priority: Priority::Low,
                description: "Filter rules not tied to a specific recommendation".to_string(),
                rationale: String::new(),
                filter_rules: unattached,
                estimated_saving: String::new(),
                created_at: Utc::now(),
            });
        }

        let summary = Summary::for_recommendations(&recommendations);
        Ok(ParsedRecommendations {
            recommendations,
            summary,
            generated_at: Utc::now(),
        })
    }

    /// Renders a filter-processor YAML fragment from the given
    /// recommendations' rules, bucketed by signal type. Dry-run convenience,
    /// not used on the data path.
    pub fn generate_yaml_config(&self, recommendations: &[Recommendation]) -> String {
        let mut trace_filters = Vec::new();
        let mut metric_filters = Vec::new();
        let mut log_filters = Vec::new();

        for rec in recommendations {
            for rule in &rec.filter_rules {
                let line = format!("        - '{}'  # {}", rule.condition, rule.description);
                match rule.signal_type {
                    SignalType::Trace => trace_filters.push(line),
                    SignalType::Metric => metric_filters.push(line),
                    SignalType::Log => log_filters.push(line),
                }
            }
        }

        format!(
            "{header}{generated_at}\n\n\
             processors:\n\
            \x20 filter:\n\
            \x20   error_mode: ignore\n\
            \x20   traces:\n\
            \x20     span:\n{traces}\n\
            \x20   metrics:\n\
            \x20     metric:\n{metrics}\n\
            \x20   logs:\n\
            \x20     log_record:\n{logs}\n",
            header = self.yaml_header,
            generated_at = Utc::now().to_rfc3339(),
            traces = trace_filters.join("\n"),
            metrics = metric_filters.join("\n"),
            logs = log_filters.join("\n"),
        )
    }
}

/// Captures the body of a labeled section: everything after the heading up to
/// the next numbered heading or the end of the reply.
fn section_text<'a>(content: &'a str, section: &str) -> Option<&'a str> {
    let pattern = format!(r"(?is){}:?\s*\n(.*?)(?:\n\s*\d+\.|\z)", regex::escape(section));
    let re = Regex::new(&pattern).unwrap();
    re.captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn extract_bullets(text: Option<&str>) -> Vec<String> {
    let Some(text) = text else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            line.strip_prefix('-').map(|rest| rest.trim().to_string())
        })
        .filter(|line| !line.is_empty())
        .collect()
}

fn extract_itemized_section(
    content: &str,
    section: &str,
    id_prefix: &str,
    kind: RecommendationType,
) -> Vec<Recommendation> {
    extract_bullets(section_text(content, section))
        .into_iter()
        .enumerate()
        .map(|(i, description)| Recommendation {
            id: format!("{id_prefix}-{i}"),
            kind,
            priority: determine_priority(&description),
            description,
            rationale: String::new(),
            filter_rules: Vec::new(),
            estimated_saving: String::new(),
            created_at: Utc::now(),
        })
        .collect()
}

fn determine_priority(description: &str) -> Priority {
    let lowered = description.to_lowercase();
    if HIGH_PRIORITY_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        return Priority::High;
    }
    if MEDIUM_PRIORITY_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        return Priority::Medium;
    }
    Priority::Low
}

/// True for a bare YAML mapping header like `traces:` or `span:`.
fn is_yaml_header(line: &str) -> bool {
    matches!(
        line.to_lowercase().as_str(),
        "filter:" | "traces:" | "metrics:" | "logs:" | "span:" | "metric:" | "log_record:"
    )
}

/// Collects condition bullets from YAML-ish blocks anywhere in the reply and
/// wraps each into a drop rule. The signal type comes from probing the
/// condition text itself, not from the enclosing block.
fn extract_filter_rules(content: &str) -> Vec<FilterRule> {
    let mut rules = Vec::new();
    let mut in_block = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if is_yaml_header(trimmed) {
            in_block = true;
            continue;
        }
        let bullet = trimmed.strip_prefix("- ");
        match bullet {
            Some(raw) if in_block => {
                let condition = raw.trim().trim_matches(|c| c == '\'' || c == '"').to_string();
                if condition.is_empty() {
                    continue;
                }
                let signal_type = classify_condition(&condition);
                rules.push(FilterRule {
                    name: format!("rule-{}", rules.len()),
                    signal_type,
                    description: format!("Drop condition: {condition}"),
                    condition,
                    action: FilterAction::Drop,
                });
            }
            Some(_) => {}
            None => in_block = false,
        }
    }

    rules
}

fn classify_condition(condition: &str) -> SignalType {
    if condition.contains("span.") || condition.contains("trace.") {
        SignalType::Trace
    } else if condition.contains("metric.") {
        SignalType::Metric
    } else if condition.contains("log.") {
        SignalType::Log
    } else {
        SignalType::Trace
    }
}

/// Attaches each rule to every recommendation whose description shares a word
/// with the rule's condition; returns the rules that matched nothing.
fn attach_rules(
    recommendations: &mut [Recommendation],
    rules: Vec<FilterRule>,
) -> Vec<FilterRule> {
    let mut unattached = Vec::new();
    for rule in rules {
        let rule_words = words(&rule.condition);
        let mut attached = false;
        for rec in recommendations.iter_mut() {
            if words(&rec.description).iter().any(|w| rule_words.contains(w)) {
                rec.filter_rules.push(rule.clone());
                attached = true;
            }
        }
        if !attached {
            unattached.push(rule);
        }
    }
    unattached
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}
