// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::OnceLock;

use regex::Regex;

use crate::signal::Signal;

/// A filter condition compiled once at install time.
///
/// The condition language is deliberately tiny: exact string equality against
/// a signal attribute or a resource tag, and absence checks against either.
/// Everything else compiles to [`Unsupported`](CompiledCondition::Unsupported),
/// which never matches, so an unrecognized rule keeps signals instead of
/// dropping them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledCondition {
    /// `attributes["K"] == "V"`
    AttributeEquals { key: String, value: String },
    /// `resource.attributes["K"] == "V"`
    ResourceEquals { key: String, value: String },
    /// `attributes["K"] == nil`
    AttributeAbsent { key: String },
    /// `resource.attributes["K"] == nil`
    ResourceAbsent { key: String },
    Unsupported,
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^attributes\["([^"]+)"\]\s*==\s*(?:"([^"]*)"|nil)$"#).unwrap()
    })
}

fn resource_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^resource\.attributes\["([^"]+)"\]\s*==\s*(?:"([^"]*)"|nil)$"#).unwrap()
    })
}

impl CompiledCondition {
    pub fn parse(condition: &str) -> Self {
        let condition = condition.trim();
        if let Some(caps) = attribute_re().captures(condition) {
            let key = caps[1].to_string();
            return match caps.get(2) {
                Some(value) => CompiledCondition::AttributeEquals {
                    key,
                    value: value.as_str().to_string(),
                },
                None => CompiledCondition::AttributeAbsent { key },
            };
        }
        if let Some(caps) = resource_re().captures(condition) {
            let key = caps[1].to_string();
            return match caps.get(2) {
                Some(value) => CompiledCondition::ResourceEquals {
                    key,
                    value: value.as_str().to_string(),
                },
                None => CompiledCondition::ResourceAbsent { key },
            };
        }
        CompiledCondition::Unsupported
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, CompiledCondition::Unsupported)
    }

    /// Whether the condition holds for the signal. Absence means the key is
    /// missing or maps to an empty string.
    pub fn matches(&self, signal: &Signal<'_>) -> bool {
        match self {
            CompiledCondition::AttributeEquals { key, value } => {
                signal.attribute(key) == Some(value.as_str())
            }
            CompiledCondition::ResourceEquals { key, value } => {
                signal.resource_tag(key) == Some(value.as_str())
            }
            CompiledCondition::AttributeAbsent { key } => {
                signal.attribute(key).map_or(true, str::is_empty)
            }
            CompiledCondition::ResourceAbsent { key } => {
                signal.resource_tag(key).map_or(true, str::is_empty)
            }
            CompiledCondition::Unsupported => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{LogEntry, TraceSpan};
    use std::collections::HashMap;

    fn span(attrs: &[(&str, &str)], tags: &[(&str, &str)]) -> TraceSpan {
        TraceSpan {
            name: "op".to_string(),
            service: "svc".to_string(),
            duration: std::time::Duration::from_millis(1),
            status: "OK".to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            resource_tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_parse_supported_shapes() {
        assert_eq!(
            CompiledCondition::parse(r#"attributes["level"] == "DEBUG""#),
            CompiledCondition::AttributeEquals {
                key: "level".to_string(),
                value: "DEBUG".to_string()
            }
        );
        assert_eq!(
            CompiledCondition::parse(r#"resource.attributes["environment"] == "prod""#),
            CompiledCondition::ResourceEquals {
                key: "environment".to_string(),
                value: "prod".to_string()
            }
        );
        assert_eq!(
            CompiledCondition::parse(r#"attributes["request.id"] == nil"#),
            CompiledCondition::AttributeAbsent {
                key: "request.id".to_string()
            }
        );
        assert_eq!(
            CompiledCondition::parse(r#"resource.attributes["environment"] == nil"#),
            CompiledCondition::ResourceAbsent {
                key: "environment".to_string()
            }
        );
    }

    #[test]
    fn test_parse_unsupported_shapes() {
        for condition in [
            r#"labels["cardinality"] > 1000"#,
            r#"attributes["level"] != "DEBUG""#,
            r#"span.duration > 1s"#,
            "",
        ] {
            assert_eq!(
                CompiledCondition::parse(condition),
                CompiledCondition::Unsupported,
                "{condition} should be unsupported"
            );
        }
    }

    #[test]
    fn test_attribute_equality_match() {
        let condition = CompiledCondition::parse(r#"attributes["http.method"] == "GET""#);
        let get = span(&[("http.method", "GET")], &[]);
        let post = span(&[("http.method", "POST")], &[]);
        assert!(condition.matches(&Signal::Trace(&get)));
        assert!(!condition.matches(&Signal::Trace(&post)));
    }

    #[test]
    fn test_resource_absence_match() {
        let condition = CompiledCondition::parse(r#"resource.attributes["environment"] == nil"#);
        let missing = span(&[], &[]);
        let empty = span(&[], &[("environment", "")]);
        let present = span(&[], &[("environment", "prod")]);
        assert!(condition.matches(&Signal::Trace(&missing)));
        assert!(condition.matches(&Signal::Trace(&empty)));
        assert!(!condition.matches(&Signal::Trace(&present)));
    }

    #[test]
    fn test_log_level_equality_uses_severity_field() {
        let condition = CompiledCondition::parse(r#"attributes["level"] == "DEBUG""#);
        let log = LogEntry {
            level: "DEBUG".to_string(),
            message: "m".to_string(),
            service: "svc".to_string(),
            timestamp: chrono::Utc::now(),
            attributes: HashMap::new(),
            resource_tags: HashMap::new(),
        };
        assert!(condition.matches(&Signal::Log(&log)));
    }

    #[test]
    fn test_unsupported_never_matches() {
        let condition = CompiledCondition::parse(r#"labels["cardinality"] > 1000"#);
        let any = span(&[("cardinality", "2000")], &[]);
        assert!(!condition.matches(&Signal::Trace(&any)));
    }
}
