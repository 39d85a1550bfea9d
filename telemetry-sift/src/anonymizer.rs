// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use regex::Regex;

use crate::signal::{LogEntry, MetricDataPoint, TraceSpan};

/// Redacts sensitive substrings before anything leaves the process.
///
/// Patterns are applied in a fixed order; the UUID rule must run before the
/// long-token rule, which would otherwise swallow UUID segments embedded in
/// longer runs.
pub struct Anonymizer {
    rules: Vec<(Regex, &'static str)>,
}

impl Default for Anonymizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Anonymizer {
    pub fn new() -> Self {
        let patterns: [(&str, &str); 7] = [
            (
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
                "user@example.com",
            ),
            (r"\b\d{3}-\d{2}-\d{4}\b", "XXX-XX-XXXX"),
            (
                r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b",
                "XXXX-XXXX-XXXX-XXXX",
            ),
            (r"\b(?:\d{1,3}\.){3}\d{1,3}\b", "XXX.XXX.XXX.XXX"),
            (r"\buser-\d+\b", "user-XXXXX"),
            (
                r"\b[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}\b",
                "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx",
            ),
            (r"\b[A-Za-z0-9]{20,}\b", "REDACTED_TOKEN"),
        ];

        let rules = patterns
            .iter()
            .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), *replacement))
            .collect();

        Self { rules }
    }

    /// Replaces every sensitive pattern occurrence in `input`.
    pub fn anonymize_str(&self, input: &str) -> String {
        let mut result = input.to_string();
        for (pattern, replacement) in &self.rules {
            result = pattern.replace_all(&result, *replacement).into_owned();
        }
        result
    }

    /// Anonymizes map values. Keys are metadata and stay untouched.
    pub fn anonymize_map(&self, input: &HashMap<String, String>) -> HashMap<String, String> {
        input
            .iter()
            .map(|(k, v)| (k.clone(), self.anonymize_str(v)))
            .collect()
    }

    pub fn anonymize_span(&self, span: &mut TraceSpan) {
        span.name = self.anonymize_str(&span.name);
        span.service = self.anonymize_str(&span.service);
        span.attributes = self.anonymize_map(&span.attributes);
        span.resource_tags = self.anonymize_map(&span.resource_tags);
    }

    pub fn anonymize_metric(&self, metric: &mut MetricDataPoint) {
        metric.name = self.anonymize_str(&metric.name);
        metric.labels = self.anonymize_map(&metric.labels);
        metric.resource_tags = self.anonymize_map(&metric.resource_tags);
    }

    pub fn anonymize_log(&self, log: &mut LogEntry) {
        log.message = self.anonymize_str(&log.message);
        log.service = self.anonymize_str(&log.service);
        log.attributes = self.anonymize_map(&log.attributes);
        log.resource_tags = self.anonymize_map(&log.resource_tags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_redacted() {
        let anonymizer = Anonymizer::new();
        let out = anonymizer.anonymize_str("contact alice.smith@corp.example.org for access");
        assert_eq!(out, "contact user@example.com for access");
    }

    #[test]
    fn test_ssn_and_card_redacted() {
        let anonymizer = Anonymizer::new();
        assert_eq!(
            anonymizer.anonymize_str("ssn 123-45-6789"),
            "ssn XXX-XX-XXXX"
        );
        assert_eq!(
            anonymizer.anonymize_str("card 4111-1111-1111-1111 on file"),
            "card XXXX-XXXX-XXXX-XXXX on file"
        );
    }

    #[test]
    fn test_ipv4_redacted() {
        let anonymizer = Anonymizer::new();
        assert_eq!(
            anonymizer.anonymize_str("peer 10.0.0.5 timed out"),
            "peer XXX.XXX.XXX.XXX timed out"
        );
    }

    #[test]
    fn test_user_id_redacted() {
        let anonymizer = Anonymizer::new();
        assert_eq!(
            anonymizer.anonymize_str("login for user-48213"),
            "login for user-XXXXX"
        );
    }

    #[test]
    fn test_uuid_redacted_before_token_rule() {
        let anonymizer = Anonymizer::new();
        let out = anonymizer.anonymize_str("request 6f1c0d9a-2b34-4c56-8d7e-9f0a1b2c3d4e done");
        assert_eq!(out, "request xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx done");
    }

    #[test]
    fn test_long_token_redacted() {
        let anonymizer = Anonymizer::new();
        let out = anonymizer.anonymize_str("bearer a1B2c3D4e5F6g7H8i9J0k1L2");
        assert_eq!(out, "bearer REDACTED_TOKEN");
    }

    #[test]
    fn test_map_values_redacted_keys_untouched() {
        let anonymizer = Anonymizer::new();
        let mut input = HashMap::new();
        input.insert("user.email".to_string(), "bob@example.net".to_string());
        input.insert("host.ip".to_string(), "192.168.1.1".to_string());

        let out = anonymizer.anonymize_map(&input);
        assert_eq!(out["user.email"], "user@example.com");
        assert_eq!(out["host.ip"], "XXX.XXX.XXX.XXX");
        assert!(out.contains_key("user.email"));
        assert!(out.contains_key("host.ip"));
    }

    #[test]
    fn test_no_original_sensitive_material_survives() {
        let anonymizer = Anonymizer::new();
        let input = "alice@real.example 203.0.113.9 user-99 123-45-6789 \
                     6f1c0d9a-2b34-4c56-8d7e-9f0a1b2c3d4e sk1234567890abcdefghij";
        let out = anonymizer.anonymize_str(input);
        for fragment in [
            "alice@real.example",
            "203.0.113.9",
            "user-99",
            "123-45-6789",
            "6f1c0d9a",
            "sk1234567890abcdefghij",
        ] {
            assert!(!out.contains(fragment), "{fragment} survived: {out}");
        }
    }

    #[test]
    fn test_anonymize_span_touches_all_string_surfaces() {
        let anonymizer = Anonymizer::new();
        let mut span = TraceSpan {
            name: "GET /users/user-7".to_string(),
            service: "billing".to_string(),
            duration: std::time::Duration::from_millis(1),
            status: "OK".to_string(),
            attributes: [("user.email".to_string(), "eve@mail.example".to_string())]
                .into_iter()
                .collect(),
            resource_tags: [("host.ip".to_string(), "10.1.2.3".to_string())]
                .into_iter()
                .collect(),
        };
        anonymizer.anonymize_span(&mut span);
        assert_eq!(span.name, "GET /users/user-XXXXX");
        assert_eq!(span.attributes["user.email"], "user@example.com");
        assert_eq!(span.resource_tags["host.ip"], "XXX.XXX.XXX.XXX");
    }
}
