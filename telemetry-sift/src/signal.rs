// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{collections::HashMap, fmt, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A simplified trace span as handed over by the ingestion layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceSpan {
    pub name: String,
    pub service: String,
    #[serde(with = "duration_ns")]
    pub duration: Duration,
    pub status: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub resource_tags: HashMap<String, String>,
}

/// A simplified metric data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDataPoint {
    pub name: String,
    pub value: f64,
    /// Instrument kind tag, e.g. "gauge", "counter", "histogram"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub resource_tags: HashMap<String, String>,
}

/// A simplified log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    pub service: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub resource_tags: HashMap<String, String>,
}

/// The kind of telemetry signal a filter rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Trace,
    Metric,
    Log,
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            SignalType::Trace => "trace",
            SignalType::Metric => "metric",
            SignalType::Log => "log",
        };
        write!(f, "{kind}")
    }
}

impl FromStr for SignalType {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("trace") {
            Ok(SignalType::Trace)
        } else if s.eq_ignore_ascii_case("metric") {
            Ok(SignalType::Metric)
        } else if s.eq_ignore_ascii_case("log") {
            Ok(SignalType::Log)
        } else {
            Err("signal type should be one of trace, metric, log")
        }
    }
}

/// Borrowed view over a single signal, used by the filter evaluator.
#[derive(Debug, Clone, Copy)]
pub enum Signal<'a> {
    Trace(&'a TraceSpan),
    Metric(&'a MetricDataPoint),
    Log(&'a LogEntry),
}

impl<'a> Signal<'a> {
    pub fn kind(&self) -> SignalType {
        match self {
            Signal::Trace(_) => SignalType::Trace,
            Signal::Metric(_) => SignalType::Metric,
            Signal::Log(_) => SignalType::Log,
        }
    }

    /// Looks up a signal-level attribute.
    ///
    /// Metric labels play the attribute role for metrics. A log's severity is
    /// addressable as the "level" attribute even when the attribute map does
    /// not carry it explicitly.
    pub fn attribute(&self, key: &str) -> Option<&'a str> {
        match self {
            Signal::Trace(span) => span.attributes.get(key).map(String::as_str),
            Signal::Metric(metric) => metric.labels.get(key).map(String::as_str),
            Signal::Log(log) => match log.attributes.get(key) {
                Some(value) => Some(value.as_str()),
                None if key == "level" => Some(log.level.as_str()),
                None => None,
            },
        }
    }

    pub fn resource_tag(&self, key: &str) -> Option<&'a str> {
        let tags = match self {
            Signal::Trace(span) => &span.resource_tags,
            Signal::Metric(metric) => &metric.resource_tags,
            Signal::Log(log) => &log.resource_tags,
        };
        tags.get(key).map(String::as_str)
    }

    pub fn service(&self) -> Option<&'a str> {
        match self {
            Signal::Trace(span) => Some(span.service.as_str()),
            Signal::Metric(_) => None,
            Signal::Log(log) => Some(log.service.as_str()),
        }
    }
}

/// Span durations travel as integer nanoseconds on the wire.
mod duration_ns {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_with(attrs: &[(&str, &str)], tags: &[(&str, &str)]) -> TraceSpan {
        TraceSpan {
            name: "op".to_string(),
            service: "svc".to_string(),
            duration: Duration::from_millis(5),
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
    fn test_signal_attribute_lookup() {
        let span = span_with(&[("http.method", "GET")], &[("environment", "prod")]);
        let signal = Signal::Trace(&span);
        assert_eq!(signal.attribute("http.method"), Some("GET"));
        assert_eq!(signal.attribute("missing"), None);
        assert_eq!(signal.resource_tag("environment"), Some("prod"));
        assert_eq!(signal.kind(), SignalType::Trace);
    }

    #[test]
    fn test_log_level_is_addressable_as_attribute() {
        let log = LogEntry {
            level: "DEBUG".to_string(),
            message: "m".to_string(),
            service: "svc".to_string(),
            timestamp: Utc::now(),
            attributes: HashMap::new(),
            resource_tags: HashMap::new(),
        };
        let signal = Signal::Log(&log);
        assert_eq!(signal.attribute("level"), Some("DEBUG"));
    }

    #[test]
    fn test_span_duration_round_trips_as_nanos() {
        let span = span_with(&[], &[]);
        let json = serde_json::to_value(&span).unwrap();
        assert_eq!(json["duration"], serde_json::json!(5_000_000));
        let back: TraceSpan = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(5));
    }

    #[test]
    fn test_signal_type_strings() {
        assert_eq!(SignalType::from_str("TRACE").unwrap(), SignalType::Trace);
        assert_eq!(SignalType::Log.to_string(), "log");
        assert!(SignalType::from_str("span").is_err());
    }
}
