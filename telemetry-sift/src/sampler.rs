// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::{BTreeSet, VecDeque},
    sync::Mutex,
};

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::anonymizer::Anonymizer;
use crate::signal::{LogEntry, MetricDataPoint, TraceSpan};

/// Buffer capacity multiplier over the per-kind sample cap.
const BUFFER_FACTOR: usize = 10;
const TIME_RANGE_LABEL: &str = "last-5m";

/// An anonymized, bounded snapshot of recent telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traces: Vec<TraceSpan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricDataPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntry>,
    #[serde(rename = "metadata")]
    pub meta: SampleMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub sample_size: usize,
    pub time_range: String,
    pub services: Vec<String>,
    #[serde(default = "Utc::now")]
    pub sampled_at: DateTime<Utc>,
    pub total_spans: usize,
    pub total_metrics: usize,
    pub total_logs: usize,
}

impl Sample {
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty() && self.metrics.is_empty() && self.logs.is_empty()
    }

    /// Pretty-printed JSON, the form interpolated into the advisory prompt.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Loads a sample captured earlier, e.g. by the dry-run CLI.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Default)]
struct Buffers {
    traces: VecDeque<TraceSpan>,
    metrics: VecDeque<MetricDataPoint>,
    logs: VecDeque<LogEntry>,
}

/// Buffers recent telemetry and draws anonymized uniform sub-samples.
///
/// Each per-kind buffer is FIFO-bounded at `max_sample_size * 10`; writers on
/// the data path and the recommendation loop's draw contend on one lock, and
/// a drawn [`Sample`] never shares storage with the buffers.
pub struct TelemetrySampler {
    max_sample_size: usize,
    buffer_max_size: usize,
    anonymizer: Anonymizer,
    buffers: Mutex<Buffers>,
    rng: Mutex<StdRng>,
}

impl TelemetrySampler {
    pub fn new(max_sample_size: usize) -> Self {
        Self::with_rng(max_sample_size, StdRng::from_entropy())
    }

    /// Same as [`new`](Self::new) with a caller-supplied RNG, so tests can
    /// seed the draw.
    pub fn with_rng(max_sample_size: usize, rng: StdRng) -> Self {
        Self {
            max_sample_size,
            buffer_max_size: max_sample_size.saturating_mul(BUFFER_FACTOR),
            anonymizer: Anonymizer::new(),
            buffers: Mutex::new(Buffers::default()),
            rng: Mutex::new(rng),
        }
    }

    pub fn max_sample_size(&self) -> usize {
        self.max_sample_size
    }

    pub fn buffer_traces(&self, traces: &[TraceSpan]) {
        let mut buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
        for span in traces {
            if buffers.traces.len() == self.buffer_max_size {
                buffers.traces.pop_front();
            }
            buffers.traces.push_back(span.clone());
        }
    }

    pub fn buffer_metrics(&self, metrics: &[MetricDataPoint]) {
        let mut buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
        for metric in metrics {
            if buffers.metrics.len() == self.buffer_max_size {
                buffers.metrics.pop_front();
            }
            buffers.metrics.push_back(metric.clone());
        }
    }

    pub fn buffer_logs(&self, logs: &[LogEntry]) {
        let mut buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
        for log in logs {
            if buffers.logs.len() == self.buffer_max_size {
                buffers.logs.pop_front();
            }
            buffers.logs.push_back(log.clone());
        }
    }

    /// Snapshot sizes of the three buffers: (traces, metrics, logs).
    pub fn buffered(&self) -> (usize, usize, usize) {
        let buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
        (
            buffers.traces.len(),
            buffers.metrics.len(),
            buffers.logs.len(),
        )
    }

    /// Draws a sample from the current buffer contents.
    ///
    /// Returns `None` when nothing is buffered; callers skip the cycle in
    /// that case.
    pub fn draw(&self) -> Option<Sample> {
        let (traces, metrics, logs) = {
            let buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
            if buffers.traces.is_empty() && buffers.metrics.is_empty() && buffers.logs.is_empty() {
                return None;
            }
            (
                buffers.traces.iter().cloned().collect::<Vec<_>>(),
                buffers.metrics.iter().cloned().collect::<Vec<_>>(),
                buffers.logs.iter().cloned().collect::<Vec<_>>(),
            )
        };
        Some(self.create_sample(traces, metrics, logs))
    }

    /// Samples each kind independently and assembles the metadata.
    pub fn create_sample(
        &self,
        traces: Vec<TraceSpan>,
        metrics: Vec<MetricDataPoint>,
        logs: Vec<LogEntry>,
    ) -> Sample {
        let total_spans = traces.len();
        let total_metrics = metrics.len();
        let total_logs = logs.len();

        let sampled_traces = self.sample_traces(traces);
        let sampled_metrics = self.sample_metrics(metrics);
        let sampled_logs = self.sample_logs(logs);

        let mut services = BTreeSet::new();
        for span in &sampled_traces {
            if !span.service.is_empty() {
                services.insert(span.service.clone());
            }
        }
        for log in &sampled_logs {
            if !log.service.is_empty() {
                services.insert(log.service.clone());
            }
        }

        let sample_size = sampled_traces.len() + sampled_metrics.len() + sampled_logs.len();
        Sample {
            traces: sampled_traces,
            metrics: sampled_metrics,
            logs: sampled_logs,
            meta: SampleMetadata {
                sample_size,
                time_range: TIME_RANGE_LABEL.to_string(),
                services: services.into_iter().collect(),
                sampled_at: Utc::now(),
                total_spans,
                total_metrics,
                total_logs,
            },
        }
    }

    /// Uniform selection without replacement, anonymized on the way out.
    pub fn sample_traces(&self, traces: Vec<TraceSpan>) -> Vec<TraceSpan> {
        let mut sampled = self.select(traces);
        for span in &mut sampled {
            self.anonymizer.anonymize_span(span);
        }
        sampled
    }

    pub fn sample_metrics(&self, metrics: Vec<MetricDataPoint>) -> Vec<MetricDataPoint> {
        let mut sampled = self.select(metrics);
        for metric in &mut sampled {
            self.anonymizer.anonymize_metric(metric);
        }
        sampled
    }

    pub fn sample_logs(&self, logs: Vec<LogEntry>) -> Vec<LogEntry> {
        let mut sampled = self.select(logs);
        for log in &mut sampled {
            self.anonymizer.anonymize_log(log);
        }
        sampled
    }

    fn select<T>(&self, items: Vec<T>) -> Vec<T> {
        if items.len() <= self.max_sample_size {
            return items;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let mut picked: Vec<usize> =
            rand::seq::index::sample(&mut *rng, items.len(), self.max_sample_size).into_vec();
        drop(rng);

        picked.sort_unstable();
        let mut picked = picked.into_iter().peekable();
        items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| {
                if picked.peek() == Some(&i) {
                    picked.next();
                    Some(item)
                } else {
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn trace(name: &str, service: &str) -> TraceSpan {
        TraceSpan {
            name: name.to_string(),
            service: service.to_string(),
            duration: std::time::Duration::from_millis(10),
            status: "OK".to_string(),
            attributes: HashMap::new(),
            resource_tags: HashMap::new(),
        }
    }

    fn log(message: &str, service: &str) -> LogEntry {
        LogEntry {
            level: "INFO".to_string(),
            message: message.to_string(),
            service: service.to_string(),
            timestamp: Utc::now(),
            attributes: HashMap::new(),
            resource_tags: HashMap::new(),
        }
    }

    fn seeded(max: usize) -> TelemetrySampler {
        TelemetrySampler::with_rng(max, StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_sampling_bound() {
        let sampler = seeded(3);
        let traces: Vec<_> = (0..10).map(|i| trace(&format!("span-{i}"), "svc")).collect();
        let sampled = sampler.sample_traces(traces);
        assert_eq!(sampled.len(), 3);

        let few: Vec<_> = (0..2).map(|i| trace(&format!("span-{i}"), "svc")).collect();
        assert_eq!(sampler.sample_traces(few).len(), 2);
    }

    #[test]
    fn test_sampling_is_roughly_uniform() {
        let sampler = seeded(1);
        let traces: Vec<_> = (0..10).map(|i| trace(&format!("span-{i}"), "svc")).collect();

        let mut counts = vec![0u32; 10];
        for _ in 0..2000 {
            let picked = sampler.sample_traces(traces.clone());
            let idx: usize = picked[0]
                .name
                .strip_prefix("span-")
                .unwrap()
                .parse()
                .unwrap();
            counts[idx] += 1;
        }

        // Expected frequency 200 per element; allow a generous band.
        for (idx, count) in counts.iter().enumerate() {
            assert!(
                (120..=280).contains(count),
                "element {idx} selected {count} times out of 2000"
            );
        }
    }

    #[test]
    fn test_buffer_eviction_keeps_newest_in_order() {
        let sampler = seeded(2); // cap = 20
        for i in 0..25 {
            sampler.buffer_traces(&[trace(&format!("span-{i}"), "svc")]);
        }
        let (traces, _, _) = sampler.buffered();
        assert_eq!(traces, 20);

        let buffers = sampler.buffers.lock().unwrap();
        let names: Vec<_> = buffers.traces.iter().map(|t| t.name.clone()).collect();
        let expected: Vec<_> = (5..25).map(|i| format!("span-{i}")).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_draw_empty_buffer_returns_none() {
        let sampler = seeded(5);
        assert!(sampler.draw().is_none());
    }

    #[test]
    fn test_draw_does_not_share_storage_with_buffer() {
        let sampler = seeded(5);
        sampler.buffer_traces(&[trace("a", "svc")]);
        let sample = sampler.draw().unwrap();
        sampler.buffer_traces(&[trace("b", "svc")]);
        assert_eq!(sample.traces.len(), 1);
        assert_eq!(sampler.buffered().0, 2);
    }

    #[test]
    fn test_create_sample_metadata() {
        let sampler = seeded(100);
        let traces = vec![trace("t", "checkout")];
        let logs = vec![log("hello", "payments"), log("bye", "checkout")];
        let sample = sampler.create_sample(traces, Vec::new(), logs);

        assert_eq!(sample.meta.total_spans, 1);
        assert_eq!(sample.meta.total_metrics, 0);
        assert_eq!(sample.meta.total_logs, 2);
        assert_eq!(sample.meta.sample_size, 3);
        assert_eq!(sample.meta.time_range, "last-5m");
        assert_eq!(sample.meta.services, vec!["checkout", "payments"]);
        assert!(sample.meta.total_spans >= sample.traces.len());
    }

    #[test]
    fn test_sampled_signals_are_anonymized() {
        let sampler = seeded(100);
        let mut span = trace("lookup", "svc");
        span.attributes
            .insert("user.email".to_string(), "joe@real.example".to_string());
        let sample = sampler.create_sample(vec![span], Vec::new(), Vec::new());
        assert_eq!(sample.traces[0].attributes["user.email"], "user@example.com");
    }

    #[test]
    fn test_sample_json_round_trip() {
        let sampler = seeded(100);
        let sample = sampler.create_sample(vec![trace("t", "svc")], Vec::new(), Vec::new());
        let json = sample.to_json().unwrap();
        let back = Sample::from_json(&json).unwrap();
        assert_eq!(back.traces.len(), 1);
        assert_eq!(back.meta.total_spans, 1);
    }
}
