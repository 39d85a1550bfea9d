// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-pipeline telemetry filter processor driven by LLM advisory
//! recommendations.
//!
//! The [`Processor`] sits between ingestion and export: batches handed to
//! `process_traces` / `process_metrics` / `process_logs` are buffered for
//! sampling, filtered against the active rule set, and returned. A background
//! loop periodically draws an anonymized [`sampler::Sample`], asks an LLM
//! advisory endpoint what to drop and which label policies are violated,
//! parses the reply into [`recommendation::FilterRule`]s, and installs them.

pub mod anonymizer;
pub mod cache;
pub mod client;
pub mod configuration;
pub mod fallback;
pub mod filter;
pub mod log;
pub mod parser;
pub mod policy;
pub mod processor;
pub mod rate_limit;
pub mod recommendation;
pub mod recommender;
pub mod sampler;
pub mod signal;
pub mod stats;
pub mod utils;

mod error;

pub use client::{AdvisoryClient, HttpAdvisoryClient, TransportError};
pub use configuration::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use processor::Processor;
pub use recommendation::{
    FilterAction, FilterRule, ParsedRecommendations, Priority, Recommendation, RecommendationType,
    Summary,
};
pub use sampler::{Sample, SampleMetadata, TelemetrySampler};
pub use signal::{LogEntry, MetricDataPoint, Signal, SignalType, TraceSpan};
