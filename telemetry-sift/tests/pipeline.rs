// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios exercising the processor, recommender and policy
//! manager together through stubbed advisory clients.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use telemetry_sift::parser::RecommendationParser;
use telemetry_sift::policy::{LabelPolicy, PolicyManager};
use telemetry_sift::recommender::Recommender;
use telemetry_sift::stats::PipelineStats;
use telemetry_sift::{
    AdvisoryClient, Config, FilterAction, FilterRule, Priority, Processor, RecommendationType,
    SignalType, TelemetrySampler, TraceSpan, TransportError,
};

const CANONICAL_REPLY: &str = r#"
1. SIGNALS TO DROP:
   - Drop debug level logs to reduce noise
   - Remove metrics with high volume labels

2. LABEL POLICY VIOLATIONS:
   - Spans missing environment labels violate compliance policy

3. OTEL FILTER RULES:
   traces:
     span:
       - 'attributes["level"] == "DEBUG"'
       - 'resource.attributes["environment"] == nil'

4. RATIONALE:
   - Debug logs consume storage with minimal value
   - Environment labels are required for data organization
"#;

/// Records every request and plays back a fixed reply.
struct RecordingClient {
    calls: AtomicUsize,
    telemetry_json: Mutex<Vec<String>>,
    policy_summaries: Mutex<Vec<Vec<String>>>,
    reply: Result<String, ()>,
}

impl RecordingClient {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            telemetry_json: Mutex::new(Vec::new()),
            policy_summaries: Mutex::new(Vec::new()),
            reply: Ok(reply.to_string()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            telemetry_json: Mutex::new(Vec::new()),
            policy_summaries: Mutex::new(Vec::new()),
            reply: Err(()),
        })
    }
}

#[async_trait]
impl AdvisoryClient for RecordingClient {
    async fn recommend(
        &self,
        telemetry_json: &str,
        policy_summaries: &[String],
    ) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.telemetry_json
            .lock()
            .unwrap()
            .push(telemetry_json.to_string());
        self.policy_summaries
            .lock()
            .unwrap()
            .push(policy_summaries.to_vec());
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(()) => Err(TransportError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            }),
        }
    }

    async fn validate_connection(&self) -> Result<(), TransportError> {
        match &self.reply {
            Ok(_) => Ok(()),
            Err(()) => Err(TransportError::Request("unreachable".to_string())),
        }
    }
}

fn trace_with_tags(name: &str, tags: &[(&str, &str)]) -> TraceSpan {
    TraceSpan {
        name: name.to_string(),
        service: "checkout".to_string(),
        duration: Duration::from_millis(3),
        status: "OK".to_string(),
        attributes: HashMap::new(),
        resource_tags: tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn quiet_config() -> Config {
    Config::builder()
        .set_api_key("test-key".to_string())
        .set_enable_rate_limit(false)
        .set_log_level(telemetry_sift::log::LogLevelFilter::Error)
        .build()
}

// E2E-1: a trace rule on environment absence drops exactly the untagged span.
#[test]
fn drop_by_policy_rule() {
    let processor =
        Processor::with_client(quiet_config(), RecordingClient::replying(CANONICAL_REPLY))
            .unwrap();
    processor.install_filters(&[FilterRule {
        name: "require-env".to_string(),
        signal_type: SignalType::Trace,
        condition: r#"resource.attributes["environment"] == nil"#.to_string(),
        action: FilterAction::Drop,
        description: String::new(),
    }]);

    let kept = processor.process_traces(vec![
        trace_with_tags("a", &[("environment", "prod")]),
        trace_with_tags("b", &[]),
        trace_with_tags("c", &[("environment", "dev")]),
    ]);

    let names: Vec<_> = kept.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["a", "c"]);
}

// E2E-2: the canonical four-section reply parses into typed recommendations
// with rules, priorities and rationales.
#[test]
fn parser_round_trip_surfaces() {
    let parser = RecommendationParser::new();
    let parsed = parser.parse(CANONICAL_REPLY).unwrap();

    assert!(parsed.recommendations.len() >= 2);
    assert!(parsed
        .recommendations
        .iter()
        .any(|r| r.kind == RecommendationType::DropSignal));
    assert!(parsed
        .recommendations
        .iter()
        .any(|r| r.kind == RecommendationType::LabelPolicy));

    let trace_rules: Vec<_> = parsed
        .all_rules()
        .into_iter()
        .filter(|r| r.signal_type == SignalType::Trace)
        .collect();
    assert!(trace_rules.len() >= 2);
    assert!(trace_rules
        .iter()
        .any(|r| r.condition == r#"attributes["level"] == "DEBUG""#));

    for rec in parsed
        .recommendations
        .iter()
        .filter(|r| r.kind != RecommendationType::NoiseReduction)
    {
        assert!(
            matches!(rec.priority, Priority::Medium | Priority::High),
            "{} has priority {}",
            rec.id,
            rec.priority
        );
    }

    assert_eq!(
        parsed.recommendations[0].rationale,
        "Debug logs consume storage with minimal value"
    );
    assert_eq!(
        parsed.recommendations[1].rationale,
        "Environment labels are required for data organization"
    );
    assert_eq!(
        parsed.summary.total_recommendations,
        parsed.recommendations.len()
    );
}

// E2E-3: two recommendation cycles over the same sample hit the advisory
// endpoint once and return the identical object.
#[tokio::test]
async fn cache_hit_reuses_first_reply() {
    let client = RecordingClient::replying(CANONICAL_REPLY);
    let recommender = Recommender::new(
        &quiet_config(),
        client.clone(),
        Arc::new(PipelineStats::default()),
    );
    let cancel = CancellationToken::new();

    let sampler = TelemetrySampler::new(10);
    let sample = sampler.create_sample(
        vec![trace_with_tags("a", &[("environment", "prod")])],
        Vec::new(),
        Vec::new(),
    );

    let first = recommender.recommend(&sample, &[], &cancel).await.unwrap();
    let second = recommender.recommend(&sample, &[], &cancel).await.unwrap();

    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&first, &second));
}

// E2E-4: with rpm=2 the third call blocks for a refill instead of erroring.
#[tokio::test(start_paused = true)]
async fn rate_limit_blocks_instead_of_failing() {
    let client = RecordingClient::replying(CANONICAL_REPLY);
    let config = Config::builder()
        .set_api_key("test-key".to_string())
        .set_enable_cache(false)
        .set_rate_limit_rpm(2)
        .set_log_level(telemetry_sift::log::LogLevelFilter::Error)
        .build();
    let recommender = Recommender::new(&config, client.clone(), Arc::new(PipelineStats::default()));
    let cancel = CancellationToken::new();
    tokio::spawn(recommender.refill_task(cancel.clone()));

    let sampler = TelemetrySampler::new(10);
    let mut waits = Vec::new();
    for i in 0..3usize {
        let sample = sampler.create_sample(
            vec![trace_with_tags(&format!("t-{i}"), &[])],
            Vec::new(),
            Vec::new(),
        );
        let before = tokio::time::Instant::now();
        recommender.recommend(&sample, &[], &cancel).await.unwrap();
        waits.push(tokio::time::Instant::now() - before);
    }

    assert!(waits[0] < Duration::from_secs(1));
    assert!(waits[1] < Duration::from_secs(1));
    assert!(
        waits[2] >= Duration::from_secs(25),
        "third call should wait for a refill, waited {:?}",
        waits[2]
    );
    assert_eq!(client.calls.load(Ordering::SeqCst), 3);
}

// E2E-5: editing the policy file is observed within a reload check, and the
// new policy reaches the advisory prompt.
#[tokio::test]
async fn policy_hot_reload_reaches_prompt() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        b"policies:\n  - name: policy-a\n    required_labels: [environment]\n    enforcement: drop\n",
    )
    .unwrap();
    file.flush().unwrap();

    let manager = PolicyManager::new(Some(file.path().to_path_buf()), None);
    manager.load().unwrap();
    assert_eq!(manager.current().len(), 1);

    std::fs::write(
        file.path(),
        "policies:\n  - name: policy-a\n    required_labels: [environment]\n    enforcement: drop\n  - name: policy-b\n    forbidden_labels: [debug]\n    enforcement: warn\n",
    )
    .unwrap();
    std::fs::OpenOptions::new()
        .write(true)
        .open(file.path())
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(2))
        .unwrap();

    assert!(manager.reload_if_changed());
    let policies = manager.current();
    let names: Vec<_> = policies.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["policy-a", "policy-b"]);

    let client = RecordingClient::replying(CANONICAL_REPLY);
    let recommender = Recommender::new(
        &quiet_config(),
        client.clone(),
        Arc::new(PipelineStats::default()),
    );
    let sampler = TelemetrySampler::new(10);
    let sample = sampler.create_sample(vec![trace_with_tags("a", &[])], Vec::new(), Vec::new());
    recommender
        .recommend(&sample, &policies, &CancellationToken::new())
        .await
        .unwrap();

    let captured = client.policy_summaries.lock().unwrap();
    assert!(captured[0].iter().any(|s| s.contains("policy-a")));
    assert!(captured[0].iter().any(|s| s.contains("policy-b")));
}

// E2E-6: sensitive attribute values never reach the advisory client.
#[test]
fn anonymization_happens_before_egress() {
    let client = RecordingClient::replying(CANONICAL_REPLY);
    let config = Config::builder()
        .set_api_key("test-key".to_string())
        .set_enable_rate_limit(false)
        .set_sampling_interval(Duration::from_millis(50))
        .set_log_level(telemetry_sift::log::LogLevelFilter::Error)
        .build();
    let processor = Processor::with_client(config, client.clone()).unwrap();

    let mut span = trace_with_tags("lookup", &[("host.ip", "10.0.0.5")]);
    span.attributes
        .insert("user.email".to_string(), "alice@example.com".to_string());

    processor.start(CancellationToken::new()).unwrap();
    processor.process_traces(vec![span]);

    let deadline = Instant::now() + Duration::from_secs(2);
    while client.calls.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    processor.stop();

    let captured = client.telemetry_json.lock().unwrap();
    assert!(!captured.is_empty(), "no advisory call was captured");
    for json in captured.iter() {
        assert!(!json.contains("alice@example.com"), "email leaked: {json}");
        assert!(!json.contains("10.0.0.5"), "ip leaked: {json}");
    }
    assert!(captured[0].contains("user@example.com"));
    assert!(captured[0].contains("XXX.XXX.XXX.XXX"));
}

// Fallback substitution end to end: a dead endpoint with fallback enabled
// installs exactly the static rules.
#[test]
fn fallback_installs_static_rules() {
    let config = Config::builder()
        .set_api_key("test-key".to_string())
        .set_enable_rate_limit(false)
        .set_fallback_to_static(true)
        .set_sampling_interval(Duration::from_millis(50))
        .set_log_level(telemetry_sift::log::LogLevelFilter::Error)
        .build();
    let processor = Processor::with_client(config, RecordingClient::failing()).unwrap();

    processor.start(CancellationToken::new()).unwrap();
    processor.process_traces(vec![trace_with_tags("a", &[("environment", "prod")])]);

    let deadline = Instant::now() + Duration::from_secs(2);
    while processor.get_active_filters().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    processor.stop();

    let names: Vec<_> = processor
        .get_active_filters()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["drop-debug-logs", "require-environment-label"]);
    assert!(processor.stats().fallback_served >= 1);

    // The installed static rules act on the data path immediately
    let kept = processor.process_traces(vec![
        trace_with_tags("tagged", &[("environment", "prod")]),
        trace_with_tags("untagged", &[]),
    ]);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].name, "tagged");
}
