// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dry-run companion for the sift processor. Lets operators run a captured
//! telemetry sample through the recommendation engine, validate connectivity
//! and policy documents, and exercise the local pipeline pieces without
//! touching a live pipeline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use telemetry_sift::anonymizer::Anonymizer;
use telemetry_sift::parser::RecommendationParser;
use telemetry_sift::policy::{parse_and_validate, LabelPolicy};
use telemetry_sift::recommender::Recommender;
use telemetry_sift::stats::PipelineStats;
use telemetry_sift::{
    Config, HttpAdvisoryClient, LogEntry, MetricDataPoint, Priority, Sample, TelemetrySampler,
    TraceSpan,
};

#[derive(Parser)]
#[command(
    name = "sift",
    about = "Dry-run CLI for the sift recommendation engine",
    version
)]
struct Cli {
    /// Advisory API key (or set SIFT_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Enable verbose output
    #[arg(long, global = true)]
    verbose: bool,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate recommendations for a captured telemetry sample
    Recommend {
        /// Path to a telemetry sample JSON file
        #[arg(long)]
        sample: PathBuf,
        /// Path to a policies YAML file
        #[arg(long)]
        policies: Option<PathBuf>,
        /// Write recommendations to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Maximum number of samples to analyze per kind
        #[arg(long, default_value_t = 100)]
        max_samples: usize,
        /// Also emit the filter-processor YAML fragment
        #[arg(long)]
        yaml: bool,
    },
    /// Validate the advisory endpoint connection
    Validate,
    /// Run local test scenarios against the engine pieces
    Test {
        /// Optional sample file to run through the scenarios
        #[arg(long)]
        sample: Option<PathBuf>,
    },
    /// Manage label policies
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum PolicyCommand {
    /// Validate a policy document
    Validate {
        #[arg(long)]
        policies: PathBuf,
    },
    /// Check a sample's traces against a policy document
    Test {
        #[arg(long)]
        policies: Option<PathBuf>,
        #[arg(long)]
        sample: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;

    match cli.command {
        Command::Recommend {
            ref sample,
            ref policies,
            ref output,
            max_samples,
            yaml,
        } => runtime.block_on(recommend(
            &cli,
            sample,
            policies.as_ref(),
            output.as_ref(),
            max_samples,
            yaml,
        )),
        Command::Validate => runtime.block_on(validate(&cli)),
        Command::Test { ref sample } => runtime.block_on(test_scenarios(&cli, sample.as_ref())),
        Command::Policy { ref command } => policy_command(command),
        Command::Version => {
            println!("sift {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn build_config(cli: &Cli, max_samples: usize) -> anyhow::Result<Config> {
    let mut builder = Config::builder();
    if let Some(api_key) = &cli.api_key {
        builder.set_api_key(api_key.clone());
    }
    let config = builder
        .set_max_sample_size(max_samples)
        // One-shot runs should neither reuse nor poison a cache
        .set_enable_cache(false)
        .set_enable_rate_limit(true)
        .set_fallback_to_static(true)
        .build();
    if config.api_key().is_empty() {
        bail!(
            "API key is required. Set --api-key or the {} environment variable",
            telemetry_sift::configuration::API_KEY_ENV
        );
    }
    Ok(config)
}

fn load_policies(path: Option<&PathBuf>, verbose: bool) -> anyhow::Result<Vec<LabelPolicy>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    if verbose {
        println!("Loading policies from: {}", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read policies file {}", path.display()))?;
    parse_and_validate(&text).context("failed to validate policies")
}

fn load_sample(path: &PathBuf, verbose: bool) -> anyhow::Result<Sample> {
    if verbose {
        println!("Reading sample file: {}", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read sample file {}", path.display()))?;
    Sample::from_json(&text).context("failed to parse sample data")
}

async fn recommend(
    cli: &Cli,
    sample_path: &PathBuf,
    policies_path: Option<&PathBuf>,
    output: Option<&PathBuf>,
    max_samples: usize,
    yaml: bool,
) -> anyhow::Result<()> {
    let config = build_config(cli, max_samples)?;
    let sample = load_sample(sample_path, cli.verbose)?;
    let policies = load_policies(policies_path, cli.verbose)?;

    let client = Arc::new(HttpAdvisoryClient::new(&config)?);
    let recommender = Recommender::new(&config, client, Arc::new(PipelineStats::default()));
    let cancel = CancellationToken::new();
    tokio::spawn(recommender.refill_task(cancel.clone()));

    if cli.verbose {
        println!("Generating recommendations...");
    }
    let parsed = tokio::time::timeout(
        Duration::from_secs(cli.timeout),
        recommender.recommend(&sample, &policies, &cancel),
    )
    .await
    .context("recommendation request timed out")??;

    let rendered =
        serde_json::to_string_pretty(&*parsed).context("failed to render recommendations")?;
    match output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("failed to write output file {}", path.display()))?;
            println!("Recommendations written to: {}", path.display());
        }
        None => println!("{rendered}"),
    }

    if yaml {
        let parser = RecommendationParser::new();
        println!("{}", parser.generate_yaml_config(&parsed.recommendations));
    }

    if cli.verbose {
        let summary = &parsed.summary;
        println!();
        println!("Summary:");
        println!("  Total recommendations: {}", summary.total_recommendations);
        for priority in [Priority::High, Priority::Medium, Priority::Low] {
            println!(
                "  {priority} priority: {}",
                summary.by_priority.get(&priority).copied().unwrap_or(0)
            );
        }
        println!("  Estimated savings: {}", summary.estimated_savings);
    }

    Ok(())
}

async fn validate(cli: &Cli) -> anyhow::Result<()> {
    let config = build_config(cli, 100)?;
    let client = HttpAdvisoryClient::new(&config)?;

    if cli.verbose {
        println!("Validating advisory endpoint connection...");
    }
    tokio::time::timeout(
        Duration::from_secs(cli.timeout),
        telemetry_sift::AdvisoryClient::validate_connection(&client),
    )
    .await
    .context("validation request timed out")?
    .context("API validation failed")?;

    println!("Advisory endpoint connection validated successfully");
    Ok(())
}

async fn test_scenarios(cli: &Cli, sample_path: Option<&PathBuf>) -> anyhow::Result<()> {
    println!("Running test scenarios...");
    let mut failed = false;

    println!("\n1. Testing data anonymization...");
    let anonymizer = Anonymizer::new();
    let anonymized =
        anonymizer.anonymize_str("User email: john.doe@example.com, IP: 192.168.1.1");
    report(
        &mut failed,
        !anonymized.contains("john.doe@example.com") && !anonymized.contains("192.168.1.1"),
        "Sensitive values are redacted",
    );

    println!("\n2. Testing telemetry sampling...");
    let sample = match sample_path {
        Some(path) => load_sample(path, cli.verbose)?,
        None => built_in_sample(),
    };
    let sampler = TelemetrySampler::new(10);
    let resampled = sampler.create_sample(
        sample.traces.clone(),
        sample.metrics.clone(),
        sample.logs.clone(),
    );
    report(
        &mut failed,
        resampled.meta.total_spans == sample.traces.len()
            && resampled.traces.len() <= 10
            && !resampled.is_empty(),
        "Sampling respects the per-kind bound",
    );

    println!("\n3. Testing reply parsing...");
    let parser = RecommendationParser::new();
    let reply = "\n1. SIGNALS TO DROP:\n   - Drop debug level logs to reduce noise\n\n\
                 3. OTEL FILTER RULES:\n   logs:\n     log_record:\n       - 'attributes[\"level\"] == \"DEBUG\"'\n";
    match parser.parse(reply) {
        Ok(parsed) => report(
            &mut failed,
            !parsed.recommendations.is_empty() && !parsed.all_rules().is_empty(),
            "Reply parses into recommendations and rules",
        ),
        Err(err) => report(&mut failed, false, &format!("Reply failed to parse: {err}")),
    }

    // Only probe the network when credentials are available
    match build_config(cli, 10) {
        Ok(config) => {
            println!("\n4. Testing advisory endpoint connectivity...");
            let client = HttpAdvisoryClient::new(&config)?;
            let result = tokio::time::timeout(
                Duration::from_secs(cli.timeout),
                telemetry_sift::AdvisoryClient::validate_connection(&client),
            )
            .await;
            match result {
                Ok(Ok(())) => report(&mut failed, true, "Connection validated"),
                Ok(Err(err)) => report(&mut failed, false, &format!("Connection failed: {err}")),
                Err(_) => report(&mut failed, false, "Connection validation timed out"),
            }
        }
        Err(_) => {
            println!("\nNo API key provided, skipping connectivity scenario");
        }
    }

    if failed {
        bail!("one or more test scenarios failed");
    }
    println!("\nAll tests completed");
    Ok(())
}

fn policy_command(command: &PolicyCommand) -> anyhow::Result<()> {
    match command {
        PolicyCommand::Validate { policies } => {
            println!("Validating policies file: {}", policies.display());
            let text = std::fs::read_to_string(policies)
                .with_context(|| format!("failed to read policies file {}", policies.display()))?;
            let parsed = parse_and_validate(&text).context("policy validation failed")?;
            println!("Policies file is valid ({} policies)", parsed.len());
            Ok(())
        }
        PolicyCommand::Test { policies, sample } => {
            println!("Testing policies against sample data...");
            let loaded = match policies {
                Some(path) => {
                    let text = std::fs::read_to_string(path).with_context(|| {
                        format!("failed to read policies file {}", path.display())
                    })?;
                    parse_and_validate(&text).context("policy validation failed")?
                }
                None => vec![LabelPolicy {
                    name: "environment-required".to_string(),
                    required_labels: vec!["environment".to_string()],
                    forbidden_labels: Vec::new(),
                    label_patterns: Vec::new(),
                    enforcement: telemetry_sift::policy::Enforcement::Drop,
                }],
            };
            let sample = match sample {
                Some(path) => load_sample(path, false)?,
                None => built_in_sample(),
            };

            let mut violations = 0usize;
            for policy in &loaded {
                for span in &sample.traces {
                    for label in &policy.required_labels {
                        if span
                            .resource_tags
                            .get(label)
                            .map_or(true, String::is_empty)
                        {
                            println!(
                                "Policy violation: trace '{}' missing required label '{}' (policy '{}')",
                                span.name, label, policy.name
                            );
                            violations += 1;
                        }
                    }
                }
            }
            if violations == 0 {
                println!("All sampled traces comply with the policies");
            }
            Ok(())
        }
    }
}

fn report(failed: &mut bool, ok: bool, message: &str) {
    if ok {
        println!("  ok: {message}");
    } else {
        println!("  FAILED: {message}");
        *failed = true;
    }
}

fn built_in_sample() -> Sample {
    let sampler = TelemetrySampler::new(100);
    sampler.create_sample(
        vec![TraceSpan {
            name: "test-span".to_string(),
            service: "test-service".to_string(),
            duration: Duration::from_millis(100),
            status: "OK".to_string(),
            attributes: HashMap::from([
                ("http.method".to_string(), "GET".to_string()),
                (
                    "http.url".to_string(),
                    "https://api.example.com/test".to_string(),
                ),
            ]),
            resource_tags: HashMap::from([
                ("environment".to_string(), "test".to_string()),
                ("version".to_string(), "1.0.0".to_string()),
            ]),
        }],
        vec![MetricDataPoint {
            name: "test_metric".to_string(),
            value: 42.0,
            kind: "gauge".to_string(),
            labels: HashMap::from([
                ("method".to_string(), "GET".to_string()),
                ("status".to_string(), "200".to_string()),
            ]),
            timestamp: chrono::Utc::now(),
            resource_tags: HashMap::new(),
        }],
        vec![LogEntry {
            level: "INFO".to_string(),
            message: "Test log message".to_string(),
            service: "test-service".to_string(),
            timestamp: chrono::Utc::now(),
            attributes: HashMap::from([("request_id".to_string(), "req-123".to_string())]),
            resource_tags: HashMap::new(),
        }],
    )
}
