// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::configuration::Config;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// How much of a non-2xx body is kept in the error.
const ERROR_BODY_LIMIT: usize = 512;

const SYSTEM_PROMPT: &str = "You are an expert OpenTelemetry observability engineer \
specializing in telemetry optimization and filtering. You analyze telemetry data and \
provide actionable recommendations for filtering out noise and enforcing label policies.";

/// Issues advisory requests against an LLM chat endpoint.
///
/// The trait seam exists so tests (and the dry-run CLI's scripted mode) can
/// substitute a stub that records the request and plays back a canned reply.
#[async_trait]
pub trait AdvisoryClient: Send + Sync {
    /// One advisory round-trip. `telemetry_json` is the anonymized sample and
    /// `policy_summaries` the rendered policy list; the return value is the
    /// model's raw reply text.
    async fn recommend(
        &self,
        telemetry_json: &str,
        policy_summaries: &[String],
    ) -> Result<String, TransportError>;

    /// Cheap connectivity probe with a trivial prompt.
    async fn validate_connection(&self) -> Result<(), TransportError>;
}

#[derive(Debug)]
pub enum TransportError {
    /// The request never completed: connect failure, timeout, DNS, ...
    Request(String),
    /// The endpoint replied with a non-2xx status.
    Status { status: u16, body: String },
    /// The reply was 2xx but not the JSON shape we expect.
    Malformed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(msg) => write!(f, "request failed: {msg}"),
            Self::Status { status, body } => {
                write!(f, "advisory request failed with status {status}: {body}")
            }
            Self::Malformed(msg) => write!(f, "malformed advisory response: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// [`AdvisoryClient`] over HTTPS chat completions with bearer credentials.
pub struct HttpAdvisoryClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl HttpAdvisoryClient {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| TransportError::Request(err.to_string()))?;
        Ok(Self {
            api_key: config.api_key().to_string(),
            base_url: config.base_url().trim_end_matches('/').to_string(),
            model: config.model().to_string(),
            http,
        })
    }

    async fn send(&self, messages: Vec<ChatMessage>) -> Result<String, TransportError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(ERROR_BODY_LIMIT);
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|err| TransportError::Malformed(err.to_string()))?;

        Ok(reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl AdvisoryClient for HttpAdvisoryClient {
    async fn recommend(
        &self,
        telemetry_json: &str,
        policy_summaries: &[String],
    ) -> Result<String, TransportError> {
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: build_prompt(telemetry_json, policy_summaries),
            },
        ];
        self.send(messages).await
    }

    async fn validate_connection(&self) -> Result<(), TransportError> {
        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: "Hello".to_string(),
        }];
        self.send(messages).await.map(|_| ())
    }
}

/// The user prompt. It mandates the four labeled sections the parser relies
/// on.
fn build_prompt(telemetry_json: &str, policy_summaries: &[String]) -> String {
    format!(
        "\nAnalyze this OpenTelemetry telemetry sample and provide specific recommendations:\n\n\
         TELEMETRY SAMPLE:\n{telemetry_json}\n\n\
         LABEL POLICIES TO ENFORCE:\n{policies}\n\n\
         Please provide recommendations in the following format:\n\n\
         1. SIGNALS TO DROP:\n   \
            - Identify low-value metrics, noisy logs, or unnecessary traces\n   \
            - Provide specific filter conditions\n\n\
         2. LABEL POLICY VIOLATIONS:\n   \
            - Identify data that doesn't comply with label policies\n   \
            - Suggest corrections or drops for non-compliant attributes\n\n\
         3. OTEL FILTER RULES:\n   \
            - Generate YAML configuration snippets for OpenTelemetry filter processor\n   \
            - Use proper OTTL (OpenTelemetry Transformation Language) syntax\n   \
            - Include both trace and metric filter rules\n\n\
         4. RATIONALE:\n   \
            - Explain why each recommendation improves observability\n   \
            - Estimate potential data volume reduction\n\n\
         Focus on actionable, production-ready recommendations that can be implemented immediately.\n",
        policies = format_policies(policy_summaries),
    )
}

fn format_policies(policy_summaries: &[String]) -> String {
    if policy_summaries.is_empty() {
        return "No specific policies provided - use best practices".to_string();
    }
    policy_summaries
        .iter()
        .enumerate()
        .map(|(i, policy)| format!("   {}. {}", i + 1, policy))
        .collect::<Vec<_>>()
        .join("\n")
}
