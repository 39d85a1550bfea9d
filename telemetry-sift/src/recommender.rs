// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cache::{CacheStats, RecommendationCache};
use crate::client::AdvisoryClient;
use crate::configuration::Config;
use crate::error::{Error, Result};
use crate::fallback::static_recommendations;
use crate::parser::RecommendationParser;
use crate::policy::{LabelPolicy, PolicyManager};
use crate::rate_limit::RateLimiter;
use crate::recommendation::ParsedRecommendations;
use crate::sampler::Sample;
use crate::stats::PipelineStats;

/// Runs one recommendation cycle: cache, rate limit, advisory call, parse,
/// store; falls back to the static set on transport failures when enabled.
pub struct Recommender {
    client: Arc<dyn AdvisoryClient>,
    parser: RecommendationParser,
    cache: RecommendationCache,
    rate_limiter: RateLimiter,
    enable_cache: bool,
    enable_rate_limit: bool,
    fallback_to_static: bool,
    stats: Arc<PipelineStats>,
}

impl Recommender {
    pub fn new(config: &Config, client: Arc<dyn AdvisoryClient>, stats: Arc<PipelineStats>) -> Self {
        Self {
            client,
            parser: RecommendationParser::new(),
            cache: RecommendationCache::new(config.cache_expiration()),
            rate_limiter: RateLimiter::new(config.rate_limit_rpm()),
            enable_cache: config.enable_cache(),
            enable_rate_limit: config.enable_rate_limit(),
            fallback_to_static: config.fallback_to_static(),
            stats,
        }
    }

    /// The rate limiter's refill loop; the processor spawns this next to the
    /// recommendation loop.
    pub fn refill_task(
        &self,
        cancel: CancellationToken,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        self.rate_limiter.refill(cancel)
    }

    pub async fn recommend(
        &self,
        sample: &Sample,
        policies: &[LabelPolicy],
        cancel: &CancellationToken,
    ) -> Result<Arc<ParsedRecommendations>> {
        if self.enable_cache {
            if let Some(cached) = self.cache.lookup(&sample.meta) {
                crate::sift_debug!("Returning cached recommendations for sample");
                PipelineStats::incr(&self.stats.cache_hits);
                return Ok(cached);
            }
        }

        if self.enable_rate_limit {
            self.rate_limiter.wait(cancel).await?;
        }

        let telemetry_json = sample
            .to_json()
            .map_err(|err| Error::Config(format!("failed to serialize sample: {err}")))?;
        let policy_summaries = PolicyManager::summaries(policies);

        crate::sift_debug!("Requesting recommendations from advisory endpoint");
        PipelineStats::incr(&self.stats.llm_requests);
        let parsed = match self.client.recommend(&telemetry_json, &policy_summaries).await {
            Ok(reply) => Arc::new(self.parser.parse(&reply)?),
            Err(err) => {
                PipelineStats::incr(&self.stats.transport_failures);
                if !self.fallback_to_static {
                    return Err(err.into());
                }
                crate::sift_warn!(
                    "Advisory request failed, serving static recommendations: {}",
                    err
                );
                PipelineStats::incr(&self.stats.fallback_served);
                Arc::new(static_recommendations())
            }
        };

        if self.enable_cache {
            self.cache.store(&sample.meta, parsed.clone());
        }

        crate::sift_info!(
            "Generated {} recommendations",
            parsed.recommendations.len()
        );
        Ok(parsed)
    }

    pub async fn validate_connection(&self) -> Result<()> {
        self.client.validate_connection().await.map_err(Error::from)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        crate::sift_info!("Recommendation cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
