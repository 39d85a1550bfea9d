// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use crate::recommendation::ParsedRecommendations;
use crate::sampler::SampleMetadata;

/// Memoizes parsed recommendations by sample fingerprint with a TTL.
///
/// The fingerprint is built from the three source totals only, never from
/// attribute values, so the cache retains no payload-derived material. The
/// lossy key is deliberate: a hit means "approximately similar workload".
pub struct RecommendationCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    expiration: Duration,
}

struct CacheEntry {
    recommendations: Arc<ParsedRecommendations>,
    inserted_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub expiration: Duration,
}

impl RecommendationCache {
    pub fn new(expiration: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            expiration,
        }
    }

    pub fn fingerprint(meta: &SampleMetadata) -> String {
        format!(
            "sample-{}-{}-{}",
            meta.total_spans, meta.total_metrics, meta.total_logs
        )
    }

    /// Returns the stored value while it is fresh; an expired entry is
    /// evicted and reported as a miss.
    pub fn lookup(&self, meta: &SampleMetadata) -> Option<Arc<ParsedRecommendations>> {
        let key = Self::fingerprint(meta);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.expiration => {
                Some(entry.recommendations.clone())
            }
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn store(&self, meta: &SampleMetadata, recommendations: Arc<ParsedRecommendations>) {
        let key = Self::fingerprint(meta);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            CacheEntry {
                recommendations,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.lock().unwrap_or_else(|e| e.into_inner()).len(),
            expiration: self.expiration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::Summary;
    use chrono::Utc;

    fn meta(spans: usize, metrics: usize, logs: usize) -> SampleMetadata {
        SampleMetadata {
            total_spans: spans,
            total_metrics: metrics,
            total_logs: logs,
            ..Default::default()
        }
    }

    fn parsed() -> Arc<ParsedRecommendations> {
        Arc::new(ParsedRecommendations {
            recommendations: Vec::new(),
            summary: Summary::default(),
            generated_at: Utc::now(),
        })
    }

    #[test]
    fn test_fingerprint_uses_totals_only() {
        let a = meta(10, 5, 3);
        assert_eq!(RecommendationCache::fingerprint(&a), "sample-10-5-3");

        let mut b = meta(10, 5, 3);
        b.services = vec!["secret-service".to_string()];
        assert_eq!(
            RecommendationCache::fingerprint(&a),
            RecommendationCache::fingerprint(&b)
        );
    }

    #[test]
    fn test_lookup_miss_then_hit() {
        let cache = RecommendationCache::new(Duration::from_secs(60));
        let meta = meta(1, 2, 3);
        assert!(cache.lookup(&meta).is_none());

        let value = parsed();
        cache.store(&meta, value.clone());
        let hit = cache.lookup(&meta).expect("expected a cache hit");
        assert!(Arc::ptr_eq(&hit, &value));
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let cache = RecommendationCache::new(Duration::from_millis(20));
        let meta = meta(1, 0, 0);
        cache.store(&meta, parsed());

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.lookup(&meta).is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_clear() {
        let cache = RecommendationCache::new(Duration::from_secs(60));
        cache.store(&meta(1, 0, 0), parsed());
        cache.store(&meta(2, 0, 0), parsed());
        assert_eq!(cache.stats().entries, 2);

        cache.clear();
        assert_eq!(cache.stats().entries, 0);
        assert!(cache.lookup(&meta(1, 0, 0)).is_none());
    }
}
