// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{future::Future, time::Duration};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Token-bucket gate in front of the advisory client.
///
/// The bucket holds `rate_limit_rpm` tokens and starts full. A refill task
/// deposits one token every `60s / rpm`; deposits into a full bucket are
/// discarded. [`wait`](Self::wait) consumes a token or blocks until one
/// arrives or the caller's cancellation fires.
pub struct RateLimiter {
    tokens_tx: mpsc::Sender<()>,
    tokens_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    refill_period: Duration,
}

impl RateLimiter {
    pub fn new(rpm: u32) -> Self {
        let capacity = rpm.max(1) as usize;
        let (tokens_tx, tokens_rx) = mpsc::channel(capacity);
        for _ in 0..capacity {
            // Cannot fail: the channel is empty and sized for exactly this many
            let _ = tokens_tx.try_send(());
        }
        Self {
            tokens_tx,
            tokens_rx: tokio::sync::Mutex::new(tokens_rx),
            refill_period: Duration::from_secs(60) / rpm.max(1),
        }
    }

    pub fn refill_period(&self) -> Duration {
        self.refill_period
    }

    /// The background refill task. Runs until the token is cancelled; spawn
    /// it on the same runtime that calls [`wait`](Self::wait).
    pub fn refill(&self, cancel: CancellationToken) -> impl Future<Output = ()> + Send + 'static {
        let tx = self.tokens_tx.clone();
        let period = self.refill_period;
        async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; the bucket starts full so
            // it is discarded along with any other deposit into a full bucket.
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let _ = tx.try_send(());
                    }
                }
            }
        }
    }

    /// Blocks until a token is available. Errors only on cancellation.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        let mut rx = self.tokens_rx.lock().await;
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            token = rx.recv() => match token {
                Some(()) => Ok(()),
                // All senders gone; nothing will ever refill.
                None => Err(Error::Cancelled),
            },
        }
    }
}
