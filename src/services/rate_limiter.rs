//! Sliding-window rate limiter keyed by client IP
//!
//! Used by analytics ingestion to cap how many events one address can send
//! per window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::RwLock;

pub struct IpRateLimiter {
    hits: RwLock<HashMap<IpAddr, Vec<DateTime<Utc>>>>,
    max_hits: usize,
    window: Duration,
}

impl IpRateLimiter {
    /// Allow `max_hits` per `window` for each address
    pub fn new(max_hits: usize, window: Duration) -> Self {
        Self {
            hits: RwLock::new(HashMap::new()),
            max_hits,
            window,
        }
    }

    pub fn per_minute(max_hits: usize) -> Self {
        Self::new(max_hits, Duration::minutes(1))
    }

    /// Record a hit for `ip` unless the address is over its budget.
    /// Returns `false` when the hit was rejected.
    pub async fn check_and_record(&self, ip: IpAddr) -> bool {
        let now = Utc::now();
        let cutoff = now - self.window;

        let mut hits = self.hits.write().await;
        let entry = hits.entry(ip).or_default();
        entry.retain(|time| *time > cutoff);

        if entry.len() >= self.max_hits {
            return false;
        }
        entry.push(now);
        true
    }

    /// Drop expired hits and empty entries. Called periodically from main.
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut hits = self.hits.write().await;
        hits.retain(|_, times| {
            times.retain(|time| *time > cutoff);
            !times.is_empty()
        });
    }

    pub async fn tracked_addresses(&self) -> usize {
        self.hits.read().await.len()
    }
}
