// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// Per-client request rate limiting.
//
// Fixed one-minute windows keyed by client identity (peer IP). Counters live
// in a `DashMap` so concurrent handlers never contend on a global lock.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Length of one counting window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Stale buckets are pruned once the table grows past this many clients.
const PRUNE_THRESHOLD: usize = 4096;

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

// ---------------------------------------------------------------------------
// RateLimiter trait
// ---------------------------------------------------------------------------

/// Decides whether a client may make another request.
///
/// Implementations must be thread-safe (Send + Sync); the router holds an
/// `Arc<dyn RateLimiter>` shared by every handler.
pub trait RateLimiter: Send + Sync {
    fn check(&self, client: &str) -> RateDecision;
}

// ---------------------------------------------------------------------------
// FixedWindowRateLimiter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start: Instant,
    count: u32,
}

/// In-memory fixed-window limiter backed by `DashMap`.
pub struct FixedWindowRateLimiter {
    buckets: DashMap<String, Bucket>,
    limit: u32,
    window: Duration,
}

impl FixedWindowRateLimiter {
    pub fn new(requests_per_window: u32) -> Self {
        Self::with_window(requests_per_window, WINDOW)
    }

    pub fn with_window(requests_per_window: u32, window: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            limit: requests_per_window,
            window,
        }
    }

    fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        if self.buckets.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }

        let mut bucket = self.buckets.entry(client.to_string()).or_insert(Bucket {
            window_start: now,
            count: 0,
        });

        if now.duration_since(bucket.window_start) >= self.window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= self.limit {
            let elapsed = now.duration_since(bucket.window_start);
            return RateDecision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        bucket.count += 1;
        RateDecision::Allowed {
            remaining: self.limit - bucket.count,
        }
    }

    /// Drop buckets whose window has already expired.
    pub fn prune(&self, now: Instant) {
        let window = self.window;
        self.buckets
            .retain(|_, b| now.duration_since(b.window_start) < window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }
}

/// Limiter that never limits, used when rate limiting is disabled.
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn check(&self, _client: &str) -> RateDecision {
        RateDecision::Allowed {
            remaining: u32::MAX,
        }
    }
}
