//! Fixed-window rate limiting for the public endpoints.
//!
//! Callers are identified by an opaque key (normally the client address). Each
//! key may make `max_attempts` attempts per window; the window restarts with the
//! first attempt after it closes. Counters of closed windows are dropped on the
//! next attempt by any caller, so storage tracks only recently active keys.

use crate::{
    config::settings::{RateLimitBackend, RateLimitConfig},
    entities::{RateLimit, rate_limit},
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait, sea_query::Expr,
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the attempt may proceed
    pub allowed: bool,
    /// Attempts left in the current window
    pub remaining: u32,
    /// When the current window closes
    pub reset_at: DateTime<Utc>,
}

impl RateDecision {
    /// Whole seconds until the window closes, at least 1.
    #[must_use]
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((self.reset_at - now).num_seconds())
            .unwrap_or(0)
            .max(1)
    }

    /// Converts a refusal into [`Error::RateLimited`].
    pub fn check(self, now: DateTime<Utc>) -> Result<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(Error::RateLimited {
                retry_after_secs: self.retry_after_secs(now),
            })
        }
    }
}

/// Counts attempts per key.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Records an attempt for `key` at `now` and decides whether it may proceed.
    async fn hit(&self, key: &str, now: DateTime<Utc>) -> Result<RateDecision>;
}

/// Window length and attempt budget.
#[derive(Debug, Clone, Copy)]
pub struct FixedWindow {
    window: Duration,
    max_attempts: u32,
}

impl FixedWindow {
    /// Creates a policy allowing `max_attempts` per `window_secs`.
    #[must_use]
    pub fn new(window_secs: u64, max_attempts: u32) -> Self {
        Self {
            window: i64::try_from(window_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or_else(|| Duration::days(365)),
            max_attempts,
        }
    }

    fn closes(&self, window_start: DateTime<Utc>) -> DateTime<Utc> {
        window_start + self.window
    }

    /// Windows starting at or before this instant have closed by `now`.
    fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    fn fresh(&self, now: DateTime<Utc>) -> RateDecision {
        RateDecision {
            allowed: self.max_attempts > 0,
            remaining: self.max_attempts.saturating_sub(1),
            reset_at: self.closes(now),
        }
    }

    fn decide(&self, hits: u32, window_start: DateTime<Utc>) -> RateDecision {
        RateDecision {
            allowed: hits < self.max_attempts,
            remaining: self.max_attempts.saturating_sub(hits.saturating_add(1)),
            reset_at: self.closes(window_start),
        }
    }
}

impl From<&RateLimitConfig> for FixedWindow {
    fn from(config: &RateLimitConfig) -> Self {
        Self::new(config.window_secs, config.max_attempts)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    hits: u32,
    started: DateTime<Utc>,
}

/// Counters held in process memory.
#[derive(Debug)]
pub struct MemoryRateLimiter {
    policy: FixedWindow,
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryRateLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new(policy: FixedWindow) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn hit(&self, key: &str, now: DateTime<Utc>) -> Result<RateDecision> {
        let mut windows = self.windows.lock().await;
        windows.retain(|_, window| now < self.policy.closes(window.started));
        let window = windows.entry(key.to_string()).or_insert(Window {
            hits: 0,
            started: now,
        });

        let decision = self.policy.decide(window.hits, window.started);
        if decision.allowed {
            window.hits += 1;
        }
        Ok(decision)
    }
}

/// Counters persisted in the `rate_limits` table.
#[derive(Debug, Clone)]
pub struct DbRateLimiter {
    db: DatabaseConnection,
    policy: FixedWindow,
}

impl DbRateLimiter {
    /// Creates a limiter writing to `db`.
    #[must_use]
    pub const fn new(db: DatabaseConnection, policy: FixedWindow) -> Self {
        Self { db, policy }
    }
}

#[async_trait]
impl RateLimiter for DbRateLimiter {
    async fn hit(&self, key: &str, now: DateTime<Utc>) -> Result<RateDecision> {
        let txn = self.db.begin().await?;
        let evicted = RateLimit::delete_many()
            .filter(rate_limit::Column::WindowStart.lte(self.policy.stale_before(now)))
            .exec(&txn)
            .await?;
        if evicted.rows_affected > 0 {
            debug!(evicted = evicted.rows_affected, "Dropped closed rate limit windows");
        }
        let existing = RateLimit::find()
            .filter(rate_limit::Column::Key.eq(key))
            .one(&txn)
            .await?;

        let decision = match existing {
            None => {
                rate_limit::ActiveModel {
                    key: Set(key.to_string()),
                    hits: Set(1),
                    window_start: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
                self.policy.fresh(now)
            }
            Some(row) => {
                let hits = u32::try_from(row.hits).unwrap_or(0);
                let decision = self.policy.decide(hits, row.window_start);
                if decision.allowed {
                    RateLimit::update_many()
                        .col_expr(
                            rate_limit::Column::Hits,
                            Expr::col(rate_limit::Column::Hits).add(1),
                        )
                        .filter(rate_limit::Column::Id.eq(row.id))
                        .exec(&txn)
                        .await?;
                }
                decision
            }
        };

        txn.commit().await?;
        if !decision.allowed {
            debug!(key, "Rate limit reached");
        }
        Ok(decision)
    }
}

/// Builds the limiter selected by `config.backend`.
#[must_use]
pub fn build_rate_limiter(config: &RateLimitConfig, db: &DatabaseConnection) -> Arc<dyn RateLimiter> {
    let policy = FixedWindow::from(config);
    match config.backend {
        RateLimitBackend::Database => Arc::new(DbRateLimiter::new(db.clone(), policy)),
        RateLimitBackend::Memory => {
            warn!("Using in-memory rate limiting; counters are not shared between processes");
            Arc::new(MemoryRateLimiter::new(policy))
        }
    }
}
