//! Per-credential fixed-window admission control.
//!
//! Each credential owns a window that opens on its first request and lasts
//! `window`. Up to `max_requests` requests are admitted inside it; the rest
//! are denied with the time left until it closes. Windows live in a sharded
//! map, so the check and the increment happen under one entry lock and two
//! concurrent requests can never both take the last slot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bucket for requests that presented no credential. The NUL prefix keeps it
/// apart from any value a header can carry.
pub const ANONYMOUS_KEY: &str = "\u{0}anonymous";

/// Source of monotonic time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Start at the current instant.
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Window length and capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimiterConfig {
    /// How long a window stays open.
    pub window: Duration,
    /// Requests admitted per window.
    pub max_requests: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30),
            max_requests: 1,
        }
    }
}

/// Admission decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Go ahead.
    Allowed,
    /// Window exhausted.
    Denied {
        /// Whole seconds until the window closes, at least 1.
        retry_after_secs: u64,
    },
}

#[derive(Debug)]
struct Window {
    count: u32,
    expires_at: Instant,
}

/// In-memory fixed-window limiter keyed by credential.
pub struct AdmissionLimiter {
    config: LimiterConfig,
    windows: DashMap<String, Window>,
    clock: Arc<dyn Clock>,
}

impl AdmissionLimiter {
    /// Limiter on the wall clock.
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Limiter on an injected clock.
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            clock,
        }
    }

    /// Window length and capacity.
    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    /// Admit or deny one request for `credential`.
    pub fn admit(&self, credential: Option<&str>) -> Admission {
        let key = credential.filter(|c| !c.is_empty()).unwrap_or(ANONYMOUS_KEY);
        let now = self.clock.now();
        let window = self.config.window;

        let mut entry = self
            .windows
            .entry(key.to_owned())
            .or_insert_with(|| Window {
                count: 0,
                expires_at: now + window,
            });

        if now >= entry.expires_at {
            entry.count = 0;
            entry.expires_at = now + window;
        }

        if entry.count < self.config.max_requests {
            entry.count += 1;
            Admission::Allowed
        } else {
            Admission::Denied {
                retry_after_secs: retry_after_secs(entry.expires_at - now),
            }
        }
    }

    /// Drop every expired window. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, w| w.expires_at > now);
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked windows, expired or not.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Run [`purge_expired`](Self::purge_expired) every `every` until `token`
    /// is cancelled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            let _ = ticker.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = limiter.purge_expired();
                        if purged > 0 {
                            debug!(
                                purged,
                                remaining = limiter.window_count(),
                                "expired rate-limit windows purged"
                            );
                        }
                    }
                }
            }
            debug!("rate-limit sweeper stopped");
        })
    }
}

fn retry_after_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}
