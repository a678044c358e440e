//! Per-source request pacing with adaptive cooldown.
//!
//! One limiter instance per bibliographic source. `acquire` paces callers to
//! the source's configured requests-per-second; `cooldown` inserts an extra
//! pause after error feedback. Limiters never throttle across sources.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::SourceError;

/// Upper bound on accumulated cooldown beyond the current instant.
const COOLDOWN_CAP: Duration = Duration::from_secs(120);

/// Error classes that map to cooldown pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownClass {
    /// Quota exhaustion (daily/billing limits).
    Quota,
    /// Request-rate throttling.
    Rate,
    /// Request timed out.
    Timeout,
    /// Anything else worth backing off for.
    Other,
}

impl CooldownClass {
    /// The pause inserted before the next acquire for this class.
    pub fn pause(self) -> Duration {
        match self {
            CooldownClass::Quota => Duration::from_secs(25),
            CooldownClass::Rate => Duration::from_secs(15),
            CooldownClass::Timeout => Duration::from_secs(8),
            CooldownClass::Other => Duration::from_secs(10),
        }
    }

    /// Classify an error message by keyword.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("quota") {
            CooldownClass::Quota
        } else if lower.contains("rate") || lower.contains("429") {
            CooldownClass::Rate
        } else if lower.contains("timeout") || lower.contains("timed out") {
            CooldownClass::Timeout
        } else {
            CooldownClass::Other
        }
    }
}

impl From<&SourceError> for CooldownClass {
    fn from(err: &SourceError) -> Self {
        match err {
            SourceError::RateLimited { .. } => CooldownClass::Rate,
            SourceError::Unavailable { message, .. } => CooldownClass::classify(message),
            SourceError::InvalidResponse { .. } => CooldownClass::Other,
        }
    }
}

struct PacerState {
    next_allowed: Instant,
}

/// Token pacer for a single source.
///
/// Callers `acquire` before each request; the call suspends until the
/// source's pacing interval (plus any pending cooldown) has elapsed. The
/// internal mutex is held across the pacing sleep, so cooperative callers
/// are served in FIFO order per source.
pub struct RateLimiter {
    interval: Duration,
    state: Mutex<PacerState>,
}

impl RateLimiter {
    /// Build a limiter for `requests_per_second`, with `min_delay` as the
    /// mandatory floor between requests.
    ///
    /// Non-positive rates fall back to one request per second.
    pub fn new(requests_per_second: f64, min_delay: Duration) -> Self {
        let rps = if requests_per_second > 0.0 && requests_per_second.is_finite() {
            requests_per_second
        } else {
            1.0
        };
        let interval = Duration::from_secs_f64(1.0 / rps).max(min_delay);
        Self {
            interval,
            state: Mutex::new(PacerState {
                next_allowed: Instant::now(),
            }),
        }
    }

    /// The effective interval between requests.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until a request slot is available, then claim it.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if state.next_allowed > now {
            tokio::time::sleep_until(state.next_allowed).await;
        }
        let slot = state.next_allowed.max(now);
        state.next_allowed = slot + self.interval;
    }

    /// Insert a pause before the next acquire after error feedback.
    ///
    /// Pauses compose additively across calls, capped at 120 seconds beyond
    /// the current instant.
    pub async fn cooldown(&self, class: CooldownClass) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let base = state.next_allowed.max(now);
        let target = (base + class.pause()).min(now + COOLDOWN_CAP);
        if target > state.next_allowed {
            tracing::debug!(
                class = ?class,
                pause_secs = class.pause().as_secs(),
                "rate limiter cooldown",
            );
            state.next_allowed = target;
        }
    }
}

/// One [`RateLimiter`] per bibliographic source.
///
/// Limiters are independent; concurrent calls to different sources proceed
/// without contention.
pub struct SourceLimiters {
    arxiv: RateLimiter,
    openalex: RateLimiter,
    crossref: RateLimiter,
}

impl SourceLimiters {
    /// Build per-source limiters from configuration.
    pub fn from_config(config: &crate::config::RateLimitsConfig) -> Self {
        let min_delay = Duration::from_millis(config.min_delay_ms);
        Self {
            arxiv: RateLimiter::new(config.arxiv, min_delay),
            openalex: RateLimiter::new(config.openalex, min_delay),
            crossref: RateLimiter::new(config.crossref, min_delay),
        }
    }

    /// The limiter for a source.
    pub fn for_source(&self, kind: crate::source::SourceKind) -> &RateLimiter {
        match kind {
            crate::source::SourceKind::ArXiv => &self.arxiv,
            crate::source::SourceKind::OpenAlex => &self.openalex,
            crate::source::SourceKind::CrossRef => &self.crossref,
        }
    }
}
