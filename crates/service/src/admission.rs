//! Admission & policy (C8): the willing-status string and the global
//! UNWILLING rate limit. Admission caps themselves (max displays, per-host,
//! pending) live on [`crate::session::SessionTable`] and are enforced by the
//! dispatcher (C7), which is the only place with enough context to compose
//! all three.

use std::time::{Duration, Instant};

const WILLING_CACHE_TTL: Duration = Duration::from_secs(3);
const UNWILLING_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Caches the result of an external willing-script for [`WILLING_CACHE_TTL`]
/// so a burst of direct queries doesn't spawn a child process per packet.
#[derive(Default)]
pub struct WillingStatusCache {
    cached: Option<(String, Instant)>,
}

impl WillingStatusCache {
    /// Returns the cached status if it's still fresh.
    pub fn fresh(&self) -> Option<&str> {
        self.cached
            .as_ref()
            .filter(|(_, at)| at.elapsed() < WILLING_CACHE_TTL)
            .map(|(status, _)| status.as_str())
    }

    pub fn store(&mut self, status: String) {
        self.cached = Some((status, Instant::now()));
    }
}

/// Appends the busy suffix when the peer is remote and has hit the
/// per-host cap, per section 4.8.
pub fn compose_status(base: &str, peer_is_local: bool, per_host_at_cap: bool) -> String {
    if !peer_is_local && per_host_at_cap {
        format!("{base} (Server is busy)")
    } else {
        base.to_string()
    }
}

/// Limits UNWILLING to at most one emission per wallclock second, globally
/// across all peers (see the open question in section 9: per-peer limiting
/// is an allowed alternative, but global is what the source did).
#[derive(Default)]
pub struct UnwillingRateLimiter {
    last_sent: Option<Instant>,
}

impl UnwillingRateLimiter {
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let allowed = match self.last_sent {
            Some(last) => now.duration_since(last) >= UNWILLING_MIN_INTERVAL,
            None => true,
        };

        if allowed {
            self.last_sent = Some(now);
        }

        allowed
    }
}
