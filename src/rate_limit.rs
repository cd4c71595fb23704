use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

// Sliding window length for comment fetches
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected,
}

// Per-client sliding window limiter.
//
// Each client keeps the instants of its admitted requests. The DashMap entry
// guard makes prune + check + push a single step for one client while other
// clients only contend on their own shard.
pub struct RateLimiter {
    capacity: i64,
    window: Duration,
    history: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(capacity: i64) -> Self {
        Self {
            capacity,
            window: WINDOW,
            history: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn admit(&self, client_id: &str, now: Instant) -> Admission {
        if !self.is_enabled() {
            return Admission::Admitted;
        }

        let mut entry = self.history.entry(client_id.to_string()).or_default();
        prune(&mut entry, now, self.window);

        if entry.len() as i64 >= self.capacity {
            debug!(client = client_id, in_window = entry.len(), "rate limit reached");
            return Admission::Rejected;
        }

        entry.push_back(now);
        Admission::Admitted
    }

    // Drop expired instants for every client and forget idle ones
    pub fn sweep(&self, now: Instant) -> usize {
        let window = self.window;
        self.history.retain(|_, stamps| {
            prune(stamps, now, window);
            !stamps.is_empty()
        });
        self.history.len()
    }

    // admitted requests currently on record for a client
    pub fn recorded(&self, client_id: &str) -> usize {
        self.history.get(client_id).map(|s| s.len()).unwrap_or(0)
    }

    pub fn tracked_clients(&self) -> usize {
        self.history.len()
    }
}

// a request made exactly `window` ago no longer counts
fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = stamps.front() {
        if now.saturating_duration_since(oldest) >= window {
            stamps.pop_front();
        } else {
            break;
        }
    }
}

// Background sweep so clients that stop calling do not linger forever
pub async fn history_sweeper(limiter: Arc<RateLimiter>, every: Duration) {
    let mut interval = tokio::time::interval(every);

    debug!("Rate limit sweeper started (interval: {:?})", every);

    loop {
        interval.tick().await;
        let remaining = limiter.sweep(Instant::now());
        debug!(clients = remaining, "rate limit history swept");
    }
}
