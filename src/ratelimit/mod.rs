//! Fixed-window rate limiting keyed by caller identity.
//!
//! The mechanism is one `check` over an injected [`RateLimitStore`], so the
//! single-process in-memory store and a shared external store are
//! interchangeable without touching call sites. The named presets are just
//! different (limit, window) pairs over the same mechanism.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

/// Cool-down applied to identities that blow far past their window limit.
const ABUSE_BLOCK_MS: i64 = 10 * 60 * 1000;

/// Cap on tracked identities. Past this, the oldest entry by insertion order
/// is evicted; callers must not depend on fairness under sustained
/// over-capacity load.
const MAX_TRACKED_IDENTITIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    pub count: u32,
    /// When this window resets (ms).
    pub reset_at: i64,
    /// When the identity was first seen in this window (ms).
    pub first_seen_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// When the caller may try again (ms). For blocked identities this is the
    /// end of the cool-down, not the window.
    pub reset_at: i64,
    pub blocked: bool,
}

/// Storage seam for the limiter. `sweep` is the only garbage collection;
/// there is no per-entry TTL scheduling.
pub trait RateLimitStore: Send + Sync {
    fn get(&self, key: &str) -> Option<WindowEntry>;
    fn set(&self, key: &str, entry: WindowEntry);
    fn blocked_until(&self, key: &str) -> Option<i64>;
    fn block(&self, key: &str, until: i64);
    fn sweep(&self, now: i64);
}

#[derive(Default)]
struct MemoryStoreInner {
    windows: HashMap<String, WindowEntry>,
    /// Insertion order for coarse eviction at capacity.
    order: VecDeque<String>,
    blocked: HashMap<String, i64>,
}

/// Process-local store behind a mutex. Window counts may be approximate by
/// one under concurrent calls for the same identity, which keeps the lock
/// scope small without violating the spirit of the limit.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryStore {
    fn get(&self, key: &str) -> Option<WindowEntry> {
        self.inner.lock().unwrap().windows.get(key).copied()
    }

    fn set(&self, key: &str, entry: WindowEntry) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.windows.contains_key(key) {
            if inner.windows.len() >= MAX_TRACKED_IDENTITIES {
                while let Some(oldest) = inner.order.pop_front() {
                    if inner.windows.remove(&oldest).is_some() {
                        break;
                    }
                }
            }
            inner.order.push_back(key.to_string());
        }
        inner.windows.insert(key.to_string(), entry);
    }

    fn blocked_until(&self, key: &str) -> Option<i64> {
        self.inner.lock().unwrap().blocked.get(key).copied()
    }

    fn block(&self, key: &str, until: i64) {
        self.inner.lock().unwrap().blocked.insert(key.to_string(), until);
    }

    fn sweep(&self, now: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.windows.retain(|_, entry| entry.reset_at > now);
        inner.blocked.retain(|_, until| *until > now);
        let live: std::collections::HashSet<&String> = inner.windows.keys().collect();
        let order: VecDeque<String> = inner
            .order
            .iter()
            .filter(|k| live.contains(k))
            .cloned()
            .collect();
        inner.order = order;
    }
}

/// A named (limit, window) pair. The prefix namespaces identity keys so the
/// same caller gets independent budgets per concern.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPreset {
    pub prefix: &'static str,
    pub limit: u32,
    pub window_ms: i64,
}

pub mod presets {
    use super::RateLimitPreset;

    pub const API: RateLimitPreset = RateLimitPreset { prefix: "api", limit: 100, window_ms: 60_000 };
    pub const AUTH: RateLimitPreset = RateLimitPreset { prefix: "auth", limit: 5, window_ms: 300_000 };
    pub const PASSWORD_RESET: RateLimitPreset = RateLimitPreset { prefix: "pwd-reset", limit: 3, window_ms: 3_600_000 };
    pub const DOWNLOADS: RateLimitPreset = RateLimitPreset { prefix: "downloads", limit: 10, window_ms: 60_000 };
    pub const LICENSE_VALIDATION: RateLimitPreset = RateLimitPreset { prefix: "license", limit: 30, window_ms: 60_000 };
    pub const PAYMENTS: RateLimitPreset = RateLimitPreset { prefix: "payments", limit: 5, window_ms: 300_000 };
    pub const EMAIL: RateLimitPreset = RateLimitPreset { prefix: "email", limit: 10, window_ms: 3_600_000 };
    pub const SEARCH: RateLimitPreset = RateLimitPreset { prefix: "search", limit: 50, window_ms: 60_000 };
    pub const ADMIN_ACTIONS: RateLimitPreset = RateLimitPreset { prefix: "admin", limit: 200, window_ms: 60_000 };
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn check_preset(&self, preset: &RateLimitPreset, identity: &str) -> RateLimitDecision {
        let key = format!("{}:{}", preset.prefix, identity);
        self.check(&key, preset.limit, preset.window_ms)
    }

    pub fn check(&self, identity: &str, limit: u32, window_ms: i64) -> RateLimitDecision {
        self.check_at(identity, limit, window_ms, Utc::now().timestamp_millis())
    }

    /// Clock-injected variant of `check`, used directly by tests.
    pub fn check_at(
        &self,
        identity: &str,
        limit: u32,
        window_ms: i64,
        now: i64,
    ) -> RateLimitDecision {
        // Blocked identities are rejected up front and do not consume a
        // window slot.
        if let Some(until) = self.store.blocked_until(identity)
            && now < until
        {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: until,
                blocked: true,
            };
        }

        let entry = match self.store.get(identity) {
            Some(entry) if now < entry.reset_at => {
                let mut entry = entry;
                entry.count = entry.count.saturating_add(1);
                entry
            }
            _ => WindowEntry {
                count: 1,
                reset_at: now + window_ms,
                first_seen_at: now,
            },
        };

        // Abuse escalation: far past the limit in under half the window
        // earns a cool-down, stacked on top of normal windowing.
        if entry.count > limit * 2 && (now - entry.first_seen_at) < window_ms / 2 {
            self.store.block(identity, now + ABUSE_BLOCK_MS);
        }

        let allowed = entry.count <= limit;
        let remaining = limit.saturating_sub(entry.count);
        let reset_at = entry.reset_at;
        self.store.set(identity, entry);

        RateLimitDecision {
            allowed,
            remaining,
            reset_at,
            blocked: false,
        }
    }

    pub fn sweep(&self, now: i64) {
        self.store.sweep(now);
    }

    /// Background sweep on a fixed interval. Spawned once at startup.
    pub fn start_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                limiter.sweep(Utc::now().timestamp_millis());
            }
        })
    }
}
