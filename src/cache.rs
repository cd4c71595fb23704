use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time;
use tracing::debug;

use crate::metrics::CACHE_SIZE;
use crate::models::Comment;

// Previously fetched comment lists, keyed by source url
pub trait CommentCache: Send + Sync {
    fn lookup(&self, url: &str) -> Option<Vec<Comment>>;
    fn store(&self, url: &str, comments: Vec<Comment>);
    // Drop every expired entry, returning how many went
    fn purge_expired(&self) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Numeric comment id -> canonical source url
pub trait IdIndex: Send + Sync {
    fn resolve(&self, id: i64) -> Option<String>;
    fn register(&self, id: i64, url: &str);
}

// Cache entry with timestamp
#[derive(Clone)]
pub struct CacheEntry {
    pub comments: Vec<Comment>,
    pub created_at: Instant,
}

// Create a cache key (hash of the source url)
pub fn make_cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.trim());
    format!("{:x}", hasher.finalize())
}

pub struct MemoryCommentCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration, // zero means nothing is stored
}

impl MemoryCommentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }
}

impl CommentCache for MemoryCommentCache {
    fn lookup(&self, url: &str) -> Option<Vec<Comment>> {
        let key = make_cache_key(url);

        if let Some(entry) = self.entries.get(&key) {
            if entry.created_at.elapsed() < self.ttl {
                return Some(entry.comments.clone());
            }
        }

        // stale entries are removed on the way out
        if self
            .entries
            .remove_if(&key, |_, e| e.created_at.elapsed() >= self.ttl)
            .is_some()
        {
            CACHE_SIZE.set(self.entries.len() as f64);
        }
        None
    }

    fn store(&self, url: &str, comments: Vec<Comment>) {
        if self.ttl.is_zero() {
            return;
        }
        self.purge_expired();
        self.entries.insert(
            make_cache_key(url),
            CacheEntry {
                comments,
                created_at: Instant::now(),
            },
        );
        CACHE_SIZE.set(self.entries.len() as f64);
    }

    fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.created_at.elapsed() < self.ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            CACHE_SIZE.set(self.entries.len() as f64);
        }
        removed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// Expired comment lists are dropped on a timer even if nobody asks for them
pub async fn cache_sweeper(cache: Arc<dyn CommentCache>, every: Duration) {
    let mut interval = time::interval(every);

    loop {
        interval.tick().await;
        let removed = cache.purge_expired();
        if removed > 0 {
            debug!(removed, remaining = cache.len(), "purged expired comment lists");
        }
    }
}

pub const DEFAULT_INDEX_CAPACITY: usize = 50_000;

// Bounded: once full, the earliest registered ids are forgotten first
pub struct MemoryIdIndex {
    urls: DashMap<i64, String>,
    order: Mutex<VecDeque<i64>>,
    capacity: usize,
}

impl MemoryIdIndex {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INDEX_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            urls: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl Default for MemoryIdIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl IdIndex for MemoryIdIndex {
    fn resolve(&self, id: i64) -> Option<String> {
        self.urls.get(&id).map(|u| u.value().clone())
    }

    fn register(&self, id: i64, url: &str) {
        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        if self.urls.insert(id, url.to_string()).is_none() {
            order.push_back(id);
        }
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.urls.remove(&oldest);
            }
        }
    }
}
