use std::sync::Arc;

use crate::cache::{CommentCache, IdIndex, MemoryCommentCache, MemoryIdIndex};
use crate::config::Config;
use crate::logs::LogBuffer;
use crate::rate_limit::RateLimiter;
use crate::source::DanmuSource;

// app's shared state, built once at startup and handed to every request
pub struct AppState {
    pub config: Config,
    pub limiter: Arc<RateLimiter>,
    pub cache: Arc<dyn CommentCache>,
    pub index: Arc<dyn IdIndex>,
    pub source: Arc<dyn DanmuSource>,
    pub logs: Arc<LogBuffer>,
}

impl AppState {
    // in-memory cache and index sized from the config
    pub fn new(config: Config, source: Arc<dyn DanmuSource>, logs: Arc<LogBuffer>) -> Self {
        let cache = Arc::new(MemoryCommentCache::new(config.cache_ttl));
        let index = Arc::new(MemoryIdIndex::with_capacity(config.index_capacity));
        Self::with_stores(config, source, cache, index, logs)
    }

    pub fn with_stores(
        config: Config,
        source: Arc<dyn DanmuSource>,
        cache: Arc<dyn CommentCache>,
        index: Arc<dyn IdIndex>,
        logs: Arc<LogBuffer>,
    ) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new(config.rate_limit)),
            config,
            cache,
            index,
            source,
            logs,
        }
    }
}
