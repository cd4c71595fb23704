use clap::Parser;
use std::time::Duration;

use crate::cache::DEFAULT_INDEX_CAPACITY;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "danmu-gateway")]
#[command(about = "Token-gated caching gateway for danmu comment sources")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 9321)]
    pub port: u16,

    // Shared secret, must be the first path segment of every request
    #[arg(short, long, env = "TOKEN", default_value = "87654321")]
    pub token: String,

    // Max comment fetches per client per 60s window, 0 or less disables
    #[arg(
        long,
        env = "RATE_LIMIT_MAX_REQUESTS",
        default_value_t = 3,
        allow_negative_numbers = true
    )]
    pub rate_limit: i64,

    // Upstream request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 5000)]
    pub request_timeout: u64,

    // Danmu source service the handlers delegate to
    #[arg(short, long, env = "UPSTREAM_URL", default_value = "http://localhost:9322")]
    pub upstream_url: String,

    // Comment cache TTL in seconds, 0 turns storing off
    #[arg(short, long, env = "COMMENT_CACHE_TTL", default_value_t = 300)]
    pub cache_ttl: u64,

    // Episode id -> url mappings remembered for comment lookups by id
    #[arg(long, env = "ID_INDEX_CAPACITY", default_value_t = 50_000)]
    pub index_capacity: usize,

    // Lines kept in memory for /api/logs
    #[arg(long, env = "LOG_BUFFER_SIZE", default_value_t = 500)]
    pub log_buffer: usize,

    // Separate prometheus listener, 0 = off
    #[arg(long, env = "METRICS_PORT", default_value_t = 0)]
    pub metrics_port: u16,

    // Seconds between rate limit history and comment cache sweeps
    #[arg(long, default_value_t = 60)]
    pub sweep_interval: u64,
}

// Settings the gateway consumes, resolved once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub rate_limit: i64,
    pub request_timeout: Duration,
    pub upstream_url: String,
    pub cache_ttl: Duration,
    pub index_capacity: usize,
    pub log_buffer: usize,
    pub sweep_interval: Duration,
}

impl Config {
    pub fn rate_limit_enabled(&self) -> bool {
        self.rate_limit > 0
    }

    // token with everything but the edges hidden, for the homepage
    pub fn masked_token(&self) -> String {
        let chars: Vec<char> = self.token.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{}{}{}", head, "*".repeat(chars.len() - 4), tail)
    }
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Self {
            token: args.token.clone(),
            rate_limit: args.rate_limit,
            request_timeout: Duration::from_millis(args.request_timeout),
            upstream_url: args.upstream_url.trim_end_matches('/').to_string(),
            cache_ttl: Duration::from_secs(args.cache_ttl),
            index_capacity: args.index_capacity,
            log_buffer: args.log_buffer,
            sweep_interval: Duration::from_secs(args.sweep_interval.max(1)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: "87654321".to_string(),
            rate_limit: 3,
            request_timeout: Duration::from_millis(5000),
            upstream_url: "http://localhost:9322".to_string(),
            cache_ttl: Duration::from_secs(300),
            index_capacity: DEFAULT_INDEX_CAPACITY,
            log_buffer: 500,
            sweep_interval: Duration::from_secs(60),
        }
    }
}
