// Token-gated caching gateway in front of danmu (timed comment) sources.
// Only comment cache misses are charged against the per-client rate limit.

pub mod adapter;
pub mod auth;
pub mod cache;
pub mod config;
pub mod danmu;
pub mod error;
pub mod handlers;
pub mod logs;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod source;
pub mod state;

pub use config::{Args, Config};
pub use error::GatewayError;
pub use handlers::{dispatch, router};
pub use models::{CanonicalRequest, CanonicalResponse, Comment};
pub use rate_limit::{Admission, RateLimiter};
pub use state::AppState;
