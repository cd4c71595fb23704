use axum::http::StatusCode;
use axum::response::IntoResponse;
use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Gauge, Histogram, TextEncoder, register_counter, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("danmu_requests_total", "Total number of requests").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("danmu_comment_cache_hits_total", "Comment cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("danmu_comment_cache_misses_total", "Comment cache misses").unwrap();
    pub static ref RATE_LIMITED: Counter = register_counter!(
        "danmu_rate_limited_total",
        "Comment requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "danmu_upstream_latency_seconds",
        "Upstream danmu source latency in seconds"
    )
    .unwrap();
    pub static ref CACHE_SIZE: Gauge = register_gauge!(
        "danmu_comment_cache_size",
        "Current number of cached comment lists"
    )
    .unwrap();
}

// prometheus text exposition, served on the separate metrics listener
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    (StatusCode::OK, String::from_utf8_lossy(&buffer).into_owned())
}
