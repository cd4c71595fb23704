use axum::http::StatusCode;
use serde_json::json;

use crate::models::CanonicalResponse;
use crate::state::AppState;

// GET / - service metadata and the active settings
pub(super) fn homepage(state: &AppState) -> CanonicalResponse {
    let config = &state.config;
    CanonicalResponse::json(
        StatusCode::OK,
        &json!({
            "message": "Welcome to the danmu gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "envs": {
                "token": config.masked_token(),
                "rateLimitEnabled": config.rate_limit_enabled(),
                "rateLimitMaxRequests": config.rate_limit,
                "requestTimeoutMs": config.request_timeout.as_millis() as u64,
                "commentCacheTtlSecs": config.cache_ttl.as_secs(),
                "cachedCommentLists": state.cache.len(),
                "rateLimitedClients": state.limiter.tracked_clients(),
            },
            "endpoints": [
                "GET /{token}/api/v2/search/anime?keyword=",
                "GET /{token}/api/v2/search/episodes?anime=",
                "POST /{token}/api/v2/match",
                "GET /{token}/api/v2/bangumi/{animeId}",
                "GET /{token}/api/v2/comment/{commentId}?format=json|xml",
                "GET /{token}/api/v2/comment?url=&format=json|xml",
                "GET /{token}/api/logs",
            ],
        }),
    )
}

// GET /api/logs - buffered log lines as plain text
pub(super) fn logs(state: &AppState) -> CanonicalResponse {
    CanonicalResponse::text(StatusCode::OK, state.logs.render())
}
