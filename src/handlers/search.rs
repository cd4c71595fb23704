use axum::http::StatusCode;
use serde_json::Value;
use tracing::debug;

use super::upstream;
use crate::cache::IdIndex;
use crate::error::GatewayError;
use crate::models::{CanonicalRequest, CanonicalResponse};
use crate::state::AppState;

pub(super) async fn search_anime(
    state: &AppState,
    req: &CanonicalRequest,
) -> Result<CanonicalResponse, GatewayError> {
    let body = upstream(state, state.source.search_anime(&req.query)).await?;
    Ok(CanonicalResponse::json(StatusCode::OK, &body))
}

pub(super) async fn search_episodes(
    state: &AppState,
    req: &CanonicalRequest,
) -> Result<CanonicalResponse, GatewayError> {
    let body = upstream(state, state.source.search_episodes(&req.query)).await?;
    index_episodes(state.index.as_ref(), &body);
    Ok(CanonicalResponse::json(StatusCode::OK, &body))
}

pub(super) async fn match_anime(
    state: &AppState,
    req: &CanonicalRequest,
) -> Result<CanonicalResponse, GatewayError> {
    let payload: Value = serde_json::from_slice(&req.body)
        .map_err(|e| GatewayError::InvalidBody(e.to_string()))?;
    let body = upstream(state, state.source.match_anime(payload)).await?;
    index_episodes(state.index.as_ref(), &body);
    Ok(CanonicalResponse::json(StatusCode::OK, &body))
}

pub(super) async fn bangumi(
    state: &AppState,
    anime_id: &str,
) -> Result<CanonicalResponse, GatewayError> {
    let body = upstream(state, state.source.bangumi(anime_id)).await?;
    index_episodes(state.index.as_ref(), &body);
    Ok(CanonicalResponse::json(StatusCode::OK, &body))
}

// Remember episodeId -> url for every episode the upstream lists, so a later
// comment request by id can be answered from the cache.
pub fn index_episodes(index: &dyn IdIndex, body: &Value) -> usize {
    match body {
        Value::Object(map) => {
            let own = match (
                map.get("episodeId").and_then(Value::as_i64),
                map.get("url").and_then(Value::as_str),
            ) {
                (Some(id), Some(url)) if !url.is_empty() => {
                    debug!(id, url, "indexed episode");
                    index.register(id, url);
                    1
                }
                _ => 0,
            };
            own + map.values().map(|v| index_episodes(index, v)).sum::<usize>()
        }
        Value::Array(items) => items.iter().map(|v| index_episodes(index, v)).sum(),
        _ => 0,
    }
}
