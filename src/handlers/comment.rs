use std::time::Instant;
use tracing::{info, warn};

use super::{COMMENT_PATH, upstream};
use crate::danmu::{DanmuFormat, render};
use crate::error::GatewayError;
use crate::metrics::{CACHE_HITS, CACHE_MISSES, RATE_LIMITED};
use crate::models::{CanonicalRequest, CanonicalResponse};
use crate::rate_limit::Admission;
use crate::state::AppState;

// What a comment request points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentTarget {
    Id(i64),
    Url(String),
}

// trailing segment after /api/v2/comment/ as an id, else the url query param
pub fn parse_comment_target(
    path: &str,
    url_param: Option<&str>,
) -> Result<CommentTarget, GatewayError> {
    let id = path
        .strip_prefix(COMMENT_PATH)
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|rest| rest.rsplit('/').next())
        .and_then(|segment| segment.parse::<i64>().ok());

    if let Some(id) = id {
        return Ok(CommentTarget::Id(id));
    }
    match url_param.map(str::trim) {
        Some(url) if !url.is_empty() => Ok(CommentTarget::Url(url.to_string())),
        _ => Err(GatewayError::MissingParameter),
    }
}

// Cache first; only a miss is charged against the client's rate limit
pub(super) async fn get_comment(
    state: &AppState,
    req: &CanonicalRequest,
    path: &str,
) -> Result<CanonicalResponse, GatewayError> {
    let format = DanmuFormat::from_query(req.query_param("format"));
    let target = parse_comment_target(path, req.query_param("url"))?;

    // an id without a known url counts as not cached
    let url = match target {
        CommentTarget::Url(url) => Ok(url),
        CommentTarget::Id(id) => state.index.resolve(id).ok_or(id),
    };

    if let Ok(url) = &url {
        if let Some(comments) = state.cache.lookup(url) {
            CACHE_HITS.inc();
            info!(url = %url, count = comments.len(), "comment cache hit");
            return Ok(render(&comments, format));
        }
    }
    CACHE_MISSES.inc();

    if state.limiter.admit(&req.client_ip, Instant::now()) == Admission::Rejected {
        RATE_LIMITED.inc();
        warn!(client = %req.client_ip, "comment request rate limited");
        return Err(GatewayError::RateLimited);
    }

    let comments = match url {
        Ok(url) => {
            let comments = upstream(state, state.source.comments_by_url(&url)).await?;
            state.cache.store(&url, comments.clone());
            info!(url = %url, count = comments.len(), "fetched comments");
            comments
        }
        Err(id) => {
            let comments = upstream(state, state.source.comments_by_id(id)).await?;
            info!(id, count = comments.len(), "fetched comments by id");
            comments
        }
    };

    Ok(render(&comments, format))
}
