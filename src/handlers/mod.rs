mod comment;
mod home;
mod search;

use axum::extract::{Request, State};
use axum::http::Method;
use axum::response::Response;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::adapter::{Adapter, AxumAdapter};
use crate::auth::{LOGS_PATH, PathAuth, authenticate};
use crate::error::GatewayError;
use crate::metrics::{REQUEST_TOTAL, UPSTREAM_LATENCY};
use crate::models::{CanonicalRequest, CanonicalResponse};
use crate::state::AppState;

pub use comment::{CommentTarget, parse_comment_target};

const BANGUMI_PREFIX: &str = "/api/v2/bangumi/";
const COMMENT_PATH: &str = "/api/v2/comment";
const MATCH_PATH: &str = "/api/v2/match";

// Every path goes through the fallback: the token segment is dynamic and
// normalization has to run before anything can be matched.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(gateway_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn gateway_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let adapter = AxumAdapter::default();
    let converted = adapter
        .to_canonical_request(request, |head| wants_body(&state, head))
        .await;
    let response = match converted {
        Ok(canonical) => dispatch(&state, canonical).await,
        Err(err) => err.into_response(),
    };
    adapter.from_canonical_response(response)
}

// Only an authorized POST /match reads its body; everything else is
// answered from the head alone.
pub fn wants_body(state: &AppState, head: &CanonicalRequest) -> bool {
    head.method == Method::POST
        && matches!(
            authenticate(&head.path, &state.config.token),
            Ok(PathAuth::Authorized(path)) if path == MATCH_PATH
        )
}

// Auth + normalize, then route on (method, path)
pub async fn dispatch(state: &AppState, request: CanonicalRequest) -> CanonicalResponse {
    REQUEST_TOTAL.inc();

    match route(state, &request).await {
        Ok(response) => response,
        Err(err) => {
            match &err {
                GatewayError::Upstream(_) | GatewayError::UpstreamTimeout => {
                    warn!(path = %request.path, client = %request.client_ip, "{}", err)
                }
                _ => debug!(path = %request.path, status = err.status().as_u16(), "{}", err),
            }
            err.into_response()
        }
    }
}

async fn route(
    state: &AppState,
    req: &CanonicalRequest,
) -> Result<CanonicalResponse, GatewayError> {
    let path = match authenticate(&req.path, &state.config.token)? {
        PathAuth::NoContent if req.method == Method::GET || req.method == Method::HEAD => {
            return Ok(CanonicalResponse::no_content());
        }
        PathAuth::NoContent => return Err(GatewayError::NotFound),
        PathAuth::Authorized(path) => path,
    };

    debug!(method = %req.method, path = %path, "dispatching");

    // wrong method on a known path is a 404, not a 405
    match (&req.method, path.as_str()) {
        (&Method::GET, "/") => Ok(home::homepage(state)),
        (&Method::GET, LOGS_PATH) => Ok(home::logs(state)),
        (&Method::GET, "/api/v2/search/anime") => search::search_anime(state, req).await,
        (&Method::GET, "/api/v2/search/episodes") => search::search_episodes(state, req).await,
        (&Method::POST, MATCH_PATH) => search::match_anime(state, req).await,
        (&Method::GET, p) if p.starts_with(BANGUMI_PREFIX) => {
            let anime_id = &p[BANGUMI_PREFIX.len()..];
            if anime_id.is_empty() || anime_id.contains('/') {
                return Err(GatewayError::NotFound);
            }
            search::bangumi(state, anime_id).await
        }
        (&Method::GET, p) if p == COMMENT_PATH || p.starts_with("/api/v2/comment/") => {
            comment::get_comment(state, req, p).await
        }
        _ => Err(GatewayError::NotFound),
    }
}

// Run a delegated call under the configured timeout. An expired timeout
// leaves any rate-limit slot already taken in place.
async fn upstream<T, F>(state: &AppState, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    let start_time = Instant::now();
    let result = tokio::time::timeout(state.config.request_timeout, call)
        .await
        .map_err(|_| GatewayError::UpstreamTimeout)?;
    UPSTREAM_LATENCY.observe(start_time.elapsed().as_secs_f64());
    result
}
