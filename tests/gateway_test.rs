// End-to-end tests for the admission pipeline: token gate, normalization,
// routing, cache bypass and rate limiting.

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use danmu_gateway::{
    AppState, CanonicalRequest, CanonicalResponse, Comment, Config, GatewayError, dispatch,
    logs::LogBuffer, router, source::DanmuSource,
};

const EP_URL: &str = "https://v.qq.com/x/cover/abc/ep1.html";

#[derive(Default)]
struct StubSource {
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl StubSource {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl DanmuSource for StubSource {
    async fn search_anime(&self, query: &HashMap<String, String>) -> Result<Value, GatewayError> {
        self.record(format!("search_anime {}", query.get("keyword").cloned().unwrap_or_default()));
        Ok(json!({"success": true, "animes": [{"animeId": 12, "animeTitle": "Frieren"}]}))
    }

    async fn search_episodes(
        &self,
        _query: &HashMap<String, String>,
    ) -> Result<Value, GatewayError> {
        self.record("search_episodes".to_string());
        Ok(json!({"animes": [{"episodes": [
            {"episodeId": 20001, "url": "https://www.iqiyi.com/v_1.html"}
        ]}]}))
    }

    async fn match_anime(&self, body: Value) -> Result<Value, GatewayError> {
        self.record("match_anime".to_string());
        Ok(json!({
            "isMatched": true,
            "matches": [{"episodeId": 30001, "url": "https://www.mgtv.com/b/1.html"}],
            "received": body
        }))
    }

    async fn bangumi(&self, anime_id: &str) -> Result<Value, GatewayError> {
        self.record(format!("bangumi {}", anime_id));
        if anime_id == "404" {
            return Err(GatewayError::Upstream("upstream responded with status 404".to_string()));
        }
        Ok(json!({
            "bangumi": {"animeId": anime_id, "episodes": [{"episodeId": 10001, "url": EP_URL}]}
        }))
    }

    async fn comments_by_url(&self, url: &str) -> Result<Vec<Comment>, GatewayError> {
        self.record(format!("comments_by_url {}", url));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(vec![Comment {
            cid: 1,
            p: "3.00,1,16777215,[tencent]".to_string(),
            m: format!("from {}", url),
        }])
    }

    async fn comments_by_id(&self, id: i64) -> Result<Vec<Comment>, GatewayError> {
        self.record(format!("comments_by_id {}", id));
        Ok(Vec::new())
    }
}

fn gateway_with(config: Config, source: StubSource) -> (Arc<AppState>, Arc<StubSource>) {
    let source = Arc::new(source);
    let state = AppState::new(config, source.clone(), Arc::new(LogBuffer::new(100)));
    (Arc::new(state), source)
}

fn gateway(rate_limit: i64) -> (Arc<AppState>, Arc<StubSource>) {
    let config = Config {
        token: "secret".to_string(),
        rate_limit,
        ..Default::default()
    };
    gateway_with(config, StubSource::default())
}

fn get(path: &str) -> CanonicalRequest {
    CanonicalRequest::new(Method::GET, path).with_client_ip("9.9.9.9")
}

fn comment_url(url: &str) -> CanonicalRequest {
    get("/secret/api/v2/comment").with_query("url", url)
}

fn json_body(response: &CanonicalResponse) -> Value {
    serde_json::from_slice(&response.body).unwrap()
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let (state, source) = gateway(3);

    let response = dispatch(&state, get("/wrongtoken/api/v2/search/anime")).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(&response),
        json!({"errorCode": 401, "success": false, "errorMessage": "Unauthorized"})
    );
    assert_eq!(source.count("search_anime"), 0);
}

#[tokio::test]
async fn bare_root_needs_the_token() {
    let (state, _) = gateway(3);
    let response = dispatch(&state, get("/")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_path_is_normalized_before_routing() {
    let (state, source) = gateway(3);

    let request = get("/secret/search/anime").with_query("keyword", "frieren");
    let response = dispatch(&state, request).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(json_body(&response)["animes"][0]["animeId"], 12);

    let doubled = dispatch(&state, get("/secret/api/v2/api/v2/api/v2/search/anime")).await;
    assert_eq!(doubled.status, StatusCode::OK);

    assert_eq!(source.count("search_anime frieren"), 1);
    assert_eq!(source.count("search_anime"), 2);
}

#[tokio::test]
async fn favicon_and_robots_skip_auth() {
    let (state, _) = gateway(3);

    for path in ["/favicon.ico", "/robots.txt"] {
        for method in [Method::GET, Method::HEAD] {
            let response = dispatch(&state, CanonicalRequest::new(method, path)).await;
            assert_eq!(response.status, StatusCode::NO_CONTENT);
            assert!(response.body.is_empty());
        }
    }

    let post = dispatch(&state, CanonicalRequest::new(Method::POST, "/favicon.ico")).await;
    assert_eq!(post.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn homepage_behind_token() {
    let (state, _) = gateway(3);

    let response = dispatch(&state, get("/secret")).await;
    assert_eq!(response.status, StatusCode::OK);

    let body = json_body(&response);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["envs"]["rateLimitMaxRequests"], 3);
    assert_eq!(body["envs"]["token"], "se**et");
}

#[tokio::test]
async fn unknown_paths_and_methods_are_404() {
    let (state, source) = gateway(3);

    let unknown = dispatch(&state, get("/secret/api/v2/nothing")).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&unknown), json!({"message": "Not found"}));

    let wrong_method = dispatch(
        &state,
        CanonicalRequest::new(Method::POST, "/secret/api/v2/search/anime"),
    )
    .await;
    assert_eq!(wrong_method.status, StatusCode::NOT_FOUND);

    let get_match = dispatch(&state, get("/secret/api/v2/match")).await;
    assert_eq!(get_match.status, StatusCode::NOT_FOUND);

    let delete_comment = dispatch(
        &state,
        CanonicalRequest::new(Method::DELETE, "/secret/api/v2/comment/1"),
    )
    .await;
    assert_eq!(delete_comment.status, StatusCode::NOT_FOUND);

    let empty_bangumi = dispatch(&state, get("/secret/api/v2/bangumi")).await;
    assert_eq!(empty_bangumi.status, StatusCode::NOT_FOUND);

    assert_eq!(source.count(""), 0);
}

#[tokio::test]
async fn comment_without_id_or_url_is_400() {
    let (state, _) = gateway(3);

    let response = dispatch(&state, get("/secret/api/v2/comment")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(&response),
        json!({
            "errorCode": 400,
            "success": false,
            "errorMessage": "Missing commentId or url parameter"
        })
    );
    assert_eq!(state.limiter.recorded("9.9.9.9"), 0);
}

#[tokio::test]
async fn cache_hit_never_consumes_rate_limit() {
    let (state, source) = gateway(2);
    let cached = "https://www.bilibili.com/bangumi/play/ep1";
    state.cache.store(
        cached,
        vec![Comment {
            cid: 7,
            p: "1.00,1,255,[bilibili]".to_string(),
            m: "cached".to_string(),
        }],
    );

    // use up the budget on other urls
    for other in ["https://a/1", "https://a/2"] {
        let response = dispatch(&state, comment_url(other)).await;
        assert_eq!(response.status, StatusCode::OK);
    }
    let limited = dispatch(&state, comment_url("https://a/3")).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(&limited)["errorMessage"], "Too many requests, please try again later");

    for _ in 0..5 {
        let hit = dispatch(&state, comment_url(cached)).await;
        assert_eq!(hit.status, StatusCode::OK);
        assert_eq!(json_body(&hit)["comments"][0]["m"], "cached");
    }

    assert_eq!(state.limiter.recorded("9.9.9.9"), 2);
    assert_eq!(source.count(&format!("comments_by_url {}", cached)), 0);
    assert_eq!(source.count("comments_by_url https://a/3"), 0);
}

#[tokio::test]
async fn empty_cached_list_is_a_hit() {
    let (state, source) = gateway(1);
    state.cache.store("https://empty", Vec::new());

    for _ in 0..3 {
        let response = dispatch(&state, comment_url("https://empty")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(json_body(&response)["count"], 0);
    }
    assert_eq!(state.limiter.recorded("9.9.9.9"), 0);
    assert_eq!(source.count("comments_by_url"), 0);
}

#[tokio::test]
async fn url_miss_is_fetched_then_served_from_cache() {
    let (state, source) = gateway(3);
    let url = "https://www.youku.com/v/1";

    let first = dispatch(&state, comment_url(url)).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(json_body(&first)["count"], 1);

    let second = dispatch(&state, comment_url(url)).await;
    assert_eq!(second.status, StatusCode::OK);

    assert_eq!(source.count("comments_by_url"), 1);
    assert_eq!(state.limiter.recorded("9.9.9.9"), 1);
}

#[tokio::test]
async fn unknown_comment_id_falls_through_to_rate_limit() {
    let (state, source) = gateway(1);

    let response = dispatch(&state, get("/secret/api/v2/comment/999999")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(source.count("comments_by_id 999999"), 1);
    assert_eq!(state.limiter.recorded("9.9.9.9"), 1);

    let again = dispatch(&state, get("/secret/api/v2/comment/999999")).await;
    assert_eq!(again.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(source.count("comments_by_id"), 1);
}

#[tokio::test]
async fn resolved_id_uses_the_url_cache() {
    let (state, source) = gateway(1);

    let listing = dispatch(&state, get("/secret/api/v2/bangumi/12")).await;
    assert_eq!(listing.status, StatusCode::OK);
    assert_eq!(state.index.resolve(10001).as_deref(), Some(EP_URL));

    // miss: fetched by the resolved url and cached under it
    let first = dispatch(&state, get("/secret/comment/10001")).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(source.count(&format!("comments_by_url {}", EP_URL)), 1);

    // budget is spent, yet both id and url lookups still hit
    let by_id = dispatch(&state, get("/secret/api/v2/comment/10001")).await;
    assert_eq!(by_id.status, StatusCode::OK);
    let by_url = dispatch(&state, comment_url(EP_URL)).await;
    assert_eq!(by_url.status, StatusCode::OK);

    assert_eq!(state.limiter.recorded("9.9.9.9"), 1);
    assert_eq!(source.count("comments_by_url"), 1);
    assert_eq!(source.count("comments_by_id"), 0);
}

#[tokio::test]
async fn episode_listings_feed_the_index() {
    let (state, _) = gateway(3);

    let request = get("/secret/api/v2/search/episodes").with_query("anime", "x");
    let episodes = dispatch(&state, request).await;
    assert_eq!(episodes.status, StatusCode::OK);
    assert!(state.index.resolve(20001).is_some());

    let matched = dispatch(
        &state,
        CanonicalRequest::new(Method::POST, "/secret/api/v2/match")
            .with_body(r#"{"fileName":"Frieren S01E01.mkv"}"#),
    )
    .await;
    assert_eq!(matched.status, StatusCode::OK);
    assert_eq!(json_body(&matched)["received"]["fileName"], "Frieren S01E01.mkv");
    assert!(state.index.resolve(30001).is_some());
}

#[tokio::test]
async fn match_rejects_invalid_json() {
    let (state, source) = gateway(3);

    let response = dispatch(
        &state,
        CanonicalRequest::new(Method::POST, "/secret/api/v2/match").with_body("not json"),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&response)["success"], false);
    assert_eq!(source.count("match_anime"), 0);
}

#[tokio::test]
async fn disabled_limiter_admits_every_miss() {
    let (state, source) = gateway(0);

    for i in 0..20 {
        let url = format!("https://a/{}", i);
        let response = dispatch(&state, comment_url(&url)).await;
        assert_eq!(response.status, StatusCode::OK);
    }
    assert_eq!(source.count("comments_by_url"), 20);
    assert_eq!(state.limiter.tracked_clients(), 0);
}

#[tokio::test]
async fn xml_format_on_cache_hit() {
    let (state, _) = gateway(3);
    state.cache.store(
        "https://x",
        vec![Comment {
            cid: 1,
            p: "5.00,1,255,[x]".to_string(),
            m: "a<b".to_string(),
        }],
    );

    let response = dispatch(
        &state,
        get("/secret/api/v2/comment")
            .with_query("url", "https://x")
            .with_query("format", "xml"),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type, Some("application/xml; charset=utf-8"));
    let body = String::from_utf8(response.body.to_vec()).unwrap();
    assert!(body.contains("<d p=\"5.00,1,255,[x]\">a&lt;b</d>"));
}

#[tokio::test]
async fn upstream_timeout_keeps_the_consumed_slot() {
    let config = Config {
        token: "secret".to_string(),
        rate_limit: 1,
        request_timeout: Duration::from_millis(20),
        ..Default::default()
    };
    let (state, _) = gateway_with(
        config,
        StubSource {
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        },
    );

    let slow = dispatch(&state, comment_url("https://slow")).await;
    assert_eq!(slow.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(state.limiter.recorded("9.9.9.9"), 1);
    assert!(state.cache.lookup("https://slow").is_none());

    let retry = dispatch(&state, comment_url("https://slow")).await;
    assert_eq!(retry.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn upstream_failure_is_surfaced() {
    let (state, _) = gateway(3);

    let response = dispatch(&state, get("/secret/api/v2/bangumi/404")).await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(&response)["errorCode"], 502);
}

#[tokio::test]
async fn logs_are_plain_text() {
    let (state, _) = gateway(3);
    state.logs.push("[2026-01-01T00:00:00+00:00] INFO: started".to_string());

    let response = dispatch(&state, get("/secret/api/logs")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type, Some("text/plain; charset=utf-8"));
    assert_eq!(&response.body[..], b"[2026-01-01T00:00:00+00:00] INFO: started");
}

async fn send(app: axum::Router, uri: &str, forwarded_for: Option<&str>) -> StatusCode {
    let mut builder = Request::builder().uri(uri);
    if let Some(ip) = forwarded_for {
        builder = builder.header("x-forwarded-for", ip);
    }
    let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
    response.status()
}

async fn send_body(app: axum::Router, method: Method, uri: &str, body: Vec<u8>) -> StatusCode {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap().status()
}

const COMMENT_URI: &str = "/secret/api/v2/comment?url=https://a/";

#[tokio::test]
async fn router_limits_each_forwarded_client_separately() {
    let (state, _) = gateway(1);
    let app = router(Arc::clone(&state));
    let uri = |n: u32| format!("{}{}", COMMENT_URI, n);

    assert_eq!(
        send(app.clone(), &uri(1), Some("1.1.1.1")).await,
        StatusCode::OK
    );
    assert_eq!(
        send(app.clone(), &uri(2), Some("1.1.1.1")).await,
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(
        send(app.clone(), &uri(3), Some("2.2.2.2")).await,
        StatusCode::OK
    );

    // no address at all: everyone shares the "unknown" bucket
    assert_eq!(send(app.clone(), &uri(4), None).await, StatusCode::OK);
    assert_eq!(
        send(app.clone(), &uri(5), None).await,
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(state.limiter.recorded("unknown"), 1);
}

const OVERSIZED: usize = 3 * 1024 * 1024;

#[tokio::test]
async fn router_rejects_wrong_token_before_reading_the_body() {
    let (state, source) = gateway(3);
    let app = router(state);

    let status = send_body(
        app.clone(),
        Method::POST,
        "/wrongtoken/api/v2/match",
        vec![b'a'; OVERSIZED],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(source.count("match_anime"), 0);
}

#[tokio::test]
async fn router_answers_favicon_regardless_of_body() {
    let (state, _) = gateway(3);
    let app = router(state);

    for path in ["/favicon.ico", "/robots.txt"] {
        let status = send_body(app.clone(), Method::GET, path, vec![b'a'; OVERSIZED]).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}

#[tokio::test]
async fn router_reads_the_match_body_once_authorized() {
    let (state, source) = gateway(3);
    let app = router(state);

    let too_big = send_body(
        app.clone(),
        Method::POST,
        "/secret/api/v2/match",
        vec![b'a'; OVERSIZED],
    )
    .await;
    assert_eq!(too_big, StatusCode::BAD_REQUEST);

    let body = br#"{"fileName": "Frieren - 01.mkv"}"#.to_vec();
    let ok = send_body(app.clone(), Method::POST, "/secret/match", body).await;
    assert_eq!(ok, StatusCode::OK);
    assert_eq!(source.count("match_anime"), 1);
}

#[tokio::test]
async fn router_serves_json_errors() {
    let (state, _) = gateway(1);
    let app = router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/nope/api/v2/search/anime")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["errorCode"], 401);
}
