use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Client id used when the adapter could not find any address
pub const UNKNOWN_CLIENT: &str = "unknown";

// A single danmu entry: cid, packed display params, text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub cid: i64,
    pub p: String,
    pub m: String,
}

// Comment list as the upstream danmu API returns it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentList {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

// Deployment-agnostic request handed to the dispatcher
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Bytes,
    pub client_ip: String,
}

impl CanonicalRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            body: Bytes::new(),
            client_ip: UNKNOWN_CLIENT.to_string(),
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = ip.into();
        self
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

// Deployment-agnostic response produced by the dispatcher
#[derive(Debug, Clone)]
pub struct CanonicalResponse {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub body: Bytes,
}

impl CanonicalResponse {
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
        Self {
            status,
            content_type: Some("application/json; charset=utf-8"),
            body: Bytes::from(body),
        }
    }

    pub fn text(status: StatusCode, body: String) -> Self {
        Self {
            status,
            content_type: Some("text/plain; charset=utf-8"),
            body: Bytes::from(body),
        }
    }

    pub fn xml(status: StatusCode, body: String) -> Self {
        Self {
            status,
            content_type: Some("application/xml; charset=utf-8"),
            body: Bytes::from(body),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            content_type: None,
            body: Bytes::new(),
        }
    }
}
