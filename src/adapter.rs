// Translation between a hosting runtime's request/response types and the
// canonical ones the dispatcher works on.

use async_trait::async_trait;
use axum::body::{Body, Bytes, to_bytes};
use axum::extract::{ConnectInfo, Query, Request};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::error::GatewayError;
use crate::models::{CanonicalRequest, CanonicalResponse, UNKNOWN_CLIENT};

// One implementation per deployment target. The head (method, path, query,
// client) is converted first; the body is only read when `wants_body`
// accepts that head, so a rejected request never has its body buffered.
#[async_trait]
pub trait Adapter {
    type Request: Send;
    type Response;

    async fn to_canonical_request<W>(
        &self,
        request: Self::Request,
        wants_body: W,
    ) -> Result<CanonicalRequest, GatewayError>
    where
        W: FnOnce(&CanonicalRequest) -> bool + Send;

    fn from_canonical_response(&self, response: CanonicalResponse) -> Self::Response;
}

// Adapter for the axum/hyper server in `main`
pub struct AxumAdapter {
    body_limit: usize,
}

impl AxumAdapter {
    pub fn new(body_limit: usize) -> Self {
        Self { body_limit }
    }
}

impl Default for AxumAdapter {
    fn default() -> Self {
        Self::new(2 * 1024 * 1024)
    }
}

#[async_trait]
impl Adapter for AxumAdapter {
    type Request = Request;
    type Response = Response;

    async fn to_canonical_request<W>(
        &self,
        request: Request,
        wants_body: W,
    ) -> Result<CanonicalRequest, GatewayError>
    where
        W: FnOnce(&CanonicalRequest) -> bool + Send,
    {
        let (parts, body) = request.into_parts();

        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let mut canonical = CanonicalRequest {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query,
            body: Bytes::new(),
            client_ip: client_ip(&parts.headers, peer),
        };

        if wants_body(&canonical) {
            canonical.body = to_bytes(body, self.body_limit)
                .await
                .map_err(|e| GatewayError::InvalidBody(e.to_string()))?;
        }
        Ok(canonical)
    }

    fn from_canonical_response(&self, response: CanonicalResponse) -> Response {
        let CanonicalResponse {
            status,
            content_type,
            body,
        } = response;
        match content_type {
            Some(ct) => (status, [(header::CONTENT_TYPE, ct)], Body::from(body)).into_response(),
            None => (status, Body::from(body)).into_response(),
        }
    }
}

// Client identity for rate limiting: proxy headers first, then the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(ip) = header_value("cf-connecting-ip") {
        return ip.to_string();
    }
    if let Some(first) = header_value("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    if let Some(ip) = header_value("x-real-ip") {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
