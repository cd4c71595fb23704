use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::error::GatewayError;
use crate::models::{Comment, CommentList};

// Downstream handlers doing the actual search / match / comment retrieval
#[async_trait]
pub trait DanmuSource: Send + Sync {
    async fn search_anime(&self, query: &HashMap<String, String>) -> Result<Value, GatewayError>;
    async fn search_episodes(&self, query: &HashMap<String, String>)
    -> Result<Value, GatewayError>;
    async fn match_anime(&self, body: Value) -> Result<Value, GatewayError>;
    async fn bangumi(&self, anime_id: &str) -> Result<Value, GatewayError>;
    async fn comments_by_url(&self, url: &str) -> Result<Vec<Comment>, GatewayError>;
    async fn comments_by_id(&self, id: i64) -> Result<Vec<Comment>, GatewayError>;
}

// Forwards every call to a danmu API service speaking the same /api/v2 surface
pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| GatewayError::Upstream(format!("bad upstream url: {}", e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, GatewayError> {
        debug!(%url, "calling upstream");
        let response = self.client.get(url).send().await.map_err(upstream_error)?;
        decode(response).await
    }
}

fn pairs(query: &HashMap<String, String>) -> Vec<(&str, &str)> {
    query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

fn upstream_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::UpstreamTimeout
    } else {
        GatewayError::Upstream(e.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::Upstream(format!(
            "upstream responded with status {}",
            status.as_u16()
        )));
    }
    response.json::<T>().await.map_err(upstream_error)
}

#[async_trait]
impl DanmuSource for HttpSource {
    async fn search_anime(&self, query: &HashMap<String, String>) -> Result<Value, GatewayError> {
        let url = self.url("/api/v2/search/anime", &pairs(query))?;
        self.get_json(url).await
    }

    async fn search_episodes(
        &self,
        query: &HashMap<String, String>,
    ) -> Result<Value, GatewayError> {
        let url = self.url("/api/v2/search/episodes", &pairs(query))?;
        self.get_json(url).await
    }

    async fn match_anime(&self, body: Value) -> Result<Value, GatewayError> {
        let url = self.url("/api/v2/match", &[])?;
        debug!(%url, "calling upstream");
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(upstream_error)?;
        decode(response).await
    }

    async fn bangumi(&self, anime_id: &str) -> Result<Value, GatewayError> {
        let url = self.url(&format!("/api/v2/bangumi/{}", anime_id), &[])?;
        self.get_json(url).await
    }

    async fn comments_by_url(&self, url: &str) -> Result<Vec<Comment>, GatewayError> {
        let target = self.url("/api/v2/comment", &[("url", url), ("format", "json")])?;
        let list: CommentList = self.get_json(target).await?;
        Ok(list.comments)
    }

    async fn comments_by_id(&self, id: i64) -> Result<Vec<Comment>, GatewayError> {
        let target = self.url(&format!("/api/v2/comment/{}", id), &[("format", "json")])?;
        let list: CommentList = self.get_json(target).await?;
        Ok(list.comments)
    }
}
