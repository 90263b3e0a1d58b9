//! HTTP client for the remote coordination-plane replica.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;

use crate::domain::error::SwarmResult;
use crate::domain::ports::sync_client::{PullResponse, PushRequest, PushResponse};
use crate::domain::ports::SyncClient;

/// HTTP client for the remote replica, reused across push/pull/health
/// calls for connection pooling.
pub struct HttpSyncClient {
    http_client: ReqwestClient,
    base_url: String,
    api_key: String,
}

impl HttpSyncClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> SwarmResult<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()?;

        Ok(Self { http_client, base_url: base_url.into(), api_key: api_key.into() })
    }
}

#[async_trait]
impl SyncClient for HttpSyncClient {
    async fn push(&self, request: PushRequest) -> SwarmResult<PushResponse> {
        let response = self
            .http_client
            .post(format!("{}/sync/push", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<PushResponse>().await?)
    }

    async fn pull(&self, cursor: Option<String>, limit: u32) -> SwarmResult<PullResponse> {
        let mut request = self.http_client.get(format!("{}/sync/pull", self.base_url)).bearer_auth(&self.api_key).query(&[("limit", limit.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<PullResponse>().await?)
    }

    async fn health_check(&self) -> SwarmResult<bool> {
        match self.http_client.get(format!("{}/health", self.base_url)).bearer_auth(&self.api_key).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}
