//! Remote replica sync client port: the HTTP boundary the `SyncEngine`
//! pushes changes through and pulls remote changes from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::SwarmResult;
use crate::domain::models::ChangeLogEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub changes: Vec<ChangeLogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub accepted: u64,
    pub server_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    pub changes: Vec<ChangeLogEntry>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait SyncClient: Send + Sync {
    async fn push(&self, request: PushRequest) -> SwarmResult<PushResponse>;

    async fn pull(&self, cursor: Option<String>, limit: u32) -> SwarmResult<PullResponse>;

    /// Cheap reachability probe used to gate whether the offline queue
    /// should be drained right now (S6).
    async fn health_check(&self) -> SwarmResult<bool>;
}
