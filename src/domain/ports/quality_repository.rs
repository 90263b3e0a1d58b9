//! Quality snapshot/baseline repository port.

use async_trait::async_trait;

use crate::domain::error::SwarmResult;
use crate::domain::models::{QualityBaseline, QualitySnapshot};

#[async_trait]
pub trait QualityRepository: Send + Sync {
    async fn record_snapshot(&self, snapshot: &QualitySnapshot) -> SwarmResult<()>;

    async fn get_snapshot(&self, id: &str) -> SwarmResult<Option<QualitySnapshot>>;

    async fn list_snapshots_for_task(&self, task_id: &str) -> SwarmResult<Vec<QualitySnapshot>>;

    async fn get_baseline(&self, scope: &str) -> SwarmResult<Option<QualityBaseline>>;

    async fn set_baseline(&self, baseline: &QualityBaseline) -> SwarmResult<()>;
}
