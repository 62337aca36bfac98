// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployStatus {
    /// The backend confirmed the new revision is serving.
    Ready,
    /// The backend accepted the request but has not confirmed it yet,
    /// e.g. a remote pipeline still running.
    Pending { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployResult {
    pub endpoint: String,
    pub status: DeployStatus,
}

/// Live view of a deployed function, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LiveInstance {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveResult {
    Removed,
    NotFound,
}

/// Deploys functions onto a cluster, directly or through a remote pipeline.
///
/// `deploy` must reconcile: deploying an already deployed function updates it
/// in place (new revision) instead of failing or creating a duplicate.
#[async_trait::async_trait]
pub trait DeployerStrategy: Send + Sync {
    /// Whether the target pulls from a registry, so the image must be pushed first.
    fn requires_registry(&self) -> bool {
        true
    }

    async fn deploy(&self, function: &crate::function::Function) -> anyhow::Result<DeployResult>;

    async fn describe(&self, name: &str, namespace: Option<&str>) -> anyhow::Result<Option<LiveInstance>>;

    async fn list(&self, namespace: Option<&str>) -> anyhow::Result<Vec<LiveInstance>>;

    async fn remove(&self, name: &str, namespace: Option<&str>) -> anyhow::Result<RemoveResult>;
}
