// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT

#[derive(Debug, Clone, PartialEq)]
pub struct PushResult {
    pub registry_digest: String,
}

/// Publishes a built image to its registry.
#[async_trait::async_trait]
pub trait PusherStrategy: Send + Sync {
    async fn push(&self, reference: &str) -> anyhow::Result<PushResult>;
}
