// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    /// Builder identifier recorded in the descriptor.
    pub builder: String,
    /// Image reference the build should produce.
    pub image: String,
    pub envs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildResult {
    pub reference: String,
    pub digest: String,
}

/// Builds a runnable image from the function source located at the project root.
#[async_trait::async_trait]
pub trait BuilderStrategy: Send + Sync {
    async fn build(&self, root: &std::path::Path, config: &BuildConfig) -> anyhow::Result<BuildResult>;
}
