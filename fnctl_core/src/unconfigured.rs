// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
//! Strategies a `Client` starts with until real ones are provided. Stages that
//! would need a backend fail with an explanatory error; read-only queries
//! report that nothing is deployed.
use fnctl_api::builder::{BuildConfig, BuildResult};
use fnctl_api::deployer::{DeployResult, LiveInstance, RemoveResult};
use fnctl_api::function::Function;
use fnctl_api::pusher::PushResult;
use fnctl_api::runner::{ProcessHandle, StartedProcess};

pub struct UnconfiguredBuilder {}

#[async_trait::async_trait]
impl fnctl_api::builder::BuilderStrategy for UnconfiguredBuilder {
    async fn build(&self, _root: &std::path::Path, _config: &BuildConfig) -> anyhow::Result<BuildResult> {
        anyhow::bail!("no builder configured")
    }
}

pub struct UnconfiguredPusher {}

#[async_trait::async_trait]
impl fnctl_api::pusher::PusherStrategy for UnconfiguredPusher {
    async fn push(&self, _reference: &str) -> anyhow::Result<PushResult> {
        anyhow::bail!("no pusher configured")
    }
}

pub struct UnconfiguredDeployer {}

#[async_trait::async_trait]
impl fnctl_api::deployer::DeployerStrategy for UnconfiguredDeployer {
    async fn deploy(&self, _function: &Function) -> anyhow::Result<DeployResult> {
        anyhow::bail!("no deployer configured")
    }

    async fn describe(&self, name: &str, _namespace: Option<&str>) -> anyhow::Result<Option<LiveInstance>> {
        log::warn!("no deployer configured, cannot describe '{}'", name);
        Ok(None)
    }

    async fn list(&self, _namespace: Option<&str>) -> anyhow::Result<Vec<LiveInstance>> {
        log::warn!("no deployer configured, nothing to list");
        Ok(vec![])
    }

    async fn remove(&self, name: &str, _namespace: Option<&str>) -> anyhow::Result<RemoveResult> {
        log::warn!("no deployer configured, nothing to remove for '{}'", name);
        Ok(RemoveResult::NotFound)
    }
}

pub struct UnconfiguredRunner {}

#[async_trait::async_trait]
impl fnctl_api::runner::RunnerStrategy for UnconfiguredRunner {
    async fn start(&self, _function: &Function, _port: Option<u16>) -> anyhow::Result<StartedProcess> {
        anyhow::bail!("no runner configured")
    }

    async fn stop(&self, _handle: &ProcessHandle) -> anyhow::Result<()> {
        Ok(())
    }
}
