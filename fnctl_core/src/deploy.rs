// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
use fnctl_api::deployer::DeployStatus;
use fnctl_api::error::{Error, Result, Stage};
use fnctl_api::function::{Deployment, Function};

#[derive(Debug, Clone, PartialEq)]
pub enum DeployOutcome {
    /// The backend confirmed the deployment, recorded in the descriptor.
    Deployed(Function),
    /// The backend accepted the request without confirming it. The
    /// descriptor is unchanged.
    Pending { function: Function, endpoint: String, detail: String },
}

impl DeployOutcome {
    pub fn function(&self) -> &Function {
        match self {
            DeployOutcome::Deployed(function) => function,
            DeployOutcome::Pending { function, .. } => function,
        }
    }
}

/// Reconcile the deployed state of the function with its current image.
///
/// `default_namespace` applies when the function sets none. It is handed to
/// the deployer and recorded with the deployment only; the function's own
/// configuration is saved as loaded.
pub async fn deploy(
    function: &Function,
    deployer: &dyn fnctl_api::deployer::DeployerStrategy,
    default_namespace: Option<&str>,
) -> Result<DeployOutcome> {
    if !function.is_built() {
        return Err(Error::precondition(Stage::Deploy, "no image built", Stage::Build));
    }
    if deployer.requires_registry() && !function.is_pushed() {
        return Err(Error::precondition(
            Stage::Deploy,
            "the current image has not been pushed and the target pulls from a registry",
            Stage::Push,
        ));
    }

    let mut target = function.clone();
    if target.namespace.is_none() {
        target.namespace = default_namespace.map(str::to_string);
    }
    log::info!("deploying '{}' to namespace {}", function.name, target.namespace.as_deref().unwrap_or("<default>"));
    let result = deployer.deploy(&target).await.map_err(|e| Error::backend(Stage::Deploy, e))?;

    match result.status {
        DeployStatus::Ready => {
            if result.endpoint.is_empty() {
                return Err(Error::backend(
                    Stage::Deploy,
                    anyhow::anyhow!("deployer reported '{}' ready without an endpoint", function.name),
                ));
            }
            let mut next = function.clone();
            next.deployed = Some(Deployment {
                endpoint: result.endpoint,
                namespace: target.namespace,
                deployed_at: chrono::Utc::now(),
            });
            crate::store::save(&mut next)?;
            log::info!("deployed '{}'", next.name);
            Ok(DeployOutcome::Deployed(next))
        }
        DeployStatus::Pending { detail } => {
            log::info!("deployment of '{}' not confirmed yet: {}", function.name, detail);
            Ok(DeployOutcome::Pending {
                function: function.clone(),
                endpoint: result.endpoint,
                detail,
            })
        }
    }
}
