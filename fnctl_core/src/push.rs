// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
use fnctl_api::error::{Error, Result, Stage};
use fnctl_api::function::{Function, PushedImage};

/// Push the built image of the function and record the registry digest.
pub async fn push(function: &Function, pusher: &dyn fnctl_api::pusher::PusherStrategy) -> Result<Function> {
    let built = match &function.built {
        Some(built) => built,
        None => return Err(Error::precondition(Stage::Push, "nothing to push, no image built", Stage::Build)),
    };

    log::info!("pushing {}", built.reference);
    let result = pusher.push(&built.reference).await.map_err(|e| Error::backend(Stage::Push, e))?;
    if result.registry_digest.is_empty() {
        return Err(Error::backend(
            Stage::Push,
            anyhow::anyhow!("pusher returned no registry digest for {}", built.reference),
        ));
    }

    let mut next = function.clone();
    next.pushed = Some(PushedImage {
        reference: built.reference.clone(),
        registry_digest: result.registry_digest,
        pushed_at: chrono::Utc::now(),
    });
    crate::store::save(&mut next)?;
    log::info!("pushed '{}'", next.name);
    Ok(next)
}
