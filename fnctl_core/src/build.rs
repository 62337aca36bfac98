// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
use fnctl_api::error::{Error, Result, Stage};
use fnctl_api::function::{BuiltImage, Function};

/// Build the function and record the resulting image in its descriptor.
///
/// Returns the updated descriptor. On failure nothing is written and the
/// given descriptor stays the authoritative state.
pub async fn build(
    function: &Function,
    builder: &dyn fnctl_api::builder::BuilderStrategy,
    default_registry: Option<&str>,
) -> Result<Function> {
    let config = fnctl_api::builder::BuildConfig {
        builder: function.build.builder.clone(),
        image: function.target_image(default_registry)?,
        envs: function.build.envs.clone(),
    };

    log::info!("building '{}' as {} with builder '{}'", function.name, config.image, config.builder);
    let result = builder
        .build(&function.root, &config)
        .await
        .map_err(|e| Error::backend(Stage::Build, e))?;
    if result.reference.is_empty() || result.digest.is_empty() {
        return Err(Error::backend(
            Stage::Build,
            anyhow::anyhow!("builder returned an incomplete image (reference '{}', digest '{}')", result.reference, result.digest),
        ));
    }

    let mut next = function.clone();
    let unchanged = matches!(&function.built, Some(prev) if prev.reference == result.reference && prev.digest == result.digest);
    if !unchanged && next.pushed.take().is_some() {
        log::debug!("discarding push record of the previous image of '{}'", function.name);
    }
    next.built = Some(BuiltImage {
        reference: result.reference,
        digest: result.digest,
        builder: config.builder,
        built_at: chrono::Utc::now(),
    });
    crate::store::save(&mut next)?;

    if let Some(built) = &next.built {
        log::info!("built '{}': {}@{}", next.name, built.reference, built.digest);
    }
    Ok(next)
}
