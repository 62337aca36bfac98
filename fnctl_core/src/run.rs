// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
use fnctl_api::error::{Error, Result, Stage};
use futures::StreamExt;
use std::sync::Arc;

/// Start a local instance of `function` and register it.
///
/// The marker is written only after the runner confirmed the start. If
/// another instance claimed the same port meanwhile, the process just
/// started is stopped again and `ResourceConflict` is returned.
pub async fn run(
    function: &fnctl_api::function::Function,
    runner: Arc<dyn fnctl_api::runner::RunnerStrategy>,
    registry: Arc<dyn fnctl_api::registry::JobRegistry>,
    port: Option<u16>,
) -> Result<crate::job::Job> {
    if let Some(port) = port {
        if registry.list()?.contains(&port) {
            return Err(Error::ResourceConflict {
                root: function.root.clone(),
                port,
            });
        }
    }

    log::info!("starting '{}' locally", function.name);
    let started = runner.start(function, port).await.map_err(|e| Error::backend(Stage::Run, e))?;
    if let Some(requested) = port {
        if requested != started.port {
            log::warn!("requested port {} but the runner bound {}", requested, started.port);
        }
    }

    if let Err(err) = registry.claim(started.port) {
        log::warn!("could not register '{}' on port {}: {}", function.name, started.port, err);
        if let Err(stop_err) = runner.stop(&started.handle).await {
            log::error!("could not stop the unregistered process on port {}: {:#}", started.port, stop_err);
        }
        return Err(err);
    }
    log::info!("'{}' running on port {}", function.name, started.port);

    let (sender, receiver) = futures::channel::mpsc::unbounded();
    let marker = crate::job::MarkerGuard::default();
    let forwarder_marker = marker.clone();
    let forwarder_registry = registry.clone();
    let port = started.port;
    let name = function.name.clone();
    let mut events = started.errors;
    tokio::spawn(async move {
        while let Some(err) = events.next().await {
            log::warn!("'{}' on port {}: {:#}", name, port, err);
            // The job may be gone or stopped, the process is still drained.
            let _ = sender.unbounded_send(err);
        }
        log::info!("'{}' on port {} exited", name, port);
        forwarder_marker.release(forwarder_registry.as_ref(), port);
    });

    Ok(crate::job::Job::new(
        function.clone(),
        started.port,
        receiver,
        registry,
        runner,
        started.handle,
        marker,
    ))
}

/// Ports on which instances of the function at `root` are running.
///
/// A root without a function is not running anything, which is reported as
/// an empty list rather than an error. A corrupt descriptor is an error.
pub fn job_ports(root: &std::path::Path, registry: &dyn fnctl_api::registry::JobRegistry) -> Result<Vec<u16>> {
    if root.as_os_str().is_empty() {
        return Ok(vec![]);
    }
    match crate::store::load(root) {
        Ok(_) => registry.list(),
        Err(Error::NotInitialized(_)) => Ok(vec![]),
        Err(err) => Err(err),
    }
}
