// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ensures a marker is released once, by either `Job::stop` or the
/// forwarding task observing the process exit, whichever comes first.
#[derive(Clone, Default)]
pub(crate) struct MarkerGuard {
    released: Arc<AtomicBool>,
}

impl MarkerGuard {
    pub(crate) fn release(&self, registry: &dyn fnctl_api::registry::JobRegistry, port: u16) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = registry.release(port) {
            log::warn!("could not remove the marker of port {}: {}", port, err);
        }
    }
}

/// A locally running instance of a function, bound to a port.
pub struct Job {
    function: fnctl_api::function::Function,
    port: u16,
    errors: futures::channel::mpsc::UnboundedReceiver<anyhow::Error>,
    registry: Arc<dyn fnctl_api::registry::JobRegistry>,
    runner: Arc<dyn fnctl_api::runner::RunnerStrategy>,
    handle: Option<fnctl_api::runner::ProcessHandle>,
    marker: MarkerGuard,
}

impl Job {
    pub(crate) fn new(
        function: fnctl_api::function::Function,
        port: u16,
        errors: futures::channel::mpsc::UnboundedReceiver<anyhow::Error>,
        registry: Arc<dyn fnctl_api::registry::JobRegistry>,
        runner: Arc<dyn fnctl_api::runner::RunnerStrategy>,
        handle: fnctl_api::runner::ProcessHandle,
        marker: MarkerGuard,
    ) -> Self {
        Self {
            function,
            port,
            errors,
            registry,
            runner,
            handle: Some(handle),
            marker,
        }
    }

    pub fn function(&self) -> &fnctl_api::function::Function {
        &self.function
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_none()
    }

    /// Runtime errors of the process.
    ///
    /// The stream ends (`None`) when the process exited or the job was
    /// stopped; while it is pending the process is still running.
    pub fn errors(&mut self) -> &mut futures::channel::mpsc::UnboundedReceiver<anyhow::Error> {
        &mut self.errors
    }

    pub async fn next_error(&mut self) -> Option<anyhow::Error> {
        self.errors.next().await
    }

    /// Remove the marker and terminate the process. Safe to call repeatedly
    /// and after the process exited on its own.
    pub async fn stop(&mut self) {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return,
        };
        log::info!("stopping '{}' on port {}", self.function.name, self.port);
        self.marker.release(self.registry.as_ref(), self.port);
        if let Err(err) = self.runner.stop(&handle).await {
            log::warn!("runner failed to stop '{}' on port {}: {:#}", self.function.name, self.port, err);
        }
        self.errors.close();
    }
}
