// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT

/// Opaque handle identifying a process started by a runner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    pub id: uuid::Uuid,
    pub pid: Option<u32>,
}

impl ProcessHandle {
    pub fn new(pid: Option<u32>) -> Self {
        Self { id: uuid::Uuid::new_v4(), pid }
    }
}

/// A process confirmed started by a runner.
///
/// The runner keeps the sending side of `errors` for as long as the process
/// lives and drops it when the process exits, which closes the channel.
pub struct StartedProcess {
    pub handle: ProcessHandle,
    pub port: u16,
    pub errors: futures::channel::mpsc::UnboundedReceiver<anyhow::Error>,
}

/// Runs a function locally for development.
#[async_trait::async_trait]
pub trait RunnerStrategy: Send + Sync {
    /// Start the function, on `port` if given. Returns once the process is
    /// confirmed started, not when it exits.
    async fn start(&self, function: &crate::function::Function, port: Option<u16>) -> anyhow::Result<StartedProcess>;

    /// Terminate a process. Must tolerate processes that already exited and
    /// repeated calls.
    async fn stop(&self, handle: &ProcessHandle) -> anyhow::Result<()>;
}
