// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT

/// Cross-process registry of the ports on which instances of one function run.
///
/// Implementations must make `claim` exclusive: of two racing claims for the
/// same port exactly one succeeds, the other gets `Error::ResourceConflict`.
pub trait JobRegistry: Send + Sync {
    fn claim(&self, port: u16) -> crate::error::Result<()>;

    /// Release a claim. Releasing a port that is not claimed is not an error.
    fn release(&self, port: u16) -> crate::error::Result<()>;

    /// Claimed ports, ascending.
    fn list(&self) -> crate::error::Result<Vec<u16>>;
}

/// Hands out the registry scoped to a project root.
pub trait RegistryProvider: Send + Sync {
    fn registry_for(&self, root: &std::path::Path) -> std::sync::Arc<dyn JobRegistry>;
}
