// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

/// Lifecycle stage, used to tag failures and to suggest the missing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Init,
    Build,
    Push,
    Deploy,
    Run,
    Invoke,
    Describe,
    List,
    Remove,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Build => "build",
            Stage::Push => "push",
            Stage::Deploy => "deploy",
            Stage::Run => "run",
            Stage::Invoke => "invoke",
            Stage::Describe => "describe",
            Stage::List => "list",
            Stage::Remove => "remove",
        };
        write!(f, "{}", name)
    }
}

/// Who is expected to act on an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request cannot be satisfied as given: wrong path, missing stage, taken port.
    User,
    /// A backend, the filesystem or the persisted state failed.
    System,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no function initialized at '{}': run init first", .0.display())]
    NotInitialized(PathBuf),

    #[error("function at '{}' is already initialized", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("corrupt state in '{}': {detail}", .path.display())]
    CorruptState { path: PathBuf, detail: String },

    #[error("cannot {stage}: {missing}; run {suggestion} first")]
    PreconditionFailed { stage: Stage, missing: String, suggestion: Stage },

    #[error("{stage} failed: {source:#}")]
    Backend {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("port {port} is already claimed by another instance of the function at '{}'", .root.display())]
    ResourceConflict { root: PathBuf, port: u16 },

    #[error(
        "descriptor '{}' was modified concurrently (generation on disk {found}, loaded {expected}): reload and retry",
        .path.display()
    )]
    Conflict { path: PathBuf, expected: u64, found: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn backend(stage: Stage, source: anyhow::Error) -> Self {
        Error::Backend { stage, source }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub fn precondition(stage: Stage, missing: &str, suggestion: Stage) -> Self {
        Error::PreconditionFailed {
            stage,
            missing: missing.to_string(),
            suggestion,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotInitialized(_)
            | Error::AlreadyInitialized(_)
            | Error::PreconditionFailed { .. }
            | Error::ResourceConflict { .. }
            | Error::Conflict { .. }
            | Error::InvalidInput(_) => ErrorKind::User,
            Error::CorruptState { .. } | Error::Backend { .. } | Error::Io { .. } => ErrorKind::System,
        }
    }

    /// Stage whose backend failed, if this is a backend failure.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Error::Backend { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
