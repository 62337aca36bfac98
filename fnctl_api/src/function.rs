// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SPEC_VERSION: &str = "1";

/// File, relative to the project root, holding the descriptor.
pub const DESCRIPTOR_FILE: &str = "func.toml";

/// Directory, relative to the project root, holding run data (instance markers).
pub const RUN_DATA_DIR: &str = ".func";

pub const DEFAULT_RUNTIME: &str = "go";
pub const DEFAULT_BUILDER: &str = "default";
pub const DEFAULT_REGISTRY: &str = "docker.io";

const MAX_NAME_LEN: usize = 63;

/// How the function expects to be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvokeStyle {
    /// Plain request/response over HTTP.
    #[default]
    Http,
    /// Event-driven, the payload is delivered as a CloudEvent.
    CloudEvent,
}

impl std::fmt::Display for InvokeStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvokeStyle::Http => write!(f, "http"),
            InvokeStyle::CloudEvent => write!(f, "cloudevent"),
        }
    }
}

impl std::str::FromStr for InvokeStyle {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(InvokeStyle::Http),
            "cloudevent" => Ok(InvokeStyle::CloudEvent),
            _ => Err(crate::error::Error::InvalidInput(format!(
                "invocation style '{}' not supported, expected 'http' or 'cloudevent'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BuildSpec {
    /// Identifier of the builder strategy the function is built with.
    pub builder: String,
    #[serde(default)]
    pub envs: BTreeMap<String, String>,
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self {
            builder: DEFAULT_BUILDER.to_string(),
            envs: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunSpec {
    #[serde(default)]
    pub envs: BTreeMap<String, String>,
}

/// Result of the last successful build. Reference and digest are always
/// recorded together.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BuiltImage {
    pub reference: String,
    pub digest: String,
    pub builder: String,
    pub built_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PushedImage {
    pub reference: String,
    pub registry_digest: String,
    pub pushed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Deployment {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub deployed_at: chrono::DateTime<chrono::Utc>,
}

/// Persisted descriptor of a function project.
///
/// Scalar fields come first so that the TOML rendering keeps all plain keys
/// above the `[build]`, `[run]`, `[built]`, `[pushed]` and `[deployed]` tables.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Function {
    /// Project root. Not persisted: it is the directory holding the descriptor.
    #[serde(skip)]
    pub root: PathBuf,
    pub spec_version: String,
    pub name: String,
    pub runtime: String,
    #[serde(default)]
    pub invoke: InvokeStyle,
    pub created: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Repository used to derive the image reference, `namespace` or `registry/namespace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    /// Explicit image reference, takes precedence over derivation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Incremented by every save, see `fnctl_core::store`.
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub build: BuildSpec,
    #[serde(default)]
    pub run: RunSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built: Option<BuiltImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed: Option<PushedImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed: Option<Deployment>,
}

impl Function {
    pub fn new(root: &Path, name: &str, runtime: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            spec_version: SPEC_VERSION.to_string(),
            name: name.to_string(),
            runtime: runtime.to_string(),
            invoke: InvokeStyle::default(),
            created: chrono::Utc::now(),
            namespace: None,
            registry: None,
            image: None,
            generation: 0,
            build: BuildSpec::default(),
            run: RunSpec::default(),
            built: None,
            pushed: None,
            deployed: None,
        }
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.root.join(DESCRIPTOR_FILE)
    }

    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// True if the last push published the currently built image.
    pub fn is_pushed(&self) -> bool {
        match (&self.built, &self.pushed) {
            (Some(built), Some(pushed)) => built.reference == pushed.reference,
            _ => false,
        }
    }

    /// Image reference a build should produce.
    ///
    /// Precedence: explicit `image`, then derivation from the function's own
    /// registry or `default_registry`, then the reference of a previous build.
    pub fn target_image(&self, default_registry: Option<&str>) -> crate::error::Result<String> {
        if let Some(image) = self.image.as_ref().filter(|i| !i.is_empty()) {
            return Ok(image.clone());
        }
        match self.registry.as_deref().or(default_registry).filter(|r| !r.trim().is_empty()) {
            Some(registry) => derive_image(registry, &self.name),
            None => match &self.built {
                Some(built) => Ok(built.reference.clone()),
                None => Err(crate::error::Error::InvalidInput(
                    "a registry is required to derive the image reference, e.g. 'docker.io/alice' or 'alice'".to_string(),
                )),
            },
        }
    }

    /// Check invariants a parsed descriptor must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        if self.spec_version != SPEC_VERSION {
            return Err(format!("unsupported spec_version '{}', expected '{}'", self.spec_version, SPEC_VERSION));
        }
        if self.name.is_empty() {
            return Err("function name is empty".to_string());
        }
        if let Some(built) = &self.built {
            if built.reference.is_empty() || built.digest.is_empty() {
                return Err("built image must carry both a reference and a digest".to_string());
            }
        }
        if let Some(pushed) = &self.pushed {
            if pushed.reference.is_empty() || pushed.registry_digest.is_empty() {
                return Err("pushed image must carry both a reference and a registry digest".to_string());
            }
        }
        if let Some(deployed) = &self.deployed {
            if deployed.endpoint.is_empty() {
                return Err("deployment must carry an endpoint".to_string());
            }
        }
        Ok(())
    }
}

/// Derive an image reference from a repository and a function name.
///
/// `alice` gives `docker.io/alice/<name>:latest`,
/// `quay.io/alice` gives `quay.io/alice/<name>:latest`.
pub fn derive_image(registry: &str, name: &str) -> crate::error::Result<String> {
    let registry = registry.trim().trim_matches('/');
    let tokens: Vec<&str> = registry.split('/').collect();
    if registry.is_empty() || tokens.iter().any(|t| t.is_empty()) {
        return Err(crate::error::Error::InvalidInput(format!("invalid registry '{}'", registry)));
    }
    let image = match tokens.len() {
        1 => format!("{}/{}/{}", DEFAULT_REGISTRY, registry, name),
        2 => format!("{}/{}", registry, name),
        _ => {
            return Err(crate::error::Error::InvalidInput(format!(
                "registry should be either 'namespace' or 'registry/namespace', got '{}'",
                registry
            )))
        }
    };
    Ok(format!("{}:latest", image))
}

/// Validate a function name: lowercase alphanumerics and '-', starting with a letter.
pub fn validate_name(name: &str) -> crate::error::Result<()> {
    let invalid = |reason: &str| Err(crate::error::Error::InvalidInput(format!("invalid function name '{}': {}", name, reason)));
    let first = match name.chars().next() {
        Some(c) => c,
        None => return invalid("name cannot be empty"),
    };
    if name.len() > MAX_NAME_LEN {
        return invalid("name is longer than 63 characters");
    }
    if !first.is_ascii_lowercase() {
        return invalid("name must start with a lowercase letter");
    }
    if let Some(c) = name.chars().find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')) {
        return invalid(&format!("invalid character '{}'", c));
    }
    if name.ends_with('-') {
        return invalid("name cannot end with '-'");
    }
    Ok(())
}

/// Name derived from the last component of the project root.
pub fn derive_name(root: &Path) -> Option<String> {
    root.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_lowercase().replace(['_', '.', ' '], "-"))
        .filter(|n| validate_name(n).is_ok())
}
