// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT

pub const DEFAULT_RUN_PORT: u16 = 8080;
pub const DEFAULT_START_DELAY_MS: u64 = 500;

/// Settings of the `fnctl` command-line interface.
///
/// Every strategy is backed by an external command given as argv. A stage
/// without a command falls back to the unconfigured strategy, which fails
/// with an explanatory error.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CliSettings {
    /// Repository used to derive image references, `namespace` or `registry/namespace`.
    #[serde(default)]
    pub registry: Option<String>,
    /// Namespace used by functions that do not set their own.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub build: CommandSettings,
    #[serde(default)]
    pub push: CommandSettings,
    #[serde(default)]
    pub deploy: DeploySettings,
    #[serde(default)]
    pub run: RunSettings,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommandSettings {
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DeploySettings {
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub describe_command: Option<Vec<String>>,
    #[serde(default)]
    pub list_command: Option<Vec<String>>,
    #[serde(default)]
    pub remove_command: Option<Vec<String>>,
    /// False for targets that consume the local image directly.
    #[serde(default = "default_true")]
    pub requires_registry: bool,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            command: None,
            describe_command: None,
            list_command: None,
            remove_command: None,
            requires_registry: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RunSettings {
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// Port tried first when none is requested; if taken an ephemeral one is used.
    #[serde(default = "default_run_port")]
    pub default_port: u16,
    /// Time the process must survive to be considered started.
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            command: None,
            default_port: DEFAULT_RUN_PORT,
            start_delay_ms: DEFAULT_START_DELAY_MS,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_run_port() -> u16 {
    DEFAULT_RUN_PORT
}

fn default_start_delay_ms() -> u64 {
    DEFAULT_START_DELAY_MS
}

impl CliSettings {
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let settings: CliSettings = toml::from_str(raw)?;
        for (stage, command) in [
            ("build", &settings.build.command),
            ("push", &settings.push.command),
            ("deploy", &settings.deploy.command),
            ("deploy.describe", &settings.deploy.describe_command),
            ("deploy.list", &settings.deploy.list_command),
            ("deploy.remove", &settings.deploy.remove_command),
            ("run", &settings.run.command),
        ] {
            if let Some(command) = command {
                if command.is_empty() || command[0].is_empty() {
                    anyhow::bail!("empty command configured for {}", stage);
                }
            }
        }
        Ok(settings)
    }

    /// Read the settings from `path`; a missing file gives the defaults.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw).map_err(|e| anyhow::anyhow!("invalid configuration file {}: {}", path, e)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("configuration file {} not found, using defaults", path);
                Ok(Self::default())
            }
            Err(err) => Err(anyhow::anyhow!("cannot read configuration file {}: {}", path, err)),
        }
    }
}

pub fn fnctl_cli_default_conf() -> String {
    String::from(
        r##"# Repository used to derive image references: "namespace" or "registry/namespace".
#registry = "docker.io/alice"
#namespace = "default"

# Each command receives FNCTL_* environment variables and reports its result
# on the last line of its standard output.

[build]
# Prints the image digest. Receives FNCTL_ROOT, FNCTL_IMAGE, FNCTL_BUILDER.
#command = ["sh", "-c", "pack build $FNCTL_IMAGE --path $FNCTL_ROOT --builder $FNCTL_BUILDER >&2 && docker image inspect -f '{{.Id}}' $FNCTL_IMAGE"]

[push]
# Prints the registry digest. Receives FNCTL_IMAGE.
#command = ["sh", "-c", "docker push $FNCTL_IMAGE >&2 && docker image inspect -f '{{index .RepoDigests 0}}' $FNCTL_IMAGE"]

[deploy]
# Prints the endpoint, or "pending <endpoint> <detail>" if not confirmed yet.
#command = ["./deploy.sh"]
# Prints "<endpoint>" or "pending <endpoint>", nothing if not deployed.
#describe_command = ["./describe.sh"]
# Prints one "<name> <endpoint>" line per deployed function.
#list_command = ["./list.sh"]
# Prints "not-found" if there was nothing to remove.
#remove_command = ["./remove.sh"]
requires_registry = true

[run]
# Started in the function root with PORT set.
#command = ["go", "run", "."]
default_port = 8080
start_delay_ms = 500
"##,
    )
}
