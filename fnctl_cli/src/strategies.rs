// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
//! Strategies backed by external commands. Each command runs with `FNCTL_*`
//! environment variables describing the request and reports its result on
//! the last non-empty line of its standard output.
use fnctl_api::builder::{BuildConfig, BuildResult};
use fnctl_api::deployer::{DeployResult, DeployStatus, LiveInstance, RemoveResult};
use fnctl_api::function::Function;
use fnctl_api::pusher::PushResult;
use fnctl_api::runner::{ProcessHandle, StartedProcess};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const PENDING_PREFIX: &str = "pending";
pub const NOT_FOUND: &str = "not-found";

/// Run `argv` to completion and return its standard output.
async fn command_output(argv: &[String], dir: Option<&Path>, envs: &BTreeMap<String, String>) -> anyhow::Result<String> {
    let (program, args) = match argv.split_first() {
        Some(split) => split,
        None => anyhow::bail!("empty command"),
    };
    let mut command = tokio::process::Command::new(program);
    command.args(args).envs(envs).stdin(std::process::Stdio::null());
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    log::debug!("running {:?}", argv);
    let output = command
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("cannot execute '{}': {}", program, e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("'{}' failed with {}: {}", program, output.status, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Last non-empty line of the output of `argv`.
async fn run_command(argv: &[String], dir: Option<&Path>, envs: &BTreeMap<String, String>) -> anyhow::Result<String> {
    let stdout = command_output(argv, dir, envs).await?;
    Ok(stdout.lines().rev().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default().to_string())
}

fn function_envs(function: &Function) -> BTreeMap<String, String> {
    let mut envs = BTreeMap::new();
    envs.insert("FNCTL_ROOT".to_string(), function.root.to_string_lossy().to_string());
    envs.insert("FNCTL_NAME".to_string(), function.name.clone());
    envs.insert("FNCTL_RUNTIME".to_string(), function.runtime.clone());
    if let Some(namespace) = &function.namespace {
        envs.insert("FNCTL_NAMESPACE".to_string(), namespace.clone());
    }
    envs
}

fn target_envs(name: &str, namespace: Option<&str>) -> BTreeMap<String, String> {
    let mut envs = BTreeMap::new();
    envs.insert("FNCTL_NAME".to_string(), name.to_string());
    if let Some(namespace) = namespace {
        envs.insert("FNCTL_NAMESPACE".to_string(), namespace.to_string());
    }
    envs
}

/// Prints the digest of the image it built.
pub struct CommandBuilder {
    command: Vec<String>,
}

impl CommandBuilder {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait::async_trait]
impl fnctl_api::builder::BuilderStrategy for CommandBuilder {
    async fn build(&self, root: &Path, config: &BuildConfig) -> anyhow::Result<BuildResult> {
        let mut envs = config.envs.clone();
        envs.insert("FNCTL_ROOT".to_string(), root.to_string_lossy().to_string());
        envs.insert("FNCTL_IMAGE".to_string(), config.image.clone());
        envs.insert("FNCTL_BUILDER".to_string(), config.builder.clone());
        let digest = run_command(&self.command, Some(root), &envs).await?;
        if digest.is_empty() {
            anyhow::bail!("build command printed no digest");
        }
        Ok(BuildResult {
            reference: config.image.clone(),
            digest,
        })
    }
}

/// Prints the digest assigned by the registry.
pub struct CommandPusher {
    command: Vec<String>,
}

impl CommandPusher {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait::async_trait]
impl fnctl_api::pusher::PusherStrategy for CommandPusher {
    async fn push(&self, reference: &str) -> anyhow::Result<PushResult> {
        let mut envs = BTreeMap::new();
        envs.insert("FNCTL_IMAGE".to_string(), reference.to_string());
        let registry_digest = run_command(&self.command, None, &envs).await?;
        if registry_digest.is_empty() {
            anyhow::bail!("push command printed no registry digest");
        }
        Ok(PushResult { registry_digest })
    }
}

pub struct CommandDeployer {
    settings: crate::config::DeploySettings,
}

impl CommandDeployer {
    pub fn new(settings: crate::config::DeploySettings) -> Self {
        Self { settings }
    }
}

/// `<endpoint>` or `pending <endpoint> [detail]`.
fn parse_deploy_output(line: &str) -> anyhow::Result<DeployResult> {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        None => anyhow::bail!("deploy command printed no endpoint"),
        Some(PENDING_PREFIX) => {
            let endpoint = tokens.next().unwrap_or_default().to_string();
            let detail = tokens.collect::<Vec<_>>().join(" ");
            Ok(DeployResult {
                endpoint,
                status: DeployStatus::Pending {
                    detail: if detail.is_empty() {
                        "not confirmed by the deployer".to_string()
                    } else {
                        detail
                    },
                },
            })
        }
        Some(endpoint) => Ok(DeployResult {
            endpoint: endpoint.to_string(),
            status: DeployStatus::Ready,
        }),
    }
}

#[async_trait::async_trait]
impl fnctl_api::deployer::DeployerStrategy for CommandDeployer {
    fn requires_registry(&self) -> bool {
        self.settings.requires_registry
    }

    async fn deploy(&self, function: &Function) -> anyhow::Result<DeployResult> {
        let command = match &self.settings.command {
            Some(command) => command,
            None => anyhow::bail!("no deploy command configured"),
        };
        let mut envs = function_envs(function);
        envs.extend(function.run.envs.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(built) = &function.built {
            envs.insert("FNCTL_IMAGE".to_string(), built.reference.clone());
            envs.insert("FNCTL_DIGEST".to_string(), built.digest.clone());
        }
        if let Some(pushed) = function.pushed.as_ref().filter(|_| function.is_pushed()) {
            envs.insert("FNCTL_REGISTRY_DIGEST".to_string(), pushed.registry_digest.clone());
        }
        parse_deploy_output(&run_command(command, Some(&function.root), &envs).await?)
    }

    async fn describe(&self, name: &str, namespace: Option<&str>) -> anyhow::Result<Option<LiveInstance>> {
        let command = match &self.settings.describe_command {
            Some(command) => command,
            None => {
                log::warn!("no describe command configured, cannot describe '{}'", name);
                return Ok(None);
            }
        };
        let line = run_command(command, None, &target_envs(name, namespace)).await?;
        let mut tokens = line.split_whitespace();
        let (endpoint, ready) = match tokens.next() {
            None => return Ok(None),
            Some(PENDING_PREFIX) => (tokens.next().map(str::to_string), false),
            Some(endpoint) => (Some(endpoint.to_string()), true),
        };
        Ok(Some(LiveInstance {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            endpoint,
            ready,
        }))
    }

    async fn list(&self, namespace: Option<&str>) -> anyhow::Result<Vec<LiveInstance>> {
        let command = match &self.settings.list_command {
            Some(command) => command,
            None => {
                log::warn!("no list command configured, nothing to list");
                return Ok(vec![]);
            }
        };
        let mut envs = BTreeMap::new();
        if let Some(namespace) = namespace {
            envs.insert("FNCTL_NAMESPACE".to_string(), namespace.to_string());
        }
        // One instance per line.
        Ok(command_output(command, None, &envs)
            .await?
            .lines()
            .filter_map(|line| {
                let mut tokens = line.split_whitespace();
                let name = tokens.next()?;
                let endpoint = tokens.next().map(str::to_string);
                Some(LiveInstance {
                    name: name.to_string(),
                    namespace: namespace.map(str::to_string),
                    ready: endpoint.is_some(),
                    endpoint,
                })
            })
            .collect())
    }

    async fn remove(&self, name: &str, namespace: Option<&str>) -> anyhow::Result<RemoveResult> {
        let command = match &self.settings.remove_command {
            Some(command) => command,
            None => {
                log::warn!("no remove command configured, '{}' is treated as not deployed", name);
                return Ok(RemoveResult::NotFound);
            }
        };
        match run_command(command, None, &target_envs(name, namespace)).await?.as_str() {
            NOT_FOUND => Ok(RemoveResult::NotFound),
            _ => Ok(RemoveResult::Removed),
        }
    }
}

struct RunningProcess {
    kill: futures::channel::oneshot::Sender<()>,
    monitor: tokio::task::JoinHandle<()>,
}

/// Starts the configured command in the function root with `PORT` set.
pub struct CommandRunner {
    settings: crate::config::RunSettings,
    processes: tokio::sync::Mutex<HashMap<uuid::Uuid, RunningProcess>>,
}

impl CommandRunner {
    pub fn new(settings: crate::config::RunSettings) -> Self {
        Self {
            settings,
            processes: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    fn pick_port(&self, requested: Option<u16>) -> anyhow::Result<u16> {
        if let Some(port) = requested {
            return Ok(port);
        }
        if std::net::TcpListener::bind(("127.0.0.1", self.settings.default_port)).is_ok() {
            return Ok(self.settings.default_port);
        }
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
        let port = listener.local_addr()?.port();
        log::info!("port {} is taken, using {}", self.settings.default_port, port);
        Ok(port)
    }
}

#[async_trait::async_trait]
impl fnctl_api::runner::RunnerStrategy for CommandRunner {
    async fn start(&self, function: &Function, port: Option<u16>) -> anyhow::Result<StartedProcess> {
        let argv = match &self.settings.command {
            Some(argv) => argv,
            None => anyhow::bail!("no run command configured"),
        };
        let (program, args) = match argv.split_first() {
            Some(split) => split,
            None => anyhow::bail!("empty command"),
        };
        let port = self.pick_port(port)?;

        let mut envs = function_envs(function);
        envs.extend(function.run.envs.iter().map(|(k, v)| (k.clone(), v.clone())));
        envs.insert("PORT".to_string(), port.to_string());
        envs.insert("FNCTL_PORT".to_string(), port.to_string());

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .envs(&envs)
            .current_dir(&function.root)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("cannot execute '{}': {}", program, e))?;

        tokio::time::sleep(std::time::Duration::from_millis(self.settings.start_delay_ms)).await;
        if let Some(status) = child.try_wait()? {
            anyhow::bail!("'{}' exited during start with {}", program, status);
        }

        let handle = ProcessHandle::new(child.id());
        let (sender, receiver) = futures::channel::mpsc::unbounded();
        let (kill, killed) = futures::channel::oneshot::channel::<()>();
        let name = function.name.clone();
        let monitor = tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if status.success() => log::info!("'{}' exited", name),
                    Ok(status) => {
                        let _ = sender.unbounded_send(anyhow::anyhow!("'{}' exited with {}", name, status));
                    }
                    Err(err) => {
                        let _ = sender.unbounded_send(anyhow::anyhow!("cannot wait for '{}': {}", name, err));
                    }
                },
                _ = killed => {
                    if let Err(err) = child.kill().await {
                        log::warn!("cannot kill '{}': {}", name, err);
                    }
                }
            }
            // Dropping the sender tells the job the process is gone.
            drop(sender);
        });
        self.processes.lock().await.insert(handle.id, RunningProcess { kill, monitor });

        Ok(StartedProcess {
            handle,
            port,
            errors: receiver,
        })
    }

    async fn stop(&self, handle: &ProcessHandle) -> anyhow::Result<()> {
        let process = match self.processes.lock().await.remove(&handle.id) {
            Some(process) => process,
            None => return Ok(()),
        };
        // The monitor is gone if the process exited on its own.
        let _ = process.kill.send(());
        process.monitor.await?;
        Ok(())
    }
}
