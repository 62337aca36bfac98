// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
use crate::deploy::DeployOutcome;
use fnctl_api::deployer::{LiveInstance, RemoveResult};
use fnctl_api::error::{Error, Result, Stage};
use fnctl_api::function::{Function, InvokeStyle, DEFAULT_RUNTIME};
use fnctl_api::invoker::{InvokeMessage, InvokeResponse};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const TARGET_LOCAL: &str = "local";
pub const TARGET_REMOTE: &str = "remote";

/// Settings of a new function project.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub root: PathBuf,
    pub name: Option<String>,
    pub runtime: Option<String>,
    pub registry: Option<String>,
    pub namespace: Option<String>,
    pub image: Option<String>,
    pub invoke: Option<InvokeStyle>,
}

/// Stages chained before deploying in `Client::apply`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stages {
    pub build: bool,
    pub push: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NothingDeployed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Released,
    NotRunning,
}

/// Point-in-time description of a function, locally and on the cluster.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Description {
    pub name: String,
    /// Project root, absent when described by name only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub local_ports: Vec<u16>,
    /// Live state reported by the deployer, authoritative.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed: Option<LiveInstance>,
    /// Endpoint recorded by the last deploy, informational.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_endpoint: Option<String>,
    /// The descriptor records a deployment the deployer does not report.
    pub stale: bool,
}

/// Public lifecycle API over a function project.
///
/// Every operation loads the descriptor from disk and persists what it
/// changes before returning, so that later invocations, possibly in other
/// processes, observe the latest state.
pub struct Client {
    builder: Box<dyn fnctl_api::builder::BuilderStrategy>,
    pusher: Box<dyn fnctl_api::pusher::PusherStrategy>,
    deployer: Box<dyn fnctl_api::deployer::DeployerStrategy>,
    runner: Arc<dyn fnctl_api::runner::RunnerStrategy>,
    invoker: Option<Box<dyn fnctl_api::invoker::InvokerStrategy>>,
    registries: Box<dyn fnctl_api::registry::RegistryProvider>,
    registry: Option<String>,
    namespace: Option<String>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self {
            builder: Box::new(crate::unconfigured::UnconfiguredBuilder {}),
            pusher: Box::new(crate::unconfigured::UnconfiguredPusher {}),
            deployer: Box::new(crate::unconfigured::UnconfiguredDeployer {}),
            runner: Arc::new(crate::unconfigured::UnconfiguredRunner {}),
            invoker: None,
            registries: Box::new(crate::registry::FileRegistryProvider::default()),
            registry: None,
            namespace: None,
        }
    }

    pub fn with_builder(mut self, builder: Box<dyn fnctl_api::builder::BuilderStrategy>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_pusher(mut self, pusher: Box<dyn fnctl_api::pusher::PusherStrategy>) -> Self {
        self.pusher = pusher;
        self
    }

    pub fn with_deployer(mut self, deployer: Box<dyn fnctl_api::deployer::DeployerStrategy>) -> Self {
        self.deployer = deployer;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn fnctl_api::runner::RunnerStrategy>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_invoker(mut self, invoker: Box<dyn fnctl_api::invoker::InvokerStrategy>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn with_registry_provider(mut self, registries: Box<dyn fnctl_api::registry::RegistryProvider>) -> Self {
        self.registries = registries;
        self
    }

    /// Default repository used to derive image references, e.g. `quay.io/alice`.
    pub fn with_registry(mut self, registry: Option<String>) -> Self {
        self.registry = registry;
        self
    }

    /// Default deployment namespace for functions that do not set one.
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    /// Create a new function project, writing its descriptor.
    pub fn init(&self, options: InitOptions) -> Result<Function> {
        let root = fnctl_api::util::absolute_root(&options.root).map_err(|e| Error::io(&options.root, e))?;
        if crate::store::descriptor_path(&root).exists() {
            return Err(Error::AlreadyInitialized(root));
        }
        assert_effectively_empty(&root)?;

        let name = match options.name {
            Some(name) => name,
            None => fnctl_api::function::derive_name(&root).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "cannot derive a function name from '{}', provide one explicitly",
                    root.display()
                ))
            })?,
        };
        fnctl_api::function::validate_name(&name)?;

        let runtime = options.runtime.filter(|r| !r.is_empty()).unwrap_or_else(|| DEFAULT_RUNTIME.to_string());
        let mut function = Function::new(&root, &name, &runtime);
        function.invoke = options.invoke.unwrap_or_default();
        function.registry = options.registry.filter(|r| !r.is_empty());
        function.namespace = options.namespace.filter(|n| !n.is_empty());
        function.image = options.image.filter(|i| !i.is_empty());
        if let Some(registry) = &function.registry {
            fnctl_api::function::derive_image(registry, &name)?;
        }

        std::fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;
        crate::store::save(&mut function)?;
        log::info!("initialized '{}' at {}", function.name, root.display());
        Ok(function)
    }

    pub async fn build(&self, root: &Path) -> Result<Function> {
        let function = crate::store::load(root)?;
        crate::build::build(&function, self.builder.as_ref(), self.registry.as_deref()).await
    }

    pub async fn push(&self, root: &Path) -> Result<Function> {
        let function = crate::store::load(root)?;
        crate::push::push(&function, self.pusher.as_ref()).await
    }

    /// Deploy the last build of the function.
    pub async fn deploy(&self, root: &Path) -> Result<DeployOutcome> {
        let function = crate::store::load(root)?;
        self.deploy_loaded(function).await
    }

    /// Build, push and deploy in one invocation. Each chained stage works on
    /// the descriptor produced by the previous one; the first failure stops
    /// the chain.
    pub async fn apply(&self, root: &Path, stages: Stages) -> Result<DeployOutcome> {
        let mut function = crate::store::load(root)?;
        if stages.build {
            function = crate::build::build(&function, self.builder.as_ref(), self.registry.as_deref()).await?;
        }
        if stages.push {
            function = crate::push::push(&function, self.pusher.as_ref()).await?;
        }
        self.deploy_loaded(function).await
    }

    async fn deploy_loaded(&self, function: Function) -> Result<DeployOutcome> {
        crate::deploy::deploy(&function, self.deployer.as_ref(), self.namespace.as_deref()).await
    }

    /// Run the function locally, on `port` if given.
    pub async fn run(&self, root: &Path, port: Option<u16>) -> Result<crate::job::Job> {
        let function = crate::store::load(root)?;
        let registry = self.registries.registry_for(&function.root);
        crate::run::run(&function, self.runner.clone(), registry, port).await
    }

    /// Ports of the local instances of the function at `root`.
    pub fn instances(&self, root: &Path) -> Result<Vec<u16>> {
        let root = fnctl_api::util::absolute_root(root).map_err(|e| Error::io(root, e))?;
        let registry = self.registries.registry_for(&root);
        crate::run::job_ports(&root, registry.as_ref())
    }

    /// Release the marker of an instance started by another process, e.g.
    /// one that was killed without cleaning up. The process itself, if still
    /// alive, is not terminated.
    pub fn stop(&self, root: &Path, port: u16) -> Result<StopOutcome> {
        let function = crate::store::load(root)?;
        let registry = self.registries.registry_for(&function.root);
        if !registry.list()?.contains(&port) {
            return Ok(StopOutcome::NotRunning);
        }
        registry.release(port)?;
        log::info!("released marker of port {} of '{}', the process (if any) was not terminated", port, function.name);
        Ok(StopOutcome::Released)
    }

    /// Send `message` to the function.
    ///
    /// `target` selects the instance: `local`, `remote`, empty for local
    /// first then remote, anything else is used verbatim as URL.
    pub async fn invoke(&self, root: &Path, target: &str, message: &InvokeMessage) -> Result<InvokeResponse> {
        let function = crate::store::load(root)?;
        let route = self.invocation_route(&function, target).await?;
        let format = message.format.unwrap_or(function.invoke);
        log::info!("invoking '{}' at {} ({})", function.name, route, format);

        let result = match &self.invoker {
            Some(invoker) => invoker.invoke(&route, format, message).await,
            None => {
                let invoker = crate::http_invoker::HttpInvoker::new().map_err(|e| Error::backend(Stage::Invoke, e))?;
                fnctl_api::invoker::InvokerStrategy::invoke(&invoker, &route, format, message).await
            }
        };
        result.map_err(|e| Error::backend(Stage::Invoke, e))
    }

    async fn invocation_route(&self, function: &Function, target: &str) -> Result<String> {
        match target {
            TARGET_LOCAL => self
                .local_route(function)?
                .ok_or_else(|| Error::precondition(Stage::Invoke, "the function is not running locally", Stage::Run)),
            TARGET_REMOTE => self
                .remote_route(function)
                .await?
                .ok_or_else(|| Error::precondition(Stage::Invoke, "the function is not deployed", Stage::Deploy)),
            "" => {
                if let Some(route) = self.local_route(function)? {
                    return Ok(route);
                }
                self.remote_route(function).await?.ok_or_else(|| {
                    Error::precondition(Stage::Invoke, "the function is neither running locally nor deployed", Stage::Run)
                })
            }
            url => Ok(url.to_string()),
        }
    }

    fn local_route(&self, function: &Function) -> Result<Option<String>> {
        let registry = self.registries.registry_for(&function.root);
        let ports = crate::run::job_ports(&function.root, registry.as_ref())?;
        Ok(ports.first().map(|port| format!("http://localhost:{}/", port)))
    }

    async fn remote_route(&self, function: &Function) -> Result<Option<String>> {
        let live = self
            .deployer
            .describe(&function.name, self.effective_namespace(function).as_deref())
            .await
            .map_err(|e| Error::backend(Stage::Invoke, e))?;
        Ok(live.filter(|l| l.ready).and_then(|l| l.endpoint))
    }

    /// Functions currently deployed, as reported by the deployer.
    pub async fn list(&self, namespace: Option<&str>) -> Result<Vec<LiveInstance>> {
        let namespace = namespace.or(self.namespace.as_deref());
        self.deployer.list(namespace).await.map_err(|e| Error::backend(Stage::List, e))
    }

    /// Resolve the function addressed by `name` and/or `root`.
    ///
    /// With a root, its descriptor is loaded and a given name must match it.
    /// A name alone addresses a deployment without a local project, as does
    /// a name with a root that was never initialized.
    fn resolve(&self, name: Option<&str>, root: Option<&Path>) -> Result<(String, Option<Function>)> {
        let name = name.filter(|n| !n.is_empty());
        let root = match root {
            Some(root) => root,
            None => {
                return match name {
                    Some(name) => Ok((name.to_string(), None)),
                    None => Err(Error::InvalidInput("a function name or project root is required".to_string())),
                }
            }
        };
        match (crate::store::load(root), name) {
            (Ok(function), Some(name)) if name != function.name => Err(Error::InvalidInput(format!(
                "name '{}' does not match the function '{}' at '{}'",
                name,
                function.name,
                function.root.display()
            ))),
            (Ok(function), _) => Ok((function.name.clone(), Some(function))),
            (Err(Error::NotInitialized(_)), Some(name)) => Ok((name.to_string(), None)),
            (Err(err), _) => Err(err),
        }
    }

    /// Describe a function by `name`, by project `root` or both, reconciling
    /// the descriptor with the deployer's live state. The live state wins; a
    /// descriptor claiming a deployment the deployer does not know is flagged
    /// as stale.
    pub async fn describe(&self, name: Option<&str>, root: Option<&Path>) -> Result<Description> {
        let (name, function) = self.resolve(name, root)?;
        let namespace = match &function {
            Some(function) => self.effective_namespace(function),
            None => self.namespace.clone(),
        };
        let deployed = self
            .deployer
            .describe(&name, namespace.as_deref())
            .await
            .map_err(|e| Error::backend(Stage::Describe, e))?;

        let function = match function {
            Some(function) => function,
            None => {
                return Ok(Description {
                    name,
                    root: None,
                    runtime: None,
                    image: None,
                    digest: None,
                    local_ports: vec![],
                    deployed,
                    recorded_endpoint: None,
                    stale: false,
                })
            }
        };

        let registry = self.registries.registry_for(&function.root);
        let local_ports = crate::run::job_ports(&function.root, registry.as_ref())?;
        let stale = function.deployed.is_some() && deployed.is_none();
        if stale {
            log::warn!("'{}' is recorded as deployed but the deployer does not report it", function.name);
        }

        Ok(Description {
            name,
            root: Some(function.root.clone()),
            runtime: Some(function.runtime.clone()),
            image: function.built.as_ref().map(|b| b.reference.clone()),
            digest: function.built.as_ref().map(|b| b.digest.clone()),
            local_ports,
            deployed,
            recorded_endpoint: function.deployed.as_ref().map(|d| d.endpoint.clone()),
            stale,
        })
    }

    /// Remove the deployed function, addressed like in `describe`. Nothing
    /// deployed is a successful no-op. Build state is kept, only the deploy
    /// state of a local descriptor is cleared.
    pub async fn remove(&self, name: Option<&str>, root: Option<&Path>) -> Result<RemoveOutcome> {
        let (name, function) = self.resolve(name, root)?;
        let namespace = match &function {
            Some(function) => self.effective_namespace(function),
            None => self.namespace.clone(),
        };
        log::info!("removing '{}'", name);
        let result = self
            .deployer
            .remove(&name, namespace.as_deref())
            .await
            .map_err(|e| Error::backend(Stage::Remove, e))?;

        if let Some(mut next) = function.filter(|f| f.deployed.is_some()) {
            next.deployed = None;
            crate::store::save(&mut next)?;
        }

        Ok(match result {
            RemoveResult::Removed => RemoveOutcome::Removed,
            RemoveResult::NotFound => RemoveOutcome::NothingDeployed,
        })
    }

    fn effective_namespace(&self, function: &Function) -> Option<String> {
        function
            .deployed
            .as_ref()
            .and_then(|d| d.namespace.clone())
            .or_else(|| function.namespace.clone())
            .or_else(|| self.namespace.clone())
    }
}

/// A root can be initialized if it does not exist yet or holds only hidden files.
fn assert_effectively_empty(root: &Path) -> Result<()> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(Error::io(root, err)),
    };
    let mut visible = vec![];
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(root, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with('.') {
            visible.push(name);
        }
    }
    if visible.is_empty() {
        Ok(())
    } else {
        visible.sort();
        Err(Error::InvalidInput(format!(
            "'{}' must be empty of visible files before it can be initialized, found: {}",
            root.display(),
            visible.join(", ")
        )))
    }
}

#[cfg(test)]
mod test;
