// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
use super::*;
use fnctl_api::builder::{BuildConfig, BuildResult};
use fnctl_api::deployer::{DeployResult, DeployStatus};
use fnctl_api::pusher::PushResult;
use fnctl_api::runner::{ProcessHandle, StartedProcess};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Build(String),
    Push(String),
    Deploy(String),
    Describe(String),
    Remove(String),
    Start(Option<u16>),
    Stop(uuid::Uuid),
    Invoke(String, InvokeStyle),
}

type Calls = Arc<Mutex<Vec<Call>>>;

fn record(calls: &Calls, call: Call) {
    calls.lock().unwrap().push(call);
}

/// Returns its results in order, repeating the last one. No results at all
/// make every build fail.
struct MockBuilder {
    calls: Calls,
    results: Vec<BuildResult>,
    builds: Mutex<usize>,
}

#[async_trait::async_trait]
impl fnctl_api::builder::BuilderStrategy for MockBuilder {
    async fn build(&self, _root: &Path, config: &BuildConfig) -> anyhow::Result<BuildResult> {
        record(&self.calls, Call::Build(config.image.clone()));
        let mut builds = self.builds.lock().unwrap();
        let index = (*builds).min(self.results.len().saturating_sub(1));
        *builds += 1;
        match self.results.get(index) {
            Some(result) => Ok(result.clone()),
            None => anyhow::bail!("pack exited with status 1"),
        }
    }
}

struct MockPusher {
    calls: Calls,
}

#[async_trait::async_trait]
impl fnctl_api::pusher::PusherStrategy for MockPusher {
    async fn push(&self, reference: &str) -> anyhow::Result<PushResult> {
        record(&self.calls, Call::Push(reference.to_string()));
        Ok(PushResult {
            registry_digest: "sha256:pushed".to_string(),
        })
    }
}

struct MockDeployer {
    calls: Calls,
    requires_registry: bool,
    status: DeployStatus,
    live: Arc<Mutex<HashMap<String, LiveInstance>>>,
}

#[async_trait::async_trait]
impl fnctl_api::deployer::DeployerStrategy for MockDeployer {
    fn requires_registry(&self) -> bool {
        self.requires_registry
    }

    async fn deploy(&self, function: &Function) -> anyhow::Result<DeployResult> {
        record(&self.calls, Call::Deploy(function.name.clone()));
        let endpoint = "https://fn.example".to_string();
        if self.status == DeployStatus::Ready {
            self.live.lock().unwrap().insert(
                function.name.clone(),
                LiveInstance {
                    name: function.name.clone(),
                    namespace: function.namespace.clone(),
                    endpoint: Some(endpoint.clone()),
                    ready: true,
                },
            );
        }
        Ok(DeployResult {
            endpoint,
            status: self.status.clone(),
        })
    }

    async fn describe(&self, name: &str, _namespace: Option<&str>) -> anyhow::Result<Option<LiveInstance>> {
        record(&self.calls, Call::Describe(name.to_string()));
        Ok(self.live.lock().unwrap().get(name).cloned())
    }

    async fn list(&self, namespace: Option<&str>) -> anyhow::Result<Vec<LiveInstance>> {
        let mut instances: Vec<LiveInstance> = self
            .live
            .lock()
            .unwrap()
            .values()
            .filter(|l| namespace.is_none() || l.namespace.as_deref() == namespace)
            .cloned()
            .collect();
        instances.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(instances)
    }

    async fn remove(&self, name: &str, _namespace: Option<&str>) -> anyhow::Result<RemoveResult> {
        record(&self.calls, Call::Remove(name.to_string()));
        match self.live.lock().unwrap().remove(name) {
            Some(_) => Ok(RemoveResult::Removed),
            None => Ok(RemoveResult::NotFound),
        }
    }
}

/// Pretends to start processes. Keeps the sending side of each process's
/// error channel so that tests can emit errors or simulate an exit.
struct MockRunner {
    calls: Calls,
    next_port: Mutex<u16>,
    senders: Arc<Mutex<HashMap<u16, futures::channel::mpsc::UnboundedSender<anyhow::Error>>>>,
}

impl MockRunner {
    fn new(calls: Calls) -> Self {
        Self {
            calls,
            next_port: Mutex::new(8080),
            senders: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn exit(&self, port: u16) {
        self.senders.lock().unwrap().remove(&port);
    }

    fn fail(&self, port: u16, message: &str) {
        let senders = self.senders.lock().unwrap();
        senders[&port].unbounded_send(anyhow::anyhow!(message.to_string())).unwrap();
    }
}

#[async_trait::async_trait]
impl fnctl_api::runner::RunnerStrategy for MockRunner {
    async fn start(&self, _function: &Function, port: Option<u16>) -> anyhow::Result<StartedProcess> {
        record(&self.calls, Call::Start(port));
        let port = match port {
            Some(port) => port,
            None => {
                let mut next = self.next_port.lock().unwrap();
                let port = *next;
                *next += 1;
                port
            }
        };
        let (sender, receiver) = futures::channel::mpsc::unbounded();
        self.senders.lock().unwrap().insert(port, sender);
        Ok(StartedProcess {
            handle: ProcessHandle::new(Some(port as u32)),
            port,
            errors: receiver,
        })
    }

    async fn stop(&self, handle: &ProcessHandle) -> anyhow::Result<()> {
        record(&self.calls, Call::Stop(handle.id));
        if let Some(pid) = handle.pid {
            self.senders.lock().unwrap().remove(&(pid as u16));
        }
        Ok(())
    }
}

struct MockInvoker {
    calls: Calls,
}

#[async_trait::async_trait]
impl fnctl_api::invoker::InvokerStrategy for MockInvoker {
    async fn invoke(&self, route: &str, format: InvokeStyle, message: &InvokeMessage) -> anyhow::Result<InvokeResponse> {
        record(&self.calls, Call::Invoke(route.to_string(), format));
        let mut metadata = BTreeMap::new();
        metadata.insert("content-type".to_string(), vec![message.content_type.clone()]);
        Ok(InvokeResponse {
            metadata,
            body: message.data.clone(),
        })
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    calls: Calls,
    runner: Arc<MockRunner>,
    live: Arc<Mutex<HashMap<String, LiveInstance>>>,
    client: Client,
}

impl Fixture {
    fn root(&self) -> PathBuf {
        self.dir.path().join("hello")
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn deploy_calls(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Deploy(_))).count()
    }
}

fn fixture_with(build: Option<BuildResult>, status: DeployStatus, requires_registry: bool) -> Fixture {
    fixture_with_builds(build.into_iter().collect(), status, requires_registry)
}

fn fixture_with_builds(builds: Vec<BuildResult>, status: DeployStatus, requires_registry: bool) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let calls: Calls = Arc::new(Mutex::new(vec![]));
    let runner = Arc::new(MockRunner::new(calls.clone()));
    let live = Arc::new(Mutex::new(HashMap::new()));
    let client = Client::new()
        .with_builder(Box::new(MockBuilder {
            calls: calls.clone(),
            results: builds,
            builds: Mutex::new(0),
        }))
        .with_pusher(Box::new(MockPusher { calls: calls.clone() }))
        .with_deployer(Box::new(MockDeployer {
            calls: calls.clone(),
            requires_registry,
            status,
            live: live.clone(),
        }))
        .with_runner(runner.clone())
        .with_invoker(Box::new(MockInvoker { calls: calls.clone() }))
        .with_registry(Some("alice".to_string()));
    Fixture {
        dir: tempfile::tempdir().unwrap(),
        calls,
        runner,
        live,
        client,
    }
}

fn stub_build() -> Option<BuildResult> {
    Some(BuildResult {
        reference: "img:v1".to_string(),
        digest: "abc123".to_string(),
    })
}

fn fixture() -> Fixture {
    fixture_with(stub_build(), DeployStatus::Ready, false)
}

fn init(f: &Fixture) -> Function {
    f.client
        .init(InitOptions {
            root: f.root(),
            ..Default::default()
        })
        .unwrap()
}

#[test]
fn init_applies_defaults() {
    let f = fixture();
    let function = init(&f);
    assert_eq!(function.name, "hello");
    assert_eq!(function.runtime, DEFAULT_RUNTIME);
    assert_eq!(function.invoke, InvokeStyle::Http);
    assert_eq!(function.build.builder, fnctl_api::function::DEFAULT_BUILDER);
    assert_eq!(function.generation, 1);
    assert_eq!(crate::store::load(&f.root()).unwrap(), function);
}

#[test]
fn init_twice_is_rejected() {
    let f = fixture();
    init(&f);
    let err = f
        .client
        .init(InitOptions {
            root: f.root(),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyInitialized(_)));
}

#[test]
fn init_refuses_directories_with_visible_files() {
    let f = fixture();
    std::fs::create_dir_all(f.root()).unwrap();
    std::fs::write(f.root().join(".gitignore"), "target\n").unwrap();
    std::fs::write(f.root().join("main.go"), "package main\n").unwrap();
    match f.client.init(InitOptions {
        root: f.root(),
        ..Default::default()
    }) {
        Err(Error::InvalidInput(detail)) => assert!(detail.contains("main.go")),
        other => panic!("unexpected {:?}", other),
    }
    assert!(!crate::store::initialized(&f.root()));
}

#[test]
fn init_validates_names() {
    let f = fixture();
    let err = f
        .client
        .init(InitOptions {
            root: f.root(),
            name: Some("Hello_World".to_string()),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let function = f
        .client
        .init(InitOptions {
            root: f.root(),
            name: Some("greeter".to_string()),
            runtime: Some("rust".to_string()),
            invoke: Some(InvokeStyle::CloudEvent),
            namespace: Some("dev".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(function.name, "greeter");
    assert_eq!(function.runtime, "rust");
    assert_eq!(function.invoke, InvokeStyle::CloudEvent);
    assert_eq!(function.namespace.as_deref(), Some("dev"));
}

#[tokio::test]
async fn operations_on_uninitialized_root_fail() {
    let f = fixture();
    assert!(matches!(f.client.build(&f.root()).await, Err(Error::NotInitialized(_))));
    assert!(matches!(f.client.deploy(&f.root()).await, Err(Error::NotInitialized(_))));
    assert!(matches!(f.client.run(&f.root(), None).await, Err(Error::NotInitialized(_))));
    assert!(f.calls().is_empty());
}

#[tokio::test]
async fn build_deploy_remove_scenario() {
    let f = fixture();
    init(&f);

    let built = f.client.build(&f.root()).await.unwrap();
    assert_eq!(f.calls(), vec![Call::Build("docker.io/alice/hello:latest".to_string())]);
    let on_disk = crate::store::load(&f.root()).unwrap();
    assert_eq!(on_disk, built);
    let image = on_disk.built.clone().unwrap();
    assert_eq!(image.reference, "img:v1");
    assert_eq!(image.digest, "abc123");

    let outcome = f.client.deploy(&f.root()).await.unwrap();
    assert!(matches!(outcome, DeployOutcome::Deployed(_)));
    let on_disk = crate::store::load(&f.root()).unwrap();
    assert_eq!(on_disk.deployed.as_ref().unwrap().endpoint, "https://fn.example");

    assert_eq!(f.client.remove(None, Some(&f.root())).await.unwrap(), RemoveOutcome::Removed);
    let on_disk = crate::store::load(&f.root()).unwrap();
    assert!(on_disk.deployed.is_none());
    assert_eq!(on_disk.built, Some(image));
}

#[tokio::test]
async fn deploy_without_image_never_reaches_deployer() {
    let f = fixture();
    init(&f);
    match f.client.deploy(&f.root()).await {
        Err(Error::PreconditionFailed { stage, suggestion, .. }) => {
            assert_eq!(stage, Stage::Deploy);
            assert_eq!(suggestion, Stage::Build);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(f.deploy_calls(), 0);
}

#[tokio::test]
async fn deploy_to_registry_target_requires_push() {
    let f = fixture_with(stub_build(), DeployStatus::Ready, true);
    init(&f);
    f.client.build(&f.root()).await.unwrap();
    match f.client.deploy(&f.root()).await {
        Err(Error::PreconditionFailed { suggestion, .. }) => assert_eq!(suggestion, Stage::Push),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(f.deploy_calls(), 0);

    f.client.push(&f.root()).await.unwrap();
    f.client.deploy(&f.root()).await.unwrap();
    assert_eq!(f.deploy_calls(), 1);
}

#[tokio::test]
async fn push_without_image_suggests_build() {
    let f = fixture();
    init(&f);
    match f.client.push(&f.root()).await {
        Err(Error::PreconditionFailed { stage, suggestion, .. }) => {
            assert_eq!(stage, Stage::Push);
            assert_eq!(suggestion, Stage::Build);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn apply_chains_build_push_deploy() {
    let f = fixture_with(stub_build(), DeployStatus::Ready, true);
    init(&f);
    let outcome = f
        .client
        .apply(&f.root(), Stages { build: true, push: true })
        .await
        .unwrap();
    let function = outcome.function();
    assert!(function.is_pushed());
    assert!(function.deployed.is_some());
    assert_eq!(
        f.calls(),
        vec![
            Call::Build("docker.io/alice/hello:latest".to_string()),
            Call::Push("img:v1".to_string()),
            Call::Deploy("hello".to_string()),
        ]
    );
    assert_eq!(crate::store::load(&f.root()).unwrap().generation, function.generation);
}

#[tokio::test]
async fn build_twice_stays_consistent() {
    let f = fixture();
    init(&f);
    let first = f.client.build(&f.root()).await.unwrap();
    let second = f.client.build(&f.root()).await.unwrap();
    let built = second.built.clone().unwrap();
    assert_eq!(built.reference, "img:v1");
    assert_eq!(built.digest, "abc123");
    assert_eq!(second.generation, first.generation + 1);
    assert_eq!(crate::store::load(&f.root()).unwrap(), second);
}

#[tokio::test]
async fn failed_build_leaves_descriptor_untouched() {
    let f = fixture_with(None, DeployStatus::Ready, false);
    let before = init(&f);
    match f.client.build(&f.root()).await {
        Err(err) => {
            assert_eq!(err.failed_stage(), Some(Stage::Build));
            assert!(err.to_string().contains("pack exited with status 1"));
        }
        Ok(_) => panic!("build should fail"),
    }
    assert_eq!(crate::store::load(&f.root()).unwrap(), before);
}

#[tokio::test]
async fn pending_deploy_is_not_recorded() {
    let f = fixture_with(
        stub_build(),
        DeployStatus::Pending {
            detail: "pipeline running".to_string(),
        },
        false,
    );
    init(&f);
    let built = f.client.build(&f.root()).await.unwrap();
    match f.client.deploy(&f.root()).await.unwrap() {
        DeployOutcome::Pending { endpoint, detail, .. } => {
            assert_eq!(endpoint, "https://fn.example");
            assert_eq!(detail, "pipeline running");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(crate::store::load(&f.root()).unwrap(), built);
}

#[tokio::test]
async fn remove_with_nothing_deployed_is_a_noop() {
    let f = fixture();
    let before = init(&f);
    assert_eq!(f.client.remove(None, Some(&f.root())).await.unwrap(), RemoveOutcome::NothingDeployed);
    assert_eq!(crate::store::load(&f.root()).unwrap(), before);
}

#[tokio::test]
async fn run_marks_and_stop_releases() {
    let f = fixture();
    init(&f);
    let mut job = f.client.run(&f.root(), None).await.unwrap();
    assert_eq!(job.port(), 8080);
    assert!(f.root().join(".func/instances/8080").exists());
    assert_eq!(f.client.instances(&f.root()).unwrap(), vec![8080]);

    job.stop().await;
    assert!(job.is_stopped());
    assert!(!f.root().join(".func/instances/8080").exists());
    assert!(f.client.instances(&f.root()).unwrap().is_empty());
    assert!(job.next_error().await.is_none());

    job.stop().await;
    let stops = f.calls().iter().filter(|c| matches!(c, Call::Stop(_))).count();
    assert_eq!(stops, 1);
}

#[tokio::test]
async fn two_runs_on_distinct_ports() {
    let f = fixture();
    init(&f);
    let mut first = f.client.run(&f.root(), Some(8080)).await.unwrap();
    let mut second = f.client.run(&f.root(), Some(8081)).await.unwrap();
    assert_eq!(f.client.instances(&f.root()).unwrap(), vec![8080, 8081]);

    first.stop().await;
    assert_eq!(f.client.instances(&f.root()).unwrap(), vec![8081]);
    second.stop().await;
    assert!(f.client.instances(&f.root()).unwrap().is_empty());
}

#[tokio::test]
async fn run_on_claimed_port_conflicts_before_starting() {
    let f = fixture();
    init(&f);
    let mut job = f.client.run(&f.root(), Some(9000)).await.unwrap();
    match f.client.run(&f.root(), Some(9000)).await {
        Err(Error::ResourceConflict { port, .. }) => assert_eq!(port, 9000),
        Err(err) => panic!("unexpected {:?}", err),
        Ok(_) => panic!("second run should conflict"),
    }
    let starts = f.calls().iter().filter(|c| matches!(c, Call::Start(_))).count();
    assert_eq!(starts, 1);
    job.stop().await;
}

#[tokio::test]
async fn lost_claim_race_stops_the_started_process() {
    let f = fixture();
    init(&f);
    // Another process claimed the port the runner ends up binding.
    let registry = crate::registry::FileRegistry::new(&f.root());
    fnctl_api::registry::JobRegistry::claim(&registry, 8080).unwrap();

    match f.client.run(&f.root(), None).await {
        Err(Error::ResourceConflict { port, .. }) => assert_eq!(port, 8080),
        Err(err) => panic!("unexpected {:?}", err),
        Ok(_) => panic!("run should conflict"),
    }
    let calls = f.calls();
    assert!(matches!(calls.last(), Some(Call::Stop(_))));
    assert_eq!(f.client.instances(&f.root()).unwrap(), vec![8080]);
}

#[tokio::test]
async fn runtime_errors_are_delivered_and_exit_releases_marker() {
    let f = fixture();
    init(&f);
    let mut job = f.client.run(&f.root(), None).await.unwrap();

    f.runner.fail(job.port(), "panic in handler");
    let err = job.next_error().await.unwrap();
    assert_eq!(err.to_string(), "panic in handler");

    f.runner.exit(job.port());
    assert!(job.next_error().await.is_none());
    // The forwarder releases the marker right before the channel closes.
    for _ in 0..50 {
        if f.client.instances(&f.root()).unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(f.client.instances(&f.root()).unwrap().is_empty());
    job.stop().await;
}

#[test]
fn instances_of_uninitialized_root_are_empty() {
    let f = fixture();
    assert!(f.client.instances(&f.root()).unwrap().is_empty());
    assert!(f.client.instances(Path::new("")).unwrap().is_empty());
}

#[test]
fn stop_releases_stale_markers() {
    let f = fixture();
    init(&f);
    let registry = crate::registry::FileRegistry::new(&f.root());
    fnctl_api::registry::JobRegistry::claim(&registry, 8080).unwrap();

    assert_eq!(f.client.stop(&f.root(), 8080).unwrap(), StopOutcome::Released);
    assert!(!f.root().join(".func/instances/8080").exists());
    assert_eq!(f.client.stop(&f.root(), 8080).unwrap(), StopOutcome::NotRunning);
}

#[tokio::test]
async fn invoke_routes() {
    let f = fixture();
    init(&f);
    let message = InvokeMessage::default();

    match f.client.invoke(&f.root(), TARGET_LOCAL, &message).await {
        Err(Error::PreconditionFailed { suggestion, .. }) => assert_eq!(suggestion, Stage::Run),
        other => panic!("unexpected {:?}", other),
    }
    match f.client.invoke(&f.root(), TARGET_REMOTE, &message).await {
        Err(Error::PreconditionFailed { suggestion, .. }) => assert_eq!(suggestion, Stage::Deploy),
        other => panic!("unexpected {:?}", other),
    }

    f.client.build(&f.root()).await.unwrap();
    f.client.deploy(&f.root()).await.unwrap();
    let response = f.client.invoke(&f.root(), "", &message).await.unwrap();
    assert_eq!(response.body, message.data);

    let mut job = f.client.run(&f.root(), Some(8090)).await.unwrap();
    f.client.invoke(&f.root(), "", &message).await.unwrap();
    f.client.invoke(&f.root(), "http://example.com/fn", &message).await.unwrap();
    job.stop().await;

    let invokes: Vec<Call> = f.calls().into_iter().filter(|c| matches!(c, Call::Invoke(..))).collect();
    assert_eq!(
        invokes,
        vec![
            Call::Invoke("https://fn.example".to_string(), InvokeStyle::Http),
            Call::Invoke("http://localhost:8090/".to_string(), InvokeStyle::Http),
            Call::Invoke("http://example.com/fn".to_string(), InvokeStyle::Http),
        ]
    );
}

#[tokio::test]
async fn invoke_format_follows_message_then_descriptor() {
    let f = fixture();
    f.client
        .init(InitOptions {
            root: f.root(),
            invoke: Some(InvokeStyle::CloudEvent),
            ..Default::default()
        })
        .unwrap();
    let mut message = InvokeMessage::default();
    f.client.invoke(&f.root(), "http://example.com/", &message).await.unwrap();
    message.format = Some(InvokeStyle::Http);
    f.client.invoke(&f.root(), "http://example.com/", &message).await.unwrap();

    let formats: Vec<InvokeStyle> = f
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Invoke(_, format) => Some(format),
            _ => None,
        })
        .collect();
    assert_eq!(formats, vec![InvokeStyle::CloudEvent, InvokeStyle::Http]);
}

#[tokio::test]
async fn describe_reconciles_with_live_state() {
    let f = fixture();
    init(&f);
    let description = f.client.describe(None, Some(&f.root())).await.unwrap();
    assert_eq!(description.name, "hello");
    assert!(description.image.is_none());
    assert!(description.deployed.is_none());
    assert!(!description.stale);

    f.client.build(&f.root()).await.unwrap();
    f.client.deploy(&f.root()).await.unwrap();
    let mut job = f.client.run(&f.root(), Some(8080)).await.unwrap();
    let description = f.client.describe(None, Some(&f.root())).await.unwrap();
    assert_eq!(description.image.as_deref(), Some("img:v1"));
    assert_eq!(description.digest.as_deref(), Some("abc123"));
    assert_eq!(description.local_ports, vec![8080]);
    assert!(description.deployed.as_ref().unwrap().ready);
    assert_eq!(description.recorded_endpoint.as_deref(), Some("https://fn.example"));
    assert!(!description.stale);
    job.stop().await;
}

#[tokio::test]
async fn describe_flags_stale_deploy_records() {
    let f = fixture();
    init(&f);
    f.client.build(&f.root()).await.unwrap();
    f.client.deploy(&f.root()).await.unwrap();

    // A deployer that does not know the function, as after an out-of-band delete.
    let description = Client::new().describe(None, Some(&f.root())).await.unwrap();
    assert!(description.deployed.is_none());
    assert!(description.stale);
}

#[tokio::test]
async fn list_reports_live_instances() {
    let f = fixture();
    assert!(f.client.list(None).await.unwrap().is_empty());
    init(&f);
    f.client.build(&f.root()).await.unwrap();
    f.client.deploy(&f.root()).await.unwrap();
    let live = f.client.list(None).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].name, "hello");
}

#[tokio::test]
async fn unconfigured_client_explains_missing_backends() {
    let dir = tempfile::tempdir().unwrap();
    let client = Client::new().with_registry(Some("alice".to_string()));
    client
        .init(InitOptions {
            root: dir.path().join("hello"),
            ..Default::default()
        })
        .unwrap();
    let err = client.build(&dir.path().join("hello")).await.unwrap_err();
    assert_eq!(err.failed_stage(), Some(Stage::Build));
    assert!(err.to_string().contains("no builder configured"));
    assert!(client.list(None).await.unwrap().is_empty());
    assert_eq!(
        client.remove(None, Some(&dir.path().join("hello"))).await.unwrap(),
        RemoveOutcome::NothingDeployed
    );
}

#[tokio::test]
async fn default_namespace_is_recorded_with_the_deployment_only() {
    let mut f = fixture();
    f.client = f.client.with_namespace(Some("dev".to_string()));
    init(&f);
    f.client.build(&f.root()).await.unwrap();
    f.client.deploy(&f.root()).await.unwrap();

    let on_disk = crate::store::load(&f.root()).unwrap();
    assert_eq!(on_disk.namespace, None);
    assert_eq!(on_disk.deployed.unwrap().namespace.as_deref(), Some("dev"));
    let live = f.client.list(Some("dev")).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].name, "hello");
}

#[tokio::test]
async fn instances_report_corrupt_descriptors() {
    let f = fixture();
    init(&f);
    let registry = crate::registry::FileRegistry::new(&f.root());
    fnctl_api::registry::JobRegistry::claim(&registry, 8080).unwrap();
    std::fs::write(f.root().join("func.toml"), "name = [broken").unwrap();

    assert!(matches!(f.client.instances(&f.root()), Err(Error::CorruptState { .. })));
    assert!(matches!(
        f.client.describe(None, Some(&f.root())).await,
        Err(Error::CorruptState { .. })
    ));
}

#[tokio::test]
async fn describe_by_name_without_project() {
    let f = fixture();
    f.live.lock().unwrap().insert(
        "greeter".to_string(),
        LiveInstance {
            name: "greeter".to_string(),
            namespace: None,
            endpoint: Some("https://greeter.example".to_string()),
            ready: true,
        },
    );

    let description = f.client.describe(Some("greeter"), None).await.unwrap();
    assert_eq!(description.name, "greeter");
    assert!(description.root.is_none());
    assert!(description.runtime.is_none());
    assert!(description.local_ports.is_empty());
    assert_eq!(description.deployed.unwrap().endpoint.as_deref(), Some("https://greeter.example"));
    assert!(!description.stale);

    // An uninitialized root next to a name is not an error.
    let description = f.client.describe(Some("greeter"), Some(&f.root())).await.unwrap();
    assert!(description.root.is_none());
    assert!(!crate::store::initialized(&f.root()));

    assert!(matches!(f.client.describe(None, None).await, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn remove_by_name_leaves_descriptor_alone() {
    let f = fixture();
    init(&f);
    f.client.build(&f.root()).await.unwrap();
    f.client.deploy(&f.root()).await.unwrap();
    let before = crate::store::load(&f.root()).unwrap();

    assert_eq!(f.client.remove(Some("hello"), None).await.unwrap(), RemoveOutcome::Removed);
    assert!(f.calls().contains(&Call::Remove("hello".to_string())));
    assert_eq!(crate::store::load(&f.root()).unwrap(), before);
    assert_eq!(f.client.remove(Some("hello"), None).await.unwrap(), RemoveOutcome::NothingDeployed);
}

#[tokio::test]
async fn name_must_match_the_project() {
    let f = fixture();
    init(&f);
    f.client.build(&f.root()).await.unwrap();
    f.client.deploy(&f.root()).await.unwrap();

    match f.client.remove(Some("greeter"), Some(&f.root())).await {
        Err(Error::InvalidInput(detail)) => assert!(detail.contains("greeter")),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        f.client.describe(Some("greeter"), Some(&f.root())).await,
        Err(Error::InvalidInput(_))
    ));
    assert!(!f.calls().iter().any(|c| matches!(c, Call::Remove(_))));
    assert!(crate::store::load(&f.root()).unwrap().deployed.is_some());

    // A matching name behaves like the root alone.
    assert_eq!(
        f.client.remove(Some("hello"), Some(&f.root())).await.unwrap(),
        RemoveOutcome::Removed
    );
    assert!(crate::store::load(&f.root()).unwrap().deployed.is_none());
}

#[tokio::test]
async fn deploying_twice_redeploys() {
    let f = fixture();
    init(&f);
    f.client.build(&f.root()).await.unwrap();

    let first = match f.client.deploy(&f.root()).await.unwrap() {
        DeployOutcome::Deployed(function) => function,
        other => panic!("unexpected {:?}", other),
    };
    let second = match f.client.deploy(&f.root()).await.unwrap() {
        DeployOutcome::Deployed(function) => function,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(f.deploy_calls(), 2);
    assert_eq!(second.generation, first.generation + 1);
    let (first, second) = (first.deployed.unwrap(), second.deployed.unwrap());
    assert!(second.deployed_at >= first.deployed_at);
    assert_eq!(crate::store::load(&f.root()).unwrap().deployed, Some(second));
}

#[tokio::test]
async fn rebuilt_image_must_be_pushed_again() {
    let f = fixture_with_builds(
        vec![
            BuildResult {
                reference: "img:v1".to_string(),
                digest: "abc123".to_string(),
            },
            BuildResult {
                reference: "img:v2".to_string(),
                digest: "def456".to_string(),
            },
        ],
        DeployStatus::Ready,
        true,
    );
    init(&f);
    f.client.build(&f.root()).await.unwrap();
    f.client.push(&f.root()).await.unwrap();
    f.client.deploy(&f.root()).await.unwrap();

    let rebuilt = f.client.build(&f.root()).await.unwrap();
    assert_eq!(rebuilt.built.as_ref().unwrap().digest, "def456");
    assert!(rebuilt.pushed.is_none());
    match f.client.deploy(&f.root()).await {
        Err(Error::PreconditionFailed { stage, suggestion, .. }) => {
            assert_eq!(stage, Stage::Deploy);
            assert_eq!(suggestion, Stage::Push);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(f.deploy_calls(), 1);
}
