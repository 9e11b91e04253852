//! Container runtime adapter.
//!
//! This module provides the `ContainerRuntime` trait consumed by the session
//! manager, a Docker-based implementation using the `bollard` crate, and an
//! in-memory mock used throughout the test suites.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use replbox_core::config::SandboxSettings;
use replbox_core::{ContainerId, Error, Result};

// =============================================================================
// Runtime Types
// =============================================================================

/// Captured result of one command executed inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code of the command.
    pub exit_code: i64,
}

impl ExecOutput {
    /// Successful output with the given stdout.
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// =============================================================================
// Container Runtime Trait
// =============================================================================

/// Primitives the session manager needs from a container backend.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create (but do not start) a container from `image`.
    async fn create_container(&self, image: &str) -> Result<ContainerId>;

    /// Start a previously created container.
    async fn start_container(&self, id: &ContainerId) -> Result<()>;

    /// Run `command` through `sh -c` inside the container and capture its output.
    async fn exec(&self, id: &ContainerId, command: &str) -> Result<ExecOutput>;

    /// Stop and discard the container.
    async fn kill(&self, id: &ContainerId) -> Result<()>;

    /// Every container this service created that still exists, running or not.
    async fn list_managed(&self) -> Result<Vec<ContainerId>>;

    /// Check if the backend is reachable (e.g., Docker daemon running).
    async fn is_available(&self) -> bool;
}

// =============================================================================
// Docker Runtime Implementation
// =============================================================================

/// Label put on every container [`DockerRuntime`] creates.
const MANAGED_LABEL: (&str, &str) = ("managed-by", "replbox");

/// Container-level settings applied by [`DockerRuntime`].
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    /// Working directory, mounted as tmpfs.
    pub workdir: String,
    /// Docker network mode ("none", "bridge", or a network name).
    pub network_mode: String,
}

impl From<&SandboxSettings> for ContainerSettings {
    fn from(settings: &SandboxSettings) -> Self {
        Self {
            workdir: settings.workdir.clone(),
            network_mode: settings.network_mode.clone(),
        }
    }
}

/// Docker-based runtime using the `bollard` crate.
///
/// Containers are kept alive with `sleep infinity`, run with all
/// capabilities dropped and `no-new-privileges`, and get a tmpfs working
/// directory so nothing user code writes touches an image layer.
pub struct DockerRuntime {
    docker: bollard::Docker,
    settings: ContainerSettings,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    pub fn new(settings: ContainerSettings) -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            Error::adapter(format!(
                "Failed to connect to Docker daemon: {}. Is Docker running?",
                e
            ))
        })?;
        Ok(Self { docker, settings })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, image: &str) -> Result<ContainerId> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::{HostConfig, Mount, MountTypeEnum};

        let name = format!("replbox-{}", uuid::Uuid::new_v4());

        let host_config = HostConfig {
            network_mode: Some(self.settings.network_mode.clone()),
            mounts: Some(vec![Mount {
                target: Some(self.settings.workdir.clone()),
                typ: Some(MountTypeEnum::TMPFS),
                ..Default::default()
            }]),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(image.to_string()),
            working_dir: Some(self.settings.workdir.clone()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            host_config: Some(host_config),
            labels: Some(HashMap::from([(
                MANAGED_LABEL.0.to_string(),
                MANAGED_LABEL.1.to_string(),
            )])),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| Error::adapter(format!("Failed to create container: {}", e)))?;

        for warning in &response.warnings {
            tracing::warn!(container_id = %response.id, warning = %warning, "Docker warning on create");
        }
        tracing::debug!(container_id = %response.id, name = %name, image = %image, "Container created");

        Ok(ContainerId(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<()> {
        self.docker
            .start_container::<String>(id.as_str(), None)
            .await
            .map_err(|e| Error::adapter(format!("Failed to start container: {}", e)))?;

        tracing::debug!(container_id = %id, "Container started");
        Ok(())
    }

    async fn exec(&self, id: &ContainerId, command: &str) -> Result<ExecOutput> {
        use bollard::exec::{CreateExecOptions, StartExecResults};
        use futures::StreamExt;

        let exec_options = CreateExecOptions {
            cmd: Some(vec!["sh", "-c", command]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            working_dir: Some(self.settings.workdir.as_str()),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id.as_str(), exec_options)
            .await
            .map_err(|e| Error::adapter(format!("Failed to create exec: {}", e)))?;

        let start_result = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::adapter(format!("Failed to start exec: {}", e)))?;

        let mut output = ExecOutput::default();

        if let StartExecResults::Attached { output: mut stream, .. } = start_result {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(bollard::container::LogOutput::StdOut { message }) => {
                        output.stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(bollard::container::LogOutput::StdErr { message }) => {
                        output.stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(Error::adapter(format!("Exec output stream failed: {}", e)));
                    }
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| Error::adapter(format!("Failed to inspect exec result: {}", e)))?;

        output.exit_code = inspect.exit_code.unwrap_or(-1);
        Ok(output)
    }

    async fn kill(&self, id: &ContainerId) -> Result<()> {
        use bollard::container::{KillContainerOptions, RemoveContainerOptions};

        // A container that never started cannot be killed; removal below
        // still discards it.
        if let Err(e) = self
            .docker
            .kill_container(id.as_str(), Some(KillContainerOptions { signal: "SIGKILL" }))
            .await
        {
            tracing::debug!(container_id = %id, error = %e, "SIGKILL not delivered");
        }

        self.docker
            .remove_container(
                id.as_str(),
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| Error::adapter(format!("Failed to remove container: {}", e)))?;

        tracing::debug!(container_id = %id, "Container removed");
        Ok(())
    }

    async fn list_managed(&self) -> Result<Vec<ContainerId>> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions::<String> {
            all: true,
            filters: HashMap::from([(
                "label".to_string(),
                vec![format!("{}={}", MANAGED_LABEL.0, MANAGED_LABEL.1)],
            )]),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| Error::adapter(format!("Failed to list containers: {}", e)))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| c.id)
            .map(ContainerId)
            .collect())
    }

    async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

// =============================================================================
// Mock Runtime (for testing without Docker)
// =============================================================================

/// Runtime primitive, used to inject failures into [`MockRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeOp {
    Create,
    Start,
    Exec,
    Kill,
    List,
}

/// A call observed by [`MockRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Create { image: String },
    Start(ContainerId),
    Exec { id: ContainerId, command: String },
    Kill(ContainerId),
    List,
}

impl RuntimeCall {
    pub fn op(&self) -> RuntimeOp {
        match self {
            RuntimeCall::Create { .. } => RuntimeOp::Create,
            RuntimeCall::Start(_) => RuntimeOp::Start,
            RuntimeCall::Exec { .. } => RuntimeOp::Exec,
            RuntimeCall::Kill(_) => RuntimeOp::Kill,
            RuntimeCall::List => RuntimeOp::List,
        }
    }
}

/// In-memory runtime for tests.
///
/// Records every call, replays scripted exec outputs in order (falling back
/// to an empty successful output), fails any operation registered with
/// [`MockRuntime::fail_on`], delays operations registered with
/// [`MockRuntime::with_delay`], and tracks how many execs overlap. Containers
/// it creates are listed until killed.
#[derive(Default)]
pub struct MockRuntime {
    calls: Mutex<Vec<RuntimeCall>>,
    exec_responses: Mutex<VecDeque<ExecOutput>>,
    failures: Mutex<HashSet<RuntimeOp>>,
    delays: Mutex<HashMap<RuntimeOp, Duration>>,
    containers: Mutex<Vec<ContainerId>>,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRuntime {
    /// Create a mock runtime with predefined exec responses.
    pub fn new(responses: Vec<ExecOutput>) -> Self {
        Self {
            exec_responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    /// Make every call of `op` fail.
    pub fn fail_on(self, op: RuntimeOp) -> Self {
        self.failures.lock().unwrap().insert(op);
        self
    }

    /// Make every call of `op` sleep for `delay` before answering.
    pub fn with_delay(self, op: RuntimeOp, delay: Duration) -> Self {
        self.set_delay(op, Some(delay));
        self
    }

    pub fn set_delay(&self, op: RuntimeOp, delay: Option<Duration>) {
        let mut delays = self.delays.lock().unwrap();
        match delay {
            Some(delay) => delays.insert(op, delay),
            None => delays.remove(&op),
        };
    }

    /// Pretend `ids` were left behind by an earlier process.
    pub fn with_existing(self, ids: impl IntoIterator<Item = ContainerId>) -> Self {
        self.containers.lock().unwrap().extend(ids);
        self
    }

    /// Start or stop failing `op` on an already shared mock.
    pub fn set_failure(&self, op: RuntimeOp, fail: bool) {
        let mut failures = self.failures.lock().unwrap();
        if fail {
            failures.insert(op);
        } else {
            failures.remove(&op);
        }
    }

    pub fn push_exec_response(&self, output: ExecOutput) {
        self.exec_responses.lock().unwrap().push_back(output);
    }

    /// All calls observed so far, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: RuntimeOp) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op() == op)
            .count()
    }

    /// Commands passed to `exec`, in order.
    pub fn exec_commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                RuntimeCall::Exec { command, .. } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Highest number of execs observed running at the same time.
    pub fn max_concurrent_execs(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn pause(&self, op: RuntimeOp) {
        let delay = self.delays.lock().unwrap().get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, call: RuntimeCall) -> Result<()> {
        let op = call.op();
        self.calls.lock().unwrap().push(call);
        if self.failures.lock().unwrap().contains(&op) {
            return Err(Error::adapter(format!("mock {:?} failure", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create_container(&self, image: &str) -> Result<ContainerId> {
        self.record(RuntimeCall::Create {
            image: image.to_string(),
        })?;
        self.pause(RuntimeOp::Create).await;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = ContainerId(format!("mock-container-{}", n));
        self.containers.lock().unwrap().push(id.clone());
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<()> {
        self.record(RuntimeCall::Start(id.clone()))?;
        self.pause(RuntimeOp::Start).await;
        Ok(())
    }

    async fn exec(&self, id: &ContainerId, command: &str) -> Result<ExecOutput> {
        self.record(RuntimeCall::Exec {
            id: id.clone(),
            command: command.to_string(),
        })?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.pause(RuntimeOp::Exec).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let scripted = self.exec_responses.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_default())
    }

    async fn kill(&self, id: &ContainerId) -> Result<()> {
        self.record(RuntimeCall::Kill(id.clone()))?;
        self.pause(RuntimeOp::Kill).await;
        self.containers.lock().unwrap().retain(|c| c != id);
        Ok(())
    }

    async fn list_managed(&self) -> Result<Vec<ContainerId>> {
        self.record(RuntimeCall::List)?;
        Ok(self.containers.lock().unwrap().clone())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
