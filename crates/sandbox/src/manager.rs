//! Session lifecycle manager.
//!
//! Drives a sandbox through `Requested → Provisioned → Initialized → Ready`,
//! runs code in it, and kills it. Provisioning steps register compensations
//! that are unwound in reverse when a later step fails, so a failed create
//! never leaves a container behind.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use replbox_core::config::SandboxSettings;
use replbox_core::{ContainerId, Error, LanguageProfile, LanguageRegistry, Result, SessionState};
use replbox_telemetry::{track_execution, track_session_event, SessionEvent};

use crate::command::{shell_quote, synthesize};
use crate::engine::{ContainerRuntime, ExecOutput};
use crate::registry::{KillTransition, SessionRegistry};

/// Teardown action registered by a successful provisioning step.
#[derive(Debug)]
enum Compensation {
    KillContainer(ContainerId),
    Unregister(ContainerId),
}

/// What a kill request actually did. Callers report success regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillOutcome {
    Killed,
    /// Marked `Killed` locally, but the runtime reported an error.
    RuntimeFailed(String),
    AlreadyKilled,
    /// Not a session of ours; nothing was sent to the runtime.
    Unknown,
}

/// Owns the session registry and sequences runtime calls for every
/// lifecycle operation.
pub struct SessionManager {
    runtime: Arc<dyn ContainerRuntime>,
    languages: LanguageRegistry,
    registry: SessionRegistry,
    settings: SandboxSettings,
}

impl SessionManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        languages: LanguageRegistry,
        settings: SandboxSettings,
    ) -> Self {
        Self {
            runtime,
            languages,
            registry: SessionRegistry::new(),
            settings,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Check if the runtime backend is reachable.
    pub async fn is_available(&self) -> bool {
        self.runtime.is_available().await
    }

    // =========================================================================
    // CreateSession
    // =========================================================================

    /// Provision a container for `language` and prepare its default source
    /// file. Returns the container id once the session is `Ready`.
    pub async fn create_session(&self, language: &str) -> Result<ContainerId> {
        let profile = self.languages.resolve(language)?.clone();

        tracing::debug!(language = %language, image = %profile.image, state = %SessionState::Requested, "Provisioning session");

        let id = match self
            .bounded("create", self.runtime.create_container(&profile.image))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                track_session_event(SessionEvent::ProvisioningFailed);
                tracing::error!(language = %language, image = %profile.image, error = %e, "Container creation failed");
                return Err(Error::provisioning_failed(format!(
                    "could not create container from {}: {}",
                    profile.image, e
                )));
            }
        };

        let mut compensations = vec![Compensation::KillContainer(id.clone())];
        if let Err(e) = self.registry.register(id.clone(), language) {
            self.unwind(compensations).await;
            return Err(e);
        }
        compensations.push(Compensation::Unregister(id.clone()));

        if let Err(e) = self.initialize(&id, &profile).await {
            track_session_event(SessionEvent::ProvisioningFailed);
            tracing::error!(container_id = %id, language = %language, error = %e, "Session setup failed, rolling back");
            self.unwind(compensations).await;
            return Err(e);
        }

        track_session_event(SessionEvent::Created);
        tracing::info!(container_id = %id, language = %language, "Session ready");
        Ok(id)
    }

    async fn initialize(&self, id: &ContainerId, profile: &LanguageProfile) -> Result<()> {
        self.bounded("start", self.runtime.start_container(id))
            .await
            .map_err(|e| {
                Error::provisioning_failed(format!("could not start container {}: {}", id, e))
            })?;
        self.registry.transition(id, SessionState::Initialized)?;

        let default_file = profile.file_name(&self.settings.default_filename);
        let command = format!("touch {}", shell_quote(&default_file));
        let output = self
            .bounded("setup", self.runtime.exec(id, &command))
            .await
            .map_err(|e| Error::setup_failed(format!("could not create {}: {}", default_file, e)))?;
        if !output.success() {
            return Err(Error::setup_failed(format!(
                "could not create {} (exit code {}): {}",
                default_file,
                output.exit_code,
                output.stderr.trim()
            )));
        }
        self.registry.transition(id, SessionState::Ready)
    }

    async fn unwind(&self, compensations: Vec<Compensation>) {
        for action in compensations.into_iter().rev() {
            match action {
                Compensation::Unregister(id) => {
                    self.registry.remove(&id);
                }
                Compensation::KillContainer(id) => {
                    match self.bounded("rollback", self.runtime.kill(&id)).await {
                        Ok(()) => {
                            track_session_event(SessionEvent::RolledBack);
                            tracing::info!(container_id = %id, "Rolled back partially provisioned container");
                        }
                        Err(e) => {
                            track_session_event(SessionEvent::RollbackFailed);
                            tracing::warn!(container_id = %id, error = %e, "Rollback kill failed, container may leak");
                        }
                    }
                }
            }
        }
    }

    // =========================================================================
    // Execute
    // =========================================================================

    /// Run `code` inside session `id`.
    ///
    /// Executions against one session are serialized: a second call waits
    /// until the first returns, then re-checks that the session is still
    /// `Ready`.
    pub async fn execute(
        &self,
        id: &ContainerId,
        language: &str,
        code: &str,
    ) -> Result<ExecOutput> {
        let exec_lock = self.registry.authorize_execution(id, language)?;
        let profile = self.languages.resolve(language)?.clone();

        let _turn = exec_lock.lock().await;
        self.registry.ensure_ready(id)?;

        let command = synthesize(code, &profile, &self.settings.default_filename);
        tracing::debug!(container_id = %id, file = %command.target_filename, "Executing code");

        let started = Instant::now();
        let timeout = self.settings.exec_timeout();
        let result =
            tokio::time::timeout(timeout, self.runtime.exec(id, &command.to_shell())).await;
        let elapsed = started.elapsed().as_secs_f64();
        self.registry.touch(id);

        match result {
            Ok(Ok(output)) => {
                track_execution(language, "ok", elapsed);
                tracing::info!(container_id = %id, exit_code = output.exit_code, "Execution finished");
                Ok(output)
            }
            Ok(Err(e)) => {
                track_execution(language, "error", elapsed);
                tracing::error!(container_id = %id, error = %e, "Execution failed");
                Err(Error::execution_failed(e.to_string()))
            }
            Err(_) => {
                track_execution(language, "timeout", elapsed);
                tracing::warn!(container_id = %id, timeout = ?timeout, "Execution timed out");
                Err(Error::timeout(format!(
                    "execution in {} exceeded {:?}",
                    id, timeout
                )))
            }
        }
    }

    // =========================================================================
    // KillSession
    // =========================================================================

    /// Best-effort kill.
    ///
    /// The session is marked `Killed` before the runtime is asked to kill the
    /// container, so it stops accepting executions even if the runtime call
    /// fails. Runtime failures are logged and counted, never returned.
    pub async fn kill_session(&self, id: &ContainerId) -> KillOutcome {
        match self.registry.mark_killed(id) {
            KillTransition::Unknown => {
                tracing::debug!(container_id = %id, "Kill requested for unknown session, ignoring");
                KillOutcome::Unknown
            }
            KillTransition::AlreadyKilled => KillOutcome::AlreadyKilled,
            KillTransition::Killed { previous } => {
                match self.bounded("kill", self.runtime.kill(id)).await {
                    Ok(()) => {
                        track_session_event(SessionEvent::Killed);
                        tracing::info!(container_id = %id, previous = %previous, "Session killed");
                        KillOutcome::Killed
                    }
                    Err(e) => {
                        track_session_event(SessionEvent::KillFailed);
                        tracing::warn!(container_id = %id, previous = %previous, error = %e, "Runtime kill failed, session marked killed anyway");
                        KillOutcome::RuntimeFailed(e.to_string())
                    }
                }
            }
        }
    }

    // =========================================================================
    // Expiry & Shutdown
    // =========================================================================

    /// Kill sessions idle for longer than the configured TTL and purge old
    /// tombstones. Returns the number of sessions killed.
    pub async fn reap_expired(&self) -> usize {
        let ttl = self.settings.session_ttl();
        let idle = self.registry.idle_sessions(ttl);
        for id in &idle {
            track_session_event(SessionEvent::Expired);
            tracing::info!(container_id = %id, ttl = ?ttl, "Session expired");
            self.kill_session(id).await;
        }
        let purged = self.registry.purge_killed(ttl);
        if purged > 0 {
            tracing::debug!(purged, "Purged killed sessions");
        }
        idle.len()
    }

    /// Run [`Self::reap_expired`] every `reap_interval` until aborted.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = manager.settings.reap_interval().max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.reap_expired().await;
            }
        })
    }

    /// Remove containers left behind by an earlier process.
    ///
    /// Anything the runtime lists that the registry does not know is an
    /// orphan; it is killed with the same best-effort policy as a session.
    /// Returns how many were removed.
    pub async fn reclaim_orphans(&self) -> Result<usize> {
        let listed = self.bounded("list", self.runtime.list_managed()).await?;
        let mut reclaimed = 0;
        for id in listed {
            if self.registry.state(&id).is_some() {
                continue;
            }
            match self.bounded("reclaim", self.runtime.kill(&id)).await {
                Ok(()) => {
                    reclaimed += 1;
                    track_session_event(SessionEvent::Reclaimed);
                    tracing::info!(container_id = %id, "Reclaimed orphaned container");
                }
                Err(e) => {
                    track_session_event(SessionEvent::KillFailed);
                    tracing::warn!(container_id = %id, error = %e, "Failed to reclaim orphaned container");
                }
            }
        }
        Ok(reclaimed)
    }

    /// Kill every live session. Returns how many were killed.
    pub async fn shutdown(&self) -> usize {
        let live = self.registry.live_ids();
        for id in &live {
            self.kill_session(id).await;
        }
        tracing::info!(sessions = live.len(), "Sandbox sessions shut down");
        live.len()
    }

    async fn bounded<T>(&self, step: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.settings.exec_timeout();
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| Error::timeout(format!("{} exceeded {:?}", step, timeout)))?
    }
}

// =============================================================================
// Tests
// =============================================================================
