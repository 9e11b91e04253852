//! In-process session registry.
//!
//! The registry is the authority on which containers this process owns.
//! Every execution is checked against it, and kills for unknown ids are
//! never forwarded to the runtime.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use replbox_core::{ContainerId, Error, Result, SessionState};

/// Snapshot of one sandbox session.
#[derive(Debug, Clone)]
pub struct Session {
    pub container_id: ContainerId,
    pub language: String,
    pub state: SessionState,
    /// Creation, last execution, or kill time.
    pub last_active: Instant,
}

impl Session {
    fn requested(container_id: ContainerId, language: String) -> Self {
        Self {
            container_id,
            language,
            state: SessionState::Requested,
            last_active: Instant::now(),
        }
    }

    fn advance(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                id: self.container_id.to_string(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

struct SessionEntry {
    session: Session,
    /// Serializes executions against one container.
    exec_lock: Arc<Mutex<()>>,
}

/// Result of [`SessionRegistry::mark_killed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillTransition {
    /// The id was never registered (or has been purged).
    Unknown,
    /// The session was already `Killed`.
    AlreadyKilled,
    /// The session moved to `Killed` from `previous`.
    Killed { previous: SessionState },
}

/// Concurrent map of live and recently killed sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<ContainerId, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly created container as `Provisioned`.
    pub fn register(&self, container_id: ContainerId, language: impl Into<String>) -> Result<()> {
        let mut session = Session::requested(container_id.clone(), language.into());
        session.advance(SessionState::Provisioned)?;
        self.sessions.insert(
            container_id,
            SessionEntry {
                session,
                exec_lock: Arc::new(Mutex::new(())),
            },
        );
        Ok(())
    }

    pub fn get(&self, id: &ContainerId) -> Option<Session> {
        self.sessions.get(id).map(|e| e.session.clone())
    }

    pub fn state(&self, id: &ContainerId) -> Option<SessionState> {
        self.sessions.get(id).map(|e| e.session.state)
    }

    /// Move a session to `next`, rejecting illegal transitions.
    pub fn transition(&self, id: &ContainerId, next: SessionState) -> Result<()> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| Error::session_not_found(id.to_string()))?;
        entry.session.advance(next)
    }

    pub fn remove(&self, id: &ContainerId) -> Option<Session> {
        self.sessions.remove(id).map(|(_, e)| e.session)
    }

    /// Move a session to `Killed`, whatever live state it is in.
    pub fn mark_killed(&self, id: &ContainerId) -> KillTransition {
        let Some(mut entry) = self.sessions.get_mut(id) else {
            return KillTransition::Unknown;
        };
        let previous = entry.session.state;
        if previous.is_terminal() {
            return KillTransition::AlreadyKilled;
        }
        entry.session.state = SessionState::Killed;
        entry.session.last_active = Instant::now();
        KillTransition::Killed { previous }
    }

    /// Check that `id` may run code in `language` and hand out its
    /// execution lock.
    pub fn authorize_execution(&self, id: &ContainerId, language: &str) -> Result<Arc<Mutex<()>>> {
        let entry = self
            .sessions
            .get(id)
            .ok_or_else(|| Error::session_not_found(id.to_string()))?;
        let session = &entry.session;
        if !session.state.accepts_execution() {
            return Err(Error::SessionNotReady {
                id: id.to_string(),
                state: session.state,
            });
        }
        if session.language != language {
            return Err(Error::LanguageMismatch {
                expected: session.language.clone(),
                actual: language.to_string(),
            });
        }
        Ok(Arc::clone(&entry.exec_lock))
    }

    /// Fail unless the session is `Ready`.
    pub fn ensure_ready(&self, id: &ContainerId) -> Result<()> {
        match self.state(id) {
            Some(state) if state.accepts_execution() => Ok(()),
            Some(state) => Err(Error::SessionNotReady {
                id: id.to_string(),
                state,
            }),
            None => Err(Error::session_not_found(id.to_string())),
        }
    }

    /// Refresh the idle clock of a live session.
    pub fn touch(&self, id: &ContainerId) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            if !entry.session.state.is_terminal() {
                entry.session.last_active = Instant::now();
            }
        }
    }

    /// Live sessions idle for longer than `ttl`.
    pub fn idle_sessions(&self, ttl: Duration) -> Vec<ContainerId> {
        self.sessions
            .iter()
            .filter(|e| !e.session.state.is_terminal() && e.session.last_active.elapsed() > ttl)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Drop `Killed` tombstones older than `ttl`. Returns how many went.
    pub fn purge_killed(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, e| {
            !(e.session.state.is_terminal() && e.session.last_active.elapsed() > ttl)
        });
        before.saturating_sub(self.sessions.len())
    }

    /// Ids of every session not yet killed.
    pub fn live_ids(&self) -> Vec<ContainerId> {
        self.sessions
            .iter()
            .filter(|e| !e.session.state.is_terminal())
            .map(|e| e.key().clone())
            .collect()
    }

    /// Number of sessions not yet killed.
    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|e| !e.session.state.is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
