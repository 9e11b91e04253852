use serde::{Deserialize, Serialize};

// =============================================================================
// Session Identity
// =============================================================================

/// Opaque container identifier returned by the runtime. Doubles as the
/// session key: one container per session.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Session State Machine
// =============================================================================

/// Lifecycle state of a sandbox session.
///
/// `Requested → Provisioned → Initialized → Ready → Killed`, where `Killed`
/// is terminal and reachable from every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Creation accepted, no container yet.
    Requested,
    /// Container created but not started.
    Provisioned,
    /// Container started, workspace file not yet prepared.
    Initialized,
    /// Accepting executions.
    Ready,
    /// Terminal.
    Killed,
}

impl SessionState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Requested, Provisioned)
                | (Provisioned, Initialized)
                | (Initialized, Ready)
                | (Requested | Provisioned | Initialized | Ready, Killed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Killed
    }

    pub fn accepts_execution(self) -> bool {
        self == SessionState::Ready
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Requested => "Requested",
            SessionState::Provisioned => "Provisioned",
            SessionState::Initialized => "Initialized",
            SessionState::Ready => "Ready",
            SessionState::Killed => "Killed",
        };
        f.write_str(name)
    }
}
