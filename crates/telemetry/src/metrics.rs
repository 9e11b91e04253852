//! Metrics implementation using Prometheus.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use replbox_core::{Error, Result};

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Track HTTP request metrics (latency, count).
pub fn track_request(method: &str, path: &str, status: u16, latency_sec: f64) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(latency_sec);
}

/// Notable points in a session's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Created,
    ProvisioningFailed,
    RolledBack,
    RollbackFailed,
    Killed,
    KillFailed,
    Expired,
    Reclaimed,
}

impl SessionEvent {
    fn as_str(self) -> &'static str {
        match self {
            SessionEvent::Created => "created",
            SessionEvent::ProvisioningFailed => "provisioning_failed",
            SessionEvent::RolledBack => "rolled_back",
            SessionEvent::RollbackFailed => "rollback_failed",
            SessionEvent::Killed => "killed",
            SessionEvent::KillFailed => "kill_failed",
            SessionEvent::Expired => "expired",
            SessionEvent::Reclaimed => "reclaimed",
        }
    }
}

/// Count a session lifecycle event.
pub fn track_session_event(event: SessionEvent) {
    metrics::counter!("sandbox_session_events_total", "event" => event.as_str()).increment(1);
}

/// Track one code execution (outcome is "ok", "error" or "timeout").
pub fn track_execution(language: &str, outcome: &'static str, latency_sec: f64) {
    metrics::counter!(
        "sandbox_executions_total",
        "language" => language.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    metrics::histogram!(
        "sandbox_execution_duration_seconds",
        "language" => language.to_string()
    )
    .record(latency_sec);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_labels_are_distinct() {
        let events = [
            SessionEvent::Created,
            SessionEvent::ProvisioningFailed,
            SessionEvent::RolledBack,
            SessionEvent::RollbackFailed,
            SessionEvent::Killed,
            SessionEvent::KillFailed,
            SessionEvent::Expired,
            SessionEvent::Reclaimed,
        ];
        let labels: std::collections::HashSet<_> = events.iter().map(|e| e.as_str()).collect();
        assert_eq!(labels.len(), events.len());
    }

    #[test]
    fn test_tracking_without_recorder_is_noop() {
        track_request("POST", "/", 201, 0.01);
        track_execution("python", "ok", 0.2);
        track_session_event(SessionEvent::Created);
    }
}
