//! Session lifecycle integration tests.
//!
//! Tests the full pipeline: SessionManager → SessionRegistry → synthesize →
//! ContainerRuntime (MockRuntime). These tests do NOT require Docker.

use std::sync::Arc;
use std::time::Duration;

use replbox_core::config::SandboxSettings;
use replbox_core::{ContainerId, Error, LanguageProfile, LanguageRegistry, SessionState};
use replbox_sandbox::{
    ExecOutput, KillOutcome, MockRuntime, RuntimeCall, RuntimeOp, SessionManager,
};

// =============================================================================
// Helpers
// =============================================================================

fn manager(runtime: Arc<MockRuntime>) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(
        runtime,
        LanguageRegistry::default(),
        SandboxSettings::default(),
    ))
}

// =============================================================================
// 1. Create → execute → kill
// =============================================================================

#[tokio::test]
async fn test_python_session_round_trip() {
    let runtime = Arc::new(MockRuntime::default());
    let manager = manager(runtime.clone());

    let id = manager.create_session("python").await.unwrap();
    runtime.push_exec_response(ExecOutput::stdout("2\n"));

    let output = manager.execute(&id, "python", "print(1+1)").await.unwrap();
    assert!(output.stdout.contains('2'));
    assert!(output.stderr.is_empty());

    assert_eq!(manager.kill_session(&id).await, KillOutcome::Killed);
    assert_eq!(manager.registry().state(&id), Some(SessionState::Killed));
}

#[tokio::test]
async fn test_repeated_executions_reuse_session() {
    let runtime = Arc::new(MockRuntime::default());
    let manager = manager(runtime.clone());
    let id = manager.create_session("javascript").await.unwrap();

    for i in 0..3 {
        runtime.push_exec_response(ExecOutput::stdout(format!("{}\n", i)));
        let out = manager
            .execute(&id, "javascript", &format!("console.log({})", i))
            .await
            .unwrap();
        assert_eq!(out.stdout, format!("{}\n", i));
    }

    assert_eq!(runtime.count(RuntimeOp::Create), 1);
    assert_eq!(runtime.count(RuntimeOp::Exec), 4);
    assert_eq!(
        runtime.exec_commands()[1],
        "echo 'console.log(0)' > file.js;node file.js;"
    );
}

#[tokio::test]
async fn test_directive_file_round_trip() {
    let runtime = Arc::new(MockRuntime::default());
    let manager = manager(runtime.clone());
    let id = manager.create_session("python").await.unwrap();

    manager
        .execute(&id, "python", "file-main.py\nprint(1)")
        .await
        .unwrap();

    let command = runtime.exec_commands().pop().unwrap();
    assert!(command.starts_with("touch main.py;"));
    assert!(command.ends_with("python main.py;"));
    assert!(!command.contains("file.py"));
}

// =============================================================================
// 2. Partial provisioning failures leave nothing behind
// =============================================================================

#[tokio::test]
async fn test_failed_setup_is_rolled_back() {
    let runtime = Arc::new(MockRuntime::default().fail_on(RuntimeOp::Exec));
    let manager = manager(runtime.clone());

    let err = manager.create_session("python").await.unwrap_err();
    assert!(matches!(err, Error::SetupFailed(_)));

    let calls = runtime.calls();
    let created = match &calls[0] {
        RuntimeCall::Create { image } => image.clone(),
        other => panic!("unexpected first call {:?}", other),
    };
    assert_eq!(created, "python:3");
    assert!(matches!(calls.last(), Some(RuntimeCall::Kill(_))));
    assert_eq!(manager.registry().len(), 0);
}

#[tokio::test]
async fn test_retry_after_failure_gets_fresh_container() {
    let runtime = Arc::new(MockRuntime::default().fail_on(RuntimeOp::Start));
    let manager = manager(runtime.clone());

    assert!(manager.create_session("python").await.is_err());

    runtime.set_failure(RuntimeOp::Start, false);
    let id = manager.create_session("python").await.unwrap();
    assert_eq!(id, ContainerId::new("mock-container-1"));
    assert_eq!(manager.registry().active_count(), 1);
}

// =============================================================================
// 3. Concurrency
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_executions_do_not_interleave() {
    let runtime = Arc::new(MockRuntime::default());
    let manager = manager(runtime.clone());
    let id = manager.create_session("python").await.unwrap();

    runtime.set_delay(RuntimeOp::Exec, Some(Duration::from_millis(500)));
    let (a, b) = tokio::join!(
        manager.execute(&id, "python", "print('a')"),
        manager.execute(&id, "python", "print('b')"),
    );
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(runtime.max_concurrent_execs(), 1);

    let commands = runtime.exec_commands();
    assert_eq!(
        &commands[1..],
        &[
            r#"echo 'print("a")' > file.py;python file.py;"#.to_string(),
            r#"echo 'print("b")' > file.py;python file.py;"#.to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_different_sessions_run_in_parallel() {
    let runtime = Arc::new(MockRuntime::default());
    let manager = manager(runtime.clone());
    let a = manager.create_session("python").await.unwrap();
    let b = manager.create_session("python").await.unwrap();

    runtime.set_delay(RuntimeOp::Exec, Some(Duration::from_millis(500)));
    let (ra, rb) = tokio::join!(
        manager.execute(&a, "python", "print(1)"),
        manager.execute(&b, "python", "print(2)"),
    );
    assert!(ra.is_ok() && rb.is_ok());
    assert_eq!(runtime.max_concurrent_execs(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_kill_while_execution_queued() {
    let runtime = Arc::new(MockRuntime::default());
    let manager = manager(runtime.clone());
    let id = manager.create_session("python").await.unwrap();

    runtime.set_delay(RuntimeOp::Exec, Some(Duration::from_secs(1)));
    let (first, queued, killed) = tokio::join!(
        manager.execute(&id, "python", "print(1)"),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            manager.execute(&id, "python", "print(2)").await
        },
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            manager.kill_session(&id).await
        },
    );

    assert!(first.is_ok(), "in-flight execution runs to completion");
    assert!(matches!(
        queued,
        Err(Error::SessionNotReady {
            state: SessionState::Killed,
            ..
        })
    ));
    assert_eq!(killed, KillOutcome::Killed);
}

// =============================================================================
// 4. Expiry & configuration
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reaper_task_kills_idle_sessions() {
    let runtime = Arc::new(MockRuntime::default());
    let settings = SandboxSettings {
        session_ttl_secs: 60,
        reap_interval_secs: 10,
        ..Default::default()
    };
    let manager = Arc::new(SessionManager::new(
        runtime.clone(),
        LanguageRegistry::default(),
        settings,
    ));
    let id = manager.create_session("python").await.unwrap();

    let reaper = manager.spawn_reaper();
    tokio::time::sleep(Duration::from_secs(75)).await;

    assert_eq!(manager.registry().state(&id), Some(SessionState::Killed));
    assert_eq!(runtime.count(RuntimeOp::Kill), 1);
    reaper.abort();
}

#[tokio::test]
async fn test_custom_language_and_default_file() {
    let runtime = Arc::new(MockRuntime::default());
    let mut languages = LanguageRegistry::default();
    languages.register("ruby", LanguageProfile::new("ruby:3", "rb", "ruby"));
    let settings = SandboxSettings {
        default_filename: "main".into(),
        ..Default::default()
    };
    let manager = SessionManager::new(runtime.clone(), languages, settings);

    let id = manager.create_session("ruby").await.unwrap();
    manager.execute(&id, "ruby", "puts 1").await.unwrap();

    assert_eq!(
        runtime.exec_commands(),
        vec![
            "touch main.rb".to_string(),
            "echo 'puts 1' > main.rb;ruby main.rb;".to_string(),
        ]
    );
    assert_eq!(
        runtime.calls()[0],
        RuntimeCall::Create {
            image: "ruby:3".into()
        }
    );
}
