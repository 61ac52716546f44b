// Supervisor recovery and shutdown tests using real child processes.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use wxgate::supervisor::{ServiceSpec, Supervisor};

#[tokio::test]
async fn dead_unit_is_relaunched_within_one_poll() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("starts.log");
    let script = format!("echo started >> {} && exit 1", marker.display());
    let spec = ServiceSpec::new("crasher", "/bin/sh".into(), vec!["-c".to_string(), script]);

    let supervisor =
        Supervisor::with_intervals(vec![spec], Duration::from_millis(100), Duration::from_secs(2));
    let token = CancellationToken::new();
    let task = {
        let token = token.clone();
        tokio::spawn(async move { supervisor.run(token).await })
    };

    tokio::time::sleep(Duration::from_millis(600)).await;
    token.cancel();
    task.await.unwrap().unwrap();

    let starts = std::fs::read_to_string(&marker).unwrap();
    assert!(
        starts.lines().count() >= 2,
        "unit was not relaunched: {starts:?}"
    );
}

#[tokio::test]
async fn shutdown_terminates_long_running_units() {
    let spec = ServiceSpec::new(
        "sleeper",
        "/bin/sh".into(),
        vec!["-c".to_string(), "sleep 30".to_string()],
    );
    let supervisor =
        Supervisor::with_intervals(vec![spec], Duration::from_millis(100), Duration::from_secs(2));
    let token = CancellationToken::new();
    let task = {
        let token = token.clone();
        tokio::spawn(async move { supervisor.run(token).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    token.cancel();
    // Must return long before the 30 s the child would otherwise run:
    // SIGTERM first, then the bounded-wait kill.
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("supervisor did not stop in time")
        .unwrap()
        .unwrap();
}
