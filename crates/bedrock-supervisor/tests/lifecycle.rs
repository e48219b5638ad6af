//! Lifecycle scenarios driven by `/bin/sh` stand-in servers.
//!
//! The echo server script mimics the real binary's console contract: it
//! reads newline-terminated commands, exits on the `stop` directive, and
//! echoes everything else back, which lets tests feed player join/leave/ping
//! lines through the full stdin -> stdout -> extractor path.

#![cfg(unix)]

use std::{path::Path, time::Duration};

use bedrock_process::{Player, ProcessState};
use bedrock_supervisor::{EventBus, Supervisor, SupervisorConfig};
use tokio::sync::broadcast;

const ECHO_SERVER: &str = r#"while IFS= read -r line; do if [ "$line" = "stop" ]; then exit 0; fi; echo "$line"; done"#;

// Exits with a crash code on the first run, behaves like the echo server on
// the next (the marker file lives in the scratch server dir).
const CRASH_ONCE: &str = r#"if [ ! -f crashed ]; then touch crashed; exit 7; else while IFS= read -r line; do if [ "$line" = "stop" ]; then exit 0; fi; done; fi"#;

// Reads commands but never honors the stop directive.
const STUBBORN: &str = r#"while IFS= read -r line; do :; done"#;

fn sh_config(dir: &Path, script: &str) -> SupervisorConfig {
    let mut config = SupervisorConfig::new(dir);
    config.command = "/bin/sh".to_string();
    config.args = vec!["-c".to_string(), script.to_string()];
    config.restart_delay = Duration::from_millis(200);
    config.settle_delay = Duration::from_millis(50);
    config.stop_wait_timeout = Duration::from_secs(5);
    config
}

async fn wait_status(rx: &mut broadcast::Receiver<ProcessState>, want: ProcessState) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(state) if state == want => return,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(err) => panic!("status channel closed: {err}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for status {want:?}"));
}

async fn wait_players<F>(rx: &mut broadcast::Receiver<Vec<Player>>, pred: F) -> Vec<Player>
where
    F: Fn(&[Player]) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(snapshot) if pred(&snapshot) => return snapshot,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(err) => panic!("players channel closed: {err}"),
            }
        }
    })
    .await
    .expect("timed out waiting for players snapshot")
}

async fn wait_output_line(rx: &mut broadcast::Receiver<String>, needle: &str) -> String {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(line) if line.contains(needle) => return line,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(err) => panic!("output channel closed: {err}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for output containing {needle:?}"))
}

#[tokio::test]
async fn start_twice_is_rejected_without_a_state_change() {
    let dir = tempfile::tempdir().unwrap();
    let sup = Supervisor::new(sh_config(dir.path(), ECHO_SERVER), EventBus::new(64));
    let mut status_rx = sup.bus().subscribe_status();

    assert!(sup.start().await.started);
    wait_status(&mut status_rx, ProcessState::Running).await;

    let again = sup.start().await;
    assert!(!again.started);
    assert_eq!(again.message.as_deref(), Some("Server already running"));
    assert_eq!(sup.status().await, ProcessState::Running);

    assert!(sup.stop().await.stopped);
    wait_status(&mut status_rx, ProcessState::Stopped).await;
}

#[tokio::test]
async fn commands_reach_stdin_and_roster_tracks_console_lines() {
    let dir = tempfile::tempdir().unwrap();
    let sup = Supervisor::new(sh_config(dir.path(), ECHO_SERVER), EventBus::new(64));
    let mut status_rx = sup.bus().subscribe_status();
    let mut players_rx = sup.bus().subscribe_players();
    let mut output_rx = sup.bus().subscribe_output();

    assert!(sup.start().await.started);
    wait_status(&mut status_rx, ProcessState::Running).await;

    // The echo server reproduces the command line exactly, proving the
    // newline-terminated bytes arrived on stdin.
    assert!(sup.send_command("say hi").await.sent);
    let echoed = wait_output_line(&mut output_rx, "say hi").await;
    assert_eq!(echoed, "say hi");

    assert!(
        sup.send_command("Player connected: Steve, xuid: 123")
            .await
            .sent
    );
    let snap = wait_players(&mut players_rx, |s| s.len() == 1).await;
    assert_eq!(snap[0].name, "Steve");
    assert_eq!(snap[0].xuid, "123");
    assert_eq!(snap[0].ping, 0);

    assert!(sup.send_command("Player Ping: Steve, 42").await.sent);
    let snap = wait_players(&mut players_rx, |s| s.first().is_some_and(|p| p.ping == 42)).await;
    assert_eq!(snap.len(), 1);

    assert!(
        sup.send_command("Player disconnected: Steve, xuid: 123")
            .await
            .sent
    );
    wait_players(&mut players_rx, |s| s.is_empty()).await;
    assert!(sup.players().await.is_empty());

    assert!(sup.stop().await.stopped);
    wait_status(&mut status_rx, ProcessState::Stopped).await;
}

#[tokio::test]
async fn operator_stop_does_not_schedule_an_autorestart() {
    let dir = tempfile::tempdir().unwrap();
    let sup = Supervisor::new(sh_config(dir.path(), ECHO_SERVER), EventBus::new(64));
    let mut status_rx = sup.bus().subscribe_status();

    assert!(sup.start().await.started);
    wait_status(&mut status_rx, ProcessState::Running).await;

    let stop = sup.stop().await;
    assert!(stop.stopped);
    wait_status(&mut status_rx, ProcessState::Stopping).await;
    wait_status(&mut status_rx, ProcessState::Stopped).await;

    // Well past the restart delay: still down.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(sup.status().await, ProcessState::Stopped);
    assert!(!sup.is_running().await);
}

#[tokio::test]
async fn crash_schedules_an_autorestart_and_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let sup = Supervisor::new(sh_config(dir.path(), CRASH_ONCE), EventBus::new(64));
    let mut status_rx = sup.bus().subscribe_status();
    let mut output_rx = sup.bus().subscribe_output();

    assert!(sup.start().await.started);
    wait_status(&mut status_rx, ProcessState::Running).await;

    // First run exits with code 7 without a stop() call.
    wait_status(&mut status_rx, ProcessState::Stopped).await;
    wait_output_line(&mut output_rx, "stopped with code 7").await;
    wait_output_line(&mut output_rx, "restarting in").await;

    // The scheduled restart brings it back up.
    wait_status(&mut status_rx, ProcessState::Running).await;
    assert!(sup.is_running().await);

    assert!(sup.stop().await.stopped);
    wait_status(&mut status_rx, ProcessState::Stopped).await;
}

#[tokio::test]
async fn stop_cancels_a_pending_autorestart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sh_config(dir.path(), "exit 3");
    config.restart_delay = Duration::from_millis(300);
    let sup = Supervisor::new(config, EventBus::new(64));
    let mut status_rx = sup.bus().subscribe_status();

    assert!(sup.start().await.started);
    wait_status(&mut status_rx, ProcessState::Running).await;
    wait_status(&mut status_rx, ProcessState::Stopped).await;

    // A restart is now pending; stop() is rejected (nothing to stop) but
    // still cancels the timer.
    let stop = sup.stop().await;
    assert!(!stop.stopped);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(sup.status().await, ProcessState::Stopped);
}

#[tokio::test]
async fn spawn_failure_lands_in_error_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SupervisorConfig::new(dir.path());
    config.command = "./definitely-missing-binary".to_string();
    let sup = Supervisor::new(config, EventBus::new(64));
    let mut status_rx = sup.bus().subscribe_status();
    let mut output_rx = sup.bus().subscribe_output();

    let outcome = sup.start().await;
    assert!(!outcome.started);
    assert!(outcome.message.is_some_and(|m| !m.is_empty()));
    assert_eq!(sup.status().await, ProcessState::Error);
    assert!(sup.players().await.is_empty());

    wait_status(&mut status_rx, ProcessState::Error).await;
    wait_output_line(&mut output_rx, "Failed to start server").await;

    // No auto-restart from a failed spawn.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(sup.status().await, ProcessState::Error);
}

#[tokio::test]
async fn restart_from_stopped_is_equivalent_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let sup = Supervisor::new(sh_config(dir.path(), ECHO_SERVER), EventBus::new(64));
    let mut status_rx = sup.bus().subscribe_status();

    let outcome = sup.restart().await;
    assert!(outcome.restarted);
    assert_eq!(outcome.message.as_deref(), Some("Server started"));
    wait_status(&mut status_rx, ProcessState::Running).await;

    assert!(sup.stop().await.stopped);
    wait_status(&mut status_rx, ProcessState::Stopped).await;
}

#[tokio::test]
async fn restart_while_running_cycles_the_process_and_clears_the_roster() {
    let dir = tempfile::tempdir().unwrap();
    let sup = Supervisor::new(sh_config(dir.path(), ECHO_SERVER), EventBus::new(64));
    let mut status_rx = sup.bus().subscribe_status();
    let mut players_rx = sup.bus().subscribe_players();

    assert!(sup.start().await.started);
    wait_status(&mut status_rx, ProcessState::Running).await;

    assert!(
        sup.send_command("Player connected: Steve, xuid: 123")
            .await
            .sent
    );
    wait_players(&mut players_rx, |s| s.len() == 1).await;

    let outcome = sup.restart().await;
    assert!(outcome.restarted);
    assert!(sup.is_running().await);
    assert!(sup.players().await.is_empty());

    assert!(sup.stop().await.stopped);
    wait_status(&mut status_rx, ProcessState::Stopped).await;
}

#[tokio::test]
async fn roster_is_empty_after_close_even_with_a_burst_of_join_lines() {
    let dir = tempfile::tempdir().unwrap();
    // Exits immediately after the burst, leaving thousands of join lines
    // buffered in the pipe behind the process exit.
    let burst = r#"i=0; while [ $i -lt 2000 ]; do echo "Player connected: Ghost$i, xuid: $i"; i=$((i+1)); done"#;
    let mut config = sh_config(dir.path(), burst);
    config.auto_restart = false;
    let sup = Supervisor::new(config, EventBus::new(64));
    let mut status_rx = sup.bus().subscribe_status();

    assert!(sup.start().await.started);
    wait_status(&mut status_rx, ProcessState::Running).await;
    wait_status(&mut status_rx, ProcessState::Stopped).await;

    // The close transition runs only after the readers drain, so none of
    // the buffered joins can land in the roster after the wholesale clear.
    assert!(sup.players().await.is_empty());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(sup.players().await.is_empty());
}

#[tokio::test]
async fn blocked_stdin_writer_does_not_wedge_the_state_machine() {
    let dir = tempfile::tempdir().unwrap();
    // Never reads stdin, so the pipe buffer fills and writers block. exec
    // keeps the shell from forking, so the recorded pid is the sleeper's.
    let mut config = sh_config(dir.path(), "exec sleep 600");
    config.stop_wait_timeout = Duration::from_millis(300);
    let sup = Supervisor::new(config, EventBus::new(64));
    let mut status_rx = sup.bus().subscribe_status();

    assert!(sup.start().await.started);
    wait_status(&mut status_rx, ProcessState::Running).await;

    // Far larger than the pipe buffer; this write stays blocked until the
    // process dies and the pipe breaks.
    let writer = {
        let sup = sup.clone();
        tokio::spawn(async move { sup.send_command(&"x".repeat(1 << 20)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // State queries still answer while the writer is stuck.
    let status = tokio::time::timeout(Duration::from_secs(1), sup.status())
        .await
        .expect("status query wedged behind a blocked stdin write");
    assert_eq!(status, ProcessState::Running);

    // stop() cannot reach the pipe either; it falls back to a signal and
    // the close transition still happens.
    assert!(sup.stop().await.stopped);
    wait_status(&mut status_rx, ProcessState::Stopped).await;

    let outcome = writer.await.unwrap();
    assert!(!outcome.sent);
}

#[tokio::test]
async fn restart_force_kills_a_process_that_ignores_the_stop_directive() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sh_config(dir.path(), STUBBORN);
    config.stop_wait_timeout = Duration::from_millis(300);
    let sup = Supervisor::new(config, EventBus::new(64));
    let mut status_rx = sup.bus().subscribe_status();
    let mut output_rx = sup.bus().subscribe_output();

    assert!(sup.start().await.started);
    wait_status(&mut status_rx, ProcessState::Running).await;

    let outcome = sup.restart().await;
    assert!(outcome.restarted);
    wait_output_line(&mut output_rx, "did not exit in time").await;
    assert!(sup.is_running().await);

    // The replacement is just as stubborn; tearing down the test closes its
    // stdin and the read loop exits on EOF.
    let _ = sup.stop().await;
}
