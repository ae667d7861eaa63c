// SPDX-FileCopyrightText: Copyright © 2020-2026 bloud developers
//
// SPDX-License-Identifier: MPL-2.0

//! Invokes the external declarative-system applier, streaming its output
//! and reconciling the process supervisor afterwards.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::supervisor::Supervisor;
use super::Error;

const REBUILD_KEYWORDS: [&str; 4] = ["starting", "stopping", "restarting", "reloading"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildEvent {
    pub stream: Stream,
    pub line: String,
}

pub type EventSink = UnboundedSender<RebuildEvent>;

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub success: bool,
    pub duration: Duration,
    pub output: String,
    pub changes: Vec<String>,
    pub error_message: Option<String>,
}

/// Configuration for invoking the external declarative applier.
#[derive(Debug, Clone)]
pub struct ApplierConfig {
    pub binary: String,
    pub flake_path: String,
    pub flake_target: String,
}

/// Serializes rebuilds with a process-wide mutex: at most one applier
/// subprocess runs at a time, a second caller blocks until the first
/// completes. The same mutex also serializes the orchestrator's
/// install/uninstall phase sequences (§5) — [`Applier::rebuild_lock`]
/// hands out the shared handle so a caller can hold it across more than
/// just the subprocess call.
pub struct Applier {
    config: ApplierConfig,
    supervisor: Supervisor,
    rebuild_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Applier {
    pub fn new(config: ApplierConfig, supervisor: Supervisor) -> Self {
        Self {
            config,
            supervisor,
            rebuild_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// The mutex guarding rebuilds, shared with whichever caller needs to
    /// hold it across a longer sequence (install/uninstall orchestration).
    pub fn rebuild_lock(&self) -> Arc<tokio::sync::Mutex<()>> {
        self.rebuild_lock.clone()
    }

    /// Rebuilds and activates the system, streaming stdout/stderr to
    /// `sink` as they arrive. Honors `cancel`: cancelling terminates the
    /// subprocess. After a successful apply, reloads and restarts the
    /// supervisor so new unit definitions take effect.
    ///
    /// Acquires the rebuild lock itself; callers who already hold it (the
    /// orchestrator, mid-phase-sequence) must use
    /// [`Applier::apply_locked`] instead to avoid deadlocking on the
    /// non-reentrant mutex.
    pub async fn apply(&self, sink: EventSink, cancel: CancellationToken) -> ApplyOutcome {
        let _guard = self.rebuild_lock.lock().await;
        self.apply_locked(sink, cancel).await
    }

    /// Same as [`Applier::apply`], but assumes the caller already holds
    /// the rebuild lock (obtained via [`Applier::rebuild_lock`]).
    pub async fn apply_locked(&self, sink: EventSink, cancel: CancellationToken) -> ApplyOutcome {
        let start = Instant::now();

        let flake_ref = format!("{}#{}", self.config.flake_path, self.config.flake_target);
        let spawned = Command::new(&self.config.binary)
            .args(["switch", "--flake", &flake_ref, "--impure"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                return ApplyOutcome {
                    success: false,
                    duration: start.elapsed(),
                    output: String::new(),
                    changes: Vec::new(),
                    error_message: Some(format!("failed to spawn applier: {source}")),
                }
            }
        };

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let output = Arc::new(Mutex::new(String::new()));
        let changes = Arc::new(Mutex::new(Vec::new()));

        let stdout_task = tokio::spawn(pump_lines(stdout, Stream::Stdout, sink.clone(), output.clone(), changes.clone()));
        let stderr_task = tokio::spawn(pump_lines(stderr, Stream::Stderr, sink, output.clone(), changes.clone()));

        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                return ApplyOutcome {
                    success: false,
                    duration: start.elapsed(),
                    output: output.lock().unwrap().clone(),
                    changes: changes.lock().unwrap().clone(),
                    error_message: Some("cancelled".to_string()),
                };
            }
        };

        let _ = stdout_task.await;
        let _ = stderr_task.await;

        let success = matches!(status, Ok(ref status) if status.success());
        let error_message = match &status {
            Ok(status) if status.success() => None,
            Ok(status) => Some(format!("applier exited with {status}")),
            Err(source) => Some(format!("failed to wait for applier: {source}")),
        };

        let outcome = ApplyOutcome {
            success,
            duration: start.elapsed(),
            output: output.lock().unwrap().clone(),
            changes: changes.lock().unwrap().clone(),
            error_message,
        };

        if outcome.success {
            // Best-effort-idempotent: a failure here does not undo a
            // successful rebuild, it just leaves stale units until the
            // next apply.
            let _ = self.supervisor.daemon_reload().await;
            let _ = self.supervisor.restart_target("bloud-apps.target").await;
        }

        outcome
    }

    pub async fn stop_service(&self, app: &str) -> Result<(), Error> {
        self.supervisor.stop_service(app).await
    }
}

async fn pump_lines(
    pipe: impl tokio::io::AsyncRead + Unpin,
    stream: Stream,
    sink: EventSink,
    output: Arc<Mutex<String>>,
    changes: Arc<Mutex<Vec<String>>>,
) {
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        {
            let mut output = output.lock().unwrap();
            output.push_str(&line);
            output.push('\n');
        }

        let lowercase = line.to_ascii_lowercase();
        if REBUILD_KEYWORDS.iter().any(|keyword| lowercase.contains(keyword)) {
            changes.lock().unwrap().push(line.clone());
        }

        // Never block the subprocess reader: an unbounded sender either
        // enqueues immediately or the receiver is gone, in which case we
        // drop the event and keep draining the pipe.
        let _ = sink.send(RebuildEvent { stream, line });
    }
}

#[cfg(test)]
mod test {
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn successful_apply_reports_success_and_duration() {
        let config = ApplierConfig {
            binary: "true".to_string(),
            flake_path: "/etc/bloud".to_string(),
            flake_target: "appliance".to_string(),
        };
        // `true` ignores its arguments and exits 0; good enough to exercise
        // the streaming plumbing without a real declarative tool present.
        let applier = Applier::new(config, Supervisor::new("true"));
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = applier.apply(tx, CancellationToken::new()).await;
        assert!(outcome.success);
        assert!(outcome.error_message.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_failure_not_an_error() {
        let config = ApplierConfig {
            binary: "false".to_string(),
            flake_path: "/etc/bloud".to_string(),
            flake_target: "appliance".to_string(),
        };
        let applier = Applier::new(config, Supervisor::new("true"));
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = applier.apply(tx, CancellationToken::new()).await;
        assert!(!outcome.success);
        assert!(outcome.error_message.is_some());
    }

    #[tokio::test]
    async fn cancellation_terminates_the_subprocess() {
        let config = ApplierConfig {
            binary: "sleep".to_string(),
            flake_path: "100".to_string(),
            flake_target: "ignored".to_string(),
        };
        let applier = Applier::new(config, Supervisor::new("true"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = applier.apply(tx, cancel).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_message.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn lines_matching_keywords_are_recorded_as_changes() {
        let input = "podman-radarr.service: starting\nunrelated line\nsonarr.service: stopping\n";
        let (tx, mut rx) = mpsc::unbounded_channel();
        let output = Arc::new(Mutex::new(String::new()));
        let changes = Arc::new(Mutex::new(Vec::new()));

        pump_lines(std::io::Cursor::new(input), Stream::Stdout, tx, output.clone(), changes.clone()).await;
        rx.close();

        let changes = changes.lock().unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes[0].contains("starting"));
        assert!(changes[1].contains("stopping"));
        assert_eq!(output.lock().unwrap().lines().count(), 3);
    }
}
