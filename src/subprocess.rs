//! Subprocess Supervisor, per §4.6: launches a validated generated script, reads stdout and
//! stderr concurrently, parses `__PROGRESS__<JSON>` lines from stderr, and enforces a
//! wall-clock timeout with forced termination.

use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::{ErrorKind, HandlerError};
use crate::handlers::ProgressEmitter;
use crate::models::{CancelSignal, ProgressType};

/// Grace period between a graceful termination attempt and a force-kill, per §4.6.
const KILL_GRACE: Duration = Duration::from_secs(5);
/// Bounded tail of stderr kept for error context on non-zero exit, per §4.6.
const STDERR_TAIL_BYTES: usize = 2 * 1024;

const PROGRESS_PREFIX: &str = "__PROGRESS__";

#[derive(Debug, Deserialize)]
struct RawProgress {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
    #[allow(dead_code)]
    entity: Option<String>,
    current: Option<u64>,
    total: Option<u64>,
    wait_seconds: Option<u64>,
}

/// The result of a completed subprocess run.
pub struct SubprocessOutcome {
    pub stdout: String,
}

/// Run `script_path` (already passed through the Code Validator by the caller) to
/// completion or until `timeout`/`cancel` fires, forwarding structured progress lines.
///
/// The temp file at `script_path` is always removed before returning, on every path.
pub async fn run(
    script_path: &std::path::Path,
    timeout: Duration,
    cancel: &CancelSignal,
    emitter: &ProgressEmitter,
) -> Result<SubprocessOutcome, HandlerError> {
    let result = run_inner(script_path, timeout, cancel, emitter).await;
    let _ = tokio::fs::remove_file(script_path).await;
    result
}

async fn run_inner(
    script_path: &std::path::Path,
    timeout: Duration,
    cancel: &CancelSignal,
    emitter: &ProgressEmitter,
) -> Result<SubprocessOutcome, HandlerError> {
    let mut child = Command::new(script_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            HandlerError::new(ErrorKind::Internal("failed to spawn subprocess".into()))
                .with_technical_details(e.to_string())
        })?;

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let stdout_task = tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut buf = String::new();
        let mut out = String::new();
        loop {
            buf.clear();
            match reader.read_line(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => out.push_str(&buf),
            }
        }
        out
    });

    let emitter = emitter.clone();
    let stderr_task = tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = String::new();
        let mut tail = String::new();
        loop {
            buf.clear();
            match reader.read_line(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    forward_progress_line(buf.trim_end(), &emitter).await;
                    tail.push_str(&buf);
                    if tail.len() > STDERR_TAIL_BYTES * 2 {
                        let excess = tail.len() - STDERR_TAIL_BYTES;
                        tail.drain(0..excess);
                    }
                }
            }
        }
        tail
    });

    let wait_result = tokio::select! {
        status = child.wait() => Outcome::Exited(status),
        _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
        _ = wait_for_cancel(cancel) => Outcome::Cancelled,
    };

    let (status, tail) = match wait_result {
        Outcome::Exited(status) => {
            let tail = stderr_task.await.unwrap_or_default();
            (status, tail)
        }
        Outcome::TimedOut => {
            terminate(&mut child).await;
            let tail = stderr_task.await.unwrap_or_default();
            stdout_task.abort();
            return Err(HandlerError::timeout(timeout.as_secs())
                .with_technical_details(tail_summary(&tail)));
        }
        Outcome::Cancelled => {
            terminate(&mut child).await;
            stdout_task.abort();
            let _ = stderr_task.await;
            return Err(HandlerError::cancelled());
        }
    };

    let stdout_text = stdout_task.await.unwrap_or_default();

    match status {
        Ok(status) if status.success() => Ok(SubprocessOutcome {
            stdout: stdout_text.trim_end().to_string(),
        }),
        Ok(status) => Err(HandlerError::new(ErrorKind::Internal(format!(
            "subprocess exited with {}",
            status
        )))
        .with_technical_details(tail_summary(&tail))),
        Err(e) => Err(HandlerError::new(ErrorKind::Internal(
            "failed to wait on subprocess".into(),
        ))
        .with_technical_details(e.to_string())),
    }
}

enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

async fn wait_for_cancel(cancel: &CancelSignal) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Send a graceful terminate, then force-kill after [`KILL_GRACE`] if the child is still
/// alive, per §4.6.
async fn terminate(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    let graceful = tokio::time::timeout(KILL_GRACE, child.wait()).await;
    if graceful.is_err() {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

fn tail_summary(tail: &str) -> String {
    if tail.len() > STDERR_TAIL_BYTES {
        tail[tail.len() - STDERR_TAIL_BYTES..].to_string()
    } else {
        tail.to_string()
    }
}

async fn forward_progress_line(line: &str, emitter: &ProgressEmitter) {
    let Some(payload) = line.strip_prefix(PROGRESS_PREFIX) else {
        return;
    };
    let Ok(parsed) = serde_json::from_str::<RawProgress>(payload) else {
        emitter
            .progress(ProgressType::Generic, None, None, payload.to_string())
            .await;
        return;
    };

    let message = parsed
        .message
        .clone()
        .unwrap_or_else(|| payload.to_string());

    match parsed.kind.as_deref() {
        Some("rate_limit_wait") => {
            emitter
                .rate_limit_wait(parsed.wait_seconds.unwrap_or(0), message)
                .await;
        }
        Some("entity_start") | Some("entity_progress") | Some("entity_complete")
        | Some("api_call_limit") => {
            emitter
                .progress(ProgressType::Generic, parsed.current, parsed.total, message)
                .await;
        }
        _ => {
            emitter
                .progress(ProgressType::Generic, parsed.current, parsed.total, message)
                .await;
        }
    }
}

/// Write `code` to a fresh temp file and make it executable, returning its path. The
/// supervisor always removes this file on exit (success, failure, or timeout); the
/// `NamedTempFile` is `keep()`-ed here precisely so ownership of that cleanup moves to the
/// caller rather than being dropped (and deleted) as soon as this function returns.
pub async fn materialize_script(code: &str) -> std::io::Result<std::path::PathBuf> {
    let code = code.to_string();
    tokio::task::spawn_blocking(move || -> std::io::Result<std::path::PathBuf> {
        let named = tempfile::Builder::new()
            .prefix("query-engine-script-")
            .suffix(".sh")
            .tempfile()?;
        {
            use std::io::Write;
            let mut file = named.as_file();
            file.write_all(code.as_bytes())?;
            file.flush()?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = named.as_file().metadata()?.permissions();
            perms.set_mode(0o700);
            named.as_file().set_permissions(perms)?;
        }

        let (_file, path) = named.keep().map_err(|e| e.error)?;
        Ok(path)
    })
    .await
    .expect("materialize_script blocking task panicked")
}
