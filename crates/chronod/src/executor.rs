//! Runs a single job attempt: spawns the child process, tees its output to
//! per-run log files, and answers a small control protocol while it runs.

use std::path::PathBuf;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::schedule::JobDefinition;
use crate::tracker::RunToken;

/// Commands accepted on a [`RunningJob`](crate::tracker::RunningJob)'s
/// control channel.
#[derive(Debug)]
pub enum ExecutorCommand {
    /// Kill the process. Replies `true` on success, `false` on failure.
    StopProcess(oneshot::Sender<bool>),
    /// Stop listening; the executor is about to exit anyway.
    End,
}

/// Run `job` to completion under `token`, logging stdout/stderr beneath
/// `logs_root`, answering `control_rx` until the process exits.
///
/// Caller contract: the tracker entry for `token` already exists before
/// this is spawned, and the caller removes it once this returns.
pub async fn run(
    job: JobDefinition,
    token: RunToken,
    logs_root: PathBuf,
    mut control_rx: mpsc::Receiver<ExecutorCommand>,
) {
    let mut parts = job.command.split(' ').filter(|s| !s.is_empty());
    let program = match parts.next() {
        Some(p) => p,
        None => {
            tracing::error!(label = %job.label, "missing executable in job command");
            return;
        }
    };
    let args: Vec<&str> = parts.collect();

    let mut command = Command::new(program);
    command
        .args(&args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::error!(label = %job.label, error = %err, "failed to spawn job");
            return;
        }
    };
    tracing::info!(label = %job.label, %token, "started job");

    let log_dir = run_log_dir(&logs_root, &job.label, &token);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(tee_to_log(stdout, log_dir.clone(), "stdout.txt"));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(tee_to_log(stderr, log_dir.clone(), "stderr.txt"));
    }

    loop {
        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => tracing::info!(label = %job.label, %token, ?status, "job completed"),
                    Err(err) => tracing::error!(label = %job.label, %token, error = %err, "error waiting for job"),
                }
                break;
            }
            cmd = control_rx.recv() => {
                match cmd {
                    Some(ExecutorCommand::StopProcess(reply)) => {
                        let ok = child.kill().await.is_ok();
                        let _ = reply.send(ok);
                        if ok {
                            tracing::info!(label = %job.label, %token, "job stopped on request");
                        }
                    }
                    Some(ExecutorCommand::End) | None => {
                        // channel closed or explicit end before exit: keep
                        // waiting for the process, nothing more to answer.
                    }
                }
            }
        }
    }

    // Release anyone still holding a sender; further commands are answered
    // "unknown" implicitly by the channel simply being gone.
    control_rx.close();
}

fn run_log_dir(logs_root: &std::path::Path, label: &str, token: &RunToken) -> PathBuf {
    let date = Utc::now().format("%Y-%m-%d").to_string();
    let safe_label = label.replace(' ', "_");
    logs_root.join(date).join(safe_label).join(token.to_string())
}

async fn tee_to_log(
    pipe: impl tokio::io::AsyncRead + Unpin,
    log_dir: PathBuf,
    file_name: &'static str,
) {
    if let Err(err) = tokio::fs::create_dir_all(&log_dir).await {
        tracing::warn!(dir = %log_dir.display(), error = %err, "could not create log directory");
        return;
    }
    let path = log_dir.join(file_name);
    let mut file = match tokio::fs::File::create(&path).await {
        Ok(f) => f,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not open log file");
            return;
        }
    };

    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if file.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if file.write_all(b"\n").await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "error reading job output");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::RunToken;

    #[test]
    fn run_log_dir_replaces_spaces_with_underscores() {
        let dir = run_log_dir(std::path::Path::new("/var/log/chronod"), "nightly backup", &RunToken::new());
        assert!(dir.to_string_lossy().contains("nightly_backup"));
    }

    #[tokio::test]
    async fn run_executes_command_and_exits_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobDefinition::new("alpha", "/bin/true", "* * * * *");
        let (_tx, rx) = mpsc::channel(1);
        run(job, RunToken::new(), dir.path().to_path_buf(), rx).await;
        // No panic, no hang: success.
    }

    #[tokio::test]
    async fn run_writes_stdout_to_a_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobDefinition::new("alpha", "/bin/echo hello-from-job", "* * * * *");
        let token = RunToken::new();
        let (_tx, rx) = mpsc::channel(1);
        run(job, token, dir.path().to_path_buf(), rx).await;

        // Give the tee task a moment to flush after the child exits.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let log_dir = run_log_dir(dir.path(), "alpha", &token);
        let stdout = tokio::fs::read_to_string(log_dir.join("stdout.txt")).await;
        assert!(stdout.map(|s| s.contains("hello-from-job")).unwrap_or(false));
    }

    #[tokio::test]
    async fn stop_process_command_kills_a_long_running_job() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobDefinition::new("alpha", "/bin/sleep 60", "* * * * *");
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(job, RunToken::new(), dir.path().to_path_buf(), rx));

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(ExecutorCommand::StopProcess(reply_tx)).await.unwrap();
        let stopped = reply_rx.await.unwrap();
        assert!(stopped);

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("executor should exit promptly after being stopped")
            .unwrap();
    }
}
