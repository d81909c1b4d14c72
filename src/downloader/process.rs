// ExtractorProcess - owned yt-dlp child for the streaming path
//
// stdout is handed to the caller as the media pipe. stderr is drained in the
// background so the child never blocks on a full pipe; the last 16 KiB are
// kept for the error report.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command as TokioCommand};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::errors::ExtractionError;
use super::extractors::StreamHandle;

const STDERR_TAIL_BYTES: usize = 16 * 1024;

pub struct ExtractorProcess {
    program: String,
    child: Child,
    stderr_task: Option<JoinHandle<String>>,
    exited: bool,
}

impl ExtractorProcess {
    /// Spawn `program` with stdout piped for the caller.
    pub fn spawn(program: &str, args: &[String]) -> Result<(Self, ChildStdout), ExtractionError> {
        let mut child = TokioCommand::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExtractionError::from_spawn(program, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractionError::failed(format!("Failed to capture stdout from {}", program)))?;
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(stderr, child.id())));

        tracing::debug!(program, pid = child.id(), "Extractor process started");

        Ok((
            Self {
                program: program.to_string(),
                child,
                stderr_task,
                exited: false,
            },
            stdout,
        ))
    }

    async fn collect_stderr(&mut self, grace: Duration) -> String {
        match self.stderr_task.take() {
            // A grandchild (ffmpeg) may still hold the pipe open
            Some(task) => match timeout(grace, task).await {
                Ok(Ok(tail)) => tail,
                _ => String::new(),
            },
            None => String::new(),
        }
    }
}

#[async_trait]
impl StreamHandle for ExtractorProcess {
    fn terminate(&mut self) {
        if self.exited {
            return;
        }
        if let Ok(Some(_)) = self.child.try_wait() {
            self.exited = true;
            return;
        }
        match self.child.start_kill() {
            Ok(()) => tracing::debug!(program = %self.program, "Extractor process killed"),
            Err(e) => tracing::debug!(program = %self.program, error = %e, "Kill failed"),
        }
    }

    async fn finish(&mut self, grace: Duration) -> Result<(), ExtractionError> {
        let status = match timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(ExtractionError::failed(format!(
                    "Failed to wait for {}: {}",
                    self.program, e
                )))
            }
            Err(_) => {
                self.terminate();
                return Err(ExtractionError::failed(format!(
                    "{} did not exit within {}s after end of output",
                    self.program,
                    grace.as_secs()
                )));
            }
        };
        self.exited = true;

        let stderr = self.collect_stderr(grace).await;
        if status.success() {
            Ok(())
        } else {
            Err(ExtractionError::from_exit(&self.program, status, &stderr))
        }
    }
}

impl Drop for ExtractorProcess {
    fn drop(&mut self) {
        self.terminate();
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

async fn drain_stderr(stderr: ChildStderr, pid: Option<u32>) -> String {
    let mut reader = BufReader::new(stderr);
    let mut tail: VecDeque<String> = VecDeque::new();
    let mut tail_len = 0;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!(pid, "yt-dlp: {}", line);

                tail_len += line.len() + 1;
                tail.push_back(line);
                while tail_len > STDERR_TAIL_BYTES && tail.len() > 1 {
                    if let Some(old) = tail.pop_front() {
                        tail_len -= old.len() + 1;
                    }
                }
            }
        }
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_success_exit() {
        let (mut process, mut stdout) = ExtractorProcess::spawn("sh", &sh("printf abc")).unwrap();
        let mut out = Vec::new();
        stdout.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abc");
        assert!(process.finish(Duration::from_secs(5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_carries_stderr() {
        let (mut process, mut stdout) =
            ExtractorProcess::spawn("sh", &sh("echo 'ERROR: Video unavailable' >&2; exit 1")).unwrap();
        let mut out = Vec::new();
        stdout.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());

        let err = process.finish(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.to_string(), "Extraction failed: Video unavailable");
    }

    #[tokio::test]
    async fn test_terminate_kills_child() {
        let (mut process, mut stdout) = ExtractorProcess::spawn("sh", &sh("exec sleep 30")).unwrap();
        process.terminate();

        // stdout closes once the child is gone
        let mut out = Vec::new();
        let read = timeout(Duration::from_secs(5), stdout.read_to_end(&mut out)).await;
        assert!(read.is_ok());
        assert!(process.finish(Duration::from_secs(5)).await.is_err());
    }

    #[tokio::test]
    async fn test_stderr_tail_is_bounded() {
        let (mut process, mut stdout) = ExtractorProcess::spawn(
            "sh",
            &sh("i=0; while [ $i -lt 2000 ]; do echo \"line $i padding padding\" >&2; i=$((i+1)); done; exit 2"),
        )
        .unwrap();
        let mut out = Vec::new();
        stdout.read_to_end(&mut out).await.unwrap();

        let err = process.finish(Duration::from_secs(5)).await.unwrap_err();
        let tail = err.diagnostic().unwrap();
        assert!(tail.len() <= STDERR_TAIL_BYTES);
        assert!(tail.ends_with("line 1999 padding padding"));
        assert!(!tail.contains("line 0 padding"));
    }
}
