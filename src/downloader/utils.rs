// Helper functions shared by the extractor backends and the request handler

use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use super::errors::ExtractionError;
use super::models::MediaRequest;

const MAX_FILENAME_LEN: usize = 80;
const FALLBACK_FILENAME: &str = "download";

/// Run command with timeout, collecting stdout and stderr in full.
///
/// The child is killed when the deadline passes or the future is dropped.
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    limit: Duration,
) -> Result<Output, ExtractionError> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExtractionError::from_spawn(program, e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| ExtractionError::failed(format!("Failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| ExtractionError::failed(format!("Failed to capture stderr from {}", program)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let stdout_abort = stdout_task.abort_handle();
    let stderr_abort = stderr_task.abort_handle();

    // The deadline also covers the pipes: a grandchild can hold them open
    // after the child itself has exited
    let collected = timeout(limit, async {
        let status = child
            .wait()
            .await
            .map_err(|e| ExtractionError::failed(format!("Failed to wait for {}: {}", program, e)))?;
        let stdout = join_pipe(stdout_task, "stdout").await?;
        let stderr = join_pipe(stderr_task, "stderr").await?;
        Ok::<_, ExtractionError>(Output {
            status,
            stdout,
            stderr,
        })
    })
    .await;

    match collected {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(program, timeout_secs = limit.as_secs(), "Killing extractor after timeout");
            let _ = child.kill().await;
            stdout_abort.abort();
            stderr_abort.abort();
            Err(ExtractionError::ExtractionTimeout(limit))
        }
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
    pipe: &str,
) -> Result<Vec<u8>, ExtractionError> {
    task.await
        .map_err(|e| ExtractionError::failed(format!("{} task failed: {}", pipe, e)))?
        .map_err(|e| ExtractionError::failed(format!("Failed to read {}: {}", pipe, e)))
}

/// Attachment filename for a download response.
///
/// Derived from the `v` query parameter, else the last path segment, else
/// the host. Only `[A-Za-z0-9._-]` survive, so the value is always safe
/// inside a quoted `Content-Disposition` parameter.
pub fn attachment_filename(request: &MediaRequest) -> String {
    let url = request.url();

    let stem = url
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .or_else(|| {
            url.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
                .map(ToString::to_string)
        })
        .or_else(|| url.host_str().map(ToString::to_string))
        .map(|s| sanitize(&s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string());

    let name = match request.rendition().map(sanitize).filter(|s| !s.is_empty()) {
        Some(rendition) => format!("{}-{}", stem, rendition),
        None => stem,
    };

    name.chars().take(MAX_FILENAME_LEN).collect()
}

fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn request(url: &str, rendition: Option<&str>) -> MediaRequest {
        MediaRequest::new(url, rendition).unwrap()
    }

    #[test]
    fn test_filename_from_query() {
        let req = request("https://www.youtube.com/watch?v=dQw4w9WgXcQ", Some("18"));
        assert_eq!(attachment_filename(&req), "dQw4w9WgXcQ-18");
    }

    #[test]
    fn test_filename_from_path_and_host() {
        let req = request("https://vimeo.com/channels/staff/123456/", None);
        assert_eq!(attachment_filename(&req), "123456");

        let req = request("https://example.com/", None);
        assert_eq!(attachment_filename(&req), "example.com");
    }

    #[test]
    fn test_filename_is_sanitized() {
        let req = request("https://example.com/a%22b%20c.mp4", Some("best[height<=720]/best"));
        let name = attachment_filename(&req);
        assert!(name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
        assert!(name.starts_with("a_22b_20c.mp4-best"));

        let long = format!("https://example.com/{}", "x".repeat(200));
        assert_eq!(attachment_filename(&request(&long, None)).len(), MAX_FILENAME_LEN);
    }

    #[test]
    fn test_filename_fallback() {
        let req = request("https://example.com/watch?v=..", None);
        assert_eq!(attachment_filename(&req), "download");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_collects_streams() {
        let args = vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()];
        let output = run_output_with_timeout("sh", &args, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr, b"err\n");
        assert_eq!(output.status.code(), Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_times_out() {
        let args = vec!["-c".to_string(), "sleep 10".to_string()];
        let err = run_output_with_timeout("sh", &args, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_matches!(err, ExtractionError::ExtractionTimeout(_));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_deadline_covers_inherited_pipes() {
        // The shell exits at once but its background job keeps stdout open
        let args = vec!["-c".to_string(), "sleep 5 & echo '{}'; exit 0".to_string()];
        let started = std::time::Instant::now();
        let err = run_output_with_timeout("sh", &args, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert_matches!(err, ExtractionError::ExtractionTimeout(_));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let err = run_output_with_timeout("definitely-not-a-real-tool-xyz", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_matches!(err, ExtractionError::ExtractorUnavailable(_));
    }
}
