use super::output::{existing_files, remove_partials, resolve_output};
use super::{FORMAT_SELECTOR, FetchError, FetchResult, MAX_FILESIZE};
use crate::config::FetchConfig;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Grace period for collecting stderr after the downloader exits
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the external downloader with a wall-clock timeout
#[derive(Debug, Clone)]
pub struct FetchExecutor {
    program: String,
    work_dir: PathBuf,
    timeout: Duration,
}

impl FetchExecutor {
    pub fn new(program: impl Into<String>, work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            work_dir: work_dir.into(),
            timeout,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(&config.downloader, &config.work_dir, config.timeout())
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create the work directory if it does not exist yet
    pub async fn ensure_work_dir(&self) -> Result<(), FetchError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        Ok(())
    }

    /// Output stem unique per request: `download_<unix-ts>_<requester>`
    pub fn output_stem(&self, requester_id: u64, at: DateTime<Utc>) -> PathBuf {
        self.work_dir
            .join(format!("download_{}_{}", at.timestamp(), requester_id))
    }

    /// Arguments passed to the downloader, in order
    pub fn downloader_args(url: &str, stem: &Path) -> Vec<OsString> {
        vec![
            "-o".into(),
            stem.as_os_str().to_owned(),
            "--no-playlist".into(),
            "-f".into(),
            FORMAT_SELECTOR.into(),
            "--max-filesize".into(),
            MAX_FILESIZE.into(),
            url.into(),
        ]
    }

    /// Report the downloader version, failing when it is missing or broken
    pub async fn version(&self) -> Result<String, FetchError> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| FetchError::NotInstalled {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(FetchError::Broken {
                program: self.program.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Download `url` to a file starting with `stem`.
    ///
    /// On timeout the whole process group is killed and reaped. Failure and
    /// timeout both remove whatever the downloader left behind for this stem.
    pub async fn fetch(&self, url: &str, stem: &Path) -> FetchResult {
        let preexisting = existing_files(&self.work_dir).await;
        let result = self.run(url, stem, &preexisting).await;
        if !result.is_success() {
            let removed = remove_partials(stem, &preexisting).await;
            if removed > 0 {
                debug!(stem = %stem.display(), removed, "Cleaned up after failed download");
            }
        }
        result
    }

    async fn run(&self, url: &str, stem: &Path, preexisting: &HashSet<PathBuf>) -> FetchResult {
        let mut command = Command::new(&self.program);
        command
            .args(Self::downloader_args(url, stem))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so merge helpers spawned by the downloader die with it
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return FetchResult::Failure(format!(
                    "failed to start {}: {}",
                    self.program, e
                ));
            }
        };

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                if let Some(task) = stderr_task {
                    task.abort();
                }
                return FetchResult::Failure(format!("failed to wait for downloader: {}", e));
            }
            Err(_) => {
                warn!(url, timeout_secs = self.timeout.as_secs(), "Downloader timed out, killing");
                terminate(&mut child).await;
                if let Some(task) = stderr_task {
                    task.abort();
                }
                return FetchResult::Timeout;
            }
        };

        let stderr = match stderr_task {
            Some(task) => match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await {
                Ok(Ok(buf)) => String::from_utf8_lossy(&buf).trim().to_string(),
                _ => String::new(),
            },
            None => String::new(),
        };

        if !status.success() {
            let reason = if stderr.is_empty() {
                format!("downloader exited with {}", status)
            } else {
                stderr
            };
            return FetchResult::Failure(reason);
        }

        let Some(path) = resolve_output(stem, &self.work_dir, preexisting).await else {
            return FetchResult::Failure("no output produced".to_string());
        };

        match tokio::fs::metadata(&path).await {
            Ok(metadata) => FetchResult::Success {
                path,
                size_bytes: metadata.len(),
            },
            Err(e) => FetchResult::Failure(format!("output unreadable: {}", e)),
        }
    }
}

/// Kill the downloader's process group, then the child itself, and reap it
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        // process_group(0) made the child its group leader, so pgid == pid
        if let Some(pgid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) {
            // SAFETY: kill(2) with a negative pid only signals the group; no memory is touched
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }

    if let Err(e) = child.kill().await {
        debug!(error = %e, "Downloader already exited before kill");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downloader_args() {
        let args = FetchExecutor::downloader_args(
            "https://video.example/watch?v=1",
            Path::new("temp/download_1_2"),
        );
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "-o",
                "temp/download_1_2",
                "--no-playlist",
                "-f",
                "best[filesize<50M]/best",
                "--max-filesize",
                "100M",
                "https://video.example/watch?v=1",
            ]
        );
    }

    #[test]
    fn test_output_stem() {
        let executor = FetchExecutor::new("yt-dlp", "temp", Duration::from_secs(1));
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        assert_eq!(
            executor.output_stem(42, at),
            PathBuf::from("temp/download_1700000000_42")
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let executor = FetchExecutor::new(
            "vidrelay-no-such-downloader",
            dir.path(),
            Duration::from_secs(5),
        );

        let result = executor
            .fetch("https://example.com/v", &dir.path().join("download_1_1"))
            .await;
        assert!(matches!(result, FetchResult::Failure(_)));

        assert!(matches!(
            executor.version().await,
            Err(FetchError::NotInstalled { .. })
        ));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// Write an executable stand-in for the downloader. `$2` is the output stem.
        fn fake_downloader(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-downloader.sh");
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn executor_for(tools: &TempDir, work: &TempDir, body: &str, timeout: Duration) -> FetchExecutor {
            let program = fake_downloader(tools.path(), body);
            FetchExecutor::new(program.to_string_lossy(), work.path(), timeout)
        }

        #[tokio::test]
        async fn test_success_with_appended_extension() {
            let tools = TempDir::new().unwrap();
            let work = TempDir::new().unwrap();
            let executor = executor_for(
                &tools,
                &work,
                r#"printf 'video-bytes' > "$2.webm""#,
                Duration::from_secs(10),
            );
            let stem = work.path().join("download_1_9");

            let result = executor.fetch("https://example.com/v", &stem).await;
            assert_eq!(
                result,
                FetchResult::Success {
                    path: work.path().join("download_1_9.webm"),
                    size_bytes: 11,
                }
            );
        }

        #[tokio::test]
        async fn test_nonzero_exit_reports_stderr() {
            let tools = TempDir::new().unwrap();
            let work = TempDir::new().unwrap();
            let executor = executor_for(
                &tools,
                &work,
                r#"touch "$2.mp4.part"; echo "ERROR: Unsupported URL" >&2; exit 1"#,
                Duration::from_secs(10),
            );
            let stem = work.path().join("download_1_9");

            let result = executor.fetch("https://example.com/v", &stem).await;
            assert_eq!(result, FetchResult::Failure("ERROR: Unsupported URL".to_string()));
            assert!(!work.path().join("download_1_9.mp4.part").exists());
        }

        #[tokio::test]
        async fn test_exit_zero_without_output() {
            let tools = TempDir::new().unwrap();
            let work = TempDir::new().unwrap();
            let executor = executor_for(&tools, &work, "exit 0", Duration::from_secs(10));

            let result = executor
                .fetch("https://example.com/v", &work.path().join("download_1_9"))
                .await;
            assert_eq!(result, FetchResult::Failure("no output produced".to_string()));
        }

        #[tokio::test]
        async fn test_exit_zero_never_picks_up_earlier_file() {
            let tools = TempDir::new().unwrap();
            let work = TempDir::new().unwrap();
            let earlier = work.path().join("download_1_1.mp4");
            fs::write(&earlier, b"another user's video").unwrap();
            let executor = executor_for(&tools, &work, "exit 0", Duration::from_secs(10));

            let result = executor
                .fetch("https://example.com/v", &work.path().join("download_2_2"))
                .await;
            assert_eq!(result, FetchResult::Failure("no output produced".to_string()));
            assert!(earlier.exists());
        }

        #[tokio::test]
        async fn test_renamed_output_found() {
            let tools = TempDir::new().unwrap();
            let work = TempDir::new().unwrap();
            fs::write(work.path().join("download_1_1.mp4"), b"older").unwrap();
            let executor = executor_for(
                &tools,
                &work,
                r#"printf 'fresh' > "$(dirname "$2")/Some Title [id].m4a""#,
                Duration::from_secs(10),
            );

            let result = executor
                .fetch("https://example.com/v", &work.path().join("download_2_2"))
                .await;
            assert_eq!(
                result,
                FetchResult::Success {
                    path: work.path().join("Some Title [id].m4a"),
                    size_bytes: 5,
                }
            );
        }

        #[tokio::test]
        async fn test_timeout_kills_and_cleans() {
            let tools = TempDir::new().unwrap();
            let work = TempDir::new().unwrap();
            let executor = executor_for(
                &tools,
                &work,
                r#"printf 'partial' > "$2.mp4.part"; sleep 30"#,
                Duration::from_millis(500),
            );
            let stem = work.path().join("download_1_9");

            let started = std::time::Instant::now();
            let result = executor.fetch("https://example.com/v", &stem).await;

            assert_eq!(result, FetchResult::Timeout);
            assert!(started.elapsed() < Duration::from_secs(10));
            assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
        }

        #[tokio::test]
        async fn test_version_probe() {
            let tools = TempDir::new().unwrap();
            let work = TempDir::new().unwrap();
            let executor = executor_for(&tools, &work, "echo 2025.01.15", Duration::from_secs(5));

            assert_eq!(executor.version().await.unwrap(), "2025.01.15");
        }
    }
}
