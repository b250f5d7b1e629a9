//! Command-based screen capture.
//!
//! [`CommandCapture`] shells out to a platform screenshot tool (by default
//! `screencapture` on macOS and ImageMagick's `import` elsewhere) with a
//! `{path}` placeholder in its argv.  After classification a screenshot is
//! either archived into a processed directory under a timestamped name or
//! deleted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{MonitorError, Result};
use crate::traits::ScreenCapture;

/// Placeholder replaced with the output path in each argv element.
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Default capture timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Maximum stderr bytes quoted in an error.
const MAX_STDERR_BYTES: usize = 2 * 1024;

/// The platform's default capture argv.
pub fn default_command() -> Vec<String> {
    let argv: &[&str] = if cfg!(target_os = "macos") {
        &["screencapture", "-x", "-t", "png", PATH_PLACEHOLDER]
    } else {
        &["import", "-window", "root", PATH_PLACEHOLDER]
    };
    argv.iter().map(|s| (*s).to_owned()).collect()
}

/// Screen capture through an external command.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    command: Vec<String>,
    screenshot_dir: PathBuf,
    processed_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandCapture {
    /// Capture with `command` into `screenshot_dir`.
    ///
    /// Fails if `command` is empty.
    pub fn new(command: Vec<String>, screenshot_dir: impl Into<PathBuf>) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(MonitorError::Capture {
                reason: "capture command is empty".into(),
            });
        }
        Ok(Self {
            command,
            screenshot_dir: screenshot_dir.into(),
            processed_dir: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Archive classified screenshots into `dir` instead of deleting them.
    pub fn with_processed_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.processed_dir = dir;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// The argv for writing a screenshot to `path`.
    fn argv_for(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        self.command
            .iter()
            .map(|arg| arg.replace(PATH_PLACEHOLDER, &path))
            .collect()
    }

    async fn run(&self, argv: &[String]) -> Result<()> {
        let Some((program, args)) = argv.split_first() else {
            return Err(MonitorError::Capture {
                reason: "capture command is empty".into(),
            });
        };

        let child = tokio::process::Command::new(program)
            .args(args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MonitorError::Capture {
                reason: format!("failed to spawn `{program}`: {e}"),
            })?;

        // On timeout the child is dropped and killed via `kill_on_drop`.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| MonitorError::Capture {
                reason: format!(
                    "`{program}` did not finish within {}s",
                    self.timeout.as_secs()
                ),
            })?
            .map_err(|e| MonitorError::Capture {
                reason: format!("`{program}` process error: {e}"),
            })?;

        if !output.status.success() {
            let stderr = &output.stderr[..output.stderr.len().min(MAX_STDERR_BYTES)];
            return Err(MonitorError::Capture {
                reason: format!(
                    "`{program}` exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ScreenCapture for CommandCapture {
    async fn capture(&self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.screenshot_dir).await?;
        let path = self
            .screenshot_dir
            .join(format!("screenshot-{}.png", file_timestamp(Utc::now())));

        let argv = self.argv_for(&path);
        debug!(command = ?argv, path = %path.display(), "capturing screen");
        self.run(&argv).await?;

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() > 0 => {
                debug!(path = %path.display(), bytes = meta.len(), "screenshot written");
                Ok(path)
            }
            _ => Err(MonitorError::Capture {
                reason: format!(
                    "capture command succeeded but wrote no image to {}",
                    path.display()
                ),
            }),
        }
    }

    async fn release(&self, path: &Path) -> Result<()> {
        let Some(dir) = &self.processed_dir else {
            tokio::fs::remove_file(path).await?;
            debug!(path = %path.display(), "screenshot deleted");
            return Ok(());
        };

        tokio::fs::create_dir_all(dir).await?;
        let destination = dir.join(archive_name(path, Utc::now()));
        // `rename` fails across filesystems; fall back to copy + delete.
        if tokio::fs::rename(path, &destination).await.is_err() {
            tokio::fs::copy(path, &destination).await?;
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "failed to remove archived screenshot");
            }
        }
        info!(
            from = %path.display(),
            to = %destination.display(),
            "screenshot archived"
        );
        Ok(())
    }
}

/// `2025-01-31T09-15-02-123Z`: an ISO-8601 instant safe for file names.
fn file_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

/// `<stem>_<timestamp>.<ext>` for a screenshot moved into the archive.
pub fn archive_name(path: &Path, now: DateTime<Utc>) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "screenshot".to_owned());
    let timestamp = file_timestamp(now);
    match path.extension() {
        Some(ext) => format!("{stem}_{timestamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{timestamp}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 31, 9, 15, 2).unwrap()
    }

    #[test]
    fn empty_command_rejected() {
        assert!(CommandCapture::new(vec![], "shots").is_err());
        assert!(CommandCapture::new(vec![" ".into()], "shots").is_err());
    }

    #[test]
    fn placeholder_substituted_in_every_arg() {
        let capture = CommandCapture::new(
            vec!["grab".into(), "--out={path}".into(), "{path}".into()],
            "shots",
        )
        .unwrap();
        let argv = capture.argv_for(Path::new("/tmp/a.png"));
        assert_eq!(argv, vec!["grab", "--out=/tmp/a.png", "/tmp/a.png"]);
    }

    #[test]
    fn archive_name_keeps_stem_and_extension() {
        let name = archive_name(Path::new("shots/screenshot-1.png"), fixed_time());
        assert_eq!(name, "screenshot-1_2025-01-31T09-15-02-000Z.png");

        let bare = archive_name(Path::new("shots/raw"), fixed_time());
        assert_eq!(bare, "raw_2025-01-31T09-15-02-000Z");
    }

    #[test]
    fn default_command_has_placeholder() {
        assert!(default_command().iter().any(|a| a == PATH_PLACEHOLDER));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn capture_runs_command_and_returns_file() {
        let dir = tempfile::tempdir().unwrap();
        let capture = CommandCapture::new(
            vec!["sh".into(), "-c".into(), "printf png > \"$0\"".into(), "{path}".into()],
            dir.path().join("shots"),
        )
        .unwrap();

        let path = capture.capture().await.unwrap();
        assert!(path.starts_with(dir.path().join("shots")));
        assert_eq!(std::fs::read(&path).unwrap(), b"png");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_a_capture_error() {
        let dir = tempfile::tempdir().unwrap();
        let capture = CommandCapture::new(
            vec!["sh".into(), "-c".into(), "echo no display >&2; exit 3".into()],
            dir.path(),
        )
        .unwrap();

        let err = capture.capture().await.unwrap_err();
        match err {
            MonitorError::Capture { reason } => assert!(reason.contains("no display"), "{reason}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_writing_nothing_is_a_capture_error() {
        let dir = tempfile::tempdir().unwrap();
        let capture = CommandCapture::new(vec!["true".into()], dir.path()).unwrap();
        assert!(matches!(
            capture.capture().await,
            Err(MonitorError::Capture { .. })
        ));
    }

    #[tokio::test]
    async fn release_deletes_without_processed_dir() {
        let dir = tempfile::tempdir().unwrap();
        let shot = dir.path().join("shot.png");
        std::fs::write(&shot, b"png").unwrap();

        let capture = CommandCapture::new(vec!["true".into()], dir.path()).unwrap();
        capture.release(&shot).await.unwrap();
        assert!(!shot.exists());
    }

    #[tokio::test]
    async fn release_archives_into_processed_dir() {
        let dir = tempfile::tempdir().unwrap();
        let shot = dir.path().join("shot.png");
        std::fs::write(&shot, b"png").unwrap();
        let processed = dir.path().join("processed");

        let capture = CommandCapture::new(vec!["true".into()], dir.path())
            .unwrap()
            .with_processed_dir(Some(processed.clone()));
        capture.release(&shot).await.unwrap();

        assert!(!shot.exists());
        let archived: Vec<_> = std::fs::read_dir(&processed)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(archived.len(), 1);
        assert!(archived[0].starts_with("shot_") && archived[0].ends_with(".png"));
    }
}
