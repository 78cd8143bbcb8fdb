#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Subprocess execution for the GIS pipeline.
//!
//! Every external tool (downloaders, `ogrinfo`, update scripts, `psql`) is
//! invoked through [`CommandRunner`], which captures stdout and stderr and
//! returns a [`CommandOutput`]. Download results are then interpreted by
//! [`classify_download`], a pure function over the captured output, so the
//! no-new-data and deprecated-URL heuristics stay testable without spawning
//! anything.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

/// Stdout markers that signal the source has no new data.
const NND_MARKERS: &[&str] = &[
    "304 not modified",
    "not modified on server",
    "omitting download",
    "no new data available from server",
];

/// Output markers that indicate a dead or inaccessible source URL rather
/// than a transient failure.
const DEPRECATED_MARKERS: &[&str] = &[
    "service not started",
    "could not retrieve layer metadata",
    "esridownloaderror",
    "authentication required",
    "login required",
    "service unavailable",
    "service disabled",
    "access denied",
    "unauthorized",
];

/// Errors that can occur while spawning subprocesses.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The command list was empty.
    #[error("cannot run an empty command")]
    EmptyCommand,

    /// The process could not be spawned or awaited.
    #[error("failed to run '{program}': {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Process exit code; `-1` if the process was killed by a signal.
    pub exit_code: i32,
    /// Captured stdout, lossily decoded.
    pub stdout: String,
    /// Captured stderr, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the process exited with code zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout and stderr joined, for marker scans that do not care which
    /// stream a message landed on.
    #[must_use]
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Interpretation of a downloader's captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The downloader succeeded and produced (or refreshed) data.
    Success,
    /// The source reported no new data since the last fetch.
    NoNewData {
        /// Which signal produced the NND determination.
        reason: String,
    },
    /// The source URL appears permanently dead or gated.
    Deprecated {
        /// The matched indicator plus a stderr excerpt for triage.
        reason: String,
    },
    /// Any other failure.
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

/// Command execution, the seam between the pipeline and the operating
/// system. Stages talk to a `&dyn Execute` so rehearsals and tests can
/// script outcomes without spawning anything.
#[async_trait]
pub trait Execute: Send + Sync {
    /// Runs `argv` with `work_dir` as the current directory, capturing
    /// both output streams.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if `argv` is empty or the process cannot be
    /// spawned. A nonzero exit code is *not* an error; callers interpret
    /// [`CommandOutput::exit_code`].
    async fn execute(&self, argv: &[String], work_dir: &Path) -> Result<CommandOutput, RunnerError>;

    /// Whether this executor suppresses real side effects; validation
    /// steps that depend on them short-circuit to success when set.
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Runs external commands in a working directory, honoring test mode.
#[derive(Debug, Clone, Copy)]
pub struct CommandRunner {
    test_mode: bool,
}

#[async_trait]
impl Execute for CommandRunner {
    async fn execute(&self, argv: &[String], work_dir: &Path) -> Result<CommandOutput, RunnerError> {
        self.run(argv, work_dir).await
    }

    fn is_simulated(&self) -> bool {
        self.test_mode
    }
}

impl CommandRunner {
    /// Creates a runner. In test mode no process is ever spawned; commands
    /// log their would-be invocation and report success.
    #[must_use]
    pub const fn new(test_mode: bool) -> Self {
        Self { test_mode }
    }

    /// Whether this runner suppresses subprocess execution.
    #[must_use]
    pub const fn test_mode(&self) -> bool {
        self.test_mode
    }

    /// Runs `argv` with `work_dir` as the current directory, capturing both
    /// output streams.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if `argv` is empty or the process cannot be
    /// spawned. A nonzero exit code is *not* an error here; callers
    /// interpret [`CommandOutput::exit_code`].
    pub async fn run(&self, argv: &[String], work_dir: &Path) -> Result<CommandOutput, RunnerError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(RunnerError::EmptyCommand);
        };

        if self.test_mode {
            log::info!(
                "[TEST MODE] command skipped in {}: {}",
                work_dir.display(),
                argv.join(" ")
            );
            return Ok(CommandOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        log::debug!(
            "Running command in {}: {}",
            work_dir.display(),
            argv.join(" ")
        );

        let output = Command::new(program)
            .args(args)
            .current_dir(work_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RunnerError::Spawn {
                program: program.clone(),
                source,
            })?;

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        log::debug!(
            "Command '{program}' exited {} ({} bytes stdout, {} bytes stderr)",
            result.exit_code,
            result.stdout.len(),
            result.stderr.len()
        );

        Ok(result)
    }
}

/// Classifies a downloader's output.
///
/// `exit_one_is_nnd` enables the generic downloader's contract where exit
/// code 1 means "no new data" rather than failure; the AGS extractor does
/// not use that convention.
#[must_use]
pub fn classify_download(output: &CommandOutput, exit_one_is_nnd: bool) -> DownloadOutcome {
    if exit_one_is_nnd && output.exit_code == 1 {
        return DownloadOutcome::NoNewData {
            reason: "downloader exit code 1".to_string(),
        };
    }

    if output.success() {
        let stdout_lower = output.stdout.to_lowercase();
        if let Some(marker) = NND_MARKERS.iter().find(|m| stdout_lower.contains(*m)) {
            return DownloadOutcome::NoNewData {
                reason: format!("downloader reported '{marker}'"),
            };
        }
        return DownloadOutcome::Success;
    }

    let combined_lower = output.combined().to_lowercase();
    if let Some(marker) = DEPRECATED_MARKERS
        .iter()
        .find(|m| combined_lower.contains(*m))
    {
        return DownloadOutcome::Deprecated {
            reason: format!(
                "URL appears to be deprecated or inaccessible ({marker}): {}",
                excerpt(&output.stderr)
            ),
        };
    }

    DownloadOutcome::Failed {
        reason: format!("command failed with exit code {}", output.exit_code),
    }
}

/// Normalizes subprocess output into a journal-safe excerpt: newlines and
/// double quotes become spaces, interior runs collapse, and the result is
/// capped at 200 characters.
#[must_use]
pub fn excerpt(text: &str) -> String {
    let cleaned: String = text
        .replace(['\n', '\r', '"'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.chars().count() <= 200 {
        cleaned
    } else {
        cleaned.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn clean_exit_is_success() {
        let result = classify_download(&output(0, "downloaded 4 files", ""), true);
        assert_eq!(result, DownloadOutcome::Success);
    }

    #[test]
    fn exit_one_is_nnd_for_generic_downloader() {
        let result = classify_download(&output(1, "", ""), true);
        assert!(matches!(result, DownloadOutcome::NoNewData { .. }));
    }

    #[test]
    fn exit_one_is_failure_for_ags() {
        let result = classify_download(&output(1, "", "traceback"), false);
        assert!(matches!(result, DownloadOutcome::Failed { .. }));
    }

    #[test]
    fn stdout_markers_signal_nnd() {
        for marker in [
            "HTTP 304 Not Modified",
            "file not modified on server",
            "omitting download",
            "No new data available from server",
        ] {
            let result = classify_download(&output(0, marker, ""), false);
            assert!(
                matches!(result, DownloadOutcome::NoNewData { .. }),
                "{marker}"
            );
        }
    }

    #[test]
    fn deprecated_markers_beat_generic_failure() {
        let result = classify_download(
            &output(2, "", "ESRIDownloadError: Service not started"),
            true,
        );
        match result {
            DownloadOutcome::Deprecated { reason } => {
                assert!(reason.contains("deprecated or inaccessible"));
            }
            other => panic!("expected Deprecated, got {other:?}"),
        }
    }

    #[test]
    fn nonzero_exit_without_markers_is_failure() {
        let result = classify_download(&output(3, "partial", "disk full"), true);
        assert_eq!(
            result,
            DownloadOutcome::Failed {
                reason: "command failed with exit code 3".to_string()
            }
        );
    }

    #[test]
    fn excerpt_normalizes_and_caps() {
        let noisy = "ERROR 1: ogr2ogr failed\n\"geometry\" invalid\r\n".to_string() + &"x".repeat(400);
        let cleaned = excerpt(&noisy);
        assert!(cleaned.starts_with("ERROR 1: ogr2ogr failed geometry invalid"));
        assert!(!cleaned.contains('\n'));
        assert!(!cleaned.contains('"'));
        assert_eq!(cleaned.chars().count(), 200);
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let runner = CommandRunner::new(false);
        let result = runner.run(&[], Path::new(".")).await;
        assert!(matches!(result, Err(RunnerError::EmptyCommand)));
    }

    #[tokio::test]
    async fn test_mode_skips_execution() {
        let runner = CommandRunner::new(true);
        let result = runner
            .run(
                &["definitely_not_a_real_binary".to_string()],
                Path::new("."),
            )
            .await
            .unwrap();
        assert!(result.success());
        assert!(result.stdout.is_empty());
    }
}
