//! Runs generated backtest scripts.
//!
//! Each run gets its own temp directory holding the script; the directory is
//! removed before [`Runner::run`] returns, whatever happened.  Charts land in
//! the media root under a fresh UUID and are kept.  There is no sandbox: the
//! script runs with the server's privileges, bounded only by the timeout.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;

use crate::config::Config;
use crate::error::ExecuteError;

/// Environment variable pointing the script at its chart path.
pub const PLOT_PATH_ENV: &str = "REWIND_PLOT_PATH";

const SHOW_CALL: &str = "plt.show()";
const SCRIPT_FALLBACK_STEM: &str = "strategy";

/// Outcome of one run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Text shown to the user: stdout, then stderr, or the failure message.
    pub report: String,
    /// Chart written by the script. Only set when the file exists.
    pub plot_path: Option<PathBuf>,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ExecutionResult {
    fn failed(err: &ExecuteError) -> Self {
        Self {
            report: format!("Error running backtest: {err}"),
            timed_out: matches!(err, ExecuteError::Timeout(_)),
            ..Self::default()
        }
    }

    /// Public URL of the chart, relative to `media_root` and joined onto
    /// `media_url`.
    pub fn plot_url(&self, media_root: &Path, media_url: &str) -> Option<String> {
        let path = self.plot_path.as_ref()?;
        let rel = path.strip_prefix(media_root).unwrap_or(path);
        let rel = rel.to_string_lossy().replace('\\', "/");
        Some(format!(
            "{}/{}",
            media_url.trim_end_matches('/'),
            rel.trim_start_matches('/')
        ))
    }
}

/// Script file stem: lowercase ASCII words joined by `-`. Non-ASCII
/// characters are dropped, not transliterated.
pub fn slugify(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    let mut slug = String::with_capacity(cleaned.len());
    let mut pending_dash = false;
    for c in cleaned.chars() {
        if c == '-' || c.is_whitespace() {
            pending_dash = true;
        } else {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        }
    }
    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// Redirect every `plt.show()` to a file write.
pub fn rewrite_show_calls(code: &str, plot_path: &Path) -> String {
    code.replace(
        SHOW_CALL,
        &format!("plt.savefig(r'{}'); plt.close()", plot_path.display()),
    )
}

fn combine_output(stdout: &str, stderr: &str) -> String {
    if stderr.is_empty() {
        stdout.to_string()
    } else {
        format!("{stdout}\n{stderr}")
    }
}

pub struct Runner {
    interpreter: String,
    timeout: Duration,
    media_root: PathBuf,
    scratch_dir: PathBuf,
}

impl Runner {
    pub fn new(
        interpreter: impl Into<String>,
        timeout: Duration,
        media_root: impl Into<PathBuf>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        // The child runs inside its temp dir, so every path it sees must be absolute
        Self {
            interpreter: interpreter.into(),
            timeout,
            media_root: absolute(media_root.into()),
            scratch_dir: absolute(scratch_dir.into()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.interpreter.clone(),
            config.timeout(),
            config.media_root.clone(),
            config.scratch_dir.clone(),
        )
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Run `code` and collect its output. Never returns an error; failures
    /// are reported in [`ExecutionResult::report`].
    pub async fn run(&self, code: &str, strategy_name: &str) -> ExecutionResult {
        let temp_dir = match tempfile::Builder::new()
            .prefix("rewind-")
            .tempdir_in(&self.scratch_dir)
        {
            Ok(dir) => dir,
            Err(e) => {
                let err = ExecuteError::TempDir(e);
                tracing::warn!("{err}");
                return ExecutionResult::failed(&err);
            }
        };

        let plot_path = self
            .media_root
            .join(format!("{}.png", uuid::Uuid::new_v4()));

        let mut result = match self
            .run_in(temp_dir.path(), code, strategy_name, &plot_path)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(strategy = %strategy_name, "Backtest failed: {err}");
                ExecutionResult::failed(&err)
            }
        };

        let dir_path = temp_dir.path().to_path_buf();
        if let Err(e) = temp_dir.close() {
            tracing::warn!(path = %dir_path.display(), "Failed to remove scratch directory: {e}");
        }

        if result.plot_path.is_some() && !plot_path.exists() {
            result.plot_path = None;
        }
        result
    }

    async fn run_in(
        &self,
        dir: &Path,
        code: &str,
        strategy_name: &str,
        plot_path: &Path,
    ) -> Result<ExecutionResult, ExecuteError> {
        let mut stem = slugify(strategy_name);
        if stem.is_empty() {
            stem = SCRIPT_FALLBACK_STEM.to_string();
        }
        let script = dir.join(format!("{stem}.py"));

        if let Some(parent) = plot_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ExecuteError::MediaDir)?;
        }
        tokio::fs::write(&script, rewrite_show_calls(code, plot_path))
            .await
            .map_err(ExecuteError::WriteScript)?;

        tracing::info!(
            interpreter = %self.interpreter,
            script = %script.display(),
            "Running backtest"
        );

        let child = Command::new(&self.interpreter)
            .arg(&script)
            .current_dir(dir)
            .env(PLOT_PATH_ENV, plot_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecuteError::Spawn {
                interpreter: self.interpreter.clone(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecuteError::Timeout(self.timeout))?
            .map_err(ExecuteError::Wait)?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        log_exit(output.status);

        Ok(ExecutionResult {
            report: combine_output(&stdout, &stderr),
            stdout,
            stderr,
            plot_path: Some(plot_path.to_path_buf()),
            exit_code: output.status.code(),
            timed_out: false,
        })
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

fn log_exit(status: ExitStatus) {
    if status.success() {
        tracing::info!("Backtest finished");
    } else {
        tracing::warn!(%status, "Backtest exited with failure");
    }
}
