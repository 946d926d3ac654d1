//! # External Tool Runner
//!
//! Runs one external command with its output captured instead of printed.
//!
//! A non-zero exit status is *not* an error here: the returned [`ToolOutput`]
//! carries it and callers decide. The only errors are "the executable does
//! not exist" ([`CompressError::ToolNotFound`]), spawn/wait I/O failures and
//! an expired timeout.

use crate::error::{CompressError, Result};
use crate::tool_resolver::ToolPathResolver;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

const SPAWN_RETRIES: u32 = 5;

/// Converts an iterable of string-like items to `Vec<String>`.
///
/// ```ignore
/// let quality = 85;
/// let args = to_string_vec(["--max", &quality.to_string(), "photo.jpg"]);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Builds a command line from mixed arguments.
///
/// ```ignore
/// let cmd = args!["cwebp", "-q", quality, "-o", &out, &out];
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        $crate::tool_runner::to_string_vec([$($item.to_string()),*])
    };
}

/// Captured result of one external command
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Program name as requested
    pub tool: String,
    /// Exit code, `None` when killed by a signal
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ToolOutput {
    /// stdout followed by stderr, trimmed
    pub fn combined(&self) -> String {
        let mut text = self.stdout.trim_end().to_string();
        let stderr = self.stderr.trim_end();
        if !text.is_empty() && !stderr.is_empty() {
            text.push('\n');
        }
        text.push_str(stderr);
        text
    }

    pub fn describe_status(&self) -> String {
        match self.status {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Executes external commands, resolving them through [`ToolPathResolver`]
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    resolver: ToolPathResolver,
    timeout: Option<Duration>,
}

impl ToolRunner {
    pub fn new(resolver: ToolPathResolver) -> Self {
        Self {
            resolver,
            timeout: None,
        }
    }

    /// Kill the command and fail with [`CompressError::Timeout`] after `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn resolver(&self) -> &ToolPathResolver {
        &self.resolver
    }

    /// Runs `command[0]` with the remaining items as arguments.
    ///
    /// Arguments are passed through as `OsStr`, so file names need not be UTF-8.
    pub async fn run<S: AsRef<OsStr>>(&self, command: &[S]) -> Result<ToolOutput> {
        let (tool, args) = command
            .split_first()
            .ok_or_else(|| CompressError::Task("empty command line".to_string()))?;
        let tool = tool.as_ref().to_string_lossy().into_owned();

        let tool_path = self
            .resolver
            .resolve_tool(&tool)
            .ok_or_else(|| Self::not_found(&tool))?;

        debug!(
            "Running {} {:?}",
            tool_path.display(),
            args.iter().map(AsRef::as_ref).collect::<Vec<&OsStr>>()
        );
        let start_time = Instant::now();
        let child = self.spawn(&tool_path, &tool, args).await?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| CompressError::Timeout {
                    operation: tool.clone(),
                    after: limit,
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| CompressError::io(&tool_path, e))?;

        let elapsed = start_time.elapsed();
        let result = ToolOutput {
            tool: tool.clone(),
            status: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed,
        };

        if result.success {
            debug!("{} completed in {:?}", tool, elapsed);
        } else {
            warn!("{} reported {} after {:?}", tool, result.describe_status(), elapsed);
        }
        Ok(result)
    }

    async fn spawn<S: AsRef<OsStr>>(&self, tool_path: &Path, tool: &str, args: &[S]) -> Result<Child> {
        let mut attempts = 0;
        loop {
            let spawned = Command::new(tool_path)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn();

            match spawned {
                Ok(child) => return Ok(child),
                Err(e) if e.kind() == ErrorKind::NotFound => return Err(Self::not_found(tool)),
                Err(e) if is_text_busy(&e) && attempts < SPAWN_RETRIES => {
                    // executable still open for writing in a concurrently forked child
                    attempts += 1;
                    tokio::time::sleep(Duration::from_millis(20 * u64::from(attempts))).await;
                }
                Err(e) => return Err(CompressError::io(tool_path, e)),
            }
        }
    }

    fn not_found(tool: &str) -> CompressError {
        CompressError::ToolNotFound {
            tool: tool.to_string(),
            hint: ToolPathResolver::install_hint(tool),
        }
    }
}

#[cfg(unix)]
fn is_text_busy(error: &std::io::Error) -> bool {
    error.raw_os_error() == Some(26)
}

#[cfg(not(unix))]
fn is_text_busy(_error: &std::io::Error) -> bool {
    false
}
