pub mod command;
pub mod error;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr};

use crate::config::{DumpConfig, DumpSettings};
use command::DumpTool;
use error::DumpError;

pub type Result<T, E = DumpError> = std::result::Result<T, E>;

/// A finished, successful dump.
#[derive(Debug, Clone)]
pub struct Dump {
    pub path: PathBuf,
    pub timestamp: i64,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

#[derive(Debug, Clone)]
pub struct DumpRunner {
    tool: DumpTool,
    output_dir: PathBuf,
    timeout: Option<Duration>,
}

impl Default for DumpRunner {
    fn default() -> Self {
        DumpRunner::new(&DumpSettings::default())
    }
}

impl DumpRunner {
    pub fn new(settings: &DumpSettings) -> Self {
        DumpRunner {
            tool: DumpTool::new(settings.tool.clone()),
            output_dir: settings.output_dir.clone(),
            timeout: settings.timeout(),
        }
    }

    pub fn with_tool(mut self, tool: DumpTool) -> Self {
        self.tool = tool;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn dump_file(&self, timestamp: i64) -> PathBuf {
        self.output_dir.join(format!("dump_{}.sql", timestamp))
    }

    pub async fn run(&self, config: &DumpConfig) -> Result<Dump> {
        self.run_at(config, Utc::now().timestamp()).await
    }

    /// Like `run`, but gives up with `Interrupted` once `shutdown` resolves.
    /// Dropping the run also kills the dump tool.
    pub async fn run_until<F>(&self, config: &DumpConfig, shutdown: F) -> Result<Dump>
    where
        F: Future,
    {
        tokio::select! {
            res = self.run(config) => res,
            _ = shutdown => Err(DumpError::Interrupted),
        }
    }

    /// Dumps into the file named after `timestamp`. An existing file with
    /// that name is truncated.
    pub async fn run_at(&self, config: &DumpConfig, timestamp: i64) -> Result<Dump> {
        let started_at = Local::now();
        tracing::info!("MYSQL_DUMP: {}: Starting MySQL dump", started_at);

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| DumpError::DirectoryCreation {
                path: self.output_dir.clone(),
                source,
            })?;

        let path = self.dump_file(timestamp);
        tracing::info!("Dump file will be saved to: {}", path.display());

        let mut child = self.spawn(config, &path).await?;
        let stderr = read_stderr(child.stderr.take());

        let waited = {
            let wait = async { tokio::try_join!(child.wait(), stderr) };
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, wait).await.ok(),
                None => Some(wait.await),
            }
        };

        let (status, stderr) = match waited {
            Some(res) => res.map_err(|e| {
                DumpError::Unexpected(
                    anyhow::Error::new(e).context("waiting for the dump tool to exit"),
                )
            })?,
            None => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("could not kill `{}`: {}", self.tool.program(), e);
                }
                return Err(DumpError::Timeout {
                    path,
                    after: self.timeout.unwrap_or_default(),
                });
            }
        };

        if !status.success() {
            return Err(DumpError::ToolExecution {
                path,
                status,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        let finished_at = Local::now();
        tracing::info!("MYSQL_DUMP: {}: Finished MySQL dump", finished_at);
        Ok(Dump {
            path,
            timestamp,
            started_at,
            finished_at,
        })
    }

    async fn spawn(&self, config: &DumpConfig, path: &Path) -> Result<Child> {
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|source| DumpError::FileOpen {
                path: path.to_path_buf(),
                source,
            })?
            .into_std()
            .await;

        tracing::debug!("running {}", self.tool.display(config));
        // The command owns the file until it is dropped at the end of this fn.
        let mut cmd = self.tool.command(config);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd.spawn().map_err(|source| DumpError::Spawn {
            tool: self.tool.program().to_string(),
            source,
        })
    }
}

async fn read_stderr(stderr: Option<ChildStderr>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut stderr) = stderr {
        stderr.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Validates the connection values first; nothing touches the filesystem
/// unless all of them are present.
pub async fn dump_with<F>(lookup: F, runner: &DumpRunner) -> Result<Dump>
where
    F: Fn(&str) -> Option<String>,
{
    let config = DumpConfig::from_lookup(lookup)?;
    runner.run(&config).await
}

/// The operator-facing line for an outcome. Configuration problems are
/// reported on their own, without the "Error during MySQL dump" prefix.
pub fn describe(outcome: &Result<Dump>) -> String {
    match outcome {
        Ok(dump) => format!(
            "MYSQL_DUMP: {}: dump written to {}",
            dump.finished_at,
            dump.path.display()
        ),
        Err(err) if err.is_configuration() => err.to_string(),
        Err(err @ DumpError::ToolExecution { path, .. }) => format!(
            "MYSQL_DUMP: {}: {} (partial file kept at {})",
            Local::now(),
            err,
            path.display()
        ),
        Err(err) => format!(
            "MYSQL_DUMP: {}: Error during MySQL dump: {}",
            Local::now(),
            err
        ),
    }
}

pub fn report(outcome: &Result<Dump>) {
    match outcome {
        Ok(_) => tracing::info!("{}", describe(outcome)),
        Err(_) => tracing::error!("{}", describe(outcome)),
    }
}

/// Process exit status for an outcome: always 0 unless `strict` is set and
/// the attempt failed.
pub fn exit_status(outcome: &Result<Dump>, strict: bool) -> u8 {
    match outcome {
        Err(_) if strict => 1,
        _ => 0,
    }
}
