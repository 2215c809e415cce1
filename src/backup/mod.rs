//! Backup creation and restore verification through external tools.
//!
//! Dumps are streamed straight to disk from the dump tool's stdout and
//! restores stream the artifact into the restore tool's stdin. Nothing is
//! buffered in memory. Datastore credentials reach the tools via the
//! `MYSQL_PWD` environment variable only.

mod integrity;

pub use integrity::{FnIntegrityCheck, IntegrityCheck, IntegrityReport, SeededRecordCheck};

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{BackupConfig, ToolCommand};
use crate::error::{HarnessError, IntegrityError, ToolInvocationError};

/// A backup written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Point in time the dump reflects. Used for the recovery point.
    pub data_as_of: DateTime<Utc>,
    pub size_bytes: u64,
    pub sha256: String,
}

impl BackupArtifact {
    /// Seconds of data lost if a failure at `failure_at` is recovered from
    /// this artifact.
    pub fn recovery_point_secs(&self, failure_at: DateTime<Utc>) -> f64 {
        let lag = failure_at - self.data_as_of;
        lag.to_std().map(|d| d.as_secs_f64()).unwrap_or(0.0)
    }

    /// Confirm the artifact is non-empty and unchanged since it was written.
    pub async fn verify(&self) -> Result<(), ToolInvocationError> {
        let (size, digest) = file_digest(&self.path).await.map_err(|source| ToolInvocationError::Io {
            tool: "sha256".to_string(),
            source,
        })?;
        if size == 0 {
            return Err(ToolInvocationError::EmptyArtifact {
                path: self.path.clone(),
            });
        }
        if digest != self.sha256 {
            return Err(ToolInvocationError::ChecksumMismatch {
                path: self.path.clone(),
                expected: self.sha256.clone(),
                actual: digest,
            });
        }
        Ok(())
    }
}

/// A completed, verified restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub artifact: PathBuf,
    pub restore_secs: f64,
    pub integrity: IntegrityReport,
}

impl RestoreReport {
    pub fn restore_duration(&self) -> Duration {
        Duration::from_secs_f64(self.restore_secs.max(0.0))
    }
}

/// Restore outcome when something went wrong.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error(transparent)]
    Tool(#[from] ToolInvocationError),

    #[error("Restore finished in {restore_secs:.2}s but verification failed: {source}")]
    Integrity {
        #[source]
        source: IntegrityError,
        restore_secs: f64,
    },
}

impl From<RestoreError> for HarnessError {
    fn from(e: RestoreError) -> Self {
        match e {
            RestoreError::Tool(e) => HarnessError::ToolInvocation(e),
            RestoreError::Integrity { source, .. } => HarnessError::Integrity(source),
        }
    }
}

/// Runs the configured dump/restore tools.
pub struct BackupRestoreController {
    config: BackupConfig,
    password: Option<String>,
}

impl BackupRestoreController {
    pub fn new(config: BackupConfig) -> Self {
        Self {
            config,
            password: None,
        }
    }

    /// Password handed to the tools through `MYSQL_PWD`.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    fn command(&self, tool: &ToolCommand) -> Command {
        let mut cmd = Command::new(&tool.program);
        cmd.args(&tool.args).kill_on_drop(true);
        if let Some(password) = &self.password {
            cmd.env("MYSQL_PWD", password);
        }
        cmd
    }

    fn artifact_path(&self, at: DateTime<Utc>) -> PathBuf {
        let stem = format!("backup_{}", at.format("%Y%m%d_%H%M%S"));
        let ext = &self.config.extension;
        let mut path = self.config.backup_dir.join(format!("{}.{}", stem, ext));
        let mut n = 1;
        while path.exists() {
            path = self.config.backup_dir.join(format!("{}_{}.{}", stem, n, ext));
            n += 1;
        }
        path
    }

    /// Dump the datastore into a new timestamped file.
    pub async fn create_backup(&self) -> Result<BackupArtifact, ToolInvocationError> {
        let tool = &self.config.dump;
        tokio::fs::create_dir_all(&self.config.backup_dir)
            .await
            .map_err(|source| io_error(tool, source))?;

        let data_as_of = Utc::now();
        let path = self.artifact_path(data_as_of);
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|source| io_error(tool, source))?
            .into_std()
            .await;

        info!(tool = %tool.program, path = %path.display(), "Creating backup");
        let output = run_to_completion(
            self.command(tool)
                .stdin(Stdio::null())
                .stdout(Stdio::from(file))
                .stderr(Stdio::piped()),
        )
        .await
        .map_err(|source| spawn_error(tool, source));

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                discard(&path).await;
                return Err(e);
            }
        };
        if !output.status.success() {
            discard(&path).await;
            return Err(ToolInvocationError::NonZeroExit {
                tool: tool.program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let (size_bytes, sha256) = match file_digest(&path).await {
            Ok(digest) => digest,
            Err(source) => {
                discard(&path).await;
                return Err(io_error(tool, source));
            }
        };
        if size_bytes == 0 {
            discard(&path).await;
            return Err(ToolInvocationError::EmptyArtifact { path });
        }

        info!(path = %path.display(), size_bytes, "Backup created");
        Ok(BackupArtifact {
            path,
            created_at: Utc::now(),
            data_as_of,
            size_bytes,
            sha256,
        })
    }

    /// Feed `artifact` into the restore tool, then run `check`.
    pub async fn restore_backup(
        &self,
        artifact: &BackupArtifact,
        check: &dyn IntegrityCheck,
    ) -> Result<RestoreReport, RestoreError> {
        artifact.verify().await?;

        let tool = &self.config.restore;
        let input = tokio::fs::File::open(&artifact.path)
            .await
            .map_err(|source| io_error(tool, source))?
            .into_std()
            .await;

        info!(tool = %tool.program, path = %artifact.path.display(), "Restoring backup");
        let start = Instant::now();
        let output = run_to_completion(
            self.command(tool)
                .stdin(Stdio::from(input))
                .stdout(Stdio::null())
                .stderr(Stdio::piped()),
        )
        .await
        .map_err(|source| spawn_error(tool, source))?;
        if !output.status.success() {
            return Err(ToolInvocationError::NonZeroExit {
                tool: tool.program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        let restore_secs = start.elapsed().as_secs_f64();

        match check.verify().await {
            Ok(integrity) => {
                info!(restore_secs, rows = integrity.row_count, "Restore verified");
                Ok(RestoreReport {
                    artifact: artifact.path.clone(),
                    restore_secs,
                    integrity,
                })
            }
            Err(source) => {
                warn!(restore_secs, error = %source, "Restore verification failed");
                Err(RestoreError::Integrity {
                    source,
                    restore_secs,
                })
            }
        }
    }
}

/// Spawn and wait, keeping the configured stdio. `Command::output` would
/// replace stdout with a pipe.
async fn run_to_completion(cmd: &mut Command) -> io::Result<std::process::Output> {
    cmd.spawn()?.wait_with_output().await
}

fn io_error(tool: &ToolCommand, source: io::Error) -> ToolInvocationError {
    ToolInvocationError::Io {
        tool: tool.program.clone(),
        source,
    }
}

fn spawn_error(tool: &ToolCommand, source: io::Error) -> ToolInvocationError {
    if source.kind() == ErrorKind::NotFound {
        ToolInvocationError::Missing {
            tool: tool.program.clone(),
        }
    } else {
        io_error(tool, source)
    }
}

async fn discard(path: &Path) {
    let removed = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        _ => tokio::fs::remove_file(path).await,
    };
    if let Err(e) = removed {
        warn!(path = %path.display(), error = %e, "Failed to remove partial backup");
    }
}

/// Size and hex SHA-256 of a file, streamed.
async fn file_digest(path: &Path) -> io::Result<(u64, String)> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let size = io::copy(&mut file, &mut hasher)?;
        Ok((size, hex::encode(hasher.finalize())))
    })
    .await
    .map_err(|e| io::Error::new(ErrorKind::Other, e))?
}
