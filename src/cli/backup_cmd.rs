//! `backup`: create a backup artifact with the configured dump tool and
//! verify it on disk. Nothing is destroyed or restored.

use super::{has_flag, load_config_or_exit, EXIT_CONFIG, EXIT_FAILURE, EXIT_SUCCESS};
use crate::backup::{BackupArtifact, BackupRestoreController};
use crate::error::ToolInvocationError;

/// Dump and verify. Returns the checked artifact.
pub async fn create_verified(controller: &BackupRestoreController) -> Result<BackupArtifact, ToolInvocationError> {
    let artifact = controller.create_backup().await?;
    artifact.verify().await?;
    Ok(artifact)
}

pub async fn run_backup(args: &[String]) -> i32 {
    let config = match load_config_or_exit(args) {
        Ok(config) => config,
        Err(code) => return code,
    };
    if !config.database.is_configured() {
        eprintln!("Configuration error: RECOVERY_DB_NAME is required for backups");
        return EXIT_CONFIG;
    }

    let controller = BackupRestoreController::new(config.backup.clone())
        .with_password(config.database.password.clone());
    let artifact = match create_verified(&controller).await {
        Ok(artifact) => artifact,
        Err(e) => {
            eprintln!("Backup failed: {}", e);
            return EXIT_FAILURE;
        }
    };

    if has_flag(args, "--json") {
        match serde_json::to_string_pretty(&artifact) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize artifact: {}", e);
                return EXIT_FAILURE;
            }
        }
    } else {
        println!("Backup written: {}", artifact.path.display());
        println!("  size:    {} bytes", artifact.size_bytes);
        println!("  sha256:  {}", artifact.sha256);
        println!("  data as of {}", artifact.data_as_of.to_rfc3339());
    }
    EXIT_SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackupConfig, ToolCommand};

    fn controller(dir: &std::path::Path, dump: &str) -> BackupRestoreController {
        BackupRestoreController::new(BackupConfig {
            backup_dir: dir.to_path_buf(),
            extension: "sql".into(),
            dump: ToolCommand::new("sh", &["-c", dump]),
            restore: ToolCommand::new("sh", &["-c", "cat > /dev/null"]),
        })
    }

    #[tokio::test]
    async fn test_create_verified_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = create_verified(&controller(dir.path(), "echo 'CREATE TABLE t (id INT);'"))
            .await
            .unwrap();
        assert!(artifact.size_bytes > 0);
        assert_eq!(artifact.sha256.len(), 64);
    }

    #[tokio::test]
    async fn test_failing_dump_reports_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = create_verified(&controller(dir.path(), "echo denied >&2; exit 3"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolInvocationError::NonZeroExit { code: Some(3), .. }));
    }
}
