use anyhow::{bail, Context};
use async_trait::async_trait;
use modkit::SchemaRegenerator;
use std::path::PathBuf;
use tokio::process::Command;

/// Runs the configured shell command (e.g. a type generator) from `home_dir`.
pub struct CommandRegenerator {
    command: String,
    cwd: PathBuf,
}

impl CommandRegenerator {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.into(),
        }
    }
}

#[async_trait]
impl SchemaRegenerator for CommandRegenerator {
    async fn regenerate(&self) -> anyhow::Result<()> {
        tracing::info!(command = %self.command, "Regenerating schema types");
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.cwd)
            .output()
            .await
            .with_context(|| format!("cannot spawn '{}'", self.command))?;

        if !output.status.success() {
            bail!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        let dir = tempfile::tempdir().unwrap();
        CommandRegenerator::new("true", dir.path())
            .regenerate()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failing_command_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let err = CommandRegenerator::new("echo boom >&2; exit 3", dir.path())
            .regenerate()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
