//! Append-only deployment history with file-based persistence.
//!
//! Every deployment writes its events as newline-delimited JSON (JSONL)
//! under its own directory, so a deployment can be inspected or its state
//! reconstructed after the fact with nothing but a text editor.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::DeploymentEvent;

/// JSONL-backed event log for one deployment.
pub struct DeploymentLog {
    /// Directory holding this deployment's files
    dir: PathBuf,

    /// The events.jsonl file inside `dir`
    events_path: PathBuf,
}

impl DeploymentLog {
    /// Create or open the log for a deployment under `root`.
    pub async fn open(root: &Path, deployment_id: Uuid) -> Result<Self> {
        let dir = root.join(deployment_id.to_string());

        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create deployment directory: {}", dir.display()))?;

        let events_path = dir.join("events.jsonl");

        Ok(Self { dir, events_path })
    }

    /// Read a deployment's events without creating anything on disk.
    ///
    /// Returns `None` when no such deployment has been recorded.
    pub async fn load(root: &Path, deployment_id: Uuid) -> Result<Option<Vec<DeploymentEvent>>> {
        let dir = root.join(deployment_id.to_string());
        let log = Self {
            events_path: dir.join("events.jsonl"),
            dir,
        };

        if !log.events_path.exists() {
            return Ok(None);
        }

        log.replay().await.map(Some)
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one event as a JSON line.
    pub async fn append(&self, event: &DeploymentEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!("Failed to open event log: {}", self.events_path.display())
            })?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to append event")?;
        file.flush().await.context("Failed to flush event log")?;

        Ok(())
    }

    /// Read back every event in append order.
    pub async fn replay(&self) -> Result<Vec<DeploymentEvent>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open event log: {}", self.events_path.display()))?;

        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: DeploymentEvent = serde_json::from_str(&line)
                .with_context(|| format!("Unreadable event line: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// List all deployment IDs recorded under `root`.
    pub async fn list_deployments(root: &Path) -> Result<Vec<Uuid>> {
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut deployments = Vec::new();
        let mut entries = fs::read_dir(root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(uuid) = name.to_str().and_then(|n| Uuid::parse_str(n).ok()) {
                deployments.push(uuid);
            }
        }

        Ok(deployments)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::domain::{DeployPhase, EventKind};

    use super::*;

    #[tokio::test]
    async fn test_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let deployment_id = Uuid::new_v4();
        let log = DeploymentLog::open(temp.path(), deployment_id).await.unwrap();

        let started = DeploymentEvent::new(
            deployment_id,
            "api",
            EventKind::DeployStarted,
            Some(DeployPhase::Init),
            "Deployment started",
        );
        let completed = DeploymentEvent::new(
            deployment_id,
            "api",
            EventKind::DeployCompleted,
            Some(DeployPhase::Done),
            "Deployment complete",
        );

        log.append(&started).await.unwrap();
        log.append(&completed).await.unwrap();

        let events = log.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::DeployStarted);
        assert_eq!(events[1].kind, EventKind::DeployCompleted);
    }

    #[tokio::test]
    async fn test_replay_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let log = DeploymentLog::open(temp.path(), Uuid::new_v4()).await.unwrap();

        let events = log.replay().await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_load_unknown_deployment() {
        let temp = TempDir::new().unwrap();
        let loaded = DeploymentLog::load(temp.path(), Uuid::new_v4()).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_list_deployments() {
        let temp = TempDir::new().unwrap();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        DeploymentLog::open(temp.path(), first).await.unwrap();
        DeploymentLog::open(temp.path(), second).await.unwrap();

        let mut listed = DeploymentLog::list_deployments(temp.path()).await.unwrap();
        listed.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(listed, expected);
    }
}
