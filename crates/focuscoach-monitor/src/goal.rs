//! Goal persistence.
//!
//! The user's goal is stored as a small JSON document:
//!
//! ```json
//! { "input": "finish the quarterly report", "updated_at": "2025-01-31T09:15:02Z" }
//! ```
//!
//! A missing file, or a blank `input`, reads as "no goal set".

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{MonitorError, Result};
use crate::traits::GoalStore;

/// On-disk shape of the goal file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalRecord {
    pub input: String,
    pub updated_at: DateTime<Utc>,
}

/// A [`GoalStore`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonGoalStore {
    path: PathBuf,
}

impl JsonGoalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The full record, including when it was last updated.
    pub async fn record(&self) -> Result<Option<GoalRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: GoalRecord =
            serde_json::from_str(&content).map_err(|e| MonitorError::GoalStore {
                reason: format!("invalid goal file {}: {e}", self.path.display()),
            })?;
        if record.input.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(record))
    }
}

#[async_trait]
impl GoalStore for JsonGoalStore {
    async fn get(&self) -> Result<Option<String>> {
        Ok(self.record().await?.map(|r| r.input))
    }

    #[instrument(skip(self, goal), fields(path = %self.path.display()))]
    async fn save(&self, goal: &str) -> Result<()> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(MonitorError::GoalStore {
                reason: "goal must not be empty".into(),
            });
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let record = GoalRecord {
            input: goal.to_owned(),
            updated_at: Utc::now(),
        };
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(&record)?).await?;
        debug!("goal saved");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("goal cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_no_goal() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonGoalStore::new(dir.path().join("goal.json"));
        assert_eq!(store.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonGoalStore::new(dir.path().join("nested/goal.json"));

        store.save("  write the report ").await.unwrap();
        assert_eq!(store.get().await.unwrap().as_deref(), Some("write the report"));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["input"], "write the report");
        assert!(v["updated_at"].is_string());
    }

    #[tokio::test]
    async fn blank_goal_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("goal.json");
        std::fs::write(&path, r#"{"input":"   ","updated_at":"2025-01-31T09:15:02Z"}"#).unwrap();
        assert_eq!(JsonGoalStore::new(path).get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_goal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonGoalStore::new(dir.path().join("goal.json"));
        assert!(matches!(
            store.save(" ").await,
            Err(MonitorError::GoalStore { .. })
        ));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("goal.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(JsonGoalStore::new(path).get().await.is_err());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonGoalStore::new(dir.path().join("goal.json"));
        store.save("focus").await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.get().await.unwrap(), None);
    }
}
