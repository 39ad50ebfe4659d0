use std::path::PathBuf;

use async_trait::async_trait;
use pgexport_core::HeartbeatSink;
use pgexport_types::HeartbeatDetails;
use tokio::io::AsyncWriteExt;

/// Stands in for the orchestrator's heartbeat API (§4.8) when this binary is
/// run outside a workflow host: persists `HeartbeatDetails` as JSON at a
/// fixed path, keyed by run id, so re-running against the same `run_id`
/// resumes from the last heartbeat instead of starting over.
pub struct FileHeartbeatSink {
    path: PathBuf,
}

impl FileHeartbeatSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn write(&self, details: &HeartbeatDetails) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(details)?;
        let tmp_path = self.path.with_extension("json.tmp");
        let mut tmp = tokio::fs::File::create(&tmp_path).await?;
        tmp.write_all(&body).await?;
        tmp.flush().await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl HeartbeatSink for FileHeartbeatSink {
    async fn heartbeat(&self, details: &HeartbeatDetails) {
        if let Err(err) = self.write(details).await {
            tracing::warn!(error = %err, path = %self.path.display(), "failed to persist heartbeat");
        } else {
            tracing::debug!(
                records_completed = details.records_completed,
                done_ranges = details.done_ranges.ranges().len(),
                "heartbeat persisted"
            );
        }
    }

    async fn should_resume_from_activity_heartbeat(&self) -> Option<HeartbeatDetails> {
        let body = tokio::fs::read(&self.path).await.ok()?;
        match serde_json::from_slice(&body) {
            Ok(details) => Some(details),
            Err(err) => {
                tracing::warn!(error = %err, path = %self.path.display(), "ignoring unreadable heartbeat state");
                None
            }
        }
    }
}
