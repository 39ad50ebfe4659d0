use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pgexport_types::HeartbeatDetails;

/// The orchestrator-facing heartbeat API (spec §4.8). A real implementation
/// forwards to the workflow engine's heartbeat call; tests provide an
/// in-memory fake.
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    async fn heartbeat(&self, details: &HeartbeatDetails);

    /// Returns the prior attempt's details if this activity is resuming
    /// from a heartbeat, or `None` on a fresh attempt.
    async fn should_resume_from_activity_heartbeat(&self) -> Option<HeartbeatDetails>;
}

/// Throttles heartbeat sends to `cadence`, and only sends when forward
/// progress was actually made since the last send (spec §10.7) — an idle
/// consumer waiting on the queue shouldn't spam the orchestrator with an
/// unchanged `records_completed`.
pub struct Heartbeater<S: HeartbeatSink> {
    sink: Arc<S>,
    cadence: Duration,
    last_sent_at: Option<Instant>,
    last_records_completed: u64,
}

impl<S: HeartbeatSink> Heartbeater<S> {
    pub fn new(sink: Arc<S>, cadence: Duration) -> Self {
        Self {
            sink,
            cadence,
            last_sent_at: None,
            last_records_completed: 0,
        }
    }

    pub async fn maybe_send(&mut self, details: &HeartbeatDetails) {
        let cadence_elapsed = self
            .last_sent_at
            .map_or(true, |t| t.elapsed() >= self.cadence);
        let made_progress = details.records_completed > self.last_records_completed;

        if cadence_elapsed && made_progress {
            self.sink.heartbeat(details).await;
            self.last_sent_at = Some(Instant::now());
            self.last_records_completed = details.records_completed;
        }
    }
}
