use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Process-wide tunables (spec §10.2), as opposed to the per-invocation
/// `PostgresInsertInputs`. Layered defaults -> `PGEXPORT.toml` -> `PGEXPORT_`
/// env vars, the same provider chain shape the reference stack uses for its
/// own ingest configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub upload_chunk_size_bytes: u64,
    pub heartbeat_cadence_ms: u64,
    pub queue_byte_ceiling: u64,
    /// Field names the schema mapper routes to `JSONB` for non-canonical
    /// models (§4.2).
    pub known_json_fields: Vec<String>,
    /// Directory the stand-in `HeartbeatSink` persists `HeartbeatDetails`
    /// into, keyed by run id, so a re-invocation of this binary for the same
    /// `run_id` resumes rather than starting over.
    pub heartbeat_state_dir: PathBuf,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            upload_chunk_size_bytes: 50 * 1024 * 1024,
            heartbeat_cadence_ms: 10_000,
            queue_byte_ceiling: 200 * 1024 * 1024,
            known_json_fields: vec![
                "properties".to_string(),
                "elements".to_string(),
                "set".to_string(),
                "set_once".to_string(),
            ],
            heartbeat_state_dir: PathBuf::from(".pgexport-heartbeats"),
            log_filter: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn figment(config_paths: &[PathBuf]) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        let paths: Vec<PathBuf> = if config_paths.is_empty() {
            vec![PathBuf::from("PGEXPORT.toml")]
        } else {
            config_paths.to_vec()
        };
        for path in paths {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("PGEXPORT_"))
    }

    pub fn load(config_paths: &[PathBuf]) -> figment::Result<Self> {
        Self::figment(config_paths).extract()
    }

    pub fn heartbeat_cadence(&self) -> Duration {
        Duration::from_millis(self.heartbeat_cadence_ms)
    }

    pub fn driver_config(&self) -> pgexport_core::ActivityDriverConfig {
        pgexport_core::ActivityDriverConfig {
            upload_chunk_size_bytes: self.upload_chunk_size_bytes,
            heartbeat_cadence: self.heartbeat_cadence(),
            queue_byte_ceiling: self.queue_byte_ceiling,
            known_json_fields: self.known_json_fields.clone(),
        }
    }
}

pub fn heartbeat_state_path(dir: &Path, run_id: uuid::Uuid) -> PathBuf {
    dir.join(format!("{run_id}.json"))
}
