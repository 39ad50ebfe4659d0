use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A half-open export window `(data_interval_start, data_interval_end]`.
///
/// `start` is absent in earliest-backfill mode: the producer then has no
/// lower bound and must discover one from the data itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window end {end} is not after start {start}")]
    NotMonotone {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl Window {
    pub fn new(start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> Result<Self, WindowError> {
        if let Some(start) = start {
            if end <= start {
                return Err(WindowError::NotMonotone { start, end });
            }
        }
        Ok(Self { start, end })
    }

    pub fn is_backfill(&self) -> bool {
        self.start.is_none()
    }
}
