use chrono::{DateTime, Utc};
use common::SagaId;
use serde::{Deserialize, Serialize};

/// Position of a record within a saga's stream.
///
/// Versions start at 1 for the first record and increment by 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) of an empty stream.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One serialized saga event as stored in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaRecord {
    pub saga_id: SagaId,
    pub version: Version,
    /// Event name, e.g. "StockReserved".
    pub event_type: String,
    pub recorded_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl SagaRecord {
    /// Creates a record stamped with the current time.
    pub fn new(
        saga_id: SagaId,
        version: Version,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            saga_id,
            version,
            event_type: event_type.into(),
            recorded_at: Utc::now(),
            payload,
        }
    }

    /// Serializes `event` into a record.
    pub fn from_event<E: Serialize>(
        saga_id: SagaId,
        version: Version,
        event_type: impl Into<String>,
        event: &E,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            saga_id,
            version,
            event_type,
            serde_json::to_value(event)?,
        ))
    }
}
