use async_trait::async_trait;
use common::SagaId;

use crate::{Result, SagaRecord, StoreError, Version};

/// Append-only log of saga records, one stream per saga.
#[async_trait]
pub trait SagaLog: Send + Sync {
    /// Appends records to a saga's stream.
    ///
    /// Records are appended atomically. The append fails with
    /// `ConcurrencyConflict` if the stream is not at `expected_version`.
    ///
    /// Returns the new version of the stream.
    async fn append_records(
        &self,
        records: Vec<SagaRecord>,
        expected_version: Version,
    ) -> Result<Version>;

    /// Retrieves all records of a saga in version order.
    async fn load_records(&self, saga_id: SagaId) -> Result<Vec<SagaRecord>>;
}

/// Validates records before appending.
///
/// All records must belong to one saga and carry consecutive versions
/// starting right after `expected_version`.
pub fn validate_records_for_append(
    records: &[SagaRecord],
    expected_version: Version,
) -> Result<SagaId> {
    let first = records
        .first()
        .ok_or_else(|| StoreError::InvalidRecords("Cannot append empty record list".into()))?;

    let mut expected = expected_version;
    for record in records {
        if record.saga_id != first.saga_id {
            return Err(StoreError::InvalidRecords(
                "All records must be for the same saga".into(),
            ));
        }
        expected = expected.next();
        if record.version != expected {
            return Err(StoreError::InvalidRecords(format!(
                "Record versions must be sequential. Expected {}, got {}",
                expected, record.version
            )));
        }
    }

    Ok(first.saga_id)
}
