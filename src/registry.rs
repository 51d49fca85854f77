//! Schema Registry
//!
//! Validates requests and delegates to an append-only [`SchemaStore`].
//! All input validation happens before the store is touched, so a rejected
//! request never partially applies.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, SchemaError};
use crate::schema::{check_payload, RecordMetadata, SchemaRecord};
use crate::store::SchemaStore;
use crate::version::SchemaVersion;

/// The main schema registry
#[derive(Clone)]
pub struct SchemaRegistry {
    store: Arc<dyn SchemaStore>,
}

impl SchemaRegistry {
    pub fn new(store: Arc<dyn SchemaStore>) -> Self {
        Self { store }
    }

    /// Registry over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(crate::store::MemoryStore::new()))
    }

    /// Register a new schema version
    ///
    /// This is an append-only operation - existing versions cannot be modified.
    /// Returns the stored metadata, never the payload.
    pub async fn register(&self, version: &str, payload: Vec<u8>) -> Result<RecordMetadata> {
        let version = SchemaVersion::parse(version)?;
        check_payload(&payload)?;

        // Fast path; the store re-checks under its write lock
        if self.store.contains(&version).await? {
            return Err(SchemaError::AlreadyExists {
                version: version.to_string(),
            });
        }

        let record = SchemaRecord::new(version, payload);
        let metadata = record.metadata.clone();
        self.store.insert(record).await?;

        info!(
            version = %metadata.version,
            id = %metadata.id,
            size_bytes = metadata.size_bytes,
            checksum = %metadata.checksum.short(),
            "Registered schema"
        );
        Ok(metadata)
    }

    /// Get a schema by its exact version
    pub async fn get_by_version(&self, version: &str) -> Result<SchemaRecord> {
        let version = SchemaVersion::parse(version)?;
        self.store
            .get(&version)
            .await?
            .ok_or_else(|| SchemaError::NotFound {
                version: version.to_string(),
            })
    }

    /// Get the record with the greatest patch for `major.minor`
    pub async fn latest_patch(&self, major: i32, minor: i32) -> Result<SchemaRecord> {
        let major = non_negative("major", major)?;
        let minor = non_negative("minor", minor)?;

        let record = self
            .store
            .latest_patch(major, minor)
            .await?
            .ok_or(SchemaError::NoPatch { major, minor })?;
        debug!(major, minor, version = %record.version(), "Resolved latest patch");
        Ok(record)
    }

    /// Check whether a version is registered
    pub async fn version_exists(&self, version: &str) -> Result<bool> {
        let version = SchemaVersion::parse(version)?;
        self.store.contains(&version).await
    }

    /// Get all registered versions, sorted
    pub async fn list(&self) -> Result<Vec<RecordMetadata>> {
        self.store.list().await
    }

    /// Recompute the checksum of a stored payload
    pub async fn verify(&self, version: &str) -> Result<bool> {
        match self.get_by_version(version).await {
            Ok(record) => Ok(record.verify_checksum()),
            Err(SchemaError::ChecksumMismatch { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn non_negative(field: &'static str, value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| SchemaError::NegativeComponent {
        field,
        value: value.into(),
    })
}
