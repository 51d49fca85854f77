use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::SchemaStore;
use crate::error::{Result, SchemaError};
use crate::schema::{RecordMetadata, SchemaRecord};
use crate::version::{SchemaVersion, MAX_COMPONENT};

/// In-memory store backed by a version-ordered `BTreeMap`
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<SchemaVersion, SchemaRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> SchemaError {
    SchemaError::Internal("memory store lock poisoned".to_string())
}

#[async_trait]
impl SchemaStore for MemoryStore {
    async fn insert(&self, record: SchemaRecord) -> Result<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let version = record.version();
        if records.contains_key(&version) {
            return Err(SchemaError::AlreadyExists {
                version: version.to_string(),
            });
        }
        records.insert(version, record);
        Ok(())
    }

    async fn get(&self, version: &SchemaVersion) -> Result<Option<SchemaRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(version).cloned())
    }

    async fn latest_patch(&self, major: u32, minor: u32) -> Result<Option<SchemaRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let low = SchemaVersion { major, minor, patch: 0 };
        let high = SchemaVersion { major, minor, patch: MAX_COMPONENT };
        Ok(records.range(low..=high).next_back().map(|(_, r)| r.clone()))
    }

    async fn contains(&self, version: &SchemaVersion) -> Result<bool> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.contains_key(version))
    }

    async fn list(&self) -> Result<Vec<RecordMetadata>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.values().map(|r| r.metadata.clone()).collect())
    }
}
