//! Storage backends for schema records
//!
//! A [`SchemaStore`] is the durability layer under the registry:
//! - `MemoryStore`: ordered in-memory map, for tests and ephemeral registries
//! - `FsStore`: one directory per version, optionally committed to git
//!
//! Every backend guarantees that `insert` is create-if-absent. The check and
//! the write happen under the backend's own write lock, so two concurrent
//! inserts of the same version produce one success and one
//! `SchemaError::AlreadyExists`, and a stored payload is never replaced.

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::{RecordMetadata, SchemaRecord};
use crate::version::SchemaVersion;

mod fs;
mod memory;

pub use fs::{FsStore, FsStoreOptions};
pub use memory::MemoryStore;

/// Append-only schema record store
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Persist a record. Fails with `AlreadyExists` if the version is present.
    async fn insert(&self, record: SchemaRecord) -> Result<()>;

    /// Fetch the record with exactly this version.
    async fn get(&self, version: &SchemaVersion) -> Result<Option<SchemaRecord>>;

    /// Fetch the record with the greatest patch for `major.minor`.
    async fn latest_patch(&self, major: u32, minor: u32) -> Result<Option<SchemaRecord>>;

    /// Check whether a version is stored.
    async fn contains(&self, version: &SchemaVersion) -> Result<bool>;

    /// Metadata of every stored record, ordered by version.
    async fn list(&self) -> Result<Vec<RecordMetadata>>;
}
