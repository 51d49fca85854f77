//! Where a consumer fetches schema records from

use async_trait::async_trait;

use crate::error::{Result, SchemaError};
use crate::registry::SchemaRegistry;
use crate::schema::SchemaRecord;
use crate::version::SchemaTarget;

/// Read side of the registry as seen by a consumer
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// The record with the greatest patch for the target's `major.minor`
    async fn latest_patch(&self, target: SchemaTarget) -> Result<SchemaRecord>;
}

#[async_trait]
impl SchemaSource for SchemaRegistry {
    async fn latest_patch(&self, target: SchemaTarget) -> Result<SchemaRecord> {
        let major = to_i32(target.major)?;
        let minor = to_i32(target.minor)?;
        SchemaRegistry::latest_patch(self, major, minor).await
    }
}

fn to_i32(value: u32) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| SchemaError::InvalidArgument(format!("target component {} does not fit in 32 bits", value)))
}
