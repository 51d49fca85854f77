//! Schema record types

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::checksum::Checksum;
use crate::error::{Result, SchemaError};
use crate::version::SchemaVersion;

/// Largest accepted descriptor payload (10 MiB, inclusive)
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Everything about a stored schema except its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Opaque unique identifier (UUID v7)
    pub id: String,
    /// Unique semantic version
    pub version: SchemaVersion,
    /// Byte length of the payload
    pub size_bytes: u64,
    /// SHA256 checksum of the payload
    pub checksum: Checksum,
    /// When this record was registered
    pub created_at: DateTime<Utc>,
}

/// A stored schema: metadata plus the binary descriptor payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRecord {
    pub metadata: RecordMetadata,
    pub payload: Vec<u8>,
}

impl SchemaRecord {
    /// Create a new record with a fresh id and timestamp
    pub fn new(version: SchemaVersion, payload: Vec<u8>) -> Self {
        let metadata = RecordMetadata {
            id: Uuid::now_v7().to_string(),
            version,
            size_bytes: payload.len() as u64,
            checksum: Checksum::from_bytes(&payload),
            created_at: Utc::now(),
        };
        Self { metadata, payload }
    }

    pub fn version(&self) -> SchemaVersion {
        self.metadata.version
    }

    /// Verify the checksum matches the payload
    pub fn verify_checksum(&self) -> bool {
        self.metadata.checksum.verify(&self.payload)
    }
}

/// Reject empty or oversized payloads
pub fn check_payload(payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        return Err(SchemaError::EmptyPayload);
    }
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(SchemaError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_BYTES,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_new_record() {
        let version = SchemaVersion::parse("1.0.0").unwrap();
        let record = SchemaRecord::new(version, b"descriptor".to_vec());
        assert_eq!(record.metadata.size_bytes, 10);
        assert!(Uuid::parse_str(&record.metadata.id).is_ok());
        assert!(record.verify_checksum());
    }

    #[test]
    fn test_payload_limits() {
        assert_eq!(check_payload(&[]).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert!(check_payload(&vec![0u8; MAX_PAYLOAD_BYTES]).is_ok());
        assert_eq!(
            check_payload(&vec![0u8; MAX_PAYLOAD_BYTES + 1]).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }
}
