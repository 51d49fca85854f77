//! JSON bodies exchanged between the registry server and its clients
//!
//! Payloads travel as standard base64 strings.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::schema::{RecordMetadata, SchemaRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub version: String,
    /// Base64-encoded descriptor payload
    pub payload: String,
}

impl UploadRequest {
    pub fn new(version: impl Into<String>, payload: &[u8]) -> Self {
        Self {
            version: version.into(),
            payload: STANDARD.encode(payload),
        }
    }

    pub fn decode_payload(&self) -> Result<Vec<u8>> {
        decode_base64(&self.payload)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub metadata: RecordMetadata,
    pub payload: String,
}

impl From<SchemaRecord> for RecordResponse {
    fn from(record: SchemaRecord) -> Self {
        Self {
            payload: STANDARD.encode(&record.payload),
            metadata: record.metadata,
        }
    }
}

impl RecordResponse {
    pub fn into_record(self) -> Result<SchemaRecord> {
        let payload = decode_base64(&self.payload)
            .map_err(|e| SchemaError::Internal(format!("registry sent an undecodable payload: {}", e)))?;
        Ok(SchemaRecord {
            metadata: self.metadata,
            payload,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub schemas: Vec<RecordMetadata>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatestPatchQuery {
    pub major: i32,
    pub minor: i32,
}

/// Body of every non-2xx response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&SchemaError> for ErrorBody {
    fn from(err: &SchemaError) -> Self {
        Self {
            code: err.kind().code().to_string(),
            message: err.to_string(),
        }
    }
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| SchemaError::InvalidArgument(format!("payload is not valid base64: {}", e)))
}
