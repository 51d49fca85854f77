//! Validator bundles
//!
//! A bundle is one fully built rule engine tagged with the schema version it
//! came from. Bundles are immutable; replacing the active schema means
//! building a new bundle, never editing an old one.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::checksum::Checksum;
use crate::descriptor::DescriptorSet;
use crate::engine::{EngineBuilder, Message, RuleEngine, ValidateError};
use crate::error::{Result, SchemaError};

pub struct ValidatorBundle {
    version: String,
    checksum: Checksum,
    message_types: Vec<String>,
    built_at: DateTime<Utc>,
    engine: Box<dyn RuleEngine>,
}

impl ValidatorBundle {
    /// Decode, resolve and compile a descriptor payload
    ///
    /// Either every step succeeds and a complete bundle is returned, or an
    /// error is returned and nothing is built.
    pub fn build(payload: &[u8], version: &str, builder: &dyn EngineBuilder) -> Result<Self> {
        if version.is_empty() {
            return Err(SchemaError::InvalidArgument("bundle version tag is empty".to_string()));
        }

        let set = DescriptorSet::decode(payload)?;
        let resolved = set.resolve()?;
        let message_types = resolved.message_names();
        if message_types.is_empty() {
            return Err(SchemaError::NoMessages);
        }
        let engine = builder.build(&resolved)?;

        Ok(Self {
            version: version.to_string(),
            checksum: Checksum::from_bytes(payload),
            message_types,
            built_at: Utc::now(),
            engine,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Checksum of the payload this bundle was built from
    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    pub fn message_types(&self) -> &[String] {
        &self.message_types
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Validate a message, tagging any failure with this bundle's version
    pub fn validate(&self, message: &Message) -> std::result::Result<(), ValidateError> {
        self.engine.validate(message).map_err(|e| match e {
            ValidateError::UnknownMessageType { type_name, .. } => ValidateError::UnknownMessageType {
                type_name,
                version: self.version.clone(),
            },
            ValidateError::Violations { violations, .. } => ValidateError::Violations {
                version: self.version.clone(),
                violations,
            },
            other => other,
        })
    }
}

impl fmt::Debug for ValidatorBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorBundle")
            .field("version", &self.version)
            .field("checksum", &self.checksum.short())
            .field("message_types", &self.message_types)
            .field("built_at", &self.built_at)
            .finish()
    }
}
