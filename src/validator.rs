//! Hot-swappable validator
//!
//! Holds the active [`ValidatorBundle`] in a single atomic cell. Readers do
//! one lock-free load and then work against an immutable bundle; an update
//! builds a complete bundle first and publishes it with one pointer store.
//! A failed build leaves the cell untouched.
//!
//! Each `validate` call loads the cell independently, so two calls made for
//! the same request can see different versions if a swap lands between
//! them. Callers that need one version for a whole request should take a
//! [`HotSwapValidator::current_bundle`] snapshot and validate against it.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{info, warn};

use crate::bundle::ValidatorBundle;
use crate::engine::{EngineBuilder, JsonSchemaEngineBuilder, Message, ValidateError};
use crate::error::Result;

pub struct HotSwapValidator {
    active: ArcSwapOption<ValidatorBundle>,
    builder: Arc<dyn EngineBuilder>,
}

impl HotSwapValidator {
    /// Empty validator using the JSON Schema engine
    pub fn new() -> Self {
        Self::with_builder(Arc::new(JsonSchemaEngineBuilder))
    }

    /// Empty validator using a custom rule engine
    pub fn with_builder(builder: Arc<dyn EngineBuilder>) -> Self {
        Self {
            active: ArcSwapOption::empty(),
            builder,
        }
    }

    /// Validator with an initial schema already installed
    pub fn from_schema(payload: &[u8], version: &str) -> Result<Self> {
        let validator = Self::new();
        validator.update_schema(payload, version)?;
        Ok(validator)
    }

    /// Validate a message against the currently installed schema
    pub fn validate(&self, message: &Message) -> std::result::Result<(), ValidateError> {
        match self.active.load().as_deref() {
            Some(bundle) => bundle.validate(message),
            None => Err(ValidateError::NoSchema),
        }
    }

    /// Version of the installed schema, or "" if nothing is installed yet
    pub fn current_version(&self) -> String {
        self.active
            .load()
            .as_deref()
            .map(|b| b.version().to_string())
            .unwrap_or_default()
    }

    /// Pin the installed bundle for several validations against one version
    pub fn current_bundle(&self) -> Option<Arc<ValidatorBundle>> {
        self.active.load_full()
    }

    /// Build a bundle from `payload` and atomically make it the active one
    ///
    /// On error the previously installed bundle keeps serving.
    pub fn update_schema(&self, payload: &[u8], version: &str) -> Result<()> {
        let bundle = match ValidatorBundle::build(payload, version, self.builder.as_ref()) {
            Ok(bundle) => Arc::new(bundle),
            Err(e) => {
                warn!(version, error = %e, "Rejected schema update, keeping current validator");
                return Err(e);
            }
        };

        let types = bundle.message_types().len();
        let previous = self.active.swap(Some(bundle));
        info!(
            from = previous.as_deref().map(|b| b.version()).unwrap_or(""),
            to = version,
            message_types = types,
            "Installed schema"
        );
        Ok(())
    }
}

impl Default for HotSwapValidator {
    fn default() -> Self {
        Self::new()
    }
}
