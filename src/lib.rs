//! Familiar Immutable Schema Registry
//!
//! An append-only registry of versioned schema descriptor sets, and a
//! consumer-side validator that follows the latest patch of a `major.minor`
//! line and hot-swaps its rules without blocking validation.
//!
//! ## Features
//!
//! - **Immutable Storage**: a version, once registered, is never replaced
//! - **Strict Versioning**: `major.minor.patch`, each component a non-negative 32-bit integer
//! - **Checksum Validation**: SHA256 checksums guard every stored payload
//! - **Hot Swap**: validators are rebuilt off to the side and published atomically
//! - **Reconciliation**: a background task polls the registry and swaps on new patches
//!
//! ## Architecture
//!
//! ```text
//!  producer ──upload──▶ SchemaRegistry ──▶ SchemaStore (memory | fs + git)
//!                            ▲
//!                            │ latest_patch(major, minor)
//!                            │
//!  ReconciliationManager ────┘
//!        │ update_schema(payload, version)
//!        ▼
//!  HotSwapValidator ◀── validate(message) from many tasks
//! ```

pub mod bundle;
pub mod checksum;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod http;
pub mod manager;
pub mod registry;
pub mod schema;
pub mod source;
pub mod store;
pub mod validator;
pub mod version;

pub use bundle::ValidatorBundle;
pub use checksum::Checksum;
pub use config::IsrConfig;
pub use descriptor::{DescriptorSet, ResolvedDescriptors};
pub use engine::{EngineBuilder, JsonSchemaEngineBuilder, Message, RuleEngine, ValidateError, Violation};
pub use error::{ErrorKind, Result, SchemaError};
pub use http::RegistryClient;
pub use manager::{ManagerConfig, ManagerState, ReconcileOutcome, ReconciliationManager};
pub use registry::SchemaRegistry;
pub use schema::{RecordMetadata, SchemaRecord};
pub use source::SchemaSource;
pub use store::{FsStore, FsStoreOptions, MemoryStore, SchemaStore};
pub use validator::HotSwapValidator;
pub use version::{SchemaTarget, SchemaVersion};
