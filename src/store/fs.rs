//! Filesystem store with optional git history
//!
//! ```text
//! <root>/
//! ├── .git/
//! └── versions/
//!     ├── v1.0.0/
//!     │   ├── record.json
//!     │   └── descriptor.bin
//!     └── v1.0.1/
//! ```
//!
//! A version directory is staged under a hidden name and published with a
//! single `rename`, so readers and restarts never see a half-written record.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use git2::{Commit, Oid, Repository, Signature};
use tracing::{debug, info, warn};

use super::SchemaStore;
use crate::checksum::Checksum;
use crate::error::{Result, SchemaError};
use crate::schema::{RecordMetadata, SchemaRecord};
use crate::version::{SchemaVersion, MAX_COMPONENT};

const VERSIONS_DIR: &str = "versions";
const RECORD_FILE: &str = "record.json";
const PAYLOAD_FILE: &str = "descriptor.bin";
const STAGING_PREFIX: &str = ".staging-";

/// Options for [`FsStore::open`]
#[derive(Debug, Clone)]
pub struct FsStoreOptions {
    /// Commit and tag every registered version in a git repository at the root
    pub git_history: bool,
}

impl Default for FsStoreOptions {
    fn default() -> Self {
        Self { git_history: true }
    }
}

/// Durable, append-only store rooted at a directory
#[derive(Clone)]
pub struct FsStore {
    root: PathBuf,
    inner: Arc<Mutex<FsInner>>,
}

struct FsInner {
    root: PathBuf,
    repo: Option<Repository>,
    /// Metadata of every published version
    index: BTreeMap<SchemaVersion, RecordMetadata>,
}

impl FsStore {
    /// Open an existing store or create a new one
    pub fn open(path: impl AsRef<Path>, options: FsStoreOptions) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(root.join(VERSIONS_DIR))?;

        let repo = if options.git_history {
            Some(match Repository::open(&root) {
                Ok(repo) => repo,
                Err(_) => Repository::init(&root)?,
            })
        } else {
            None
        };

        let mut inner = FsInner {
            root: root.clone(),
            repo,
            index: BTreeMap::new(),
        };
        inner.load_index()?;
        info!(root = %root.display(), versions = inner.index.len(), "Opened schema store");

        Ok(Self {
            root,
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    async fn with_inner<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FsInner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner
                .lock()
                .map_err(|_| SchemaError::Internal("fs store lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await?
    }
}

impl FsInner {
    fn versions_dir(&self) -> PathBuf {
        self.root.join(VERSIONS_DIR)
    }

    fn version_dir(&self, version: &SchemaVersion) -> PathBuf {
        self.versions_dir().join(version.tag())
    }

    /// Rebuild the metadata index from disk, dropping abandoned staging dirs
    fn load_index(&mut self) -> Result<()> {
        for entry in fs::read_dir(self.versions_dir())? {
            let path = entry?.path();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            if name.starts_with(STAGING_PREFIX) {
                warn!(path = %path.display(), "Removing abandoned staging directory");
                fs::remove_dir_all(&path)?;
                continue;
            }
            if path.is_symlink() || !path.is_dir() {
                continue;
            }

            let record_path = path.join(RECORD_FILE);
            if !record_path.exists() {
                warn!(path = %path.display(), "Skipping version directory without record");
                continue;
            }
            let metadata: RecordMetadata = serde_json::from_slice(&fs::read(&record_path)?)?;
            if metadata.version.tag() != name {
                return Err(SchemaError::Internal(format!(
                    "directory {} holds record for {}",
                    name, metadata.version
                )));
            }
            self.index.insert(metadata.version, metadata);
        }
        Ok(())
    }

    fn insert(&mut self, record: SchemaRecord) -> Result<()> {
        let version = record.version();
        let final_dir = self.version_dir(&version);
        if self.index.contains_key(&version) || final_dir.exists() {
            return Err(SchemaError::AlreadyExists {
                version: version.to_string(),
            });
        }

        let staging = self
            .versions_dir()
            .join(format!("{}{}", STAGING_PREFIX, record.metadata.id));
        fs::create_dir(&staging)?;
        if let Err(e) = publish(&staging, &final_dir, &record) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        if let Some(repo) = &self.repo {
            // The directory is already the source of truth; history is best effort
            if let Err(e) = git_commit(repo, &version).and_then(|_| git_tag(repo, &version)) {
                warn!(version = %version, error = %e, "Failed to record version in git history");
            }
        }

        debug!(version = %version, path = %final_dir.display(), "Published version directory");
        self.index.insert(version, record.metadata);
        Ok(())
    }

    fn read(&self, version: &SchemaVersion) -> Result<Option<SchemaRecord>> {
        let Some(metadata) = self.index.get(version) else {
            return Ok(None);
        };
        let payload = fs::read(self.version_dir(version).join(PAYLOAD_FILE))?;
        let record = SchemaRecord {
            metadata: metadata.clone(),
            payload,
        };
        if !record.verify_checksum() {
            return Err(SchemaError::ChecksumMismatch {
                version: version.to_string(),
                expected: metadata.checksum.to_string(),
                actual: Checksum::from_bytes(&record.payload).to_string(),
            });
        }
        Ok(Some(record))
    }

    fn latest_patch_version(&self, major: u32, minor: u32) -> Option<SchemaVersion> {
        let low = SchemaVersion { major, minor, patch: 0 };
        let high = SchemaVersion { major, minor, patch: MAX_COMPONENT };
        self.index.range(low..=high).next_back().map(|(v, _)| *v)
    }
}

fn publish(staging: &Path, final_dir: &Path, record: &SchemaRecord) -> Result<()> {
    fs::write(staging.join(PAYLOAD_FILE), &record.payload)?;
    fs::write(staging.join(RECORD_FILE), serde_json::to_vec_pretty(&record.metadata)?)?;
    match fs::rename(staging, final_dir) {
        Ok(()) => Ok(()),
        // Another process published the same version between our check and the rename
        Err(_) if final_dir.exists() => Err(SchemaError::AlreadyExists {
            version: record.version().to_string(),
        }),
        Err(e) => Err(SchemaError::Io(e)),
    }
}

/// Create a Git commit for a newly published version
fn git_commit(repo: &Repository, version: &SchemaVersion) -> std::result::Result<Oid, git2::Error> {
    let mut index = repo.index()?;
    index.add_all([VERSIONS_DIR].iter(), git2::IndexAddOption::DEFAULT, None)?;
    index.write()?;

    let oid = index.write_tree()?;
    let tree = repo.find_tree(oid)?;
    let sig = Signature::now("Schema Registry", "schemas@familiar.dev")?;

    let parent_commit = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<&Commit> = parent_commit.iter().collect();

    repo.commit(
        Some("HEAD"),
        &sig,
        &sig,
        &format!("Register schema {}", version.tag()),
        &tree,
        &parents,
    )
}

/// Create a Git tag pointing at HEAD
fn git_tag(repo: &Repository, version: &SchemaVersion) -> std::result::Result<(), git2::Error> {
    let obj = repo.revparse_single("HEAD")?;
    let sig = Signature::now("Schema Registry", "schemas@familiar.dev")?;
    repo.tag(&version.tag(), &obj, &sig, &format!("Schema {}", version.tag()), false)?;
    Ok(())
}

#[async_trait]
impl SchemaStore for FsStore {
    async fn insert(&self, record: SchemaRecord) -> Result<()> {
        self.with_inner(move |inner| inner.insert(record)).await
    }

    async fn get(&self, version: &SchemaVersion) -> Result<Option<SchemaRecord>> {
        let version = *version;
        self.with_inner(move |inner| inner.read(&version)).await
    }

    async fn latest_patch(&self, major: u32, minor: u32) -> Result<Option<SchemaRecord>> {
        self.with_inner(move |inner| match inner.latest_patch_version(major, minor) {
            Some(version) => inner.read(&version),
            None => Ok(None),
        })
        .await
    }

    async fn contains(&self, version: &SchemaVersion) -> Result<bool> {
        let version = *version;
        self.with_inner(move |inner| Ok(inner.index.contains_key(&version))).await
    }

    async fn list(&self) -> Result<Vec<RecordMetadata>> {
        self.with_inner(|inner| Ok(inner.index.values().cloned().collect())).await
    }
}

impl std::fmt::Debug for FsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsStore").field("root", &self.root).finish()
    }
}
