//! Object storage for lake files and deployment manifests.
//!
//! [`LakeStore`] wraps an `object_store` backend (local directory, GCS
//! bucket, or in-memory) behind blocking calls. Paths are `/`-separated keys
//! relative to the bucket or root directory. `put` always overwrites, so
//! writing a partition twice leaves one object.

use futures::TryStreamExt;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectMeta, ObjectStore, PutOptions, PutPayload};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::StorageError;
use crate::runtime::block_on;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Local,
    Memory,
    Gcs,
}

/// Blob storage used for lake files and deployment manifests.
#[derive(Clone)]
pub struct LakeStore {
    inner: Arc<dyn ObjectStore>,
    backend: Backend,
    /// URI prefix for keys, ending in `/` (or `memory://`).
    base_uri: String,
}

impl fmt::Debug for LakeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LakeStore")
            .field("backend", &self.backend)
            .field("base_uri", &self.base_uri)
            .finish()
    }
}

/// GCS builder for `bucket`, reading `GOOGLE_*` variables from the
/// environment. The key file is only used when it exists, since the builder
/// reads it eagerly.
pub(crate) fn gcs_builder(bucket: &str, service_account_key: &Path) -> GoogleCloudStorageBuilder {
    let builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
    if service_account_key.is_file() {
        builder.with_service_account_path(service_account_key.to_string_lossy())
    } else {
        builder
    }
}

pub(crate) fn build_gcs(
    bucket: &str,
    service_account_key: &Path,
) -> Result<GoogleCloudStorage, StorageError> {
    Ok(gcs_builder(bucket, service_account_key).build()?)
}

impl LakeStore {
    /// Directory tree rooted at `root`, created if missing.
    pub fn local(root: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(root).map_err(|source| StorageError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let root = fs::canonicalize(root).map_err(|source| StorageError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let inner = LocalFileSystem::new_with_prefix(&root)?;
        Ok(Self {
            inner: Arc::new(inner),
            backend: Backend::Local,
            base_uri: format!("file://{}/", root.display()),
        })
    }

    /// Process-local store, used for dry runs and tests.
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
            backend: Backend::Memory,
            base_uri: "memory://".to_string(),
        }
    }

    /// Google Cloud Storage bucket, authenticated with `service_account_key`
    /// or the ambient application-default credentials.
    pub fn gcs(bucket: &str, service_account_key: &Path) -> Result<Self, StorageError> {
        let inner = build_gcs(bucket, service_account_key)?;
        Ok(Self {
            inner: Arc::new(inner),
            backend: Backend::Gcs,
            base_uri: format!("gs://{bucket}/"),
        })
    }

    /// Create or replace the object at `path`.
    pub fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError> {
        let location = object_path(path)?;
        let mut opts = PutOptions::default();
        // Only GCS keeps object metadata; the local backend rejects attributes.
        if self.backend == Backend::Gcs {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            opts.attributes = attributes;
        }
        let payload = PutPayload::from(bytes.to_vec());
        block_on(self.inner.put_opts(&location, payload, opts))??;
        debug!(uri = %self.uri(path), bytes = bytes.len(), "object written");
        Ok(())
    }

    /// Read an object.
    pub fn get(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let location = object_path(path)?;
        let bytes = block_on(async {
            let result = self.inner.get(&location).await?;
            result.bytes().await
        })??;
        Ok(bytes.to_vec())
    }

    /// Keys starting with `prefix`, sorted.
    pub fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        // `object_store` lists whole directories; narrow to the string prefix after.
        let dir = prefix.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let dir = (!dir.is_empty()).then(|| ObjectPath::from(dir));
        let objects =
            block_on(self.inner.list(dir.as_ref()).try_collect::<Vec<ObjectMeta>>())??;

        let mut keys: Vec<String> = objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Externally meaningful URI of an object (`gs://...`, `file://...`).
    pub fn uri(&self, path: &str) -> String {
        format!("{}{path}", self.base_uri)
    }
}

fn check_key(path: &str) -> Result<(), StorageError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.ends_with('/')
        || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if invalid {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

fn object_path(path: &str) -> Result<ObjectPath, StorageError> {
    check_key(path)?;
    ObjectPath::parse(path).map_err(|_| StorageError::InvalidPath(path.to_string()))
}
