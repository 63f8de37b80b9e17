//! Object store access for inputs, intermediates and outputs.
//!
//! Every durable artifact of a job lives in an [`ObjectStore`] addressed by
//! a `/`-separated path. The orchestrator holds only the paths; it touches
//! the store itself for cleanup, and the in-process slicer reads treatment
//! images from it and writes fragments back.

use crate::error::PipelineError;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared handle to the object store backing a pipeline.
pub type SharedStore = Arc<dyn ObjectStore>;

/// Where the pipeline's blobs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Process-local, non-durable. Useful for tests and dry runs.
    Memory,
    /// A directory on the local filesystem; created if missing.
    Local(PathBuf),
}

/// Create the store for `location`.
pub fn create_store(location: &StoreLocation) -> Result<SharedStore, PipelineError> {
    match location {
        StoreLocation::Memory => {
            info!("Creating in-memory object store");
            Ok(Arc::new(InMemory::new()))
        }
        StoreLocation::Local(root) => {
            if !root.exists() {
                std::fs::create_dir_all(root).map_err(|e| {
                    PipelineError::Internal(format!(
                        "failed to create store root '{}': {e}",
                        root.display()
                    ))
                })?;
            }
            info!("Creating LocalFileSystem store at: {}", root.display());
            let fs = LocalFileSystem::new_with_prefix(root).map_err(|e| PipelineError::Store {
                path: root.display().to_string(),
                source: e,
            })?;
            Ok(Arc::new(fs))
        }
    }
}

fn object_path(path: &str) -> Result<ObjectPath, PipelineError> {
    ObjectPath::parse(path).map_err(|e| PipelineError::Store {
        path: path.to_string(),
        source: e.into(),
    })
}

fn store_err(path: &str) -> impl FnOnce(object_store::Error) -> PipelineError + '_ {
    move |source| PipelineError::Store {
        path: path.to_string(),
        source,
    }
}

/// Read a whole object into memory.
pub async fn read_object(store: &dyn ObjectStore, path: &str) -> Result<Vec<u8>, PipelineError> {
    let location = object_path(path)?;
    let bytes = store
        .get(&location)
        .await
        .map_err(store_err(path))?
        .bytes()
        .await
        .map_err(store_err(path))?;
    debug!("Read {} bytes from {}", bytes.len(), path);
    Ok(bytes.to_vec())
}

/// Write (or overwrite) an object.
pub async fn write_object(
    store: &dyn ObjectStore,
    path: &str,
    data: Vec<u8>,
) -> Result<(), PipelineError> {
    let location = object_path(path)?;
    let len = data.len();
    store
        .put(&location, PutPayload::from(data))
        .await
        .map_err(store_err(path))?;
    debug!("Wrote {} bytes to {}", len, path);
    Ok(())
}

/// Delete an object. Returns `false` if there was nothing at `path`.
///
/// Some backends (`InMemory` among them) report success for a missing key,
/// so existence is checked first.
pub async fn delete_object(store: &dyn ObjectStore, path: &str) -> Result<bool, PipelineError> {
    let location = object_path(path)?;
    match store.head(&location).await {
        Ok(_) => {}
        Err(object_store::Error::NotFound { .. }) => return Ok(false),
        Err(e) => return Err(store_err(path)(e)),
    }
    match store.delete(&location).await {
        Ok(()) => Ok(true),
        Err(object_store::Error::NotFound { .. }) => Ok(false),
        Err(e) => Err(store_err(path)(e)),
    }
}

/// Whether an object exists at `path`.
pub async fn object_exists(store: &dyn ObjectStore, path: &str) -> Result<bool, PipelineError> {
    let location = object_path(path)?;
    match store.head(&location).await {
        Ok(_) => Ok(true),
        Err(object_store::Error::NotFound { .. }) => Ok(false),
        Err(e) => Err(store_err(path)(e)),
    }
}
