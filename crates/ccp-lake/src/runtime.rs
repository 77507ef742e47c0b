//! Shared Tokio runtime for driving `object_store` from blocking code.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::runtime::{Builder, Runtime};

use crate::error::StorageError;

static GLOBAL_RUNTIME: OnceLock<Arc<Runtime>> = OnceLock::new();

fn new_runtime() -> Result<Runtime, StorageError> {
    Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("ccp-storage")
        .enable_all()
        .build()
        .map_err(StorageError::Runtime)
}

pub(crate) fn global_runtime() -> Result<Arc<Runtime>, StorageError> {
    if let Some(rt) = GLOBAL_RUNTIME.get() {
        return Ok(Arc::clone(rt));
    }

    let rt = Arc::new(new_runtime()?);
    if GLOBAL_RUNTIME.set(Arc::clone(&rt)).is_ok() {
        return Ok(rt);
    }

    // Another thread initialized it first.
    match GLOBAL_RUNTIME.get() {
        Some(rt) => Ok(Arc::clone(rt)),
        None => Ok(rt),
    }
}

/// Run `fut` to completion on the shared runtime.
///
/// Must not be called from inside an async context.
pub(crate) fn block_on<F: Future>(fut: F) -> Result<F::Output, StorageError> {
    Ok(global_runtime()?.block_on(fut))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_is_shared() {
        let a = global_runtime().unwrap();
        let b = global_runtime().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(block_on(async { 40 + 2 }).unwrap(), 42);
    }
}
