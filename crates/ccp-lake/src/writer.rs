//! Lake writer: one Parquet object per partition.

use ccp_common::{CleanBatch, Partition};
use serde::Serialize;
use tracing::info;

use crate::encode::ParquetEncoder;
use crate::error::LakeError;
use crate::layout::LakeLayout;
use crate::storage::LakeStore;
use crate::PARQUET_CONTENT_TYPE;

/// Result of writing one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenObject {
    pub path: String,
    pub uri: String,
    pub rows: usize,
    pub bytes: usize,
}

/// Encodes cleaned batches and puts them at their layout path.
pub struct LakeWriter {
    store: LakeStore,
    layout: LakeLayout,
    encoder: ParquetEncoder,
}

impl LakeWriter {
    pub fn new(store: LakeStore, layout: LakeLayout, encoder: ParquetEncoder) -> Self {
        Self {
            store,
            layout,
            encoder,
        }
    }

    pub fn layout(&self) -> &LakeLayout {
        &self.layout
    }

    /// Write `batch` as the object for `partition`, replacing any previous one.
    pub fn write(&self, batch: &CleanBatch, partition: Partition) -> Result<WrittenObject, LakeError> {
        let dataset = batch.schema.dataset;
        let path = self.layout.object_path(dataset, partition)?;
        let bytes = self.encoder.encode_clean(batch)?;
        self.store.put(&path, &bytes, PARQUET_CONTENT_TYPE)?;

        let written = WrittenObject {
            uri: self.store.uri(&path),
            path,
            rows: batch.num_rows(),
            bytes: bytes.len(),
        };
        info!(
            dataset = %dataset,
            partition = %partition,
            path = %written.path,
            rows = written.rows,
            bytes = written.bytes,
            "wrote lake object"
        );
        Ok(written)
    }
}
