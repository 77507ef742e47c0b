//! Arrow conversion and in-memory Parquet encoding.

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray,
    TimestampMicrosecondArray,
};
use ccp_common::{CleanBatch, ColumnData};
use ccp_config::Compression;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression as ParquetCompression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

use crate::error::LakeError;
use crate::schema::arrow_schema;

fn to_array(column: &ColumnData) -> ArrayRef {
    match column {
        ColumnData::Integer(values) => Arc::new(Int64Array::from(values.clone())),
        ColumnData::Text(values) => Arc::new(StringArray::from(values.clone())),
        ColumnData::Boolean(values) => Arc::new(BooleanArray::from(values.clone())),
        ColumnData::Float(values) => Arc::new(Float64Array::from(values.clone())),
        ColumnData::Timestamp(values) => Arc::new(TimestampMicrosecondArray::from(
            values
                .iter()
                .map(|ts| ts.map(|t| t.and_utc().timestamp_micros()))
                .collect::<Vec<_>>(),
        )),
    }
}

/// Convert a cleaned batch into an Arrow record batch with its table schema.
pub fn to_record_batch(batch: &CleanBatch) -> Result<RecordBatch, LakeError> {
    let expected = batch.schema.columns.len();
    if batch.columns.len() != expected {
        return Err(LakeError::ColumnCount {
            expected,
            actual: batch.columns.len(),
        });
    }
    let arrays = batch.columns.iter().map(to_array).collect();
    Ok(RecordBatch::try_new(arrow_schema(batch.schema), arrays)?)
}

/// Encodes record batches to Parquet bytes.
#[derive(Debug, Clone, Copy)]
pub struct ParquetEncoder {
    compression: Compression,
}

impl Default for ParquetEncoder {
    fn default() -> Self {
        Self::new(Compression::Snappy)
    }
}

impl ParquetEncoder {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    fn properties(&self) -> WriterProperties {
        let codec = match self.compression {
            Compression::Snappy => ParquetCompression::SNAPPY,
            Compression::Zstd => ParquetCompression::ZSTD(ZstdLevel::default()),
            Compression::None => ParquetCompression::UNCOMPRESSED,
        };
        WriterProperties::builder().set_compression(codec).build()
    }

    /// Encode one record batch as a complete Parquet file.
    pub fn encode(&self, batch: &RecordBatch) -> Result<Vec<u8>, LakeError> {
        let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), Some(self.properties()))?;
        writer.write(batch)?;
        Ok(writer.into_inner()?)
    }

    /// Convert and encode a cleaned batch.
    pub fn encode_clean(&self, batch: &CleanBatch) -> Result<Vec<u8>, LakeError> {
        self.encode(&to_record_batch(batch)?)
    }
}
