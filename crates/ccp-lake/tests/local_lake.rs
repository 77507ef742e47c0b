//! Lake writes against a local directory, read back with the Parquet reader.

use arrow::array::{Array, BooleanArray, Float64Array, StringArray, TimestampMicrosecondArray};
use ccp_common::schema::CRIMES;
use ccp_common::{CleanBatch, ColumnData, ColumnType, Partition};
use ccp_config::{Compression, LakeConfig};
use ccp_lake::{LakeLayout, LakeStore, LakeWriter, ParquetEncoder};
use chrono::NaiveDate;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use tempfile::tempdir;

fn crimes_batch() -> CleanBatch {
    let ts = NaiveDate::from_ymd_opt(2021, 1, 15)
        .and_then(|d| d.and_hms_opt(13, 45, 0))
        .unwrap();
    let columns = CRIMES
        .columns
        .iter()
        .map(|c| match (c.name, c.ty) {
            ("date", _) => ColumnData::Timestamp(vec![Some(ts), Some(ts)]),
            ("updated_on", _) => ColumnData::Timestamp(vec![None, Some(ts)]),
            ("arrest", _) => ColumnData::Boolean(vec![true, false]),
            ("latitude", _) => ColumnData::Float(vec![Some(41.9), Some(41.7)]),
            ("longitude", _) => ColumnData::Float(vec![Some(-87.7), Some(-87.6)]),
            (_, ColumnType::Integer) => ColumnData::Integer(vec![Some(1), None]),
            (_, ColumnType::Float) => ColumnData::Float(vec![None, Some(1.5)]),
            (_, ColumnType::Boolean) => ColumnData::Boolean(vec![false, false]),
            (_, ColumnType::Text) => ColumnData::Text(vec!["A".into(), "".into()]),
            (_, ColumnType::Timestamp) => ColumnData::Timestamp(vec![None, None]),
        })
        .collect();
    CleanBatch {
        schema: &CRIMES,
        columns,
    }
}

#[test]
fn writes_partition_to_configured_layout() {
    let dir = tempdir().unwrap();
    let store = LakeStore::local(dir.path()).unwrap();
    let config = LakeConfig {
        crimes_prefix: "raw/crimes/".into(),
        ..LakeConfig::default()
    };
    let writer = LakeWriter::new(
        store.clone(),
        LakeLayout::from_config(&config),
        ParquetEncoder::new(Compression::Zstd),
    );

    let written = writer
        .write(&crimes_batch(), Partition::month(2021, 1).unwrap())
        .unwrap();
    assert_eq!(written.path, "raw/crimes/chicago_crimes_2021_01.parquet");
    assert_eq!(written.rows, 2);
    assert!(written.uri.starts_with("file://"));

    let file = File::open(dir.path().join(&written.path)).unwrap();
    let batches: Vec<_> = ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap()
        .map(|b| b.unwrap())
        .collect();
    let batch = &batches[0];
    assert_eq!(batch.num_rows(), 2);
    assert_eq!(batch.num_columns(), 22);

    let date = batch
        .column_by_name("date")
        .unwrap()
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .unwrap();
    let expected = NaiveDate::from_ymd_opt(2021, 1, 15)
        .and_then(|d| d.and_hms_opt(13, 45, 0))
        .unwrap()
        .and_utc()
        .timestamp_micros();
    assert_eq!(date.value(0), expected);

    let updated = batch.column_by_name("updated_on").unwrap();
    assert!(updated.is_null(0));

    let lat = batch
        .column_by_name("latitude")
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(lat.null_count(), 0);

    let arrest = batch
        .column_by_name("arrest")
        .unwrap()
        .as_any()
        .downcast_ref::<BooleanArray>()
        .unwrap();
    assert!(arrest.value(0));

    let block = batch
        .column_by_name("block")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(block.value(1), "");
}

#[test]
fn rewriting_a_month_overwrites() {
    let dir = tempdir().unwrap();
    let store = LakeStore::local(dir.path()).unwrap();
    let writer = LakeWriter::new(store.clone(), LakeLayout::default(), ParquetEncoder::default());
    let jan = Partition::month(2021, 1).unwrap();
    let feb = Partition::month(2021, 2).unwrap();

    writer.write(&crimes_batch(), jan).unwrap();
    writer.write(&crimes_batch(), feb).unwrap();
    writer.write(&crimes_batch(), jan).unwrap();

    assert_eq!(
        store.list("data/crimes/").unwrap(),
        vec![
            "data/crimes/chicago_crimes_2021_01.parquet",
            "data/crimes/chicago_crimes_2021_02.parquet",
        ]
    );
}
