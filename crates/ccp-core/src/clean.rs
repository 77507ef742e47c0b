//! Cleaning and typing of raw batches.
//!
//! 1. Every schema column must be present in the raw headers.
//! 2. Rows missing any geo column are dropped.
//! 3. Missing values become `""` (text), `false` (boolean) or null.
//! 4. Values are coerced to their column type; extra columns are dropped.
//!
//! `clean(&clean(x)?.to_raw(), schema)` equals `clean(x, schema)`.

use ccp_common::batch::TIMESTAMP_FORMAT;
use ccp_common::{CleanBatch, ColumnData, ColumnType, RawBatch, TableSchema};
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::debug;

const TIMESTAMP_FORMATS: &[&str] = &[
    TIMESTAMP_FORMAT,
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Errors raised while cleaning a batch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CleanError {
    #[error("column '{column}' missing from {dataset} batch")]
    MissingColumn { dataset: String, column: String },

    #[error("cannot coerce '{value}' in column '{column}' (row {row}) to {expected}")]
    Coercion {
        column: String,
        row: usize,
        value: String,
        expected: ColumnType,
    },
}

impl From<CleanError> for ccp_common::Error {
    fn from(err: CleanError) -> Self {
        match err {
            CleanError::MissingColumn { dataset, column } => {
                ccp_common::Error::MissingColumn { dataset, column }
            }
            CleanError::Coercion {
                column,
                row,
                value,
                expected,
            } => ccp_common::Error::Coercion {
                column,
                row,
                value,
                expected: expected.to_string(),
            },
        }
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let f = s.parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

fn parse_float(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

fn parse_boolean(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn coerce(
    column: &mut ColumnData,
    value: Option<&str>,
    name: &str,
    row: usize,
) -> Result<(), CleanError> {
    let expected = column.ty();
    let fail = |v: &str| CleanError::Coercion {
        column: name.to_string(),
        row,
        value: v.to_string(),
        expected,
    };
    match column {
        ColumnData::Text(values) => values.push(value.unwrap_or_default().to_string()),
        ColumnData::Boolean(values) => values.push(match value {
            Some(v) => parse_boolean(v).ok_or_else(|| fail(v))?,
            None => false,
        }),
        ColumnData::Integer(values) => values.push(match value {
            Some(v) => Some(parse_integer(v).ok_or_else(|| fail(v))?),
            None => None,
        }),
        ColumnData::Float(values) => values.push(match value {
            Some(v) => Some(parse_float(v).ok_or_else(|| fail(v))?),
            None => None,
        }),
        ColumnData::Timestamp(values) => values.push(match value {
            Some(v) => Some(parse_timestamp(v).ok_or_else(|| fail(v))?),
            None => None,
        }),
    }
    Ok(())
}

/// Clean and type `raw` against `schema`.
pub fn clean(raw: &RawBatch, schema: &'static TableSchema) -> Result<CleanBatch, CleanError> {
    let positions = schema
        .columns
        .iter()
        .map(|c| {
            raw.column_index(c.name)
                .ok_or_else(|| CleanError::MissingColumn {
                    dataset: schema.dataset.to_string(),
                    column: c.name.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let geo: Vec<usize> = schema
        .geo_columns
        .iter()
        .filter_map(|g| schema.index_of(g))
        .map(|i| positions[i])
        .collect();

    let mut columns: Vec<ColumnData> = schema
        .columns
        .iter()
        .map(|c| ColumnData::with_capacity(c.ty, raw.len()))
        .collect();

    let mut dropped = 0usize;
    for (row_idx, row) in raw.rows.iter().enumerate() {
        let cell = |pos: usize| row.get(pos).and_then(present);
        if geo.iter().any(|&pos| cell(pos).is_none()) {
            dropped += 1;
            continue;
        }
        for ((column, def), &pos) in columns.iter_mut().zip(schema.columns).zip(&positions) {
            let value = match def.ty {
                // text keeps whitespace-only values verbatim
                ColumnType::Text => row.get(pos).and_then(|v| v.as_deref()),
                _ => cell(pos),
            };
            coerce(column, value, def.name, row_idx)?;
        }
    }

    let batch = CleanBatch { schema, columns };
    debug!(
        dataset = %schema.dataset,
        rows_in = raw.len(),
        rows_out = batch.num_rows(),
        dropped,
        "cleaned batch"
    );
    Ok(batch)
}
