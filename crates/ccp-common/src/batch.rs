//! Raw and typed batches.
//!
//! A [`RawBatch`] is what extraction produces: header names plus rows of
//! optional strings. A [`CleanBatch`] is column-oriented and bound to a
//! [`TableSchema`]; it is what the lake encodes.

use chrono::NaiveDateTime;

use crate::schema::{ColumnType, TableSchema};

/// Canonical rendering of timestamps when a batch is turned back into text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Untyped rows as parsed from CSV. `None` is a missing value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBatch {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawBatch {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a header, matched exactly.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Values of one typed column.
///
/// Text and boolean columns have no nulls: missing values are filled with
/// `""` and `false` during cleaning.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<Option<i64>>),
    Text(Vec<String>),
    Boolean(Vec<bool>),
    Float(Vec<Option<f64>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
}

impl ColumnData {
    /// Empty column of the given type.
    pub fn with_capacity(ty: ColumnType, capacity: usize) -> Self {
        match ty {
            ColumnType::Integer => ColumnData::Integer(Vec::with_capacity(capacity)),
            ColumnType::Text => ColumnData::Text(Vec::with_capacity(capacity)),
            ColumnType::Boolean => ColumnData::Boolean(Vec::with_capacity(capacity)),
            ColumnType::Float => ColumnData::Float(Vec::with_capacity(capacity)),
            ColumnType::Timestamp => ColumnData::Timestamp(Vec::with_capacity(capacity)),
        }
    }

    pub fn ty(&self) -> ColumnType {
        match self {
            ColumnData::Integer(_) => ColumnType::Integer,
            ColumnData::Text(_) => ColumnType::Text,
            ColumnData::Boolean(_) => ColumnType::Boolean,
            ColumnData::Float(_) => ColumnType::Float,
            ColumnData::Timestamp(_) => ColumnType::Timestamp,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the value at `row` is null.
    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnData::Integer(v) => v.get(row).is_some_and(Option::is_none),
            ColumnData::Float(v) => v.get(row).is_some_and(Option::is_none),
            ColumnData::Timestamp(v) => v.get(row).is_some_and(Option::is_none),
            ColumnData::Text(_) | ColumnData::Boolean(_) => false,
        }
    }

    /// Text rendering of one value; `None` for nulls and empty text.
    pub fn render(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Integer(v) => v.get(row).copied().flatten().map(|x| x.to_string()),
            ColumnData::Text(v) => v.get(row).filter(|s| !s.is_empty()).cloned(),
            ColumnData::Boolean(v) => v.get(row).map(|b| b.to_string()),
            ColumnData::Float(v) => v.get(row).copied().flatten().map(|x| x.to_string()),
            ColumnData::Timestamp(v) => v
                .get(row)
                .copied()
                .flatten()
                .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string()),
        }
    }
}

/// A typed, column-oriented batch conforming to a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanBatch {
    pub schema: &'static TableSchema,
    /// One entry per schema column, in schema order.
    pub columns: Vec<ColumnData>,
}

impl CleanBatch {
    /// Batch with no rows.
    pub fn empty(schema: &'static TableSchema) -> Self {
        Self {
            schema,
            columns: schema
                .columns
                .iter()
                .map(|c| ColumnData::with_capacity(c.ty, 0))
                .collect(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, ColumnData::len)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.schema.index_of(name).and_then(|i| self.columns.get(i))
    }

    /// Render back to untyped rows with the schema's header order.
    pub fn to_raw(&self) -> RawBatch {
        let headers = self
            .schema
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let rows = (0..self.num_rows())
            .map(|row| self.columns.iter().map(|col| col.render(row)).collect())
            .collect();
        RawBatch { headers, rows }
    }
}
