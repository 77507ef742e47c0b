//! Table schemas.
//!
//! The two source datasets have fixed column sets. Cleaning coerces raw CSV
//! values to these semantic types, and the lake maps them to Arrow types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Text,
    Boolean,
    Float,
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> ColumnDef {
    ColumnDef { name, ty }
}

/// Fixed schema of a source dataset.
#[derive(Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub dataset: Dataset,
    pub columns: &'static [ColumnDef],
    /// Latitude and longitude columns; rows missing either are dropped.
    pub geo_columns: [&'static str; 2],
}

impl TableSchema {
    /// Position of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }
}

use ColumnType::{Boolean, Float, Integer, Text, Timestamp};

/// Crime incidents (`ijzp-q8t2`).
pub static CRIMES: TableSchema = TableSchema {
    dataset: Dataset::Crimes,
    columns: &[
        col("id", Integer),
        col("case_number", Text),
        col("date", Timestamp),
        col("block", Text),
        col("iucr", Text),
        col("primary_type", Text),
        col("description", Text),
        col("location_description", Text),
        col("arrest", Boolean),
        col("domestic", Boolean),
        col("beat", Text),
        col("district", Text),
        col("ward", Text),
        col("community_area", Text),
        col("fbi_code", Text),
        col("x_coordinate", Float),
        col("y_coordinate", Float),
        col("year", Integer),
        col("updated_on", Timestamp),
        col("latitude", Float),
        col("longitude", Float),
        col("location", Text),
    ],
    geo_columns: ["latitude", "longitude"],
};

/// School locations (`gqgn-ekwj`).
pub static SCHOOLS: TableSchema = TableSchema {
    dataset: Dataset::Schools,
    columns: &[
        col("the_geom", Text),
        col("school_id", Integer),
        col("short_name", Text),
        col("address", Text),
        col("grade_cat", Text),
        col("lat", Float),
        col("long", Float),
    ],
    geo_columns: ["lat", "long"],
};

/// The source datasets handled by the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Crimes,
    Schools,
}

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::Crimes, Dataset::Schools];

    /// The fixed schema for this dataset.
    pub fn schema(self) -> &'static TableSchema {
        match self {
            Dataset::Crimes => &CRIMES,
            Dataset::Schools => &SCHOOLS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dataset::Crimes => "crimes",
            Dataset::Schools => "schools",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
