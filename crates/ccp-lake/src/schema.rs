//! Arrow schemas for the source datasets.

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use ccp_common::{ColumnType, TableSchema};
use std::sync::Arc;

/// Arrow type for a semantic column type.
///
/// Timestamps carry no timezone; the source publishes local Chicago time.
pub fn arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Integer => DataType::Int64,
        ColumnType::Text => DataType::Utf8,
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::Float => DataType::Float64,
        ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
    }
}

fn nullable(ty: ColumnType) -> bool {
    !matches!(ty, ColumnType::Text | ColumnType::Boolean)
}

/// Arrow schema with the table's columns in order.
pub fn arrow_schema(table: &TableSchema) -> SchemaRef {
    let fields: Vec<Field> = table
        .columns
        .iter()
        .map(|c| Field::new(c.name, arrow_type(c.ty), nullable(c.ty)))
        .collect();
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccp_common::schema::{CRIMES, SCHOOLS};

    #[test]
    fn crimes_schema_types() {
        let schema = arrow_schema(&CRIMES);
        assert_eq!(schema.fields().len(), 22);

        let date = schema.field_with_name("date").unwrap();
        assert_eq!(
            date.data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, None)
        );
        assert!(date.is_nullable());

        let arrest = schema.field_with_name("arrest").unwrap();
        assert_eq!(arrest.data_type(), &DataType::Boolean);
        assert!(!arrest.is_nullable());
    }

    #[test]
    fn schools_schema_order() {
        let schema = arrow_schema(&SCHOOLS);
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            ["the_geom", "school_id", "short_name", "address", "grade_cat", "lat", "long"]
        );
    }
}
