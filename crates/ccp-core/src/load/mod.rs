//! Warehouse loading.
//!
//! Each dataset gets an external table over its lake glob, then a managed
//! table materialized from it. Both statements are `CREATE OR REPLACE`, so a
//! rerun leaves one definition of each.

mod bigquery;

pub use bigquery::BigQueryWarehouse;

use ccp_common::Dataset;
use ccp_config::PipelineConfig;
use ccp_lake::LakeLayout;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::info;

/// Errors from executing warehouse statements.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("statement failed: {message}\n{statement}")]
    Statement { statement: String, message: String },

    #[error("warehouse request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("job {job_id} did not complete within {waited_secs}s")]
    Timeout { job_id: String, waited_secs: u64 },

    #[error("warehouse is not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Token(#[from] ccp_lake::StorageError),
}

impl From<WarehouseError> for ccp_common::Error {
    fn from(err: WarehouseError) -> Self {
        match err {
            WarehouseError::Statement { statement, message } => {
                ccp_common::Error::Warehouse { statement, message }
            }
            other => ccp_common::Error::Warehouse {
                statement: String::new(),
                message: other.to_string(),
            },
        }
    }
}

/// What a statement creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    ExternalTable,
    ManagedTable,
}

/// Fully qualified table name. An empty project is left out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(project: &str, dataset: &str, table: &str) -> Self {
        Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.project.is_empty() {
            write!(f, "`{}.{}`", self.dataset, self.table)
        } else {
            write!(f, "`{}.{}.{}`", self.project, self.dataset, self.table)
        }
    }
}

/// One DDL statement with the table it defines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub target: TableRef,
    pub sql: String,
}

/// Executes DDL.
pub trait Warehouse {
    fn execute(&self, statement: &Statement) -> Result<(), WarehouseError>;
}

/// Loading parameters for one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetLoad {
    pub dataset: Dataset,
    pub project: String,
    pub warehouse_dataset: String,
    pub table: String,
    pub bucket: String,
    /// Object glob inside the bucket (`data/crimes/chicago_crimes*.parquet`).
    pub glob: String,
}

impl DatasetLoad {
    pub fn from_config(dataset: Dataset, config: &PipelineConfig, layout: &LakeLayout) -> Self {
        let table = match dataset {
            Dataset::Crimes => &config.warehouse.crimes_table,
            Dataset::Schools => &config.warehouse.schools_table,
        };
        Self {
            dataset,
            project: config.gcp.project_id.clone(),
            warehouse_dataset: config.warehouse.dataset.clone(),
            table: table.clone(),
            bucket: config.lake.bucket.clone(),
            glob: layout.glob(dataset),
        }
    }

    pub fn external_table(&self) -> TableRef {
        TableRef::new(
            &self.project,
            &self.warehouse_dataset,
            &format!("external_{}", self.table),
        )
    }

    pub fn managed_table(&self) -> TableRef {
        TableRef::new(&self.project, &self.warehouse_dataset, &self.table)
    }

    pub fn source_uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.glob)
    }

    /// External table DDL, then managed table DDL.
    pub fn statements(&self) -> [Statement; 2] {
        let external = self.external_table();
        let managed = self.managed_table();

        let external_sql = format!(
            "CREATE OR REPLACE EXTERNAL TABLE {external}\n\
             OPTIONS (\n    format = 'PARQUET',\n    uris = ['{}']\n);",
            self.source_uri()
        );

        let layout = match self.dataset {
            Dataset::Crimes => "PARTITION BY DATE(date)\nCLUSTER BY location_description AS\n",
            Dataset::Schools => "AS\n",
        };
        let managed_sql =
            format!("CREATE OR REPLACE TABLE {managed}\n{layout}SELECT * FROM {external};");

        [
            Statement {
                kind: StatementKind::ExternalTable,
                target: external,
                sql: external_sql,
            },
            Statement {
                kind: StatementKind::ManagedTable,
                target: managed,
                sql: managed_sql,
            },
        ]
    }
}

/// Tables defined by loading one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedTable {
    pub dataset: Dataset,
    pub external_table: String,
    pub table: String,
    pub source_uri: String,
}

/// Runs the load statements through a warehouse.
pub struct Loader<'a> {
    warehouse: &'a dyn Warehouse,
}

impl<'a> Loader<'a> {
    pub fn new(warehouse: &'a dyn Warehouse) -> Self {
        Self { warehouse }
    }

    pub fn load(&self, load: &DatasetLoad) -> Result<LoadedTable, WarehouseError> {
        for statement in load.statements() {
            info!(
                dataset = %load.dataset,
                kind = ?statement.kind,
                table = %statement.target,
                "executing statement"
            );
            self.warehouse.execute(&statement)?;
        }
        Ok(LoadedTable {
            dataset: load.dataset,
            external_table: load.external_table().to_string(),
            table: load.managed_table().to_string(),
            source_uri: load.source_uri(),
        })
    }
}

/// Records statements and keeps the latest definition per table.
#[derive(Debug, Default)]
pub struct InMemoryWarehouse {
    executed: Mutex<Vec<Statement>>,
    tables: Mutex<BTreeMap<TableRef, Statement>>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statement executed, in order.
    pub fn executed(&self) -> Vec<Statement> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current table definitions.
    pub fn tables(&self) -> BTreeMap<TableRef, Statement> {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Warehouse for InMemoryWarehouse {
    fn execute(&self, statement: &Statement) -> Result<(), WarehouseError> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(statement.clone());
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(statement.target.clone(), statement.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.gcp.project_id = "chicago-project".to_string();
        config
    }

    #[test]
    fn crimes_statements() {
        let cfg = config();
        let load = DatasetLoad::from_config(Dataset::Crimes, &cfg, &LakeLayout::default());
        let [external, managed] = load.statements();

        assert_eq!(
            external.sql,
            "CREATE OR REPLACE EXTERNAL TABLE `chicago-project.chicago.external_crimes`\n\
             OPTIONS (\n    format = 'PARQUET',\n    \
             uris = ['gs://chicago-crimes-lake/data/crimes/chicago_crimes*.parquet']\n);"
        );
        assert_eq!(
            managed.sql,
            "CREATE OR REPLACE TABLE `chicago-project.chicago.crimes`\n\
             PARTITION BY DATE(date)\n\
             CLUSTER BY location_description AS\n\
             SELECT * FROM `chicago-project.chicago.external_crimes`;"
        );
    }

    #[test]
    fn schools_are_not_partitioned() {
        let cfg = config();
        let load = DatasetLoad::from_config(Dataset::Schools, &cfg, &LakeLayout::default());
        let [external, managed] = load.statements();
        assert!(external.sql.contains("gs://chicago-crimes-lake/data/chicago_schools*.parquet"));
        assert!(!managed.sql.contains("PARTITION BY"));
        assert!(!managed.sql.contains("CLUSTER BY"));
        assert_eq!(managed.target.to_string(), "`chicago-project.chicago.schools`");
    }

    #[test]
    fn empty_project_is_omitted() {
        let cfg = PipelineConfig::default();
        let load = DatasetLoad::from_config(Dataset::Schools, &cfg, &LakeLayout::default());
        assert_eq!(load.managed_table().to_string(), "`chicago.schools`");
        assert_eq!(load.external_table().to_string(), "`chicago.external_schools`");
    }

    #[test]
    fn reloading_keeps_one_definition_per_table() {
        let cfg = config();
        let warehouse = InMemoryWarehouse::new();
        let loader = Loader::new(&warehouse);
        for _ in 0..3 {
            for dataset in Dataset::ALL {
                let load = DatasetLoad::from_config(dataset, &cfg, &LakeLayout::default());
                loader.load(&load).unwrap();
            }
        }
        assert_eq!(warehouse.executed().len(), 12);
        let tables = warehouse.tables();
        assert_eq!(tables.len(), 4);
        let managed = tables
            .values()
            .filter(|s| s.kind == StatementKind::ManagedTable)
            .count();
        assert_eq!(managed, 2);
    }

    #[test]
    fn statement_errors_keep_sql() {
        let err: ccp_common::Error = WarehouseError::Statement {
            statement: "CREATE OR REPLACE TABLE x".into(),
            message: "Access Denied".into(),
        }
        .into();
        assert_eq!(err.code(), 50);
        assert!(err.to_string().contains("CREATE OR REPLACE TABLE x"));
    }
}
