//! Flow composition.
//!
//! Partitions run one at a time: extract, clean, write. Loading and
//! transformation follow once every partition is in the lake. Any error
//! aborts the running flow.

use ccp_common::{Dataset, Error, Partition, Result, RunId};
use ccp_config::validate::FIRST_DATA_YEAR;
use ccp_config::PipelineConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, info_span, warn};

use crate::clean::clean;
use crate::extract::{DataSource, Extractor};
use crate::load::{DatasetLoad, LoadedTable, Loader, Warehouse};
use crate::transform::{TransformReport, Transformer};
use ccp_lake::LakeWriter;

/// What happened to one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionOutcome {
    pub dataset: Dataset,
    pub partition: Partition,
    pub rows_raw: usize,
    pub rows_clean: usize,
    /// Lake object written, absent when skipped.
    pub path: Option<String>,
    pub uri: Option<String>,
    /// Source returned no rows.
    pub skipped: bool,
    pub elapsed_ms: u64,
}

/// Serializable summary of a flow execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub flow: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub config_hash: String,
    pub partitions: Vec<PartitionOutcome>,
    pub tables: Vec<LoadedTable>,
    pub transform: Option<TransformReport>,
}

impl RunReport {
    fn start(flow: &str, config_hash: String) -> Self {
        let now = Utc::now();
        Self {
            run_id: RunId::new(),
            flow: flow.to_string(),
            started_at: now,
            finished_at: now,
            elapsed_ms: 0,
            config_hash,
            partitions: Vec::new(),
            tables: Vec::new(),
            transform: None,
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.elapsed_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        info!(
            run_id = %self.run_id,
            flow = %self.flow,
            partitions = self.partitions.len(),
            tables = self.tables.len(),
            elapsed_ms = self.elapsed_ms,
            "flow finished"
        );
        self
    }

    /// Rows written to the lake across all partitions.
    pub fn rows_written(&self) -> usize {
        self.partitions.iter().map(|p| p.rows_clean).sum()
    }

    pub fn skipped(&self) -> usize {
        self.partitions.iter().filter(|p| p.skipped).count()
    }

    /// Plain-text summary for terminals.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "{} {} finished in {} ms\n",
            self.flow, self.run_id, self.elapsed_ms
        );
        for p in &self.partitions {
            match &p.path {
                Some(path) => out.push_str(&format!(
                    "  {} {:<8} {:>7} rows -> {}\n",
                    p.dataset,
                    p.partition.label(),
                    p.rows_clean,
                    path
                )),
                None => out.push_str(&format!(
                    "  {} {:<8} skipped (no source rows)\n",
                    p.dataset,
                    p.partition.label()
                )),
            }
        }
        for t in &self.tables {
            out.push_str(&format!("  loaded {} from {}\n", t.table, t.source_uri));
        }
        match &self.transform {
            Some(TransformReport::Cli { stages, .. }) => {
                for stage in stages {
                    out.push_str(&format!("  built {}\n", stage.model));
                }
            }
            Some(TransformReport::Cloud { run_id, status, .. }) => {
                out.push_str(&format!("  dbt Cloud run {run_id}: {status}\n"));
            }
            None => {}
        }
        if !self.partitions.is_empty() {
            out.push_str(&format!(
                "  {} rows written, {} partitions skipped\n",
                self.rows_written(),
                self.skipped()
            ));
        }
        out
    }
}

/// Years to ingest: explicit list, else `since..=current`, else
/// `start_year..=current`. Years before the first data year or after the
/// current one are rejected.
pub fn resolve_years(
    explicit: &[i32],
    since: Option<i32>,
    start_year: i32,
    current_year: i32,
) -> Result<Vec<i32>> {
    let mut years = if explicit.is_empty() {
        (since.unwrap_or(start_year)..=current_year).collect::<Vec<_>>()
    } else {
        explicit.to_vec()
    };
    years.sort_unstable();
    years.dedup();
    if years.is_empty() {
        return Err(Error::InvalidConfig(format!(
            "no years to extract between {} and {current_year}",
            since.unwrap_or(start_year)
        )));
    }
    if let Some(bad) = years
        .iter()
        .find(|y| **y < FIRST_DATA_YEAR || **y > current_year)
    {
        return Err(Error::InvalidConfig(format!(
            "year {bad} outside {FIRST_DATA_YEAR}..={current_year}"
        )));
    }
    Ok(years)
}

/// Runs flows against injected capabilities.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    source: &'a dyn DataSource,
    writer: &'a LakeWriter,
    warehouse: &'a dyn Warehouse,
    transformer: Option<&'a dyn Transformer>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        source: &'a dyn DataSource,
        writer: &'a LakeWriter,
        warehouse: &'a dyn Warehouse,
    ) -> Self {
        Self {
            config,
            source,
            writer,
            warehouse,
            transformer: None,
        }
    }

    pub fn with_transformer(mut self, transformer: &'a dyn Transformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    fn report(&self, flow: &str) -> Result<RunReport> {
        let hash = ccp_config::snapshot::config_hash(self.config)?;
        let report = RunReport::start(flow, hash);
        info!(run_id = %report.run_id, flow, "flow started");
        Ok(report)
    }

    fn extractor(&self) -> Extractor<'_> {
        Extractor::new(self.source, &self.config.source)
    }

    fn process_partition(
        &self,
        extractor: &Extractor<'_>,
        dataset: Dataset,
        partition: Partition,
    ) -> Result<PartitionOutcome> {
        let _span = info_span!("partition", %dataset, %partition).entered();
        let started = Instant::now();

        let raw = match dataset {
            Dataset::Crimes => extractor.crimes(partition)?,
            Dataset::Schools => extractor.schools()?,
        };
        let mut outcome = PartitionOutcome {
            dataset,
            partition,
            rows_raw: raw.len(),
            rows_clean: 0,
            path: None,
            uri: None,
            skipped: raw.is_empty(),
            elapsed_ms: 0,
        };

        if raw.is_empty() {
            warn!("source returned no rows; skipping partition");
        } else {
            let batch = clean(&raw, dataset.schema())?;
            let written = self.writer.write(&batch, partition)?;
            outcome.rows_clean = written.rows;
            outcome.path = Some(written.path);
            outcome.uri = Some(written.uri);
        }
        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(outcome)
    }

    fn crimes_into(&self, report: &mut RunReport, years: &[i32]) -> Result<()> {
        let extractor = self.extractor();
        for &year in years {
            for partition in Partition::months_of(year) {
                let outcome = self.process_partition(&extractor, Dataset::Crimes, partition)?;
                report.partitions.push(outcome);
            }
        }
        Ok(())
    }

    fn schools_into(&self, report: &mut RunReport) -> Result<()> {
        let extractor = self.extractor();
        let outcome = self.process_partition(&extractor, Dataset::Schools, Partition::Whole)?;
        report.partitions.push(outcome);
        Ok(())
    }

    fn load_into(&self, report: &mut RunReport, datasets: &[Dataset]) -> Result<()> {
        let loader = Loader::new(self.warehouse);
        for &dataset in datasets {
            let _span = info_span!("load", %dataset).entered();
            let load = DatasetLoad::from_config(dataset, self.config, self.writer.layout());
            report.tables.push(loader.load(&load)?);
        }
        Ok(())
    }

    fn transform_into(&self, report: &mut RunReport) -> Result<()> {
        let transformer = self
            .transformer
            .ok_or_else(|| Error::Transform("no transformer configured".to_string()))?;
        let _span = info_span!("transform").entered();
        report.transform = Some(transformer.run()?);
        Ok(())
    }

    /// Every month of `years`, in calendar order.
    pub fn extract_crimes(&self, years: &[i32]) -> Result<RunReport> {
        let _span = info_span!("flow", flow = "extract-crimes").entered();
        let mut report = self.report("extract-crimes")?;
        self.crimes_into(&mut report, years)?;
        Ok(report.finish())
    }

    pub fn extract_schools(&self) -> Result<RunReport> {
        let _span = info_span!("flow", flow = "extract-schools").entered();
        let mut report = self.report("extract-schools")?;
        self.schools_into(&mut report)?;
        Ok(report.finish())
    }

    pub fn load(&self, datasets: &[Dataset]) -> Result<RunReport> {
        let _span = info_span!("flow", flow = "load").entered();
        let mut report = self.report("load")?;
        self.load_into(&mut report, datasets)?;
        Ok(report.finish())
    }

    pub fn transform(&self) -> Result<RunReport> {
        let _span = info_span!("flow", flow = "transform").entered();
        let mut report = self.report("transform")?;
        self.transform_into(&mut report)?;
        Ok(report.finish())
    }

    /// Crimes for `years`, schools, both loads, then the transformation
    /// unless `skip_transform` is set.
    pub fn run(&self, years: &[i32], skip_transform: bool) -> Result<RunReport> {
        let _span = info_span!("flow", flow = "run").entered();
        let mut report = self.report("run")?;
        self.crimes_into(&mut report, years)?;
        self.schools_into(&mut report)?;
        self.load_into(&mut report, &Dataset::ALL)?;
        if skip_transform {
            info!("transformation skipped");
        } else {
            self.transform_into(&mut report)?;
        }
        Ok(report.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn years_default_to_start_year() {
        assert_eq!(
            resolve_years(&[], None, 2020, 2023).unwrap(),
            vec![2020, 2021, 2022, 2023]
        );
        assert_eq!(resolve_years(&[], Some(2023), 2001, 2023).unwrap(), vec![2023]);
        assert_eq!(
            resolve_years(&[2022, 2021, 2022], None, 2001, 2023).unwrap(),
            vec![2021, 2022]
        );
    }

    #[test]
    fn years_out_of_range_are_rejected() {
        assert!(resolve_years(&[2000], None, 2001, 2023).is_err());
        assert!(resolve_years(&[2030], None, 2001, 2023).is_err());
        assert!(resolve_years(&[], Some(2030), 2001, 2023).is_err());
    }
}
