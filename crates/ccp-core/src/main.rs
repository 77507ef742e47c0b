//! `ccp`: Chicago crimes pipeline CLI.

use ccp_common::{Dataset, Error, OutputFormat, Result};
use ccp_config::{
    resolve_config, validate, ConfigOrigin, ConfigSnapshot, LakeBackend, PipelineConfig,
};
use ccp_core::deploy::{default_deployments, list_registered, Registrar};
use ccp_core::exit_codes::ExitCode;
use ccp_core::extract::HttpSource;
use ccp_core::load::{BigQueryWarehouse, InMemoryWarehouse, Statement};
use ccp_core::logging::{self, LogFormat};
use ccp_core::pipeline::{resolve_years, Pipeline, RunReport};
use ccp_core::provision::{Provisioner, ResourceRegistry};
use ccp_core::transform::{DbtCli, DbtCloud, HttpDbtCloudApi, SystemRunner, Transformer};
use ccp_lake::{default_token_source, LakeLayout, LakeStore, LakeWriter, ParquetEncoder};
use chrono::{Datelike, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;

/// Chicago crimes and schools ETL pipeline
#[derive(Parser, Debug)]
#[command(name = "ccp", version, about)]
struct Cli {
    /// Config file (TOML); defaults to $CCP_CONFIG or the platform config dir
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format for reports
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Write the lake to a local directory instead of object storage
    #[arg(long, global = true, value_name = "DIR")]
    lake_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or refresh the named resource handles
    Provision,
    /// Pull source data into the lake
    Extract {
        #[command(subcommand)]
        target: ExtractTarget,
    },
    /// Define warehouse tables over the lake
    Load {
        /// Only this dataset (default: both)
        #[arg(long, value_enum)]
        dataset: Option<Dataset>,
        /// Print the statements instead of executing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the dbt models
    Transform {
        /// Trigger the hosted dbt Cloud job instead of the local CLI
        #[arg(long)]
        cloud: bool,
    },
    /// Extract, load and transform in one go
    Run {
        #[command(flatten)]
        years: YearArgs,
        /// Trigger the hosted dbt Cloud job instead of the local CLI
        #[arg(long)]
        cloud: bool,
        /// Stop after loading
        #[arg(long)]
        skip_transform: bool,
    },
    /// Register the default deployments
    Deploy,
    /// List registered deployments and their next UTC fire time
    Deployments,
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ExtractTarget {
    /// Crime incidents, one partition per month
    Crimes {
        #[command(flatten)]
        years: YearArgs,
    },
    /// School locations, one partition
    Schools,
}

#[derive(Args, Debug)]
struct YearArgs {
    /// Years to extract (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "YEAR")]
    years: Vec<i32>,
    /// Extract every year from this one through the current year
    #[arg(long, conflicts_with = "years", value_name = "YEAR")]
    since: Option<i32>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Check the effective configuration
    Validate,
}

struct Context {
    config: PipelineConfig,
    origin: ConfigOrigin,
    format: OutputFormat,
    current_year: i32,
}

impl Context {
    fn load(cli: &Cli) -> Result<Self> {
        let resolved = resolve_config(cli.config.as_deref())?;
        let mut config = resolved.config;
        if let Some(dir) = &cli.lake_dir {
            config.lake.backend = LakeBackend::Local;
            config.lake.local_root = dir.clone();
        }
        ResourceRegistry::from_state_dir(&config.state_dir).apply_to(&mut config)?;
        Ok(Self {
            config,
            origin: resolved.origin,
            format: cli.format,
            current_year: Utc::now().year(),
        })
    }

    fn validated(&self) -> Result<()> {
        validate(&self.config, self.current_year).into_result()?;
        Ok(())
    }

    fn years(&self, args: &YearArgs) -> Result<Vec<i32>> {
        resolve_years(
            &args.years,
            args.since,
            self.config.source.start_year,
            self.current_year,
        )
    }

    fn lake_store(&self) -> Result<LakeStore> {
        let cfg = &self.config;
        let store = match cfg.lake.backend {
            LakeBackend::Local => LakeStore::local(&cfg.lake.local_root)?,
            LakeBackend::Gcs => LakeStore::gcs(&cfg.lake.bucket, &cfg.gcp.service_account_key)?,
        };
        Ok(store)
    }

    fn deploy_store(&self) -> Result<LakeStore> {
        let cfg = &self.config;
        let store = match cfg.lake.backend {
            LakeBackend::Local => {
                LakeStore::local(&cfg.state_dir.join("buckets").join(&cfg.deploy.bucket))?
            }
            LakeBackend::Gcs => {
                LakeStore::gcs(&cfg.deploy.bucket, &cfg.gcp.service_account_key)?
            }
        };
        Ok(store)
    }

    fn writer_for(&self, store: LakeStore) -> LakeWriter {
        LakeWriter::new(
            store,
            LakeLayout::from_config(&self.config.lake),
            ParquetEncoder::new(self.config.lake.compression),
        )
    }

    fn writer(&self) -> Result<LakeWriter> {
        Ok(self.writer_for(self.lake_store()?))
    }

    /// Writer for flows that only need the lake layout.
    fn layout_writer(&self) -> LakeWriter {
        self.writer_for(LakeStore::memory())
    }

    fn source(&self) -> HttpSource {
        HttpSource::new(Duration::from_secs(self.config.source.timeout_secs))
    }

    fn warehouse(&self) -> Result<BigQueryWarehouse> {
        let cfg = &self.config;
        let tokens = default_token_source(&cfg.lake.bucket, &cfg.gcp.service_account_key)?;
        let warehouse =
            BigQueryWarehouse::new(&cfg.gcp.project_id, &cfg.warehouse.location, tokens)?;
        Ok(warehouse)
    }

    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => print!("{}", text()),
        }
        Ok(())
    }

    fn emit_report(&self, report: &RunReport) -> Result<()> {
        self.emit(report, || report.render_text())
    }
}

/// Runs `f` with the configured transformer.
fn with_transformer<T>(
    ctx: &Context,
    cloud: bool,
    f: impl FnOnce(&dyn Transformer) -> Result<T>,
) -> Result<T> {
    if cloud {
        let api = HttpDbtCloudApi::from_config(&ctx.config)?;
        let job = DbtCloud::from_config(&api, &ctx.config)?;
        f(&job)
    } else {
        let runner = SystemRunner;
        let dbt = DbtCli::new(&runner, &ctx.config);
        f(&dbt)
    }
}

fn run(cli: &Cli) -> Result<()> {
    let ctx = Context::load(cli)?;

    match &cli.command {
        Commands::Provision => {
            let registry = ResourceRegistry::from_state_dir(&ctx.config.state_dir);
            let report = Provisioner::new(&ctx.config, &registry).provision_all()?;
            ctx.emit(&report, || {
                let mut out = String::new();
                for h in &report.handles {
                    out.push_str(&format!("{} {} -> {}\n", h.kind, h.name, h.path.display()));
                }
                for s in &report.skipped {
                    out.push_str(&format!("skipped {s}\n"));
                }
                out
            })
        }
        Commands::Extract { target } => {
            ctx.validated()?;
            let years = match target {
                ExtractTarget::Crimes { years } => Some(ctx.years(years)?),
                ExtractTarget::Schools => None,
            };
            let source = ctx.source();
            let writer = ctx.writer()?;
            let warehouse = InMemoryWarehouse::new();
            let pipeline = Pipeline::new(&ctx.config, &source, &writer, &warehouse);
            let report = match years {
                Some(years) => pipeline.extract_crimes(&years)?,
                None => pipeline.extract_schools()?,
            };
            ctx.emit_report(&report)
        }
        Commands::Load { dataset, dry_run } => {
            ctx.validated()?;
            let datasets = dataset.map_or(Dataset::ALL.to_vec(), |d| vec![d]);
            let source = ctx.source();
            let writer = ctx.layout_writer();
            if *dry_run {
                let warehouse = InMemoryWarehouse::new();
                let report = Pipeline::new(&ctx.config, &source, &writer, &warehouse)
                    .load(&datasets)?;
                let statements = warehouse.executed();
                #[derive(Serialize)]
                struct DryRun<'a> {
                    report: &'a RunReport,
                    statements: &'a [Statement],
                }
                ctx.emit(
                    &DryRun {
                        report: &report,
                        statements: &statements,
                    },
                    || {
                        statements
                            .iter()
                            .map(|s| format!("{}\n\n", s.sql))
                            .collect()
                    },
                )
            } else {
                let warehouse = ctx.warehouse()?;
                let report =
                    Pipeline::new(&ctx.config, &source, &writer, &warehouse).load(&datasets)?;
                ctx.emit_report(&report)
            }
        }
        Commands::Transform { cloud } => {
            ctx.validated()?;
            let source = ctx.source();
            let writer = ctx.layout_writer();
            let warehouse = InMemoryWarehouse::new();
            let report = with_transformer(&ctx, *cloud, |transformer| {
                Pipeline::new(&ctx.config, &source, &writer, &warehouse)
                    .with_transformer(transformer)
                    .transform()
            })?;
            ctx.emit_report(&report)
        }
        Commands::Run {
            years,
            cloud,
            skip_transform,
        } => {
            ctx.validated()?;
            let years = ctx.years(years)?;
            let source = ctx.source();
            let writer = ctx.writer()?;
            let warehouse = ctx.warehouse()?;
            let report = if *skip_transform {
                Pipeline::new(&ctx.config, &source, &writer, &warehouse).run(&years, true)?
            } else {
                with_transformer(&ctx, *cloud, |transformer| {
                    Pipeline::new(&ctx.config, &source, &writer, &warehouse)
                        .with_transformer(transformer)
                        .run(&years, false)
                })?
            };
            ctx.emit_report(&report)
        }
        Commands::Deploy => {
            ctx.validated()?;
            let store = ctx.deploy_store()?;
            let registrar = Registrar::new(&store, &ctx.config.state_dir);
            let registered = default_deployments(&ctx.config, ctx.current_year)?
                .into_iter()
                .map(|d| registrar.register(d))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ctx.emit(&registered, || {
                registered
                    .iter()
                    .map(|r| {
                        format!(
                            "{:<24} {:<16} {:<12} {}\n",
                            r.name,
                            r.flow.to_string(),
                            r.cron.as_deref().unwrap_or("-"),
                            r.manifest_uri
                        )
                    })
                    .collect()
            })
        }
        Commands::Deployments => {
            let now = Utc::now();

            #[derive(Serialize)]
            struct Listed {
                name: String,
                slug: String,
                flow: String,
                cron: Option<String>,
                next_run: Option<String>,
                sha256: String,
            }
            let mut listed = Vec::new();
            for manifest in list_registered(&ctx.config.state_dir)? {
                listed.push(Listed {
                    next_run: manifest.next_run(now)?.map(|t| t.to_rfc3339()),
                    name: manifest.deployment.name.clone(),
                    slug: manifest.slug.clone(),
                    flow: manifest.deployment.flow.to_string(),
                    cron: manifest.deployment.schedule.as_ref().map(|s| s.cron.clone()),
                    sha256: manifest.sha256.clone(),
                });
            }
            ctx.emit(&listed, || {
                if listed.is_empty() {
                    return "no deployments registered\n".to_string();
                }
                listed
                    .iter()
                    .map(|d| {
                        format!(
                            "{:<24} {:<16} {:<12} {}\n",
                            d.name,
                            d.flow,
                            d.cron.as_deref().unwrap_or("-"),
                            d.next_run.as_deref().unwrap_or("-")
                        )
                    })
                    .collect()
            })
        }
        Commands::Config { command } => match command {
            ConfigCommand::Show => {
                let snapshot = ConfigSnapshot::capture(&ctx.config, &ctx.origin)?;
                #[derive(Serialize)]
                struct Shown<'a> {
                    snapshot: &'a ConfigSnapshot,
                    config: &'a PipelineConfig,
                }
                let toml = ctx
                    .config
                    .to_toml_string()
                    .map_err(|e| Error::Config(e.to_string()))?;
                ctx.emit(
                    &Shown {
                        snapshot: &snapshot,
                        config: &ctx.config,
                    },
                    || {
                        format!(
                            "# origin: {}\n# hash: {}\n{toml}",
                            snapshot.origin, snapshot.config_hash
                        )
                    },
                )
            }
            ConfigCommand::Validate => {
                let result = validate(&ctx.config, ctx.current_year);
                ctx.emit(&result, || {
                    if result.is_ok() {
                        "configuration is valid\n".to_string()
                    } else {
                        result.errors.iter().map(|e| format!("{e}\n")).collect()
                    }
                })?;
                result.into_result()?;
                Ok(())
            }
        },
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: u32,
    category: &'a str,
    message: String,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    match run(&cli) {
        Ok(()) => ExitCode::Clean.into(),
        Err(err) => {
            let code = ExitCode::for_error(&err);
            error!(code = err.code(), category = err.category(), "{err}");
            let envelope = ErrorEnvelope {
                error: ErrorBody {
                    code: err.code(),
                    category: err.category(),
                    message: err.to_string(),
                },
            };
            match (cli.format, serde_json::to_string_pretty(&envelope)) {
                (OutputFormat::Json, Ok(json)) => println!("{json}"),
                _ => eprintln!("error: {err}"),
            }
            code.into()
        }
    }
}
