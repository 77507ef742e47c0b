//! Deployment registration.
//!
//! A deployment names a flow, its parameters and an optional UTC cron
//! trigger. Registering writes a manifest to the deployment bucket under
//! `deployments/<slug>.json` and to the local registry under
//! `<state_dir>/deployments/`.

use ccp_config::PipelineConfig;
use ccp_common::fs::write_atomic;
use ccp_lake::{LakeStore, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::logging::LOG_ENV_VAR;

/// Object prefix for manifests in the deployment bucket.
pub const MANIFEST_PREFIX: &str = "deployments/";

const REGISTRY_DIR: &str = "deployments";
const MANIFEST_VERSION: &str = "1.0.0";

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("unsupported timezone '{0}' (schedules run in UTC)")]
    Timezone(String),

    #[error("deployment name '{0}' has no usable characters")]
    InvalidName(String),

    #[error("manifest for '{name}' failed its integrity check")]
    Integrity { name: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<DeployError> for ccp_common::Error {
    fn from(err: DeployError) -> Self {
        match err {
            DeployError::Storage(inner) => inner.into(),
            other => ccp_common::Error::Deploy(other.to_string()),
        }
    }
}

/// A cron trigger evaluated in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSchedule {
    pub cron: String,
    pub timezone: String,
}

impl CronSchedule {
    /// Five-field (`min hour dom mon dow`) or six-field (with seconds) cron.
    pub fn new(cron: impl Into<String>) -> Result<Self, DeployError> {
        let schedule = Self {
            cron: cron.into(),
            timezone: "UTC".to_string(),
        };
        schedule.parse()?;
        Ok(schedule)
    }

    fn parse(&self) -> Result<cron::Schedule, DeployError> {
        if self.timezone != "UTC" {
            return Err(DeployError::Timezone(self.timezone.clone()));
        }
        let fields = self.cron.split_whitespace().count();
        let expression = if fields == 5 {
            format!("0 {}", self.cron.trim())
        } else {
            self.cron.trim().to_string()
        };
        cron::Schedule::from_str(&expression).map_err(|e| DeployError::InvalidCron {
            expression: self.cron.clone(),
            reason: e.to_string(),
        })
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, DeployError> {
        Ok(self.parse()?.after(&after).next())
    }
}

/// Flows that can be deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowKind {
    Deploy,
    ExtractCrimes,
    ExtractSchools,
    Load,
    Transform,
    TransformCloud,
    Run,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowKind::Deploy => "deploy",
            FlowKind::ExtractCrimes => "extract-crimes",
            FlowKind::ExtractSchools => "extract-schools",
            FlowKind::Load => "load",
            FlowKind::Transform => "transform",
            FlowKind::TransformCloud => "transform-cloud",
            FlowKind::Run => "run",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub flow: FlowKind,
    pub parameters: BTreeMap<String, Value>,
    pub schedule: Option<CronSchedule>,
    pub work_queue: String,
    /// Environment overrides for the flow's process.
    pub env: BTreeMap<String, String>,
    /// Where the packaged deployment lives.
    pub storage: String,
}

impl Deployment {
    /// File-safe form of the name: lowercase ASCII words joined by `-`.
    pub fn slug(&self) -> Result<String, DeployError> {
        slugify(&self.name).ok_or_else(|| DeployError::InvalidName(self.name.clone()))
    }

    /// SHA-256 of the deployment's canonical JSON.
    pub fn digest(&self) -> Result<String, DeployError> {
        let body = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&body)))
    }
}

fn slugify(name: &str) -> Option<String> {
    let slug = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    (!slug.is_empty()).then_some(slug)
}

/// Stored form of a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub manifest_version: String,
    pub slug: String,
    pub registered_at: DateTime<Utc>,
    pub sha256: String,
    pub deployment: Deployment,
}

impl DeploymentManifest {
    pub fn new(deployment: Deployment) -> Result<Self, DeployError> {
        if let Some(schedule) = &deployment.schedule {
            schedule.parse()?;
        }
        Ok(Self {
            manifest_version: MANIFEST_VERSION.to_string(),
            slug: deployment.slug()?,
            registered_at: Utc::now(),
            sha256: deployment.digest()?,
            deployment,
        })
    }

    pub fn verify(&self) -> Result<(), DeployError> {
        if self.deployment.digest()? != self.sha256 {
            return Err(DeployError::Integrity {
                name: self.deployment.name.clone(),
            });
        }
        Ok(())
    }

    /// Next fire time after `now`, if the deployment is scheduled.
    pub fn next_run(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, DeployError> {
        match &self.deployment.schedule {
            Some(schedule) => schedule.next_after(now),
            None => Ok(None),
        }
    }
}

/// Result of registering one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredDeployment {
    pub name: String,
    pub flow: FlowKind,
    pub cron: Option<String>,
    pub manifest_uri: String,
    pub local_path: PathBuf,
    pub sha256: String,
}

/// Writes manifests to the deployment bucket and the local registry.
pub struct Registrar<'a> {
    store: &'a LakeStore,
    registry_dir: PathBuf,
}

impl<'a> Registrar<'a> {
    pub fn new(store: &'a LakeStore, state_dir: &Path) -> Self {
        Self {
            store,
            registry_dir: state_dir.join(REGISTRY_DIR),
        }
    }

    /// Validate and store `deployment`, replacing any earlier manifest.
    pub fn register(&self, deployment: Deployment) -> Result<RegisteredDeployment, DeployError> {
        let manifest = DeploymentManifest::new(deployment)?;
        let json = serde_json::to_vec_pretty(&manifest)?;

        let object = format!("{MANIFEST_PREFIX}{}.json", manifest.slug);
        self.store.put(&object, &json, "application/json")?;
        let local_path = self.write_local(&manifest.slug, &json)?;

        let registered = RegisteredDeployment {
            name: manifest.deployment.name.clone(),
            flow: manifest.deployment.flow,
            cron: manifest.deployment.schedule.as_ref().map(|s| s.cron.clone()),
            manifest_uri: self.store.uri(&object),
            local_path,
            sha256: manifest.sha256,
        };
        info!(
            name = %registered.name,
            flow = %registered.flow,
            uri = %registered.manifest_uri,
            "registered deployment"
        );
        Ok(registered)
    }

    fn write_local(&self, slug: &str, json: &[u8]) -> Result<PathBuf, DeployError> {
        let path = self.registry_dir.join(format!("{slug}.json"));
        write_atomic(&path, json).map_err(io_error(&path))?;
        debug!(path = %path.display(), "wrote local manifest");
        Ok(path)
    }
}

/// Manifests in the local registry under `state_dir`, sorted by slug. Each
/// is integrity-checked.
pub fn list_registered(state_dir: &Path) -> Result<Vec<DeploymentManifest>, DeployError> {
    let registry_dir = state_dir.join(REGISTRY_DIR);
    if !registry_dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(&registry_dir).map_err(io_error(&registry_dir))?;
    let mut manifests = Vec::new();
    for entry in entries {
        let path = entry.map_err(io_error(&registry_dir))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let content = fs::read_to_string(&path).map_err(io_error(&path))?;
        let manifest: DeploymentManifest = serde_json::from_str(&content)?;
        manifest.verify()?;
        manifests.push(manifest);
    }
    manifests.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(manifests)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DeployError + '_ {
    move |source| DeployError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The deployments registered by `ccp deploy`.
pub fn default_deployments(
    config: &PipelineConfig,
    current_year: i32,
) -> Result<Vec<Deployment>, DeployError> {
    let env = BTreeMap::from([(LOG_ENV_VAR.to_string(), config.deploy.log_level.clone())]);
    let storage = format!("gs://{}/{MANIFEST_PREFIX}", config.deploy.bucket);
    let make = |name: &str, flow, parameters: BTreeMap<String, Value>, schedule| Deployment {
        name: name.to_string(),
        flow,
        parameters,
        schedule,
        work_queue: config.deploy.work_queue.clone(),
        env: env.clone(),
        storage: storage.clone(),
    };
    let years = |years: Vec<i32>| BTreeMap::from([("years".to_string(), Value::from(years))]);

    Ok(vec![
        make("deploy-flows", FlowKind::Deploy, BTreeMap::new(), None),
        make(
            "extracting all crimes",
            FlowKind::ExtractCrimes,
            years((config.source.start_year..=current_year).collect()),
            None,
        ),
        make(
            "extracting last crimes",
            FlowKind::ExtractCrimes,
            years(vec![current_year]),
            Some(CronSchedule::new("0 12 * * *")?),
        ),
        make(
            "extracting schools",
            FlowKind::ExtractSchools,
            BTreeMap::new(),
            Some(CronSchedule::new("0 0 1 * *")?),
        ),
        make("load data to BQ", FlowKind::Load, BTreeMap::new(), None),
        make("run dbt-cloud job", FlowKind::TransformCloud, BTreeMap::new(), None),
        make("run dbt", FlowKind::Transform, BTreeMap::new(), None),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn five_field_cron_is_accepted() {
        let schedule = CronSchedule::new("0 12 * * *").unwrap();
        assert_eq!(schedule.timezone, "UTC");

        let now = Utc.with_ymd_and_hms(2024, 3, 5, 13, 0, 0).unwrap();
        let next = schedule.next_after(now).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap());
    }

    #[test]
    fn monthly_schedule_fires_on_the_first() {
        let schedule = CronSchedule::new("0 0 1 * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 2, 10, 0, 0, 0).unwrap();
        let next = schedule.next_after(now).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn bad_cron_and_timezone_are_rejected() {
        assert!(matches!(
            CronSchedule::new("every day"),
            Err(DeployError::InvalidCron { .. })
        ));
        let schedule = CronSchedule {
            cron: "0 12 * * *".into(),
            timezone: "America/Chicago".into(),
        };
        assert!(matches!(
            schedule.next_after(Utc::now()),
            Err(DeployError::Timezone(_))
        ));
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("load data to BQ").as_deref(), Some("load-data-to-bq"));
        assert_eq!(slugify("run dbt-cloud job").as_deref(), Some("run-dbt-cloud-job"));
        assert_eq!(slugify(" -- "), None);
    }

    #[test]
    fn default_set() {
        let config = PipelineConfig::default();
        let deployments = default_deployments(&config, 2024).unwrap();
        assert_eq!(deployments.len(), 7);

        let all = &deployments[1];
        assert_eq!(all.parameters["years"].as_array().unwrap().len(), 24);
        let last = &deployments[2];
        assert_eq!(last.parameters["years"], serde_json::json!([2024]));
        assert_eq!(last.schedule.as_ref().unwrap().cron, "0 12 * * *");

        for d in &deployments {
            assert_eq!(d.work_queue, "default");
            assert_eq!(d.env["CCP_LOG"], "debug");
            assert_eq!(d.storage, "gs://chicago-crimes-dev/deployments/");
        }
    }

    #[test]
    fn register_writes_both_copies_and_replaces() {
        let tmp = TempDir::new().unwrap();
        let store = LakeStore::memory();
        let registrar = Registrar::new(&store, tmp.path());
        let config = PipelineConfig::default();

        for _ in 0..2 {
            for deployment in default_deployments(&config, 2024).unwrap() {
                registrar.register(deployment).unwrap();
            }
        }
        assert_eq!(store.list(MANIFEST_PREFIX).unwrap().len(), 7);
        assert!(store.get("deployments/extracting-schools.json").is_ok());

        let manifests = list_registered(tmp.path()).unwrap();
        assert_eq!(manifests.len(), 7);
        assert_eq!(manifests[0].slug, "deploy-flows");
    }

    #[test]
    fn tampered_manifest_fails_verification() {
        let deployment = default_deployments(&PipelineConfig::default(), 2024)
            .unwrap()
            .remove(0);
        let mut manifest = DeploymentManifest::new(deployment).unwrap();
        manifest.verify().unwrap();
        manifest.deployment.work_queue = "other".into();
        assert!(matches!(
            manifest.verify(),
            Err(DeployError::Integrity { .. })
        ));
    }
}
