//! Local dbt runs.

use ccp_config::PipelineConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use super::{
    render_command, CommandRunner, StageOutcome, TransformError, TransformReport, Transformer,
};

/// Models built in order: staging first, then the analytics table.
pub const DEFAULT_STAGES: &[&str] = &["stg_street_crimes", "crimes_around_schools"];

const PROFILE_NAME: &str = "default";
const TARGET_NAME: &str = "dev";

/// BigQuery output of a dbt profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbtProfile {
    #[serde(rename = "type")]
    pub kind: String,
    pub method: String,
    pub project: String,
    pub dataset: String,
    pub location: String,
    pub threads: u32,
    pub keyfile: PathBuf,
}

#[derive(Serialize)]
struct ProfileTarget<'a> {
    target: &'a str,
    outputs: BTreeMap<&'a str, &'a DbtProfile>,
}

impl DbtProfile {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            kind: "bigquery".to_string(),
            method: "service-account".to_string(),
            project: config.gcp.project_id.clone(),
            dataset: config.warehouse.prod_dataset.clone(),
            location: config.warehouse.location.clone(),
            threads: 1,
            keyfile: config.gcp.service_account_key.clone(),
        }
    }

    /// `profiles.yml` contents.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        let mut outputs = BTreeMap::new();
        outputs.insert(TARGET_NAME, self);
        let mut doc = BTreeMap::new();
        doc.insert(
            PROFILE_NAME,
            ProfileTarget {
                target: TARGET_NAME,
                outputs,
            },
        );
        serde_yaml::to_string(&doc)
    }
}

/// dbt run through the local executable.
pub struct DbtCli<'a> {
    runner: &'a dyn CommandRunner,
    executable: String,
    project_dir: PathBuf,
    profiles_dir: PathBuf,
    profile: DbtProfile,
    stages: Vec<String>,
}

impl<'a> DbtCli<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &PipelineConfig) -> Self {
        Self {
            runner,
            executable: config.dbt.executable.clone(),
            project_dir: config.dbt.project_dir.clone(),
            profiles_dir: config.dbt.profiles_dir.clone(),
            profile: DbtProfile::from_config(config),
            stages: DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Write `profiles.yml` into the profiles directory.
    pub fn write_profile(&self) -> Result<PathBuf, TransformError> {
        let path = self.profiles_dir.join("profiles.yml");
        let profile_err = |reason: String| TransformError::Profile {
            path: path.clone(),
            reason,
        };
        let yaml = self.profile.to_yaml().map_err(|e| profile_err(e.to_string()))?;
        fs::create_dir_all(&self.profiles_dir).map_err(|e| profile_err(e.to_string()))?;
        fs::write(&path, yaml).map_err(|e| profile_err(e.to_string()))?;
        info!(path = %path.display(), "wrote dbt profile");
        Ok(path)
    }

    fn dir_args(&self) -> Vec<String> {
        vec![
            "--project-dir".to_string(),
            self.project_dir.display().to_string(),
            "--profiles-dir".to_string(),
            self.profiles_dir.display().to_string(),
        ]
    }

    /// Argument lists for one stage: deps, debug, list, build.
    pub fn stage_commands(&self, model: &str) -> Vec<Vec<String>> {
        let with_dirs = |head: &[&str]| {
            head.iter()
                .map(|s| s.to_string())
                .chain(self.dir_args())
                .collect::<Vec<_>>()
        };
        vec![
            with_dirs(&["deps"]),
            with_dirs(&["debug"]),
            with_dirs(&["list"]),
            with_dirs(&["build", "--select", model]),
        ]
    }

    fn run_stage(&self, model: &str) -> Result<StageOutcome, TransformError> {
        let started = Instant::now();
        let mut commands = Vec::new();
        for args in self.stage_commands(model) {
            let line = render_command(&self.executable, &args);
            let output = self.runner.run(&self.executable, &args)?;
            if output.status != 0 {
                return Err(TransformError::CommandFailed {
                    command: line,
                    status: output.status,
                    stderr: output.stderr.trim().to_string(),
                });
            }
            commands.push(line);
        }
        info!(model, "dbt stage complete");
        Ok(StageOutcome {
            model: model.to_string(),
            commands,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

impl Transformer for DbtCli<'_> {
    fn run(&self) -> Result<TransformReport, TransformError> {
        let profile = self.write_profile()?;
        let stages = self
            .stages
            .iter()
            .map(|model| self.run_stage(model))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TransformReport::Cli { profile, stages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::RecordingRunner;
    use std::path::Path;
    use tempfile::tempdir;

    fn config(profiles: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.gcp.project_id = "chicago-project".into();
        config.dbt.profiles_dir = profiles.to_path_buf();
        config.dbt.project_dir = PathBuf::from("dbt");
        config
    }

    #[test]
    fn profile_yaml_shape() {
        let dir = tempdir().unwrap();
        let yaml = DbtProfile::from_config(&config(dir.path())).to_yaml().unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let dev = &value["default"]["outputs"]["dev"];
        assert_eq!(value["default"]["target"], "dev");
        assert_eq!(dev["type"], "bigquery");
        assert_eq!(dev["method"], "service-account");
        assert_eq!(dev["project"], "chicago-project");
        assert_eq!(dev["dataset"], "chicago_prod");
        assert_eq!(dev["location"], "europe-west6");
        assert_eq!(dev["threads"], 1);
        assert_eq!(dev["keyfile"], "keys/gcp-service-account.json");
    }

    #[test]
    fn runs_both_stages_in_order() {
        let dir = tempdir().unwrap();
        let runner = RecordingRunner::new();
        let cli = DbtCli::new(&runner, &config(dir.path()));

        let report = cli.run().unwrap();
        assert!(dir.path().join("profiles.yml").exists());

        let calls = runner.calls();
        assert_eq!(calls.len(), 8);
        assert!(calls[0].starts_with("dbt deps --project-dir dbt --profiles-dir"));
        assert!(calls[3].starts_with("dbt build --select stg_street_crimes"));
        assert!(calls[7].starts_with("dbt build --select crimes_around_schools"));

        match report {
            TransformReport::Cli { stages, .. } => {
                assert_eq!(stages.len(), 2);
                assert_eq!(stages[1].model, "crimes_around_schools");
            }
            other => panic!("unexpected report {other:?}"),
        }
    }

    #[test]
    fn project_location_comes_from_flags() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.dbt.project_dir = dir.path().join("analytics");
        let runner = RecordingRunner::new();
        DbtCli::new(&runner, &config).run().unwrap();

        let project = format!("--project-dir {}", dir.path().join("analytics").display());
        let profiles = format!("--profiles-dir {}", dir.path().display());
        for call in runner.calls() {
            assert!(call.contains(&project), "{call}");
            assert!(call.contains(&profiles), "{call}");
        }
    }

    #[test]
    fn failing_command_stops_the_run() {
        let dir = tempdir().unwrap();
        let runner = RecordingRunner::failing_on("debug");
        let err = DbtCli::new(&runner, &config(dir.path())).run().unwrap_err();
        assert!(matches!(err, TransformError::CommandFailed { status: 1, .. }));
        assert_eq!(runner.calls().len(), 2);
    }
}
