//! Hosted dbt job runs.

use ccp_config::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{TransformError, TransformReport, Transformer};

/// State of a hosted job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Starting,
    Running,
    Success,
    Error,
    Cancelled,
    Unknown(i64),
}

impl RunStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => RunStatus::Queued,
            2 => RunStatus::Starting,
            3 => RunStatus::Running,
            10 => RunStatus::Success,
            20 => RunStatus::Error,
            30 => RunStatus::Cancelled,
            other => RunStatus::Unknown(other),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Error | RunStatus::Cancelled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Queued => write!(f, "queued"),
            RunStatus::Starting => write!(f, "starting"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Success => write!(f, "success"),
            RunStatus::Error => write!(f, "error"),
            RunStatus::Cancelled => write!(f, "cancelled"),
            RunStatus::Unknown(code) => write!(f, "unknown ({code})"),
        }
    }
}

/// Job-run API of the hosted service.
pub trait DbtCloudApi {
    /// Start a run of `job_id`; returns the run id.
    fn trigger(&self, job_id: &str, cause: &str) -> Result<u64, TransformError>;

    fn run_status(&self, run_id: u64) -> Result<RunStatus, TransformError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct RunData {
    id: u64,
    #[serde(default)]
    status: i64,
}

/// REST client for the hosted service's v2 API.
pub struct HttpDbtCloudApi {
    base: String,
    account_id: String,
    api_key: String,
    agent: ureq::Agent,
}

impl HttpDbtCloudApi {
    pub fn new(
        base: impl Into<String>,
        account_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            account_id: account_id.into(),
            api_key: api_key.into(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(60))
                .build(),
        }
    }

    /// Build a client from configuration, reading the API key from the
    /// configured environment variable.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, TransformError> {
        let account_id = config
            .dbt
            .account_id
            .clone()
            .ok_or_else(|| TransformError::MissingSetting("dbt.account_id".to_string()))?;
        let api_key = std::env::var(&config.dbt.api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| TransformError::MissingSetting(config.dbt.api_key_env.clone()))?;
        Ok(Self::new(&config.dbt.cloud_url, account_id, api_key))
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/api/v2/accounts/{}/{path}",
            self.base,
            urlencoding::encode(&self.account_id)
        )
    }

    fn decode(
        url: &str,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<RunData, TransformError> {
        let cloud_err = |reason: String| TransformError::Cloud {
            url: url.to_string(),
            reason,
        };
        match result {
            Ok(response) => response
                .into_json::<Envelope<RunData>>()
                .map(|env| env.data)
                .map_err(|e| cloud_err(e.to_string())),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(cloud_err(format!("HTTP {status}: {}", body.trim())))
            }
            Err(ureq::Error::Transport(t)) => Err(cloud_err(t.to_string())),
        }
    }
}

impl DbtCloudApi for HttpDbtCloudApi {
    fn trigger(&self, job_id: &str, cause: &str) -> Result<u64, TransformError> {
        let url = self.url(&format!("jobs/{}/run/", urlencoding::encode(job_id)));
        let result = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Token {}", self.api_key))
            .send_json(serde_json::json!({ "cause": cause }));
        Ok(Self::decode(&url, result)?.id)
    }

    fn run_status(&self, run_id: u64) -> Result<RunStatus, TransformError> {
        let url = self.url(&format!("runs/{run_id}/"));
        let result = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Token {}", self.api_key))
            .call();
        Ok(RunStatus::from_code(Self::decode(&url, result)?.status))
    }
}

/// Triggers a hosted job and waits for it to finish.
pub struct DbtCloud<'a> {
    api: &'a dyn DbtCloudApi,
    job_id: String,
    cause: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl<'a> DbtCloud<'a> {
    pub fn new(api: &'a dyn DbtCloudApi, job_id: impl Into<String>) -> Self {
        Self {
            api,
            job_id: job_id.into(),
            cause: "Triggered by chicago crimes pipeline".to_string(),
            poll_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(3600),
        }
    }

    pub fn from_config(
        api: &'a dyn DbtCloudApi,
        config: &PipelineConfig,
    ) -> Result<Self, TransformError> {
        let job_id = config
            .dbt
            .job_id
            .clone()
            .ok_or_else(|| TransformError::MissingSetting("dbt.job_id".to_string()))?;
        Ok(Self::new(api, job_id).with_timing(
            Duration::from_secs(config.dbt.poll_interval_secs),
            Duration::from_secs(config.dbt.max_wait_secs),
        ))
    }

    pub fn with_timing(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.max_wait = max_wait;
        self
    }
}

impl Transformer for DbtCloud<'_> {
    fn run(&self) -> Result<TransformReport, TransformError> {
        let started = Instant::now();
        let run_id = self.api.trigger(&self.job_id, &self.cause)?;
        info!(job_id = %self.job_id, run_id, "triggered dbt Cloud job");

        let mut polls = 0u32;
        loop {
            let status = self.api.run_status(run_id)?;
            polls += 1;
            debug!(run_id, %status, polls, "polled dbt Cloud run");
            match status {
                RunStatus::Success => {
                    info!(
                        run_id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "dbt Cloud run succeeded"
                    );
                    return Ok(TransformReport::Cloud {
                        job_id: self.job_id.clone(),
                        run_id,
                        status,
                        polls,
                    });
                }
                RunStatus::Error | RunStatus::Cancelled => {
                    warn!(run_id, %status, "dbt Cloud run failed");
                    return Err(TransformError::RunFailed { run_id, status });
                }
                _ => {}
            }
            if started.elapsed() >= self.max_wait {
                return Err(TransformError::Timeout {
                    run_id,
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct ScriptedApi {
        statuses: RefCell<VecDeque<i64>>,
        triggered: RefCell<Vec<String>>,
    }

    impl ScriptedApi {
        fn new(statuses: &[i64]) -> Self {
            Self {
                statuses: RefCell::new(statuses.iter().copied().collect()),
                triggered: RefCell::new(Vec::new()),
            }
        }
    }

    impl DbtCloudApi for ScriptedApi {
        fn trigger(&self, job_id: &str, _cause: &str) -> Result<u64, TransformError> {
            self.triggered.borrow_mut().push(job_id.to_string());
            Ok(42)
        }

        fn run_status(&self, _run_id: u64) -> Result<RunStatus, TransformError> {
            let code = self.statuses.borrow_mut().pop_front().unwrap_or(3);
            Ok(RunStatus::from_code(code))
        }
    }

    fn cloud(api: &ScriptedApi) -> DbtCloud<'_> {
        DbtCloud::new(api, "77").with_timing(Duration::ZERO, Duration::from_secs(5))
    }

    #[test]
    fn polls_until_success() {
        let api = ScriptedApi::new(&[1, 2, 3, 10]);
        let report = cloud(&api).run().unwrap();
        assert_eq!(
            report,
            TransformReport::Cloud {
                job_id: "77".into(),
                run_id: 42,
                status: RunStatus::Success,
                polls: 4,
            }
        );
        assert_eq!(api.triggered.borrow().as_slice(), ["77"]);
    }

    #[test]
    fn error_and_cancel_fail_the_run() {
        for code in [20, 30] {
            let api = ScriptedApi::new(&[3, code]);
            let err = cloud(&api).run().unwrap_err();
            assert!(matches!(err, TransformError::RunFailed { run_id: 42, .. }));
        }
    }

    #[test]
    fn gives_up_after_max_wait() {
        let api = ScriptedApi::new(&[]);
        let err = DbtCloud::new(&api, "77")
            .with_timing(Duration::ZERO, Duration::ZERO)
            .run()
            .unwrap_err();
        assert!(matches!(err, TransformError::Timeout { run_id: 42, .. }));
    }

    #[test]
    fn status_codes() {
        assert!(RunStatus::from_code(10).is_terminal());
        assert!(!RunStatus::from_code(3).is_terminal());
        assert_eq!(RunStatus::from_code(7), RunStatus::Unknown(7));
        assert_eq!(RunStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn job_and_account_are_required() {
        let config = PipelineConfig::default();
        let api = ScriptedApi::new(&[]);
        assert!(matches!(
            DbtCloud::from_config(&api, &config),
            Err(TransformError::MissingSetting(_))
        ));
        assert!(matches!(
            HttpDbtCloudApi::from_config(&config),
            Err(TransformError::MissingSetting(_))
        ));
    }

    #[test]
    fn api_urls() {
        let api = HttpDbtCloudApi::new("https://cloud.getdbt.com/", "12", "k");
        assert_eq!(
            api.url("jobs/5/run/"),
            "https://cloud.getdbt.com/api/v2/accounts/12/jobs/5/run/"
        );
    }
}
