//! BigQuery over the `jobs.query` REST endpoint.

use ccp_lake::TokenSource;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{Statement, Warehouse, WarehouseError};

/// Public BigQuery endpoint.
pub const BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

const QUERY_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    location: &'a str,
    timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    /// Warnings and non-fatal errors met while running; a failed job is
    /// reported through `status.errorResult` or an HTTP error instead.
    #[serde(default)]
    errors: Vec<ErrorProto>,
    status: Option<JobStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorProto,
}

/// Warehouse client for one project.
pub struct BigQueryWarehouse {
    project: String,
    location: String,
    endpoint: String,
    token: Box<dyn TokenSource>,
    agent: ureq::Agent,
    max_wait: Duration,
}

impl BigQueryWarehouse {
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        token: Box<dyn TokenSource>,
    ) -> Result<Self, WarehouseError> {
        let project = project.into();
        if project.is_empty() {
            return Err(WarehouseError::NotConfigured(
                "a project id is required to run queries".to_string(),
            ));
        }
        Ok(Self {
            project,
            location: location.into(),
            endpoint: BIGQUERY_ENDPOINT.to_string(),
            token,
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(120))
                .build(),
            max_wait: Duration::from_secs(600),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    fn queries_url(&self) -> String {
        format!("{}/projects/{}/queries", self.endpoint, self.project)
    }

    fn results_url(&self, job: &JobReference) -> String {
        let location = job.location.as_deref().unwrap_or(&self.location);
        format!(
            "{}/projects/{}/queries/{}?location={}&timeoutMs={QUERY_TIMEOUT_MS}&maxResults=0",
            self.endpoint,
            self.project,
            urlencoding::encode(&job.job_id),
            urlencoding::encode(location)
        )
    }

    fn fail(statement: &Statement, message: impl Into<String>) -> WarehouseError {
        WarehouseError::Statement {
            statement: statement.sql.clone(),
            message: message.into(),
        }
    }

    /// Fail on the job's final error; log anything else it reported.
    fn check(statement: &Statement, response: &QueryResponse) -> Result<(), WarehouseError> {
        let failure = response.status.as_ref().and_then(|s| s.error_result.as_ref());
        if let Some(error) = failure {
            return Err(Self::fail(statement, error.message.clone()));
        }
        for entry in &response.errors {
            warn!(
                table = %statement.target,
                reason = %entry.reason,
                "warehouse reported: {}",
                entry.message
            );
        }
        Ok(())
    }

    fn decode(
        statement: &Statement,
        url: &str,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<QueryResponse, WarehouseError> {
        match result {
            Ok(response) => response
                .into_json::<QueryResponse>()
                .map_err(|e| WarehouseError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                }),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                let message = serde_json::from_str::<ErrorEnvelope>(&body)
                    .map(|env| env.error.message)
                    .unwrap_or(body);
                Err(Self::fail(statement, format!("HTTP {status}: {message}")))
            }
            Err(ureq::Error::Transport(t)) => Err(WarehouseError::Request {
                url: url.to_string(),
                reason: t.to_string(),
            }),
        }
    }
}

impl Warehouse for BigQueryWarehouse {
    fn execute(&self, statement: &Statement) -> Result<(), WarehouseError> {
        let started = Instant::now();
        let url = self.queries_url();
        let bearer = format!("Bearer {}", self.token.token()?);
        let request = QueryRequest {
            query: &statement.sql,
            use_legacy_sql: false,
            location: &self.location,
            timeout_ms: QUERY_TIMEOUT_MS,
        };
        let result = self
            .agent
            .post(&url)
            .set("Authorization", &bearer)
            .send_json(&request);
        let mut response = Self::decode(statement, &url, result)?;

        while !response.job_complete {
            let job = response
                .job_reference
                .ok_or_else(|| Self::fail(statement, "incomplete job without a job reference"))?;
            if started.elapsed() > self.max_wait {
                return Err(WarehouseError::Timeout {
                    job_id: job.job_id,
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            let poll_url = self.results_url(&job);
            debug!(job_id = %job.job_id, "waiting for query job");
            let result = self
                .agent
                .get(&poll_url)
                .set("Authorization", &bearer)
                .call();
            response = Self::decode(statement, &poll_url, result)?;
        }

        Self::check(statement, &response)?;
        debug!(
            table = %statement.target,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "statement done"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{StatementKind, TableRef};
    use ccp_lake::StaticToken;

    fn warehouse() -> BigQueryWarehouse {
        BigQueryWarehouse::new("proj", "europe-west6", Box::new(StaticToken("t".into()))).unwrap()
    }

    #[test]
    fn requires_project() {
        assert!(matches!(
            BigQueryWarehouse::new("", "EU", Box::new(StaticToken("t".into()))),
            Err(WarehouseError::NotConfigured(_))
        ));
    }

    #[test]
    fn urls() {
        let wh = warehouse();
        assert_eq!(
            wh.queries_url(),
            "https://bigquery.googleapis.com/bigquery/v2/projects/proj/queries"
        );
        let job = JobReference {
            job_id: "job_1".into(),
            location: None,
        };
        assert!(wh.results_url(&job).starts_with(
            "https://bigquery.googleapis.com/bigquery/v2/projects/proj/queries/job_1\
             ?location=europe-west6"
        ));
    }

    #[test]
    fn request_body_uses_standard_sql() {
        let body = serde_json::to_value(QueryRequest {
            query: "SELECT 1",
            use_legacy_sql: false,
            location: "EU",
            timeout_ms: 5,
        })
        .unwrap();
        assert_eq!(body["useLegacySql"], false);
        assert_eq!(body["timeoutMs"], 5);
    }

    #[test]
    fn response_parsing_tolerates_missing_fields() {
        let resp: QueryResponse = serde_json::from_str(
            r#"{"kind":"bigquery#queryResponse","jobComplete":true,
                "jobReference":{"projectId":"p","jobId":"j","location":"EU"}}"#,
        )
        .unwrap();
        assert!(resp.job_complete);
        assert!(resp.errors.is_empty());
        assert_eq!(resp.job_reference.unwrap().job_id, "j");
    }

    fn statement() -> Statement {
        Statement {
            kind: StatementKind::ManagedTable,
            target: TableRef::new("proj", "chicago", "crimes"),
            sql: "CREATE OR REPLACE TABLE `proj.chicago.crimes` AS SELECT 1".into(),
        }
    }

    #[test]
    fn completed_job_with_warnings_succeeds() {
        let resp: QueryResponse = serde_json::from_str(
            r#"{"jobComplete":true,
                "jobReference":{"projectId":"p","jobId":"j"},
                "errors":[{"reason":"invalid","message":"Skipped 1 malformed row"}]}"#,
        )
        .unwrap();
        assert_eq!(resp.errors.len(), 1);
        BigQueryWarehouse::check(&statement(), &resp).unwrap();
    }

    #[test]
    fn error_result_fails_with_statement() {
        let resp: QueryResponse = serde_json::from_str(
            r#"{"jobComplete":true,
                "status":{"state":"DONE","errorResult":{"reason":"notFound","message":"Not found: Table"}},
                "errors":[{"reason":"notFound","message":"Not found: Table"}]}"#,
        )
        .unwrap();
        match BigQueryWarehouse::check(&statement(), &resp) {
            Err(WarehouseError::Statement { statement, message }) => {
                assert_eq!(message, "Not found: Table");
                assert!(statement.starts_with("CREATE OR REPLACE TABLE"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
