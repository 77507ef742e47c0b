//! Source extraction from the Chicago open-data portal.
//!
//! Crimes are pulled once per calendar month, schools in a single call.
//! There is no retry: any transport, HTTP or CSV error fails the partition.

mod parse;
mod query;

pub use parse::parse_csv;
pub use query::{CrimesQuery, SchoolsQuery};

use ccp_common::{Partition, RawBatch};
use ccp_config::SourceConfig;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors while fetching or parsing source data.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },

    #[error("transport error fetching {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("malformed CSV from {url}: {source}")]
    Csv {
        url: String,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Partition(#[from] ccp_common::Error),
}

impl From<ExtractError> for ccp_common::Error {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Http { ref url, .. } | ExtractError::Transport { ref url, .. } => {
                ccp_common::Error::SourceUnavailable {
                    url: url.clone(),
                    reason: err.to_string(),
                }
            }
            ExtractError::Csv { .. } => ccp_common::Error::MalformedSource(err.to_string()),
            ExtractError::Partition(inner) => inner,
        }
    }
}

/// Fetches a response body for a URL.
pub trait DataSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ExtractError>;
}

/// Blocking HTTP source.
pub struct HttpSource {
    agent: ureq::Agent,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl DataSource for HttpSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ExtractError> {
        let response = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(status, response) => ExtractError::Http {
                url: url.to_string(),
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(t) => ExtractError::Transport {
                url: url.to_string(),
                reason: t.to_string(),
            },
        })?;

        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| ExtractError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        debug!(url, bytes = body.len(), "fetched source body");
        Ok(body)
    }
}

/// Canned responses keyed by URL substring; records every call.
///
/// Used for tests and offline runs.
#[derive(Debug, Default)]
pub struct FixtureSource {
    responses: BTreeMap<String, Vec<u8>>,
    fallback: Option<Vec<u8>>,
    calls: Mutex<Vec<String>>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `body` to URLs containing `pattern`.
    pub fn with_response(mut self, pattern: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(pattern.into(), body.into());
        self
    }

    /// Respond with `body` to any URL not matched otherwise.
    pub fn with_fallback(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.fallback = Some(body.into());
        self
    }

    /// URLs fetched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DataSource for FixtureSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ExtractError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        self.responses
            .iter()
            .find(|(pattern, _)| url.contains(pattern.as_str()))
            .map(|(_, body)| body.clone())
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| ExtractError::Http {
                url: url.to_string(),
                status: 404,
                body: "no fixture".to_string(),
            })
    }
}

/// Builds query URLs and turns responses into raw batches.
pub struct Extractor<'a> {
    source: &'a dyn DataSource,
    config: &'a SourceConfig,
}

impl<'a> Extractor<'a> {
    pub fn new(source: &'a dyn DataSource, config: &'a SourceConfig) -> Self {
        Self { source, config }
    }

    /// Fetch and parse one URL.
    pub fn fetch(&self, url: &str) -> Result<RawBatch, ExtractError> {
        let body = self.source.fetch(url)?;
        parse_csv(&body).map_err(|source| ExtractError::Csv {
            url: url.to_string(),
            source,
        })
    }

    /// One month of crimes.
    pub fn crimes(&self, partition: Partition) -> Result<RawBatch, ExtractError> {
        let url =
            CrimesQuery::for_partition(&self.config.crimes_url, self.config.row_limit, partition)?;
        let batch = self.fetch(&url)?;
        info!(partition = %partition, rows = batch.len(), "extracted crimes");
        Ok(batch)
    }

    /// The full schools dataset.
    pub fn schools(&self) -> Result<RawBatch, ExtractError> {
        let url = SchoolsQuery::url(&self.config.schools_url, self.config.row_limit);
        let batch = self.fetch(&url)?;
        info!(rows = batch.len(), "extracted schools");
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extractor_builds_month_urls() {
        let source = FixtureSource::new().with_fallback("id,latitude\n1,41.8\n");
        let config = SourceConfig::default();
        let extractor = Extractor::new(&source, &config);

        let batch = extractor.crimes(Partition::month(2021, 6).unwrap()).unwrap();
        assert_eq!(batch.len(), 1);

        let calls = source.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with(&config.crimes_url));
        assert!(calls[0].contains("2021-06-30T23:59:59"));
    }

    #[test]
    fn missing_fixture_is_http_error() {
        let source = FixtureSource::new();
        let config = SourceConfig::default();
        let err = Extractor::new(&source, &config).schools().unwrap_err();
        assert!(matches!(err, ExtractError::Http { status: 404, .. }));

        let common: ccp_common::Error = err.into();
        assert_eq!(common.category(), "extract");
    }

    #[test]
    fn malformed_csv_is_csv_error() {
        let source = FixtureSource::new().with_fallback("a,b\n1,2,3\n");
        let config = SourceConfig::default();
        let err = Extractor::new(&source, &config).schools().unwrap_err();
        assert!(matches!(err, ExtractError::Csv { .. }));
        assert_eq!(ccp_common::Error::from(err).code(), 21);
    }
}
