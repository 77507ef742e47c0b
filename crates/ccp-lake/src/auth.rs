//! OAuth bearer tokens for Google Cloud APIs outside object storage.

use object_store::gcp::GcpCredentialProvider;
use object_store::CredentialProvider;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::StorageError;
use crate::runtime::block_on;
use crate::storage::build_gcs;

/// Environment variable holding a pre-issued access token.
pub const ACCESS_TOKEN_ENV: &str = "GCP_ACCESS_TOKEN";

/// Supplies bearer tokens.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Result<String, StorageError>;
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn token(&self) -> Result<String, StorageError> {
        Ok(self.0.clone())
    }
}

/// Tokens from the same credential chain the GCS backend uses: the
/// service-account key when present, else application-default credentials.
/// The provider caches tokens until shortly before they expire.
pub struct GcpTokens {
    credentials: GcpCredentialProvider,
}

impl GcpTokens {
    pub fn new(bucket: &str, service_account_key: &Path) -> Result<Self, StorageError> {
        let gcs = build_gcs(bucket, service_account_key)?;
        Ok(Self {
            credentials: Arc::clone(gcs.credentials()),
        })
    }
}

impl TokenSource for GcpTokens {
    fn token(&self) -> Result<String, StorageError> {
        let credential = block_on(self.credentials.get_credential())??;
        debug!("obtained access token");
        Ok(credential.bearer.clone())
    }
}

/// `GCP_ACCESS_TOKEN` when set, otherwise [`GcpTokens`].
pub fn default_token_source(
    bucket: &str,
    service_account_key: &Path,
) -> Result<Box<dyn TokenSource>, StorageError> {
    match std::env::var(ACCESS_TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => {
            Ok(Box::new(StaticToken(token.trim().to_string())))
        }
        _ => Ok(Box::new(GcpTokens::new(bucket, service_account_key)?)),
    }
}
