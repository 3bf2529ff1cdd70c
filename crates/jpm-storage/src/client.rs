//! S3 client and URL signing.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::location::S3Location;

/// Lifetime of signed input URLs unless configured otherwise.
pub const DEFAULT_SIGNED_URL_EXPIRATION: Duration = Duration::from_secs(300);

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    /// Custom endpoint (MinIO, LocalStack); path-style addressing when set
    pub endpoint_url: Option<String>,
    /// Lifetime of presigned URLs
    pub url_expiration: Duration,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint_url: None,
            url_expiration: DEFAULT_SIGNED_URL_EXPIRATION,
        }
    }
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let url_expiration = match std::env::var("SIGNED_URL_EXPIRATION_SECS") {
            Ok(v) => Duration::from_secs(v.parse().map_err(|_| {
                StorageError::config_error(format!("SIGNED_URL_EXPIRATION_SECS is not a number: {v}"))
            })?),
            Err(_) => DEFAULT_SIGNED_URL_EXPIRATION,
        };

        Ok(Self {
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty()),
            url_expiration,
        })
    }
}

/// Grants temporary read access to an object by URL.
#[async_trait]
pub trait ObjectUrlSigner: Send + Sync {
    /// Signed GET URL for `location`, valid for `expires_in`.
    async fn signed_url(&self, location: &S3Location, expires_in: Duration) -> StorageResult<String>;
}

/// S3 client.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    url_expiration: Duration,
}

impl S3Client {
    /// Create a client using the default credential chain.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self::from_client(Client::from_conf(builder.build()), config.url_expiration))
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = S3Config::from_env()?;
        Self::new(config).await
    }

    pub fn from_client(client: Client, url_expiration: Duration) -> Self {
        Self {
            client,
            url_expiration,
        }
    }

    /// Configured lifetime of presigned URLs.
    pub fn url_expiration(&self) -> Duration {
        self.url_expiration
    }

    /// Generate a presigned URL for GET.
    pub async fn presign_get(&self, location: &S3Location, expires_in: Duration) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::presign_failed(format!("{location}: {e}")))?;

        debug!(bucket = %location.bucket, key = %location.key, "Presigned input URL");
        Ok(presigned.uri().to_string())
    }
}

#[async_trait]
impl ObjectUrlSigner for S3Client {
    async fn signed_url(&self, location: &S3Location, expires_in: Duration) -> StorageResult<String> {
        self.presign_get(location, expires_in).await
    }
}
