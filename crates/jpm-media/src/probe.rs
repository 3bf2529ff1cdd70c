//! Media probing through the `mediainfo` CLI.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use jpm_storage::{ObjectUrlSigner, S3Location};

use crate::error::{MediaError, MediaResult};
use crate::mediainfo::{parse_mediainfo_xml, TechnicalMetadata};

/// Extracts technical metadata from a job input.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Probe one input, identified by its object URL (`s3://bucket/key`).
    async fn probe(&self, file_input: &str) -> MediaResult<TechnicalMetadata>;
}

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Path or name of the mediainfo binary
    pub mediainfo_path: String,
    /// Lifetime of the signed URL handed to mediainfo
    pub url_expiration: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            mediainfo_path: "mediainfo".to_string(),
            url_expiration: Duration::from_secs(300),
        }
    }
}

impl ProbeConfig {
    /// Create config from environment variables.
    pub fn from_env(url_expiration: Duration) -> Self {
        Self {
            mediainfo_path: std::env::var("MEDIAINFO_PATH")
                .unwrap_or_else(|_| "mediainfo".to_string()),
            url_expiration,
        }
    }
}

/// Runs `mediainfo --Full --Output=XML` against a signed URL of the input.
pub struct MediainfoProbe {
    signer: Arc<dyn ObjectUrlSigner>,
    binary: PathBuf,
    url_expiration: Duration,
}

impl MediainfoProbe {
    /// Resolve the mediainfo binary and build the probe.
    pub fn new(signer: Arc<dyn ObjectUrlSigner>, config: ProbeConfig) -> MediaResult<Self> {
        let binary = which::which(&config.mediainfo_path)
            .map_err(|e| MediaError::MediainfoNotFound(format!("{}: {e}", config.mediainfo_path)))?;

        Ok(Self {
            signer,
            binary,
            url_expiration: config.url_expiration,
        })
    }

    async fn run(&self, url: &str) -> MediaResult<String> {
        let output = Command::new(&self.binary)
            .args(["--Full", "--Output=XML"])
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::probe_failed(
                format!("mediainfo exited with {}", output.status),
                Some(String::from_utf8_lossy(&output.stderr).into_owned()),
                output.status.code(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MediaProbe for MediainfoProbe {
    async fn probe(&self, file_input: &str) -> MediaResult<TechnicalMetadata> {
        let location = S3Location::parse(file_input)?;
        let url = self.signer.signed_url(&location, self.url_expiration).await?;

        let start = Instant::now();
        let result = self
            .run(&url)
            .await
            .and_then(|xml| parse_mediainfo_xml(&xml));
        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::histogram!("jpm_probe_duration_seconds", "outcome" => outcome)
            .record(start.elapsed().as_secs_f64());

        match &result {
            Ok(meta) => debug!(
                input = %location,
                frame_rate = meta.frame_rate,
                frame_count = meta.frame_count,
                "Probed input"
            ),
            Err(e) => warn!(input = %location, error = %e, "Probe failed"),
        }
        result
    }
}
