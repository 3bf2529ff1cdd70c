//! Object locations.

use std::fmt;

use url::Url;

use crate::error::{StorageError, StorageResult};

/// Bucket and key of an object, parsed from `s3://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    /// Parse an object URL. Percent-encoded key characters are decoded.
    ///
    /// `https://bucket.s3.amazonaws.com/key` style URLs are not accepted.
    pub fn parse(input: &str) -> StorageResult<Self> {
        let url = Url::parse(input)
            .map_err(|e| StorageError::invalid_location(format!("{input}: {e}")))?;

        if url.scheme() != "s3" {
            return Err(StorageError::invalid_location(format!(
                "{input}: expected s3:// scheme"
            )));
        }

        let bucket = url
            .host_str()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| StorageError::invalid_location(format!("{input}: missing bucket")))?
            .to_string();

        let path = url.path().trim_start_matches('/');
        let key = urlencoding::decode(path)
            .map_err(|e| StorageError::invalid_location(format!("{input}: {e}")))?
            .into_owned();
        if key.is_empty() {
            return Err(StorageError::invalid_location(format!("{input}: missing key")));
        }

        Ok(Self { bucket, key })
    }
}

impl fmt::Display for S3Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
