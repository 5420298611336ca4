//! Blocking HTTP client that posts report bytes to a collection endpoint.

use crate::utils::config::DEFAULT_UPLOAD_TIMEOUT;
use crate::utils::error::UploadError;
use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::time::Duration;

/// Query parameter carrying the session id
const SESSION_PARAM: &str = "session";

/// Client for uploading reports
#[derive(Debug, Clone)]
pub struct UploadClient {
    client: Client,
    url: Url,
}

impl UploadClient {
    /// Create a client for `url` with the default timeout
    ///
    /// # Errors
    /// * `UploadError::InvalidUrl` - not an http(s) URL
    /// * `UploadError::RequestFailed` - the HTTP client could not be built
    pub fn new(url: &str) -> Result<Self, UploadError> {
        Self::with_timeout(url, DEFAULT_UPLOAD_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self, UploadError> {
        let url = Url::parse(url).map_err(|e| UploadError::InvalidUrl(format!("{}: {}", url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UploadError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                url
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// POST one report
    ///
    /// **Public** - called after a session's artifacts are written
    ///
    /// # Errors
    /// * `UploadError::RequestFailed` - connection or timeout failure
    /// * `UploadError::Rejected` - the endpoint answered with a non-success status
    pub fn upload(&self, session_id: &str, report: &[u8]) -> Result<(), UploadError> {
        info!("Uploading report {} to {}", session_id, self.url);

        let response = self
            .client
            .post(self.url.clone())
            .query(&[(SESSION_PARAM, session_id)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(report.to_vec())
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected(format!(
                "HTTP {}: {}",
                status,
                response.text().unwrap_or_default()
            )));
        }

        debug!("Upload of {} accepted ({})", session_id, status);
        Ok(())
    }
}
