//! Outbound HTTP probing.

use crate::types::CheckProtocol;
use async_trait::async_trait;
use common::{Error, Result};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::debug;

/// Default transport timeout for probes and alerts
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure of a single GET
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("received a {code} status code for {url}")]
    Status { url: String, code: u16 },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },
}

/// Capability to issue a GET and report whether it answered 200
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    /// GET `url`; any outcome other than a 200 response is an error
    async fn get(&self, url: &str) -> std::result::Result<(), ProbeError>;
}

/// Prober backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Create a prober whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::check)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn get(&self, url: &str) -> std::result::Result<(), ProbeError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout {
                    url: url.to_string(),
                }
            } else {
                ProbeError::Request {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ProbeError::Status {
                url: url.to_string(),
                code: status.as_u16(),
            });
        }

        debug!(url, "GET succeeded");
        Ok(())
    }
}

/// Build `<protocol>://<hostname>/<path>`.
///
/// Leading slashes of `path` collapse into one; a trailing slash is kept.
pub fn probe_url(protocol: CheckProtocol, hostname: &str, path: &str) -> Result<Url> {
    if hostname.is_empty() {
        return Err(Error::check("empty hostname"));
    }

    let mut url = Url::parse(&format!("{protocol}://{hostname}"))
        .map_err(|e| Error::check(format!("invalid hostname {hostname:?}: {e}")))?;
    if url.host_str().is_none_or(str::is_empty) || url.path() != "/" || url.query().is_some() {
        return Err(Error::check(format!("invalid hostname {hostname:?}")));
    }

    url.set_path(&format!("/{}", path.trim_start_matches('/')));
    Ok(url)
}
