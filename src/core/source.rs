//! Byte sources a download can read from.
//!
//! [`DefaultSource`] speaks HTTP(S) through a blocking `reqwest` client and
//! also accepts `file://` URLs. Tests substitute their own [`ByteSource`].

use std::fs::File;
use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;
use tracing::debug;

use crate::error::{FetchError, FetchzipError, Result};

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// An opened source: its advertised length, if any, and the body.
pub struct SourceStream {
    pub content_length: Option<u64>,
    pub reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Opens a connection to a source address.
pub trait ByteSource: Send + Sync {
    fn open(&self, address: &str) -> std::result::Result<SourceStream, FetchError>;
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: default_user_agent(),
        }
    }
}

pub fn default_user_agent() -> String {
    format!("fetchzip/{}", env!("CARGO_PKG_VERSION"))
}

/// HTTP(S) and `file://` source.
#[derive(Debug)]
pub struct DefaultSource {
    client: Client,
    timeout: Duration,
}

impl DefaultSource {
    pub fn new(settings: &SourceSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| FetchzipError::HttpClient {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            timeout: settings.timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn open_http(&self, url: Url) -> std::result::Result<SourceStream, FetchError> {
        let address = url.to_string();
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::io(format!(
                    "request to {address} timed out after {}s",
                    self.timeout.as_secs()
                ))
            } else {
                FetchError::io(format!("request to {address} failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::io(format!(
                "GET {address} failed with status {status}"
            )));
        }

        let content_length = response.content_length();
        debug!(%address, ?content_length, "connection opened");
        Ok(SourceStream {
            content_length,
            reader: Box::new(response),
        })
    }

    fn open_file(&self, url: &Url) -> std::result::Result<SourceStream, FetchError> {
        let path = url
            .to_file_path()
            .map_err(|_| FetchError::io(format!("{url} is not a local file path")))?;
        let file = File::open(&path)
            .map_err(|e| FetchError::io(format!("cannot open {}: {e}", path.display())))?;
        let content_length = file.metadata().ok().map(|m| m.len());
        Ok(SourceStream {
            content_length,
            reader: Box::new(file),
        })
    }
}

impl ByteSource for DefaultSource {
    fn open(&self, address: &str) -> std::result::Result<SourceStream, FetchError> {
        let url = Url::parse(address)
            .map_err(|e| FetchError::io(format!("invalid source address '{address}': {e}")))?;

        match url.scheme() {
            "http" | "https" => self.open_http(url),
            "file" => self.open_file(&url),
            scheme => Err(FetchError::io(format!(
                "unsupported scheme '{scheme}' in '{address}'"
            ))),
        }
    }
}
