//! Outbound HTTP access to the polled JSON endpoints.
//!
//! Exporters only see the [`JsonSource`] trait so that transport security,
//! timeouts and credentials stay a concern of the caller. [`ReqwestSource`]
//! is the production implementation.

use reqwest::{Certificate, Url};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default timeout for a single GET against the upstream.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Status and full body of an upstream response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to complete a GET, before any document processing.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("failed to read response body from {url}: {message}")]
    Body { url: String, message: String },
}

/// Failure to build the production client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to read CA certificate {}: {source}", path.display())]
    CaCertificateRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid CA certificate {}: {source}", path.display())]
    CaCertificateInvalid {
        path: PathBuf,
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Anything that can GET a URL and hand back status and body.
pub trait JsonSource: Send + Sync {
    fn get(&self, url: &Url) -> impl Future<Output = Result<HttpResponse, FetchError>> + Send;
}

/// Client-level settings for [`ReqwestSource`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    /// Skip certificate verification of the upstream.
    pub insecure: bool,
    /// Extra PEM root certificate to trust.
    pub ca_cert_path: Option<PathBuf>,
    pub basic_auth: Option<(String, String)>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            insecure: false,
            ca_cert_path: None,
            basic_auth: None,
        }
    }
}

/// [`JsonSource`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestSource {
    client: reqwest::Client,
    basic_auth: Option<(String, String)>,
}

impl ReqwestSource {
    pub fn new(options: &ClientOptions) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("generic-json-exporter/", env!("CARGO_PKG_VERSION")))
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.insecure);

        if let Some(path) = &options.ca_cert_path {
            let pem = std::fs::read(path).map_err(|source| ClientError::CaCertificateRead {
                path: path.clone(),
                source,
            })?;
            let cert =
                Certificate::from_pem(&pem).map_err(|source| ClientError::CaCertificateInvalid {
                    path: path.clone(),
                    source,
                })?;
            builder = builder.add_root_certificate(cert);
        }

        Ok(Self {
            client: builder.build()?,
            basic_auth: options.basic_auth.clone(),
        })
    }
}

impl JsonSource for ReqwestSource {
    async fn get(&self, url: &Url) -> Result<HttpResponse, FetchError> {
        let mut request = self.client.get(url.clone());
        if let Some((user, password)) = &self.basic_auth {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}
