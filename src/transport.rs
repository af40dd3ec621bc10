//! The HTTP layer the request pipeline sends its attempts through

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use thiserror::Error;
use url::Url;

use crate::config::ClientConfig;

/// A single HTTP exchange, with every header already set
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("the request timed out")]
    Timeout,
    #[error("{0}")]
    Network(String),
}

/// Something that can perform HTTP exchanges.
///
/// Implementors must follow redirects, and must not attach cookies or any other session identifier.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}


/// The default transport, based on `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        // reqwest has no cookie store unless explicitly asked for
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(config.timeout())
            .user_agent(crate::config::user_agent())
            .build()
            .map_err(from_reqwest)?;
        Ok(Self { client })
    }
}

fn from_reqwest(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = self.client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(from_reqwest)?;
        Ok(HttpResponse { status, headers, body })
    }
}
