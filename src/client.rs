//! This module provides the client that sends authenticated requests to a DAV server

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use minidom::Element;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Method, StatusCode};

use crate::account::{Account, AccountStore, AuthRecord};
use crate::auth::{build_digest_header, AuthMethod, UnsupportedScheme};
use crate::config::ClientConfig;
use crate::error::{DavError, ErrorKind};
use crate::multistatus::DavResponse;
use crate::transport::{HttpRequest, ReqwestTransport, Transport, TransportError};

static XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// A call is sent at most twice: once as-is, once again after an authentication challenge
const MAX_ATTEMPTS: u32 = 2;


/// A DAV request, relative to the server of the account it is sent for
#[derive(Debug, Clone)]
pub struct DavRequest {
    method: Method,
    path: String,
    body: Vec<u8>,
    headers: HeaderMap,
}

impl DavRequest {
    pub fn new<S: ToString>(method: Method, path: S) -> Self {
        Self {
            method,
            path: path.to_string(),
            body: Vec::new(),
            headers: HeaderMap::new(),
        }
    }

    pub fn propfind<S: ToString>(path: S) -> Self {
        let method = Method::from_bytes(b"PROPFIND")
            .expect("cannot create PROPFIND method.");
        Self::new(method, path)
    }

    pub fn report<S: ToString>(path: S) -> Self {
        let method = Method::from_bytes(b"REPORT")
            .expect("cannot create REPORT method.");
        Self::new(method, path)
    }

    pub fn with_body<B: Into<Vec<u8>>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header. `Content-Length` and `Content-Type` are always replaced when the request is sent
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_depth(self, depth: u32) -> Self {
        self.with_header(HeaderName::from_static("depth"), HeaderValue::from(depth))
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
}


/// Sends [`DavRequest`]s, and handles the authentication handshakes with the server.
///
/// Authentication sessions are stored in the [`Account`]s, and persisted into the [`AccountStore`] `S`
/// each time they change.
pub struct Client<T, S> {
    transport: T,
    store: S,
    timeout: Duration,
}

impl<S: AccountStore> Client<ReqwestTransport, S> {
    /// Create a client that uses `reqwest`. This does not start a connection
    pub fn new(config: &ClientConfig, store: S) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::with_transport(transport, store, config))
    }
}

impl<T, S> Client<T, S>
where
    T: Transport,
    S: AccountStore,
{
    pub fn with_transport(transport: T, store: S, config: &ClientConfig) -> Self {
        Self { transport, store, timeout: config.timeout() }
    }

    pub fn transport(&self) -> &T { &self.transport }
    pub fn store(&self) -> &S { &self.store }

    /// Send a request on behalf of `account`.
    ///
    /// In case the server replies with an authentication challenge, the auth state of the account is updated and
    /// the request is sent once more. A `207 Multi-Status` reply is decomposed into its resources, any other
    /// successful exchange is returned as-is so that the caller can inspect its status.
    pub async fn send(&self, account: &mut Account, request: DavRequest) -> Result<DavResponse, DavError> {
        let url = account.credentials().url_for(&request.path)
            .map_err(|err| fail(account, &request, ErrorKind::InvalidTargetUri(format!("{} ({})", request.path, err))))?;
        log::debug!("{} {}", request.method, url);

        let mut base_headers = request.headers.clone();
        base_headers.insert(CONTENT_LENGTH, HeaderValue::from(request.body.len()));
        base_headers.insert(CONTENT_TYPE, HeaderValue::from_static(XML_CONTENT_TYPE));
        base_headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        for attempt in 1..=MAX_ATTEMPTS {
            let mut headers = base_headers.clone();
            if let Some(auth) = self.authorization(account, &request, attempt)? {
                headers.insert(AUTHORIZATION, auth);
            }

            let http_request = HttpRequest {
                method: request.method.clone(),
                url: url.clone(),
                headers,
                body: request.body.clone(),
            };
            let response = match tokio::time::timeout(self.timeout, self.transport.execute(http_request)).await {
                Err(_elapsed) => return Err(fail(account, &request, ErrorKind::Timeout)),
                Ok(Err(TransportError::Timeout)) => return Err(fail(account, &request, ErrorKind::Timeout)),
                Ok(Err(TransportError::Network(err))) => return Err(fail(account, &request, ErrorKind::Network(err))),
                Ok(Ok(response)) => response,
            };
            log::debug!("Response {} for {} {} (attempt {})", response.status, request.method, request.path, attempt);
            log::trace!("Response body: {}", response.body);

            match response.status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    self.record_challenge(account, &request, &response.headers)?;
                    if attempt < MAX_ATTEMPTS {
                        continue;
                    }
                    return Err(fail(account, &request, ErrorKind::AuthenticationFailed(
                        format!("the server still replies {} after authenticating", response.status))));
                },
                status => {
                    let document = parse_body(&response.body, status)
                        .map_err(|err| fail(account, &request, err))?;
                    return Ok(DavResponse::new(status, response.headers, document));
                },
            }
        }

        Err(fail(account, &request, ErrorKind::AuthenticationFailed("too many attempts".to_string())))
    }

    /// The `Authorization` header for this attempt, if any
    fn authorization(&self, account: &mut Account, request: &DavRequest, attempt: u32) -> Result<Option<HeaderValue>, DavError> {
        let value = match account.auth().method() {
            // Not known yet, the server will tell us with a challenge
            AuthMethod::Unset => return Ok(None),

            AuthMethod::Basic => {
                let credentials = account.credentials();
                let token = BASE64.encode(format!("{}:{}", credentials.username(), credentials.secret()));
                format!("Basic {}", token)
            },

            AuthMethod::Digest => match attempt {
                // Get a fresh nonce first
                1 => return Ok(None),
                2 => {
                    let credentials = account.credentials();
                    let digest = build_digest_header(request.method.as_str(), &request.path,
                            credentials.username(), credentials.secret(),
                            &account.auth().challenge(), account.auth().nonce_count())
                        .map_err(|err| fail(account, request, ErrorKind::AuthenticationFailed(err.to_string())))?;

                    // This nonce-count must never be used again, even if we crash in the meantime
                    account.auth_mut().set_nonce_count(digest.nonce_count);
                    self.persist(account, request)?;
                    digest.header
                },
                _ => return Err(fail(account, request, ErrorKind::AuthenticationFailed("the server rejected the digest response".to_string()))),
            },
        };

        let mut value = HeaderValue::from_str(&value)
            .map_err(|_| fail(account, request, ErrorKind::AuthenticationFailed("credentials cannot be sent in an HTTP header".to_string())))?;
        value.set_sensitive(true);
        Ok(Some(value))
    }

    /// Update the auth state of `account` with the challenge of a 401/403 reply
    fn record_challenge(&self, account: &mut Account, request: &DavRequest, headers: &HeaderMap) -> Result<(), DavError> {
        let challenges: Vec<String> = headers.get_all(WWW_AUTHENTICATE)
            .iter()
            .map(decode_header_value)
            .collect();
        if challenges.is_empty() {
            return Err(fail(account, request, ErrorKind::AuthenticationFailed("no WWW-Authenticate header in the reply".to_string())));
        }

        // Servers may offer several schemes, use the first one we support
        let mut last_err = None;
        for challenge in &challenges {
            match account.auth_mut().apply_challenge(challenge) {
                Ok(nonce_changed) => {
                    log::debug!("Server asks for {} auth ({})", account.auth().method(), account.auth().options());
                    if nonce_changed {
                        log::debug!("Server nonce changed for account {}, nonce-count has been reset", account.id());
                    }
                    return self.persist(account, request);
                },
                Err(UnsupportedScheme(scheme)) => {
                    log::debug!("Ignoring unsupported auth scheme {:?}", scheme);
                    last_err.get_or_insert(scheme);
                },
            }
        }

        Err(fail(account, request, ErrorKind::UnsupportedAuthMethod(last_err.unwrap_or_default())))
    }

    fn persist(&self, account: &Account, request: &DavRequest) -> Result<(), DavError> {
        self.store.save(account.id(), &AuthRecord::from(account.auth()))
            .map_err(|err| fail(account, request, ErrorKind::AccountStore(err.to_string())))
    }
}

fn fail(account: &Account, request: &DavRequest, kind: ErrorKind) -> DavError {
    log::warn!("{} {} failed for account {}: {}", request.method, request.path, account.id(), kind);
    DavError::new(kind, account.id(), &request.method, account.auth().method())
}

/// Header values may carry non-ASCII bytes in quoted strings (e.g. a localized realm).
/// They are read as UTF-8 when possible, as Latin-1 otherwise
fn decode_header_value(value: &HeaderValue) -> String {
    let bytes = value.as_bytes();
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Parse a reply body. Empty bodies are accepted, unless this is a multistatus
fn parse_body(body: &str, status: StatusCode) -> Result<Option<Element>, ErrorKind> {
    if body.trim().is_empty() {
        if status == StatusCode::MULTI_STATUS {
            return Err(ErrorKind::MalformedResponse("empty multistatus body".to_string()));
        }
        return Ok(None);
    }

    body.parse::<Element>()
        .map(Some)
        .map_err(|err| ErrorKind::MalformedResponse(err.to_string()))
}
