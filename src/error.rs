//! Errors surfaced by the request pipeline

use thiserror::Error;

use crate::auth::AuthMethod;

/// The category of a failed DAV call.
///
/// All of them are terminal for the call that raised them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("invalid target URI {0}")]
    InvalidTargetUri(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("unsupported auth method {0:?}")]
    UnsupportedAuthMethod(String),
    #[error("unable to persist auth state: {0}")]
    AccountStore(String),
}

/// A failed DAV call, with enough context for the caller to build a diagnostic
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind} (account {account}, {http_method} with {auth_method} auth)")]
pub struct DavError {
    kind: ErrorKind,
    account: String,
    http_method: String,
    auth_method: AuthMethod,
}

impl DavError {
    pub fn new<S: ToString, T: ToString>(kind: ErrorKind, account: S, http_method: T, auth_method: AuthMethod) -> Self {
        Self {
            kind,
            account: account.to_string(),
            http_method: http_method.to_string(),
            auth_method,
        }
    }

    pub fn kind(&self) -> &ErrorKind { &self.kind }
    pub fn account(&self) -> &str { &self.account }
    pub fn http_method(&self) -> &str { &self.http_method }
    /// The auth method the account was using when the call failed
    pub fn auth_method(&self) -> AuthMethod { self.auth_method }
}
