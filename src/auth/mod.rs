//! Authentication state kept for each account
//!
//! The codec functions that compute `Authorization` headers live in [`digest`].

pub mod digest;

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub use digest::{build_digest_header, hash_lower_hex, parse_challenge, DigestAuthorization, DigestError};

/// The HTTP authentication scheme an account negotiated with its server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No challenge has been received yet
    Unset,
    Basic,
    Digest,
}

impl Default for AuthMethod {
    fn default() -> Self {
        AuthMethod::Unset
    }
}

impl AuthMethod {
    /// The name used in `WWW-Authenticate` headers and in the account store
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Unset => "",
            AuthMethod::Basic => "Basic",
            AuthMethod::Digest => "Digest",
        }
    }
}

impl Display for AuthMethod {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            AuthMethod::Unset => write!(f, "no"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// An auth scheme name that is neither `Basic` nor `Digest`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedScheme(pub String);

impl Display for UnsupportedScheme {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "unsupported auth scheme {:?}", self.0)
    }
}

impl std::error::Error for UnsupportedScheme {}

impl FromStr for AuthMethod {
    type Err = UnsupportedScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Ok(AuthMethod::Unset)
        } else if s.eq_ignore_ascii_case("basic") {
            Ok(AuthMethod::Basic)
        } else if s.eq_ignore_ascii_case("digest") {
            Ok(AuthMethod::Digest)
        } else {
            Err(UnsupportedScheme(s.to_string()))
        }
    }
}


/// Key/value pairs found in a `WWW-Authenticate` header.
///
/// Only `realm`, `nonce`, `opaque` and `qop` are used, other keys are kept but ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChallengeOptions {
    values: HashMap<String, String>,
}

impl ChallengeOptions {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    pub fn realm(&self) -> Option<&str> { self.get("realm") }
    pub fn nonce(&self) -> Option<&str> { self.get("nonce") }
    pub fn opaque(&self) -> Option<&str> { self.get("opaque") }

    /// The first quality-of-protection token offered by the server, if any
    pub fn qop(&self) -> Option<&str> {
        self.get("qop")
            .and_then(|qop| qop.split(',').next())
            .map(|qop| qop.trim())
            .filter(|qop| !qop.is_empty())
    }

    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub(crate) fn insert(&mut self, key: String, value: String) {
        self.values.insert(key, value);
    }
}


/// Per-account authentication session.
///
/// This is mutated in place by every challenge the server sends, and must be persisted between runs
/// so that the Digest nonce-count keeps increasing for a given nonce.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    method: AuthMethod,
    /// The raw challenge parameters, i.e. the `WWW-Authenticate` value without its scheme name
    options: String,
    nonce_count: u32,
}

impl AuthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a state that has been persisted earlier
    pub fn from_parts(method: AuthMethod, options: String, nonce_count: u32) -> Self {
        Self { method, options, nonce_count }
    }

    pub fn method(&self) -> AuthMethod { self.method }
    pub fn options(&self) -> &str { &self.options }
    pub fn nonce_count(&self) -> u32 { self.nonce_count }

    /// The parsed version of the last challenge
    pub fn challenge(&self) -> ChallengeOptions {
        parse_challenge(&self.options)
    }

    pub(crate) fn set_nonce_count(&mut self, nonce_count: u32) {
        self.nonce_count = nonce_count;
    }

    /// Record the content of a `WWW-Authenticate` header.
    ///
    /// The nonce-count is reset to 0 if the server nonce is not the one of the previous challenge.
    /// Returns whether this reset happened. The state is left untouched in case the scheme is not supported.
    pub fn apply_challenge(&mut self, header_value: &str) -> Result<bool, UnsupportedScheme> {
        let header_value = header_value.trim();
        let (scheme, options) = match header_value.split_once(' ') {
            Some((scheme, options)) => (scheme, options),
            None => (header_value, ""),
        };

        let method = match scheme.parse::<AuthMethod>()? {
            AuthMethod::Unset => return Err(UnsupportedScheme(String::new())),
            method => method,
        };

        let new_challenge = parse_challenge(options);
        let nonce_changed = self.challenge().nonce() != new_challenge.nonce();
        if nonce_changed {
            self.nonce_count = 0;
        }

        self.method = method;
        self.options = options.to_string();
        Ok(nonce_changed)
    }
}
