//! HTTP Digest authentication (MD5 only), and the helpers it needs

use std::fmt::Write;

use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use thiserror::Error;

use super::ChallengeOptions;

/// Lenient `key=value` matcher. Values may be quoted with `"` or `'`, or not quoted at all
static AUTH_KEY_VALUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"([A-Za-z0-9_]+)=["']?([^'"]+)["']?"#).unwrap());

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("the challenge has no realm")]
    MissingRealm,
    #[error("the challenge has no nonce")]
    MissingNonce,
    #[error("the nonce-count of this nonce is exhausted")]
    NonceCountExhausted,
}

/// A computed `Authorization` value, with the nonce-count and client nonce it embeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestAuthorization {
    pub header: String,
    /// The nonce-count used in this header. It must be persisted before the header is sent
    pub nonce_count: u32,
    pub cnonce: String,
}

/// MD5 of the UTF-8 bytes of `input`, as 32 lowercase hex chars
pub fn hash_lower_hex<S: AsRef<str>>(input: S) -> String {
    let digest = Md5::digest(input.as_ref().as_bytes());
    to_hex(&digest)
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Parse the parameters of a `WWW-Authenticate` (or `Authorization`) value.
///
/// This is a lenient parser: the value is split on every comma (even inside quotes), and segments that
/// do not look like `key=value` are skipped.
pub fn parse_challenge(header_value: &str) -> ChallengeOptions {
    let mut opts = ChallengeOptions::default();
    for part in header_value.split(',') {
        if let Some(caps) = AUTH_KEY_VALUE_RE.captures(part) {
            let value = caps[2].replace(&['"', '\''][..], "");
            opts.insert(caps[1].to_string(), value);
        }
    }
    opts
}

/// 8 random bytes, hex-encoded
fn generate_cnonce() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    to_hex(&bytes)
}

/// The `response` field of a Digest `Authorization` header.
///
/// `nc` is the already formatted nonce-count. `qop` must be the single token that will be sent.
pub(crate) fn compute_response(method: &str, uri: &str, user: &str, secret: &str,
    realm: &str, nonce: &str, qop: Option<&str>, nc: &str, cnonce: &str) -> String
{
    let ha1 = hash_lower_hex(format!("{}:{}:{}", user, realm, secret));
    let ha2 = hash_lower_hex(format!("{}:{}", method.to_uppercase(), uri));

    let mut s = format!("{}:{}", ha1, nonce);
    if let Some(qop) = qop {
        s += &format!(":{}:{}:{}", nc, cnonce, qop);
    }
    s += &format!(":{}", ha2);
    hash_lower_hex(s)
}

/// Build a Digest `Authorization` value for `method` and `uri`.
///
/// `nonce_count` is the last nonce-count that has been used for this nonce. It is incremented, and the
/// incremented value is the one sent (and returned).
pub fn build_digest_header(method: &str, uri: &str, user: &str, secret: &str,
    challenge: &ChallengeOptions, nonce_count: u32) -> Result<DigestAuthorization, DigestError>
{
    let realm = challenge.realm().ok_or(DigestError::MissingRealm)?;
    let nonce = challenge.nonce().ok_or(DigestError::MissingNonce)?;
    let qop = challenge.qop();

    let nonce_count = nonce_count.checked_add(1).ok_or(DigestError::NonceCountExhausted)?;
    let nc = format!("{:08}", nonce_count);
    let cnonce = generate_cnonce();

    let response = compute_response(method, uri, user, secret, realm, nonce, qop, &nc, &cnonce);

    let mut header = format!(r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}""#,
        user, realm, nonce, uri, response);
    if let Some(opaque) = challenge.opaque() {
        header += &format!(r#", opaque="{}""#, opaque);
    }
    if let Some(qop) = qop {
        header += &format!(r#", qop={}, nc={}, cnonce="{}""#, qop, nc, cnonce);
    }

    Ok(DigestAuthorization { header, nonce_count, cnonce })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_test_vectors() {
        assert_eq!(hash_lower_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hash_lower_hex("abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(hash_lower_hex("hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(hash_lower_hex("message digest"), "f96b697d7cb7938d525a2f31aaf161d0");
    }

    #[test]
    fn parse_simple_challenge() {
        let opts = parse_challenge(r#"Digest realm="test", nonce="abc123", qop="auth""#);
        assert_eq!(opts.len(), 3);
        assert_eq!(opts.realm(), Some("test"));
        assert_eq!(opts.nonce(), Some("abc123"));
        assert_eq!(opts.qop(), Some("auth"));
        assert_eq!(opts.opaque(), None);
    }

    #[test]
    fn parse_is_lenient() {
        let opts = parse_challenge(r#"realm='single quoted', algorithm=MD5, garbage, stale=false"#);
        assert_eq!(opts.realm(), Some("single quoted"));
        assert_eq!(opts.get("algorithm"), Some("MD5"));
        assert_eq!(opts.get("stale"), Some("false"));
        assert_eq!(opts.len(), 3);

        // Commas within quotes are split too
        let opts = parse_challenge(r#"realm="a,b", qop="auth,auth-int""#);
        assert_eq!(opts.realm(), Some("a"));
        assert_eq!(opts.qop(), Some("auth"));
    }

    #[test]
    fn rfc2617_reference_responses() {
        let with_qop = compute_response("GET", "/dir/index.html", "Mufasa", "Circle Of Life",
            "testrealm@host.com", "dcd98b7102dd2f0e8b11d0f600bfb0c093", Some("auth"), "00000001", "0a4f113b");
        assert_eq!(with_qop, "6629fae49393a05397450978507c4ef1");

        let without_qop = compute_response("get", "/dir/index.html", "Mufasa", "Circle Of Life",
            "testrealm@host.com", "dcd98b7102dd2f0e8b11d0f600bfb0c093", None, "00000001", "0a4f113b");
        assert_eq!(without_qop, "670fd8c2df070c60b045671b8b24ff02");
    }

    #[test]
    fn digest_header_fields() {
        let challenge = parse_challenge(r#"realm="cal", nonce="n0nce", qop="auth,auth-int", opaque="0paque""#);
        let auth = build_digest_header("PROPFIND", "/dav/cal/", "john", "secret", &challenge, 0).unwrap();

        assert_eq!(auth.nonce_count, 1);
        assert_eq!(auth.cnonce.len(), 16);
        assert!(auth.header.starts_with(r#"Digest username="john", realm="cal", nonce="n0nce", uri="/dav/cal/", response=""#));
        assert!(auth.header.contains(r#", opaque="0paque""#));
        assert!(auth.header.contains(", qop=auth, nc=00000001, cnonce=\""));

        let expected = compute_response("PROPFIND", "/dav/cal/", "john", "secret", "cal", "n0nce", Some("auth"), "00000001", &auth.cnonce);
        assert_eq!(parse_challenge(&auth.header).get("response"), Some(expected.as_str()));
    }

    #[test]
    fn digest_header_without_qop() {
        let challenge = parse_challenge(r#"realm="cal", nonce="n0nce""#);
        let auth = build_digest_header("GET", "/", "john", "secret", &challenge, 41).unwrap();
        assert_eq!(auth.nonce_count, 42);
        assert!(auth.header.contains("nc=") == false);
        assert!(auth.header.contains("cnonce") == false);
        assert!(auth.header.contains("opaque") == false);
    }

    #[test]
    fn successive_headers_differ() {
        let challenge = parse_challenge(r#"realm="cal", nonce="n0nce", qop="auth""#);
        let first = build_digest_header("REPORT", "/cal/", "john", "secret", &challenge, 0).unwrap();
        let second = build_digest_header("REPORT", "/cal/", "john", "secret", &challenge, first.nonce_count).unwrap();

        assert_eq!(parse_challenge(&first.header).get("nc"), Some("00000001"));
        assert_eq!(parse_challenge(&second.header).get("nc"), Some("00000002"));
        assert_ne!(first.cnonce, second.cnonce);
        assert_ne!(parse_challenge(&first.header).get("response"), parse_challenge(&second.header).get("response"));
    }

    #[test]
    fn header_can_be_parsed_back() {
        let challenge = parse_challenge(r#"Digest realm="users@example.org", nonce="5e1f0a", qop="auth""#);
        let auth = build_digest_header("PUT", "/contacts/card.vcf", "alice", "pw", &challenge, 9).unwrap();

        let parsed = parse_challenge(&auth.header);
        assert_eq!(parsed.get("username"), Some("alice"));
        assert_eq!(parsed.realm(), Some("users@example.org"));
        assert_eq!(parsed.nonce(), Some("5e1f0a"));
        assert_eq!(parsed.get("uri"), Some("/contacts/card.vcf"));
        assert_eq!(parsed.get("cnonce"), Some(auth.cnonce.as_str()));
        assert_eq!(parsed.get("response").map(|r| r.len()), Some(32));
    }

    #[test]
    fn incomplete_challenge() {
        let no_realm = parse_challenge(r#"nonce="n""#);
        assert_eq!(build_digest_header("GET", "/", "u", "p", &no_realm, 0), Err(DigestError::MissingRealm));
        let no_nonce = parse_challenge(r#"realm="r""#);
        assert_eq!(build_digest_header("GET", "/", "u", "p", &no_nonce, 0), Err(DigestError::MissingNonce));
    }

    #[test]
    fn nonce_count_never_wraps() {
        let challenge = parse_challenge(r#"realm="r", nonce="n", qop="auth""#);
        let last = build_digest_header("GET", "/", "u", "p", &challenge, u32::MAX - 1).unwrap();
        assert_eq!(last.nonce_count, u32::MAX);
        assert_eq!(parse_challenge(&last.header).get("nc"), Some("4294967295"));

        assert_eq!(build_digest_header("GET", "/", "u", "p", &challenge, u32::MAX), Err(DigestError::NonceCountExhausted));
    }
}
