//! This crate provides the authenticated request pipeline of a CalDAV/CardDAV client.
//!
//! The [`client`] module sends DAV requests on behalf of an [`Account`](account::Account), and transparently
//! negotiates HTTP Basic or Digest authentication with the server. \
//! Digest session state (method, challenge, nonce-count) lives in [`AuthState`](auth::AuthState), and is persisted
//! through an [`AccountStore`](account::AccountStore) so that nonce-counts are never reused across runs.
//!
//! `207 Multi-Status` replies are split into their `<response>` elements by the [`multistatus`] module, and the
//! [`xml`] module provides a namespaced path query over the returned XML trees.

pub mod auth;
pub mod account;
pub use account::Account;
pub mod xml;
pub mod multistatus;
pub use multistatus::{DavResponse, ResourceEntry};

pub mod transport;
pub mod client;
pub use client::{Client, DavRequest};

pub mod config;
pub mod error;
pub use error::{DavError, ErrorKind};
