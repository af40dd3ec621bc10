//! Decomposition of `207 Multi-Status` replies

use minidom::Element;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use crate::xml::{evaluate_node, find_elems, Namespace, PathStep};

/// Status recorded for a `<response>` that has no `propstat/status`
pub const MISSING_STATUS: &str = "000";

/// One `<response>` element of a multistatus reply
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEntry {
    node: Element,
    status: String,
}

impl ResourceEntry {
    pub fn node(&self) -> &Element { &self.node }
    /// The three-digit status of the first `propstat`, or [`MISSING_STATUS`]
    pub fn status(&self) -> &str { &self.status }
}

/// Split a multistatus document into its `<response>` elements, in document order
pub fn decompose(document: &Element) -> Vec<ResourceEntry> {
    find_elems(document, Namespace::Dav, "response")
        .into_iter()
        .map(|response| {
            let status = evaluate_node(response, &[(Namespace::Dav, "propstat"), (Namespace::Dav, "status")])
                .and_then(|status_line| status_line.text().split_whitespace().nth(1).map(String::from))
                .unwrap_or_else(|| MISSING_STATUS.to_string());
            ResourceEntry { node: response.clone(), status }
        })
        .collect()
}


/// The outcome of a successful DAV call
#[derive(Debug, Clone)]
pub struct DavResponse {
    status: StatusCode,
    headers: HeaderMap,
    document: Option<Element>,
    multi: Option<Vec<ResourceEntry>>,
}

impl DavResponse {
    /// Build a response, and decompose it in case this is a multistatus
    pub fn new(status: StatusCode, headers: HeaderMap, document: Option<Element>) -> Self {
        let multi = match &document {
            Some(doc) if status == StatusCode::MULTI_STATUS => Some(decompose(doc)),
            _ => None,
        };
        Self { status, headers, document, multi }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    /// The parsed body. This is `None` for replies with an empty body
    pub fn document(&self) -> Option<&Element> { self.document.as_ref() }

    /// The per-resource entries, for `207 Multi-Status` replies only
    pub fn multi(&self) -> Option<&[ResourceEntry]> {
        self.multi.as_deref()
    }

    /// Evaluate `path` on every resource entry, and return the nodes that matched
    pub fn evaluate_multi_response(&self, path: &[PathStep]) -> Vec<&Element> {
        self.multi()
            .unwrap_or(&[])
            .iter()
            .filter_map(|entry| evaluate_node(entry.node(), path))
            .collect()
    }
}
