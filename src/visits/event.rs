//! Visit event construction.
//!
//! # Design Decisions
//! - Path is percent-decoded and excludes the query string
//! - Header names are sent in canonical form (`User-Agent`), each mapping
//!   to all of its values in arrival order
//! - `Cookie` and `Host` are dropped, as are headers the host inserted
//!   itself (see [`HostAddedHeaders`]); everything else is reported as
//!   received

use std::collections::BTreeMap;

use axum::http::{header, HeaderMap, HeaderName, Method, Request, Uri};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

/// The record reported for one intercepted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitEvent {
    pub request_path: String,
    pub request_method: String,
    pub request_headers: BTreeMap<String, Vec<String>>,
}

/// Request extension naming headers added by the host rather than the
/// client. They are left out of the event.
#[derive(Debug, Clone, Default)]
pub struct HostAddedHeaders(pub Vec<HeaderName>);

impl VisitEvent {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let mut event = Self::from_parts(request.method(), request.uri(), request.headers());
        if let Some(added) = request.extensions().get::<HostAddedHeaders>() {
            for name in &added.0 {
                event.request_headers.remove(&canonical_header_name(name.as_str()));
            }
        }
        event
    }

    pub fn from_parts(method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        Self {
            request_path: decode_path(uri.path()),
            request_method: method.as_str().to_string(),
            request_headers: sanitize_headers(headers),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

fn decode_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Copy headers into the wire shape, without `Cookie` or `Host`.
pub fn sanitize_headers(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut sanitized: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (name, value) in headers {
        if *name == header::COOKIE || *name == header::HOST {
            continue;
        }
        let value = match value.to_str() {
            Ok(v) => v.to_string(),
            Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
        };
        sanitized
            .entry(canonical_header_name(name.as_str()))
            .or_default()
            .push(value);
    }

    sanitized
}

/// `x-forwarded-for` → `X-Forwarded-For`.
pub fn canonical_header_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}
