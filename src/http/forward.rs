//! Request forwarding to the pinned origin.
//!
//! # Responsibilities
//! - Re-target the request URI at the origin address
//! - Keep method, path, query, headers and body
//! - Keep the client's `Host` for virtual hosting
//! - Strip hop-by-hop headers
//!
//! # Design Decisions
//! - The connection target never comes from DNS; only `origin` is dialled
//! - Always HTTP/1.1 towards the origin, whatever the client spoke
//! - Redirects are not followed; the client sees the origin's 3xx

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::header::{ACCEPT_ENCODING, HOST};
use axum::http::uri::{PathAndQuery, Scheme};
use axum::http::{HeaderValue, Request, Uri, Version};
use thiserror::Error;

use crate::security::strip_hop_by_hop;

/// Errors while sending a request to the origin.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid forwarded request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("inbound authority is not a valid Host header: {0}")]
    Host(#[from] axum::http::header::InvalidHeaderValue),

    #[error("origin transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
}

/// Turn the inbound request into one addressed to `origin`.
pub fn build_forward_request(
    request: Request<Body>,
    origin: SocketAddr,
    force_identity_encoding: bool,
) -> Result<Request<Body>, ForwardError> {
    let (mut parts, body) = request.into_parts();

    strip_hop_by_hop(&mut parts.headers);

    // HTTP/2 clients send :authority instead of Host.
    if !parts.headers.contains_key(HOST) {
        if let Some(authority) = parts.uri.authority() {
            parts
                .headers
                .insert(HOST, HeaderValue::from_str(authority.as_str())?);
        }
    }

    if force_identity_encoding {
        parts
            .headers
            .insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    }

    let path_and_query = parts
        .uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    parts.uri = Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(origin.to_string())
        .path_and_query(path_and_query)
        .build()?;
    parts.version = Version::HTTP_11;

    Ok(Request::from_parts(parts, body))
}
