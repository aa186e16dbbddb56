//! Header manipulation and security headers.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers before forwarding
//! - Hold the static security header set attached to HTML responses
//!
//! # Design Decisions
//! - Header values are parsed once per config load, not per request
//! - Security headers overwrite whatever the origin sent

use axum::http::header::{
    self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, REFERRER_POLICY,
    STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};

use crate::config::schema::SecurityHeadersConfig;

/// `Permissions-Policy` has no constant in the `http` crate.
pub const PERMISSIONS_POLICY: &str = "permissions-policy";

/// Headers that only apply to a single connection (RFC 9110 §7.6.1).
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Static security headers for HTML responses.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    pub fn from_config(config: &SecurityHeadersConfig) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            headers: vec![
                (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_str(&config.x_content_type_options)?),
                (X_FRAME_OPTIONS, HeaderValue::from_str(&config.x_frame_options)?),
                (REFERRER_POLICY, HeaderValue::from_str(&config.referrer_policy)?),
                (
                    HeaderName::from_static(PERMISSIONS_POLICY),
                    HeaderValue::from_str(&config.permissions_policy)?,
                ),
                (
                    STRICT_TRANSPORT_SECURITY,
                    HeaderValue::from_str(&config.strict_transport_security)?,
                ),
            ],
        })
    }

    /// Set every header, replacing existing values.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
    }
}
