//! Response handling and transformation.
//!
//! # Responsibilities
//! - Decide whether an origin response is HTML
//! - Attach the CSP and security headers to HTML responses
//! - Decode gzip, deflate, br and zstd HTML bodies before rewriting
//! - Swap the body for its streaming rewrite when one is possible
//!
//! # Design Decisions
//! - Non-HTML responses are never touched (callers return them as-is)
//! - Responses without a body, or with a coding we cannot decode, get headers only
//! - Content-Length and Content-Encoding are dropped once the body is rewritten

use std::convert::Infallible;
use std::future;

use axum::body::Body;
use axum::http::header::{
    InvalidHeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_SECURITY_POLICY, CONTENT_TYPE,
};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use tower::{service_fn, ServiceExt};
use tower_http::decompression::Decompression;

use crate::http::profile::EdgeProfile;
use crate::rewrite::{rewrite_body, Nonce};

/// Whether the `content-type` header contains `text/html` (any case).
pub fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("text/html"))
}

fn has_no_body(method: &Method, status: StatusCode) -> bool {
    method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

fn is_encoded(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|coding| !coding.trim().eq_ignore_ascii_case("identity"))
}

/// Strip a supported `Content-Encoding` by decoding the body as it streams.
///
/// The response is handed to tower-http's `Decompression` through a service
/// that returns it unchanged, so only the response side of that middleware
/// applies. Unsupported codings keep their header and body.
async fn decode(response: Response<Body>) -> Response<Body> {
    let decoder = Decompression::new(service_fn(|request: Request<Response<Body>>| {
        future::ready(Ok::<_, Infallible>(request.into_body()))
    }));
    match decoder.oneshot(Request::new(response)).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

/// Harden an HTML response with `nonce`.
///
/// The same nonce lands in the CSP header and in the rewritten markup.
pub async fn harden(
    response: Response<Body>,
    method: &Method,
    profile: &EdgeProfile,
    nonce: Nonce,
) -> Result<Response<Body>, InvalidHeaderValue> {
    let bodiless = has_no_body(method, response.status());
    let response = if bodiless || !is_encoded(response.headers()) {
        response
    } else {
        decode(response).await
    };
    let (mut parts, body) = response.into_parts();

    parts
        .headers
        .insert(CONTENT_SECURITY_POLICY, profile.policy.header_value(&nonce)?);
    profile.security_headers.apply(&mut parts.headers);

    let body = if bodiless {
        body
    } else if is_encoded(&parts.headers) {
        tracing::warn!(
            status = %parts.status,
            encoding = ?parts.headers.get(CONTENT_ENCODING),
            "HTML response has an unsupported content-encoding, body passed through without nonces"
        );
        body
    } else {
        parts.headers.remove(CONTENT_LENGTH);
        rewrite_body(body, nonce, profile.channel_capacity)
    };

    Ok(Response::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdgeConfig;
    use axum::http::HeaderValue;

    /// `<script>x()</script>`, gzip-compressed.
    const GZIP_SCRIPT: &[u8] = b"\x1f\x8b\x08\x00\x00\x00\x00\x00\x02\x03\xb3\x29\x4e\x2e\xca\x2c\x28\xb1\xab\xd0\xd0\xb4\xd1\x87\xb2\x01\xb6\x32\xa3\xa1\x14\x00\x00\x00";

    fn profile() -> EdgeProfile {
        EdgeProfile::from_config(&EdgeConfig::default()).unwrap()
    }

    fn html_response(body: &'static str) -> Response<Body> {
        Response::builder()
            .header(CONTENT_TYPE, "text/html; charset=utf-8")
            .header(CONTENT_LENGTH, body.len())
            .header(CONTENT_SECURITY_POLICY, "default-src *")
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn html_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_html(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("Text/HTML; charset=UTF-8"));
        assert!(is_html(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_html(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xhtml+xml"));
        assert!(!is_html(&headers));
    }

    #[test]
    fn encoding_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_encoded(&headers));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("identity"));
        assert!(!is_encoded(&headers));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        assert!(is_encoded(&headers));
    }

    #[tokio::test]
    async fn rewrites_body_and_replaces_policy() {
        let nonce = Nonce::fixed("bm9uY2Vub25jZW5vbmNlMQ==");
        let response = harden(
            html_response("<script>go()</script>"),
            &Method::GET,
            &profile(),
            nonce.clone(),
        )
        .await
        .unwrap();

        let csp = response.headers()[CONTENT_SECURITY_POLICY].to_str().unwrap();
        assert!(csp.contains("'nonce-bm9uY2Vub25jZW5vbmNlMQ=='"));
        assert!(!response.headers().contains_key(CONTENT_LENGTH));
        assert_eq!(response.headers()["x-frame-options"], "SAMEORIGIN");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"<script nonce="bm9uY2Vub25jZW5vbmNlMQ==">go()</script>"#);
    }

    #[tokio::test]
    async fn head_request_gets_headers_only() {
        let response =
            harden(html_response("<script></script>"), &Method::HEAD, &profile(), Nonce::generate())
                .await
                .unwrap();

        assert!(response.headers().contains_key(CONTENT_SECURITY_POLICY));
        assert_eq!(response.headers()[CONTENT_LENGTH], "17");
    }

    #[tokio::test]
    async fn gzip_body_is_decoded_and_rewritten() {
        let mut response = Response::builder()
            .header(CONTENT_TYPE, "text/html")
            .header(CONTENT_ENCODING, "gzip")
            .header(CONTENT_LENGTH, GZIP_SCRIPT.len())
            .body(Body::from(GZIP_SCRIPT))
            .unwrap();
        response.headers_mut().insert("x-origin", HeaderValue::from_static("kept"));

        let response = harden(response, &Method::GET, &profile(), Nonce::fixed("Z3ppcA=="))
            .await
            .unwrap();
        assert!(!response.headers().contains_key(CONTENT_ENCODING));
        assert!(!response.headers().contains_key(CONTENT_LENGTH));
        assert_eq!(response.headers()["x-origin"], "kept");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"<script nonce="Z3ppcA==">x()</script>"#);
    }

    #[tokio::test]
    async fn unknown_encoding_is_left_alone() {
        let mut response = html_response("<script>x</script>");
        response
            .headers_mut()
            .insert(CONTENT_ENCODING, HeaderValue::from_static("x-custom"));

        let response = harden(response, &Method::GET, &profile(), Nonce::generate())
            .await
            .unwrap();
        assert!(response.headers().contains_key("strict-transport-security"));
        assert_eq!(response.headers()[CONTENT_ENCODING], "x-custom");
        assert_eq!(response.headers()[CONTENT_LENGTH], "18");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<script>x</script>");
    }

    #[tokio::test]
    async fn head_request_keeps_encoding_headers() {
        let mut response = html_response("");
        response
            .headers_mut()
            .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));

        let response = harden(response, &Method::HEAD, &profile(), Nonce::generate())
            .await
            .unwrap();
        assert_eq!(response.headers()[CONTENT_ENCODING], "gzip");
    }
}
