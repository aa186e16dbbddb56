//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the edge
//! rewriter. All types derive Serde traits for deserialization from config
//! files, and every section has defaults so an empty file is a valid config.

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the per-response nonce inside policy sources.
pub const NONCE_PLACEHOLDER: &str = "{nonce}";

/// Root configuration for the edge rewriter.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EdgeConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// The pinned origin every request is forwarded to.
    pub origin: OriginConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// HTML rewriting settings.
    pub rewrite: RewriteConfig,

    /// Content-Security-Policy template.
    pub policy: PolicyConfig,

    /// Static security headers attached to HTML responses.
    pub security_headers: SecurityHeadersConfig,

    /// Request limits.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Origin pinning.
///
/// The connection always goes to `address`, whatever the request's host
/// resolves to. The `Host` header is left as the client sent it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Origin IP and port (e.g., "203.0.113.10:80").
    pub address: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Origin connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed until the origin's response head arrives, in seconds.
    pub request_secs: u64,

    /// Idle pooled origin connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            idle_secs: 60,
        }
    }
}

/// HTML rewriting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Ask the origin for uncompressed bodies so HTML can be rewritten.
    pub force_identity_encoding: bool,

    /// Chunks buffered on each side of the rewriter before back-pressure applies.
    pub channel_capacity: usize,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            force_identity_encoding: true,
            channel_capacity: 16,
        }
    }
}

/// A single CSP directive, e.g. `script-src 'self'`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DirectiveConfig {
    /// Directive name (lowercase, e.g. "script-src").
    pub name: String,

    /// Source expressions, in order. `'nonce-{nonce}'` marks the nonce slot.
    #[serde(default)]
    pub sources: Vec<String>,
}

impl DirectiveConfig {
    fn new(name: &str, sources: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Ordered Content-Security-Policy template.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub directives: Vec<DirectiveConfig>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            directives: vec![
                DirectiveConfig::new("default-src", &["'self'"]),
                DirectiveConfig::new(
                    "script-src",
                    &[
                        "'self'",
                        "'nonce-{nonce}'",
                        "https://cdnjs.cloudflare.com",
                        "https://cdn.jsdelivr.net",
                    ],
                ),
                DirectiveConfig::new(
                    "style-src",
                    &[
                        "'self'",
                        "'unsafe-inline'",
                        "'nonce-{nonce}'",
                        "https://fonts.googleapis.com",
                    ],
                ),
                DirectiveConfig::new("font-src", &["'self'", "https://fonts.gstatic.com", "data:"]),
                DirectiveConfig::new("img-src", &["'self'", "data:", "https:"]),
                DirectiveConfig::new(
                    "connect-src",
                    &[
                        "'self'",
                        "https://api.admission.edu.vn",
                        "https://api.galaxyfreedom.com",
                    ],
                ),
                DirectiveConfig::new("frame-ancestors", &["'none'"]),
                DirectiveConfig::new("base-uri", &["'self'"]),
                DirectiveConfig::new("form-action", &["'self'"]),
                DirectiveConfig::new("object-src", &["'none'"]),
            ],
        }
    }
}

/// Security headers set on every HTML response.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityHeadersConfig {
    pub x_content_type_options: String,
    pub x_frame_options: String,
    pub referrer_policy: String,
    pub permissions_policy: String,
    pub strict_transport_security: String,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            x_content_type_options: "nosniff".to_string(),
            x_frame_options: "SAMEORIGIN".to_string(),
            referrer_policy: "same-origin".to_string(),
            permissions_policy: "accelerometer=(), camera=(), geolocation=(), gyroscope=(), \
                                 magnetometer=(), microphone=(), payment=(), usb=()"
                .to_string(),
            strict_transport_security: "max-age=31536000; includeSubDomains; preload".to_string(),
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes. Unset means bodies of any size
    /// are forwarded, which uploads through the edge rely on.
    pub max_body_size: Option<usize>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: EdgeConfig = toml::from_str("").unwrap();
        assert_eq!(config.origin.address, "127.0.0.1:3000");
        assert_eq!(config.policy.directives.len(), 10);
        assert!(config.rewrite.force_identity_encoding);
        assert_eq!(config.security.max_body_size, None);
    }

    #[test]
    fn body_limit_is_opt_in() {
        let config: EdgeConfig = toml::from_str("[security]\nmax_body_size = 1048576").unwrap();
        assert_eq!(config.security.max_body_size, Some(1024 * 1024));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: EdgeConfig = toml::from_str(
            r#"
            [origin]
            address = "203.0.113.10:80"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.origin.address, "203.0.113.10:80");
        assert_eq!(config.observability.log_format, "json");
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.security_headers.x_frame_options, "SAMEORIGIN");
    }

    #[test]
    fn policy_directives_replace_defaults() {
        let config: EdgeConfig = toml::from_str(
            r#"
            [[policy.directives]]
            name = "default-src"
            sources = ["'none'"]

            [[policy.directives]]
            name = "script-src"
            sources = ["'nonce-{nonce}'"]
            "#,
        )
        .unwrap();
        assert_eq!(config.policy.directives.len(), 2);
        assert_eq!(config.policy.directives[1].sources, vec!["'nonce-{nonce}'"]);
    }
}
