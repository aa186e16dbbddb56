//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, value ranges and header values
//! - Check the policy template renders to a valid header
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EdgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::schema::{EdgeConfig, NONCE_PLACEHOLDER};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("policy must contain at least one directive")]
    EmptyPolicy,

    #[error("policy directive name '{0}' must be non-empty lowercase letters and dashes")]
    InvalidDirectiveName(String),

    #[error("policy directive '{0}' appears more than once")]
    DuplicateDirective(String),

    #[error("{0} is not a valid header value")]
    InvalidHeaderValue(&'static str),

    #[error("log_level '{0}' must be one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("log_format '{0}' must be 'pretty' or 'json'")]
    InvalidLogFormat(String),

    #[error("listener.tls requires both cert_path and key_path")]
    IncompleteTls,
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &EdgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_address(&mut errors, "origin.address", &config.origin.address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.trim().is_empty() || tls.key_path.trim().is_empty() {
            errors.push(ValidationError::IncompleteTls);
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.rewrite.channel_capacity == 0 {
        errors.push(ValidationError::Zero("rewrite.channel_capacity"));
    }
    if config.security.max_body_size == Some(0) {
        errors.push(ValidationError::Zero("security.max_body_size"));
    }

    validate_policy(config, &mut errors);

    let headers = &config.security_headers;
    for (field, value) in [
        ("security_headers.x_content_type_options", &headers.x_content_type_options),
        ("security_headers.x_frame_options", &headers.x_frame_options),
        ("security_headers.referrer_policy", &headers.referrer_policy),
        ("security_headers.permissions_policy", &headers.permissions_policy),
        ("security_headers.strict_transport_security", &headers.strict_transport_security),
    ] {
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::InvalidHeaderValue(field));
        }
    }

    match config.observability.log_level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => errors.push(ValidationError::InvalidLogLevel(other.to_string())),
    }
    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::InvalidLogFormat(other.to_string())),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn validate_policy(config: &EdgeConfig, errors: &mut Vec<ValidationError>) {
    let directives = &config.policy.directives;
    if directives.is_empty() {
        errors.push(ValidationError::EmptyPolicy);
        return;
    }

    let mut seen = HashSet::new();
    for directive in directives {
        let name = directive.name.as_str();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_lowercase() || c == '-') {
            errors.push(ValidationError::InvalidDirectiveName(name.to_string()));
        }
        if !seen.insert(name) {
            errors.push(ValidationError::DuplicateDirective(name.to_string()));
        }
    }

    // A base64 nonce only adds header-safe characters, so checking the
    // template with a sample value covers every rendering.
    let sample: String = directives
        .iter()
        .map(|d| format!("{} {}", d.name, d.sources.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
        .replace(NONCE_PLACEHOLDER, "AAAAAAAAAAAAAAAAAAAAAA==");
    if HeaderValue::from_str(&sample).is_err() {
        errors.push(ValidationError::InvalidHeaderValue("policy"));
    }
}
