//! Compiled per-config request handling profile.

use std::net::SocketAddr;

use crate::config::{validate_config, ConfigError, EdgeConfig, ValidationError};
use crate::rewrite::CspPolicy;
use crate::security::SecurityHeaders;

/// Everything a request needs from the configuration, parsed once.
///
/// Rebuilt on every reload and swapped in atomically.
#[derive(Debug, Clone)]
pub struct EdgeProfile {
    /// Pinned origin address.
    pub origin: SocketAddr,
    pub policy: CspPolicy,
    pub security_headers: SecurityHeaders,
    pub force_identity_encoding: bool,
    pub channel_capacity: usize,
}

impl EdgeProfile {
    pub fn from_config(config: &EdgeConfig) -> Result<Self, ConfigError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let origin = config.origin.address.parse().map_err(|_| {
            ConfigError::Validation(vec![ValidationError::InvalidAddress {
                field: "origin.address",
                value: config.origin.address.clone(),
            }])
        })?;
        let security_headers = SecurityHeaders::from_config(&config.security_headers)
            .map_err(|_| {
                ConfigError::Validation(vec![ValidationError::InvalidHeaderValue(
                    "security_headers",
                )])
            })?;

        let policy = CspPolicy::from_config(&config.policy);
        if !policy.uses_nonce() {
            tracing::warn!("CSP policy has no 'nonce-{{nonce}}' source; injected nonces will have no effect");
        }

        Ok(Self {
            origin,
            policy,
            security_headers,
            force_identity_encoding: config.rewrite.force_identity_encoding,
            channel_capacity: config.rewrite.channel_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_defaults() {
        let profile = EdgeProfile::from_config(&EdgeConfig::default()).unwrap();
        assert_eq!(profile.origin, "127.0.0.1:3000".parse().unwrap());
        assert!(profile.policy.uses_nonce());
        assert_eq!(profile.channel_capacity, 16);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = EdgeConfig::default();
        config.origin.address = "origin.example:80".into();
        assert!(matches!(
            EdgeProfile::from_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }
}
