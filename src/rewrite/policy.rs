//! Content-Security-Policy rendering.

use axum::http::header::InvalidHeaderValue;
use axum::http::HeaderValue;

use crate::config::schema::{PolicyConfig, NONCE_PLACEHOLDER};
use crate::rewrite::nonce::Nonce;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Directive {
    name: String,
    sources: Vec<String>,
}

/// An ordered directive list with nonce slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspPolicy {
    directives: Vec<Directive>,
}

impl CspPolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            directives: config
                .directives
                .iter()
                .map(|d| Directive {
                    name: d.name.clone(),
                    sources: d.sources.clone(),
                })
                .collect(),
        }
    }

    /// Whether any source expression carries the nonce placeholder.
    pub fn uses_nonce(&self) -> bool {
        self.directives
            .iter()
            .flat_map(|d| d.sources.iter())
            .any(|s| s.contains(NONCE_PLACEHOLDER))
    }

    /// Serialize the policy, substituting `nonce` into every nonce slot.
    pub fn render(&self, nonce: &Nonce) -> String {
        let mut out = String::new();
        for (i, directive) in self.directives.iter().enumerate() {
            if i > 0 {
                out.push_str("; ");
            }
            out.push_str(&directive.name);
            for source in &directive.sources {
                out.push(' ');
                out.push_str(&source.replace(NONCE_PLACEHOLDER, nonce.as_str()));
            }
        }
        out
    }

    pub fn header_value(&self, nonce: &Nonce) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&self.render(nonce))
    }
}
