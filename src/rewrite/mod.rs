//! HTML hardening subsystem.
//!
//! # Data Flow
//! ```text
//! HTML origin response
//!     → nonce.rs (16 random bytes, base64)
//!     → policy.rs (CSP header with the nonce substituted)
//!     → html.rs (selector dispatch table, lol_html handlers)
//!     → body.rs (bounded streaming pipeline around the rewriter)
//! ```
//!
//! # Design Decisions
//! - One nonce per response; the header and the markup share the same value
//! - Single streaming pass, no document buffering
//! - Elements matching no rule pass through byte for byte

pub mod body;
pub mod html;
pub mod nonce;
pub mod policy;

use thiserror::Error;

pub use body::rewrite_body;
pub use html::{ElementRule, RULES};
pub use nonce::Nonce;
pub use policy::CspPolicy;

/// Errors that end a rewritten response body early.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("invalid selector: {0}")]
    Selector(#[from] lol_html::errors::SelectorError),

    #[error("HTML rewriting failed: {0}")]
    Rewriting(#[from] lol_html::errors::RewritingError),

    #[error("origin body error: {0}")]
    Origin(#[from] axum::Error),

    #[error("rewrite worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
