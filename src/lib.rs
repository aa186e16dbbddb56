//! CSP edge rewriter library.
//!
//! Forwards every request to one pinned origin and hardens HTML responses
//! with a per-response Content-Security-Policy nonce.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rewrite;
pub mod security;

pub use config::schema::EdgeConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
