//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, proxy handler)
//!     → forward.rs (pin to origin, keep Host/path/query)
//!     → hyper client → origin
//!     → response.rs (HTML gate, security headers, body rewrite)
//!     → Send to client
//! ```

pub mod forward;
pub mod profile;
pub mod response;
pub mod server;

pub use forward::{build_forward_request, ForwardError};
pub use profile::EdgeProfile;
pub use server::HttpServer;
