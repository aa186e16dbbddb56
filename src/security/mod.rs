//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing request to origin:
//!     → headers.rs (strip hop-by-hop headers)
//! HTML response to client:
//!     → headers.rs (attach the static security header set)
//! ```

pub mod headers;

pub use headers::{strip_hop_by_hop, SecurityHeaders};
