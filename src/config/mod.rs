//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EdgeConfig (validated, immutable)
//!     → compiled into an EdgeProfile shared by all request handlers
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the EdgeProfile atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    DirectiveConfig, EdgeConfig, ListenerConfig, ObservabilityConfig, OriginConfig, PolicyConfig,
    RewriteConfig, SecurityHeadersConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
