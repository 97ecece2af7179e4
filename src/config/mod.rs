//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! proxy.toml                          visits.conf (optional)
//!     → loader.rs (parse & deserialize)   → directive.rs (block syntax)
//!     → validation.rs (semantic checks)
//!     → visits.rs (defaults, placeholders.rs expansion, token check)
//!     → ProxyConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → server swaps routes and visit settings atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All host fields have defaults to allow minimal configs
//! - Visit settings reject unknown fields; a missing token is fatal

pub mod directive;
pub mod loader;
pub mod placeholders;
pub mod schema;
pub mod validation;
pub mod visits;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::ProxyConfig;
pub use schema::ListenerConfig;
pub use schema::RouteConfig;
pub use visits::{VisitsConfig, DEFAULT_ENDPOINT};
