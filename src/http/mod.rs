//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing, request id, timeout)
//!     → visits layer (report after the chain succeeds)
//!     → forward.rs (route match, upstream request)
//!     → Send to client
//! ```

pub mod forward;
pub mod server;

pub use forward::{ForwardError, ForwardService};
pub use server::HttpServer;
