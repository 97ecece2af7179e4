//! Visit reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Request
//!     → layer.rs (snapshot path, method, headers; call inner service)
//!     → inner service succeeds → response returned to client
//!                              → reporter.rs spawns delivery task
//!                                  → event.rs (sanitize, serialize)
//!                                  → POST endpoint (Bearer token)
//!     → inner service fails → error propagated, nothing reported
//! ```

pub mod event;
pub mod layer;
pub mod reporter;

pub use event::{HostAddedHeaders, VisitEvent};
pub use layer::{DarkVisitors, DarkVisitorsLayer};
pub use reporter::{ReportError, VisitReporter};
