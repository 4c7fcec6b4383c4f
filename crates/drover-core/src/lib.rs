//! Core library for drover: subprocess lifecycle and output reconciliation
//! for an HTTP facade over an autonomous coding agent.
//!
//! # Architecture
//!
//! ```text
//! HTTP handler
//!     |
//!     v
//! AgentRunner::run(args, api_key)
//!     |  inject credential, spawn entrypoint
//!     v
//! ProcessRegistry  <--- shutdown drain (SIGTERM, grace, SIGKILL)
//!     |
//!     |  stdout captured at exit
//!     v
//! reconcile::reconcile(stdout) --> Reconciled::{Structured, Raw}
//! ```
//!
//! The registry and the runner share ownership of live child processes so
//! that a terminating server can bring every agent down before the HTTP
//! layer finishes its own graceful shutdown.

pub mod agent;
pub mod reconcile;
pub mod registry;

// Re-export the primary public API at the crate level.
pub use agent::{AgentOutcome, AgentRunner, LaunchError, RepoParams};
pub use reconcile::{Reconciled, reconcile};
pub use registry::ProcessRegistry;
