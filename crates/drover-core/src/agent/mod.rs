//! Agent invocation: CLI argument construction, credential injection,
//! prompt templates, and the tracked subprocess runner.

pub mod args;
pub mod credentials;
pub mod prompt;
pub mod runner;

// Re-export the primary public API at the module level.
pub use args::RepoParams;
pub use runner::{AgentOutcome, AgentRunner, LaunchError};
