//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod inspect;
pub mod models;
pub mod replay;
pub mod serve;
pub mod utils;

// Re-export main command functions
pub use inspect::execute_inspect;
pub use models::{InspectArgs, ReplayArgs, ServeArgs, SessionOptions};
pub use replay::{execute_replay, validate_replay_args};
pub use serve::{execute_serve, validate_serve_args};
pub use utils::{display_schema, display_version};
