//! Daemon binary support library: configuration, telemetry, and the
//! repository/service/agent-pool wiring the `taskguild` binary starts.

pub mod command_runtime;
pub mod config;
pub mod setup;
pub mod telemetry;
pub mod worktree;

pub use config::Config;
pub use setup::{create_repository, ensure_database_directory, initialize_app, load_task_definition, Application};
pub use telemetry::init_telemetry;
