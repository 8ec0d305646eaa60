//! Sandboxed snippet execution: a persistent working directory, memoised
//! dependency installs, captured child processes and output-file discovery.

pub mod config;
pub mod error;
pub mod execution;
pub mod files;
pub mod install;
pub mod logging;
pub mod process;
pub mod server;
pub mod workdir;

pub use config::{Config, RunnerSettings};
pub use error::RunnerError;
pub use execution::{Engine, ExecutionOutput, ExecutionReply, ExecutionRequest};
