// CLI module for speexogg
//
// Only compiled into the binary; the library has no clap dependency at runtime.

pub mod commands;
pub mod config;
pub mod output;

pub use config::{Commands, Config};
pub use output::OutputFormatter;

// Error type for CLI operations
pub type CliResult<T> = anyhow::Result<T>;
