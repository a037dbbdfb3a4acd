//! CLI layer for fragmint.
//!
//! Provides the command-line interface using clap, with commands
//! for initializing, managing, and querying fragmint's indexed state.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
