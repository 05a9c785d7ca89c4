//! Locheal CLI Library
//!
//! Command-line interface for the Locheal healing engine.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
mod output;

pub use commands::{
    ActionArg, Cli, ColorArg, Commands, ConfigArgs, HealArgs, LocatorTypeArg, LogFormatArg,
    MaskArgs, OutputFormat, VerifyArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{to_json, Renderer};
