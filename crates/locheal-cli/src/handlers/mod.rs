//! Command handlers - extracted from main.rs for testability
//!
//! Handlers write their report to the given writer so tests can capture it.

pub mod config;
pub mod heal;
pub mod mask;
pub mod verify;

use std::path::Path;

use crate::error::{CliError, CliResult};

pub use config::execute_config;
pub use heal::{build_context, execute_heal};
pub use mask::{execute_mask, parse_rules};
pub use verify::execute_verify;

/// Read a UTF-8 file, naming it in the error
pub fn read_file(path: &Path) -> CliResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        CliError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })
}
