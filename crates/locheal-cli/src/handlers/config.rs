//! Config command handler

use std::io::Write;

use crate::commands::ConfigArgs;
use crate::config::CliConfig;
use crate::error::CliResult;

/// Execute the config command
///
/// Without `--show` the configuration is only loaded and validated.
pub fn execute_config(config: &CliConfig, args: &ConfigArgs, out: &mut dyn Write) -> CliResult<()> {
    let config = match &args.config {
        Some(path) => config.clone().load_heal_config(path)?,
        None => config.clone(),
    };
    config.heal.validate()?;

    if args.show {
        writeln!(out, "# verbosity: {:?}", config.verbosity)?;
        writeln!(out, "# color: {:?}", config.color)?;
        out.write_all(config.heal.to_yaml()?.as_bytes())?;
    } else if !config.verbosity.is_quiet() {
        writeln!(out, "Configuration OK")?;
    }
    Ok(())
}
