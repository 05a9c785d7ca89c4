//! Locheal CLI: heal broken UI-test locators
//!
//! ## Usage
//!
//! ```bash
//! locheal heal --html page.html -l "#login" -a "Username:"   # Ranked replacements
//! locheal verify --html page.html -l "//button" -t xpath     # Does it resolve?
//! locheal mask page.html --rules emails,phones               # Strip personal data
//! locheal config --show                                      # Effective settings
//! ```

use clap::Parser;
use locheal_cli::{
    handlers::{execute_config, execute_heal, execute_mask, execute_verify},
    logging, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    // Build configuration from CLI args
    let config = build_config(&cli);
    logging::init(&config, cli.log_format);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Commands::Heal(args) => {
            let config = match &args.config {
                Some(path) => config.load_heal_config(path)?,
                None => config,
            };
            execute_heal(&config, &args, &mut out)
        }
        Commands::Verify(args) => execute_verify(&config, &args, &mut out),
        Commands::Mask(args) => execute_mask(&config, &args, &mut out),
        Commands::Config(args) => execute_config(&config, &args, &mut out),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    let color: ColorChoice = cli.color.into();
    CliConfig::new().with_verbosity(verbosity).with_color(color)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_quiet_wins() {
        let cli = Cli::parse_from(["locheal", "-q", "-vv", "config"]);
        let config = build_config(&cli);
        assert_eq!(config.verbosity, Verbosity::Quiet);
    }

    #[test]
    fn test_build_config_color() {
        let cli = Cli::parse_from(["locheal", "--color", "always", "config"]);
        assert_eq!(build_config(&cli).color, ColorChoice::Always);
    }
}
