//! Verify command handler

use std::io::Write;

use locheal::{parse, verify_locator_exists, LocatorType};

use super::read_file;
use crate::commands::VerifyArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::Renderer;

/// Execute the verify command
///
/// A locator that matches nothing is a normal report, not an error.
pub fn execute_verify(config: &CliConfig, args: &VerifyArgs, out: &mut dyn Write) -> CliResult<()> {
    let tree = parse(&read_file(&args.html)?)?;
    let report = verify_locator_exists(&tree, &args.locator, LocatorType::from(args.locator_type));
    tracing::info!(locator = %args.locator, count = report.count, "verified locator");
    let rendered = Renderer::new(args.format, config.color.should_color())
        .existence_report(&args.locator, &report)?;
    out.write_all(rendered.as_bytes())?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;
    use std::io::Write as _;

    fn run(html: &str, extra: &[&str]) -> String {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(html.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let mut argv = vec!["locheal", "verify", "--html", path.as_str()];
        argv.extend_from_slice(extra);
        let Commands::Verify(args) = Cli::parse_from(argv).command else {
            panic!("expected Verify command");
        };
        let mut out = Vec::new();
        execute_verify(&CliConfig::new(), &args, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_verify_found() {
        let out = run(r#"<button class="btn">A</button><button class="btn">B</button>"#, &["-l", ".btn"]);
        assert!(out.starts_with("FOUND .btn (2 matches)"));
    }

    #[test]
    fn test_verify_xpath_json() {
        let out = run(
            r#"<div><a href="/x">Home</a></div>"#,
            &["-l", "//a[text()='Home']", "-t", "xpath", "-f", "json"],
        );
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["exists"], true);
        assert_eq!(value["count"], 1);
    }

    #[test]
    fn test_verify_invalid_selector_reports_error() {
        let out = run("<p>x</p>", &["-l", "[[[", "-f", "json"]);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["exists"], false);
        assert!(value["error"].is_string());
    }
}
