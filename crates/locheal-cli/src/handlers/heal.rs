//! Heal command handler

use std::io::Write;

use locheal::{HealRequest, Healer, HealingContext, LinearRescorer, LocatorType, PatternProvider};
use tracing::{debug, info};

use super::read_file;
use crate::commands::HealArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::Renderer;

/// Execute the heal command
pub fn execute_heal(config: &CliConfig, args: &HealArgs, out: &mut dyn Write) -> CliResult<()> {
    let html = read_file(&args.html)?;
    let context = build_context(args)?;

    let mut heal_config = config.heal.clone();
    if let Some(top_k) = args.top_k {
        heal_config.top_k = top_k;
    }
    let mut healer = Healer::new(heal_config)?;
    if args.pattern_provider {
        healer = healer.with_provider(PatternProvider::new());
    }
    if let Some(path) = &args.rescorer {
        let rescorer = LinearRescorer::from_path(path)
            .map_err(|e| CliError::config(format!("{}: {e}", path.display())))?;
        healer = healer.with_rescorer(rescorer);
    }

    let request = HealRequest::new(html, context)
        .with_request_id(uuid::Uuid::new_v4().to_string())
        .with_action(args.action.into())
        .with_pii_masked(!args.unmasked);
    info!(request_id = %request.request_id, html = %args.html.display(), "healing locator");

    let report = healer.heal(&request)?;
    let rendered = Renderer::new(args.format, config.color.should_color()).heal_report(&report)?;
    out.write_all(rendered.as_bytes())?;
    Ok(())
}

/// Healing context from `--context` JSON and the locator flags
///
/// Flags win over the file: the locator and its type always come from the
/// command line, anchors are appended, and `--visible-text` replaces the
/// recorded text.
pub fn build_context(args: &HealArgs) -> CliResult<HealingContext> {
    let locator_type = LocatorType::from(args.locator_type);
    let mut context = match &args.context {
        Some(path) => {
            let mut value: serde_json::Value = serde_json::from_str(&read_file(path)?)
                .map_err(|e| CliError::invalid_argument(format!("{}: {e}", path.display())))?;
            let Some(object) = value.as_object_mut() else {
                return Err(CliError::invalid_argument(format!(
                    "{}: context must be a JSON object",
                    path.display()
                )));
            };
            object.insert(
                "original_locator".to_string(),
                serde_json::Value::String(args.locator.clone()),
            );
            debug!(fields = object.len(), "loaded healing context");
            serde_json::from_value::<HealingContext>(value)
                .map_err(|e| CliError::invalid_argument(format!("{}: {e}", path.display())))?
        }
        None => HealingContext::new(args.locator.clone(), locator_type),
    };
    context.original_locator_type = locator_type;
    context.anchors.extend(args.anchor.iter().cloned());
    if let Some(text) = &args.visible_text {
        context.visible_text = Some(text.clone());
    }
    Ok(context)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;
    use std::io::Write as _;

    fn heal_args(extra: &[&str]) -> HealArgs {
        let mut argv = vec!["locheal", "heal"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Heal(args) => args,
            _ => panic!("expected Heal command"),
        }
    }

    fn temp_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    mod context_tests {
        use super::*;

        #[test]
        fn test_context_from_flags() {
            let args = heal_args(&[
                "--html", "p.html", "-l", "user", "-t", "name", "-a", "Username:",
                "--visible-text", "Sign in",
            ]);
            let context = build_context(&args).unwrap();
            assert_eq!(context.original_locator, "user");
            assert_eq!(context.original_locator_type, LocatorType::Name);
            assert_eq!(context.anchors, vec!["Username:"]);
            assert_eq!(context.visible_text.as_deref(), Some("Sign in"));
        }

        #[test]
        fn test_context_file_merged_with_flags() {
            let file = temp_file(
                r#"{"anchors": ["Password:"], "prev_sibling_text": "Email", "visible_text": "Go"}"#,
            );
            let path = file.path().to_str().unwrap();
            let args = heal_args(&["--html", "p.html", "-l", "#old", "--context", path, "-a", "Login"]);
            let context = build_context(&args).unwrap();
            assert_eq!(context.original_locator, "#old");
            assert_eq!(context.anchors, vec!["Password:", "Login"]);
            assert_eq!(context.prev_sibling_text.as_deref(), Some("Email"));
            assert_eq!(context.visible_text.as_deref(), Some("Go"));
        }

        #[test]
        fn test_context_file_must_be_object() {
            let file = temp_file("[1, 2]");
            let path = file.path().to_str().unwrap();
            let args = heal_args(&["--html", "p.html", "-l", "#old", "--context", path]);
            let err = build_context(&args).unwrap_err();
            assert!(err.to_string().contains("JSON object"));
        }
    }

    mod execute_tests {
        use super::*;
        use crate::commands::OutputFormat;

        #[test]
        fn test_heal_writes_json_report() {
            let html = temp_file(r#"<form><button id="login-btn">Login</button></form>"#);
            let path = html.path().to_str().unwrap();
            let args = heal_args(&["--html", path, "-l", "login-btn", "-t", "id", "-f", "json"]);
            assert_eq!(args.format, OutputFormat::Json);

            let mut out = Vec::new();
            execute_heal(&CliConfig::new(), &args, &mut out).unwrap();
            let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
            assert_eq!(value["candidates"][0]["locator"], "#login-btn");
            assert_eq!(value["auto_apply_index"], 0);
        }

        #[test]
        fn test_heal_missing_file() {
            let args = heal_args(&["--html", "/nonexistent/page.html", "-l", "#x"]);
            let mut out = Vec::new();
            let err = execute_heal(&CliConfig::new(), &args, &mut out).unwrap_err();
            assert!(matches!(err, CliError::Io(_)));
        }

        #[test]
        fn test_heal_blank_html_is_rejected() {
            let html = temp_file("   ");
            let path = html.path().to_str().unwrap();
            let args = heal_args(&["--html", path, "-l", "#x"]);
            let mut out = Vec::new();
            let err = execute_heal(&CliConfig::new(), &args, &mut out).unwrap_err();
            assert!(matches!(err, CliError::Heal(_)));
        }

        #[test]
        fn test_heal_zero_top_k_is_rejected() {
            let html = temp_file("<button>Go</button>");
            let path = html.path().to_str().unwrap();
            let args = heal_args(&["--html", path, "-l", "#x", "-k", "0"]);
            let mut out = Vec::new();
            assert!(execute_heal(&CliConfig::new(), &args, &mut out).is_err());
        }
    }
}
