//! Mask command handler

use std::io::Write;

use locheal::{detect_pii, mask_pii, PiiRule};

use super::read_file;
use crate::commands::MaskArgs;
use crate::config::CliConfig;
use crate::error::CliResult;

/// Parse `--rules` values; an empty list selects every rule
pub fn parse_rules(rules: &[String]) -> CliResult<Vec<PiiRule>> {
    let mut parsed = Vec::with_capacity(rules.len());
    for rule in rules.iter().filter(|r| !r.trim().is_empty()) {
        let rule: PiiRule = rule.parse()?;
        if !parsed.contains(&rule) {
            parsed.push(rule);
        }
    }
    Ok(parsed)
}

/// Execute the mask command
pub fn execute_mask(config: &CliConfig, args: &MaskArgs, out: &mut dyn Write) -> CliResult<()> {
    let html = read_file(&args.file)?;
    let rules = parse_rules(&args.rules)?;
    let found = detect_pii(&html);
    let masked = mask_pii(&html, &rules);

    if let Some(path) = &args.output {
        std::fs::write(path, &masked)?;
        if !config.verbosity.is_quiet() {
            let kinds: Vec<&str> = found.iter().map(|r| r.as_str()).collect();
            eprintln!(
                "Masked {} -> {} (found: {})",
                args.file.display(),
                path.display(),
                if kinds.is_empty() { "none".to_string() } else { kinds.join(", ") }
            );
        }
    } else {
        out.write_all(masked.as_bytes())?;
    }
    tracing::info!(file = %args.file.display(), kinds = found.len(), "masked personal data");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use std::path::PathBuf;

    fn args(file: PathBuf, rules: &[&str], output: Option<PathBuf>) -> MaskArgs {
        MaskArgs {
            file,
            rules: rules.iter().map(ToString::to_string).collect(),
            output,
        }
    }

    #[test]
    fn test_parse_rules() {
        let rules = parse_rules(&["emails".into(), "phone".into(), "emails".into()]).unwrap();
        assert_eq!(rules, vec![PiiRule::Emails, PiiRule::Phones]);
        assert!(parse_rules(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_unknown_rule() {
        let err = parse_rules(&["ssn".into()]).unwrap_err();
        assert!(matches!(err, CliError::Heal(_)));
    }

    #[test]
    fn test_mask_to_writer() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("page.html");
        std::fs::write(&file, "<p>mail bob@example.com, user_42</p>").unwrap();

        let mut out = Vec::new();
        execute_mask(&CliConfig::new(), &args(file, &["emails"], None), &mut out).unwrap();
        let masked = String::from_utf8(out).unwrap();
        assert!(!masked.contains("bob@example.com"));
        assert!(masked.contains("user_42"));
    }

    #[test]
    fn test_mask_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("page.html");
        let output = dir.path().join("masked.html");
        std::fs::write(&file, "<p>call 555-123-4567</p>").unwrap();

        let mut out = Vec::new();
        let config = CliConfig::new().with_verbosity(crate::config::Verbosity::Quiet);
        execute_mask(&config, &args(file, &[], Some(output.clone())), &mut out).unwrap();
        assert!(out.is_empty());
        let masked = std::fs::read_to_string(output).unwrap();
        assert!(!masked.contains("555-123-4567"));
    }
}
