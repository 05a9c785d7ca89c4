//! Report rendering for stdout

use console::Style;
use locheal::{Candidate, ExistenceReport, HealReport};
use serde::Serialize;
use std::fmt::Write as _;

use crate::commands::OutputFormat;
use crate::error::CliResult;

/// Renders reports as styled text or JSON
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    /// Whether to use colors
    pub use_color: bool,
    /// Text or JSON
    pub format: OutputFormat,
}

impl Renderer {
    /// Create a new renderer
    #[must_use]
    pub const fn new(format: OutputFormat, use_color: bool) -> Self {
        Self { use_color, format }
    }

    fn paint(&self, style: &Style, text: impl std::fmt::Display) -> String {
        if self.use_color {
            style.clone().force_styling(true).apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Render a healing report
    pub fn heal_report(&self, report: &HealReport) -> CliResult<String> {
        if self.format == OutputFormat::Json {
            return to_json(report);
        }

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {}",
            self.paint(&Style::new().bold(), "Request"),
            report.request_id
        );
        if let Some(warning) = &report.warning {
            let _ = writeln!(
                out,
                "{} {warning}",
                self.paint(&Style::new().yellow().bold(), "WARN")
            );
        }

        if report.candidates.is_empty() {
            let _ = writeln!(out, "{}", self.paint(&Style::new().red(), &report.message));
            return Ok(out);
        }

        let _ = writeln!(out, "{}", report.message);
        let _ = writeln!(out);
        for (index, candidate) in report.candidates.iter().enumerate() {
            let marker = if report.auto_apply_index == Some(index) {
                self.paint(&Style::new().green().bold(), "*")
            } else {
                " ".to_string()
            };
            let _ = writeln!(out, "{marker} {}", self.candidate_line(index, candidate));
            let _ = writeln!(out, "      {}", self.paint(&Style::new().dim(), &candidate.reason));
        }

        if let Some(action) = &report.verify_action {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "verify: {} {} ({})",
                serde_json::to_string(&action.action_type)?.trim_matches('"'),
                action.locator,
                action.locator_type
            );
        }
        Ok(out)
    }

    fn candidate_line(&self, index: usize, candidate: &Candidate) -> String {
        let risk = candidate.risk_score.unwrap_or(0.0);
        let risk_style = if risk >= 0.8 {
            Style::new().red().bold()
        } else if risk > 0.0 {
            Style::new().yellow()
        } else {
            Style::new().green()
        };
        format!(
            "{:>2}. {} [{}] score {} risk {}",
            index + 1,
            self.paint(&Style::new().cyan(), &candidate.locator),
            candidate.locator_type,
            self.paint(&Style::new().bold(), format!("{:.3}", candidate.score)),
            self.paint(&risk_style, format!("{risk:.2}"))
        )
    }

    /// Render a locator existence report
    pub fn existence_report(&self, locator: &str, report: &ExistenceReport) -> CliResult<String> {
        if self.format == OutputFormat::Json {
            return to_json(report);
        }

        let mut out = String::new();
        if let Some(error) = &report.error {
            let _ = writeln!(
                out,
                "{} {locator}: {error}",
                self.paint(&Style::new().red().bold(), "INVALID")
            );
            return Ok(out);
        }
        let status = if report.exists {
            self.paint(&Style::new().green().bold(), "FOUND")
        } else {
            self.paint(&Style::new().red().bold(), "MISSING")
        };
        let _ = writeln!(out, "{status} {locator} ({} matches)", report.count);
        for element in &report.elements {
            let _ = writeln!(out, "  <{}> {}", element.tag, element.text);
        }
        Ok(out)
    }
}

/// Pretty JSON with a trailing newline
pub fn to_json<T: Serialize>(value: &T) -> CliResult<String> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}
