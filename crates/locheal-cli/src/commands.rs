//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Locheal: heal broken UI-test locators against a page snapshot
#[derive(Parser, Debug)]
#[command(name = "locheal")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Propose replacement locators for one that no longer resolves
    Heal(HealArgs),

    /// Check whether a locator resolves against a page
    Verify(VerifyArgs),

    /// Mask personal data in an HTML file
    Mask(MaskArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormatArg {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Report output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Styled text
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Locator strategy argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LocatorTypeArg {
    /// CSS selector
    #[default]
    Css,
    /// XPath expression
    Xpath,
    /// Bare id attribute value
    Id,
    /// Bare name attribute value
    Name,
}

impl From<LocatorTypeArg> for locheal::LocatorType {
    fn from(arg: LocatorTypeArg) -> Self {
        match arg {
            LocatorTypeArg::Css => Self::Css,
            LocatorTypeArg::Xpath => Self::Xpath,
            LocatorTypeArg::Id => Self::Id,
            LocatorTypeArg::Name => Self::Name,
        }
    }
}

/// Action the test was performing
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActionArg {
    /// Click the element
    Click,
    /// Type into the element
    SendKeys,
    /// Read the element text
    GetText,
    /// Submit a form
    Submit,
    /// No particular action
    #[default]
    None,
}

impl From<ActionArg> for locheal::HealAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Click => Self::Click,
            ActionArg::SendKeys => Self::SendKeys,
            ActionArg::GetText => Self::GetText,
            ActionArg::Submit => Self::Submit,
            ActionArg::None => Self::None,
        }
    }
}

/// Arguments for the heal command
#[derive(Parser, Debug)]
pub struct HealArgs {
    /// HTML snapshot of the current page
    #[arg(long, value_name = "FILE")]
    pub html: PathBuf,

    /// The locator that no longer resolves
    #[arg(short, long)]
    pub locator: String,

    /// Locator strategy
    #[arg(short = 't', long = "type", default_value = "css")]
    pub locator_type: LocatorTypeArg,

    /// JSON file with the recorded healing context
    #[arg(long, value_name = "FILE")]
    pub context: Option<PathBuf>,

    /// Anchor text recorded near the element (repeatable)
    #[arg(short, long)]
    pub anchor: Vec<String>,

    /// Text the element showed when the locator last worked
    #[arg(long)]
    pub visible_text: Option<String>,

    /// Action the test was performing
    #[arg(long, default_value = "none")]
    pub action: ActionArg,

    /// YAML healing configuration
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of candidates to report
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Ask the pattern provider for extra candidates on weak results
    #[arg(long)]
    pub pattern_provider: bool,

    /// JSON weights for the linear rescorer
    #[arg(long, value_name = "FILE")]
    pub rescorer: Option<PathBuf>,

    /// Treat the page as not yet masked for personal data
    #[arg(long)]
    pub unmasked: bool,
}

/// Arguments for the verify command
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// HTML snapshot of the current page
    #[arg(long, value_name = "FILE")]
    pub html: PathBuf,

    /// Locator to check
    #[arg(short, long)]
    pub locator: String,

    /// Locator strategy
    #[arg(short = 't', long = "type", default_value = "css")]
    pub locator_type: LocatorTypeArg,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the mask command
#[derive(Parser, Debug)]
pub struct MaskArgs {
    /// HTML file to mask
    pub file: PathBuf,

    /// Rules to apply (emails, phones, user_ids); all when omitted
    #[arg(short, long, value_delimiter = ',')]
    pub rules: Vec<String>,

    /// Write to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// YAML healing configuration to load and validate
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}
