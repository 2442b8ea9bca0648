//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Flags left unset fall back to the config file.

use crate::config::Provider;
use crate::report::OutputFormat;
use clap::Parser;
use std::path::PathBuf;

/// MDPanel - a panel of AI specialists for medical reports
///
/// Sends one medical report to several specialist analyses in parallel
/// and combines their findings into a team assessment. For research and
/// education only; not medical advice.
///
/// Examples:
///   mdpanel
///   mdpanel --report "Medical Reports/case.txt"
///   cat case.txt | mdpanel --report - --format json --output out/case.json
///   mdpanel --provider ollama --model llama3.2 --deadline 120
///   mdpanel --list-reports
///   mdpanel --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Medical report to analyze (`-` reads stdin)
    ///
    /// Defaults to the first .txt file in the reports directory.
    #[arg(short, long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .mdpanel.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output file path for the diagnosis
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Directory searched for reports
    #[arg(long, value_name = "DIR", env = "MDPANEL_REPORTS_DIR")]
    pub reports_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// LLM provider
    #[arg(long, value_name = "PROVIDER", env = "MDPANEL_PROVIDER")]
    pub provider: Option<Provider>,

    /// Model name (defaults depend on the provider)
    #[arg(short, long, env = "MDPANEL_MODEL")]
    pub model: Option<String>,

    /// Override the provider's API base URL
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Temperature for LLM responses (0.0 - 2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Extra attempts on rate limits and timeouts
    #[arg(long, value_name = "COUNT")]
    pub retries: Option<usize>,

    /// Per-specialist timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Overall deadline for the specialist phase in seconds
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// List reports in the reports directory and exit
    #[arg(long)]
    pub list_reports: bool,

    /// Dry run: print the specialist prompts without calling the LLM
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .mdpanel.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config || self.list_reports {
            return Ok(());
        }

        if let Some(ref url) = self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 2.0".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }
        if self.deadline == Some(0) {
            return Err("Deadline must be at least 1 second".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
