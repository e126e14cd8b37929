//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::TaskPriority;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

/// biorch - business intelligence orchestration engine
///
/// Routes business tasks to capability providers, runs them in parallel
/// or as a pipeline, and synthesizes one report from their answers.
///
/// Examples:
///   biorch run security_audit --capability security,quality
///   biorch run pipeline_analysis --priority critical --context project=apollo
///   biorch run --task-file task.json --format json --output result.json
///   biorch health --watch 30
///   biorch init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .biorch.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true, env = "BIORCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Per-provider call timeout in seconds (overrides config)
    #[arg(long, value_name = "SECS", global = true)]
    pub call_timeout: Option<u64>,

    /// Health probe timeout in seconds (overrides config)
    #[arg(long, value_name = "SECS", global = true)]
    pub health_timeout: Option<u64>,

    /// Provider used when no rule matches a task type (overrides config)
    #[arg(long, value_name = "NAME", global = true)]
    pub default_provider: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Execute one business task and print the report
    Run(RunArgs),

    /// Probe providers and print the orchestration status
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe provider health
    Health {
        /// Re-probe every SECS seconds until interrupted
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },

    /// Generate a default .biorch.toml configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Task type used for rule matching (e.g. security_audit)
    #[arg(value_name = "TASK_TYPE", required_unless_present = "task_file")]
    pub task_type: Option<String>,

    /// Read the task from a JSON file; flags override its fields
    #[arg(long, value_name = "FILE")]
    pub task_file: Option<PathBuf>,

    /// Explicit task id (generated if omitted)
    #[arg(long, value_name = "ID")]
    pub task_id: Option<String>,

    /// Human readable description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Required capabilities (comma-separated)
    ///
    /// Example: --capability security,quality
    #[arg(long = "capability", value_name = "CAPS", value_delimiter = ',')]
    pub capabilities: Vec<String>,

    /// Task priority; critical aborts a sequential pipeline on the first failure
    #[arg(short, long, value_name = "LEVEL")]
    pub priority: Option<PriorityArg>,

    /// Context entries passed to providers, as key=value
    ///
    /// Values that parse as JSON are sent as JSON, anything else as a string.
    #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_context_pair)]
    pub context: Vec<(String, Value)>,

    /// Overall task deadline in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Skip result synthesis
    #[arg(long)]
    pub no_synthesis: bool,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Priority accepted by `--priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum PriorityArg {
    Low,
    Medium,
    High,
    Critical,
}

impl From<PriorityArg> for TaskPriority {
    fn from(level: PriorityArg) -> Self {
        match level {
            PriorityArg::Low => TaskPriority::Low,
            PriorityArg::Medium => TaskPriority::Medium,
            PriorityArg::High => TaskPriority::High,
            PriorityArg::Critical => TaskPriority::Critical,
        }
    }
}

/// Parse a `key=value` context entry.
pub fn parse_context_pair(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.call_timeout == Some(0) {
            return Err("Call timeout must be at least 1 second".to_string());
        }
        if self.health_timeout == Some(0) {
            return Err("Health timeout must be at least 1 second".to_string());
        }

        match &self.command {
            Command::Run(run) => {
                if run.timeout == Some(0) {
                    return Err("Timeout must be at least 1 second".to_string());
                }
                if let Some(ref path) = run.task_file {
                    if !path.is_file() {
                        return Err(format!("Task file does not exist: {}", path.display()));
                    }
                }
            }
            Command::Health { watch: Some(0) } => {
                return Err("Watch interval must be at least 1 second".to_string());
            }
            _ => {}
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_run() {
        let args = parse(&[
            "biorch",
            "run",
            "security_audit",
            "--capability",
            "security,quality",
            "--priority",
            "critical",
            "--context",
            "project=apollo",
            "--context",
            "limit=5",
            "--format",
            "json",
        ]);

        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.task_type.as_deref(), Some("security_audit"));
        assert_eq!(run.capabilities, vec!["security", "quality"]);
        assert_eq!(run.priority, Some(PriorityArg::Critical));
        assert_eq!(run.context[0], ("project".to_string(), json!("apollo")));
        assert_eq!(run.context[1], ("limit".to_string(), json!(5)));
        assert_eq!(run.format, OutputFormat::Json);
    }

    #[test]
    fn test_run_requires_task_type_or_file() {
        assert!(Args::try_parse_from(["biorch", "run"]).is_err());
        assert!(Args::try_parse_from(["biorch", "run", "--task-file", "t.json"]).is_ok());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["biorch", "status", "--verbose", "--call-timeout", "10"]);
        assert!(args.verbose);
        assert_eq!(args.call_timeout, Some(10));
    }

    #[test]
    fn test_parse_context_pair() {
        assert_eq!(
            parse_context_pair("flags={\"a\":true}").unwrap(),
            ("flags".to_string(), json!({"a": true}))
        );
        assert_eq!(
            parse_context_pair("note=a=b").unwrap(),
            ("note".to_string(), json!("a=b"))
        );
        assert!(parse_context_pair("novalue").is_err());
        assert!(parse_context_pair("=x").is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let args = parse(&["biorch", "status", "--verbose", "--quiet"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_watch() {
        let args = parse(&["biorch", "health", "--watch", "0"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_task_file() {
        let args = parse(&["biorch", "run", "--task-file", "/nonexistent/task.json"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = parse(&["biorch", "status"]);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_priority_conversion() {
        assert_eq!(TaskPriority::from(PriorityArg::Critical), TaskPriority::Critical);
        assert_eq!(TaskPriority::from(PriorityArg::Low), TaskPriority::Low);
    }
}
