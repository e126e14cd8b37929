//! biorch - business intelligence orchestration CLI
//!
//! Loads the provider catalogue and rule table, probes provider health and
//! runs business tasks through the orchestrator.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, I/O, invalid task, etc.)
//!   2 - The task ran but its result has success = false

use anyhow::{Context, Result};
use bi_orchestrator::cli::{Args, Command, OutputFormat, RunArgs};
use bi_orchestrator::config::{Config, DEFAULT_CONFIG_FILE};
use bi_orchestrator::models::BusinessTask;
use bi_orchestrator::orchestrator::Orchestrator;
use bi_orchestrator::report;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if let Command::InitConfig { force } = args.command {
        return handle_init_config(force);
    }

    init_logging(&args);

    info!("biorch v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .biorch.toml.
fn handle_init_config(force: bool) -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() && !force {
        eprintln!(
            "⚠️  {} already exists. Remove it first, edit it manually, or pass --force.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize providers, rules, failover and timeouts.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG` takes precedence over the verbosity flags. Logs go to stderr
/// so reports printed to stdout stay clean.
fn init_logging(args: &Args) {
    let level = args.log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch the subcommand. Returns the process exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;

    match &args.command {
        Command::Run(run_args) => handle_run(run_args, &config, args.quiet).await,
        Command::Status { json } => handle_status(&config, *json, args.quiet).await,
        Command::Health { watch } => handle_health(&config, *watch, args.quiet).await,
        Command::InitConfig { .. } => Ok(0),
    }
}

/// Execute one task and print or save its report.
async fn handle_run(run_args: &RunArgs, config: &Config, quiet: bool) -> Result<i32> {
    let task = build_task(run_args, config)?;
    if task.required_capabilities.is_empty() {
        warn!("Task has no required capabilities; no provider can be selected");
    }

    let orchestrator = Orchestrator::from_config(config)?;

    let spinner = create_spinner(quiet, "Probing providers...");
    let summary = orchestrator.initialize().await;
    spinner.set_message(format!(
        "Running {} task {} ({}/{} providers healthy)",
        task.task_type, task.task_id, summary.healthy, summary.total
    ));

    let result = orchestrator
        .execute_business_task(task)
        .await
        .context("Task rejected")?;
    spinner.finish_and_clear();

    let output = match run_args.format {
        OutputFormat::Json => report::generate_json_report(&result)?,
        OutputFormat::Markdown => report::generate_markdown_report(&result),
    };

    match run_args.output {
        Some(ref path) => {
            report::write_report(&output, path)?;
            if !quiet {
                println!("📝 Report saved to: {}", path.display());
            }
        }
        None => println!("{}", output),
    }

    if result.success {
        if !quiet {
            eprintln!(
                "✅ Task {} completed in {}ms",
                result.task_id, result.execution_time_ms
            );
        }
        Ok(0)
    } else {
        eprintln!(
            "⛔ Task {} failed: {}",
            result.task_id,
            result.error_message.as_deref().unwrap_or("unknown error")
        );
        Ok(2)
    }
}

/// Probe providers once and print the orchestration status.
async fn handle_status(config: &Config, json: bool, quiet: bool) -> Result<i32> {
    let orchestrator = Orchestrator::from_config(config)?;

    let spinner = create_spinner(quiet, "Probing providers...");
    orchestrator.initialize().await;
    spinner.finish_and_clear();

    let status = orchestrator.get_orchestration_status();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", report::generate_status_markdown(&status));
    }

    Ok(0)
}

/// Probe provider health once, or repeatedly with `--watch`.
async fn handle_health(config: &Config, watch: Option<u64>, quiet: bool) -> Result<i32> {
    let orchestrator = Orchestrator::from_config(config)?;
    let health = orchestrator.health();

    let Some(secs) = watch else {
        let spinner = create_spinner(quiet, "Probing providers...");
        health.check_all().await;
        spinner.finish_and_clear();
        println!(
            "{}",
            report::generate_health_markdown(&health.summary(), &health.records())
        );
        return Ok(0);
    };

    info!("Watching provider health every {}s (Ctrl-C to stop)", secs);
    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                health.check_all().await;
                println!(
                    "{}",
                    report::generate_health_markdown(&health.summary(), &health.records())
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping health watch");
                break;
            }
        }
    }

    Ok(0)
}

/// Build the task from `--task-file` and/or flags; flags win.
fn build_task(run_args: &RunArgs, config: &Config) -> Result<BusinessTask> {
    let mut task = match run_args.task_file {
        Some(ref path) => load_task_file(path, config)?,
        None => BusinessTask::builder(run_args.task_type.clone().unwrap_or_default())
            .max_execution_time_seconds(config.dispatch.default_max_execution_seconds)
            .build()?,
    };

    if let Some(ref task_type) = run_args.task_type {
        task.task_type = task_type.clone();
    }
    if let Some(ref task_id) = run_args.task_id {
        task.task_id = task_id.clone();
    }
    if let Some(ref description) = run_args.description {
        task.description = description.clone();
    }
    task.required_capabilities
        .extend(run_args.capabilities.iter().map(|c| c.trim().to_string()));
    if let Some(priority) = run_args.priority {
        task.priority = priority.into();
    }
    for (key, value) in &run_args.context {
        task.context_data.insert(key.clone(), value.clone());
    }
    if let Some(timeout) = run_args.timeout {
        task.max_execution_time_seconds = timeout;
    }
    if run_args.no_synthesis {
        task.requires_synthesis = false;
    }

    task.validate()?;
    Ok(task)
}

/// Read a task from JSON; a missing id is generated and a missing deadline
/// comes from the config.
fn load_task_file(path: &Path, config: &Config) -> Result<BusinessTask> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read task file: {}", path.display()))?;
    let mut value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse task file: {}", path.display()))?;

    if let Some(fields) = value.as_object_mut() {
        fields
            .entry("task_id")
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        fields
            .entry("max_execution_time_seconds")
            .or_insert_with(|| Value::from(config.dispatch.default_max_execution_seconds));
    }

    serde_json::from_value(value)
        .with_context(|| format!("Invalid task in {}", path.display()))
}

fn create_spinner(quiet: bool, message: &str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
