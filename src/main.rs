//! MDPanel - a panel of AI specialists for medical reports
//!
//! A CLI tool that runs several specialist LLM analyses of one medical
//! report in parallel, then synthesizes them into a team assessment.
//!
//! Exit codes:
//!   0 - Diagnosis produced
//!   1 - Runtime error (input, config, backend setup, etc.)
//!   2 - Pipeline failed (no specialist succeeded, synthesis failed, or aborted)

mod analysis;
mod backend;
mod cli;
mod config;
mod error;
mod input;
mod models;
mod pipeline;
mod progress;
mod report;
mod roster;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::Args;
use config::{Config, CONFIG_FILE};
use pipeline::{CoordinatorSettings, EventSink, Pipeline};
use report::ReportMetadata;
use roster::{Roster, REPORT_PLACEHOLDER};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up API keys from .env before anything reads the environment
    dotenvy::dotenv().ok();

    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, config.general.verbose);

    info!("MDPanel v{}", env!("CARGO_PKG_VERSION"));
    match config_source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .mdpanel.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to choose a provider, model, timeouts, or a custom specialist roster.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` overrides the flag-derived level.
fn init_logging(args: &Args, config_verbose: bool) {
    let level = if config_verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run one report through the panel. Returns exit code (0 or 2).
async fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();
    let reports_dir = config.general.reports_dir.clone();

    if args.list_reports {
        return handle_list_reports(&reports_dir);
    }

    // Step 1: Load the report
    let report_path = input::resolve_report(args.report.as_deref(), &reports_dir)?;
    let source = if report_path.as_os_str() == "-" {
        "stdin".to_string()
    } else {
        report_path.display().to_string()
    };
    println!("📄 Loading report: {}", source);
    let document = input::load_report(&report_path)?;
    debug!("Report has {} characters", document.char_count());

    for warning in input::assess_report(document.text()) {
        warn!("{}", warning);
        println!("   ⚠️  {}", warning);
    }

    // Step 2: Build roster and templates
    let roster = Roster::from_config(&config.specialists)?;
    let synthesis = roster::synthesis_template(config.synthesis.template.as_deref())?;

    if args.dry_run {
        return handle_dry_run(&roster, document.text());
    }

    // Step 3: Set up the backend and pipeline
    let backend = backend::build_backend(&config.backend, |key| std::env::var(key).ok())
        .context("Failed to configure LLM backend")?;
    let backend_label = backend.label();

    let settings = CoordinatorSettings {
        task_timeout: Duration::from_secs(config.pipeline.specialist_timeout_seconds),
        deadline: config.pipeline.deadline_seconds.map(Duration::from_secs),
        pool_size: config.pipeline.pool_size,
    };

    println!("🩺 Assembling specialist panel...");
    println!("   Model: {}", backend_label);
    println!(
        "   Specialists: {}",
        roster.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", ")
    );
    println!("   Timeout: {}s per specialist", settings.task_timeout.as_secs());
    if let Some(deadline) = settings.deadline {
        println!("   Deadline: {}s", deadline.as_secs());
    }

    let names: Vec<(String, String)> = roster
        .iter()
        .map(|s| (s.id.clone(), s.name.clone()))
        .collect();
    let mut pipeline = Pipeline::new(roster, synthesis, backend, settings)?;

    let progress = if args.quiet {
        None
    } else {
        let (sink, rx) = EventSink::channel();
        pipeline = pipeline.with_events(sink);
        Some(progress::spawn(names, rx))
    };

    // Ctrl-C cancels the run; completed outcomes are kept
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running specialists...");
            interrupt.cancel();
        }
    });

    // Step 4: Run the panel
    println!("\n🔬 Running specialist analyses...\n");
    let run = pipeline.run(document, cancel).await;

    info!(
        "{} of {} specialists succeeded",
        run.succeeded(),
        run.outcomes.len()
    );

    // Closing the event channel ends the progress task
    drop(pipeline);
    if let Some(handle) = progress {
        let _ = handle.await;
    }

    // Step 5: Write the output
    let output_path: PathBuf = config.general.output_path(args.format);
    let metadata = ReportMetadata {
        source,
        backend: backend_label,
        analysis_date: Utc::now(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    let content = report::render(&run, &metadata, args.format)?;
    report::write_report(&content, &output_path)?;

    println!("\n📊 Panel Summary:");
    println!("{}", report::console_summary(&run));
    println!("   Duration: {:.1}s", metadata.duration_seconds);

    if run.is_done() {
        println!(
            "\n✅ Diagnosis complete! Saved to: {}",
            output_path.display()
        );
        Ok(0)
    } else {
        eprintln!(
            "\n⛔ No diagnosis produced (exit code 2). Details saved to: {}",
            output_path.display()
        );
        Ok(2)
    }
}

/// Handle --list-reports: print the discovered reports and exit.
fn handle_list_reports(reports_dir: &Path) -> Result<i32> {
    let reports = input::discover_reports(reports_dir)?;

    if reports.is_empty() {
        println!("   No .txt reports found in {}", reports_dir.display());
    } else {
        println!("   Reports in {}:\n", reports_dir.display());
        for report in &reports {
            println!("     📄 {} ({} bytes)", report.name(), report.size);
        }
        println!("\n   Total: {} reports", reports.len());
    }

    Ok(0)
}

/// Handle --dry-run: print each specialist prompt, make no LLM calls.
fn handle_dry_run(roster: &Roster, report_text: &str) -> Result<i32> {
    println!("\n🔍 Dry run: rendering prompts (no LLM call)...\n");

    for specialist in roster.iter() {
        let prompt = specialist
            .template
            .render(&[(REPORT_PLACEHOLDER, report_text)])?;
        println!("===== {} ({}) =====", specialist.name, specialist.id);
        println!("{}\n", prompt);
    }

    println!("✅ Dry run complete. {} prompts rendered, no LLM calls were made.", roster.len());
    Ok(0)
}

/// Load configuration from file or use defaults.
///
/// Returns the config and the file it came from, if any.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, Some(config_path.clone())));
    }

    // Try default location
    match Config::load_default()? {
        Some(config) => Ok((config, Some(PathBuf::from(CONFIG_FILE)))),
        None => Ok((Config::default(), None)),
    }
}
