//! # Classbook — weekly class booking bot
//!
//! One invocation, one booking run: day gate, wait for the opening time,
//! retry the booking, write a JSON result, exit 0/1.
//!
//! Usage:
//!   classbook                          # Normal scheduled run (launched shortly before 00:00 KST)
//!   classbook --mode test              # Dry run: log in and inspect the slot, never click
//!   classbook --mode forced --immediate
//!   classbook --dry-check              # Print the resolved context and exit

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use classbook_browser::{AttemptConfig, BookingAttempt, WebDriverFactory};
use classbook_core::{AppConfig, Credentials, ExecutionContext, ExecutionMode, now_kst};
use classbook_scheduler::{BookingEngine, ResultStore, RetryPolicy, SystemClock};

#[derive(Parser)]
#[command(
    name = "classbook",
    version,
    about = "🏋️ Classbook — books the weekly class slot the moment reservations open"
)]
struct Cli {
    /// Config file (defaults to ~/.classbook/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Execution mode: normal, forced, test, immediate
    #[arg(short, long)]
    mode: Option<ExecutionMode>,

    /// Skip the wait for the opening time
    #[arg(long)]
    immediate: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the resolved context and day-gate decision, then exit
    #[arg(long)]
    dry_check: bool,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = expand_path(path);
            if path.exists() {
                AppConfig::load_from(&path)?
            } else {
                AppConfig::default()
            }
        }
        None => AppConfig::load()?,
    };
    config.apply_env(|key| std::env::var(key).ok())?;

    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if cli.immediate {
        config.immediate = true;
    }

    config.validate()?;
    config.site.validate()?;
    Ok(config)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "classbook=debug,classbook_core=debug,classbook_browser=debug,classbook_scheduler=debug"
    } else {
        "classbook=info,classbook_core=info,classbook_browser=info,classbook_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

fn print_context(ctx: &ExecutionContext) {
    let target = ctx.projected_target();
    println!("🏋️ Classbook v{}", env!("CARGO_PKG_VERSION"));
    println!("   🕐 Now (KST):    {} ({})", ctx.now.format("%Y-%m-%d %H:%M:%S"), ctx.current_weekday());
    println!("   ⚙️  Mode:         {}", ctx.mode);
    println!("   ⏰ Opening:      {} (max wait {} min, skip wait: {})", ctx.target_time, ctx.max_wait_minutes, ctx.skip_wait);
    println!("   📅 Target class: {} {target}", ctx.slot_label);
    println!("   🔁 Max retries:  {}", ctx.max_retries);
    println!("   🚦 Day gate:     {}", if ctx.should_run() { "run" } else { "skip" });
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // Credentials first: nothing else happens without them.
    let credentials = Credentials::from_env()?;

    let config = load_config(&cli)?;
    init_logging(cli.verbose || config.debug);

    let ctx = ExecutionContext::new(now_kst(), &config)?;
    if cli.dry_check {
        print_context(&ctx);
        return Ok(ExitCode::SUCCESS);
    }

    let factory = WebDriverFactory::new(
        config.browser.clone(),
        config.site.clone(),
        expand_path(&config.snapshots.dir),
    );
    let store = ResultStore::new(&expand_path(&config.results.dir), config.results.file_for(ctx.mode));

    let engine = BookingEngine::new(
        ctx,
        credentials,
        Arc::new(factory),
        Arc::new(SystemClock),
        BookingAttempt::new(AttemptConfig::from_app(&config)),
        RetryPolicy::from_config(&config.retry),
        store,
    );

    let result = engine.run().await;
    let json = serde_json::to_string_pretty(&result).context("Failed to render result")?;
    println!("{json}");

    if result.booking_success {
        tracing::info!("✅ {}", result.message);
    } else {
        tracing::info!("📋 {}: {}", result.status, result.message);
    }
    Ok(ExitCode::from(result.exit_code()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}
