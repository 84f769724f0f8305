//! `ballnav` – command line front end for the locomotion engine.
//!
//! `ballnav run` drives a session against the simulated rig, fed either by a
//! synthetic treadmill or by a recorded replay.  Ctrl-C ends the session
//! cleanly: the open trial is sealed and the summary printed.

mod cli;
mod config;
mod input;
mod trial_log;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use colored::Colorize;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use ballnav_hal::{HardwareRegistry, ScriptedResponses, SimRegistry};
use ballnav_middleware::EventBus;
use ballnav_runtime::{ComponentHealth, SessionConfig, SessionSummary, TickDriver, TickInput, TickReport};
use ballnav_types::TrialOutcome;

use cli::{Cli, Command, RunArgs};
use input::{ReplayReader, WanderingBall};
use trial_log::TrialLogSink;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _tracing = ballnav_runtime::init_tracing("ballnav");

    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::InitConfig { path, force } => init_config(path, force),
        Command::ShowConfig { config } => show_config(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommands
// ─────────────────────────────────────────────────────────────────────────────

fn init_config(path: Option<PathBuf>, force: bool) -> Result<(), String> {
    let path = path.unwrap_or_else(config::config_path);
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    config::save_to(&SessionConfig::default(), &path)?;
    println!(
        "  {} Config saved to {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(())
}

fn show_config(path: Option<PathBuf>) -> Result<(), String> {
    let path = path.unwrap_or_else(config::config_path);
    let cfg = config::load_or_default(&path)?;
    let raw =
        toml::to_string_pretty(&cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    println!("# {}", path.display());
    println!("{raw}");
    Ok(())
}

fn run(args: RunArgs) -> Result<(), String> {
    print_banner();

    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    let cfg = config::load_or_default(&config_path)?;
    println!(
        "  Config: {}",
        if config_path.exists() {
            config_path.display().to_string().bold()
        } else {
            "built-in defaults".dimmed()
        }
    );

    let tick_period_ms = cfg.tick_period_ms;
    let registry = sim_registry(&cfg);
    let mut driver = TickDriver::new(cfg, registry, EventBus::default()).map_err(|e| e.to_string())?;
    install_ctrlc(driver.cancel_handle());

    let mut sink = match &args.trial_log {
        Some(path) => Some(TrialLogSink::create(path, &driver.bus())?),
        None => None,
    };

    match &args.replay {
        Some(path) => {
            println!("  Replaying {}\n", path.display().to_string().bold());
            run_replay(&mut driver, path, args.ticks, sink.as_mut())?;
        }
        None => {
            println!("  Synthetic ball, {} ms ticks.  Ctrl-C to stop.\n", tick_period_ms);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .map_err(|e| format!("Failed to start runtime: {}", e))?;
            runtime.block_on(run_live(&mut driver, tick_period_ms, args.ticks, sink.as_mut()))?;
        }
    }

    print_summary(driver.summary());
    let machine = driver.machine();
    println!("    reward delivered {:.1} µl", machine.total_reward());
    if let Some(reason) = machine.end_reason() {
        println!("    ended            {}", reason.to_string().bold());
    }
    println!();
    if driver.sensor_health() == ComponentHealth::TimedOut {
        println!("  {} motion sensor was silent at session end", "!".red().bold());
    }
    if let Some(sink) = &sink {
        println!("  Trial records written: {}", sink.written());
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Session loops
// ─────────────────────────────────────────────────────────────────────────────

/// Replays run unpaced; timestamps come from the file.
fn run_replay(
    driver: &mut TickDriver,
    path: &Path,
    max_ticks: Option<u64>,
    mut sink: Option<&mut TrialLogSink>,
) -> Result<(), String> {
    let mut last_ts = 0;
    for (n, input) in ReplayReader::open(path)?.enumerate() {
        if driver.is_finished() || max_ticks.is_some_and(|max| n as u64 >= max) {
            break;
        }
        let input = input?;
        last_ts = input.timestamp_ms;
        step(driver, input, sink.as_deref_mut())?;
    }
    finish(driver, last_ts, sink)
}

/// Paced by a Tokio interval; late ticks are skipped, not bunched.
async fn run_live(
    driver: &mut TickDriver,
    tick_period_ms: u64,
    max_ticks: Option<u64>,
    mut sink: Option<&mut TrialLogSink>,
) -> Result<(), String> {
    let mut sensor = WanderingBall::new(tick_period_ms);
    let mut responses = ScriptedResponses::default();
    let mut interval = tokio::time::interval(Duration::from_millis(tick_period_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let start = Instant::now();
    let mut last_ts = 0;
    let mut ticks = 0u64;
    while !driver.is_finished() && max_ticks.is_none_or(|max| ticks < max) {
        interval.tick().await;
        last_ts = start.elapsed().as_millis() as u64;
        let input = TickInput::poll(last_ts, &mut sensor, &mut responses);
        step(driver, input, sink.as_deref_mut())?;
        ticks += 1;
    }
    finish(driver, last_ts, sink)
}

/// Request a stop and run the closing tick if the session is still open.
fn finish(
    driver: &mut TickDriver,
    last_ts: u64,
    sink: Option<&mut TrialLogSink>,
) -> Result<(), String> {
    if !driver.is_finished() {
        driver.cancel_handle().store(true, Ordering::Release);
        step(driver, TickInput::idle(last_ts), sink)?;
    }
    Ok(())
}

fn step(
    driver: &mut TickDriver,
    input: TickInput,
    sink: Option<&mut TrialLogSink>,
) -> Result<(), String> {
    let report = driver.tick(input).map_err(|e| e.to_string())?;
    print_report(&report);
    if let Some(sink) = sink {
        sink.pump()?;
    }
    Ok(())
}

fn sim_registry(cfg: &SessionConfig) -> HardwareRegistry {
    SimRegistry::new()
        .with_valve(cfg.task.reward_port)
        .with_channels(cfg.sources.iter().map(|s| s.channel))
        .build()
}

fn install_ctrlc(cancel: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – ending session …".yellow().bold());
        cancel.store(true, Ordering::Release);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the session can only end on its own");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __       ____             "#.bold().cyan());
    println!("{}", r#"  / /  ___ _/ / /__  ___ __  __"#.bold().cyan());
    println!("{}", r#" / _ \/ _ `/ / / _ \/ _ `/ |/ /"#.bold().cyan());
    println!("{}", r#"/_.__/\_,_/_/_/_//_/\_,_/|___/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "ballnav".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Virtual navigation on a spherical treadmill");
    println!();
}

fn print_report(report: &TickReport) {
    let Some(record) = &report.sealed_record else {
        return;
    };
    let outcome = match record.outcome {
        Some(TrialOutcome::Reward) => "reward".green().bold(),
        Some(TrialOutcome::Punish) => "punish".red().bold(),
        Some(TrialOutcome::Abort) => "abort".yellow(),
        Some(TrialOutcome::Timeout) => "timeout".dimmed(),
        Some(TrialOutcome::SessionTerminated) => "terminated".dimmed(),
        None => "open".normal(),
    };
    let duration = record
        .end_ms
        .map(|end| end.saturating_sub(record.start_ms))
        .unwrap_or_default();
    println!(
        "  trial {:>4}  {:<12} {:>7} ms  zone r={:.3}",
        record.trial_index, outcome, duration, record.reward_radius
    );
    if report.actuator_faults > 0 {
        println!(
            "  {} {} actuator fault(s) this tick",
            "!".red().bold(),
            report.actuator_faults
        );
    }
}

fn print_summary(summary: &SessionSummary) {
    println!();
    println!("  {}", "Session summary".bold().underline());
    println!("    ticks            {}", summary.ticks);
    println!("    degraded ticks   {}", summary.degraded_ticks);
    println!("    trials           {}", summary.trials);
    println!("    rewards          {}", summary.rewards.to_string().green());
    println!("    punishments      {}", summary.punishments.to_string().red());
    println!("    aborts           {}", summary.aborts);
    println!("    timeouts         {}", summary.timeouts);
    println!("    terminated       {}", summary.terminated);
    if summary.actuator_faults > 0 || summary.sensor_stalls > 0 {
        println!("    actuator faults  {}", summary.actuator_faults.to_string().red());
        println!("    sensor stalls    {}", summary.sensor_stalls.to_string().red());
    }
}
