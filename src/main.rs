//! HIL Runner
//!
//! Hardware-in-the-loop test runner for Raspberry Pi Pico boards: builds
//! firmware, flashes it through OpenOCD or picotool, then judges the
//! running firmware from its UART output or a logic analyzer capture.
//!
//! # Usage
//!
//! ```bash
//! # Build, flash and verify the blinky firmware on SUT 1
//! hil-runner run --test blinky
//!
//! # Reflash a prebuilt image and run the Unity suite
//! hil-runner run --test unity --skip-build --firmware build/test/test_main.elf
//!
//! # Re-analyze a saved logic analyzer capture
//! hil-runner analyze capture.csv --freq 1000 --tolerance 0.05
//!
//! # List configured SUTs and serial ports
//! hil-runner devices
//! hil-runner ports
//! ```

mod build;
mod capture;
mod config;
mod devices;
mod error;
mod flash;
mod orchestrator;
mod plan;
mod process;
mod serial;
mod verify;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use config::HilConfig;
use devices::DeviceRegistry;
use orchestrator::{HardwareBench, Orchestrator, Outcome};
use plan::{PlanOptions, TestCase};
use process::SystemRunner;
use verify::{Observation, PwmAnalyzer, Verifier};

/// HIL Runner
///
/// Build, flash and verify firmware on real hardware
#[derive(Parser)]
#[command(name = "hil-runner")]
#[command(author = "Prasanna Gautam")]
#[command(version = "0.1.0")]
#[command(about = "Hardware-in-the-loop test runner for Raspberry Pi Pico boards")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ./hil.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, flash and verify one test case
    Run {
        /// Test case to run
        #[arg(short, long, value_enum)]
        test: TestCase,

        /// Firmware image to flash instead of the built artifact
        #[arg(short, long)]
        firmware: Option<PathBuf>,

        /// Serial port of the SUT (overrides config)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate (overrides config)
        #[arg(short, long)]
        baud: Option<u32>,

        /// SUT id that runs the firmware under test
        #[arg(short, long, default_value_t = 1)]
        sut: u32,

        /// Flash the existing artifact without building
        #[arg(long)]
        skip_build: bool,

        /// Remove the build directory before building
        #[arg(long, conflicts_with = "skip_build")]
        clean: bool,
    },

    /// Measure the PWM frequency in a saved capture CSV
    Analyze {
        /// Capture file written by sigrok-cli
        path: PathBuf,

        /// Expected frequency in Hz
        #[arg(long, default_value_t = verify::pwm::DEFAULT_EXPECTED_FREQ_HZ)]
        freq: f64,

        /// Accepted relative deviation (0.05 = 5%)
        #[arg(long, default_value_t = verify::pwm::DEFAULT_TOLERANCE)]
        tolerance: f64,
    },

    /// List the configured SUTs
    Devices,

    /// List available serial ports
    Ports,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let config = HilConfig::discover(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            test,
            firmware,
            port,
            baud,
            sut,
            skip_build,
            clean,
        } => {
            let mut config = config;
            if let Some(port) = port {
                config.serial.port = port;
            }
            if let Some(baud) = baud {
                config.serial.baud_rate = baud;
            }
            let options = PlanOptions {
                firmware,
                sut,
                skip_build,
                clean,
            };
            let outcome = handle_run(test, &options, &config)?;
            std::process::exit(outcome.exit_code());
        }
        Commands::Analyze { path, freq, tolerance } => {
            let passed = handle_analyze(&path, freq, tolerance)?;
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::Devices => handle_devices(&config)?,
        Commands::Ports => serial::port::print_ports(&config.serial.port)?,
    }

    Ok(())
}

fn handle_run(test: TestCase, options: &PlanOptions, config: &HilConfig) -> Result<Outcome> {
    let registry = DeviceRegistry::from_config(config)?;
    let plan = test
        .plan(options, config, &registry)
        .with_context(|| format!("Failed to prepare {} test", test))?;

    println!("{}", format!("--- Running {} test ---", plan.name).cyan().bold());

    let mut orchestrator = Orchestrator::new(HardwareBench::new(config, SystemRunner));
    let outcome = orchestrator.run(&plan);

    print_outcome(&plan.name, &outcome);
    Ok(outcome)
}

fn print_outcome(name: &str, outcome: &Outcome) {
    if outcome.passed() {
        println!("{} {} test: {}", "[OK]".green().bold(), name, outcome.detail());
    } else {
        eprintln!("{} {} test: {}", "[FAILED]".red().bold(), name, outcome.detail());
    }
}

fn handle_analyze(path: &std::path::Path, freq: f64, tolerance: f64) -> Result<bool> {
    let samples = capture::load(path)?;
    println!("Loaded {} samples from {}", samples.len(), path.display());

    let analyzer = PwmAnalyzer::new(freq, tolerance);
    let verdict = analyzer
        .verify(Observation::Capture(&samples))
        .with_context(|| format!("Failed to analyze {}", path.display()))?;

    if verdict.passed() {
        println!("{} {}", "[OK]".green().bold(), verdict.detail());
    } else {
        eprintln!("{} {}", "[FAILED]".red().bold(), verdict.detail());
    }
    Ok(verdict.passed())
}

fn handle_devices(config: &HilConfig) -> Result<()> {
    let registry = DeviceRegistry::from_config(config)?;

    println!("{}", "=".repeat(60));
    println!("{}", "Configured SUTs".cyan().bold());
    println!("{}", "=".repeat(60));

    for profile in registry.list() {
        println!("\n  {}: {}", format!("SUT {}", profile.id).white().bold(), profile.name);
        if !profile.description.is_empty() {
            println!("    {}", profile.description);
        }
        println!("    OpenOCD config: {}", profile.openocd_cfg.display());
        println!("    Target: {} ({})", profile.target, profile.architecture);
    }

    println!("\n{}", "=".repeat(60));
    Ok(())
}
