use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

use accelprofile::config::AppConfig;
use accelprofile::export::{text, SessionExporter};
use accelprofile::logging::init_logging;
use accelprofile::{
    LoadOptions, LogLevel, ProfilerError, ProfilingPipeline, ProfilingReport, SessionLoader,
    SolverKind,
};

/// accelprofile - In-situ speed-acceleration profiling
///
/// Cleans tracking telemetry (device misuse and measurement errors) and fits
/// each athlete's speed-acceleration profile (a0, s0) with linear and
/// quantile regression.
#[derive(Parser)]
#[command(name = "accelprofile")]
#[command(version = "0.1.0")]
#[command(about = "In-situ speed-acceleration profiling CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a session file and fit speed-acceleration profiles
    Profile {
        /// Session file (delimited text)
        #[arg(short, long)]
        file: PathBuf,

        /// Convert speed from km/h to m/s
        #[arg(short = 's', long)]
        convert_speed: bool,

        /// Use the acceleration column of the file instead of deriving it from speed
        #[arg(short = 'k', long)]
        keep_acceleration: bool,

        /// Speed bin width (m/s) for high-intensity selection
        #[arg(long)]
        dv: Option<f64>,

        /// Acceleration ranks kept per speed bin
        #[arg(long)]
        n_max: Option<usize>,

        /// Field delimiter
        #[arg(long)]
        sep: Option<char>,

        /// Run only the linear fit (combine with --quantile for both)
        #[arg(long)]
        linear: bool,

        /// Run only the quantile fits (combine with --linear for both)
        #[arg(long)]
        quantile: bool,

        /// Quantile solver (irls, exact)
        #[arg(long)]
        solver: Option<SolverKind>,

        /// Draw per-athlete charts
        #[arg(long)]
        plots: bool,

        /// Results directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,

        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<ProfilerError>() {
            Some(err) => eprintln!("{} {}", "Error:".red().bold(), err.user_message()),
            None => eprintln!("{} {:#}", "Error:".red().bold(), e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.logging.level = config.logging.level.raised_by(cli.verbose);

    match cli.command {
        Commands::Profile {
            file,
            convert_speed,
            keep_acceleration,
            dv,
            n_max,
            sep,
            linear,
            quantile,
            solver,
            plots,
            output,
        } => {
            config.input.convert_speed |= convert_speed;
            config.input.keep_acceleration |= keep_acceleration;
            if let Some(sep) = sep {
                config.input.delimiter = sep;
            }
            if let Some(dv) = dv {
                config.intensity.dv = dv;
            }
            if let Some(n_max) = n_max {
                config.intensity.n_max = n_max;
            }
            if linear || quantile {
                config.regression.linear = linear;
                config.regression.quantile = quantile;
            }
            if let Some(solver) = solver {
                config.regression.solver = solver;
            }
            if let Some(output) = output {
                config.output.results_dir = output;
            }
            config.validate()?;
            init_logging(&config.logging)?;

            profile(&config, &file, plots)
        }

        Commands::Config { init, show } => {
            let path = cli.config.unwrap_or_else(AppConfig::default_path);
            if init {
                if path.exists() {
                    println!("{} {}", "Configuration already exists:".yellow(), path.display());
                } else {
                    AppConfig::default().save_to_file(&path)?;
                    println!("{} {}", "✓ Configuration written to".green(), path.display());
                }
            }
            if show || !init {
                let content =
                    toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
                println!("{}", format!("# {}", path.display()).dimmed());
                println!("{}", content);
            }
            Ok(())
        }
    }
}

fn profile(config: &AppConfig, file: &std::path::Path, plots: bool) -> Result<()> {
    println!("{}", "Loading session...".green().bold());
    let loader = SessionLoader::new(LoadOptions::from(&config.input));
    let store = loader.load(file)?;
    let session = SessionLoader::session_name(file);

    println!("{}", "Profiling athletes...".blue().bold());
    // Progress bar only when log lines would not interleave with it
    let quiet = config.logging.level <= LogLevel::Warn;
    let report = ProfilingPipeline::from_config(config)
        .with_progress(quiet)
        .run(store);

    for warning in &report.warnings {
        println!("{} {}", "Warning:".yellow().bold(), warning);
    }

    let exporter = SessionExporter::new(&session, &config.output);
    let written = exporter.export(&report).map_err(ProfilerError::from)?;

    if plots {
        render_charts(config, &exporter, &session, &report)?;
    }

    println!();
    print!("{}", text::render_run_summary(&report));
    let table = report.profile_table().map_err(ProfilerError::from)?;
    println!("{}", text::render_profile_table(&table));

    for path in written {
        println!("{} {}", "✓ Written".green(), path.display());
    }
    Ok(())
}

#[cfg(feature = "charts")]
fn render_charts(
    config: &AppConfig,
    exporter: &SessionExporter,
    session: &str,
    report: &ProfilingReport,
) -> Result<()> {
    println!("{}", "Drawing charts...".cyan().bold());
    let renderer = accelprofile::charts::ChartRenderer::new(exporter.images_dir(), session);
    let charts = renderer
        .render(report, &config.output)
        .map_err(ProfilerError::from)?;
    println!("{} {} charts in {}", "✓".cyan(), charts.len(), exporter.images_dir().display());
    Ok(())
}

#[cfg(not(feature = "charts"))]
fn render_charts(
    _config: &AppConfig,
    _exporter: &SessionExporter,
    _session: &str,
    _report: &ProfilingReport,
) -> Result<()> {
    println!(
        "{}",
        "Charts are unavailable: rebuild with --features charts".yellow()
    );
    Ok(())
}
