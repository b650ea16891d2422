use clap::{Parser, Subcommand};
use std::io::{self, Write};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use zignal::{aggregate, compare, extract, normalize, pipeline};

#[derive(Parser)]
#[command(
    name = "zignal",
    version,
    about = "zignal CLI: extract, combine, compare, normalize, run"
)]
struct Cli {
    /// Log debug diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure the images of one cohort directory
    Extract(extract::ExtractArgs),
    /// Concatenate per-cohort signal tables
    Combine(aggregate::CombineArgs),
    /// Test every treatment against the control
    Compare(compare::CompareArgs),
    /// Normalize a measurement table and test it
    Normalize(normalize::NormalizeArgs),
    /// Run a whole experiment file
    Run(pipeline::RunArgs),
    /// Write an experiment template
    Init(pipeline::InitArgs),
}

fn progress(prog: f64, msg: &str) {
    let _ = writeln!(
        io::stderr(),
        "{}",
        serde_json::json!({"progress": prog, "message": msg})
    );
    let _ = io::stderr().flush();
}

/// A valid `RUST_LOG` wins over the `-v`/`-q` flags.
fn log_filter(verbose: bool, quiet: bool, rust_log: Option<String>) -> EnvFilter {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    rust_log
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = log_filter(verbose, quiet, std::env::var(EnvFilter::DEFAULT_ENV).ok());
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    match cli.command {
        Commands::Extract(args) => extract::run(args, progress)?,
        Commands::Combine(args) => aggregate::run(args, progress)?,
        Commands::Compare(args) => compare::run(args, progress)?,
        Commands::Normalize(args) => normalize::run(args, progress)?,
        Commands::Run(args) => pipeline::run(args, progress)?,
        Commands::Init(args) => pipeline::init(args, progress)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_prefers_rust_log() {
        assert_eq!(log_filter(false, false, None).to_string(), "info");
        assert_eq!(log_filter(true, false, None).to_string(), "debug");
        assert_eq!(log_filter(false, true, Some("  ".into())).to_string(), "error");
        assert_eq!(
            log_filter(false, true, Some("zignal=trace".into())).to_string(),
            "zignal=trace"
        );
    }
}
