use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use breakscope::config::{AppConfig, LogFormat, LoggingConfig};

#[derive(Parser)]
#[command(
    name = "breakscope",
    about = "Anomaly flagging and commentary for account-reconciliation time series",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true, env = "BREAKSCOPE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service (upload / download endpoints)
    Serve {
        /// Bind address, overriding the configured one
        #[arg(long)]
        bind: Option<String>,
    },

    /// Score a CSV file offline and write the annotated CSV
    Score {
        /// Input CSV file
        #[arg(long)]
        input: PathBuf,

        /// Output CSV file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // Logs go to stderr so `score` can stream CSV on stdout.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting breakscope service");
            breakscope::serve(config).await?;
        }
        Commands::Score { input, output } => {
            tracing::info!(input = %input.display(), "Scoring file");
            let data = std::fs::read(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let scored = tokio::task::spawn_blocking(move || breakscope::score_csv(&data, &config))
                .await
                .context("scoring task failed")??;
            let csv = scored.to_csv()?;

            match output {
                Some(path) => {
                    std::fs::write(&path, &csv)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!(
                        "Scored {} rows ({} predicted anomalies) -> {}",
                        scored.rows.len(),
                        scored.anomaly_count(),
                        path.display()
                    );
                }
                None => {
                    std::io::stdout().write_all(&csv)?;
                }
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
