mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "formpilot")]
#[command(about = "Fill job application forms from a résumé", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to ~/.formpilot/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a résumé and fill the application form at JOB_URL
    Apply {
        resume_url: String,
        job_url: String,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Directory for the evidence screenshot
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse a local résumé file and print the extracted profile
    Parse { file: PathBuf },

    /// List the form fields found on a page
    Scrape {
        url: String,

        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },

    /// Run environment diagnostics
    Doctor,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    // stdout carries the result JSON, so logs go to stderr.
    let json_layer = cli
        .json_logs
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!cli.json_logs).then(|| fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(json_layer)
        .with(text_layer)
        .with(filter)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Apply {
            resume_url,
            job_url,
            headed,
            output,
        } => {
            let mut config = commands::load_config(config_path)?;
            if headed {
                config.browser.headless = false;
            }
            if let Some(dir) = output {
                config.output.screenshots_dir = dir.display().to_string();
            }
            if !commands::apply::run(config, &resume_url, &job_url).await? {
                std::process::exit(1);
            }
        }
        Commands::Parse { file } => {
            commands::parse::run(&file).await?;
        }
        Commands::Scrape { url, headed } => {
            let mut config = commands::load_config(config_path)?;
            if headed {
                config.browser.headless = false;
            }
            commands::scrape::run(config, &url).await?;
        }
        Commands::Doctor => {
            commands::doctor::run(config_path).await?;
        }
        Commands::Init { force } => {
            commands::init::run(config_path, force).await?;
        }
    }

    Ok(())
}
