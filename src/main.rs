use anyhow::Context;
use clap::{Parser, Subcommand};
use sarfetch::config::{self, Config, ConfigError};
use sarfetch::{logging, pipeline, FetchError, HttpTransport};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "sarfetch", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search the catalogue, write the grouped report and temporal plots
    #[command(alias = "s")]
    Search {
        #[arg(short, long, default_value = "config_sentinel_search.toml")]
        config: PathBuf,
    },
    /// Download selected scenes with their orbit files and a DEM
    #[command(alias = "d")]
    Download {
        #[arg(short, long, default_value = "config_sentinel_download.toml")]
        config: PathBuf,
    },
    /// Write a configuration template
    #[command(name = "init-config")]
    InitConfig {
        #[arg(default_value = "config_sentinel_search.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Exit code when a configuration template was written instead of running
const EXIT_TEMPLATE_CREATED: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(ConfigError::TemplateCreated { .. }) = template_created(&e) {
                eprintln!("{}", e);
                return ExitCode::from(EXIT_TEMPLATE_CREATED);
            }
            // Config errors surface before the logger is installed
            if logging::is_active() {
                log::error!("{:#}", e);
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn template_created(e: &anyhow::Error) -> Option<&ConfigError> {
    e.chain().find_map(|cause| {
        cause
            .downcast_ref::<ConfigError>()
            .or_else(|| match cause.downcast_ref::<FetchError>() {
                Some(FetchError::Config(inner)) => Some(inner),
                _ => None,
            })
            .filter(|c| matches!(c, ConfigError::TemplateCreated { .. }))
    })
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::InitConfig { path, force } => {
            config::write_template(&path, force)?;
            println!("Configuration template written to {}", path.display());
            Ok(())
        }
        Command::Search { config } => {
            let config = load(&config, cli.verbose)?;
            let transport = transport(&config)?;
            let outcome = pipeline::run_search(&config, &transport).context("Search failed")?;
            println!(
                "Search completed: {} product(s), {} group(s) kept. Results saved in {}",
                outcome.scenes.len(),
                outcome.kept_groups(),
                outcome.report_path.display()
            );
            Ok(())
        }
        Command::Download { config } => {
            let config = load(&config, cli.verbose)?;
            let transport = transport(&config)?;
            let summary = pipeline::run_download(&config, &transport).context("Download failed")?;
            println!("{}", summary);
            Ok(())
        }
    }
}

/// Load the configuration, then start logging to its log file
fn load(path: &Path, verbose: bool) -> anyhow::Result<Config> {
    let config = Config::load(path)?;
    logging::init(Some(&config.output.log_file), verbose);
    log::info!("Loaded configuration from {}", config.source.display());
    for warning in &config.warnings {
        log::warn!("{}", warning);
    }
    Ok(config)
}

fn transport(config: &Config) -> anyhow::Result<HttpTransport> {
    HttpTransport::new(config.processing.request_timeout, Some(config.credentials.clone()))
        .context("Failed to set up HTTP client")
}
