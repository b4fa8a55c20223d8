use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;

use fetchzip::commands;
use fetchzip::core::config::{Config, Overrides};
use fetchzip::error::FetchzipError;
use fetchzip::logging::{self, LogFormat, LoggingConfig};

/// Exit status after a download is cancelled with Ctrl+C.
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[clap(name = "fetchzip")]
#[clap(about = "Download a zip archive with progress and unpack it")]
#[clap(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Config file to use instead of the default location (TOML or JSON)
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[clap(short, long, global = true)]
    verbose: bool,
    /// Log output format: pretty or json
    #[clap(long, global = true)]
    log_format: Option<LogFormat>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download an archive and unpack it next to the download
    Fetch {
        /// Source URL (http, https or file)
        #[clap(long)]
        url: Option<String>,
        /// Directory to save the download in
        #[clap(long)]
        dir: Option<PathBuf>,
        /// File name for the download (default: last segment of the URL)
        #[clap(long)]
        name: Option<String>,
        /// Download only, skip extraction
        #[clap(long)]
        no_extract: bool,
    },
    /// Unpack a local zip archive
    Extract {
        /// Archive to unpack
        archive: PathBuf,
        /// Directory to create the extraction folder in (default: next to the archive)
        #[clap(long, conflicts_with = "dest")]
        into: Option<PathBuf>,
        /// Exact folder to unpack into
        #[clap(long)]
        dest: Option<PathBuf>,
    },
    /// Configuration management
    Config {
        #[clap(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a config template to the default location
    Init {
        /// Overwrite an existing config file
        #[clap(long)]
        force: bool,
    },
    /// Print the resolved configuration
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = run(cli);

    if let Err(e) = result {
        let cancelled = e
            .downcast_ref::<FetchzipError>()
            .is_some_and(FetchzipError::is_cancelled);
        if cancelled {
            eprintln!("Download cancelled");
            std::process::exit(EXIT_CANCELLED);
        }
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref()).map_err(|e| anyhow::anyhow!(e))?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    logging::init_logging(&LoggingConfig {
        level,
        format: cli.log_format.unwrap_or(config.log_format),
    })
    .map_err(|e| anyhow::anyhow!(e))?;

    for warning in config.warnings() {
        warn!("{warning}");
    }

    match cli.command {
        Commands::Fetch {
            url,
            dir,
            name,
            no_extract,
        } => {
            config.apply(Overrides {
                source_address: url,
                destination_directory: dir,
                destination_file_name: name,
                no_extract,
            });
            commands::fetch::fetch_archive(&config).map_err(|e| anyhow::anyhow!(e))
        }
        Commands::Extract {
            archive,
            into,
            dest,
        } => commands::extract::extract_archive(&config, &archive, into.as_deref(), dest.as_deref())
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Config { command } => match command {
            ConfigCommands::Init { force } => {
                commands::config::init_config(force).map_err(|e| anyhow::anyhow!(e))
            }
            ConfigCommands::Show => {
                commands::config::show_config(&config).map_err(|e| anyhow::anyhow!(e))
            }
        },
    }
}
