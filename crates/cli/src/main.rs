use clap::{Parser, Subcommand};
use lib::health::Availability;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "relaybot")]
#[command(about = "Discord bot relaying messages to an AnythingLLM workspace", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Connect to Discord and relay messages to the workspace until Ctrl-C.
    Run {
        /// Config file path (default: RELAYBOT_CONFIG_PATH or ~/.relaybot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Env file to load instead of ./.env
        #[arg(long, value_name = "PATH")]
        env_file: Option<PathBuf>,
    },

    /// Probe the workspace api (service, api key, workspace) once and print the result.
    Probe {
        /// Config file path (default: RELAYBOT_CONFIG_PATH or ~/.relaybot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Env file to load instead of ./.env
        #[arg(long, value_name = "PATH")]
        env_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relaybot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run { config, env_file }) => {
            if let Err(e) = run(config, env_file).await {
                log::error!("bot failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Probe { config, env_file }) => match probe(config, env_file).await {
            Ok(Availability::Online) => {}
            Ok(Availability::Offline) => std::process::exit(2),
            Err(e) => {
                log::error!("probe failed: {:#}", e);
                std::process::exit(1);
            }
        },
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run(config_path: Option<PathBuf>, env_file: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path, env_file)?;
    log::info!("version: {}", env!("CARGO_PKG_VERSION"));
    log::debug!("config path: {}", path.display());
    lib::bot::run_bot(config).await
}

async fn probe(
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
) -> anyhow::Result<Availability> {
    let (config, _) = lib::config::load_config(config_path, env_file)?;
    let (state, workspace) = lib::bot::probe_once(&config).await?;
    println!("workspace api: {}", state);
    println!("workspace: {}", workspace);
    Ok(state)
}
