use clap::{Parser, Subcommand};
use lib::names::{display_name, BasenameResolver, NameResolver, BASE_MAINNET_CHAIN_ID};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gmbot")]
#[command(about = "gmbot messaging agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: GMBOT_CONFIG_PATH or ~/.gmbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Connect to the messaging network and run the agent until interrupted. Requires WALLET_KEY, ENCRYPTION_KEY, XMTP_ENV and NETWORK_ID in the environment or the env file.
    Run {
        /// Config file path (default: GMBOT_CONFIG_PATH or ~/.gmbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Fallback file for settings missing from the environment.
        #[arg(long, value_name = "PATH", default_value = ".env")]
        env_file: PathBuf,
    },

    /// Look up the basename and profile for a wallet address.
    Resolve {
        /// Wallet address (0x...)
        address: String,

        /// Config file path (default: GMBOT_CONFIG_PATH or ~/.gmbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Chain id to resolve against (default: Base mainnet)
        #[arg(long, default_value_t = BASE_MAINNET_CHAIN_ID)]
        network_id: u64,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("gmbot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, env_file }) => {
            if let Err(e) = run_agent(config, env_file).await {
                log::error!("agent failed to start: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Resolve {
            address,
            config,
            network_id,
        }) => {
            if let Err(e) = run_resolve(address, config, network_id).await {
                log::error!("resolve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_agent(config_path: Option<PathBuf>, env_file: PathBuf) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    let credentials = lib::config::load_credentials(&env_file)?;
    lib::agent::run_agent(config, credentials).await
}

async fn run_resolve(
    address: String,
    config_path: Option<PathBuf>,
    network_id: u64,
) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let resolver = BasenameResolver::new(lib::config::resolver_settings(&config, network_id))?;
    println!("{}", display_name(&resolver, &address).await);
    let profile = resolver.resolve_profile(&address).await;
    println!("{}", lib::commands::render_profile(&address, profile.as_ref()));
    Ok(())
}
