use clap::{Parser, Subcommand};
use cnft_types::Network;
use std::path::PathBuf;

mod commands;

/// Cardano NFT batch tooling.
#[derive(Parser)]
#[command(name = "cnft")]
#[command(about = "Plan, inspect and watch Cardano NFT batch transactions")]
#[command(version)]
struct Cli {
    /// Network to use.
    #[arg(long, default_value = "mainnet")]
    network: NetworkArg,

    /// Indexer project id (its prefix must match the network).
    #[arg(long, env = "CNFT_PROJECT_ID")]
    project_id: Option<String>,

    /// Indexer base URL (overrides the default for the selected network).
    #[arg(long)]
    indexer: Option<String>,

    /// Directory for the watch store.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug)]
enum NetworkArg {
    Mainnet,
    Preprod,
    Preview,
}

impl std::fmt::Display for NetworkArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Preprod => write!(f, "preprod"),
            Self::Preview => write!(f, "preview"),
        }
    }
}

impl std::str::FromStr for NetworkArg {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Self::Mainnet),
            "preprod" | "testnet" | "test" => Ok(Self::Preprod),
            "preview" => Ok(Self::Preview),
            _ => Err(format!("unknown network: {} (use mainnet, preprod, or preview)", s)),
        }
    }
}

impl NetworkArg {
    fn to_network(&self) -> Network {
        match self {
            Self::Mainnet => Network::Mainnet,
            Self::Preprod => Network::Preprod,
            Self::Preview => Network::Preview,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show indexer health and the chain tip.
    Status,

    /// List unspent outputs at an address.
    Utxos {
        address: String,
    },

    /// Show transactions of the account owning an address, with net amounts.
    History {
        address: String,

        /// Maximum number of transactions to show.
        #[arg(long, default_value = "25")]
        limit: usize,
    },

    /// Build a transaction plan and print it as JSON.
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },

    /// Manage listing watches.
    Watch {
        #[command(subcommand)]
        command: WatchCommand,
    },

    /// Vending metadata tools.
    Metadata {
        #[command(subcommand)]
        command: MetadataCommand,
    },

    /// Upload a file to metadata storage and print its IPFS link.
    Pin {
        file: PathBuf,

        /// Storage API key.
        #[arg(long, env = "CNFT_STORAGE_KEY")]
        api_key: String,
    },
}

#[derive(Subcommand)]
enum PlanCommand {
    /// Service fee for a batch.
    Fee {
        /// Fee recipient.
        #[arg(long)]
        address: String,

        /// Number of batch items.
        #[arg(long)]
        items: usize,

        /// Fee per item in ADA.
        #[arg(long)]
        per_item: Option<String>,

        /// Minimum fee in ADA.
        #[arg(long)]
        minimum: Option<String>,
    },

    /// Send-to-self creating one output per item.
    Split {
        /// Wallet address receiving the outputs.
        #[arg(long)]
        address: String,

        /// Asset units (policy id + hex name), one output each.
        #[arg(long = "asset")]
        assets: Vec<String>,

        /// Extra lovelace-only outputs.
        #[arg(long, default_value = "0")]
        lovelace_outputs: usize,
    },

    /// Payments from an `address,lovelace` CSV file.
    Payout {
        csv: PathBuf,

        /// Receipt message attached to the transaction.
        #[arg(long)]
        message: Option<String>,
    },
}

#[derive(Subcommand)]
enum WatchCommand {
    /// Alert when a token under a policy is listed at or below a price.
    Add {
        /// Policy id (hex).
        policy: String,

        /// Price threshold in ADA.
        price: String,

        /// Trait name to narrow the watch.
        #[arg(long, requires = "trait_value")]
        trait_name: Option<String>,

        /// Trait value to narrow the watch.
        #[arg(long, requires = "trait_name")]
        trait_value: Option<String>,

        #[arg(long)]
        text: bool,

        #[arg(long)]
        desktop: bool,
    },

    /// List watches.
    List,

    /// Remove a watch by id.
    Remove {
        id: u64,
    },

    /// Check every watch once and print alerts.
    Scan,
}

#[derive(Subcommand)]
enum MetadataCommand {
    /// Validate metadata files (or every .json file in a directory).
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

/// Application context shared across commands.
struct AppContext {
    network: Network,
    project_id: Option<String>,
    indexer_url: Option<String>,
    data_dir: PathBuf,
}

impl AppContext {
    fn from_cli(cli: &Cli) -> Self {
        let data_dir = cli
            .data_dir
            .clone()
            .unwrap_or_else(|| default_data_dir(&cli.network));
        Self {
            network: cli.network.to_network(),
            project_id: cli.project_id.clone(),
            indexer_url: cli.indexer.clone(),
            data_dir,
        }
    }
}

fn default_data_dir(network: &NetworkArg) -> PathBuf {
    let base = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cnft");
    match network {
        NetworkArg::Mainnet => base,
        NetworkArg::Preprod => base.join("preprod"),
        NetworkArg::Preview => base.join("preview"),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let ctx = AppContext::from_cli(&cli);

    let result = match cli.command {
        Commands::Status => commands::show_status(&ctx).await,
        Commands::Utxos { address } => commands::show_utxos(&ctx, &address).await,
        Commands::History { address, limit } => commands::show_history(&ctx, &address, limit).await,
        Commands::Plan { command } => match command {
            PlanCommand::Fee {
                address,
                items,
                per_item,
                minimum,
            } => commands::plan_fee(&address, items, per_item.as_deref(), minimum.as_deref()),
            PlanCommand::Split {
                address,
                assets,
                lovelace_outputs,
            } => commands::plan_split(&address, &assets, lovelace_outputs),
            PlanCommand::Payout { csv, message } => commands::plan_payout(&csv, message),
        },
        Commands::Watch { command } => match command {
            WatchCommand::Add {
                policy,
                price,
                trait_name,
                trait_value,
                text,
                desktop,
            } => {
                let trait_filter = trait_name.as_deref().zip(trait_value.as_deref());
                commands::watch_add(&ctx, &policy, &price, trait_filter, text, desktop)
            }
            WatchCommand::List => commands::watch_list(&ctx),
            WatchCommand::Remove { id } => commands::watch_remove(&ctx, id),
            WatchCommand::Scan => commands::watch_scan(&ctx).await,
        },
        Commands::Metadata { command } => match command {
            MetadataCommand::Check { paths } => commands::check_metadata(&paths),
        },
        Commands::Pin { file, api_key } => commands::pin(&file, &api_key).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
