use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mnt")]
#[command(about = "Minter role administration CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (repeatable). Defaults apply when omitted.
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grant the minter role on chain, then mark the address active in the registry
    Grant {
        #[arg(long)]
        address: String,
    },

    /// Revoke the minter role on chain, then mark the address archived in the registry
    Revoke {
        #[arg(long)]
        address: String,
    },

    /// List current on-chain role members
    PrintMinters,

    /// Reconcile the registry with on-chain membership
    Sync {
        /// Requests in flight per batch (default: reconcile.batch_size)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Print the full report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Replace the registry with the current on-chain members
    Fetch,

    /// Print the signer address and its next nonce
    Nonce,

    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; silent when the files do not exist.
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();
    let paths: Vec<&str> = cli.config_paths.iter().map(|s| s.as_str()).collect();

    match cli.cmd {
        Commands::Grant { address } => commands::minters::grant(&paths, &address).await,
        Commands::Revoke { address } => commands::minters::revoke(&paths, &address).await,
        Commands::PrintMinters => commands::minters::print_minters(&paths).await,
        Commands::Sync { batch_size, json } => {
            commands::minters::sync(&paths, batch_size, json).await
        }
        Commands::Fetch => commands::minters::fetch(&paths).await,
        Commands::Nonce => commands::minters::nonce(&paths).await,
        Commands::Db { cmd } => match cmd {
            DbCmd::Status => commands::db::status(&paths).await,
            DbCmd::Migrate => commands::db::migrate(&paths).await,
        },
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            commands::config_hash(&path_refs)
        }
    }
}

/// Logs go to stderr; stdout carries `key=value` results only.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
