use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};

use solcodes::config::Config;
use solcodes::db::CodeStore;
use solcodes::indexer::HeliusIndexer;
use solcodes::{cache::StatsCache, scheduler, server};

#[derive(Parser)]
#[command(
    name = "solcodes",
    about = "Redemption code backend with a cached Solana program transaction counter."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind to
        #[arg(long)]
        bind: Option<String>,

        /// Rate limit in requests per minute per IP (0 = no limit)
        #[arg(long)]
        rate_limit: Option<u32>,

        /// Upstream RPC URL (overrides config/env)
        #[arg(long)]
        rpc_url: Option<String>,

        /// Program-derived address to count transactions for
        #[arg(long)]
        address: Option<String>,

        /// Path to the SQLite code database
        #[arg(long)]
        db: Option<PathBuf>,

        /// Seconds between refresh cycles
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run one refresh cycle and print the resulting snapshot as JSON
    Refresh {
        /// Upstream RPC URL (overrides config/env)
        #[arg(long)]
        rpc_url: Option<String>,

        /// Program-derived address to count transactions for
        #[arg(long)]
        address: Option<String>,
    },

    /// Look up the stored redemption code for a wallet
    Lookup {
        /// Wallet address
        #[arg(long)]
        wallet: String,

        /// Path to the SQLite code database
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn cmd_serve(
    bind: Option<String>,
    rate_limit: Option<u32>,
    rpc_url: Option<String>,
    address: Option<String>,
    db: Option<PathBuf>,
    interval: Option<u64>,
) -> Result<()> {
    let cfg = Config::load();

    let bind_str = bind
        .or(cfg.bind.clone())
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());
    let bind_addr = bind_str
        .parse()
        .wrap_err_with(|| format!("Invalid bind address: {}", bind_str))?;

    let rpc = rpc_url
        .or_else(|| cfg.resolved_rpc_url())
        .ok_or_else(|| eyre::eyre!("no RPC URL: set HELIUS_API_KEY or pass --rpc-url"))?;
    let program_address = address
        .or(cfg.program_address.clone())
        .ok_or_else(|| eyre::eyre!("no program address: set PROGRAM_ADDRESS or pass --address"))?;

    let config = server::ServerConfig {
        bind_addr,
        rpc_url: rpc,
        program_address,
        database_path: db
            .or(cfg.database_path.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("solcodes.db")),
        refresh_interval: Duration::from_secs(
            interval
                .or(cfg.refresh_interval_secs)
                .unwrap_or(scheduler::DEFAULT_REFRESH_INTERVAL_SECS),
        ),
        rate_limit_rpm: rate_limit.or(cfg.rate_limit_rpm).unwrap_or(60),
        allowed_origins: cfg.allowed_origins,
        api_keys: cfg.api_keys,
    };

    tracing::info!("starting solcodes server");
    tracing::info!(
        program_address = %config.program_address,
        refresh_interval_secs = config.refresh_interval.as_secs(),
        "stats refresh configured"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(server::run_server(config))?;

    Ok(())
}

fn cmd_refresh(rpc_url: Option<String>, address: Option<String>) -> Result<()> {
    let cfg = Config::load();

    let rpc = rpc_url
        .or_else(|| cfg.resolved_rpc_url())
        .ok_or_else(|| eyre::eyre!("no RPC URL: set HELIUS_API_KEY or pass --rpc-url"))?;
    let program_address = address
        .or(cfg.program_address)
        .ok_or_else(|| eyre::eyre!("no program address: set PROGRAM_ADDRESS or pass --address"))?;

    let rt = tokio::runtime::Runtime::new()?;
    let snapshot = rt.block_on(async {
        let indexer = HeliusIndexer::new(&rpc);
        let cache = StatsCache::new();
        scheduler::refresh_cycle(&indexer, &cache, &program_address).await
    })?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn cmd_lookup(wallet: String, db: Option<PathBuf>) -> Result<()> {
    let cfg = Config::load();
    let path = db
        .or(cfg.database_path.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("solcodes.db"));

    let rt = tokio::runtime::Runtime::new()?;
    let record = rt.block_on(async {
        let store = CodeStore::open(&path).await?;
        store.get_code(&wallet).await
    })?;

    match record {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => {
            eprintln!("no code stored for {}", wallet);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solcodes=info".parse().unwrap()),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            bind,
            rate_limit,
            rpc_url,
            address,
            db,
            interval,
        } => cmd_serve(bind, rate_limit, rpc_url, address, db, interval),
        Commands::Refresh { rpc_url, address } => cmd_refresh(rpc_url, address),
        Commands::Lookup { wallet, db } => cmd_lookup(wallet, db),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}
