#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use clap::{Parser, Subcommand};
use eyre::Context as _;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Instrument as _;
use tracing_subscriber::prelude::*;

mod address_book;
mod admin;
mod artifacts;
mod chain;
mod chunk;
mod client;
mod config;
mod contracts;
mod errors;
mod fsutil;
mod lock;
mod paths;
mod reserves;
mod retry;
mod signer;
mod store;
mod tasks;

use address_book::AddressBook;
use client::{ChainClient as _, LiveClient};
use config::DeployConfig;
use paths::DeployPaths;
use tasks::TaskContext;

#[derive(Parser, Debug)]
#[command(name = "pooldeploy", version)]
struct Cli {
    /// Config file. Defaults to `pooldeploy.toml` in the config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Network to run against. Overrides `network` in the config.
    #[arg(long, global = true)]
    network: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy token implementations and rate strategies, then initialize every reserve of the
    /// market in chunked `batchInitReserve` transactions.
    InitReserves {
        /// Market to initialize (a key under `[markets]`).
        #[arg(long, default_value = "Aave")]
        pool: String,
        /// Only logged; explorer verification is a separate step.
        #[arg(long, default_value_t = false)]
        verify: bool,
    },

    /// Enable collateral and borrowing parameters through `ATokensAndRatesHelper`.
    ///
    /// The helper holds the pool admin role for the duration of the run.
    ConfigureReserves {
        #[arg(long, default_value = "Aave")]
        pool: String,
    },

    /// Deploy the market's `LendingPoolAddressesProvider`, register it and set its admins.
    DeployAddressProvider {
        #[arg(long, default_value = "Aave")]
        pool: String,
        #[arg(long, default_value_t = false)]
        verify: bool,
        /// Leave the provider out of the provider registry.
        #[arg(long, default_value_t = false)]
        skip_registry: bool,
    },

    /// Wire the lending pool and configurator into the provider and deploy the batch helpers.
    DeployLendingPool {
        #[arg(long, default_value = "Aave")]
        pool: String,
        #[arg(long, default_value_t = false)]
        verify: bool,
    },

    /// Submit a prepared JSON batch of reserve init records as one transaction.
    SubmitBatch {
        file: PathBuf,
        /// Configurator proxy. Defaults to the address book entry.
        #[arg(long)]
        configurator: Option<alloy::primitives::Address>,
    },

    /// Print the transactions `init-reserves` and `configure-reserves` would send (offline).
    Plan {
        #[arg(long, default_value = "Aave")]
        pool: String,
    },

    /// Print the address book.
    Addresses,

    /// Print resolved paths (useful for debugging).
    Paths,
}

impl Command {
    const fn name(&self) -> &'static str {
        match self {
            Self::InitReserves { .. } => "init-reserves",
            Self::ConfigureReserves { .. } => "configure-reserves",
            Self::DeployAddressProvider { .. } => "deploy-address-provider",
            Self::DeployLendingPool { .. } => "deploy-lending-pool",
            Self::SubmitBatch { .. } => "submit-batch",
            Self::Plan { .. } => "plan",
            Self::Addresses => "addresses",
            Self::Paths => "paths",
        }
    }
}

fn init_logging(paths: &DeployPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("pooldeploy.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn print_json<T: serde::Serialize>(v: &T) -> eyre::Result<()> {
    use std::io::Write as _;
    let s = serde_json::to_string_pretty(v).context("serialize output")?;
    writeln!(std::io::stdout().lock(), "{s}").context("write output")
}

/// Resolved state shared by every command.
struct Session {
    paths: DeployPaths,
    cfg: DeployConfig,
    network: String,
}

impl Session {
    fn address_book(&self) -> eyre::Result<AddressBook> {
        let path = self
            .cfg
            .address_book
            .clone()
            .unwrap_or_else(|| self.paths.address_book_file());
        AddressBook::open(&path)
    }

    fn live_client(&self) -> eyre::Result<LiveClient> {
        let net = self.cfg.network(&self.network)?;
        let chain = chain::EvmChain::from_config(&self.network, net);
        let signer = signer::SignerSource::from_env()?.signer()?;
        let artifacts = artifacts::Artifacts::new(self.cfg.artifacts_dir.clone());
        tracing::debug!(dir = %artifacts.dir().display(), "artifacts");
        let client = LiveClient::new(
            chain,
            signer,
            artifacts,
            Duration::from_secs(self.cfg.receipt_timeout_seconds),
        );
        tracing::info!(
            network = %self.network,
            chain_id = client.chain.chain_id,
            deployer = %client.sender(),
            "connected"
        );
        Ok(client)
    }

    fn lock(&self) -> eyre::Result<lock::RunLock> {
        lock::RunLock::acquire(&self.paths.run_lock_file(&self.network), &self.network)
    }
}

async fn run_market_task(session: &Session, cmd: Command) -> eyre::Result<()> {
    let _lock = session.lock()?;
    let client = session.live_client()?;
    let mut book = session.address_book()?;

    let (pool, verify) = match &cmd {
        Command::InitReserves { pool, verify }
        | Command::DeployAddressProvider { pool, verify, .. }
        | Command::DeployLendingPool { pool, verify } => (pool.as_str(), *verify),
        Command::ConfigureReserves { pool } => (pool.as_str(), false),
        Command::SubmitBatch { .. } | Command::Plan { .. } | Command::Addresses | Command::Paths => {
            eyre::bail!("{} is not a market task", cmd.name())
        }
    };
    let market = session.cfg.market(pool)?;
    let mut ctx = TaskContext {
        client: &client,
        network: &session.network,
        market,
        book: &mut book,
        verify,
    };

    match cmd {
        Command::InitReserves { .. } => {
            print_json(&tasks::init_reserves::run(&mut ctx).await.context("init reserves")?)
        }
        Command::ConfigureReserves { .. } => print_json(
            &tasks::configure_reserves::run(&mut ctx)
                .await
                .context("configure reserves")?,
        ),
        Command::DeployAddressProvider { skip_registry, .. } => print_json(
            &tasks::address_provider::run(&mut ctx, skip_registry)
                .await
                .context("deploy address provider")?,
        ),
        Command::DeployLendingPool { .. } => print_json(
            &tasks::lending_pool::run(&mut ctx)
                .await
                .context("deploy lending pool")?,
        ),
        Command::SubmitBatch { .. } | Command::Plan { .. } | Command::Addresses | Command::Paths => {
            eyre::bail!("{} is not a market task", cmd.name())
        }
    }
}

async fn run(session: Session, cmd: Command) -> eyre::Result<()> {
    match cmd {
        Command::Paths => print_json(&serde_json::json!({
            "config_dir": session.paths.config_dir,
            "data_dir": session.paths.data_dir,
            "log_file": session.paths.log_file,
            "address_book": session.cfg.address_book.clone()
                .unwrap_or_else(|| session.paths.address_book_file()),
            "artifacts_dir": session.cfg.artifacts_dir,
            "network": session.network,
        })),
        Command::Addresses => {
            let book = session.address_book()?;
            print_json(&serde_json::json!({
                "path": book.path(),
                "entries": book.entries(),
            }))
        }
        Command::Plan { ref pool } => {
            let market = session.cfg.market(pool)?;
            let book = session.address_book()?;
            print_json(&tasks::plan::build(market, &session.network, &book))
        }
        Command::SubmitBatch { file, configurator } => {
            let batch = tasks::submit_batch::BatchFile::load(&file)?;
            let _lock = session.lock()?;
            let configurator = match configurator {
                Some(a) => a,
                None => session
                    .address_book()?
                    .require(contracts::names::CONFIGURATOR, &session.network)?,
            };
            let client = session.live_client()?;
            print_json(
                &tasks::submit_batch::run(&client, configurator, batch)
                    .await
                    .context("submit batch")?,
            )
        }
        Command::InitReserves { .. }
        | Command::ConfigureReserves { .. }
        | Command::DeployAddressProvider { .. }
        | Command::DeployLendingPool { .. } => run_market_task(&session, cmd).await,
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = DeployPaths::discover()?;
    fsutil::ensure_dir(&paths.data_dir).context("create data dir")?;
    let _log_guard = init_logging(&paths);

    let store = match &cli.config {
        Some(p) => store::ConfigStore::at(p),
        None => store::ConfigStore::new(&paths),
    };
    let cfg = store.load_or_init_default()?;
    tracing::debug!(path = %store.path().display(), "config loaded");
    let network = cli
        .network
        .clone()
        .unwrap_or_else(|| cfg.network.clone());

    let span = tracing::info_span!(
        "run",
        run_id = %uuid::Uuid::new_v4(),
        command = cli.cmd.name(),
        network = %network,
    );
    run(
        Session {
            paths,
            cfg,
            network,
        },
        cli.cmd,
    )
    .instrument(span)
    .await
}
