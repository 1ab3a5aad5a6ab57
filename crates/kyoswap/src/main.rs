#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use alloy::primitives::{
    utils::{format_ether, parse_ether},
    Address, U256,
};
use clap::{Args, Parser, Subcommand};
use eyre::Context as _;
use rust_decimal::Decimal;
use tracing_subscriber::prelude::*;

mod cli_output;
mod config;
mod descriptor;
mod driver;
mod engine;
mod errors;
mod fees;
mod finalize;
mod gas;
mod node;
mod numeric;
mod paths;
mod quote;
mod retry;
mod revert;
mod store;
mod submit;

use crate::config::SwapConfig;
use crate::driver::{Driver, DriverSettings, SwapPlan};
use crate::node::RpcNode;
use crate::quote::QuoteClient;

#[derive(Parser, Debug)]
#[command(name = "kyoswap", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

fn parse_amount(s: &str) -> Result<U256, String> {
    parse_ether(s.trim()).map_err(|e| format!("invalid amount {s:?}: {e}"))
}

#[derive(Args, Debug)]
struct SwapArgs {
    /// Native amount to sell per swap, in whole coins (e.g. `0.01`).
    #[arg(long, value_parser = parse_amount)]
    amount: U256,

    /// Number of swaps to run.
    #[arg(long, default_value_t = 1)]
    loops: u32,

    /// Slippage as a fraction (`0.01` = 1%). Defaults to the configured value.
    #[arg(long)]
    slippage: Option<Decimal>,

    /// Prepare and print transactions without signing or sending them.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Skip the confirmation prompt (required when stdin is not a terminal).
    #[arg(long, default_value_t = false)]
    yes: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Swap native coin for USDC through Kyoko routes, one or more times.
    Swap(SwapArgs),

    /// Fetch a route and print the first transaction descriptor, raw and normalized.
    Quote {
        #[arg(long, value_parser = parse_amount)]
        amount: U256,

        /// Quote origin. Defaults to the address of `PRIVATE_KEY`.
        #[arg(long)]
        from: Option<Address>,

        #[arg(long)]
        slippage: Option<Decimal>,
    },

    /// Print native and USDC balances as JSON.
    Balance {
        /// Defaults to the address of `PRIVATE_KEY`.
        #[arg(long)]
        address: Option<Address>,
    },

    /// Print the effective configuration as JSON (secrets omitted).
    Config,

    /// Print resolved paths (useful for debugging).
    Paths,
}

fn init_logging(paths: &paths::KyoswapPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("kyoswap.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
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

/// `explicit`, else the address of `PRIVATE_KEY`.
fn resolve_owner(explicit: Option<Address>) -> eyre::Result<Address> {
    if let Some(a) = explicit {
        return Ok(a);
    }
    let key = store::private_key_from_env().context("no address given")?;
    Ok(submit::signer_from_secret(&key)?.address())
}

async fn run_swap(mut cfg: SwapConfig, args: &SwapArgs) -> eyre::Result<()> {
    if let Some(s) = args.slippage {
        cfg.driver.slippage = s;
    }
    cfg.driver.dry_run |= args.dry_run;
    cfg.validate().context("invalid configuration")?;

    let key = store::private_key_from_env()?;
    let signer = submit::signer_from_secret(&key)?;
    let node = RpcNode::from_config(&cfg.rpc);
    let quotes = QuoteClient::new(&cfg.quote)?;
    let driver = Driver::new(&node, &quotes, &signer, DriverSettings::from_config(&cfg)?);

    cli_output::stderr_writeln(&format!("Wallet: {}", signer.address()));
    let balances = driver.balances().await?;
    balances.print();

    let plan = SwapPlan {
        amount_wei: args.amount,
        loops: args.loops,
        slippage: cfg.driver.slippage,
        dry_run: cfg.driver.dry_run,
    };
    plan.validate(balances.native)?;
    cli_output::print_swap_plan(
        &format_ether(plan.amount_wei),
        plan.loops,
        &(plan.slippage * Decimal::ONE_HUNDRED).normalize().to_string(),
        plan.dry_run,
    );
    cli_output::confirm_swap_or_bail(args.yes)?;

    let report = driver.run(&plan).await?;
    tracing::info!(
        planned = report.planned,
        attempted = report.attempted,
        successful = report.successful,
        "swap run finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = paths::KyoswapPaths::discover()?;
    paths.ensure_data_dir()?;
    let _log_guard = init_logging(&paths);
    let store = store::ConfigStore::new(&paths);

    match cli.cmd {
        Command::Swap(args) => run_swap(store.load()?, &args).await.context("swap failed"),
        Command::Quote {
            amount,
            from,
            slippage,
        } => {
            let mut cfg = store.load()?;
            if let Some(s) = slippage {
                cfg.driver.slippage = s;
            }
            cfg.validate().context("invalid configuration")?;
            let owner = resolve_owner(from)?;
            let request = quote::route_request(
                owner,
                cfg.native_placeholder()?,
                cfg.usdc_address()?,
                amount,
                cfg.driver.slippage,
            )?;
            let client = QuoteClient::new(&cfg.quote)?;
            let v = driver::describe_route(&client, &request)
                .await
                .context("quote failed")?;
            cli_output::print_json(&v)
        }
        Command::Balance { address } => {
            let cfg = store.load()?;
            cfg.validate().context("invalid configuration")?;
            let owner = resolve_owner(address)?;
            let node = RpcNode::from_config(&cfg.rpc);
            let b = driver::read_balances(&node, owner, cfg.usdc_address()?).await?;
            cli_output::print_json(&b.to_json(owner))
        }
        Command::Config => {
            let cfg = serde_json::to_value(store.load()?).context("serialize config")?;
            cli_output::print_json(&serde_json::json!({
                "config": cfg,
                "private_key_set": store::private_key_from_env().is_ok(),
            }))
        }
        Command::Paths => cli_output::print_json(&serde_json::to_value(&paths)?),
    }
}
