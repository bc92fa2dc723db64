//! Predict402 Round Keeper CLI
//!
//! Keeps Predict402 rounds moving: start, resolve, repeat.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use predict402_keeper::keeper::{Clock, RoundChain};
use predict402_keeper::types::seconds_until;
use predict402_keeper::{
    BinancePriceFeed, Config, KeeperMetrics, LifecycleDriver, Predict402Client, PriceSample, RpcClient,
    SystemClock, TxSubmitter,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "predict402-keeper")]
#[command(about = "Round lifecycle keeper for the Predict402 BTC UP/DOWN game")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the keeper loop (default)
    Run,

    /// Show the current round and keeper wallet, then exit
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG overrides the verbosity flag
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_keeper(config).await,
        Commands::Status => show_status(config).await?,
    }

    Ok(())
}

fn build_client(config: &Config) -> Predict402Client {
    let rpc = RpcClient::new(config.rpc_url.clone());
    let submitter = TxSubmitter::new(rpc.clone(), config.signer.clone(), config.chain_id, config.tx.clone());
    Predict402Client::new(rpc, submitter, config.contract_address)
}

async fn run_keeper(config: Config) {
    info!("Predict402 keeper starting");
    info!("  Contract: {:?}", config.contract_address);
    info!("  Keeper:   {:?}", config.keeper_address());
    info!("  Chain id: {}", config.chain_id);
    info!("  RPC:      {}", config.rpc_url);
    info!("  Prices:   {}", config.price.url);

    let client = build_client(&config);
    let prices = BinancePriceFeed::new(config.price.clone());

    let mut driver = LifecycleDriver::new(client, prices, SystemClock, config.keeper.clone(), KeeperMetrics::new());
    driver.run().await;
}

async fn show_status(config: Config) -> Result<()> {
    let client = build_client(&config);
    let now = SystemClock.now();

    println!("\n{}", "=".repeat(60));
    println!("  {}", "PREDICT402 KEEPER STATUS".bold());
    println!("{}\n", "=".repeat(60));

    println!("Contract:  {:?}", client.address());
    println!("Keeper:    {:?}", config.keeper_address());

    let balance = client.rpc().balance(config.keeper_address()).await?;
    println!("Balance:   {} wei", balance);

    let round_id = client.current_round_id().await?;
    if round_id == 0 {
        println!("\n{}", "No round started yet".yellow());
        return Ok(());
    }

    let round = client.get_round(round_id).await?;
    let strike = client.strike_price().await?;
    let end_time = client.round_end_time().await?;
    let left = seconds_until(end_time, now);

    println!("\nRound #{}", round_id);
    println!("  Strike:      {}", PriceSample::primary(strike));
    println!("  Ends at:     {} (unix)", end_time);
    println!("  Pools (wei): up {} | down {} | total {}", round.up_pool_wei, round.down_pool_wei, round.total_pool_wei);
    println!("  Bets:        {}", round.total_bets);

    let state = if round.resolved {
        let side = if round.up_won { "UP won".green() } else { "DOWN won".red() };
        format!(
            "{} at {} ({})",
            "resolved".green(),
            PriceSample::primary(round.closing_price_cents),
            side
        )
    } else if left > 0 {
        format!("{} ({}s left)", "active".cyan(), left)
    } else {
        format!("{} ({}s past end)", "awaiting resolution".yellow(), -left)
    };
    println!("  State:       {}", state);

    let fees = client.dev_fee_status().await?;
    println!(
        "\nDev fees:    {} wei accrued, next distribution in {}s",
        fees.accrued_wei, fees.seconds_until_next
    );

    Ok(())
}
