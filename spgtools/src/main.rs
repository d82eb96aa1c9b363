use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use log::*;
use split_payment_engine::{
    DisbursementApi,
    LedgerManagement,
    OrderManagement,
    PayoutAccountApi,
    SettlementConfig,
    SqliteDatabase,
    SweeperApi,
};
use split_payment_server::{config::ServerConfig, integrations::ProviderGateway};

mod formatting;

use formatting::{format_capability_update, format_disbursement, format_ledger, format_sweep_report};

#[derive(Parser, Debug)]
#[command(version = "0.1.0", about = "Operator tools for the split payment gateway")]
pub struct Arguments {
    /// The settlement database. Defaults to SPG_DATABASE_URL.
    #[arg(short = 'd', long = "database")]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[clap(name = "sweep", about = "Release every reserve that is due, right now")]
    Sweep(SweepParams),
    #[clap(name = "retry", about = "Retry the failed immediate payouts of an order")]
    Retry(OrderParams),
    #[clap(name = "resume", about = "Finish a disbursement that was interrupted part way through")]
    Resume(OrderParams),
    #[clap(name = "ledger", about = "Print the settlement ledger of an order")]
    Ledger(LedgerParams),
    #[clap(name = "refresh-account", about = "Pull a maker's payout capabilities from the provider")]
    RefreshAccount(MakerParams),
}

#[derive(Debug, Args)]
pub struct SweepParams {
    /// Sweep as if it were this time (RFC 3339). Defaults to now.
    #[arg(short = 'a', long = "at")]
    at: Option<DateTime<Utc>>,
}

#[derive(Debug, Args)]
pub struct OrderParams {
    /// The order's internal id
    #[arg(short = 'o', long = "order")]
    order_id: i64,
}

#[derive(Debug, Args)]
pub struct LedgerParams {
    /// The order's internal id
    #[arg(short = 'o', long = "order")]
    order_id: i64,
    /// Print the rows as JSON instead of a table
    #[arg(long = "json")]
    json: bool,
}

#[derive(Debug, Args)]
pub struct MakerParams {
    #[arg(short = 'm', long = "maker")]
    maker_id: i64,
}

struct Context {
    db: SqliteDatabase,
    provider: ProviderGateway,
    settlement: SettlementConfig,
}

impl Context {
    async fn new(database_url: Option<String>) -> Result<Self> {
        let config = ServerConfig::from_env_or_default();
        let url = database_url.unwrap_or(config.database_url);
        if url.is_empty() {
            return Err(anyhow!("No database given. Set SPG_DATABASE_URL or pass --database"));
        }
        let db = SqliteDatabase::new_with_url(&url, 5).await?;
        debug!("🗃️ Connected to {url}");
        let provider = ProviderGateway::from_config(config.stripe, config.bank)?;
        Ok(Self { db, provider, settlement: config.settlement })
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let cli = Arguments::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Arguments) -> Result<()> {
    let ctx = Context::new(cli.database_url).await?;
    match cli.command {
        Command::Sweep(params) => {
            let api = SweeperApi::new(ctx.db, ctx.provider, ctx.settlement);
            let report = api.run_sweep(params.at.unwrap_or_else(Utc::now)).await?;
            println!("{}", format_sweep_report(&report));
        },
        Command::Retry(params) => {
            let api = DisbursementApi::new(ctx.db, ctx.provider, ctx.settlement);
            let report = api.retry_failed(params.order_id).await?;
            println!("{}", format_disbursement(&report));
        },
        Command::Resume(params) => {
            let api = DisbursementApi::new(ctx.db, ctx.provider, ctx.settlement);
            let report = api.resume_disbursement(params.order_id).await?;
            println!("{}", format_disbursement(&report));
        },
        Command::Ledger(params) => {
            let order = ctx
                .db
                .fetch_order(params.order_id)
                .await?
                .ok_or_else(|| anyhow!("Order {} does not exist", params.order_id))?;
            let rows = ctx.db.fetch_ledger_for_order(order.id).await?;
            if params.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{}", format_ledger(&order, &rows));
            }
        },
        Command::RefreshAccount(params) => {
            let api = PayoutAccountApi::new(ctx.db, ctx.provider, ctx.settlement);
            let update = api.refresh_account(params.maker_id).await?;
            println!("{}", format_capability_update(params.maker_id, &update));
        },
    }
    Ok(())
}
