use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::SqlitePool;

use stocktake_lib::config::{Config, ConfigOverrides};
use stocktake_lib::purchases::{
    self, Comparison, DateRange, NewPurchase, PageRequest, PurchaseFilter, PurchaseListRequest,
    PurchaseSort, PurchaseStatus, PurchaseUpdate,
};
use stocktake_lib::session::Session;
use stocktake_lib::{db, logging, migrate, AppError};

#[derive(Debug, Parser)]
#[command(name = "stocktake", about = "Purchase records for a small inventory", version)]
struct Cli {
    /// Database file. Overrides STOCKTAKE_DB.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Log filter directives. Overrides STOCKTAKE_LOG.
    #[arg(long, global = true)]
    log: Option<String>,
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
    /// Default page size for listings. Overrides STOCKTAKE_PAGE_SIZE.
    #[arg(long, global = true)]
    page_size: Option<u32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending schema migrations.
    Migrate,
    /// Show which migrations are applied.
    Status,
    /// List purchases with derived totals.
    List(ListArgs),
    /// Record a purchase from a JSON document (`-` reads stdin).
    Create {
        /// Username of the staff member recording the purchase.
        #[arg(long)]
        user: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Print one stored purchase.
    Get { id: String },
    /// Edit the stored fields of a purchase.
    Update {
        id: String,
        #[arg(long)]
        provider_id: Option<String>,
        #[arg(long)]
        date: Option<i64>,
        #[arg(long)]
        pay_due_date: Option<i64>,
        #[arg(long)]
        paid_amount: Option<i64>,
    },
    /// Print the line items of a purchase with product and batch details.
    Items { id: String },
    /// Delete a purchase and its line items.
    Delete { id: String },
    /// Print id and provider name for every purchase.
    Options,
}

#[derive(Debug, clap::Args)]
struct ListArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// Sort key, e.g. remainingCost or providerName.
    #[arg(long)]
    sort: Option<String>,
    /// ASC or DESC.
    #[arg(long)]
    dir: Option<String>,
    /// Restrict to these purchase ids. Repeatable.
    #[arg(long = "id")]
    ids: Vec<String>,
    /// Substring of the provider name.
    #[arg(long)]
    provider: Option<String>,
    /// Any instant (epoch ms) within the UTC day to match.
    #[arg(long, conflicts_with_all = ["from", "to"])]
    date: Option<i64>,
    #[arg(long, requires = "to")]
    from: Option<i64>,
    #[arg(long, requires = "from")]
    to: Option<i64>,
    /// Comparisons such as `300`, `>=100` or `<50`.
    #[arg(long)]
    paid_amount: Option<Comparison>,
    #[arg(long)]
    items_count: Option<Comparison>,
    #[arg(long)]
    total_cost: Option<Comparison>,
    #[arg(long)]
    remaining_cost: Option<Comparison>,
    /// Paid or Partial.
    #[arg(long)]
    status: Option<PurchaseStatus>,
}

impl ListArgs {
    fn into_request(self, page_size: u32) -> Result<PurchaseListRequest> {
        let sort = PurchaseSort::parse(self.sort.as_deref(), self.dir.as_deref())
            .map_err(AppError::from)?;
        let date = match (self.date, self.from, self.to) {
            (Some(day), _, _) => Some(DateRange::day(day)),
            (None, Some(from), Some(to)) => Some(DateRange { from, to }),
            _ => None,
        };
        Ok(PurchaseListRequest {
            page: PageRequest::new(self.page, page_size),
            sort,
            filter: PurchaseFilter {
                ids: (!self.ids.is_empty()).then_some(self.ids),
                date,
                provider_name: self.provider,
                paid_amount: self.paid_amount,
                items_count: self.items_count,
                total_cost: self.total_cost,
                remaining_cost: self.remaining_cost,
                status: self.status,
            },
        })
    }
}

fn main() {
    let cli = Cli::parse();
    let config = match Config::resolve(ConfigOverrides {
        db_path: cli.db.clone(),
        log_filter: cli.log.clone(),
        log_json: cli.log_json,
        page_size: cli.page_size,
    }) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(2);
        }
    };
    logging::init(&config.log_filter, config.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Error: start async runtime: {err}");
            process::exit(1);
        }
    };
    match runtime.block_on(run(cli.command, &config)) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

async fn run(command: Commands, config: &Config) -> Result<i32> {
    let pool = db::open_sqlite_pool(&config.db_path).await?;
    migrate::apply_migrations(&pool)
        .await
        .context("apply migrations")?;
    let result = dispatch(&pool, command, config).await;
    pool.close().await;
    result
}

async fn dispatch(pool: &SqlitePool, command: Commands, config: &Config) -> Result<i32> {
    match command {
        Commands::Migrate => {
            println!("Database is up to date at {}", config.db_path.display());
        }
        Commands::Status => {
            for status in migrate::migration_status(pool).await? {
                let state = if status.applied { "applied" } else { "pending" };
                println!("{:<24} {state}", status.version);
            }
        }
        Commands::List(args) => {
            let request = args.into_request(config.page_size)?;
            print_json(&purchases::list_purchases(pool, &request).await?)?;
        }
        Commands::Create { user, file } => {
            let input: NewPurchase = serde_json::from_str(&read_input(&file)?)
                .with_context(|| format!("parse purchase document {}", file.display()))?;
            let session = Session::for_username(pool, &user).await?;
            print_json(&purchases::create_purchase(pool, &session, input).await?)?;
        }
        Commands::Get { id } => match purchases::get_purchase(pool, &id).await? {
            Some(purchase) => print_json(&purchase)?,
            None => {
                eprintln!("Error: purchase {id} not found");
                return Ok(1);
            }
        },
        Commands::Update {
            id,
            provider_id,
            date,
            pay_due_date,
            paid_amount,
        } => {
            let update = PurchaseUpdate {
                provider_id,
                date,
                pay_due_date,
                paid_amount,
            };
            print_json(&purchases::update_purchase(pool, &id, &update).await?)?;
        }
        Commands::Items { id } => {
            print_json(&purchases::get_purchase_line_items(pool, &id).await?)?;
        }
        Commands::Delete { id } => {
            purchases::delete_purchase(pool, &id).await?;
            println!("Deleted purchase {id}");
        }
        Commands::Options => {
            print_json(&purchases::purchase_options(pool).await?)?;
        }
    }
    Ok(0)
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read purchase document from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}
