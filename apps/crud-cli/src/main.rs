use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use modkit_crud::{
    BatchProcessor, BatchRequest, CrudService, Entity, PagedResult, QueryRequest, SeaStorage, Storage,
};
use runtime::{AppConfig, CliArgs};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod catalog;
mod db;

use catalog::{Author, Book};

/// crudctl - query and batch-edit the demo catalog through the CRUD engine
#[derive(Parser)]
#[command(name = "crudctl")]
#[command(about = "crudctl - query and batch-edit the demo catalog through the CRUD engine")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database URL (overrides config)
    #[arg(long)]
    database_url: Option<String>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EntityKind {
    Authors,
    Books,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog tables
    Init,
    /// Run a filtered, sorted, paged query and print the page as JSON
    Query(QueryArgs),
    /// Fetch one row by id
    Get { entity: EntityKind, id: i64 },
    /// Delete one row by id
    Delete { entity: EntityKind, id: i64 },
    /// Create or update rows from a batch request file
    Batch(BatchArgs),
    /// Check configuration
    Check,
}

#[derive(Args)]
struct QueryArgs {
    entity: EntityKind,
    /// Read the request from a JSON file instead of flags
    #[arg(long)]
    request: Option<PathBuf>,
    /// Filter expression, e.g. "contains(Name,'ana') and Id gt 2"
    #[arg(long)]
    filter: Option<String>,
    /// Sort expression, e.g. "Name desc, Id"
    #[arg(long)]
    order_by: Option<String>,
    /// Comma separated fields to read
    #[arg(long)]
    select: Option<String>,
    /// Relation to eager-load; repeatable
    #[arg(long)]
    include: Vec<String>,
    #[arg(long)]
    skip: Option<u64>,
    #[arg(long)]
    take: Option<u64>,
}

#[derive(Args)]
struct BatchArgs {
    entity: EntityKind,
    /// JSON batch request: {"items": [{"payload": {...}}], "useTransaction": true}
    file: PathBuf,
    /// Update existing rows instead of creating new ones
    #[arg(long)]
    update: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        database_url: cli.database_url.clone(),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    runtime::init_logging_from_config(&logging_config, Path::new(&config.home_dir));
    tracing::debug!("crudctl starting");

    if args.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command {
        Commands::Check => check_config(&config),
        Commands::Init => {
            let storage = open(&config).await?;
            storage.create_table(Author::descriptor().schema()).await?;
            storage.create_table(Book::descriptor().schema()).await?;
            tracing::info!("Catalog tables ready");
            println!("Catalog tables ready");
            Ok(())
        }
        Commands::Query(q) => {
            let storage = shared(open(&config).await?);
            match q.entity {
                EntityKind::Authors => run_query::<Author>(storage, &config, &q).await,
                EntityKind::Books => run_query::<Book>(storage, &config, &q).await,
            }
        }
        Commands::Get { entity, id } => {
            let storage = shared(open(&config).await?);
            match entity {
                EntityKind::Authors => print_json(&service::<Author>(storage, &config)?.get_by_id(id).await?),
                EntityKind::Books => print_json(&service::<Book>(storage, &config)?.get_by_id(id).await?),
            }
        }
        Commands::Delete { entity, id } => {
            let storage = shared(open(&config).await?);
            let deleted = match entity {
                EntityKind::Authors => service::<Author>(storage, &config)?.delete(id).await?,
                EntityKind::Books => service::<Book>(storage, &config)?.delete(id).await?,
            };
            print_json(&serde_json::json!({ "deleted": deleted }))
        }
        Commands::Batch(b) => {
            let storage = shared(open(&config).await?);
            match b.entity {
                EntityKind::Authors => run_batch::<Author>(storage, &b).await,
                EntityKind::Books => run_batch::<Book>(storage, &b).await,
            }
        }
    }
}

async fn open(config: &AppConfig) -> Result<SeaStorage> {
    let db_config = config
        .database
        .as_ref()
        .ok_or_else(|| anyhow!("No database configured; set `database.url` or pass --database-url"))?;
    db::connect(db_config, &config.home_path()).await
}

fn shared(storage: SeaStorage) -> Arc<dyn Storage> {
    Arc::new(storage)
}

fn service<E: Entity>(storage: Arc<dyn Storage>, config: &AppConfig) -> Result<CrudService<E>> {
    Ok(CrudService::new(storage, config.crud.clone())?)
}

fn query_request(q: &QueryArgs) -> Result<QueryRequest> {
    if let Some(path) = &q.request {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file {}", path.display()))?;
        return serde_json::from_str(&raw).context("Failed to parse query request JSON");
    }
    Ok(QueryRequest {
        include: q.include.clone(),
        filter: q.filter.clone(),
        order_by: q.order_by.clone(),
        select: q.select.clone(),
        skip: q.skip,
        take: q.take,
    })
}

async fn run_query<E: Entity + Serialize>(
    storage: Arc<dyn Storage>,
    config: &AppConfig,
    args: &QueryArgs,
) -> Result<()> {
    let svc = service::<E>(storage, config)?;
    let query = query_request(args)?.parse()?;

    if query.select.is_some() {
        let desc = E::descriptor();
        let page = svc.query_select_paged(&query).await?;
        let page: PagedResult<serde_json::Value> =
            page.map_items(|p| desc.to_row(&p.entity).project(&p.fields).to_json());
        return print_json(&page);
    }
    print_json(&svc.query_paged(&query).await?)
}

async fn run_batch<E: Entity + Serialize + DeserializeOwned>(storage: Arc<dyn Storage>, args: &BatchArgs) -> Result<()> {
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read batch file {}", args.file.display()))?;
    let request: BatchRequest<E> = serde_json::from_str(&raw).context("Failed to parse batch request JSON")?;

    let processor = BatchProcessor::<E>::new(storage);
    let result = if args.update {
        processor.update_many(request).await?
    } else {
        processor.create_many(request).await?
    };
    print_json(&result)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    if let Some(db_config) = &config.database {
        db::detect_backend(&db_config.url)?;
    }
    println!("Configuration check passed");
    println!("{}", config.to_yaml()?);
    Ok(())
}
