use clap::{Parser, Subcommand};
use lineage_cache::cache::{build_cache_store, CacheKeys, CacheOperation, CachedRepository};
use lineage_cache::config::CacheConfig;
use lineage_cache::db::{migrate, Db};
use lineage_cache::http::HttpServer;
use lineage_cache::repository::SqliteRepository;
use lineage_cache::Config;
use std::path::Path;
use std::sync::Arc;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "lineage-cache", version)]
#[command(about = "Column-level lineage service with a cache-aside read layer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply migrations and serve the HTTP API
    Serve,
    /// Apply migrations and check the catalog schema (default)
    Verify,
    /// Print the cache key for an operation and its parameters
    Key {
        /// lineage-graph, namespace-list, dataset-list, lineage-stats, dataset-schema or search
        operation: String,
        params: Vec<String>,
        /// Key prefix; defaults to cache.key_prefix from the config file
        #[arg(long)]
        prefix: Option<String>,
    },
}

fn init_logger(default_level: &str) {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", default_level)
    ).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Verify) {
        Command::Serve => {
            let config = Config::load()?;
            init_logger(&config.catalog.log_level);
            run_http_server(config).await?;
        }
        Command::Verify => {
            let config = Config::load()?;
            init_logger(&config.catalog.log_level);
            run_schema_verification(config).await?;
        }
        Command::Key { operation, params, prefix } => {
            init_logger("warn");
            print_cache_key(&operation, &params, prefix)?;
        }
    }

    Ok(())
}

async fn open_catalog(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path());

    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| {
        migrate::run_migrations(conn, migrations_dir)
    }).await?;

    log::info!("Catalog database ready at {}", config.db_path().display());
    Ok(db)
}

/// Run the HTTP API over the cached SQLite repository
async fn run_http_server(config: Config) -> Result<()> {
    log::info!("Starting lineage-cache v{}", env!("CARGO_PKG_VERSION"));

    let db = open_catalog(&config).await?;
    let store = build_cache_store(&config.cache).await;
    let repo = CachedRepository::new(SqliteRepository::new(db), store, &config.cache);

    let server = HttpServer::new(Arc::new(repo), Arc::new(config));
    server.run().await?;

    Ok(())
}

/// Run database schema verification
async fn run_schema_verification(config: Config) -> Result<()> {
    log::info!("Starting lineage-cache v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());

    let db = open_catalog(&config).await?;

    let (missing, applied) = db.with_connection(|conn| {
        Ok((migrate::verify_schema(conn)?, migrate::get_applied_migrations(conn)?))
    }).await?;

    for name in &applied {
        log::info!("  ✓ migration {}", name);
    }
    if !missing.is_empty() {
        anyhow::bail!("Catalog schema is missing tables: {}", missing.join(", "));
    }

    log::info!("✓ All {} catalog tables present", migrate::REQUIRED_TABLES.len());
    Ok(())
}

fn print_cache_key(operation: &str, params: &[String], prefix: Option<String>) -> Result<()> {
    let op: CacheOperation = operation.parse()?;
    let expected = op.param_names();
    if params.len() != expected.len() {
        anyhow::bail!(
            "{} takes {} parameter(s): {}",
            op,
            expected.len(),
            expected.join(" ")
        );
    }

    let prefix = match prefix {
        Some(prefix) => prefix,
        None => Config::load()
            .map(|c| c.cache.key_prefix)
            .unwrap_or_else(|_| CacheConfig::default().key_prefix),
    };

    println!("{}", CacheKeys::new(prefix).key(op, params));
    Ok(())
}
