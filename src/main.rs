use std::env;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use deptree::config::{Config, DbType};
use deptree::middleware::auth::{issue_token, perm};
use deptree::store::{MemoryStore, SeaOrmStore, TransactionalStore};
use deptree::{db, routes, AppState};

/// Lifetime of tokens printed by `-token`
const TOKEN_TTL_SECS: i64 = 24 * 3600;

/// Value following `flag` on the command line
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .skip_while(|arg| arg.as_str() != flag)
        .nth(1)
        .cloned()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "-help" || arg == "--help") {
        println!("Usage: deptree [OPTIONS]");
        println!("Options:");
        println!("  -config <path>    Path to configuration file (default: ./etc/deptree.toml)");
        println!("  -token <user>     Print a bearer token with all permissions and exit");
        println!("  -help, --help     Print this help message");
        return Ok(());
    }

    let config_path =
        flag_value(&args, "-config").unwrap_or_else(|| "./etc/deptree.toml".to_string());

    // Load configuration first (before logging init)
    let config = Config::load(&config_path).unwrap_or_else(|e| {
        eprintln!("Could not load config file: {}, using defaults", e);
        Config::default()
    });

    if let Some(username) = flag_value(&args, "-token") {
        let token = issue_token(&config.auth.jwt_secret, &username, &perm::ALL, TOKEN_TTL_SECS)?;
        println!("{}", token);
        return Ok(());
    }

    // Initialize logging
    // Priority: RUST_LOG env var > config file > default "info"
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting Deptree server...");
    info!("Loading configuration from: {}", config_path);

    if config.auth.enabled && config.auth.jwt_secret.is_empty() {
        anyhow::bail!("auth is enabled but auth.jwt_secret is empty");
    }
    if !config.auth.enabled {
        tracing::warn!("Authorization disabled, all callers may change departments");
    }

    match config.database.db_type {
        DbType::Memory => {
            info!("Using in-memory department store");
            serve(MemoryStore::new(), config).await
        }
        DbType::Postgres | DbType::Sqlite => {
            let conn = db::init_database(&config.database).await.map_err(|e| {
                tracing::error!("Database initialization failed: {}", e);
                anyhow::anyhow!("Database initialization failed: {}", e)
            })?;
            serve(SeaOrmStore::new(conn), config).await
        }
    }
}

async fn serve<S: TransactionalStore + 'static>(store: S, config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config.addr.parse().map_err(|e| {
        anyhow::anyhow!("Invalid server address '{}': {}", config.addr, e)
    })?;

    // Create application state
    let state = AppState::new(store, config);

    // Create router
    let app = routes::create_router(state);

    info!("Server listening on {}", addr);

    // Start server
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
