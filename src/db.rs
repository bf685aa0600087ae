use sea_orm::sea_query::{IndexCreateStatement, TableCreateStatement};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    Schema, Statement,
};
use std::time::Duration;
use tracing::info;

use crate::config::{DatabaseConfig, DbType};
use crate::entity::{department, employee};

/// Initialize database connection and auto-migrate tables
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let database_url = config.connection_url();

    match config.db_type {
        DbType::Sqlite => info!("Opening sqlite database: {}", config.name),
        _ => info!("Connecting to database: {}:{}/{}", config.host, config.port, config.name),
    }

    let mut opt = ConnectOptions::new(&database_url);
    opt.connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug);

    if database_url == "sqlite::memory:" {
        // Every pooled connection would open its own empty database
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(config.max_connections)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(600));
    }

    let db = Database::connect(opt).await?;
    info!("Database connection established");

    // Auto-migrate tables
    auto_migrate(&db).await?;

    Ok(db)
}

/// Create missing tables and indexes
async fn auto_migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    info!("Running auto-migration for all entities...");

    migrate_entity(db, backend, &schema, department::Entity).await?;
    migrate_entity(db, backend, &schema, employee::Entity).await?;

    info!("Auto-migration completed successfully");
    Ok(())
}

async fn migrate_entity<E: EntityTrait>(
    db: &DatabaseConnection,
    backend: DbBackend,
    schema: &Schema,
    entity: E,
) -> Result<(), DbErr> {
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(entity)).await?;
    for stmt in schema.create_index_from_entity(entity) {
        create_index_if_not_exists(db, backend, stmt).await?;
    }
    Ok(())
}

/// Create a table if it doesn't exist
async fn create_table_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: TableCreateStatement,
) -> Result<(), DbErr> {
    // Add IF NOT EXISTS to avoid errors when table already exists
    stmt.if_not_exists();

    let sql = backend.build(&stmt);

    db.execute(Statement::from_string(backend, sql.to_string())).await?;

    Ok(())
}

async fn create_index_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: IndexCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();

    let sql = backend.build(&stmt);

    db.execute(Statement::from_string(backend, sql.to_string())).await?;

    Ok(())
}
