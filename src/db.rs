//! Database module
//!
//! Connectivity, schema verification and bundled schema installation.

use sqlx::{Executor, PgPool};

/// Bundled schema, idempotent (`CREATE ... IF NOT EXISTS`)
pub const SCHEMA_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Tables the ledger cannot run without
const REQUIRED_TABLES: [&str; 3] = ["accounts", "entries", "transfers"];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Apply the bundled schema
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Unprepared execution so the multi-statement script runs in one round trip
    pool.execute(SCHEMA_SQL).await?;
    tracing::info!("Ledger schema applied");
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
