//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up
//! idempotently; every `CREATE TABLE IF NOT EXISTS` is safe to re-run
//! on an existing database.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Run the idempotent table migrations (safe to call multiple times).
///
/// Split from `init_database` so tests can run it against an in-memory
/// pool.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_bands_table(pool).await?;
    create_users_table(pool).await?;
    create_rehearsals_table(pool).await?;
    create_rehearsal_cancellations_table(pool).await?;
    create_rehearsal_overrides_table(pool).await?;
    create_attendance_table(pool).await?;
    Ok(())
}

async fn create_bands_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS bands (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_rehearsals_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS rehearsals (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            location TEXT,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            tz_offset_minutes INTEGER NOT NULL DEFAULT 0,
            band_id TEXT NOT NULL REFERENCES bands(id),
            created_by TEXT NOT NULL REFERENCES users(id),
            recurrence TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rehearsals_band ON rehearsals(band_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_rehearsal_cancellations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS rehearsal_cancellations (
            rehearsal_id TEXT NOT NULL REFERENCES rehearsals(id) ON DELETE CASCADE,
            date TEXT NOT NULL,
            PRIMARY KEY (rehearsal_id, date)
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_rehearsal_overrides_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS rehearsal_overrides (
            rehearsal_id TEXT NOT NULL REFERENCES rehearsals(id) ON DELETE CASCADE,
            date TEXT NOT NULL,
            start_time TEXT,
            end_time TEXT,
            location TEXT,
            PRIMARY KEY (rehearsal_id, date)
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_attendance_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS attendance (
            rehearsal_id TEXT NOT NULL REFERENCES rehearsals(id) ON DELETE CASCADE,
            date TEXT NOT NULL,
            member_id TEXT NOT NULL REFERENCES users(id),
            status TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (rehearsal_id, date, member_id)
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}
