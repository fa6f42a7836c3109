//! Database module for SQLite persistence.
//!
//! SQLite is the shared store: every client's read model converges on it.

mod repository;
mod votes;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        INSERT OR IGNORE INTO meta (id, schema_version, revision_id, generated_at)
        VALUES (1, 1, 0, datetime('now'));
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resources (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            category TEXT NOT NULL,
            address TEXT NOT NULL,
            contact TEXT,
            email TEXT,
            website TEXT,
            description TEXT,
            hours TEXT,
            services TEXT,
            status TEXT NOT NULL DEFAULT 'Open',
            is_user_submitted INTEGER NOT NULL DEFAULT 0,
            is_admin_submitted INTEGER NOT NULL DEFAULT 0,
            approved INTEGER NOT NULL DEFAULT 0,
            verification_status TEXT NOT NULL DEFAULT 'pending',
            helpful_votes INTEGER NOT NULL DEFAULT 0,
            unhelpful_votes INTEGER NOT NULL DEFAULT 0,
            verification_votes INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // original_resource_id is a weak reference, no foreign key
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_edits (
            id TEXT PRIMARY KEY,
            original_resource_id TEXT NOT NULL,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            category TEXT NOT NULL,
            address TEXT NOT NULL,
            contact TEXT,
            email TEXT,
            website TEXT,
            description TEXT,
            hours TEXT,
            services TEXT,
            status TEXT NOT NULL DEFAULT 'Open',
            verification_status TEXT NOT NULL DEFAULT 'pending',
            verification_votes INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_votes (
            id TEXT PRIMARY KEY,
            resource_id TEXT NOT NULL,
            voter_ip TEXT NOT NULL,
            vote_type TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS verification_votes (
            id TEXT PRIMARY KEY,
            resource_id TEXT,
            edit_id TEXT,
            voter_ip TEXT NOT NULL,
            vote_type TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS visitor_tracking (
            visitor_ip TEXT PRIMARY KEY,
            user_agent TEXT,
            visit_count INTEGER NOT NULL DEFAULT 1,
            last_visit TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_resources_created_at ON resources(created_at);
        CREATE INDEX IF NOT EXISTS idx_resources_live ON resources(approved, verification_status);
        CREATE INDEX IF NOT EXISTS idx_edits_status ON resource_edits(verification_status, created_at);
        CREATE INDEX IF NOT EXISTS idx_resource_votes_voter ON resource_votes(resource_id, voter_ip);
        CREATE INDEX IF NOT EXISTS idx_verification_votes_resource ON verification_votes(resource_id, voter_ip);
        CREATE INDEX IF NOT EXISTS idx_verification_votes_edit ON verification_votes(edit_id, voter_ip);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
