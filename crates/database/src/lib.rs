//! Postgres persistence and object-store helpers for labelnet.

use std::sync::OnceLock;

use anyhow::Context;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod area;
pub mod dataset;
pub mod element;
pub mod label;
pub mod layer;
pub mod model;
mod ordering;
pub mod path_utils;
pub mod profile;

pub use path_utils::*;

static POOL: OnceLock<PgPool> = OnceLock::new();

/// Connects to the database and installs the global pool.
///
/// Calling it again after a successful initialization is a no-op.
///
/// # Errors
///
/// Returns an error if the connection to the database fails.
pub async fn initialize_pool(database_url: &str, max_connections: u32) -> anyhow::Result<()> {
    if POOL.get().is_some() {
        return Ok(());
    }

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("Failed to connect to the database")?;

    // Another task may have won the race; its pool is equivalent.
    let _ = POOL.set(pool);
    tracing::info!(max_connections, "Database pool initialized");

    Ok(())
}

/// Returns the global pool.
///
/// # Panics
///
/// Panics if `initialize_pool` has not completed.
pub fn get_pool() -> &'static PgPool {
    POOL.get()
        .expect("Database pool not initialized, call initialize_pool first")
}

/// Runs all pending migrations.
///
/// # Errors
///
/// Returns an error if running migrations fails.
pub async fn run_migrations() -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(get_pool()).await
}

/// Failure of a reorder operation.
#[derive(Debug, thiserror::Error)]
pub enum ReorderError {
    #[error("id {0} does not belong to this collection")]
    ForeignId(i64),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Applies an `{id: index}` map to the children of one parent row inside a transaction.
///
/// Nothing is written if any id is not a child of `parent_id`.
pub(crate) async fn reorder_children(
    table: &'static str,
    parent_column: &'static str,
    parent_id: i64,
    order: &[(i64, i32)],
) -> Result<(), ReorderError> {
    let mut tx = get_pool().begin().await?;

    let children: Vec<i64> =
        sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE {parent_column} = $1 FOR UPDATE"))
            .bind(parent_id)
            .fetch_all(&mut *tx)
            .await?;
    ordering::check_order(&children, order)?;

    set_indices(&mut tx, table, order).await?;

    tx.commit().await?;
    Ok(())
}

/// Writes `(id, index)` pairs to `table` within an open transaction.
pub(crate) async fn set_indices(
    tx: &mut sqlx::PgTransaction<'_>,
    table: &'static str,
    changes: &[(i64, i32)],
) -> Result<(), sqlx::Error> {
    let query = format!("UPDATE {table} SET index = $1 WHERE id = $2");
    for &(id, index) in changes {
        sqlx::query(&query)
            .bind(index)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}
