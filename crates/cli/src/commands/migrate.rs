//! Database migration command.
//!
//! Applies `crates/server/migrations/` and creates the tower-sessions table.
//!
//! ```bash
//! stockroom migrate
//! ```

use tower_sessions_sqlx_store::PostgresStore;

use super::{CommandError, connect};

/// Run all pending migrations.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running schema migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Creating session table...");
    PostgresStore::new(pool)
        .migrate()
        .await
        .map_err(|e| CommandError::SessionStore(e.to_string()))?;

    tracing::info!("Migrations complete");
    Ok(())
}
