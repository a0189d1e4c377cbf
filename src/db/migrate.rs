use anyhow::{Result, anyhow};
use diesel::PgConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Applique les migrations en attente, retourne leurs versions
pub fn run_pending(conn: &mut PgConnection) -> Result<Vec<String>> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("Failed to run migrations: {}", e))?;

    let versions: Vec<String> = applied.iter().map(ToString::to_string).collect();
    if versions.is_empty() {
        tracing::info!("📜 Database schema is up to date");
    } else {
        for version in &versions {
            tracing::info!("📜 Applied migration {}", version);
        }
    }
    Ok(versions)
}
