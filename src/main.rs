use bounty_store::config::Config;
use bounty_store::db::connection::{create_pool, get_connection};
use bounty_store::db::migrate;
use bounty_store::logging::setup_logging;
use bounty_store::maintenance;

// ----------------- Main -----------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();
    let config = Config::from_env()?;
    tracing::info!(
        environment = config.environment.as_str(),
        database = %Config::mask_credentials(&config.database_url),
        "Starting bounty-store maintenance worker..."
    );

    let pool = create_pool(&config)?;
    if config.run_migrations {
        let mut conn = get_connection(&pool)?;
        let applied = migrate::run_pending(&mut conn)?;
        tracing::info!("{} migration(s) applied", applied.len());
    }

    let mut ticker = tokio::time::interval(config.sweep_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let pool = pool.clone();
                let now = chrono::Utc::now();
                match tokio::task::spawn_blocking(move || maintenance::sweep(&pool, now)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::error!("Sweep failed: {}", e),
                    Err(e) => tracing::error!("Sweep task panicked: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }
    Ok(())
}
