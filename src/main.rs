use std::sync::Arc;
use tokio::sync::watch;

use review_market::clock::SystemClock;
use review_market::config::Config;
use review_market::state::AppState;
use review_market::{db, routes, Marketplace};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "review_market=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let market = Arc::new(Marketplace::new(
        config.policy.clone(),
        config.pricing,
        Arc::new(SystemClock),
    ));

    let pool = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(pool.as_ref()).await?;
            db::spawn_projector(pool.clone(), market.events().subscribe());
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running without Postgres projection");
            None
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = market.scheduler(config.sweep_interval).spawn(shutdown_rx);

    let state = Arc::new(AppState { market, pool });
    let app = routes::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Review market listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    tracing::info!("Shutting down");
    shutdown_tx.send(true).ok();
    scheduler.await?;

    Ok(())
}
