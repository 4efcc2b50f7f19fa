use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use storefront_session::bridge::StdoutChannel;
use storefront_session::client::HttpRenewalClient;
use storefront_session::store::{CookieJar, FileStore, MemoryStore, Tier};
use storefront_session::{api, Config, SessionManager, StorageCoordinator};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // stdout carries host messages, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_session=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    info!("storefront-session v{}", env!("CARGO_PKG_VERSION"));

    // Storage tiers
    let cookie_jar = Arc::new(CookieJar::new(config.cookie_path.clone()));
    let storage = StorageCoordinator::new()
        .with_tier(Tier::Durable, Arc::new(FileStore::new(&config.session_dir)?))
        .with_tier(Tier::Ephemeral, Arc::new(MemoryStore::new()))
        .with_tier(Tier::CookieVisible, cookie_jar.clone());
    info!("Durable session dir: {}", config.session_dir.display());

    let client = HttpRenewalClient::new(
        &config.renewal_endpoint,
        config.logout_endpoint.as_deref(),
        config.renewal_timeout,
    )?;

    let session = SessionManager::builder(Arc::new(client))
        .config(config.clone())
        .storage(storage)
        .host_channel(Arc::new(StdoutChannel))
        .cookie_jar(cookie_jar)
        .build();

    session
        .on_session_event(|event| info!("Session event: {event:?}"))
        .detach();

    if session.restore() {
        info!("Existing session restored ✓");
    }

    let app = api::router(session);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
