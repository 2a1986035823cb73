//! Numcast server binary entrypoint.
//!
//! Watches the tracked games, pushes today's numbers to subscribers and
//! serves the small HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use numcast_common::config::{AppConfig, LogFormat};
use numcast_engine::clock::LocalClock;
use numcast_engine::context::{EngineSettings, NotifierContext};
use numcast_notifier::dispatcher::Dispatcher;
use numcast_notifier::push::WebPushSender;
use numcast_store::firebase::FirebaseStore;

use numcast_api::routes::create_router;
use numcast_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration; missing credentials stop startup here
    let config = AppConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "numcast_api=info,numcast_engine=info,numcast_notifier=info,numcast_store=info,tower_http=info",
        )
    });
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    tracing::info!("Starting numcast...");

    // Connect to the database (mints the first access token)
    let store = Arc::new(FirebaseStore::connect(&config).await?);

    // Push delivery
    let sender = Arc::new(WebPushSender::from_config(&config)?);
    tracing::info!(
        subject = %config.vapid_subject,
        public_key = %config.vapid_public_key,
        "Web Push sender ready"
    );

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        sender,
        config.subscriptions_path.clone(),
    ));

    // Start discovery and watchers
    let context = NotifierContext::new(
        store,
        dispatcher.clone(),
        Arc::new(LocalClock),
        EngineSettings::from(&config),
    );
    context.start();

    // Build router
    let app = create_router(AppState::new(dispatcher))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    context.shutdown().await;
    Ok(())
}
