//! Broadcast delivery server.

use std::sync::Arc;

use actors::{
    ActorRef, DryRunTransport, NeynarTransport, NotificationTransport, SupervisorArgs,
    SupervisorMessage, start_supervisor,
};
use api::AppState;
use db::repositories::BroadcastRepository;
use tracing_subscriber::EnvFilter;

use config::AppConfig;

mod config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Initializing broadcast server...");

    let store = db::connect(&config.store).await?;

    let transport: Arc<dyn NotificationTransport> = match config.neynar.clone() {
        Some(neynar) => Arc::new(NeynarTransport::new(neynar)),
        None => {
            tracing::warn!("NEYNAR_API_KEY not set; notifications will only be logged");
            Arc::new(DryRunTransport)
        }
    };

    let (supervisor, supervisor_handle) = start_supervisor(SupervisorArgs {
        broadcasts: BroadcastRepository::new(store.clone()),
        transport: transport.clone(),
        policy: config.policy.clone(),
        sweep: config.sweep.clone(),
    })
    .await?;

    let state = AppState::new(store, supervisor.clone(), transport, config.policy.clone());
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(supervisor))
        .await?;

    supervisor_handle.await?;

    tracing::info!("Broadcast server shut down");
    Ok(())
}

/// Resolve on Ctrl-C after asking the supervisor to cancel its workers.
///
/// Stopping the supervisor closes the event channel, which ends open SSE
/// streams so the HTTP server can drain.
async fn shutdown_signal(supervisor: ActorRef<SupervisorMessage>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received; stopping delivery workers");
    if let Err(e) = supervisor.send_message(SupervisorMessage::Shutdown) {
        tracing::warn!("Supervisor already stopped: {}", e);
    }
}
