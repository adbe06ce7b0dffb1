//! Taskflow realtime server.
//!
//! Wires configuration, the event bus, presence, collaboration and the
//! WebSocket transport together and serves them until Ctrl-C / SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use taskflow_realtime::adapters::auth::JwtIdentityVerifier;
use taskflow_realtime::adapters::collaboration::CollaborationCoordinator;
use taskflow_realtime::adapters::events::{AuditLogHandler, EventBus, AUDITED_EVENT_TYPES};
use taskflow_realtime::adapters::http::{app_router, AppState};
use taskflow_realtime::adapters::presence::{
    InMemoryPresenceStore, PresenceTracker, RedisPresenceStore,
};
use taskflow_realtime::adapters::rate_limiter::InMemoryRateLimiter;
use taskflow_realtime::adapters::websocket::{
    ConnectionManager, NotificationComposer, WebSocketEventBridge, WebSocketState,
};
use taskflow_realtime::config::AppConfig;
use taskflow_realtime::ports::{EventSubscriber, PresenceStore};

const RATE_LIMIT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

fn init_tracing(config: &AppConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn presence_store(config: &AppConfig) -> Arc<dyn PresenceStore> {
    match config.redis.url() {
        Some(url) => {
            match tokio::time::timeout(config.redis.timeout(), RedisPresenceStore::connect(url)).await {
                Ok(Ok(store)) => {
                    info!("Presence store: redis");
                    return Arc::new(store);
                }
                Ok(Err(e)) => warn!(error = %e, "Redis unavailable, falling back to in-memory presence"),
                Err(_) => warn!("Redis connect timed out, falling back to in-memory presence"),
            }
            Arc::new(InMemoryPresenceStore::new())
        }
        None => {
            info!("Presence store: in-memory (single node)");
            Arc::new(InMemoryPresenceStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    let node_id = config.server.node_id();
    info!(node_id = %node_id, environment = ?config.server.environment, "Starting taskflow-realtime");

    // Core services
    let bus = Arc::new(EventBus::new(config.event_bus.to_bus_config()));
    let store = presence_store(&config).await;
    let presence = Arc::new(
        PresenceTracker::new(node_id.clone(), store, config.presence.to_settings())
            .with_publisher(bus.clone()),
    );
    let collaboration = Arc::new(CollaborationCoordinator::new(config.collaboration.to_config()));
    let rate_limiter = Arc::new(InMemoryRateLimiter::new(config.rate_limit.to_config()));
    let connections = Arc::new(ConnectionManager::new(
        config.connections.to_settings(),
        rate_limiter.clone(),
        presence.clone(),
        collaboration.clone(),
        bus.clone(),
    ));

    // Event handlers
    bus.subscribe_all(&AUDITED_EVENT_TYPES, Arc::new(AuditLogHandler::new()))?;
    WebSocketEventBridge::new_shared(&connections).register(bus.as_ref())?;
    NotificationComposer::new_shared(&connections).register(bus.as_ref())?;
    info!(subscriptions = bus.subscription_count(), "Event handlers registered");

    // Background loops
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = JoinSet::new();
    {
        let bus = bus.clone();
        let rx = shutdown_rx.clone();
        background.spawn(async move { bus.run_janitor(rx).await });
    }
    {
        let presence = presence.clone();
        let rx = shutdown_rx.clone();
        background.spawn(async move { presence.run_cleanup(rx).await });
    }
    {
        let presence = presence.clone();
        let rx = shutdown_rx.clone();
        background.spawn(async move { presence.run_subscriber(rx).await });
    }
    {
        let collaboration = collaboration.clone();
        let rx = shutdown_rx.clone();
        background.spawn(async move { collaboration.run_sweeper(rx).await });
    }
    {
        let connections = connections.clone();
        let rx = shutdown_rx.clone();
        background.spawn(async move { connections.run_heartbeat(rx).await });
    }
    {
        let rate_limiter = rate_limiter.clone();
        let rx = shutdown_rx.clone();
        background.spawn(async move { rate_limiter.run_purger(RATE_LIMIT_PURGE_INTERVAL, rx).await });
    }

    // HTTP
    let identity = match config.auth.issuer() {
        Some(issuer) => JwtIdentityVerifier::new(config.auth.jwt_secret.clone()).with_issuer(issuer),
        None => JwtIdentityVerifier::new(config.auth.jwt_secret.clone()),
    };
    let state = AppState {
        node_id,
        websocket: WebSocketState::new(connections.clone(), Arc::new(identity)),
        bus: bus.clone(),
        collaboration,
    };
    let app = app_router(state);

    let addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            // Heartbeat loop closes every socket with 1001 on this signal.
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let grace = config.server.shutdown_grace();
    let drained = tokio::time::timeout(grace, async {
        while let Some(result) = background.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Background task failed");
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!(grace_secs = grace.as_secs(), "Background tasks did not stop in time");
        background.abort_all();
    }

    info!("Shutdown complete");
    Ok(())
}
