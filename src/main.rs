use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tourbook_api::{
    app_router,
    config::load_config,
    db,
    events::{event_channel, process_events},
    services::sweeper::PaymentSweeper,
    AppServices, AppState,
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    if config.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!(environment = %config.environment, "starting tourbook-api");

    let db = Arc::new(db::establish_connection_from_app_config(&config).await?);
    if config.auto_migrate {
        db::run_migrations(&db).await?;
        info!("database migrations applied");
    }

    let (event_sender, event_receiver) = event_channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(process_events(event_receiver));

    let sweeper = PaymentSweeper::new(
        db.clone(),
        event_sender.clone(),
        Duration::from_secs(config.payments.sweep_interval_secs),
        Duration::from_secs(config.payments.booking_grace_secs),
    );
    tokio::spawn(sweeper.run());

    let services = AppServices::build(db.clone(), event_sender.clone(), &config);
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        db,
        config,
        event_sender,
        services,
    };

    let app = app_router(state);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
