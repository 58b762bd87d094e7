use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use meal_checkout as app;
use meal_checkout::gateway::{SnapGateway, WidgetRuntime};
use meal_checkout::notifications::LogNotifier;
use meal_checkout::repositories::{SeaOrmChildDirectory, SeaOrmOrderStore};
use meal_checkout::services::{CheckoutServices, OrderBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = app::config::load_config().context("loading configuration")?;
    app::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = app::db::establish_connection_from_app_config(&cfg)
        .await
        .context("connecting to database")?;
    if cfg.auto_migrate {
        app::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_sender, event_rx) = app::events::EventSender::channel(cfg.event_channel_capacity);
    tokio::spawn(app::events::process_events(event_rx, Vec::new()));

    let gateway = SnapGateway::from_config(&cfg).context("building payment gateway client")?;
    if cfg.gateway_server_key.is_empty() {
        warn!("Gateway server key is empty; sessions and notifications will be rejected");
    }

    let store = Arc::new(SeaOrmOrderStore::new(db_arc.clone()));
    let services = CheckoutServices::new(
        &cfg,
        store,
        Arc::new(SeaOrmChildDirectory::new(db_arc.clone())),
        Arc::new(gateway),
        // The widget runs in the guardian's browser; nothing to load server-side.
        Arc::new(WidgetRuntime::new()),
        Arc::new(LogNotifier),
        Arc::new(event_sender),
    );

    tokio::spawn(sweep_orphans(services.orders.clone(), cfg.orphan_grace()));

    let cfg = Arc::new(cfg);
    let state = app::AppState::new(cfg.clone(), Some(db_arc), &services);
    let app = app::app_router(state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("parsing listen address")?;
    info!("meal-checkout listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Periodically voids unpaid orders that never got line items or a session.
async fn sweep_orphans(orders: OrderBuilder, grace: chrono::Duration) {
    let period = grace
        .to_std()
        .map(|g| g / 2)
        .unwrap_or(Duration::from_secs(60))
        .max(Duration::from_secs(60));
    let mut ticker = tokio::time::interval(period);

    loop {
        ticker.tick().await;
        let cutoff = chrono::Utc::now() - grace;
        match orders.void_orphaned_orders(cutoff).await {
            Ok(voided) if !voided.is_empty() => {
                info!(count = voided.len(), "Voided orphaned orders")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Orphan sweep failed"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
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
    info!("Shutdown signal received");
}
