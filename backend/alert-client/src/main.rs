use alert_client::{
    logging, metrics, Config, ConnectionManager, NotificationStore, StorePhase, Toast,
    WebSocketConnector,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let config = Config::from_env()?;
    tracing::info!(url = %config.gateway.url, "Starting alert tail");

    let connector = Arc::new(WebSocketConnector::new(config.gateway.url.clone()));
    let connections = ConnectionManager::new(connector, config.connection_options());
    let store = NotificationStore::new(connections, config.store_options());

    let session = config.session_store();
    if !store.start(session.as_ref()) {
        tracing::warn!("No session token found; set ALERTS_TOKEN or ALERTS_SESSION_FILE");
        return Ok(());
    }

    let mut toasts = store.subscribe_toasts();
    let mut connected = store.subscribe_connected();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
            toast = toasts.recv() => match toast {
                Ok(toast) => print_toast(&toast),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Terminal fell behind, toasts skipped");
                }
                Err(RecvError::Closed) => break,
            },
            changed = connected.changed() => {
                if changed.is_err() {
                    break;
                }
                let is_connected = *connected.borrow_and_update();
                tracing::info!(connected = is_connected, "Alert stream status changed");

                if store.phase() == StorePhase::Failed {
                    tracing::error!("Alert gateway unreachable, giving up");
                    break;
                }
            }
        }
    }

    store.stop().await;
    tracing::info!(
        retained = store.notifications().len(),
        unread = store.unread_count(),
        "Alert tail stopped"
    );
    tracing::debug!("metrics:\n{}", metrics::render());

    Ok(())
}

fn print_toast(toast: &Toast) {
    println!(
        "{} [{}] {}: {} ({}s)",
        toast.style.icon,
        toast.severity,
        toast.title,
        toast.message,
        toast.duration.as_secs()
    );
}
