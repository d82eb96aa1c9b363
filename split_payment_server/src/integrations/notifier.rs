use std::time::Duration;

use futures::future::BoxFuture;
use log::*;
use reqwest::Client;
use split_payment_engine::events::{EventHandlers, EventHooks, NotificationIntent};

pub const NOTIFICATION_BUFFER_SIZE: usize = 25;

/// Assigns the notification handler.
///
/// Notification intents are produced by the reconciler once a payment has been committed. When `url` is set, each
/// intent is POSTed to it as JSON, tagged with its template name, and the mail service takes it from there. Without a
/// URL the intents are only logged. Either way, a failed delivery is logged and dropped. It never touches payment or
/// ledger state.
pub fn create_notification_handlers(url: Option<String>, timeout: Duration) -> Result<EventHandlers, reqwest::Error> {
    let mut hooks = EventHooks::default();
    match url {
        Some(url) => {
            let client = Client::builder().timeout(timeout).build()?;
            info!("📬️ Notifications will be delivered to {url}");
            hooks.on_notification(move |intent| {
                let client = client.clone();
                let url = url.clone();
                Box::pin(async move { deliver(&client, &url, intent).await })
            });
        },
        None => {
            info!("📬️ No notification service is configured. Notifications will be logged only.");
            hooks.on_notification(|intent| log_only(intent));
        },
    }
    Ok(EventHandlers::new(NOTIFICATION_BUFFER_SIZE, hooks))
}

async fn deliver(client: &Client, url: &str, intent: NotificationIntent) {
    let template = intent.template();
    let order_id = intent.order_id();
    match client.post(url).json(&intent).send().await.and_then(|r| r.error_for_status()) {
        Ok(_) => info!("📬️ {template} notification for order #{order_id} delivered"),
        Err(e) => warn!("📬️ Could not deliver {template} notification for order #{order_id}. {e}"),
    }
}

fn log_only(intent: NotificationIntent) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        info!(
            "📬️ {} notification for order #{} to {}",
            intent.template(),
            intent.order_id(),
            intent.recipient().unwrap_or("<no recipient>")
        );
    })
}
