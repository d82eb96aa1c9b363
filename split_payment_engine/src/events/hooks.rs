use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{EventHandler, EventProducer, Handler, NotificationIntent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub notification_producer: Vec<EventProducer<NotificationIntent>>,
}

impl EventProducers {
    /// Publishes each intent to every subscriber without waiting. Intents that do not fit in a subscriber's queue are
    /// dropped and logged by the producer.
    pub fn publish_notifications(&self, intents: &[NotificationIntent]) {
        if intents.is_empty() {
            return;
        }
        if self.notification_producer.is_empty() {
            trace!("📬️ No notification subscribers. {} intents dropped", intents.len());
        }
        for emitter in &self.notification_producer {
            for intent in intents {
                emitter.publish_event(intent.clone());
            }
        }
    }
}

pub struct EventHandlers {
    pub on_notification: Option<EventHandler<NotificationIntent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_notification = hooks.on_notification.map(|f| EventHandler::new(buffer_size, f));
        Self { on_notification }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_notification {
            result.notification_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_notification {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_notification: Option<Handler<NotificationIntent>>,
}

impl EventHooks {
    pub fn on_notification<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(NotificationIntent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_notification = Some(Arc::new(f));
        self
    }
}
