mod events;
mod gateway;
mod notifier;

pub use events::{bank_event_to_provider_event, stripe_event_to_provider_event, EventConversionError};
pub use gateway::{capability_flags, ProviderGateway};
pub use notifier::{create_notification_handlers, NOTIFICATION_BUFFER_SIZE};
