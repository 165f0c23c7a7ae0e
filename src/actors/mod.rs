mod notification_actor;
mod notifier;

pub use notification_actor::{EventPublisher, NotificationActor};
pub use notifier::{LifecycleEvent, LogNotifier, Notifier};
