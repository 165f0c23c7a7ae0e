use std::sync::Arc;

use tokio::spawn;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::actors::{LifecycleEvent, Notifier};

enum Envelope {
    Event(LifecycleEvent),
    Shutdown
}

/// Cloneable handle used by ledger code to hand events to the actor.
#[derive(Clone)]
pub struct EventPublisher {
    sender: mpsc::UnboundedSender<Envelope>
}

impl EventPublisher {
    /// Queues the event. Never blocks and never fails the caller.
    pub fn publish(&self, event: LifecycleEvent) {
        if self.sender.send(Envelope::Event(event)).is_err() {
            warn!("Notification actor has shut down, lifecycle event dropped");
        }
    }
}

/// Delivers lifecycle events to a [`Notifier`] off the request path.
pub struct NotificationActor {
    sender: mpsc::UnboundedSender<Envelope>,
    handle: JoinHandle<()>
}

impl NotificationActor {
    /// Spawns the actor task. Must be called inside a tokio runtime.
    pub fn new<N: Notifier>(notifier: Arc<N>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel();

        let handle = spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                let event = match envelope {
                    Envelope::Event(event) => event,
                    Envelope::Shutdown => break
                };

                match notifier.notify(&event).await {
                    Ok(()) => {
                        debug!("Lifecycle event [{event:?}] delivered");
                    },
                    Err(error) => {
                        //NOTE: Ledger state is already committed at this point, a failed delivery is only logged
                        warn!("Lifecycle event [{event:?}] could not be delivered: {error}");
                    }
                }
            }
        });

        Self { sender, handle }
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher { sender: self.sender.clone() }
    }

    pub fn accept(&self, event: LifecycleEvent) -> bool {
        self.sender.send(Envelope::Event(event)).is_ok()
    }

    /// Delivers everything queued so far, then stops the task.
    pub async fn despawn(self) -> Result<(), JoinError> {
        let _ = self.sender.send(Envelope::Shutdown);
        self.handle.await
    }
}
