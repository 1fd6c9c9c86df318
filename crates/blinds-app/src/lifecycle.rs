//! Foreground/background signal from the host application

use tokio::sync::broadcast;

use blinds_core::prelude::*;
use blinds_core::LifecycleEvent;

const LIFECYCLE_CHANNEL_CAPACITY: usize = 16;

/// Fan-out of host lifecycle transitions.
///
/// The host calls [`LifecycleSignal::notify`] when the app changes state;
/// the engine listens through [`LifecycleSignal::subscribe`].
#[derive(Debug, Clone)]
pub struct LifecycleSignal {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl Default for LifecycleSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    /// Deliver a transition to every subscriber.
    ///
    /// Returns the number of subscribers reached.
    pub fn notify(&self, event: LifecycleEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!("Lifecycle {:?} delivered to {} subscribers", event, receivers);
                receivers
            }
            Err(_) => {
                debug!("Lifecycle {:?} dropped: no subscribers", event);
                0
            }
        }
    }

    pub fn activate(&self) -> usize {
        self.notify(LifecycleEvent::Active)
    }

    pub fn deactivate(&self) -> usize {
        self.notify(LifecycleEvent::Inactive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_transitions_in_order() {
        let signal = LifecycleSignal::new();
        let mut rx = signal.subscribe();

        assert_eq!(signal.activate(), 1);
        assert_eq!(signal.deactivate(), 1);

        assert_eq!(rx.recv().await.unwrap(), LifecycleEvent::Active);
        assert_eq!(rx.recv().await.unwrap(), LifecycleEvent::Inactive);
    }

    #[test]
    fn test_notify_without_subscribers() {
        let signal = LifecycleSignal::new();
        assert_eq!(signal.notify(LifecycleEvent::Active), 0);
    }

    #[tokio::test]
    async fn test_clones_share_subscribers() {
        let signal = LifecycleSignal::new();
        let host = signal.clone();
        let mut rx = signal.subscribe();

        host.activate();

        assert_eq!(rx.recv().await.unwrap(), LifecycleEvent::Active);
    }
}
