use crate::error::{DlzError, Result};
use crate::pad::PadId;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Change notification from the pad connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadEvent {
    /// INIT snapshot received, pads are live
    Connected,

    /// Session ended; pads keep their last known values
    Disconnected,

    /// A single pad attribute changed
    PadChanged(PadId),

    /// Reconnection attempts exhausted, no further retries
    GaveUp,
}

/// Receives a notification whenever pad data or connectivity changes
///
/// Invoked on the connection's own thread for server-driven changes, so
/// implementations must return quickly and never block on the connection.
pub trait PadObserver: Send + Sync {
    fn pads_changed(&self);
}

impl<F> PadObserver for F
where
    F: Fn() + Send + Sync,
{
    fn pads_changed(&self) {
        self()
    }
}

/// Fans a change out to the registered observer and to event subscribers
#[derive(Clone)]
pub(crate) struct Notifier {
    observer: Arc<RwLock<Option<Arc<dyn PadObserver>>>>,
    events: broadcast::Sender<PadEvent>,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            observer: Arc::new(RwLock::new(None)),
            events,
        }
    }

    pub(crate) fn set_observer(&self, observer: Option<Arc<dyn PadObserver>>) {
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = observer;
    }

    pub(crate) fn subscribe(&self) -> PadReceiver {
        PadReceiver::new(self.events.subscribe())
    }

    /// Broadcast `event` and call the observer
    pub(crate) fn notify(&self, event: PadEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
        self.call_observer();
    }

    /// Call the observer without broadcasting an event
    pub(crate) fn call_observer(&self) {
        // Clone out so the observer runs without the lock held
        let observer = self
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer.pads_changed();
        }
    }
}

/// Receiver for pad events
pub struct PadReceiver {
    rx: broadcast::Receiver<PadEvent>,
}

impl PadReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<PadEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event
    ///
    /// Fails with `ConnectionClosed` once the connection context is gone.
    pub async fn recv(&mut self) -> Result<PadEvent> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => DlzError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                DlzError::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Try to receive an event without blocking
    ///
    /// Returns `None` if no event is available.
    pub fn try_recv(&mut self) -> Result<Option<PadEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(DlzError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(DlzError::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn notify_reaches_observer_and_subscribers() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        notifier.set_observer(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        notifier.notify(PadEvent::Connected);
        notifier.call_observer();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(rx.try_recv().unwrap(), Some(PadEvent::Connected));
        assert_eq!(rx.try_recv().unwrap(), None);
    }

    #[test]
    fn notify_without_observer_or_subscribers() {
        let notifier = Notifier::new();
        notifier.notify(PadEvent::Disconnected);
        notifier.set_observer(None);
        notifier.call_observer();
    }

    #[test]
    fn lagging_receiver_reports_channel_error() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        for _ in 0..(EVENT_CHANNEL_CAPACITY + 5) {
            notifier.notify(PadEvent::Disconnected);
        }
        assert!(matches!(rx.try_recv(), Err(DlzError::ChannelError(_))));
    }
}
