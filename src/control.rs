use crate::bridge::ActionBridge;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::pad::{Pad, PadAction, PadId, PadStore};
use crate::reconnect::ConnectionLoop;
use crate::session::Session;
use crate::status::LinkStatus;
use crate::subscription::{Notifier, PadObserver, PadReceiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Bounded wait for the connection thread on disconnect
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a triggered pad may take to report its new state
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(1);
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Pad control for button surfaces
///
/// Owns a background thread that keeps a connection to the DLZ Creator alive
/// and exposes the pads by button position. All methods are blocking and are
/// meant for plain threads such as a device input handler.
///
/// ```no_run
/// use dlz_creator::{ClientConfig, PadControl};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut control = PadControl::start(ClientConfig::new("192.168.1.20"))?;
///     control.set_observer(|| println!("pads changed"));
///
///     std::thread::sleep(std::time::Duration::from_secs(2));
///     if let Some(pad) = control.pad_for_button(0) {
///         println!("button 0 plays {}", pad.label());
///         control.play_pad(0);
///     }
///
///     control.disconnect();
///     Ok(())
/// }
/// ```
pub struct PadControl {
    host: String,
    pads: PadStore,
    link: Arc<LinkStatus>,
    notifier: Notifier,
    bridge: ActionBridge,
    shutdown_tx: watch::Sender<bool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PadControl {
    /// Connect to `host` with default reconnection settings
    pub fn connect(host: impl Into<String>) -> Result<Self> {
        Self::start(ClientConfig::new(host))
    }

    /// Start the background connection described by `config`
    pub fn start(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let pads = PadStore::new();
        let link = Arc::new(LinkStatus::new(config.ping_interval_ms));
        let notifier = Notifier::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let session = Session::new(pads.clone(), link.clone(), notifier.clone());
        let connection = ConnectionLoop::new(
            config.websocket_url(),
            session,
            config.reconnect_policy(),
            command_rx,
            shutdown_rx,
        );
        let bridge = ActionBridge::new(
            command_tx,
            link.clone(),
            runtime.handle().clone(),
            config.action_timeout(),
        );

        let thread = thread::Builder::new()
            .name("dlz-connection".to_string())
            .spawn(move || {
                if let Err(e) = runtime.block_on(connection.run()) {
                    tracing::error!("DLZ connection error: {}", e);
                }
            })?;
        tracing::info!("DLZ Control connection thread started for {}", config.host);

        Ok(Self {
            host: config.host,
            pads,
            link,
            notifier,
            bridge,
            shutdown_tx,
            thread: Some(thread),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// All known pads, in snapshot order
    pub fn pads(&self) -> Vec<Pad> {
        self.pads.pads()
    }

    pub fn pad_count(&self) -> usize {
        self.pads.len()
    }

    /// The pad shown on the `button_index`-th button of the pad group
    ///
    /// Buttons map to pads in snapshot order; `None` past the last pad.
    pub fn pad_for_button(&self, button_index: usize) -> Option<Pad> {
        self.pads.get(button_index)
    }

    pub fn find_pad(&self, id: PadId) -> Option<Pad> {
        self.pads.find(id)
    }

    /// Whether the pad is playing, using its latest known state
    pub fn is_pad_playing(&self, pad: &Pad) -> bool {
        self.pads
            .find(pad.id())
            .map_or(pad.is_playing(), |current| current.is_playing())
    }

    /// Trigger the pad behind `button_index`
    ///
    /// On success, waits up to a second for the server to report the pad as
    /// playing before notifying the observer, so a repaint shows the new state.
    pub fn play_pad(&self, button_index: usize) -> bool {
        self.trigger(PadAction::Play, button_index)
    }

    /// Stop the pad behind `button_index`
    pub fn stop_pad(&self, button_index: usize) -> bool {
        self.trigger(PadAction::Stop, button_index)
    }

    fn trigger(&self, action: PadAction, button_index: usize) -> bool {
        let Some(pad) = self.pad_for_button(button_index) else {
            tracing::warn!("No DLZ pad configured for button {}", button_index);
            return false;
        };

        if !self.bridge.send_blocking(action, pad.id()) {
            return false;
        }
        tracing::info!(
            "Triggered {} on DLZ pad: {} (Bank {}, Pad {})",
            action,
            pad.name,
            pad.bank,
            pad.index
        );

        let want_playing = action == PadAction::Play;
        let started = Instant::now();
        while started.elapsed() < CONFIRM_TIMEOUT {
            if self.is_pad_playing(&pad) == want_playing {
                tracing::debug!("Pad {} confirmed after {:?}", pad.name, started.elapsed());
                break;
            }
            thread::sleep(CONFIRM_POLL_INTERVAL);
        }

        self.notifier.call_observer();
        true
    }

    /// Bridge for issuing actions by pad address
    pub fn bridge(&self) -> &ActionBridge {
        &self.bridge
    }

    /// Register the single change observer, replacing any previous one
    pub fn set_observer(&self, observer: impl PadObserver + 'static) {
        self.notifier.set_observer(Some(Arc::new(observer)));
    }

    pub fn clear_observer(&self) {
        self.notifier.set_observer(None);
    }

    /// Subscribe to typed pad events
    pub fn subscribe(&self) -> PadReceiver {
        self.notifier.subscribe()
    }

    /// Renderers show a cleared surface when this is false
    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.link.is_reconnecting()
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.link.attempt()
    }

    /// The connection stopped retrying; only a new `PadControl` reconnects
    pub fn has_given_up(&self) -> bool {
        self.link.has_given_up()
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.link.ping_interval_ms())
    }

    /// Stop the background connection, waiting up to two seconds for it
    pub fn disconnect(&mut self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.thread.take() {
            let started = Instant::now();
            while !handle.is_finished() && started.elapsed() < JOIN_TIMEOUT {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    tracing::error!("DLZ connection thread panicked");
                }
            } else {
                tracing::warn!("DLZ connection thread did not stop within {:?}", JOIN_TIMEOUT);
            }
        }

        self.link.mark_disconnected();
        tracing::info!("DLZ Control disconnected");
    }
}

impl Drop for PadControl {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Loopback address with nothing listening on it
    fn closed_host() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    fn unreachable_config() -> ClientConfig {
        ClientConfig::new(closed_host())
            .with_reconnect_delay(0.05)
            .with_reconnect_max_delay(0.1)
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(PadControl::start(ClientConfig::new("h").with_reconnect_backoff(0.0)).is_err());
    }

    #[test]
    fn no_pads_before_snapshot() {
        let mut control = PadControl::start(unreachable_config()).unwrap();
        assert!(control.pads().is_empty());
        assert!(control.pad_for_button(0).is_none());
        assert!(control.pad_for_button(usize::MAX).is_none());
        assert!(!control.play_pad(0));
        assert!(!control.stop_pad(3));
        control.disconnect();
    }

    #[test]
    fn play_without_connection_fails_fast() {
        let mut control = PadControl::start(unreachable_config()).unwrap();
        let started = Instant::now();
        assert!(!control.bridge().play_blocking(PadId { bank: 0, index: 4 }));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!control.is_connected());
        control.disconnect();
    }

    #[test]
    fn gives_up_after_attempt_limit() {
        let mut control = PadControl::start(unreachable_config().with_max_reconnect_attempts(2)).unwrap();
        let mut events = control.subscribe();

        let started = Instant::now();
        while !control.has_given_up() && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(control.has_given_up());
        assert_eq!(control.reconnect_attempt(), 2);

        let mut saw_give_up = false;
        while let Ok(Some(event)) = events.try_recv() {
            saw_give_up |= event == crate::PadEvent::GaveUp;
        }
        assert!(saw_give_up);
        control.disconnect();
    }

    #[test]
    fn disconnect_interrupts_backoff_sleep() {
        let mut control = PadControl::start(
            ClientConfig::new(closed_host())
                .with_reconnect_delay(30.0)
                .with_reconnect_max_delay(60.0),
        )
        .unwrap();

        let started = Instant::now();
        while control.reconnect_attempt() == 0 && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(control.is_reconnecting());

        let started = Instant::now();
        control.disconnect();
        assert!(started.elapsed() < JOIN_TIMEOUT);
        assert!(control.thread.is_none());
    }
}
