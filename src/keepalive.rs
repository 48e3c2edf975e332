use crate::frame;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

/// `time::interval` rejects a zero period
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Spawn the keepalive sender for an established session
///
/// Sends `"3"` right away and then once per `interval` until the writer
/// channel closes. Stop it with [`JoinHandle::abort`]; being aborted is the
/// normal way for it to end.
pub(crate) fn spawn(interval: Duration, ws_tx: mpsc::UnboundedSender<Message>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if ws_tx.send(Message::Text(frame::encode_pong())).is_err() {
                tracing::debug!("Keepalive stopped: writer closed");
                break;
            }
            tracing::trace!("Sending: 3");
        }
    })
}
