use crate::error::{DlzError, Result};
use crate::frame;
use crate::pad::{PadAction, PadId};
use crate::session::Session;
use crate::status::LinkStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{error::Elapsed, timeout};
use tokio_tungstenite::tungstenite::Message;

/// A play/stop request queued for the connection context
pub(crate) struct Command {
    action: PadAction,
    pad: PadId,
    reply: oneshot::Sender<bool>,
}

impl Command {
    /// Answer `false` without touching the socket
    pub(crate) fn reject(self) {
        let _ = self.reply.send(false);
    }

    /// Serialize and send the action on the live connection
    pub(crate) fn execute(self, session: &Session, ws_tx: &mpsc::UnboundedSender<Message>) {
        if self.reply.is_closed() {
            tracing::debug!("Dropping stale {} for {}: caller gave up", self.action, self.pad);
            return;
        }
        if !session.is_live() {
            self.reject();
            return;
        }

        let sent = match frame::encode_event(&self.action.payload(self.pad)) {
            Ok(text) => {
                tracing::debug!("Sending: {}", text);
                ws_tx.send(Message::Text(text)).is_ok()
            }
            Err(e) => {
                tracing::error!("Failed to encode {} for {}: {}", self.action, self.pad, e);
                false
            }
        };
        if sent {
            tracing::info!(
                "Sent {} for bank {}, pad {}",
                self.action,
                self.pad.bank,
                self.pad.index
            );
        }
        let _ = self.reply.send(sent);
    }
}

#[cfg(test)]
impl Command {
    pub(crate) fn for_test(action: PadAction, reply: oneshot::Sender<bool>) -> Self {
        Self {
            action,
            pad: PadId { bank: 0, index: 0 },
            reply,
        }
    }
}

/// Crossing point from caller threads into the connection context
///
/// Actions are never sent from the caller's thread: they are queued for the
/// connection, which owns the socket, and the caller waits a bounded time for
/// the outcome. Every failure (no live connection, closed context, timeout)
/// comes back as `false`.
#[derive(Clone)]
pub struct ActionBridge {
    commands: mpsc::UnboundedSender<Command>,
    link: Arc<LinkStatus>,
    runtime: Handle,
    timeout: Duration,
}

impl ActionBridge {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        link: Arc<LinkStatus>,
        runtime: Handle,
        timeout: Duration,
    ) -> Self {
        Self {
            commands,
            link,
            runtime,
            timeout,
        }
    }

    pub async fn play(&self, pad: PadId) -> bool {
        self.send(PadAction::Play, pad).await
    }

    pub async fn stop(&self, pad: PadId) -> bool {
        self.send(PadAction::Stop, pad).await
    }

    /// Queue `action` and wait for the connection to send it
    pub async fn send(&self, action: PadAction, pad: PadId) -> bool {
        let result = match self.submit(action, pad) {
            Ok(rx) => outcome(timeout(self.timeout, rx).await),
            Err(e) => Err(e),
        };
        self.report(action, pad, result)
    }

    /// Blocking [`play`](Self::play) for plain threads
    pub fn play_blocking(&self, pad: PadId) -> bool {
        self.send_blocking(PadAction::Play, pad)
    }

    /// Blocking [`stop`](Self::stop) for plain threads
    pub fn stop_blocking(&self, pad: PadId) -> bool {
        self.send_blocking(PadAction::Stop, pad)
    }

    /// Blocking [`send`](Self::send)
    ///
    /// Must not be called from inside an async context; doing so logs an
    /// error and returns `false`.
    pub fn send_blocking(&self, action: PadAction, pad: PadId) -> bool {
        if Handle::try_current().is_ok() {
            tracing::error!("Blocking {} called from an async context; use the async variant", action);
            return false;
        }
        let result = match self.submit(action, pad) {
            Ok(rx) => {
                let wait = self.timeout;
                outcome(self.runtime.block_on(async move { timeout(wait, rx).await }))
            }
            Err(e) => Err(e),
        };
        self.report(action, pad, result)
    }

    fn submit(&self, action: PadAction, pad: PadId) -> Result<oneshot::Receiver<bool>> {
        if !self.link.is_connected() {
            return Err(DlzError::NotConnected);
        }

        let (reply, rx) = oneshot::channel();
        let command = Command { action, pad, reply };
        self.commands
            .send(command)
            .map_err(|_| DlzError::ChannelError("connection context is gone".to_string()))?;
        Ok(rx)
    }

    /// Log a failed action; callers only see the boolean
    fn report(&self, action: PadAction, pad: PadId, result: Result<bool>) -> bool {
        match result {
            Ok(sent) => sent,
            Err(DlzError::NotConnected) => {
                tracing::debug!("Cannot {} {}: {}", action, pad, DlzError::NotConnected);
                false
            }
            Err(DlzError::Timeout) => {
                tracing::error!(
                    "{} for {} failed: {} after {:?}",
                    action,
                    pad,
                    DlzError::Timeout,
                    self.timeout
                );
                false
            }
            Err(e) => {
                tracing::warn!("{} for {} dropped: {}", action, pad, e);
                false
            }
        }
    }
}

fn outcome(
    result: std::result::Result<std::result::Result<bool, oneshot::error::RecvError>, Elapsed>,
) -> Result<bool> {
    match result {
        Ok(Ok(sent)) => Ok(sent),
        Ok(Err(_)) => Err(DlzError::ConnectionClosed),
        Err(_) => Err(DlzError::Timeout),
    }
}
