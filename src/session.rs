use crate::error::Result;
use crate::frame::{self, Frame, TransportPacket};
use crate::pad::{PadKey, PadStore};
use crate::status::LinkStatus;
use crate::subscription::{Notifier, PadEvent};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Handshake progress of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the Engine.IO OPEN frame
    AwaitingOpen,
    /// CONNECT sent, waiting for the namespace acknowledgement
    AwaitingConnectAck,
    /// INIT requested, waiting for the snapshot
    AwaitingInit,
    /// Snapshot received; live pad updates flow
    Established,
}

/// What the IO loop should do after a frame was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reply {
    Nothing,
    /// Send this frame
    Send(String),
    /// Session became live; start the keepalive
    Established,
}

/// Protocol state for the pad connection
///
/// Lives for the whole process and is reused across reconnects, so the pad
/// list and the last announced ping interval survive a dropped socket.
pub(crate) struct Session {
    phase: Phase,
    pads: PadStore,
    link: Arc<LinkStatus>,
    notifier: Notifier,
}

impl Session {
    pub(crate) fn new(pads: PadStore, link: Arc<LinkStatus>, notifier: Notifier) -> Self {
        Self {
            phase: Phase::AwaitingOpen,
            pads,
            link,
            notifier,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn is_live(&self) -> bool {
        self.phase == Phase::Established && self.link.is_connected()
    }

    pub(crate) fn link(&self) -> &LinkStatus {
        &self.link
    }

    pub(crate) fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.link.ping_interval_ms())
    }

    /// Handle one raw text frame
    ///
    /// Malformed frames and frames that do not fit the current phase are
    /// logged and dropped; they never end the session.
    pub(crate) fn on_frame(&mut self, raw: &str) -> Reply {
        tracing::debug!("Received: {}", frame::describe(raw));

        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Dropping undecodable frame: {}", e);
                return Reply::Nothing;
            }
        };

        match self.handle(&frame) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Dropping frame in {:?}: {}", self.phase, e);
                Reply::Nothing
            }
        }
    }

    fn handle(&mut self, frame: &Frame) -> Result<Reply> {
        match (self.phase, frame.transport) {
            (_, TransportPacket::Pong) => {
                tracing::debug!("PONG received");
                Ok(Reply::Nothing)
            }
            (Phase::AwaitingOpen, TransportPacket::Open) => {
                match frame.ping_interval() {
                    Some(0) => tracing::warn!(
                        "Server announced a zero ping interval, keeping {}ms",
                        self.link.ping_interval_ms()
                    ),
                    Some(interval) => {
                        self.link.set_ping_interval_ms(interval);
                        tracing::info!("Server ping interval: {}ms", interval);
                    }
                    None => {}
                }
                self.phase = Phase::AwaitingConnectAck;
                Ok(Reply::Send(frame::encode_connect()))
            }
            (Phase::AwaitingConnectAck, _) if frame.is_connect() => {
                let request = frame::init_request(correlation_id());
                self.phase = Phase::AwaitingInit;
                Ok(Reply::Send(frame::encode_event(&request)?))
            }
            (Phase::AwaitingInit, _) if frame.is_event() => Ok(self.handle_init(frame)),
            (Phase::Established, _) if frame.is_event() => {
                self.handle_update(frame);
                Ok(Reply::Nothing)
            }
            (phase, _) => {
                tracing::debug!("Ignoring {} in {:?}", frame, phase);
                Ok(Reply::Nothing)
            }
        }
    }

    fn handle_init(&mut self, frame: &Frame) -> Reply {
        let Some(body) = frame.event_body() else {
            return Reply::Nothing;
        };
        if body.get("cmd").and_then(Value::as_str) != Some("INIT") {
            tracing::debug!("Waiting for INIT, ignoring {}", frame);
            return Reply::Nothing;
        }

        match body.get("data").and_then(Value::as_object) {
            Some(data) => {
                let created = self.pads.populate(data);
                if created > 0 {
                    tracing::info!("Loaded {} pads from snapshot", created);
                }
            }
            None => tracing::warn!("INIT snapshot without data"),
        }

        self.phase = Phase::Established;
        if self.link.mark_established() {
            tracing::info!("Connection restored!");
        } else {
            tracing::info!("Connection established! Starting ping keep-alive...");
        }
        self.notifier.notify(PadEvent::Connected);

        Reply::Established
    }

    fn handle_update(&mut self, frame: &Frame) {
        let Some(Value::Object(update)) = frame.event_body() else {
            return;
        };
        if update.len() != 1 {
            return;
        }

        for (key, value) in update {
            if !key.starts_with('B') {
                continue;
            }
            let key = match PadKey::parse(key) {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!("Ignoring update: {}", e);
                    continue;
                }
            };
            match self.pads.apply_update(&key, value) {
                Ok(Some(id)) => self.notifier.notify(PadEvent::PadChanged(id)),
                Ok(None) => tracing::debug!("Update for unknown pad {}", key.id),
                Err(e) => tracing::debug!("Ignoring update: {}", e),
            }
        }
    }

    /// Reset after the socket went away
    ///
    /// Pads are kept; observers are told the link is down.
    pub(crate) fn end(&mut self) {
        self.link.mark_disconnected();
        self.phase = Phase::AwaitingOpen;
        tracing::info!("Connection cleaned up.");
        self.notifier.notify(PadEvent::Disconnected);
    }

    /// Record that reconnection was exhausted
    pub(crate) fn give_up(&mut self) {
        self.link.mark_given_up();
        self.notifier.notify(PadEvent::GaveUp);
    }
}

/// INIT correlation id: wall-clock seconds, as the pad server's own client uses
fn correlation_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
