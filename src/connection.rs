use crate::bridge::Command;
use crate::error::{DlzError, Result};
use crate::keepalive;
use crate::session::{Reply, Session};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// How long the writer gets to flush and close the socket
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a session ended without a transport error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// Owner asked us to stop
    Shutdown,
    /// Server closed the socket
    Closed,
}

/// Run one connection lifecycle: connect, handshake, live updates, teardown
///
/// The session is always reset afterwards, whatever the outcome, so observers
/// see the link go down even when connecting failed.
pub(crate) async fn run_once(
    url: &str,
    session: &mut Session,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd> {
    let result = drive(url, session, commands, shutdown).await;
    tracing::debug!("Session ended in {:?}", session.phase());
    session.end();
    result
}

async fn drive(
    url: &str,
    session: &mut Session,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd> {
    tracing::info!("Connecting to {}", url);

    let ws_stream = tokio::select! {
        _ = shutdown.changed() => return Ok(SessionEnd::Shutdown),
        connected = connect_async(url) => connected?.0,
    };
    let (mut write, mut read) = ws_stream.split();

    // Outgoing frames from the session, the keepalive and the bridge
    let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = ws_rx.recv().await {
            if let Err(e) = write.send(msg).await {
                tracing::error!("Failed to send message: {}", e);
                break;
            }
        }
        let _ = write.close().await;
    });

    let mut keepalive: Option<JoinHandle<()>> = None;

    let outcome = loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("Disconnecting by request");
                break Ok(SessionEnd::Shutdown);
            }
            Some(command) = commands.recv() => command.execute(session, &ws_tx),
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => match session.on_frame(&text) {
                    Reply::Send(frame) => {
                        tracing::debug!("Sending: {}", frame);
                        if ws_tx.send(Message::Text(frame)).is_err() {
                            break Err(DlzError::ConnectionClosed);
                        }
                    }
                    Reply::Established => {
                        let task = keepalive::spawn(session.ping_interval(), ws_tx.clone());
                        if let Some(previous) = keepalive.replace(task) {
                            previous.abort();
                        }
                    }
                    Reply::Nothing => {}
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("WebSocket connection closed: {:?}", frame);
                    break Ok(SessionEnd::Closed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
                None => break Ok(SessionEnd::Closed),
            },
        }
    };

    if let Some(task) = keepalive.take() {
        task.abort();
    }
    drop(ws_tx);
    if timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        tracing::warn!("Writer did not finish closing the socket");
    }

    outcome
}
