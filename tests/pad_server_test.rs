//! End-to-end tests against an in-process pad server speaking the
//! Engine.IO/Socket.IO text protocol.

use dlz_creator::{ClientConfig, PadControl, PadEvent, PadId};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

const OPEN: &str = r#"0{"sid":"O22XmpupHLbPLfdaAAAt","upgrades":[],"pingInterval":60000,"pingTimeout":20000,"maxPayload":1000000}"#;

enum Outgoing {
    Text(String),
    Close,
}

/// Accepts one client at a time, runs the handshake, then relays frames
/// queued by the test. Connection `n` is answered with `snapshots[n]`
/// (the last snapshot repeats).
struct FakePadServer {
    _runtime: Runtime,
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl FakePadServer {
    fn start(snapshots: Vec<Value>) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let listener = runtime.block_on(TcpListener::bind("127.0.0.1:0")).unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        runtime.spawn(serve(
            listener,
            snapshots,
            received.clone(),
            connections.clone(),
            outgoing_rx,
        ));

        Self {
            _runtime: runtime,
            addr,
            received,
            connections,
            outgoing,
        }
    }

    fn config(&self) -> ClientConfig {
        ClientConfig::new(self.addr.to_string())
            .with_reconnect_delay(0.05)
            .with_reconnect_max_delay(0.2)
    }

    fn send(&self, text: &str) {
        self.outgoing.send(Outgoing::Text(text.to_string())).unwrap();
    }

    fn drop_connection(&self) {
        self.outgoing.send(Outgoing::Close).unwrap();
    }

    fn has_received(&self, frame: &str) -> bool {
        self.received.lock().unwrap().iter().any(|f| f == frame)
    }

    fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn serve(
    listener: TcpListener,
    snapshots: Vec<Value>,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            continue;
        };
        let n = connections.fetch_add(1, Ordering::SeqCst);
        let snapshot = snapshots[n.min(snapshots.len() - 1)].clone();
        if handshake(&mut ws, &snapshot, &received).await.is_none() {
            continue;
        }

        loop {
            tokio::select! {
                msg = ws.next() => match msg {
                    Some(Ok(Message::Text(text))) => received.lock().unwrap().push(text),
                    Some(Ok(_)) => {}
                    _ => break,
                },
                out = outgoing.recv() => match out {
                    Some(Outgoing::Text(text)) => {
                        if ws.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(Outgoing::Close) => {
                        let _ = ws.close(None).await;
                        break;
                    }
                    None => return,
                },
            }
        }
    }
}

async fn handshake(
    ws: &mut WebSocketStream<TcpStream>,
    snapshot: &Value,
    received: &Mutex<Vec<String>>,
) -> Option<()> {
    ws.send(Message::Text(OPEN.to_string())).await.ok()?;
    expect(ws, received, |t| t == "40").await?;
    ws.send(Message::Text(r#"40{"sid":"A7FaK4JD3rSPWJ61AAAy"}"#.to_string()))
        .await
        .ok()?;
    expect(ws, received, |t| t.starts_with("42") && t.contains(r#""cmd":"INIT""#)).await?;
    let init = json!(["message", { "cmd": "INIT", "id": 903739853, "data": snapshot }]);
    ws.send(Message::Text(format!("42{}", init))).await.ok()
}

async fn expect(
    ws: &mut WebSocketStream<TcpStream>,
    received: &Mutex<Vec<String>>,
    matches: impl Fn(&str) -> bool,
) -> Option<()> {
    loop {
        match ws.next().await? {
            Ok(Message::Text(text)) => {
                let matched = matches(&text);
                received.lock().unwrap().push(text);
                if matched {
                    return Some(());
                }
            }
            Ok(_) => {}
            Err(_) => return None,
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < Duration::from_secs(5) {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn kick_and_snare() -> Value {
    json!({
        "B.0.0.name": "",
        "B.0.4.name": "Kick",
        "B.0.4.active": 0,
        "B.0.4.state": 2,
        "B.0.4.curtime": 0.0,
        "B.0.4.loop": 0,
        "B.1.0.name": "Snare",
        "B.1.0.active": 0,
        "B.1.0.state": 2,
        "B.1.0.curtime": 0.0,
        "mixer.master": 0.8,
    })
}

#[test]
fn snapshot_loads_named_pads_and_tracks_updates() {
    let server = FakePadServer::start(vec![kick_and_snare()]);
    let mut control = PadControl::start(server.config()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    control.set_observer(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(wait_until(|| control.is_connected()));
    assert_eq!(control.ping_interval(), Duration::from_millis(60_000));

    let names: Vec<String> = control.pads().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Kick", "Snare"]);
    assert_eq!(control.pad_for_button(0).unwrap().id(), PadId { bank: 0, index: 4 });
    assert_eq!(control.pad_for_button(1).unwrap().id(), PadId { bank: 1, index: 0 });
    assert!(control.pad_for_button(2).is_none());

    // Keepalive starts as soon as the session is live
    assert!(wait_until(|| server.has_received("3")));

    let before = calls.load(Ordering::SeqCst);
    server.send(r#"42["message",{"B.0.4.state":3}]"#);
    assert!(wait_until(|| control.find_pad(PadId { bank: 0, index: 4 }).unwrap().state == 3));
    let kick = control.find_pad(PadId { bank: 0, index: 4 }).unwrap();
    assert_eq!(kick.name, "Kick");
    assert_eq!(kick.active, 0);
    assert!(wait_until(|| calls.load(Ordering::SeqCst) > before));

    control.disconnect();
    assert!(!control.is_connected());
}

#[test]
fn play_and_stop_wait_for_confirmation() {
    let server = FakePadServer::start(vec![kick_and_snare()]);
    let mut control = PadControl::start(server.config()).unwrap();
    assert!(wait_until(|| control.is_connected()));

    thread::scope(|s| {
        let pending = s.spawn(|| control.play_pad(0));
        assert!(wait_until(|| server.has_received(r#"42["message",{"B.0.4.state":"3"}]"#)));
        server.send(r#"42["message",{"B.0.4.active":1}]"#);
        assert!(pending.join().unwrap());
    });
    assert!(control.is_pad_playing(&control.pad_for_button(0).unwrap()));

    thread::scope(|s| {
        let pending = s.spawn(|| control.stop_pad(0));
        assert!(wait_until(|| server.has_received(r#"42["message",{"B.0.4.state":"2"}]"#)));
        server.send(r#"42["message",{"B.0.4.active":0}]"#);
        assert!(pending.join().unwrap());
    });
    assert!(!control.is_pad_playing(&control.pad_for_button(0).unwrap()));

    assert!(!control.play_pad(5));
    control.disconnect();
}

#[test]
fn reconnect_keeps_pads_from_first_snapshot() {
    let server = FakePadServer::start(vec![kick_and_snare(), json!({ "B.5.5.name": "Other" })]);
    let mut control = PadControl::start(server.config()).unwrap();
    let mut events = control.subscribe();
    assert!(wait_until(|| control.is_connected()));

    server.send(r#"42["message",{"B.1.0.curtime":2.5}]"#);
    assert!(wait_until(|| control.pad_for_button(1).unwrap().curtime == 2.5));

    server.drop_connection();
    assert!(wait_until(|| server.connections() == 2 && control.is_connected()));

    let pads = control.pads();
    assert_eq!(pads.len(), 2);
    assert_eq!(pads[0].name, "Kick");
    assert_eq!(pads[1].curtime, 2.5);
    assert_eq!(control.reconnect_attempt(), 0);
    assert!(!control.is_reconnecting());

    let mut seen = Vec::new();
    while let Ok(Some(event)) = events.try_recv() {
        seen.push(event);
    }
    let disconnected = seen.iter().position(|e| *e == PadEvent::Disconnected).unwrap();
    assert!(seen[disconnected..].contains(&PadEvent::Connected));

    control.disconnect();
}

#[test]
fn malformed_frames_do_not_end_the_session() {
    let server = FakePadServer::start(vec![kick_and_snare()]);
    let mut control = PadControl::start(server.config()).unwrap();
    assert!(wait_until(|| control.is_connected()));

    server.send("42garbage");
    server.send("7");
    server.send(r#"42["message",{"B.0.4.curt"#);
    server.send(r#"42["message",{"B.3.3.state":3}]"#);
    server.send(r#"42["message",{"B.0.4.curtime":1.5}]"#);

    assert!(wait_until(|| control.pad_for_button(0).unwrap().curtime == 1.5));
    assert_eq!(server.connections(), 1);
    assert!(control.is_connected());
    assert_eq!(control.pad_count(), 2);

    control.disconnect();
}

#[test]
fn bridge_actions_by_address() {
    let server = FakePadServer::start(vec![kick_and_snare()]);
    let mut control = PadControl::start(server.config()).unwrap();
    assert!(wait_until(|| control.is_connected()));

    // Slots outside the snapshot can still be addressed directly
    assert!(control.bridge().play_blocking(PadId { bank: 7, index: 5 }));
    assert!(wait_until(|| server.has_received(r#"42["message",{"B.7.5.state":"3"}]"#)));

    let sent: Vec<String> = server.received().into_iter().filter(|f| f != "3").collect();
    assert_eq!(sent[0], "40");
    assert!(sent[1].starts_with(r#"42["message",{"#));

    control.disconnect();
    assert!(!control.bridge().play_blocking(PadId { bank: 0, index: 4 }));
}
