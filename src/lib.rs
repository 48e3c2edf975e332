//! Rust client for controlling DLZ Creator pads
//!
//! The DLZ Creator exposes its 8x6 pad grid over a Socket.IO websocket. This
//! library speaks that protocol and keeps an in-memory copy of the pads so a
//! button surface can show and trigger them. It supports:
//!
//! - Engine.IO/Socket.IO handshake and INIT snapshot loading
//! - Live pad updates (name, active, state, playback position)
//! - Keep-alive at the server-announced interval
//! - Automatic reconnection with exponential backoff
//! - Play/stop actions from plain threads with a bounded wait
//! - Change notifications through an observer or typed event subscriptions
//!
//! # Quick Start
//!
//! ```no_run
//! use dlz_creator::{ClientConfig, PadControl};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("192.168.1.20").with_max_reconnect_attempts(10);
//!     let mut control = PadControl::start(config)?;
//!
//!     // Repaint whenever pads or connectivity change
//!     control.set_observer(|| println!("pads changed"));
//!
//!     // Wait for the snapshot
//!     std::thread::sleep(std::time::Duration::from_secs(2));
//!
//!     for pad in control.pads() {
//!         println!("Bank {} Pad {}: {}", pad.bank, pad.index, pad.name);
//!     }
//!     control.play_pad(0);
//!
//!     control.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Control**: background connection thread, button-to-pad mapping, play confirmation
//! - **Bridge**: play/stop from caller threads into the connection context
//! - **Reconnect**: backoff-governed retry loop around one connection
//! - **Connection**: websocket IO, writer task and keepalive
//! - **Session**: handshake state machine and pad updates
//! - **Frame**: Engine.IO/Socket.IO text frame codec
//! - **Pad**: pad model built from the dotted-key snapshot

mod bridge;
mod config;
mod connection;
mod control;
mod error;
mod frame;
mod keepalive;
mod pad;
mod reconnect;
mod session;
mod status;
mod subscription;

// Public exports
pub use bridge::ActionBridge;
pub use config::ClientConfig;
pub use control::PadControl;
pub use error::{DlzError, Result};
pub use frame::{describe, ApplicationPacket, Frame, TransportPacket};
pub use pad::{
    Pad, PadAction, PadAttribute, PadId, PadKey, BANK_COUNT, PADS_PER_BANK, STATE_PLAYING,
    STATE_STOPPED,
};
pub use reconnect::ReconnectPolicy;
pub use subscription::{PadEvent, PadObserver, PadReceiver};
