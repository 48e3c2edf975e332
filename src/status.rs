use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Liveness flags shared between the connection context and callers
#[derive(Debug, Default)]
pub struct LinkStatus {
    connected: AtomicBool,
    reconnecting: AtomicBool,
    gave_up: AtomicBool,
    attempt: AtomicU32,
    ping_interval_ms: AtomicU64,
}

impl LinkStatus {
    pub(crate) fn new(ping_interval_ms: u64) -> Self {
        Self {
            ping_interval_ms: AtomicU64::new(ping_interval_ms),
            ..Self::default()
        }
    }

    /// INIT received and the session accepts actions
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// At least one reconnection attempt since the last established session
    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::SeqCst)
    }

    /// Reconnection attempts were exhausted
    pub fn has_given_up(&self) -> bool {
        self.gave_up.load(Ordering::SeqCst)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    /// Current keepalive interval in milliseconds
    pub fn ping_interval_ms(&self) -> u64 {
        self.ping_interval_ms.load(Ordering::SeqCst)
    }

    pub(crate) fn set_ping_interval_ms(&self, millis: u64) {
        self.ping_interval_ms.store(millis, Ordering::SeqCst);
    }

    /// Mark the session live and clear reconnection bookkeeping
    ///
    /// Returns true if this ended a reconnection sequence.
    pub(crate) fn mark_established(&self) -> bool {
        self.connected.store(true, Ordering::SeqCst);
        self.attempt.store(0, Ordering::SeqCst);
        self.reconnecting.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Count one more reconnection attempt, returning the new count
    pub(crate) fn begin_attempt(&self) -> u32 {
        self.reconnecting.store(true, Ordering::SeqCst);
        self.attempt.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn mark_given_up(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.gave_up.store(true, Ordering::SeqCst);
    }
}
