use crate::error::{DlzError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Number of banks on the pad server
pub const BANK_COUNT: u8 = 8;

/// Number of pads per bank
pub const PADS_PER_BANK: u8 = 6;

/// Pad `state` value while stopped
pub const STATE_STOPPED: i64 = 2;

/// Pad `state` value while playing
pub const STATE_PLAYING: i64 = 3;

/// Pad address on the server grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PadId {
    pub bank: u8,
    pub index: u8,
}

impl PadId {
    /// Create a pad address, checking it against the 8x6 grid
    pub fn new(bank: u8, index: u8) -> Option<Self> {
        (bank < BANK_COUNT && index < PADS_PER_BANK).then_some(Self { bank, index })
    }
}

impl fmt::Display for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B.{}.{}", self.bank, self.index)
    }
}

/// A playable pad on the DLZ Creator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pad {
    pub bank: u8,
    pub index: u8,
    pub name: String,

    /// 0 = inactive, 1 = active
    pub active: i64,

    /// 2 = Stopped, 3 = Playing
    pub state: i64,

    /// Playback position in seconds
    pub curtime: f64,
}

impl Pad {
    pub fn id(&self) -> PadId {
        PadId {
            bank: self.bank,
            index: self.index,
        }
    }

    /// Whether the server reports the pad as active
    pub fn is_playing(&self) -> bool {
        self.active == 1
    }

    /// Button label: the pad name, or `B<bank>.P<index>` if it is blank
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("B{}.P{}", self.bank, self.index)
        } else {
            self.name.clone()
        }
    }

    /// Set a single tracked attribute from a wire value
    pub fn apply(&mut self, attribute: PadAttribute, value: &Value) -> Result<()> {
        let id = self.id();
        let invalid = || DlzError::InvalidPadKey(format!("{}.{} = {}", id, attribute.as_str(), value));
        match attribute {
            PadAttribute::Name => {
                self.name = value.as_str().map(str::to_string).ok_or_else(invalid)?;
            }
            PadAttribute::Active => self.active = value_as_i64(value).ok_or_else(invalid)?,
            PadAttribute::State => self.state = value_as_i64(value).ok_or_else(invalid)?,
            PadAttribute::Curtime => self.curtime = value_as_f64(value).ok_or_else(invalid)?,
        }
        Ok(())
    }

    fn from_nested(id: PadId, nested: &Value) -> Option<Self> {
        let name = nested.get("name").and_then(Value::as_str).unwrap_or_default();
        if name.is_empty() {
            return None;
        }

        Some(Self {
            bank: id.bank,
            index: id.index,
            name: name.to_string(),
            active: nested.get("active").and_then(value_as_i64).unwrap_or(0),
            state: nested.get("state").and_then(value_as_i64).unwrap_or(STATE_STOPPED),
            curtime: nested.get("curtime").and_then(value_as_f64).unwrap_or(0.0),
        })
    }
}

/// The pad attributes the model tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadAttribute {
    Name,
    Active,
    State,
    Curtime,
}

impl PadAttribute {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(Self::Name),
            "active" => Some(Self::Active),
            "state" => Some(Self::State),
            "curtime" => Some(Self::Curtime),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Active => "active",
            Self::State => "state",
            Self::Curtime => "curtime",
        }
    }
}

/// A parsed `B.<bank>.<pad>.<attribute...>` key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadKey {
    pub id: PadId,
    /// Remaining dotted path after the pad prefix
    pub path: String,
}

impl PadKey {
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = || DlzError::InvalidPadKey(key.to_string());
        let mut parts = key.splitn(4, '.');
        if parts.next() != Some("B") {
            return Err(invalid());
        }
        let bank = parts.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;
        let index = parts.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;
        let path = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let id = PadId::new(bank, index).ok_or_else(invalid)?;

        Ok(Self {
            id,
            path: path.to_string(),
        })
    }

    /// The tracked attribute this key addresses
    pub fn attribute(&self) -> Result<PadAttribute> {
        PadAttribute::parse(&self.path).ok_or_else(|| DlzError::UnknownAttribute(self.path.clone()))
    }
}

/// Playback action sent to the pad server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadAction {
    Play,
    Stop,
}

impl PadAction {
    /// Outbound `{"B.<bank>.<pad>.state": "3" | "2"}` body
    pub fn payload(self, pad: PadId) -> Value {
        let state = match self {
            PadAction::Play => STATE_PLAYING,
            PadAction::Stop => STATE_STOPPED,
        };
        let mut body = Map::new();
        body.insert(format!("{}.state", pad), Value::String(state.to_string()));
        Value::Object(body)
    }
}

impl fmt::Display for PadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PadAction::Play => write!(f, "PLAY"),
            PadAction::Stop => write!(f, "STOP"),
        }
    }
}

/// Shared pad list
///
/// Written only by the connection context; readers get clones and may see
/// fields change between two reads.
#[derive(Clone, Default)]
pub struct PadStore {
    pads: Arc<RwLock<Vec<Pad>>>,
}

impl PadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all pads in snapshot order
    pub fn pads(&self) -> Vec<Pad> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// The pad at `position` in snapshot order
    pub fn get(&self, position: usize) -> Option<Pad> {
        self.read().get(position).cloned()
    }

    pub fn find(&self, id: PadId) -> Option<Pad> {
        self.read().iter().find(|p| p.id() == id).cloned()
    }

    /// Build the pad list from the INIT snapshot
    ///
    /// Does nothing if pads are already known, so a reconnect keeps the
    /// identities and ordering from the first snapshot. Returns the number of
    /// pads created.
    pub(crate) fn populate(&self, snapshot: &Map<String, Value>) -> usize {
        let mut pads = self.write();
        if !pads.is_empty() {
            return 0;
        }
        *pads = build_pads(snapshot);
        pads.len()
    }

    /// Apply a live `B.<bank>.<pad>.<attribute>` update
    ///
    /// Returns the updated pad id, or `None` if no pad exists at that address.
    pub(crate) fn apply_update(&self, key: &PadKey, value: &Value) -> Result<Option<PadId>> {
        let attribute = key.attribute()?;
        let mut pads = self.write();
        match pads.iter_mut().find(|p| p.id() == key.id) {
            Some(pad) => {
                pad.apply(attribute, value)?;
                tracing::debug!("Pad updated: {:?}", pad);
                Ok(Some(key.id))
            }
            None => Ok(None),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Pad>> {
        self.pads.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Pad>> {
        self.pads.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Turn the flat dotted-key snapshot into pads, bank by bank
fn build_pads(snapshot: &Map<String, Value>) -> Vec<Pad> {
    let mut slots: BTreeMap<PadId, Map<String, Value>> = BTreeMap::new();
    for (key, value) in snapshot {
        // Non-pad keys (mixer, global settings) share the snapshot
        let Ok(key) = PadKey::parse(key) else {
            continue;
        };
        slots.entry(key.id).or_default().insert(key.path, value.clone());
    }

    let mut pads = Vec::new();
    for bank in 0..BANK_COUNT {
        for index in 0..PADS_PER_BANK {
            let id = PadId { bank, index };
            let Some(flat) = slots.get(&id) else {
                continue;
            };
            if let Some(pad) = Pad::from_nested(id, &to_nested(flat)) {
                pads.push(pad);
            }
        }
    }
    pads
}

/// Re-nest `a.b.c = v` entries into `{"a": {"b": {"c": v}}}`
fn to_nested(flat: &Map<String, Value>) -> Value {
    let mut root = Map::new();
    for (key, value) in flat {
        let path: Vec<&str> = key.split('.').collect();
        insert_path(&mut root, &path, value.clone());
    }
    Value::Object(root)
}

fn insert_path(target: &mut Map<String, Value>, path: &[&str], value: Value) {
    match path {
        [] => {}
        [last] => {
            target.insert(last.to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
