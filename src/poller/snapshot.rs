//! Last-read register values, published as an immutable snapshot.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::registers::RegisterSpace;
use crate::session::BlockValues;

/// A fully-formed copy of the most recently read values per register space.
///
/// Snapshots are never mutated after publication; each sweep builds a new one
/// from the previous snapshot plus whatever it managed to read, so addresses
/// whose block failed keep their last known value.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Snapshot {
    pub holding: BTreeMap<u16, u16>,
    pub input: BTreeMap<u16, u16>,
    pub coil: BTreeMap<u16, bool>,
    /// Time between the starts of the two most recent successful sweeps.
    pub last_interval: Option<Duration>,
    /// When this snapshot was assembled; `None` only for the initial empty one.
    pub captured_at: Option<DateTime<Utc>>,
}

/// A single cached register value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterValue {
    Word(u16),
    Coil(bool),
}

impl RegisterValue {
    pub fn word(self) -> Option<u16> {
        match self {
            RegisterValue::Word(w) => Some(w),
            RegisterValue::Coil(_) => None,
        }
    }

    pub fn coil(self) -> Option<bool> {
        match self {
            RegisterValue::Coil(b) => Some(b),
            RegisterValue::Word(_) => None,
        }
    }
}

impl Snapshot {
    /// Cached value for an address, or `None` if it was never read.
    pub fn get(&self, space: RegisterSpace, address: u16) -> Option<RegisterValue> {
        match space {
            RegisterSpace::Holding => self.holding.get(&address).copied().map(RegisterValue::Word),
            RegisterSpace::Input => self.input.get(&address).copied().map(RegisterValue::Word),
            RegisterSpace::Coil => self.coil.get(&address).copied().map(RegisterValue::Coil),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.holding.is_empty() && self.input.is_empty() && self.coil.is_empty()
    }

    /// Start a successor snapshot: same values, fresh capture time. The sweep
    /// then overwrites whatever it reads.
    pub(crate) fn carry_forward(&self) -> Snapshot {
        Snapshot {
            holding: self.holding.clone(),
            input: self.input.clone(),
            coil: self.coil.clone(),
            last_interval: self.last_interval,
            captured_at: Some(Utc::now()),
        }
    }

    /// Merge one block's values, assigning ascending addresses from `start`.
    pub(crate) fn merge_block(&mut self, space: RegisterSpace, start: u16, values: BlockValues) {
        match (space, values) {
            (RegisterSpace::Holding, BlockValues::Words(words)) => {
                for (i, word) in words.into_iter().enumerate() {
                    self.holding.insert(start + i as u16, word);
                }
            }
            (RegisterSpace::Input, BlockValues::Words(words)) => {
                for (i, word) in words.into_iter().enumerate() {
                    self.input.insert(start + i as u16, word);
                }
            }
            (RegisterSpace::Coil, BlockValues::Bits(bits)) => {
                for (i, bit) in bits.into_iter().enumerate() {
                    self.coil.insert(start + i as u16, bit);
                }
            }
            (space, _) => {
                log::error!("Payload type does not match {space} space; block at {start} dropped");
            }
        }
    }
}

/// Interpret a raw register word as a signed 16-bit quantity (the device
/// encodes temperatures as two's complement).
pub fn word_as_signed(word: u16) -> i16 {
    word as i16
}

/// Holder of the latest snapshot. Publishing swaps an `Arc`, so readers are
/// never blocked by an in-flight sweep or write.
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        SnapshotStore {
            current: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    pub fn publish(&self, snapshot: Snapshot) {
        *self.current.write().unwrap() = Arc::new(snapshot);
    }

    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().unwrap())
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        SnapshotStore::new()
    }
}
