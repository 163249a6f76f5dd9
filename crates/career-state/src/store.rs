//! World state store.
//!
//! The game-facing trigger source: a keyed set of observable integer
//! counters. Flags are counters holding 0 or 1. Conditions subscribe to the
//! cells they care about and re-assert whenever a cell changes.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use career_core::{CareerError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::observable::Observable;

/// A point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Counter values by key.
    pub values: BTreeMap<String, i64>,
}

impl WorldSnapshot {
    /// Get a value from the snapshot.
    pub fn get(&self, key: &str) -> Option<i64> {
        self.values.get(key).copied()
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// In-memory store of observable counters.
///
/// A lenient store creates unknown keys on first use with value 0. A strict
/// store only knows the keys it was declared with and reports anything else
/// as [`CareerError::UnknownKey`].
#[derive(Debug, Default)]
pub struct WorldState {
    cells: RefCell<HashMap<String, Observable<i64>>>,
    strict: bool,
}

impl WorldState {
    /// Create a lenient store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a strict store that knows exactly `keys`.
    pub fn strict<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let cells = keys
            .into_iter()
            .map(|k| (k.into(), Observable::new(0)))
            .collect();
        Self {
            cells: RefCell::new(cells),
            strict: true,
        }
    }

    /// Whether unknown keys are rejected.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Declare a key, creating it with value 0 if missing.
    pub fn declare(&self, key: &str) {
        self.cells
            .borrow_mut()
            .entry(key.to_string())
            .or_insert_with(|| Observable::new(0));
    }

    /// Get the cell for a key.
    pub fn cell(&self, key: &str) -> Result<Observable<i64>> {
        if let Some(cell) = self.cells.borrow().get(key) {
            return Ok(cell.clone());
        }
        if self.strict {
            return Err(CareerError::UnknownKey {
                key: key.to_string(),
            });
        }
        let cell = Observable::new(0);
        self.cells
            .borrow_mut()
            .insert(key.to_string(), cell.clone());
        Ok(cell)
    }

    /// Get the current value for a key.
    pub fn get(&self, key: &str) -> Option<i64> {
        self.cells.borrow().get(key).map(|c| c.get())
    }

    /// Set a value. Returns true if it changed.
    pub fn set(&self, key: &str, value: i64) -> Result<bool> {
        // Clone the cell out first: subscribers run during `set` and may
        // come back to this store.
        let cell = self.cell(key)?;
        let changed = cell.set(value);
        if changed {
            debug!("world state {} = {}", key, value);
        }
        Ok(changed)
    }

    /// Set a flag.
    pub fn set_flag(&self, key: &str, on: bool) -> Result<bool> {
        self.set(key, i64::from(on))
    }

    /// Add `delta` to a value and return the new value.
    pub fn add(&self, key: &str, delta: i64) -> Result<i64> {
        let cell = self.cell(key)?;
        let value = cell.get().saturating_add(delta);
        if cell.set(value) {
            debug!("world state {} += {} -> {}", key, delta, value);
        }
        Ok(value)
    }

    /// Apply several writes in iteration order.
    pub fn apply<'a, I>(&self, writes: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a String, &'a i64)>,
    {
        let mut changed = 0;
        for (key, value) in writes {
            if self.set(key, *value)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cells.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Copy of every value.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            values: self
                .cells
                .borrow()
                .iter()
                .map(|(k, c)| (k.clone(), c.get()))
                .collect(),
        }
    }
}
