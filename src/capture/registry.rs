// src/capture/registry.rs
//! Appearance interning registry
//!
//! Maps each distinct [`Appearance`] to a small positive id, scoped to one
//! session. The capture thread is the only expected writer, but ids are
//! minted from an atomic counter and both directions live in `DashMap`s so
//! concurrent `intern` calls stay consistent.
//!
//! The registry travels whole inside every session record, so a receiver
//! rebuilds it with [`AppearanceRegistry::from_entries`] and needs no
//! prior state.

use crate::capture::appearance::Appearance;
use crate::utils::errors::{Result, TrailError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// First id handed out by an empty registry
pub const FIRST_ID: u32 = 1;

/// Never a valid id, so the next-id counter cannot wrap
pub const RESERVED_ID: u32 = u32::MAX;

/// Bijection between appearance descriptors and ids
pub struct AppearanceRegistry {
    /// Descriptor to id
    by_value: DashMap<Appearance, u32>,

    /// Id to descriptor
    by_id: DashMap<u32, Appearance>,

    /// Next id to mint
    next_id: AtomicU32,
}

impl AppearanceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            by_value: DashMap::new(),
            by_id: DashMap::new(),
            next_id: AtomicU32::new(FIRST_ID),
        }
    }

    /// Rebuild a registry from a received id -> descriptor map.
    ///
    /// Further [`intern`](Self::intern) calls continue from one past the
    /// largest id present.
    pub fn from_entries(entries: BTreeMap<u32, Appearance>) -> Result<Self> {
        let registry = Self::new();
        let mut max_id = 0;

        for (id, appearance) in entries {
            if id < FIRST_ID || id == RESERVED_ID {
                return Err(TrailError::InvalidRegistry(format!(
                    "appearance id {} is out of range",
                    id
                )));
            }
            if let Some(existing) = registry.by_value.get(&appearance) {
                return Err(TrailError::InvalidRegistry(format!(
                    "ids {} and {} share one descriptor",
                    *existing, id
                )));
            }
            registry.by_value.insert(appearance.clone(), id);
            registry.by_id.insert(id, appearance);
            max_id = max_id.max(id);
        }

        registry.next_id.store(max_id + 1, Ordering::SeqCst);
        Ok(registry)
    }

    /// Return the id for `appearance`, minting a new one on first sight.
    ///
    /// Fails only once every id below [`RESERVED_ID`] has been handed out.
    pub fn intern(&self, appearance: &Appearance) -> Result<u32> {
        if let Some(id) = self.by_value.get(appearance) {
            return Ok(*id);
        }

        match self.by_value.entry(appearance.clone()) {
            Entry::Occupied(entry) => Ok(*entry.get()),
            Entry::Vacant(entry) => {
                let id = self
                    .next_id
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                        (next < RESERVED_ID).then_some(next + 1)
                    })
                    .map_err(|_| {
                        TrailError::InvalidRegistry("appearance id space exhausted".to_string())
                    })?;
                self.by_id.insert(id, appearance.clone());
                entry.insert(id);
                Ok(id)
            }
        }
    }

    /// Look up the descriptor behind `id`
    pub fn resolve(&self, id: u32) -> Result<Appearance> {
        self.by_id
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(TrailError::UnknownAppearance { id })
    }

    pub fn contains(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Id the next unseen descriptor would receive
    pub fn next_id(&self) -> u32 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Ordered copy of the id -> descriptor map
    pub fn snapshot(&self) -> BTreeMap<u32, Appearance> {
        self.by_id
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

impl Default for AppearanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for AppearanceRegistry {
    fn clone(&self) -> Self {
        Self {
            by_value: self.by_value.clone(),
            by_id: self.by_id.clone(),
            next_id: AtomicU32::new(self.next_id()),
        }
    }
}

impl PartialEq for AppearanceRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.snapshot() == other.snapshot()
    }
}

impl fmt::Debug for AppearanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.snapshot()).finish()
    }
}

impl Serialize for AppearanceRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AppearanceRegistry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let entries = BTreeMap::<u32, Appearance>::deserialize(deserializer)?;
        AppearanceRegistry::from_entries(entries).map_err(serde::de::Error::custom)
    }
}
