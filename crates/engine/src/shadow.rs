// EVMPG - EVM Playground
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Shadow of the engine's storage
//!
//! The engine does not expose a cheap way to list every slot it holds, so the
//! playground keeps its own copy. The engine reports each successful storage
//! mutation through the [`StorageBackend`] capability; [`ShadowStorage`]
//! applies it to insertion-ordered maps from which every published
//! [`ExecutionState`](evmpg_common::types::ExecutionState) takes a full
//! snapshot.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use evmpg_common::types::{StorageEntry, TransientStorageEntry};
use indexmap::IndexMap;
use parking_lot::Mutex;

/// Receiver of the storage mutations performed by an engine
///
/// Mutations are reported after the engine applied them. Frame journaling
/// calls are nested: every [`checkpoint`](Self::checkpoint) is matched by
/// exactly one [`commit`](Self::commit) or [`revert`](Self::revert).
pub trait StorageBackend {
    /// A persistent slot was written; a zero value deletes it
    fn set_slot(&mut self, address: Address, slot: U256, value: U256);

    /// All persistent storage of `address` was wiped
    fn clear_address(&mut self, address: Address);

    /// A transient slot (EIP-1153) was written
    fn set_transient(&mut self, address: Address, key: U256, value: U256);

    /// A call frame was entered
    fn checkpoint(&mut self) {}

    /// The innermost call frame returned successfully
    fn commit(&mut self) {}

    /// The innermost call frame reverted or halted
    fn revert(&mut self) {}
}

type SlotMap = IndexMap<Address, IndexMap<U256, U256>>;

/// Flattened contents of the shadow maps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageSnapshot {
    /// Persistent storage, addresses in first-touched order
    pub storage: Vec<StorageEntry>,
    /// Transient storage, addresses in first-touched order
    pub transient_storage: Vec<TransientStorageEntry>,
}

/// Insertion-ordered copy of persistent and transient storage
#[derive(Debug, Clone, Default)]
pub struct ShadowStorage {
    storage: SlotMap,
    transient: SlotMap,
    checkpoints: Vec<(SlotMap, SlotMap)>,
}

impl ShadowStorage {
    /// Create an empty shadow
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a persistent slot, if known
    pub fn slot(&self, address: Address, slot: U256) -> Option<U256> {
        self.storage.get(&address)?.get(&slot).copied()
    }

    /// Value of a transient slot, if written in this run
    pub fn transient(&self, address: Address, key: U256) -> Option<U256> {
        self.transient.get(&address)?.get(&key).copied()
    }

    /// Drop all transient storage; done at the start of every run
    pub fn clear_transient(&mut self) {
        self.transient.clear();
    }

    /// Drop all persistent storage; done when the engine is replaced
    pub fn clear_persistent(&mut self) {
        self.storage.clear();
    }

    /// Drop open checkpoints left over by an abandoned run
    pub fn discard_checkpoints(&mut self) {
        self.checkpoints.clear();
    }

    /// Number of open checkpoints
    pub fn checkpoint_depth(&self) -> usize {
        self.checkpoints.len()
    }

    /// Flatten both maps in iteration order
    pub fn snapshot(&self) -> StorageSnapshot {
        let storage = flatten(&self.storage)
            .map(|(address, slot, value)| StorageEntry { address, slot, value })
            .collect();
        let transient_storage = flatten(&self.transient)
            .map(|(address, key, value)| TransientStorageEntry { address, key, value })
            .collect();
        StorageSnapshot { storage, transient_storage }
    }
}

fn flatten(map: &SlotMap) -> impl Iterator<Item = (String, String, String)> + '_ {
    map.iter().flat_map(|(address, slots)| {
        slots.iter().map(move |(slot, value)| {
            (address.to_string(), format_word(*slot), format_word(*value))
        })
    })
}

/// Format a storage word as 0x-prefixed, zero-padded 32-byte hex
pub fn format_word(word: U256) -> String {
    B256::from(word).to_string()
}

impl StorageBackend for ShadowStorage {
    fn set_slot(&mut self, address: Address, slot: U256, value: U256) {
        if value.is_zero() {
            let Some(slots) = self.storage.get_mut(&address) else { return };
            slots.shift_remove(&slot);
            if slots.is_empty() {
                self.storage.shift_remove(&address);
            }
        } else {
            self.storage.entry(address).or_default().insert(slot, value);
        }
    }

    fn clear_address(&mut self, address: Address) {
        self.storage.shift_remove(&address);
    }

    fn set_transient(&mut self, address: Address, key: U256, value: U256) {
        self.transient.entry(address).or_default().insert(key, value);
    }

    fn checkpoint(&mut self) {
        self.checkpoints.push((self.storage.clone(), self.transient.clone()));
    }

    fn commit(&mut self) {
        self.checkpoints.pop();
    }

    fn revert(&mut self) {
        if let Some((storage, transient)) = self.checkpoints.pop() {
            self.storage = storage;
            self.transient = transient;
        }
    }
}

/// A [`ShadowStorage`] shared between the session and the engine worker
#[derive(Debug, Clone, Default)]
pub struct SharedShadow(Arc<Mutex<ShadowStorage>>);

impl SharedShadow {
    /// Create an empty shared shadow
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the shadow
    pub fn with<R>(&self, f: impl FnOnce(&mut ShadowStorage) -> R) -> R {
        f(&mut self.0.lock())
    }

    /// Snapshot of the current contents
    pub fn snapshot(&self) -> StorageSnapshot {
        self.0.lock().snapshot()
    }
}

impl StorageBackend for SharedShadow {
    fn set_slot(&mut self, address: Address, slot: U256, value: U256) {
        self.0.lock().set_slot(address, slot, value);
    }

    fn clear_address(&mut self, address: Address) {
        self.0.lock().clear_address(address);
    }

    fn set_transient(&mut self, address: Address, key: U256, value: U256) {
        self.0.lock().set_transient(address, key, value);
    }

    fn checkpoint(&mut self) {
        self.0.lock().checkpoint();
    }

    fn commit(&mut self) {
        self.0.lock().commit();
    }

    fn revert(&mut self) {
        self.0.lock().revert();
    }
}
