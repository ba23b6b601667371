//! `GameStateCache` – local mirror of the last server-pushed snapshot.
//!
//! The cache answers questions like:
//! - "Does entity X exist right now?"
//! - "Which entities carry the `prop_` prefix?"
//! - "Has a new snapshot arrived since I last looked?"
//!
//! Only the channel's receive loop writes to it, and every write replaces
//! the whole snapshot: there is no incremental merge.  Nothing here tracks
//! staleness; request a fresh snapshot and wait before trusting it.

use crate::types::{EntityRecord, GameState};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<GameState>,
    generation: AtomicU64,
}

/// Cheaply cloneable handle; clones share the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct GameStateCache {
    inner: Arc<Inner>,
}

impl GameStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Writes (receive loop only)
    // ------------------------------------------------------------------

    /// Swap in a new snapshot wholesale.  Last write wins.
    pub(crate) fn replace(&self, state: GameState) {
        let count = state.len();
        *self.inner.state.write() = state;
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!(
            "Game state updated: {} entities (generation {})",
            count,
            generation
        );
    }

    /// Drop everything (e.g. after disconnect).
    pub(crate) fn clear(&self) {
        *self.inner.state.write() = GameState::default();
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Owned copy of the current snapshot.
    pub fn snapshot(&self) -> GameState {
        self.inner.state.read().clone()
    }

    pub fn get(&self, name: &str) -> Option<EntityRecord> {
        self.inner.state.read().entities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.state.read().entities.contains_key(name)
    }

    /// Entity names, sorted so callers iterate deterministically.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.state.read().entities.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn entities_with_prefix(&self, prefix: &str) -> Vec<EntityRecord> {
        let mut out: Vec<EntityRecord> = self
            .inner
            .state
            .read()
            .entities
            .values()
            .filter(|e| e.name.starts_with(prefix))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Run `f` against the snapshot without cloning it.
    pub fn with_state<R>(&self, f: impl FnOnce(&GameState) -> R) -> R {
        f(&self.inner.state.read())
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.read().is_empty()
    }

    /// Number of snapshots applied since creation.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }
}
