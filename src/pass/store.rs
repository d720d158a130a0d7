use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

use super::PassRecord;

/// Whether [`PassStore::update`] keeps the record afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retain {
    Keep,
    Evict,
}

/// `(expires_at, token)` pairs, soonest first.
type ExpiryIndex = BTreeSet<(Instant, String)>;

/// In-memory pass store backed by a sharded `DashMap`.
///
/// Entries honour `PassRecord::expires_at`: they are checked on read and
/// evicted lazily, and a background sweep calls `evict_expired()` to bound
/// memory. Locking is per shard, so consumes of unrelated tokens rarely
/// contend.
///
/// An expiry-ordered index sits beside the map so the sweep and capacity
/// eviction only touch the entries they drop. The index may briefly hold
/// pairs whose entry is already gone; every removal through it re-checks
/// `expires_at` against the live record. The index lock is never taken while
/// a shard lock is held.
///
/// Capacity: once `max_entries` is reached, inserting a new token first
/// sweeps expired entries and then evicts the entries that expire soonest.
/// The cap is soft under concurrent inserts.
#[derive(Clone)]
pub struct PassStore {
    entries: Arc<DashMap<String, PassRecord>>,
    expiry: Arc<Mutex<ExpiryIndex>>,
    max_entries: usize,
}

impl PassStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            expiry: Arc::new(Mutex::new(BTreeSet::new())),
            max_entries: max_entries.max(1),
        }
    }

    /// Insert or replace the record for `token`. It is removed once
    /// `record.expires_at()` passes.
    pub(crate) fn set(&self, token: String, record: PassRecord) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&token) {
            self.make_room();
        }
        let expires_at = record.expires_at();
        let replaced = self.entries.insert(token.clone(), record);

        let mut index = self.index();
        if let Some(old) = replaced {
            index.remove(&(old.expires_at(), token.clone()));
        }
        index.insert((expires_at, token));
    }

    /// Snapshot of the live record, if any.
    pub fn get(&self, token: &str) -> Option<PassRecord> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(token) {
            if !entry.is_expired_at(now) {
                return Some(entry.clone());
            }
            // expired — drop the ref before removing
            drop(entry);
            if let Some(removed) = self.entries.remove_if(token, |_, record| record.is_expired_at(now)) {
                self.unindex(removed);
            }
        }
        None
    }

    /// Idempotent delete.
    pub fn remove(&self, token: &str) {
        if let Some(removed) = self.entries.remove(token) {
            self.unindex(removed);
        }
    }

    /// Run `f` against the live record for `token` while holding its shard
    /// lock, then keep or evict it as `f` decides. Returns `None` when the
    /// token is unknown.
    ///
    /// `f` must not call back into the store: the shard lock is held.
    pub(crate) fn update<R, F>(&self, token: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut PassRecord) -> (R, Retain),
    {
        let (result, evicted) = match self.entries.entry(token.to_owned()) {
            Entry::Occupied(mut slot) => {
                let (result, retain) = f(slot.get_mut());
                let evicted = (retain == Retain::Evict).then(|| slot.remove_entry());
                (result, evicted)
            }
            Entry::Vacant(_) => return None,
        };
        // shard lock released with the entry
        if let Some(removed) = evicted {
            self.unindex(removed);
        }
        Some(result)
    }

    /// Remove all expired entries. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut dropped = 0usize;
        while let Some((at, token)) = self.pop_soonest(Some(now)) {
            if self.remove_indexed(at, &token) {
                dropped += 1;
            }
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn make_room(&self) {
        let expired = self.evict_expired();
        let mut displaced = 0usize;

        while self.entries.len() >= self.max_entries {
            match self.pop_soonest(None) {
                Some((at, token)) => {
                    if self.remove_indexed(at, &token) {
                        displaced += 1;
                    }
                }
                None => break,
            }
        }

        tracing::debug!(
            expired,
            displaced,
            max_entries = self.max_entries,
            "pass store at capacity, made room"
        );
    }

    fn index(&self) -> MutexGuard<'_, ExpiryIndex> {
        // the index holds no invariant a panicking holder could break
        self.expiry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the soonest index pair, if it expires at or before `due`
    /// (any pair when `due` is `None`).
    fn pop_soonest(&self, due: Option<Instant>) -> Option<(Instant, String)> {
        let mut index = self.index();
        let ready = match (index.first(), due) {
            (Some((at, _)), Some(due)) => *at <= due,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if ready {
            index.pop_first()
        } else {
            None
        }
    }

    /// Remove `token` only if the live record is still the one indexed at `at`.
    fn remove_indexed(&self, at: Instant, token: &str) -> bool {
        self.entries
            .remove_if(token, |_, record| record.expires_at() == at)
            .is_some()
    }

    fn unindex(&self, (token, record): (String, PassRecord)) {
        self.index().remove(&(record.expires_at(), token));
    }
}
