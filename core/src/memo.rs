//! Memoization with a size bound and optional TTL.
//!
//! # Keys
//!
//! [`Memoized::new`] keys the cache by the argument's `serde_json` encoding,
//! so structurally equal arguments share an entry. [`Memoized::with_key`]
//! takes a custom key function instead. A key function returning `None`
//! sends that call straight to the operation without touching the cache.
//!
//! # Eviction
//!
//! Entries are evicted oldest-insertion-first (not LRU) once the cache holds
//! `max_size` entries. With a TTL, expired entries are never returned and are
//! swept on every miss.
//!
//! Failures are not cached. Concurrent misses on the same key each invoke the
//! operation; the last one to finish owns the entry.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tether_types::MemoOptions;
use tokio::time::Instant;

use crate::util::lock;

/// Key function used by [`Memoized::new`].
pub type StructuralKey<A> = fn(&A) -> Option<String>;

fn structural_key<A: Serialize>(arg: &A) -> Option<String> {
    match serde_json::to_string(arg) {
        Ok(key) => Some(key),
        Err(err) => {
            tracing::warn!(error = %err, "Argument has no structural key, bypassing cache");
            None
        }
    }
}

#[derive(Debug)]
struct Entry<R> {
    value: R,
    inserted_at: Instant,
    seq: u64,
}

#[derive(Debug)]
struct MemoCache<K, R> {
    entries: HashMap<K, Entry<R>>,
    next_seq: u64,
}

impl<K: Eq + Hash + Clone, R> MemoCache<K, R> {
    fn sweep(&mut self, now: Instant, ttl: Duration) {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < ttl);
        let swept = before - self.entries.len();
        if swept > 0 {
            tracing::trace!(swept, remaining = self.entries.len(), "Swept expired memo entries");
        }
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    fn insert(&mut self, key: K, value: R, max_size: usize) {
        if self.entries.len() >= max_size && !self.entries.contains_key(&key) {
            self.evict_oldest();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                seq,
            },
        );
    }
}

/// Caches the successful results of an operation by argument key.
pub struct Memoized<F, KF, K, R> {
    op: F,
    key_fn: KF,
    options: MemoOptions,
    cache: Mutex<MemoCache<K, R>>,
}

impl<F, A, R> Memoized<F, StructuralKey<A>, String, R>
where
    A: Serialize,
{
    pub fn new<Fut>(op: F, options: MemoOptions) -> Self
    where
        F: Fn(A) -> Fut,
    {
        Self::with_key(op, options, structural_key::<A> as StructuralKey<A>)
    }
}

impl<F, KF, K, R> Memoized<F, KF, K, R>
where
    K: Eq + Hash + Clone,
{
    pub fn with_key(op: F, options: MemoOptions, key_fn: KF) -> Self {
        Self {
            op,
            key_fn,
            options,
            cache: Mutex::new(MemoCache {
                entries: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> &MemoOptions {
        &self.options
    }

    /// Entries currently stored, including any expired ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.cache).entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.cache).entries.is_empty()
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &K) -> bool {
        lock(&self.cache).entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        lock(&self.cache).entries.clear();
    }

    pub async fn call<A, Fut, E>(&self, arg: A) -> Result<R, E>
    where
        KF: Fn(&A) -> Option<K>,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        R: Clone,
    {
        let Some(key) = (self.key_fn)(&arg) else {
            return (self.op)(arg).await;
        };

        {
            let now = Instant::now();
            let ttl = self.options.ttl();
            let mut cache = lock(&self.cache);
            if let Some(entry) = cache.entries.get(&key)
                && ttl.is_none_or(|ttl| now.saturating_duration_since(entry.inserted_at) < ttl)
            {
                return Ok(entry.value.clone());
            }
            if let Some(ttl) = ttl {
                cache.sweep(now, ttl);
            }
        }

        let value = (self.op)(arg).await?;
        lock(&self.cache).insert(key, value.clone(), self.options.max_size());
        Ok(value)
    }
}
