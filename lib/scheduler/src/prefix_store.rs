// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Prompt-locality store: a TTL'd radix tree mapping prompt prefixes to the
//! pods that served them.
//!
//! Prompts are chunked into `block_size`-character blocks before insertion
//! and lookup; the block granularity bounds per-request work and aligns with
//! KV-cache block layout. A single `RwLock` guards the tree: lookups hold
//! the read lock, inserts, evictions, and maintenance sweeps hold the write
//! lock. Every operation is linearizable from the caller's view.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::types::PodName;

#[derive(Debug, thiserror::Error)]
pub enum PrefixStoreError {
    #[error("prefix of {0} chars is below the configured minimum of {1}")]
    PrefixTooShort(usize, usize),
}

#[derive(Debug, Clone)]
pub struct PrefixStoreConfig {
    /// Hard cap on total entries; the oldest entry is evicted to stay under it.
    pub max_entries: usize,
    /// Prompts shorter than this are not stored and never match.
    pub min_prefix_len: usize,
    /// Prompts longer than this are truncated before insert and lookup.
    pub max_prefix_len: usize,
    pub entry_ttl: Duration,
    /// Chunk granularity for tree edges, in characters.
    pub block_size: usize,
}

impl Default for PrefixStoreConfig {
    fn default() -> Self {
        Self {
            max_entries: 500_000,
            min_prefix_len: 8,
            max_prefix_len: 256,
            entry_ttl: Duration::from_secs(60 * 60),
            block_size: 16,
        }
    }
}

#[derive(Debug, Clone)]
struct PrefixEntry {
    pod: PodName,
    model: String,
    last_used: Instant,
}

/// A node in the chunked radix tree.
///
/// Full `block_size` chunks become `children` edges; a trailing chunk
/// shorter than a block is stored in `partials` and is always terminal.
#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, Node>,
    partials: HashMap<String, PrefixEntry>,
    /// Entry for a prefix ending exactly at this node.
    entry: Option<PrefixEntry>,
}

#[derive(Debug, Default)]
struct Tree {
    root: Node,
    len: usize,
}

/// Concurrent prefix-to-pod store with TTL and capacity bounds.
pub struct PrefixStore {
    tree: RwLock<Tree>,
    config: PrefixStoreConfig,
}

/// Truncate to at most `max` characters, on a char boundary.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Split into consecutive `block_size`-character chunks; only the final
/// chunk may be shorter than a block.
fn block_chunks(s: &str, block_size: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in s.char_indices() {
        if count == block_size {
            chunks.push(&s[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < s.len() {
        chunks.push(&s[start..]);
    }
    chunks
}

impl PrefixStore {
    pub fn new(config: PrefixStoreConfig) -> Self {
        Self {
            tree: RwLock::new(Tree::default()),
            config,
        }
    }

    pub fn config(&self) -> &PrefixStoreConfig {
        &self.config
    }

    /// Total entries currently stored.
    pub fn len(&self) -> usize {
        self.tree.read().unwrap().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record that `pod` served `prompt` under `model`.
    ///
    /// The prompt is truncated to `max_prefix_len` characters. Re-adding the
    /// same (prefix, pod, model) refreshes the entry in place; a different
    /// pod or model overwrites. When the store is at capacity the single
    /// oldest entry is evicted before the insert, so the total never exceeds
    /// `max_entries`.
    pub fn add_entry(
        &self,
        model: &str,
        prompt: &str,
        pod: &PodName,
    ) -> Result<(), PrefixStoreError> {
        let char_len = prompt.chars().count();
        if char_len < self.config.min_prefix_len {
            return Err(PrefixStoreError::PrefixTooShort(
                char_len,
                self.config.min_prefix_len,
            ));
        }

        let prefix = truncate_chars(prompt, self.config.max_prefix_len);
        let chunks = block_chunks(prefix, self.config.block_size);
        if chunks.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        let mut tree = self.tree.write().unwrap();

        if let Some(existing) = tree.entry_mut(&chunks, self.config.block_size) {
            if existing.pod == *pod && existing.model == model {
                existing.last_used = now;
                return Ok(());
            }
        }

        if tree.len >= self.config.max_entries {
            tree.evict_oldest();
        }

        tree.insert(
            &chunks,
            self.config.block_size,
            PrefixEntry {
                pod: pod.clone(),
                model: model.to_string(),
                last_used: now,
            },
        );
        tracing::trace!(prefix, pod = %pod, model, "added prefix entry");
        Ok(())
    }

    /// Walk the tree along `prompt` in block chunks and count, per pod, the
    /// stored prefixes that match under `model` and are within TTL.
    ///
    /// Expired entries are skipped but not deleted; the maintenance sweep
    /// reclaims them.
    pub fn find_matching_pods(&self, prompt: &str, model: &str) -> HashMap<PodName, u32> {
        let mut hits = HashMap::new();
        if prompt.chars().count() < self.config.min_prefix_len {
            return hits;
        }

        let prefix = truncate_chars(prompt, self.config.max_prefix_len);
        let now = Instant::now();
        let tree = self.tree.read().unwrap();

        let mut node = &tree.root;
        let mut rest = prefix;
        loop {
            // Terminal sub-block edges match any extension of their label.
            for (label, entry) in &node.partials {
                if rest.starts_with(label.as_str()) {
                    self.record_hit(entry, model, now, &mut hits);
                }
            }

            if rest.is_empty() {
                break;
            }
            let chunk = match rest.char_indices().nth(self.config.block_size) {
                Some((end, _)) => &rest[..end],
                // A trailing chunk shorter than a block can only match the
                // partial edges handled above.
                None if rest.chars().count() < self.config.block_size => break,
                None => rest,
            };
            let Some(child) = node.children.get(chunk) else {
                break;
            };
            if let Some(entry) = &child.entry {
                self.record_hit(entry, model, now, &mut hits);
            }
            node = child;
            rest = &rest[chunk.len()..];
        }

        hits
    }

    fn record_hit(
        &self,
        entry: &PrefixEntry,
        model: &str,
        now: Instant,
        hits: &mut HashMap<PodName, u32>,
    ) {
        if entry.model != model {
            return;
        }
        if now.duration_since(entry.last_used) > self.config.entry_ttl {
            return;
        }
        *hits.entry(entry.pod.clone()).or_insert(0) += 1;
    }

    /// Delete entries older than the TTL and prune emptied branches.
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut tree = self.tree.write().unwrap();
        let mut removed = 0;
        sweep_node(&mut tree.root, now, self.config.entry_ttl, &mut removed);
        tree.len -= removed;
        if removed > 0 {
            tracing::debug!(removed, remaining = tree.len, "swept expired prefix entries");
        }
        removed
    }

    /// Spawn the periodic maintenance sweep, running every `entry_ttl / 2`
    /// until `stop` is cancelled.
    pub fn spawn_maintenance(
        self: &Arc<Self>,
        stop: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(store.config.entry_ttl / 2);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => {
                        tracing::debug!("prefix store maintenance stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        store.sweep_expired();
                    }
                }
            }
        })
    }
}

impl Tree {
    /// Mutable handle to the entry stored for exactly these chunks, if any.
    fn entry_mut(&mut self, chunks: &[&str], block_size: usize) -> Option<&mut PrefixEntry> {
        let (last, full) = chunks.split_last()?;
        let mut node = &mut self.root;
        let last_is_partial = last.chars().count() < block_size;
        let walk = if last_is_partial { full } else { chunks };
        for chunk in walk {
            node = node.children.get_mut(*chunk)?;
        }
        if last_is_partial {
            node.partials.get_mut(*last)
        } else {
            node.entry.as_mut()
        }
    }

    /// Insert or overwrite the entry for these chunks.
    fn insert(&mut self, chunks: &[&str], block_size: usize, entry: PrefixEntry) {
        let Some((last, full)) = chunks.split_last() else {
            return;
        };
        let last_is_partial = last.chars().count() < block_size;
        let walk = if last_is_partial { full } else { chunks };
        let mut node = &mut self.root;
        for chunk in walk {
            node = node.children.entry((*chunk).to_string()).or_default();
        }
        let replaced = if last_is_partial {
            node.partials.insert((*last).to_string(), entry).is_some()
        } else {
            node.entry.replace(entry).is_some()
        };
        if !replaced {
            self.len += 1;
        }
    }

    /// Remove the entry with the smallest `last_used`, found with a single
    /// linear walk, and prune any branch it leaves empty.
    fn evict_oldest(&mut self) {
        let mut path = Vec::new();
        let mut oldest: Option<(Vec<String>, Option<String>, Instant)> = None;
        find_oldest(&self.root, &mut path, &mut oldest);

        let Some((path, partial, last_used)) = oldest else {
            return;
        };
        tracing::trace!(age_ms = last_used.elapsed().as_millis() as u64, "evicting oldest prefix entry");
        remove_at(&mut self.root, &path, partial.as_deref());
        self.len -= 1;
    }
}

fn find_oldest(
    node: &Node,
    path: &mut Vec<String>,
    oldest: &mut Option<(Vec<String>, Option<String>, Instant)>,
) {
    if let Some(entry) = &node.entry {
        if oldest.as_ref().map_or(true, |(_, _, t)| entry.last_used < *t) {
            *oldest = Some((path.clone(), None, entry.last_used));
        }
    }
    for (label, entry) in &node.partials {
        if oldest.as_ref().map_or(true, |(_, _, t)| entry.last_used < *t) {
            *oldest = Some((path.clone(), Some(label.clone()), entry.last_used));
        }
    }
    for (label, child) in &node.children {
        path.push(label.clone());
        find_oldest(child, path, oldest);
        path.pop();
    }
}

/// Remove the entry addressed by (`path`, `partial`); returns true when the
/// subtree rooted at `node` is now empty and can be pruned by the caller.
fn remove_at(node: &mut Node, path: &[String], partial: Option<&str>) -> bool {
    match path.split_first() {
        None => match partial {
            Some(label) => {
                node.partials.remove(label);
            }
            None => {
                node.entry = None;
            }
        },
        Some((head, rest)) => {
            if let Some(child) = node.children.get_mut(head) {
                if remove_at(child, rest, partial) {
                    node.children.remove(head);
                }
            }
        }
    }
    node.entry.is_none() && node.partials.is_empty() && node.children.is_empty()
}

fn sweep_node(node: &mut Node, now: Instant, ttl: Duration, removed: &mut usize) {
    if let Some(entry) = &node.entry {
        if now.duration_since(entry.last_used) > ttl {
            node.entry = None;
            *removed += 1;
        }
    }
    let before = node.partials.len();
    node.partials
        .retain(|_, entry| now.duration_since(entry.last_used) <= ttl);
    *removed += before - node.partials.len();

    node.children.retain(|_, child| {
        sweep_node(child, now, ttl, removed);
        !(child.entry.is_none() && child.partials.is_empty() && child.children.is_empty())
    });
}
