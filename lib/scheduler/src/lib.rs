// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Gantry scheduler - the request-routing core of an LLM inference gateway.
//!
//! This crate decides where a request goes: it places each incoming request
//! on one backend pod from a dynamic pool, weighing load, KV-cache
//! locality, prompt-prefix affinity, and pod roles in a pluggable
//! filter/score/pick pipeline. Serving the traffic, collecting pod metrics,
//! and indexing KV caches all belong to the surrounding gateway; this crate
//! consumes them through the interfaces in [`datastore`] and [`indexer`].

pub mod config;
pub mod datastore;
pub mod indexer;
pub mod pd;
pub mod plugins;
pub mod prefix_store;
pub mod scheduler;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export the key types for convenience
pub use config::{PdConfig, ScorerResources, SchedulerVariant};
pub use datastore::PodDataStore;
pub use indexer::{KvCacheIndexer, KvCacheIndexerConfig};
pub use pd::PdScheduler;
pub use prefix_store::{PrefixStore, PrefixStoreConfig, PrefixStoreError};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError};
pub use types::{
    LlmRequest, Pod, PodMetrics, PodName, PodRole, SchedulingContext, SchedulingResult, ScoredPod,
    PREFILL_URL_HEADER,
};
