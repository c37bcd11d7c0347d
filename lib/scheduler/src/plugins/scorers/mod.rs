// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Concrete scorers and their shared normalization.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::types::{Pod, PodName};

pub mod kv_cache_aware;
pub mod load_aware;
pub mod prefix_aware;
pub mod session_affinity;

pub use kv_cache_aware::KvCacheAwareScorer;
pub use load_aware::LoadAwareScorer;
pub use prefix_aware::PrefixAwareScorer;
pub use session_affinity::SessionAffinityScorer;

/// Min–max normalize raw integer affinities onto the candidate set.
///
/// When every returned value is equal, each returned pod scores 1.0;
/// otherwise the minimum maps to 0.0 and the maximum to 1.0. Candidates
/// absent from `raw` score 0.0. An empty `raw` map yields an empty result
/// (no opinion).
pub(crate) fn normalized_scores<K, V, F>(
    pods: &[Arc<Pod>],
    raw: &HashMap<K, V>,
    key_of: F,
) -> HashMap<PodName, f64>
where
    K: Eq + Hash,
    V: Copy + Into<i64>,
    F: Fn(&Pod) -> K,
{
    if raw.is_empty() {
        return HashMap::new();
    }

    let mut min = i64::MAX;
    let mut max = i64::MIN;
    for value in raw.values() {
        let value: i64 = (*value).into();
        min = min.min(value);
        max = max.max(value);
    }

    let mut scores = HashMap::with_capacity(pods.len());
    for pod in pods {
        let score = match raw.get(&key_of(pod)) {
            Some(value) => {
                let value: i64 = (*value).into();
                if min == max {
                    1.0
                } else {
                    (value - min) as f64 / (max - min) as f64
                }
            }
            None => 0.0,
        };
        scores.insert(pod.name.clone(), score);
    }
    scores
}
