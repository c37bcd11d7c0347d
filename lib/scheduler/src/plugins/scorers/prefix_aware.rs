// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::normalized_scores;
use crate::plugins::{PostResponse, Scorer};
use crate::prefix_store::{PrefixStore, PrefixStoreConfig};
use crate::types::{Pod, PodName, SchedulingContext};

/// Scores pods by prompt-prefix locality and, as a post-response hook,
/// records which pod served each prompt.
///
/// Per-pod chunk hit counts from the prefix store are min–max normalized;
/// the pod with the deepest matching prefix scores 1.0.
pub struct PrefixAwareScorer {
    store: Arc<PrefixStore>,
}

impl PrefixAwareScorer {
    pub fn new(config: PrefixStoreConfig) -> Self {
        Self {
            store: Arc::new(PrefixStore::new(config)),
        }
    }

    /// Share an existing store, e.g. one with a running maintenance task.
    pub fn with_store(store: Arc<PrefixStore>) -> Self {
        Self { store }
    }

    pub fn prefix_store(&self) -> &Arc<PrefixStore> {
        &self.store
    }
}

#[async_trait]
impl Scorer for PrefixAwareScorer {
    fn name(&self) -> &str {
        "prefix-aware-scorer"
    }

    async fn score(
        &self,
        ctx: &SchedulingContext<'_>,
        pods: &[Arc<Pod>],
    ) -> anyhow::Result<HashMap<PodName, f64>> {
        if ctx.request.prompt.is_empty() {
            return Ok(HashMap::new());
        }

        let hits = self
            .store
            .find_matching_pods(&ctx.request.prompt, &ctx.request.model);
        if hits.is_empty() {
            tracing::trace!(parent: &ctx.span, "no prefix matches");
            return Ok(HashMap::new());
        }

        Ok(normalized_scores(pods, &hits, |pod| pod.name.clone()))
    }
}

#[async_trait]
impl PostResponse for PrefixAwareScorer {
    fn name(&self) -> &str {
        "prefix-aware-scorer"
    }

    async fn post_response(&self, ctx: &mut SchedulingContext<'_>, target: &Pod) {
        if let Err(error) =
            self.store
                .add_entry(&ctx.request.model, &ctx.request.prompt, &target.name)
        {
            tracing::debug!(parent: &ctx.span, %error, "prompt not recorded in prefix store");
        }
    }
}
