// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::normalized_scores;
use crate::indexer::KvCacheIndexer;
use crate::plugins::Scorer;
use crate::types::{Pod, PodName, SchedulingContext};

/// Scores pods by KV-cache affinity reported by the external indexer.
///
/// Raw per-address affinities are min–max normalized over the returned set;
/// candidates the indexer did not mention score zero. Indexer failures and
/// cancellation both degrade to "no opinion" so the request is still served
/// from the remaining signals.
pub struct KvCacheAwareScorer {
    indexer: Arc<dyn KvCacheIndexer>,
}

impl KvCacheAwareScorer {
    pub fn new(indexer: Arc<dyn KvCacheIndexer>) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl Scorer for KvCacheAwareScorer {
    fn name(&self) -> &str {
        "kvcache-aware-scorer"
    }

    async fn score(
        &self,
        ctx: &SchedulingContext<'_>,
        pods: &[Arc<Pod>],
    ) -> anyhow::Result<HashMap<PodName, f64>> {
        let raw = tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                tracing::debug!(parent: &ctx.span, "kv-cache scoring cancelled");
                return Ok(HashMap::new());
            }
            result = self.indexer.get_pod_scores(&ctx.request.prompt, &ctx.request.model, None) => {
                match result {
                    Ok(raw) => raw,
                    Err(error) => {
                        tracing::warn!(parent: &ctx.span, %error, "kv-cache indexer unavailable");
                        return Ok(HashMap::new());
                    }
                }
            }
        };

        tracing::trace!(parent: &ctx.span, pods = raw.len(), "got kv-cache affinities");
        Ok(normalized_scores(pods, &raw, |pod| pod.address.clone()))
    }
}
