// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Shared fakes and builders for unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::datastore::PodDataStore;
use crate::indexer::KvCacheIndexer;
use crate::plugins::Scorer;
use crate::types::{
    LlmRequest, Pod, PodMetrics, PodName, PodRole, SchedulingContext,
};

pub(crate) fn make_pod(name: &str, address: &str, role: PodRole) -> Arc<Pod> {
    make_pod_with_queue(name, address, role, 0)
}

pub(crate) fn make_pod_with_queue(
    name: &str,
    address: &str,
    role: PodRole,
    waiting_queue_size: u32,
) -> Arc<Pod> {
    Arc::new(Pod {
        name: PodName::new("default", name),
        address: address.to_string(),
        role,
        metrics: PodMetrics {
            waiting_queue_size,
            ..PodMetrics::default()
        },
    })
}

pub(crate) fn make_request(prompt: &str, model: &str) -> LlmRequest {
    LlmRequest {
        model: model.to_string(),
        resolved_target_model: model.to_string(),
        critical: false,
        prompt: prompt.to_string(),
        session_id: None,
    }
}

pub(crate) fn make_context<'a>(
    request: &'a LlmRequest,
    pods: Vec<Arc<Pod>>,
) -> SchedulingContext<'a> {
    SchedulingContext::new(request, pods, 0, CancellationToken::new()).unwrap()
}

/// Fixed pod membership with optional session stickiness.
pub(crate) struct StaticDataStore {
    pods: Vec<Arc<Pod>>,
    sessions: HashMap<String, PodName>,
}

impl StaticDataStore {
    pub(crate) fn new(pods: Vec<Arc<Pod>>) -> Self {
        Self {
            pods,
            sessions: HashMap::new(),
        }
    }

    pub(crate) fn with_session(mut self, session_id: &str, pod: PodName) -> Self {
        self.sessions.insert(session_id.to_string(), pod);
        self
    }
}

impl PodDataStore for StaticDataStore {
    fn list(&self) -> Vec<Arc<Pod>> {
        self.pods.clone()
    }

    fn pod_for_session(&self, session_id: &str) -> Option<Arc<Pod>> {
        let name = self.sessions.get(session_id)?;
        self.pods.iter().find(|pod| pod.name == *name).cloned()
    }
}

/// Indexer returning a fixed address-to-affinity map.
pub(crate) struct StaticIndexer {
    scores: HashMap<String, i64>,
}

impl StaticIndexer {
    pub(crate) fn new<const N: usize>(scores: [(&str, i64); N]) -> Self {
        Self {
            scores: scores
                .into_iter()
                .map(|(address, score)| (address.to_string(), score))
                .collect(),
        }
    }
}

#[async_trait]
impl KvCacheIndexer for StaticIndexer {
    async fn get_pod_scores(
        &self,
        _prompt: &str,
        _model: &str,
        _hint: Option<&str>,
    ) -> anyhow::Result<HashMap<String, i64>> {
        Ok(self.scores.clone())
    }
}

/// Indexer whose backing service is always down.
pub(crate) struct FailingIndexer;

#[async_trait]
impl KvCacheIndexer for FailingIndexer {
    async fn get_pod_scores(
        &self,
        _prompt: &str,
        _model: &str,
        _hint: Option<&str>,
    ) -> anyhow::Result<HashMap<String, i64>> {
        anyhow::bail!("indexer connection refused")
    }
}

/// Scorer returning a fixed name-to-score map.
#[derive(Default)]
pub(crate) struct FixedScorer {
    scores: HashMap<PodName, f64>,
}

impl FixedScorer {
    pub(crate) fn new<const N: usize>(scores: [(PodName, f64); N]) -> Self {
        Self {
            scores: scores.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Scorer for FixedScorer {
    fn name(&self) -> &str {
        "fixed-scorer"
    }

    async fn score(
        &self,
        _ctx: &SchedulingContext<'_>,
        _pods: &[Arc<Pod>],
    ) -> anyhow::Result<HashMap<PodName, f64>> {
        Ok(self.scores.clone())
    }
}

/// Scorer whose backing service always fails.
pub(crate) struct FailingScorer;

#[async_trait]
impl Scorer for FailingScorer {
    fn name(&self) -> &str {
        "failing-scorer"
    }

    async fn score(
        &self,
        _ctx: &SchedulingContext<'_>,
        _pods: &[Arc<Pod>],
    ) -> anyhow::Result<HashMap<PodName, f64>> {
        anyhow::bail!("scorer backend unavailable")
    }
}
