// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Core scheduling types: the pod view, the request, and the per-request
//! scheduling context threaded through the plugin pipeline.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::scheduler::SchedulerError;

/// Header carrying the selected prefill pod URL to the decode pod.
pub const PREFILL_URL_HEADER: &str = "x-prefiller-url";

/// Namespaced pod identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodName {
    pub namespace: String,
    pub name: String,
}

impl PodName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Role a pod plays in a disaggregated deployment.
///
/// `Prefill` pods handle the initial pass over the prompt, `Decode` pods
/// handle autoregressive generation, and `Both` pods can do either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodRole {
    Prefill,
    Decode,
    Both,
}

/// Live metrics for a pod, populated out-of-band by the metrics collector.
/// The scheduling engine only ever reads a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodMetrics {
    pub waiting_queue_size: u32,
    /// KV-cache utilization fraction in `[0, 1]`.
    pub kv_cache_usage: f64,
    pub active_models: HashSet<String>,
    pub max_active_models: usize,
}

/// Immutable snapshot of one backend pod.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pod {
    pub name: PodName,
    pub address: String,
    pub role: PodRole,
    pub metrics: PodMetrics,
}

/// One LLM request as seen by the scheduling engine.
/// Immutable within a single scheduling call.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub model: String,
    pub resolved_target_model: String,
    pub critical: bool,
    pub prompt: String,
    pub session_id: Option<String>,
}

/// A candidate pod with its running weighted score.
#[derive(Debug, Clone)]
pub struct ScoredPod {
    pub pod: Arc<Pod>,
    pub score: f64,
}

/// Outcome of one scheduling pass.
#[derive(Debug, Default)]
pub struct SchedulingResult {
    /// `None` when the picker had no candidates to choose from.
    pub target_pod: Option<ScoredPod>,
    pub mutated_headers: HashMap<String, String>,
}

/// Per-request state threaded through the plugin pipeline.
///
/// Created once per scheduling call and never shared across requests.
/// Plugins read the request and pod snapshot and may populate
/// `mutated_headers`; the ambient `cancel` token aborts in-flight scorer I/O.
pub struct SchedulingContext<'a> {
    pub request: &'a LlmRequest,
    pub pods: Vec<Arc<Pod>>,
    /// Port used when constructing pod URLs (e.g. the prefill URL header).
    pub target_port: u16,
    pub mutated_headers: HashMap<String, String>,
    pub cancel: CancellationToken,
    pub span: tracing::Span,
}

impl<'a> SchedulingContext<'a> {
    /// Fails with [`SchedulerError::NoCandidates`] when the pod snapshot is
    /// empty before any filter has run.
    pub fn new(
        request: &'a LlmRequest,
        pods: Vec<Arc<Pod>>,
        target_port: u16,
        cancel: CancellationToken,
    ) -> Result<Self, SchedulerError> {
        if pods.is_empty() {
            return Err(SchedulerError::NoCandidates);
        }
        let span = tracing::debug_span!("schedule", model = %request.model);
        Ok(Self {
            request,
            pods,
            target_port,
            mutated_headers: HashMap::new(),
            cancel,
            span,
        })
    }
}
