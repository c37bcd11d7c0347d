// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Role-based candidate filters, including the combined prefill/decode
//! filter used when a single scheduler serves a disaggregated pool.

use std::sync::Arc;

use rand::Rng;

use super::Filter;
use crate::types::{Pod, PodRole, SchedulingContext, PREFILL_URL_HEADER};

/// Keeps pods whose role is `Prefill`.
pub struct PrefillFilter;

impl Filter for PrefillFilter {
    fn name(&self) -> &str {
        "prefill-filter"
    }

    fn filter(&self, _ctx: &mut SchedulingContext<'_>, pods: Vec<Arc<Pod>>) -> Vec<Arc<Pod>> {
        pods.into_iter()
            .filter(|pod| pod.role == PodRole::Prefill)
            .collect()
    }
}

/// Keeps pods whose role is `Decode` or `Both`.
pub struct DecodeFilter;

impl Filter for DecodeFilter {
    fn name(&self) -> &str {
        "decode-filter"
    }

    fn filter(&self, _ctx: &mut SchedulingContext<'_>, pods: Vec<Arc<Pod>>) -> Vec<Arc<Pod>> {
        pods.into_iter()
            .filter(|pod| matches!(pod.role, PodRole::Decode | PodRole::Both))
            .collect()
    }
}

/// Combined prefill/decode filter, an alternative to composing separate
/// prefill and decode schedulers.
///
/// Partitions the candidates by role. If any prefill pod exists, one is
/// chosen uniformly at random and its URL is written to the
/// `x-prefiller-url` header. The returned set is the decode partition,
/// reduced to a single random pod when more than one is available.
pub struct PdFilter;

impl Filter for PdFilter {
    fn name(&self) -> &str {
        "p/d-filter"
    }

    fn filter(&self, ctx: &mut SchedulingContext<'_>, pods: Vec<Arc<Pod>>) -> Vec<Arc<Pod>> {
        let mut prefill_pods = Vec::new();
        let mut decode_pods = Vec::new();
        for pod in pods {
            match pod.role {
                PodRole::Prefill => prefill_pods.push(pod),
                PodRole::Decode | PodRole::Both => decode_pods.push(pod),
            }
        }

        if !prefill_pods.is_empty() {
            let chosen = &prefill_pods[rand::rng().random_range(0..prefill_pods.len())];
            let url = format!("http://{}:{}", chosen.address, ctx.target_port);
            tracing::debug!(parent: &ctx.span, %url, "prefill pod selected");
            ctx.mutated_headers
                .insert(PREFILL_URL_HEADER.to_string(), url);
        }

        if decode_pods.len() > 1 {
            let index = rand::rng().random_range(0..decode_pods.len());
            return vec![decode_pods.swap_remove(index)];
        }
        decode_pods
    }
}
