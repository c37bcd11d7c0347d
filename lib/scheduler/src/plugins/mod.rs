// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Plugin roles for the scheduling pipeline.
//!
//! A scheduling pass runs filters, scorers, and one picker in that order;
//! post-schedule hooks observe the pick and post-response hooks learn from
//! the completed request. All roles are small capability traits implemented
//! by interchangeable units and wired together by a
//! [`SchedulerConfig`](crate::scheduler::SchedulerConfig).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::types::{Pod, PodName, SchedulingContext, ScoredPod};

pub mod filters;
pub mod picker;
pub mod scorers;

pub use filters::{DecodeFilter, PdFilter, PrefillFilter};
pub use picker::{MaxScorePicker, RandomPicker};
pub use scorers::{
    KvCacheAwareScorer, LoadAwareScorer, PrefixAwareScorer, SessionAffinityScorer,
};

/// Prunes the candidate set. The output is always a subset of the input;
/// filters never fabricate pods.
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    fn filter(&self, ctx: &mut SchedulingContext<'_>, pods: Vec<Arc<Pod>>) -> Vec<Arc<Pod>>;
}

/// Assigns each candidate a score in `[0, 1]`.
///
/// An empty map signals "no opinion" and contributes nothing; pods absent
/// from a non-empty map score zero. Scorers may perform I/O and must honor
/// the context's cancellation token. An `Err` marks the scorer's backing
/// service as unavailable; the combiner logs it and continues without the
/// scorer's contribution.
#[async_trait]
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;

    async fn score(
        &self,
        ctx: &SchedulingContext<'_>,
        pods: &[Arc<Pod>],
    ) -> anyhow::Result<HashMap<PodName, f64>>;
}

/// Chooses one pod from the scored candidates. `None` on empty input.
pub trait Picker: Send + Sync {
    fn name(&self) -> &str;

    fn pick(&self, ctx: &SchedulingContext<'_>, pods: Vec<ScoredPod>) -> Option<ScoredPod>;
}

/// Observer invoked before filtering starts.
pub trait PreSchedule: Send + Sync {
    fn name(&self) -> &str;

    fn pre_schedule(&self, ctx: &SchedulingContext<'_>);
}

/// Observer invoked with the pick; may mutate the outgoing headers.
pub trait PostSchedule: Send + Sync {
    fn name(&self) -> &str;

    fn post_schedule(&self, ctx: &mut SchedulingContext<'_>, target: Option<&ScoredPod>);
}

/// Learning hook invoked by the gateway after the backend has responded,
/// e.g. to record prompt locality. May add header mutations.
#[async_trait]
pub trait PostResponse: Send + Sync {
    fn name(&self) -> &str;

    async fn post_response(&self, ctx: &mut SchedulingContext<'_>, target: &Pod);
}
