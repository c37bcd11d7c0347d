// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::plugins::Scorer;
use crate::types::{Pod, PodName, SchedulingContext};

/// Queue length at which a pod's load score reaches zero when no threshold
/// is configured explicitly.
pub const DEFAULT_QUEUE_THRESHOLD: u32 = 128;

/// Scores pods by waiting-queue pressure.
///
/// An idle pod (empty queue) scores 0.5; queued pods decay linearly and hit
/// zero once the queue reaches the configured threshold. The current metric
/// set exposes no spare-capacity signal, so nothing scores above 0.5.
pub struct LoadAwareScorer {
    queue_threshold: u32,
}

impl LoadAwareScorer {
    pub fn new(queue_threshold: u32) -> Self {
        assert!(queue_threshold > 0, "queue threshold must be positive");
        Self { queue_threshold }
    }
}

impl Default for LoadAwareScorer {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_THRESHOLD)
    }
}

#[async_trait]
impl Scorer for LoadAwareScorer {
    fn name(&self) -> &str {
        "load-aware-scorer"
    }

    async fn score(
        &self,
        _ctx: &SchedulingContext<'_>,
        pods: &[Arc<Pod>],
    ) -> anyhow::Result<HashMap<PodName, f64>> {
        let threshold = f64::from(self.queue_threshold);
        let scores = pods
            .iter()
            .map(|pod| {
                let waiting = f64::from(pod.metrics.waiting_queue_size);
                let score = if waiting == 0.0 {
                    0.5
                } else {
                    (0.5 * (1.0 - waiting / threshold)).max(0.0)
                };
                (pod.name.clone(), score)
            })
            .collect();
        Ok(scores)
    }
}
