// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::datastore::PodDataStore;
use crate::plugins::Scorer;
use crate::types::{Pod, PodName, SchedulingContext};

/// Sticky routing: gives full score to the pod that served the first
/// request of the session, zero to every other candidate.
///
/// Requests without a session id, or whose session maps to no known pod,
/// get no opinion.
pub struct SessionAffinityScorer {
    datastore: Arc<dyn PodDataStore>,
}

impl SessionAffinityScorer {
    pub fn new(datastore: Arc<dyn PodDataStore>) -> Self {
        Self { datastore }
    }
}

#[async_trait]
impl Scorer for SessionAffinityScorer {
    fn name(&self) -> &str {
        "session-affinity-scorer"
    }

    async fn score(
        &self,
        ctx: &SchedulingContext<'_>,
        pods: &[Arc<Pod>],
    ) -> anyhow::Result<HashMap<PodName, f64>> {
        let Some(session_id) = ctx.request.session_id.as_deref() else {
            return Ok(HashMap::new());
        };
        let Some(session_pod) = self.datastore.pod_for_session(session_id) else {
            return Ok(HashMap::new());
        };

        let scores = pods
            .iter()
            .map(|pod| {
                let score = if pod.name == session_pod.name { 1.0 } else { 0.0 };
                (pod.name.clone(), score)
            })
            .collect();
        Ok(scores)
    }
}
