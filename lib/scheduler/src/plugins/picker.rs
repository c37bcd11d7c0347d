// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Pickers choose the final pod from the scored candidates.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Picker;
use crate::types::{SchedulingContext, ScoredPod};

/// Picks the pod with the maximum total score, breaking ties uniformly at
/// random.
///
/// The running maximum is initialized from the first candidate rather than
/// zero: weights may be signed, so totals can be negative and a zero floor
/// would discard every candidate.
pub struct MaxScorePicker {
    rng: Mutex<StdRng>,
}

impl MaxScorePicker {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Seeded tie-breaking, for deterministic replay.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for MaxScorePicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Picker for MaxScorePicker {
    fn name(&self) -> &str {
        "max-score-picker"
    }

    fn pick(&self, ctx: &SchedulingContext<'_>, pods: Vec<ScoredPod>) -> Option<ScoredPod> {
        let mut max_score = 0.0;
        let mut winners: Vec<ScoredPod> = Vec::new();
        for pod in pods {
            if winners.is_empty() || pod.score > max_score {
                max_score = pod.score;
                winners.clear();
                winners.push(pod);
            } else if pod.score == max_score {
                winners.push(pod);
            }
        }

        if winners.len() > 1 {
            tracing::debug!(
                parent: &ctx.span,
                max_score,
                tied = winners.len(),
                "breaking tie between equally scored pods"
            );
            let index = self.rng.lock().unwrap().random_range(0..winners.len());
            return Some(winners.swap_remove(index));
        }
        winners.pop()
    }
}

/// Picks uniformly at random among all candidates, ignoring scores.
pub struct RandomPicker {
    rng: Mutex<StdRng>,
}

impl RandomPicker {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }
}

impl Default for RandomPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Picker for RandomPicker {
    fn name(&self) -> &str {
        "random-picker"
    }

    fn pick(&self, _ctx: &SchedulingContext<'_>, mut pods: Vec<ScoredPod>) -> Option<ScoredPod> {
        if pods.is_empty() {
            return None;
        }
        let index = self.rng.lock().unwrap().random_range(0..pods.len());
        Some(pods.swap_remove(index))
    }
}
