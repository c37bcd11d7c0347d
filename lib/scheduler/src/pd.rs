// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Prefill/decode disaggregation: compose a prefill pass and a decode pass
//! over one shared scheduling context.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::datastore::PodDataStore;
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerError};
use crate::types::{LlmRequest, PodName, SchedulingContext, SchedulingResult, PREFILL_URL_HEADER};

/// Schedules long prompts in two passes: a prefill pod is chosen first and
/// its URL is handed to the decode pod via the `x-prefiller-url` header,
/// then the decode pod is chosen under decode-specific filters and scorers.
///
/// Prompts shorter than `prompt_len_threshold` gain nothing from splitting
/// and take the default scheduler instead.
pub struct PdScheduler {
    datastore: Arc<dyn PodDataStore>,
    prefill_scheduler: Scheduler,
    decode_scheduler: Scheduler,
    default_scheduler: Scheduler,
    target_port: u16,
    prompt_len_threshold: usize,
}

impl PdScheduler {
    pub fn new(
        datastore: Arc<dyn PodDataStore>,
        target_port: u16,
        prompt_len_threshold: usize,
        prefill_config: SchedulerConfig,
        decode_config: SchedulerConfig,
        default_config: SchedulerConfig,
    ) -> Self {
        Self {
            prefill_scheduler: Scheduler::new(prefill_config, Arc::clone(&datastore), target_port),
            decode_scheduler: Scheduler::new(decode_config, Arc::clone(&datastore), target_port),
            default_scheduler: Scheduler::new(default_config, Arc::clone(&datastore), target_port),
            datastore,
            target_port,
            prompt_len_threshold,
        }
    }

    /// Schedule one request.
    ///
    /// Both inner passes share the same context, so header mutations
    /// accumulate into the decode result. A prefill pass that finds no pod
    /// is not fatal: the request proceeds to decode without the header.
    /// A decode pass that finds no pod surfaces
    /// [`SchedulerError::NoCandidates`].
    pub async fn schedule(
        &self,
        request: &LlmRequest,
        cancel: CancellationToken,
    ) -> Result<SchedulingResult, SchedulerError> {
        if request.prompt.chars().count() < self.prompt_len_threshold {
            return self.default_scheduler.schedule(request, cancel).await;
        }

        let pods = self.datastore.list();
        let mut ctx = SchedulingContext::new(request, pods, self.target_port, cancel)?;

        let prefill_target = match self.prefill_scheduler.schedule_with_context(&mut ctx).await {
            Ok(result) => result.target_pod,
            Err(SchedulerError::NoCandidates) => {
                tracing::debug!(parent: &ctx.span, "no prefill candidates, continuing to decode");
                None
            }
            Err(error) => return Err(error),
        };

        if let Some(target) = &prefill_target {
            let url = format!("http://{}:{}", target.pod.address, ctx.target_port);
            tracing::debug!(parent: &ctx.span, %url, "prefill target selected");
            ctx.mutated_headers
                .insert(PREFILL_URL_HEADER.to_string(), url);
        }

        self.decode_scheduler.schedule_with_context(&mut ctx).await
    }

    /// Post-response hooks run under the decode scheduler's configuration,
    /// which owns the learning state for served requests.
    pub async fn run_post_response_plugins(
        &self,
        request: &LlmRequest,
        target_pod_name: &PodName,
        cancel: CancellationToken,
    ) -> Result<SchedulingResult, SchedulerError> {
        self.decode_scheduler
            .run_post_response_plugins(request, target_pod_name, cancel)
            .await
    }
}
