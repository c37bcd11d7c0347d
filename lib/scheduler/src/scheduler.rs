// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The scheduling pipeline: filter, score, pick, and the hooks around them.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::datastore::PodDataStore;
use crate::plugins::{Filter, Picker, PostResponse, PostSchedule, PreSchedule, Scorer};
use crate::types::{LlmRequest, Pod, PodName, SchedulingContext, SchedulingResult, ScoredPod};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("no candidate pods available to schedule the request")]
    NoCandidates,

    #[error("scheduling cancelled before completion")]
    Cancelled,
}

/// Plugin wiring for one scheduler. Built during bootstrap and treated as
/// immutable afterwards.
pub struct SchedulerConfig {
    pub pre_schedule: Vec<Arc<dyn PreSchedule>>,
    /// Applied in declared order.
    pub filters: Vec<Arc<dyn Filter>>,
    /// Scorers with their integer weights; contributions are summed.
    pub scorers: Vec<(Arc<dyn Scorer>, i32)>,
    pub picker: Arc<dyn Picker>,
    pub post_schedule: Vec<Arc<dyn PostSchedule>>,
    pub post_response: Vec<Arc<dyn PostResponse>>,
}

impl SchedulerConfig {
    pub fn new(picker: Arc<dyn Picker>) -> Self {
        Self {
            pre_schedule: Vec::new(),
            filters: Vec::new(),
            scorers: Vec::new(),
            picker,
            post_schedule: Vec::new(),
            post_response: Vec::new(),
        }
    }
}

/// Drives one scheduling pass per request: snapshot, filter, score, pick.
///
/// A scheduler holds no per-request state; concurrent calls only share the
/// immutable config and the thread-safe collaborators behind it.
pub struct Scheduler {
    config: SchedulerConfig,
    datastore: Arc<dyn PodDataStore>,
    target_port: u16,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, datastore: Arc<dyn PodDataStore>, target_port: u16) -> Self {
        Self {
            config,
            datastore,
            target_port,
        }
    }

    /// Schedule one request onto a pod.
    ///
    /// Terminal errors only: [`SchedulerError::NoCandidates`] when the pool
    /// is empty or fully filtered out, [`SchedulerError::Cancelled`] when
    /// the ambient token fires. Scorer failures are logged and skipped.
    pub async fn schedule(
        &self,
        request: &LlmRequest,
        cancel: CancellationToken,
    ) -> Result<SchedulingResult, SchedulerError> {
        let pods = self.datastore.list();
        let mut ctx = SchedulingContext::new(request, pods, self.target_port, cancel)?;
        self.schedule_with_context(&mut ctx).await
    }

    /// Run the pipeline inside an existing context. Used by the P/D
    /// scheduler, whose prefill and decode passes share one context so the
    /// header mutations accumulate.
    pub(crate) async fn schedule_with_context(
        &self,
        ctx: &mut SchedulingContext<'_>,
    ) -> Result<SchedulingResult, SchedulerError> {
        if ctx.cancel.is_cancelled() {
            return Err(SchedulerError::Cancelled);
        }

        for hook in &self.config.pre_schedule {
            hook.pre_schedule(ctx);
        }

        let mut candidates = ctx.pods.clone();
        for filter in &self.config.filters {
            let before = candidates.len();
            candidates = filter.filter(ctx, candidates);
            tracing::debug!(
                parent: &ctx.span,
                filter = filter.name(),
                before,
                after = candidates.len(),
                "applied filter"
            );
            if candidates.is_empty() {
                return Err(SchedulerError::NoCandidates);
            }
        }

        let scored = self.score_candidates(ctx, candidates).await?;
        let target = self.config.picker.pick(ctx, scored);

        match &target {
            Some(picked) => tracing::debug!(
                parent: &ctx.span,
                pod = %picked.pod.name,
                score = picked.score,
                "selected target pod"
            ),
            None => tracing::debug!(parent: &ctx.span, "picker returned no target"),
        }

        for hook in &self.config.post_schedule {
            hook.post_schedule(ctx, target.as_ref());
        }

        Ok(SchedulingResult {
            target_pod: target,
            mutated_headers: ctx.mutated_headers.clone(),
        })
    }

    /// Sum weighted scorer outputs over the filtered candidates.
    ///
    /// Pods with no usable identity are dropped up front; a scorer that
    /// fails contributes nothing and the pass continues with the remaining
    /// signals.
    async fn score_candidates(
        &self,
        ctx: &SchedulingContext<'_>,
        pods: Vec<Arc<Pod>>,
    ) -> Result<Vec<ScoredPod>, SchedulerError> {
        let valid: Vec<Arc<Pod>> = pods
            .into_iter()
            .filter(|pod| {
                let usable = !pod.name.name.is_empty() && !pod.address.is_empty();
                if !usable {
                    tracing::debug!(parent: &ctx.span, pod = %pod.name, "skipping pod with missing identity");
                }
                usable
            })
            .collect();
        if valid.is_empty() {
            return Err(SchedulerError::NoCandidates);
        }

        let mut totals: Vec<ScoredPod> = valid
            .iter()
            .map(|pod| ScoredPod {
                pod: Arc::clone(pod),
                score: 0.0,
            })
            .collect();

        for (scorer, weight) in &self.config.scorers {
            if ctx.cancel.is_cancelled() {
                return Err(SchedulerError::Cancelled);
            }
            match scorer.score(ctx, &valid).await {
                Ok(scores) => {
                    for scored in totals.iter_mut() {
                        if let Some(score) = scores.get(&scored.pod.name) {
                            scored.score += f64::from(*weight) * score;
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        parent: &ctx.span,
                        scorer = scorer.name(),
                        %error,
                        "scorer failed, continuing without its contribution"
                    );
                }
            }
        }

        Ok(totals)
    }

    /// Gateway entry point invoked after the backend has responded. Runs
    /// the post-response hooks for the pod that served the request and
    /// returns any additional header mutations.
    pub async fn run_post_response_plugins(
        &self,
        request: &LlmRequest,
        target_pod_name: &PodName,
        cancel: CancellationToken,
    ) -> Result<SchedulingResult, SchedulerError> {
        let pods = self.datastore.list();
        let mut ctx = SchedulingContext::new(request, pods, self.target_port, cancel)?;

        let target = ctx
            .pods
            .iter()
            .find(|pod| pod.name == *target_pod_name)
            .cloned();
        match &target {
            Some(pod) => {
                for hook in &self.config.post_response {
                    hook.post_response(&mut ctx, pod).await;
                }
            }
            None => tracing::warn!(
                parent: &ctx.span,
                pod = %target_pod_name,
                "target pod not in the snapshot, skipping post-response plugins"
            ),
        }

        Ok(SchedulingResult {
            target_pod: target.map(|pod| ScoredPod { pod, score: 0.0 }),
            mutated_headers: ctx.mutated_headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{DecodeFilter, LoadAwareScorer, MaxScorePicker, PrefixAwareScorer};
    use crate::prefix_store::PrefixStoreConfig;
    use crate::test_utils::{
        make_pod, make_pod_with_queue, make_request, FailingScorer, FixedScorer, StaticDataStore,
    };
    use crate::types::PodRole;
    use std::time::Duration;

    fn base_config() -> SchedulerConfig {
        SchedulerConfig::new(Arc::new(MaxScorePicker::new()))
    }

    #[tokio::test]
    async fn empty_pool_is_no_candidates() {
        let scheduler = Scheduler::new(base_config(), Arc::new(StaticDataStore::new(vec![])), 0);
        let request = make_request("12345678901", "model1");

        let err = scheduler
            .schedule(&request, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NoCandidates));
    }

    #[tokio::test]
    async fn filtered_out_pool_is_no_candidates() {
        let mut config = base_config();
        config.filters.push(Arc::new(DecodeFilter));
        let pods = vec![make_pod("pod1", "1.2.3.4", PodRole::Prefill)];
        let scheduler = Scheduler::new(config, Arc::new(StaticDataStore::new(pods)), 0);

        let request = make_request("hello", "model1");
        let err = scheduler
            .schedule(&request, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NoCandidates));
    }

    #[tokio::test]
    async fn single_pod_is_selected_without_scorers() {
        let pods = vec![make_pod("pod1", "1.2.3.4", PodRole::Both)];
        let scheduler = Scheduler::new(base_config(), Arc::new(StaticDataStore::new(pods)), 0);

        let request = make_request("hello", "model1");
        let result = scheduler
            .schedule(&request, CancellationToken::new())
            .await
            .unwrap();
        let target = result.target_pod.unwrap();
        assert_eq!(target.pod.name.name, "pod1");
        assert_eq!(target.score, 0.0);
        assert!(result.mutated_headers.is_empty());
    }

    #[tokio::test]
    async fn load_tie_break_prefers_the_idle_pod() {
        let mut config = base_config();
        config.scorers.push((Arc::new(LoadAwareScorer::new(10)), 1));
        let pods = vec![
            make_pod_with_queue("pod1", "1.1.1.1", PodRole::Decode, 2),
            make_pod_with_queue("pod2", "2.2.2.2", PodRole::Decode, 0),
            make_pod_with_queue("pod3", "3.3.3.3", PodRole::Decode, 5),
        ];
        let scheduler = Scheduler::new(config, Arc::new(StaticDataStore::new(pods)), 0);

        let request = make_request("hello", "model1");
        let result = scheduler
            .schedule(&request, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.target_pod.unwrap().pod.name.name, "pod2");
    }

    #[tokio::test]
    async fn weights_scale_scorer_contributions() {
        let pods = vec![
            make_pod("pod1", "1.1.1.1", PodRole::Both),
            make_pod("pod2", "2.2.2.2", PodRole::Both),
        ];
        let mut config = base_config();
        // pod1 wins scorer A, pod2 wins scorer B; B carries triple weight.
        config.scorers.push((
            Arc::new(FixedScorer::new([
                (pods[0].name.clone(), 1.0),
                (pods[1].name.clone(), 0.0),
            ])),
            1,
        ));
        config.scorers.push((
            Arc::new(FixedScorer::new([
                (pods[0].name.clone(), 0.0),
                (pods[1].name.clone(), 1.0),
            ])),
            3,
        ));
        let scheduler = Scheduler::new(config, Arc::new(StaticDataStore::new(pods)), 0);

        let request = make_request("hello", "model1");
        let result = scheduler
            .schedule(&request, CancellationToken::new())
            .await
            .unwrap();
        let target = result.target_pod.unwrap();
        assert_eq!(target.pod.name.name, "pod2");
        assert_eq!(target.score, 3.0);
    }

    #[tokio::test]
    async fn failing_scorer_is_skipped() {
        let pods = vec![
            make_pod("pod1", "1.1.1.1", PodRole::Both),
            make_pod("pod2", "2.2.2.2", PodRole::Both),
        ];
        let mut config = base_config();
        config.scorers.push((Arc::new(FailingScorer), 5));
        config.scorers.push((
            Arc::new(FixedScorer::new([
                (pods[0].name.clone(), 0.2),
                (pods[1].name.clone(), 0.9),
            ])),
            1,
        ));
        let scheduler = Scheduler::new(config, Arc::new(StaticDataStore::new(pods)), 0);

        let request = make_request("hello", "model1");
        let result = scheduler
            .schedule(&request, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.target_pod.unwrap().pod.name.name, "pod2");
    }

    #[tokio::test]
    async fn cancelled_token_surfaces_cancelled() {
        let pods = vec![make_pod("pod1", "1.1.1.1", PodRole::Both)];
        let mut config = base_config();
        config.scorers.push((Arc::new(FixedScorer::default()), 1));
        let scheduler = Scheduler::new(config, Arc::new(StaticDataStore::new(pods)), 0);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = make_request("hello", "model1");
        let err = scheduler.schedule(&request, cancel).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Cancelled));
    }

    #[tokio::test]
    async fn picker_choice_is_a_filtered_candidate() {
        let mut config = base_config();
        config.filters.push(Arc::new(DecodeFilter));
        let pods = vec![
            make_pod("pod1", "1.1.1.1", PodRole::Prefill),
            make_pod("pod2", "2.2.2.2", PodRole::Decode),
            make_pod("pod3", "3.3.3.3", PodRole::Both),
        ];
        let scheduler = Scheduler::new(config, Arc::new(StaticDataStore::new(pods)), 0);

        let request = make_request("hello", "model1");
        for _ in 0..20 {
            let result = scheduler
                .schedule(&request, CancellationToken::new())
                .await
                .unwrap();
            let target_pod = result.target_pod.unwrap();
            let name = &target_pod.pod.name.name;
            assert!(matches!(name.as_str(), "pod2" | "pod3"));
        }
    }

    #[tokio::test]
    async fn post_response_plugins_feed_the_prefix_store() {
        let pods = vec![
            make_pod("pod1", "1.1.1.1", PodRole::Both),
            make_pod("pod2", "2.2.2.2", PodRole::Both),
        ];
        let scorer = Arc::new(PrefixAwareScorer::new(PrefixStoreConfig {
            max_entries: 10,
            min_prefix_len: 3,
            max_prefix_len: 64,
            entry_ttl: Duration::from_secs(3600),
            block_size: 5,
        }));
        let store = Arc::clone(scorer.prefix_store());

        let mut config = base_config();
        config.post_response.push(scorer);
        let scheduler = Scheduler::new(config, Arc::new(StaticDataStore::new(pods.clone())), 0);

        let request = make_request("hello world", "model1");
        let result = scheduler
            .run_post_response_plugins(&request, &pods[1].name, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.target_pod.unwrap().pod.name.name, "pod2");

        let hits = store.find_matching_pods("hello world", "model1");
        assert_eq!(hits.get(&pods[1].name), Some(&1));
    }

    #[tokio::test]
    async fn schedule_hooks_observe_the_pass() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingHooks {
            pre: AtomicUsize,
            post: AtomicUsize,
        }

        impl crate::plugins::PreSchedule for CountingHooks {
            fn name(&self) -> &str {
                "counting-hooks"
            }
            fn pre_schedule(&self, _ctx: &crate::types::SchedulingContext<'_>) {
                self.pre.fetch_add(1, Ordering::SeqCst);
            }
        }

        impl crate::plugins::PostSchedule for CountingHooks {
            fn name(&self) -> &str {
                "counting-hooks"
            }
            fn post_schedule(
                &self,
                ctx: &mut crate::types::SchedulingContext<'_>,
                target: Option<&crate::types::ScoredPod>,
            ) {
                self.post.fetch_add(1, Ordering::SeqCst);
                if let Some(picked) = target {
                    ctx.mutated_headers
                        .insert("x-picked-pod".to_string(), picked.pod.name.to_string());
                }
            }
        }

        let hooks = Arc::new(CountingHooks {
            pre: AtomicUsize::new(0),
            post: AtomicUsize::new(0),
        });
        let mut config = base_config();
        config.pre_schedule.push(hooks.clone());
        config.post_schedule.push(hooks.clone());

        let pods = vec![make_pod("pod1", "1.1.1.1", PodRole::Both)];
        let scheduler = Scheduler::new(config, Arc::new(StaticDataStore::new(pods)), 0);

        let request = make_request("hello", "model1");
        let result = scheduler
            .schedule(&request, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(hooks.pre.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.post.load(Ordering::SeqCst), 1);
        assert_eq!(
            result.mutated_headers.get("x-picked-pod").map(String::as_str),
            Some("default/pod1")
        );
    }

    #[tokio::test]
    async fn post_response_with_unknown_pod_is_benign() {
        let pods = vec![make_pod("pod1", "1.1.1.1", PodRole::Both)];
        let scheduler = Scheduler::new(base_config(), Arc::new(StaticDataStore::new(pods)), 0);

        let request = make_request("hello world", "model1");
        let result = scheduler
            .run_post_response_plugins(
                &request,
                &crate::types::PodName::new("default", "missing"),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.target_pod.is_none());
    }
}
