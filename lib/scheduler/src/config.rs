// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven assembly of scheduler configurations.
//!
//! All options are strings parsed as booleans (`"true"`, case-sensitive) or
//! signed integers; a value that fails to parse falls back to its documented
//! default with a logged warning. Assembly produces immutable
//! [`SchedulerConfig`] values during bootstrap; nothing here is consulted
//! again at run time.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use crate::datastore::PodDataStore;
use crate::indexer::{KvCacheIndexer, KvCacheIndexerConfig};
use crate::pd::PdScheduler;
use crate::plugins::{
    DecodeFilter, KvCacheAwareScorer, LoadAwareScorer, MaxScorePicker, PdFilter, PrefillFilter,
    PrefixAwareScorer, Scorer, SessionAffinityScorer,
};
use crate::prefix_store::PrefixStore;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::types::LlmRequest;

pub const ENABLE_KVCACHE_AWARE_SCORER: &str = "ENABLE_KVCACHE_AWARE_SCORER";
pub const KVCACHE_AWARE_SCORER_WEIGHT: &str = "KVCACHE_AWARE_SCORER_WEIGHT";
pub const ENABLE_LOAD_AWARE_SCORER: &str = "ENABLE_LOAD_AWARE_SCORER";
pub const LOAD_AWARE_SCORER_WEIGHT: &str = "LOAD_AWARE_SCORER_WEIGHT";
pub const ENABLE_PD_FILTER: &str = "ENABLE_PD_FILTER";
pub const PD_ENABLED: &str = "PD_ENABLED";
pub const PD_PROMPT_LEN_THRESHOLD: &str = "PD_PROMPT_LEN_THRESHOLD";

pub const PREFILL_ENABLE_KVCACHE_AWARE_SCORER: &str = "PREFILL_ENABLE_KVCACHE_AWARE_SCORER";
pub const PREFILL_KVCACHE_AWARE_SCORER_WEIGHT: &str = "PREFILL_KVCACHE_AWARE_SCORER_WEIGHT";
pub const PREFILL_ENABLE_LOAD_AWARE_SCORER: &str = "PREFILL_ENABLE_LOAD_AWARE_SCORER";
pub const PREFILL_LOAD_AWARE_SCORER_WEIGHT: &str = "PREFILL_LOAD_AWARE_SCORER_WEIGHT";
pub const DECODE_ENABLE_KVCACHE_AWARE_SCORER: &str = "DECODE_ENABLE_KVCACHE_AWARE_SCORER";
pub const DECODE_KVCACHE_AWARE_SCORER_WEIGHT: &str = "DECODE_KVCACHE_AWARE_SCORER_WEIGHT";
pub const DECODE_ENABLE_LOAD_AWARE_SCORER: &str = "DECODE_ENABLE_LOAD_AWARE_SCORER";
pub const DECODE_LOAD_AWARE_SCORER_WEIGHT: &str = "DECODE_LOAD_AWARE_SCORER_WEIGHT";

pub const LOAD_AWARE_SCORER_NAME: &str = "load-aware-scorer";
pub const KVCACHE_AWARE_SCORER_NAME: &str = "kvcache-aware-scorer";
pub const PREFIX_AWARE_SCORER_NAME: &str = "prefix-aware-scorer";
pub const SESSION_AFFINITY_SCORER_NAME: &str = "session-affinity-scorer";

const DEFAULT_SCORER_WEIGHT: i32 = 1;
const DEFAULT_PD_PROMPT_LEN_THRESHOLD: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("no kv-cache indexer handle was provided")]
    IndexerUnavailable,

    #[error("unknown scorer {0}")]
    UnknownScorer(String),
}

/// Collaborators the assembled scorers draw on.
#[derive(Clone)]
pub struct ScorerResources {
    pub datastore: Arc<dyn PodDataStore>,
    /// Handle to the running KV-cache indexer, when the gateway booted one.
    pub indexer: Option<Arc<dyn KvCacheIndexer>>,
    pub prefix_store: Arc<PrefixStore>,
}

/// `"true"` (case-sensitive) enables an option; anything else disables it.
pub(crate) fn env_bool(key: &str) -> bool {
    matches!(std::env::var(key).as_deref(), Ok("true"))
}

/// Parse an integer option, warning and falling back to `default` when the
/// value is present but malformed.
pub(crate) fn env_int<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key, value = %raw, %error, "failed to parse option, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Instantiate a scorer by its registered name.
pub fn scorer_by_name(
    name: &str,
    resources: &ScorerResources,
) -> Result<Arc<dyn Scorer>, ConfigError> {
    match name {
        LOAD_AWARE_SCORER_NAME => Ok(Arc::new(LoadAwareScorer::default())),
        KVCACHE_AWARE_SCORER_NAME => {
            // The indexer only boots with its required environment; an
            // enabled scorer without it is a configuration error.
            let _ = KvCacheIndexerConfig::from_env()?;
            let indexer = resources
                .indexer
                .clone()
                .ok_or(ConfigError::IndexerUnavailable)?;
            Ok(Arc::new(KvCacheAwareScorer::new(indexer)))
        }
        PREFIX_AWARE_SCORER_NAME => Ok(Arc::new(PrefixAwareScorer::with_store(Arc::clone(
            &resources.prefix_store,
        )))),
        SESSION_AFFINITY_SCORER_NAME => Ok(Arc::new(SessionAffinityScorer::new(Arc::clone(
            &resources.datastore,
        )))),
        other => Err(ConfigError::UnknownScorer(other.to_string())),
    }
}

/// Add one scorer to `config` when its enablement variable is `"true"`.
/// A scorer that cannot be created logs an error and is skipped; the
/// process keeps serving with the remaining signals.
fn add_scorer_by_env(
    config: &mut SchedulerConfig,
    name: &str,
    enable_key: &str,
    weight_key: &str,
    resources: &ScorerResources,
) {
    if !env_bool(enable_key) {
        tracing::debug!(scorer = name, "scorer not enabled, skipping");
        return;
    }

    let weight = env_int(weight_key, DEFAULT_SCORER_WEIGHT);
    match scorer_by_name(name, resources) {
        Ok(scorer) => {
            tracing::info!(scorer = name, weight, "initialized scorer");
            config.scorers.push((scorer, weight));
        }
        Err(error) => {
            tracing::error!(scorer = name, %error, "failed to create scorer, skipping");
        }
    }
}

/// Configuration for the scheduler used when no role split applies.
pub fn default_config_from_env(resources: &ScorerResources) -> SchedulerConfig {
    let mut config = SchedulerConfig::new(Arc::new(MaxScorePicker::new()));
    if env_bool(ENABLE_PD_FILTER) {
        config.filters.push(Arc::new(PdFilter));
    }
    add_scorer_by_env(
        &mut config,
        KVCACHE_AWARE_SCORER_NAME,
        ENABLE_KVCACHE_AWARE_SCORER,
        KVCACHE_AWARE_SCORER_WEIGHT,
        resources,
    );
    add_scorer_by_env(
        &mut config,
        LOAD_AWARE_SCORER_NAME,
        ENABLE_LOAD_AWARE_SCORER,
        LOAD_AWARE_SCORER_WEIGHT,
        resources,
    );
    config
}

/// Configuration for the prefill pass of the P/D scheduler.
pub fn prefill_config_from_env(resources: &ScorerResources) -> SchedulerConfig {
    let mut config = SchedulerConfig::new(Arc::new(MaxScorePicker::new()));
    config.filters.push(Arc::new(PrefillFilter));
    add_scorer_by_env(
        &mut config,
        KVCACHE_AWARE_SCORER_NAME,
        PREFILL_ENABLE_KVCACHE_AWARE_SCORER,
        PREFILL_KVCACHE_AWARE_SCORER_WEIGHT,
        resources,
    );
    add_scorer_by_env(
        &mut config,
        LOAD_AWARE_SCORER_NAME,
        PREFILL_ENABLE_LOAD_AWARE_SCORER,
        PREFILL_LOAD_AWARE_SCORER_WEIGHT,
        resources,
    );
    config
}

/// Configuration for the decode pass of the P/D scheduler.
pub fn decode_config_from_env(resources: &ScorerResources) -> SchedulerConfig {
    let mut config = SchedulerConfig::new(Arc::new(MaxScorePicker::new()));
    config.filters.push(Arc::new(DecodeFilter));
    add_scorer_by_env(
        &mut config,
        KVCACHE_AWARE_SCORER_NAME,
        DECODE_ENABLE_KVCACHE_AWARE_SCORER,
        DECODE_KVCACHE_AWARE_SCORER_WEIGHT,
        resources,
    );
    add_scorer_by_env(
        &mut config,
        LOAD_AWARE_SCORER_NAME,
        DECODE_ENABLE_LOAD_AWARE_SCORER,
        DECODE_LOAD_AWARE_SCORER_WEIGHT,
        resources,
    );
    config
}

/// P/D mode selection, fixed at construction time.
#[derive(Debug, Clone)]
pub struct PdConfig {
    pub enabled: bool,
    pub prompt_len_threshold: usize,
}

impl PdConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env_bool(PD_ENABLED),
            prompt_len_threshold: env_int(PD_PROMPT_LEN_THRESHOLD, DEFAULT_PD_PROMPT_LEN_THRESHOLD),
        }
    }
}

/// The scheduler variant selected by [`PD_ENABLED`] at construction time.
pub enum SchedulerVariant {
    Default(Scheduler),
    Pd(PdScheduler),
}

impl SchedulerVariant {
    pub async fn schedule(
        &self,
        request: &LlmRequest,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<crate::types::SchedulingResult, crate::scheduler::SchedulerError> {
        match self {
            Self::Default(scheduler) => scheduler.schedule(request, cancel).await,
            Self::Pd(scheduler) => scheduler.schedule(request, cancel).await,
        }
    }

    pub async fn run_post_response_plugins(
        &self,
        request: &LlmRequest,
        target_pod_name: &crate::types::PodName,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<crate::types::SchedulingResult, crate::scheduler::SchedulerError> {
        match self {
            Self::Default(scheduler) => {
                scheduler
                    .run_post_response_plugins(request, target_pod_name, cancel)
                    .await
            }
            Self::Pd(scheduler) => {
                scheduler
                    .run_post_response_plugins(request, target_pod_name, cancel)
                    .await
            }
        }
    }
}

/// Assemble the scheduler the environment asks for: the P/D composition
/// when [`PD_ENABLED`] is `"true"`, the default pipeline otherwise.
pub fn scheduler_from_env(
    resources: &ScorerResources,
    target_port: u16,
) -> SchedulerVariant {
    let pd = PdConfig::from_env();
    if pd.enabled {
        tracing::info!(
            prompt_len_threshold = pd.prompt_len_threshold,
            "prefill/decode scheduling enabled"
        );
        SchedulerVariant::Pd(PdScheduler::new(
            Arc::clone(&resources.datastore),
            target_port,
            pd.prompt_len_threshold,
            prefill_config_from_env(resources),
            decode_config_from_env(resources),
            default_config_from_env(resources),
        ))
    } else {
        SchedulerVariant::Default(Scheduler::new(
            default_config_from_env(resources),
            Arc::clone(&resources.datastore),
            target_port,
        ))
    }
}
