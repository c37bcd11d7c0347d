// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Interface to the external KV-cache indexer service.
//!
//! The indexer is backed by a shared key-value store and a tokenizer pool;
//! it runs outside this crate. The engine only consumes its per-pod
//! affinity lookup through [`KvCacheIndexer`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::ConfigError;

/// Environment variable holding the indexer's backing store address.
pub const KVCACHE_INDEXER_REDIS_ADDR: &str = "KVCACHE_INDEXER_REDIS_ADDR";
/// Environment variable holding the token used by the indexer's tokenizers.
pub const HF_TOKEN: &str = "HF_TOKEN";

/// Raw KV-cache affinity lookup.
///
/// Calls are made per scheduling pass and race the request deadline; the
/// caller aborts them via its cancellation token.
#[async_trait]
pub trait KvCacheIndexer: Send + Sync {
    /// Raw affinity per pod address for `(prompt, model)`. Higher is better;
    /// the scale is indexer-defined and normalized by the caller. `hint` is
    /// reserved for indexer-side routing and may be `None`.
    async fn get_pod_scores(
        &self,
        prompt: &str,
        model: &str,
        hint: Option<&str>,
    ) -> anyhow::Result<HashMap<String, i64>>;
}

/// Bootstrap settings for the indexer, read from the environment.
#[derive(Debug, Clone)]
pub struct KvCacheIndexerConfig {
    pub redis_addr: String,
    pub hf_token: String,
}

impl KvCacheIndexerConfig {
    /// Both variables are required whenever the KV-cache scorer is enabled.
    pub fn from_env() -> Result<Self, ConfigError> {
        let redis_addr = std::env::var(KVCACHE_INDEXER_REDIS_ADDR)
            .map_err(|_| ConfigError::MissingEnv(KVCACHE_INDEXER_REDIS_ADDR))?;
        let hf_token =
            std::env::var(HF_TOKEN).map_err(|_| ConfigError::MissingEnv(HF_TOKEN))?;
        Ok(Self {
            redis_addr,
            hf_token,
        })
    }
}
