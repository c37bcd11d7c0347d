// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gantry Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Pod data store interface, implemented by the enclosing gateway.

use std::sync::Arc;

use crate::types::Pod;

/// Pod membership and session tracking, maintained outside the scheduling
/// engine. Implementations must be safe for concurrent reads.
pub trait PodDataStore: Send + Sync {
    /// Snapshot of the current pod membership.
    fn list(&self) -> Vec<Arc<Pod>>;

    /// Pod that served the first request of the session, if still tracked.
    fn pod_for_session(&self, session_id: &str) -> Option<Arc<Pod>>;
}
