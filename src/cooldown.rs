//! Time-windowed failure isolation for deployments
//!
//! A deployment that recently failed is excluded from selection until its
//! cooldown entry expires. Entries decay by time comparison at read time;
//! there is no sweep thread. The tracker stores facts only — event emission
//! and retry decisions happen in the router.
//!
//! Uses `tokio::time::Instant` so cooldown windows behave correctly under a
//! paused test clock.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::registry::DeploymentId;

/// Tracks deployments currently excluded from selection.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    entries: DashMap<DeploymentId, Instant>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a cooldown entry expiring at `now + duration`.
    pub fn put_in_cooldown(&self, deployment_id: &str, duration: Duration) {
        let expires_at = Instant::now() + duration;
        self.entries.insert(deployment_id.to_string(), expires_at);
    }

    /// True iff no active cooldown entry references the deployment.
    ///
    /// Expired entries are dropped as a side effect of the check. Removal
    /// revalidates expiry under the map guard, so a concurrent
    /// `put_in_cooldown` refreshing the entry is never discarded.
    pub fn is_healthy(&self, deployment_id: &str) -> bool {
        self.entries
            .remove_if(deployment_id, |_, expires_at| Instant::now() >= *expires_at);
        match self.entries.get(deployment_id) {
            None => true,
            Some(entry) => Instant::now() >= *entry,
        }
    }

    /// Time left on the deployment's cooldown, if any.
    pub fn remaining(&self, deployment_id: &str) -> Option<Duration> {
        let entry = self.entries.get(deployment_id)?;
        let now = Instant::now();
        if now >= *entry {
            None
        } else {
            Some(*entry - now)
        }
    }

    /// Remove a cooldown entry ahead of its expiry.
    pub fn clear(&self, deployment_id: &str) {
        self.entries.remove(deployment_id);
    }

    /// Number of entries currently stored, including not-yet-collected
    /// expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
