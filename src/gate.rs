//! Per-deployment concurrency gate
//!
//! Each deployment gets one bounded permit pool, sized once at registry load
//! from its rate limits. A permit is held for exactly one in-flight call and
//! released on every exit path — the permit is a `tokio`
//! `OwnedSemaphorePermit`, so release is tied to drop and cannot leak, even
//! when the call future is cancelled by an external timeout.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::RouterError;
use crate::registry::{DeploymentId, DeploymentRegistry, RateLimits};

/// Permit pool size for one deployment.
///
/// Resolution order:
/// 1. explicit `max_parallel_requests`;
/// 2. else `rpm`;
/// 3. else `max(1, tpm / 1000 / 6)` — tpm scaled to a rough request count
///    at ~1k tokens per request over 6 ten-second slices;
/// 4. else the configured default;
/// 5. else `None` — unlimited, no gating.
pub fn effective_max_parallel_requests(
    limits: &RateLimits,
    default_max_parallel_requests: Option<u32>,
) -> Option<u32> {
    if let Some(explicit) = limits.max_parallel_requests {
        return Some(explicit);
    }
    if let Some(rpm) = limits.rpm {
        return Some(u32::try_from(rpm).unwrap_or(u32::MAX));
    }
    if let Some(tpm) = limits.tpm {
        return Some(u32::try_from((tpm / 1000 / 6).max(1)).unwrap_or(u32::MAX));
    }
    default_max_parallel_requests
}

/// Permit held for one in-flight call on one deployment.
///
/// `None` means the deployment is ungated (unlimited). Dropping the permit
/// releases it.
pub type ConcurrencyPermit = Option<OwnedSemaphorePermit>;

/// Bounded permit pools, one per gated deployment.
#[derive(Debug, Default)]
pub struct ConcurrencyGate {
    pools: DashMap<DeploymentId, Arc<Semaphore>>,
}

impl ConcurrencyGate {
    /// Build pools for every gated deployment in the registry.
    pub fn for_registry(
        registry: &DeploymentRegistry,
        default_max_parallel_requests: Option<u32>,
    ) -> Self {
        let gate = Self::default();
        for deployment in registry.all() {
            if let Some(limit) =
                effective_max_parallel_requests(&deployment.rate_limits, default_max_parallel_requests)
            {
                gate.pools
                    .insert(deployment.id.clone(), Arc::new(Semaphore::new(limit as usize)));
            }
        }
        gate
    }

    /// Acquire a permit for the deployment, suspending (without busy-wait)
    /// until one frees or `timeout` elapses.
    ///
    /// A per-call `override_limit` of 0 gates the deployment off for this
    /// call: acquisition never succeeds and times out. Other override values
    /// leave the shared pool untouched.
    pub async fn acquire(
        &self,
        deployment_id: &str,
        timeout: Duration,
        override_limit: Option<u32>,
    ) -> Result<ConcurrencyPermit, RouterError> {
        if override_limit == Some(0) {
            tokio::time::sleep(timeout).await;
            return Err(RouterError::Timeout {
                deployment: deployment_id.to_string(),
                stage: "permit",
            });
        }

        let semaphore = match self.pools.get(deployment_id) {
            Some(pool) => Arc::clone(&pool),
            None => return Ok(None),
        };

        match tokio::time::timeout(timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(Some(permit)),
            Ok(Err(_closed)) => Err(RouterError::Availability {
                deployment: deployment_id.to_string(),
                message: "permit pool closed".to_string(),
            }),
            Err(_elapsed) => Err(RouterError::Timeout {
                deployment: deployment_id.to_string(),
                stage: "permit",
            }),
        }
    }

    /// Permits currently free for a deployment; `None` if ungated.
    pub fn available_permits(&self, deployment_id: &str) -> Option<usize> {
        self.pools
            .get(deployment_id)
            .map(|pool| pool.available_permits())
    }
}
