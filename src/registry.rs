//! Deployment registry and per-deployment runtime state
//!
//! A [`Deployment`] is one concrete backend (provider + model + limits)
//! serving a model group. Configuration is immutable after load; the only
//! mutable piece is [`DeploymentUsage`], the lock-free usage state that feeds
//! the usage- and latency-based routing strategies.
//!
//! All counters use atomics with `Relaxed` ordering: routing decisions
//! tolerate slightly stale state, and no cross-field invariant has to be
//! maintained atomically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering::Relaxed};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::DeploymentDescriptor;
use crate::error::RouterError;

/// Deployment identifier, unique within one registry.
pub type DeploymentId = String;

/// Number of latency samples kept per deployment for latency-based routing.
pub const LATENCY_WINDOW: usize = 10;

/// Length of the trailing usage window the rpm/tpm counters cover.
pub const USAGE_WINDOW: Duration = Duration::from_secs(60);

/// Static rate limits for one deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimits {
    /// Requests per minute (None = unlimited)
    #[serde(default)]
    pub rpm: Option<u64>,

    /// Tokens per minute (None = unlimited)
    #[serde(default)]
    pub tpm: Option<u64>,

    /// Maximum parallel in-flight requests (None = derived from rpm/tpm)
    #[serde(default)]
    pub max_parallel_requests: Option<u32>,
}

/// Runtime usage state for one deployment.
///
/// The rpm/tpm counters cover a trailing [`USAGE_WINDOW`] that rolls over
/// lazily on the next read or write after it goes stale, the same read-time
/// style as the cooldown tracker — no sweep thread. Lifetime totals are never
/// reset. The latency window holds the last [`LATENCY_WINDOW`] observed
/// latencies under a per-deployment mutex.
#[derive(Debug)]
pub struct DeploymentUsage {
    /// Requests currently in flight
    pub active_requests: AtomicU32,
    /// Requests in the trailing window
    pub rpm_current: AtomicU64,
    /// Tokens in the trailing window
    pub tpm_current: AtomicU64,
    /// Lifetime request count
    pub total_requests: AtomicU64,
    /// Lifetime failure count
    pub fail_requests: AtomicU64,
    latency_window: Mutex<VecDeque<u64>>,
    window_start: Mutex<Instant>,
}

impl DeploymentUsage {
    fn new() -> Self {
        Self {
            active_requests: AtomicU32::new(0),
            rpm_current: AtomicU64::new(0),
            tpm_current: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            fail_requests: AtomicU64::new(0),
            latency_window: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
            window_start: Mutex::new(Instant::now()),
        }
    }

    /// Start a fresh trailing window if the current one has gone stale.
    fn roll_window_if_stale(&self) {
        let mut start = self.window_start.lock();
        let now = Instant::now();
        if now.duration_since(*start) >= USAGE_WINDOW {
            *start = now;
            self.reset_window();
        }
    }

    /// Record a completed successful request.
    pub fn record_success(&self, tokens: u64, latency_us: u64) {
        self.roll_window_if_stale();
        self.total_requests.fetch_add(1, Relaxed);
        self.rpm_current.fetch_add(1, Relaxed);
        self.tpm_current.fetch_add(tokens, Relaxed);

        let mut window = self.latency_window.lock();
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(latency_us);
    }

    /// Record a failed request.
    pub fn record_failure(&self) {
        self.roll_window_if_stale();
        self.total_requests.fetch_add(1, Relaxed);
        self.rpm_current.fetch_add(1, Relaxed);
        self.fail_requests.fetch_add(1, Relaxed);
    }

    /// Rolling average of the last [`LATENCY_WINDOW`] latencies, in
    /// microseconds. `None` until at least one sample has been observed.
    pub fn avg_latency_us(&self) -> Option<u64> {
        let window = self.latency_window.lock();
        if window.is_empty() {
            return None;
        }
        Some(window.iter().sum::<u64>() / window.len() as u64)
    }

    /// Trailing-window utilization as a percentage of the tighter of the
    /// rpm/tpm limits. Unlimited deployments report 0.
    pub fn utilization_pct(&self, limits: &RateLimits) -> u64 {
        self.roll_window_if_stale();
        let rpm_pct = match limits.rpm {
            Some(limit) if limit > 0 => self.rpm_current.load(Relaxed) * 100 / limit,
            _ => 0,
        };
        let tpm_pct = match limits.tpm {
            Some(limit) if limit > 0 => self.tpm_current.load(Relaxed) * 100 / limit,
            _ => 0,
        };
        rpm_pct.max(tpm_pct)
    }

    /// Reset trailing-window counters. Lifetime totals and the latency
    /// window are untouched.
    pub fn reset_window(&self) {
        self.rpm_current.store(0, Relaxed);
        self.tpm_current.store(0, Relaxed);
    }
}

/// One concrete backend deployment serving a model group.
///
/// Immutable after load, except for the `usage` state.
#[derive(Debug)]
pub struct Deployment {
    /// Unique deployment id
    pub id: DeploymentId,
    /// Logical alias this deployment serves (e.g. "gpt-4")
    pub model_group: String,
    /// Underlying provider/model identifier (e.g. "azure/gpt-4-turbo")
    pub model: String,
    /// Provider name (e.g. "openai", "azure")
    pub provider: String,
    /// Provider endpoint, if configured
    pub api_base: Option<String>,
    /// Static rate limits
    pub rate_limits: RateLimits,
    /// Tags for request filtering (e.g. ["paid", "eu"])
    pub tags: Vec<String>,
    /// Runtime usage state
    pub usage: DeploymentUsage,
}

impl Deployment {
    /// Create a deployment with no limits or tags.
    pub fn new(id: impl Into<String>, model_group: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model_group: model_group.into(),
            model: model.into(),
            provider: "openai".to_string(),
            api_base: None,
            rate_limits: RateLimits::default(),
            tags: Vec::new(),
            usage: DeploymentUsage::new(),
        }
    }

    /// Set the provider name (builder pattern).
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Set rate limits (builder pattern).
    pub fn with_rate_limits(mut self, limits: RateLimits) -> Self {
        self.rate_limits = limits;
        self
    }

    /// Set tags (builder pattern).
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub(crate) fn from_descriptor(desc: DeploymentDescriptor) -> Self {
        Self {
            id: desc.id,
            model_group: desc.model_group,
            model: desc.model,
            provider: desc.provider,
            api_base: desc.api_base,
            rate_limits: desc.rate_limits,
            tags: desc.tags,
            usage: DeploymentUsage::new(),
        }
    }

    /// True iff this deployment's tag set is a superset of `requested`.
    pub fn has_tags(&self, requested: &[String]) -> bool {
        requested.iter().all(|t| self.tags.contains(t))
    }
}

/// Registry of configured deployments, indexed by id and by model group.
///
/// Read-mostly after load. Hot-patching replaces the whole registry snapshot
/// through the router; there are no partial updates.
#[derive(Debug, Default)]
pub struct DeploymentRegistry {
    deployments: DashMap<DeploymentId, Arc<Deployment>>,
    group_index: DashMap<String, Vec<DeploymentId>>,
}

impl DeploymentRegistry {
    /// Build a registry from a list of deployments.
    ///
    /// Fails on duplicate deployment ids.
    pub fn new(deployments: Vec<Deployment>) -> Result<Self, RouterError> {
        let registry = Self::default();
        for deployment in deployments {
            if registry.deployments.contains_key(&deployment.id) {
                return Err(RouterError::Config(format!(
                    "duplicate deployment id '{}'",
                    deployment.id
                )));
            }
            let id = deployment.id.clone();
            registry
                .group_index
                .entry(deployment.model_group.clone())
                .or_default()
                .push(id.clone());
            registry.deployments.insert(id, Arc::new(deployment));
        }
        Ok(registry)
    }

    /// Build a registry from configuration descriptors, preserving order.
    pub fn from_descriptors(descriptors: Vec<DeploymentDescriptor>) -> Result<Self, RouterError> {
        Self::new(descriptors.into_iter().map(Deployment::from_descriptor).collect())
    }

    /// Look up a deployment by id.
    pub fn get(&self, id: &str) -> Option<Arc<Deployment>> {
        self.deployments.get(id).map(|d| Arc::clone(&d))
    }

    /// All deployments registered under a model group, in configured order.
    pub fn deployments_for_group(&self, model_group: &str) -> Vec<Arc<Deployment>> {
        self.group_index
            .get(model_group)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// All registered model groups.
    pub fn model_groups(&self) -> Vec<String> {
        self.group_index.iter().map(|e| e.key().clone()).collect()
    }

    /// Every deployment in the registry.
    pub fn all(&self) -> Vec<Arc<Deployment>> {
        self.deployments.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Number of registered deployments.
    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    /// True if no deployments are registered.
    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }
}
