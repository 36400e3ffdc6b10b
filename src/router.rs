//! Router core: admission, dispatch, and the retry/fallback state machine
//!
//! `Router::submit` drives the full lifecycle of one request:
//!
//! ```text
//! enqueue -> poll until head-of-queue -> SELECT -> GATE -> ATTEMPT
//!                                         ^                  |
//!                                         +--- RETRY / FALLBACK / FAIL
//! ```
//!
//! Validation failures propagate immediately and never cool a deployment
//! down. Availability failures (unreachable, throttled, timed out) insert a
//! cooldown entry and are retried within the group's budget; once the budget
//! is exhausted the orchestrator walks the group's fallback chain. Terminal
//! failures surface the most recent concrete error with the full attempt
//! history attached.
//!
//! Routers are plain injected instances — construct as many independent ones
//! per process as needed; they share nothing.

use std::future::Future;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{DeploymentDescriptor, RouterConfig, RouterSettings};
use crate::cooldown::CooldownTracker;
use crate::error::{
    AttemptError, AttemptRecord, CooldownReason, RouterError, RouterFailure,
};
use crate::events::{EventSink, RouterEvent, SharedEventSink, TracingSink};
use crate::gate::ConcurrencyGate;
use crate::registry::{Deployment, DeploymentRegistry};
use crate::scheduler::PriorityScheduler;
use crate::strategy::RoutingStrategy;

/// Immutable registry snapshot plus the gate sized from it.
///
/// Swapped wholesale on hot-patch; in-flight permits on the old gate drain
/// normally through their RAII drops.
#[derive(Debug)]
pub(crate) struct RoutingTable {
    pub(crate) registry: DeploymentRegistry,
    pub(crate) gate: ConcurrencyGate,
}

/// One submission to the router.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub(crate) model_group: String,
    pub(crate) priority: u8,
    pub(crate) tags: Option<Vec<String>>,
    pub(crate) deployment_override: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_parallel_override: Option<u32>,
    pub(crate) request_id: Option<String>,
}

impl SubmitRequest {
    /// Request against a model group with default priority 0 (most urgent).
    pub fn new(model_group: impl Into<String>) -> Self {
        Self {
            model_group: model_group.into(),
            priority: 0,
            tags: None,
            deployment_override: None,
            timeout: None,
            max_parallel_override: None,
            request_id: None,
        }
    }

    /// Set the priority; lower values are admitted first.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Restrict selection to deployments whose tag set covers `tags`.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Pin selection to one specific deployment id.
    pub fn with_deployment(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_override = Some(deployment_id.into());
        self
    }

    /// Overall deadline for admission and dispatch.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Per-call parallelism override. `0` gates the deployment off for this
    /// call without touching the shared cooldown tracker.
    pub fn with_max_parallel_override(mut self, limit: u32) -> Self {
        self.max_parallel_override = Some(limit);
        self
    }

    /// Supply a caller-unique request id instead of a generated one.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// The request-routing and admission-control core.
#[derive(Debug)]
pub struct Router {
    pub(crate) table: ArcSwap<RoutingTable>,
    pub(crate) cooldown: CooldownTracker,
    pub(crate) scheduler: PriorityScheduler,
    pub(crate) settings: RouterSettings,
    pub(crate) strategy: Arc<dyn RoutingStrategy>,
    pub(crate) rng: Mutex<StdRng>,
    pub(crate) events: SharedEventSink,
}

impl Router {
    /// Build a router from a validated configuration.
    pub fn from_config(config: RouterConfig) -> Result<Self, RouterError> {
        config.validate()?;
        let RouterConfig {
            settings,
            deployments,
        } = config;

        let registry = DeploymentRegistry::from_descriptors(deployments)?;
        let gate = ConcurrencyGate::for_registry(&registry, settings.default_max_parallel_requests);
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let strategy = settings.routing.build();

        tracing::info!(
            deployments = registry.len(),
            strategy = strategy.name(),
            "router initialized"
        );

        Ok(Self {
            table: ArcSwap::from_pointee(RoutingTable { registry, gate }),
            cooldown: CooldownTracker::new(),
            scheduler: PriorityScheduler::new(),
            settings,
            strategy,
            rng: Mutex::new(rng),
            events: Arc::new(TracingSink),
        })
    }

    /// Replace the event sink (builder pattern).
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Replace the routing strategy (builder pattern).
    pub fn with_strategy(mut self, strategy: Arc<dyn RoutingStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Router settings.
    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Look up a deployment by id in the current snapshot.
    pub fn deployment(&self, id: &str) -> Option<Arc<Deployment>> {
        self.table.load().registry.get(id)
    }

    /// Model groups in the current snapshot.
    pub fn model_groups(&self) -> Vec<String> {
        self.table.load().registry.model_groups()
    }

    /// Shared cooldown tracker.
    pub fn cooldown_tracker(&self) -> &CooldownTracker {
        &self.cooldown
    }

    /// Priority scheduler.
    pub fn scheduler(&self) -> &PriorityScheduler {
        &self.scheduler
    }

    /// Swap in a full new registry snapshot.
    ///
    /// The gate is rebuilt from the new limits. Cooldown entries survive the
    /// swap keyed by deployment id; queued requests are unaffected.
    pub fn replace_registry(
        &self,
        descriptors: Vec<DeploymentDescriptor>,
    ) -> Result<(), RouterError> {
        let registry = DeploymentRegistry::from_descriptors(descriptors)?;
        let gate =
            ConcurrencyGate::for_registry(&registry, self.settings.default_max_parallel_requests);
        tracing::info!(deployments = registry.len(), "registry snapshot replaced");
        self.table.store(Arc::new(RoutingTable { registry, gate }));
        Ok(())
    }

    /// Submit a request for a model group and run it to completion.
    ///
    /// The request is queued by `(priority, enqueue_sequence)` and polled
    /// until it reaches the head of its group's queue; on admission the
    /// orchestrator selects a deployment, acquires its concurrency permit,
    /// and runs `operation`. The operation returns the opaque response plus
    /// the tokens consumed, or an [`AttemptError`] classifying the failure.
    ///
    /// Returns [`RouterFailure`] carrying the most recent concrete error and
    /// the full attempt history.
    pub async fn submit<T, F, Fut>(
        &self,
        request: SubmitRequest,
        operation: F,
    ) -> Result<T, RouterFailure>
    where
        F: Fn(Arc<Deployment>) -> Fut,
        Fut: Future<Output = Result<(T, u64), AttemptError>>,
    {
        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let deadline =
            Instant::now() + request.timeout.unwrap_or_else(|| self.settings.default_timeout());

        self.scheduler
            .add_request(&request_id, request.priority, &request.model_group);
        // If this future is dropped before admission (caller-side timeout,
        // cancelled task), the queued entry must not linger: once it reached
        // the head it would block every later request in the group.
        let mut queued = QueueGuard {
            scheduler: &self.scheduler,
            request_id: &request_id,
            model_group: &request.model_group,
            admitted: false,
        };

        let interval = self.settings.polling_interval();
        loop {
            let healthy = self.healthy_deployment_ids(&request.model_group);
            if self
                .scheduler
                .poll(&request_id, &request.model_group, &healthy)
            {
                queued.admitted = true;
                break;
            }
            if Instant::now() >= deadline {
                drop(queued);
                let error = RouterError::NoCapacity {
                    model_group: request.model_group.clone(),
                };
                self.events.emit(RouterEvent::RequestFailed {
                    request_id,
                    deployment_id: None,
                    error_class: error.class(),
                });
                return Err(RouterFailure::new(error, Vec::new()));
            }
            tokio::time::sleep(interval).await;
        }

        self.run_admitted(&request, &request_id, deadline, operation)
            .await
    }

    /// Retry/fallback state machine for an admitted request.
    async fn run_admitted<T, F, Fut>(
        &self,
        request: &SubmitRequest,
        request_id: &str,
        deadline: Instant,
        operation: F,
    ) -> Result<T, RouterFailure>
    where
        F: Fn(Arc<Deployment>) -> Fut,
        Fut: Future<Output = Result<(T, u64), AttemptError>>,
    {
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_error: Option<RouterError> = None;

        let chain = self.group_chain(&request.model_group);
        let max_attempts = self.settings.retry_budget + 1;

        'groups: for (group_idx, group) in chain.iter().enumerate() {
            if group_idx > 0 {
                tracing::info!(
                    request_id = %request_id,
                    from = %request.model_group,
                    to = %group,
                    "retry budget exhausted, falling back"
                );
            }

            for attempt in 0..max_attempts {
                if Instant::now() >= deadline {
                    break 'groups;
                }

                // SELECT
                let deployment = match self.select_deployment(
                    group,
                    request.tags.as_deref(),
                    request.deployment_override.as_deref(),
                ) {
                    Ok(deployment) => deployment,
                    Err(error) => {
                        // Empty candidate set: retrying in this group cannot
                        // help, and filters are never widened.
                        let first_failure = attempts.is_empty();
                        self.record_attempt_failure(
                            &mut attempts,
                            request_id,
                            group,
                            None,
                            &error,
                        );
                        if first_failure {
                            return Err(RouterFailure::new(error, attempts));
                        }
                        // A concrete failure emptied the set (the last
                        // deployment just cooled down); that failure stays
                        // the surfaced error and the chain moves on.
                        if last_error.is_none() {
                            last_error = Some(error);
                        }
                        continue 'groups;
                    }
                };

                self.events.emit(RouterEvent::RequestAdmitted {
                    request_id: request_id.to_string(),
                    deployment_id: deployment.id.clone(),
                });

                // GATE
                let table = self.table.load_full();
                let remaining = deadline.saturating_duration_since(Instant::now());
                let gate_timeout = self.settings.gate_timeout().min(remaining);
                let permit = match table
                    .gate
                    .acquire(&deployment.id, gate_timeout, request.max_parallel_override)
                    .await
                {
                    Ok(permit) => permit,
                    Err(error) => {
                        // A permit timeout is an attempt failure without
                        // contacting the provider. It cools the deployment
                        // down unless the caller's own override gated it.
                        if request.max_parallel_override != Some(0) {
                            self.put_in_cooldown(
                                &deployment,
                                self.settings.cooldown(),
                                CooldownReason::Timeout,
                            );
                        }
                        self.record_attempt_failure(
                            &mut attempts,
                            request_id,
                            group,
                            Some(&deployment.id),
                            &error,
                        );
                        last_error = Some(error);
                        continue;
                    }
                };

                // ATTEMPT
                deployment.usage.active_requests.fetch_add(1, Relaxed);
                let started = Instant::now();
                let result = operation(Arc::clone(&deployment)).await;
                let latency_us = started.elapsed().as_micros() as u64;
                deployment.usage.active_requests.fetch_sub(1, Relaxed);
                drop(permit);

                match result {
                    Ok((value, tokens)) => {
                        deployment.usage.record_success(tokens, latency_us);
                        tracing::debug!(
                            request_id = %request_id,
                            deployment_id = %deployment.id,
                            attempt = attempt + 1,
                            latency_us,
                            "request served"
                        );
                        return Ok(value);
                    }
                    Err(AttemptError::Validation { message }) => {
                        // A caller bug: retrying wastes quota and cooling
                        // down punishes a healthy deployment.
                        let error = RouterError::Validation { message };
                        self.record_attempt_failure(
                            &mut attempts,
                            request_id,
                            group,
                            Some(&deployment.id),
                            &error,
                        );
                        return Err(RouterFailure::new(error, attempts));
                    }
                    Err(attempt_error) => {
                        deployment.usage.record_failure();
                        let (error, duration, reason) =
                            classify_availability(&deployment.id, attempt_error, &self.settings);
                        self.put_in_cooldown(&deployment, duration, reason);
                        self.record_attempt_failure(
                            &mut attempts,
                            request_id,
                            group,
                            Some(&deployment.id),
                            &error,
                        );
                        last_error = Some(error);
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| RouterError::NoEligibleDeployment {
            model_group: request.model_group.clone(),
        });
        Err(RouterFailure::new(error, attempts))
    }

    /// Primary group followed by its configured fallback chain.
    fn group_chain(&self, model_group: &str) -> Vec<String> {
        let mut chain = vec![model_group.to_string()];
        if let Some(fallbacks) = self.settings.fallbacks.get(model_group) {
            chain.extend(fallbacks.iter().cloned());
        }
        chain
    }

    /// Insert or refresh a cooldown entry and notify the event sink.
    pub(crate) fn put_in_cooldown(
        &self,
        deployment: &Deployment,
        duration: Duration,
        reason: CooldownReason,
    ) {
        self.cooldown.put_in_cooldown(&deployment.id, duration);
        self.events.emit(RouterEvent::DeploymentCooldown {
            deployment_id: deployment.id.clone(),
            model_group: deployment.model_group.clone(),
            provider: deployment.provider.clone(),
            api_base: deployment.api_base.clone(),
            reason,
        });
    }

    fn record_attempt_failure(
        &self,
        attempts: &mut Vec<AttemptRecord>,
        request_id: &str,
        model_group: &str,
        deployment_id: Option<&str>,
        error: &RouterError,
    ) {
        attempts.push(AttemptRecord {
            model_group: model_group.to_string(),
            deployment_id: deployment_id.map(str::to_string),
            class: error.class(),
            message: error.to_string(),
        });
        self.events.emit(RouterEvent::RequestFailed {
            request_id: request_id.to_string(),
            deployment_id: deployment_id.map(str::to_string),
            error_class: error.class(),
        });
    }
}

/// Removes a queued scheduler entry on drop unless the request was admitted.
struct QueueGuard<'a> {
    scheduler: &'a PriorityScheduler,
    request_id: &'a str,
    model_group: &'a str,
    admitted: bool,
}

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        if !self.admitted {
            self.scheduler.abandon(self.request_id, self.model_group);
        }
    }
}

/// Map an availability-class attempt failure to its router error, cooldown
/// duration, and cooldown reason. A provider retry-after hint overrides the
/// configured cooldown.
fn classify_availability(
    deployment_id: &str,
    error: AttemptError,
    settings: &RouterSettings,
) -> (RouterError, Duration, CooldownReason) {
    match error {
        AttemptError::Unavailable { message } => (
            RouterError::Availability {
                deployment: deployment_id.to_string(),
                message,
            },
            settings.cooldown(),
            CooldownReason::Unavailable,
        ),
        AttemptError::RateLimited {
            message,
            retry_after,
        } => {
            let duration = retry_after.unwrap_or_else(|| settings.cooldown());
            (
                RouterError::RateLimited {
                    deployment: deployment_id.to_string(),
                    message,
                    retry_after,
                },
                duration,
                CooldownReason::RateLimited,
            )
        }
        AttemptError::Timeout { .. } => (
            RouterError::Timeout {
                deployment: deployment_id.to_string(),
                stage: "call",
            },
            settings.cooldown(),
            CooldownReason::Timeout,
        ),
        // Validation is handled before classification.
        AttemptError::Validation { message } => (
            RouterError::Validation { message },
            Duration::ZERO,
            CooldownReason::Unavailable,
        ),
    }
}
