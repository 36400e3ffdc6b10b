//! Error types for the routing core
//!
//! This module defines the error taxonomy used across the router:
//! validation failures, availability failures, throttling, empty candidate
//! sets, and deadline expiry. Only the orchestrator in `router.rs` decides
//! whether an error leads to a retry, a fallback, or a terminal failure;
//! every other component just reports facts.

use std::time::Duration;

/// Coarse error classification used for events and attempt history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed caller request. Never retried, never cools a deployment down.
    Validation,
    /// Deployment unreachable or overloaded. Retried, cools down.
    Availability,
    /// Provider throttling signal. Availability-class, may carry a
    /// provider-suggested cooldown override.
    RateLimited,
    /// Gate or call deadline exceeded. Availability-class.
    Timeout,
    /// Candidate set empty after filtering. Retry cannot help.
    NoEligibleDeployment,
    /// The submit deadline elapsed before the request was admitted.
    Capacity,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorClass::Validation => "validation",
            ErrorClass::Availability => "availability",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::Timeout => "timeout",
            ErrorClass::NoEligibleDeployment => "no_eligible_deployment",
            ErrorClass::Capacity => "capacity",
        };
        f.write_str(s)
    }
}

/// Cooldown trigger reason, attached to cooldown events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownReason {
    /// Provider unreachable, 5xx, or outage
    Unavailable,
    /// Provider throttling (429)
    RateLimited,
    /// Gate or call deadline exceeded
    Timeout,
}

impl std::fmt::Display for CooldownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CooldownReason::Unavailable => "unavailable",
            CooldownReason::RateLimited => "rate_limited",
            CooldownReason::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Router error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouterError {
    /// Malformed caller request
    #[error("invalid request: {message}")]
    Validation { message: String },

    /// Deployment unreachable or overloaded
    #[error("deployment '{deployment}' unavailable: {message}")]
    Availability { deployment: String, message: String },

    /// Provider throttling signal
    #[error("deployment '{deployment}' throttled: {message}")]
    RateLimited {
        deployment: String,
        message: String,
        /// Provider-suggested cooldown override (e.g. from a Retry-After header)
        retry_after: Option<Duration>,
    },

    /// No deployment survived filtering for the model group
    #[error("no eligible deployment for model group '{model_group}'")]
    NoEligibleDeployment { model_group: String },

    /// Gate acquisition or provider call exceeded its deadline
    #[error("timed out waiting for {stage} on deployment '{deployment}'")]
    Timeout {
        deployment: String,
        /// Which stage timed out: "permit" or "call"
        stage: &'static str,
    },

    /// The submit deadline elapsed before the request left the queue
    #[error("no capacity for model group '{model_group}' within the submit deadline")]
    NoCapacity { model_group: String },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl RouterError {
    /// Classify this error for events and attempt history.
    pub fn class(&self) -> ErrorClass {
        match self {
            RouterError::Validation { .. } => ErrorClass::Validation,
            RouterError::Availability { .. } => ErrorClass::Availability,
            RouterError::RateLimited { .. } => ErrorClass::RateLimited,
            RouterError::NoEligibleDeployment { .. } => ErrorClass::NoEligibleDeployment,
            RouterError::Timeout { .. } => ErrorClass::Timeout,
            RouterError::NoCapacity { .. } => ErrorClass::Capacity,
            RouterError::Config(_) => ErrorClass::Validation,
        }
    }

    /// Whether the orchestrator may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Availability | ErrorClass::RateLimited | ErrorClass::Timeout
        )
    }
}

/// Failure reported by the caller-supplied attempt operation.
///
/// The provider translation layer is an external collaborator; it reports
/// what went wrong through this type and the orchestrator decides what to do
/// about it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AttemptError {
    /// The request itself is malformed; retrying cannot fix a caller bug
    #[error("invalid request: {message}")]
    Validation { message: String },

    /// Provider unreachable, 5xx, or outage
    #[error("provider unavailable: {message}")]
    Unavailable { message: String },

    /// Provider throttling signal
    #[error("provider throttled: {message}")]
    RateLimited {
        message: String,
        /// Provider-suggested retry-after hint
        retry_after: Option<Duration>,
    },

    /// The outbound call exceeded its deadline
    #[error("provider call timed out: {message}")]
    Timeout { message: String },
}

/// One attempted dispatch, recorded for diagnosis.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub model_group: String,
    pub deployment_id: Option<String>,
    pub class: ErrorClass,
    pub message: String,
}

/// Terminal failure of a submitted request.
///
/// Surfaces the most recent concrete error; `Display` and `source` delegate
/// to it. The full retry/fallback history rides along for diagnosis.
#[derive(Debug)]
pub struct RouterFailure {
    /// The most recent concrete error
    pub error: RouterError,
    /// Every failed attempt, in order, across retries and fallbacks
    pub attempts: Vec<AttemptRecord>,
}

impl RouterFailure {
    pub(crate) fn new(error: RouterError, attempts: Vec<AttemptRecord>) -> Self {
        Self { error, attempts }
    }

    /// Classification of the surfaced error.
    pub fn class(&self) -> ErrorClass {
        self.error.class()
    }
}

impl std::fmt::Display for RouterFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for RouterFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
