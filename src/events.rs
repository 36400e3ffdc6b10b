//! Structured events emitted by the routing core
//!
//! The router reports cooldown insertions, admissions, and failures to an
//! [`EventSink`]. Sinks are notifications only: metrics collectors, alerting,
//! and usage logs live outside this crate, and nothing in the routing path
//! depends on what a sink does with an event.

use std::sync::Arc;

use crate::error::{CooldownReason, ErrorClass};

/// Events emitted by the router for external consumers.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    /// A deployment entered (or refreshed) cooldown
    DeploymentCooldown {
        deployment_id: String,
        model_group: String,
        provider: String,
        api_base: Option<String>,
        reason: CooldownReason,
    },
    /// A queued request was admitted and bound to a deployment
    RequestAdmitted {
        request_id: String,
        deployment_id: String,
    },
    /// An attempt (or the whole request) failed
    RequestFailed {
        request_id: String,
        deployment_id: Option<String>,
        error_class: ErrorClass,
    },
}

/// Consumer of router events.
///
/// Implementations must be cheap and non-blocking; they run inline on the
/// request path.
pub trait EventSink: Send + Sync + std::fmt::Debug {
    fn emit(&self, event: RouterEvent);
}

/// Default sink that forwards events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: RouterEvent) {
        match event {
            RouterEvent::DeploymentCooldown {
                deployment_id,
                model_group,
                provider,
                api_base,
                reason,
            } => {
                tracing::warn!(
                    deployment_id = %deployment_id,
                    model_group = %model_group,
                    provider = %provider,
                    api_base = api_base.as_deref().unwrap_or(""),
                    reason = %reason,
                    "deployment placed in cooldown"
                );
            }
            RouterEvent::RequestAdmitted {
                request_id,
                deployment_id,
            } => {
                tracing::debug!(
                    request_id = %request_id,
                    deployment_id = %deployment_id,
                    "request admitted"
                );
            }
            RouterEvent::RequestFailed {
                request_id,
                deployment_id,
                error_class,
            } => {
                tracing::warn!(
                    request_id = %request_id,
                    deployment_id = deployment_id.as_deref().unwrap_or(""),
                    error_class = %error_class,
                    "request attempt failed"
                );
            }
        }
    }
}

/// Shared handle to an event sink.
pub type SharedEventSink = Arc<dyn EventSink>;
