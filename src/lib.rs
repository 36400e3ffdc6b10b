//! # llm-router
//!
//! Request routing and admission control core for a multi-provider LLM
//! gateway. Given many concrete backend deployments registered under logical
//! model groups, the router decides which deployment serves each completion
//! request, whether the system currently has capacity to serve it at all,
//! and how to recover when a deployment fails.
//!
//! ## Features
//!
//! - **Priority scheduling**: one ordered queue per model group, strict
//!   `(priority, enqueue_sequence)` admission order, groups fully independent
//! - **Concurrency gating**: per-deployment permit pools derived from rate
//!   limits, zero permit leaks on any exit path
//! - **Cooldown**: time-windowed exclusion of failing deployments with lazy
//!   read-time expiry
//! - **Pluggable strategies**: simple-shuffle, usage-based, and
//!   latency-based selection behind one trait
//! - **Retry and fallback**: availability failures retry within a budget,
//!   then walk the group's fallback chain; validation failures propagate
//!   immediately
//!
//! The HTTP surface, provider request/response translation, pricing, and
//! usage-log persistence are external collaborators: the router takes the
//! provider call as a closure and emits structured [`events`] for the rest.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use llm_router::{Router, RouterConfig, SubmitRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RouterConfig::from_yaml_file("config/router.yaml")?;
//!     let router = Router::from_config(config)?;
//!
//!     let response: serde_json::Value = router
//!         .submit(SubmitRequest::new("gpt-4").with_priority(1), |deployment| async move {
//!             // provider translation layer goes here
//!             let body = serde_json::json!({ "model": deployment.model });
//!             Ok((body, 42))
//!         })
//!         .await?;
//!
//!     println!("{response}");
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod cooldown;
pub mod error;
pub mod events;
pub mod gate;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod selection;
pub mod strategy;

#[cfg(test)]
mod tests;

pub use config::{DeploymentDescriptor, RouterConfig, RouterSettings, StrategyKind};
pub use cooldown::CooldownTracker;
pub use error::{
    AttemptError, AttemptRecord, CooldownReason, ErrorClass, RouterError, RouterFailure,
};
pub use events::{EventSink, RouterEvent, SharedEventSink, TracingSink};
pub use gate::{effective_max_parallel_requests, ConcurrencyGate, ConcurrencyPermit};
pub use registry::{Deployment, DeploymentId, DeploymentRegistry, RateLimits};
pub use router::{Router, SubmitRequest};
pub use scheduler::{PriorityScheduler, QueueEntry};
pub use strategy::{
    LatencyBased, RoutingStrategy, SelectionContext, SimpleShuffle, UsageBased,
};
