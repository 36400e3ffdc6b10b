//! Test suite for the routing core
//!
//! Component tests live next to the pieces they exercise; this module holds
//! the shared fixtures: config builders and a collecting event sink.

mod scheduler_tests;
mod selection_tests;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{DeploymentDescriptor, RouterConfig, RouterSettings};
use crate::events::{EventSink, RouterEvent};
use crate::registry::RateLimits;
use crate::router::Router;

/// Event sink that records everything it sees.
#[derive(Debug, Default)]
pub(crate) struct CollectingSink {
    events: Mutex<Vec<RouterEvent>>,
}

impl CollectingSink {
    pub(crate) fn events(&self) -> Vec<RouterEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: RouterEvent) {
        self.events.lock().push(event);
    }
}

pub(crate) fn descriptor(id: &str, model_group: &str) -> DeploymentDescriptor {
    DeploymentDescriptor {
        id: id.to_string(),
        model_group: model_group.to_string(),
        model: format!("{}-model", id),
        provider: "openai".to_string(),
        api_base: None,
        rate_limits: RateLimits::default(),
        tags: Vec::new(),
    }
}

pub(crate) fn tagged(mut desc: DeploymentDescriptor, tags: &[&str]) -> DeploymentDescriptor {
    desc.tags = tags.iter().map(|t| t.to_string()).collect();
    desc
}

pub(crate) fn limited(mut desc: DeploymentDescriptor, limits: RateLimits) -> DeploymentDescriptor {
    desc.rate_limits = limits;
    desc
}

/// Router over the given deployments with a fixed seed and short timeouts.
pub(crate) fn test_router(deployments: Vec<DeploymentDescriptor>) -> Router {
    test_router_with(deployments, RouterSettings::default())
}

pub(crate) fn test_router_with(
    deployments: Vec<DeploymentDescriptor>,
    mut settings: RouterSettings,
) -> Router {
    settings.seed = settings.seed.or(Some(7));
    Router::from_config(RouterConfig {
        settings,
        deployments,
    })
    .expect("test config must be valid")
}

pub(crate) fn test_router_with_sink(
    deployments: Vec<DeploymentDescriptor>,
    settings: RouterSettings,
) -> (Router, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::default());
    let router = test_router_with(deployments, settings).with_event_sink(sink.clone());
    (router, sink)
}
