//! Deployment selection
//!
//! Filters a model group's deployments down to the eligible candidates and
//! hands the survivors to the configured routing strategy. Filtering is
//! strict: if tags or an explicit override empty the candidate set, the
//! request fails with `NoEligibleDeployment` — filters are never silently
//! widened.

use std::sync::Arc;

use crate::error::RouterError;
use crate::registry::{Deployment, DeploymentId};
use crate::router::Router;
use crate::strategy::SelectionContext;

impl Router {
    /// Select a deployment within a model group.
    ///
    /// Candidates are, in order of filtering:
    /// 1. deployments registered under `model_group`;
    /// 2. if `deployment_override` is set, exactly that deployment;
    /// 3. healthy (no active cooldown entry);
    /// 4. if `tags` were requested, a tag superset match.
    pub fn select_deployment(
        &self,
        model_group: &str,
        tags: Option<&[String]>,
        deployment_override: Option<&str>,
    ) -> Result<Arc<Deployment>, RouterError> {
        let table = self.table.load();
        let mut candidates = table.registry.deployments_for_group(model_group);

        if let Some(override_id) = deployment_override {
            candidates.retain(|d| d.id == override_id);
        }

        candidates.retain(|d| self.cooldown.is_healthy(&d.id));

        if let Some(requested) = tags {
            candidates.retain(|d| d.has_tags(requested));
        }

        if candidates.is_empty() {
            tracing::debug!(
                model_group = %model_group,
                tags = ?tags,
                deployment_override = deployment_override.unwrap_or(""),
                "no eligible deployment after filtering"
            );
            return Err(RouterError::NoEligibleDeployment {
                model_group: model_group.to_string(),
            });
        }

        let index = {
            let mut rng = self.rng.lock();
            let mut ctx = SelectionContext { rng: &mut rng };
            self.strategy.select(&candidates, &mut ctx)
        };

        let selected = Arc::clone(&candidates[index]);
        tracing::debug!(
            model_group = %model_group,
            deployment_id = %selected.id,
            strategy = self.strategy.name(),
            candidates = candidates.len(),
            "selected deployment"
        );
        Ok(selected)
    }

    /// Ids of the group's deployments with no active cooldown entry.
    ///
    /// Feeds the scheduler's advisory candidate argument during admission
    /// polling.
    pub fn healthy_deployment_ids(&self, model_group: &str) -> Vec<DeploymentId> {
        let table = self.table.load();
        table
            .registry
            .deployments_for_group(model_group)
            .into_iter()
            .filter(|d| self.cooldown.is_healthy(&d.id))
            .map(|d| d.id.clone())
            .collect()
    }
}
