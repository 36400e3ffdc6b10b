//! Router configuration
//!
//! Configuration is loaded once from YAML (or built in code) and turned into
//! an immutable registry snapshot. Hot-patching goes through
//! `Router::replace_registry` with a full new deployment list; there are no
//! partial updates.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RouterError;
use crate::registry::RateLimits;

/// Which routing strategy the selector uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Uniform random pick, guarding against herd effects
    #[default]
    SimpleShuffle,
    /// Weighted toward deployments with the most rate-limit headroom
    UsageBased,
    /// Weighted toward deployments with the lowest rolling average latency
    LatencyBased,
}

/// One configured deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentDescriptor {
    /// Unique deployment id
    pub id: String,
    /// Logical model group this deployment serves
    pub model_group: String,
    /// Underlying provider/model identifier
    pub model: String,
    /// Provider name
    pub provider: String,
    /// Provider endpoint
    #[serde(default)]
    pub api_base: Option<String>,
    /// Rate limits; also size the concurrency gate
    #[serde(default)]
    pub rate_limits: RateLimits,
    /// Tags for request filtering
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Global router settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Routing strategy (default: simple-shuffle)
    #[serde(default)]
    pub routing: StrategyKind,

    /// Retries per model group after the first attempt (default: 2)
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Cooldown duration in seconds after an availability failure
    /// (default: 30)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Permit pool size for deployments with no explicit or derivable limit
    /// (default: none, i.e. unlimited)
    #[serde(default)]
    pub default_max_parallel_requests: Option<u32>,

    /// Interval between admission polls in milliseconds (default: 3)
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,

    /// Maximum wait for a concurrency permit in seconds (default: 10)
    #[serde(default = "default_gate_timeout_secs")]
    pub gate_timeout_secs: u64,

    /// Default submit deadline in seconds when the caller sets none
    /// (default: 60)
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Fallback chains: model group -> ordered alternate groups tried after
    /// the group's retry budget is exhausted
    #[serde(default)]
    pub fallbacks: HashMap<String, Vec<String>>,

    /// RNG seed for routing strategies; fixed seeds make selection
    /// reproducible
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_retry_budget() -> u32 {
    2
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_polling_interval_ms() -> u64 {
    3
}

fn default_gate_timeout_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            routing: StrategyKind::default(),
            retry_budget: default_retry_budget(),
            cooldown_secs: default_cooldown_secs(),
            default_max_parallel_requests: None,
            polling_interval_ms: default_polling_interval_ms(),
            gate_timeout_secs: default_gate_timeout_secs(),
            default_timeout_secs: default_timeout_secs(),
            fallbacks: HashMap::new(),
            seed: None,
        }
    }
}

impl RouterSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn gate_timeout(&self) -> Duration {
        Duration::from_secs(self.gate_timeout_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// Complete router configuration: settings plus the ordered deployment list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub settings: RouterSettings,

    #[serde(default)]
    pub deployments: Vec<DeploymentDescriptor>,
}

impl RouterConfig {
    /// Parse a configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RouterError> {
        let config: RouterConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RouterError::Config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RouterError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading router configuration");
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RouterError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&raw)
    }

    /// Validate the configuration.
    ///
    /// Checks for duplicate deployment ids, empty identifiers, and fallback
    /// chains that reference unknown groups or loop back to their own group.
    pub fn validate(&self) -> Result<(), RouterError> {
        let mut seen_ids = std::collections::HashSet::new();
        let mut groups = std::collections::HashSet::new();

        for desc in &self.deployments {
            if desc.id.is_empty() {
                return Err(RouterError::Config("deployment id must not be empty".into()));
            }
            if desc.model_group.is_empty() {
                return Err(RouterError::Config(format!(
                    "deployment '{}' has an empty model group",
                    desc.id
                )));
            }
            if !seen_ids.insert(desc.id.as_str()) {
                return Err(RouterError::Config(format!(
                    "duplicate deployment id '{}'",
                    desc.id
                )));
            }
            groups.insert(desc.model_group.as_str());
        }

        for (group, chain) in &self.settings.fallbacks {
            for target in chain {
                if target == group {
                    return Err(RouterError::Config(format!(
                        "fallback chain for '{}' references itself",
                        group
                    )));
                }
                if !groups.contains(target.as_str()) {
                    return Err(RouterError::Config(format!(
                        "fallback chain for '{}' references unknown group '{}'",
                        group, target
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
settings:
  routing: latency-based
  retry_budget: 1
  cooldown_secs: 15
  fallbacks:
    gpt-4: [gpt-4-mini]
deployments:
  - id: gpt4-azure
    model_group: gpt-4
    model: azure/gpt-4-turbo
    provider: azure
    api_base: https://eu.example.azure.com
    rate_limits:
      rpm: 60
      max_parallel_requests: 8
    tags: [paid, eu]
  - id: mini-oai
    model_group: gpt-4-mini
    model: gpt-4o-mini
    provider: openai
"#;

    #[test]
    fn parses_yaml() {
        let config = RouterConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.settings.routing, StrategyKind::LatencyBased);
        assert_eq!(config.settings.retry_budget, 1);
        assert_eq!(config.deployments.len(), 2);
        assert_eq!(config.deployments[0].rate_limits.max_parallel_requests, Some(8));
        assert_eq!(config.deployments[0].tags, vec!["paid", "eu"]);
        assert_eq!(config.settings.fallbacks["gpt-4"], vec!["gpt-4-mini"]);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let yaml = r#"
deployments:
  - { id: a, model_group: g, model: m, provider: p }
  - { id: a, model_group: g, model: m, provider: p }
"#;
        assert!(matches!(
            RouterConfig::from_yaml_str(yaml),
            Err(RouterError::Config(_))
        ));
    }

    #[test]
    fn rejects_unknown_fallback_target() {
        let yaml = r#"
settings:
  fallbacks:
    g: [nowhere]
deployments:
  - { id: a, model_group: g, model: m, provider: p }
"#;
        assert!(matches!(
            RouterConfig::from_yaml_str(yaml),
            Err(RouterError::Config(_))
        ));
    }

    #[test]
    fn rejects_self_referencing_fallback() {
        let yaml = r#"
settings:
  fallbacks:
    g: [g]
deployments:
  - { id: a, model_group: g, model: m, provider: p }
"#;
        assert!(matches!(
            RouterConfig::from_yaml_str(yaml),
            Err(RouterError::Config(_))
        ));
    }
}
