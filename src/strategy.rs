//! Routing strategies
//!
//! A [`RoutingStrategy`] picks one deployment out of a nonempty, already
//! filtered candidate list. New strategies implement the trait; the selector
//! never branches on strategy names. Every strategy draws randomness from
//! the context's seeded RNG, so selection is deterministic given identical
//! usage state and seed.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use crate::config::StrategyKind;
use crate::registry::Deployment;

/// Mutable context threaded through a selection call.
pub struct SelectionContext<'a> {
    /// Seeded RNG shared by all strategies on one router
    pub rng: &'a mut StdRng,
}

/// Pluggable deployment selection.
///
/// `candidates` is guaranteed nonempty; implementations return an index into
/// it.
pub trait RoutingStrategy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn select(&self, candidates: &[Arc<Deployment>], ctx: &mut SelectionContext<'_>) -> usize;
}

impl StrategyKind {
    /// Instantiate the strategy this kind names.
    pub fn build(self) -> Arc<dyn RoutingStrategy> {
        match self {
            StrategyKind::SimpleShuffle => Arc::new(SimpleShuffle),
            StrategyKind::UsageBased => Arc::new(UsageBased),
            StrategyKind::LatencyBased => Arc::new(LatencyBased),
        }
    }
}

/// Uniform random pick.
///
/// Unweighted selection guards against herd effects of deterministic
/// ordering when many routers share the same deployment list.
#[derive(Debug, Default)]
pub struct SimpleShuffle;

impl RoutingStrategy for SimpleShuffle {
    fn name(&self) -> &'static str {
        "simple-shuffle"
    }

    fn select(&self, candidates: &[Arc<Deployment>], ctx: &mut SelectionContext<'_>) -> usize {
        if candidates.len() == 1 {
            return 0;
        }
        ctx.rng.gen_range(0..candidates.len())
    }
}

/// Weighted random pick favoring lightly used deployments.
///
/// Each candidate is weighted by its rate-limit headroom in the trailing
/// window: `100 - utilization_pct`, floored at 1 so saturated deployments
/// keep a nonzero chance once they pass filtering. Unlimited deployments
/// count as idle.
#[derive(Debug, Default)]
pub struct UsageBased;

impl RoutingStrategy for UsageBased {
    fn name(&self) -> &'static str {
        "usage-based"
    }

    fn select(&self, candidates: &[Arc<Deployment>], ctx: &mut SelectionContext<'_>) -> usize {
        if candidates.len() == 1 {
            return 0;
        }

        let weights: Vec<u64> = candidates
            .iter()
            .map(|d| {
                let used = d.usage.utilization_pct(&d.rate_limits).min(100);
                (100 - used).max(1)
            })
            .collect();

        weighted_pick(&weights, ctx.rng)
    }
}

/// Pick the deployment with the lowest rolling average latency.
///
/// Averages the last `LATENCY_WINDOW` observed latencies per deployment.
/// Deployments with no samples yet assume the fleet average so they still
/// get traffic. Ties are broken randomly.
#[derive(Debug, Default)]
pub struct LatencyBased;

impl RoutingStrategy for LatencyBased {
    fn name(&self) -> &'static str {
        "latency-based"
    }

    fn select(&self, candidates: &[Arc<Deployment>], ctx: &mut SelectionContext<'_>) -> usize {
        if candidates.len() == 1 {
            return 0;
        }

        let measured: Vec<u64> = candidates
            .iter()
            .filter_map(|d| d.usage.avg_latency_us())
            .collect();
        let fleet_avg = if measured.is_empty() {
            0
        } else {
            measured.iter().sum::<u64>() / measured.len() as u64
        };

        let latencies: Vec<u64> = candidates
            .iter()
            .map(|d| d.usage.avg_latency_us().unwrap_or(fleet_avg))
            .collect();

        let best = match latencies.iter().min() {
            Some(best) => *best,
            None => return 0,
        };
        let tied: Vec<usize> = latencies
            .iter()
            .enumerate()
            .filter(|(_, lat)| **lat == best)
            .map(|(i, _)| i)
            .collect();

        if tied.len() == 1 {
            tied[0]
        } else {
            tied[ctx.rng.gen_range(0..tied.len())]
        }
    }
}

/// Pick an index with probability proportional to its weight.
///
/// Weights sum to at least 1 (callers floor each weight at 1).
fn weighted_pick(weights: &[u64], rng: &mut StdRng) -> usize {
    let total: u64 = weights.iter().sum();
    let mut point = rng.gen_range(0..total);
    for (i, weight) in weights.iter().enumerate() {
        if point < *weight {
            return i;
        }
        point -= weight;
    }
    weights.len() - 1
}
