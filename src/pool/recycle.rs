//! Recycling strategies (design §4.C "Recycling strategies"). Each strategy
//! answers "should this instance be recycled", and for the hybrid strategy,
//! "how urgently" via a score so the pool can pick the worst offender.

use super::instance::BrowserInstance;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub struct RecycleThresholds {
    pub max_lifetime_ms: i64,
    pub max_idle_time_ms: i64,
    pub max_uses: u64,
    pub soft_page_limit: usize,
    pub health_score_threshold: f64,
    pub error_rate_threshold: f64,
    pub memory_mb_threshold: f64,
    pub cpu_percent_threshold: f64,
}

impl Default for RecycleThresholds {
    fn default() -> Self {
        Self {
            max_lifetime_ms: 3_600_000,
            max_idle_time_ms: 300_000,
            max_uses: 1000,
            soft_page_limit: 20,
            health_score_threshold: 0.5,
            error_rate_threshold: 0.2,
            memory_mb_threshold: 1024.0,
            cpu_percent_threshold: 90.0,
        }
    }
}

/// Non-normative per the open-question decision: documented defaults, but
/// callers may override them via config.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HybridWeights {
    pub time: f64,
    pub usage: f64,
    pub health: f64,
    pub resource: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            time: 0.25,
            usage: 0.25,
            health: 0.3,
            resource: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum RecycleStrategy {
    Time,
    Usage,
    Health,
    Resource,
    Hybrid(HybridWeights),
}

fn error_rate(instance: &BrowserInstance) -> f64 {
    if instance.use_count == 0 {
        0.0
    } else {
        instance.error_count as f64 / instance.use_count as f64
    }
}

fn time_score(instance: &BrowserInstance, t: &RecycleThresholds) -> f64 {
    let age_ratio = instance.age().num_milliseconds() as f64 / t.max_lifetime_ms as f64;
    let idle_ratio = instance.idle_time().num_milliseconds() as f64 / t.max_idle_time_ms as f64;
    age_ratio.max(idle_ratio).min(2.0)
}

fn usage_score(instance: &BrowserInstance, t: &RecycleThresholds) -> f64 {
    let use_ratio = instance.use_count as f64 / t.max_uses as f64;
    let page_ratio = instance.page_count as f64 / t.soft_page_limit as f64;
    use_ratio.max(page_ratio).min(2.0)
}

fn health_score_component(instance: &BrowserInstance, t: &RecycleThresholds) -> f64 {
    let health_deficit = (t.health_score_threshold - instance.health_score).max(0.0)
        / t.health_score_threshold.max(f64::EPSILON);
    let error_excess = (error_rate(instance) - t.error_rate_threshold).max(0.0);
    health_deficit.max(error_excess).min(2.0)
}

/// memory/cpu aren't tracked per-instance in this crate's pool state
/// (they come from the driver's health probe, sampled separately), so the
/// resource component here reflects only what the instance struct carries.
fn resource_score(_instance: &BrowserInstance, _t: &RecycleThresholds) -> f64 {
    0.0
}

pub fn should_recycle(
    instance: &BrowserInstance,
    strategy: RecycleStrategy,
    t: &RecycleThresholds,
) -> bool {
    match strategy {
        RecycleStrategy::Time => {
            instance.age().num_milliseconds() > t.max_lifetime_ms
                || instance.idle_time().num_milliseconds() > t.max_idle_time_ms
        }
        RecycleStrategy::Usage => {
            instance.use_count > t.max_uses || instance.page_count > t.soft_page_limit
        }
        RecycleStrategy::Health => {
            instance.health_score < t.health_score_threshold
                || error_rate(instance) > t.error_rate_threshold
        }
        RecycleStrategy::Resource => false,
        RecycleStrategy::Hybrid(weights) => hybrid_score(instance, weights, t) >= 1.0,
    }
}

pub fn hybrid_score(instance: &BrowserInstance, weights: HybridWeights, t: &RecycleThresholds) -> f64 {
    weights.time * time_score(instance, t)
        + weights.usage * usage_score(instance, t)
        + weights.health * health_score_component(instance, t)
        + weights.resource * resource_score(instance, t)
}

/// Picks the worst offender among candidates for hybrid recycling
/// (design: "instance with the highest score above the recycle cutoff").
pub fn worst_offender<'a>(
    instances: impl Iterator<Item = &'a BrowserInstance>,
    weights: HybridWeights,
    t: &RecycleThresholds,
) -> Option<(&'a BrowserInstance, f64)> {
    instances
        .map(|i| (i, hybrid_score(i, weights, t)))
        .filter(|(_, score)| *score >= 1.0)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::instance::BrowserInstance;

    #[test]
    fn usage_strategy_flags_over_use_count() {
        let mut instance = BrowserInstance::starting("b1".into());
        instance.use_count = 2000;
        let t = RecycleThresholds::default();
        assert!(should_recycle(&instance, RecycleStrategy::Usage, &t));
    }

    #[test]
    fn health_strategy_flags_low_score() {
        let mut instance = BrowserInstance::starting("b1".into());
        instance.health_score = 0.1;
        let t = RecycleThresholds::default();
        assert!(should_recycle(&instance, RecycleStrategy::Health, &t));
    }

    #[test]
    fn healthy_fresh_instance_is_not_recycled_under_any_strategy() {
        let instance = BrowserInstance::starting("b1".into());
        let t = RecycleThresholds::default();
        for strategy in [
            RecycleStrategy::Time,
            RecycleStrategy::Usage,
            RecycleStrategy::Health,
            RecycleStrategy::Hybrid(HybridWeights::default()),
        ] {
            assert!(!should_recycle(&instance, strategy, &t));
        }
    }
}
