//! Vision-model cost accounting.
//!
//! Every completed visual-tier call is priced and appended as a
//! [`CostEntry`]; summaries are recomputed from the full list on demand so
//! correctness never depends on update ordering.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-1,000-token / per-image pricing for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_token_price: f64,
    pub output_token_price: f64,
    pub image_price: f64,
}

impl Pricing {
    pub const fn new(input_token_price: f64, output_token_price: f64, image_price: f64) -> Self {
        Self {
            input_token_price,
            output_token_price,
            image_price,
        }
    }

    pub const ZERO: Pricing = Pricing::new(0.0, 0.0, 0.0);
}

/// Built-in table; overridable per provider via [`CostTracker::set_pricing`].
fn builtin_pricing(provider: &str) -> Pricing {
    match provider {
        "anthropic" => Pricing::new(0.003, 0.015, 0.0048),
        "openai" => Pricing::new(0.0025, 0.01, 0.003825),
        "agent" => Pricing::ZERO,
        _ => Pricing::ZERO,
    }
}

/// Raw usage reported by a completed provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostUsage {
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub images: u64,
    /// What the call was for, e.g. "find_element" or "get_next_action".
    pub operation: String,
}

/// A priced, append-only accounting record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub images: u64,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_cost: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_images: u64,
    pub calls: usize,
    pub by_provider: HashMap<String, f64>,
    pub by_operation: HashMap<String, f64>,
}

#[derive(Debug, Default)]
pub struct CostTracker {
    entries: Vec<CostEntry>,
    overrides: HashMap<String, Pricing>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the pricing table for one provider.
    pub fn set_pricing(&mut self, provider: impl Into<String>, pricing: Pricing) {
        self.overrides.insert(provider.into(), pricing);
    }

    fn pricing_for(&self, provider: &str) -> Pricing {
        self.overrides
            .get(provider)
            .copied()
            .unwrap_or_else(|| builtin_pricing(provider))
    }

    /// Price the usage without recording it. Pre-flight checks use this.
    pub fn estimate(&self, usage: &CostUsage) -> f64 {
        let p = self.pricing_for(&usage.provider);
        (usage.input_tokens as f64 / 1000.0) * p.input_token_price
            + (usage.output_tokens as f64 / 1000.0) * p.output_token_price
            + usage.images as f64 * p.image_price
    }

    /// Price the usage, append it, and return the recorded entry.
    pub fn track(&mut self, usage: CostUsage) -> CostEntry {
        let cost = self.estimate(&usage);
        let entry = CostEntry {
            provider: usage.provider,
            model: usage.model,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            images: usage.images,
            cost,
            timestamp: Utc::now(),
            operation: usage.operation,
        };
        tracing::debug!(
            provider = %entry.provider,
            operation = %entry.operation,
            cost = entry.cost,
            "vision call priced"
        );
        self.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> &[CostEntry] {
        &self.entries
    }

    /// Recomputes aggregates from the full entry list on every call.
    pub fn summary(&self) -> CostSummary {
        let mut summary = CostSummary {
            calls: self.entries.len(),
            ..CostSummary::default()
        };
        for entry in &self.entries {
            summary.total_cost += entry.cost;
            summary.total_input_tokens += entry.input_tokens;
            summary.total_output_tokens += entry.output_tokens;
            summary.total_images += entry.images;
            *summary.by_provider.entry(entry.provider.clone()).or_default() += entry.cost;
            *summary
                .by_operation
                .entry(entry.operation.clone())
                .or_default() += entry.cost;
        }
        summary
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(provider: &str, input: u64, output: u64, images: u64) -> CostUsage {
        CostUsage {
            provider: provider.to_string(),
            model: "test-model".to_string(),
            input_tokens: input,
            output_tokens: output,
            images,
            operation: "find_element".to_string(),
        }
    }

    #[test]
    fn anthropic_pricing_matches_table() {
        let mut tracker = CostTracker::new();
        let entry = tracker.track(usage("anthropic", 1000, 500, 1));
        // 1 * 0.003 + 0.5 * 0.015 + 1 * 0.0048
        assert!((entry.cost - 0.0153).abs() < 1e-9);
    }

    #[test]
    fn summary_is_additive_regardless_of_order() {
        let mut a = CostTracker::new();
        let mut b = CostTracker::new();
        let usages = vec![
            usage("anthropic", 1000, 500, 1),
            usage("openai", 2000, 100, 2),
            usage("agent", 5000, 5000, 3),
        ];
        let mut expected = 0.0;
        for u in &usages {
            expected += a.estimate(u);
        }
        for u in usages.iter() {
            a.track(u.clone());
        }
        for u in usages.iter().rev() {
            b.track(u.clone());
        }
        assert!((a.summary().total_cost - expected).abs() < 1e-9);
        assert!((b.summary().total_cost - expected).abs() < 1e-9);
        assert_eq!(a.summary().calls, 3);
    }

    #[test]
    fn estimate_does_not_append() {
        let tracker = CostTracker::new();
        let est = tracker.estimate(&usage("anthropic", 1000, 0, 0));
        assert!((est - 0.003).abs() < 1e-9);
        assert!(tracker.entries().is_empty());
    }

    #[test]
    fn reset_clears_entries() {
        let mut tracker = CostTracker::new();
        tracker.track(usage("openai", 10, 10, 0));
        tracker.reset();
        assert_eq!(tracker.summary().calls, 0);
        assert_eq!(tracker.summary().total_cost, 0.0);
    }

    #[test]
    fn override_replaces_builtin_pricing() {
        let mut tracker = CostTracker::new();
        tracker.set_pricing("anthropic", Pricing::new(0.001, 0.001, 0.0));
        let entry = tracker.track(usage("anthropic", 1000, 1000, 5));
        assert!((entry.cost - 0.002).abs() < 1e-9);
    }

    #[test]
    fn unknown_provider_is_free() {
        let tracker = CostTracker::new();
        assert_eq!(tracker.estimate(&usage("mystery", 1000, 1000, 9)), 0.0);
    }
}
