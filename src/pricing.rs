//! # Pricing Module
//!
//! Estimated API cost for a session's token usage.
//!
//! ## Pricing Structure
//!
//! Each model has rates, in USD per million tokens, for:
//! - Input tokens
//! - Output tokens
//! - Cache reads (typically 0.1x input price)
//! - Cache writes (typically 1.25x input price)
//!
//! The table is an immutable value. Overrides from the settings file produce a
//! new table rather than mutating a shared one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

impl ModelPricing {
    pub const fn new(input: f64, output: f64, cache_read: f64, cache_write: f64) -> Self {
        Self {
            input,
            output,
            cache_read,
            cache_write,
        }
    }
}

pub const DEFAULT_MODEL: &str = "claude-opus-4-5";

const BUILTIN_RATES: &[(&str, ModelPricing)] = &[
    // Current models
    ("claude-opus-4-5", ModelPricing::new(5.00, 25.00, 0.50, 6.25)),
    ("claude-sonnet-4-5", ModelPricing::new(3.00, 15.00, 0.30, 3.75)),
    ("claude-haiku-4-5", ModelPricing::new(1.00, 5.00, 0.10, 1.25)),
    // Legacy
    ("claude-opus-4-1", ModelPricing::new(15.00, 75.00, 1.50, 18.75)),
    ("claude-sonnet-4", ModelPricing::new(3.00, 15.00, 0.30, 3.75)),
    ("claude-opus-4", ModelPricing::new(15.00, 75.00, 1.50, 18.75)),
    ("claude-3-5-sonnet", ModelPricing::new(3.00, 15.00, 0.30, 3.75)),
    ("claude-3-5-haiku", ModelPricing::new(0.80, 4.00, 0.08, 1.00)),
    ("claude-3-haiku", ModelPricing::new(0.25, 1.25, 0.03, 0.30)),
];

#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    rates: BTreeMap<String, ModelPricing>,
    default_model: String,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            rates: BUILTIN_RATES
                .iter()
                .map(|(k, p)| ((*k).to_string(), *p))
                .collect(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl PricingTable {
    /// Table with `overrides` replacing or extending the built-in rates.
    pub fn with_overrides<I, K>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, ModelPricing)>,
        K: Into<String>,
    {
        for (k, p) in overrides {
            self.rates.insert(k.into(), p);
        }
        self
    }

    /// Ignored unless the model has rates in the table.
    pub fn with_default_model(mut self, model: &str) -> Self {
        if self.rates.contains_key(model) {
            self.default_model = model.to_string();
        }
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn default_rates(&self) -> ModelPricing {
        self.rates
            .get(&self.default_model)
            .copied()
            .unwrap_or(BUILTIN_RATES[0].1)
    }

    /// Rates for a model id. Dated ids like `claude-opus-4-20250514` fall back
    /// to the longest key they start with or contain, so `claude-opus-4-1-x`
    /// never resolves to `claude-opus-4`.
    pub fn lookup(&self, model: &str) -> ModelPricing {
        if model.is_empty() {
            return self.default_rates();
        }
        if let Some(p) = self.rates.get(model) {
            return *p;
        }
        self.rates
            .iter()
            .filter(|(key, _)| model.starts_with(key.as_str()) || model.contains(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, p)| *p)
            .unwrap_or_else(|| self.default_rates())
    }

    /// Estimated cost in USD, truncated to 6 decimal places.
    pub fn cost(
        &self,
        model: &str,
        input: u64,
        output: u64,
        cache_read: u64,
        cache_write: u64,
    ) -> f64 {
        let p = self.lookup(model);
        let per_m = |tokens: u64, rate: f64| (tokens as f64 / 1_000_000.0) * rate;
        let total = per_m(input, p.input)
            + per_m(output, p.output)
            + per_m(cache_read, p.cache_read)
            + per_m(cache_write, p.cache_write);
        (total * 1_000_000.0).trunc() / 1_000_000.0
    }
}
