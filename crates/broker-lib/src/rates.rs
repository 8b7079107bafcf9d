//! Hourly rate table per provider and tier

use crate::error::{BrokerError, BrokerResult};
use crate::models::Provider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default general-purpose instance used when a GPU policy falls through to
/// the general-purpose cloud
pub const DEFAULT_GENERAL_PURPOSE_TIER: &str = "ecs.g6.large";

/// Provider -> tier -> hourly cost overrides, as read from configuration
pub type RateOverrides = BTreeMap<Provider, BTreeMap<String, f64>>;

/// One priced tier, flattened for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    pub provider: Provider,
    pub tier: String,
    pub cost_per_hour: f64,
}

/// Static mapping from (provider, tier) to hourly cost in USD
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    rates: BTreeMap<Provider, BTreeMap<String, f64>>,
}

impl RateTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in average marketplace and cloud prices
    pub fn standard() -> Self {
        Self::new()
            .with_rate(Provider::Alibaba, "ecs.g6.large", 0.12)
            .with_rate(Provider::Alibaba, "ecs.r6.large", 0.18)
            .with_rate(Provider::VastaiReserved, "RTX 5090", 0.36)
            .with_rate(Provider::VastaiReserved, "RTX 4090", 0.28)
            .with_rate(Provider::VastaiOndemand, "RTX 5090", 0.52)
            .with_rate(Provider::VastaiOndemand, "RTX 4090", 0.40)
            .with_rate(Provider::VastaiOndemand, "RTX 3090", 0.22)
            .with_rate(Provider::VastaiOndemand, "RTX 4060", 0.15)
            .with_rate(Provider::VastaiOndemand, "RTX 3060", 0.12)
    }

    /// Add or replace a rate
    pub fn with_rate(mut self, provider: Provider, tier: impl Into<String>, cost_per_hour: f64) -> Self {
        self.rates
            .entry(provider)
            .or_default()
            .insert(tier.into(), cost_per_hour);
        self
    }

    /// Merge configured overrides, rejecting negative or non-finite rates
    pub fn overlay(&mut self, overrides: &RateOverrides) -> BrokerResult<()> {
        for (provider, tiers) in overrides {
            for (tier, &rate) in tiers {
                if !rate.is_finite() || rate < 0.0 {
                    return Err(BrokerError::PolicyValidation(format!(
                        "rate for {} '{}' must be a non-negative number, got {}",
                        provider, tier, rate
                    )));
                }
                self.rates
                    .entry(*provider)
                    .or_default()
                    .insert(tier.clone(), rate);
            }
        }
        Ok(())
    }

    /// Hourly cost of a tier on a provider
    pub fn rate(&self, provider: Provider, tier: &str) -> BrokerResult<f64> {
        self.rates
            .get(&provider)
            .and_then(|tiers| tiers.get(tier))
            .copied()
            .ok_or_else(|| BrokerError::RateNotFound {
                provider,
                tier: tier.to_string(),
            })
    }

    pub fn contains(&self, provider: Provider, tier: &str) -> bool {
        self.rate(provider, tier).is_ok()
    }

    /// Tier names priced on a provider
    pub fn tiers(&self, provider: Provider) -> Vec<&str> {
        self.rates
            .get(&provider)
            .map(|tiers| tiers.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// All entries ordered by provider then tier
    pub fn entries(&self) -> Vec<RateEntry> {
        self.rates
            .iter()
            .flat_map(|(provider, tiers)| {
                tiers.iter().map(move |(tier, &cost_per_hour)| RateEntry {
                    provider: *provider,
                    tier: tier.clone(),
                    cost_per_hour,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rates.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
