//! Budget evaluation and the provider downgrade chain

use crate::error::BrokerResult;
use crate::models::Provider;
use crate::rates::RateTable;

/// Projected cost of running `tier` on `provider` for `duration_hours`
pub fn projected_cost(
    rates: &RateTable,
    provider: Provider,
    tier: &str,
    duration_hours: f64,
) -> BrokerResult<f64> {
    Ok(rates.rate(provider, tier)? * duration_hours)
}

/// Equality is accepted
pub fn within_budget(projected_cost: f64, budget: f64) -> bool {
    projected_cost <= budget
}

/// Whether the projected cost fits the budget
pub fn fits_budget(
    rates: &RateTable,
    provider: Provider,
    tier: &str,
    duration_hours: f64,
    budget: f64,
) -> BrokerResult<bool> {
    Ok(within_budget(
        projected_cost(rates, provider, tier, duration_hours)?,
        budget,
    ))
}

/// Iterator over a provider and every provider below it in the downgrade order
#[derive(Debug, Clone)]
pub struct DowngradeChain {
    next: Option<Provider>,
}

impl DowngradeChain {
    pub fn starting_at(provider: Provider) -> Self {
        Self {
            next: Some(provider),
        }
    }
}

impl Iterator for DowngradeChain {
    type Item = Provider;

    fn next(&mut self) -> Option<Provider> {
        let current = self.next?;
        self.next = current.downgrade();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_budget_inclusive_boundary() {
        let rates = RateTable::new().with_rate(Provider::Alibaba, "ecs.g6.large", 0.25);
        // 0.25 * 8 == 2.0 exactly
        assert!(fits_budget(&rates, Provider::Alibaba, "ecs.g6.large", 8.0, 2.0).unwrap());
        assert!(!fits_budget(&rates, Provider::Alibaba, "ecs.g6.large", 8.0, 1.99).unwrap());
    }

    #[test]
    fn test_projected_cost_fractional_duration() {
        let rates = RateTable::standard();
        let cost = projected_cost(&rates, Provider::VastaiOndemand, "RTX 3090", 2.5).unwrap();
        assert!((cost - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_fits_budget_propagates_missing_rate() {
        let rates = RateTable::new();
        assert!(fits_budget(&rates, Provider::Alibaba, "ecs.g6.large", 1.0, 100.0).is_err());
    }

    #[test]
    fn test_downgrade_chain_from_reserved() {
        let chain: Vec<_> = DowngradeChain::starting_at(Provider::VastaiReserved).collect();
        assert_eq!(
            chain,
            vec![Provider::VastaiReserved, Provider::VastaiOndemand, Provider::Alibaba]
        );
    }

    #[test]
    fn test_downgrade_chain_from_general_purpose() {
        let chain: Vec<_> = DowngradeChain::starting_at(Provider::Alibaba).collect();
        assert_eq!(chain, vec![Provider::Alibaba]);
    }
}
