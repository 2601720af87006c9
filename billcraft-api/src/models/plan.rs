//! Subscription tiers and the static plan catalogue.

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Sentinel meaning "no limit" in plan configuration.
pub const UNLIMITED: i64 = -1;

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Business,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Business => "business",
        }
    }

    /// Unknown or absent tier strings resolve to free.
    pub fn from_string(s: &str) -> Self {
        match s {
            "pro" => SubscriptionTier::Pro,
            "business" => SubscriptionTier::Business,
            _ => SubscriptionTier::Free,
        }
    }
}

/// Feature switches carried by a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    BasicInvoices,
    UnlimitedInvoices,
    CustomTemplates,
    ClientPortal,
    MultiUser,
    ApiAccess,
}

/// Usage limits for a tier. `UNLIMITED` disables a limit.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlanLimits {
    pub invoices_per_month: i64,
    pub clients: i64,
}

impl PlanLimits {
    /// Gating predicate: a new resource may be created iff the limit is the
    /// unlimited sentinel or the current count is still below it.
    pub fn allows(limit: i64, current_count: i64) -> bool {
        limit == UNLIMITED || current_count < limit
    }

    pub fn allows_invoice(&self, current_count: i64) -> bool {
        Self::allows(self.invoices_per_month, current_count)
    }

    pub fn allows_client(&self, current_count: i64) -> bool {
        Self::allows(self.clients, current_count)
    }
}

/// Static configuration for one tier. Plans are configuration, not data:
/// they are never derived or persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub tier: SubscriptionTier,
    pub name: &'static str,
    pub monthly_price: Decimal,
    pub features: Vec<Feature>,
    pub limits: PlanLimits,
}

impl Plan {
    pub fn for_tier(tier: SubscriptionTier) -> &'static Plan {
        match tier {
            SubscriptionTier::Free => &CATALOGUE[0],
            SubscriptionTier::Pro => &CATALOGUE[1],
            SubscriptionTier::Business => &CATALOGUE[2],
        }
    }

    pub fn all() -> &'static [Plan] {
        &CATALOGUE[..]
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

static CATALOGUE: Lazy<[Plan; 3]> = Lazy::new(|| {
    [
        Plan {
            tier: SubscriptionTier::Free,
            name: "Free",
            monthly_price: Decimal::ZERO,
            features: vec![Feature::BasicInvoices],
            limits: PlanLimits {
                invoices_per_month: 5,
                clients: 10,
            },
        },
        Plan {
            tier: SubscriptionTier::Pro,
            name: "Pro",
            monthly_price: Decimal::from(9),
            features: vec![
                Feature::BasicInvoices,
                Feature::UnlimitedInvoices,
                Feature::CustomTemplates,
                Feature::ClientPortal,
            ],
            limits: PlanLimits {
                invoices_per_month: UNLIMITED,
                clients: UNLIMITED,
            },
        },
        Plan {
            tier: SubscriptionTier::Business,
            name: "Business",
            monthly_price: Decimal::from(19),
            features: vec![
                Feature::BasicInvoices,
                Feature::UnlimitedInvoices,
                Feature::CustomTemplates,
                Feature::ClientPortal,
                Feature::MultiUser,
                Feature::ApiAccess,
            ],
            limits: PlanLimits {
                invoices_per_month: UNLIMITED,
                clients: UNLIMITED,
            },
        },
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_limit_denies_at_capacity() {
        let plan = Plan::for_tier(SubscriptionTier::Free);
        assert!(!plan.limits.allows_invoice(5));
        assert!(plan.limits.allows_invoice(4));
    }

    #[test]
    fn unlimited_sentinel_always_allows() {
        let plan = Plan::for_tier(SubscriptionTier::Pro);
        assert!(plan.limits.allows_invoice(0));
        assert!(plan.limits.allows_invoice(1_000_000));
        assert!(plan.limits.allows_client(i64::MAX - 1));
    }

    #[test]
    fn client_limit_is_independent_of_invoice_limit() {
        let plan = Plan::for_tier(SubscriptionTier::Free);
        assert!(plan.limits.allows_client(9));
        assert!(!plan.limits.allows_client(10));
    }

    #[test]
    fn unknown_tier_string_resolves_to_free() {
        assert_eq!(SubscriptionTier::from_string("enterprise"), SubscriptionTier::Free);
        assert_eq!(SubscriptionTier::from_string("pro"), SubscriptionTier::Pro);
        assert_eq!(
            SubscriptionTier::from_string("business"),
            SubscriptionTier::Business
        );
    }

    #[test]
    fn feature_sets_are_cumulative() {
        assert!(Plan::for_tier(SubscriptionTier::Free).has_feature(Feature::BasicInvoices));
        assert!(!Plan::for_tier(SubscriptionTier::Free).has_feature(Feature::ClientPortal));
        assert!(Plan::for_tier(SubscriptionTier::Business).has_feature(Feature::ApiAccess));
        assert!(Plan::for_tier(SubscriptionTier::Business).has_feature(Feature::ClientPortal));
    }
}
