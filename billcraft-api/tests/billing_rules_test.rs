//! Plan gating and invoice totals rules, exercised through the public API.

use billcraft_api::models::{
    CreateInvoiceItem, Feature, InvoiceTotals, Plan, PlanLimits, SubscriptionTier, UNLIMITED,
};
use rust_decimal::Decimal;

fn item(quantity: Decimal, unit_rate: Decimal) -> CreateInvoiceItem {
    CreateInvoiceItem {
        description: "Service".to_string(),
        quantity,
        unit_rate,
    }
}

#[test]
fn gating_boundaries_for_the_free_plan() {
    let limits = Plan::for_tier(SubscriptionTier::Free).limits;

    // (current count, invoice allowed, client allowed)
    let cases = [
        (0, true, true),
        (4, true, true),
        (5, false, true),
        (9, false, true),
        (10, false, false),
        (100, false, false),
    ];

    for (count, invoice_ok, client_ok) in cases {
        assert_eq!(limits.allows_invoice(count), invoice_ok, "count {count}");
        assert_eq!(limits.allows_client(count), client_ok, "count {count}");
    }
}

#[test]
fn paid_plans_never_gate() {
    for tier in [SubscriptionTier::Pro, SubscriptionTier::Business] {
        let limits = Plan::for_tier(tier).limits;
        assert_eq!(limits.invoices_per_month, UNLIMITED);
        assert_eq!(limits.clients, UNLIMITED);
        assert!(limits.allows_invoice(10_000_000));
        assert!(limits.allows_client(10_000_000));
    }
}

#[test]
fn gating_predicate_stands_alone() {
    assert!(PlanLimits::allows(UNLIMITED, i64::MAX - 1));
    assert!(PlanLimits::allows(5, 4));
    assert!(!PlanLimits::allows(5, 5));
    assert!(!PlanLimits::allows(0, 0));
}

#[test]
fn catalogue_features_grow_with_price() {
    let free = Plan::for_tier(SubscriptionTier::Free);
    let pro = Plan::for_tier(SubscriptionTier::Pro);
    let business = Plan::for_tier(SubscriptionTier::Business);

    assert!(free.monthly_price < pro.monthly_price);
    assert!(pro.monthly_price < business.monthly_price);

    for feature in &free.features {
        assert!(pro.has_feature(*feature));
    }
    for feature in &pro.features {
        assert!(business.has_feature(*feature));
    }
    assert!(!pro.has_feature(Feature::ApiAccess));
}

#[test]
fn totals_of_a_realistic_invoice() {
    let items = vec![
        item(Decimal::from(12), Decimal::new(8550, 2)),  // 12 × 85.50
        item(Decimal::new(55, 1), Decimal::from(140)),   // 5.5 × 140
        item(Decimal::ONE, Decimal::new(2500, 2)),       // 1 × 25.00
    ];

    let totals = InvoiceTotals::compute(&items, Decimal::new(825, 2)); // 8.25%

    assert_eq!(totals.subtotal, Decimal::new(182100, 2)); // 1821.00
    assert_eq!(totals.tax_amount, Decimal::new(1502325, 4)); // 150.2325
    assert_eq!(totals.total, totals.subtotal + totals.tax_amount);

    // Rounding is a display concern only.
    assert_eq!(
        InvoiceTotals::display_amount(totals.tax_amount),
        Decimal::new(15023, 2)
    );
    assert_eq!(
        InvoiceTotals::display_amount(totals.total),
        Decimal::new(197123, 2)
    );
}

#[test]
fn totals_track_item_edits() {
    let mut items = vec![item(Decimal::from(2), Decimal::from(100))];
    let before = InvoiceTotals::compute(&items, Decimal::from(10));
    assert_eq!(before.total, Decimal::from(220));

    // Editing a quantity changes the derived amount on recomputation;
    // nothing stale survives from the previous pass.
    items[0].quantity = Decimal::from(3);
    let after = InvoiceTotals::compute(&items, Decimal::from(10));
    assert_eq!(after.subtotal, Decimal::from(300));
    assert_eq!(after.total, Decimal::from(330));
}
