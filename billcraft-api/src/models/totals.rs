//! Invoice totals computation.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use super::line_item::CreateInvoiceItem;

/// Derived invoice totals. Always recomputed from the line items and tax
/// rate; intermediate sums keep full precision and rounding happens only in
/// [`InvoiceTotals::display_amount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

impl InvoiceTotals {
    /// Amount for a single line: quantity × unit rate.
    pub fn line_amount(quantity: Decimal, unit_rate: Decimal) -> Decimal {
        quantity * unit_rate
    }

    /// Compute totals over the given items. `tax_rate` is a percentage.
    pub fn compute(items: &[CreateInvoiceItem], tax_rate: Decimal) -> Self {
        let subtotal: Decimal = items
            .iter()
            .map(|item| Self::line_amount(item.quantity, item.unit_rate))
            .sum();
        let tax_amount = subtotal * tax_rate / Decimal::ONE_HUNDRED;

        Self {
            subtotal,
            tax_rate,
            tax_amount,
            total: subtotal + tax_amount,
        }
    }

    /// Round a monetary amount to two decimal places for display.
    pub fn display_amount(value: Decimal) -> Decimal {
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(description: &str, quantity: Decimal, unit_rate: Decimal) -> CreateInvoiceItem {
        CreateInvoiceItem {
            description: description.to_string(),
            quantity,
            unit_rate,
        }
    }

    #[test]
    fn subtotal_is_sum_of_line_amounts() {
        let items = vec![
            item("Design", Decimal::new(25, 1), Decimal::new(12000, 2)), // 2.5 × 120.00
            item("Hosting", Decimal::ONE, Decimal::new(999, 2)),         // 1 × 9.99
        ];

        let totals = InvoiceTotals::compute(&items, Decimal::ZERO);

        assert_eq!(totals.subtotal, Decimal::new(30999, 2)); // 309.99
        assert_eq!(totals.tax_amount, Decimal::ZERO);
        assert_eq!(totals.total, totals.subtotal);
    }

    #[test]
    fn tax_is_percentage_of_subtotal() {
        let items = vec![item("Consulting", Decimal::from(10), Decimal::from(100))];

        let totals = InvoiceTotals::compute(&items, Decimal::new(75, 1)); // 7.5%

        assert_eq!(totals.subtotal, Decimal::from(1000));
        assert_eq!(totals.tax_amount, Decimal::from(75));
        assert_eq!(totals.total, Decimal::from(1075));
    }

    #[test]
    fn recomputation_is_idempotent() {
        let items = vec![
            item("A", Decimal::new(3333, 3), Decimal::new(1999, 2)),
            item("B", Decimal::from(7), Decimal::new(45, 0)),
        ];

        let first = InvoiceTotals::compute(&items, Decimal::from(20));
        let second = InvoiceTotals::compute(&items, Decimal::from(20));

        assert_eq!(first, second);
    }

    #[test]
    fn intermediate_precision_is_preserved() {
        // 3 × 0.333 = 0.999; a truncating implementation would lose the
        // trailing digits before the tax step.
        let items = vec![item("Fractional", Decimal::from(3), Decimal::new(333, 3))];

        let totals = InvoiceTotals::compute(&items, Decimal::from(10));

        assert_eq!(totals.subtotal, Decimal::new(999, 3));
        assert_eq!(totals.tax_amount, Decimal::new(999, 4));
        assert_eq!(totals.total, Decimal::new(10989, 4));
        assert_eq!(
            InvoiceTotals::display_amount(totals.total),
            Decimal::new(110, 2)
        );
    }

    #[test]
    fn empty_item_list_yields_zero_totals() {
        let totals = InvoiceTotals::compute(&[], Decimal::from(15));

        assert_eq!(totals.subtotal, Decimal::ZERO);
        assert_eq!(totals.tax_amount, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[test]
    fn negative_quantities_pass_through_the_core() {
        // The core is sign-agnostic; rejection is the API boundary's call.
        let items = vec![item("Credit", Decimal::from(-1), Decimal::from(50))];

        let totals = InvoiceTotals::compute(&items, Decimal::from(10));

        assert_eq!(totals.subtotal, Decimal::from(-50));
        assert_eq!(totals.total, Decimal::from(-55));
    }
}
