use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use wareflow_core::{StockError, StockResult, ValueObject};

/// Monetary rounding: half-up to 2 decimal places, applied identically to
/// every derived figure so totals never drift across document types.
const MONEY_SCALE: u32 = 2;

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Line discount: a percentage of the subtotal, or an explicit amount.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discount {
    Percent(Decimal),
    Amount(Decimal),
}

impl Discount {
    pub fn none() -> Self {
        Discount::Amount(Decimal::ZERO)
    }
}

/// Tax on the taxable amount: a flat rate, a CGST/SGST split, or IGST.
///
/// Split components are each computed on the full taxable amount.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxBreakup {
    Flat(Decimal),
    Gst { cgst: Decimal, sgst: Decimal },
    Igst(Decimal),
}

impl TaxBreakup {
    fn components(&self) -> Vec<(&'static str, Decimal)> {
        match *self {
            TaxBreakup::Flat(rate) => vec![("tax", rate)],
            TaxBreakup::Gst { cgst, sgst } => vec![("cgst", cgst), ("sgst", sgst)],
            TaxBreakup::Igst(rate) => vec![("igst", rate)],
        }
    }
}

/// Calculator input for one document line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemInput {
    pub quantity: Decimal,
    pub rate: Decimal,
    pub discount: Discount,
    pub tax: TaxBreakup,
}

/// One computed tax component (label, rate, rounded amount).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxComponent {
    pub label: String,
    pub rate: Decimal,
    pub amount: Decimal,
}

/// Derived money figures for one document line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemFigures {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub taxable_amount: Decimal,
    pub tax_components: Vec<TaxComponent>,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

impl ValueObject for LineItemFigures {}

/// Pure line arithmetic: subtotal, discount, taxable, tax, total.
///
/// No side effects and no state; the only failures are malformed inputs.
pub struct LineItemCalculator;

impl LineItemCalculator {
    pub fn calculate(input: &LineItemInput) -> StockResult<LineItemFigures> {
        if input.quantity < Decimal::ZERO {
            return Err(StockError::invalid_input("quantity cannot be negative"));
        }
        if input.rate < Decimal::ZERO {
            return Err(StockError::invalid_input("rate cannot be negative"));
        }

        let subtotal = round_money(input.quantity * input.rate);

        let discount_amount = match input.discount {
            Discount::Percent(pct) => {
                if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
                    return Err(StockError::invalid_input(
                        "discount percent must be between 0 and 100",
                    ));
                }
                round_money(subtotal * pct / Decimal::ONE_HUNDRED)
            }
            Discount::Amount(amount) => {
                if amount < Decimal::ZERO {
                    return Err(StockError::invalid_input("discount amount cannot be negative"));
                }
                if amount > subtotal {
                    return Err(StockError::invalid_input(
                        "discount amount cannot exceed subtotal",
                    ));
                }
                round_money(amount)
            }
        };

        let taxable_amount = subtotal - discount_amount;

        let mut tax_components = Vec::new();
        let mut tax_amount = Decimal::ZERO;
        for (label, rate) in input.tax.components() {
            if rate < Decimal::ZERO {
                return Err(StockError::invalid_input("tax rate cannot be negative"));
            }
            let amount = round_money(taxable_amount * rate / Decimal::ONE_HUNDRED);
            tax_amount += amount;
            tax_components.push(TaxComponent {
                label: label.to_string(),
                rate,
                amount,
            });
        }

        let total_amount = taxable_amount + tax_amount;

        Ok(LineItemFigures {
            subtotal,
            discount_amount,
            taxable_amount,
            tax_components,
            tax_amount,
            total_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn flat(quantity: Decimal, rate: Decimal, discount_pct: Decimal, tax_rate: Decimal) -> LineItemInput {
        LineItemInput {
            quantity,
            rate,
            discount: Discount::Percent(discount_pct),
            tax: TaxBreakup::Flat(tax_rate),
        }
    }

    #[test]
    fn reference_case_10_units_at_100_with_10_pct_discount_18_pct_tax() {
        let figures =
            LineItemCalculator::calculate(&flat(dec!(10), dec!(100), dec!(10), dec!(18))).unwrap();

        assert_eq!(figures.subtotal, dec!(1000.00));
        assert_eq!(figures.discount_amount, dec!(100.00));
        assert_eq!(figures.taxable_amount, dec!(900.00));
        assert_eq!(figures.tax_amount, dec!(162.00));
        assert_eq!(figures.total_amount, dec!(1062.00));
    }

    #[test]
    fn repeated_calls_are_idempotent() {
        let input = flat(dec!(10), dec!(100), dec!(10), dec!(18));
        let first = LineItemCalculator::calculate(&input).unwrap();
        let second = LineItemCalculator::calculate(&input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn gst_split_computes_each_component_on_full_taxable() {
        let input = LineItemInput {
            quantity: dec!(10),
            rate: dec!(100),
            discount: Discount::none(),
            tax: TaxBreakup::Gst {
                cgst: dec!(9),
                sgst: dec!(9),
            },
        };
        let figures = LineItemCalculator::calculate(&input).unwrap();

        assert_eq!(figures.tax_components.len(), 2);
        assert_eq!(figures.tax_components[0].amount, dec!(90.00));
        assert_eq!(figures.tax_components[1].amount, dec!(90.00));
        assert_eq!(figures.tax_amount, dec!(180.00));
        assert_eq!(figures.total_amount, dec!(1180.00));
    }

    #[test]
    fn explicit_discount_amount_is_used_verbatim() {
        let input = LineItemInput {
            quantity: dec!(3),
            rate: dec!(50),
            discount: Discount::Amount(dec!(25)),
            tax: TaxBreakup::Flat(dec!(5)),
        };
        let figures = LineItemCalculator::calculate(&input).unwrap();

        assert_eq!(figures.discount_amount, dec!(25.00));
        assert_eq!(figures.taxable_amount, dec!(125.00));
        assert_eq!(figures.tax_amount, dec!(6.25));
        assert_eq!(figures.total_amount, dec!(131.25));
    }

    #[test]
    fn rounding_is_half_up_at_two_decimals() {
        // 1.005 rounds away from zero to 1.01 at scale 2.
        let input = LineItemInput {
            quantity: dec!(1),
            rate: dec!(20.10),
            discount: Discount::none(),
            tax: TaxBreakup::Flat(dec!(5)),
        };
        let figures = LineItemCalculator::calculate(&input).unwrap();
        assert_eq!(figures.tax_amount, dec!(1.01));
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let err =
            LineItemCalculator::calculate(&flat(dec!(-1), dec!(100), dec!(0), dec!(18))).unwrap_err();
        assert!(matches!(err, StockError::InvalidInput(_)));
    }

    #[test]
    fn negative_rate_is_rejected() {
        let err =
            LineItemCalculator::calculate(&flat(dec!(1), dec!(-100), dec!(0), dec!(18))).unwrap_err();
        assert!(matches!(err, StockError::InvalidInput(_)));
    }

    #[test]
    fn discount_percent_above_100_is_rejected() {
        let err =
            LineItemCalculator::calculate(&flat(dec!(1), dec!(100), dec!(101), dec!(18))).unwrap_err();
        assert!(matches!(err, StockError::InvalidInput(_)));
    }

    #[test]
    fn discount_amount_above_subtotal_is_rejected() {
        let input = LineItemInput {
            quantity: dec!(1),
            rate: dec!(10),
            discount: Discount::Amount(dec!(11)),
            tax: TaxBreakup::Flat(dec!(0)),
        };
        let err = LineItemCalculator::calculate(&input).unwrap_err();
        assert!(matches!(err, StockError::InvalidInput(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: total always equals taxable + tax, and taxable equals
        /// subtotal - discount, for any in-range inputs.
        #[test]
        fn figures_are_internally_consistent(
            quantity in 0i64..10_000,
            rate_cents in 0i64..1_000_000,
            discount_pct in 0i64..=100,
            tax_pct in 0i64..=40,
        ) {
            let input = flat(
                Decimal::from(quantity),
                Decimal::new(rate_cents, 2),
                Decimal::from(discount_pct),
                Decimal::from(tax_pct),
            );
            let figures = LineItemCalculator::calculate(&input).unwrap();

            prop_assert_eq!(figures.taxable_amount, figures.subtotal - figures.discount_amount);
            prop_assert_eq!(figures.total_amount, figures.taxable_amount + figures.tax_amount);
            let component_sum: Decimal = figures.tax_components.iter().map(|c| c.amount).sum();
            prop_assert_eq!(figures.tax_amount, component_sum);
            prop_assert!(figures.discount_amount <= figures.subtotal);
        }
    }
}
