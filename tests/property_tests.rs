//! Property-based checks for the costing engine.

use proptest::prelude::*;
use rust_decimal::Decimal;
use stockledger::services::stock::weighted_average_cost;

/// Costs on the 2-decimal money grid, like every cost entering the ledger.
fn money() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn average_stays_between_the_component_costs(
        on_hand in 1i32..10_000,
        incoming in 1i32..10_000,
        current in money(),
        cost in money(),
    ) {
        let avg = weighted_average_cost(on_hand, current, incoming, cost);
        let lo = current.min(cost);
        let hi = current.max(cost);
        prop_assert!(avg >= lo && avg <= hi, "avg {avg} outside [{lo}, {hi}]");
    }

    #[test]
    fn empty_stock_takes_the_incoming_cost(incoming in 1i32..10_000, cost in money()) {
        prop_assert_eq!(weighted_average_cost(0, Decimal::ZERO, incoming, cost), cost);
    }

    #[test]
    fn uniform_cost_is_a_fixed_point(
        on_hand in 1i32..10_000,
        incoming in 1i32..10_000,
        cost in money(),
    ) {
        prop_assert_eq!(weighted_average_cost(on_hand, cost, incoming, cost), cost);
    }

    #[test]
    fn running_average_tracks_the_exact_weighted_mean(
        receipts in prop::collection::vec((1i32..500, money()), 1..10),
    ) {
        // Replay like a rebuild from the movement ledger.
        let mut quantity = 0i32;
        let mut average = Decimal::ZERO;
        let mut total_cost = Decimal::ZERO;
        for (qty, cost) in &receipts {
            average = weighted_average_cost(quantity, average, *qty, *cost);
            quantity += qty;
            total_cost += Decimal::from(*qty) * cost;
        }

        let exact = total_cost / Decimal::from(quantity);
        // Each receipt rounds to the cent, so drift is bounded by a cent per
        // receipt.
        let tolerance = Decimal::new(receipts.len() as i64, 2);
        let drift = (average - exact).abs();
        prop_assert!(drift <= tolerance, "drift {drift} exceeds {tolerance}");
    }

    #[test]
    fn average_is_always_on_the_money_grid(
        on_hand in 0i32..10_000,
        incoming in 1i32..10_000,
        current in money(),
        cost in money(),
    ) {
        let avg = weighted_average_cost(on_hand, current, incoming, cost);
        prop_assert!(avg >= Decimal::ZERO);
        prop_assert_eq!(avg, avg.round_dp(2));
    }
}
