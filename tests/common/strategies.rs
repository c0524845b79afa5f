use proptest::prelude::*;
use rust_decimal::Decimal;
use storefront_core::state_machine::OrderStatus;

/// Unit price between 0.01 and 999.99
pub fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000).prop_map(|cents| Decimal::new(cents, 2))
}

/// (unit price, quantity) pairs for a non-empty cart
pub fn cart_lines_strategy() -> impl Strategy<Value = Vec<(Decimal, i32)>> {
    prop::collection::vec((price_strategy(), 1i32..6), 1..6)
}

pub fn order_status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop::sample::select(OrderStatus::ALL.to_vec())
}
