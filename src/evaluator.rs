//! Opportunity evaluation: is the estimate far enough above the listed price?

use crate::types::{Deal, Opportunity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Estimated value minus listed price
pub fn discount(price: Decimal, estimated_value: Decimal) -> Decimal {
    estimated_value.saturating_sub(price)
}

/// True when the discount reaches `threshold` and the listing has a real price
pub fn is_opportunity(price: Decimal, estimated_value: Decimal, threshold: Decimal) -> bool {
    price > Decimal::ZERO && discount(price, estimated_value) >= threshold
}

/// Wrap `deal` as an opportunity if it qualifies
pub fn evaluate(
    deal: Deal,
    estimated_value: Decimal,
    threshold: Decimal,
    now: DateTime<Utc>,
) -> Option<Opportunity> {
    is_opportunity(deal.price, estimated_value, threshold)
        .then(|| Opportunity::new(deal, estimated_value, now))
}
