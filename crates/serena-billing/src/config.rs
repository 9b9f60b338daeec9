//! Price catalog: mapping between tiers and billing-provider price ids.

use serena_core::{PriceIds, Tier};

/// Resolve the tier a provider price id grants.
///
/// Configured ids win. Otherwise the id itself is inspected for `premium` or
/// `basic` (case-insensitive), which covers lookup-key style ids. Anything
/// else grants nothing beyond FREE.
pub fn tier_for_price(prices: &PriceIds, price_id: &str) -> Tier {
    if !price_id.is_empty() {
        if price_id == prices.basic {
            return Tier::Basic;
        }
        if price_id == prices.premium {
            return Tier::Premium;
        }
    }

    let lower = price_id.to_ascii_lowercase();
    if lower.contains("premium") {
        Tier::Premium
    } else if lower.contains("basic") {
        Tier::Basic
    } else {
        Tier::Free
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices() -> PriceIds {
        PriceIds {
            basic: "price_1AbC".into(),
            premium: "price_9XyZ".into(),
        }
    }

    #[test]
    fn configured_ids_take_precedence() {
        assert_eq!(tier_for_price(&prices(), "price_1AbC"), Tier::Basic);
        assert_eq!(tier_for_price(&prices(), "price_9XyZ"), Tier::Premium);
    }

    #[test]
    fn falls_back_to_name_match() {
        assert_eq!(tier_for_price(&prices(), "serena_PREMIUM_yearly"), Tier::Premium);
        assert_eq!(tier_for_price(&prices(), "basic-monthly"), Tier::Basic);
    }

    #[test]
    fn unknown_price_is_free() {
        assert_eq!(tier_for_price(&prices(), "price_unrelated"), Tier::Free);
        assert_eq!(tier_for_price(&prices(), ""), Tier::Free);
    }
}
