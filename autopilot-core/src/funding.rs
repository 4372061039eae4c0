use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::types::{Price, PriceQuote, ResourceId, Side, TradeOrder, floor_count};

// ============================================================================
// Price resolution
// ============================================================================

/// Looks up the price of one unit of a resource on one side of the market.
pub trait PriceResolver {
    fn price(&self, resource_id: &str, side: Side) -> Option<Price>;
}

impl<F> PriceResolver for F
where
    F: Fn(&str, Side) -> Option<Price>,
{
    fn price(&self, resource_id: &str, side: Side) -> Option<Price> {
        self(resource_id, side)
    }
}

/// Static price list, usually the one carried inline by the snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    quotes: BTreeMap<ResourceId, PriceQuote>,
}

impl PriceTable {
    pub fn new(quotes: BTreeMap<ResourceId, PriceQuote>) -> Self {
        Self { quotes }
    }
}

impl PriceResolver for PriceTable {
    fn price(&self, resource_id: &str, side: Side) -> Option<Price> {
        let quote = self.quotes.get(resource_id)?;
        match side {
            Side::Buy => quote.buy,
            Side::Sell => quote.sell,
        }
    }
}

/// Try `primary` first and fall back to `secondary` for unknown prices.
pub struct ChainedPrices<'a> {
    pub primary: &'a dyn PriceResolver,
    pub secondary: &'a dyn PriceResolver,
}

impl PriceResolver for ChainedPrices<'_> {
    fn price(&self, resource_id: &str, side: Side) -> Option<Price> {
        self.primary
            .price(resource_id, side)
            .or_else(|| self.secondary.price(resource_id, side))
    }
}

/// Negative, NaN and infinite prices count as unknown.
fn resolve(prices: &dyn PriceResolver, order: &TradeOrder) -> Option<Price> {
    prices
        .price(&order.resource_id, order.side)
        .filter(|p| p.is_finite() && *p >= 0.0)
}

// ============================================================================
// Funding clamp
// ============================================================================

/// What the clamp did to the trade plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum FundingDecision {
    /// Net spend fits, nothing changed.
    Passthrough,
    /// Funding sits at the floor; every buy was dropped.
    FloorProtected,
    /// No price known and funding is low; every buy was dropped.
    UnpricedBuysDropped,
    /// No price known but funding is comfortable; plan passed unscaled.
    UnpricedPassthrough,
    /// Buys were scaled down by `factor`.
    Scaled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct FundingReport {
    pub decision: FundingDecision,
    /// Multiplier applied to buy quantities. 1 unless `decision` is Scaled.
    pub factor: f64,
    pub buy_cost: f64,
    pub sell_revenue: f64,
    pub max_spend: f64,
}

impl FundingReport {
    fn new(decision: FundingDecision, max_spend: f64) -> Self {
        Self {
            decision,
            factor: 1.0,
            buy_cost: 0.0,
            sell_revenue: 0.0,
            max_spend,
        }
    }
}

/// Limits that the clamp enforces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FundingLimits {
    pub funding: f64,
    pub funding_floor: f64,
    /// Funding below which buys are dropped when nothing can be priced.
    pub unpriced_buy_threshold: f64,
}

impl FundingLimits {
    pub fn max_spend(&self) -> f64 {
        self.funding - self.funding_floor
    }
}

fn drop_buys(orders: Vec<TradeOrder>) -> Vec<TradeOrder> {
    orders.into_iter().filter(|o| o.side == Side::Sell).collect()
}

/// Scale buy orders so that `buy_cost - sell_revenue <= funding - funding_floor`.
///
/// Sell orders always pass through unchanged. Orders whose price cannot be
/// resolved are left out of the cost sums but their buys are still scaled.
pub fn clamp_to_funding(
    orders: Vec<TradeOrder>,
    limits: &FundingLimits,
    prices: &dyn PriceResolver,
) -> (Vec<TradeOrder>, FundingReport) {
    let max_spend = limits.max_spend();
    if orders.is_empty() {
        return (
            orders,
            FundingReport::new(FundingDecision::Passthrough, max_spend),
        );
    }

    if limits.funding <= limits.funding_floor + 1.0 {
        return (
            drop_buys(orders),
            FundingReport::new(FundingDecision::FloorProtected, max_spend),
        );
    }

    let priced: Vec<Option<Price>> = orders.iter().map(|o| resolve(prices, o)).collect();
    if priced.iter().all(Option::is_none) {
        return if limits.funding < limits.unpriced_buy_threshold {
            (
                drop_buys(orders),
                FundingReport::new(FundingDecision::UnpricedBuysDropped, max_spend),
            )
        } else {
            (
                orders,
                FundingReport::new(FundingDecision::UnpricedPassthrough, max_spend),
            )
        };
    }

    let mut buy_cost = 0.0;
    let mut sell_revenue = 0.0;
    for (order, price) in orders.iter().zip(&priced) {
        let Some(price) = price else { continue };
        let value = order.quantity as f64 * price;
        match order.side {
            Side::Buy => buy_cost += value,
            Side::Sell => sell_revenue += value,
        }
    }

    let mut report = FundingReport {
        decision: FundingDecision::Passthrough,
        factor: 1.0,
        buy_cost,
        sell_revenue,
        max_spend,
    };
    if buy_cost - sell_revenue <= max_spend {
        return (orders, report);
    }

    let allowed = (max_spend + sell_revenue).max(0.0);
    let factor = (allowed / buy_cost).clamp(0.0, 1.0);
    report.decision = FundingDecision::Scaled;
    report.factor = factor;

    let scaled = orders
        .into_iter()
        .filter_map(|mut order| {
            if order.side == Side::Buy {
                order.quantity = floor_count(order.quantity as f64 * factor);
            }
            (order.quantity > 0).then_some(order)
        })
        .collect();

    (scaled, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(funding: f64, funding_floor: f64) -> FundingLimits {
        FundingLimits {
            funding,
            funding_floor,
            unpriced_buy_threshold: 1_000.0,
        }
    }

    fn flat(price: f64) -> impl Fn(&str, Side) -> Option<Price> {
        move |_: &str, _: Side| Some(price)
    }

    fn unknown(_: &str, _: Side) -> Option<Price> {
        None
    }

    #[test]
    fn test_floor_drops_every_buy() {
        let orders = vec![TradeOrder::buy("a", 10), TradeOrder::sell("b", 5)];
        let (out, report) = clamp_to_funding(orders, &limits(100.5, 100.0), &flat(1.0));
        assert_eq!(out, vec![TradeOrder::sell("b", 5)]);
        assert_eq!(report.decision, FundingDecision::FloorProtected);
    }

    #[test]
    fn test_affordable_plan_unchanged() {
        let orders = vec![TradeOrder::buy("a", 10), TradeOrder::buy("b", 20)];
        let (out, report) = clamp_to_funding(orders.clone(), &limits(500.0, 0.0), &flat(10.0));
        assert_eq!(out, orders);
        assert_eq!(report.decision, FundingDecision::Passthrough);
        assert_eq!(report.buy_cost, 300.0);
    }

    #[test]
    fn test_overspend_scales_buys_with_sell_revenue() {
        // buy cost 800, sell revenue 100, funding 500
        let orders = vec![
            TradeOrder::buy("a", 40),
            TradeOrder::buy("b", 40),
            TradeOrder::sell("c", 10),
        ];
        let (out, report) = clamp_to_funding(orders, &limits(500.0, 0.0), &flat(10.0));

        assert_eq!(report.decision, FundingDecision::Scaled);
        assert!((report.factor - 0.75).abs() < 1e-12);
        assert_eq!(
            out,
            vec![
                TradeOrder::buy("a", 30),
                TradeOrder::buy("b", 30),
                TradeOrder::sell("c", 10),
            ]
        );
    }

    #[test]
    fn test_scaled_to_zero_orders_dropped() {
        let orders = vec![TradeOrder::buy("a", 1), TradeOrder::buy("b", 1000)];
        let (out, _) = clamp_to_funding(orders, &limits(10.0, 0.0), &flat(1.0));
        // factor 10 / 1001
        assert_eq!(out, vec![TradeOrder::buy("b", 9)]);
    }

    #[test]
    fn test_unpriced_buy_scaled_alongside_priced() {
        let orders = vec![TradeOrder::buy("a", 100), TradeOrder::buy("b", 100)];
        let only_a = |id: &str, _: Side| (id == "a").then_some(10.0);
        let (out, report) = clamp_to_funding(orders, &limits(500.0, 0.0), &only_a);

        // b adds nothing to the cost but still takes the factor
        assert_eq!(report.decision, FundingDecision::Scaled);
        assert_eq!(report.buy_cost, 1_000.0);
        assert!((report.factor - 0.5).abs() < 1e-12);
        assert_eq!(
            out,
            vec![TradeOrder::buy("a", 50), TradeOrder::buy("b", 50)]
        );
    }

    #[test]
    fn test_unpriced_low_funding_drops_buys() {
        let orders = vec![TradeOrder::buy("a", 10), TradeOrder::sell("b", 5)];
        let (out, report) = clamp_to_funding(orders, &limits(200.0, 0.0), &unknown);
        assert_eq!(out, vec![TradeOrder::sell("b", 5)]);
        assert_eq!(report.decision, FundingDecision::UnpricedBuysDropped);
    }

    #[test]
    fn test_unpriced_high_funding_passes() {
        let orders = vec![TradeOrder::buy("a", 10)];
        let (out, report) = clamp_to_funding(orders.clone(), &limits(5_000.0, 0.0), &unknown);
        assert_eq!(out, orders);
        assert_eq!(report.decision, FundingDecision::UnpricedPassthrough);
    }

    #[test]
    fn test_sells_never_reduced() {
        let orders = vec![TradeOrder::buy("a", 100), TradeOrder::sell("b", 77)];
        let (out, _) = clamp_to_funding(orders, &limits(2.0, 0.0), &flat(50.0));
        assert!(out.contains(&TradeOrder::sell("b", 77)));
    }

    #[test]
    fn test_price_table_and_chain() {
        let mut quotes = BTreeMap::new();
        quotes.insert(
            "wood".to_string(),
            PriceQuote {
                buy: Some(3.0),
                sell: None,
            },
        );
        let table = PriceTable::new(quotes);
        assert_eq!(table.price("wood", Side::Buy), Some(3.0));
        assert_eq!(table.price("wood", Side::Sell), None);
        assert_eq!(table.price("iron", Side::Buy), None);

        let fallback = flat(1.5);
        let chained = ChainedPrices {
            primary: &table,
            secondary: &fallback,
        };
        assert_eq!(chained.price("wood", Side::Buy), Some(3.0));
        assert_eq!(chained.price("wood", Side::Sell), Some(1.5));
    }

    #[test]
    fn test_negative_price_treated_as_unknown() {
        let orders = vec![TradeOrder::buy("a", 10)];
        let (out, report) = clamp_to_funding(orders, &limits(50.0, 0.0), &flat(-4.0));
        assert!(out.is_empty());
        assert_eq!(report.decision, FundingDecision::UnpricedBuysDropped);
    }
}
