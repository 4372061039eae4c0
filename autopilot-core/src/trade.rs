use std::collections::BTreeMap;

use crate::config::GlobalBudget;
use crate::types::{PolicyMap, ResourceId, ResourceState, TradeOrder, floor_count};

// ============================================================================
// Constants for market behavior
// ============================================================================

/// Fill a draining resource is topped up to.
pub const BUY_TARGET_FILL_DRAINING: f64 = 0.14;
/// Fill a steady or growing resource is topped up to.
pub const BUY_TARGET_FILL_STEADY: f64 = 0.08;
/// Above `target_fill * this`, a resource is comfortable and is not bought.
pub const BUY_COMFORT_MARGIN: f64 = 1.25;

pub const BUY_EMERGENCY_FRACTION: f64 = 0.12;
pub const BUY_URGENT_FRACTION: f64 = 0.08;

pub const SELL_NEAR_FULL: f64 = 0.95;
pub const SELL_OVERFLOWING: f64 = 0.985;
/// Draining resources are never sold below this fill.
pub const SELL_SHORTAGE_GUARD: f64 = 0.98;
/// Share of stock sold per tick when the capacity is unknown.
pub const SELL_UNCAPPED_FRACTION: f64 = 0.20;

// === BUY SIDE ===

/// Units to buy this tick, before flooring.
fn buy_want(state: &ResourceState, budget: &GlobalBudget) -> f64 {
    let net = state.net_rate();
    let deficit_cover = (-net).max(0.0) * budget.market_horizon_seconds;

    let Some(fill) = state.fill_ratio() else {
        return deficit_cover;
    };

    let target_fill = if net < 0.0 {
        BUY_TARGET_FILL_DRAINING
    } else {
        BUY_TARGET_FILL_STEADY
    };
    if fill > target_fill * BUY_COMFORT_MARGIN {
        return 0.0;
    }

    let topup = (state.cap * target_fill - state.value).max(0.0);
    let mut max_fraction = budget.max_buy_fraction_per_tick;
    if net < 0.0 && fill < 0.05 {
        max_fraction = max_fraction.max(BUY_EMERGENCY_FRACTION);
    } else if net < 0.0 && fill < 0.10 {
        max_fraction = max_fraction.max(BUY_URGENT_FRACTION);
    }

    (topup + deficit_cover).min(state.cap * max_fraction)
}

// === SELL SIDE ===

/// Units to sell this tick, before flooring.
fn sell_want(state: &ResourceState, budget: &GlobalBudget, any_buy: bool) -> f64 {
    let net = state.net_rate();

    let Some(fill) = state.fill_ratio() else {
        if net > 0.0 {
            let horizon_output = net * budget.market_horizon_seconds;
            return (state.value * SELL_UNCAPPED_FRACTION).min(horizon_output);
        }
        return 0.0;
    };

    if net < 0.0 && fill < SELL_SHORTAGE_GUARD {
        return 0.0;
    }

    let mut keep = if any_buy {
        budget.sell_keep_fraction_when_any_buy
    } else {
        budget.sell_keep_fraction_base
    };
    if net > 0.0 && fill >= SELL_NEAR_FULL {
        keep = keep.min(0.25);
        if fill >= SELL_OVERFLOWING {
            keep = keep.min(0.15);
        }
    }

    let per_tick_cap = if fill >= SELL_OVERFLOWING {
        state.cap * 0.50
    } else if fill >= SELL_NEAR_FULL {
        state.cap * 0.35
    } else {
        state.cap * 0.20
    };

    (state.value - state.cap * keep).max(0.0).min(per_tick_cap)
}

// === PLANNING ===

/// Decide buy and sell quantities for every resource with a market flag set.
///
/// Orders come out sorted by resource id with the buy before the sell, and
/// every quantity is a positive whole number.
pub fn plan_trades(
    resources: &BTreeMap<ResourceId, ResourceState>,
    policies: &PolicyMap,
    budget: &GlobalBudget,
) -> Vec<TradeOrder> {
    let any_buy = policies.values().any(|p| p.market_buy);
    let mut orders = Vec::new();

    for (id, state) in resources {
        let Some(policy) = policies.get(id) else {
            continue;
        };

        if policy.market_buy {
            let quantity = floor_count(buy_want(state, budget));
            if quantity > 0 {
                orders.push(TradeOrder::buy(id.clone(), quantity));
            }
        }

        if policy.market_sell {
            let quantity = floor_count(sell_want(state, budget, any_buy));
            if quantity > 0 {
                orders.push(TradeOrder::sell(id.clone(), quantity));
            }
        }
    }

    orders
}
