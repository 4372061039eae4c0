use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

// ============================================================================
// Global budget - labor and market limits supplied by the host
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalBudget {
    /// Filled from the snapshot at the start of every tick.
    pub total_workers: f64,
    /// Share of the workforce never handed out, in `[0, 0.3]`.
    pub reserve_fraction: f64,
    /// Funding the trade plan must never spend below.
    pub funding_floor: f64,
    /// How many seconds of deficit a buy tries to cover, in `[5, 120]`.
    pub market_horizon_seconds: f64,
    /// Largest share of capacity bought per tick, in `[0.001, 0.2]`.
    pub max_buy_fraction_per_tick: f64,
    pub sell_keep_fraction_base: f64,
    /// Keep fraction used instead of the base while any resource is being bought.
    pub sell_keep_fraction_when_any_buy: f64,
}

impl Default for GlobalBudget {
    fn default() -> Self {
        Self {
            total_workers: 0.0,
            reserve_fraction: 0.05,
            funding_floor: 0.0,
            market_horizon_seconds: 30.0,
            max_buy_fraction_per_tick: 0.05,
            sell_keep_fraction_base: 0.6,
            sell_keep_fraction_when_any_buy: 0.8,
        }
    }
}

/// Clamp into `[lo, hi]`, falling back to `default` for NaN and infinities.
fn clamp_or(value: f64, lo: f64, hi: f64, default: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        default
    }
}

impl GlobalBudget {
    /// Out-of-range values are pulled to the nearest bound, never rejected.
    pub fn clamped(&self) -> Self {
        let d = Self::default();
        Self {
            total_workers: clamp_or(self.total_workers, 0.0, f64::MAX, d.total_workers),
            reserve_fraction: clamp_or(self.reserve_fraction, 0.0, 0.3, d.reserve_fraction),
            funding_floor: clamp_or(self.funding_floor, 0.0, f64::MAX, d.funding_floor),
            market_horizon_seconds: clamp_or(
                self.market_horizon_seconds,
                5.0,
                120.0,
                d.market_horizon_seconds,
            ),
            max_buy_fraction_per_tick: clamp_or(
                self.max_buy_fraction_per_tick,
                0.001,
                0.2,
                d.max_buy_fraction_per_tick,
            ),
            sell_keep_fraction_base: clamp_or(
                self.sell_keep_fraction_base,
                0.1,
                0.95,
                d.sell_keep_fraction_base,
            ),
            sell_keep_fraction_when_any_buy: clamp_or(
                self.sell_keep_fraction_when_any_buy,
                0.1,
                0.95,
                d.sell_keep_fraction_when_any_buy,
            ),
        }
    }

    pub fn with_total_workers(mut self, total_workers: f64) -> Self {
        self.total_workers = clamp_or(total_workers, 0.0, f64::MAX, 0.0);
        self
    }

    /// Workers the allocation planner may hand out: `total * (1 - reserve)`.
    pub fn worker_budget(&self) -> f64 {
        self.total_workers.max(0.0) * (1.0 - self.reserve_fraction)
    }
}

// ============================================================================
// Engine tuning
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Stand-in for producers reporting a zero or negative worker need.
    pub worker_need_floor: f64,
    /// Below this much funding, buys are dropped when no price is known at all.
    pub unpriced_buy_funding_threshold: f64,
    /// Host timer period. Any positive value works.
    pub tick_period_ms: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_need_floor: 0.01,
            unpriced_buy_funding_threshold: 1_000.0,
            tick_period_ms: 1_000.0,
        }
    }
}

impl EngineConfig {
    pub fn clamped(&self) -> Self {
        let d = Self::default();
        let floor = if self.worker_need_floor.is_finite() && self.worker_need_floor > 0.0 {
            self.worker_need_floor
        } else {
            d.worker_need_floor
        };
        let period = if self.tick_period_ms.is_finite() && self.tick_period_ms > 0.0 {
            self.tick_period_ms
        } else {
            d.tick_period_ms
        };
        Self {
            worker_need_floor: floor,
            unpriced_buy_funding_threshold: clamp_or(
                self.unpriced_buy_funding_threshold,
                0.0,
                f64::MAX,
                d.unpriced_buy_funding_threshold,
            ),
            tick_period_ms: period,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_budget_is_clamped_not_rejected() {
        let budget = GlobalBudget {
            total_workers: -5.0,
            reserve_fraction: 0.9,
            funding_floor: -100.0,
            market_horizon_seconds: 1.0,
            max_buy_fraction_per_tick: 3.0,
            sell_keep_fraction_base: 0.0,
            sell_keep_fraction_when_any_buy: f64::NAN,
        }
        .clamped();

        assert_eq!(budget.total_workers, 0.0);
        assert_eq!(budget.reserve_fraction, 0.3);
        assert_eq!(budget.funding_floor, 0.0);
        assert_eq!(budget.market_horizon_seconds, 5.0);
        assert_eq!(budget.max_buy_fraction_per_tick, 0.2);
        assert_eq!(budget.sell_keep_fraction_base, 0.1);
        assert_eq!(
            budget.sell_keep_fraction_when_any_buy,
            GlobalBudget::default().sell_keep_fraction_when_any_buy
        );
    }

    #[test]
    fn test_budget_from_partial_json_keeps_defaults() {
        let budget: GlobalBudget =
            serde_json::from_str(r#"{"reserveFraction": 0.1, "fundingFloor": 250}"#).unwrap();
        assert_eq!(budget.reserve_fraction, 0.1);
        assert_eq!(budget.funding_floor, 250.0);
        assert_eq!(budget.market_horizon_seconds, 30.0);
    }

    #[test]
    fn test_worker_budget_respects_reserve() {
        let budget = GlobalBudget {
            reserve_fraction: 0.2,
            ..GlobalBudget::default()
        }
        .with_total_workers(50.0);
        assert!((budget.worker_budget() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_engine_config_rejects_non_positive_floor() {
        let config = EngineConfig {
            worker_need_floor: 0.0,
            tick_period_ms: -1.0,
            ..EngineConfig::default()
        }
        .clamped();
        assert_eq!(config.worker_need_floor, 0.01);
        assert_eq!(config.tick_period_ms, 1_000.0);
    }
}
