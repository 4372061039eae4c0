use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::allocation::{AllocationOutcome, plan_allocation};
use crate::config::{EngineConfig, GlobalBudget};
use crate::dispatch::{DispatchReport, OrderApplier, PlanDispatcher};
use crate::funding::{
    ChainedPrices, FundingLimits, FundingReport, PriceResolver, PriceTable, clamp_to_funding,
};
use crate::policy::unseen_resource_ids;
use crate::trade::plan_trades;
use crate::types::{AllocationTarget, PolicyMap, ResourceId, Snapshot, TradeOrder};

// ============================================================================
// Plans & reports
// ============================================================================

/// Both plans for one snapshot, before dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct TickPlan {
    pub allocation: AllocationOutcome,
    /// Trade orders after the funding clamp.
    pub trades: Vec<TradeOrder>,
    pub funding: FundingReport,
    /// Snapshot resources with no policy. The host should create defaults.
    pub unseen_policies: Vec<ResourceId>,
}

/// Everything the host learns from one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub tick: u64,
    pub allocation: Vec<AllocationTarget>,
    pub trades: Vec<TradeOrder>,
    pub dispatch: DispatchReport,
    pub funding: FundingReport,
    pub unplaced_resources: Vec<ResourceId>,
    pub unseen_policies: Vec<ResourceId>,
    pub worker_budget: f64,
    pub workers_assigned: f64,
}

// ============================================================================
// Engine
// ============================================================================

/// Runs the planning pipeline once per tick.
///
/// Apart from the dispatcher's last-sent signatures, nothing carries over
/// between ticks: every plan is recomputed from the snapshot and policies.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    budget: GlobalBudget,
    config: EngineConfig,
    dispatcher: PlanDispatcher,
    tick: u64,
}

impl Engine {
    pub fn new(budget: GlobalBudget, config: EngineConfig) -> Self {
        Self {
            budget: budget.clamped(),
            config: config.clamped(),
            dispatcher: PlanDispatcher::new(),
            tick: 0,
        }
    }

    pub fn budget(&self) -> &GlobalBudget {
        &self.budget
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_budget(&mut self, budget: GlobalBudget) {
        self.budget = budget.clamped();
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config.clamped();
    }

    /// Make the next tick resend both plans even if unchanged.
    pub fn reset_dispatch(&mut self) {
        self.dispatcher.reset();
    }

    /// Compute both plans without dispatching. Pure: equal inputs give equal plans.
    pub fn plan(
        &self,
        snapshot: &Snapshot,
        policies: &PolicyMap,
        prices: &dyn PriceResolver,
    ) -> TickPlan {
        self.plan_sanitized(&snapshot.clone().sanitized(), policies, prices)
    }

    fn plan_sanitized(
        &self,
        snapshot: &Snapshot,
        policies: &PolicyMap,
        prices: &dyn PriceResolver,
    ) -> TickPlan {
        let budget = self.budget.with_total_workers(snapshot.total_workers);
        let active = snapshot.unlocked_resources();

        let allocation = plan_allocation(
            &active,
            &snapshot.producers,
            policies,
            &budget,
            self.config.worker_need_floor,
        );

        let inline = PriceTable::new(snapshot.prices.clone());
        let chained = ChainedPrices {
            primary: prices,
            secondary: &inline,
        };
        let limits = FundingLimits {
            funding: snapshot.funding,
            funding_floor: budget.funding_floor,
            unpriced_buy_threshold: self.config.unpriced_buy_funding_threshold,
        };
        let (trades, funding) =
            clamp_to_funding(plan_trades(&active, policies, &budget), &limits, &chained);

        TickPlan {
            allocation,
            trades,
            funding,
            unseen_policies: unseen_resource_ids(&snapshot.resources, policies),
        }
    }

    /// Run one full tick: plan, then hand changed plans to `applier`.
    ///
    /// `policies` is the snapshot captured at tick start; the store may keep
    /// changing while this runs without affecting it.
    pub fn tick(
        &mut self,
        snapshot: Snapshot,
        policies: Arc<PolicyMap>,
        prices: &dyn PriceResolver,
        applier: &mut dyn OrderApplier,
    ) -> TickReport {
        self.tick += 1;
        let snapshot = snapshot.sanitized();
        let plan = self.plan_sanitized(&snapshot, &policies, prices);

        let dispatch = self
            .dispatcher
            .dispatch(&plan.allocation.targets, &plan.trades, applier);

        #[cfg(feature = "instrument")]
        self.record(&snapshot, &plan, &dispatch);

        TickReport {
            tick: self.tick,
            allocation: plan.allocation.targets,
            trades: plan.trades,
            dispatch,
            funding: plan.funding,
            unplaced_resources: plan.allocation.unplaced,
            unseen_policies: plan.unseen_policies,
            worker_budget: plan.allocation.worker_budget,
            workers_assigned: plan.allocation.workers_assigned,
        }
    }

    #[cfg(feature = "instrument")]
    fn record(&self, snapshot: &Snapshot, plan: &TickPlan, dispatch: &DispatchReport) {
        let tick = self.tick;
        let floor = self.config.worker_need_floor;

        for target in &plan.allocation.targets {
            let need = snapshot
                .producers
                .iter()
                .find(|p| p.id == target.producer_id)
                .map(|p| p.effective_need(floor))
                .unwrap_or(floor);
            tracing::info!(
                target: "allocation",
                tick = tick,
                producer_id = target.producer_id.as_str(),
                mode = target.resolved_mode.as_str(),
                target_units = target.target_unit_count,
                target_percent = target.target_percent_of_workforce,
                workers = target.target_unit_count as f64 * need,
                worker_budget = plan.allocation.worker_budget,
            );
        }

        for order in &plan.trades {
            tracing::info!(
                target: "trade_plan",
                tick = tick,
                resource_id = order.resource_id.as_str(),
                side = order.side.as_str(),
                quantity = order.quantity,
            );
        }

        tracing::info!(
            target: "funding",
            tick = tick,
            decision = ?plan.funding.decision,
            factor = plan.funding.factor,
            buy_cost = plan.funding.buy_cost,
            sell_revenue = plan.funding.sell_revenue,
            max_spend = plan.funding.max_spend,
        );

        tracing::info!(
            target: "tick",
            tick = tick,
            resources = snapshot.resources.len() as u64,
            producers = snapshot.producers.len() as u64,
            total_workers = snapshot.total_workers,
            funding = snapshot.funding,
            workers_assigned = plan.allocation.workers_assigned,
            rescaled = plan.allocation.rescaled,
            allocation_dispatch = ?dispatch.allocation,
            trade_dispatch = ?dispatch.trades,
        );

        for id in &plan.allocation.unplaced {
            tracing::debug!(tick = tick, resource_id = id.as_str(), "resource has no producer");
        }
        if !plan.unseen_policies.is_empty() {
            tracing::debug!(
                tick = tick,
                count = plan.unseen_policies.len() as u64,
                "requesting default policies"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchStatus, RecordingApplier};
    use crate::funding::FundingDecision;
    use crate::types::{Mode, PriceQuote, ProducerCapacity, ResourcePolicy, ResourceState, Side};

    fn no_prices(_: &str, _: Side) -> Option<f64> {
        None
    }

    fn engine() -> Engine {
        Engine::new(
            GlobalBudget {
                reserve_fraction: 0.0,
                ..GlobalBudget::default()
            },
            EngineConfig::default(),
        )
    }

    fn policies(list: Vec<ResourcePolicy>) -> Arc<PolicyMap> {
        Arc::new(
            list.into_iter()
                .map(|p| (p.resource_id.clone(), p))
                .collect(),
        )
    }

    #[test]
    fn test_tick_counts_and_suppresses_repeats() {
        let mut engine = engine();
        let mut applier = RecordingApplier::default();
        let snapshot = Snapshot::new(10.0, 0.0)
            .with_resource(ResourceState::new("wood"))
            .with_producer(ProducerCapacity::new("camp", "Camp").producing("wood"));
        let pol = policies(vec![ResourcePolicy::new("wood").with_mode(Mode::On)]);

        let first = engine.tick(snapshot.clone(), pol.clone(), &no_prices, &mut applier);
        let second = engine.tick(snapshot, pol, &no_prices, &mut applier);

        assert_eq!(first.tick, 1);
        assert_eq!(second.tick, 2);
        assert_eq!(first.dispatch.allocation, DispatchStatus::Sent);
        assert_eq!(second.dispatch.allocation, DispatchStatus::Suppressed);
        assert_eq!(first.allocation, second.allocation);
        assert_eq!(applier.allocations.len(), 1);
    }

    #[test]
    fn test_locked_resources_ignored() {
        let engine = engine();
        let snapshot = Snapshot::new(10.0, 10_000.0)
            .with_resource(ResourceState::new("wood").locked())
            .with_producer(ProducerCapacity::new("camp", "Camp").producing("wood"));
        let pol = policies(vec![
            ResourcePolicy::new("wood")
                .with_mode(Mode::On)
                .selling()
                .buying(),
        ]);

        let plan = engine.plan(&snapshot, &pol, &no_prices);
        assert!(plan.allocation.targets.is_empty());
        assert!(plan.trades.is_empty());
        assert!(plan.unseen_policies.is_empty());
    }

    #[test]
    fn test_unseen_policies_reported() {
        let engine = engine();
        let snapshot = Snapshot::new(10.0, 0.0)
            .with_resource(ResourceState::new("wood"))
            .with_resource(ResourceState::new("clay"));
        let pol = policies(vec![ResourcePolicy::new("wood")]);

        let plan = engine.plan(&snapshot, &pol, &no_prices);
        assert_eq!(plan.unseen_policies, vec!["clay".to_string()]);
    }

    #[test]
    fn test_inline_prices_feed_funding_clamp() {
        let engine = engine();
        let snapshot = Snapshot::new(0.0, 101.0)
            .with_resource(ResourceState::new("iron").with_stock(0.0, 10_000.0))
            .with_price(
                "iron",
                PriceQuote {
                    buy: Some(1.0),
                    sell: Some(0.5),
                },
            );
        let pol = policies(vec![ResourcePolicy::new("iron").buying()]);

        let plan = engine.plan(&snapshot, &pol, &no_prices);
        // wants 500, can afford 101
        assert_eq!(plan.funding.decision, FundingDecision::Scaled);
        assert_eq!(plan.trades, vec![TradeOrder::buy("iron", 101)]);
    }

    #[test]
    fn test_budget_total_workers_comes_from_snapshot() {
        let engine = engine();
        let snapshot = Snapshot::new(40.0, 0.0)
            .with_resource(ResourceState::new("wood"))
            .with_producer(ProducerCapacity::new("camp", "Camp").producing("wood"));
        let pol = policies(vec![ResourcePolicy::new("wood").with_mode(Mode::On)]);

        let plan = engine.plan(&snapshot, &pol, &no_prices);
        assert_eq!(plan.allocation.worker_budget, 40.0);
        assert_eq!(plan.allocation.targets[0].target_unit_count, 40);
        assert_eq!(engine.budget().total_workers, 0.0);
    }
}
