use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::error::EngineError;
use crate::types::{AllocationTarget, TradeOrder};

// ============================================================================
// Order applier - host side of the plan handoff
// ============================================================================

/// Receives plans and turns them into actions in the host.
pub trait OrderApplier {
    fn apply_allocation(&mut self, plan: &[AllocationTarget]) -> Result<(), EngineError>;
    fn apply_trades(&mut self, plan: &[TradeOrder]) -> Result<(), EngineError>;
}

// ============================================================================
// Structural signatures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct SignatureEntry {
    key: String,
    tag: &'static str,
    amount: u64,
    detail: u64,
}

/// Canonical, order-independent form of a plan: entries sorted by key with
/// floored amounts. Two plans with equal signatures cause identical writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanSignature(Vec<SignatureEntry>);

impl PlanSignature {
    pub fn of_allocation(plan: &[AllocationTarget]) -> Self {
        Self::sorted(
            plan.iter()
                .map(|t| SignatureEntry {
                    key: t.producer_id.clone(),
                    tag: t.resolved_mode.as_str(),
                    amount: t.target_unit_count,
                    detail: t.target_percent_of_workforce.max(0.0).floor() as u64,
                })
                .collect(),
        )
    }

    pub fn of_trades(plan: &[TradeOrder]) -> Self {
        Self::sorted(
            plan.iter()
                .map(|o| SignatureEntry {
                    key: o.resource_id.clone(),
                    tag: o.side.as_str(),
                    amount: o.quantity,
                    detail: 0,
                })
                .collect(),
        )
    }

    fn sorted(mut entries: Vec<SignatureEntry>) -> Self {
        entries.sort();
        Self(entries)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum DispatchStatus {
    Sent,
    /// Same signature as the last plan that reached the applier.
    Suppressed,
    /// The applier returned an error. The next plan is offered again.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub allocation: DispatchStatus,
    pub trades: DispatchStatus,
}

/// Forwards plans to the applier, skipping any plan identical to the last
/// one that was successfully applied.
///
/// Holds the only state the engine keeps between ticks. Dropping or resetting
/// it never changes what gets planned, only what gets re-sent.
#[derive(Debug, Clone, Default)]
pub struct PlanDispatcher {
    last_allocation: Option<PlanSignature>,
    last_trades: Option<PlanSignature>,
}

impl PlanDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the last signatures so the next plans are always forwarded.
    pub fn reset(&mut self) {
        self.last_allocation = None;
        self.last_trades = None;
    }

    pub fn dispatch(
        &mut self,
        allocation: &[AllocationTarget],
        trades: &[TradeOrder],
        applier: &mut dyn OrderApplier,
    ) -> DispatchReport {
        let allocation_status = forward(
            &mut self.last_allocation,
            PlanSignature::of_allocation(allocation),
            || applier.apply_allocation(allocation),
        );
        let trade_status = forward(
            &mut self.last_trades,
            PlanSignature::of_trades(trades),
            || applier.apply_trades(trades),
        );

        DispatchReport {
            allocation: allocation_status,
            trades: trade_status,
        }
    }
}

fn forward(
    last: &mut Option<PlanSignature>,
    signature: PlanSignature,
    apply: impl FnOnce() -> Result<(), EngineError>,
) -> DispatchStatus {
    if last.as_ref() == Some(&signature) {
        return DispatchStatus::Suppressed;
    }
    match apply() {
        Ok(()) => {
            *last = Some(signature);
            DispatchStatus::Sent
        }
        #[cfg_attr(not(feature = "instrument"), allow(unused_variables))]
        Err(err) => {
            #[cfg(feature = "instrument")]
            tracing::warn!(error = %err, "order applier failed");
            DispatchStatus::Failed
        }
    }
}

/// Applier that records every plan it receives. Handy for hosts that poll.
#[derive(Debug, Clone, Default)]
pub struct RecordingApplier {
    pub allocations: Vec<Vec<AllocationTarget>>,
    pub trades: Vec<Vec<TradeOrder>>,
}

impl OrderApplier for RecordingApplier {
    fn apply_allocation(&mut self, plan: &[AllocationTarget]) -> Result<(), EngineError> {
        self.allocations.push(plan.to_vec());
        Ok(())
    }

    fn apply_trades(&mut self, plan: &[TradeOrder]) -> Result<(), EngineError> {
        self.trades.push(plan.to_vec());
        Ok(())
    }
}
