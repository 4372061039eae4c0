use js_sys::Function;
use serde::{Deserialize, Serialize};
use tsify_next::Tsify;
use wasm_bindgen::prelude::*;

pub mod allocation;
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod funding;
pub mod policy;
pub mod schedule;
pub mod severity;
pub mod trade;
pub mod types;

#[cfg(feature = "instrument")]
pub use instrument;

pub use allocation::{AllocationOutcome, plan_allocation};
pub use config::{EngineConfig, GlobalBudget};
pub use dispatch::{
    DispatchReport, DispatchStatus, OrderApplier, PlanDispatcher, PlanSignature, RecordingApplier,
};
pub use engine::{Engine, TickPlan, TickReport};
pub use error::EngineError;
pub use funding::{
    ChainedPrices, FundingDecision, FundingLimits, FundingReport, PriceResolver, PriceTable,
    clamp_to_funding,
};
pub use policy::PolicyStore;
pub use schedule::TickSchedule;
pub use severity::severity_boost;
pub use trade::plan_trades;
pub use types::*;

use bridge::{JsOrderApplier, JsPriceResolver};

// ============================================================================
// WASM API - Autopilot
// ============================================================================

/// Every policy the store holds, in resource id order.
#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct PolicyList {
    pub policies: Vec<ResourcePolicy>,
}

fn to_js(err: EngineError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Browser-facing handle: owns the engine, the policy store and the timer gate.
#[wasm_bindgen]
pub struct Autopilot {
    engine: Engine,
    policies: PolicyStore,
    schedule: TickSchedule,
}

#[wasm_bindgen]
impl Autopilot {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        // Better panic messages in browser console
        console_error_panic_hook::set_once();

        let config = EngineConfig::default();
        Self {
            engine: Engine::new(GlobalBudget::default(), config),
            policies: PolicyStore::new(),
            schedule: TickSchedule::reference(config.tick_period_ms),
        }
    }

    #[wasm_bindgen]
    pub fn set_budget(&mut self, budget: GlobalBudget) {
        self.engine.set_budget(budget);
    }

    #[wasm_bindgen]
    pub fn set_config(&mut self, config: EngineConfig) {
        self.engine.set_config(config);
        self.schedule = TickSchedule::reference(self.engine.config().tick_period_ms);
    }

    #[wasm_bindgen]
    pub fn set_policy(&mut self, policy: ResourcePolicy) {
        self.policies.upsert(policy);
    }

    #[wasm_bindgen]
    pub fn policies(&self) -> PolicyList {
        PolicyList {
            policies: self.policies.iter().cloned().collect(),
        }
    }

    /// Replace the whole policy store from saved JSON.
    #[wasm_bindgen]
    pub fn load_policies(&mut self, json: &str) -> Result<(), JsValue> {
        self.policies = PolicyStore::from_json(json).map_err(to_js)?;
        Ok(())
    }

    #[wasm_bindgen]
    pub fn export_policies(&self) -> Result<String, JsValue> {
        self.policies.to_json().map_err(to_js)
    }

    /// Whether the host timer should run a tick at `now_ms`.
    #[wasm_bindgen]
    pub fn due(&mut self, now_ms: f64) -> bool {
        self.schedule.poll(now_ms)
    }

    /// Resend both plans on the next tick.
    #[wasm_bindgen]
    pub fn reset_dispatch(&mut self) {
        self.engine.reset_dispatch();
    }

    /// Run one tick against the host's snapshot. Unseen resources get default
    /// policies after the tick so the user can configure them.
    #[wasm_bindgen]
    pub fn tick(
        &mut self,
        snapshot: Snapshot,
        price_resolver: Function,
        applier: Function,
    ) -> TickReport {
        let prices = JsPriceResolver::new(price_resolver);
        let mut applier = JsOrderApplier::new(applier);
        let report = self
            .engine
            .tick(snapshot, self.policies.snapshot(), &prices, &mut applier);
        self.policies.ensure_defaults(&report.unseen_policies);
        report
    }
}

impl Default for Autopilot {
    fn default() -> Self {
        Self::new()
    }
}
