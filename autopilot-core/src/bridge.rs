//! Adapters that let JS callbacks stand in for the engine's collaborators.

use js_sys::Function;
use serde::Serialize;
use wasm_bindgen::JsValue;

use crate::dispatch::OrderApplier;
use crate::error::EngineError;
use crate::funding::PriceResolver;
use crate::types::{AllocationTarget, Price, Side, TradeOrder};

fn js_error(err: JsValue) -> EngineError {
    EngineError::Js(err.as_string().unwrap_or_else(|| format!("{err:?}")))
}

/// `(resourceId: string, side: "buy" | "sell") => number | undefined`
pub struct JsPriceResolver {
    callback: Function,
}

impl JsPriceResolver {
    pub fn new(callback: Function) -> Self {
        Self { callback }
    }
}

impl PriceResolver for JsPriceResolver {
    fn price(&self, resource_id: &str, side: Side) -> Option<Price> {
        match self.callback.call2(
            &JsValue::NULL,
            &JsValue::from_str(resource_id),
            &JsValue::from_str(side.as_str()),
        ) {
            Ok(value) => value.as_f64(),
            Err(_) => None,
        }
    }
}

/// `(kind: "allocation" | "trades", plan: object[]) => void`. Throwing marks
/// the plan as failed so it is offered again next tick.
pub struct JsOrderApplier {
    callback: Function,
}

impl JsOrderApplier {
    pub fn new(callback: Function) -> Self {
        Self { callback }
    }

    fn send<T: Serialize>(&self, kind: &'static str, plan: &[T]) -> Result<(), EngineError> {
        let payload = serde_wasm_bindgen::to_value(plan).map_err(|e| EngineError::Applier {
            plan: kind,
            reason: e.to_string(),
        })?;
        self.callback
            .call2(&JsValue::NULL, &JsValue::from_str(kind), &payload)
            .map_err(js_error)?;
        Ok(())
    }
}

impl OrderApplier for JsOrderApplier {
    fn apply_allocation(&mut self, plan: &[AllocationTarget]) -> Result<(), EngineError> {
        self.send("allocation", plan)
    }

    fn apply_trades(&mut self, plan: &[TradeOrder]) -> Result<(), EngineError> {
        self.send("trades", plan)
    }
}
