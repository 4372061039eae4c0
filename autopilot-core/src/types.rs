use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use tsify_next::Tsify;

// ============================================================================
// Core aliases
// ============================================================================

pub type ResourceId = String;
pub type ProducerId = String;
pub type Price = f64;
pub type Quantity = u64;
pub type UnitCount = u64;

/// Policies keyed by resource id. Ordered so every pass over it is deterministic.
pub type PolicyMap = BTreeMap<ResourceId, ResourcePolicy>;

// ============================================================================
// Lenient numeric decoding
// ============================================================================

/// Host snapshots are scraped from a live page, so numbers arrive as `null`,
/// missing or NaN. All of those collapse to 0.
pub(crate) fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map(finite_or_zero).unwrap_or(0.0))
}

fn lenient_count<'de, D>(deserializer: D) -> Result<UnitCount, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map(floor_count).unwrap_or(0))
}

/// Floor a non-negative float into a unit count or order quantity.
pub(crate) fn floor_count(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    value.floor().min(u64::MAX as f64) as u64
}

// ============================================================================
// Modes & Sides
// ============================================================================

/// What the user asked the automation to do with a resource.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum Mode {
    #[default]
    Off,
    On,
    /// Re-balance activation of existing producers; never build new ones.
    Balance,
}

/// Mode of a producer after folding every resource that points at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum ResolvedMode {
    On,
    Balance,
}

impl ResolvedMode {
    /// On wins over Balance.
    pub fn merge(self, other: ResolvedMode) -> ResolvedMode {
        match (self, other) {
            (ResolvedMode::Balance, ResolvedMode::Balance) => ResolvedMode::Balance,
            _ => ResolvedMode::On,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResolvedMode::On => "on",
            ResolvedMode::Balance => "balance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

// ============================================================================
// Snapshot input
// ============================================================================

/// One resource as observed this tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceState {
    pub id: ResourceId,
    #[serde(deserialize_with = "lenient_f64")]
    pub value: f64,
    /// 0 when the host does not know the capacity.
    #[serde(deserialize_with = "lenient_f64")]
    pub cap: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub production_rate: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub consumption_rate: f64,
    pub unlocked: bool,
}

impl Default for ResourceState {
    fn default() -> Self {
        Self {
            id: ResourceId::new(),
            value: 0.0,
            cap: 0.0,
            production_rate: 0.0,
            consumption_rate: 0.0,
            unlocked: true,
        }
    }
}

impl ResourceState {
    pub fn new(id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_stock(mut self, value: f64, cap: f64) -> Self {
        self.value = value;
        self.cap = cap;
        self
    }

    pub fn with_rates(mut self, production: f64, consumption: f64) -> Self {
        self.production_rate = production;
        self.consumption_rate = consumption;
        self
    }

    pub fn locked(mut self) -> Self {
        self.unlocked = false;
        self
    }

    pub fn net_rate(&self) -> f64 {
        self.production_rate - self.consumption_rate
    }

    /// `value / cap`, or `None` when the capacity is unknown.
    pub fn fill_ratio(&self) -> Option<f64> {
        (self.cap > 0.0).then(|| self.value / self.cap)
    }

    fn sanitized(mut self, id: &str) -> Self {
        if self.id.is_empty() {
            self.id = id.to_string();
        }
        self.value = finite_or_zero(self.value);
        self.cap = finite_or_zero(self.cap).max(0.0);
        self.production_rate = finite_or_zero(self.production_rate);
        self.consumption_rate = finite_or_zero(self.consumption_rate);
        self
    }
}

/// A building kind that turns workers into one or more resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase", default)]
pub struct ProducerCapacity {
    pub id: ProducerId,
    pub name: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub worker_need_per_unit: f64,
    #[serde(deserialize_with = "lenient_count")]
    pub unit_count: UnitCount,
    pub produced_resource_ids: Vec<ResourceId>,
}

impl ProducerCapacity {
    pub fn new(id: impl Into<ProducerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            worker_need_per_unit: 1.0,
            unit_count: 0,
            produced_resource_ids: Vec::new(),
        }
    }

    pub fn with_need(mut self, worker_need_per_unit: f64) -> Self {
        self.worker_need_per_unit = worker_need_per_unit;
        self
    }

    pub fn with_units(mut self, unit_count: UnitCount) -> Self {
        self.unit_count = unit_count;
        self
    }

    pub fn producing(mut self, resource: impl Into<ResourceId>) -> Self {
        self.produced_resource_ids.push(resource.into());
        self
    }

    pub fn produces(&self, resource: &str) -> bool {
        self.produced_resource_ids.iter().any(|r| r == resource)
    }

    /// Workers per unit, never below `floor`.
    pub fn effective_need(&self, floor: f64) -> f64 {
        let need = self.worker_need_per_unit;
        if need.is_finite() && need > floor {
            need
        } else {
            floor
        }
    }
}

/// Known buy/sell price for a resource, carried inline by hosts with a static price list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(default)]
pub struct PriceQuote {
    pub buy: Option<Price>,
    pub sell: Option<Price>,
}

/// Everything the host read from the game for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub resources: BTreeMap<ResourceId, ResourceState>,
    pub producers: Vec<ProducerCapacity>,
    #[serde(deserialize_with = "lenient_f64")]
    pub total_workers: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub funding: f64,
    /// Inline quotes. The host price resolver is asked first; these only fill
    /// in a resource and side it has no price for.
    pub prices: BTreeMap<ResourceId, PriceQuote>,
}

impl Snapshot {
    pub fn new(total_workers: f64, funding: f64) -> Self {
        Self {
            total_workers,
            funding,
            ..Self::default()
        }
    }

    pub fn with_resource(mut self, state: ResourceState) -> Self {
        self.resources.insert(state.id.clone(), state);
        self
    }

    pub fn with_producer(mut self, producer: ProducerCapacity) -> Self {
        self.producers.push(producer);
        self
    }

    pub fn with_price(mut self, resource: impl Into<ResourceId>, quote: PriceQuote) -> Self {
        self.prices.insert(resource.into(), quote);
        self
    }

    /// Normalize whatever the host sent: ids filled from map keys,
    /// non-finite numbers zeroed, negative capacities treated as unknown.
    pub fn sanitized(mut self) -> Self {
        self.resources = std::mem::take(&mut self.resources)
            .into_iter()
            .map(|(id, state)| {
                let state = state.sanitized(&id);
                (id, state)
            })
            .collect();
        self.total_workers = finite_or_zero(self.total_workers).max(0.0);
        self.funding = finite_or_zero(self.funding);
        self
    }

    /// Resources the automation may touch this tick.
    pub fn unlocked_resources(&self) -> BTreeMap<ResourceId, ResourceState> {
        self.resources
            .iter()
            .filter(|(_, state)| state.unlocked)
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect()
    }
}

// ============================================================================
// Policy
// ============================================================================

pub const MAX_POLICY_WEIGHT: f64 = 10.0;

/// User intent for one resource. Owned by the host; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourcePolicy {
    pub resource_id: ResourceId,
    pub mode: Mode,
    pub weight: f64,
    pub preferred_producer_id: Option<ProducerId>,
    pub market_buy: bool,
    pub market_sell: bool,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            resource_id: ResourceId::new(),
            mode: Mode::Off,
            weight: 1.0,
            preferred_producer_id: None,
            market_buy: false,
            market_sell: false,
        }
    }
}

impl ResourcePolicy {
    /// The lazily created default: Off, weight 1, no market flags.
    pub fn new(resource_id: impl Into<ResourceId>) -> Self {
        Self {
            resource_id: resource_id.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn preferring(mut self, producer: impl Into<ProducerId>) -> Self {
        self.preferred_producer_id = Some(producer.into());
        self
    }

    pub fn buying(mut self) -> Self {
        self.market_buy = true;
        self
    }

    pub fn selling(mut self) -> Self {
        self.market_sell = true;
        self
    }

    /// Weight clamped to `[0, 10]`; non-finite weights count as 0.
    pub fn clamped_weight(&self) -> f64 {
        finite_or_zero(self.weight).clamp(0.0, MAX_POLICY_WEIGHT)
    }
}

// ============================================================================
// Plan output
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct AllocationTarget {
    pub producer_id: ProducerId,
    pub resolved_mode: ResolvedMode,
    pub target_unit_count: UnitCount,
    pub target_percent_of_workforce: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct TradeOrder {
    pub resource_id: ResourceId,
    pub side: Side,
    pub quantity: Quantity,
}

impl TradeOrder {
    pub fn buy(resource: impl Into<ResourceId>, quantity: Quantity) -> Self {
        Self {
            resource_id: resource.into(),
            side: Side::Buy,
            quantity,
        }
    }

    pub fn sell(resource: impl Into<ResourceId>, quantity: Quantity) -> Self {
        Self {
            resource_id: resource.into(),
            side: Side::Sell,
            quantity,
        }
    }
}
