use std::collections::BTreeMap;

use crate::config::GlobalBudget;
use crate::severity::severity_boost;
use crate::types::{
    AllocationTarget, Mode, PolicyMap, ProducerCapacity, ResolvedMode, ResourceId, ResourceState,
    UnitCount, floor_count,
};

/// Slack for float noise when rounding worker shares to whole units.
const ROUNDING_EPSILON: f64 = 1e-9;

// === DEMAND AGGREGATION ===

/// Weight accumulated on one producer from every resource routed to it.
#[derive(Debug, Clone)]
struct ProducerDemand<'a> {
    producer: &'a ProducerCapacity,
    weight: f64,
    mode: ResolvedMode,
}

/// Result of one allocation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationOutcome {
    /// One target per producer with positive weight, ordered by producer id.
    pub targets: Vec<AllocationTarget>,
    /// Demanded resources that no producer makes.
    pub unplaced: Vec<ResourceId>,
    /// `total_workers * (1 - reserve_fraction)` for this tick.
    pub worker_budget: f64,
    /// Workers the emitted targets consume.
    pub workers_assigned: f64,
    /// Whether the ceil-rounded targets overshot the budget and were scaled down.
    pub rescaled: bool,
}

/// Pick the producer for a resource: the preferred one when it can make the
/// resource, otherwise the alphabetically first by name (id breaks name ties).
fn select_producer<'a>(
    candidates: &[&'a ProducerCapacity],
    preferred: Option<&str>,
) -> Option<&'a ProducerCapacity> {
    if let Some(preferred) = preferred {
        if let Some(p) = candidates.iter().find(|p| p.id == preferred) {
            return Some(*p);
        }
    }
    candidates
        .iter()
        .min_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)))
        .copied()
}

fn clamp_for_mode(units: UnitCount, demand: &ProducerDemand) -> UnitCount {
    match demand.mode {
        ResolvedMode::Balance => units.min(demand.producer.unit_count),
        ResolvedMode::On => units,
    }
}

// === PLANNING ===

/// Split the worker budget across producers in proportion to the weighted
/// demand of the resources they make.
///
/// The sum of `target_unit_count * worker_need` over the result never exceeds
/// `budget.worker_budget()`, and a producer resolved to Balance never gets more
/// units than it already has. Resources whose policy is Off contribute nothing.
pub fn plan_allocation(
    resources: &BTreeMap<ResourceId, ResourceState>,
    producers: &[ProducerCapacity],
    policies: &PolicyMap,
    budget: &GlobalBudget,
    worker_need_floor: f64,
) -> AllocationOutcome {
    let mut demand: BTreeMap<&str, ProducerDemand> = BTreeMap::new();
    let mut unplaced = Vec::new();

    for (id, state) in resources {
        let Some(policy) = policies.get(id) else {
            continue;
        };
        let mode = match policy.mode {
            Mode::Off => continue,
            Mode::On => ResolvedMode::On,
            Mode::Balance => ResolvedMode::Balance,
        };

        let candidates: Vec<&ProducerCapacity> =
            producers.iter().filter(|p| p.produces(id)).collect();
        let Some(producer) = select_producer(&candidates, policy.preferred_producer_id.as_deref())
        else {
            #[cfg(feature = "instrument")]
            tracing::debug!(resource_id = id.as_str(), "no producer makes demanded resource");
            unplaced.push(id.clone());
            continue;
        };

        let weight = policy.clamped_weight() * severity_boost(state);
        if weight <= 0.0 {
            continue;
        }

        demand
            .entry(producer.id.as_str())
            .and_modify(|d| {
                d.weight += weight;
                d.mode = d.mode.merge(mode);
            })
            .or_insert(ProducerDemand {
                producer,
                weight,
                mode,
            });
    }

    let worker_budget = budget.worker_budget();
    let total_weight: f64 = demand.values().map(|d| d.weight).sum();
    if total_weight <= 0.0 {
        return AllocationOutcome {
            unplaced,
            worker_budget,
            ..AllocationOutcome::default()
        };
    }

    // Proportional share, rounded up to whole units.
    let mut units: Vec<(&ProducerDemand, f64, UnitCount)> = demand
        .values()
        .map(|d| {
            let need = d.producer.effective_need(worker_need_floor);
            let desired_workers = worker_budget * (d.weight / total_weight);
            let units = floor_count((desired_workers / need - ROUNDING_EPSILON).ceil());
            (d, need, clamp_for_mode(units, d))
        })
        .collect();

    let requested: f64 = units.iter().map(|(_, need, n)| *n as f64 * need).sum();
    let rescaled = requested > worker_budget;
    if rescaled {
        let factor = worker_budget / requested;
        for (d, _, n) in units.iter_mut() {
            *n = clamp_for_mode(floor_count(*n as f64 * factor + ROUNDING_EPSILON), d);
        }
    }

    let total_workers = budget.total_workers;
    let targets: Vec<AllocationTarget> = units
        .iter()
        .map(|(d, need, n)| {
            let percent = if total_workers > 0.0 {
                (*n as f64 * need / total_workers * 100.0).clamp(0.0, 100.0)
            } else {
                0.0
            };
            AllocationTarget {
                producer_id: d.producer.id.clone(),
                resolved_mode: d.mode,
                target_unit_count: *n,
                target_percent_of_workforce: percent,
            }
        })
        .collect();
    let workers_assigned = units.iter().map(|(_, need, n)| *n as f64 * need).sum();

    AllocationOutcome {
        targets,
        unplaced,
        worker_budget,
        workers_assigned,
        rescaled,
    }
}
