use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::EngineError;
use crate::types::{PolicyMap, ResourceId, ResourcePolicy, ResourceState};

/// Host-side owner of the policy map.
///
/// Ticks read an `Arc` snapshot taken once at tick start; edits made while a
/// tick holds that snapshot copy the map instead of mutating it, so no tick
/// ever sees a half-applied change.
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    policies: Arc<PolicyMap>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_policies(policies: impl IntoIterator<Item = ResourcePolicy>) -> Self {
        let mut store = Self::new();
        for policy in policies {
            store.upsert(policy);
        }
        store
    }

    /// Immutable view for one tick.
    pub fn snapshot(&self) -> Arc<PolicyMap> {
        Arc::clone(&self.policies)
    }

    pub fn get(&self, resource_id: &str) -> Option<&ResourcePolicy> {
        self.policies.get(resource_id)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourcePolicy> {
        self.policies.values()
    }

    /// Insert or replace a policy. The weight is clamped into `[0, 10]`.
    pub fn upsert(&mut self, mut policy: ResourcePolicy) {
        policy.weight = policy.clamped_weight();
        Arc::make_mut(&mut self.policies).insert(policy.resource_id.clone(), policy);
    }

    /// Edit one policy in place, creating the default first if it is missing.
    pub fn update(&mut self, resource_id: &str, edit: impl FnOnce(&mut ResourcePolicy)) {
        let policies = Arc::make_mut(&mut self.policies);
        let policy = policies
            .entry(resource_id.to_string())
            .or_insert_with(|| ResourcePolicy::new(resource_id));
        edit(policy);
        policy.weight = policy.clamped_weight();
    }

    /// Create default policies for ids never seen before. Returns how many were added.
    pub fn ensure_defaults<'a>(&mut self, ids: impl IntoIterator<Item = &'a ResourceId>) -> usize {
        let missing: Vec<&ResourceId> = ids
            .into_iter()
            .filter(|id| !self.policies.contains_key(*id))
            .collect();
        if missing.is_empty() {
            return 0;
        }
        let policies = Arc::make_mut(&mut self.policies);
        for id in &missing {
            policies.insert((*id).clone(), ResourcePolicy::new((*id).clone()));
        }
        missing.len()
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        let list: Vec<&ResourcePolicy> = self.policies.values().collect();
        serde_json::to_string(&list).map_err(|source| EngineError::Encode {
            what: "policies",
            source,
        })
    }

    /// Accepts the list produced by [`PolicyStore::to_json`].
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let list: Vec<ResourcePolicy> =
            serde_json::from_str(json).map_err(|source| EngineError::Decode {
                what: "policies",
                source,
            })?;
        Ok(Self::from_policies(list))
    }
}

/// Resource ids present in the snapshot with no policy yet, in id order.
pub fn unseen_resource_ids(
    resources: &BTreeMap<ResourceId, ResourceState>,
    policies: &PolicyMap,
) -> Vec<ResourceId> {
    resources
        .keys()
        .filter(|id| !policies.contains_key(*id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Mode;

    #[test]
    fn test_snapshot_isolated_from_later_edits() {
        let mut store = PolicyStore::new();
        store.upsert(ResourcePolicy::new("wood").with_mode(Mode::On));

        let snapshot = store.snapshot();
        store.update("wood", |p| p.mode = Mode::Off);
        store.upsert(ResourcePolicy::new("iron").buying());

        assert_eq!(snapshot["wood"].mode, Mode::On);
        assert!(!snapshot.contains_key("iron"));
        assert_eq!(store.get("wood").unwrap().mode, Mode::Off);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_ensure_defaults_only_adds_missing() {
        let mut store = PolicyStore::new();
        store.upsert(ResourcePolicy::new("wood").with_weight(4.0));

        let ids = vec!["wood".to_string(), "stone".to_string()];
        assert_eq!(store.ensure_defaults(&ids), 1);
        assert_eq!(store.ensure_defaults(&ids), 0);

        let stone = store.get("stone").unwrap();
        assert_eq!(stone.mode, Mode::Off);
        assert_eq!(stone.weight, 1.0);
        assert!(!stone.market_buy && !stone.market_sell);
        assert_eq!(store.get("wood").unwrap().weight, 4.0);
    }

    #[test]
    fn test_update_clamps_weight() {
        let mut store = PolicyStore::new();
        store.update("gold", |p| p.weight = 99.0);
        assert_eq!(store.get("gold").unwrap().weight, 10.0);
    }

    #[test]
    fn test_json_round_trip_keeps_preferences() {
        let mut store = PolicyStore::new();
        store.upsert(
            ResourcePolicy::new("food")
                .with_mode(Mode::Balance)
                .preferring("farm")
                .selling(),
        );

        let json = store.to_json().unwrap();
        assert!(json.contains("\"preferredProducerId\":\"farm\""));

        let restored = PolicyStore::from_json(&json).unwrap();
        assert_eq!(restored.get("food"), store.get("food"));
    }

    #[test]
    fn test_unseen_ids() {
        let mut resources = BTreeMap::new();
        resources.insert("a".to_string(), ResourceState::new("a"));
        resources.insert("b".to_string(), ResourceState::new("b"));
        let mut policies = PolicyMap::new();
        policies.insert("a".to_string(), ResourcePolicy::new("a"));

        assert_eq!(unseen_resource_ids(&resources, &policies), vec!["b".to_string()]);
    }
}
