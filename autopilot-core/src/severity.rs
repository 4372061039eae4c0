use crate::types::ResourceState;

/// Largest boost a draining resource can earn from its deficit alone.
pub const DEFICIT_BOOST_CAP: f64 = 1.5;
pub const LOW_FILL: f64 = 0.15;
pub const CRITICAL_FILL: f64 = 0.05;
pub const LOW_FILL_BOOST: f64 = 0.5;

/// Urgency multiplier for a resource's configured weight. Always `>= 1`.
///
/// A draining resource earns up to [`DEFICIT_BOOST_CAP`] proportional to how
/// fast it drains relative to its consumption. A nearly empty store earns
/// [`LOW_FILL_BOOST`] below [`LOW_FILL`] and the same again below
/// [`CRITICAL_FILL`].
pub fn severity_boost(state: &ResourceState) -> f64 {
    let mut boost = 1.0;

    let net = state.net_rate();
    if net < 0.0 {
        boost += (-net / state.consumption_rate.max(1.0)).min(DEFICIT_BOOST_CAP);
    }

    if let Some(fill) = state.fill_ratio() {
        if fill < LOW_FILL {
            boost += LOW_FILL_BOOST;
            if fill < CRITICAL_FILL {
                boost += LOW_FILL_BOOST;
            }
        }
    }

    boost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_resource_has_unit_boost() {
        let state = ResourceState::new("wood").with_stock(50.0, 100.0);
        assert_eq!(severity_boost(&state), 1.0);
    }

    #[test]
    fn test_deficit_boost_relative_to_consumption() {
        // net = -2, consumption = 4 -> +0.5
        let state = ResourceState::new("food").with_rates(2.0, 4.0);
        assert!((severity_boost(&state) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_deficit_boost_capped() {
        // net = -0.5 with consumption below 1: divides by 1, not 0.5
        let state = ResourceState::new("food").with_rates(0.0, 0.5);
        assert!((severity_boost(&state) - 1.5).abs() < 1e-12);

        // negative production can push the ratio past the cap
        let state = ResourceState::new("food").with_rates(-5.0, 2.0);
        assert!((severity_boost(&state) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_low_and_critical_fill() {
        let low = ResourceState::new("ore").with_stock(10.0, 100.0);
        assert_eq!(severity_boost(&low), 1.5);

        let critical = ResourceState::new("ore").with_stock(4.0, 100.0);
        assert_eq!(severity_boost(&critical), 2.0);
    }

    #[test]
    fn test_unknown_cap_ignores_fill() {
        let state = ResourceState::new("science").with_stock(0.0, 0.0);
        assert_eq!(severity_boost(&state), 1.0);
    }

    #[test]
    fn test_all_boosts_stack() {
        let state = ResourceState::new("food")
            .with_stock(1.0, 100.0)
            .with_rates(0.0, 10.0);
        assert!((severity_boost(&state) - 3.0).abs() < 1e-12);
    }
}
