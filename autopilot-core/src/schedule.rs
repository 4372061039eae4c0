/// Reference bounds used by the browser host.
pub const MIN_REFERENCE_PERIOD_MS: f64 = 500.0;
pub const MAX_REFERENCE_PERIOD_MS: f64 = 5_000.0;
pub const DEFAULT_PERIOD_MS: f64 = 1_000.0;

/// Fixed-period gate for a host-driven timer.
///
/// The host calls [`TickSchedule::poll`] whenever its timer fires. A tick is due
/// once a full period has passed since the last one. Late polls do not queue
/// up extra ticks: a delayed tick simply runs once and the period restarts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSchedule {
    period_ms: f64,
    next_due_ms: Option<f64>,
}

impl TickSchedule {
    /// Any positive period. Non-positive or non-finite input uses the default.
    pub fn new(period_ms: f64) -> Self {
        let period_ms = if period_ms.is_finite() && period_ms > 0.0 {
            period_ms
        } else {
            DEFAULT_PERIOD_MS
        };
        Self {
            period_ms,
            next_due_ms: None,
        }
    }

    /// Period clamped to the browser host's 500..=5000 ms range.
    pub fn reference(period_ms: f64) -> Self {
        let schedule = Self::new(period_ms);
        Self::new(
            schedule
                .period_ms
                .clamp(MIN_REFERENCE_PERIOD_MS, MAX_REFERENCE_PERIOD_MS),
        )
    }

    pub fn period_ms(&self) -> f64 {
        self.period_ms
    }

    /// Returns true and arms the next deadline when a tick should run at `now_ms`.
    pub fn poll(&mut self, now_ms: f64) -> bool {
        match self.next_due_ms {
            Some(due) if now_ms < due => false,
            _ => {
                self.next_due_ms = Some(now_ms + self.period_ms);
                true
            }
        }
    }
}

impl Default for TickSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_poll_is_due() {
        let mut schedule = TickSchedule::new(1_000.0);
        assert!(schedule.poll(0.0));
        assert!(!schedule.poll(999.0));
        assert!(schedule.poll(1_000.0));
    }

    #[test]
    fn test_late_poll_runs_once() {
        let mut schedule = TickSchedule::new(100.0);
        assert!(schedule.poll(0.0));
        assert!(schedule.poll(750.0));
        assert!(!schedule.poll(800.0));
        assert!(schedule.poll(850.0));
    }

    #[test]
    fn test_reference_range_clamped() {
        assert_eq!(TickSchedule::reference(50.0).period_ms(), 500.0);
        assert_eq!(TickSchedule::reference(60_000.0).period_ms(), 5_000.0);
        assert_eq!(TickSchedule::new(50.0).period_ms(), 50.0);
        assert_eq!(TickSchedule::new(-3.0).period_ms(), DEFAULT_PERIOD_MS);
    }
}
