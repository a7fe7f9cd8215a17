use std::time::{Duration, Instant};

/// Wall-clock budget for one uninterrupted stretch of import work.
///
/// The budget is owned by a single [`TaskQueue`](crate::TaskQueue) instance
/// and restarted every time control returns to the driving loop, so
/// concurrent imports never observe each other's timers. CPU-bound steps
/// poll [`exhausted`](TimeBudget::exhausted) inside their loops and yield
/// when it trips.
#[derive(Debug, Clone)]
pub struct TimeBudget {
    started: Instant,
    limit: Duration,
}

impl TimeBudget {
    /// Default per-resumption budget, roughly half of a 60 Hz frame.
    pub const DEFAULT_LIMIT: Duration = Duration::from_millis(8);

    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// Restarts the timer. Called by the queue immediately after each yield
    /// back to the caller.
    pub fn restart(&mut self) {
        self.started = Instant::now();
    }

    /// True once the elapsed time since the last restart exceeds the limit.
    pub fn exhausted(&self) -> bool {
        self.started.elapsed() >= self.limit
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}

impl Default for TimeBudget {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_is_immediately_exhausted() {
        let budget = TimeBudget::new(Duration::ZERO);
        assert!(budget.exhausted());
    }

    #[test]
    fn generous_budget_is_not_exhausted() {
        let budget = TimeBudget::new(Duration::from_secs(60));
        assert!(!budget.exhausted());
    }

    #[test]
    fn restart_resets_the_clock() {
        let mut budget = TimeBudget::new(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(2));
        assert!(budget.exhausted());
        budget.restart();
        assert!(!budget.exhausted());
    }
}
