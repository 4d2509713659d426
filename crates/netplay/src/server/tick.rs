use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPacing {
    Sleep(Duration),
    Behind { skipped: u32 },
}

impl TickPacing {
    /// Decides what follows a tick that took `elapsed` out of `budget`. An
    /// overrun never sleeps; it reports `elapsed / budget - 1` whole ticks
    /// lost, never less than zero.
    pub fn evaluate(elapsed: Duration, budget: Duration) -> Self {
        if elapsed < budget {
            return TickPacing::Sleep(budget - elapsed);
        }

        let budget_nanos = budget.as_nanos().max(1);
        let ticks = elapsed.as_nanos() / budget_nanos;
        let skipped = ticks.saturating_sub(1).min(u32::MAX as u128) as u32;
        TickPacing::Behind { skipped }
    }
}
