use std::time::Duration;

use crate::spe_api::fee_calculator::FeeSchedule;

/// Runtime parameters for the settlement flow. Passed into the APIs rather than read from globals, so tests can run
/// alternative fee schedules side by side.
#[derive(Debug, Clone, Copy)]
pub struct SettlementConfig {
    pub fees: FeeSchedule,
    /// Upper bound on every provider call
    pub provider_timeout: Duration,
    /// Maximum number of reserve transfers the sweeper has in flight at once
    pub sweep_parallelism: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self { fees: FeeSchedule::default(), provider_timeout: Duration::from_secs(20), sweep_parallelism: 4 }
    }
}

impl SettlementConfig {
    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_sweep_parallelism(mut self, parallelism: usize) -> Self {
        self.sweep_parallelism = parallelism.max(1);
        self
    }
}
