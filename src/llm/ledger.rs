use super::Usage;
use serde::Serialize;

/// Estimated USD cost per prompt token.
pub const PROMPT_TOKEN_RATE: f64 = 0.00001;

/// Estimated USD cost per completion token.
pub const COMPLETION_TOKEN_RATE: f64 = 0.00002;

/// Point-in-time copy of the ledger counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

impl UsageStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64 * 100.0
        }
    }
}

/// Running request, token and cost totals for one client.
///
/// Only terminal outcomes are recorded: one entry per call, never per attempt.
#[derive(Debug, Default)]
pub struct UsageLedger {
    stats: UsageStats,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, usage: &Usage) {
        self.stats.total_requests += 1;
        self.stats.successful_requests += 1;
        self.stats.total_tokens += u64::from(usage.total_tokens);
        self.stats.total_cost += estimate_cost(usage);
    }

    pub fn record_failure(&mut self) {
        self.stats.total_requests += 1;
        self.stats.failed_requests += 1;
    }

    pub fn snapshot(&self) -> UsageStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.stats = UsageStats::default();
    }
}

pub fn estimate_cost(usage: &Usage) -> f64 {
    f64::from(usage.prompt_tokens) * PROMPT_TOKEN_RATE
        + f64::from(usage.completion_tokens) * COMPLETION_TOKEN_RATE
}
