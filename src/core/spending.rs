use super::types::{PhaseSchedule, SimulationConfig, SpendingPhase};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpendingDecision {
    pub phase: SpendingPhase,
    pub requested: f64,
    pub reserve: f64,
    pub actual: f64,
    pub failure: bool,
}

/// Per-path withdrawal state. The requested amount escalates every year and
/// is never reset, whatever the policy actually manages to spend.
#[derive(Debug, Clone)]
pub struct SpendingPolicy {
    requested: f64,
}

impl SpendingPolicy {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            requested: config.annual_spending_start,
        }
    }

    pub fn requested(&self) -> f64 {
        self.requested
    }

    pub fn decide(
        &mut self,
        config: &SimulationConfig,
        year_index: u32,
        available: f64,
    ) -> SpendingDecision {
        let age = config.age_in_year(year_index);
        let phase = phase_for_age(age, &config.phases);
        self.requested *= 1.0 + phase_rate(phase, config);

        let reserve = reserve_floor(config, year_index);
        let actual = actual_spending(self.requested, available, reserve);
        SpendingDecision {
            phase,
            requested: self.requested,
            reserve,
            actual,
            failure: is_failure_year(actual, self.requested, config.failure_threshold),
        }
    }
}

pub fn phase_for_age(age: u32, phases: &PhaseSchedule) -> SpendingPhase {
    if age >= phases.no_go_age {
        SpendingPhase::NoGo
    } else if age >= phases.slow_go_age {
        SpendingPhase::SlowGo
    } else if age >= phases.go_go_age {
        SpendingPhase::GoGo
    } else {
        SpendingPhase::Accumulation
    }
}

pub fn phase_rate(phase: SpendingPhase, config: &SimulationConfig) -> f64 {
    match phase {
        SpendingPhase::Accumulation | SpendingPhase::GoGo => config.inflation_rate,
        SpendingPhase::SlowGo => config.inflation_rate * config.phases.slow_go_factor,
        SpendingPhase::NoGo => config.inflation_rate * config.phases.no_go_factor,
    }
}

pub fn reserve_floor(config: &SimulationConfig, year_index: u32) -> f64 {
    let years_remaining = config
        .horizon_years
        .saturating_sub(year_index.saturating_add(1));
    config.target_end_balance / (1.0 + config.reserve_rate).powi(years_remaining as i32)
}

pub fn actual_spending(requested: f64, available: f64, reserve: f64) -> f64 {
    requested
        .min(available - reserve)
        .max(0.0)
        .min(available.max(0.0))
}

pub fn is_failure_year(actual: f64, requested: f64, threshold: f64) -> bool {
    actual < requested * threshold
}
