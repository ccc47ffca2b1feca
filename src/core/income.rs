use super::types::SimulationConfig;

/// Work income tapers linearly from `work_income_start` at the current age to
/// `work_income_end` at retirement, and never drops below `work_income_end`.
pub fn work_income(age: u32, config: &SimulationConfig) -> f64 {
    if age >= config.retirement_age || config.retirement_age == config.current_age {
        return config.work_income_end;
    }

    let span = (config.retirement_age - config.current_age) as f64;
    let progress = (age.saturating_sub(config.current_age) as f64 / span).clamp(0.0, 1.0);
    let interpolated = config.work_income_start
        + (config.work_income_end - config.work_income_start) * progress;
    interpolated.max(config.work_income_end)
}

pub fn benefit_income(age: u32, config: &SimulationConfig) -> f64 {
    if age < config.benefit_start_age {
        return 0.0;
    }
    let years_indexed = (age - config.benefit_start_age) as i32;
    config.benefit_start_amount * (1.0 + config.cola_rate).powi(years_indexed)
}
