use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::error::{ConfigError, RunError, RunResult};
use super::types::{AggregateResult, SimulationConfig};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalibrationParameter {
    WorkIncomeStart,
    AnnualSpendingStart,
    InitialBalance,
    BenefitStartAmount,
}

impl CalibrationParameter {
    pub fn apply(self, config: &mut SimulationConfig, value: f64) {
        match self {
            CalibrationParameter::WorkIncomeStart => config.work_income_start = value,
            CalibrationParameter::AnnualSpendingStart => config.annual_spending_start = value,
            CalibrationParameter::InitialBalance => config.initial_balance = value,
            CalibrationParameter::BenefitStartAmount => config.benefit_start_amount = value,
        }
    }

    fn increases_statistic(self) -> bool {
        !matches!(self, CalibrationParameter::AnnualSpendingStart)
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalibrationStatistic {
    #[default]
    MedianTerminalBalance,
    SuccessRate,
}

impl CalibrationStatistic {
    pub fn read(self, aggregate: &AggregateResult) -> f64 {
        match self {
            CalibrationStatistic::MedianTerminalBalance => aggregate.median_terminal_balance,
            CalibrationStatistic::SuccessRate => aggregate.success_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationRequest {
    pub parameter: CalibrationParameter,
    #[serde(default)]
    pub statistic: CalibrationStatistic,
    pub target: f64,
    pub low: f64,
    pub high: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl CalibrationRequest {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.low.is_finite() || !self.high.is_finite() {
            return Err(ConfigError::Calibration("bounds must be finite".to_string()));
        }
        if self.high <= self.low {
            return Err(ConfigError::Calibration(
                "high bound must be greater than low bound".to_string(),
            ));
        }
        if !self.target.is_finite() {
            return Err(ConfigError::Calibration("target must be finite".to_string()));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ConfigError::Calibration("tolerance must be > 0".to_string()));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Calibration(
                "max_iterations must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BisectionStep {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate: f64,
    pub statistic: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bisection {
    pub value: f64,
    pub converged: bool,
    pub iterations: Vec<BisectionStep>,
}

/// Bisection over `[low, high]` for an `evaluate` assumed non-decreasing.
/// A midpoint scoring below `target` raises the lower bound, anything else
/// lowers the upper bound. Stops once the bracket is no wider than
/// `tolerance` or after `max_iterations`, and returns the final midpoint.
pub fn bisect<F, E>(
    low: f64,
    high: f64,
    target: f64,
    tolerance: f64,
    max_iterations: u32,
    mut evaluate: F,
) -> Result<Bisection, E>
where
    F: FnMut(f64) -> Result<f64, E>,
{
    let mut lo = low;
    let mut hi = high;
    let mut iterations = Vec::new();

    while hi - lo > tolerance && (iterations.len() as u32) < max_iterations {
        let mid = (lo + hi) * 0.5;
        let statistic = evaluate(mid)?;
        iterations.push(BisectionStep {
            iteration: iterations.len() as u32 + 1,
            lower_bound: lo,
            upper_bound: hi,
            candidate: mid,
            statistic,
        });

        if statistic < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    Ok(Bisection {
        value: (lo + hi) * 0.5,
        converged: hi - lo <= tolerance,
        iterations,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationResult {
    pub parameter: CalibrationParameter,
    pub statistic: CalibrationStatistic,
    pub target: f64,
    pub value: f64,
    pub achieved: f64,
    pub converged: bool,
    pub iterations: Vec<BisectionStep>,
    pub config: SimulationConfig,
    pub aggregate: AggregateResult,
}

pub fn calibrate<F>(
    base: &SimulationConfig,
    request: &CalibrationRequest,
    mut run_batch: F,
) -> RunResult<CalibrationResult>
where
    F: FnMut(&SimulationConfig) -> AggregateResult,
{
    request.validate()?;

    // Decreasing relations are searched on the negated statistic.
    let sign = if request.parameter.increases_statistic() {
        1.0
    } else {
        -1.0
    };

    let mut evaluate_at = |candidate: f64| -> RunResult<(SimulationConfig, AggregateResult)> {
        let mut config = base.clone();
        request.parameter.apply(&mut config, candidate);
        let aggregate = run_batch(&config);
        if aggregate.total_runs == 0 {
            return Err(RunError::EmptyCalibrationSample { candidate });
        }
        Ok((config, aggregate))
    };

    let search = bisect(
        request.low,
        request.high,
        sign * request.target,
        request.tolerance,
        request.max_iterations,
        |candidate| {
            let (_, aggregate) = evaluate_at(candidate)?;
            let statistic = request.statistic.read(&aggregate);
            debug!(
                "calibrating {:?}: candidate {:.4} -> {:?} {:.4}",
                request.parameter, candidate, request.statistic, statistic
            );
            Ok::<f64, RunError>(sign * statistic)
        },
    )?;

    let (config, aggregate) = evaluate_at(search.value)?;
    let achieved = request.statistic.read(&aggregate);
    info!(
        "calibrated {:?} = {:.4} after {} iterations (converged: {}), {:?} {:.4} vs target {:.4}",
        request.parameter,
        search.value,
        search.iterations.len(),
        search.converged,
        request.statistic,
        achieved,
        request.target
    );

    let iterations = search
        .iterations
        .into_iter()
        .map(|step| BisectionStep {
            statistic: sign * step.statistic,
            ..step
        })
        .collect();

    Ok(CalibrationResult {
        parameter: request.parameter,
        statistic: request.statistic,
        target: request.target,
        value: search.value,
        achieved,
        converged: search.converged,
        iterations,
        config,
        aggregate,
    })
}
