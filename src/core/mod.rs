mod aggregate;
mod engine;
mod error;
mod income;
mod returns;
mod run;
mod solver;
mod spending;
mod types;

pub use aggregate::{
    aggregate_paths, binomial_ci_half_width, histogram, median, percentile, run_historical_batch,
    run_stochastic_batch,
};
pub use engine::{derive_seed, run_historical_path, run_path, run_stochastic_path, step_year};
pub use error::{ConfigError, RunError, RunResult};
pub use income::{benefit_income, work_income};
pub use returns::{
    ReturnSource, ReturnTable, ReturnTables, SequenceReturnSource, StochasticParams,
    StochasticReturnSource, sample_returns,
};
pub use run::{ReturnModel, RunMode, RunOutput, RunRequest};
pub use solver::{
    Bisection, BisectionStep, CalibrationParameter, CalibrationRequest, CalibrationResult,
    CalibrationStatistic, bisect, calibrate,
};
pub use spending::{
    SpendingDecision, SpendingPolicy, actual_spending, is_failure_year, phase_for_age, phase_rate,
    reserve_floor,
};
pub use types::{
    AggregateResult, HistogramBucket, HistogramSpec, MAX_HISTOGRAM_BUCKETS, MAX_HORIZON_YEARS,
    PathOutcome, PathResult, PhaseSchedule, SimulationConfig, SpendingPhase, StartCondition,
    YearRecord,
};
