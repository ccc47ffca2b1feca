use log::info;
use serde::{Deserialize, Serialize};

use super::aggregate::{run_historical_batch, run_stochastic_batch};
use super::engine::{run_historical_path, run_stochastic_path};
use super::error::{ConfigError, RunResult};
use super::returns::{ReturnTables, StochasticParams};
use super::solver::{CalibrationRequest, CalibrationResult, calibrate};
use super::types::{AggregateResult, PathOutcome, SimulationConfig, StartCondition};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReturnModel {
    Stochastic {
        #[serde(flatten)]
        params: StochasticParams,
        seed: u64,
    },
    Historical(ReturnTables),
}

impl ReturnModel {
    fn validate(&self) -> Result<(), ConfigError> {
        let ReturnModel::Stochastic { params, .. } = self else {
            return Ok(());
        };
        if !params.mean.is_finite() {
            return Err(ConfigError::NonFinite { name: "mean" });
        }
        if !params.stddev.is_finite() {
            return Err(ConfigError::NonFinite { name: "stddev" });
        }
        if params.stddev < 0.0 {
            return Err(ConfigError::NegativeStddev(params.stddev));
        }
        if params.max_clip.is_some_and(f64::is_nan) {
            return Err(ConfigError::NonFinite { name: "max_clip" });
        }
        Ok(())
    }

    fn check_start(&self, start: StartCondition) -> Result<(), ConfigError> {
        match (self, start) {
            (ReturnModel::Stochastic { .. }, StartCondition::Seed(_))
            | (ReturnModel::Historical(_), StartCondition::StartYear(_)) => Ok(()),
            _ => Err(start_mismatch()),
        }
    }
}

fn start_mismatch() -> ConfigError {
    ConfigError::StartConditionMismatch(
        "stochastic paths start from a seed, historical paths from a start year",
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunMode {
    SinglePath {
        start: StartCondition,
    },
    /// `trials` drives stochastic batches and must be 0 for replay, which
    /// runs `start_years` or every viable start year when it is absent.
    #[serde(rename_all = "camelCase")]
    Batch {
        trials: u32,
        #[serde(default)]
        start_years: Option<Vec<i32>>,
    },
    #[serde(rename_all = "camelCase")]
    Calibrate {
        calibration: CalibrationRequest,
        trials: u32,
        #[serde(default)]
        start_years: Option<Vec<i32>>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "result", rename_all = "camelCase")]
pub enum RunOutput {
    Path(PathOutcome),
    Aggregate(AggregateResult),
    Calibrated(CalibrationResult),
}

/// A validated run. Construction is the only place configuration errors
/// surface; nothing is simulated until `execute`.
#[derive(Debug, Clone)]
pub struct RunRequest {
    config: SimulationConfig,
    returns: ReturnModel,
    mode: RunMode,
}

impl RunRequest {
    pub fn new(
        config: SimulationConfig,
        returns: ReturnModel,
        mode: RunMode,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        returns.validate()?;

        let stochastic = matches!(returns, ReturnModel::Stochastic { .. });
        match &mode {
            RunMode::SinglePath { start } => {
                returns.check_start(*start)?;
                if let StartCondition::StartYear(year) = start {
                    config.check_calendar_span(*year)?;
                }
            }
            RunMode::Batch {
                trials,
                start_years,
            }
            | RunMode::Calibrate {
                trials,
                start_years,
                ..
            } => {
                if stochastic && *trials == 0 {
                    return Err(ConfigError::NoTrials);
                }
                if stochastic && start_years.is_some() {
                    return Err(ConfigError::StartConditionMismatch(
                        "start years only apply to historical replay",
                    ));
                }
                if !stochastic && *trials != 0 {
                    return Err(ConfigError::TrialsOnReplay(*trials));
                }
                for year in start_years.iter().flatten() {
                    config.check_calendar_span(*year)?;
                }
            }
        }
        if let RunMode::Calibrate { calibration, .. } = &mode {
            calibration.validate()?;
        }

        Ok(Self {
            config,
            returns,
            mode,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn returns(&self) -> &ReturnModel {
        &self.returns
    }

    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    pub fn execute(&self) -> RunResult<RunOutput> {
        match &self.mode {
            RunMode::SinglePath { start } => {
                info!("running single path from {start:?}");
                self.run_single(*start).map(RunOutput::Path)
            }
            RunMode::Batch {
                trials,
                start_years,
            } => Ok(RunOutput::Aggregate(self.run_batch(
                &self.config,
                *trials,
                start_years.as_deref(),
            ))),
            RunMode::Calibrate {
                calibration,
                trials,
                start_years,
            } => {
                info!(
                    "calibrating {:?} toward {:?} = {}",
                    calibration.parameter, calibration.statistic, calibration.target
                );
                calibrate(&self.config, calibration, |config| {
                    self.run_batch(config, *trials, start_years.as_deref())
                })
                .map(RunOutput::Calibrated)
            }
        }
    }

    fn run_single(&self, start: StartCondition) -> RunResult<PathOutcome> {
        match (&self.returns, start) {
            (ReturnModel::Historical(tables), StartCondition::StartYear(year)) => {
                Ok(run_historical_path(&self.config, tables, year))
            }
            (ReturnModel::Stochastic { params, .. }, StartCondition::Seed(seed)) => Ok(
                PathOutcome::Completed(run_stochastic_path(&self.config, params, seed)),
            ),
            _ => Err(start_mismatch().into()),
        }
    }

    fn run_batch(
        &self,
        config: &SimulationConfig,
        trials: u32,
        start_years: Option<&[i32]>,
    ) -> AggregateResult {
        match &self.returns {
            ReturnModel::Stochastic { params, seed } => {
                run_stochastic_batch(config, params, *seed, trials)
            }
            ReturnModel::Historical(tables) => run_historical_batch(config, tables, start_years),
        }
    }
}
