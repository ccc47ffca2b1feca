use serde::{Deserialize, Serialize};

use super::error::ConfigError;

const WEIGHT_TOLERANCE: f64 = 1e-9;

pub const MAX_HORIZON_YEARS: u32 = 200;
pub const MAX_HISTOGRAM_BUCKETS: usize = 10_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpendingPhase {
    Accumulation,
    GoGo,
    SlowGo,
    NoGo,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSchedule {
    pub go_go_age: u32,
    pub slow_go_age: u32,
    pub no_go_age: u32,
    pub slow_go_factor: f64,
    pub no_go_factor: f64,
}

impl Default for PhaseSchedule {
    fn default() -> Self {
        Self {
            go_go_age: 67,
            slow_go_age: 75,
            no_go_age: 85,
            slow_go_factor: 0.5,
            no_go_factor: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramSpec {
    pub bucket_width: f64,
    pub bucket_count: usize,
}

impl Default for HistogramSpec {
    fn default() -> Self {
        Self {
            bucket_width: 250_000.0,
            bucket_count: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    pub initial_balance: f64,
    pub current_age: u32,
    pub retirement_age: u32,
    pub benefit_start_age: u32,
    pub horizon_years: u32,
    /// Calendar year of the first simulated year. Replay paths substitute
    /// their own start year.
    pub start_year: i32,
    pub annual_spending_start: f64,
    pub inflation_rate: f64,
    pub benefit_start_amount: f64,
    pub cola_rate: f64,
    pub dividend_yield: f64,
    pub stock_allocation: f64,
    pub bond_allocation: f64,
    pub cash_allocation: f64,
    pub bond_return: f64,
    pub cash_return: f64,
    pub work_income_start: f64,
    pub work_income_end: f64,
    pub target_end_balance: f64,
    pub reserve_rate: f64,
    pub failure_threshold: f64,
    pub phases: PhaseSchedule,
    pub histogram: HistogramSpec,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_balance: 1_000_000.0,
            current_age: 50,
            retirement_age: 67,
            benefit_start_age: 67,
            horizon_years: 30,
            start_year: 2025,
            annual_spending_start: 60_000.0,
            inflation_rate: 0.03,
            benefit_start_amount: 30_000.0,
            cola_rate: 0.02,
            dividend_yield: 0.02,
            stock_allocation: 0.6,
            bond_allocation: 0.3,
            cash_allocation: 0.1,
            bond_return: 0.04,
            cash_return: 0.02,
            work_income_start: 50_000.0,
            work_income_end: 0.0,
            target_end_balance: 0.0,
            reserve_rate: 0.02,
            failure_threshold: 0.75,
            phases: PhaseSchedule::default(),
            histogram: HistogramSpec::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon_years == 0 {
            return Err(ConfigError::EmptyHorizon);
        }
        if self.horizon_years > MAX_HORIZON_YEARS {
            return Err(ConfigError::HorizonTooLong {
                max: MAX_HORIZON_YEARS,
                got: self.horizon_years,
            });
        }
        if self.current_age.checked_add(self.horizon_years).is_none() {
            return Err(ConfigError::AgeOverflow {
                current_age: self.current_age,
                horizon_years: self.horizon_years,
            });
        }
        self.check_calendar_span(self.start_year)?;
        if self.retirement_age < self.current_age {
            return Err(ConfigError::RetirementBeforeCurrentAge {
                current_age: self.current_age,
                retirement_age: self.retirement_age,
            });
        }

        for (name, value) in [
            ("initial_balance", self.initial_balance),
            ("annual_spending_start", self.annual_spending_start),
            ("inflation_rate", self.inflation_rate),
            ("benefit_start_amount", self.benefit_start_amount),
            ("cola_rate", self.cola_rate),
            ("dividend_yield", self.dividend_yield),
            ("stock_allocation", self.stock_allocation),
            ("bond_allocation", self.bond_allocation),
            ("cash_allocation", self.cash_allocation),
            ("bond_return", self.bond_return),
            ("cash_return", self.cash_return),
            ("work_income_start", self.work_income_start),
            ("work_income_end", self.work_income_end),
            ("target_end_balance", self.target_end_balance),
            ("reserve_rate", self.reserve_rate),
            ("failure_threshold", self.failure_threshold),
            ("slow_go_factor", self.phases.slow_go_factor),
            ("no_go_factor", self.phases.no_go_factor),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name });
            }
        }

        for (name, value) in [
            ("stock_allocation", self.stock_allocation),
            ("bond_allocation", self.bond_allocation),
            ("cash_allocation", self.cash_allocation),
        ] {
            if value < 0.0 {
                return Err(ConfigError::NegativeWeight { name, value });
            }
        }
        let sum = self.stock_allocation + self.bond_allocation + self.cash_allocation;
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::WeightsDoNotSumToOne { sum });
        }

        for (name, value) in [
            ("inflation_rate", self.inflation_rate),
            ("cola_rate", self.cola_rate),
            ("reserve_rate", self.reserve_rate),
        ] {
            if value <= -1.0 {
                return Err(ConfigError::RateTooLow { name, value });
            }
        }

        if self.failure_threshold <= 0.0 || self.failure_threshold > 1.0 {
            return Err(ConfigError::FailureThreshold(self.failure_threshold));
        }
        if !self.histogram.bucket_width.is_finite()
            || self.histogram.bucket_width <= 0.0
            || self.histogram.bucket_count == 0
        {
            return Err(ConfigError::Histogram);
        }
        if self.histogram.bucket_count > MAX_HISTOGRAM_BUCKETS {
            return Err(ConfigError::TooManyBuckets {
                max: MAX_HISTOGRAM_BUCKETS,
                got: self.histogram.bucket_count,
            });
        }
        let phases = &self.phases;
        if phases.go_go_age > phases.slow_go_age || phases.slow_go_age > phases.no_go_age {
            return Err(ConfigError::PhaseOrder);
        }
        Ok(())
    }

    /// Rejects a first calendar year whose horizon would run past `i32::MAX`.
    /// Replay start years go through the same check.
    pub fn check_calendar_span(&self, first_calendar_year: i32) -> Result<(), ConfigError> {
        let span = self.horizon_years.saturating_sub(1);
        match i32::try_from(span)
            .ok()
            .and_then(|span| first_calendar_year.checked_add(span))
        {
            Some(_) => Ok(()),
            None => Err(ConfigError::CalendarOverflow {
                start_year: first_calendar_year,
            }),
        }
    }

    pub fn blended_return(&self, stock_return: f64) -> f64 {
        self.stock_allocation * stock_return
            + self.bond_allocation * self.bond_return
            + self.cash_allocation * self.cash_return
    }

    pub fn age_in_year(&self, year_index: u32) -> u32 {
        self.current_age + year_index
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRecord {
    pub calendar_year: i32,
    pub age: u32,
    pub phase: SpendingPhase,
    pub start_balance: f64,
    pub blended_return: f64,
    pub dividend_income: f64,
    pub work_income: f64,
    pub benefit_income: f64,
    pub requested_spending: f64,
    pub actual_spending: f64,
    pub spend_fraction: f64,
    pub end_balance: f64,
    pub net_change: f64,
    pub failure: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StartCondition {
    Seed(u64),
    StartYear(i32),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathResult {
    pub start: StartCondition,
    pub terminal_balance: f64,
    pub failure_years: u32,
    pub years: Vec<YearRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl PathResult {
    pub fn is_success(&self, target_end_balance: f64) -> bool {
        self.terminal_balance >= target_end_balance && self.failure_years == 0
    }
}

/// Outcome of one path. `Unresolved` marks a replay start year that neither
/// return table knows about; it carries no balance at all.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PathOutcome {
    Completed(PathResult),
    Unresolved {
        #[serde(rename = "startYear")]
        start_year: i32,
    },
}

impl PathOutcome {
    pub fn completed(&self) -> Option<&PathResult> {
        match self {
            PathOutcome::Completed(path) => Some(path),
            PathOutcome::Unresolved { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBucket {
    pub lower_bound: f64,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub total_runs: usize,
    pub successes: usize,
    pub failures: usize,
    pub unresolved: usize,
    pub unresolved_start_years: Vec<i32>,
    pub success_rate: f64,
    pub success_ci_half_width: f64,
    pub min_terminal_balance: f64,
    pub max_terminal_balance: f64,
    pub median_terminal_balance: f64,
    pub p10_terminal_balance: f64,
    pub p90_terminal_balance: f64,
    pub mean_failure_years: f64,
    pub histogram: Vec<HistogramBucket>,
    pub paths: Vec<PathResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SimulationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_empty_horizon() {
        let config = SimulationConfig {
            horizon_years: 0,
            ..SimulationConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyHorizon));
    }

    #[test]
    fn validate_rejects_retirement_before_current_age() {
        let config = SimulationConfig {
            current_age: 60,
            retirement_age: 55,
            ..SimulationConfig::default()
        };
        let err = config.validate().expect_err("must reject");
        assert!(err.to_string().contains("retirement_age"));
    }

    #[test]
    fn validate_accepts_weights_within_tolerance() {
        let config = SimulationConfig {
            stock_allocation: 0.1 + 0.2,
            bond_allocation: 0.7,
            cash_allocation: 0.0,
            ..SimulationConfig::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_weights_not_summing_to_one() {
        let config = SimulationConfig {
            stock_allocation: 0.6,
            bond_allocation: 0.3,
            cash_allocation: 0.2,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WeightsDoNotSumToOne { .. })
        ));
    }

    #[test]
    fn validate_rejects_negative_weight_even_when_sum_is_one() {
        let config = SimulationConfig {
            stock_allocation: 1.2,
            bond_allocation: -0.2,
            cash_allocation: 0.0,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NegativeWeight {
                name: "bond_allocation",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_failure_threshold() {
        for threshold in [0.0, -0.5, 1.5] {
            let config = SimulationConfig {
                failure_threshold: threshold,
                ..SimulationConfig::default()
            };
            assert_eq!(
                config.validate(),
                Err(ConfigError::FailureThreshold(threshold))
            );
        }
    }

    #[test]
    fn validate_rejects_non_finite_inputs() {
        let config = SimulationConfig {
            initial_balance: f64::NAN,
            ..SimulationConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonFinite {
                name: "initial_balance"
            })
        );
    }

    #[test]
    fn validate_rejects_ages_that_overflow_over_the_horizon() {
        let config = SimulationConfig {
            current_age: u32::MAX - 5,
            retirement_age: u32::MAX,
            benefit_start_age: u32::MAX,
            ..SimulationConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::AgeOverflow {
                current_age: u32::MAX - 5,
                horizon_years: 30,
            })
        );
    }

    #[test]
    fn validate_rejects_calendar_years_past_i32_max() {
        let config = SimulationConfig {
            start_year: i32::MAX - 5,
            ..SimulationConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::CalendarOverflow {
                start_year: i32::MAX - 5
            })
        );

        let last_fit = SimulationConfig {
            start_year: i32::MAX - 29,
            ..SimulationConfig::default()
        };
        assert_eq!(last_fit.validate(), Ok(()));
        assert_eq!(
            last_fit.check_calendar_span(i32::MAX - 28),
            Err(ConfigError::CalendarOverflow {
                start_year: i32::MAX - 28
            })
        );
    }

    #[test]
    fn validate_caps_horizon_and_bucket_count() {
        let long = SimulationConfig {
            horizon_years: u32::MAX,
            ..SimulationConfig::default()
        };
        assert_eq!(
            long.validate(),
            Err(ConfigError::HorizonTooLong {
                max: MAX_HORIZON_YEARS,
                got: u32::MAX,
            })
        );

        let max_horizon = SimulationConfig {
            horizon_years: MAX_HORIZON_YEARS,
            ..SimulationConfig::default()
        };
        assert_eq!(max_horizon.validate(), Ok(()));

        let wide = SimulationConfig {
            histogram: HistogramSpec {
                bucket_width: 1.0,
                bucket_count: usize::MAX,
            },
            ..SimulationConfig::default()
        };
        assert_eq!(
            wide.validate(),
            Err(ConfigError::TooManyBuckets {
                max: MAX_HISTOGRAM_BUCKETS,
                got: usize::MAX,
            })
        );
    }

    #[test]
    fn blended_return_weights_each_leg() {
        let config = SimulationConfig {
            stock_allocation: 0.5,
            bond_allocation: 0.3,
            cash_allocation: 0.2,
            bond_return: 0.04,
            cash_return: 0.01,
            ..SimulationConfig::default()
        };
        let blended = config.blended_return(0.10);
        assert!((blended - (0.05 + 0.012 + 0.002)).abs() < 1e-12);
    }

    #[test]
    fn path_success_requires_target_and_no_failure_years() {
        let path = PathResult {
            start: StartCondition::Seed(1),
            terminal_balance: 500.0,
            failure_years: 0,
            years: Vec::new(),
            annotation: None,
        };
        assert!(path.is_success(500.0));
        assert!(!path.is_success(500.01));

        let shortfall = PathResult {
            failure_years: 1,
            ..path
        };
        assert!(!shortfall.is_success(0.0));
    }
}
