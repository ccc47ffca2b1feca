use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("horizon_years must be > 0")]
    EmptyHorizon,

    #[error("horizon_years must be <= {max}, got {got}")]
    HorizonTooLong { max: u32, got: u32 },

    #[error("current_age ({current_age}) plus horizon_years ({horizon_years}) overflows")]
    AgeOverflow {
        current_age: u32,
        horizon_years: u32,
    },

    #[error("a path starting in {start_year} runs past the last representable calendar year")]
    CalendarOverflow { start_year: i32 },

    #[error("retirement_age ({retirement_age}) must be >= current_age ({current_age})")]
    RetirementBeforeCurrentAge {
        current_age: u32,
        retirement_age: u32,
    },

    #[error("allocation weight '{name}' must be >= 0, got {value}")]
    NegativeWeight { name: &'static str, value: f64 },

    #[error("allocation weights must sum to 1, got {sum}")]
    WeightsDoNotSumToOne { sum: f64 },

    #[error("'{name}' must be finite")]
    NonFinite { name: &'static str },

    #[error("'{name}' must be > -1 (a -100% rate), got {value}")]
    RateTooLow { name: &'static str, value: f64 },

    #[error("failure_threshold must be in (0, 1], got {0}")]
    FailureThreshold(f64),

    #[error("histogram bucket width must be > 0 and bucket count > 0")]
    Histogram,

    #[error("histogram bucket count must be <= {max}, got {got}")]
    TooManyBuckets { max: usize, got: usize },

    #[error("spending phase ages must be non-decreasing (go-go <= slow-go <= no-go)")]
    PhaseOrder,

    #[error("stochastic trial count must be > 0")]
    NoTrials,

    #[error("historical replay runs one path per start year; trials must be 0, got {0}")]
    TrialsOnReplay(u32),

    #[error("return stddev must be >= 0, got {0}")]
    NegativeStddev(f64),

    #[error("{0}")]
    StartConditionMismatch(&'static str),

    #[error("calibration {0}")]
    Calibration(String),
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("calibration produced no completed paths at candidate {candidate}")]
    EmptyCalibrationSample { candidate: f64 },
}

pub type RunResult<T> = Result<T, RunError>;
