use axum::{
    Router,
    extract::{Json, Query},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    CalibrationParameter, CalibrationRequest, CalibrationStatistic, ReturnModel, ReturnTables,
    RunMode, RunOutput, RunRequest, SimulationConfig, StartCondition, StochasticParams,
    sample_returns,
};

const DEFAULT_TRIALS: u32 = 10_000;
const DEFAULT_SEED: u64 = 42;
const DEFAULT_MEAN_PCT: f64 = 5.0;
const DEFAULT_STDDEV_PCT: f64 = 5.0;
const DEFAULT_SAMPLE_COUNT: usize = 20;
const MAX_SAMPLE_COUNT: usize = 10_000;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiReturnMode {
    #[default]
    Stochastic,
    #[serde(alias = "replay")]
    Historical,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiRunMode {
    #[serde(alias = "single-path", alias = "singlePath", alias = "path")]
    Single,
    #[default]
    Batch,
    #[serde(alias = "calibration")]
    Calibrate,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiCalibrationParameter {
    #[serde(alias = "workIncomeStart", alias = "work_income_start")]
    WorkIncomeStart,
    #[serde(alias = "annualSpendingStart", alias = "annual_spending_start")]
    AnnualSpendingStart,
    #[serde(alias = "initialBalance", alias = "initial_balance")]
    InitialBalance,
    #[serde(alias = "benefitStartAmount", alias = "benefit_start_amount")]
    BenefitStartAmount,
}

impl From<ApiCalibrationParameter> for CalibrationParameter {
    fn from(value: ApiCalibrationParameter) -> Self {
        match value {
            ApiCalibrationParameter::WorkIncomeStart => CalibrationParameter::WorkIncomeStart,
            ApiCalibrationParameter::AnnualSpendingStart => {
                CalibrationParameter::AnnualSpendingStart
            }
            ApiCalibrationParameter::InitialBalance => CalibrationParameter::InitialBalance,
            ApiCalibrationParameter::BenefitStartAmount => CalibrationParameter::BenefitStartAmount,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiCalibrationStatistic {
    #[serde(alias = "medianTerminalBalance", alias = "median")]
    MedianTerminalBalance,
    #[serde(alias = "successRate")]
    SuccessRate,
}

impl From<ApiCalibrationStatistic> for CalibrationStatistic {
    fn from(value: ApiCalibrationStatistic) -> Self {
        match value {
            ApiCalibrationStatistic::MedianTerminalBalance => {
                CalibrationStatistic::MedianTerminalBalance
            }
            ApiCalibrationStatistic::SuccessRate => CalibrationStatistic::SuccessRate,
        }
    }
}

/// Every field is optional and merged over `default_config_for_api`. Rates
/// and allocations arrive in percent.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    initial_balance: Option<f64>,
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    benefit_start_age: Option<u32>,
    horizon_years: Option<u32>,
    start_year: Option<i32>,
    annual_spending_start: Option<f64>,
    inflation_rate: Option<f64>,
    benefit_start_amount: Option<f64>,
    cola_rate: Option<f64>,
    dividend_yield: Option<f64>,
    stock_allocation: Option<f64>,
    bond_allocation: Option<f64>,
    cash_allocation: Option<f64>,
    bond_return: Option<f64>,
    cash_return: Option<f64>,
    work_income_start: Option<f64>,
    work_income_end: Option<f64>,
    target_end_balance: Option<f64>,
    reserve_rate: Option<f64>,
    failure_threshold: Option<f64>,
    go_go_age: Option<u32>,
    slow_go_age: Option<u32>,
    no_go_age: Option<u32>,
    histogram_bucket_width: Option<f64>,
    histogram_bucket_count: Option<usize>,

    return_mode: Option<ApiReturnMode>,
    return_mean: Option<f64>,
    return_stddev: Option<f64>,
    return_max_clip: Option<f64>,
    seed: Option<u64>,
    historical: Option<ReturnTables>,

    run_mode: Option<ApiRunMode>,
    trials: Option<u32>,
    start_years: Option<Vec<i32>>,
    path_seed: Option<u64>,
    path_start_year: Option<i32>,

    calibrate_parameter: Option<ApiCalibrationParameter>,
    calibrate_statistic: Option<ApiCalibrationStatistic>,
    calibrate_target: Option<f64>,
    calibrate_low: Option<f64>,
    calibrate_high: Option<f64>,
    calibrate_tolerance: Option<f64>,
    calibrate_max_iterations: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SampleReturnsQuery {
    mean_pct: Option<f64>,
    stddev_pct: Option<f64>,
    max_clip_pct: Option<f64>,
    seed: Option<u64>,
    count: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    config: SimulationConfig,
    output: RunOutput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SampleReturnsResponse {
    mean: f64,
    stddev: f64,
    max_clip: Option<f64>,
    seed: u64,
    returns: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router() -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/sample-returns", get(sample_returns_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("nestegg HTTP API listening on http://{addr}");
    info!("local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, router()).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match run_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            warn!("rejected simulate request: {msg}");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    let joined = tokio::task::spawn_blocking(move || {
        let output = request.execute();
        (request, output)
    })
    .await;

    match joined {
        Ok((request, Ok(output))) => json_response(
            StatusCode::OK,
            SimulateResponse {
                config: request.config().clone(),
                output,
            },
        ),
        Ok((_, Err(err))) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
        Err(err) => {
            error!("simulation task failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation failed")
        }
    }
}

async fn sample_returns_handler(Query(query): Query<SampleReturnsQuery>) -> Response {
    match sample_returns_from_query(query) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn sample_returns_from_query(query: SampleReturnsQuery) -> Result<SampleReturnsResponse, String> {
    let mean = query.mean_pct.unwrap_or(DEFAULT_MEAN_PCT) / 100.0;
    let stddev = query.stddev_pct.unwrap_or(DEFAULT_STDDEV_PCT) / 100.0;
    let max_clip = query.max_clip_pct.map(|v| v / 100.0);
    let seed = query.seed.unwrap_or(DEFAULT_SEED);
    let count = query.count.unwrap_or(DEFAULT_SAMPLE_COUNT);

    if !mean.is_finite() || !stddev.is_finite() {
        return Err("meanPct and stddevPct must be finite".to_string());
    }
    if stddev < 0.0 {
        return Err("stddevPct must be >= 0".to_string());
    }
    if count == 0 || count > MAX_SAMPLE_COUNT {
        return Err(format!("count must be between 1 and {MAX_SAMPLE_COUNT}"));
    }

    Ok(SampleReturnsResponse {
        mean,
        stddev,
        max_clip,
        seed,
        returns: sample_returns(mean, stddev, max_clip, seed, count),
    })
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn run_request_from_json(json: &str) -> Result<RunRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    run_request_from_payload(payload)
}

fn pct(value: f64) -> f64 {
    value / 100.0
}

fn run_request_from_payload(payload: SimulatePayload) -> Result<RunRequest, String> {
    let mut config = default_config_for_api();

    if let Some(v) = payload.initial_balance {
        config.initial_balance = v;
    }
    if let Some(v) = payload.current_age {
        config.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        config.retirement_age = v;
    }
    if let Some(v) = payload.benefit_start_age {
        config.benefit_start_age = v;
    }
    if let Some(v) = payload.horizon_years {
        config.horizon_years = v;
    }
    if let Some(v) = payload.start_year {
        config.start_year = v;
    }
    if let Some(v) = payload.annual_spending_start {
        config.annual_spending_start = v;
    }
    if let Some(v) = payload.inflation_rate {
        config.inflation_rate = pct(v);
    }
    if let Some(v) = payload.benefit_start_amount {
        config.benefit_start_amount = v;
    }
    if let Some(v) = payload.cola_rate {
        config.cola_rate = pct(v);
    }
    if let Some(v) = payload.dividend_yield {
        config.dividend_yield = pct(v);
    }
    if let Some(v) = payload.stock_allocation {
        config.stock_allocation = pct(v);
    }
    if let Some(v) = payload.bond_allocation {
        config.bond_allocation = pct(v);
    }
    if let Some(v) = payload.cash_allocation {
        config.cash_allocation = pct(v);
    }
    if let Some(v) = payload.bond_return {
        config.bond_return = pct(v);
    }
    if let Some(v) = payload.cash_return {
        config.cash_return = pct(v);
    }
    if let Some(v) = payload.work_income_start {
        config.work_income_start = v;
    }
    if let Some(v) = payload.work_income_end {
        config.work_income_end = v;
    }
    if let Some(v) = payload.target_end_balance {
        config.target_end_balance = v;
    }
    if let Some(v) = payload.reserve_rate {
        config.reserve_rate = pct(v);
    }
    if let Some(v) = payload.failure_threshold {
        config.failure_threshold = pct(v);
    }
    if let Some(v) = payload.go_go_age {
        config.phases.go_go_age = v;
    }
    if let Some(v) = payload.slow_go_age {
        config.phases.slow_go_age = v;
    }
    if let Some(v) = payload.no_go_age {
        config.phases.no_go_age = v;
    }
    if let Some(v) = payload.histogram_bucket_width {
        config.histogram.bucket_width = v;
    }
    if let Some(v) = payload.histogram_bucket_count {
        config.histogram.bucket_count = v;
    }

    let seed = payload.seed.unwrap_or(DEFAULT_SEED);
    let return_mode = payload.return_mode.unwrap_or_default();
    let returns = match return_mode {
        ApiReturnMode::Stochastic => ReturnModel::Stochastic {
            params: StochasticParams {
                mean: pct(payload.return_mean.unwrap_or(DEFAULT_MEAN_PCT)),
                stddev: pct(payload.return_stddev.unwrap_or(DEFAULT_STDDEV_PCT)),
                max_clip: payload.return_max_clip.map(pct),
            },
            seed,
        },
        ApiReturnMode::Historical => match payload.historical {
            Some(tables) if !tables.primary.is_empty() => ReturnModel::Historical(tables),
            _ => {
                return Err(
                    "historical returnMode needs a non-empty historical.primary table".to_string(),
                );
            }
        },
    };

    let trials = payload.trials.unwrap_or(match return_mode {
        ApiReturnMode::Stochastic => DEFAULT_TRIALS,
        ApiReturnMode::Historical => 0,
    });
    let mode = match payload.run_mode.unwrap_or_default() {
        ApiRunMode::Single => {
            let start = match return_mode {
                ApiReturnMode::Stochastic => {
                    StartCondition::Seed(payload.path_seed.unwrap_or(seed))
                }
                ApiReturnMode::Historical => match payload.path_start_year {
                    Some(year) => StartCondition::StartYear(year),
                    None => {
                        return Err("single historical runs need pathStartYear".to_string());
                    }
                },
            };
            RunMode::SinglePath { start }
        }
        ApiRunMode::Batch => RunMode::Batch {
            trials,
            start_years: payload.start_years,
        },
        ApiRunMode::Calibrate => {
            let Some(parameter) = payload.calibrate_parameter else {
                return Err("calibration needs calibrateParameter".to_string());
            };
            let Some(target) = payload.calibrate_target else {
                return Err("calibration needs calibrateTarget".to_string());
            };
            RunMode::Calibrate {
                calibration: CalibrationRequest {
                    parameter: parameter.into(),
                    statistic: payload
                        .calibrate_statistic
                        .map(Into::into)
                        .unwrap_or_default(),
                    target,
                    low: payload.calibrate_low.unwrap_or(0.0),
                    high: payload.calibrate_high.unwrap_or(200_000.0),
                    tolerance: payload.calibrate_tolerance.unwrap_or(1.0),
                    max_iterations: payload.calibrate_max_iterations.unwrap_or(60),
                },
                trials,
                start_years: payload.start_years,
            }
        }
    };

    RunRequest::new(config, returns, mode).map_err(|e| e.to_string())
}

fn default_config_for_api() -> SimulationConfig {
    SimulationConfig::default()
}
