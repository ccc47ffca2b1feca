use log::{debug, info, warn};
use rayon::prelude::*;

use super::engine::{derive_seed, run_historical_path, run_stochastic_path};
use super::returns::{ReturnTables, StochasticParams};
use super::types::{AggregateResult, HistogramBucket, HistogramSpec, PathOutcome, SimulationConfig};

pub fn run_stochastic_batch(
    config: &SimulationConfig,
    params: &StochasticParams,
    base_seed: u64,
    trials: u32,
) -> AggregateResult {
    let outcomes: Vec<PathOutcome> = (0..trials)
        .into_par_iter()
        .map(|trial| {
            PathOutcome::Completed(run_stochastic_path(
                config,
                params,
                derive_seed(base_seed, trial),
            ))
        })
        .collect();

    let result = aggregate_paths(config, outcomes);
    info!(
        "stochastic batch: {} trials, success rate {:.4}, median terminal {:.2}",
        trials, result.success_rate, result.median_terminal_balance
    );
    result
}

pub fn run_historical_batch(
    config: &SimulationConfig,
    tables: &ReturnTables,
    start_years: Option<&[i32]>,
) -> AggregateResult {
    let years = match start_years {
        Some(years) => years.to_vec(),
        None => tables.viable_start_years(config.horizon_years),
    };

    let outcomes: Vec<PathOutcome> = years
        .par_iter()
        .map(|&year| run_historical_path(config, tables, year))
        .collect();

    let result = aggregate_paths(config, outcomes);
    info!(
        "historical batch: {} start years, {} unresolved, success rate {:.4}",
        years.len(),
        result.unresolved,
        result.success_rate
    );
    result
}

/// Reduces path outcomes, in the order given, to batch statistics. Unresolved
/// outcomes are counted separately and never enter `total_runs`.
pub fn aggregate_paths(config: &SimulationConfig, outcomes: Vec<PathOutcome>) -> AggregateResult {
    let mut paths = Vec::with_capacity(outcomes.len());
    let mut unresolved_start_years = Vec::new();
    for outcome in outcomes {
        match outcome {
            PathOutcome::Completed(path) => paths.push(path),
            PathOutcome::Unresolved { start_year } => {
                warn!("start year {start_year} is not covered by any return table; skipped");
                unresolved_start_years.push(start_year);
            }
        }
    }

    let total_runs = paths.len();
    let successes = paths
        .iter()
        .filter(|path| path.is_success(config.target_end_balance))
        .count();

    let mut balances: Vec<f64> = paths.iter().map(|path| path.terminal_balance).collect();
    balances.sort_by(|a, b| a.total_cmp(b));

    if total_runs == 0 {
        warn!("no completed paths to aggregate; statistics reported as zero");
    }

    let success_rate = ratio(successes, total_runs);
    let total_failure_years: u64 = paths.iter().map(|path| path.failure_years as u64).sum();
    debug!(
        "aggregated {} paths: {} successes, {} failure years in total",
        total_runs, successes, total_failure_years
    );

    AggregateResult {
        total_runs,
        successes,
        failures: total_runs - successes,
        unresolved: unresolved_start_years.len(),
        unresolved_start_years,
        success_rate,
        success_ci_half_width: binomial_ci_half_width(success_rate, total_runs),
        min_terminal_balance: balances.first().copied().unwrap_or(0.0),
        max_terminal_balance: balances.last().copied().unwrap_or(0.0),
        median_terminal_balance: median(&balances),
        p10_terminal_balance: percentile(&balances, 10.0),
        p90_terminal_balance: percentile(&balances, 90.0),
        mean_failure_years: if total_runs == 0 {
            0.0
        } else {
            total_failure_years as f64 / total_runs as f64
        },
        histogram: histogram(&balances, &config.histogram),
        paths,
    }
}

/// Single-index median of an ascending slice: `sorted[n / 2]`, with no
/// averaging of the two central values.
pub fn median(sorted: &[f64]) -> f64 {
    sorted.get(sorted.len() / 2).copied().unwrap_or(0.0)
}

pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n as f64 - 1.0);
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            if lower == upper {
                sorted[lower]
            } else {
                let w = rank - lower as f64;
                sorted[lower] * (1.0 - w) + sorted[upper] * w
            }
        }
    }
}

pub fn histogram(balances: &[f64], spec: &HistogramSpec) -> Vec<HistogramBucket> {
    let mut buckets: Vec<HistogramBucket> = (0..spec.bucket_count)
        .map(|index| HistogramBucket {
            lower_bound: index as f64 * spec.bucket_width,
            count: 0,
        })
        .collect();

    for &balance in balances {
        if balance.is_nan() || balance < 0.0 {
            continue;
        }
        let index = (balance / spec.bucket_width).floor();
        if index < spec.bucket_count as f64 {
            buckets[index as usize].count += 1;
        }
    }
    buckets
}

pub fn binomial_ci_half_width(p: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = p.clamp(0.0, 1.0);
    1.96 * (p * (1.0 - p) / n as f64).sqrt()
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}
