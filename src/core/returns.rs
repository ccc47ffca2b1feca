use std::collections::BTreeMap;
use std::f64::consts::PI;

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

pub trait ReturnSource {
    fn next_return(&mut self, year_index: u32, calendar_year: i32) -> f64;
}

pub struct StochasticReturnSource<R = Pcg64Mcg> {
    mean: f64,
    stddev: f64,
    max_clip: Option<f64>,
    rng: R,
}

impl StochasticReturnSource<Pcg64Mcg> {
    pub fn seeded(mean: f64, stddev: f64, max_clip: Option<f64>, seed: u64) -> Self {
        Self::with_rng(mean, stddev, max_clip, Pcg64Mcg::seed_from_u64(seed))
    }
}

impl<R: RngCore> StochasticReturnSource<R> {
    pub fn with_rng(mean: f64, stddev: f64, max_clip: Option<f64>, rng: R) -> Self {
        Self {
            mean,
            stddev,
            max_clip: max_clip.filter(|clip| clip.is_finite()),
            rng,
        }
    }

    fn next_unit(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        (self.rng.next_u64() >> 11) as f64 / DENOM
    }

    fn standard_normal(&mut self) -> f64 {
        // ln(0) is undefined; draw again rather than clamping.
        let mut u1 = self.next_unit();
        while u1 == 0.0 {
            u1 = self.next_unit();
        }
        let u2 = self.next_unit();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    pub fn sample(&mut self) -> f64 {
        let value = self.mean + self.stddev * self.standard_normal();
        match self.max_clip {
            Some(clip) => value.min(clip),
            None => value,
        }
    }
}

impl<R: RngCore> ReturnSource for StochasticReturnSource<R> {
    fn next_return(&mut self, _year_index: u32, _calendar_year: i32) -> f64 {
        self.sample()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StochasticParams {
    pub mean: f64,
    pub stddev: f64,
    #[serde(default)]
    pub max_clip: Option<f64>,
}

impl StochasticParams {
    pub fn source(&self, seed: u64) -> StochasticReturnSource {
        StochasticReturnSource::seeded(self.mean, self.stddev, self.max_clip, seed)
    }
}

pub fn sample_returns(
    mean: f64,
    stddev: f64,
    max_clip: Option<f64>,
    seed: u64,
    count: usize,
) -> Vec<f64> {
    let mut source = StochasticReturnSource::seeded(mean, stddev, max_clip, seed);
    (0..count).map(|_| source.sample()).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReturnTable {
    returns: BTreeMap<i32, f64>,
}

impl ReturnTable {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (i32, f64)>,
    {
        Self {
            returns: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, year: i32) -> Option<f64> {
        self.returns.get(&year).copied()
    }

    pub fn contains(&self, year: i32) -> bool {
        self.returns.contains_key(&year)
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.returns.keys().copied()
    }

    pub fn last_year(&self) -> Option<i32> {
        self.returns.keys().next_back().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnTables {
    pub primary: ReturnTable,
    #[serde(default)]
    pub fallback: ReturnTable,
    #[serde(default)]
    pub annotations: BTreeMap<i32, String>,
}

impl ReturnTables {
    pub fn covers(&self, year: i32) -> bool {
        self.primary.contains(year) || self.fallback.contains(year)
    }

    pub fn annotation(&self, year: i32) -> Option<&str> {
        self.annotations.get(&year).map(String::as_str)
    }

    /// Primary-table start years whose full horizon ends on or before the
    /// last year either table covers.
    pub fn viable_start_years(&self, horizon_years: u32) -> Vec<i32> {
        let last_covered = match (self.primary.last_year(), self.fallback.last_year()) {
            (Some(a), Some(b)) => a.max(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => return Vec::new(),
        };
        let span = horizon_years.saturating_sub(1) as i64;
        self.primary
            .years()
            .filter(|&year| year as i64 + span <= last_covered as i64)
            .collect()
    }
}

pub struct SequenceReturnSource<'a> {
    tables: &'a ReturnTables,
}

impl<'a> SequenceReturnSource<'a> {
    pub fn new(tables: &'a ReturnTables) -> Self {
        Self { tables }
    }

    pub fn covers(&self, year: i32) -> bool {
        self.tables.covers(year)
    }

    pub fn lookup(&self, calendar_year: i32) -> f64 {
        self.tables
            .primary
            .get(calendar_year)
            .or_else(|| self.tables.fallback.get(calendar_year))
            .unwrap_or(0.0)
    }
}

impl ReturnSource for SequenceReturnSource<'_> {
    fn next_return(&mut self, _year_index: u32, calendar_year: i32) -> f64 {
        self.lookup(calendar_year)
    }
}
