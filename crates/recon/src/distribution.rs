//! Distribution drift per measure: descriptive statistics, a two-sample
//! Kolmogorov-Smirnov test and the population stability index.

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::Serialize;
use statrs::statistics::{Data, Median, Statistics};

use crate::config::{DistributionConfig, DriftTest};
use crate::dataset::Dataset;

/// Ratio used in place of an empty PSI bin.
const PSI_FLOOR: f64 = 1e-12;
/// Below this many `n·m` pairs the exact null distribution is used.
const EXACT_KS_LIMIT: usize = 10_000;

// ---------------------------------------------------------------------------
// Descriptive statistics
// ---------------------------------------------------------------------------

/// Population moments of the present values of one side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Moments {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub variance: f64,
}

impl Moments {
    /// `None` for an empty sample. `sorted` must be ascending.
    pub fn of_sorted(sorted: &[f64]) -> Option<Self> {
        if sorted.is_empty() {
            return None;
        }
        Some(Self {
            count: sorted.len(),
            mean: sorted.mean(),
            median: Data::new(sorted.to_vec()).median(),
            std_dev: sorted.population_std_dev(),
            variance: sorted.population_variance(),
        })
    }
}

/// Linear interpolation between closest ranks, as used for the decile
/// comparison. `sorted` must be non-empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

// ---------------------------------------------------------------------------
// Two-sample tests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriftStatistic {
    pub method: DriftTest,
    pub statistic: Option<f64>,
    /// Unavailable for the decile approximation.
    pub p_value: Option<f64>,
}

/// Two-sided two-sample KS test. Both samples sorted and non-empty.
pub fn ks_2samp(x: &[f64], y: &[f64]) -> (f64, f64) {
    let d = ks_statistic(x, y);
    let (n, m) = (x.len(), y.len());
    let p = if n.saturating_mul(m) < EXACT_KS_LIMIT {
        1.0 - smirnov_exact_cdf(d, n, m)
    } else {
        let en = ((n * m) as f64 / (n + m) as f64).sqrt();
        kolmogorov_q((en + 0.12 + 0.11 / en) * d)
    };
    (d, p.clamp(0.0, 1.0))
}

/// `sup |F_x - F_y|` over the pooled sample.
fn ks_statistic(x: &[f64], y: &[f64]) -> f64 {
    let (n, m) = (x.len() as f64, y.len() as f64);
    let (mut i, mut j) = (0, 0);
    let mut d: f64 = 0.0;
    while i < x.len() && j < y.len() {
        let v = x[i].min(y[j]);
        while i < x.len() && x[i] <= v {
            i += 1;
        }
        while j < y.len() && y[j] <= v {
            j += 1;
        }
        d = d.max((i as f64 / n - j as f64 / m).abs());
    }
    d
}

/// `P(D < d)` under the null, by counting lattice paths that stay inside the
/// band `|i/m - j/n| <= d`.
fn smirnov_exact_cdf(d: f64, n: usize, m: usize) -> f64 {
    let (m, n) = if n < m { (n, m) } else { (m, n) };
    let (md, nd) = (m as f64, n as f64);
    let q = (0.5 + (d * md * nd - 1e-7).floor()) / (md * nd);

    let mut u: Vec<f64> = (0..=n)
        .map(|j| if j as f64 / nd > q { 0.0 } else { 1.0 })
        .collect();
    for i in 1..=m {
        let w = i as f64 / (i + n) as f64;
        u[0] = if i as f64 / md > q { 0.0 } else { w * u[0] };
        for j in 1..=n {
            u[j] = if (i as f64 / md - j as f64 / nd).abs() > q {
                0.0
            } else {
                w * u[j] + u[j - 1]
            };
        }
    }
    u[n]
}

/// Complementary Kolmogorov distribution, `Q(λ) = 2 Σ (-1)^(k-1) exp(-2k²λ²)`.
fn kolmogorov_q(lambda: f64) -> f64 {
    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut previous: f64 = 0.0;
    for k in 1..=100 {
        let term = fac * (a2 * (k * k) as f64).exp();
        sum += term;
        if term.abs() <= 0.001 * previous || term.abs() <= 1e-8 * sum {
            return sum;
        }
        fac = -fac;
        previous = term.abs();
    }
    // Did not converge: λ is tiny and the samples are indistinguishable
    1.0
}

/// Largest absolute difference between the deciles of both samples.
fn decile_difference(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.is_empty() || y.is_empty() {
        return None;
    }
    (0..=10)
        .map(|k| {
            let q = k as f64 / 10.0;
            (quantile(x, q) - quantile(y, q)).abs()
        })
        .max_by_key(|d| OrderedFloat(*d))
}

// ---------------------------------------------------------------------------
// Population stability index
// ---------------------------------------------------------------------------

/// PSI over `bins` equal-width bins spanning both samples. `None` if either
/// sample is empty; `0.0` when every value is identical.
pub fn psi(x: &[f64], y: &[f64], bins: usize) -> Option<f64> {
    if x.is_empty() || y.is_empty() || bins == 0 {
        return None;
    }
    let lo = x.iter().chain(y).copied().fold(f64::INFINITY, f64::min);
    let hi = x.iter().chain(y).copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        return Some(0.0);
    }

    let edges: Vec<f64> = (0..=bins)
        .map(|k| lo + (hi - lo) * k as f64 / bins as f64)
        .collect();
    let px = bin_ratios(x, &edges);
    let py = bin_ratios(y, &edges);
    Some(
        px.iter()
            .zip(&py)
            .map(|(a, b)| (a - b) * (a / b).ln())
            .sum(),
    )
}

/// Share of values per bin, with empty bins floored. Bins are half-open
/// except the last, which includes the upper edge.
fn bin_ratios(values: &[f64], edges: &[f64]) -> Vec<f64> {
    let bins = edges.len() - 1;
    let (lo, hi) = (edges[0], edges[bins]);
    let mut counts = vec![0usize; bins];
    for &v in values {
        if v < lo || v > hi {
            continue;
        }
        let mut idx = (((v - lo) / (hi - lo)) * bins as f64) as usize;
        idx = idx.min(bins - 1);
        // Fix up rounding against the materialized edges
        if idx > 0 && v < edges[idx] {
            idx -= 1;
        } else if idx + 1 < bins && v >= edges[idx + 1] {
            idx += 1;
        }
        counts[idx] += 1;
    }
    let total = values.len() as f64;
    counts
        .into_iter()
        .map(|c| (c as f64 / total).max(PSI_FLOOR))
        .collect()
}

// ---------------------------------------------------------------------------
// Per-measure report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionStats {
    pub measure: String,
    pub a: Option<Moments>,
    pub b: Option<Moments>,
    pub drift: DriftStatistic,
    pub drift_pass: bool,
    pub psi: Option<f64>,
    pub psi_pass: bool,
}

impl DistributionStats {
    fn difference(&self, f: impl Fn(&Moments) -> f64) -> Option<f64> {
        Some(f(self.a.as_ref()?) - f(self.b.as_ref()?))
    }

    pub fn mean_difference(&self) -> Option<f64> {
        self.difference(|m| m.mean)
    }

    pub fn median_difference(&self) -> Option<f64> {
        self.difference(|m| m.median)
    }

    pub fn std_dev_difference(&self) -> Option<f64> {
        self.difference(|m| m.std_dev)
    }

    pub fn variance_difference(&self) -> Option<f64> {
        self.difference(|m| m.variance)
    }
}

fn present_sorted(ds: &Dataset, measure: &str) -> Vec<f64> {
    let mut values: Vec<f64> = ds
        .column(measure)
        .map(|c| c.values.iter().filter_map(|v| v.as_f64()).collect())
        .unwrap_or_default();
    values.sort_by_key(|v| OrderedFloat(*v));
    values
}

pub fn compare_distributions(
    a: &Dataset,
    b: &Dataset,
    measures: &[String],
    config: &DistributionConfig,
) -> Vec<DistributionStats> {
    measures
        .par_iter()
        .map(|m| {
            let x = present_sorted(a, m);
            let y = present_sorted(b, m);

            let use_ks = config.test == DriftTest::KolmogorovSmirnov && !x.is_empty() && !y.is_empty();
            let drift = if use_ks {
                let (d, p) = ks_2samp(&x, &y);
                DriftStatistic {
                    method: DriftTest::KolmogorovSmirnov,
                    statistic: Some(d),
                    p_value: Some(p),
                }
            } else {
                DriftStatistic {
                    method: DriftTest::DecileApproximation,
                    statistic: decile_difference(&x, &y),
                    p_value: None,
                }
            };
            let drift_pass = drift.p_value.map(|p| p >= config.p_value_threshold).unwrap_or(false);

            let psi = psi(&x, &y, config.psi_bins);
            let psi_pass = psi.map(|v| v < config.psi_threshold).unwrap_or(false);
            log::debug!("distribution '{m}': drift {drift:?}, psi {psi:?}");

            DistributionStats {
                measure: m.clone(),
                a: Moments::of_sorted(&x),
                b: Moments::of_sorted(&y),
                drift,
                drift_pass,
                psi,
                psi_pass,
            }
        })
        .collect()
}
