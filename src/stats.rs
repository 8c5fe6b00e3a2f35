//! Streaming accumulators and order statistics.
//!
//! The metric panel leans on two things: running moment accumulators fed
//! one value at a time during the spectrum passes, and exact quartile /
//! decile selection over finite sorted sequences. The quartile convention
//! is the straddling-element rule: when the length is divisible by four,
//! a quartile is the average of the two elements around the cut, otherwise
//! it is the single element at the truncated index.

/// Running accumulator over a stream of f64 samples.
///
/// Moments are updated online (Welford); the median is exact and computed
/// from the retained samples on demand. Empty accumulators answer `None`
/// for every statistic so callers can surface a missing value explicitly.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    values: Vec<f64>,
    mean: f64,
    m2: f64,
    m3: f64,
    m4: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample.
    pub fn add(&mut self, x: f64) {
        let n0 = self.values.len() as f64;
        let n = n0 + 1.0;
        let delta = x - self.mean;
        let delta_n = delta / n;
        let delta_n2 = delta_n * delta_n;
        let term1 = delta * delta_n * n0;

        self.mean += delta_n;
        self.m4 += term1 * delta_n2 * (n * n - 3.0 * n + 3.0)
            + 6.0 * delta_n2 * self.m2
            - 4.0 * delta_n * self.m3;
        self.m3 += term1 * delta_n * (n - 2.0) - 3.0 * delta_n * self.m2;
        self.m2 += term1;

        if self.values.is_empty() {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
        self.values.push(x);
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        (!self.values.is_empty()).then_some(self.mean)
    }

    pub fn min(&self) -> Option<f64> {
        (!self.values.is_empty()).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (!self.values.is_empty()).then_some(self.max)
    }

    /// Population variance.
    pub fn variance(&self) -> Option<f64> {
        let n = self.values.len();
        (n > 0).then(|| self.m2 / n as f64)
    }

    /// Standard error of the mean.
    pub fn std_error_of_mean(&self) -> Option<f64> {
        let n = self.values.len();
        self.variance().map(|v| (v / n as f64).sqrt())
    }

    pub fn skewness(&self) -> Option<f64> {
        let n = self.values.len() as f64;
        if self.values.is_empty() || self.m2 == 0.0 {
            return None;
        }
        Some(n.sqrt() * self.m3 / self.m2.powf(1.5))
    }

    pub fn kurtosis(&self) -> Option<f64> {
        let n = self.values.len() as f64;
        if self.values.is_empty() || self.m2 == 0.0 {
            return None;
        }
        Some(n * self.m4 / (self.m2 * self.m2) - 3.0)
    }

    /// Exact median of everything seen so far.
    pub fn median(&self) -> Option<f64> {
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        median_sorted(&sorted)
    }
}

/// A quartile cut: the value under the convention and the element index
/// the cut lands on (the lower straddling element for even splits).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuartileCut {
    pub value: f64,
    pub index: usize,
}

/// Median (Q2) of an ascending-sorted slice.
pub fn median_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 0 {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    } else {
        Some(sorted[n / 2])
    }
}

/// First quartile of an ascending-sorted slice.
pub fn first_quartile(sorted: &[f64]) -> Option<QuartileCut> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 4 == 0 {
        Some(QuartileCut {
            value: (sorted[n / 4 - 1] + sorted[n / 4]) / 2.0,
            index: n / 4 - 1,
        })
    } else {
        Some(QuartileCut {
            value: sorted[n / 4],
            index: n / 4,
        })
    }
}

/// Third quartile of an ascending-sorted slice.
pub fn third_quartile(sorted: &[f64]) -> Option<QuartileCut> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 4 == 0 {
        Some(QuartileCut {
            value: (sorted[3 * n / 4 - 1] + sorted[3 * n / 4]) / 2.0,
            index: 3 * n / 4 - 1,
        })
    } else {
        Some(QuartileCut {
            value: sorted[3 * n / 4],
            index: 3 * n / 4,
        })
    }
}

/// Start index of the last decile: `⌊(n+1)·9/10⌋`.
pub fn last_decile_start(n: usize) -> usize {
    (n + 1) * 9 / 10
}

/// End index (exclusive) of the first decile: `⌊(n+1)/10⌋`.
pub fn first_decile_end(n: usize) -> usize {
    (n + 1) / 10
}

/// Sort a copy ascending, tolerating NaN-free scientific data.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    v
}
