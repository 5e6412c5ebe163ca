//! Scaling metrics: speedup, efficiency, Amdahl's Law and the empirical
//! serial fraction.
//!
//! Every function here is pure and total: degenerate inputs come back as a
//! [`MetricError`], and fractions outside `[0, 1]` come back as
//! [`FractionEstimate::Anomalous`] with the raw value untouched.
//!
//! ## Fraction conventions
//!
//! `f` in [`amdahl_predicted`] is the *serial* fraction, so
//! `amdahl_predicted(0.0, p) == p` and `amdahl_predicted(1.0, p) == 1`.
//! [`parallel_fraction`] solves Amdahl's Law for the parallelizable part
//! (`p·(S−1) / ((p−1)·S)`), and [`empirical_serial_fraction`] is its
//! complement (the Karp–Flatt metric). The two are inverses:
//!
//! ```rust
//! use amdahl_sweep::metrics::{amdahl_predicted, empirical_serial_fraction, speedup};
//!
//! let f = empirical_serial_fraction(100.0, 40.0, 4)?.value();
//! let predicted = amdahl_predicted(f, 4)?;
//! assert!((predicted - speedup(100.0, 40.0)?).abs() < 1e-12);
//! # Ok::<(), amdahl_sweep::metrics::MetricError>(())
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Degenerate input to a metric function.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricError {
    /// A zero denominator (parallel time or baseline time)
    #[error("division by zero")]
    DivisionByZero,
    /// Input outside the function's domain (negative, non-finite, bad `p` or `f`)
    #[error("input outside the valid domain")]
    InvalidDomain,
}

/// Serial or parallel fraction inferred from measurements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FractionEstimate {
    /// Within `[0, 1]`
    Valid(f64),
    /// Outside `[0, 1]` (noise or superlinear speedup), never clamped
    Anomalous(f64),
}

impl FractionEstimate {
    fn classify(value: f64) -> Self {
        if (0.0..=1.0).contains(&value) {
            Self::Valid(value)
        } else {
            Self::Anomalous(value)
        }
    }

    /// The raw fraction, in range or not.
    #[must_use]
    pub const fn value(self) -> f64 {
        match self {
            Self::Valid(v) | Self::Anomalous(v) => v,
        }
    }

    /// Whether the fraction lies outside `[0, 1]`.
    #[must_use]
    pub const fn is_anomalous(self) -> bool {
        matches!(self, Self::Anomalous(_))
    }
}

fn check_time(t: f64) -> Result<f64, MetricError> {
    if t.is_finite() && t >= 0.0 {
        Ok(t)
    } else {
        Err(MetricError::InvalidDomain)
    }
}

/// Speedup `T1 / Tp`.
///
/// # Errors
///
/// `DivisionByZero` if `tp == 0`, `InvalidDomain` for negative or
/// non-finite times.
pub fn speedup(t1: f64, tp: f64) -> Result<f64, MetricError> {
    let t1 = check_time(t1)?;
    let tp = check_time(tp)?;
    if tp == 0.0 {
        return Err(MetricError::DivisionByZero);
    }
    Ok(t1 / tp)
}

/// Efficiency `S / p`.
///
/// # Errors
///
/// `InvalidDomain` if `p == 0` or `s` is not finite.
pub fn efficiency(s: f64, p: u32) -> Result<f64, MetricError> {
    if p == 0 || !s.is_finite() {
        return Err(MetricError::InvalidDomain);
    }
    Ok(s / f64::from(p))
}

/// Amdahl's Law: predicted speedup on `p` workers for serial fraction `f`.
///
/// # Errors
///
/// `InvalidDomain` unless `0 <= f <= 1` and `p >= 1`.
pub fn amdahl_predicted(f: f64, p: u32) -> Result<f64, MetricError> {
    if p == 0 || !(0.0..=1.0).contains(&f) {
        return Err(MetricError::InvalidDomain);
    }
    // Endpoints are exact rather than subject to rounding.
    if f == 0.0 {
        return Ok(f64::from(p));
    }
    if f == 1.0 {
        return Ok(1.0);
    }
    let p = f64::from(p);
    Ok(1.0 / (f + (1.0 - f) / p))
}

/// Parallelizable fraction `p·(S−1) / ((p−1)·S)` solved from Amdahl's Law.
///
/// # Errors
///
/// `InvalidDomain` if `p <= 1` or the speedup is not positive,
/// `DivisionByZero` if `t1 == 0` or `tp == 0`.
pub fn parallel_fraction(t1: f64, tp: f64, p: u32) -> Result<FractionEstimate, MetricError> {
    if p <= 1 {
        return Err(MetricError::InvalidDomain);
    }
    if t1 == 0.0 {
        return Err(MetricError::DivisionByZero);
    }
    let s = speedup(t1, tp)?;
    if s <= 0.0 {
        return Err(MetricError::InvalidDomain);
    }
    let p = f64::from(p);
    Ok(FractionEstimate::classify(p * (s - 1.0) / ((p - 1.0) * s)))
}

/// Empirical serial fraction (Karp–Flatt), `1 − parallel_fraction`.
///
/// # Errors
///
/// Same as [`parallel_fraction`].
pub fn empirical_serial_fraction(
    t1: f64,
    tp: f64,
    p: u32,
) -> Result<FractionEstimate, MetricError> {
    let fp = parallel_fraction(t1, tp, p)?;
    Ok(FractionEstimate::classify(1.0 - fp.value()))
}

/// Theoretical Amdahl speedups of serial fraction `f` for each worker count.
///
/// # Errors
///
/// `InvalidDomain` if `f` is outside `[0, 1]` or a count is zero.
pub fn amdahl_curve(f: f64, counts: &[u32]) -> Result<Vec<(u32, f64)>, MetricError> {
    counts
        .iter()
        .map(|&p| amdahl_predicted(f, p).map(|s| (p, s)))
        .collect()
}

/// Up to `points` worker counts spread logarithmically over `1..=max`,
/// deduplicated and ascending.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn log_spaced_counts(max: u32, points: usize) -> Vec<u32> {
    if max == 0 || points == 0 {
        return Vec::new();
    }
    if points == 1 || max == 1 {
        return vec![1];
    }
    let top = f64::from(max).ln();
    let mut counts: Vec<u32> = (0..points)
        .map(|i| {
            let x = (top * i as f64 / (points - 1) as f64).exp();
            (x.round() as u32).clamp(1, max)
        })
        .collect();
    counts.dedup();
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_concrete_case() {
        let s = speedup(100.0, 40.0).unwrap();
        assert!((s - 2.5).abs() < EPS);
        assert!((efficiency(s, 4).unwrap() - 0.625).abs() < EPS);

        let fp = parallel_fraction(100.0, 40.0, 4).unwrap();
        assert!(!fp.is_anomalous());
        assert!((fp.value() - 0.8).abs() < EPS);

        let fs = empirical_serial_fraction(100.0, 40.0, 4).unwrap();
        assert!((fs.value() - 0.2).abs() < EPS);
    }

    #[test]
    fn test_speedup_zero_parallel_time() {
        assert_eq!(speedup(1.0, 0.0), Err(MetricError::DivisionByZero));
        assert_eq!(speedup(-1.0, 1.0), Err(MetricError::InvalidDomain));
        assert_eq!(speedup(f64::NAN, 1.0), Err(MetricError::InvalidDomain));
    }

    #[test]
    fn test_efficiency_zero_workers() {
        assert_eq!(efficiency(2.0, 0), Err(MetricError::InvalidDomain));
    }

    #[test]
    fn test_amdahl_endpoints_exact() {
        for p in [1, 2, 7, 64, 10_000] {
            assert_eq!(amdahl_predicted(0.0, p).unwrap(), f64::from(p));
            assert_eq!(amdahl_predicted(1.0, p).unwrap(), 1.0);
        }
    }

    #[test]
    fn test_amdahl_domain() {
        assert_eq!(amdahl_predicted(-0.1, 4), Err(MetricError::InvalidDomain));
        assert_eq!(amdahl_predicted(1.1, 4), Err(MetricError::InvalidDomain));
        assert_eq!(amdahl_predicted(0.5, 0), Err(MetricError::InvalidDomain));
    }

    #[test]
    fn test_fraction_requires_multiple_workers() {
        assert_eq!(
            parallel_fraction(10.0, 5.0, 1),
            Err(MetricError::InvalidDomain)
        );
        assert_eq!(
            empirical_serial_fraction(0.0, 5.0, 4),
            Err(MetricError::DivisionByZero)
        );
    }

    #[test]
    fn test_superlinear_speedup_is_anomalous_not_clamped() {
        // S = 5 on 4 workers
        let fp = parallel_fraction(100.0, 20.0, 4).unwrap();
        assert!(fp.is_anomalous());
        assert!(fp.value() > 1.0);

        let fs = empirical_serial_fraction(100.0, 20.0, 4).unwrap();
        assert!(fs.is_anomalous());
        assert!(fs.value() < 0.0);
    }

    #[test]
    fn test_slowdown_is_anomalous() {
        // Parallel run slower than serial: S < 1
        let fs = empirical_serial_fraction(10.0, 20.0, 4).unwrap();
        assert!(fs.is_anomalous());
        assert!(fs.value() > 1.0);
    }

    #[test]
    fn test_amdahl_curve() {
        let curve = amdahl_curve(0.5, &[1, 2, 4]).unwrap();
        assert_eq!(curve.len(), 3);
        assert_eq!(curve[0], (1, 1.0));
        assert!((curve[2].1 - 1.6).abs() < EPS);
        assert!(amdahl_curve(2.0, &[1]).is_err());
    }

    #[test]
    fn test_log_spaced_counts() {
        let counts = log_spaced_counts(10_000, 5);
        assert_eq!(counts, vec![1, 10, 100, 1000, 10_000]);
        assert_eq!(log_spaced_counts(1, 10), vec![1]);
        assert!(log_spaced_counts(0, 10).is_empty());

        let dense = log_spaced_counts(4, 20);
        assert_eq!(dense.first(), Some(&1));
        assert_eq!(dense.last(), Some(&4));
        assert!(dense.windows(2).all(|w| w[0] < w[1]));
    }
}
