//! Time-correlation functions of per-frame observables.

use super::error::AnalysisError;
use super::progress::{Progress, ProgressReporter};
use crate::core::models::UnitCell;
use crate::traj::Trajectory;
use nalgebra::{Point3, Vector3};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

fn check_length(len: usize, max_lag: usize) -> Result<(), AnalysisError> {
    if max_lag >= len {
        Err(AnalysisError::SeriesTooShort { len, max_lag })
    } else {
        Ok(())
    }
}

fn mean(series: &[f64]) -> f64 {
    series.iter().sum::<f64>() / series.len() as f64
}

// Evaluates `at_lag` for every lag in 0..=max_lag, in parallel when available.
fn over_lags(max_lag: usize, at_lag: impl Fn(usize) -> f64 + Sync + Send) -> Vec<f64> {
    #[cfg(feature = "parallel")]
    let values = (0..=max_lag).into_par_iter().map(at_lag).collect();

    #[cfg(not(feature = "parallel"))]
    let values = (0..=max_lag).map(at_lag).collect();

    values
}

/// Normalized cross-correlation `⟨δa(t)·δb(t+τ)⟩ / (σa·σb)` for τ in `0..=max_lag`.
///
/// Both series are mean-centered. Each lag averages over the `len - τ` pairs
/// available.
pub fn cross_correlation(a: &[f64], b: &[f64], max_lag: usize) -> Result<Vec<f64>, AnalysisError> {
    let len = a.len().min(b.len());
    check_length(len, max_lag)?;
    let (a, b) = (&a[..len], &b[..len]);
    let (mean_a, mean_b) = (mean(a), mean(b));
    let sigma = |s: &[f64], m: f64| (s.iter().map(|x| (x - m).powi(2)).sum::<f64>() / len as f64).sqrt();
    let norm = sigma(a, mean_a) * sigma(b, mean_b);
    if norm == 0.0 {
        return Err(AnalysisError::ZeroVariance);
    }

    Ok(over_lags(max_lag, |lag| {
        let n = len - lag;
        let sum: f64 = (0..n)
            .map(|t| (a[t] - mean_a) * (b[t + lag] - mean_b))
            .sum();
        sum / n as f64 / norm
    }))
}

/// Normalized autocorrelation of a scalar series; `C(0) = 1`.
pub fn autocorrelation(series: &[f64], max_lag: usize) -> Result<Vec<f64>, AnalysisError> {
    cross_correlation(series, series, max_lag)
}

/// Autocorrelation `⟨v(t)·v(t+τ)⟩ / ⟨v·v⟩` of a vector series, e.g. a bond
/// orientation or dipole. Vectors are not mean-centered.
pub fn vector_autocorrelation(
    series: &[Vector3<f64>],
    max_lag: usize,
) -> Result<Vec<f64>, AnalysisError> {
    let len = series.len();
    check_length(len, max_lag)?;
    let norm = series.iter().map(|v| v.norm_squared()).sum::<f64>() / len as f64;
    if norm == 0.0 {
        return Err(AnalysisError::ZeroVariance);
    }

    Ok(over_lags(max_lag, |lag| {
        let n = len - lag;
        let sum: f64 = (0..n).map(|t| series[t].dot(&series[t + lag])).sum();
        sum / n as f64 / norm
    }))
}

/// Evaluates `observable` on every remaining frame of `trajectory`.
///
/// The result feeds the correlation functions above.
#[instrument(skip_all, name = "collect_series")]
pub fn collect_series<T>(
    trajectory: &mut dyn Trajectory,
    token: &CancellationToken,
    reporter: &ProgressReporter,
    mut observable: impl FnMut(&[Point3<f64>], Option<&UnitCell>) -> T,
) -> Result<Vec<T>, AnalysisError> {
    reporter.report(Progress::Started {
        task: "Observable series",
        total: None,
    });

    let mut buffer = vec![Point3::origin(); trajectory.len()];
    let mut series = Vec::new();
    loop {
        match trajectory.next_cancellable(&mut buffer, token) {
            Ok(cell) => series.push(observable(&buffer, cell.as_ref())),
            Err(e) if e.is_last_frame() => break,
            Err(e) => return Err(AnalysisError::from_traj(e)),
        }
        reporter.frames(1);
    }

    debug!(frames = series.len(), "Observable series collected.");
    reporter.report(Progress::Finished {
        frames: series.len() as u64,
    });
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traj::memory::MemoryTrajectory;
    use std::f64::consts::PI;

    fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < tol, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn autocorrelation_starts_at_one_and_flips_for_alternating_series() {
        let series: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let c = autocorrelation(&series, 3).unwrap();
        assert_close(&c, &[1.0, -1.0, 1.0, -1.0], 1e-12);
    }

    #[test]
    fn cross_correlation_finds_the_shift() {
        let a: Vec<f64> = (0..400).map(|i| (i as f64 * 2.0 * PI / 40.0).sin()).collect();
        let b: Vec<f64> = (0..400)
            .map(|i| ((i as f64 - 5.0) * 2.0 * PI / 40.0).sin())
            .collect();
        let c = cross_correlation(&a, &b, 10).unwrap();
        let best = c
            .iter()
            .enumerate()
            .max_by(|x, y| x.1.total_cmp(y.1))
            .map(|(lag, _)| lag);
        assert_eq!(best, Some(5));
    }

    #[test]
    fn vector_autocorrelation_of_a_rotating_unit_vector_is_a_cosine() {
        let step = PI / 8.0;
        let series: Vec<_> = (0..64)
            .map(|i| Vector3::new((i as f64 * step).cos(), (i as f64 * step).sin(), 0.0))
            .collect();
        let c = vector_autocorrelation(&series, 4).unwrap();
        let expected: Vec<f64> = (0..=4).map(|lag| (lag as f64 * step).cos()).collect();
        assert_close(&c, &expected, 1e-12);
    }

    #[test]
    fn degenerate_input_is_rejected() {
        assert!(matches!(
            autocorrelation(&[2.0; 10], 2),
            Err(AnalysisError::ZeroVariance)
        ));
        assert!(matches!(
            autocorrelation(&[1.0, 2.0], 2),
            Err(AnalysisError::SeriesTooShort { len: 2, max_lag: 2 })
        ));
        assert!(matches!(
            vector_autocorrelation(&[Vector3::zeros(); 3], 1),
            Err(AnalysisError::ZeroVariance)
        ));
    }

    #[test]
    fn series_follow_trajectory_order() {
        let frames = (0..5)
            .map(|i| vec![Point3::origin(), Point3::new(i as f64 + 1.0, 0.0, 0.0)])
            .collect();
        let mut traj = MemoryTrajectory::new(2, frames, Vec::new());
        let distances = collect_series(
            &mut traj,
            &CancellationToken::new(),
            &ProgressReporter::new(),
            |frame, _| (frame[1] - frame[0]).norm(),
        )
        .unwrap();
        assert_eq!(distances, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(!traj.readable());
    }
}
