use super::config::RdfConfig;
use super::error::{AnalysisError, check_selection};
use super::progress::{Progress, ProgressReporter};
use crate::core::models::UnitCell;
use crate::traj::{DecodedFrame, Trajectory};
use nalgebra::{Matrix3, Point3, Vector3};
use std::f64::consts::PI;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Radial distribution function averaged over a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct RdfResult {
    /// Bin centers.
    pub r: Vec<f64>,
    pub g: Vec<f64>,
    /// Raw pair counts per bin, summed over frames.
    pub counts: Vec<u64>,
    pub frames: usize,
}

/// Periodic box used for the minimum-image convention.
struct PeriodicBox {
    /// Box vectors as columns.
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl PeriodicBox {
    fn from_cell(cell: &UnitCell) -> Option<Self> {
        let matrix = Matrix3::from_column_slice(cell);
        let inverse = matrix.try_inverse()?;
        Some(Self { matrix, inverse })
    }

    fn volume(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    fn minimum_image(&self, d: Vector3<f64>) -> Vector3<f64> {
        let fractional = self.inverse * d;
        self.matrix * fractional.map(|s| s - s.round())
    }
}

fn histogram_frame(
    coords: &[Point3<f64>],
    periodic: Option<&PeriodicBox>,
    config: &RdfConfig,
) -> Vec<u64> {
    let width = config.bin_width();
    let r_max_sq = config.r_max * config.r_max;

    let shell = |&i: &usize| {
        let mut counts = vec![0u64; config.bins];
        for &j in &config.target {
            if i == j {
                continue;
            }
            let mut d = coords[j] - coords[i];
            if let Some(periodic) = periodic {
                d = periodic.minimum_image(d);
            }
            let dist_sq = d.norm_squared();
            if dist_sq < r_max_sq {
                let bin = ((dist_sq.sqrt() / width) as usize).min(config.bins - 1);
                counts[bin] += 1;
            }
        }
        counts
    };
    let merge = |mut a: Vec<u64>, b: Vec<u64>| {
        a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
        a
    };

    #[cfg(feature = "parallel")]
    let counts = config
        .reference
        .par_iter()
        .map(shell)
        .reduce(|| vec![0; config.bins], merge);

    #[cfg(not(feature = "parallel"))]
    let counts = config
        .reference
        .iter()
        .map(shell)
        .fold(vec![0; config.bins], merge);

    counts
}

struct Accumulator<'c> {
    config: &'c RdfConfig,
    counts: Vec<u64>,
    /// Sum over frames of the ideal-gas pair density (pairs per unit volume).
    ideal_density: f64,
    frames: usize,
    pairs_per_frame: f64,
}

impl<'c> Accumulator<'c> {
    fn new(config: &'c RdfConfig) -> Self {
        let overlap = config
            .reference
            .iter()
            .filter(|i| config.target.contains(*i))
            .count();
        let pairs = config.reference.len() * config.target.len() - overlap;
        Self {
            config,
            counts: vec![0; config.bins],
            ideal_density: 0.0,
            frames: 0,
            pairs_per_frame: pairs as f64,
        }
    }

    fn add(&mut self, frame: &DecodedFrame) -> Result<(), AnalysisError> {
        let index = self.frames;
        let periodic = frame.cell.as_ref().and_then(PeriodicBox::from_cell);
        let density = match (self.config.density, &periodic) {
            (Some(density), _) => density * self.config.reference.len() as f64,
            (None, Some(periodic)) => self.pairs_per_frame / periodic.volume(),
            (None, None) => return Err(AnalysisError::MissingCell { frame: index }),
        };

        let counts = histogram_frame(&frame.coords, periodic.as_ref(), self.config);
        for (total, c) in self.counts.iter_mut().zip(counts) {
            *total += c;
        }
        self.ideal_density += density;
        self.frames += 1;
        Ok(())
    }

    fn finish(self) -> Result<RdfResult, AnalysisError> {
        if self.frames == 0 {
            return Err(AnalysisError::NoFrames);
        }
        let width = self.config.bin_width();
        let (r, g) = self
            .counts
            .iter()
            .enumerate()
            .map(|(k, &count)| {
                let lower = k as f64 * width;
                let upper = lower + width;
                let shell = 4.0 / 3.0 * PI * (upper.powi(3) - lower.powi(3));
                let ideal = self.ideal_density * shell;
                let g = if ideal > 0.0 { count as f64 / ideal } else { 0.0 };
                (lower + 0.5 * width, g)
            })
            .unzip();
        Ok(RdfResult {
            r,
            g,
            counts: self.counts,
            frames: self.frames,
        })
    }
}

/// Computes g(r) between `config.reference` and `config.target` over every
/// remaining frame of `trajectory`.
///
/// Frames are pulled in batches through [`Trajectory::next_conc`] so decoding
/// overlaps with histogramming. Distances use the minimum-image convention when
/// a frame carries a unit cell. The target density comes from
/// `config.density` if set, otherwise from each frame's cell volume; a frame
/// with neither is an error.
#[instrument(skip_all, name = "rdf", fields(reference = config.reference.len(), target = config.target.len()))]
pub fn run(
    trajectory: &mut dyn Trajectory,
    config: &RdfConfig,
    token: &CancellationToken,
    reporter: &ProgressReporter,
) -> Result<RdfResult, AnalysisError> {
    let natoms = trajectory.len();
    check_selection(&config.reference, natoms)?;
    check_selection(&config.target, natoms)?;

    info!(r_max = config.r_max, bins = config.bins, "Starting RDF.");
    reporter.report(Progress::Started {
        task: "RDF",
        total: None,
    });

    let mut accumulator = Accumulator::new(config);
    loop {
        let buffers = vec![Some(vec![Point3::origin(); natoms]); config.batch_size];
        let batch = trajectory
            .next_conc(buffers, token)
            .map_err(AnalysisError::from_traj)?;
        let (frames, stopped) = batch.wait_all().map_err(AnalysisError::from_traj)?;
        let mut done = 0;
        for frame in frames.iter().flatten() {
            accumulator.add(frame)?;
            done += 1;
        }
        reporter.frames(done);
        match stopped {
            None => continue,
            Some(e) if e.is_last_frame() => break,
            Some(e) => return Err(AnalysisError::from_traj(e)),
        }
    }

    let result = accumulator.finish()?;
    debug!(frames = result.frames, "RDF finished.");
    reporter.report(Progress::Finished {
        frames: result.frames as u64,
    });
    Ok(result)
}
