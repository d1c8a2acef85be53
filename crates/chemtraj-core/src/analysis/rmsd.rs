use super::config::RmsdConfig;
use super::error::{AnalysisError, check_selection};
use super::progress::{Progress, ProgressReporter};
use crate::core::models::Frame;
use crate::core::utils::geometry;
use crate::traj::Trajectory;
use nalgebra::Point3;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

fn select(frame: &[Point3<f64>], selection: Option<&[usize]>) -> Frame {
    match selection {
        Some(indices) => indices.iter().map(|&i| frame[i]).collect(),
        None => frame.to_vec(),
    }
}

/// RMSD of every remaining frame of `trajectory` against `config.reference`.
///
/// The reference must hold one position per trajectory atom; the selection
/// picks the compared atoms from both. Returns one value per frame, in
/// trajectory order.
#[instrument(skip_all, name = "rmsd", fields(superpose = config.superpose))]
pub fn run(
    trajectory: &mut dyn Trajectory,
    config: &RmsdConfig,
    token: &CancellationToken,
    reporter: &ProgressReporter,
) -> Result<Vec<f64>, AnalysisError> {
    let natoms = trajectory.len();
    if config.reference.len() != natoms {
        return Err(AnalysisError::Geometry {
            frame: 0,
            source: geometry::GeometryError::ShapeMismatch {
                left: natoms,
                right: config.reference.len(),
            },
        });
    }
    let selection = config.selection.as_deref();
    if let Some(indices) = selection {
        check_selection(indices, natoms)?;
    }
    let reference = select(&config.reference, selection);

    info!(atoms = reference.len(), "Starting RMSD series.");
    reporter.report(Progress::Started {
        task: "RMSD",
        total: None,
    });

    let mut buffer = vec![Point3::origin(); natoms];
    let mut values = Vec::new();
    loop {
        match trajectory.next_cancellable(&mut buffer, token) {
            Ok(_) => {}
            Err(e) if e.is_last_frame() => break,
            Err(e) => return Err(AnalysisError::from_traj(e)),
        }
        let frame = values.len();
        let mut mobile = select(&buffer, selection);
        let measured = if config.superpose {
            geometry::superpose(&mobile, &reference).and_then(|fit| {
                fit.apply_all(&mut mobile);
                geometry::rmsd(&mobile, &reference)
            })
        } else {
            geometry::rmsd(&mobile, &reference)
        };
        values.push(measured.map_err(|source| AnalysisError::Geometry { frame, source })?);
        reporter.frames(1);
    }

    debug!(frames = values.len(), "RMSD series finished.");
    reporter.report(Progress::Finished {
        frames: values.len() as u64,
    });
    Ok(values)
}
