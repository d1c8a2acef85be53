//! GROMACS XTC trajectories through the native `xdrfile` decoder.
//!
//! XTC stores nanometres; positions and box vectors are converted to and from
//! ångström at this boundary so every codec exchanges the same units.

use super::dispatch::{self, FrameSource};
use super::error::TrajError;
use super::traits::{FrameBatch, Trajectory, TrajectoryWriter};
use crate::core::models::{Frame, UnitCell};
use nalgebra::Point3;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use xdrfile::{Frame as XdrFrame, Trajectory as XdrTrajectory, XTCTrajectory};

const ANGSTROM_PER_NM: f64 = 10.0;

fn box_to_cell(box_vector: &[[f32; 3]; 3]) -> Option<UnitCell> {
    if box_vector.iter().flatten().all(|v| *v == 0.0) {
        return None;
    }
    let mut cell = [0.0; 9];
    for (out, v) in cell.iter_mut().zip(box_vector.iter().flatten()) {
        *out = *v as f64 * ANGSTROM_PER_NM;
    }
    Some(cell)
}

fn cell_to_box(cell: Option<&UnitCell>) -> [[f32; 3]; 3] {
    let mut box_vector = [[0.0; 3]; 3];
    if let Some(cell) = cell {
        for (i, row) in box_vector.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (cell[3 * i + j] / ANGSTROM_PER_NM) as f32;
            }
        }
    }
    box_vector
}

/// Streaming XTC reader.
pub struct XtcReader {
    trajectory: Option<XTCTrajectory>,
    file: String,
    natoms: usize,
    frames_read: usize,
    last_step: Option<usize>,
    last_time: Option<f32>,
}

impl XtcReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrajError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(TrajError::resource(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            ));
        }
        let mut trajectory = XTCTrajectory::open_read(path)?;
        let natoms = trajectory.get_num_atoms()?;
        let file = path.display().to_string();
        debug!(file = %file, natoms, "Opened XTC trajectory");
        Ok(Self {
            trajectory: Some(trajectory),
            file,
            natoms,
            frames_read: 0,
            last_step: None,
            last_time: None,
        })
    }

    /// Simulation step of the most recently read frame.
    pub fn last_step(&self) -> Option<usize> {
        self.last_step
    }

    /// Simulation time in picoseconds of the most recently read frame.
    pub fn last_time(&self) -> Option<f32> {
        self.last_time
    }

    pub fn frames_read(&self) -> usize {
        self.frames_read
    }
}

impl FrameSource for XtcReader {
    type Raw = XdrFrame;

    fn read_raw(&mut self) -> Result<XdrFrame, TrajError> {
        let trajectory = self.trajectory.as_mut().ok_or(TrajError::NotReadable)?;
        let mut frame = XdrFrame::with_len(self.natoms);
        match trajectory.read(&mut frame) {
            Ok(()) => {}
            Err(e) if e.is_eof() => return Err(TrajError::LastFrame),
            Err(e) => return Err(e.into()),
        }
        self.frames_read += 1;
        self.last_step = Some(frame.step);
        self.last_time = Some(frame.time);
        Ok(frame)
    }

    fn decode(raw: XdrFrame, out: &mut [Point3<f64>]) -> Result<Option<UnitCell>, TrajError> {
        for (position, xyz) in out.iter_mut().zip(&raw.coords) {
            *position = Point3::new(xyz[0] as f64, xyz[1] as f64, xyz[2] as f64) * ANGSTROM_PER_NM;
        }
        Ok(box_to_cell(&raw.box_vector))
    }
}

impl Trajectory for XtcReader {
    fn readable(&self) -> bool {
        self.trajectory.is_some()
    }

    fn len(&self) -> usize {
        self.natoms
    }

    fn next(&mut self, frame: &mut [Point3<f64>]) -> Result<Option<UnitCell>, TrajError> {
        dispatch::next_frame(self, frame)
    }

    fn skip(&mut self) -> Result<(), TrajError> {
        dispatch::skip_frame(self)
    }

    fn next_conc(
        &mut self,
        buffers: Vec<Option<Frame>>,
        token: &CancellationToken,
    ) -> Result<FrameBatch, TrajError> {
        dispatch::next_conc(self, buffers, token)
    }

    fn close(&mut self) {
        if self.trajectory.take().is_some() {
            debug!(file = %self.file, frames = self.frames_read, "Closed XTC trajectory");
        }
    }
}

/// Streaming XTC writer.
pub struct XtcWriter {
    trajectory: Option<XTCTrajectory>,
    file: String,
    frame: XdrFrame,
    natoms: usize,
    timestep: f32,
    frames_written: usize,
}

impl XtcWriter {
    pub fn create(path: impl AsRef<Path>, natoms: usize) -> Result<Self, TrajError> {
        let path = path.as_ref();
        let trajectory = XTCTrajectory::open_write(path)?;
        let file = path.display().to_string();
        debug!(file = %file, natoms, "Created XTC trajectory");
        Ok(Self {
            trajectory: Some(trajectory),
            file,
            frame: XdrFrame::with_len(natoms),
            natoms,
            timestep: 1.0,
            frames_written: 0,
        })
    }

    /// Picoseconds between consecutive frames, used for the stored frame time.
    pub fn with_timestep(mut self, timestep: f32) -> Self {
        self.timestep = timestep;
        self
    }
}

impl TrajectoryWriter for XtcWriter {
    fn len(&self) -> usize {
        self.natoms
    }

    fn frames_written(&self) -> usize {
        self.frames_written
    }

    fn write_next(
        &mut self,
        frame: &[Point3<f64>],
        cell: Option<&UnitCell>,
    ) -> Result<(), TrajError> {
        if frame.len() != self.natoms {
            return Err(TrajError::Capacity {
                expected: self.natoms,
                found: frame.len(),
            });
        }
        let trajectory = self.trajectory.as_mut().ok_or(TrajError::NotReadable)?;

        for (xyz, position) in self.frame.coords.iter_mut().zip(frame) {
            let nm = position.coords / ANGSTROM_PER_NM;
            *xyz = [nm.x as f32, nm.y as f32, nm.z as f32];
        }
        self.frame.box_vector = cell_to_box(cell);
        self.frame.step = self.frames_written;
        self.frame.time = self.frames_written as f32 * self.timestep;

        trajectory.write(&self.frame)?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TrajError> {
        if let Some(mut trajectory) = self.trajectory.take() {
            trajectory.flush()?;
            debug!(file = %self.file, frames = self.frames_written, "Closed XTC trajectory");
        }
        Ok(())
    }
}

impl Drop for XtcWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(file = %self.file, error = %e, "Failed to flush XTC trajectory on drop");
        }
    }
}
