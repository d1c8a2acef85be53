use super::dispatch::{self, FrameSource};
use super::error::TrajError;
use super::traits::{FrameBatch, Trajectory};
use crate::core::models::{Frame, UnitCell};
use nalgebra::Point3;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

/// A trajectory over frames already held in memory, e.g. from a multi-frame XYZ file.
#[derive(Debug, Clone)]
pub struct MemoryTrajectory {
    natoms: usize,
    pending: Option<VecDeque<(Frame, Option<UnitCell>)>>,
}

impl MemoryTrajectory {
    /// Frames are yielded in order. Missing cells are treated as unknown.
    ///
    /// # Panics
    ///
    /// Panics if any frame does not hold exactly `natoms` positions.
    pub fn new(natoms: usize, frames: Vec<Frame>, cells: Vec<Option<UnitCell>>) -> Self {
        assert!(
            frames.iter().all(|f| f.len() == natoms),
            "every frame must hold {natoms} positions"
        );
        let cells = cells.into_iter().chain(std::iter::repeat(None));
        Self {
            natoms,
            pending: Some(frames.into_iter().zip(cells).collect()),
        }
    }

    /// Frames not yet consumed.
    pub fn remaining(&self) -> usize {
        self.pending.as_ref().map_or(0, VecDeque::len)
    }
}

impl FrameSource for MemoryTrajectory {
    type Raw = (Frame, Option<UnitCell>);

    fn read_raw(&mut self) -> Result<Self::Raw, TrajError> {
        self.pending
            .as_mut()
            .ok_or(TrajError::NotReadable)?
            .pop_front()
            .ok_or(TrajError::LastFrame)
    }

    fn decode(
        (positions, cell): Self::Raw,
        frame: &mut [Point3<f64>],
    ) -> Result<Option<UnitCell>, TrajError> {
        frame.copy_from_slice(&positions);
        Ok(cell)
    }
}

impl Trajectory for MemoryTrajectory {
    fn readable(&self) -> bool {
        self.pending.is_some()
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
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> Vec<Frame> {
        (0..n)
            .map(|i| vec![Point3::new(i as f64, 0.0, 0.0), Point3::new(0.0, i as f64, 0.0)])
            .collect()
    }

    #[test]
    fn yields_frames_then_last_frame() {
        let cell = [5.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 5.0];
        let mut traj = MemoryTrajectory::new(2, frames(2), vec![Some(cell)]);
        let mut buffer = vec![Point3::origin(); 2];

        assert_eq!(traj.next(&mut buffer).unwrap(), Some(cell));
        assert_eq!(traj.next(&mut buffer).unwrap(), None);
        assert_eq!(buffer[1].y, 1.0);
        assert!(traj.next(&mut buffer).unwrap_err().is_last_frame());
        assert!(!traj.readable());
        assert!(matches!(traj.skip(), Err(TrajError::NotReadable)));
    }

    #[test]
    fn capacity_mismatch_leaves_stream_untouched() {
        let mut traj = MemoryTrajectory::new(2, frames(1), Vec::new());
        let mut short = vec![Point3::origin(); 1];
        assert!(matches!(
            traj.next(&mut short),
            Err(TrajError::Capacity {
                expected: 2,
                found: 1
            })
        ));
        assert_eq!(traj.remaining(), 1);
        assert!(traj.readable());
    }

    #[test]
    fn close_is_idempotent() {
        let mut traj = MemoryTrajectory::new(2, frames(3), Vec::new());
        traj.close();
        traj.close();
        assert!(!traj.readable());
        assert_eq!(traj.remaining(), 0);
    }

    #[tokio::test]
    async fn batch_handles_can_be_awaited() {
        let mut traj = MemoryTrajectory::new(2, frames(3), Vec::new());
        let token = CancellationToken::new();
        let batch = traj
            .next_conc(vec![Some(vec![Point3::origin(); 2]); 3], &token)
            .unwrap();
        assert!(batch.stopped.is_none());
        let mut xs = Vec::new();
        for handle in batch.handles.into_iter().flatten() {
            xs.push(handle.await.unwrap().coords[0].x);
        }
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
    }
}
