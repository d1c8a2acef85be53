use super::error::TrajError;
use crate::core::models::{Frame, UnitCell};
use nalgebra::Point3;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Sequential, single-direction reader over a stream of coordinate frames.
///
/// Every codec satisfies this contract identically, so analysis code can stay
/// format-agnostic:
///
/// - Buffers must hold exactly [`len`](Trajectory::len) positions, otherwise
///   [`TrajError::Capacity`] is returned and the stream is left untouched.
/// - Clean end of stream is reported as [`TrajError::LastFrame`]. After it, or
///   after any fatal read error, the handle is closed, [`readable`](Trajectory::readable)
///   returns `false` and further reads fail with [`TrajError::NotReadable`].
/// - [`close`](Trajectory::close) is idempotent.
pub trait Trajectory {
    /// Whether another read may produce a frame.
    fn readable(&self) -> bool;

    /// Number of atoms in every frame.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes the next frame into `frame` and returns its unit cell when the
    /// format stores one.
    fn next(&mut self, frame: &mut [Point3<f64>]) -> Result<Option<UnitCell>, TrajError>;

    /// Advances past the next frame without keeping its coordinates.
    fn skip(&mut self) -> Result<(), TrajError>;

    /// Like [`next`](Trajectory::next), but gives up with [`TrajError::Cancelled`]
    /// and closes the handle if `token` has been cancelled.
    fn next_cancellable(
        &mut self,
        frame: &mut [Point3<f64>],
        token: &CancellationToken,
    ) -> Result<Option<UnitCell>, TrajError> {
        if token.is_cancelled() {
            self.close();
            return Err(TrajError::Cancelled);
        }
        self.next(frame)
    }

    /// Reads one frame per entry of `buffers` and decodes them concurrently.
    ///
    /// Frames are read from the stream in order on the calling thread; decoding
    /// each one runs as its own task and is delivered through the matching
    /// [`FrameHandle`]. A `None` buffer still consumes a frame but yields a `None`
    /// handle. If the stream ends, fails or is cancelled part way through, the
    /// returned batch holds the handles read so far and the reason in
    /// [`FrameBatch::stopped`].
    ///
    /// Fails up front with [`TrajError::Capacity`] if any buffer has the wrong
    /// length and with [`TrajError::NotReadable`] if the handle cannot be read.
    fn next_conc(
        &mut self,
        buffers: Vec<Option<Frame>>,
        token: &CancellationToken,
    ) -> Result<FrameBatch, TrajError>;

    /// Releases the underlying file. Safe to call any number of times.
    fn close(&mut self);
}

/// Append-only writer producing one frame per call.
pub trait TrajectoryWriter {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of frames written so far.
    fn frames_written(&self) -> usize;

    fn write_next(
        &mut self,
        frame: &[Point3<f64>],
        cell: Option<&UnitCell>,
    ) -> Result<(), TrajError>;

    /// Flushes and releases the underlying file. Safe to call any number of times.
    fn close(&mut self) -> Result<(), TrajError>;
}

/// A frame decoded by [`Trajectory::next_conc`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// The caller's buffer, filled with the frame's positions.
    pub coords: Frame,
    pub cell: Option<UnitCell>,
}

pub(crate) type FrameSender = oneshot::Sender<Result<DecodedFrame, TrajError>>;

/// Single-use receiver for one frame of a concurrent batch.
///
/// Either block on it with [`wait`](FrameHandle::wait) or `.await` it.
#[derive(Debug)]
pub struct FrameHandle {
    receiver: oneshot::Receiver<Result<DecodedFrame, TrajError>>,
}

impl FrameHandle {
    pub(crate) fn channel() -> (FrameSender, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, Self { receiver })
    }

    /// Blocks the current thread until the frame is decoded.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context; `.await`
    /// the handle there instead.
    pub fn wait(self) -> Result<DecodedFrame, TrajError> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(TrajError::Disconnected))
    }
}

impl Future for FrameHandle {
    type Output = Result<DecodedFrame, TrajError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TrajError::Disconnected)))
    }
}

/// Handles returned by [`Trajectory::next_conc`], index-aligned with the request.
#[derive(Debug)]
pub struct FrameBatch {
    /// One entry per frame consumed from the stream, in stream order.
    pub handles: Vec<Option<FrameHandle>>,
    /// Why the batch ended before every requested frame was read, if it did.
    pub stopped: Option<TrajError>,
}

impl FrameBatch {
    /// True when the stream ended cleanly part way through (or exactly at) this batch.
    pub fn reached_last_frame(&self) -> bool {
        self.stopped.as_ref().is_some_and(TrajError::is_last_frame)
    }

    /// Waits for every handle in order.
    ///
    /// Returns the decoded frames (with `None` for skipped slots) together with
    /// the condition that stopped the batch. The first decoding failure is
    /// returned as an error instead.
    pub fn wait_all(self) -> Result<(Vec<Option<DecodedFrame>>, Option<TrajError>), TrajError> {
        let frames = self
            .handles
            .into_iter()
            .map(|handle| handle.map(FrameHandle::wait).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        Ok((frames, self.stopped))
    }
}
