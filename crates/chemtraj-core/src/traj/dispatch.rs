//! Shared read path for every codec.
//!
//! A codec splits reading a frame into a sequential part that touches the stream
//! ([`FrameSource::read_raw`]) and a pure part that turns the raw record into
//! coordinates ([`FrameSource::decode`]). The helpers here enforce the
//! [`Trajectory`] contract on top of that split so the codecs don't have to.

use super::error::TrajError;
use super::traits::{DecodedFrame, FrameBatch, FrameHandle, Trajectory};
use crate::core::models::{Frame, UnitCell};
use nalgebra::Point3;
use tokio_util::sync::CancellationToken;
use tracing::trace;

type DecodeFn<R> = fn(R, &mut [Point3<f64>]) -> Result<Option<UnitCell>, TrajError>;

pub(crate) trait FrameSource: Trajectory {
    /// Undecoded frame, owned so it can be moved to a worker thread.
    type Raw: Send + 'static;

    /// Consumes the next frame from the stream.
    ///
    /// Every malformation must be reported here: an error from `read_raw`
    /// closes the source on all read paths, while a decode error inside a
    /// concurrent batch only reaches that frame's handle.
    fn read_raw(&mut self) -> Result<Self::Raw, TrajError>;

    /// Turns a validated raw frame into positions. Must not depend on stream state.
    fn decode(raw: Self::Raw, frame: &mut [Point3<f64>]) -> Result<Option<UnitCell>, TrajError>;
}

fn check_capacity(expected: usize, found: usize) -> Result<(), TrajError> {
    if expected == found {
        Ok(())
    } else {
        Err(TrajError::Capacity { expected, found })
    }
}

fn ensure_readable<S: FrameSource>(source: &S) -> Result<(), TrajError> {
    if source.readable() {
        Ok(())
    } else {
        Err(TrajError::NotReadable)
    }
}

// Any failure to read from the stream is terminal for the handle.
fn read_or_close<S: FrameSource>(source: &mut S) -> Result<S::Raw, TrajError> {
    source.read_raw().inspect_err(|_| source.close())
}

pub(crate) fn next_frame<S: FrameSource>(
    source: &mut S,
    frame: &mut [Point3<f64>],
) -> Result<Option<UnitCell>, TrajError> {
    ensure_readable(source)?;
    check_capacity(source.len(), frame.len())?;
    let raw = read_or_close(source)?;
    S::decode(raw, frame).inspect_err(|_| source.close())
}

pub(crate) fn skip_frame<S: FrameSource>(source: &mut S) -> Result<(), TrajError> {
    ensure_readable(source)?;
    read_or_close(source).map(drop)
}

pub(crate) fn next_conc<S: FrameSource>(
    source: &mut S,
    buffers: Vec<Option<Frame>>,
    token: &CancellationToken,
) -> Result<FrameBatch, TrajError> {
    ensure_readable(source)?;
    let natoms = source.len();
    for buffer in buffers.iter().flatten() {
        check_capacity(natoms, buffer.len())?;
    }

    let mut handles = Vec::with_capacity(buffers.len());
    for buffer in buffers {
        if token.is_cancelled() {
            source.close();
            return Ok(FrameBatch {
                handles,
                stopped: Some(TrajError::Cancelled),
            });
        }
        let raw = match read_or_close(source) {
            Ok(raw) => raw,
            Err(err) => {
                trace!(read = handles.len(), error = %err, "Concurrent batch stopped early");
                return Ok(FrameBatch {
                    handles,
                    stopped: Some(err),
                });
            }
        };
        handles.push(buffer.map(|buffer| spawn_decode(S::decode, raw, buffer, token.clone())));
    }

    Ok(FrameBatch {
        handles,
        stopped: None,
    })
}

fn spawn_decode<R: Send + 'static>(
    decode: DecodeFn<R>,
    raw: R,
    mut buffer: Frame,
    token: CancellationToken,
) -> FrameHandle {
    let (sender, handle) = FrameHandle::channel();
    let job = move || {
        let result = if token.is_cancelled() {
            Err(TrajError::Cancelled)
        } else {
            decode(raw, &mut buffer).map(|cell| DecodedFrame {
                coords: buffer,
                cell,
            })
        };
        // The caller may have dropped the handle; nothing to deliver then.
        let _ = sender.send(result);
    };

    #[cfg(feature = "parallel")]
    rayon::spawn(job);
    #[cfg(not(feature = "parallel"))]
    job();

    handle
}
