//! Streaming trajectory codecs behind the [`Trajectory`] and [`TrajectoryWriter`] contracts.

pub(crate) mod dispatch;
pub mod dcd;
pub mod error;
pub mod memory;
pub mod open;
pub mod stf;
pub mod traits;
pub mod xtc;

pub use error::{Location, TrajError};
pub use open::{WriterOptions, create_writer, open_trajectory};
pub use traits::{DecodedFrame, FrameBatch, FrameHandle, Trajectory, TrajectoryWriter};
