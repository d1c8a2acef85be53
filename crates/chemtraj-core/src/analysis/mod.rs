//! Consumers that drive a [`Trajectory`](crate::traj::Trajectory) until its
//! last-frame signal and aggregate what they see.

pub mod config;
pub mod correlation;
pub mod error;
pub mod progress;
pub mod rdf;
pub mod rmsd;

pub use error::AnalysisError;
pub use progress::{Progress, ProgressCallback, ProgressReporter};
