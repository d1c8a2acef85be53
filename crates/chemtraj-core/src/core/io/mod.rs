//! Provides whole-file input/output for molecular structure formats.
//!
//! Readers in this module load every frame of a file into a
//! [`Molecule`](crate::core::models::molecule::Molecule) at once and share the
//! [`traits::MolecularFile`] interface. Streaming access to large coordinate files
//! is provided by [`crate::traj`] instead.

pub mod traits;
pub mod xyz;
