//! # chemtraj Core Library
//!
//! Molecular data structures, geometry, and streaming trajectory I/O for
//! computational chemistry, with the analysis routines that consume them.
//!
//! ## Architectural Philosophy
//!
//! The library is organized in three layers, each depending only on the ones below it.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Atom`, `Topology`, `Molecule`),
//!   geometric primitives (rotations, superposition, RMSD, shape descriptors), static
//!   element tables, and whole-file structure I/O.
//!
//! - **[`traj`]: The Streaming Layer.** Stateful trajectory handles for the DCD, XTC, and
//!   STF/CTF formats behind one [`traj::Trajectory`] contract, including the concurrent
//!   frame dispatcher (`next_conc`) and cancellation support.
//!
//! - **[`analysis`]: The Consumers.** Radial distribution functions, RMSD time series, and
//!   correlation functions that drive any `Trajectory` until its last-frame signal.

pub mod analysis;
pub mod core;
pub mod traj;
