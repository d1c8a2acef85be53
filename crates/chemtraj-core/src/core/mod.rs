//! # Core Module
//!
//! This module provides the fundamental building blocks of chemtraj: the molecular
//! data model, the geometric operations applied to coordinate frames, and the
//! lookup tables and file readers that populate them.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Atoms, topologies with index-based bonds,
//!   and multi-frame molecules
//! - **Geometry & Tables** ([`utils`]) - Rotations, superposition, RMSD, dihedrals, shape
//!   descriptors, and static element/residue tables
//! - **Structure I/O** ([`io`]) - Whole-file readers and writers producing [`models::molecule::Molecule`]
//!
//! Nothing in this module holds an open file between calls; streaming access to
//! coordinate frames lives in [`crate::traj`].

pub mod io;
pub mod models;
pub mod utils;
