//! # Core Models Module
//!
//! Data structures describing a molecular system independently of how it is stored on disk.
//!
//! ## Key Components
//!
//! - [`atom`] - Per-atom identity and classification record
//! - [`topology`] - Ordered atom arena, index-based bonds, and whole-molecule metadata
//! - [`molecule`] - A topology together with its coordinate and B-factor frames
//!
//! ## Usage
//!
//! ```ignore
//! use chemtraj::core::models::{atom::Atom, molecule::Molecule, topology::Topology};
//! use nalgebra::Point3;
//!
//! let mut topology = Topology::new();
//! topology.add_atom(Atom::new("O1", "O"));
//! topology.add_atom(Atom::new("H1", "H"));
//!
//! let frame = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.96, 0.0, 0.0)];
//! let molecule = Molecule::new(topology, vec![frame], Vec::new())?;
//! ```

pub mod atom;
pub mod molecule;
pub mod topology;

use nalgebra::Point3;

/// One snapshot of all atom positions, aligned by index with the owning topology.
pub type Frame = Vec<Point3<f64>>;

/// Periodic cell as three box vectors stored row-major (`a.x a.y a.z b.x ... c.z`), in Angstroms.
pub type UnitCell = [f64; 9];
