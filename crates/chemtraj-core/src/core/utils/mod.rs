//! Geometric primitives and static lookup tables shared by every layer.

pub mod elements;
pub mod geometry;
