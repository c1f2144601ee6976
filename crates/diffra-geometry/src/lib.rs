//! # Diffra Geometry
//!
//! Geometry handling for the Diffra framework. A diffractive network is a
//! stack of parallel planes, each an $N \times N$ array of optical elements
//! (source pixels, modulating neurons or detector cells). This crate provides:
//!
//! - **Plane grids** ([`grid`]): Physical element positions for a square
//!   plane of side $L$ at height $z$, each element centred in its cell.

pub mod grid;

pub use grid::{GeometryError, PlaneGrid, Position};
