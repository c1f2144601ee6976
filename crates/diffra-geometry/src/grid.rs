//! Square plane grids of optical elements.
//!
//! A plane of side length $L$ divided into $N \times N$ cells places element
//! $[i][j]$ at the cell centre
//!
//! $$
//! \mathbf{r}_{ij} = \left((i + \tfrac{1}{2})\frac{L}{N},\ (j + \tfrac{1}{2})\frac{L}{N},\ z\right)
//! $$
//!
//! so neighbouring centres are one pitch $L/N$ apart and the cells tile
//! exactly $[0, L] \times [0, L]$. All lengths are in metres.

use ndarray::Array3;
use serde::Serialize;
use thiserror::Error;

/// A point in 3D space (m).
pub type Position = [f64; 3];

/// Errors raised while constructing plane geometry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("Grid size must be positive, got {0}")]
    InvalidSize(usize),

    #[error("Side length must be positive and finite, got {0}")]
    InvalidLength(f64),

    #[error("Plane z-coordinate must be finite, got {0}")]
    InvalidPlane(f64),
}

/// Positions of every element of an $N \times N$ planar array.
///
/// Grids are built once per layer and never mutated; all positions share
/// the plane's z-coordinate.
#[derive(Debug, Clone, Serialize)]
pub struct PlaneGrid {
    size: usize,
    side_length: f64,
    z: f64,
    /// Row-major element centres, index `i * size + j`.
    positions: Vec<Position>,
}

impl PlaneGrid {
    /// Build the grid for `size × size` elements spanning `side_length` at height `z`.
    pub fn new(size: usize, side_length: f64, z: f64) -> Result<Self, GeometryError> {
        if size == 0 {
            return Err(GeometryError::InvalidSize(size));
        }
        if !(side_length.is_finite() && side_length > 0.0) {
            return Err(GeometryError::InvalidLength(side_length));
        }
        if !z.is_finite() {
            return Err(GeometryError::InvalidPlane(z));
        }

        let pitch = side_length / size as f64;
        let mut positions = Vec::with_capacity(size * size);
        for i in 0..size {
            for j in 0..size {
                positions.push([pitch * (i as f64 + 0.5), pitch * (j as f64 + 0.5), z]);
            }
        }

        Ok(Self {
            size,
            side_length,
            z,
            positions,
        })
    }

    /// Number of elements along one side.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Physical side length of the plane (m).
    pub fn side_length(&self) -> f64 {
        self.side_length
    }

    /// Height of the plane along the optical axis (m).
    pub fn z(&self) -> f64 {
        self.z
    }

    /// Centre-to-centre spacing of neighbouring elements, $L/N$ (m).
    pub fn pitch(&self) -> f64 {
        self.side_length / self.size as f64
    }

    /// Total number of elements, $N^2$.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Always false: a valid grid holds at least one element.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Position of element `[i][j]`.
    ///
    /// # Panics
    /// Panics if `i` or `j` is not below [`size`](Self::size).
    pub fn position(&self, i: usize, j: usize) -> Position {
        assert!(
            i < self.size && j < self.size,
            "Element [{}][{}] outside {}x{} grid",
            i,
            j,
            self.size,
            self.size
        );
        self.positions[i * self.size + j]
    }

    /// All element positions in row-major order.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Positions as an `(N, N, 3)` array whose last axis is `(x, y, z)`.
    pub fn coordinate_array(&self) -> Array3<f64> {
        Array3::from_shape_fn((self.size, self.size, 3), |(i, j, c)| {
            self.positions[i * self.size + j][c]
        })
    }

    /// Physical extent covered by the cells: `[x_min, x_max, y_min, y_max]`.
    pub fn extent(&self) -> [f64; 4] {
        [0.0, self.side_length, 0.0, self.side_length]
    }

    /// Distance between this plane and another along the optical axis.
    pub fn separation(&self, other: &PlaneGrid) -> f64 {
        (other.z - self.z).abs()
    }
}
