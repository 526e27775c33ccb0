//! Periodic boundary conditions.
//!
//! All distances and displacements in the crate go through a [`Cell`], so the
//! minimum-image convention is applied the same way everywhere.

use crate::error::ConfigError;
use nalgebra::{Matrix3, Point3, Vector3};
use std::fmt;
use std::str::FromStr;

/// Relative tolerance when checking that a hexagonal cell has `a == b`.
const HEXAGONAL_LENGTH_TOLERANCE: f64 = 1e-3;

/// In-plane neighbour translations of a hexagonal lattice, in units of (v1, v2).
const HEXAGONAL_NEIGHBORS: [(f64, f64); 7] = [
    (0.0, 0.0),
    (1.0, 0.0),
    (-1.0, 0.0),
    (0.0, 1.0),
    (0.0, -1.0),
    (1.0, -1.0),
    (-1.0, 1.0),
];

/// Shape of the periodic box.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoxShape {
    /// Orthogonal box with independent lengths along x, y and z
    Rectangular,
    /// Hexagonal prism: `a == b`, 60° between the in-plane vectors, `c` along z
    Hexagonal,
}

impl FromStr for BoxShape {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rectangular" => Ok(BoxShape::Rectangular),
            "hexagonal" => Ok(BoxShape::Hexagonal),
            other => Err(ConfigError::UnsupportedShape(other.to_string())),
        }
    }
}

impl fmt::Display for BoxShape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BoxShape::Rectangular => write!(f, "rectangular"),
            BoxShape::Hexagonal => write!(f, "hexagonal"),
        }
    }
}

/// A periodic cell. The columns of the box matrix are the lattice vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    shape: BoxShape,
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Cell {
    /// Build a cell from a shape tag and the `[a, b, c]` box lengths.
    ///
    /// For hexagonal cells `b` must match `a`; it exists so that lengths read
    /// from a CRYST1 record can be passed through unchanged.
    pub fn new(shape: BoxShape, lengths: [f64; 3]) -> Result<Self, ConfigError> {
        if lengths.iter().any(|l| !l.is_finite() || *l <= 0.0) {
            return Err(ConfigError::NonPositiveBox { lengths });
        }
        let [a, b, c] = lengths;
        let matrix = match shape {
            BoxShape::Rectangular => Matrix3::from_diagonal(&Vector3::new(a, b, c)),
            BoxShape::Hexagonal => {
                if (a - b).abs() > HEXAGONAL_LENGTH_TOLERANCE * a.max(b) {
                    return Err(ConfigError::HexagonalMismatch { a, b });
                }
                let half_sqrt3 = 3f64.sqrt() / 2.0;
                Matrix3::new(
                    a, 0.5 * a, 0.0, //
                    0.0, half_sqrt3 * a, 0.0, //
                    0.0, 0.0, c,
                )
            }
        };
        // Both matrices are triangular with a positive diagonal at this point
        let inverse = matrix
            .try_inverse()
            .ok_or(ConfigError::NonPositiveBox { lengths })?;

        Ok(Self {
            shape,
            matrix,
            inverse,
        })
    }

    /// Orthogonal box with lengths `a`, `b` and `c`.
    pub fn rectangular(a: f64, b: f64, c: f64) -> Result<Self, ConfigError> {
        Self::new(BoxShape::Rectangular, [a, b, c])
    }

    /// Hexagonal prism with in-plane length `a` and height `c`.
    pub fn hexagonal(a: f64, c: f64) -> Result<Self, ConfigError> {
        Self::new(BoxShape::Hexagonal, [a, a, c])
    }

    pub fn shape(&self) -> BoxShape {
        self.shape
    }

    /// Lattice vector `i` (0, 1 or 2).
    pub fn lattice_vector(&self, i: usize) -> Vector3<f64> {
        self.matrix.column(i).clone_owned()
    }

    /// Fractional coordinates of a point (not wrapped).
    pub fn fractional(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.inverse * p.coords
    }

    /// Distances between opposite faces of the cell along each lattice direction.
    pub fn plane_spacings(&self) -> [f64; 3] {
        [0, 1, 2].map(|i| 1.0 / self.inverse.row(i).norm())
    }

    /// Shortest periodic image of a displacement vector.
    pub fn min_image(&self, d: &Vector3<f64>) -> Vector3<f64> {
        let s = (self.inverse * d).map(|x| x - x.round());
        let reduced = self.matrix * s;

        match self.shape {
            BoxShape::Rectangular => reduced,
            BoxShape::Hexagonal => {
                // Per-axis rounding does not find the nearest image of a skewed lattice
                let v1 = self.lattice_vector(0);
                let v2 = self.lattice_vector(1);
                HEXAGONAL_NEIGHBORS
                    .iter()
                    .map(|(i, j)| reduced + v1 * *i + v2 * *j)
                    .min_by(|x, y| x.norm_squared().total_cmp(&y.norm_squared()))
                    .unwrap_or(reduced)
            }
        }
    }

    /// Minimum-image displacement pointing from `a` to `b`.
    pub fn displacement(&self, a: &Point3<f64>, b: &Point3<f64>) -> Vector3<f64> {
        self.min_image(&(b - a))
    }

    /// Minimum-image distance between two points.
    pub fn distance(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        self.displacement(a, b).norm()
    }

    /// The periodic image of `p` closest to `reference`.
    pub fn image_near(&self, reference: &Point3<f64>, p: &Point3<f64>) -> Point3<f64> {
        reference + self.displacement(reference, p)
    }

    /// Translate a point into the primary cell.
    pub fn wrap(&self, p: &Point3<f64>) -> Point3<f64> {
        let s = self.fractional(p).map(|x| x - x.floor());
        Point3::from(self.matrix * s)
    }

    /// Make a path of points contiguous: every point is moved to the image
    /// closest to its predecessor. The first point is kept as is.
    pub fn unwrap_path(&self, points: &[Point3<f64>]) -> Vec<Point3<f64>> {
        let mut unwrapped: Vec<Point3<f64>> = Vec::with_capacity(points.len());
        for p in points {
            let next = match unwrapped.last() {
                Some(prev) => self.image_near(prev, p),
                None => *p,
            };
            unwrapped.push(next);
        }
        unwrapped
    }
}
