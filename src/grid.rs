//! Periodic cell list for fixed-radius neighbour queries.

use crate::pbc::Cell;
use nalgebra::Point3;

/// Atoms binned by wrapped fractional coordinates.
#[derive(Clone, Debug)]
pub struct PeriodicGrid {
    cell: Cell,
    positions: Vec<Point3<f64>>,
    dims: [usize; 3],
    widths: [f64; 3],
    bins: Vec<Vec<usize>>,
}

impl PeriodicGrid {
    /// Bin `positions` with bins at least `spacing` Å thick along each lattice direction.
    ///
    /// Each axis gets at most the cube root of the point count in bins, so the
    /// grid never has many more bins than points.
    pub fn new(cell: &Cell, positions: Vec<Point3<f64>>, spacing: f64) -> Self {
        let widths = cell.plane_spacings();
        let max_per_axis = (positions.len().max(1) as f64).cbrt().ceil();
        let dims = widths.map(|w| (w / spacing).floor().clamp(1.0, max_per_axis) as usize);
        let mut bins = vec![Vec::new(); dims[0] * dims[1] * dims[2]];

        for (i, p) in positions.iter().enumerate() {
            let b = bin_of(cell, &dims, p);
            bins[flat_index(&dims, b)].push(i);
        }

        Self {
            cell: cell.clone(),
            positions,
            dims,
            widths,
            bins,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Sorted indices of all points within `cutoff` of `point` (minimum image).
    pub fn within(&self, point: &Point3<f64>, cutoff: f64) -> Vec<usize> {
        let center = bin_of(&self.cell, &self.dims, point);
        let ranges: [Vec<usize>; 3] = [0, 1, 2].map(|axis| {
            let n = self.dims[axis];
            let span = (cutoff * n as f64 / self.widths[axis]).ceil() as usize;
            if 2 * span + 1 >= n {
                (0..n).collect()
            } else {
                let c = center[axis] as isize;
                (-(span as isize)..=span as isize)
                    .map(|offset| (c + offset).rem_euclid(n as isize) as usize)
                    .collect()
            }
        });

        let mut found = Vec::new();
        for &i in &ranges[0] {
            for &j in &ranges[1] {
                for &k in &ranges[2] {
                    found.extend(
                        self.bins[flat_index(&self.dims, [i, j, k])]
                            .iter()
                            .copied()
                            .filter(|&a| self.cell.distance(point, &self.positions[a]) <= cutoff),
                    );
                }
            }
        }
        found.sort_unstable();
        found
    }
}

fn bin_of(cell: &Cell, dims: &[usize; 3], p: &Point3<f64>) -> [usize; 3] {
    let s = cell.fractional(p);
    [0, 1, 2].map(|axis| {
        let f = s[axis] - s[axis].floor();
        ((f * dims[axis] as f64) as usize).min(dims[axis] - 1)
    })
}

fn flat_index(dims: &[usize; 3], b: [usize; 3]) -> usize {
    (b[0] * dims[1] + b[1]) * dims[2] + b[2]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(cell: &Cell, points: &[Point3<f64>], q: &Point3<f64>, cutoff: f64) -> Vec<usize> {
        (0..points.len())
            .filter(|&i| cell.distance(q, &points[i]) <= cutoff)
            .collect()
    }

    fn scattered(n: usize, scale: f64) -> Vec<Point3<f64>> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                Point3::new(
                    ((t * 0.917).sin() * 0.5 + 0.5) * scale,
                    ((t * 1.731).cos() * 0.5 + 0.5) * scale,
                    ((t * 0.377).sin() * 0.5 + 0.5) * scale - 3.0,
                )
            })
            .collect()
    }

    #[test]
    fn rectangular_queries_match_brute_force() {
        let cell = Cell::rectangular(30.0, 25.0, 20.0).unwrap();
        let points = scattered(400, 30.0);
        let grid = PeriodicGrid::new(&cell, points.clone(), 4.0);
        assert_eq!(grid.dims(), [7, 6, 5]);

        for q in scattered(25, 33.0) {
            assert_eq!(grid.within(&q, 5.5), brute_force(&cell, &points, &q, 5.5));
        }
    }

    #[test]
    fn hexagonal_queries_match_brute_force() {
        let cell = Cell::hexagonal(28.0, 18.0).unwrap();
        let points = scattered(400, 28.0);
        let grid = PeriodicGrid::new(&cell, points.clone(), 3.0);

        for q in scattered(25, 31.0) {
            assert_eq!(grid.within(&q, 4.2), brute_force(&cell, &points, &q, 4.2));
        }
    }

    #[test]
    fn large_cutoff_visits_every_bin_once() {
        let cell = Cell::rectangular(10.0, 10.0, 10.0).unwrap();
        let points = scattered(50, 10.0);
        let grid = PeriodicGrid::new(&cell, points.clone(), 2.0);

        let all = grid.within(&Point3::new(5.0, 5.0, 5.0), 100.0);
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn tiny_spacing_is_capped() {
        let cell = Cell::rectangular(100.0, 100.0, 100.0).unwrap();
        let points = scattered(30, 100.0);
        let grid = PeriodicGrid::new(&cell, points.clone(), 1e-5);
        assert_eq!(grid.dims(), [4, 4, 4]);

        let q = Point3::new(50.0, 50.0, 50.0);
        assert_eq!(grid.within(&q, 30.0), brute_force(&cell, &points, &q, 30.0));
    }

    #[test]
    fn spacing_larger_than_box_gives_single_bin() {
        let cell = Cell::rectangular(3.0, 3.0, 3.0).unwrap();
        let grid = PeriodicGrid::new(&cell, vec![Point3::new(0.1, 0.1, 0.1)], 10.0);
        assert_eq!(grid.dims(), [1, 1, 1]);
        assert_eq!(grid.within(&Point3::new(2.9, 2.9, 2.9), 0.5), vec![0]);
    }
}
