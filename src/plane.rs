use crate::rings::Ring;
use crate::system::Snapshot;
use nalgebra as na;
use thiserror::Error;

/// Default relative eigenvalue threshold below which a ring counts as colinear.
pub const PLANARITY_TOLERANCE: f64 = 1e-6;

/// Largest covariance eigenvalue (Å²) at which all ring atoms count as coincident.
const COINCIDENT_THRESHOLD: f64 = 1e-10;

/// Why a ring could not be given a plane.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum DegenerateRing {
    #[error("ring has only {0} atoms")]
    TooFewAtoms(usize),
    #[error("ring atoms coincide")]
    Coincident,
    #[error("ring atoms are colinear")]
    Colinear,
}

/// The least-squares plane through a ring and the ring outline projected onto it.
#[derive(Clone, Debug)]
pub struct FittedPlane {
    /// Ring centroid in the ring's reference periodic image
    pub center: na::Point3<f64>,
    /// Unit normal, oriented so the outline winds counter-clockwise in (u, v)
    pub normal: na::Vector3<f64>,
    /// In-plane unit vector along the largest spread of the ring atoms
    pub u: na::Vector3<f64>,
    /// `normal × u`
    pub v: na::Vector3<f64>,
    /// Ring atoms projected onto the plane, in bonded order
    pub polygon: Vec<na::Point2<f64>>,
    /// Largest distance of a ring atom from the centroid
    pub radius: f64,
}

impl FittedPlane {
    /// Fit a plane through points that are already contiguous in space.
    ///
    /// The normal is the eigenvector of the smallest eigenvalue of the centered
    /// covariance matrix.
    pub fn fit(points: &[na::Point3<f64>], tolerance: f64) -> Result<Self, DegenerateRing> {
        if points.len() < 3 {
            return Err(DegenerateRing::TooFewAtoms(points.len()));
        }

        let n = points.len() as f64;
        let center = na::Point3::from(
            points
                .iter()
                .fold(na::Vector3::zeros(), |acc, p| acc + p.coords)
                / n,
        );
        let covariance = points.iter().fold(na::Matrix3::zeros(), |acc, p| {
            let d = p - center;
            acc + d * d.transpose()
        }) / n;

        let eigen = covariance.symmetric_eigen();
        let mut order = [0usize, 1, 2];
        order.sort_by(|&i, &j| eigen.eigenvalues[i].total_cmp(&eigen.eigenvalues[j]));
        let [smallest, middle, largest] = order;

        let spread = eigen.eigenvalues[largest];
        if spread <= COINCIDENT_THRESHOLD {
            return Err(DegenerateRing::Coincident);
        }
        if eigen.eigenvalues[middle] <= tolerance * spread {
            return Err(DegenerateRing::Colinear);
        }

        let mut normal = eigen.eigenvectors.column(smallest).normalize();
        let u = eigen.eigenvectors.column(largest).normalize();
        let mut v = normal.cross(&u);
        let mut polygon = project_all(points, &center, &u, &v);
        if signed_area(&polygon) < 0.0 {
            normal = -normal;
            v = -v;
            polygon.iter_mut().for_each(|p| p.y = -p.y);
        }

        let radius = points
            .iter()
            .map(|p| (p - center).norm())
            .fold(0.0, f64::max);

        Ok(Self {
            center,
            normal,
            u,
            v,
            polygon,
            radius,
        })
    }

    /// Fit the plane of a ring, unwrapping its atoms along the bonded order
    /// into the image of the ring's first atom.
    pub fn fit_ring(
        snapshot: &Snapshot,
        ring: &Ring,
        tolerance: f64,
    ) -> Result<Self, DegenerateRing> {
        let points = ring_points(snapshot, ring);
        Self::fit(&points, tolerance)
    }

    /// Signed distance of a point from the plane, positive on the normal side.
    pub fn signed_distance(&self, point: &na::Point3<f64>) -> f64 {
        self.normal.dot(&(point - self.center))
    }

    /// In-plane coordinates of a point's projection.
    pub fn project(&self, point: &na::Point3<f64>) -> na::Point2<f64> {
        let d = point - self.center;
        na::Point2::new(self.u.dot(&d), self.v.dot(&d))
    }

    /// Whether the projection of a point falls inside the ring outline (even-odd rule).
    pub fn contains_projected(&self, point: &na::Point3<f64>) -> bool {
        point_in_polygon(&self.project(point), &self.polygon)
    }
}

fn ring_points(snapshot: &Snapshot, ring: &Ring) -> Vec<na::Point3<f64>> {
    let raw: Vec<na::Point3<f64>> = ring
        .atoms()
        .iter()
        .map(|&i| snapshot.atom(i).position)
        .collect();
    snapshot.cell().unwrap_path(&raw)
}

fn project_all(
    points: &[na::Point3<f64>],
    center: &na::Point3<f64>,
    u: &na::Vector3<f64>,
    v: &na::Vector3<f64>,
) -> Vec<na::Point2<f64>> {
    points
        .iter()
        .map(|p| {
            let d = p - center;
            na::Point2::new(u.dot(&d), v.dot(&d))
        })
        .collect()
}

/// Shoelace formula; positive for counter-clockwise outlines.
fn signed_area(polygon: &[na::Point2<f64>]) -> f64 {
    let n = polygon.len();
    (0..n)
        .map(|i| {
            let (p, q) = (polygon[i], polygon[(i + 1) % n]);
            p.x * q.y - q.x * p.y
        })
        .sum::<f64>()
        / 2.0
}

/// Even-odd rule: count edge crossings of a ray cast along +x.
pub fn point_in_polygon(point: &na::Point2<f64>, polygon: &[na::Point2<f64>]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y) {
            let x_cross = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn hexagon(radius: f64, z: f64) -> Vec<na::Point3<f64>> {
        (0..6)
            .map(|k| {
                let theta = k as f64 * PI / 3.0;
                na::Point3::new(radius * theta.cos(), radius * theta.sin(), z)
            })
            .collect()
    }

    #[test]
    fn flat_ring_normal_is_z() {
        let plane = FittedPlane::fit(&hexagon(2.0, 0.0), PLANARITY_TOLERANCE).unwrap();
        // Counter-clockwise in xy gives +z
        assert_relative_eq!(plane.normal, na::Vector3::z(), epsilon = 1e-9);
        assert_relative_eq!(plane.center, na::Point3::origin(), epsilon = 1e-9);
        assert_relative_eq!(plane.radius, 2.0, epsilon = 1e-9);
        assert_relative_eq!(
            plane.signed_distance(&na::Point3::new(3.0, -1.0, 1.5)),
            1.5,
            epsilon = 1e-9
        );
        assert!(signed_area(&plane.polygon) > 0.0);
    }

    #[test]
    fn reversed_ring_flips_normal() {
        let mut points = hexagon(2.0, 0.0);
        points.reverse();
        let plane = FittedPlane::fit(&points, PLANARITY_TOLERANCE).unwrap();
        assert_relative_eq!(plane.normal, -na::Vector3::z(), epsilon = 1e-9);
    }

    #[test]
    fn puckered_ring_still_fits() {
        // Chair-like pucker of +-0.25 Å
        let points: Vec<na::Point3<f64>> = hexagon(1.4, 0.0)
            .into_iter()
            .enumerate()
            .map(|(k, p)| p + na::Vector3::new(0.0, 0.0, if k % 2 == 0 { 0.25 } else { -0.25 }))
            .collect();
        let plane = FittedPlane::fit(&points, PLANARITY_TOLERANCE).unwrap();
        assert_relative_eq!(plane.normal.z.abs(), 1.0, epsilon = 1e-9);
        assert!(plane.contains_projected(&na::Point3::new(0.1, 0.1, 3.0)));
        assert!(!plane.contains_projected(&na::Point3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn ring_split_by_the_boundary() {
        use crate::pbc::Cell;
        use crate::system::Atom;

        let cell = Cell::rectangular(10.0, 10.0, 10.0).unwrap();
        let atoms = hexagon(2.0, 5.0)
            .into_iter()
            .enumerate()
            .map(|(k, p)| Atom::new(k, "C", 1, "RNG", "C", cell.wrap(&p)))
            .collect();
        let bonds: Vec<(usize, usize)> = (0..6).map(|k| (k, (k + 1) % 6)).collect();
        let snapshot = Snapshot::new(atoms, bonds, cell).unwrap();

        let plane = FittedPlane::fit_ring(&snapshot, &Ring::new((0..6).collect()), PLANARITY_TOLERANCE)
            .unwrap();
        assert_relative_eq!(plane.radius, 2.0, epsilon = 1e-9);
        assert_relative_eq!(plane.normal.z.abs(), 1.0, epsilon = 1e-9);
        // Centroid of the first atom's image, which sits at x = 2
        assert_relative_eq!(plane.center.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_rings_are_rejected() {
        let colinear = [
            na::Point3::new(0.0, 0.0, 0.0),
            na::Point3::new(1.0, 1.0, 1.0),
            na::Point3::new(2.0, 2.0, 2.0),
        ];
        assert_eq!(
            FittedPlane::fit(&colinear, PLANARITY_TOLERANCE).unwrap_err(),
            DegenerateRing::Colinear
        );

        let coincident = [na::Point3::new(1.0, 2.0, 3.0); 4];
        assert_eq!(
            FittedPlane::fit(&coincident, PLANARITY_TOLERANCE).unwrap_err(),
            DegenerateRing::Coincident
        );

        assert_eq!(
            FittedPlane::fit(&colinear[..2], PLANARITY_TOLERANCE).unwrap_err(),
            DegenerateRing::TooFewAtoms(2)
        );
    }

    #[test]
    fn polygon_membership() {
        let square = [
            na::Point2::new(0.0, 0.0),
            na::Point2::new(2.0, 0.0),
            na::Point2::new(2.0, 2.0),
            na::Point2::new(0.0, 2.0),
        ];
        assert!(point_in_polygon(&na::Point2::new(1.0, 1.0), &square));
        assert!(!point_in_polygon(&na::Point2::new(3.0, 1.0), &square));
        assert!(!point_in_polygon(&na::Point2::new(1.0, -0.5), &square));

        // Concave outline: the notch is outside
        let notched = [
            na::Point2::new(0.0, 0.0),
            na::Point2::new(4.0, 0.0),
            na::Point2::new(4.0, 4.0),
            na::Point2::new(2.0, 1.0),
            na::Point2::new(0.0, 4.0),
        ];
        assert!(!point_in_polygon(&na::Point2::new(2.0, 3.0), &notched));
        assert!(point_in_polygon(&na::Point2::new(1.0, 1.0), &notched));
    }
}
