//! Closed triangulated surfaces around selected residue groups.

pub mod hull;

use crate::config::invalid;
use crate::error::{ConfigError, SurfaceError};
use crate::system::Snapshot;
use hull::{HullConfig, HullProgram};
use nalgebra::{Point3, Vector3};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Facets with a smaller area (Å²) carry no orientation and are dropped
const MIN_FACET_AREA: f64 = 1e-8;

/// Fixed, irrational-looking direction so that rays rarely graze edges or vertices
const RAY_DIRECTION: [f64; 3] = [1.0, 0.371_3, 0.129_1];

/// Residues whose atoms form one surface.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceGroup {
    /// Label used in logs and reports
    pub name: String,
    /// Residue names in the group
    pub residues: HashSet<String>,
}

impl SurfaceGroup {
    pub fn new<S: AsRef<str>>(residues: &[S]) -> Self {
        let names: Vec<String> = residues
            .iter()
            .map(|r| r.as_ref().trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        Self {
            name: names.join(","),
            residues: names.into_iter().collect(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SurfaceConfig {
    /// One surface is built per group
    pub groups: Vec<SurfaceGroup>,
    /// External hull program
    pub hull: HullConfig,
    /// Use hydrogens as surface points
    pub include_hydrogens: bool,
}

impl SurfaceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.groups.is_empty() {
            return Err(invalid("surface.groups", "no surface groups".to_string()));
        }
        if let Some(group) = self.groups.iter().find(|g| g.residues.is_empty()) {
            return Err(invalid(
                "surface.groups",
                format!("group '{}' selects no residues", group.name),
            ));
        }
        if self.hull.timeout.is_zero() {
            return Err(invalid("surface.hull.timeout", "must be positive".to_string()));
        }
        if self.hull.executable.as_os_str().is_empty() {
            return Err(invalid("surface.hull.executable", "empty path".to_string()));
        }
        Ok(())
    }
}

/// One triangle of a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceFacet {
    /// Indices into the surface's point list
    pub points: [usize; 3],
    /// Snapshot atom indices of the three corners
    pub atoms: [usize; 3],
}

#[derive(Clone, Debug)]
pub struct Surface {
    pub id: usize,
    pub name: String,
    /// Sorted snapshot indices of the surface atoms
    pub atoms: Vec<usize>,
    /// Atom positions made whole in one periodic image, parallel to `atoms`
    pub positions: Vec<Point3<f64>>,
    pub facets: Vec<SurfaceFacet>,
    /// Zero-area facets removed after triangulation
    pub dropped_facets: usize,
}

impl Surface {
    /// Triangulate a point cloud and keep the facets with a non-zero area.
    ///
    /// `atoms` may come in any order; repeated atoms are used once.
    pub fn from_atoms(
        id: usize,
        name: &str,
        snapshot: &Snapshot,
        mut atoms: Vec<usize>,
        hull: &dyn HullProgram,
    ) -> Result<Self, SurfaceError> {
        atoms.sort_unstable();
        atoms.dedup();
        if atoms.len() < 4 {
            return Err(SurfaceError::TooFewPoints {
                group: name.to_string(),
                count: atoms.len(),
            });
        }

        let positions = snapshot.unwrap_atoms(&atoms);
        let triangles = hull.triangulate(&positions)?;
        let n_triangles = triangles.len();

        let facets: Vec<SurfaceFacet> = triangles
            .into_iter()
            .filter(|t| triangle_area(&t.map(|i| positions[i])) > MIN_FACET_AREA)
            .map(|points| SurfaceFacet {
                points,
                atoms: points.map(|i| atoms[i]),
            })
            .collect();
        let dropped_facets = n_triangles - facets.len();
        if dropped_facets > 0 {
            warn!("Dropped {dropped_facets} zero-area facets from surface '{name}'");
        }
        debug!(
            "Surface '{name}': {} points, {} facets",
            atoms.len(),
            facets.len()
        );

        Ok(Self {
            id,
            name: name.to_string(),
            atoms,
            positions,
            facets,
            dropped_facets,
        })
    }

    pub fn contains_atom(&self, atom: usize) -> bool {
        self.atoms.binary_search(&atom).is_ok()
    }

    /// Corner positions of facet `i`.
    pub fn vertices(&self, facet: usize) -> [Point3<f64>; 3] {
        self.facets[facet].points.map(|p| self.positions[p])
    }

    pub fn facet_centroid(&self, facet: usize) -> Point3<f64> {
        let [a, b, c] = self.vertices(facet);
        Point3::from((a.coords + b.coords + c.coords) / 3.0)
    }

    /// Largest distance of a corner from the facet centroid.
    pub fn facet_radius(&self, facet: usize) -> f64 {
        let center = self.facet_centroid(facet);
        self.vertices(facet)
            .iter()
            .map(|v| (v - center).norm())
            .fold(0.0, f64::max)
    }

    /// Unit normal of facet `i`; its sign follows the corner order.
    pub fn facet_normal(&self, facet: usize) -> Vector3<f64> {
        let [a, b, c] = self.vertices(facet);
        (b - a).cross(&(c - a)).normalize()
    }

    /// Some point of the surface's periodic image, used to align other points with it.
    pub fn anchor(&self) -> Point3<f64> {
        self.positions.first().copied().unwrap_or_else(Point3::origin)
    }

    /// Ray-parity test: whether `point` lies inside the closed surface.
    ///
    /// `point` must already be in the surface's periodic image.
    pub fn encloses(&self, point: &Point3<f64>) -> bool {
        let direction = Vector3::from(RAY_DIRECTION).normalize();
        let crossings = (0..self.facets.len())
            .filter(|&f| {
                matches!(
                    intersect_triangle(point, &direction, &self.vertices(f)),
                    Some(hit) if hit.t > 0.0
                )
            })
            .count();
        crossings % 2 == 1
    }
}

/// A ray or segment hitting a triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleHit {
    /// Parameter along the direction vector
    pub t: f64,
    /// Barycentric coordinates of the hit
    pub u: f64,
    pub v: f64,
}

/// Möller–Trumbore intersection of `origin + t * direction` with a triangle.
///
/// Returns `None` when the line is parallel to the triangle plane or misses it.
pub fn intersect_triangle(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    [v0, v1, v2]: &[Point3<f64>; 3],
) -> Option<TriangleHit> {
    const EPS: f64 = 1e-12;
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let p = direction.cross(&e2);
    let det = e1.dot(&p);
    if det.abs() < EPS {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - v0;
    let u = s.dot(&p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(&e1);
    let v = direction.dot(&q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(&q) * inv_det;
    Some(TriangleHit { t, u, v })
}

fn triangle_area([a, b, c]: &[Point3<f64>; 3]) -> f64 {
    (b - a).cross(&(c - a)).norm() / 2.0
}

/// Build one surface per configured group.
pub fn build_surfaces(
    snapshot: &Snapshot,
    config: &SurfaceConfig,
    hull: &dyn HullProgram,
) -> Result<Vec<Surface>, SurfaceError> {
    config
        .groups
        .iter()
        .enumerate()
        .map(|(id, group)| {
            let atoms: Vec<usize> = snapshot
                .atoms()
                .iter()
                .filter(|a| group.residues.contains(&a.resn))
                .filter(|a| config.include_hydrogens || !a.is_hydrogen())
                .map(|a| a.index)
                .collect();
            Surface::from_atoms(id, &group.name, snapshot, atoms, hull)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pbc::Cell;
    use crate::system::Atom;
    use approx::assert_relative_eq;

    /// Triangles of the unit cube whose corner `i` sits at `(i & 1, i >> 1 & 1, i >> 2 & 1)`.
    pub(crate) const CUBE_TRIANGLES: [[usize; 3]; 12] = [
        [0, 2, 1],
        [1, 2, 3],
        [4, 5, 6],
        [5, 7, 6],
        [0, 1, 4],
        [1, 5, 4],
        [2, 6, 3],
        [3, 6, 7],
        [0, 4, 2],
        [2, 4, 6],
        [1, 3, 5],
        [3, 7, 5],
    ];

    /// Stands in for the external program and returns a fixed triangulation.
    pub(crate) struct FixedHull(pub Vec<[usize; 3]>);

    impl HullProgram for FixedHull {
        fn triangulate(&self, _points: &[Point3<f64>]) -> Result<Vec<[usize; 3]>, SurfaceError> {
            Ok(self.0.clone())
        }
    }

    pub(crate) fn cube_corner(i: usize) -> Point3<f64> {
        Point3::new((i & 1) as f64, (i >> 1 & 1) as f64, (i >> 2 & 1) as f64)
    }

    fn cube_snapshot(offset: Vector3<f64>, cell: Cell) -> Snapshot {
        let mut atoms: Vec<Atom> = (0..8)
            .map(|i| Atom::new(i, "C", 1, "CUB", "C", cell.wrap(&(cube_corner(i) + offset))))
            .collect();
        atoms.push(Atom::new(8, "H1", 1, "CUB", "H", Point3::new(0.5, 0.5, 0.5) + offset));
        Snapshot::new(atoms, [(0, 8)], cell).unwrap()
    }

    fn cube_config() -> SurfaceConfig {
        SurfaceConfig {
            groups: vec![SurfaceGroup::new(&["CUB"])],
            ..Default::default()
        }
    }

    #[test]
    fn cube_surface_is_whole_and_encloses_center() {
        // The cube straddles the periodic boundary at x = 0
        let cell = Cell::rectangular(10.0, 10.0, 10.0).unwrap();
        let snapshot = cube_snapshot(Vector3::new(-0.5, 3.0, 3.0), cell);
        let hull = FixedHull(CUBE_TRIANGLES.to_vec());

        let surfaces = build_surfaces(&snapshot, &cube_config(), &hull).unwrap();
        assert_eq!(surfaces.len(), 1);
        let surface = &surfaces[0];
        // Hydrogens are left out
        assert_eq!(surface.atoms, (0..8).collect::<Vec<_>>());
        assert_eq!(surface.facets.len(), 12);

        let anchor = surface.anchor();
        for (i, p) in surface.positions.iter().enumerate() {
            assert_relative_eq!(p - anchor, cube_corner(i) - cube_corner(0), epsilon = 1e-9);
        }
        let center = anchor + Vector3::new(0.5, 0.5, 0.5);
        assert!(surface.encloses(&center));
        assert!(!surface.encloses(&(center + Vector3::new(1.2, 0.0, 0.0))));
    }

    #[test]
    fn degenerate_facets_are_dropped() {
        let cell = Cell::rectangular(10.0, 10.0, 10.0).unwrap();
        let snapshot = cube_snapshot(Vector3::new(2.0, 2.0, 2.0), cell);
        let mut triangles = CUBE_TRIANGLES.to_vec();
        triangles.push([0, 0, 1]);
        triangles.push([0, 1, 1]);

        let surfaces = build_surfaces(&snapshot, &cube_config(), &FixedHull(triangles)).unwrap();
        assert_eq!(surfaces[0].facets.len(), 12);
        assert_eq!(surfaces[0].dropped_facets, 2);
    }

    #[test]
    fn atoms_are_sorted_and_unique() {
        let cell = Cell::rectangular(10.0, 10.0, 10.0).unwrap();
        let snapshot = cube_snapshot(Vector3::new(2.0, 2.0, 2.0), cell);
        let atoms = vec![7, 3, 5, 0, 3, 1, 6, 2, 4, 7];
        let surface =
            Surface::from_atoms(0, "CUB", &snapshot, atoms, &FixedHull(CUBE_TRIANGLES.to_vec()))
                .unwrap();

        assert_eq!(surface.atoms, (0..8).collect::<Vec<_>>());
        assert_eq!(surface.positions.len(), 8);
        assert!(surface.contains_atom(6));
        assert!(!surface.contains_atom(8));
        // Facet corners map back to the matching snapshot atoms
        assert_eq!(surface.facets[0].atoms, CUBE_TRIANGLES[0]);
    }

    #[test]
    fn too_few_points() {
        let cell = Cell::rectangular(10.0, 10.0, 10.0).unwrap();
        let snapshot = cube_snapshot(Vector3::new(2.0, 2.0, 2.0), cell);
        let config = SurfaceConfig {
            groups: vec![SurfaceGroup::new(&["XYZ"])],
            ..Default::default()
        };
        assert!(matches!(
            build_surfaces(&snapshot, &config, &FixedHull(Vec::new())),
            Err(SurfaceError::TooFewPoints { count: 0, .. })
        ));
    }

    #[test]
    fn moller_trumbore() {
        let triangle = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ];
        let hit = intersect_triangle(
            &Point3::new(0.5, 0.5, 1.0),
            &Vector3::new(0.0, 0.0, -2.0),
            &triangle,
        )
        .unwrap();
        assert_relative_eq!(hit.t, 0.5, epsilon = 1e-12);

        assert!(intersect_triangle(
            &Point3::new(1.5, 1.5, 1.0),
            &Vector3::new(0.0, 0.0, -1.0),
            &triangle
        )
        .is_none());
        // Parallel to the plane
        assert!(intersect_triangle(
            &Point3::new(0.5, 0.5, 1.0),
            &Vector3::new(1.0, 0.0, 0.0),
            &triangle
        )
        .is_none());
    }

    #[test]
    fn surface_config_validation() {
        assert!(cube_config().validate().is_ok());
        assert!(SurfaceConfig::default().validate().is_err());
        let blank = SurfaceConfig {
            groups: vec![SurfaceGroup::new(&[" "])],
            ..Default::default()
        };
        assert!(blank.validate().is_err());
    }
}
