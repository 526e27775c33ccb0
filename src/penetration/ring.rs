use super::{entities, incident_bonds, segment_near, CUTOFF_SLACK};
use crate::config::CheckConfig;
use crate::grid::PeriodicGrid;
use crate::plane::FittedPlane;
use crate::report::{PenetrationEvent, Target};
use crate::rings::Ring;
use crate::system::{Bond, Snapshot};
use rayon::prelude::*;
use tracing::{trace, warn};

/// A ring together with its fitted plane.
#[derive(Clone, Debug)]
pub struct RingPlane {
    pub ring: Ring,
    pub plane: FittedPlane,
}

/// Fit a plane to every ring. Degenerate rings are logged and left out; their
/// number is returned alongside the fitted rings.
pub fn fit_rings(snapshot: &Snapshot, rings: Vec<Ring>, tolerance: f64) -> (Vec<RingPlane>, usize) {
    let fitted: Vec<Result<RingPlane, Ring>> = rings
        .into_par_iter()
        .map(|ring| match FittedPlane::fit_ring(snapshot, &ring, tolerance) {
            Ok(plane) => Ok(RingPlane { ring, plane }),
            Err(e) => {
                warn!("Skipping ring {ring}: {e}");
                Err(ring)
            }
        })
        .collect();

    let degenerate = fitted.iter().filter(|r| r.is_err()).count();
    (fitted.into_iter().flatten().collect(), degenerate)
}

/// Bonds crossing a ring plane inside the ring outline.
pub fn find_ring_penetrations(
    snapshot: &Snapshot,
    grid: &PeriodicGrid,
    rings: &[RingPlane],
    config: &CheckConfig,
) -> Vec<PenetrationEvent> {
    let half_bond = snapshot.max_bond_length() / 2.0;
    rings
        .par_iter()
        .flat_map_iter(|rp| {
            let cutoff = rp.plane.radius + half_bond + CUTOFF_SLACK;
            let nearby = grid.within(&rp.plane.center, cutoff);
            candidate_bonds(snapshot, &rp.ring, &nearby, config)
                .into_iter()
                .filter_map(|bond| test_bond(snapshot, rp, &bond))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Bonds near the ring that belong neither to the ring nor to its substituents.
fn candidate_bonds(
    snapshot: &Snapshot,
    ring: &Ring,
    nearby: &[usize],
    config: &CheckConfig,
) -> Vec<Bond> {
    let mut excluded: Vec<usize> = ring
        .atoms()
        .iter()
        .flat_map(|&a| std::iter::once(a).chain(snapshot.neighbors(a).iter().copied()))
        .collect();
    excluded.sort_unstable();
    excluded.dedup();
    let is_excluded = |a: usize| excluded.binary_search(&a).is_ok();

    incident_bonds(snapshot, nearby)
        .into_iter()
        .filter(|b| !is_excluded(b.0) && !is_excluded(b.1))
        .filter(|b| config.is_intruder(snapshot, b))
        .collect()
}

fn test_bond(snapshot: &Snapshot, rp: &RingPlane, bond: &Bond) -> Option<PenetrationEvent> {
    let plane = &rp.plane;
    let (a, b) = segment_near(snapshot, &plane.center, bond);
    let da = plane.signed_distance(&a);
    let db = plane.signed_distance(&b);
    if da * db > 0.0 || (da == 0.0 && db == 0.0) {
        return None;
    }

    let t = da / (da - db);
    let crossing = a + (b - a) * t;
    if !plane.contains_projected(&crossing) {
        return None;
    }

    let first = snapshot.atom(rp.ring.atoms()[0]);
    let (from, to) = entities(snapshot, bond);
    trace!("Bond {}-{} crosses ring {}", bond.0, bond.1, rp.ring);
    Some(PenetrationEvent {
        bond: *bond,
        from,
        to,
        target: Target::Ring {
            atoms: rp.ring.atoms().to_vec(),
            resi: first.resi,
            resn: first.resn.clone(),
        },
        crossing,
        distance: (crossing - plane.center).norm(),
        buried_atom: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbc::Cell;
    use crate::rings::find_rings;
    use crate::system::Atom;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use std::f64::consts::PI;

    /// Hexagon of radius 2 at z = 0 (atoms 0-5, residue RNG) and a threading
    /// bond (atoms 6-7, residue LIG) from `a` to `b`.
    fn threaded(a: Point3<f64>, b: Point3<f64>) -> Snapshot {
        let mut atoms: Vec<Atom> = (0..6)
            .map(|k| {
                let theta = k as f64 * PI / 3.0;
                let p = Point3::new(10.0 + 2.0 * theta.cos(), 10.0 + 2.0 * theta.sin(), 10.0);
                Atom::new(k, &format!("C{k}"), 1, "RNG", "C", p)
            })
            .collect();
        atoms.push(Atom::new(6, "N1", 2, "LIG", "N", a));
        atoms.push(Atom::new(7, "N2", 2, "LIG", "N", b));
        let mut bonds: Vec<(usize, usize)> = (0..6).map(|k| (k, (k + 1) % 6)).collect();
        bonds.push((6, 7));
        Snapshot::new(atoms, bonds, Cell::rectangular(30.0, 30.0, 30.0).unwrap()).unwrap()
    }

    fn run(snapshot: &Snapshot) -> Vec<PenetrationEvent> {
        let config = CheckConfig::default();
        let rings = find_rings(snapshot, 3, 8);
        let (planes, degenerate) = fit_rings(snapshot, rings, config.planarity_tolerance);
        assert_eq!(degenerate, 0);
        let grid = PeriodicGrid::new(snapshot.cell(), snapshot.positions(), config.grid_spacing);
        find_ring_penetrations(snapshot, &grid, &planes, &config)
    }

    #[test]
    fn bond_through_center_is_flagged() {
        let snapshot = threaded(Point3::new(10.0, 10.0, 9.0), Point3::new(10.0, 10.0, 11.0));
        let events = run(&snapshot);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].bond, Bond(6, 7));
        assert_relative_eq!(events[0].crossing, Point3::new(10.0, 10.0, 10.0), epsilon = 1e-9);
        assert_relative_eq!(events[0].distance, 0.0, epsilon = 1e-9);
        assert!(matches!(&events[0].target, Target::Ring { resn, .. } if resn == "RNG"));
    }

    #[test]
    fn bond_beside_ring_is_ignored() {
        let snapshot = threaded(Point3::new(13.0, 10.0, 9.0), Point3::new(13.0, 10.0, 11.0));
        assert!(run(&snapshot).is_empty());

        // Parallel to the ring plane, above it
        let snapshot = threaded(Point3::new(9.0, 10.0, 10.5), Point3::new(11.0, 10.0, 10.5));
        assert!(run(&snapshot).is_empty());
    }

    #[test]
    fn endpoint_on_plane_counts() {
        let snapshot = threaded(Point3::new(10.5, 10.0, 10.0), Point3::new(10.5, 10.0, 11.4));
        let events = run(&snapshot);
        assert_eq!(events.len(), 1);
        assert_relative_eq!(events[0].distance, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn substituent_bonds_are_not_tested() {
        // A bond from a ring atom's neighbour folded back through the ring
        let mut atoms: Vec<Atom> = (0..6)
            .map(|k| {
                let theta = k as f64 * PI / 3.0;
                let p = Point3::new(2.0 * theta.cos(), 2.0 * theta.sin(), 0.0);
                Atom::new(k, "C", 1, "RNG", "C", p)
            })
            .collect();
        atoms.push(Atom::new(6, "O", 1, "RNG", "O", Point3::new(0.2, 0.0, -0.8)));
        atoms.push(Atom::new(7, "H", 1, "RNG", "H", Point3::new(0.2, 0.0, 0.8)));
        let mut bonds: Vec<(usize, usize)> = (0..6).map(|k| (k, (k + 1) % 6)).collect();
        bonds.extend([(0, 6), (6, 7)]);
        let snapshot =
            Snapshot::new(atoms, bonds, Cell::rectangular(30.0, 30.0, 30.0).unwrap()).unwrap();
        assert!(run(&snapshot).is_empty());
    }

    #[test]
    fn colinear_ring_is_degenerate() {
        let atoms: Vec<Atom> = (0..3)
            .map(|k| Atom::new(k, "C", 1, "LIN", "C", Point3::new(k as f64 * 1.5, 0.0, 0.0)))
            .collect();
        let snapshot = Snapshot::new(
            atoms,
            [(0, 1), (1, 2), (2, 0)],
            Cell::rectangular(30.0, 30.0, 30.0).unwrap(),
        )
        .unwrap();
        let rings = find_rings(&snapshot, 3, 8);
        assert_eq!(rings.len(), 1);
        let (planes, degenerate) = fit_rings(&snapshot, rings, 1e-6);
        assert!(planes.is_empty());
        assert_eq!(degenerate, 1);
    }
}
