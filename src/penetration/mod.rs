//! Segment tests of bonds against ring planes and closed surfaces.

pub mod ring;
pub mod surface;

use crate::report::AtomEntity;
use crate::system::{Bond, Snapshot};
use nalgebra::Point3;

/// Slack added to every candidate cutoff so that atoms exactly on it are kept
const CUTOFF_SLACK: f64 = 1e-6;

/// Sorted, unique bonds with at least one atom in `atoms`.
fn incident_bonds(snapshot: &Snapshot, atoms: &[usize]) -> Vec<Bond> {
    let mut bonds: Vec<Bond> = atoms
        .iter()
        .flat_map(|&a| snapshot.neighbors(a).iter().map(move |&b| Bond::new(a, b)))
        .collect();
    bonds.sort_unstable();
    bonds.dedup();
    bonds
}

/// Bond endpoints in the periodic image closest to `reference`, kept contiguous.
fn segment_near(
    snapshot: &Snapshot,
    reference: &Point3<f64>,
    bond: &Bond,
) -> (Point3<f64>, Point3<f64>) {
    let cell = snapshot.cell();
    let a = snapshot.atom(bond.0).position;
    let b = snapshot.atom(bond.1).position;
    let a_near = cell.image_near(reference, &a);
    let b_near = a_near + cell.displacement(&a, &b);
    (a_near, b_near)
}

fn entities(snapshot: &Snapshot, bond: &Bond) -> (AtomEntity, AtomEntity) {
    (
        AtomEntity::from(snapshot.atom(bond.0)),
        AtomEntity::from(snapshot.atom(bond.1)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbc::Cell;
    use crate::system::Atom;
    use approx::assert_relative_eq;

    #[test]
    fn segments_stay_whole_across_the_boundary() {
        let cell = Cell::rectangular(10.0, 10.0, 10.0).unwrap();
        let atoms = vec![
            Atom::new(0, "C1", 1, "LIG", "C", Point3::new(9.6, 5.0, 5.0)),
            Atom::new(1, "C2", 1, "LIG", "C", Point3::new(0.6, 5.0, 5.0)),
            Atom::new(2, "C3", 1, "LIG", "C", Point3::new(1.6, 5.0, 5.0)),
        ];
        let snapshot = Snapshot::new(atoms, [(0, 1), (1, 2)], cell).unwrap();

        let (a, b) = segment_near(&snapshot, &Point3::new(-0.2, 5.0, 5.0), &Bond(0, 1));
        assert_relative_eq!(a, Point3::new(-0.4, 5.0, 5.0), epsilon = 1e-12);
        assert_relative_eq!(b, Point3::new(0.6, 5.0, 5.0), epsilon = 1e-12);

        assert_eq!(incident_bonds(&snapshot, &[1, 2]), vec![Bond(0, 1), Bond(1, 2)]);
    }
}
