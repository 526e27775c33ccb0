use super::{entities, incident_bonds, segment_near, CUTOFF_SLACK};
use crate::config::CheckConfig;
use crate::grid::PeriodicGrid;
use crate::report::{AtomEntity, PenetrationEvent, Target};
use crate::surface::{intersect_triangle, Surface};
use crate::system::{Bond, Snapshot};
use nalgebra::Point3;
use rayon::prelude::*;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Facet centroid stored in the R-tree.
#[derive(Clone, Copy, Debug)]
struct FacetPoint {
    center: [f64; 3],
    facet: usize,
}

impl RTreeObject for FacetPoint {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.center)
    }
}

impl PointDistance for FacetPoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        (0..3).map(|i| (self.center[i] - point[i]).powi(2)).sum()
    }
}

/// Bonds of other molecules crossing each surface.
///
/// Every bond is reported at most once per surface, at the first facet it
/// crosses when walking from its first to its second atom.
pub fn find_surface_penetrations(
    snapshot: &Snapshot,
    grid: &PeriodicGrid,
    surfaces: &[Surface],
    config: &CheckConfig,
) -> Vec<PenetrationEvent> {
    surfaces
        .iter()
        .flat_map(|surface| surface_events(snapshot, grid, surface, config))
        .collect()
}

fn surface_events(
    snapshot: &Snapshot,
    grid: &PeriodicGrid,
    surface: &Surface,
    config: &CheckConfig,
) -> Vec<PenetrationEvent> {
    if surface.facets.is_empty() {
        return Vec::new();
    }
    let half_bond = snapshot.max_bond_length() / 2.0;

    // Each candidate bond remembers the first facet that nominated it
    let mut candidates: BTreeMap<Bond, usize> = BTreeMap::new();
    for facet in 0..surface.facets.len() {
        let cutoff = surface.facet_radius(facet) + half_bond + CUTOFF_SLACK;
        let nearby = grid.within(&surface.facet_centroid(facet), cutoff);
        for bond in incident_bonds(snapshot, &nearby) {
            if surface.contains_atom(bond.0) || surface.contains_atom(bond.1) {
                continue;
            }
            if config.is_intruder(snapshot, &bond) {
                candidates.entry(bond).or_insert(facet);
            }
        }
    }
    debug!(
        "Surface '{}': {} candidate bonds",
        surface.name,
        candidates.len()
    );

    let tree = RTree::bulk_load(
        (0..surface.facets.len())
            .map(|facet| FacetPoint {
                center: surface.facet_centroid(facet).coords.into(),
                facet,
            })
            .collect(),
    );
    let max_facet_radius = (0..surface.facets.len())
        .map(|f| surface.facet_radius(f))
        .fold(0.0, f64::max);

    let candidates: Vec<(Bond, usize)> = candidates.into_iter().collect();
    candidates
        .par_iter()
        .filter_map(|(bond, anchor)| {
            let (a, b) = segment_near(snapshot, &surface.facet_centroid(*anchor), bond);
            let (facet, t) = first_crossing(surface, &tree, max_facet_radius, &a, &b)?;
            let crossing = a + (b - a) * t;

            let (buried_atom, distance) = if surface.encloses(&a) {
                (Some(bond.0), depth(surface, facet, &a))
            } else if surface.encloses(&b) {
                (Some(bond.1), depth(surface, facet, &b))
            } else {
                (None, 0.0)
            };

            let (from, to) = entities(snapshot, bond);
            trace!("Bond {}-{} crosses facet {facet} of '{}'", bond.0, bond.1, surface.name);
            Some(PenetrationEvent {
                bond: *bond,
                from,
                to,
                target: Target::Facet {
                    surface: surface.id,
                    facet,
                    atoms: surface.facets[facet].atoms,
                },
                crossing,
                distance,
                buried_atom: buried_atom.map(|i| AtomEntity::from(snapshot.atom(i))),
            })
        })
        .collect()
}

/// The crossed facet with the smallest segment parameter, ties going to the lower index.
fn first_crossing(
    surface: &Surface,
    tree: &RTree<FacetPoint>,
    max_facet_radius: f64,
    a: &Point3<f64>,
    b: &Point3<f64>,
) -> Option<(usize, f64)> {
    let direction = b - a;
    let mid = a + direction / 2.0;
    let reach = max_facet_radius + direction.norm() / 2.0 + CUTOFF_SLACK;

    tree.locate_within_distance(mid.coords.into(), reach * reach)
        .filter_map(|fp| {
            let hit = intersect_triangle(a, &direction, &surface.vertices(fp.facet))?;
            (0.0..=1.0).contains(&hit.t).then_some((fp.facet, hit.t))
        })
        .min_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)))
}

/// Distance of a buried point below the plane of a facet.
fn depth(surface: &Surface, facet: usize, point: &Point3<f64>) -> f64 {
    let [v0, _, _] = surface.vertices(facet);
    surface.facet_normal(facet).dot(&(point - v0)).abs()
}
