//! Ring perception on the bond graph.
//!
//! Only the smallest cycles through each atom are kept, which yields the
//! individual rings of fused systems (sterols, indoles) instead of their
//! envelopes, and never enumerates every cycle of large topologies.

use crate::system::Snapshot;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

/// A closed cycle of bonded atoms, in bonded order.
///
/// The sequence is canonical: it starts at the smallest atom index and
/// continues towards the smaller of that atom's two ring neighbours.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ring {
    atoms: Vec<usize>,
}

impl Ring {
    /// Build a ring from atoms in bonded order, in any rotation or direction.
    pub fn new(atoms: Vec<usize>) -> Self {
        Self {
            atoms: canonicalize(atoms),
        }
    }

    pub fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn contains(&self, atom: usize) -> bool {
        self.atoms.contains(&atom)
    }

    /// True if the two rings have at least one atom in common.
    pub fn shares_atoms(&self, other: &Ring) -> bool {
        self.atoms.iter().any(|a| other.contains(*a))
    }
}

impl fmt::Display for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.atoms.iter().map(|a| a.to_string()).collect();
        write!(f, "{}", labels.join("-"))
    }
}

fn canonicalize(mut atoms: Vec<usize>) -> Vec<usize> {
    let Some(start) = atoms
        .iter()
        .enumerate()
        .min_by_key(|(_, a)| **a)
        .map(|(i, _)| i)
    else {
        return atoms;
    };
    atoms.rotate_left(start);
    if atoms.len() > 2 && atoms[1] > atoms[atoms.len() - 1] {
        atoms[1..].reverse();
    }
    atoms
}

/// Find the smallest rings through every atom, with sizes in `min_size..=max_size`.
///
/// Atoms that cannot be part of a cycle (chain ends, hydrogens, waters) are
/// pruned before the search. Systems without rings give an empty list.
pub fn find_rings(snapshot: &Snapshot, min_size: usize, max_size: usize) -> Vec<Ring> {
    let min_size = min_size.max(3);
    if max_size < min_size {
        return Vec::new();
    }

    let active = prune_acyclic(snapshot);
    let candidates: Vec<usize> = (0..active.len()).filter(|&i| active[i]).collect();

    let rings: BTreeSet<Ring> = candidates
        .par_iter()
        .flat_map_iter(|&start| {
            smallest_cycles_through(snapshot, &active, start, min_size, max_size)
                .into_iter()
                .map(Ring::new)
        })
        .collect();

    rings.into_iter().collect()
}

/// Repeatedly remove atoms with at most one remaining bond.
fn prune_acyclic(snapshot: &Snapshot) -> Vec<bool> {
    let n_atoms = snapshot.atoms().len();
    let mut active = vec![true; n_atoms];
    let mut degree: Vec<usize> = (0..n_atoms)
        .map(|i| snapshot.neighbors(i).len())
        .collect();
    let mut queue: VecDeque<usize> = (0..n_atoms).filter(|&i| degree[i] <= 1).collect();

    while let Some(atom) = queue.pop_front() {
        if !active[atom] {
            continue;
        }
        active[atom] = false;
        for &next in snapshot.neighbors(atom) {
            if active[next] {
                degree[next] -= 1;
                if degree[next] == 1 {
                    queue.push_back(next);
                }
            }
        }
    }
    active
}

/// Iterative deepening: the first cycle length with any closed path wins.
fn smallest_cycles_through(
    snapshot: &Snapshot,
    active: &[bool],
    start: usize,
    min_size: usize,
    max_size: usize,
) -> Vec<Vec<usize>> {
    let dist = bounded_distances(snapshot, active, start, max_size / 2 + 1);

    for size in min_size..=max_size {
        let mut found = Vec::new();
        let mut path = vec![start];
        extend_path(snapshot, active, &dist, size, &mut path, &mut found);
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
}

fn extend_path(
    snapshot: &Snapshot,
    active: &[bool],
    dist: &HashMap<usize, usize>,
    size: usize,
    path: &mut Vec<usize>,
    found: &mut Vec<Vec<usize>>,
) {
    let start = path[0];
    let Some(&current) = path.last() else {
        return;
    };

    if path.len() == size {
        if snapshot.are_bonded(current, start) {
            found.push(path.clone());
        }
        return;
    }

    let remaining = size - path.len();
    for &next in snapshot.neighbors(current) {
        if !active[next] || next == start || path.contains(&next) {
            continue;
        }
        // The closing path back to `start` must still fit
        match dist.get(&next) {
            Some(&d) if d <= remaining => {}
            _ => continue,
        }
        path.push(next);
        extend_path(snapshot, active, dist, size, path, found);
        path.pop();
    }
}

/// Breadth-first bond distances from `start`, up to `limit` bonds.
fn bounded_distances(
    snapshot: &Snapshot,
    active: &[bool],
    start: usize,
    limit: usize,
) -> HashMap<usize, usize> {
    let mut dist = HashMap::from([(start, 0)]);
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        let d = dist[&current];
        if d == limit {
            continue;
        }
        for &next in snapshot.neighbors(current) {
            if active[next] && !dist.contains_key(&next) {
                dist.insert(next, d + 1);
                queue.push_back(next);
            }
        }
    }
    dist
}
