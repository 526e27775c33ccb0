use crate::error::ConfigError;
use crate::pbc::Cell;
use nalgebra::Point3;
use std::collections::VecDeque;
use std::fmt;

/// An atom of the loaded system.
#[derive(Clone, Debug, PartialEq)]
pub struct Atom {
    /// Position of the atom in the snapshot
    pub index: usize,
    /// Atom name
    pub name: String,
    /// Residue index
    pub resi: isize,
    /// Residue name
    pub resn: String,
    /// Element symbol, empty if unknown
    pub element: String,
    /// Cartesian coordinates in Å
    pub position: Point3<f64>,
    /// Connected component of the bond graph the atom belongs to
    pub fragment: usize,
}

impl Atom {
    pub fn new(
        index: usize,
        name: &str,
        resi: isize,
        resn: &str,
        element: &str,
        position: Point3<f64>,
    ) -> Self {
        Self {
            index,
            name: name.to_string(),
            resi,
            resn: resn.to_string(),
            element: element.to_string(),
            position,
            fragment: 0,
        }
    }

    pub fn is_hydrogen(&self) -> bool {
        self.element.eq_ignore_ascii_case("H")
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{resn} {resi} {name} (#{index})",
            resn = self.resn,
            resi = self.resi,
            name = self.name,
            index = self.index
        )
    }
}

/// An undirected covalent bond, stored with the smaller atom index first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bond(pub usize, pub usize);

impl Bond {
    pub fn new(a: usize, b: usize) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn contains(&self, atom: usize) -> bool {
        self.0 == atom || self.1 == atom
    }
}

/// Immutable view of one assembled system: atoms, bonds and the periodic cell.
#[derive(Clone, Debug)]
pub struct Snapshot {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    cell: Cell,
    neighbors: Vec<Vec<usize>>,
    n_fragments: usize,
    max_bond_length: f64,
}

impl Snapshot {
    /// Validate the input and derive adjacency lists and fragment ids.
    ///
    /// Atom `i` must carry `index == i`. Duplicate bonds are merged and the
    /// order of the bond list does not matter.
    pub fn new(
        mut atoms: Vec<Atom>,
        bonds: impl IntoIterator<Item = (usize, usize)>,
        cell: Cell,
    ) -> Result<Self, ConfigError> {
        for (position, atom) in atoms.iter().enumerate() {
            if atom.index != position {
                return Err(ConfigError::AtomIndexMismatch {
                    position,
                    index: atom.index,
                });
            }
            if atom.position.iter().any(|x| !x.is_finite()) {
                return Err(ConfigError::NonFiniteCoordinate { atom: position });
            }
        }

        let n_atoms = atoms.len();
        let mut bond_list: Vec<Bond> = Vec::new();
        for (a, b) in bonds {
            if a >= n_atoms || b >= n_atoms {
                return Err(ConfigError::BondOutOfRange { a, b, n_atoms });
            }
            if a == b {
                return Err(ConfigError::SelfBond(a));
            }
            bond_list.push(Bond::new(a, b));
        }
        bond_list.sort_unstable();
        bond_list.dedup();

        let mut neighbors = vec![Vec::new(); n_atoms];
        for bond in &bond_list {
            neighbors[bond.0].push(bond.1);
            neighbors[bond.1].push(bond.0);
        }
        neighbors.iter_mut().for_each(|n| n.sort_unstable());

        let n_fragments = assign_fragments(&mut atoms, &neighbors);
        let max_bond_length = bond_list
            .iter()
            .map(|b| cell.distance(&atoms[b.0].position, &atoms[b.1].position))
            .fold(0.0, f64::max);

        Ok(Self {
            atoms,
            bonds: bond_list,
            cell,
            neighbors,
            n_fragments,
            max_bond_length,
        })
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> &Atom {
        &self.atoms[index]
    }

    /// Sorted, unique bonds.
    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    /// Sorted indices of the atoms bonded to `atom`.
    pub fn neighbors(&self, atom: usize) -> &[usize] {
        &self.neighbors[atom]
    }

    pub fn are_bonded(&self, a: usize, b: usize) -> bool {
        self.neighbors[a].binary_search(&b).is_ok()
    }

    pub fn fragment_count(&self) -> usize {
        self.n_fragments
    }

    /// Longest minimum-image bond length, 0 if there are no bonds.
    pub fn max_bond_length(&self) -> f64 {
        self.max_bond_length
    }

    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    /// Positions of a set of atoms made whole across periodic boundaries.
    ///
    /// Atoms are visited breadth-first along bonds inside the set; each atom is
    /// placed at the image closest to the atom it was reached from. Pieces that
    /// are not connected inside the set are anchored at the image closest to
    /// the first atom of the set.
    pub fn unwrap_atoms(&self, members: &[usize]) -> Vec<Point3<f64>> {
        let local: std::collections::HashMap<usize, usize> = members
            .iter()
            .enumerate()
            .map(|(i, &atom)| (atom, i))
            .collect();
        let mut placed: Vec<Option<Point3<f64>>> = vec![None; members.len()];
        let anchor = match members.first() {
            Some(&first) => self.atoms[first].position,
            None => return Vec::new(),
        };

        for start in 0..members.len() {
            if placed[start].is_some() {
                continue;
            }
            let start_pos = self
                .cell
                .image_near(&anchor, &self.atoms[members[start]].position);
            placed[start] = Some(start_pos);

            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                let Some(current_pos) = placed[current] else {
                    continue;
                };
                for neighbor in &self.neighbors[members[current]] {
                    if let Some(&j) = local.get(neighbor) {
                        if placed[j].is_none() {
                            placed[j] = Some(
                                self.cell
                                    .image_near(&current_pos, &self.atoms[*neighbor].position),
                            );
                            queue.push_back(j);
                        }
                    }
                }
            }
        }

        placed.into_iter().flatten().collect()
    }
}

/// Label connected components of the bond graph in order of their lowest atom.
fn assign_fragments(atoms: &mut [Atom], neighbors: &[Vec<usize>]) -> usize {
    let mut fragment: Vec<Option<usize>> = vec![None; atoms.len()];
    let mut n_fragments = 0;

    for start in 0..atoms.len() {
        if fragment[start].is_some() {
            continue;
        }
        fragment[start] = Some(n_fragments);
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            for &next in &neighbors[current] {
                if fragment[next].is_none() {
                    fragment[next] = Some(n_fragments);
                    stack.push(next);
                }
            }
        }
        n_fragments += 1;
    }

    for (atom, frag) in atoms.iter_mut().zip(fragment) {
        atom.fragment = frag.unwrap_or_default();
    }
    n_fragments
}
