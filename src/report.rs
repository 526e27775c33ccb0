use crate::system::{Atom, Bond};
use nalgebra::Point3;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fmt;

/// The atom identifiers carried into reports.
#[derive(Debug, Hash, PartialEq, Eq, Clone, PartialOrd, Ord)]
pub struct AtomEntity {
    pub resi: isize,
    pub resn: String,
    pub atomn: String,
    pub atomi: usize,
}

impl From<&Atom> for AtomEntity {
    fn from(atom: &Atom) -> Self {
        Self {
            resi: atom.resi,
            resn: atom.resn.clone(),
            atomn: atom.name.clone(),
            atomi: atom.index,
        }
    }
}

impl fmt::Display for AtomEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Residue {resn} {resi}, Atom {atomn} {atomi}",
            resn = self.resn,
            resi = self.resi,
            atomn = self.atomn,
            atomi = self.atomi
        )
    }
}

/// What a bond was found to pass through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Ring {
        /// Canonical ring atom sequence
        atoms: Vec<usize>,
        /// Residue of the first ring atom
        resi: isize,
        resn: String,
    },
    Facet {
        surface: usize,
        facet: usize,
        /// Atoms at the facet corners
        atoms: [usize; 3],
    },
}

impl Target {
    pub fn kind(&self) -> &'static str {
        match self {
            Target::Ring { .. } => "ring",
            Target::Facet { .. } => "surface",
        }
    }

    fn label(&self) -> String {
        match self {
            Target::Ring { atoms, .. } => atoms
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join("-"),
            Target::Facet { atoms, .. } => atoms.map(|a| a.to_string()).join("-"),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Ring { resi, resn, .. } => {
                write!(f, "ring {} of {resn} {resi}", self.label())
            }
            Target::Facet {
                surface, facet, ..
            } => write!(f, "facet {facet} ({}) of surface {surface}", self.label()),
        }
    }
}

/// One bond passing through a ring or a surface.
#[derive(Debug, Clone, PartialEq)]
pub struct PenetrationEvent {
    pub bond: Bond,
    pub from: AtomEntity,
    pub to: AtomEntity,
    pub target: Target,
    /// Where the bond meets the ring plane or facet
    pub crossing: Point3<f64>,
    /// Ring events: distance from the crossing to the ring centroid.
    /// Surface events: depth of the buried atom below the crossed facet, 0 if none.
    pub distance: f64,
    /// Surface events: the bond atom enclosed by the surface, if any
    pub buried_atom: Option<AtomEntity>,
}

impl fmt::Display for PenetrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bond [{from}] - [{to}] passes through {target} at ({x:.3}, {y:.3}, {z:.3}), distance {d:.3} Å",
            from = self.from,
            to = self.to,
            target = self.target,
            x = self.crossing.x,
            y = self.crossing.y,
            z = self.crossing.z,
            d = self.distance
        )?;
        if let Some(buried) = &self.buried_atom {
            write!(f, ", buried atom [{buried}]")?;
        }
        Ok(())
    }
}

/// Outcome of one detection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassStatus {
    Completed,
    /// Not requested
    Skipped,
    Failed(String),
}

impl fmt::Display for PassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassStatus::Completed => write!(f, "completed"),
            PassStatus::Skipped => write!(f, "skipped"),
            PassStatus::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Overall verdict of a check, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Clean,
    PenetrationsFound,
    /// No penetrations found, but a requested pass did not finish
    Incomplete,
}

impl RunStatus {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Clean => 0,
            RunStatus::PenetrationsFound => 1,
            RunStatus::Incomplete => 3,
        }
    }
}

/// Counts gathered along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub atoms: usize,
    pub bonds: usize,
    pub rings: usize,
    pub degenerate_rings: usize,
    pub surfaces: usize,
    pub facets: usize,
    pub dropped_facets: usize,
    pub ring_penetrations: usize,
    pub surface_penetrations: usize,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub events: Vec<PenetrationEvent>,
    pub ring_pass: PassStatus,
    pub surface_pass: PassStatus,
    pub summary: Summary,
}

impl Report {
    pub fn status(&self) -> RunStatus {
        if !self.events.is_empty() {
            RunStatus::PenetrationsFound
        } else if matches!(self.ring_pass, PassStatus::Failed(_))
            || matches!(self.surface_pass, PassStatus::Failed(_))
        {
            RunStatus::Incomplete
        } else {
            RunStatus::Clean
        }
    }

    /// Counts and pass outcomes on one line.
    pub fn summary_line(&self) -> String {
        let s = &self.summary;
        format!(
            "{} ring and {} surface penetrations; {} rings ({} degenerate), {} surfaces ({} facets, {} dropped); ring pass {}, surface pass {}",
            s.ring_penetrations,
            s.surface_penetrations,
            s.rings,
            s.degenerate_rings,
            s.surfaces,
            s.facets,
            s.dropped_facets,
            self.ring_pass,
            self.surface_pass
        )
    }

    /// One row per event.
    pub fn to_df(&self) -> PolarsResult<DataFrame> {
        let ev = &self.events;
        df!(
            "kind" => ev.iter().map(|e| e.target.kind().to_string()).collect::<Vec<String>>(),
            "distance" => ev.iter().map(|e| e.distance as f32).collect::<Vec<f32>>(),
            "from_resn" => ev.iter().map(|e| e.from.resn.to_owned()).collect::<Vec<String>>(),
            "from_resi" => ev.iter().map(|e| e.from.resi as i32).collect::<Vec<i32>>(),
            "from_atomn" => ev.iter().map(|e| e.from.atomn.to_owned()).collect::<Vec<String>>(),
            "from_atomi" => ev.iter().map(|e| e.from.atomi as i32).collect::<Vec<i32>>(),
            "to_resn" => ev.iter().map(|e| e.to.resn.to_owned()).collect::<Vec<String>>(),
            "to_resi" => ev.iter().map(|e| e.to.resi as i32).collect::<Vec<i32>>(),
            "to_atomn" => ev.iter().map(|e| e.to.atomn.to_owned()).collect::<Vec<String>>(),
            "to_atomi" => ev.iter().map(|e| e.to.atomi as i32).collect::<Vec<i32>>(),
            "target" => ev.iter().map(|e| e.target.label()).collect::<Vec<String>>(),
            "target_resn" => ev.iter().map(|e| match &e.target {
                Target::Ring { resn, .. } => Some(resn.to_owned()),
                Target::Facet { .. } => None,
            }).collect::<Vec<Option<String>>>(),
            "target_resi" => ev.iter().map(|e| match &e.target {
                Target::Ring { resi, .. } => Some(*resi as i32),
                Target::Facet { .. } => None,
            }).collect::<Vec<Option<i32>>>(),
            "surface" => ev.iter().map(|e| match &e.target {
                Target::Facet { surface, .. } => Some(*surface as u32),
                Target::Ring { .. } => None,
            }).collect::<Vec<Option<u32>>>(),
            "crossing_x" => ev.iter().map(|e| e.crossing.x as f32).collect::<Vec<f32>>(),
            "crossing_y" => ev.iter().map(|e| e.crossing.y as f32).collect::<Vec<f32>>(),
            "crossing_z" => ev.iter().map(|e| e.crossing.z as f32).collect::<Vec<f32>>(),
            "buried_atomn" => ev.iter().map(|e| e.buried_atom.as_ref().map(|b| b.atomn.to_owned())).collect::<Vec<Option<String>>>(),
            "buried_atomi" => ev.iter().map(|e| e.buried_atom.as_ref().map(|b| b.atomi as i32)).collect::<Vec<Option<i32>>>(),
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in &self.events {
            writeln!(f, "{event}")?;
        }
        write!(f, "{}", self.summary_line())
    }
}

/// Merges the events of both passes into a deterministic report.
#[derive(Debug, Default)]
pub struct Reporter {
    events: Vec<PenetrationEvent>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = PenetrationEvent>) {
        self.events.extend(events);
    }

    pub fn finish(
        self,
        ring_pass: PassStatus,
        surface_pass: PassStatus,
        mut summary: Summary,
    ) -> Report {
        let mut events = resolve_ring_ownership(self.events);
        events.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        events.dedup_by(|a, b| a.bond == b.bond && a.target == b.target);

        summary.ring_penetrations = events
            .iter()
            .filter(|e| matches!(e.target, Target::Ring { .. }))
            .count();
        summary.surface_penetrations = events.len() - summary.ring_penetrations;

        Report {
            events,
            ring_pass,
            surface_pass,
            summary,
        }
    }
}

fn sort_key(event: &PenetrationEvent) -> (isize, usize, usize, &Target) {
    (
        event.from.resi,
        event.from.atomi,
        event.to.atomi,
        &event.target,
    )
}

/// A bond passing through fused rings is reported once per group of rings
/// sharing atoms: the smallest ring wins, then the smallest atom sequence.
fn resolve_ring_ownership(events: Vec<PenetrationEvent>) -> Vec<PenetrationEvent> {
    let mut by_bond: BTreeMap<Bond, Vec<PenetrationEvent>> = BTreeMap::new();
    let mut kept = Vec::with_capacity(events.len());
    for event in events {
        match event.target {
            Target::Ring { .. } => by_bond.entry(event.bond).or_default().push(event),
            Target::Facet { .. } => kept.push(event),
        }
    }

    for (_, mut ring_events) in by_bond {
        ring_events.sort_by(|a, b| ring_rank(a).cmp(&ring_rank(b)));
        let mut owners: Vec<&[usize]> = Vec::new();
        let mut accepted = Vec::new();
        for event in &ring_events {
            let atoms = ring_atoms(event);
            if owners
                .iter()
                .all(|owner| !owner.iter().any(|a| atoms.contains(a)))
            {
                owners.push(atoms);
                accepted.push(event.clone());
            }
        }
        kept.extend(accepted);
    }
    kept
}

fn ring_atoms(event: &PenetrationEvent) -> &[usize] {
    match &event.target {
        Target::Ring { atoms, .. } => atoms.as_slice(),
        Target::Facet { .. } => &[],
    }
}

fn ring_rank(event: &PenetrationEvent) -> (usize, &[usize]) {
    let atoms = ring_atoms(event);
    (atoms.len(), atoms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(atomi: usize, resi: isize) -> AtomEntity {
        AtomEntity {
            resi,
            resn: "LIG".to_string(),
            atomn: format!("C{atomi}"),
            atomi,
        }
    }

    fn ring_event(bond: (usize, usize), ring: &[usize]) -> PenetrationEvent {
        PenetrationEvent {
            bond: Bond::new(bond.0, bond.1),
            from: entity(bond.0, 2),
            to: entity(bond.1, 2),
            target: Target::Ring {
                atoms: ring.to_vec(),
                resi: 1,
                resn: "CHL".to_string(),
            },
            crossing: Point3::origin(),
            distance: 0.1,
            buried_atom: None,
        }
    }

    fn facet_event(bond: (usize, usize), resi: isize) -> PenetrationEvent {
        PenetrationEvent {
            bond: Bond::new(bond.0, bond.1),
            from: entity(bond.0, resi),
            to: entity(bond.1, resi),
            target: Target::Facet {
                surface: 0,
                facet: 3,
                atoms: [0, 1, 2],
            },
            crossing: Point3::new(1.0, 2.0, 3.0),
            distance: 0.0,
            buried_atom: Some(entity(bond.1, resi)),
        }
    }

    #[test]
    fn fused_rings_keep_the_smallest() {
        let mut reporter = Reporter::new();
        reporter.extend([
            ring_event((20, 21), &[0, 1, 2, 3, 4, 5, 6]),
            ring_event((20, 21), &[4, 5, 22, 23, 24, 25, 26]),
            ring_event((20, 21), &[0, 1, 2, 3, 4, 5]),
            // Same size as the winner, loses on atom order
            ring_event((20, 21), &[0, 5, 30, 31, 32, 33]),
            // Separate ring, shares nothing with the winner
            ring_event((20, 21), &[10, 11, 12, 13, 14, 15]),
        ]);
        let report = reporter.finish(PassStatus::Completed, PassStatus::Skipped, Summary::default());

        let rings: Vec<Vec<usize>> = report
            .events
            .iter()
            .map(|e| ring_atoms(e).to_vec())
            .collect();
        assert_eq!(
            rings,
            vec![vec![0, 1, 2, 3, 4, 5], vec![10, 11, 12, 13, 14, 15]]
        );
        assert_eq!(report.summary.ring_penetrations, 2);
    }

    #[test]
    fn events_are_sorted_and_deduplicated() {
        let mut reporter = Reporter::new();
        reporter.extend([facet_event((30, 31), 5), ring_event((20, 21), &[0, 1, 2])]);
        reporter.extend([facet_event((30, 31), 5), facet_event((8, 9), 5)]);
        let report = reporter.finish(PassStatus::Completed, PassStatus::Completed, Summary::default());

        let bonds: Vec<Bond> = report.events.iter().map(|e| e.bond).collect();
        assert_eq!(bonds, vec![Bond(20, 21), Bond(8, 9), Bond(30, 31)]);
        assert_eq!(report.summary.surface_penetrations, 2);
        assert_eq!(report.status(), RunStatus::PenetrationsFound);
    }

    #[test]
    fn run_status() {
        let report = Reporter::new().finish(
            PassStatus::Completed,
            PassStatus::Skipped,
            Summary::default(),
        );
        assert_eq!(report.status(), RunStatus::Clean);
        assert_eq!(report.status().exit_code(), 0);

        let report = Reporter::new().finish(
            PassStatus::Completed,
            PassStatus::Failed("qconvex missing".to_string()),
            Summary::default(),
        );
        assert_eq!(report.status(), RunStatus::Incomplete);
        assert_eq!(report.status().exit_code(), 3);

        let mut reporter = Reporter::new();
        reporter.extend([ring_event((1, 2), &[3, 4, 5])]);
        let report = reporter.finish(
            PassStatus::Completed,
            PassStatus::Failed("timeout".to_string()),
            Summary::default(),
        );
        assert_eq!(report.status(), RunStatus::PenetrationsFound);
    }

    #[test]
    fn dataframe_columns() {
        let mut reporter = Reporter::new();
        reporter.extend([ring_event((20, 21), &[0, 1, 2]), facet_event((30, 31), 5)]);
        let report = reporter.finish(PassStatus::Completed, PassStatus::Completed, Summary::default());

        let df = report.to_df().unwrap();
        assert_eq!(df.height(), 2);
        let kinds: Vec<Option<&str>> = df.column("kind").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(kinds, vec![Some("ring"), Some("surface")]);
        assert_eq!(df.column("target_resn").unwrap().null_count(), 1);
        assert_eq!(df.column("buried_atomi").unwrap().null_count(), 1);
        assert!(report.to_string().contains("1 ring and 1 surface penetrations"));
    }
}
