//! Penetration check settings.

use crate::error::ConfigError;
use crate::plane::PLANARITY_TOLERANCE;
use crate::surface::SurfaceConfig;
use crate::system::{Bond, Snapshot};
use std::collections::HashSet;

/// Three-membered rings are the smallest a bond can thread
pub const MIN_RING_SIZE: usize = 3;
/// Covers sterols, sugars and aromatic side chains
pub const MAX_RING_SIZE: usize = 8;
/// Bin thickness of the neighbour grid in Å
pub const GRID_SPACING: f64 = 5.0;
/// Thinner bins only add empty cells
pub const MIN_GRID_SPACING: f64 = 0.5;

#[derive(Clone, Debug)]
pub struct CheckConfig {
    /// Smallest ring size searched
    pub min_ring_size: usize,
    /// Largest ring size searched
    pub max_ring_size: usize,
    /// Middle-to-largest eigenvalue ratio below which a ring is colinear
    pub planarity_tolerance: f64,
    /// Neighbour grid bin thickness in Å
    pub grid_spacing: f64,
    /// Only test bonds with at least one atom in these residues
    pub intruder_residues: Option<HashSet<String>>,
    /// Surface construction, `None` skips the surface pass
    pub surface: Option<SurfaceConfig>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            min_ring_size: MIN_RING_SIZE,
            max_ring_size: MAX_RING_SIZE,
            planarity_tolerance: PLANARITY_TOLERANCE,
            grid_spacing: GRID_SPACING,
            intruder_residues: None,
            surface: None,
        }
    }
}

impl CheckConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_ring_size < MIN_RING_SIZE {
            return Err(invalid(
                "min_ring_size",
                format!("must be at least {MIN_RING_SIZE}, got {}", self.min_ring_size),
            ));
        }
        if self.max_ring_size < self.min_ring_size {
            return Err(invalid(
                "max_ring_size",
                format!(
                    "must not be smaller than min_ring_size ({}), got {}",
                    self.min_ring_size, self.max_ring_size
                ),
            ));
        }
        if !(self.planarity_tolerance > 0.0 && self.planarity_tolerance < 1.0) {
            return Err(invalid(
                "planarity_tolerance",
                format!("must be in (0, 1), got {}", self.planarity_tolerance),
            ));
        }
        if !(self.grid_spacing.is_finite() && self.grid_spacing >= MIN_GRID_SPACING) {
            return Err(invalid(
                "grid_spacing",
                format!(
                    "must be at least {MIN_GRID_SPACING} Å, got {}",
                    self.grid_spacing
                ),
            ));
        }
        if let Some(intruders) = &self.intruder_residues {
            if intruders.is_empty() {
                return Err(invalid("intruder_residues", "empty selection".to_string()));
            }
        }
        if let Some(surface) = &self.surface {
            surface.validate()?;
        }
        Ok(())
    }

    /// Whether a bond belongs to the configured intruder residues.
    ///
    /// Every bond passes when no intruders are configured.
    pub fn is_intruder(&self, snapshot: &Snapshot, bond: &Bond) -> bool {
        match &self.intruder_residues {
            None => true,
            Some(residues) => {
                residues.contains(&snapshot.atom(bond.0).resn)
                    || residues.contains(&snapshot.atom(bond.1).resn)
            }
        }
    }
}

pub(crate) fn invalid(name: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidParameter { name, reason }
}
