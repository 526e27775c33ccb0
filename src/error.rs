//! Error types for configuration, surface construction and loading.

use crate::pbc::BoxShape;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Invalid input or settings. Always fatal: the run is aborted before any analysis.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Box lengths must be positive and finite, got {lengths:?}")]
    NonPositiveBox { lengths: [f64; 3] },

    #[error("Unsupported box shape '{0}' (expected 'rectangular' or 'hexagonal')")]
    UnsupportedShape(String),

    #[error("Hexagonal cells need equal in-plane lengths, got a = {a} and b = {b}")]
    HexagonalMismatch { a: f64, b: f64 },

    #[error("Atom at position {position} has index {index}")]
    AtomIndexMismatch { position: usize, index: usize },

    #[error("Atom {atom} has a non-finite coordinate")]
    NonFiniteCoordinate { atom: usize },

    #[error("Bond ({a}, {b}) refers to an atom outside of the {n_atoms} loaded atoms")]
    BondOutOfRange { a: usize, b: usize, n_atoms: usize },

    #[error("Atom {0} is bonded to itself")]
    SelfBond(usize),

    #[error("Cell angles {angles:?} do not describe a {shape} box")]
    AngleMismatch { shape: BoxShape, angles: [f64; 3] },

    #[error("Invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Failures of the surface construction. Fatal for surface testing only.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Hull program {program:?} could not be started: {source}")]
    ToolUnavailable {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hull program {program:?} did not finish within {timeout:?}")]
    Timeout { program: PathBuf, timeout: Duration },

    #[error("Hull program {program:?} exited with {status}: {stderr}")]
    ToolFailed {
        program: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("Malformed hull output at line {line}: {reason}")]
    MalformedOutput { line: usize, reason: String },

    #[error("Surface group '{group}' has {count} points, at least 4 are needed")]
    TooFewPoints { group: String, count: usize },

    #[error("Hull I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while turning a structure file into a snapshot.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {path:?}: {}", messages.join("; "))]
    Read {
        path: PathBuf,
        messages: Vec<String>,
    },

    #[error("{path:?} has no unit cell (CRYST1) record; pass the box lengths explicitly")]
    MissingCell { path: PathBuf },

    #[error("{path:?} has no bonds; ring and surface checks need CONECT records")]
    NoBonds { path: PathBuf },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
