#![doc = include_str!("../README.md")]

//! # Pierce Library
//!
//! Geometric quality control for assembled molecular dynamics systems. A
//! [`Snapshot`] (atoms, bonds and the periodic cell) is checked for bonds
//! threaded through rings or through the closed surface of a selected group
//! of residues, and the findings are returned as a [`Report`] that converts
//! to a Polars DataFrame.

pub mod config;
mod core;
pub mod error;
pub mod grid;
pub mod pbc;
pub mod penetration;
pub mod plane;
pub mod report;
pub mod rings;
pub mod surface;
pub mod system;
mod utils;

// Re-export key public types
pub use crate::core::{check_penetrations, check_penetrations_with, describe_rings};
pub use config::CheckConfig;
pub use error::{ConfigError, LoadError, SurfaceError};
pub use pbc::{BoxShape, Cell};
pub use plane::{DegenerateRing, FittedPlane};
pub use report::{AtomEntity, PassStatus, PenetrationEvent, Report, RunStatus, Summary, Target};
pub use rings::Ring;
pub use surface::hull::{ExternalHull, HullConfig, HullProgram};
pub use surface::{Surface, SurfaceConfig, SurfaceGroup};
pub use system::{Atom, Bond, Snapshot};
pub use utils::{load_snapshot, run_with_threads, write_df_to_file, DataFrameFileType};
