use crate::error::{ConfigError, LoadError};
use crate::pbc::{BoxShape, Cell};
use crate::system::{Atom, Snapshot};
use nalgebra::Point3;
use pdbtbx::*;
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Tolerance in degrees when comparing CRYST1 angles with the requested box shape
const ANGLE_TOLERANCE: f64 = 0.5;

/// Read a structure with [`pdbtbx`] and turn its first model into a [`Snapshot`].
///
/// Bonds come from CONECT records, which must exist. The periodic cell is read
/// from the CRYST1 record unless `box_lengths` is given, and its angles must
/// fit `shape`. Non-fatal reader messages are returned as warnings.
pub fn load_snapshot(
    path: impl AsRef<Path>,
    shape: BoxShape,
    box_lengths: Option<[f64; 3]>,
) -> Result<(Snapshot, Vec<String>), LoadError> {
    let path = path.as_ref();
    let (pdb, errors) = ReadOptions::default()
        .set_level(StrictnessLevel::Loose)
        .read(path.to_string_lossy())
        .map_err(|errors| LoadError::Read {
            path: path.to_path_buf(),
            messages: errors.iter().map(|e| e.to_string()).collect(),
        })?;
    let mut warnings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();

    let first_model = pdb.models().next().map(|m| m.serial_number());
    let mut atoms: Vec<Atom> = Vec::new();
    let mut serial_to_index: HashMap<usize, usize> = HashMap::new();
    for hier in pdb
        .atoms_with_hierarchy()
        .filter(|x| Some(x.model().serial_number()) == first_model)
    {
        let atom = hier.atom();
        let index = atoms.len();
        if serial_to_index.insert(atom.serial_number(), index).is_some() {
            warnings.push(format!(
                "Duplicate atom serial number {}, CONECT records may be ambiguous",
                atom.serial_number()
            ));
        }
        let (x, y, z) = atom.pos();
        atoms.push(Atom::new(
            index,
            atom.name(),
            hier.residue().serial_number(),
            hier.residue().name().unwrap_or_default(),
            atom.element().map(|e| e.symbol()).unwrap_or_default(),
            Point3::new(x, y, z),
        ));
    }
    if atoms.is_empty() {
        return Err(LoadError::Read {
            path: path.to_path_buf(),
            messages: vec!["no atoms in the first model".to_string()],
        });
    }

    // pdbtbx keeps disulfide bonds only, CONECT records are read separately
    let mut bonds: Vec<(usize, usize)> = pdb
        .bonds()
        .filter_map(|(a, b, _)| {
            Some((
                *serial_to_index.get(&a.serial_number())?,
                *serial_to_index.get(&b.serial_number())?,
            ))
        })
        .collect();
    if is_pdb_file(path) {
        let text = std::fs::read_to_string(path).map_err(|e| LoadError::Read {
            path: path.to_path_buf(),
            messages: vec![e.to_string()],
        })?;
        let (conect, skipped) = read_conect(&text);
        let mut unknown = 0;
        for (a, b) in conect {
            match (serial_to_index.get(&a), serial_to_index.get(&b)) {
                (Some(&i), Some(&j)) if i != j => bonds.push((i, j)),
                _ => unknown += 1,
            }
        }
        if skipped > 0 {
            warnings.push(format!("Ignored {skipped} unreadable CONECT fields"));
        }
        if unknown > 0 {
            warnings.push(format!(
                "Ignored {unknown} CONECT bonds to atoms outside of the first model"
            ));
        }
    }
    if bonds.is_empty() {
        return Err(LoadError::NoBonds {
            path: path.to_path_buf(),
        });
    }

    let lengths = match box_lengths {
        Some(lengths) => lengths,
        None => {
            let cell = pdb.unit_cell.as_ref().ok_or_else(|| LoadError::MissingCell {
                path: path.to_path_buf(),
            })?;
            check_cell_angles(shape, [cell.alpha(), cell.beta(), cell.gamma()])?;
            [cell.a(), cell.b(), cell.c()]
        }
    };
    let cell = Cell::new(shape, lengths)?;
    debug!(
        "Loaded {} atoms and {} bonds from {path:?}, {shape} box {lengths:?}",
        atoms.len(),
        bonds.len()
    );

    Ok((Snapshot::new(atoms, bonds, cell)?, warnings))
}

/// Reject CRYST1 angles that do not describe the requested box shape.
fn check_cell_angles(shape: BoxShape, angles: [f64; 3]) -> Result<(), ConfigError> {
    let [alpha, beta, gamma] = angles;
    let near = |angle: f64, target: f64| (angle - target).abs() < ANGLE_TOLERANCE;
    let matches = near(alpha, 90.0)
        && near(beta, 90.0)
        && match shape {
            BoxShape::Rectangular => near(gamma, 90.0),
            BoxShape::Hexagonal => near(gamma, 60.0) || near(gamma, 120.0),
        };
    if matches {
        Ok(())
    } else {
        Err(ConfigError::AngleMismatch { shape, angles })
    }
}

fn is_pdb_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_lowercase().as_str(), "pdb" | "ent" | "pdb1"))
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

/// Serial number pairs of all CONECT records, plus the number of fields that
/// could not be read.
///
/// Fields follow the fixed PDB columns: the atom at 7-11, bonded atoms at
/// 12-16, 17-21, 22-26 and 27-31.
fn read_conect(text: &str) -> (Vec<(usize, usize)>, usize) {
    let mut bonds = Vec::new();
    let mut skipped = 0;
    for line in text.lines().filter(|l| l.starts_with("CONECT")) {
        let Ok(atom) = slice_and_trim(line, 6, 11).parse::<usize>() else {
            skipped += 1;
            continue;
        };
        for start in [11, 16, 21, 26] {
            let field = slice_and_trim(line, start, start + 5);
            if field.is_empty() {
                continue;
            }
            match field.parse::<usize>() {
                Ok(other) => bonds.push((atom, other)),
                Err(_) => skipped += 1,
            }
        }
    }
    (bonds, skipped)
}

/// Run `f` inside a rayon pool of `num_threads` threads (0 uses all cores).
pub fn run_with_threads<F, R>(num_threads: usize, f: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
    {
        Ok(pool) => pool.install(f),
        Err(e) => {
            warn!("Failed to build a thread pool ({e}); using the global pool");
            f()
        }
    }
}

/// Write a DataFrame to `file_path`, replacing its extension with the format's.
pub fn write_df_to_file(
    df: &mut DataFrame,
    file_path: &Path,
    file_type: DataFrameFileType,
) -> PolarsResult<()> {
    let file_suffix = file_type.to_string();
    let mut file = std::fs::File::create(file_path.with_extension(file_suffix))?;
    match file_type {
        DataFrameFileType::Csv => {
            CsvWriter::new(&mut file).finish(df)?;
        }
        DataFrameFileType::Parquet => {
            ParquetWriter::new(&mut file).finish(df)?;
        }
        DataFrameFileType::Json => {
            JsonWriter::new(&mut file)
                .with_json_format(JsonFormat::Json)
                .finish(df)?;
        }
        DataFrameFileType::NDJson => {
            JsonWriter::new(&mut file)
                .with_json_format(JsonFormat::JsonLines)
                .finish(df)?;
        }
    }
    Ok(())
}

/// File format for writing DataFrames.
#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum DataFrameFileType {
    /// Comma-separated values
    Csv,
    /// Parquet columnar storage
    Parquet,
    /// Standard JSON
    Json,
    /// Newline-delimited JSON
    #[value(name = "ndjson")]
    NDJson,
}

impl std::fmt::Display for DataFrameFileType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DataFrameFileType::Csv => write!(f, "csv"),
            DataFrameFileType::Parquet => write!(f, "parquet"),
            DataFrameFileType::Json => write!(f, "json"),
            DataFrameFileType::NDJson => write!(f, "ndjson"),
        }
    }
}
