pub(crate) mod check;
pub(crate) mod rings;

use pierce::{load_snapshot, write_df_to_file, BoxShape, DataFrameFileType, Snapshot};
use polars::prelude::DataFrame;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Exit code for invalid input and settings
pub(crate) const EXIT_FATAL: u8 = 2;

/// Parse `a,b,c` box lengths in Å.
pub(crate) fn parse_box(s: &str) -> Result<[f64; 3], String> {
    let lengths: Vec<f64> = s
        .split(',')
        .map(|x| x.trim().parse::<f64>().map_err(|e| format!("'{x}': {e}")))
        .collect::<Result<_, _>>()?;
    <[f64; 3]>::try_from(lengths)
        .map_err(|v| format!("expected three box lengths, got {}", v.len()))
}

/// Split a comma-separated residue name list, dropping empty entries.
pub(crate) fn parse_residues(s: &str) -> Vec<String> {
    s.split(',')
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect()
}

/// Load the input structure, logging reader warnings.
pub(crate) fn load(input: &Path, shape: BoxShape, box_lengths: Option<[f64; 3]>) -> Option<Snapshot> {
    match load_snapshot(input, shape, box_lengths) {
        Ok((snapshot, warnings)) => {
            warnings.iter().for_each(|w| warn!("{w}"));
            debug!(
                "Loaded {} atoms, {} bonds, {} fragments",
                snapshot.atoms().len(),
                snapshot.bonds().len(),
                snapshot.fragment_count()
            );
            Some(snapshot)
        }
        Err(e) => {
            error!("{e}");
            None
        }
    }
}

/// Write a table next to `output`, creating its directory first.
pub(crate) fn save(df: &mut DataFrame, output: &Path, format: DataFrameFileType) -> bool {
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(dir) {
            error!("Failed to create the output directory {dir:?}: {e}");
            return false;
        }
    }
    match write_df_to_file(df, output, format) {
        Ok(()) => {
            info!("Results saved to {:?}", output.with_extension(format.to_string()));
            true
        }
        Err(e) => {
            error!("Failed to write {output:?}: {e}");
            false
        }
    }
}
