use super::{load, parse_box, parse_residues, save, EXIT_FATAL};
use clap::Parser;
use pierce::config::{GRID_SPACING, MAX_RING_SIZE, MIN_RING_SIZE};
use pierce::surface::hull::{DEFAULT_HULL_ARGS, DEFAULT_HULL_EXE, DEFAULT_HULL_TIMEOUT};
use pierce::{
    check_penetrations, run_with_threads, BoxShape, CheckConfig, ConfigError, DataFrameFileType,
    HullConfig, PassStatus, RunStatus, SurfaceConfig, SurfaceGroup,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub(crate) struct Args {
    /// Path to the PDB or mmCIF file to be checked
    #[arg(short, long)]
    input: PathBuf,

    /// Output file for the penetration table; the extension follows the output format
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output file type
    #[arg(short = 'f', long = "format", default_value_t = DataFrameFileType::Csv)]
    output_format: DataFrameFileType,

    /// Shape of the periodic box
    #[arg(long, default_value_t = BoxShape::Rectangular)]
    shape: BoxShape,

    /// Box lengths a,b,c in Å, overriding the CRYST1 record
    #[arg(long = "box", value_parser = parse_box)]
    box_lengths: Option<[f64; 3]>,

    /// Smallest ring size to search
    #[arg(long, default_value_t = MIN_RING_SIZE)]
    min_ring_size: usize,

    /// Largest ring size to search
    #[arg(long, default_value_t = MAX_RING_SIZE)]
    max_ring_size: usize,

    /// Bin thickness of the neighbour grid in Å
    #[arg(long, default_value_t = GRID_SPACING)]
    grid_spacing: f64,

    /// Residue names forming one closed surface, e.g. POPC,CHL1.
    /// Repeat the option to build several surfaces
    #[arg(long = "surface")]
    surfaces: Vec<String>,

    /// Use hydrogens as surface points
    #[arg(long, default_value_t = false)]
    surface_hydrogens: bool,

    /// qhull-compatible program used to triangulate surfaces
    #[arg(long, default_value = DEFAULT_HULL_EXE)]
    hull_exe: PathBuf,

    /// Argument template for the hull program; {input} and {output} are replaced by file paths
    #[arg(long)]
    hull_args: Option<String>,

    /// Seconds before the hull program is killed
    #[arg(long, default_value_t = DEFAULT_HULL_TIMEOUT)]
    hull_timeout: u64,

    /// Only test bonds touching these residues, e.g. LIG,HEM
    #[arg(long)]
    intruders: Option<String>,

    /// Number of threads to use for parallel processing (0 for all cores)
    #[arg(short = 'j', long = "num-threads", default_value_t = 0)]
    num_threads: usize,
}

impl Args {
    fn to_config(&self) -> Result<CheckConfig, ConfigError> {
        let surface = (!self.surfaces.is_empty()).then(|| SurfaceConfig {
            groups: self
                .surfaces
                .iter()
                .map(|s| SurfaceGroup::new(&parse_residues(s)))
                .collect(),
            hull: HullConfig {
                executable: self.hull_exe.clone(),
                args: match &self.hull_args {
                    Some(template) => template.split_whitespace().map(String::from).collect(),
                    None => DEFAULT_HULL_ARGS.iter().map(|a| a.to_string()).collect(),
                },
                timeout: Duration::from_secs(self.hull_timeout),
            },
            include_hydrogens: self.surface_hydrogens,
        });
        let intruder_residues = self
            .intruders
            .as_deref()
            .map(|s| parse_residues(s).into_iter().collect::<HashSet<String>>());

        let config = CheckConfig {
            min_ring_size: self.min_ring_size,
            max_ring_size: self.max_ring_size,
            grid_spacing: self.grid_spacing,
            intruder_residues,
            surface,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }
}

pub(crate) fn run(args: &Args) -> u8 {
    trace!("{args:?}");

    let config = match args.to_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return EXIT_FATAL;
        }
    };
    let Some(snapshot) = load(&args.input, args.shape, args.box_lengths) else {
        return EXIT_FATAL;
    };

    let report = match run_with_threads(args.num_threads, || {
        debug!("Using {} thread(s)", rayon::current_num_threads());
        check_penetrations(&snapshot, &config)
    }) {
        Ok(report) => report,
        Err(e) => {
            error!("{e}");
            return EXIT_FATAL;
        }
    };

    // Log the identified penetrations
    for event in &report.events {
        warn!("{event}");
    }
    if let PassStatus::Failed(reason) = &report.surface_pass {
        warn!("Surface checks did not run: {reason}");
    }
    match report.status() {
        RunStatus::Clean => info!("No penetrations found"),
        RunStatus::PenetrationsFound => warn!(
            "Found {} {}",
            report.events.len(),
            match report.events.len() {
                1 => "penetration",
                _ => "penetrations",
            }
        ),
        RunStatus::Incomplete => warn!("No penetrations found, but the check is incomplete"),
    }
    info!("{}", report.summary_line());

    if let Some(output) = &args.output {
        let saved = report
            .to_df()
            .map_err(|e| error!("Failed to tabulate the report: {e}"))
            .is_ok_and(|mut df| save(&mut df, output, args.output_format));
        if !saved {
            return EXIT_FATAL;
        }
    }

    report.status().exit_code()
}
