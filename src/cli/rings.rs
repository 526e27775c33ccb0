use super::{load, parse_box, save, EXIT_FATAL};
use clap::Parser;
use pierce::config::{MAX_RING_SIZE, MIN_RING_SIZE};
use pierce::{
    describe_rings, BoxShape, CheckConfig, DataFrameFileType, DegenerateRing, FittedPlane, Ring,
    Snapshot,
};
use polars::prelude::*;
use std::path::PathBuf;
use tracing::{error, info, trace};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub(crate) struct Args {
    /// Path to the PDB or mmCIF file to be analyzed
    #[arg(short, long)]
    input: PathBuf,

    /// Output file for the ring table; the extension follows the output format
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
}

pub(crate) fn run(args: &Args) -> u8 {
    trace!("{args:?}");

    let Some(snapshot) = load(&args.input, args.shape, args.box_lengths) else {
        return EXIT_FATAL;
    };
    let config = CheckConfig {
        min_ring_size: args.min_ring_size,
        max_ring_size: args.max_ring_size,
        ..Default::default()
    };
    let rings = match describe_rings(&snapshot, &config) {
        Ok(rings) => rings,
        Err(e) => {
            error!("{e}");
            return EXIT_FATAL;
        }
    };

    let mut df = match rings_to_df(&snapshot, &rings) {
        Ok(df) => df,
        Err(e) => {
            error!("Failed to tabulate the rings: {e}");
            return EXIT_FATAL;
        }
    };
    info!("Found {} rings\n{}", df.height(), df);

    if let Some(output) = &args.output {
        if !save(&mut df, output, args.output_format) {
            return EXIT_FATAL;
        }
    }
    0
}

fn rings_to_df(
    snapshot: &Snapshot,
    rings: &[(Ring, Result<FittedPlane, DegenerateRing>)],
) -> PolarsResult<DataFrame> {
    let plane = |i: usize| rings[i].1.as_ref().ok();
    let n = rings.len();
    df!(
        "ring" => rings.iter().map(|(r, _)| r.to_string()).collect::<Vec<String>>(),
        "size" => rings.iter().map(|(r, _)| r.len() as u32).collect::<Vec<u32>>(),
        "resn" => rings.iter().map(|(r, _)| snapshot.atom(r.atoms()[0]).resn.to_owned()).collect::<Vec<String>>(),
        "resi" => rings.iter().map(|(r, _)| snapshot.atom(r.atoms()[0]).resi as i32).collect::<Vec<i32>>(),
        "status" => rings.iter().map(|(_, p)| match p {
            Ok(_) => "planar".to_string(),
            Err(e) => e.to_string(),
        }).collect::<Vec<String>>(),
        "radius" => (0..n).map(|i| plane(i).map(|p| p.radius as f32)).collect::<Vec<Option<f32>>>(),
        "normal_x" => (0..n).map(|i| plane(i).map(|p| p.normal.x as f32)).collect::<Vec<Option<f32>>>(),
        "normal_y" => (0..n).map(|i| plane(i).map(|p| p.normal.y as f32)).collect::<Vec<Option<f32>>>(),
        "normal_z" => (0..n).map(|i| plane(i).map(|p| p.normal.z as f32)).collect::<Vec<Option<f32>>>(),
        "center_x" => (0..n).map(|i| plane(i).map(|p| p.center.x as f32)).collect::<Vec<Option<f32>>>(),
        "center_y" => (0..n).map(|i| plane(i).map(|p| p.center.y as f32)).collect::<Vec<Option<f32>>>(),
        "center_z" => (0..n).map(|i| plane(i).map(|p| p.center.z as f32)).collect::<Vec<Option<f32>>>(),
    )
}
