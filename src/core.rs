use crate::config::CheckConfig;
use crate::error::ConfigError;
use crate::grid::PeriodicGrid;
use crate::penetration::ring::{find_ring_penetrations, fit_rings};
use crate::penetration::surface::find_surface_penetrations;
use crate::plane::{DegenerateRing, FittedPlane};
use crate::report::{PassStatus, Report, Reporter, Summary};
use crate::rings::{find_rings, Ring};
use crate::surface::build_surfaces;
use crate::surface::hull::{ExternalHull, HullProgram};
use crate::system::Snapshot;
use tracing::{debug, error, info};

/// Run every configured penetration test on a snapshot.
///
/// Surfaces are triangulated by the external hull program named in the
/// configuration. Only invalid settings are an error: a failing surface
/// construction is recorded in [`Report::surface_pass`] and the ring results
/// are still returned.
///
/// # Example
///
/// ```no_run
/// use pierce::{check_penetrations, load_snapshot, BoxShape, CheckConfig};
///
/// let (snapshot, _warnings) = load_snapshot("system.pdb", BoxShape::Rectangular, None).unwrap();
/// let report = check_penetrations(&snapshot, &CheckConfig::default()).unwrap();
/// println!("{report}");
/// ```
pub fn check_penetrations(snapshot: &Snapshot, config: &CheckConfig) -> Result<Report, ConfigError> {
    let hull = config
        .surface
        .as_ref()
        .map(|s| ExternalHull::new(s.hull.clone()))
        .unwrap_or_default();
    check_penetrations_with(snapshot, config, &hull)
}

/// [`check_penetrations`] with a caller-supplied hull program.
pub fn check_penetrations_with(
    snapshot: &Snapshot,
    config: &CheckConfig,
    hull: &dyn HullProgram,
) -> Result<Report, ConfigError> {
    config.validate()?;
    debug!(
        "Checking {} atoms, {} bonds in {} fragments",
        snapshot.atoms().len(),
        snapshot.bonds().len(),
        snapshot.fragment_count()
    );

    let ((planes, n_rings, degenerate_rings), surfaces) = rayon::join(
        || {
            let rings = find_rings(snapshot, config.min_ring_size, config.max_ring_size);
            let n_rings = rings.len();
            let (planes, degenerate) = fit_rings(snapshot, rings, config.planarity_tolerance);
            (planes, n_rings, degenerate)
        },
        || {
            config
                .surface
                .as_ref()
                .map(|s| build_surfaces(snapshot, s, hull))
        },
    );
    info!("Found {n_rings} rings ({degenerate_rings} degenerate)");

    let (surfaces, surface_pass) = match surfaces {
        None => (Vec::new(), PassStatus::Skipped),
        Some(Ok(surfaces)) => (surfaces, PassStatus::Completed),
        Some(Err(e)) => {
            error!("Surface construction failed: {e}");
            (Vec::new(), PassStatus::Failed(e.to_string()))
        }
    };

    let grid = PeriodicGrid::new(snapshot.cell(), snapshot.positions(), config.grid_spacing);
    let (ring_events, surface_events) = rayon::join(
        || find_ring_penetrations(snapshot, &grid, &planes, config),
        || find_surface_penetrations(snapshot, &grid, &surfaces, config),
    );

    let summary = Summary {
        atoms: snapshot.atoms().len(),
        bonds: snapshot.bonds().len(),
        rings: n_rings,
        degenerate_rings,
        surfaces: surfaces.len(),
        facets: surfaces.iter().map(|s| s.facets.len()).sum(),
        dropped_facets: surfaces.iter().map(|s| s.dropped_facets).sum(),
        ..Default::default()
    };

    let mut reporter = Reporter::new();
    reporter.extend(ring_events);
    reporter.extend(surface_events);
    Ok(reporter.finish(PassStatus::Completed, surface_pass, summary))
}

/// Every ring the extractor finds, with its plane or the reason it has none.
pub fn describe_rings(
    snapshot: &Snapshot,
    config: &CheckConfig,
) -> Result<Vec<(Ring, Result<FittedPlane, DegenerateRing>)>, ConfigError> {
    config.validate()?;
    Ok(
        find_rings(snapshot, config.min_ring_size, config.max_ring_size)
            .into_iter()
            .map(|ring| {
                let plane = FittedPlane::fit_ring(snapshot, &ring, config.planarity_tolerance);
                (ring, plane)
            })
            .collect(),
    )
}
