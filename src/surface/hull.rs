//! Triangulated hulls from an external qhull-compatible program.

use crate::error::SurfaceError;
use nalgebra::Point3;
use std::fmt::Write as _;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Program looked up on `PATH` when none is configured
pub const DEFAULT_HULL_EXE: &str = "qconvex";
/// Triangulated output, facets as point indices
pub const DEFAULT_HULL_ARGS: [&str; 6] = ["Qt", "i", "TI", "{input}", "TO", "{output}"];
/// Seconds before the hull program is killed
pub const DEFAULT_HULL_TIMEOUT: u64 = 60;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Anything that turns a point cloud into triangles over it.
pub trait HullProgram: Send + Sync {
    /// Triangles as indices into `points`.
    fn triangulate(&self, points: &[Point3<f64>]) -> Result<Vec<[usize; 3]>, SurfaceError>;
}

/// How to run the external hull program.
#[derive(Clone, Debug, PartialEq)]
pub struct HullConfig {
    /// Executable name or path
    pub executable: PathBuf,
    /// Argument template; `{input}` and `{output}` are replaced by file paths
    pub args: Vec<String>,
    /// Wall-clock limit for one run
    pub timeout: Duration,
}

impl Default for HullConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_HULL_EXE),
            args: DEFAULT_HULL_ARGS.iter().map(|a| a.to_string()).collect(),
            timeout: Duration::from_secs(DEFAULT_HULL_TIMEOUT),
        }
    }
}

/// [`HullProgram`] backed by a subprocess exchanging qhull-format files.
#[derive(Clone, Debug, Default)]
pub struct ExternalHull {
    config: HullConfig,
}

impl ExternalHull {
    pub fn new(config: HullConfig) -> Self {
        Self { config }
    }

    fn expand_args(&self, input: &str, output: &str) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|a| a.replace("{input}", input).replace("{output}", output))
            .collect()
    }
}

impl HullProgram for ExternalHull {
    fn triangulate(&self, points: &[Point3<f64>]) -> Result<Vec<[usize; 3]>, SurfaceError> {
        let program = &self.config.executable;
        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join("points.txt");
        let output = workdir.path().join("facets.txt");
        let log = workdir.path().join("hull.log");

        std::fs::write(&input, format_points(points))?;
        let args = self.expand_args(&input.to_string_lossy(), &output.to_string_lossy());
        debug!("Running {program:?} {}", args.join(" "));

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(File::create(&log)?)
            .spawn()
            .map_err(|source| SurfaceError::ToolUnavailable {
                program: program.clone(),
                source,
            })?;

        let deadline = Instant::now() + self.config.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                // The child may exit between the check and the kill
                let _ = child.kill();
                let _ = child.wait();
                return Err(SurfaceError::Timeout {
                    program: program.clone(),
                    timeout: self.config.timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let stderr = std::fs::read_to_string(&log).unwrap_or_default();
            return Err(SurfaceError::ToolFailed {
                program: program.clone(),
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let text = match std::fs::read_to_string(&output) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SurfaceError::MalformedOutput {
                    line: 0,
                    reason: "no facet file was written".to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let facets = parse_facets(&text, points.len())?;
        trace!("Hull program returned {} facets", facets.len());
        Ok(facets)
    }
}

/// qhull point format: dimension, point count, one point per line.
pub fn format_points(points: &[Point3<f64>]) -> String {
    let mut text = format!("3\n{}\n", points.len());
    for p in points {
        // Writing into a String cannot fail
        let _ = writeln!(text, "{} {} {}", p.x, p.y, p.z);
    }
    text
}

/// Parse a facet count followed by exactly that many lines of three point indices.
pub fn parse_facets(text: &str, n_points: usize) -> Result<Vec<[usize; 3]>, SurfaceError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    let (header_line, header) = lines.next().ok_or_else(|| SurfaceError::MalformedOutput {
        line: 1,
        reason: "empty facet file".to_string(),
    })?;
    let expected: usize = header.parse().map_err(|_| SurfaceError::MalformedOutput {
        line: header_line,
        reason: format!("expected a facet count, found '{header}'"),
    })?;

    let mut facets = Vec::with_capacity(expected);
    for (line, content) in lines {
        if facets.len() == expected {
            return Err(SurfaceError::MalformedOutput {
                line,
                reason: format!("more than the announced {expected} facets"),
            });
        }
        let fields: Vec<&str> = content.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(SurfaceError::MalformedOutput {
                line,
                reason: format!("expected 3 point indices, found {}", fields.len()),
            });
        }
        let mut facet = [0usize; 3];
        for (slot, field) in facet.iter_mut().zip(&fields) {
            *slot = match field.parse::<usize>() {
                Ok(i) if i < n_points => i,
                _ => {
                    return Err(SurfaceError::MalformedOutput {
                        line,
                        reason: format!("'{field}' is not a point index below {n_points}"),
                    })
                }
            };
        }
        facets.push(facet);
    }

    if facets.len() != expected {
        return Err(SurfaceError::MalformedOutput {
            line: text.lines().count(),
            reason: format!("expected {expected} facets, found {}", facets.len()),
        });
    }
    Ok(facets)
}
