use super::compression::{CompressedWriter, Compression};
use super::header::{DEFAULT_PRECISION, StfHeader};
use crate::core::models::UnitCell;
use crate::core::models::topology::Topology;
use crate::traj::error::TrajError;
use crate::traj::traits::TrajectoryWriter;
use nalgebra::Point3;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Settings for a new STF file. Unset fields take their defaults at creation.
#[derive(Debug, Clone, Default)]
pub struct StfWriterOptions {
    precision: Option<u32>,
    compression: Option<Compression>,
    topology: Option<Topology>,
    extra: Vec<(String, String)>,
}

impl StfWriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decimal digits kept per coordinate (0..=8, default 2). Out-of-range values
    /// are rejected by [`StfWriter::create`].
    pub fn precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Overrides the compression otherwise chosen from the file extension.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Embeds a topology in the header as inline JSON.
    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }
}

/// Fixed-point encoding of one coordinate, `None` when it has no exact integer form.
fn encode(value: f64, scale: f64) -> Option<i64> {
    // 2^63: the first magnitude that no longer fits an i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let scaled = (value * scale).round_ties_even();
    (scaled.is_finite() && scaled.abs() < LIMIT).then_some(scaled as i64)
}

/// Streaming writer for STF/CTF trajectories.
pub struct StfWriter {
    sink: Option<CompressedWriter>,
    file: String,
    natoms: usize,
    scale: f64,
    frames_written: usize,
    line: String,
}

impl StfWriter {
    pub fn create(
        path: impl AsRef<Path>,
        natoms: usize,
        options: StfWriterOptions,
    ) -> Result<Self, TrajError> {
        let path = path.as_ref();
        let precision = options.precision.unwrap_or(DEFAULT_PRECISION);
        let compression = options
            .compression
            .unwrap_or_else(|| Compression::from_path(path));
        let header = StfHeader {
            natoms,
            precision,
            topology: options.topology,
            extra: options.extra,
        };

        // Render the header first so that a rejected entry leaves no file behind.
        let mut rendered = Vec::new();
        header.write(&mut rendered)?;

        let file = File::create(path).map_err(|e| TrajError::resource(path, e))?;
        let mut sink = CompressedWriter::new(compression, file)?;
        sink.write_all(&rendered)?;

        let name = path.display().to_string();
        debug!(file = %name, natoms, precision, %compression, "Created STF trajectory");
        Ok(Self {
            sink: Some(sink),
            file: name,
            natoms,
            scale: header.scale(),
            frames_written: 0,
            line: String::new(),
        })
    }
}

impl TrajectoryWriter for StfWriter {
    fn len(&self) -> usize {
        self.natoms
    }

    fn frames_written(&self) -> usize {
        self.frames_written
    }

    fn write_next(
        &mut self,
        frame: &[Point3<f64>],
        cell: Option<&UnitCell>,
    ) -> Result<(), TrajError> {
        if frame.len() != self.natoms {
            return Err(TrajError::Capacity {
                expected: self.natoms,
                found: frame.len(),
            });
        }
        let sink = self.sink.as_mut().ok_or(TrajError::NotReadable)?;

        self.line.clear();
        let frame_index = self.frames_written;
        for (atom, p) in frame.iter().enumerate() {
            let mut xyz = [0i64; 3];
            for (encoded, &value) in xyz.iter_mut().zip(p.coords.iter()) {
                *encoded = encode(value, self.scale).ok_or(TrajError::InvalidCoordinate {
                    frame: frame_index,
                    atom,
                    value,
                })?;
            }
            // Writing into a String cannot fail.
            let _ = writeln!(self.line, "{} {} {}", xyz[0], xyz[1], xyz[2]);
        }
        self.line.push('*');
        if let Some(cell) = cell {
            for v in cell {
                let _ = write!(self.line, " {v}");
            }
        }
        self.line.push('\n');

        sink.write_all(self.line.as_bytes())?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TrajError> {
        if let Some(sink) = self.sink.take() {
            sink.finish()?;
            debug!(file = %self.file, frames = self.frames_written, "Closed STF trajectory");
        }
        Ok(())
    }
}

impl Drop for StfWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(file = %self.file, error = %e, "Failed to finish STF trajectory on drop");
        }
    }
}
