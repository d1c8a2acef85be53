use super::dcd::{DcdReader, DcdWriter, DcdWriterOptions};
use super::error::{Location, TrajError};
use super::stf::{self, Compression, StfReader, StfWriter, StfWriterOptions};
use super::traits::{Trajectory, TrajectoryWriter};
use super::xtc::{XtcReader, XtcWriter};
use crate::core::io::traits::MolecularFile;
use crate::core::io::xyz::{XyzError, XyzFile};
use crate::core::models::topology::Topology;
use std::fmt;
use std::path::Path;
use tracing::debug;

const DEFAULT_XTC_TIMESTEP: f32 = 1.0;

/// Trajectory formats recognized by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajectoryFormat {
    Dcd,
    Xtc,
    /// STF/CTF with the compression named by the extension's last letter.
    Stf(Compression),
    /// Multi-frame XYZ, read whole into memory. Read-only.
    Xyz,
}

impl TrajectoryFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "dcd" => Some(Self::Dcd),
            "xtc" => Some(Self::Xtc),
            "xyz" => Some(Self::Xyz),
            _ if stf::is_stf_path(path) => Some(Self::Stf(Compression::from_path(path))),
            _ => None,
        }
    }
}

impl fmt::Display for TrajectoryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dcd => write!(f, "DCD"),
            Self::Xtc => write!(f, "XTC"),
            Self::Stf(compression) => write!(f, "STF ({compression})"),
            Self::Xyz => write!(f, "XYZ"),
        }
    }
}

fn format_of(path: &Path) -> Result<TrajectoryFormat, TrajError> {
    TrajectoryFormat::from_path(path).ok_or_else(|| TrajError::Unsupported {
        file: path.display().to_string(),
        feature: "unrecognized trajectory extension".to_string(),
    })
}

fn xyz_error(path: &Path, error: XyzError) -> TrajError {
    let file = path.display().to_string();
    match error {
        XyzError::Io(source) => TrajError::resource(path, source),
        XyzError::Parse { line, kind } => {
            TrajError::format(&file, Location::Line(line), kind.to_string())
        }
        other => TrajError::format(&file, Location::Header, other.to_string()),
    }
}

/// Opens `path` for reading with the codec its extension names.
pub fn open_trajectory(path: impl AsRef<Path>) -> Result<Box<dyn Trajectory>, TrajError> {
    let path = path.as_ref();
    let format = format_of(path)?;
    debug!(path = %path.display(), %format, "Opening trajectory");
    let trajectory: Box<dyn Trajectory> = match format {
        TrajectoryFormat::Dcd => Box::new(DcdReader::open(path)?),
        TrajectoryFormat::Xtc => Box::new(XtcReader::open(path)?),
        TrajectoryFormat::Stf(compression) => Box::new(StfReader::open_with(path, compression)?),
        TrajectoryFormat::Xyz => {
            let (molecule, _) = XyzFile::read_from_path(path).map_err(|e| xyz_error(path, e))?;
            Box::new(molecule.into_trajectory())
        }
    };
    Ok(trajectory)
}

/// Format-independent settings for [`create_writer`]. Each codec uses the ones
/// it can store and ignores the rest.
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub title: Option<String>,
    /// Time between frames (ps for XTC, native units for DCD).
    pub timestep: Option<f32>,
    /// Whether frames carry unit cells; DCD needs to know up front.
    pub unit_cell: bool,
    /// STF decimal digits.
    pub precision: Option<u32>,
    /// Embedded in STF headers.
    pub topology: Option<Topology>,
}

/// Creates a writer for `path` with the codec its extension names.
pub fn create_writer(
    path: impl AsRef<Path>,
    natoms: usize,
    options: WriterOptions,
) -> Result<Box<dyn TrajectoryWriter>, TrajError> {
    let path = path.as_ref();
    let format = format_of(path)?;
    let writer: Box<dyn TrajectoryWriter> = match format {
        TrajectoryFormat::Dcd => {
            let mut dcd = DcdWriterOptions::new().unit_cell(options.unit_cell);
            if let Some(title) = options.title {
                dcd = dcd.title(title);
            }
            if let Some(timestep) = options.timestep {
                dcd = dcd.timestep(timestep);
            }
            Box::new(DcdWriter::create(path, natoms, dcd)?)
        }
        TrajectoryFormat::Xtc => {
            let writer = XtcWriter::create(path, natoms)?;
            Box::new(writer.with_timestep(options.timestep.unwrap_or(DEFAULT_XTC_TIMESTEP)))
        }
        TrajectoryFormat::Stf(compression) => {
            let mut stf = StfWriterOptions::new().compression(compression);
            if let Some(precision) = options.precision {
                stf = stf.precision(precision);
            }
            if let Some(topology) = options.topology {
                stf = stf.topology(topology);
            }
            if let Some(title) = options.title {
                stf = stf.entry("title", title);
            }
            Box::new(StfWriter::create(path, natoms, stf)?)
        }
        TrajectoryFormat::Xyz => {
            return Err(TrajError::Unsupported {
                file: path.display().to_string(),
                feature: "writing XYZ as a stream".to_string(),
            });
        }
    };
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn extensions_select_formats() {
        let cases = [
            ("a.dcd", Some(TrajectoryFormat::Dcd)),
            ("a.XTC", Some(TrajectoryFormat::Xtc)),
            ("a.xyz", Some(TrajectoryFormat::Xyz)),
            ("a.ctz", Some(TrajectoryFormat::Stf(Compression::Gzip))),
            ("a.sts", Some(TrajectoryFormat::Stf(Compression::Zstd))),
            ("a.pdb", None),
            ("a", None),
        ];
        for (name, expected) in cases {
            assert_eq!(TrajectoryFormat::from_path(Path::new(name)), expected, "{name}");
        }
    }

    #[test]
    fn every_writable_format_reads_back_through_the_same_contract() {
        let dir = tempdir().unwrap();
        let frame = vec![Point3::new(1.0, 2.0, 3.0), Point3::new(-4.0, 5.5, 0.25)];
        let cell = [10.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 10.0];

        for name in ["t.dcd", "t.xtc", "t.stf", "t.ctl"] {
            let path = dir.path().join(name);
            let options = WriterOptions {
                unit_cell: true,
                ..WriterOptions::default()
            };
            let mut writer = create_writer(&path, 2, options).unwrap();
            writer.write_next(&frame, Some(&cell)).unwrap();
            writer.write_next(&frame, Some(&cell)).unwrap();
            writer.close().unwrap();

            let mut reader = open_trajectory(&path).unwrap();
            assert_eq!(reader.len(), 2, "{name}");
            let mut buffer = vec![Point3::origin(); 2];
            let mut count = 0;
            loop {
                match reader.next(&mut buffer) {
                    Ok(read_cell) => {
                        count += 1;
                        assert!((buffer[1] - frame[1]).norm() < 0.01, "{name}");
                        assert!((read_cell.unwrap()[8] - 10.0).abs() < 1e-4, "{name}");
                    }
                    Err(e) if e.is_last_frame() => break,
                    Err(e) => panic!("{name}: {e}"),
                }
            }
            assert_eq!(count, 2, "{name}");
            assert!(!reader.readable(), "{name}");
        }
    }

    #[test]
    fn xyz_files_open_as_memory_trajectories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("water.xyz");
        fs::write(
            &path,
            "2\nframe 1\nO 0.0 0.0 0.0\nH 0.9 0.0 0.0\n2\nframe 2\nO 0.1 0.0 0.0\nH 1.0 0.0 0.0\n",
        )
        .unwrap();

        let mut traj = open_trajectory(&path).unwrap();
        let mut buffer = vec![Point3::origin(); 2];
        traj.next(&mut buffer).unwrap();
        traj.next(&mut buffer).unwrap();
        assert_eq!(buffer[1].x, 1.0);
        assert!(traj.next(&mut buffer).unwrap_err().is_last_frame());
    }

    #[test]
    fn unknown_extensions_are_unsupported() {
        assert!(matches!(
            open_trajectory("model.pdb"),
            Err(TrajError::Unsupported { .. })
        ));
        assert!(matches!(
            create_writer("out.xyz", 3, WriterOptions::default()),
            Err(TrajError::Unsupported { .. })
        ));
    }
}
