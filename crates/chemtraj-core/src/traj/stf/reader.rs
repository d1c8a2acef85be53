use super::compression::{self, Compression, StfInput};
use super::header::{HEADER_END, StfHeader};
use crate::core::models::{Frame, UnitCell};
use crate::traj::dispatch::{self, FrameSource};
use crate::traj::error::{Location, TrajError};
use crate::traj::traits::{FrameBatch, Trajectory};
use nalgebra::Point3;
use std::fs::File;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Streaming reader for STF/CTF trajectories.
pub struct StfReader {
    input: Option<StfInput>,
    file: Arc<str>,
    header: StfHeader,
    compression: Compression,
    line_num: usize,
    frames_read: usize,
}

/// One frame's integer coordinates and box trailer, checked but not yet scaled.
pub(crate) struct RawStfFrame {
    encoded: Vec<[i64; 3]>,
    trailer: String,
    frame: usize,
    scale: f64,
    file: Arc<str>,
}

impl StfReader {
    /// Opens `path`, choosing the decompressor from its extension, and parses the header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrajError> {
        let path = path.as_ref();
        Self::open_with(path, Compression::from_path(path))
    }

    pub fn open_with(path: &Path, compression: Compression) -> Result<Self, TrajError> {
        let file = File::open(path).map_err(|e| TrajError::resource(path, e))?;
        let name: Arc<str> = Arc::from(path.display().to_string());
        let mut input = compression::open_decoder(compression, file, &name)?;
        let mut line_num = 0;
        let header = StfHeader::read(&mut input, compression, &name, &mut line_num)?;
        debug!(
            file = %name,
            natoms = header.natoms,
            precision = header.precision,
            %compression,
            "Opened STF trajectory"
        );
        Ok(Self {
            input: Some(input),
            file: name,
            header,
            compression,
            line_num,
            frames_read: 0,
        })
    }

    pub fn header(&self) -> &StfHeader {
        &self.header
    }

    pub fn precision(&self) -> u32 {
        self.header.precision
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Frames consumed from the stream so far.
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    fn format_error(&self, message: impl Into<String>) -> TrajError {
        TrajError::format(&self.file, Location::Line(self.line_num), message)
    }

    // Atom lines are checked here, on the stream side, so a malformed frame
    // closes the reader on every read path.
    fn parse_atom(&self, line: &str) -> Result<[i64; 3], TrajError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [x, y, z] = fields.as_slice() else {
            return Err(self.format_error(format!(
                "expected 3 integers, found {} fields",
                fields.len()
            )));
        };
        let mut xyz = [0; 3];
        for (value, field) in xyz.iter_mut().zip([x, y, z]) {
            *value = field.parse().map_err(|_| {
                self.format_error(format!("'{field}' is not an integer coordinate"))
            })?;
        }
        Ok(xyz)
    }

    // Reads one line into `buf`, returning the number of bytes read (0 at EOF).
    fn read_line(&mut self, buf: &mut String) -> Result<usize, TrajError> {
        let input = self.input.as_mut().ok_or(TrajError::NotReadable)?;
        let read = input.read_line(buf).map_err(|e| {
            compression::stream_error(
                self.compression,
                &self.file,
                Location::Line(self.line_num + 1),
                e,
            )
        })?;
        if read > 0 {
            self.line_num += 1;
        }
        Ok(read)
    }
}

impl FrameSource for StfReader {
    type Raw = RawStfFrame;

    fn read_raw(&mut self) -> Result<RawStfFrame, TrajError> {
        let natoms = self.header.natoms;
        let frame = self.frames_read + 1;
        let mut encoded = Vec::new();
        let mut line = String::new();

        for i in 0..natoms {
            line.clear();
            if self.read_line(&mut line)? == 0 {
                return Err(if i == 0 {
                    TrajError::LastFrame
                } else {
                    self.format_error(format!(
                        "file ends inside frame {frame} after {i} of {natoms} atoms"
                    ))
                });
            }
            if line.starts_with(HEADER_END) {
                return Err(self.format_error("reserved '**' sequence after the header"));
            }
            if line.starts_with('*') {
                return Err(self.format_error(format!(
                    "frame {frame} ends after {i} of {natoms} atoms"
                )));
            }
            encoded.push(self.parse_atom(&line)?);
        }

        let mut trailer = String::new();
        if self.read_line(&mut trailer)? == 0 {
            return Err(if natoms == 0 {
                TrajError::LastFrame
            } else {
                self.format_error(format!("frame {frame} is missing its '*' terminator"))
            });
        }
        if trailer.contains(HEADER_END) {
            return Err(self.format_error("reserved '**' sequence after the header"));
        }
        let Some(cell) = trailer.strip_prefix('*') else {
            return Err(self.format_error(format!(
                "expected '*' after {natoms} atom lines, found '{}'",
                trailer.trim_end()
            )));
        };
        let trailer = cell.trim().to_string();

        self.frames_read = frame;
        Ok(RawStfFrame {
            encoded,
            trailer,
            frame,
            scale: self.header.scale(),
            file: Arc::clone(&self.file),
        })
    }

    fn decode(raw: RawStfFrame, out: &mut [Point3<f64>]) -> Result<Option<UnitCell>, TrajError> {
        for (position, xyz) in out.iter_mut().zip(&raw.encoded) {
            *position = Point3::new(
                xyz[0] as f64 / raw.scale,
                xyz[1] as f64 / raw.scale,
                xyz[2] as f64 / raw.scale,
            );
        }
        Ok(raw.cell())
    }
}

impl RawStfFrame {
    // An empty trailer means the cell is unknown. A malformed one is logged and
    // zeroed so the frame's coordinates stay usable.
    fn cell(&self) -> Option<UnitCell> {
        if self.trailer.is_empty() {
            return None;
        }
        let parsed: Option<Vec<f64>> = self
            .trailer
            .split_whitespace()
            .map(|v| v.parse().ok())
            .collect();
        match parsed.and_then(|values| <UnitCell>::try_from(values.as_slice()).ok()) {
            Some(cell) => Some(cell),
            None => {
                warn!(
                    file = %self.file,
                    frame = self.frame,
                    trailer = %self.trailer,
                    "Malformed box vectors, using a zeroed cell"
                );
                Some([0.0; 9])
            }
        }
    }
}

impl Trajectory for StfReader {
    fn readable(&self) -> bool {
        self.input.is_some()
    }

    fn len(&self) -> usize {
        self.header.natoms
    }

    fn next(&mut self, frame: &mut [Point3<f64>]) -> Result<Option<UnitCell>, TrajError> {
        dispatch::next_frame(self, frame)
    }

    fn skip(&mut self) -> Result<(), TrajError> {
        dispatch::skip_frame(self)
    }

    fn next_conc(
        &mut self,
        buffers: Vec<Option<Frame>>,
        token: &CancellationToken,
    ) -> Result<FrameBatch, TrajError> {
        dispatch::next_conc(self, buffers, token)
    }

    fn close(&mut self) {
        if self.input.take().is_some() {
            debug!(file = %self.file, frames = self.frames_read, "Closed STF trajectory");
        }
    }
}
