//! CHARMM/NAMD DCD trajectories.
//!
//! A DCD file is a sequence of Fortran unformatted records, each bracketed by
//! its byte length: an 84-byte control block starting with `CORD`, a title
//! record, an atom-count record, then per frame an optional unit-cell record
//! followed by X, Y and Z `f32` records (and a fourth block in 4D files).
//! Only little-endian files are accepted.

use super::dispatch::{self, FrameSource};
use super::error::{Location, TrajError};
use super::traits::{FrameBatch, Trajectory, TrajectoryWriter};
use crate::core::models::{Frame, UnitCell};
use nalgebra::{Point3, Vector3};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const MAGIC: &[u8; 4] = b"CORD";
const CONTROL_LEN: u32 = 84;
const TITLE_WIDTH: usize = 80;
const CHARMM_CELL_LEN: usize = 48;
/// Byte offset of NSET: the leading record length plus the magic.
const NSET_OFFSET: u64 = 8;
/// CHARMM version written into new files.
const CHARMM_VERSION: i32 = 24;

// Indices into the 20-integer control block that follows the magic.
const NSET: usize = 0;
const ISTART: usize = 1;
const NSAVC: usize = 2;
const NAMNF: usize = 8;
const DELTA: usize = 9;
const EXTRA_BLOCK: usize = 10;
const FOUR_DIMS: usize = 11;
const VERSION: usize = 19;

/// Metadata parsed from the DCD control, title and atom-count records.
#[derive(Debug, Clone, PartialEq)]
pub struct DcdHeader {
    /// Frame count stored in the header (NSET). May be stale for files that were
    /// not closed cleanly.
    pub frame_count: usize,
    pub start_step: i32,
    /// Integration steps between saved frames (NSAVC).
    pub save_interval: i32,
    /// Integration timestep (DELTA), in the program's native time unit.
    pub timestep: f32,
    pub natoms: usize,
    /// Title lines joined with newlines, trailing padding removed.
    pub title: String,
    /// `None` for X-PLOR files.
    pub charmm_version: Option<i32>,
    pub has_unit_cell: bool,
    pub has_four_dims: bool,
}

/// Buffered input that tracks its byte offset for error reporting.
struct RecordInput {
    inner: BufReader<File>,
    file: Arc<str>,
    offset: u64,
}

impl RecordInput {
    fn error(&self, message: impl Into<String>) -> TrajError {
        TrajError::format(&self.file, Location::Byte(self.offset), message)
    }

    // Reads until `buf` is full or the stream ends; returns the bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, TrajError> {
        let mut read = 0;
        while read < buf.len() {
            match self.inner.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.offset += read as u64;
        Ok(read)
    }

    fn read_exact(&mut self, buf: &mut [u8], what: &str) -> Result<(), TrajError> {
        let read = self.fill(buf)?;
        if read < buf.len() {
            return Err(self.error(format!(
                "truncated {what}: {read} of {} bytes present",
                buf.len()
            )));
        }
        Ok(())
    }

    fn read_u32(&mut self, what: &str) -> Result<u32, TrajError> {
        let mut bytes = [0; 4];
        self.read_exact(&mut bytes, what)?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Reads a record length, or `None` on a clean end of stream.
    fn read_marker(&mut self) -> Result<Option<u32>, TrajError> {
        let mut bytes = [0; 4];
        match self.fill(&mut bytes)? {
            0 => Ok(None),
            4 => Ok(Some(u32::from_le_bytes(bytes))),
            n => Err(self.error(format!("truncated frame: {n} of 4 record-length bytes"))),
        }
    }

    /// Appends a record body of `len` bytes to `out` and checks its trailing length.
    ///
    /// The buffer grows with the bytes actually present, so a corrupt length
    /// cannot force a large allocation.
    fn read_body(&mut self, len: u32, out: &mut Vec<u8>, what: &str) -> Result<(), TrajError> {
        let read = (&mut self.inner).take(u64::from(len)).read_to_end(out)?;
        self.offset += read as u64;
        if read < len as usize {
            return Err(self.error(format!(
                "truncated {what}: {read} of {len} bytes present"
            )));
        }
        let trailer_at = self.offset;
        let trailer = self.read_u32(what)?;
        if trailer != len {
            return Err(TrajError::format(
                &self.file,
                Location::Byte(trailer_at),
                format!("{what} record ends with length {trailer}, expected {len}"),
            ));
        }
        Ok(())
    }

    fn read_record(&mut self, what: &str) -> Result<Vec<u8>, TrajError> {
        let len = self.read_u32(what)?;
        let mut body = Vec::new();
        self.read_body(len, &mut body, what)?;
        Ok(body)
    }
}

fn i32_at(bytes: &[u8], index: usize) -> i32 {
    let b = &bytes[4 * index..4 * index + 4];
    i32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn f32_at(bytes: &[u8], index: usize) -> f32 {
    let b = &bytes[4 * index..4 * index + 4];
    f32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn f64_at(bytes: &[u8], index: usize) -> f64 {
    let b = &bytes[8 * index..8 * index + 8];
    f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

/// Byte length of one coordinate block, if it fits a record.
fn block_len(natoms: usize) -> Option<u32> {
    u32::try_from(natoms).ok()?.checked_mul(4)
}

/// Parses the header records and returns them with the coordinate block length.
fn parse_header(input: &mut RecordInput) -> Result<(DcdHeader, u32), TrajError> {
    let mut lead = [0; 4];
    input.read_exact(&mut lead, "control block")?;
    if u32::from_le_bytes(lead) != CONTROL_LEN {
        let message = if u32::from_be_bytes(lead) == CONTROL_LEN {
            "big-endian DCD files are not supported".to_string()
        } else {
            format!(
                "leading record length is {}, expected {CONTROL_LEN}; wrong endianness or not a DCD file",
                u32::from_le_bytes(lead)
            )
        };
        return Err(TrajError::format(&input.file, Location::Header, message));
    }

    let mut control = Vec::new();
    input.read_body(CONTROL_LEN, &mut control, "control block")?;
    if &control[..4] != MAGIC {
        return Err(TrajError::format(
            &input.file,
            Location::Header,
            "missing 'CORD' magic",
        ));
    }
    let icntrl = &control[4..];

    let fixed = i32_at(icntrl, NAMNF);
    if fixed != 0 {
        return Err(TrajError::Unsupported {
            file: input.file.to_string(),
            feature: format!("{fixed} fixed atoms"),
        });
    }
    let charmm_version = Some(i32_at(icntrl, VERSION)).filter(|v| *v != 0);
    let charmm = charmm_version.is_some();

    let title_record = input.read_record("title")?;
    if title_record.len() < 4 {
        return Err(input.error("title record is shorter than its line count"));
    }
    let lines = i32_at(&title_record, 0).max(0) as usize;
    if title_record.len() != 4 + TITLE_WIDTH * lines {
        return Err(input.error(format!(
            "title record holds {} bytes, expected {} for {lines} lines",
            title_record.len(),
            4 + TITLE_WIDTH * lines
        )));
    }
    let title = title_record[4..]
        .chunks(TITLE_WIDTH)
        .map(|line| {
            String::from_utf8_lossy(line)
                .trim_end_matches([' ', '\0'])
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n");

    let natoms_record = input.read_record("atom count")?;
    if natoms_record.len() != 4 {
        return Err(input.error(format!(
            "atom count record holds {} bytes, expected 4",
            natoms_record.len()
        )));
    }
    let natoms = usize::try_from(i32_at(&natoms_record, 0))
        .map_err(|_| input.error("negative atom count"))?;
    let block = block_len(natoms).ok_or_else(|| {
        TrajError::format(
            &input.file,
            Location::Header,
            format!("atom count {natoms} does not fit a DCD coordinate record"),
        )
    })?;

    let header = DcdHeader {
        frame_count: i32_at(icntrl, NSET).max(0) as usize,
        start_step: i32_at(icntrl, ISTART),
        save_interval: i32_at(icntrl, NSAVC),
        timestep: f32_at(icntrl, DELTA),
        natoms,
        title,
        charmm_version,
        has_unit_cell: charmm && i32_at(icntrl, EXTRA_BLOCK) != 0,
        has_four_dims: charmm && i32_at(icntrl, FOUR_DIMS) != 0,
    };
    Ok((header, block))
}

/// Converts a CHARMM cell record `[A, γ, B, β, α, C]` into box vectors.
///
/// Newer CHARMM and NAMD store the angles as cosines, older files as degrees;
/// values inside `[-1, 1]` are taken as cosines.
fn charmm_to_cell(values: [f64; 6]) -> Option<UnitCell> {
    let [a, gamma, b, beta, alpha, c] = values;
    let as_cos = |angle: f64| {
        if (-1.0..=1.0).contains(&angle) {
            angle
        } else {
            angle.to_radians().cos()
        }
    };
    let (cos_a, cos_b, cos_g) = if [alpha, beta, gamma].iter().all(|v| v.abs() <= 1.0) {
        (alpha, beta, gamma)
    } else {
        (as_cos(alpha), as_cos(beta), as_cos(gamma))
    };

    let sin_g = (1.0 - cos_g * cos_g).sqrt();
    if sin_g < 1e-12 {
        return None;
    }
    let cy = c * (cos_a - cos_b * cos_g) / sin_g;
    let cz_sq = c * c - (c * cos_b).powi(2) - cy * cy;
    Some([
        a,
        0.0,
        0.0,
        b * cos_g,
        b * sin_g,
        0.0,
        c * cos_b,
        cy,
        cz_sq.max(0.0).sqrt(),
    ])
}

/// Converts box vectors into a CHARMM cell record with cosine angles.
fn cell_to_charmm(cell: &UnitCell) -> [f64; 6] {
    let a = Vector3::new(cell[0], cell[1], cell[2]);
    let b = Vector3::new(cell[3], cell[4], cell[5]);
    let c = Vector3::new(cell[6], cell[7], cell[8]);
    let cos = |u: &Vector3<f64>, v: &Vector3<f64>| {
        let denom = u.norm() * v.norm();
        if denom > 0.0 { u.dot(v) / denom } else { 0.0 }
    };
    [a.norm(), cos(&a, &b), b.norm(), cos(&a, &c), cos(&b, &c), c.norm()]
}

/// Streaming DCD reader.
pub struct DcdReader {
    input: Option<RecordInput>,
    file: Arc<str>,
    header: DcdHeader,
    block: u32,
    frames_read: usize,
}

/// One frame's records, validated but not yet converted.
pub(crate) struct RawDcdFrame {
    /// X, Y then Z blocks, little-endian `f32`.
    coords: Vec<u8>,
    cell: Option<Vec<u8>>,
    frame: usize,
    file: Arc<str>,
}

impl DcdReader {
    /// Opens `path` and parses the header records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrajError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| TrajError::resource(path, e))?;
        let name: Arc<str> = Arc::from(path.display().to_string());
        let mut input = RecordInput {
            inner: BufReader::new(file),
            file: Arc::clone(&name),
            offset: 0,
        };
        let (header, block) = parse_header(&mut input)?;
        debug!(
            file = %name,
            natoms = header.natoms,
            frames = header.frame_count,
            charmm = ?header.charmm_version,
            unit_cell = header.has_unit_cell,
            "Opened DCD trajectory"
        );
        Ok(Self {
            input: Some(input),
            file: name,
            header,
            block,
            frames_read: 0,
        })
    }

    pub fn header(&self) -> &DcdHeader {
        &self.header
    }

    /// Frame count recorded in the header.
    pub fn frame_count(&self) -> usize {
        self.header.frame_count
    }

    pub fn timestep(&self) -> f32 {
        self.header.timestep
    }

    pub fn title(&self) -> &str {
        &self.header.title
    }

    pub fn frames_read(&self) -> usize {
        self.frames_read
    }
}

impl FrameSource for DcdReader {
    type Raw = RawDcdFrame;

    fn read_raw(&mut self) -> Result<RawDcdFrame, TrajError> {
        let input = self.input.as_mut().ok_or(TrajError::NotReadable)?;
        let block = self.block;
        let frame = self.frames_read + 1;

        let Some(mut len) = input.read_marker()? else {
            return Err(TrajError::LastFrame);
        };

        let mut cell = None;
        if self.header.has_unit_cell || len != block {
            let mut bytes = Vec::new();
            input.read_body(len, &mut bytes, "unit cell")?;
            cell = Some(bytes);
            len = input.read_u32("X block")?;
        }

        let mut coords = Vec::new();
        for (axis, name) in ["X", "Y", "Z"].into_iter().enumerate() {
            if axis > 0 {
                len = input.read_u32(name)?;
            }
            if len != block {
                return Err(input.error(format!(
                    "{name} block of frame {frame} holds {len} bytes, expected {block}"
                )));
            }
            input.read_body(len, &mut coords, name)?;
        }

        if self.header.has_four_dims {
            let len = input.read_u32("4D block")?;
            input.read_body(len, &mut Vec::new(), "4D block")?;
        }

        self.frames_read = frame;
        Ok(RawDcdFrame {
            coords,
            cell,
            frame,
            file: Arc::clone(&self.file),
        })
    }

    fn decode(raw: RawDcdFrame, out: &mut [Point3<f64>]) -> Result<Option<UnitCell>, TrajError> {
        let natoms = out.len();
        for (i, position) in out.iter_mut().enumerate() {
            *position = Point3::new(
                f32_at(&raw.coords, i) as f64,
                f32_at(&raw.coords, natoms + i) as f64,
                f32_at(&raw.coords, 2 * natoms + i) as f64,
            );
        }
        Ok(raw.cell.as_deref().and_then(|bytes| raw.decode_cell(bytes)))
    }
}

impl RawDcdFrame {
    fn decode_cell(&self, bytes: &[u8]) -> Option<UnitCell> {
        if bytes.len() != CHARMM_CELL_LEN {
            debug!(
                file = %self.file,
                frame = self.frame,
                len = bytes.len(),
                "Ignoring non-CHARMM extra block"
            );
            return None;
        }
        let values = std::array::from_fn(|i| f64_at(bytes, i));
        match charmm_to_cell(values) {
            Some(cell) => Some(cell),
            None => {
                warn!(
                    file = %self.file,
                    frame = self.frame,
                    ?values,
                    "Degenerate unit cell, using a zeroed cell"
                );
                Some([0.0; 9])
            }
        }
    }
}

impl Trajectory for DcdReader {
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
            if self.frames_read != self.header.frame_count {
                debug!(
                    file = %self.file,
                    header = self.header.frame_count,
                    read = self.frames_read,
                    "DCD header frame count differs from frames read"
                );
            }
            debug!(file = %self.file, frames = self.frames_read, "Closed DCD trajectory");
        }
    }
}

/// Settings for a new DCD file.
#[derive(Debug, Clone, Default)]
pub struct DcdWriterOptions {
    title: Option<String>,
    timestep: f32,
    unit_cell: bool,
}

impl DcdWriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Title text; each line is padded or cut to 80 bytes.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn timestep(mut self, timestep: f32) -> Self {
        self.timestep = timestep;
        self
    }

    /// Writes a CHARMM unit-cell record before every frame. Frames written
    /// without a cell then get a zeroed record.
    pub fn unit_cell(mut self, enabled: bool) -> Self {
        self.unit_cell = enabled;
        self
    }
}

fn write_record(out: &mut impl Write, body: &[u8]) -> io::Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "DCD record exceeds 4 GiB"))?;
    out.write_all(&len.to_le_bytes())?;
    out.write_all(body)?;
    out.write_all(&len.to_le_bytes())
}

/// Streaming DCD writer. The header frame count is kept current after every frame.
pub struct DcdWriter {
    output: Option<BufWriter<File>>,
    file: String,
    natoms: usize,
    unit_cell: bool,
    frames_written: usize,
    block: Vec<u8>,
}

impl DcdWriter {
    pub fn create(
        path: impl AsRef<Path>,
        natoms: usize,
        options: DcdWriterOptions,
    ) -> Result<Self, TrajError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let natoms_i32 = i32::try_from(natoms).map_err(|_| TrajError::Unsupported {
            file: name.clone(),
            feature: format!("{natoms} atoms"),
        })?;

        let mut control = [0i32; 20];
        control[ISTART] = 0;
        control[NSAVC] = 1;
        control[DELTA] = i32::from_le_bytes(options.timestep.to_le_bytes());
        control[EXTRA_BLOCK] = i32::from(options.unit_cell);
        control[VERSION] = CHARMM_VERSION;
        let mut header = MAGIC.to_vec();
        for value in control {
            header.extend_from_slice(&value.to_le_bytes());
        }

        let text = options
            .title
            .unwrap_or_else(|| format!("Created by chemtraj  NATOMS={natoms}"));
        let lines: Vec<&str> = text.lines().collect();
        let lines = if lines.is_empty() { vec![""] } else { lines };
        let mut title = (lines.len() as i32).to_le_bytes().to_vec();
        for line in &lines {
            let mut padded = [b' '; TITLE_WIDTH];
            let bytes = line.as_bytes();
            let n = bytes.len().min(TITLE_WIDTH);
            padded[..n].copy_from_slice(&bytes[..n]);
            title.extend_from_slice(&padded);
        }

        let file = File::create(path).map_err(|e| TrajError::resource(path, e))?;
        let mut output = BufWriter::new(file);
        write_record(&mut output, &header)?;
        write_record(&mut output, &title)?;
        write_record(&mut output, &natoms_i32.to_le_bytes())?;

        debug!(file = %name, natoms, unit_cell = options.unit_cell, "Created DCD trajectory");
        Ok(Self {
            output: Some(output),
            file: name,
            natoms,
            unit_cell: options.unit_cell,
            frames_written: 0,
            block: Vec::with_capacity(4 * natoms),
        })
    }
}

impl TrajectoryWriter for DcdWriter {
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
        let output = self.output.as_mut().ok_or(TrajError::NotReadable)?;

        if self.unit_cell {
            let values = cell.map(cell_to_charmm).unwrap_or([0.0; 6]);
            let record: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            write_record(output, &record)?;
        }
        for axis in 0..3 {
            self.block.clear();
            for position in frame {
                self.block
                    .extend_from_slice(&(position[axis] as f32).to_le_bytes());
            }
            write_record(output, &self.block)?;
        }
        self.frames_written += 1;

        let count = i32::try_from(self.frames_written).unwrap_or(i32::MAX);
        output.seek(SeekFrom::Start(NSET_OFFSET))?;
        output.write_all(&count.to_le_bytes())?;
        output.seek(SeekFrom::End(0))?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TrajError> {
        if let Some(mut output) = self.output.take() {
            output.flush()?;
            debug!(file = %self.file, frames = self.frames_written, "Closed DCD trajectory");
        }
        Ok(())
    }
}

impl Drop for DcdWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(file = %self.file, error = %e, "Failed to flush DCD trajectory on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    // Header (92) + title with one line (92) + atom count (12).
    const FIRST_FRAME_OFFSET: usize = 196;
    const NATOMS_VALUE_OFFSET: usize = 188;

    fn random_frames(natoms: usize, nframes: usize) -> Vec<Frame> {
        let mut rng = rand::thread_rng();
        (0..nframes)
            .map(|_| {
                (0..natoms)
                    .map(|_| {
                        Point3::new(
                            rng.gen_range(-50.0..50.0),
                            rng.gen_range(-50.0..50.0),
                            rng.gen_range(-50.0..50.0),
                        )
                    })
                    .collect()
            })
            .collect()
    }

    fn write_file(
        natoms: usize,
        frames: &[Frame],
        cells: Option<&[UnitCell]>,
    ) -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("traj.dcd");
        let options = DcdWriterOptions::new()
            .title("test trajectory")
            .timestep(0.002)
            .unit_cell(cells.is_some());
        let mut writer = DcdWriter::create(&path, natoms, options).unwrap();
        for (i, frame) in frames.iter().enumerate() {
            writer
                .write_next(frame, cells.map(|cells| &cells[i]))
                .unwrap();
        }
        writer.close().unwrap();
        (dir, path)
    }

    fn read_all(reader: &mut DcdReader) -> Vec<(Frame, Option<UnitCell>)> {
        let mut out = Vec::new();
        let mut buffer = vec![Point3::origin(); reader.len()];
        loop {
            match reader.next(&mut buffer) {
                Ok(cell) => out.push((buffer.clone(), cell)),
                Err(e) if e.is_last_frame() => return out,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
    }

    fn as_f32(p: &Point3<f64>) -> Point3<f64> {
        p.map(|v| v as f32 as f64)
    }

    #[test]
    fn round_trip_preserves_frames_and_header_count() {
        let frames = random_frames(7, 5);
        let (_dir, path) = write_file(7, &frames, None);

        let mut reader = DcdReader::open(&path).unwrap();
        assert_eq!(reader.frame_count(), 5);
        assert_eq!(reader.len(), 7);
        assert_eq!(reader.title(), "test trajectory");
        assert_eq!(reader.timestep(), 0.002);
        assert_eq!(reader.header().charmm_version, Some(CHARMM_VERSION));

        let back = read_all(&mut reader);
        assert_eq!(back.len(), 5);
        for (original, (decoded, cell)) in frames.iter().zip(&back) {
            assert!(cell.is_none());
            for (p, q) in original.iter().zip(decoded) {
                assert_eq!(as_f32(p), *q);
            }
        }
        assert!(!reader.readable());
        assert!(matches!(
            reader.next(&mut vec![Point3::origin(); 7]),
            Err(TrajError::NotReadable)
        ));
    }

    #[test]
    fn unit_cells_round_trip() {
        let cubic = [20.0, 0.0, 0.0, 0.0, 20.0, 0.0, 0.0, 0.0, 20.0];
        let triclinic = charmm_to_cell([30.0, 0.5, 31.0, 0.1, -0.2, 32.0]).unwrap();
        let frames = random_frames(3, 2);
        let (_dir, path) = write_file(3, &frames, Some(&[cubic, triclinic]));

        let mut reader = DcdReader::open(&path).unwrap();
        assert!(reader.header().has_unit_cell);
        let back = read_all(&mut reader);
        for (expected, (_, cell)) in [cubic, triclinic].iter().zip(&back) {
            let cell = cell.unwrap();
            for k in 0..9 {
                assert!((cell[k] - expected[k]).abs() < 1e-9, "{cell:?} vs {expected:?}");
            }
        }
    }

    #[test]
    fn angles_in_degrees_are_recognized() {
        let cell = charmm_to_cell([10.0, 90.0, 12.0, 90.0, 90.0, 14.0]).unwrap();
        let expected = [10.0, 0.0, 0.0, 0.0, 12.0, 0.0, 0.0, 0.0, 14.0];
        for k in 0..9 {
            assert!((cell[k] - expected[k]).abs() < 1e-9);
        }
        assert!(charmm_to_cell([10.0, 1.0, 10.0, 0.0, 0.0, 10.0]).is_none());
    }

    #[test]
    fn corrupted_block_sentinel_is_a_format_error() {
        let natoms = 4;
        let (_dir, path) = write_file(natoms, &random_frames(natoms, 2), None);
        let mut bytes = fs::read(&path).unwrap();
        let trailer = FIRST_FRAME_OFFSET + 4 + 4 * natoms;
        bytes[trailer..trailer + 4].copy_from_slice(&99u32.to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        let mut reader = DcdReader::open(&path).unwrap();
        let err = reader.next(&mut vec![Point3::origin(); natoms]).unwrap_err();
        match err {
            TrajError::Format { location, .. } => {
                assert_eq!(location, Location::Byte(trailer as u64))
            }
            other => panic!("expected a format error, got {other}"),
        }
        assert!(!reader.readable());
    }

    #[test]
    fn corrupted_header_sentinel_fails_at_open() {
        let (_dir, path) = write_file(2, &random_frames(2, 1), None);
        let mut bytes = fs::read(&path).unwrap();
        bytes[88..92].copy_from_slice(&80u32.to_le_bytes());
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            DcdReader::open(&path),
            Err(TrajError::Format { .. })
        ));
    }

    #[test]
    fn fixed_atoms_are_unsupported() {
        let (_dir, path) = write_file(2, &random_frames(2, 1), None);
        let mut bytes = fs::read(&path).unwrap();
        let namnf = NSET_OFFSET as usize + 4 * NAMNF;
        bytes[namnf..namnf + 4].copy_from_slice(&1i32.to_le_bytes());
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            DcdReader::open(&path),
            Err(TrajError::Unsupported { .. })
        ));
    }

    #[test]
    fn big_endian_files_are_named_in_the_error() {
        let (_dir, path) = write_file(2, &random_frames(2, 1), None);
        let mut bytes = fs::read(&path).unwrap();
        bytes[..4].copy_from_slice(&84u32.to_be_bytes());
        fs::write(&path, &bytes).unwrap();
        let err = DcdReader::open(&path).err().unwrap();
        assert!(err.to_string().contains("big-endian"), "{err}");
    }

    #[test]
    fn truncated_frame_is_not_the_last_frame() {
        let natoms = 3;
        let (_dir, path) = write_file(natoms, &random_frames(natoms, 2), None);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

        let mut reader = DcdReader::open(&path).unwrap();
        let mut buffer = vec![Point3::origin(); natoms];
        reader.next(&mut buffer).unwrap();
        let err = reader.next(&mut buffer).unwrap_err();
        assert!(!err.is_last_frame());
        assert!(err.is_critical());
    }

    #[test]
    fn four_dimensional_block_is_skipped() {
        let natoms = 2;
        let frames = random_frames(natoms, 2);
        let (_dir, path) = write_file(natoms, &frames, None);
        let bytes = fs::read(&path).unwrap();

        // Flag the file as 4D and append a fourth block to every frame.
        let mut patched = bytes[..FIRST_FRAME_OFFSET].to_vec();
        let flag = NSET_OFFSET as usize + 4 * FOUR_DIMS;
        patched[flag..flag + 4].copy_from_slice(&1i32.to_le_bytes());
        let frame_len = 3 * (8 + 4 * natoms);
        for frame in bytes[FIRST_FRAME_OFFSET..].chunks(frame_len) {
            patched.extend_from_slice(frame);
            write_record(&mut patched, &[0u8; 8]).unwrap();
        }
        fs::write(&path, &patched).unwrap();

        let mut reader = DcdReader::open(&path).unwrap();
        assert!(reader.header().has_four_dims);
        let back = read_all(&mut reader);
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].0[1], as_f32(&frames[1][1]));
    }

    #[test]
    fn concurrent_reads_match_sequential_reads() {
        let natoms = 5;
        let frames = random_frames(natoms, 6);
        let (_dir, path) = write_file(natoms, &frames, None);

        let mut reader = DcdReader::open(&path).unwrap();
        let token = CancellationToken::new();
        let buffers = vec![Some(vec![Point3::origin(); natoms]); 4];
        let (first, stopped) = reader.next_conc(buffers, &token).unwrap().wait_all().unwrap();
        assert!(stopped.is_none());
        reader.skip().unwrap();
        let buffers = vec![Some(vec![Point3::origin(); natoms]); 4];
        let batch = reader.next_conc(buffers, &token).unwrap();
        assert!(batch.reached_last_frame());
        let (last, _) = batch.wait_all().unwrap();

        assert_eq!(first.len(), 4);
        assert_eq!(last.len(), 1);
        for (i, decoded) in first.iter().enumerate() {
            assert_eq!(decoded.as_ref().unwrap().coords[0], as_f32(&frames[i][0]));
        }
        assert_eq!(last[0].as_ref().unwrap().coords[4], as_f32(&frames[5][4]));
    }

    #[test]
    fn writer_checks_frame_size() {
        let dir = tempdir().unwrap();
        let mut writer =
            DcdWriter::create(dir.path().join("w.dcd"), 2, DcdWriterOptions::new()).unwrap();
        assert!(matches!(
            writer.write_next(&[Point3::origin()], None),
            Err(TrajError::Capacity { .. })
        ));
        assert_eq!(writer.frames_written(), 0);
    }

    #[test]
    fn oversized_atom_count_is_rejected_at_open() {
        let (_dir, path) = write_file(2, &random_frames(2, 1), None);
        let mut bytes = fs::read(&path).unwrap();
        let at = NATOMS_VALUE_OFFSET;
        bytes[at..at + 4].copy_from_slice(&(1i32 << 30).to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        match DcdReader::open(&path) {
            Err(TrajError::Format { location, message, .. }) => {
                assert_eq!(location, Location::Header);
                assert!(message.contains("1073741824"), "{message}");
            }
            Err(other) => panic!("expected a format error, got {other}"),
            Ok(_) => panic!("expected a format error"),
        }
    }

    #[test]
    fn huge_record_length_reports_truncation() {
        let natoms = 2;
        let (_dir, path) = write_file(natoms, &random_frames(natoms, 1), None);
        let mut bytes = fs::read(&path).unwrap();
        let at = FIRST_FRAME_OFFSET;
        bytes[at..at + 4].copy_from_slice(&0x7fff_fff0u32.to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        let mut reader = DcdReader::open(&path).unwrap();
        let err = reader.skip().unwrap_err();
        assert!(matches!(err, TrajError::Format { .. }), "{err}");
        assert!(!reader.readable());
    }

    #[test]
    fn cell_record_is_detected_by_size_without_the_header_flag() {
        let natoms = 3;
        let frames = random_frames(natoms, 2);
        let cells = [
            [20.0, 0.0, 0.0, 0.0, 21.0, 0.0, 0.0, 0.0, 22.0],
            [25.0, 0.0, 0.0, 0.0, 25.0, 0.0, 0.0, 0.0, 25.0],
        ];
        let (_dir, path) = write_file(natoms, &frames, Some(&cells));
        let mut bytes = fs::read(&path).unwrap();
        let flag = NSET_OFFSET as usize + 4 * EXTRA_BLOCK;
        bytes[flag..flag + 4].copy_from_slice(&0i32.to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        let mut reader = DcdReader::open(&path).unwrap();
        assert!(!reader.header().has_unit_cell);
        let back = read_all(&mut reader);
        assert_eq!(back.len(), 2);
        for ((frame, (decoded, cell)), expected) in frames.iter().zip(&back).zip(&cells) {
            let cell = cell.unwrap();
            for k in 0..9 {
                assert!((cell[k] - expected[k]).abs() < 1e-9);
            }
            assert_eq!(decoded[2], as_f32(&frame[2]));
        }
    }
}
