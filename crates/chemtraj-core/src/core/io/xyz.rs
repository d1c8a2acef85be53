use crate::core::io::traits::MolecularFile;
use crate::core::models::Frame;
use crate::core::models::atom::Atom;
use crate::core::models::molecule::{Molecule, MoleculeError};
use crate::core::models::topology::{Atomer, Topology};
use nalgebra::Point3;
use std::io::{self, BufRead, Write};
use thiserror::Error;

/// Per-frame comment lines of an XYZ file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XyzMetadata {
    pub comments: Vec<String>,
}

#[derive(Debug, Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: XyzParseErrorKind },
    #[error("Inconsistent data: {0}")]
    Inconsistency(String),
    #[error(transparent)]
    Molecule(#[from] MoleculeError),
}

#[derive(Debug, Error)]
pub enum XyzParseErrorKind {
    #[error("Invalid atom count '{0}'")]
    InvalidAtomCount(String),
    #[error("Invalid coordinate in column {column} (value: '{value}')")]
    InvalidFloat { column: usize, value: String },
    #[error("Atom line needs a symbol and three coordinates, found {0} fields")]
    TooFewFields(usize),
    #[error("File ends in the middle of a frame")]
    UnexpectedEof,
}

pub struct XyzFile;

fn next_line(
    lines: &mut impl Iterator<Item = io::Result<String>>,
    line_num: &mut usize,
) -> Result<Option<String>, XyzError> {
    match lines.next() {
        Some(line) => {
            *line_num += 1;
            Ok(Some(line?))
        }
        None => Ok(None),
    }
}

fn parse_atom_line(line: &str, line_num: usize) -> Result<(&str, Point3<f64>), XyzError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(XyzError::Parse {
            line: line_num,
            kind: XyzParseErrorKind::TooFewFields(fields.len()),
        });
    }
    let mut xyz = [0.0; 3];
    for (k, value) in xyz.iter_mut().enumerate() {
        *value = fields[k + 1].parse().map_err(|_| XyzError::Parse {
            line: line_num,
            kind: XyzParseErrorKind::InvalidFloat {
                column: k + 2,
                value: fields[k + 1].to_string(),
            },
        })?;
    }
    Ok((fields[0], Point3::from(xyz)))
}

impl MolecularFile for XyzFile {
    type Metadata = XyzMetadata;
    type Error = XyzError;

    fn read_from(reader: &mut impl BufRead) -> Result<(Molecule, Self::Metadata), Self::Error> {
        let mut lines = reader.lines();
        let mut line_num = 0;
        let mut metadata = XyzMetadata::default();
        let mut topology: Option<Topology> = None;
        let mut frames: Vec<Frame> = Vec::new();

        while let Some(count_line) = next_line(&mut lines, &mut line_num)? {
            let count_str = count_line.trim();
            if count_str.is_empty() {
                continue;
            }
            let natoms: usize = count_str.parse().map_err(|_| XyzError::Parse {
                line: line_num,
                kind: XyzParseErrorKind::InvalidAtomCount(count_str.to_string()),
            })?;

            let comment = next_line(&mut lines, &mut line_num)?.ok_or(XyzError::Parse {
                line: line_num,
                kind: XyzParseErrorKind::UnexpectedEof,
            })?;
            metadata.comments.push(comment);

            let known = topology.as_ref().map(Topology::len);
            if let Some(expected) = known.filter(|expected| *expected != natoms) {
                return Err(XyzError::Inconsistency(format!(
                    "frame {} has {natoms} atoms, first frame has {expected}",
                    frames.len() + 1
                )));
            }

            // The count line is untrusted until the first frame has been read.
            let mut frame = Vec::with_capacity(known.unwrap_or(0));
            let mut atoms = Vec::new();
            for i in 0..natoms {
                let line = next_line(&mut lines, &mut line_num)?.ok_or(XyzError::Parse {
                    line: line_num,
                    kind: XyzParseErrorKind::UnexpectedEof,
                })?;
                let (label, position) = parse_atom_line(&line, line_num)?;
                frame.push(position);
                if topology.is_none() {
                    let symbol = label.trim_end_matches(|c: char| c.is_ascii_digit());
                    atoms.push(Atom::new(label, symbol).with_id(i + 1));
                }
            }

            if topology.is_none() {
                topology = Some(Topology::from_atoms(atoms));
            }
            frames.push(frame);
        }

        let molecule = Molecule::new(topology.unwrap_or_default(), frames, Vec::new())?;
        Ok((molecule, metadata))
    }

    fn write_to(
        molecule: &Molecule,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        let atoms = molecule.atoms();
        for (index, frame) in molecule.frames().iter().enumerate() {
            if frame.len() != atoms.len() {
                return Err(XyzError::Inconsistency(format!(
                    "frame {index} has {} positions for {} atoms",
                    frame.len(),
                    atoms.len()
                )));
            }
            writeln!(writer, "{}", atoms.len())?;
            let comment = metadata.comments.get(index).map(String::as_str).unwrap_or("");
            writeln!(writer, "{}", comment.replace('\n', " "))?;
            for (atom, p) in atoms.iter().zip(frame) {
                writeln!(
                    writer,
                    "{:<3} {:>14.6} {:>14.6} {:>14.6}",
                    atom.symbol, p.x, p.y, p.z
                )?;
            }
        }
        Ok(())
    }

    fn write_molecule_to(molecule: &Molecule, writer: &mut impl Write) -> Result<(), Self::Error> {
        let comments = (0..molecule.frame_count())
            .map(|i| format!("frame {}", i + 1))
            .collect();
        Self::write_to(molecule, &XyzMetadata { comments }, writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    const WATER_TWO_FRAMES: &str = "\
3
first
O 0.000 0.000 0.000
H 0.957 0.000 0.000
H -0.240 0.927 0.000
3
second
O 0.010 0.000 0.000
H 0.967 0.000 0.000
H -0.230 0.927 0.000
";

    #[test]
    fn reads_multi_frame_file() {
        let (molecule, metadata) =
            XyzFile::read_from(&mut Cursor::new(WATER_TWO_FRAMES)).unwrap();
        assert_eq!(molecule.atom_count(), 3);
        assert_eq!(molecule.frame_count(), 2);
        assert_eq!(metadata.comments, vec!["first", "second"]);
        assert_eq!(molecule.symbols(), vec!["O", "H", "H"]);
        assert!((molecule.frames()[1][0].x - 0.010).abs() < 1e-12);
        assert_eq!(molecule.bfactors().len(), 2);
    }

    #[test]
    fn rejects_bad_coordinate() {
        let input = "1\n\nC 1.0 x 0.0\n";
        let err = XyzFile::read_from(&mut Cursor::new(input)).unwrap_err();
        assert!(matches!(
            err,
            XyzError::Parse {
                line: 3,
                kind: XyzParseErrorKind::InvalidFloat { column: 3, .. }
            }
        ));
    }

    #[test]
    fn rejects_truncated_frame() {
        let input = "2\ncomment\nC 0 0 0\n";
        let err = XyzFile::read_from(&mut Cursor::new(input)).unwrap_err();
        assert!(matches!(
            err,
            XyzError::Parse {
                kind: XyzParseErrorKind::UnexpectedEof,
                ..
            }
        ));
    }

    #[test]
    fn huge_atom_count_is_a_truncated_frame() {
        let input = "18446744073709551615\ncomment\nC 0 0 0\n";
        let err = XyzFile::read_from(&mut Cursor::new(input)).unwrap_err();
        assert!(matches!(
            err,
            XyzError::Parse {
                line: 3,
                kind: XyzParseErrorKind::UnexpectedEof,
            }
        ));
    }

    #[test]
    fn rejects_changing_atom_count() {
        let input = "1\n\nC 0 0 0\n2\n\nC 0 0 0\nC 1 0 0\n";
        let err = XyzFile::read_from(&mut Cursor::new(input)).unwrap_err();
        assert!(matches!(err, XyzError::Inconsistency(_)));
    }

    #[test]
    fn write_then_read_through_a_file() {
        let (molecule, metadata) =
            XyzFile::read_from(&mut Cursor::new(WATER_TWO_FRAMES)).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("water.xyz");

        XyzFile::write_to_path(&molecule, &metadata, &path).unwrap();
        let (back, back_meta) = XyzFile::read_from_path(&path).unwrap();

        assert_eq!(back_meta, metadata);
        assert_eq!(back.frame_count(), 2);
        for (a, b) in back.frames().iter().zip(molecule.frames()) {
            for (p, q) in a.iter().zip(b) {
                assert!((p - q).norm() < 1e-6);
            }
        }
    }

    #[test]
    fn synthesized_comments_number_the_frames() {
        let (molecule, _) = XyzFile::read_from(&mut Cursor::new(WATER_TWO_FRAMES)).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("numbered.xyz");

        XyzFile::write_molecule_to_path(&molecule, &path).unwrap();
        let (_, metadata) = XyzFile::read_from_path(&path).unwrap();

        assert_eq!(metadata.comments, vec!["frame 1", "frame 2"]);
    }
}
