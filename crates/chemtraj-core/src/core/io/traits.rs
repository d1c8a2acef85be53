use crate::core::models::molecule::Molecule;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Whole-file structure formats that load into a [`Molecule`].
///
/// A reader returns atoms, every coordinate frame and per-frame B-factors in
/// one pass, plus whatever format-specific `Metadata` the file carries. For
/// streaming large coordinate files use the codecs in [`crate::traj`] instead.
pub trait MolecularFile {
    type Metadata;
    type Error: Error + From<io::Error>;

    fn read_from(reader: &mut impl BufRead) -> Result<(Molecule, Self::Metadata), Self::Error>;

    /// Writes every frame of `molecule`, using `metadata` where the format has a slot for it.
    fn write_to(
        molecule: &Molecule,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error>;

    /// Writes `molecule` with metadata synthesized by the format.
    fn write_molecule_to(molecule: &Molecule, writer: &mut impl Write) -> Result<(), Self::Error>;

    fn read_from_path(path: impl AsRef<Path>) -> Result<(Molecule, Self::Metadata), Self::Error> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_from(&mut reader)
    }

    fn write_to_path(
        molecule: &Molecule,
        metadata: &Self::Metadata,
        path: impl AsRef<Path>,
    ) -> Result<(), Self::Error> {
        with_file_writer(path, |writer| Self::write_to(molecule, metadata, writer))
    }

    fn write_molecule_to_path(molecule: &Molecule, path: impl AsRef<Path>) -> Result<(), Self::Error> {
        with_file_writer(path, |writer| Self::write_molecule_to(molecule, writer))
    }
}

fn with_file_writer<E: From<io::Error>>(
    path: impl AsRef<Path>,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<(), E>,
) -> Result<(), E> {
    let mut writer = BufWriter::new(File::create(path)?);
    write(&mut writer)?;
    writer.flush()?;
    Ok(())
}
