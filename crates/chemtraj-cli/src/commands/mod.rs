pub mod convert;
pub mod info;
pub mod rdf;
pub mod rmsd;

use crate::error::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// CSV sink for result tables: the given file, or stdout.
pub(crate) fn table_writer(output: Option<&Path>) -> Result<csv::Writer<Box<dyn Write>>> {
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stdout().lock()),
    };
    Ok(csv::Writer::from_writer(sink))
}
