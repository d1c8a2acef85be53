use crate::cli::ConvertArgs;
use crate::config::{ConvertSettings, FileConvertConfig, convert_settings};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use chemtraj::analysis::{Progress, ProgressReporter};
use chemtraj::core::io::traits::MolecularFile;
use chemtraj::core::io::xyz::XyzFile;
use chemtraj::core::models::topology::Topology;
use chemtraj::traj::open::TrajectoryFormat;
use chemtraj::traj::{Trajectory, TrajectoryWriter, WriterOptions, create_writer, open_trajectory};
use nalgebra::Point3;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Opens the input; XYZ inputs also yield their topology so STF output can
/// embed it.
fn open_input(path: &Path) -> Result<(Box<dyn Trajectory>, Option<Topology>)> {
    if TrajectoryFormat::from_path(path) == Some(TrajectoryFormat::Xyz) {
        let (molecule, _) = XyzFile::read_from_path(path).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        let topology = molecule.topology().clone();
        return Ok((Box::new(molecule.into_trajectory()), Some(topology)));
    }
    Ok((open_trajectory(path)?, None))
}

/// Streams every frame of `input` into `output`. Returns the number of frames
/// written.
pub fn convert(
    input: &Path,
    output: &Path,
    settings: &ConvertSettings,
    token: &CancellationToken,
    reporter: &ProgressReporter,
) -> Result<usize> {
    let (mut reader, topology) = open_input(input)?;
    let natoms = reader.len();

    // The first frame decides whether the output carries unit cells.
    let mut first = vec![Point3::origin(); natoms];
    let first_cell = match reader.next_cancellable(&mut first, token) {
        Ok(cell) => cell,
        Err(e) if e.is_last_frame() => {
            return Err(CliError::Argument(format!(
                "Input trajectory '{}' contains no frames.",
                input.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let options = WriterOptions {
        title: settings.title.clone(),
        timestep: settings.timestep,
        unit_cell: first_cell.is_some(),
        precision: Some(settings.precision),
        topology,
    };
    let mut writer = create_writer(output, natoms, options)?;
    debug!(natoms, unit_cell = first_cell.is_some(), "Created output trajectory");

    reporter.report(Progress::Started {
        task: "Converting",
        total: None,
    });
    writer.write_next(&first, first_cell.as_ref())?;
    reporter.report(Progress::Frames(1));

    loop {
        let buffers = vec![Some(vec![Point3::origin(); natoms]); settings.batch_size];
        let batch = reader.next_conc(buffers, token)?;
        let (frames, stopped) = batch.wait_all()?;
        let before = writer.frames_written();
        for frame in frames.into_iter().flatten() {
            writer.write_next(&frame.coords, frame.cell.as_ref())?;
        }
        let written = writer.frames_written() - before;
        if written > 0 {
            reporter.report(Progress::Frames(written as u64));
        }
        match stopped {
            None => continue,
            Some(e) if e.is_last_frame() => break,
            Some(e) => return Err(e.into()),
        }
    }

    writer.close()?;
    reader.close();
    let total = writer.frames_written();
    reporter.report(Progress::Finished {
        frames: total as u64,
    });
    Ok(total)
}

pub fn run(args: ConvertArgs, file_config: FileConvertConfig) -> Result<()> {
    let settings = convert_settings(&args, file_config)?;
    info!(
        "Converting {:?} to {:?} (batch size {})",
        &args.input, &args.output, settings.batch_size
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let frames = convert(
        &args.input,
        &args.output,
        &settings,
        &CancellationToken::new(),
        &reporter,
    )?;

    println!("Wrote {} frame(s) to {}", frames, args.output.display());
    Ok(())
}
