use super::table_writer;
use crate::cli::RmsdArgs;
use crate::config::{FileRmsdConfig, rmsd_superpose};
use crate::error::{CliError, Result};
use crate::utils::parser::parse_selection;
use crate::utils::progress::CliProgressHandler;
use chemtraj::analysis::config::{RmsdConfig, RmsdConfigBuilder};
use chemtraj::analysis::{AnalysisError, ProgressReporter, rmsd};
use chemtraj::core::models::Frame;
use chemtraj::traj::open_trajectory;
use nalgebra::Point3;
use serde::Serialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Serialize)]
struct RmsdRow {
    frame: usize,
    rmsd: f64,
}

/// First frame of the trajectory at `path`.
pub fn load_reference(path: &Path) -> Result<Frame> {
    let mut trajectory = open_trajectory(path)?;
    let mut frame = vec![Point3::origin(); trajectory.len()];
    match trajectory.next(&mut frame) {
        Ok(_) => {
            trajectory.close();
            Ok(frame)
        }
        Err(e) if e.is_last_frame() => Err(CliError::Argument(format!(
            "Reference '{}' contains no frames.",
            path.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

fn build_config(args: &RmsdArgs, file_config: &FileRmsdConfig) -> Result<RmsdConfig> {
    let reference = load_reference(args.reference.as_deref().unwrap_or(&args.input))?;
    let mut builder = RmsdConfigBuilder::new()
        .reference(reference)
        .superpose(rmsd_superpose(args, file_config));
    if let Some(selection) = &args.selection {
        let indices = parse_selection(selection).map_err(|e| CliError::Argument(e.to_string()))?;
        builder = builder.selection(indices);
    }
    Ok(builder.build().map_err(AnalysisError::from)?)
}

pub fn run(args: RmsdArgs, file_config: FileRmsdConfig) -> Result<()> {
    let config = build_config(&args, &file_config)?;
    info!(
        superpose = config.superpose,
        "Computing RMSD series for {:?}", &args.input
    );

    let mut trajectory = open_trajectory(&args.input)?;
    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let values = rmsd::run(
        trajectory.as_mut(),
        &config,
        &CancellationToken::new(),
        &reporter,
    )?;

    let mut table = table_writer(args.output.as_deref())?;
    for (frame, rmsd) in values.iter().copied().enumerate() {
        table.serialize(RmsdRow { frame, rmsd })?;
    }
    table.flush()?;

    if let Some(output) = &args.output {
        println!("Wrote {} RMSD value(s) to {}", values.len(), output.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chemtraj::traj::{WriterOptions, create_writer};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_stf(path: &Path, frames: &[Frame]) {
        let mut writer = create_writer(path, frames[0].len(), WriterOptions::default()).unwrap();
        for frame in frames {
            writer.write_next(frame, None).unwrap();
        }
        writer.close().unwrap();
    }

    fn args(input: PathBuf, output: PathBuf) -> RmsdArgs {
        RmsdArgs {
            input,
            reference: None,
            selection: None,
            no_superpose: true,
            output: Some(output),
        }
    }

    #[test]
    fn writes_one_row_per_frame() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("t.stf");
        let output = dir.path().join("rmsd.csv");
        let base = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let shifted: Frame = base.iter().map(|p| p + nalgebra::Vector3::new(0.0, 2.0, 0.0)).collect();
        write_stf(&input, &[base.clone(), shifted]);

        run(args(input, output.clone()), FileRmsdConfig::default()).unwrap();

        let text = std::fs::read_to_string(output).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, vec!["frame,rmsd", "0,0.0", "1,2.0"]);
    }

    #[test]
    fn selection_errors_surface_as_argument_errors() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("t.stf");
        write_stf(&input, &[vec![Point3::origin(); 2]]);

        let mut bad = args(input.clone(), dir.path().join("out.csv"));
        bad.selection = Some("1-x".to_string());
        assert!(matches!(
            run(bad, FileRmsdConfig::default()),
            Err(CliError::Argument(_))
        ));

        let mut out_of_range = args(input, dir.path().join("out.csv"));
        out_of_range.selection = Some("0-5".to_string());
        assert!(matches!(
            run(out_of_range, FileRmsdConfig::default()),
            Err(CliError::Analysis(AnalysisError::SelectionOutOfRange { index: 2, .. }))
        ));
    }

    #[test]
    fn missing_reference_is_reported() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_reference(&dir.path().join("absent.dcd")),
            Err(CliError::Trajectory(_))
        ));
    }
}
