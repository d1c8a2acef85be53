use crate::cli::InfoArgs;
use crate::error::Result;
use chemtraj::core::models::UnitCell;
use chemtraj::traj::open::TrajectoryFormat;
use chemtraj::traj::open_trajectory;
use nalgebra::{Point3, Vector3};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectorySummary {
    pub format: Option<TrajectoryFormat>,
    pub atoms: usize,
    pub frames: usize,
    /// Cell of the first frame, if it has one.
    pub first_cell: Option<UnitCell>,
}

/// Lengths of the three box vectors.
fn cell_lengths(cell: &UnitCell) -> [f64; 3] {
    [0, 3, 6].map(|i| Vector3::new(cell[i], cell[i + 1], cell[i + 2]).norm())
}

/// Decodes the first frame and skips through the rest to count frames.
pub fn summarize(path: &Path) -> Result<TrajectorySummary> {
    let mut trajectory = open_trajectory(path)?;
    let atoms = trajectory.len();
    let mut buffer = vec![Point3::origin(); atoms];

    let mut frames = 0;
    let first_cell = match trajectory.next(&mut buffer) {
        Ok(cell) => {
            frames += 1;
            cell
        }
        Err(e) if e.is_last_frame() => None,
        Err(e) => return Err(e.into()),
    };
    while trajectory.readable() {
        match trajectory.skip() {
            Ok(()) => frames += 1,
            Err(e) if e.is_last_frame() => break,
            Err(e) => return Err(e.into()),
        }
    }
    trajectory.close();

    Ok(TrajectorySummary {
        format: TrajectoryFormat::from_path(path),
        atoms,
        frames,
        first_cell,
    })
}

pub fn run(args: InfoArgs) -> Result<()> {
    info!("Inspecting trajectory {:?}", &args.input);
    let summary = summarize(&args.input)?;

    println!("File:    {}", args.input.display());
    if let Some(format) = summary.format {
        println!("Format:  {format}");
    }
    println!("Atoms:   {}", summary.atoms);
    println!("Frames:  {}", summary.frames);
    match &summary.first_cell {
        Some(cell) => {
            let [a, b, c] = cell_lengths(cell);
            println!("Cell:    {a:.3} x {b:.3} x {c:.3} Å");
        }
        None => println!("Cell:    none"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chemtraj::traj::{WriterOptions, create_writer};
    use tempfile::tempdir;

    #[test]
    fn summary_counts_frames_and_reports_the_first_cell() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("box.dcd");
        let cell = [12.0, 0.0, 0.0, 0.0, 13.0, 0.0, 0.0, 0.0, 14.0];
        let options = WriterOptions {
            unit_cell: true,
            ..WriterOptions::default()
        };
        let mut writer = create_writer(&path, 3, options).unwrap();
        for i in 0..5 {
            let frame = vec![Point3::new(i as f64, 0.0, 0.0); 3];
            writer.write_next(&frame, Some(&cell)).unwrap();
        }
        writer.close().unwrap();

        let summary = summarize(&path).unwrap();
        assert_eq!(summary.format, Some(TrajectoryFormat::Dcd));
        assert_eq!(summary.atoms, 3);
        assert_eq!(summary.frames, 5);
        let lengths = cell_lengths(&summary.first_cell.unwrap());
        for (got, want) in lengths.iter().zip([12.0, 13.0, 14.0]) {
            assert!((got - want).abs() < 1e-4);
        }
    }

    #[test]
    fn empty_trajectory_has_no_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.stf");
        create_writer(&path, 2, WriterOptions::default())
            .unwrap()
            .close()
            .unwrap();

        let summary = summarize(&path).unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.first_cell, None);
    }
}
