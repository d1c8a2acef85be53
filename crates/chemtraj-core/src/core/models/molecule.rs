use super::atom::Atom;
use super::topology::{Atomer, Topology, TopologyError};
use super::{Frame, UnitCell};
use crate::traj::memory::MemoryTrajectory;
use nalgebra::Point3;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum MoleculeError {
    #[error("Corrupted molecule: frame {frame} has {found} positions, topology has {expected} atoms")]
    Corrupted {
        frame: usize,
        expected: usize,
        found: usize,
    },

    #[error(
        "Corrupted molecule: B-factor frame {frame} has {found} values, topology has {expected} atoms"
    )]
    CorruptedBFactors {
        frame: usize,
        expected: usize,
        found: usize,
    },

    #[error("Expected one position per frame ({expected}), got {found}")]
    PositionCount { expected: usize, found: usize },

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// A topology together with its coordinate frames and per-atom B-factor frames.
///
/// Every frame holds exactly one position per atom; see [`Molecule::check_corrupted`].
#[derive(Debug, Clone, PartialEq)]
pub struct Molecule {
    topology: Topology,
    frames: Vec<Frame>,
    bfactors: Vec<Vec<f64>>,
    cells: Vec<Option<UnitCell>>,
}

impl Atomer for Molecule {
    fn atoms(&self) -> &[Atom] {
        self.topology.atoms()
    }
}

impl Molecule {
    /// Assembles a molecule and validates it with [`Molecule::check_corrupted`].
    pub fn new(
        topology: Topology,
        frames: Vec<Frame>,
        bfactors: Vec<Vec<f64>>,
    ) -> Result<Self, MoleculeError> {
        let cells = vec![None; frames.len()];
        let mut molecule = Self {
            topology,
            frames,
            bfactors,
            cells,
        };
        molecule.check_corrupted()?;
        Ok(molecule)
    }

    /// Verifies that every frame matches the atom count.
    ///
    /// Coordinate frames of the wrong length are reported as
    /// [`MoleculeError::Corrupted`]. Missing B-factor frames are filled with zeros
    /// instead of failing; present B-factor frames must still have the right length.
    /// Calling this repeatedly has no further effect once it succeeds.
    pub fn check_corrupted(&mut self) -> Result<(), MoleculeError> {
        let expected = self.topology.len();
        for (frame, coords) in self.frames.iter().enumerate() {
            if coords.len() != expected {
                return Err(MoleculeError::Corrupted {
                    frame,
                    expected,
                    found: coords.len(),
                });
            }
        }
        for (frame, values) in self.bfactors.iter().enumerate() {
            if values.len() != expected {
                return Err(MoleculeError::CorruptedBFactors {
                    frame,
                    expected,
                    found: values.len(),
                });
            }
        }
        if self.bfactors.len() < self.frames.len() {
            debug!(
                missing = self.frames.len() - self.bfactors.len(),
                "Backfilling missing B-factor frames with zeros"
            );
            self.bfactors.resize(self.frames.len(), vec![0.0; expected]);
        }
        self.cells.resize(self.frames.len(), None);
        Ok(())
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn atom_mut(&mut self, index: usize) -> Option<&mut Atom> {
        self.topology.atom_mut(index)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn bfactors(&self) -> &[Vec<f64>] {
        &self.bfactors
    }

    pub fn cells(&self) -> &[Option<UnitCell>] {
        &self.cells
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Appends a frame with optional B-factors (zeros when absent) and unit cell.
    pub fn add_frame(
        &mut self,
        frame: Frame,
        bfactors: Option<Vec<f64>>,
        cell: Option<UnitCell>,
    ) -> Result<(), MoleculeError> {
        let expected = self.topology.len();
        let index = self.frames.len();
        if frame.len() != expected {
            return Err(MoleculeError::Corrupted {
                frame: index,
                expected,
                found: frame.len(),
            });
        }
        let bfactors = bfactors.unwrap_or_else(|| vec![0.0; expected]);
        if bfactors.len() != expected {
            return Err(MoleculeError::CorruptedBFactors {
                frame: index,
                expected,
                found: bfactors.len(),
            });
        }
        self.frames.push(frame);
        self.bfactors.push(bfactors);
        self.cells.push(cell);
        Ok(())
    }

    /// Appends an atom with one position per existing frame and returns its index.
    pub fn add_atom(
        &mut self,
        atom: Atom,
        positions: &[Point3<f64>],
    ) -> Result<usize, MoleculeError> {
        if positions.len() != self.frames.len() {
            return Err(MoleculeError::PositionCount {
                expected: self.frames.len(),
                found: positions.len(),
            });
        }
        for (frame, position) in self.frames.iter_mut().zip(positions) {
            frame.push(*position);
        }
        for values in &mut self.bfactors {
            values.push(0.0);
        }
        Ok(self.topology.add_atom(atom))
    }

    /// Removes an atom from the topology and from every coordinate and B-factor frame.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn delete_atom(&mut self, index: usize) -> Atom {
        let atom = self.topology.delete_atom(index);
        for frame in &mut self.frames {
            frame.remove(index);
        }
        for values in &mut self.bfactors {
            values.remove(index);
        }
        atom
    }

    /// Duplicates an atom, including its positions and B-factors, at the end of the list.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn copy_atom(&mut self, index: usize) -> usize {
        let new_index = self.topology.copy_atom(index);
        for frame in &mut self.frames {
            let position = frame[index];
            frame.push(position);
        }
        for values in &mut self.bfactors {
            let value = values[index];
            values.push(value);
        }
        new_index
    }

    /// Extracts the atoms at `indices` into a new molecule, copying their coordinates.
    pub fn select(&self, indices: &[usize]) -> Result<Molecule, MoleculeError> {
        let topology = self.topology.sub_topology(indices)?;
        let frames = self
            .frames
            .iter()
            .map(|f| indices.iter().map(|&i| f[i]).collect())
            .collect();
        let bfactors = self
            .bfactors
            .iter()
            .map(|b| indices.iter().map(|&i| b[i]).collect())
            .collect();
        Ok(Molecule {
            topology,
            frames,
            bfactors,
            cells: self.cells.clone(),
        })
    }

    pub fn reset_ids(&mut self) {
        self.topology.reset_ids();
    }

    /// Splits the molecule into its topology and its frames.
    pub fn into_parts(self) -> (Topology, Vec<Frame>, Vec<Vec<f64>>) {
        (self.topology, self.frames, self.bfactors)
    }

    /// Converts the molecule into an in-memory [`Trajectory`](crate::traj::Trajectory)
    /// over its frames.
    pub fn into_trajectory(self) -> MemoryTrajectory {
        let natoms = self.topology.len();
        MemoryTrajectory::new(natoms, self.frames, self.cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traj::{TrajError, Trajectory};

    fn sample(natoms: usize, nframes: usize) -> Molecule {
        let atoms = (0..natoms)
            .map(|i| Atom::new(&format!("A{i}"), "C").with_id(10 * (i + 1)))
            .collect();
        let frames = (0..nframes)
            .map(|f| {
                (0..natoms)
                    .map(|i| Point3::new(i as f64, f as f64, 0.0))
                    .collect()
            })
            .collect();
        Molecule::new(Topology::from_atoms(atoms), frames, Vec::new()).unwrap()
    }

    #[test]
    fn new_backfills_missing_bfactors() {
        let molecule = sample(3, 2);
        assert_eq!(molecule.bfactors().len(), 2);
        assert!(molecule.bfactors().iter().all(|b| b == &vec![0.0; 3]));
    }

    #[test]
    fn new_rejects_short_frame() {
        let topology = Topology::from_atoms(vec![Atom::new("A", "C"), Atom::new("B", "C")]);
        let result = Molecule::new(topology, vec![vec![Point3::origin()]], Vec::new());
        assert_eq!(
            result,
            Err(MoleculeError::Corrupted {
                frame: 0,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn new_rejects_bfactor_frame_of_wrong_length() {
        let topology = Topology::from_atoms(vec![Atom::new("A", "C")]);
        let result = Molecule::new(
            topology,
            vec![vec![Point3::origin()]],
            vec![vec![1.0, 2.0]],
        );
        assert!(matches!(
            result,
            Err(MoleculeError::CorruptedBFactors { found: 2, .. })
        ));
    }

    #[test]
    fn check_corrupted_is_idempotent() {
        let mut molecule = sample(2, 3);
        let before = molecule.clone();
        molecule.check_corrupted().unwrap();
        molecule.check_corrupted().unwrap();
        assert_eq!(molecule, before);
    }

    #[test]
    fn check_corrupted_detects_tampered_frame() {
        let mut molecule = sample(2, 2);
        molecule.frames_mut()[1].pop();
        assert!(matches!(
            molecule.check_corrupted(),
            Err(MoleculeError::Corrupted { frame: 1, .. })
        ));
    }

    #[test]
    fn deleting_an_atom_keeps_the_molecule_consistent() {
        let mut molecule = sample(5, 2);
        molecule.delete_atom(2);

        assert_eq!(molecule.atom_count(), 4);
        assert!(molecule.check_corrupted().is_ok());
        let xs: Vec<_> = molecule.frames()[1].iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 3.0, 4.0]);

        molecule.reset_ids();
        let names: Vec<_> = molecule.atoms().iter().map(|a| a.name.as_str()).collect();
        let ids: Vec<_> = molecule.atoms().iter().map(|a| a.id).collect();
        assert_eq!(names, vec!["A0", "A1", "A3", "A4"]);
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn add_atom_requires_one_position_per_frame() {
        let mut molecule = sample(2, 2);
        assert_eq!(
            molecule.add_atom(Atom::new("N", "N"), &[Point3::origin()]),
            Err(MoleculeError::PositionCount {
                expected: 2,
                found: 1
            })
        );
        let index = molecule
            .add_atom(Atom::new("N", "N"), &[Point3::origin(), Point3::origin()])
            .unwrap();
        assert_eq!(index, 2);
        assert!(molecule.check_corrupted().is_ok());
        assert_eq!(molecule.bfactors()[0].len(), 3);
    }

    #[test]
    fn copy_atom_duplicates_positions() {
        let mut molecule = sample(3, 2);
        let index = molecule.copy_atom(1);
        assert_eq!(index, 3);
        for frame in molecule.frames() {
            assert_eq!(frame[3], frame[1]);
        }
    }

    #[test]
    fn select_copies_coordinates() {
        let molecule = sample(4, 2);
        let mut selected = molecule.select(&[3, 0]).unwrap();
        assert_eq!(selected.atom_count(), 2);
        assert_eq!(selected.frames()[1][0], Point3::new(3.0, 1.0, 0.0));

        selected.frames_mut()[0][0] = Point3::new(-1.0, -1.0, -1.0);
        assert_eq!(molecule.frames()[0][3], Point3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn add_frame_validates_lengths() {
        let mut molecule = sample(2, 0);
        assert!(molecule.add_frame(vec![Point3::origin()], None, None).is_err());
        molecule
            .add_frame(vec![Point3::origin(); 2], Some(vec![1.0, 2.0]), None)
            .unwrap();
        assert_eq!(molecule.frame_count(), 1);
        assert_eq!(molecule.bfactors()[0], vec![1.0, 2.0]);
    }

    #[test]
    fn into_trajectory_replays_frames() {
        let molecule = sample(2, 2);
        let mut trajectory = molecule.into_trajectory();
        let mut buffer = vec![Point3::origin(); 2];

        trajectory.next(&mut buffer).unwrap();
        assert_eq!(buffer[1], Point3::new(1.0, 0.0, 0.0));
        trajectory.next(&mut buffer).unwrap();
        assert_eq!(buffer[1], Point3::new(1.0, 1.0, 0.0));
        assert!(matches!(trajectory.next(&mut buffer), Err(TrajError::LastFrame)));
        assert!(!trajectory.readable());
    }
}
