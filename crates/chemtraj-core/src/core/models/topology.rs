use super::atom::Atom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum BondOrder {
    #[default]
    Undetermined = 0,
    Single = 1,
    Double = 2,
    Triple = 3,
    Aromatic = 4,
}

#[derive(Debug, Error)]
#[error("Invalid bond order string")]
pub struct ParseBondOrderError;

impl FromStr for BondOrder {
    type Err = ParseBondOrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "0" | "u" | "undetermined" => Ok(Self::Undetermined),
            "1" | "s" | "single" => Ok(Self::Single),
            "2" | "d" | "double" => Ok(Self::Double),
            "3" | "t" | "triple" => Ok(Self::Triple),
            "ar" | "aromatic" => Ok(Self::Aromatic),
            _ => Err(ParseBondOrderError),
        }
    }
}

impl fmt::Display for BondOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Undetermined => "Undetermined",
                Self::Single => "Single",
                Self::Double => "Double",
                Self::Triple => "Triple",
                Self::Aromatic => "Aromatic",
            }
        )
    }
}

/// An undirected bond between two atoms, addressed by their positions in a [`Topology`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bond {
    pub a: usize,
    pub b: usize,
    pub order: BondOrder,
    /// Bond length in Angstroms, `0.0` when unknown.
    pub distance: f64,
}

impl Bond {
    pub fn new(a: usize, b: usize, order: BondOrder, distance: f64) -> Self {
        Self {
            a,
            b,
            order,
            distance,
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.a == index || self.b == index
    }

    /// Returns the partner of `index` across this bond.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not one of the bond's endpoints.
    pub fn cross(&self, index: usize) -> usize {
        if index == self.a {
            self.b
        } else if index == self.b {
            self.a
        } else {
            panic!(
                "atom {index} is not a member of bond {}-{}",
                self.a, self.b
            )
        }
    }

    fn connects(&self, i: usize, j: usize) -> bool {
        (self.a == i && self.b == j) || (self.a == j && self.b == i)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TopologyError {
    #[error("Atom index {index} is out of range for a topology of {len} atoms")]
    AtomOutOfRange { index: usize, len: usize },

    #[error("An atom cannot be bonded to itself (index {0})")]
    SelfBond(usize),

    #[error("Atoms {a} and {b} are already bonded")]
    DuplicateBond { a: usize, b: usize },

    #[error("No bond between atoms {a} and {b}")]
    BondNotFound { a: usize, b: usize },
}

/// Read-only access to an ordered list of atoms.
///
/// Implemented by every type that owns a topology so that writers and analysis
/// code can accept either a bare [`Topology`] or a full molecule.
pub trait Atomer {
    fn atoms(&self) -> &[Atom];

    fn atom_count(&self) -> usize {
        self.atoms().len()
    }

    fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms().get(index)
    }

    fn masses(&self) -> Vec<f64> {
        self.atoms().iter().map(|a| a.mass).collect()
    }

    fn symbols(&self) -> Vec<&str> {
        self.atoms().iter().map(|a| a.symbol.as_str()).collect()
    }
}

/// Time-invariant description of a molecular system.
///
/// Atoms live in a positional arena. Bonds store indices into that arena, so every
/// operation that moves atoms also rewrites the bonds in the same step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// Net charge in elementary charge units.
    pub charge: i32,
    /// Spin multiplicity (unpaired electrons + 1).
    pub multiplicity: u32,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            atoms: Vec::new(),
            bonds: Vec::new(),
            charge: 0,
            multiplicity: 1,
        }
    }
}

impl Atomer for Topology {
    fn atoms(&self) -> &[Atom] {
        &self.atoms
    }
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_atoms(atoms: Vec<Atom>) -> Self {
        Self {
            atoms,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atom_mut(&mut self, index: usize) -> Option<&mut Atom> {
        self.atoms.get_mut(index)
    }

    pub fn atoms_mut(&mut self) -> impl Iterator<Item = &mut Atom> {
        self.atoms.iter_mut()
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    /// Appends an atom and returns its index.
    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.atoms.len() - 1
    }

    /// Removes the atom at `index`, preserving the order of the remaining atoms.
    ///
    /// Bonds touching the atom are dropped and every bond index above `index`
    /// is shifted down by one.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn delete_atom(&mut self, index: usize) -> Atom {
        assert!(
            index < self.atoms.len(),
            "atom index {index} out of bounds for topology of {} atoms",
            self.atoms.len()
        );
        let removed = self.atoms.remove(index);
        self.bonds.retain(|bond| !bond.contains(index));
        for bond in &mut self.bonds {
            if bond.a > index {
                bond.a -= 1;
            }
            if bond.b > index {
                bond.b -= 1;
            }
        }
        removed
    }

    /// Appends a copy of the atom at `index` (without its bonds) and returns the new index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn copy_atom(&mut self, index: usize) -> usize {
        let copy = self.atoms[index].clone();
        self.add_atom(copy)
    }

    pub fn add_bond(
        &mut self,
        a: usize,
        b: usize,
        order: BondOrder,
        distance: f64,
    ) -> Result<(), TopologyError> {
        self.check_index(a)?;
        self.check_index(b)?;
        if a == b {
            return Err(TopologyError::SelfBond(a));
        }
        if self.bonds.iter().any(|bond| bond.connects(a, b)) {
            return Err(TopologyError::DuplicateBond { a, b });
        }
        self.bonds.push(Bond::new(a, b, order, distance));
        Ok(())
    }

    /// Detaches the bond between `a` and `b` from both endpoints.
    pub fn remove_bond(&mut self, a: usize, b: usize) -> Result<Bond, TopologyError> {
        let position = self
            .bonds
            .iter()
            .position(|bond| bond.connects(a, b))
            .ok_or(TopologyError::BondNotFound { a, b })?;
        Ok(self.bonds.remove(position))
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<&Bond> {
        self.bonds.iter().find(|bond| bond.connects(a, b))
    }

    pub fn bonded_neighbors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.bonds
            .iter()
            .filter(move |bond| bond.contains(index))
            .map(move |bond| bond.cross(index))
    }

    /// Builds a new topology holding copies of the atoms at `indices`, in that order.
    ///
    /// Bonds with both endpoints in the selection are kept and remapped; charge and
    /// multiplicity are carried over unchanged.
    pub fn sub_topology(&self, indices: &[usize]) -> Result<Topology, TopologyError> {
        let mut remap = vec![None; self.atoms.len()];
        let mut atoms = Vec::with_capacity(indices.len());
        for (new_index, &old_index) in indices.iter().enumerate() {
            self.check_index(old_index)?;
            remap[old_index] = Some(new_index);
            atoms.push(self.atoms[old_index].clone());
        }
        let bonds = self
            .bonds
            .iter()
            .filter_map(|bond| match (remap[bond.a], remap[bond.b]) {
                (Some(a), Some(b)) => Some(Bond { a, b, ..*bond }),
                _ => None,
            })
            .collect();
        Ok(Topology {
            atoms,
            bonds,
            charge: self.charge,
            multiplicity: self.multiplicity,
        })
    }

    /// Renumbers serial and residue ids to follow positional order.
    ///
    /// Serial ids become `1..=N`. Residue ids become contiguous integers starting
    /// at 1; a new residue starts whenever the original residue id or the chain
    /// label changes between consecutive atoms.
    pub fn reset_ids(&mut self) {
        let mut residue: isize = 0;
        let mut previous: Option<(isize, char)> = None;
        for (i, atom) in self.atoms.iter_mut().enumerate() {
            atom.id = i + 1;
            let key = (atom.mol_id, atom.chain);
            if previous != Some(key) {
                residue += 1;
                previous = Some(key);
            }
            atom.mol_id = residue;
        }
    }

    pub fn total_mass(&self) -> f64 {
        self.atoms.iter().map(|a| a.mass).sum()
    }

    fn check_index(&self, index: usize) -> Result<(), TopologyError> {
        if index < self.atoms.len() {
            Ok(())
        } else {
            Err(TopologyError::AtomOutOfRange {
                index,
                len: self.atoms.len(),
            })
        }
    }
}
