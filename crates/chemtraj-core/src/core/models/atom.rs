use crate::core::utils::elements;
use serde::{Deserialize, Serialize};

/// Represents an atom's identity and classification within a topology.
///
/// Position within the owning [`Topology`](super::topology::Topology) is the atom's
/// primary identity; the serial `id` mirrors the numbering found in structure files
/// and may diverge from the position until [`Topology::reset_ids`](super::topology::Topology::reset_ids)
/// is called. Coordinates are not stored here, they live in the frames of a
/// [`Molecule`](super::molecule::Molecule) or are streamed from a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// The atom name (e.g., "CA", "OW", "C12").
    pub name: String,
    /// The element symbol, capitalized (e.g., "C", "Cl").
    pub symbol: String,
    /// Serial number as found in (or written to) structure files.
    pub id: usize,
    /// Identifier of the residue or molecule this atom belongs to.
    pub mol_id: isize,
    /// Name of the residue or molecule this atom belongs to.
    pub mol_name: String,
    /// Chain label, `' '` when unassigned.
    pub chain: char,
    /// Atomic mass in Daltons.
    pub mass: f64,
    /// Crystallographic occupancy.
    pub occupancy: f64,
    /// Van der Waals radius in Angstroms.
    pub vdw: f64,
    /// Partial charge in elementary charge units.
    pub charge: f64,
    /// Whether the atom comes from a HETATM-style record.
    pub het: bool,
}

impl Atom {
    /// Creates a new `Atom` with the given name and element symbol.
    ///
    /// Mass and van der Waals radius are looked up from the element tables; an
    /// unknown symbol leaves both at zero. The remaining fields take neutral
    /// defaults and can be set afterwards.
    ///
    /// # Arguments
    ///
    /// * `name` - The atom name.
    /// * `symbol` - The element symbol, in any capitalization.
    pub fn new(name: &str, symbol: &str) -> Self {
        let symbol = elements::normalize_symbol(symbol);
        Self {
            name: name.to_string(),
            mass: elements::mass(&symbol).unwrap_or(0.0),
            vdw: elements::vdw_radius(&symbol).unwrap_or(0.0),
            symbol,
            id: 0,
            mol_id: 0,
            mol_name: String::new(),
            chain: ' ',
            occupancy: 1.0,
            charge: 0.0,
            het: false,
        }
    }

    /// Sets the residue membership of the atom, returning it for chaining.
    pub fn with_residue(mut self, mol_id: isize, mol_name: &str, chain: char) -> Self {
        self.mol_id = mol_id;
        self.mol_name = mol_name.to_string();
        self.chain = chain;
        self
    }

    /// Sets the serial number of the atom, returning it for chaining.
    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    /// Returns the atomic number derived from the element symbol, if known.
    pub fn atomic_number(&self) -> Option<u8> {
        elements::atomic_number(&self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_atom_fills_element_properties() {
        let atom = Atom::new("CA", "C");
        assert_eq!(atom.name, "CA");
        assert_eq!(atom.symbol, "C");
        assert!((atom.mass - 12.011).abs() < 1e-9);
        assert!(atom.vdw > 0.0);
        assert_eq!(atom.occupancy, 1.0);
        assert_eq!(atom.charge, 0.0);
        assert!(!atom.het);
        assert_eq!(atom.atomic_number(), Some(6));
    }

    #[test]
    fn new_atom_normalizes_symbol_case() {
        let atom = Atom::new("CL1", "CL");
        assert_eq!(atom.symbol, "Cl");
        assert_eq!(atom.atomic_number(), Some(17));
    }

    #[test]
    fn unknown_symbol_leaves_properties_at_zero() {
        let atom = Atom::new("X1", "Xx");
        assert_eq!(atom.mass, 0.0);
        assert_eq!(atom.vdw, 0.0);
        assert_eq!(atom.atomic_number(), None);
    }

    #[test]
    fn builder_helpers_set_residue_and_id() {
        let atom = Atom::new("OW", "O").with_residue(7, "SOL", 'W').with_id(21);
        assert_eq!(atom.mol_id, 7);
        assert_eq!(atom.mol_name, "SOL");
        assert_eq!(atom.chain, 'W');
        assert_eq!(atom.id, 21);
    }

    #[test]
    fn atom_survives_json_round_trip() {
        let atom = Atom::new("N", "N").with_residue(1, "ALA", 'A').with_id(1);
        let json = serde_json::to_string(&atom).unwrap();
        let back: Atom = serde_json::from_str(&json).unwrap();
        assert_eq!(atom, back);
    }
}
