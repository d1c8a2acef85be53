use phf::{Map, phf_map};

#[rustfmt::skip]
static ATOMIC_NUMBERS: Map<&'static str, u8> = phf_map! {
    "H" => 1, "He" => 2,
    "Li" => 3, "Be" => 4, "B" => 5, "C" => 6, "N" => 7, "O" => 8, "F" => 9, "Ne" => 10,
    "Na" => 11, "Mg" => 12, "Al" => 13, "Si" => 14, "P" => 15, "S" => 16, "Cl" => 17, "Ar" => 18,
    "K" => 19, "Ca" => 20, "Sc" => 21, "Ti" => 22, "V" => 23, "Cr" => 24, "Mn" => 25, "Fe" => 26,
    "Co" => 27, "Ni" => 28, "Cu" => 29, "Zn" => 30, "Ga" => 31, "Ge" => 32, "As" => 33, "Se" => 34,
    "Br" => 35, "Kr" => 36,
    "Rb" => 37, "Sr" => 38, "Mo" => 42, "Ru" => 44, "Rh" => 45, "Pd" => 46, "Ag" => 47, "Cd" => 48,
    "Sn" => 50, "I" => 53, "Xe" => 54,
    "Cs" => 55, "Ba" => 56, "W" => 74, "Os" => 76, "Ir" => 77, "Pt" => 78, "Au" => 79, "Hg" => 80,
    "Pb" => 82,
};

// Standard atomic weights (IUPAC, conventional values), Daltons.
#[rustfmt::skip]
static MASSES: Map<&'static str, f64> = phf_map! {
    "H" => 1.008, "He" => 4.0026,
    "Li" => 6.94, "Be" => 9.0122, "B" => 10.81, "C" => 12.011, "N" => 14.007, "O" => 15.999,
    "F" => 18.998, "Ne" => 20.180,
    "Na" => 22.990, "Mg" => 24.305, "Al" => 26.982, "Si" => 28.085, "P" => 30.974, "S" => 32.06,
    "Cl" => 35.45, "Ar" => 39.948,
    "K" => 39.098, "Ca" => 40.078, "Sc" => 44.956, "Ti" => 47.867, "V" => 50.942, "Cr" => 51.996,
    "Mn" => 54.938, "Fe" => 55.845, "Co" => 58.933, "Ni" => 58.693, "Cu" => 63.546, "Zn" => 65.38,
    "Ga" => 69.723, "Ge" => 72.630, "As" => 74.922, "Se" => 78.971, "Br" => 79.904, "Kr" => 83.798,
    "Rb" => 85.468, "Sr" => 87.62, "Mo" => 95.95, "Ru" => 101.07, "Rh" => 102.91, "Pd" => 106.42,
    "Ag" => 107.87, "Cd" => 112.41, "Sn" => 118.71, "I" => 126.90, "Xe" => 131.29,
    "Cs" => 132.91, "Ba" => 137.33, "W" => 183.84, "Os" => 190.23, "Ir" => 192.22, "Pt" => 195.08,
    "Au" => 196.97, "Hg" => 200.59, "Pb" => 207.2,
};

// Bondi van der Waals radii where available, Angstroms.
#[rustfmt::skip]
static VDW_RADII: Map<&'static str, f64> = phf_map! {
    "H" => 1.20, "He" => 1.40,
    "Li" => 1.82, "B" => 1.92, "C" => 1.70, "N" => 1.55, "O" => 1.52, "F" => 1.47, "Ne" => 1.54,
    "Na" => 2.27, "Mg" => 1.73, "Al" => 1.84, "Si" => 2.10, "P" => 1.80, "S" => 1.80,
    "Cl" => 1.75, "Ar" => 1.88,
    "K" => 2.75, "Ca" => 2.31, "Ni" => 1.63, "Cu" => 1.40, "Zn" => 1.39, "Ga" => 1.87,
    "Ge" => 2.11, "As" => 1.85, "Se" => 1.90, "Br" => 1.85, "Kr" => 2.02,
    "Pd" => 1.63, "Ag" => 1.72, "Cd" => 1.58, "Sn" => 2.17, "I" => 1.98, "Xe" => 2.16,
    "Pt" => 1.75, "Au" => 1.66, "Hg" => 1.55, "Pb" => 2.02,
};

#[rustfmt::skip]
static RESIDUE_ONE_LETTER: Map<&'static str, char> = phf_map! {
    "ALA" => 'A', "ARG" => 'R', "ASN" => 'N', "ASP" => 'D', "CYS" => 'C',
    "GLN" => 'Q', "GLU" => 'E', "GLY" => 'G', "HIS" => 'H', "ILE" => 'I',
    "LEU" => 'L', "LYS" => 'K', "MET" => 'M', "PHE" => 'F', "PRO" => 'P',
    "SER" => 'S', "THR" => 'T', "TRP" => 'W', "TYR" => 'Y', "VAL" => 'V',
    // Protonation and disulfide variants
    "HID" => 'H', "HIE" => 'H', "HIP" => 'H', "HSD" => 'H', "HSE" => 'H', "HSP" => 'H',
    "CYX" => 'C', "ASH" => 'D', "GLH" => 'E', "LYN" => 'K',
};

#[rustfmt::skip]
static RESIDUE_THREE_LETTER: Map<char, &'static str> = phf_map! {
    'A' => "ALA", 'R' => "ARG", 'N' => "ASN", 'D' => "ASP", 'C' => "CYS",
    'Q' => "GLN", 'E' => "GLU", 'G' => "GLY", 'H' => "HIS", 'I' => "ILE",
    'L' => "LEU", 'K' => "LYS", 'M' => "MET", 'F' => "PHE", 'P' => "PRO",
    'S' => "SER", 'T' => "THR", 'W' => "TRP", 'Y' => "TYR", 'V' => "VAL",
};

/// Capitalizes an element symbol the canonical way ("CL" -> "Cl", " c" -> "C").
pub fn normalize_symbol(symbol: &str) -> String {
    let mut chars = symbol.trim().chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

pub fn atomic_number(symbol: &str) -> Option<u8> {
    ATOMIC_NUMBERS.get(symbol).copied()
}

pub fn mass(symbol: &str) -> Option<f64> {
    MASSES.get(symbol).copied()
}

pub fn vdw_radius(symbol: &str) -> Option<f64> {
    VDW_RADII.get(symbol).copied()
}

/// Maps a three-letter residue name (any case) to its one-letter code.
pub fn residue_one_letter(name: &str) -> Option<char> {
    RESIDUE_ONE_LETTER
        .get(name.trim().to_ascii_uppercase().as_str())
        .copied()
}

/// Maps a one-letter residue code (any case) to its canonical three-letter name.
pub fn residue_three_letter(code: char) -> Option<&'static str> {
    RESIDUE_THREE_LETTER
        .get(&code.to_ascii_uppercase())
        .copied()
}
