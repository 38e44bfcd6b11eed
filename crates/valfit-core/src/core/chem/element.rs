use phf::{Map, phf_map};

#[rustfmt::skip]
static SYMBOL_TO_NUMBER: Map<&'static str, u8> = phf_map! {
    "H" => 1, "He" => 2,
    "Li" => 3, "Be" => 4, "B" => 5, "C" => 6, "N" => 7, "O" => 8, "F" => 9, "Ne" => 10,
    "Na" => 11, "Mg" => 12, "Al" => 13, "Si" => 14, "P" => 15, "S" => 16, "Cl" => 17, "Ar" => 18,
    "K" => 19, "Ca" => 20, "Sc" => 21, "Ti" => 22, "V" => 23, "Cr" => 24, "Mn" => 25,
    "Fe" => 26, "Co" => 27, "Ni" => 28, "Cu" => 29, "Zn" => 30, "Ga" => 31, "Ge" => 32,
    "As" => 33, "Se" => 34, "Br" => 35, "Kr" => 36,
    "Rb" => 37, "Sr" => 38, "Y" => 39, "Zr" => 40, "Nb" => 41, "Mo" => 42, "Tc" => 43,
    "Ru" => 44, "Rh" => 45, "Pd" => 46, "Ag" => 47, "Cd" => 48, "In" => 49, "Sn" => 50,
    "Sb" => 51, "Te" => 52, "I" => 53, "Xe" => 54,
};

#[rustfmt::skip]
const SYMBOLS: [&str; 55] = [
    "*",
    "H", "He",
    "Li", "Be", "B", "C", "N", "O", "F", "Ne",
    "Na", "Mg", "Al", "Si", "P", "S", "Cl", "Ar",
    "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As", "Se", "Br", "Kr",
    "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In", "Sn", "Sb", "Te", "I", "Xe",
];

pub fn atomic_number(symbol: &str) -> Option<u8> {
    SYMBOL_TO_NUMBER.get(symbol).copied()
}

pub fn symbol(atomic_number: u8) -> Option<&'static str> {
    SYMBOLS.get(atomic_number as usize).copied()
}

/// Standard valence states used to derive implicit hydrogens, lowest first.
pub fn default_valences(atomic_number: u8) -> &'static [u8] {
    match atomic_number {
        1 => &[1],
        5 => &[3],
        6 => &[4],
        7 => &[3, 5],
        8 => &[2],
        9 | 17 | 35 | 53 => &[1],
        14 => &[4],
        15 => &[3, 5],
        16 => &[2, 4, 6],
        34 => &[2, 4, 6],
        _ => &[],
    }
}

/// Number of valence-shell electrons for main-group elements, used in aromaticity perception.
pub fn valence_electrons(atomic_number: u8) -> Option<u8> {
    match atomic_number {
        1 => Some(1),
        3..=10 => Some(atomic_number - 2),
        11..=18 => Some(atomic_number - 10),
        31..=36 => Some(atomic_number - 28),
        49..=54 => Some(atomic_number - 46),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_lookup_is_case_sensitive() {
        assert_eq!(atomic_number("C"), Some(6));
        assert_eq!(atomic_number("Cl"), Some(17));
        assert_eq!(atomic_number("CL"), None);
    }

    #[test]
    fn symbol_and_number_round_trip_for_the_table() {
        for z in 1..=54u8 {
            let sym = symbol(z).unwrap();
            assert_eq!(atomic_number(sym), Some(z));
        }
        assert_eq!(symbol(200), None);
    }

    #[test]
    fn valence_electrons_follow_groups() {
        assert_eq!(valence_electrons(6), Some(4));
        assert_eq!(valence_electrons(16), Some(6));
        assert_eq!(valence_electrons(35), Some(7));
        assert_eq!(valence_electrons(26), None);
    }
}
