use crate::core::chem::molecule::Molecule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TermKind {
    Bond,
    Angle,
    ProperTorsion,
    ImproperTorsion,
}

impl TermKind {
    pub const ALL: [TermKind; 4] = [
        TermKind::Bond,
        TermKind::Angle,
        TermKind::ProperTorsion,
        TermKind::ImproperTorsion,
    ];

    #[inline]
    pub fn atom_count(self) -> usize {
        match self {
            TermKind::Bond => 2,
            TermKind::Angle => 3,
            TermKind::ProperTorsion | TermKind::ImproperTorsion => 4,
        }
    }

    #[inline]
    pub fn is_torsion(self) -> bool {
        matches!(self, TermKind::ProperTorsion | TermKind::ImproperTorsion)
    }

    /// Tag name of the SMIRNOFF handler that parameterizes this kind of term.
    pub fn handler_name(self) -> &'static str {
        match self {
            TermKind::Bond => "Bonds",
            TermKind::Angle => "Angles",
            TermKind::ProperTorsion => "ProperTorsions",
            TermKind::ImproperTorsion => "ImproperTorsions",
        }
    }

    /// Tag name of the parameter elements inside the handler.
    pub fn parameter_tag(self) -> &'static str {
        match self {
            TermKind::Bond => "Bond",
            TermKind::Angle => "Angle",
            TermKind::ProperTorsion => "Proper",
            TermKind::ImproperTorsion => "Improper",
        }
    }

    pub fn from_handler_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.handler_name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTermKindError(String);

impl fmt::Display for ParseTermKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown valence term kind '{}'", self.0)
    }
}

impl std::error::Error for ParseTermKindError {}

impl FromStr for TermKind {
    type Err = ParseTermKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bond" | "bonds" => Ok(TermKind::Bond),
            "angle" | "angles" => Ok(TermKind::Angle),
            "proper" | "propertorsions" | "proper-torsion" => Ok(TermKind::ProperTorsion),
            "improper" | "impropertorsions" | "improper-torsion" => Ok(TermKind::ImproperTorsion),
            _ => Err(ParseTermKindError(s.to_string())),
        }
    }
}

impl fmt::Display for TermKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TermKind::Bond => "bond",
            TermKind::Angle => "angle",
            TermKind::ProperTorsion => "proper torsion",
            TermKind::ImproperTorsion => "improper torsion",
        };
        write!(f, "{}", s)
    }
}

/// A bonded interaction of a molecule together with the parameter assigned to it.
#[derive(Debug, Clone)]
pub struct ValenceTerm {
    pub kind: TermKind,
    pub atoms: Vec<usize>,
    pub parameter_id: String,
    pub molecule: Arc<Molecule>,
}

impl ValenceTerm {
    pub fn new(
        kind: TermKind,
        atoms: &[usize],
        parameter_id: impl Into<String>,
        molecule: Arc<Molecule>,
    ) -> Self {
        Self {
            kind,
            atoms: canonical_atoms(kind, atoms),
            parameter_id: parameter_id.into(),
            molecule,
        }
    }

    #[inline]
    pub fn is_torsion(&self) -> bool {
        self.kind.is_torsion()
    }

    /// Central bond of a torsion as an ordered pair.
    ///
    /// For impropers this is the bond between the central atom and the first outer atom,
    /// which is what torsion drives around a trivalent center scan.
    pub fn central_bond(&self) -> Option<(usize, usize)> {
        if !self.is_torsion() {
            return None;
        }
        let (a, b) = (self.atoms[1], self.atoms[2]);
        Some((a.min(b), a.max(b)))
    }

    /// True for a proper torsion whose three bonds all lie in rings.
    pub fn is_ring_torsion(&self) -> bool {
        self.kind == TermKind::ProperTorsion
            && self
                .atoms
                .windows(2)
                .all(|pair| self.molecule.is_ring_bond(pair[0], pair[1]))
    }
}

impl PartialEq for ValenceTerm {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.atoms == other.atoms
            && self.parameter_id == other.parameter_id
            && self.molecule == other.molecule
    }
}

/// Canonical ordering of a term's atom tuple.
///
/// Bonds, angles and propers use the smaller of the tuple and its reverse. Impropers
/// keep the central atom in position 1 and sort the three outer atoms.
pub fn canonical_atoms(kind: TermKind, atoms: &[usize]) -> Vec<usize> {
    match kind {
        TermKind::ImproperTorsion if atoms.len() == 4 => {
            let mut outer = [atoms[0], atoms[2], atoms[3]];
            outer.sort_unstable();
            vec![outer[0], atoms[1], outer[1], outer[2]]
        }
        _ => {
            let reversed: Vec<usize> = atoms.iter().rev().copied().collect();
            if reversed.as_slice() < atoms {
                reversed
            } else {
                atoms.to_vec()
            }
        }
    }
}

/// All atom tuples of the given kind in a molecule, canonically ordered and sorted.
pub fn enumerate_terms(molecule: &Molecule, kind: TermKind) -> Vec<Vec<usize>> {
    let mut terms: Vec<Vec<usize>> = Vec::new();
    match kind {
        TermKind::Bond => {
            for bond in molecule.bonds() {
                terms.push(canonical_atoms(kind, &[bond.atom1, bond.atom2]));
            }
        }
        TermKind::Angle => {
            for center in 0..molecule.atom_count() {
                let neighbors: Vec<usize> = molecule.neighbors(center).collect();
                for (i, &a) in neighbors.iter().enumerate() {
                    for &c in &neighbors[i + 1..] {
                        terms.push(canonical_atoms(kind, &[a, center, c]));
                    }
                }
            }
        }
        TermKind::ProperTorsion => {
            for bond in molecule.bonds() {
                let (j, k) = (bond.atom1, bond.atom2);
                for i in molecule.neighbors(j).filter(|&i| i != k) {
                    for l in molecule.neighbors(k).filter(|&l| l != j && l != i) {
                        terms.push(canonical_atoms(kind, &[i, j, k, l]));
                    }
                }
            }
        }
        TermKind::ImproperTorsion => {
            for center in 0..molecule.atom_count() {
                let neighbors: Vec<usize> = molecule.neighbors(center).collect();
                if neighbors.len() == 3 {
                    terms.push(canonical_atoms(
                        kind,
                        &[neighbors[0], center, neighbors[1], neighbors[2]],
                    ));
                }
            }
        }
    }
    terms.sort_unstable();
    terms.dedup();
    terms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::smiles::parse_smiles;

    #[test]
    fn canonical_ordering_reverses_when_smaller() {
        assert_eq!(canonical_atoms(TermKind::Bond, &[3, 1]), vec![1, 3]);
        assert_eq!(canonical_atoms(TermKind::Angle, &[5, 2, 0]), vec![0, 2, 5]);
        assert_eq!(
            canonical_atoms(TermKind::ProperTorsion, &[4, 1, 2, 3]),
            vec![3, 2, 1, 4]
        );
        assert_eq!(
            canonical_atoms(TermKind::ImproperTorsion, &[7, 1, 3, 0]),
            vec![0, 1, 3, 7]
        );
    }

    #[test]
    fn term_counts_for_ethane() {
        let ethane = parse_smiles("[C:1]([H:3])([H:4])([H:5])[C:2]([H:6])([H:7])[H:8]").unwrap();
        assert_eq!(enumerate_terms(&ethane, TermKind::Bond).len(), 7);
        assert_eq!(enumerate_terms(&ethane, TermKind::Angle).len(), 12);
        assert_eq!(enumerate_terms(&ethane, TermKind::ProperTorsion).len(), 9);
        assert!(enumerate_terms(&ethane, TermKind::ImproperTorsion).is_empty());
    }

    #[test]
    fn impropers_are_found_on_trivalent_centers() {
        let formaldehyde = parse_smiles("[C:1](=[O:2])([H:3])[H:4]").unwrap();
        let impropers = enumerate_terms(&formaldehyde, TermKind::ImproperTorsion);
        assert_eq!(impropers, vec![vec![1, 0, 2, 3]]);
    }

    #[test]
    fn ring_torsions_need_all_three_bonds_in_rings() {
        let mol = Arc::new(parse_smiles("C1CCCCC1C").unwrap());
        let in_ring = ValenceTerm::new(TermKind::ProperTorsion, &[0, 1, 2, 3], "t1", mol.clone());
        let exocyclic = ValenceTerm::new(TermKind::ProperTorsion, &[6, 5, 0, 1], "t2", mol);
        assert!(in_ring.is_ring_torsion());
        assert!(!exocyclic.is_ring_torsion());
        assert_eq!(exocyclic.central_bond(), Some((0, 5)));
    }

    #[test]
    fn term_kind_round_trips_through_handler_names() {
        for kind in TermKind::ALL {
            assert_eq!(TermKind::from_handler_name(kind.handler_name()), Some(kind));
        }
        assert_eq!("Angles".parse::<TermKind>(), Ok(TermKind::Angle));
        assert!("vdW".parse::<TermKind>().is_err());
    }
}
