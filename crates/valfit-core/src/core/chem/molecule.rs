use super::canonical;
use super::element;
use super::rings::{self, RingInfo};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Order of a covalent bond between two atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum BondOrder {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Integral contribution of the bond to an atom's valence.
    ///
    /// Aromatic bonds count as one; the extra pi contribution of aromatic atoms is
    /// accounted for separately when implicit hydrogens are derived.
    pub fn valence_contribution(self) -> u8 {
        match self {
            Self::Single | Self::Aromatic => 1,
            Self::Double => 2,
            Self::Triple => 3,
        }
    }

    pub(crate) fn code(self) -> u8 {
        self as u8 + 1
    }
}

#[derive(Debug, Error)]
#[error("Invalid bond order string")]
pub struct ParseBondOrderError;

impl FromStr for BondOrder {
    type Err = ParseBondOrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
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
                Self::Single => "Single",
                Self::Double => "Double",
                Self::Triple => "Triple",
                Self::Aromatic => "Aromatic",
            }
        )
    }
}

/// A single atom of a [`Molecule`].
///
/// Atoms carry only the graph-level chemistry needed for pattern matching and
/// canonicalization. Coordinates live on the records that reference the molecule,
/// so one molecule can be shared by many conformers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    /// Atomic number; zero denotes a wildcard/dummy atom.
    pub atomic_number: u8,
    /// Formal charge in elementary charge units.
    pub formal_charge: i8,
    /// Whether the atom is part of an aromatic system.
    pub is_aromatic: bool,
    /// Hydrogens attached to this atom that are not explicit atoms of the graph.
    pub implicit_hydrogens: u8,
    /// Atom-map index from the source notation (e.g. `[C:3]`), if any.
    pub map_index: Option<u32>,
}

impl Atom {
    pub fn new(atomic_number: u8) -> Self {
        Self {
            atomic_number,
            formal_charge: 0,
            is_aromatic: false,
            implicit_hydrogens: 0,
            map_index: None,
        }
    }

    #[inline]
    pub fn is_hydrogen(&self) -> bool {
        self.atomic_number == 1
    }
}

/// A bond between two atoms, identified by their indices in the owning molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bond {
    pub atom1: usize,
    pub atom2: usize,
    pub order: BondOrder,
}

impl Bond {
    pub fn new(atom1: usize, atom2: usize, order: BondOrder) -> Self {
        Self {
            atom1,
            atom2,
            order,
        }
    }

    pub fn contains(&self, atom: usize) -> bool {
        self.atom1 == atom || self.atom2 == atom
    }

    /// Returns the atom on the other end of the bond, if `atom` is one of its ends.
    pub fn partner(&self, atom: usize) -> Option<usize> {
        if self.atom1 == atom {
            Some(self.atom2)
        } else if self.atom2 == atom {
            Some(self.atom1)
        } else {
            None
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoleculeError {
    #[error("Bond {bond} references atom {atom}, but the molecule has only {count} atoms")]
    AtomOutOfRange {
        bond: usize,
        atom: usize,
        count: usize,
    },
    #[error("Atom {0} is bonded to itself")]
    SelfBond(usize),
    #[error("Atoms {0} and {1} are bonded more than once")]
    DuplicateBond(usize, usize),
}

/// An immutable chemical graph with perceived rings, aromaticity and a canonical key.
///
/// A molecule is the unit of deduplication and pattern matching. Once constructed it
/// never changes; records share it through `Arc<Molecule>`. Two molecules describing
/// the same structure (regardless of atom order or hydrogen representation) have
/// equal [`canonical_key`](Molecule::canonical_key)s.
#[derive(Debug, Clone)]
pub struct Molecule {
    /// Atoms in record order.
    atoms: Vec<Atom>,
    /// Bonds between atoms, indexed by position.
    bonds: Vec<Bond>,
    /// For each atom, the `(neighbor, bond index)` pairs.
    adjacency: Vec<Vec<(usize, usize)>>,
    /// Ring membership and smallest ring sizes.
    rings: RingInfo,
    /// Canonical structural key.
    key: String,
}

impl Molecule {
    /// Builds a molecule from atoms and bonds.
    ///
    /// Ring membership is perceived from the bond graph, Kekulé rings that satisfy the
    /// aromaticity model are converted to aromatic form, aromatic bonds outside rings are
    /// demoted to single bonds, and the canonical key is computed.
    ///
    /// # Errors
    ///
    /// Returns [`MoleculeError`] if a bond references a missing atom, bonds an atom to
    /// itself, or duplicates another bond.
    pub fn new(mut atoms: Vec<Atom>, mut bonds: Vec<Bond>) -> Result<Self, MoleculeError> {
        let count = atoms.len();
        let mut adjacency = vec![Vec::new(); count];
        for (index, bond) in bonds.iter().enumerate() {
            for atom in [bond.atom1, bond.atom2] {
                if atom >= count {
                    return Err(MoleculeError::AtomOutOfRange {
                        bond: index,
                        atom,
                        count,
                    });
                }
            }
            if bond.atom1 == bond.atom2 {
                return Err(MoleculeError::SelfBond(bond.atom1));
            }
            if adjacency[bond.atom1]
                .iter()
                .any(|&(n, _)| n == bond.atom2)
            {
                return Err(MoleculeError::DuplicateBond(bond.atom1, bond.atom2));
            }
            adjacency[bond.atom1].push((bond.atom2, index));
            adjacency[bond.atom2].push((bond.atom1, index));
        }

        let ring_info = RingInfo::perceive(count, &bonds, &adjacency);
        rings::perceive_aromaticity(&mut atoms, &mut bonds, &adjacency, &ring_info);

        let key = canonical::canonical_key(&atoms, &bonds, &adjacency);

        Ok(Self {
            atoms,
            bonds,
            adjacency,
            rings: ring_info,
            key,
        })
    }

    #[inline]
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    #[inline]
    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    #[inline]
    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    #[inline]
    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    #[inline]
    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    /// Returns the `(neighbor, bond index)` pairs of an atom.
    #[inline]
    pub fn adjacency(&self, atom: usize) -> &[(usize, usize)] {
        &self.adjacency[atom]
    }

    pub fn neighbors(&self, atom: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency[atom].iter().map(|&(n, _)| n)
    }

    /// Number of explicit neighbors.
    #[inline]
    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len()
    }

    /// Explicit plus implicit connections (SMARTS `X`).
    pub fn connectivity(&self, atom: usize) -> usize {
        self.degree(atom) + self.atoms[atom].implicit_hydrogens as usize
    }

    /// Number of attached hydrogens, implicit and explicit.
    pub fn total_hydrogens(&self, atom: usize) -> usize {
        let explicit = self
            .neighbors(atom)
            .filter(|&n| self.atoms[n].is_hydrogen())
            .count();
        explicit + self.atoms[atom].implicit_hydrogens as usize
    }

    /// Number of explicit non-hydrogen neighbors (SMARTS `D` counts all explicit neighbors).
    pub fn heavy_degree(&self, atom: usize) -> usize {
        self.neighbors(atom)
            .filter(|&n| !self.atoms[n].is_hydrogen())
            .count()
    }

    /// Sum of bond valence contributions plus implicit hydrogens (SMARTS `v`).
    pub fn total_valence(&self, atom: usize) -> usize {
        let mut sum = self.atoms[atom].implicit_hydrogens as usize;
        let mut aromatic = false;
        for &(_, b) in &self.adjacency[atom] {
            let order = self.bonds[b].order;
            aromatic |= order == BondOrder::Aromatic;
            sum += order.valence_contribution() as usize;
        }
        // An aromatic atom donates one extra bond in its Kekulé form only when that
        // still lands on a standard valence (benzene carbon yes, pyrrole nitrogen no).
        let valences = element::default_valences(self.atoms[atom].atomic_number);
        if aromatic && valences.iter().any(|&v| v as usize == sum + 1) {
            sum + 1
        } else {
            sum
        }
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.atoms.iter().filter(|a| !a.is_hydrogen()).count()
    }

    pub fn bond_index_between(&self, a: usize, b: usize) -> Option<usize> {
        self.adjacency
            .get(a)?
            .iter()
            .find(|&&(n, _)| n == b)
            .map(|&(_, index)| index)
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<&Bond> {
        self.bond_index_between(a, b).map(|index| &self.bonds[index])
    }

    #[inline]
    pub fn are_bonded(&self, a: usize, b: usize) -> bool {
        self.bond_index_between(a, b).is_some()
    }

    #[inline]
    pub fn rings(&self) -> &RingInfo {
        &self.rings
    }

    /// Whether the bond between `a` and `b` exists and lies in a ring.
    pub fn is_ring_bond(&self, a: usize, b: usize) -> bool {
        self.bond_index_between(a, b)
            .is_some_and(|index| self.rings.is_bond_in_ring(index))
    }

    #[inline]
    pub fn canonical_key(&self) -> &str {
        &self.key
    }

    /// Whether every atom carries a distinct map index.
    pub fn is_fully_mapped(&self) -> bool {
        let mut seen = std::collections::HashSet::with_capacity(self.atoms.len());
        self.atoms
            .iter()
            .all(|a| a.map_index.is_some_and(|m| seen.insert(m)))
    }
}

impl PartialEq for Molecule {
    /// Structural equivalence: two molecules are equal when their canonical keys match.
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Molecule {}
