use super::molecule::{Atom, Bond, BondOrder};
use std::collections::{BTreeSet, VecDeque};

/// Ring perception results for a molecular graph.
///
/// Rings are the smallest cycles passing through each ring bond, deduplicated by
/// atom set. For the fused and bridged systems found in small organic molecules this
/// coincides with the SSSR plus any equally small alternatives.
#[derive(Debug, Clone, Default)]
pub struct RingInfo {
    bond_in_ring: Vec<bool>,
    ring_bond_count: Vec<usize>,
    smallest_ring: Vec<Option<usize>>,
    ring_membership: Vec<usize>,
    rings: Vec<Vec<usize>>,
}

impl RingInfo {
    pub(crate) fn perceive(
        atom_count: usize,
        bonds: &[Bond],
        adjacency: &[Vec<(usize, usize)>],
    ) -> Self {
        let mut bond_in_ring = vec![false; bonds.len()];
        let mut ring_bond_count = vec![0usize; atom_count];
        let mut smallest_ring: Vec<Option<usize>> = vec![None; atom_count];
        let mut seen: BTreeSet<Vec<usize>> = BTreeSet::new();
        let mut rings = Vec::new();

        for (index, bond) in bonds.iter().enumerate() {
            let Some(path) = shortest_path_avoiding(adjacency, bond.atom1, bond.atom2, index)
            else {
                continue;
            };
            bond_in_ring[index] = true;
            ring_bond_count[bond.atom1] += 1;
            ring_bond_count[bond.atom2] += 1;

            let size = path.len();
            for &atom in &path {
                let current = smallest_ring[atom].get_or_insert(size);
                if size < *current {
                    *current = size;
                }
            }

            let mut key = path.clone();
            key.sort_unstable();
            if seen.insert(key) {
                rings.push(path);
            }
        }

        let mut ring_membership = vec![0usize; atom_count];
        for ring in &rings {
            for &atom in ring {
                ring_membership[atom] += 1;
            }
        }

        Self {
            bond_in_ring,
            ring_bond_count,
            smallest_ring,
            ring_membership,
            rings,
        }
    }

    #[inline]
    pub fn is_bond_in_ring(&self, bond: usize) -> bool {
        self.bond_in_ring.get(bond).copied().unwrap_or(false)
    }

    #[inline]
    pub fn is_atom_in_ring(&self, atom: usize) -> bool {
        self.ring_bond_count.get(atom).is_some_and(|&n| n > 0)
    }

    /// Number of ring bonds on the atom (SMARTS `x`).
    #[inline]
    pub fn ring_connectivity(&self, atom: usize) -> usize {
        self.ring_bond_count.get(atom).copied().unwrap_or(0)
    }

    /// Size of the smallest ring containing the atom (SMARTS `r`).
    #[inline]
    pub fn smallest_ring_size(&self, atom: usize) -> Option<usize> {
        self.smallest_ring.get(atom).copied().flatten()
    }

    /// Number of perceived rings containing the atom (SMARTS `R<n>`).
    #[inline]
    pub fn ring_count(&self, atom: usize) -> usize {
        self.ring_membership.get(atom).copied().unwrap_or(0)
    }

    /// Perceived rings as atom cycles in traversal order.
    #[inline]
    pub fn rings(&self) -> &[Vec<usize>] {
        &self.rings
    }
}

/// Breadth-first shortest path from `start` to `goal` that does not use `skip_bond`.
///
/// The returned path includes both endpoints, so together with the skipped bond it
/// forms a cycle of `path.len()` atoms.
fn shortest_path_avoiding(
    adjacency: &[Vec<(usize, usize)>],
    start: usize,
    goal: usize,
    skip_bond: usize,
) -> Option<Vec<usize>> {
    let mut previous: Vec<Option<usize>> = vec![None; adjacency.len()];
    let mut visited = vec![false; adjacency.len()];
    let mut queue = VecDeque::new();
    visited[start] = true;
    queue.push_back(start);

    while let Some(atom) = queue.pop_front() {
        if atom == goal {
            let mut path = vec![goal];
            let mut cursor = goal;
            while let Some(p) = previous[cursor] {
                path.push(p);
                cursor = p;
            }
            path.reverse();
            return Some(path);
        }
        for &(next, bond) in &adjacency[atom] {
            if bond == skip_bond || visited[next] {
                continue;
            }
            visited[next] = true;
            previous[next] = Some(atom);
            queue.push_back(next);
        }
    }
    None
}

/// Converts Kekulé rings to aromatic form and cleans up stray aromatic bonds.
///
/// A ring is aromatic when every member carries exactly one double bond to a ring
/// partner (or is already aromatic) and the ring holds 4n+2 such atoms. Heteroatoms
/// donating lone pairs are not considered, which mirrors the MDL model used by
/// SMIRNOFF force fields. Aromatic bonds that end up outside any ring become single.
pub(crate) fn perceive_aromaticity(
    atoms: &mut [Atom],
    bonds: &mut [Bond],
    adjacency: &[Vec<(usize, usize)>],
    ring_info: &RingInfo,
) {
    let contributes = |atom: usize, atoms: &[Atom], bonds: &[Bond]| -> bool {
        if atoms[atom].is_aromatic {
            return true;
        }
        let ring_doubles = adjacency[atom]
            .iter()
            .filter(|&&(_, b)| bonds[b].order == BondOrder::Double && ring_info.is_bond_in_ring(b))
            .count();
        let exocyclic_doubles = adjacency[atom]
            .iter()
            .filter(|&&(_, b)| bonds[b].order == BondOrder::Double && !ring_info.is_bond_in_ring(b))
            .count();
        ring_doubles == 1 && exocyclic_doubles == 0
    };

    loop {
        let mut changed = false;
        for ring in ring_info.rings() {
            let already = ring.iter().all(|&a| atoms[a].is_aromatic)
                && ring_bonds(ring, adjacency)
                    .all(|b| bonds[b].order == BondOrder::Aromatic);
            if already || ring.len() % 4 != 2 {
                continue;
            }
            if !ring.iter().all(|&a| contributes(a, atoms, bonds)) {
                continue;
            }
            for &atom in ring {
                atoms[atom].is_aromatic = true;
            }
            let members: Vec<usize> = ring_bonds(ring, adjacency).collect();
            for b in members {
                bonds[b].order = BondOrder::Aromatic;
            }
            changed = true;
        }
        if !changed {
            break;
        }
    }

    for (index, bond) in bonds.iter_mut().enumerate() {
        if bond.order == BondOrder::Aromatic && !ring_info.is_bond_in_ring(index) {
            bond.order = BondOrder::Single;
        }
    }
}

fn ring_bonds<'a>(
    ring: &'a [usize],
    adjacency: &'a [Vec<(usize, usize)>],
) -> impl Iterator<Item = usize> + 'a {
    (0..ring.len()).filter_map(move |i| {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        adjacency[a]
            .iter()
            .find(|&&(n, _)| n == b)
            .map(|&(_, bond)| bond)
    })
}

#[cfg(test)]
mod tests {
    use crate::core::chem::molecule::BondOrder;
    use crate::core::chem::smiles::parse_smiles;

    #[test]
    fn cyclohexane_has_one_six_membered_ring() {
        let mol = parse_smiles("C1CCCCC1").unwrap();
        let rings = mol.rings();
        assert_eq!(rings.rings().len(), 1);
        assert_eq!(rings.rings()[0].len(), 6);
        for atom in 0..6 {
            assert!(rings.is_atom_in_ring(atom));
            assert_eq!(rings.smallest_ring_size(atom), Some(6));
            assert_eq!(rings.ring_connectivity(atom), 2);
        }
        assert!(mol.atoms().iter().all(|a| !a.is_aromatic));
    }

    #[test]
    fn kekule_benzene_is_perceived_as_aromatic() {
        let mol = parse_smiles("C1=CC=CC=C1").unwrap();
        assert!(mol.atoms().iter().all(|a| a.is_aromatic));
        assert!(mol.bonds().iter().all(|b| b.order == BondOrder::Aromatic));
        let lower = parse_smiles("c1ccccc1").unwrap();
        assert_eq!(mol.canonical_key(), lower.canonical_key());
    }

    #[test]
    fn kekule_naphthalene_marks_both_rings() {
        let mol = parse_smiles("C1=CC=C2C=CC=CC2=C1").unwrap();
        assert_eq!(mol.rings().rings().len(), 2);
        assert!(mol.atoms().iter().all(|a| a.is_aromatic));
        let fusion: Vec<usize> = (0..mol.atom_count())
            .filter(|&a| mol.rings().ring_connectivity(a) == 3)
            .collect();
        assert_eq!(fusion.len(), 2);
        assert_eq!(mol.rings().ring_count(fusion[0]), 2);
    }

    #[test]
    fn biphenyl_linker_is_not_a_ring_bond() {
        let mol = parse_smiles("c1ccccc1-c1ccccc1").unwrap();
        let linker = mol.bond_index_between(5, 6).unwrap();
        assert!(!mol.rings().is_bond_in_ring(linker));
        assert_eq!(mol.bonds()[linker].order, BondOrder::Single);
    }

    #[test]
    fn cyclohexenone_stays_aliphatic() {
        let mol = parse_smiles("O=C1C=CCCC1").unwrap();
        assert!(mol.atoms().iter().all(|a| !a.is_aromatic));
    }
}
