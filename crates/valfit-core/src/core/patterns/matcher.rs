use super::smarts::{AtomExpr, AtomPrimitive, BondExpr, BondPrimitive, SmartsPattern};
use crate::core::chem::molecule::{BondOrder, Molecule};
use std::collections::VecDeque;

/// Backtracking subgraph matcher for one pattern against one molecule.
///
/// Pattern atoms are visited in breadth-first order from the anchored atoms (or from
/// atom 0), so every atom after the first of its component has an already-mapped
/// neighbor that restricts its candidates to the neighbors of an assigned atom.
struct Search<'a> {
    pattern: &'a SmartsPattern,
    molecule: &'a Molecule,
    order: Vec<usize>,
    anchors: Vec<Option<usize>>,
    mapping: Vec<Option<usize>>,
    used: Vec<bool>,
    first_only: bool,
    results: Vec<Vec<usize>>,
}

impl<'a> Search<'a> {
    fn new(
        pattern: &'a SmartsPattern,
        molecule: &'a Molecule,
        anchors: &[(usize, usize)],
        first_only: bool,
    ) -> Self {
        let n = pattern.atoms().len();
        let mut anchor_of = vec![None; n];
        for &(p, m) in anchors {
            anchor_of[p] = Some(m);
        }
        Self {
            pattern,
            molecule,
            order: visit_order(pattern, anchors),
            anchors: anchor_of,
            mapping: vec![None; n],
            used: vec![false; molecule.atom_count()],
            first_only,
            results: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Vec<usize>> {
        if self.pattern.atoms().len() <= self.molecule.atom_count() {
            self.extend(0);
        }
        self.results
    }

    /// Returns true when the search should stop.
    fn extend(&mut self, depth: usize) -> bool {
        if depth == self.order.len() {
            self.results
                .push(self.mapping.iter().map(|m| m.unwrap_or(usize::MAX)).collect());
            return self.first_only;
        }
        let p = self.order[depth];
        for candidate in self.candidates(p) {
            if self.used[candidate] || !self.feasible(p, candidate) {
                continue;
            }
            self.mapping[p] = Some(candidate);
            self.used[candidate] = true;
            let stop = self.extend(depth + 1);
            self.used[candidate] = false;
            self.mapping[p] = None;
            if stop {
                return true;
            }
        }
        false
    }

    fn candidates(&self, p: usize) -> Vec<usize> {
        if let Some(anchor) = self.anchors[p] {
            return if anchor < self.molecule.atom_count() {
                vec![anchor]
            } else {
                Vec::new()
            };
        }
        let mapped_neighbor = self
            .pattern
            .adjacency(p)
            .iter()
            .find_map(|&(q, _)| self.mapping[q]);
        match mapped_neighbor {
            Some(m) => self.molecule.neighbors(m).collect(),
            None => (0..self.molecule.atom_count()).collect(),
        }
    }

    fn feasible(&self, p: usize, m: usize) -> bool {
        if !atom_matches(&self.pattern.atoms()[p].expr, self.molecule, m) {
            return false;
        }
        self.pattern.adjacency(p).iter().all(|&(q, bond)| {
            let Some(mq) = self.mapping[q] else {
                return true;
            };
            match self.molecule.bond_index_between(m, mq) {
                Some(index) => bond_matches(&self.pattern.bonds()[bond].expr, self.molecule, index),
                None => false,
            }
        })
    }
}

fn visit_order(pattern: &SmartsPattern, anchors: &[(usize, usize)]) -> Vec<usize> {
    let n = pattern.atoms().len();
    let mut seen = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let seeds = anchors.iter().map(|&(p, _)| p).chain(0..n);
    for seed in seeds {
        if seen[seed] {
            continue;
        }
        seen[seed] = true;
        let mut queue = VecDeque::from([seed]);
        while let Some(p) = queue.pop_front() {
            order.push(p);
            for &(q, _) in pattern.adjacency(p) {
                if !seen[q] {
                    seen[q] = true;
                    queue.push_back(q);
                }
            }
        }
    }
    order
}

fn atom_matches(expr: &AtomExpr, molecule: &Molecule, atom: usize) -> bool {
    match expr {
        AtomExpr::Primitive(p) => primitive_matches(p, molecule, atom),
        AtomExpr::Not(inner) => !atom_matches(inner, molecule, atom),
        AtomExpr::And(terms) => terms.iter().all(|t| atom_matches(t, molecule, atom)),
        AtomExpr::Or(terms) => terms.iter().any(|t| atom_matches(t, molecule, atom)),
    }
}

fn primitive_matches(primitive: &AtomPrimitive, molecule: &Molecule, atom: usize) -> bool {
    let Some(a) = molecule.atom(atom) else {
        return false;
    };
    let rings = molecule.rings();
    match primitive {
        AtomPrimitive::Wildcard => true,
        AtomPrimitive::AtomicNumber(z) => a.atomic_number == *z,
        AtomPrimitive::Element {
            atomic_number,
            aromatic,
        } => a.atomic_number == *atomic_number && a.is_aromatic == *aromatic,
        AtomPrimitive::Aromatic => a.is_aromatic,
        AtomPrimitive::Aliphatic => !a.is_aromatic,
        AtomPrimitive::Degree(n) => molecule.degree(atom) == *n as usize,
        AtomPrimitive::TotalHydrogens(n) => molecule.total_hydrogens(atom) == *n as usize,
        AtomPrimitive::ImplicitHydrogens(n) => a.implicit_hydrogens == *n,
        AtomPrimitive::Connectivity(n) => molecule.connectivity(atom) == *n as usize,
        AtomPrimitive::RingConnectivity(n) => rings.ring_connectivity(atom) == *n as usize,
        AtomPrimitive::InRing => rings.is_atom_in_ring(atom),
        AtomPrimitive::RingCount(0) | AtomPrimitive::RingSize(0) => !rings.is_atom_in_ring(atom),
        AtomPrimitive::RingCount(n) => rings.ring_count(atom) == *n as usize,
        AtomPrimitive::RingSize(n) => rings.smallest_ring_size(atom) == Some(*n as usize),
        AtomPrimitive::Valence(n) => molecule.total_valence(atom) == *n as usize,
        AtomPrimitive::Charge(c) => a.formal_charge == *c,
        AtomPrimitive::Recursive(inner) => matches_anchored(inner, molecule, &[(0, atom)]),
    }
}

fn bond_matches(expr: &BondExpr, molecule: &Molecule, bond: usize) -> bool {
    match expr {
        BondExpr::Primitive(p) => {
            let order = molecule.bonds()[bond].order;
            match p {
                BondPrimitive::Implicit => {
                    matches!(order, BondOrder::Single | BondOrder::Aromatic)
                }
                BondPrimitive::Single => order == BondOrder::Single,
                BondPrimitive::Double => order == BondOrder::Double,
                BondPrimitive::Triple => order == BondOrder::Triple,
                BondPrimitive::Aromatic => order == BondOrder::Aromatic,
                BondPrimitive::Any => true,
                BondPrimitive::Ring => molecule.rings().is_bond_in_ring(bond),
            }
        }
        BondExpr::Not(inner) => !bond_matches(inner, molecule, bond),
        BondExpr::And(terms) => terms.iter().all(|t| bond_matches(t, molecule, bond)),
        BondExpr::Or(terms) => terms.iter().any(|t| bond_matches(t, molecule, bond)),
    }
}

/// Every embedding of the pattern, as molecule atom indices per pattern atom.
pub fn find_all(pattern: &SmartsPattern, molecule: &Molecule) -> Vec<Vec<usize>> {
    Search::new(pattern, molecule, &[], false).run()
}

/// True if the pattern occurs anywhere in the molecule.
pub fn has_match(pattern: &SmartsPattern, molecule: &Molecule) -> bool {
    !Search::new(pattern, molecule, &[], true).run().is_empty()
}

/// True if an embedding exists with each `(pattern_atom, molecule_atom)` pair fixed.
pub fn matches_anchored(
    pattern: &SmartsPattern,
    molecule: &Molecule,
    anchors: &[(usize, usize)],
) -> bool {
    if anchors.iter().any(|&(p, _)| p >= pattern.atoms().len()) {
        return false;
    }
    !Search::new(pattern, molecule, anchors, true).run().is_empty()
}

/// Distinct tuples of molecule atoms matched by the tagged pattern atoms, in tag order.
///
/// Embeddings that differ only in untagged atoms collapse to a single tuple; the
/// result keeps first-seen order.
pub fn tagged_matches(pattern: &SmartsPattern, molecule: &Molecule) -> Vec<Vec<usize>> {
    let tagged = pattern.tagged_atoms();
    let mut tuples: Vec<Vec<usize>> = Vec::new();
    for embedding in find_all(pattern, molecule) {
        let tuple: Vec<usize> = tagged.iter().map(|&p| embedding[p]).collect();
        if !tuples.contains(&tuple) {
            tuples.push(tuple);
        }
    }
    tuples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::smiles::parse_smiles;

    fn pattern(smarts: &str) -> SmartsPattern {
        SmartsPattern::parse(smarts).unwrap()
    }

    #[test]
    fn simple_substructures() {
        let ethanol = parse_smiles("CCO").unwrap();
        assert!(has_match(&pattern("[OX2H1]"), &ethanol));
        assert!(has_match(&pattern("C-O"), &ethanol));
        assert!(!has_match(&pattern("C=O"), &ethanol));
        assert!(!has_match(&pattern("c"), &ethanol));
    }

    #[test]
    fn implicit_bond_matches_single_and_aromatic_only() {
        let benzene = parse_smiles("c1ccccc1").unwrap();
        assert!(has_match(&pattern("cc"), &benzene));
        let ethene = parse_smiles("C=C").unwrap();
        assert!(!has_match(&pattern("CC"), &ethene));
        assert!(has_match(&pattern("C~C"), &ethene));
    }

    #[test]
    fn ring_primitives() {
        let mol = parse_smiles("C1CCCCC1CC").unwrap();
        assert!(has_match(&pattern("[r6]"), &mol));
        assert!(has_match(&pattern("[R0]"), &mol));
        assert!(has_match(&pattern("[C;R]@[C;R]"), &mol));
        assert!(has_match(&pattern("[C;R]!@[C;R0]"), &mol));
        assert!(!has_match(&pattern("[r5]"), &mol));
    }

    #[test]
    fn recursive_environment() {
        let acid = parse_smiles("CC(=O)O").unwrap();
        let hydroxyl_on_carbonyl = pattern("[OX2;$(O-C=O)]");
        assert!(has_match(&hydroxyl_on_carbonyl, &acid));
        let ethanol = parse_smiles("CCO").unwrap();
        assert!(!has_match(&hydroxyl_on_carbonyl, &ethanol));
    }

    #[test]
    fn tagged_tuples_cover_all_bonds_of_the_type() {
        let ethane = parse_smiles("[C:1]([H:3])([H:4])([H:5])[C:2]([H:6])([H:7])[H:8]").unwrap();
        let ch = pattern("[#6X4:1]-[#1:2]");
        let tuples = tagged_matches(&ch, &ethane);
        assert_eq!(tuples.len(), 6);
        assert!(tuples.iter().all(|t| t[0] < 2 && t[1] >= 2));
    }

    #[test]
    fn anchored_match_respects_the_fixed_atoms() {
        let mol = parse_smiles("OCC").unwrap();
        let co = pattern("[#6:1]-[#8:2]");
        assert!(matches_anchored(&co, &mol, &[(0, 1), (1, 0)]));
        assert!(!matches_anchored(&co, &mol, &[(0, 2), (1, 0)]));
        assert!(!matches_anchored(&co, &mol, &[(0, 0), (1, 1)]));
        assert!(!matches_anchored(&co, &mol, &[(5, 0)]));
    }

    #[test]
    fn pattern_larger_than_molecule_never_matches() {
        let methane = parse_smiles("C").unwrap();
        assert!(!has_match(&pattern("CC"), &methane));
    }
}
