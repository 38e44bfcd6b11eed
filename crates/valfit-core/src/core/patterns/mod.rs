//! # Pattern Matching Module
//!
//! Answers the question "does this molecule, or this valence term, match any pattern in a
//! set?" for the two notations used by exclusion lists.
//!
//! - **SMARTS** patterns are substructure queries. When a pattern carries map tags it is
//!   anchored: the tagged atoms must land on the term's atoms, in forward or reverse order
//!   for bonds, angles and propers, and with the central atom fixed for impropers. An
//!   untagged pattern is a whole-molecule query that matches every term of a molecule
//!   containing it.
//! - **SMILES** patterns denote whole molecules and match by canonical structural key.
//!
//! The [`PatternMatcher`] trait is the seam between the exclusion logic and the
//! chemistry engine.

pub mod matcher;
pub mod smarts;

use crate::core::chem::molecule::Molecule;
use crate::core::chem::smiles::{SmilesError, parse_smiles};
use crate::core::models::term::{TermKind, ValenceTerm};
use itertools::Itertools;
use smarts::{SmartsError, SmartsPattern};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Smarts,
    Smiles,
}

pub trait PatternMatcher {
    /// True if any pattern matches the whole molecule.
    fn matches_molecule(&self, molecule: &Molecule) -> bool;

    /// True if any pattern matches the term given by `atoms` in `molecule`.
    fn matches_term(&self, molecule: &Molecule, kind: TermKind, atoms: &[usize]) -> bool;
}

/// A list of parsed SMARTS patterns.
#[derive(Debug, Clone, Default)]
pub struct SmartsSet {
    patterns: Vec<SmartsPattern>,
}

impl SmartsSet {
    pub fn new(patterns: Vec<SmartsPattern>) -> Self {
        Self { patterns }
    }

    pub fn parse<S: AsRef<str>>(sources: &[S]) -> Result<Self, SmartsError> {
        let patterns = sources
            .iter()
            .map(|s| SmartsPattern::parse(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[SmartsPattern] {
        &self.patterns
    }
}

/// Candidate assignments of a term's atoms to tag positions 1..=n.
fn term_orderings(kind: TermKind, atoms: &[usize]) -> Vec<Vec<usize>> {
    match kind {
        TermKind::ImproperTorsion if atoms.len() == 4 => {
            let center = atoms[1];
            [atoms[0], atoms[2], atoms[3]]
                .into_iter()
                .permutations(3)
                .map(|outer| vec![outer[0], center, outer[1], outer[2]])
                .collect()
        }
        _ => {
            let forward = atoms.to_vec();
            let reverse: Vec<usize> = atoms.iter().rev().copied().collect();
            if forward == reverse {
                vec![forward]
            } else {
                vec![forward, reverse]
            }
        }
    }
}

fn pattern_matches_term(
    pattern: &SmartsPattern,
    molecule: &Molecule,
    kind: TermKind,
    atoms: &[usize],
) -> bool {
    let tagged = pattern.tagged_atoms();
    if tagged.is_empty() {
        return matcher::has_match(pattern, molecule);
    }
    if tagged.len() != atoms.len() {
        return false;
    }
    term_orderings(kind, atoms).iter().any(|ordering| {
        let anchors: Vec<(usize, usize)> = tagged
            .iter()
            .copied()
            .zip(ordering.iter().copied())
            .collect();
        matcher::matches_anchored(pattern, molecule, &anchors)
    })
}

impl PatternMatcher for SmartsSet {
    fn matches_molecule(&self, molecule: &Molecule) -> bool {
        self.patterns
            .iter()
            .any(|p| matcher::has_match(p, molecule))
    }

    fn matches_term(&self, molecule: &Molecule, kind: TermKind, atoms: &[usize]) -> bool {
        self.patterns
            .iter()
            .any(|p| pattern_matches_term(p, molecule, kind, atoms))
    }
}

/// Whole-molecule patterns compared by canonical key.
#[derive(Debug, Clone, Default)]
pub struct SmilesSet {
    keys: HashSet<String>,
    sources: Vec<String>,
}

impl SmilesSet {
    pub fn parse<S: AsRef<str>>(sources: &[S]) -> Result<Self, SmilesError> {
        let mut set = Self::default();
        for source in sources {
            set.insert(source.as_ref())?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, smiles: &str) -> Result<(), SmilesError> {
        let molecule = parse_smiles(smiles)?;
        self.keys.insert(molecule.canonical_key().to_string());
        self.sources.push(smiles.to_string());
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn contains_key(&self, canonical_key: &str) -> bool {
        self.keys.contains(canonical_key)
    }
}

impl PatternMatcher for SmilesSet {
    fn matches_molecule(&self, molecule: &Molecule) -> bool {
        self.contains_key(molecule.canonical_key())
    }

    fn matches_term(&self, molecule: &Molecule, _kind: TermKind, _atoms: &[usize]) -> bool {
        self.matches_molecule(molecule)
    }
}

/// A pattern set of either notation.
#[derive(Debug, Clone)]
pub enum PatternSet {
    Smarts(SmartsSet),
    Smiles(SmilesSet),
}

impl PatternSet {
    pub fn kind(&self) -> PatternKind {
        match self {
            PatternSet::Smarts(_) => PatternKind::Smarts,
            PatternSet::Smiles(_) => PatternKind::Smiles,
        }
    }

    fn matcher(&self) -> &dyn PatternMatcher {
        match self {
            PatternSet::Smarts(set) => set,
            PatternSet::Smiles(set) => set,
        }
    }
}

/// What a pattern set is matched against.
#[derive(Debug, Clone, Copy)]
pub enum MatchTarget<'a> {
    Molecule(&'a Molecule),
    Term(&'a ValenceTerm),
}

/// True iff at least one pattern of the set matches the target.
pub fn matches(target: MatchTarget<'_>, patterns: &PatternSet) -> bool {
    let matcher = patterns.matcher();
    match target {
        MatchTarget::Molecule(molecule) => matcher.matches_molecule(molecule),
        MatchTarget::Term(term) => matcher.matches_term(&term.molecule, term.kind, &term.atoms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn molecule(smiles: &str) -> Arc<Molecule> {
        Arc::new(parse_smiles(smiles).unwrap())
    }

    fn smarts(sources: &[&str]) -> PatternSet {
        PatternSet::Smarts(SmartsSet::parse(sources).unwrap())
    }

    #[test]
    fn empty_sets_never_match() {
        let mol = molecule("CCO");
        let term = ValenceTerm::new(TermKind::Bond, &[0, 1], "b1", mol.clone());
        assert!(!matches(MatchTarget::Term(&term), &smarts(&[])));
        let empty_smiles = PatternSet::Smiles(SmilesSet::default());
        assert!(!matches(MatchTarget::Molecule(&mol), &empty_smiles));
    }

    #[test]
    fn tagged_pattern_matches_in_either_direction() {
        let mol = molecule("CCO");
        let set = smarts(&["[#8:1]-[#6:2]"]);
        let co = ValenceTerm::new(TermKind::Bond, &[1, 2], "b1", mol.clone());
        let cc = ValenceTerm::new(TermKind::Bond, &[0, 1], "b1", mol);
        assert!(matches(MatchTarget::Term(&co), &set));
        assert!(!matches(MatchTarget::Term(&cc), &set));
    }

    #[test]
    fn tag_count_must_equal_term_size() {
        let mol = molecule("CCO");
        let set = smarts(&["[#6:1]-[#6:2]-[#8:3]"]);
        let bond = ValenceTerm::new(TermKind::Bond, &[0, 1], "b1", mol.clone());
        let angle = ValenceTerm::new(TermKind::Angle, &[0, 1, 2], "a1", mol);
        assert!(!matches(MatchTarget::Term(&bond), &set));
        assert!(matches(MatchTarget::Term(&angle), &set));
    }

    #[test]
    fn untagged_pattern_applies_to_the_whole_molecule() {
        let mol = molecule("CCO");
        let set = smarts(&["[OX2H1]"]);
        let cc = ValenceTerm::new(TermKind::Bond, &[0, 1], "b1", mol.clone());
        assert!(matches(MatchTarget::Term(&cc), &set));
        assert!(matches(MatchTarget::Molecule(&mol), &set));
        assert!(!matches(MatchTarget::Molecule(&molecule("CCC")), &set));
    }

    #[test]
    fn improper_outer_atoms_may_permute() {
        let mol = molecule("[C:1](=[O:2])([H:3])[N:4]");
        let improper = ValenceTerm::new(TermKind::ImproperTorsion, &[1, 0, 2, 3], "i1", mol);
        let set = smarts(&["[#7:1]~[#6X3:2](~[#1:3])~[#8:4]"]);
        assert!(matches(MatchTarget::Term(&improper), &set));
        let wrong_center = smarts(&["[#6:1]~[#7:2](~[*:3])~[*:4]"]);
        assert!(!matches(MatchTarget::Term(&improper), &wrong_center));
    }

    #[test]
    fn smiles_match_whole_molecules_only() {
        let set = PatternSet::Smiles(SmilesSet::parse(&["OCC"]).unwrap());
        assert_eq!(set.kind(), PatternKind::Smiles);
        let ethanol = molecule("[C:1]([H:4])([H:5])([H:6])[C:2]([H:7])([H:8])[O:3][H:9]");
        assert!(matches(MatchTarget::Molecule(&ethanol), &set));
        assert!(!matches(MatchTarget::Molecule(&molecule("CCCO")), &set));
        let term = ValenceTerm::new(TermKind::Bond, &[0, 1], "b1", ethanol);
        assert!(matches(MatchTarget::Term(&term), &set));
    }
}
