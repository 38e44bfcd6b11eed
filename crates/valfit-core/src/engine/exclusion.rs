use super::config::ExclusionFiles;
use crate::core::io::exclusions::{self, PatternError};
use crate::core::models::term::ValenceTerm;
use crate::core::patterns::{PatternMatcher, SmartsSet, SmilesSet};
use std::collections::BTreeSet;
use tracing::debug;

/// Outcome of the eligibility rules for one term, in rule order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Eligibility {
    /// Torsion whose parameter is on the ring-torsion whitelist.
    Whitelisted,
    ExcludedBySmarts,
    ExcludedBySmiles,
    Eligible,
}

impl Eligibility {
    #[inline]
    pub fn is_eligible(self) -> bool {
        matches!(self, Eligibility::Whitelisted | Eligibility::Eligible)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    pub ring_torsion_whitelist: BTreeSet<String>,
    pub smarts: SmartsSet,
    pub smiles: SmilesSet,
}

impl ExclusionSet {
    /// Loads every configured list; absent files mean empty lists.
    pub fn load(files: &ExclusionFiles) -> Result<Self, PatternError> {
        let mut set = Self::default();
        if let Some(path) = &files.ring_torsions {
            set.ring_torsion_whitelist = exclusions::load_ring_torsions(path)?;
        }
        if let Some(path) = &files.smarts {
            set.smarts = exclusions::load_smarts(path)?;
        }
        if let Some(path) = &files.smiles {
            set.smiles = exclusions::load_smiles(path)?;
        }
        debug!(
            ring_torsions = set.ring_torsion_whitelist.len(),
            smarts = set.smarts.len(),
            smiles = set.smiles.len(),
            "Loaded exclusion lists"
        );
        Ok(set)
    }

    pub fn is_whitelisted_torsion(&self, term: &ValenceTerm) -> bool {
        term.is_torsion() && self.ring_torsion_whitelist.contains(&term.parameter_id)
    }

    /// Applies the rules in order; the first decisive one wins.
    ///
    /// 1. whitelisted torsion: eligible, whatever the blacklists say
    /// 2. term matches a SMARTS entry: excluded
    /// 3. molecule matches a SMILES entry: excluded
    /// 4. otherwise eligible
    pub fn classify(&self, term: &ValenceTerm) -> Eligibility {
        if self.is_whitelisted_torsion(term) {
            return Eligibility::Whitelisted;
        }
        if self.smarts.matches_term(&term.molecule, term.kind, &term.atoms) {
            return Eligibility::ExcludedBySmarts;
        }
        if self.smiles.matches_molecule(&term.molecule) {
            return Eligibility::ExcludedBySmiles;
        }
        Eligibility::Eligible
    }

    #[inline]
    pub fn is_eligible(&self, term: &ValenceTerm) -> bool {
        self.classify(term).is_eligible()
    }
}

pub fn is_eligible(term: &ValenceTerm, exclusions: &ExclusionSet) -> bool {
    exclusions.is_eligible(term)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::molecule::Molecule;
    use crate::core::chem::smiles::parse_smiles;
    use crate::core::models::term::TermKind;
    use std::sync::Arc;

    fn molecule(smiles: &str) -> Arc<Molecule> {
        Arc::new(parse_smiles(smiles).unwrap())
    }

    fn exclusions(whitelist: &[&str], smarts: &[&str], smiles: &[&str]) -> ExclusionSet {
        ExclusionSet {
            ring_torsion_whitelist: whitelist.iter().map(|s| s.to_string()).collect(),
            smarts: SmartsSet::parse(smarts).unwrap(),
            smiles: SmilesSet::parse(smiles).unwrap(),
        }
    }

    #[test]
    fn empty_exclusions_keep_every_term() {
        let mol = molecule("C1CCCCC1O");
        let empty = ExclusionSet::default();
        for kind in TermKind::ALL {
            for atoms in crate::core::models::term::enumerate_terms(&mol, kind) {
                let term = ValenceTerm::new(kind, &atoms, "p", mol.clone());
                assert_eq!(empty.classify(&term), Eligibility::Eligible);
            }
        }
    }

    #[test]
    fn whitelisted_torsions_override_both_blacklists() {
        let mol = molecule("C1CCCCC1");
        let set = exclusions(&["t4"], &["[#6:1]@[#6:2]@[#6:3]@[#6:4]"], &["C1CCCCC1"]);
        let torsion = ValenceTerm::new(TermKind::ProperTorsion, &[0, 1, 2, 3], "t4", mol.clone());
        assert_eq!(set.classify(&torsion), Eligibility::Whitelisted);
        assert!(is_eligible(&torsion, &set));

        let other = ValenceTerm::new(TermKind::ProperTorsion, &[0, 1, 2, 3], "t5", mol.clone());
        assert_eq!(set.classify(&other), Eligibility::ExcludedBySmarts);
    }

    #[test]
    fn whitelist_only_applies_to_torsions() {
        let mol = molecule("C1CCCCC1");
        let set = exclusions(&["b1"], &[], &["C1CCCCC1"]);
        let bond = ValenceTerm::new(TermKind::Bond, &[0, 1], "b1", mol);
        assert_eq!(set.classify(&bond), Eligibility::ExcludedBySmiles);
    }

    #[test]
    fn smarts_exclusion_is_anchored_on_the_term() {
        let mol = molecule("CCS");
        let set = exclusions(&[], &["[#16:1]-[#6:2]"], &[]);
        let cs = ValenceTerm::new(TermKind::Bond, &[1, 2], "b1", mol.clone());
        let cc = ValenceTerm::new(TermKind::Bond, &[0, 1], "b2", mol);
        assert!(!set.is_eligible(&cs));
        assert!(set.is_eligible(&cc));
    }

    #[test]
    fn smiles_exclusion_requires_the_whole_molecule() {
        let set = exclusions(&[], &[], &["CCO"]);
        let propanol = molecule("CCCO");
        let term = ValenceTerm::new(TermKind::Bond, &[0, 1], "b1", propanol);
        assert!(set.is_eligible(&term));
    }

    #[test]
    fn loads_from_configured_files() {
        let dir = tempfile::tempdir().unwrap();
        let ring = dir.path().join("ring.txt");
        std::fs::write(&ring, "t4\n").unwrap();
        let files = ExclusionFiles {
            ring_torsions: Some(ring),
            smarts: None,
            smiles: None,
        };
        let set = ExclusionSet::load(&files).unwrap();
        assert!(set.ring_torsion_whitelist.contains("t4"));
        assert!(set.smarts.is_empty() && set.smiles.is_empty());
    }
}
