use super::params::{ForceField, ForceFieldError};
use crate::core::chem::molecule::Molecule;
use crate::core::models::term::{TermKind, ValenceTerm, canonical_atoms};
use crate::core::patterns::matcher;
use crate::core::patterns::smarts::SmartsPattern;
use std::collections::BTreeMap;
use std::sync::Arc;

struct CompiledParameter {
    id: String,
    pattern: SmartsPattern,
}

/// Assigns force-field parameters to the valence terms of molecules.
///
/// SMIRKS are compiled once per handler. Within a handler every matching parameter
/// overwrites earlier ones, so the last match in file order wins.
pub struct Labeler {
    handlers: Vec<(TermKind, Vec<CompiledParameter>)>,
}

impl Labeler {
    pub fn new(force_field: &ForceField, kinds: &[TermKind]) -> Result<Self, ForceFieldError> {
        let mut handlers = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            if !force_field.has_handler(kind) {
                return Err(ForceFieldError::MissingHandler(kind.handler_name()));
            }
            let compiled = force_field
                .parameters(kind)
                .into_iter()
                .map(|p| {
                    SmartsPattern::parse(&p.smirks)
                        .map(|pattern| CompiledParameter {
                            id: p.id.clone(),
                            pattern,
                        })
                        .map_err(|source| ForceFieldError::InvalidSmirks { id: p.id, source })
                })
                .collect::<Result<Vec<_>, _>>()?;
            handlers.push((kind, compiled));
        }
        Ok(Self { handlers })
    }

    pub fn kinds(&self) -> impl Iterator<Item = TermKind> + '_ {
        self.handlers.iter().map(|(k, _)| *k)
    }

    /// Labels one molecule; terms are ordered by handler, then by canonical atom tuple.
    pub fn label(&self, molecule: &Arc<Molecule>) -> Vec<ValenceTerm> {
        let mut terms = Vec::new();
        for (kind, parameters) in &self.handlers {
            let mut assigned: BTreeMap<Vec<usize>, &str> = BTreeMap::new();
            for parameter in parameters {
                for tuple in matcher::tagged_matches(&parameter.pattern, molecule) {
                    if tuple.len() != kind.atom_count() {
                        continue;
                    }
                    assigned.insert(canonical_atoms(*kind, &tuple), parameter.id.as_str());
                }
            }
            terms.extend(
                assigned
                    .into_iter()
                    .map(|(atoms, id)| ValenceTerm::new(*kind, &atoms, id, molecule.clone())),
            );
        }
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::smiles::parse_smiles;
    use crate::core::forcefield::params::tests::MINI_FF;

    fn ethanol() -> Arc<Molecule> {
        Arc::new(
            parse_smiles("[C:1]([H:4])([H:5])([H:6])[C:2]([H:7])([H:8])[O:3][H:9]").unwrap(),
        )
    }

    fn ids(terms: &[ValenceTerm], kind: TermKind) -> Vec<&str> {
        terms
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.parameter_id.as_str())
            .collect()
    }

    #[test]
    fn labels_bonds_with_last_match_winning() {
        let ff = ForceField::parse(MINI_FF).unwrap();
        let labeler = Labeler::new(&ff, &[TermKind::Bond]).unwrap();
        let terms = labeler.label(&ethanol());
        assert_eq!(terms.len(), 8);
        let cc = terms.iter().find(|t| t.atoms == vec![0, 1]).unwrap();
        assert_eq!(cc.parameter_id, "b1");
        let co = terms.iter().find(|t| t.atoms == vec![1, 2]).unwrap();
        assert_eq!(co.parameter_id, "b9");
        let oh = terms.iter().find(|t| t.atoms == vec![2, 8]).unwrap();
        assert_eq!(oh.parameter_id, "b87");
        assert_eq!(ids(&terms, TermKind::Bond).iter().filter(|id| **id == "b83").count(), 5);
    }

    #[test]
    fn labels_angles_and_torsions() {
        let ff = ForceField::parse(MINI_FF).unwrap();
        let labeler = Labeler::new(
            &ff,
            &[TermKind::Angle, TermKind::ProperTorsion, TermKind::ImproperTorsion],
        )
        .unwrap();
        let terms = labeler.label(&ethanol());
        let hch = terms
            .iter()
            .find(|t| t.kind == TermKind::Angle && t.atoms == vec![3, 0, 4])
            .unwrap();
        assert_eq!(hch.parameter_id, "a2");
        let coh = terms
            .iter()
            .find(|t| t.kind == TermKind::Angle && t.atoms == vec![1, 2, 8])
            .unwrap();
        assert_eq!(coh.parameter_id, "a28");
        assert!(ids(&terms, TermKind::ProperTorsion).contains(&"t85"));
        assert!(ids(&terms, TermKind::ImproperTorsion).is_empty());
    }

    #[test]
    fn missing_handler_is_an_error() {
        let ff = ForceField::parse(r#"<SMIRNOFF version="0.3"><Bonds/></SMIRNOFF>"#).unwrap();
        assert!(matches!(
            Labeler::new(&ff, &[TermKind::Angle]),
            Err(ForceFieldError::MissingHandler("Angles"))
        ));
    }
}
