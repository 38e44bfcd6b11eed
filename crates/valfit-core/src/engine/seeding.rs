use super::msm::{MsmEstimate, MsmGuess};
use crate::core::forcefield::params::{
    ANGLE_FORCE_CONSTANT_UNIT, ANGLE_UNIT, BOND_FORCE_CONSTANT_UNIT, BOND_LENGTH_UNIT,
    ForceField, ForceFieldError, format_quantity,
};
use crate::core::models::term::{TermKind, ValenceTerm};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Guesses grouped by parameter id, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GuessTable {
    bonds: BTreeMap<String, Vec<MsmGuess>>,
    angles: BTreeMap<String, Vec<MsmGuess>>,
}

impl GuessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn table_mut(&mut self, kind: TermKind) -> Option<&mut BTreeMap<String, Vec<MsmGuess>>> {
        match kind {
            TermKind::Bond => Some(&mut self.bonds),
            TermKind::Angle => Some(&mut self.angles),
            _ => None,
        }
    }

    /// Guesses for one handler; torsion kinds never carry any.
    pub fn guesses(&self, kind: TermKind) -> Option<&BTreeMap<String, Vec<MsmGuess>>> {
        match kind {
            TermKind::Bond => Some(&self.bonds),
            TermKind::Angle => Some(&self.angles),
            _ => None,
        }
    }

    /// Records a guess; returns false for kinds the seeder does not handle.
    pub fn add(&mut self, kind: TermKind, parameter_id: &str, guess: MsmGuess) -> bool {
        match self.table_mut(kind) {
            Some(table) => {
                table.entry(parameter_id.to_string()).or_default().push(guess);
                true
            }
            None => false,
        }
    }

    /// Attaches the estimates of one record to the parameter ids of its labeled terms.
    ///
    /// Returns the number of guesses added.
    pub fn add_estimate(&mut self, estimate: &MsmEstimate, terms: &[ValenceTerm]) -> usize {
        let mut added = 0;
        for term in terms {
            let guess = match term.kind {
                TermKind::Bond => estimate.bonds.get(&[term.atoms[0], term.atoms[1]]),
                TermKind::Angle => estimate
                    .angles
                    .get(&[term.atoms[0], term.atoms[1], term.atoms[2]]),
                _ => None,
            };
            if let Some(guess) = guess {
                if self.add(term.kind, &term.parameter_id, *guess) {
                    added += 1;
                }
            }
        }
        added
    }

    /// Arithmetic mean of every parameter's guesses, summed in insertion order.
    pub fn means(&self, kind: TermKind) -> BTreeMap<String, MsmGuess> {
        self.guesses(kind)
            .map(|table| {
                table
                    .iter()
                    .filter(|(_, guesses)| !guesses.is_empty())
                    .map(|(id, guesses)| (id.clone(), mean(guesses)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.bonds.values().chain(self.angles.values()).map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn merge(&mut self, other: GuessTable) {
        for (id, guesses) in other.bonds {
            self.bonds.entry(id).or_default().extend(guesses);
        }
        for (id, guesses) in other.angles {
            self.angles.entry(id).or_default().extend(guesses);
        }
    }
}

fn mean(guesses: &[MsmGuess]) -> MsmGuess {
    let mut force_constant = 0.0;
    let mut equilibrium = 0.0;
    for guess in guesses {
        force_constant += guess.force_constant;
        equilibrium += guess.equilibrium;
    }
    let n = guesses.len() as f64;
    MsmGuess {
        force_constant: force_constant / n,
        equilibrium: equilibrium / n,
    }
}

/// Returns a copy of `force_field` with bond and angle constants replaced by averaged guesses.
///
/// When `enabled` is false the force field is returned unchanged. Only the `Bonds` and
/// `Angles` handlers are touched.
pub fn seed(force_field: &ForceField, guesses: &GuessTable, enabled: bool) -> Result<ForceField, ForceFieldError> {
    let mut seeded = force_field.clone();
    if !enabled {
        return Ok(seeded);
    }

    for (id, guess) in guesses.means(TermKind::Bond) {
        seeded.set_parameter_attribute(
            TermKind::Bond,
            &id,
            "k",
            format_quantity(guess.force_constant, BOND_FORCE_CONSTANT_UNIT),
        )?;
        seeded.set_parameter_attribute(
            TermKind::Bond,
            &id,
            "length",
            format_quantity(guess.equilibrium, BOND_LENGTH_UNIT),
        )?;
        debug!(parameter = %id, k = guess.force_constant, length = guess.equilibrium, "Seeded bond");
    }
    for (id, guess) in guesses.means(TermKind::Angle) {
        seeded.set_parameter_attribute(
            TermKind::Angle,
            &id,
            "k",
            format_quantity(guess.force_constant, ANGLE_FORCE_CONSTANT_UNIT),
        )?;
        seeded.set_parameter_attribute(
            TermKind::Angle,
            &id,
            "angle",
            format_quantity(guess.equilibrium, ANGLE_UNIT),
        )?;
        debug!(parameter = %id, k = guess.force_constant, angle = guess.equilibrium, "Seeded angle");
    }
    Ok(seeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::params::tests::MINI_FF;

    fn guess(force_constant: f64, equilibrium: f64) -> MsmGuess {
        MsmGuess {
            force_constant,
            equilibrium,
        }
    }

    #[test]
    fn disabled_seeding_leaves_force_field_identical() {
        let ff = ForceField::parse(MINI_FF).unwrap();
        let mut table = GuessTable::new();
        table.add(TermKind::Bond, "b1", guess(1.0, 2.0));
        let seeded = seed(&ff, &table, false).unwrap();
        assert_eq!(seeded, ff);
        assert_eq!(seeded.to_offxml_string().unwrap(), ff.to_offxml_string().unwrap());
    }

    #[test]
    fn seeds_the_mean_of_all_guesses() {
        let ff = ForceField::parse(MINI_FF).unwrap();
        let mut table = GuessTable::new();
        table.add(TermKind::Bond, "b1", guess(100.0, 1.5));
        table.add(TermKind::Bond, "b1", guess(120.0, 1.7));
        table.add(TermKind::Angle, "a2", guess(80.0, 108.0));
        let seeded = seed(&ff, &table, true).unwrap();

        let b1 = seeded.parameter(TermKind::Bond, "b1").unwrap();
        assert!((b1.quantity("k").unwrap() - 110.0).abs() < 1e-9);
        assert!((b1.quantity("length").unwrap() - 1.6).abs() < 1e-9);
        assert!(b1.attribute("k").unwrap().ends_with(BOND_FORCE_CONSTANT_UNIT));

        let a2 = seeded.parameter(TermKind::Angle, "a2").unwrap();
        assert_eq!(a2.quantity("angle").unwrap(), 108.0);
        assert_eq!(
            seeded.parameter(TermKind::Bond, "b83"),
            ff.parameter(TermKind::Bond, "b83")
        );
        assert_eq!(
            seeded.parameter(TermKind::ProperTorsion, "t1"),
            ff.parameter(TermKind::ProperTorsion, "t1")
        );
    }

    #[test]
    fn unknown_parameter_is_an_error() {
        let ff = ForceField::parse(MINI_FF).unwrap();
        let mut table = GuessTable::new();
        table.add(TermKind::Angle, "a999", guess(80.0, 108.0));
        assert!(matches!(
            seed(&ff, &table, true),
            Err(ForceFieldError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn torsion_guesses_are_rejected() {
        let mut table = GuessTable::new();
        assert!(!table.add(TermKind::ProperTorsion, "t1", guess(1.0, 0.0)));
        assert!(table.is_empty());
    }

    #[test]
    fn estimates_are_attached_through_labels() {
        use crate::core::chem::smiles::parse_smiles;
        use std::sync::Arc;

        let molecule = Arc::new(parse_smiles("[O:1]([H:2])[H:3]").unwrap());
        let mut estimate = MsmEstimate::default();
        estimate.bonds.insert([0, 1], guess(500.0, 0.96));
        estimate.bonds.insert([0, 2], guess(510.0, 0.97));
        estimate.angles.insert([1, 0, 2], guess(60.0, 104.5));
        let terms = vec![
            ValenceTerm::new(TermKind::Bond, &[1, 0], "b87", molecule.clone()),
            ValenceTerm::new(TermKind::Bond, &[0, 2], "b87", molecule.clone()),
            ValenceTerm::new(TermKind::Angle, &[2, 0, 1], "a28", molecule),
        ];
        let mut table = GuessTable::new();
        assert_eq!(table.add_estimate(&estimate, &terms), 3);
        let means = table.means(TermKind::Bond);
        assert!((means["b87"].force_constant - 505.0).abs() < 1e-9);
        assert_eq!(table.means(TermKind::Angle)["a28"].equilibrium, 104.5);
    }
}
