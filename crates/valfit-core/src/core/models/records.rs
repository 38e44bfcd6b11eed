use crate::core::chem::molecule::Molecule;
use crate::core::chem::smiles::SmilesError;
use crate::core::utils::geometry::{distance, is_finite_point};
use nalgebra::{DMatrix, Point3};
use std::sync::Arc;
use thiserror::Error;

/// Bonded atoms closer than this (Å) make a geometry unusable.
pub const MIN_BOND_LENGTH: f64 = 1e-2;

/// Problems with a single record. The record's contribution is dropped; the run continues.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("Record {record}: invalid SMILES: {source}")]
    InvalidSmiles { record: String, source: SmilesError },
    #[error("Record {record}: expected {expected} atoms in the geometry, found {found}")]
    AtomCountMismatch {
        record: String,
        expected: usize,
        found: usize,
    },
    #[error("Record {record}: geometry contains non-finite coordinates")]
    NonFiniteCoordinates { record: String },
    #[error("Record {record}: bonded atoms {atoms:?} are only {distance:.2e} Å apart")]
    CoincidentAtoms {
        record: String,
        atoms: [usize; 2],
        distance: f64,
    },
    #[error("Record {record}: no Hessian available")]
    MissingHessian { record: String },
    #[error("Record {record}: Hessian has {found} elements, expected {expected}")]
    HessianDimension {
        record: String,
        expected: usize,
        found: usize,
    },
    #[error("Record {record}: Hessian contains non-finite values")]
    NonFiniteHessian { record: String },
    #[error("Record {record}: Hessian is not symmetric (max deviation {deviation:.3e})")]
    AsymmetricHessian { record: String, deviation: f64 },
    #[error(
        "Record {record}: Hessian block for atoms {atoms:?} is not positive definite (stiffness {stiffness:.3})"
    )]
    NotPositiveDefinite {
        record: String,
        atoms: Vec<usize>,
        stiffness: f64,
    },
    #[error("Record {record}: non-finite stiffness for atoms {atoms:?}")]
    NonFiniteStiffness { record: String, atoms: Vec<usize> },
    #[error("Record {record}: invalid scanned dihedral: {detail}")]
    InvalidDihedral { record: String, detail: String },
    #[error("Record {record}: no valid torsion-drive samples")]
    NoValidSamples { record: String },
}

impl DataError {
    /// Id of the record the error belongs to.
    pub fn record(&self) -> &str {
        match self {
            DataError::InvalidSmiles { record, .. }
            | DataError::AtomCountMismatch { record, .. }
            | DataError::NonFiniteCoordinates { record }
            | DataError::CoincidentAtoms { record, .. }
            | DataError::MissingHessian { record }
            | DataError::HessianDimension { record, .. }
            | DataError::NonFiniteHessian { record }
            | DataError::AsymmetricHessian { record, .. }
            | DataError::NotPositiveDefinite { record, .. }
            | DataError::NonFiniteStiffness { record, .. }
            | DataError::InvalidDihedral { record, .. }
            | DataError::NoValidSamples { record } => record,
        }
    }
}

/// A geometry optimization result: final structure, energy and optional Hessian.
///
/// Coordinates are in Å, the energy in Hartree and the Hessian in kcal/mol/Å².
#[derive(Debug, Clone)]
pub struct OptimizationRecord {
    pub id: String,
    pub molecule: Arc<Molecule>,
    pub coordinates: Vec<Point3<f64>>,
    pub energy: Option<f64>,
    pub hessian: Option<DMatrix<f64>>,
}

impl OptimizationRecord {
    /// Checks that the geometry matches the molecule and is finite.
    pub fn validate_geometry(&self) -> Result<(), DataError> {
        check_geometry(&self.id, &self.molecule, &self.coordinates)
    }

    /// Whether the record carries the same structure and geometry as another.
    pub fn is_duplicate_of(&self, other: &OptimizationRecord) -> bool {
        self.molecule.canonical_key() == other.molecule.canonical_key()
            && self.coordinates == other.coordinates
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TorsionSample {
    /// Scanned dihedral value in degrees.
    pub angle: f64,
    /// Energy in Hartree; NaN when the grid point failed.
    pub energy: f64,
    pub coordinates: Vec<Point3<f64>>,
}

/// A constrained dihedral scan.
#[derive(Debug, Clone)]
pub struct TorsionDriveRecord {
    pub id: String,
    pub molecule: Arc<Molecule>,
    pub dihedrals: Vec<[usize; 4]>,
    pub grid_spacing: Vec<f64>,
    pub dihedral_range: Option<Vec<[f64; 2]>>,
    pub samples: Vec<TorsionSample>,
}

impl TorsionSample {
    /// A sample is usable when its energy is finite and its geometry fits the molecule.
    pub fn is_valid(&self, molecule: &Molecule) -> bool {
        self.energy.is_finite() && check_geometry("", molecule, &self.coordinates).is_ok()
    }
}

impl TorsionDriveRecord {
    /// Central bond of the first scanned dihedral as an ordered pair.
    pub fn central_bond(&self) -> Option<(usize, usize)> {
        self.dihedrals.first().map(|d| (d[1].min(d[2]), d[1].max(d[2])))
    }

    /// The sample with the lowest finite energy.
    pub fn lowest_energy_sample(&self) -> Option<&TorsionSample> {
        self.samples
            .iter()
            .filter(|s| s.energy.is_finite())
            .min_by(|a, b| a.energy.total_cmp(&b.energy))
    }
}

fn check_geometry(
    record: &str,
    molecule: &Molecule,
    coordinates: &[Point3<f64>],
) -> Result<(), DataError> {
    if coordinates.len() != molecule.atom_count() {
        return Err(DataError::AtomCountMismatch {
            record: record.to_string(),
            expected: molecule.atom_count(),
            found: coordinates.len(),
        });
    }
    if !coordinates.iter().all(is_finite_point) {
        return Err(DataError::NonFiniteCoordinates {
            record: record.to_string(),
        });
    }
    for bond in molecule.bonds() {
        let length = distance(&coordinates[bond.atom1], &coordinates[bond.atom2]);
        if length < MIN_BOND_LENGTH {
            return Err(DataError::CoincidentAtoms {
                record: record.to_string(),
                atoms: [bond.atom1, bond.atom2],
                distance: length,
            });
        }
    }
    Ok(())
}
