//! JSON result collections.
//!
//! Geometries are stored in bohr and Hessians as flat row-major arrays in Hartree/bohr²;
//! both are converted to Å and kcal/mol/Å² on load. Records that cannot be turned into a
//! model (unparseable SMILES, malformed Hessian, bad dihedral indices) are returned
//! separately instead of aborting the whole load.

use crate::core::chem::molecule::Molecule;
use crate::core::chem::smiles::parse_smiles;
use crate::core::models::records::{
    DataError, OptimizationRecord, TorsionDriveRecord, TorsionSample,
};
use crate::core::utils::geometry::{BOHR_TO_ANGSTROM, HESSIAN_AU_TO_KCAL_PER_MOL_ANGSTROM2};
use nalgebra::{DMatrix, Point3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub const OPTIMIZATION_COLLECTION_TYPE: &str = "OptimizationResultCollection";
pub const TORSION_DRIVE_COLLECTION_TYPE: &str = "TorsionDriveResultCollection";

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("JSON parsing error for '{path}': {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("'{path}' is a {found}, expected a {expected}")]
    UnexpectedType {
        path: String,
        expected: &'static str,
        found: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{}", n),
            RecordId::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOptimizationRecord {
    pub id: RecordId,
    pub smiles: String,
    pub geometry: Vec<[f64; 3]>,
    #[serde(default)]
    pub energy: Option<f64>,
    #[serde(default)]
    pub hessian: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTorsionSample {
    pub angle: f64,
    #[serde(default)]
    pub energy: Option<f64>,
    pub geometry: Vec<[f64; 3]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTorsionDriveRecord {
    pub id: RecordId,
    pub smiles: String,
    pub dihedrals: Vec<[usize; 4]>,
    #[serde(default)]
    pub grid_spacing: Vec<f64>,
    #[serde(default)]
    pub dihedral_range: Option<Vec<[f64; 2]>>,
    #[serde(default)]
    pub samples: Vec<RawTorsionSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCollection<R> {
    #[serde(rename = "type")]
    pub kind: String,
    pub records: Vec<R>,
}

/// Records that loaded successfully and the ones that were rejected.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub rejected: Vec<DataError>,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

fn read_collection<R: for<'de> Deserialize<'de>>(
    path: &Path,
    expected: &'static str,
) -> Result<RawCollection<R>, CollectionError> {
    let display = path.to_string_lossy().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| CollectionError::Io {
        path: display.clone(),
        source: e,
    })?;
    let collection: RawCollection<R> =
        serde_json::from_str(&content).map_err(|e| CollectionError::Json {
            path: display.clone(),
            source: e,
        })?;
    if collection.kind != expected {
        return Err(CollectionError::UnexpectedType {
            path: display,
            expected,
            found: collection.kind,
        });
    }
    Ok(collection)
}

/// Parses SMILES once per distinct string so records of one molecule share an `Arc`.
#[derive(Default)]
struct MoleculeCache {
    by_smiles: HashMap<String, Arc<Molecule>>,
}

impl MoleculeCache {
    fn get(&mut self, record: &str, smiles: &str) -> Result<Arc<Molecule>, DataError> {
        if let Some(molecule) = self.by_smiles.get(smiles) {
            return Ok(molecule.clone());
        }
        let molecule = Arc::new(parse_smiles(smiles).map_err(|source| {
            DataError::InvalidSmiles {
                record: record.to_string(),
                source,
            }
        })?);
        self.by_smiles.insert(smiles.to_string(), molecule.clone());
        Ok(molecule)
    }
}

fn to_angstrom(geometry: &[[f64; 3]]) -> Vec<Point3<f64>> {
    geometry
        .iter()
        .map(|[x, y, z]| Point3::new(x * BOHR_TO_ANGSTROM, y * BOHR_TO_ANGSTROM, z * BOHR_TO_ANGSTROM))
        .collect()
}

fn convert_hessian(record: &str, atoms: usize, flat: &[f64]) -> Result<DMatrix<f64>, DataError> {
    let dim = 3 * atoms;
    if flat.len() != dim * dim {
        return Err(DataError::HessianDimension {
            record: record.to_string(),
            expected: dim * dim,
            found: flat.len(),
        });
    }
    Ok(DMatrix::from_row_slice(dim, dim, flat) * HESSIAN_AU_TO_KCAL_PER_MOL_ANGSTROM2)
}

pub fn convert_optimization_records(
    raw: Vec<RawOptimizationRecord>,
) -> Loaded<OptimizationRecord> {
    let mut cache = MoleculeCache::default();
    let mut loaded = Loaded::default();
    for record in raw {
        let id = record.id.to_string();
        let converted = cache.get(&id, &record.smiles).and_then(|molecule| {
            let hessian = record
                .hessian
                .as_deref()
                .map(|h| convert_hessian(&id, molecule.atom_count(), h))
                .transpose()?;
            Ok(OptimizationRecord {
                id: id.clone(),
                coordinates: to_angstrom(&record.geometry),
                energy: record.energy,
                hessian,
                molecule,
            })
        });
        match converted {
            Ok(r) => loaded.records.push(r),
            Err(e) => loaded.rejected.push(e),
        }
    }
    loaded
}

pub fn convert_torsion_drive_records(
    raw: Vec<RawTorsionDriveRecord>,
) -> Loaded<TorsionDriveRecord> {
    let mut cache = MoleculeCache::default();
    let mut loaded = Loaded::default();
    for record in raw {
        let id = record.id.to_string();
        let converted = cache.get(&id, &record.smiles).and_then(|molecule| {
            check_dihedrals(&id, &molecule, &record.dihedrals)?;
            let samples = record
                .samples
                .iter()
                .map(|s| TorsionSample {
                    angle: s.angle,
                    energy: s.energy.unwrap_or(f64::NAN),
                    coordinates: to_angstrom(&s.geometry),
                })
                .collect();
            Ok(TorsionDriveRecord {
                id: id.clone(),
                dihedrals: record.dihedrals.clone(),
                grid_spacing: record.grid_spacing.clone(),
                dihedral_range: record.dihedral_range.clone(),
                samples,
                molecule,
            })
        });
        match converted {
            Ok(r) => loaded.records.push(r),
            Err(e) => loaded.rejected.push(e),
        }
    }
    loaded
}

fn check_dihedrals(record: &str, molecule: &Molecule, dihedrals: &[[usize; 4]]) -> Result<(), DataError> {
    let invalid = |detail: String| DataError::InvalidDihedral {
        record: record.to_string(),
        detail,
    };
    if dihedrals.is_empty() {
        return Err(invalid("no dihedral given".to_string()));
    }
    for dihedral in dihedrals {
        if let Some(&atom) = dihedral.iter().find(|&&a| a >= molecule.atom_count()) {
            return Err(invalid(format!(
                "atom {} out of range for {} atoms",
                atom,
                molecule.atom_count()
            )));
        }
        if !molecule.are_bonded(dihedral[1], dihedral[2]) {
            return Err(invalid(format!(
                "central atoms {} and {} are not bonded",
                dihedral[1], dihedral[2]
            )));
        }
    }
    Ok(())
}

pub fn load_optimization_collection(path: &Path) -> Result<Loaded<OptimizationRecord>, CollectionError> {
    let raw = read_collection::<RawOptimizationRecord>(path, OPTIMIZATION_COLLECTION_TYPE)?;
    Ok(convert_optimization_records(raw.records))
}

pub fn load_torsion_drive_collection(path: &Path) -> Result<Loaded<TorsionDriveRecord>, CollectionError> {
    let raw = read_collection::<RawTorsionDriveRecord>(path, TORSION_DRIVE_COLLECTION_TYPE)?;
    Ok(convert_torsion_drive_records(raw.records))
}
