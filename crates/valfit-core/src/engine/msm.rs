//! Modified Seminario estimates of bond and angle force constants.
//!
//! Each interatomic 3×3 block of the Cartesian Hessian is symmetrized and diagonalized.
//! Projecting its eigenvectors onto a bond axis gives the bond stiffness; projecting onto
//! the in-plane directions perpendicular to the two bonds of an angle gives two angular
//! stiffnesses that act like springs in series. The modification divides each angular
//! projection by a factor accounting for the other angles that share the same bond.
//!
//! All estimates use the harmonic convention E = ½k(x − x₀)² with k in kcal/mol/Å² for bonds
//! and kcal/mol/rad² for angles.

use super::config::MsmSettings;
use crate::core::models::records::{DataError, OptimizationRecord};
use crate::core::utils::geometry::{angle_degrees, distance, unit_vector};
use nalgebra::{DMatrix, Matrix3, Point3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Samples around the bond axis used for linear angles.
const LINEAR_SAMPLES: usize = 360;
const LINEAR_THRESHOLD: f64 = 0.01;
const DEGENERATE_NORMAL: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MsmGuess {
    pub force_constant: f64,
    /// Å for bonds, degrees for angles.
    pub equilibrium: f64,
}

/// Estimates for one record, keyed by canonical atom tuple.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsmEstimate {
    pub bonds: BTreeMap<[usize; 2], MsmGuess>,
    pub angles: BTreeMap<[usize; 3], MsmGuess>,
}

impl MsmEstimate {
    pub fn len(&self) -> usize {
        self.bonds.len() + self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bonds.is_empty() && self.angles.is_empty()
    }
}

struct BlockEigen {
    values: Vector3<f64>,
    vectors: Matrix3<f64>,
}

impl BlockEigen {
    /// `-Σ λᵢ |d · vᵢ|`, the stiffness of the block along direction `d`.
    fn projected_stiffness(&self, direction: &Vector3<f64>) -> f64 {
        -(0..3)
            .map(|i| self.values[i] * direction.dot(&self.vectors.column(i)).abs())
            .sum::<f64>()
    }
}

struct Estimator<'a> {
    record: &'a OptimizationRecord,
    settings: &'a MsmSettings,
    blocks: HashMap<(usize, usize), BlockEigen>,
}

impl<'a> Estimator<'a> {
    fn coordinates(&self, atom: usize) -> &Point3<f64> {
        &self.record.coordinates[atom]
    }

    fn block(&self, a: usize, b: usize) -> &BlockEigen {
        &self.blocks[&(a.min(b), a.max(b))]
    }

    fn apply_policy(&self, stiffness: f64, atoms: &[usize]) -> Result<f64, DataError> {
        if !stiffness.is_finite() {
            return Err(DataError::NonFiniteStiffness {
                record: self.record.id.clone(),
                atoms: atoms.to_vec(),
            });
        }
        if stiffness < -self.settings.negative_tolerance {
            return Err(DataError::NotPositiveDefinite {
                record: self.record.id.clone(),
                atoms: atoms.to_vec(),
                stiffness,
            });
        }
        if stiffness < self.settings.force_constant_floor {
            return Ok(0.0);
        }
        Ok(stiffness)
    }

    fn scale(&self, force_constant: f64) -> f64 {
        force_constant * self.settings.vibrational_scaling * self.settings.vibrational_scaling
    }

    fn bond(&self, a: usize, b: usize) -> Result<MsmGuess, DataError> {
        let u = unit_vector(self.coordinates(a), self.coordinates(b));
        let k = self.apply_policy(self.block(a, b).projected_stiffness(&u), &[a, b])?;
        Ok(MsmGuess {
            force_constant: self.scale(k),
            equilibrium: distance(self.coordinates(a), self.coordinates(b)),
        })
    }

    /// In-plane direction perpendicular to bond `center -> outer` for the angle with `other`.
    fn perpendicular(&self, outer: usize, center: usize, other: usize) -> Option<Vector3<f64>> {
        let u_outer = unit_vector(self.coordinates(center), self.coordinates(outer));
        let u_other = unit_vector(self.coordinates(center), self.coordinates(other));
        let normal = u_other.cross(&u_outer);
        if normal.norm() < DEGENERATE_NORMAL {
            return None;
        }
        let normal = normal.normalize();
        Some(normal.cross(&u_outer).normalize())
    }

    /// `1 + mean |u_P(outer,center,other) · u_P(outer,center,x)|²` over the remaining neighbors.
    fn scaling_factor(&self, outer: usize, center: usize, other: usize, u_p: &Vector3<f64>) -> f64 {
        let overlaps: Vec<f64> = self
            .record
            .molecule
            .neighbors(center)
            .filter(|&x| x != outer && x != other)
            .filter_map(|x| self.perpendicular(outer, center, x))
            .map(|u_px| u_p.dot(&u_px).abs().powi(2))
            .collect();
        if overlaps.is_empty() {
            1.0
        } else {
            1.0 + overlaps.iter().sum::<f64>() / overlaps.len() as f64
        }
    }

    fn series_stiffness(&self, s1: f64, s2: f64, r_ab: f64, r_cb: f64) -> f64 {
        if s1 == 0.0 || s2 == 0.0 {
            return 0.0;
        }
        1.0 / (1.0 / (r_ab * r_ab * s1) + 1.0 / (r_cb * r_cb * s2))
    }

    fn angle(&self, a: usize, b: usize, c: usize) -> Result<MsmGuess, DataError> {
        let atoms = [a, b, c];
        let (pa, pb, pc) = (self.coordinates(a), self.coordinates(b), self.coordinates(c));
        let u_ab = unit_vector(pb, pa);
        let u_cb = unit_vector(pb, pc);
        let r_ab = distance(pa, pb);
        let r_cb = distance(pc, pb);

        let separation = (u_cb - u_ab).norm();
        if separation < LINEAR_THRESHOLD || (separation - 2.0).abs() < LINEAR_THRESHOLD {
            return self.linear_angle(&atoms, &u_ab, &u_cb, r_ab, r_cb);
        }

        let u_n = u_cb.cross(&u_ab).normalize();
        let u_pa = u_n.cross(&u_ab).normalize();
        let u_pc = u_cb.cross(&u_n).normalize();

        let s_a = self.scaling_factor(a, b, c, &u_pa);
        let s_c = self.scaling_factor(c, b, a, &u_pc);

        let s1 = self.apply_policy(self.block(a, b).projected_stiffness(&u_pa) / s_a, &atoms)?;
        let s2 = self.apply_policy(self.block(c, b).projected_stiffness(&u_pc) / s_c, &atoms)?;

        Ok(MsmGuess {
            force_constant: self.scale(self.series_stiffness(s1, s2, r_ab, r_cb)),
            equilibrium: angle_degrees(pa, pb, pc),
        })
    }

    fn linear_angle(
        &self,
        atoms: &[usize; 3],
        u_ab: &Vector3<f64>,
        u_cb: &Vector3<f64>,
        r_ab: f64,
        r_cb: f64,
    ) -> Result<MsmGuess, DataError> {
        let (w1, w2) = orthonormal_complement(u_ab);
        let block_ab = self.block(atoms[0], atoms[1]);
        let block_cb = self.block(atoms[2], atoms[1]);

        let mut total = 0.0;
        for step in 0..LINEAR_SAMPLES {
            let theta = (step as f64).to_radians() * (360.0 / LINEAR_SAMPLES as f64);
            let u_n = w1 * theta.cos() + w2 * theta.sin();
            let u_pa = u_n.cross(u_ab).normalize();
            let u_pc = u_cb.cross(&u_n).normalize();
            let s1 = self.apply_policy(block_ab.projected_stiffness(&u_pa), atoms)?;
            let s2 = self.apply_policy(block_cb.projected_stiffness(&u_pc), atoms)?;
            total += self.series_stiffness(s1, s2, r_ab, r_cb);
        }

        Ok(MsmGuess {
            force_constant: self.scale(total / LINEAR_SAMPLES as f64),
            equilibrium: 180.0,
        })
    }
}

/// Two unit vectors spanning the plane perpendicular to `axis`.
fn orthonormal_complement(axis: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let reference = if axis.x.abs() <= axis.y.abs() && axis.x.abs() <= axis.z.abs() {
        Vector3::x()
    } else if axis.y.abs() <= axis.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let w1 = axis.cross(&reference).normalize();
    let w2 = axis.cross(&w1).normalize();
    (w1, w2)
}

fn symmetric_block(hessian: &DMatrix<f64>, a: usize, b: usize) -> Matrix3<f64> {
    let block: Matrix3<f64> = hessian.fixed_view::<3, 3>(3 * a, 3 * b).into_owned();
    (block + block.transpose()) * 0.5
}

fn validate_hessian<'a>(
    record: &'a OptimizationRecord,
    settings: &MsmSettings,
) -> Result<&'a DMatrix<f64>, DataError> {
    let id = || record.id.clone();
    let hessian = record
        .hessian
        .as_ref()
        .ok_or_else(|| DataError::MissingHessian { record: id() })?;
    let dim = 3 * record.molecule.atom_count();
    if hessian.nrows() != dim || hessian.ncols() != dim {
        return Err(DataError::HessianDimension {
            record: id(),
            expected: dim * dim,
            found: hessian.nrows() * hessian.ncols(),
        });
    }
    if !hessian.iter().all(|v| v.is_finite()) {
        return Err(DataError::NonFiniteHessian { record: id() });
    }
    let deviation = (hessian - hessian.transpose()).amax();
    if deviation > settings.symmetry_tolerance {
        return Err(DataError::AsymmetricHessian {
            record: id(),
            deviation,
        });
    }
    Ok(hessian)
}

/// Bond and angle estimates for every bond and angle of the record's molecule.
pub fn estimate(record: &OptimizationRecord, settings: &MsmSettings) -> Result<MsmEstimate, DataError> {
    let hessian = validate_hessian(record, settings)?;
    record.validate_geometry()?;
    let molecule = &record.molecule;

    let blocks = molecule
        .bonds()
        .iter()
        .map(|bond| {
            let (a, b) = (bond.atom1.min(bond.atom2), bond.atom1.max(bond.atom2));
            let eigen = SymmetricEigen::new(symmetric_block(hessian, a, b));
            (
                (a, b),
                BlockEigen {
                    values: eigen.eigenvalues,
                    vectors: eigen.eigenvectors,
                },
            )
        })
        .collect();
    let estimator = Estimator {
        record,
        settings,
        blocks,
    };

    let mut estimate = MsmEstimate::default();
    for bond in molecule.bonds() {
        let (a, b) = (bond.atom1.min(bond.atom2), bond.atom1.max(bond.atom2));
        estimate.bonds.insert([a, b], estimator.bond(a, b)?);
    }
    for center in 0..molecule.atom_count() {
        let neighbors: Vec<usize> = molecule.neighbors(center).collect();
        for (i, &x) in neighbors.iter().enumerate() {
            for &y in &neighbors[i + 1..] {
                let (a, c) = (x.min(y), x.max(y));
                estimate.angles.insert([a, center, c], estimator.angle(a, center, c)?);
            }
        }
    }
    Ok(estimate)
}
