//! # Core Models Module
//!
//! Data structures shared by every stage of the pipeline: valence terms with their
//! assigned parameters, and the quantum-chemistry records the training data is built from.
//!
//! - [`term`] - [`TermKind`](term::TermKind), [`ValenceTerm`](term::ValenceTerm), canonical
//!   atom ordering and term enumeration over a molecule graph
//! - [`records`] - Optimization and torsion-drive records with their geometries

pub mod records;
pub mod term;
