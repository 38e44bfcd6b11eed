//! # Core Module
//!
//! Stateless building blocks of the refit preparation pipeline. Nothing in here knows about
//! configuration, curation policy or output layout; those live in [`crate::engine`].
//!
//! ## Architecture
//!
//! - **Chemistry** ([`chem`]) - Molecule graphs, SMILES, rings, aromaticity and canonical keys
//! - **Patterns** ([`patterns`]) - SMARTS/SMIRKS parsing and substructure matching
//! - **Models** ([`models`]) - Valence terms and quantum-chemistry records
//! - **Force fields** ([`forcefield`]) - OFFXML documents, parameter views and labeling
//! - **File I/O** ([`io`]) - Result collections and exclusion lists
//! - **Utilities** ([`utils`]) - Unit conversions and small geometry helpers
//!
//! ## Data Flow
//!
//! Records are loaded from JSON into [`models::records`] with their molecules parsed by
//! [`chem::smiles`]. The [`forcefield::labeling::Labeler`] turns each molecule into a list of
//! [`models::term::ValenceTerm`]s, and [`patterns`] decides which of those an exclusion list
//! covers.

pub mod chem;
pub mod forcefield;
pub mod io;
pub mod models;
pub mod patterns;
pub mod utils;
