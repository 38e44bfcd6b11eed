//! # Chemistry Module
//!
//! Minimal cheminformatics needed to reason about QC records: a graph model of
//! molecules, a SMILES reader, ring and aromaticity perception, and a canonical
//! structural key used for deduplication and whole-molecule comparisons.
//!
//! - **Molecule model** ([`molecule`]) - Atoms, bonds and the immutable [`Molecule`](molecule::Molecule)
//! - **SMILES** ([`smiles`]) - Parser with atom-map reordering for mapped QC SMILES
//! - **Rings** ([`rings`]) - Ring membership, smallest ring sizes and Kekulé aromaticity
//! - **Canonical keys** ([`canonical`]) - Order-independent structural identity
//! - **Elements** ([`element`]) - Symbol tables and standard valences

pub(crate) mod canonical;
pub mod element;
pub mod molecule;
pub mod rings;
pub mod smiles;
