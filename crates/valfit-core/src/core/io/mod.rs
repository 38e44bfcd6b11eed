//! # I/O Module
//!
//! Readers for the pipeline's inputs (quantum-chemistry result collections in JSON and the
//! plain-text exclusion lists) and writers for the structure files of fitting targets.

pub mod collections;
pub mod exclusions;
pub mod structure;
