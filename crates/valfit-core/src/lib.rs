//! # valfit Core Library
//!
//! Preparation of SMIRNOFF valence-parameter refits: curated training data, modified
//! Seminario starting values for bonds and angles, and ready-to-run optimizer inputs.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless chemistry (molecules, SMILES, rings, canonical
//!   keys), SMARTS/SMIRKS matching, OFFXML force fields with SMIRNOFF labeling, and record
//!   I/O.
//!
//! - **[`engine`]: The Logic Core.** Exclusion rules, dataset curation, the modified
//!   Seminario estimator, parameter seeding and fit-input emission, each a pure stage with
//!   its own settings.
//!
//! - **[`workflows`]: The Public API.** Ties `core` and `engine` together into the `prepare`
//!   and `msm` procedures used by the command-line tool.

pub mod core;
pub mod engine;
pub mod workflows;
