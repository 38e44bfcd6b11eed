//! # Engine Module
//!
//! Policy and computation layer of the refit preparation pipeline. Where [`crate::core`]
//! answers "which parameter does this atom tuple get", the engine decides which records and
//! parameters are worth fitting, estimates starting values from Hessians and renders the
//! optimizer inputs.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Validated settings and their builders
//! - **Exclusions** ([`exclusion`]) - Eligibility of a term given the loaded exclusion lists
//! - **Curation** ([`curation`]) - Deduplication, term assignment, torsion caps and coverage
//! - **Modified Seminario** ([`msm`]) - Bond and angle guesses from Cartesian Hessians
//! - **Seeding** ([`seeding`]) - Aggregating guesses and writing them into a force field
//! - **Emission** ([`emit`]) - Schema, ForceBalance job directory and coverage reports
//! - **Progress Monitoring** ([`progress`]) - Callback based progress events
//! - **Error Handling** ([`error`]) - The engine error type every stage converts into
//!
//! ## Key Capabilities
//!
//! - **Parallel labeling and estimation** behind the `parallel` feature
//! - **Deterministic output** for identical inputs, including the random torsion cap
//! - **Atomic emission** through a staging directory

pub mod config;
pub mod curation;
pub mod emit;
pub mod error;
pub mod exclusion;
pub mod msm;
pub mod progress;
pub mod seeding;
