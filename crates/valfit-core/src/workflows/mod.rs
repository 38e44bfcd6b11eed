//! # Workflows Module
//!
//! Top-level entry points of the library. Each workflow takes an immutable configuration
//! from [`crate::engine::config`] and a [`crate::engine::progress::ProgressReporter`], loads
//! its inputs, runs the engine stages in order and writes its outputs.
//!
//! - **Preparation** ([`prepare`]) - Curation, optional Hessian seeding and the complete
//!   ForceBalance fit bundle
//! - **Seminario seeding** ([`msm`]) - Bond and angle seeding of a force field from an
//!   optimization collection, without curation or fit inputs

pub mod msm;
pub mod prepare;
