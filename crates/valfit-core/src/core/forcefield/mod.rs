//! # Force Field Module
//!
//! SMIRNOFF force fields as read from and written to OFFXML.
//!
//! - [`offxml`] - A lossless XML element tree, so handlers and attributes that are never
//!   interpreted here are written back exactly as they were read
//! - [`params`] - The [`ForceField`](params::ForceField) view over the valence handlers,
//!   unit-bearing quantities and force-field name resolution
//! - [`labeling`] - SMIRKS-based assignment of parameters to valence terms

pub mod labeling;
pub mod offxml;
pub mod params;
