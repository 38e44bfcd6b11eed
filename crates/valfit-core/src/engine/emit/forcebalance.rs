use super::schema::TargetParameter;
use crate::core::forcefield::params::{ForceField, ForceFieldError};
use crate::core::io::structure;
use crate::engine::config::FitSettings;
use crate::engine::curation::{CuratedOptimization, CuratedTorsionDrive};
use crate::engine::error::EngineError;
use serde_json::json;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::Path;
use tracing::warn;

pub const FORCE_FIELD_FILE: &str = "force-field.offxml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    TorsionProfile { name: String },
    OptGeo { name: String },
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::TorsionProfile { name } | Target::OptGeo { name } => name,
        }
    }
}

/// Replaces characters that are awkward in directory names.
pub fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The force field the optimizer starts from: no constraints, fitted attributes marked.
pub fn fit_force_field(seeded: &ForceField, parameters: &[TargetParameter]) -> Result<ForceField, ForceFieldError> {
    let mut force_field = seeded.clone();
    if !force_field.remove_handler("Constraints") {
        warn!("Force field has no Constraints handler to remove, already unconstrained?");
    }
    for parameter in parameters {
        force_field.set_parameter_attribute(
            parameter.kind,
            &parameter.id,
            "parameterize",
            parameter.attributes.join(", "),
        )?;
    }
    Ok(force_field)
}

pub fn render_optimize_in(settings: &FitSettings, targets: &[Target]) -> Result<String, fmt::Error> {
    let priors = &settings.priors;
    let flag = |b: bool| if b { 1 } else { 0 };
    let mut out = String::new();
    writeln!(out, "$options")?;
    writeln!(out, "jobtype optimize")?;
    writeln!(out, "forcefield {}", FORCE_FIELD_FILE)?;
    writeln!(out, "penalty_type {}", settings.penalty_type)?;
    writeln!(out, "trust0 {:?}", settings.initial_trust_radius)?;
    writeln!(out, "mintrust {:?}", settings.minimum_trust_radius)?;
    writeln!(out, "convergence_step {:?}", settings.step_convergence_threshold)?;
    writeln!(out, "convergence_objective {:?}", settings.objective_convergence_threshold)?;
    writeln!(out, "convergence_gradient {:?}", settings.gradient_convergence_threshold)?;
    writeln!(out, "criteria {}", settings.n_criteria)?;
    writeln!(out, "eig_lowerbound {:?}", settings.eigenvalue_lower_bound)?;
    writeln!(out, "finite_difference_h {:?}", settings.finite_difference_h)?;
    writeln!(out, "maxstep {}", settings.max_iterations)?;
    writeln!(out, "wq_port {}", settings.port)?;
    writeln!(out, "asynchronous {}", if settings.asynchronous { "True" } else { "False" })?;
    writeln!(out, "search_tolerance {:?}", settings.search_tolerance)?;
    writeln!(out, "backup {}", flag(settings.backup))?;
    writeln!(out, "retain_micro_outputs {}", flag(settings.retain_micro_outputs))?;
    writeln!(out, "priors")?;
    for (key, value) in [
        ("Angles/Angle/k", priors.angle_k),
        ("Angles/Angle/angle", priors.angle_angle),
        ("Bonds/Bond/k", priors.bond_k),
        ("Bonds/Bond/length", priors.bond_length),
        ("ProperTorsions/Proper/k", priors.proper_k),
        ("ImproperTorsions/Improper/k", priors.improper_k),
    ] {
        writeln!(out, "   {} :  {:?}", key, value)?;
    }
    writeln!(out, "/priors")?;
    writeln!(out, "$end")?;

    for target in targets {
        writeln!(out)?;
        writeln!(out, "$target")?;
        writeln!(out, "name {}", target.name())?;
        match target {
            Target::TorsionProfile { .. } => {
                writeln!(out, "type TorsionProfile_SMIRNOFF")?;
                writeln!(out, "weight {:?}", settings.torsion_weight)?;
                writeln!(out, "mol2 molecule.sdf")?;
                writeln!(out, "coords scan.xyz")?;
                writeln!(out, "writelevel 2")?;
                writeln!(out, "attenuate")?;
                writeln!(out, "energy_denom {:?}", settings.torsion_energy_denominator)?;
                writeln!(out, "energy_upper {:?}", settings.torsion_energy_cutoff)?;
            }
            Target::OptGeo { .. } => {
                writeln!(out, "type OptGeoTarget_SMIRNOFF")?;
                writeln!(out, "weight {:?}", settings.opt_geo_weight)?;
                writeln!(out, "writelevel 2")?;
            }
        }
        writeln!(out, "remote 1")?;
        writeln!(out, "$end")?;
    }
    Ok(out)
}

fn write_file(path: &Path, content: &str) -> Result<(), EngineError> {
    fs::write(path, content).map_err(|e| EngineError::io(path, e))
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<(), EngineError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| EngineError::Serialization {
        path: path.to_string_lossy().to_string(),
        message: e.to_string(),
    })?;
    write_file(path, &text)
}

/// Writes one torsion-profile target directory and returns its target entry.
pub fn write_torsion_target(
    targets_dir: &Path,
    drive: &CuratedTorsionDrive,
    settings: &FitSettings,
) -> Result<Target, EngineError> {
    let record = &drive.record;
    let name = format!("torsion-{}", sanitize(&record.id));
    let dir = targets_dir.join(&name);
    fs::create_dir_all(&dir).map_err(|e| EngineError::io(&dir, e))?;

    let reference = record
        .lowest_energy_sample()
        .ok_or_else(|| EngineError::Internal(format!("torsion drive {} has no samples", record.id)))?;
    let sdf = dir.join("molecule.sdf");
    structure::write_sdf_to_path(&record.molecule, &reference.coordinates, &record.id, &sdf)
        .map_err(|e| EngineError::io(&sdf, e))?;

    let scan = dir.join("scan.xyz");
    structure::write_xyz_to_path(
        &record.molecule,
        record
            .samples
            .iter()
            .map(|s| (format!("angle {:?} energy {:?}", s.angle, s.energy), s.coordinates.as_slice())),
        &scan,
    )
    .map_err(|e| EngineError::io(&scan, e))?;

    let mut qdata = String::new();
    for (job, sample) in record.samples.iter().enumerate() {
        let coords: Vec<String> = sample
            .coordinates
            .iter()
            .flat_map(|p| [p.x, p.y, p.z])
            .map(|v| format!("{:.10}", v))
            .collect();
        writeln!(qdata, "JOB {}", job)?;
        writeln!(qdata, "COORDS {}", coords.join(" "))?;
        writeln!(qdata, "ENERGY {:.12}", sample.energy)?;
        writeln!(qdata)?;
    }
    write_file(&dir.join("qdata.txt"), &qdata)?;

    let metadata = json!({
        "record_id": record.id,
        "dihedrals": record.dihedrals,
        "grid_spacing": record.grid_spacing,
        "dihedral_ranges": record.dihedral_range,
        "energy_decrease_thresh": null,
        "energy_upper_limit": settings.torsion_energy_cutoff,
        "torsion_grid_ids": record.samples.iter().map(|s| [s.angle]).collect::<Vec<_>>(),
        "parameters": drive.terms.iter().map(|t| t.parameter_id.as_str()).collect::<std::collections::BTreeSet<_>>(),
    });
    write_json(&dir.join("metadata.json"), &metadata)?;

    Ok(Target::TorsionProfile { name })
}

/// Writes one optimized-geometry batch directory and returns its target entry.
pub fn write_optgeo_target(
    targets_dir: &Path,
    index: usize,
    batch: &[CuratedOptimization],
    settings: &FitSettings,
) -> Result<Target, EngineError> {
    let name = format!("opt-geo-batch-{}", index);
    let dir = targets_dir.join(&name);
    fs::create_dir_all(&dir).map_err(|e| EngineError::io(&dir, e))?;

    let mut options = String::new();
    writeln!(options, "$global")?;
    writeln!(options, "bond_denom {:?}", settings.bond_denominator)?;
    writeln!(options, "angle_denom {:?}", settings.angle_denominator)?;
    writeln!(options, "dihedral_denom {:?}", settings.dihedral_denominator)?;
    writeln!(options, "improper_denom {:?}", settings.improper_denominator)?;
    writeln!(options, "$end")?;

    for curated in batch {
        let record = &curated.record;
        let stem = sanitize(&record.id);
        let xyz = dir.join(format!("{}.xyz", stem));
        structure::write_xyz_to_path(
            &record.molecule,
            [(record.id.clone(), record.coordinates.as_slice())],
            &xyz,
        )
        .map_err(|e| EngineError::io(&xyz, e))?;
        let sdf = dir.join(format!("{}.sdf", stem));
        structure::write_sdf_to_path(&record.molecule, &record.coordinates, &record.id, &sdf)
            .map_err(|e| EngineError::io(&sdf, e))?;

        writeln!(options)?;
        writeln!(options, "$system")?;
        writeln!(options, "name {}", stem)?;
        writeln!(options, "geometry {}.xyz", stem)?;
        writeln!(options, "topology {}.xyz", stem)?;
        writeln!(options, "mol2 {}.sdf", stem)?;
        writeln!(options, "$end")?;
    }
    write_file(&dir.join("optgeo_options.txt"), &options)?;

    Ok(Target::OptGeo { name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::params::tests::MINI_FF;
    use crate::core::models::term::TermKind;

    #[test]
    fn fit_force_field_drops_constraints_and_marks_parameters() {
        let ff = ForceField::parse(MINI_FF).unwrap();
        let parameters = vec![TargetParameter {
            schema_type: "BondSMIRKS",
            smirks: "[#6X4:1]-[#6X4:2]".into(),
            attributes: vec!["k".into(), "length".into()],
            kind: TermKind::Bond,
            id: "b1".into(),
        }];
        let fit = fit_force_field(&ff, &parameters).unwrap();
        assert!(fit.document().root.child("Constraints").is_none());
        assert!(ff.document().root.child("Constraints").is_some());
        let b1 = fit.parameter(TermKind::Bond, "b1").unwrap();
        assert_eq!(b1.attribute("parameterize"), Some("k, length"));
        assert_eq!(fit.parameter(TermKind::Bond, "b83").unwrap().attribute("parameterize"), None);
    }

    #[test]
    fn optimize_in_lists_options_priors_and_targets() {
        let settings = FitSettings::default();
        let text = render_optimize_in(
            &settings,
            &[
                Target::TorsionProfile {
                    name: "torsion-1".into(),
                },
                Target::OptGeo {
                    name: "opt-geo-batch-0".into(),
                },
            ],
        )
        .unwrap();
        assert!(text.starts_with("$options\njobtype optimize\n"));
        assert!(text.contains("maxstep 50\n"));
        assert!(text.contains("trust0 -1.0\n"));
        assert!(text.contains("wq_port 55387\n"));
        assert!(text.contains("   Bonds/Bond/length :  0.1\n"));
        assert!(text.contains("name torsion-1\ntype TorsionProfile_SMIRNOFF\n"));
        assert!(text.contains("name opt-geo-batch-0\ntype OptGeoTarget_SMIRNOFF\nweight 0.01\n"));
        assert_eq!(text.matches("$target").count(), 2);
    }

    #[test]
    fn ids_are_made_path_safe() {
        assert_eq!(sanitize("12345"), "12345");
        assert_eq!(sanitize("a/b c"), "a_b_c");
    }
}
