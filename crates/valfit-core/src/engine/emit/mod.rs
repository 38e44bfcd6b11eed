//! # Fit-Input Emitter
//!
//! Renders everything a ForceBalance run needs from the curated datasets and the seeded
//! force field. All files are written into a staging directory next to the output
//! directory and moved into place only once rendering has succeeded, so a failure never
//! leaves a half-written bundle behind.
//!
//! ## Layout
//!
//! ```text
//! <output>/
//!   opt-smirks.json
//!   td-smirks.json
//!   coverage.csv
//!   schemas/optimizations/<tag>.json
//!   <tag>/optimize.in
//!   <tag>/forcefield/force-field.offxml
//!   <tag>/targets/torsion-<id>/...
//!   <tag>/targets/opt-geo-batch-<n>/...
//! ```

pub mod forcebalance;
pub mod report;
pub mod schema;

use super::config::FitSettings;
use super::curation::CuratedDatasets;
use super::error::EngineError;
use crate::core::forcefield::params::ForceField;
use crate::core::models::term::TermKind;
use forcebalance::Target;
use schema::ReferenceData;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Inputs of one emission.
pub struct FitBundle<'a> {
    pub curated: &'a CuratedDatasets,
    pub seeded: &'a ForceField,
    /// The force field as the user named it: a path or a built-in name.
    pub initial_force_field: &'a str,
    /// Whether `seeded` carries Hessian-derived bonds and angles.
    pub seeded_from_hessians: bool,
    pub optimization_dataset: &'a Path,
    pub torsion_dataset: &'a Path,
    pub fit: &'a FitSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitSummary {
    pub torsion_targets: usize,
    pub opt_geo_targets: usize,
    pub fitted_parameters: usize,
    pub output_directory: PathBuf,
    pub seeded_force_field: PathBuf,
}

fn create_dir(path: &Path) -> Result<(), EngineError> {
    fs::create_dir_all(path).map_err(|e| EngineError::io(path, e))
}

/// Renames `from` to `to`, replacing whatever is there. Falls back to a copy when the
/// rename crosses filesystems.
fn move_into_place(from: &Path, to: &Path) -> Result<(), EngineError> {
    if to.is_dir() {
        fs::remove_dir_all(to).map_err(|e| EngineError::io(to, e))?;
    } else if to.exists() {
        fs::remove_file(to).map_err(|e| EngineError::io(to, e))?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_recursively(from, to)
}

fn copy_recursively(from: &Path, to: &Path) -> Result<(), EngineError> {
    if from.is_dir() {
        create_dir(to)?;
        for entry in fs::read_dir(from).map_err(|e| EngineError::io(from, e))? {
            let entry = entry.map_err(|e| EngineError::io(from, e))?;
            copy_recursively(&entry.path(), &to.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(from, to).map(|_| ()).map_err(|e| EngineError::io(from, e))
    }
}

fn render(bundle: &FitBundle, root: &Path, force_field_reference: &str) -> Result<EmitSummary, EngineError> {
    let fit = bundle.fit;
    let mut summary = EmitSummary::default();

    // === Phase 1: Parameter selection files ===
    let opt_smirks = report::selected_smirks(bundle.seeded, bundle.curated, &[TermKind::Bond, TermKind::Angle]);
    report::write_smirks_json(&root.join(report::OPT_SMIRKS_FILE), &opt_smirks)?;
    let td_smirks = report::selected_smirks(
        bundle.seeded,
        bundle.curated,
        &[TermKind::ProperTorsion, TermKind::ImproperTorsion],
    );
    report::write_smirks_json(&root.join(report::TD_SMIRKS_FILE), &td_smirks)?;
    report::write_coverage_csv(&root.join(report::COVERAGE_FILE), bundle.seeded, bundle.curated)?;

    // === Phase 2: Optimization schema ===
    let parameters = schema::target_parameters(bundle.seeded, &bundle.curated.selected)?;
    summary.fitted_parameters = parameters.len();
    let torsion_ids = bundle
        .curated
        .torsion_drives
        .iter()
        .map(|d| d.record.id.clone())
        .collect();
    let optimization_ids = bundle
        .curated
        .optimizations
        .iter()
        .map(|o| o.record.id.clone())
        .collect();
    let optimization_schema = schema::build_schema(
        fit,
        force_field_reference,
        parameters.clone(),
        ReferenceData::local(bundle.torsion_dataset, torsion_ids),
        ReferenceData::local(bundle.optimization_dataset, optimization_ids),
    );
    let schema_dir = root.join("schemas").join("optimizations");
    create_dir(&schema_dir)?;
    let schema_path = schema_dir.join(format!("{}.json", fit.tag));
    let text = serde_json::to_string_pretty(&optimization_schema).map_err(|e| EngineError::Serialization {
        path: schema_path.to_string_lossy().to_string(),
        message: e.to_string(),
    })?;
    fs::write(&schema_path, text).map_err(|e| EngineError::io(&schema_path, e))?;

    // === Phase 3: ForceBalance job directory ===
    let job = root.join(&fit.tag);
    let ff_dir = job.join("forcefield");
    create_dir(&ff_dir)?;
    forcebalance::fit_force_field(bundle.seeded, &parameters)?
        .write(&ff_dir.join(forcebalance::FORCE_FIELD_FILE))?;

    let targets_dir = job.join("targets");
    create_dir(&targets_dir)?;
    let mut targets: Vec<Target> = Vec::new();
    for drive in &bundle.curated.torsion_drives {
        targets.push(forcebalance::write_torsion_target(&targets_dir, drive, fit)?);
        summary.torsion_targets += 1;
    }
    for (index, batch) in bundle.curated.optimizations.chunks(fit.batch_size).enumerate() {
        targets.push(forcebalance::write_optgeo_target(&targets_dir, index, batch, fit)?);
        summary.opt_geo_targets += 1;
    }
    let optimize_in = job.join("optimize.in");
    fs::write(&optimize_in, forcebalance::render_optimize_in(fit, &targets)?)
        .map_err(|e| EngineError::io(&optimize_in, e))?;

    debug!(
        torsion_targets = summary.torsion_targets,
        opt_geo_targets = summary.opt_geo_targets,
        "Rendered fit bundle."
    );
    Ok(summary)
}

/// Writes the fit bundle into `output_directory` and the seeded force field to
/// `output_force_field`.
#[instrument(skip_all, name = "emit_task")]
pub fn emit(
    bundle: &FitBundle,
    output_directory: &Path,
    output_force_field: &Path,
) -> Result<EmitSummary, EngineError> {
    let parent = output_directory
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    create_dir(parent)?;
    let staging = tempfile::Builder::new()
        .prefix(".valfit-staging-")
        .tempdir_in(parent)
        .map_err(|e| EngineError::io(parent, e))?;

    // A seeded force field replaces the input as the starting point of the fit.
    let force_field_reference = if bundle.seeded_from_hessians {
        std::path::absolute(output_force_field)
            .map_err(|e| EngineError::io(output_force_field, e))?
            .to_string_lossy()
            .to_string()
    } else {
        schema::initial_force_field_reference(bundle.initial_force_field)
    };

    let root = staging.path().join("bundle");
    create_dir(&root)?;
    let mut summary = render(bundle, &root, &force_field_reference)?;
    let seeded_path = staging.path().join("seeded.offxml");
    bundle.seeded.write(&seeded_path)?;

    create_dir(output_directory)?;
    for entry in fs::read_dir(&root).map_err(|e| EngineError::io(&root, e))? {
        let entry = entry.map_err(|e| EngineError::io(&root, e))?;
        move_into_place(&entry.path(), &output_directory.join(entry.file_name()))?;
    }
    if let Some(dir) = output_force_field.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir(dir)?;
    }
    move_into_place(&seeded_path, output_force_field)?;

    summary.output_directory = output_directory.to_path_buf();
    summary.seeded_force_field = output_force_field.to_path_buf();
    info!(
        output = %output_directory.display(),
        force_field = %output_force_field.display(),
        parameters = summary.fitted_parameters,
        "Fit inputs written."
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::params::tests::MINI_FF;
    use crate::core::models::term::ValenceTerm;
    use crate::engine::curation::tests::{ETHANOL, optimization, torsion_drive};
    use crate::engine::curation::{CuratedOptimization, CuratedTorsionDrive};
    use crate::core::chem::smiles::parse_smiles;
    use std::sync::Arc;

    fn curated(optimizations: usize) -> CuratedDatasets {
        let mol = Arc::new(parse_smiles(ETHANOL).unwrap());
        let mut curated = CuratedDatasets::default();
        for i in 0..optimizations {
            curated.optimizations.push(CuratedOptimization {
                record: optimization(&format!("opt-{}", i), &mol, Some(-154.0)),
                terms: vec![ValenceTerm::new(TermKind::Bond, &[0, 1], "b1", mol.clone())],
            });
        }
        curated.torsion_drives.push(CuratedTorsionDrive {
            record: torsion_drive("td-1", &mol, [0, 1, 2, 8], &[-30.0, 0.0, 30.0]),
            terms: vec![ValenceTerm::new(TermKind::ProperTorsion, &[0, 1, 2, 8], "t85", mol.clone())],
        });
        curated.coverage.entry(TermKind::Bond).or_default().insert("b1".into(), optimizations);
        curated.coverage.entry(TermKind::ProperTorsion).or_default().insert("t85".into(), 1);
        curated.selected.insert(TermKind::Bond, vec!["b1".into()]);
        curated.selected.insert(TermKind::ProperTorsion, vec!["t85".into()]);
        curated
    }

    #[test]
    fn emits_the_full_layout() {
        let ff = ForceField::parse(MINI_FF).unwrap();
        let curated = curated(3);
        let mut fit = FitSettings::default();
        fit.batch_size = 2;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        let seeded_path = dir.path().join("seeded").join("ff.offxml");
        let bundle = FitBundle {
            curated: &curated,
            seeded: &ff,
            initial_force_field: "openff-2.1.0",
            seeded_from_hessians: false,
            optimization_dataset: Path::new("opt.json"),
            torsion_dataset: Path::new("td.json"),
            fit: &fit,
        };

        let summary = emit(&bundle, &output, &seeded_path).unwrap();
        assert_eq!(summary.torsion_targets, 1);
        assert_eq!(summary.opt_geo_targets, 2);
        assert_eq!(summary.fitted_parameters, 2);

        for relative in [
            "opt-smirks.json",
            "td-smirks.json",
            "coverage.csv",
            "schemas/optimizations/fb-fit.json",
            "fb-fit/optimize.in",
            "fb-fit/forcefield/force-field.offxml",
            "fb-fit/targets/torsion-td-1/qdata.txt",
            "fb-fit/targets/torsion-td-1/metadata.json",
            "fb-fit/targets/opt-geo-batch-0/optgeo_options.txt",
            "fb-fit/targets/opt-geo-batch-1/opt-2.xyz",
        ] {
            assert!(output.join(relative).is_file(), "missing {}", relative);
        }
        assert!(seeded_path.is_file());
        assert_eq!(ForceField::load(&seeded_path).unwrap(), ff);

        let fit_ff = ForceField::load(&output.join("fb-fit/forcefield/force-field.offxml")).unwrap();
        assert!(fit_ff.document().root.child("Constraints").is_none());

        let schema: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output.join("schemas/optimizations/fb-fit.json")).unwrap())
                .unwrap();
        assert_eq!(schema["initial_force_field"], "openff-2.1.0");
        assert_eq!(schema["stages"][0]["parameters"][1]["attributes"][0], "k1");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".valfit-staging-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn seeded_bundle_references_the_seeded_force_field() {
        let ff = ForceField::parse(MINI_FF).unwrap();
        let curated = curated(1);
        let fit = FitSettings::default();
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        let seeded_path = dir.path().join("seeded.offxml");
        let bundle = FitBundle {
            curated: &curated,
            seeded: &ff,
            initial_force_field: "openff-2.1.0",
            seeded_from_hessians: true,
            optimization_dataset: Path::new("opt.json"),
            torsion_dataset: Path::new("td.json"),
            fit: &fit,
        };
        emit(&bundle, &output, &seeded_path).unwrap();

        let schema: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output.join("schemas/optimizations/fb-fit.json")).unwrap())
                .unwrap();
        let reference = PathBuf::from(schema["initial_force_field"].as_str().unwrap());
        assert!(reference.is_absolute());
        assert_eq!(fs::canonicalize(reference).unwrap(), fs::canonicalize(&seeded_path).unwrap());
    }

    #[test]
    fn failed_render_leaves_no_output() {
        let ff = ForceField::parse(MINI_FF).unwrap();
        let mut curated = curated(1);
        curated.selected.insert(TermKind::Angle, vec!["a404".into()]);
        let fit = FitSettings::default();
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        let seeded_path = dir.path().join("ff.offxml");
        let bundle = FitBundle {
            curated: &curated,
            seeded: &ff,
            initial_force_field: "openff-2.1.0",
            seeded_from_hessians: false,
            optimization_dataset: Path::new("opt.json"),
            torsion_dataset: Path::new("td.json"),
            fit: &fit,
        };
        assert!(emit(&bundle, &output, &seeded_path).is_err());
        assert!(!output.exists());
        assert!(!seeded_path.exists());
    }
}
