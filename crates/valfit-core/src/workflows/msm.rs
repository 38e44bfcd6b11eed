use crate::core::forcefield::labeling::Labeler;
use crate::core::forcefield::params::ForceField;
use crate::core::io::collections;
use crate::core::models::records::{DataError, OptimizationRecord};
use crate::core::models::term::{TermKind, ValenceTerm};
use crate::engine::config::{MsmConfig, MsmSettings};
use crate::engine::curation::lowest_energy_per_molecule;
use crate::engine::error::EngineError;
use crate::engine::msm;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::seeding::{self, GuessTable};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub const SEMINARIO_PARAMETERS_FILE: &str = "seminario_parameters.json";
pub const ERRORED_RECORDS_FILE: &str = "errored_records.json";

/// Guesses gathered from a set of Hessian records.
#[derive(Debug, Clone, Default)]
pub struct GuessRun {
    pub table: GuessTable,
    /// Records whose Hessian was used.
    pub estimated: usize,
    /// Records skipped because they carry no Hessian.
    pub without_hessian: usize,
    pub failures: Vec<DataError>,
}

/// Estimates every record that carries a Hessian and accumulates the guesses on the
/// parameter ids of its terms.
///
/// Estimation runs in parallel; guesses are added in input order.
pub(crate) fn collect_guesses(
    inputs: &[(&OptimizationRecord, &[ValenceTerm])],
    settings: &MsmSettings,
    reporter: &ProgressReporter,
) -> GuessRun {
    let mut run = GuessRun::default();
    let with_hessian: Vec<&(&OptimizationRecord, &[ValenceTerm])> = inputs
        .iter()
        .filter(|(record, _)| {
            let present = record.hessian.is_some();
            if !present {
                debug!(record = %record.id, "Skipping record without a Hessian");
            }
            present
        })
        .collect();
    run.without_hessian = inputs.len() - with_hessian.len();

    reporter.report(Progress::TaskStart {
        total_steps: with_hessian.len() as u64,
    });

    #[cfg(not(feature = "parallel"))]
    let iterator = with_hessian.iter();

    #[cfg(feature = "parallel")]
    let iterator = with_hessian.par_iter();

    let results: Vec<_> = iterator
        .map(|(record, _)| {
            let result = msm::estimate(record, settings);
            reporter.report(Progress::TaskIncrement);
            result
        })
        .collect();
    reporter.report(Progress::TaskFinish);

    for ((record, terms), result) in with_hessian.into_iter().zip(results) {
        match result {
            Ok(estimate) => {
                let added = run.table.add_estimate(&estimate, terms);
                debug!(record = %record.id, guesses = added, "Estimated force constants");
                run.estimated += 1;
            }
            Err(e) => {
                warn!("{}", e);
                run.failures.push(e);
            }
        }
    }
    run
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsmResult {
    pub estimated: usize,
    pub failed: usize,
    pub bond_parameters: usize,
    pub angle_parameters: usize,
    pub output_force_field: PathBuf,
}

#[derive(Serialize)]
struct ErroredRecord<'a> {
    id: &'a str,
    error: String,
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<(), EngineError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| EngineError::Serialization {
        path: path.to_string_lossy().to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(path, text).map_err(|e| EngineError::io(path, e))
}

fn write_working_files(directory: &Path, run: &GuessRun) -> Result<(), EngineError> {
    std::fs::create_dir_all(directory).map_err(|e| EngineError::io(directory, e))?;
    let means = json!({
        "Bonds": run.table.means(TermKind::Bond),
        "Angles": run.table.means(TermKind::Angle),
    });
    write_json(
        &directory.join(SEMINARIO_PARAMETERS_FILE),
        &json!({ "guesses": run.table, "means": means }),
    )?;
    if !run.failures.is_empty() {
        let errored: Vec<ErroredRecord> = run
            .failures
            .iter()
            .map(|e| ErroredRecord {
                id: e.record(),
                error: e.to_string(),
            })
            .collect();
        write_json(&directory.join(ERRORED_RECORDS_FILE), &errored)?;
    }
    Ok(())
}

/// Seeds the bond and angle parameters of a force field from the Hessians of an
/// optimization collection and writes the result to `config.output_force_field`.
#[instrument(skip_all, name = "msm_workflow")]
pub fn run(config: &MsmConfig, reporter: &ProgressReporter) -> Result<MsmResult, EngineError> {
    // === Phase 1: Loading ===
    let (force_field, records) = reporter.phase("Loading Inputs", || -> Result<_, EngineError> {
        let force_field = ForceField::load_named(&config.force_field.name, &config.force_field.search_dirs)?;
        let loaded = collections::load_optimization_collection(&config.optimization_dataset)?;
        for rejected in &loaded.rejected {
            warn!("Rejected record: {}", rejected);
        }
        info!(
            records = loaded.records.len(),
            rejected = loaded.rejected.len(),
            "Loaded optimization collection."
        );
        Ok((force_field, loaded.records))
    })?;

    let records = if config.msm.lowest_energy_only {
        lowest_energy_per_molecule(records)
    } else {
        records
    };

    // === Phase 2: Labeling ===
    let labels = reporter.phase("Labeling Molecules", || -> Result<_, EngineError> {
        let labeler = Labeler::new(&force_field, &[TermKind::Bond, TermKind::Angle])?;
        let mut labels: HashMap<usize, Vec<ValenceTerm>> = HashMap::new();
        for record in &records {
            labels
                .entry(Arc::as_ptr(&record.molecule) as usize)
                .or_insert_with(|| labeler.label(&record.molecule));
        }
        Ok(labels)
    })?;

    // === Phase 3: Estimation ===
    let inputs: Vec<(&OptimizationRecord, &[ValenceTerm])> = records
        .iter()
        .map(|r| {
            let terms = labels
                .get(&(Arc::as_ptr(&r.molecule) as usize))
                .map_or(&[][..], Vec::as_slice);
            (r, terms)
        })
        .collect();
    let run = reporter.phase("Modified Seminario", || collect_guesses(&inputs, &config.msm, reporter));

    if let Some(directory) = &config.working_directory {
        write_working_files(directory, &run)?;
    }
    if run.table.is_empty() {
        return Err(EngineError::NoMsmGuesses {
            failed: run.failures.len(),
        });
    }

    // === Phase 4: Seeding ===
    let seeded = seeding::seed(&force_field, &run.table, true)?;
    if let Some(parent) = config.output_force_field.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
    }
    seeded.write(&config.output_force_field)?;

    let result = MsmResult {
        estimated: run.estimated,
        failed: run.failures.len(),
        bond_parameters: run.table.guesses(TermKind::Bond).map_or(0, |g| g.len()),
        angle_parameters: run.table.guesses(TermKind::Angle).map_or(0, |g| g.len()),
        output_force_field: config.output_force_field.clone(),
    };
    info!(
        estimated = result.estimated,
        failed = result.failed,
        bonds = result.bond_parameters,
        angles = result.angle_parameters,
        "Seeded force field written to {}.",
        result.output_force_field.display()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::MsmConfigBuilder;
    use crate::engine::msm::tests::water;

    const WATER_FF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<SMIRNOFF version="0.3" aromaticity_model="OEAroModel_MDL">
    <Bonds version="0.4" potential="harmonic" fractional_bondorder_method="AM1-Wiberg" fractional_bondorder_interpolation="linear">
        <Bond smirks="[#1:1]-[#8:2]" id="b88" length="0.97 * angstrom" k="1100.0 * angstrom**-2 * mole**-1 * kilocalorie"></Bond>
    </Bonds>
    <Angles version="0.3" potential="harmonic">
        <Angle smirks="[#1:1]-[#8:2]-[#1:3]" id="a41" angle="104.0 * degree" k="130.0 * mole**-1 * radian**-2 * kilocalorie"></Angle>
    </Angles>
</SMIRNOFF>
"#;

    fn terms(record: &OptimizationRecord) -> Vec<ValenceTerm> {
        let ff = ForceField::parse(WATER_FF).unwrap();
        Labeler::new(&ff, &[TermKind::Bond, TermKind::Angle])
            .unwrap()
            .label(&record.molecule)
    }

    #[test]
    fn records_without_hessians_are_skipped_not_failed() {
        let good = water(500.0, 80.0);
        let mut bare = water(500.0, 80.0);
        bare.id = "bare".into();
        bare.hessian = None;
        let good_terms = terms(&good);
        let inputs = vec![(&good, good_terms.as_slice()), (&bare, good_terms.as_slice())];
        let run = collect_guesses(&inputs, &MsmSettings::default(), &ProgressReporter::new());
        assert_eq!(run.estimated, 1);
        assert_eq!(run.without_hessian, 1);
        assert!(run.failures.is_empty());
        assert_eq!(run.table.guesses(TermKind::Bond).unwrap()["b88"].len(), 2);
        assert_eq!(run.table.guesses(TermKind::Angle).unwrap()["a41"].len(), 1);
    }

    #[test]
    fn failed_estimates_are_collected() {
        let mut broken = water(500.0, 80.0);
        if let Some(h) = broken.hessian.as_mut() {
            h[(0, 1)] += 10.0;
        }
        let broken_terms = terms(&broken);
        let run = collect_guesses(
            &[(&broken, broken_terms.as_slice())],
            &MsmSettings::default(),
            &ProgressReporter::new(),
        );
        assert_eq!(run.failures.len(), 1);
        assert!(run.table.is_empty());
    }

    #[test]
    fn collection_without_hessians_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ff_path = dir.path().join("water.offxml");
        std::fs::write(&ff_path, WATER_FF).unwrap();
        let dataset = dir.path().join("opt.json");
        std::fs::write(
            &dataset,
            r#"{"type": "OptimizationResultCollection", "records": [
                {"id": 1, "smiles": "[O:1]([H:2])[H:3]",
                 "geometry": [[0,0,0],[1.8,0,0],[-0.4,1.7,0]], "energy": -76.0, "hessian": null}
            ]}"#,
        )
        .unwrap();
        let config = MsmConfigBuilder::new()
            .initial_force_field(ff_path.to_string_lossy())
            .optimization_dataset(dataset)
            .output_force_field(dir.path().join("out.offxml"))
            .working_directory(Some(dir.path().join("work")))
            .build()
            .unwrap();
        let err = run(&config, &ProgressReporter::new()).unwrap_err();
        assert!(matches!(err, EngineError::NoMsmGuesses { failed: 0 }));
        assert!(dir.path().join("work").join(SEMINARIO_PARAMETERS_FILE).is_file());
        assert!(!dir.path().join("out.offxml").exists());
    }
}
