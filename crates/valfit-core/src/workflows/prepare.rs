use super::msm::{GuessRun, collect_guesses};
use crate::core::forcefield::params::ForceField;
use crate::core::io::collections;
use crate::core::models::records::OptimizationRecord;
use crate::core::models::term::ValenceTerm;
use crate::engine::config::PipelineConfig;
use crate::engine::curation::{self, CurationReport, lowest_energy_per_molecule};
use crate::engine::emit::{self, EmitSummary, FitBundle};
use crate::engine::error::EngineError;
use crate::engine::exclusion::ExclusionSet;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::seeding::{self, GuessTable};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MsmSummary {
    pub estimated: usize,
    pub without_hessian: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct PrepareResult {
    pub curation: CurationReport,
    /// Records rejected while loading the collections.
    pub rejected: usize,
    pub msm: Option<MsmSummary>,
    pub emit: EmitSummary,
}

/// Runs the full preparation pipeline: load, curate, optionally seed from Hessians, emit.
#[instrument(skip_all, name = "prepare_workflow")]
pub fn run(config: &PipelineConfig, reporter: &ProgressReporter) -> Result<PrepareResult, EngineError> {
    // === Phase 0: Loading inputs ===
    reporter.report(Progress::PhaseStart {
        name: "Loading Inputs",
    });
    info!("Loading force field, exclusion lists and datasets.");
    let force_field = ForceField::load_named(&config.force_field.name, &config.force_field.search_dirs)?;
    let exclusions = ExclusionSet::load(&config.exclusions)?;
    let optimizations = collections::load_optimization_collection(&config.optimization_dataset)?;
    let torsion_drives = collections::load_torsion_drive_collection(&config.torsion_dataset)?;
    let rejected = optimizations.rejected.len() + torsion_drives.rejected.len();
    for error in optimizations.rejected.iter().chain(&torsion_drives.rejected) {
        warn!("Rejected record: {}", error);
    }
    info!(
        optimizations = optimizations.records.len(),
        torsion_drives = torsion_drives.records.len(),
        rejected,
        "Datasets loaded."
    );
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Curation ===
    let curated = reporter.phase("Curating Datasets", || {
        curation::curate(
            optimizations.records,
            torsion_drives.records,
            &force_field,
            &exclusions,
            &config.curation,
            reporter,
        )
    })?;

    // === Phase 2: Modified Seminario (optional) ===
    let (guesses, msm) = if config.msm.enabled {
        let run = reporter.phase("Modified Seminario", || estimate_curated(&curated, config, reporter));
        if run.table.is_empty() {
            return Err(EngineError::NoMsmGuesses {
                failed: run.failures.len(),
            });
        }
        let summary = MsmSummary {
            estimated: run.estimated,
            without_hessian: run.without_hessian,
            failed: run.failures.len(),
        };
        (run.table, Some(summary))
    } else {
        (GuessTable::new(), None)
    };

    // === Phase 3: Seeding ===
    let seeded = seeding::seed(&force_field, &guesses, config.msm.enabled)?;

    // === Phase 4: Emission ===
    let bundle = FitBundle {
        curated: &curated,
        seeded: &seeded,
        initial_force_field: &config.force_field.name,
        seeded_from_hessians: config.msm.enabled,
        optimization_dataset: &config.optimization_dataset,
        torsion_dataset: &config.torsion_dataset,
        fit: &config.fit,
    };
    let emitted = reporter.phase("Writing Fit Inputs", || {
        emit::emit(&bundle, &config.output_directory, &config.output_force_field)
    })?;

    info!(
        "Preparation complete: {} optimization and {} torsion-drive records, {} parameters to fit.",
        curated.report.optimizations_kept, curated.report.torsion_drives_kept, emitted.fitted_parameters
    );
    Ok(PrepareResult {
        curation: curated.report,
        rejected,
        msm,
        emit: emitted,
    })
}

/// Hessian estimates over the curated optimization records, restricted to their eligible terms.
fn estimate_curated(
    curated: &curation::CuratedDatasets,
    config: &PipelineConfig,
    reporter: &ProgressReporter,
) -> GuessRun {
    let terms: HashMap<&str, &[ValenceTerm]> = curated
        .optimizations
        .iter()
        .map(|c| (c.record.id.as_str(), c.terms.as_slice()))
        .collect();
    let records: Vec<OptimizationRecord> = curated.optimizations.iter().map(|c| c.record.clone()).collect();
    let records = if config.msm.lowest_energy_only {
        lowest_energy_per_molecule(records)
    } else {
        records
    };
    let inputs: Vec<(&OptimizationRecord, &[ValenceTerm])> = records
        .iter()
        .map(|r| (r, terms.get(r.id.as_str()).copied().unwrap_or_default()))
        .collect();
    collect_guesses(&inputs, &config.msm, reporter)
}
