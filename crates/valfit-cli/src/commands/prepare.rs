use crate::cli::PrepareArgs;
use crate::config::{DefaultsConfig, PartialPrepareConfig};
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use tracing::{info, warn};
use valfit::engine::progress::ProgressReporter;
use valfit::workflows;

pub fn run(args: PrepareArgs, quiet: bool) -> Result<()> {
    let partial_config = PartialPrepareConfig::load(args.config.as_deref(), &args.set_values)?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_with_cli(&args, &DefaultsConfig::from_env())?;

    let progress_handler = CliProgressHandler::new(quiet);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Preparing fit '{}'...", config.fit.tag);
    let result = workflows::prepare::run(&config, &reporter)?;

    let report = &result.curation;
    println!(
        "Optimizations: {} kept of {} ({} duplicates, {} invalid, {} without eligible terms)",
        report.optimizations_kept,
        report.optimizations_in,
        report.optimization_duplicates,
        report.optimizations_invalid,
        report.optimizations_without_terms
    );
    println!(
        "Torsion drives: {} kept of {} ({} duplicates, {} without samples, {} without eligible terms, {} capped)",
        report.torsion_drives_kept,
        report.torsion_drives_in,
        report.torsion_drive_duplicates,
        report.torsion_drives_without_samples,
        report.torsion_drives_without_terms,
        report.torsion_drives_capped
    );
    if result.rejected > 0 {
        warn!("{} records were rejected while loading.", result.rejected);
        println!("Rejected while loading: {}", result.rejected);
    }
    if let Some(msm) = &result.msm {
        println!(
            "Modified Seminario: {} records estimated, {} failed, {} without a Hessian",
            msm.estimated, msm.failed, msm.without_hessian
        );
    }
    println!(
        "✓ {} parameters, {} torsion targets and {} opt-geo batches written to: {}",
        result.emit.fitted_parameters,
        result.emit.torsion_targets,
        result.emit.opt_geo_targets,
        result.emit.output_directory.display()
    );
    println!("  Seeded force field: {}", result.emit.seeded_force_field.display());
    Ok(())
}
