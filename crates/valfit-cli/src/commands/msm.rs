use crate::cli::MsmArgs;
use crate::config::DefaultsConfig;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use tracing::info;
use valfit::engine::config::{MsmConfig, MsmConfigBuilder, MsmSettings};
use valfit::engine::progress::ProgressReporter;
use valfit::workflows;

pub fn build_config(args: MsmArgs, defaults: &DefaultsConfig) -> Result<MsmConfig> {
    let d = MsmSettings::default();
    let settings = MsmSettings {
        vibrational_scaling: args.vibrational_scaling.unwrap_or(d.vibrational_scaling),
        lowest_energy_only: !args.all_conformers,
        ..d
    };
    let mut search_dirs = args.force_field_dirs;
    search_dirs.extend(defaults.force_field_dirs.iter().cloned());

    Ok(MsmConfigBuilder::new()
        .initial_force_field(args.initial_force_field)
        .force_field_search_dirs(search_dirs)
        .optimization_dataset(args.optimization_dataset)
        .output_force_field(args.output_force_field)
        .working_directory(args.working_directory)
        .msm(settings)
        .build()?)
}

pub fn run(args: MsmArgs, quiet: bool) -> Result<()> {
    let config = build_config(args, &DefaultsConfig::from_env())?;
    info!("Seeding '{}' from {:?}", config.force_field.name, config.optimization_dataset);

    let progress_handler = CliProgressHandler::new(quiet);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let result = workflows::msm::run(&config, &reporter)?;

    println!(
        "Modified Seminario: {} records estimated, {} failed",
        result.estimated, result.failed
    );
    println!(
        "✓ {} bond and {} angle parameters seeded, written to: {}",
        result.bond_parameters,
        result.angle_parameters,
        result.output_force_field.display()
    );
    if let Some(dir) = &config.working_directory {
        println!("  Intermediate files: {}", dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::path::PathBuf;

    fn msm_args(extra: &[&str]) -> MsmArgs {
        let mut argv = vec!["valfit", "msm", "-f", "openff-2.1.0", "-o", "seeded.offxml", "-d", "opt.json"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Msm(args) => args,
            other => panic!("expected msm, got {:?}", other),
        }
    }

    #[test]
    fn defaults_use_lowest_energy_conformers() {
        let config = build_config(msm_args(&[]), &DefaultsConfig::default()).unwrap();
        assert!(config.msm.enabled);
        assert!(config.msm.lowest_energy_only);
        assert_eq!(config.msm.vibrational_scaling, 1.0);
        assert_eq!(config.output_force_field, PathBuf::from("seeded.offxml"));
        assert!(config.working_directory.is_none());
    }

    #[test]
    fn flags_are_applied() {
        let defaults = DefaultsConfig {
            force_field_dirs: vec![PathBuf::from("/opt/ff")],
            ..DefaultsConfig::default()
        };
        let args = msm_args(&[
            "--all-conformers",
            "--vibrational-scaling",
            "0.957",
            "-w",
            "work",
            "--force-field-dir",
            "ffs",
        ]);
        let config = build_config(args, &defaults).unwrap();
        assert!(!config.msm.lowest_energy_only);
        assert_eq!(config.msm.vibrational_scaling, 0.957);
        assert_eq!(config.working_directory, Some(PathBuf::from("work")));
        assert_eq!(
            config.force_field.search_dirs,
            vec![PathBuf::from("ffs"), PathBuf::from("/opt/ff")]
        );
    }

    #[test]
    fn invalid_scaling_is_a_config_error() {
        let err = build_config(msm_args(&["--vibrational-scaling", "0"]), &DefaultsConfig::default()).unwrap_err();
        assert!(matches!(err, crate::error::CliError::Config(_)));
    }
}
