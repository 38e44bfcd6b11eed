mod defaults;

pub use defaults::DefaultsConfig;

use crate::cli::{MsmToggle, PrepareArgs};
use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use valfit::engine::config as core_config;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialForceFieldConfig {
    initial: Option<String>,
    search_dirs: Option<Vec<PathBuf>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialDatasetsConfig {
    optimization: Option<Vec<PathBuf>>,
    torsion: Option<Vec<PathBuf>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialExclusionsConfig {
    ring_torsions: Option<PathBuf>,
    smarts: Option<PathBuf>,
    smiles: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum PartialCapStrategy {
    PickHeavy,
    PickLight,
    PickRandom,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialTorsionCapConfig {
    max_per_parameter: Option<usize>,
    strategy: Option<PartialCapStrategy>,
    seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialCurationConfig {
    min_coverage: Option<usize>,
    torsion_cap: Option<PartialTorsionCapConfig>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialMsmConfig {
    enabled: Option<bool>,
    vibrational_scaling: Option<f64>,
    negative_tolerance: Option<f64>,
    force_constant_floor: Option<f64>,
    symmetry_tolerance: Option<f64>,
    lowest_energy_only: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialPriorsConfig {
    bond_k: Option<f64>,
    bond_length: Option<f64>,
    angle_k: Option<f64>,
    angle_angle: Option<f64>,
    proper_k: Option<f64>,
    improper_k: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialFitConfig {
    tag: Option<String>,
    max_iterations: Option<u32>,
    port: Option<u16>,
    step_convergence_threshold: Option<f64>,
    objective_convergence_threshold: Option<f64>,
    gradient_convergence_threshold: Option<f64>,
    n_criteria: Option<u32>,
    initial_trust_radius: Option<f64>,
    minimum_trust_radius: Option<f64>,
    finite_difference_h: Option<f64>,
    eigenvalue_lower_bound: Option<f64>,
    penalty_type: Option<String>,
    search_tolerance: Option<f64>,
    asynchronous: Option<bool>,
    backup: Option<bool>,
    retain_micro_outputs: Option<bool>,
    torsion_weight: Option<f64>,
    torsion_energy_denominator: Option<f64>,
    torsion_energy_cutoff: Option<f64>,
    opt_geo_weight: Option<f64>,
    batch_size: Option<usize>,
    bond_denominator: Option<f64>,
    angle_denominator: Option<f64>,
    dihedral_denominator: Option<f64>,
    improper_denominator: Option<f64>,
    priors: Option<PartialPriorsConfig>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialOutputConfig {
    directory: Option<PathBuf>,
    force_field: Option<PathBuf>,
}

/// The `prepare` configuration file after `--set` overrides, every value optional.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PartialPrepareConfig {
    force_field: Option<PartialForceFieldConfig>,
    datasets: Option<PartialDatasetsConfig>,
    exclusions: Option<PartialExclusionsConfig>,
    curation: Option<PartialCurationConfig>,
    msm: Option<PartialMsmConfig>,
    fit: Option<PartialFitConfig>,
    output: Option<PartialOutputConfig>,
}

impl PartialPrepareConfig {
    /// Reads the optional config file, applies `KEY=VALUE` overrides and deserializes.
    pub fn load(path: Option<&Path>, set_values: &[String]) -> Result<Self> {
        let mut table = match path {
            Some(path) => {
                debug!("Loading configuration from file: {:?}", path);
                let content = std::fs::read_to_string(path)?;
                toml::from_str::<toml::Table>(&content).map_err(|e| CliError::FileParsing {
                    path: path.to_path_buf(),
                    source: e.into(),
                })?
            }
            None => toml::Table::new(),
        };
        apply_set_values(&mut table, set_values)?;

        let content = toml::to_string(&table)
            .map_err(|e| CliError::Config(format!("Failed to re-serialize configuration: {}", e)))?;
        toml::from_str(&content).map_err(|e| match path {
            Some(path) => CliError::FileParsing {
                path: path.to_path_buf(),
                source: e.into(),
            },
            None => CliError::Config(e.to_string()),
        })
    }

    pub fn merge_with_cli(
        self,
        args: &PrepareArgs,
        defaults: &DefaultsConfig,
    ) -> Result<core_config::PipelineConfig> {
        let ff_config = self.force_field.unwrap_or_default();
        let datasets = self.datasets.unwrap_or_default();
        let exclusions = self.exclusions.unwrap_or_default();
        let output = self.output.unwrap_or_default();

        let initial_force_field = args
            .initial_force_field
            .clone()
            .or(ff_config.initial)
            .unwrap_or_else(|| defaults.initial_force_field.clone());

        let mut search_dirs = args.force_field_dirs.clone();
        search_dirs.extend(ff_config.search_dirs.unwrap_or_default());
        search_dirs.extend(defaults.force_field_dirs.iter().cloned());

        let pick = |cli: &[PathBuf], file: Option<Vec<PathBuf>>| -> Vec<PathBuf> {
            if cli.is_empty() {
                file.unwrap_or_default()
            } else {
                cli.to_vec()
            }
        };
        let optimization_datasets = pick(&args.optimization_datasets, datasets.optimization);
        let torsion_datasets = pick(&args.torsion_datasets, datasets.torsion);
        for path in optimization_datasets.iter().chain(&torsion_datasets) {
            if !path.is_file() {
                return Err(core_config::ConfigError::MissingFile {
                    what: "dataset",
                    path: path.clone(),
                }
                .into());
            }
        }

        let mut fit = Self::merge_fit(self.fit.unwrap_or_default());
        if let Some(tag) = &args.tag {
            fit.tag = tag.clone();
        }
        let mut curation = Self::merge_curation(self.curation.unwrap_or_default())?;
        if let Some(min_coverage) = args.min_coverage {
            curation.min_coverage = min_coverage;
        }
        let msm = Self::merge_msm(args.msm, self.msm.unwrap_or_default());

        let mut builder = core_config::PipelineConfigBuilder::new()
            .initial_force_field(initial_force_field)
            .force_field_search_dirs(search_dirs)
            .optimization_datasets(optimization_datasets)
            .torsion_datasets(torsion_datasets)
            .ring_torsions(args.ring_torsions.clone().or(exclusions.ring_torsions))
            .smarts_to_exclude(args.smarts_to_exclude.clone().or(exclusions.smarts))
            .smiles_to_exclude(args.smiles_to_exclude.clone().or(exclusions.smiles))
            .curation(curation)
            .msm(msm)
            .fit(fit)
            .output_directory(
                args.output_directory
                    .clone()
                    .or(output.directory)
                    .unwrap_or_else(|| defaults.output_directory.clone()),
            );
        if let Some(path) = args.output_force_field.clone().or(output.force_field) {
            builder = builder.output_force_field(path);
        }

        Ok(builder.build()?)
    }

    fn merge_msm(toggle: MsmToggle, partial: PartialMsmConfig) -> core_config::MsmSettings {
        let d = core_config::MsmSettings::default();
        let enabled = if toggle.with_msm {
            true
        } else if toggle.no_msm {
            false
        } else {
            partial.enabled.unwrap_or(d.enabled)
        };
        core_config::MsmSettings {
            enabled,
            vibrational_scaling: partial.vibrational_scaling.unwrap_or(d.vibrational_scaling),
            negative_tolerance: partial.negative_tolerance.unwrap_or(d.negative_tolerance),
            force_constant_floor: partial.force_constant_floor.unwrap_or(d.force_constant_floor),
            symmetry_tolerance: partial.symmetry_tolerance.unwrap_or(d.symmetry_tolerance),
            lowest_energy_only: partial.lowest_energy_only.unwrap_or(d.lowest_energy_only),
        }
    }

    fn merge_curation(partial: PartialCurationConfig) -> Result<core_config::CurationSettings> {
        let d = core_config::CurationSettings::default();
        let torsion_cap = match partial.torsion_cap {
            Some(cap) => {
                let max_per_parameter = cap.max_per_parameter.ok_or_else(|| {
                    CliError::Config("`curation.torsion-cap` requires `max-per-parameter`".to_string())
                })?;
                let strategy = match cap.strategy.unwrap_or(PartialCapStrategy::PickHeavy) {
                    PartialCapStrategy::PickHeavy => core_config::CapStrategy::PickHeavy,
                    PartialCapStrategy::PickLight => core_config::CapStrategy::PickLight,
                    PartialCapStrategy::PickRandom => core_config::CapStrategy::PickRandom {
                        seed: cap.seed.unwrap_or(0),
                    },
                };
                Some(core_config::TorsionCap {
                    max_per_parameter,
                    strategy,
                })
            }
            None => d.torsion_cap,
        };
        Ok(core_config::CurationSettings {
            min_coverage: partial.min_coverage.unwrap_or(d.min_coverage),
            torsion_cap,
        })
    }

    fn merge_fit(partial: PartialFitConfig) -> core_config::FitSettings {
        let d = core_config::FitSettings::default();
        let p = partial.priors.unwrap_or_default();
        let priors = core_config::Priors {
            bond_k: p.bond_k.unwrap_or(d.priors.bond_k),
            bond_length: p.bond_length.unwrap_or(d.priors.bond_length),
            angle_k: p.angle_k.unwrap_or(d.priors.angle_k),
            angle_angle: p.angle_angle.unwrap_or(d.priors.angle_angle),
            proper_k: p.proper_k.unwrap_or(d.priors.proper_k),
            improper_k: p.improper_k.unwrap_or(d.priors.improper_k),
        };
        core_config::FitSettings {
            tag: partial.tag.unwrap_or(d.tag),
            max_iterations: partial.max_iterations.unwrap_or(d.max_iterations),
            port: partial.port.unwrap_or(d.port),
            step_convergence_threshold: partial
                .step_convergence_threshold
                .unwrap_or(d.step_convergence_threshold),
            objective_convergence_threshold: partial
                .objective_convergence_threshold
                .unwrap_or(d.objective_convergence_threshold),
            gradient_convergence_threshold: partial
                .gradient_convergence_threshold
                .unwrap_or(d.gradient_convergence_threshold),
            n_criteria: partial.n_criteria.unwrap_or(d.n_criteria),
            initial_trust_radius: partial.initial_trust_radius.unwrap_or(d.initial_trust_radius),
            minimum_trust_radius: partial.minimum_trust_radius.unwrap_or(d.minimum_trust_radius),
            finite_difference_h: partial.finite_difference_h.unwrap_or(d.finite_difference_h),
            eigenvalue_lower_bound: partial.eigenvalue_lower_bound.unwrap_or(d.eigenvalue_lower_bound),
            penalty_type: partial.penalty_type.unwrap_or(d.penalty_type),
            search_tolerance: partial.search_tolerance.unwrap_or(d.search_tolerance),
            asynchronous: partial.asynchronous.unwrap_or(d.asynchronous),
            backup: partial.backup.unwrap_or(d.backup),
            retain_micro_outputs: partial.retain_micro_outputs.unwrap_or(d.retain_micro_outputs),
            torsion_weight: partial.torsion_weight.unwrap_or(d.torsion_weight),
            torsion_energy_denominator: partial
                .torsion_energy_denominator
                .unwrap_or(d.torsion_energy_denominator),
            torsion_energy_cutoff: partial.torsion_energy_cutoff.unwrap_or(d.torsion_energy_cutoff),
            opt_geo_weight: partial.opt_geo_weight.unwrap_or(d.opt_geo_weight),
            batch_size: partial.batch_size.unwrap_or(d.batch_size),
            bond_denominator: partial.bond_denominator.unwrap_or(d.bond_denominator),
            angle_denominator: partial.angle_denominator.unwrap_or(d.angle_denominator),
            dihedral_denominator: partial.dihedral_denominator.unwrap_or(d.dihedral_denominator),
            improper_denominator: partial.improper_denominator.unwrap_or(d.improper_denominator),
            priors,
        }
    }
}

/// Parses a `--set` value as a TOML literal, falling back to a bare string.
fn parse_set_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("value = {}", raw))
        .ok()
        .and_then(|mut t| t.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

fn apply_set_values(table: &mut toml::Table, set_values: &[String]) -> Result<()> {
    for kv_pair in set_values {
        let (key, raw) = kv_pair.split_once('=').ok_or_else(|| {
            CliError::Config(format!("Invalid --set format: '{}'. Expected KEY=VALUE.", kv_pair))
        })?;
        let mut path: Vec<&str> = key.trim().split('.').collect();
        let Some(last) = path.pop().filter(|k| !k.is_empty()) else {
            return Err(CliError::Config(format!("Empty key in --set '{}'", kv_pair)));
        };

        let mut current = &mut *table;
        for section in path {
            current = current
                .entry(section.to_string())
                .or_insert(toml::Value::Table(toml::Table::new()))
                .as_table_mut()
                .ok_or_else(|| CliError::Config(format!("'{}' in '{}' is not a section", section, key)))?;
        }
        current.insert(last.to_string(), parse_set_value(raw.trim()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        optimization: PathBuf,
        torsion: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let optimization = dir.path().join("opt.json");
        let torsion = dir.path().join("td.json");
        fs::write(&optimization, "{}").unwrap();
        fs::write(&torsion, "{}").unwrap();
        Fixture {
            dir,
            optimization,
            torsion,
        }
    }

    fn write_config(fixture: &Fixture, extra: &str) -> PathBuf {
        let path = fixture.dir.path().join("config.toml");
        let content = format!(
            r#"
            [force-field]
            initial = "openff-2.1.0"

            [datasets]
            optimization = ["{}"]
            torsion = ["{}"]

            [output]
            directory = "out"
            {}
            "#,
            fixture.optimization.display(),
            fixture.torsion.display(),
            extra
        );
        fs::write(&path, content).unwrap();
        path
    }

    fn prepare_args(extra: &[&str]) -> PrepareArgs {
        let mut argv = vec!["valfit", "prepare"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Prepare(args) => args,
            other => panic!("expected prepare, got {:?}", other),
        }
    }

    #[test]
    fn file_values_are_merged_with_defaults() {
        let fixture = fixture();
        let path = write_config(
            &fixture,
            r#"
            [fit]
            max-iterations = 12

            [fit.priors]
            bond-k = 50.0

            [curation.torsion-cap]
            max-per-parameter = 3
            strategy = "pick-random"
            seed = 7
            "#,
        );
        let config = PartialPrepareConfig::load(Some(&path), &[])
            .unwrap()
            .merge_with_cli(&prepare_args(&[]), &DefaultsConfig::default())
            .unwrap();

        assert_eq!(config.force_field.name, "openff-2.1.0");
        assert_eq!(config.fit.max_iterations, 12);
        assert_eq!(config.fit.priors.bond_k, 50.0);
        assert_eq!(config.fit.priors.angle_k, 100.0);
        assert_eq!(config.fit.port, 55387);
        assert_eq!(
            config.curation.torsion_cap,
            Some(core_config::TorsionCap {
                max_per_parameter: 3,
                strategy: core_config::CapStrategy::PickRandom { seed: 7 },
            })
        );
        assert!(!config.msm.enabled);
        assert_eq!(config.output_directory, PathBuf::from("out"));
        assert_eq!(config.output_force_field, PathBuf::from("out/fb-fit-seeded.offxml"));
    }

    #[test]
    fn cli_arguments_override_file_values() {
        let fixture = fixture();
        let path = write_config(&fixture, "[msm]\nenabled = false\n");
        let args = prepare_args(&["--msm", "--tag", "bonds-only", "-f", "custom.offxml", "--min-coverage", "2"]);
        let config = PartialPrepareConfig::load(Some(&path), &[])
            .unwrap()
            .merge_with_cli(&args, &DefaultsConfig::default())
            .unwrap();
        assert!(config.msm.enabled);
        assert_eq!(config.fit.tag, "bonds-only");
        assert_eq!(config.force_field.name, "custom.offxml");
        assert_eq!(config.curation.min_coverage, 2);
    }

    #[test]
    fn set_values_override_the_file() {
        let fixture = fixture();
        let path = write_config(&fixture, "[fit]\nbatch-size = 5\n");
        let set = vec![
            "fit.batch-size=8".to_string(),
            "fit.penalty-type=L1".to_string(),
            "msm.vibrational-scaling=0.957".to_string(),
        ];
        let config = PartialPrepareConfig::load(Some(&path), &set)
            .unwrap()
            .merge_with_cli(&prepare_args(&[]), &DefaultsConfig::default())
            .unwrap();
        assert_eq!(config.fit.batch_size, 8);
        assert_eq!(config.fit.penalty_type, "L1");
        assert_eq!(config.msm.vibrational_scaling, 0.957);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let fixture = fixture();
        let path = write_config(&fixture, "[fit]\nmax-iteration = 3\n");
        assert!(matches!(
            PartialPrepareConfig::load(Some(&path), &[]),
            Err(CliError::FileParsing { .. })
        ));
        assert!(matches!(
            PartialPrepareConfig::load(None, &["bogus".to_string()]),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn multiple_datasets_of_one_kind_are_a_config_error() {
        let fixture = fixture();
        let path = write_config(&fixture, "");
        let opt = fixture.optimization.to_string_lossy().to_string();
        let args = prepare_args(&["--optimization-dataset", &opt, "--optimization-dataset", &opt]);
        let err = PartialPrepareConfig::load(Some(&path), &[])
            .unwrap()
            .merge_with_cli(&args, &DefaultsConfig::default())
            .unwrap_err();
        match err {
            CliError::Config(msg) => assert!(msg.contains("Exactly one optimization dataset")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn missing_dataset_files_are_reported() {
        let args = prepare_args(&["--optimization-dataset", "/nonexistent/opt.json"]);
        let err = PartialPrepareConfig::default()
            .merge_with_cli(&args, &DefaultsConfig::default())
            .unwrap_err();
        assert!(matches!(err, CliError::Config(msg) if msg.contains("/nonexistent/opt.json")));
    }
}
