use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Exactly one {kind} dataset is supported, got {count}")]
    UnsupportedDatasetCount { kind: &'static str, count: usize },
    #[error("Input file for {what} does not exist: {path}")]
    MissingFile { what: &'static str, path: PathBuf },
    #[error("Invalid value for {parameter}: {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

/// How the modified Seminario estimates are computed and whether they are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct MsmSettings {
    pub enabled: bool,
    /// Force constants are multiplied by the square of this factor.
    pub vibrational_scaling: f64,
    /// Projected stiffness below `-negative_tolerance` marks the record as invalid.
    pub negative_tolerance: f64,
    /// Stiffness below this value is clipped to zero.
    pub force_constant_floor: f64,
    /// Largest tolerated |H - Hᵀ| element, in kcal/mol/Å².
    pub symmetry_tolerance: f64,
    /// Use only the lowest-energy optimization record of each molecule.
    pub lowest_energy_only: bool,
}

impl Default for MsmSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            vibrational_scaling: 1.0,
            negative_tolerance: 1.0,
            force_constant_floor: 1e-3,
            symmetry_tolerance: 1e-3,
            lowest_energy_only: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapStrategy {
    PickHeavy,
    PickLight,
    PickRandom { seed: u64 },
}

/// Upper bound on the torsion drives kept per torsion parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TorsionCap {
    pub max_per_parameter: usize,
    pub strategy: CapStrategy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurationSettings {
    /// Minimum number of retained records exercising a parameter for it to be selected.
    pub min_coverage: usize,
    pub torsion_cap: Option<TorsionCap>,
}

impl Default for CurationSettings {
    fn default() -> Self {
        Self {
            min_coverage: 1,
            torsion_cap: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Priors {
    pub bond_k: f64,
    pub bond_length: f64,
    pub angle_k: f64,
    pub angle_angle: f64,
    pub proper_k: f64,
    pub improper_k: f64,
}

impl Default for Priors {
    fn default() -> Self {
        Self {
            bond_k: 100.0,
            bond_length: 0.1,
            angle_k: 100.0,
            angle_angle: 5.0,
            proper_k: 5.0,
            improper_k: 5.0,
        }
    }
}

/// Optimizer and target settings for the generated ForceBalance job.
#[derive(Debug, Clone, PartialEq)]
pub struct FitSettings {
    pub tag: String,
    pub max_iterations: u32,
    pub port: u16,
    pub step_convergence_threshold: f64,
    pub objective_convergence_threshold: f64,
    pub gradient_convergence_threshold: f64,
    pub n_criteria: u32,
    pub initial_trust_radius: f64,
    pub minimum_trust_radius: f64,
    pub finite_difference_h: f64,
    pub eigenvalue_lower_bound: f64,
    pub penalty_type: String,
    pub search_tolerance: f64,
    pub asynchronous: bool,
    pub backup: bool,
    pub retain_micro_outputs: bool,
    pub torsion_weight: f64,
    pub torsion_energy_denominator: f64,
    pub torsion_energy_cutoff: f64,
    pub opt_geo_weight: f64,
    pub batch_size: usize,
    pub bond_denominator: f64,
    pub angle_denominator: f64,
    pub dihedral_denominator: f64,
    pub improper_denominator: f64,
    pub priors: Priors,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            tag: "fb-fit".to_string(),
            max_iterations: 50,
            port: 55387,
            step_convergence_threshold: 0.01,
            objective_convergence_threshold: 0.1,
            gradient_convergence_threshold: 0.1,
            n_criteria: 2,
            initial_trust_radius: -1.0,
            minimum_trust_radius: 0.05,
            finite_difference_h: 0.01,
            eigenvalue_lower_bound: 0.01,
            penalty_type: "L2".to_string(),
            search_tolerance: 0.1,
            asynchronous: true,
            backup: false,
            retain_micro_outputs: false,
            torsion_weight: 1.0,
            torsion_energy_denominator: 1.0,
            torsion_energy_cutoff: 8.0,
            opt_geo_weight: 0.01,
            batch_size: 30,
            bond_denominator: 0.05,
            angle_denominator: 5.0,
            dihedral_denominator: 10.0,
            improper_denominator: 10.0,
            priors: Priors::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExclusionFiles {
    pub ring_torsions: Option<PathBuf>,
    pub smarts: Option<PathBuf>,
    pub smiles: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForceFieldSource {
    /// A path to an OFFXML file or the name of a built-in force field.
    pub name: String,
    pub search_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub force_field: ForceFieldSource,
    pub optimization_dataset: PathBuf,
    pub torsion_dataset: PathBuf,
    pub exclusions: ExclusionFiles,
    pub curation: CurationSettings,
    pub msm: MsmSettings,
    pub fit: FitSettings,
    pub output_directory: PathBuf,
    /// Where the seeded force field is written; defaults to `<output>/<tag>-seeded.offxml`.
    pub output_force_field: PathBuf,
}

fn single_dataset(
    datasets: Option<Vec<PathBuf>>,
    parameter: &'static str,
    kind: &'static str,
) -> Result<PathBuf, ConfigError> {
    let mut datasets = datasets.ok_or(ConfigError::MissingParameter(parameter))?;
    match datasets.len() {
        0 => Err(ConfigError::MissingParameter(parameter)),
        1 => Ok(datasets.remove(0)),
        count => Err(ConfigError::UnsupportedDatasetCount { kind, count }),
    }
}

fn validate_settings(msm: &MsmSettings, curation: &CurationSettings, fit: &FitSettings) -> Result<(), ConfigError> {
    if !(msm.vibrational_scaling.is_finite() && msm.vibrational_scaling > 0.0) {
        return Err(ConfigError::InvalidValue {
            parameter: "vibrational_scaling",
            reason: format!("must be a positive number, got {}", msm.vibrational_scaling),
        });
    }
    if msm.negative_tolerance < 0.0 || msm.force_constant_floor < 0.0 {
        return Err(ConfigError::InvalidValue {
            parameter: "negative_tolerance",
            reason: "tolerances must not be negative".to_string(),
        });
    }
    if let Some(cap) = &curation.torsion_cap {
        if cap.max_per_parameter == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "torsion_cap",
                reason: "cap must be at least 1".to_string(),
            });
        }
    }
    if fit.batch_size == 0 {
        return Err(ConfigError::InvalidValue {
            parameter: "batch_size",
            reason: "must be at least 1".to_string(),
        });
    }
    if fit.tag.is_empty() || fit.tag.contains(['/', '\\']) {
        return Err(ConfigError::InvalidValue {
            parameter: "tag",
            reason: format!("'{}' is not a usable directory name", fit.tag),
        });
    }
    Ok(())
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    initial_force_field: Option<String>,
    force_field_search_dirs: Vec<PathBuf>,
    optimization_datasets: Option<Vec<PathBuf>>,
    torsion_datasets: Option<Vec<PathBuf>>,
    exclusions: ExclusionFiles,
    curation: Option<CurationSettings>,
    msm: Option<MsmSettings>,
    fit: Option<FitSettings>,
    output_directory: Option<PathBuf>,
    output_force_field: Option<PathBuf>,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_force_field(mut self, name: impl Into<String>) -> Self {
        self.initial_force_field = Some(name.into());
        self
    }
    pub fn force_field_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.force_field_search_dirs = dirs;
        self
    }
    pub fn optimization_datasets(mut self, paths: Vec<PathBuf>) -> Self {
        self.optimization_datasets = Some(paths);
        self
    }
    pub fn torsion_datasets(mut self, paths: Vec<PathBuf>) -> Self {
        self.torsion_datasets = Some(paths);
        self
    }
    pub fn ring_torsions(mut self, path: Option<PathBuf>) -> Self {
        self.exclusions.ring_torsions = path;
        self
    }
    pub fn smarts_to_exclude(mut self, path: Option<PathBuf>) -> Self {
        self.exclusions.smarts = path;
        self
    }
    pub fn smiles_to_exclude(mut self, path: Option<PathBuf>) -> Self {
        self.exclusions.smiles = path;
        self
    }
    pub fn curation(mut self, settings: CurationSettings) -> Self {
        self.curation = Some(settings);
        self
    }
    pub fn msm(mut self, settings: MsmSettings) -> Self {
        self.msm = Some(settings);
        self
    }
    pub fn fit(mut self, settings: FitSettings) -> Self {
        self.fit = Some(settings);
        self
    }
    pub fn output_directory(mut self, path: PathBuf) -> Self {
        self.output_directory = Some(path);
        self
    }
    pub fn output_force_field(mut self, path: PathBuf) -> Self {
        self.output_force_field = Some(path);
        self
    }

    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let force_field = ForceFieldSource {
            name: self
                .initial_force_field
                .ok_or(ConfigError::MissingParameter("initial_force_field"))?,
            search_dirs: self.force_field_search_dirs,
        };
        let optimization_dataset =
            single_dataset(self.optimization_datasets, "optimization_datasets", "optimization")?;
        let torsion_dataset =
            single_dataset(self.torsion_datasets, "torsion_datasets", "torsion-drive")?;
        let output_directory = self
            .output_directory
            .ok_or(ConfigError::MissingParameter("output_directory"))?;

        let curation = self.curation.unwrap_or_default();
        let msm = self.msm.unwrap_or_default();
        let fit = self.fit.unwrap_or_default();
        validate_settings(&msm, &curation, &fit)?;

        let output_force_field = self
            .output_force_field
            .unwrap_or_else(|| output_directory.join(format!("{}-seeded.offxml", fit.tag)));

        Ok(PipelineConfig {
            force_field,
            optimization_dataset,
            torsion_dataset,
            exclusions: self.exclusions,
            curation,
            msm,
            fit,
            output_directory,
            output_force_field,
        })
    }
}

/// Settings for seeding a force field from Hessians without preparing a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct MsmConfig {
    pub force_field: ForceFieldSource,
    pub optimization_dataset: PathBuf,
    pub output_force_field: PathBuf,
    pub working_directory: Option<PathBuf>,
    pub msm: MsmSettings,
}

#[derive(Default)]
pub struct MsmConfigBuilder {
    initial_force_field: Option<String>,
    force_field_search_dirs: Vec<PathBuf>,
    optimization_dataset: Option<PathBuf>,
    output_force_field: Option<PathBuf>,
    working_directory: Option<PathBuf>,
    msm: Option<MsmSettings>,
}

impl MsmConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_force_field(mut self, name: impl Into<String>) -> Self {
        self.initial_force_field = Some(name.into());
        self
    }
    pub fn force_field_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.force_field_search_dirs = dirs;
        self
    }
    pub fn optimization_dataset(mut self, path: PathBuf) -> Self {
        self.optimization_dataset = Some(path);
        self
    }
    pub fn output_force_field(mut self, path: PathBuf) -> Self {
        self.output_force_field = Some(path);
        self
    }
    pub fn working_directory(mut self, path: Option<PathBuf>) -> Self {
        self.working_directory = path;
        self
    }
    pub fn msm(mut self, settings: MsmSettings) -> Self {
        self.msm = Some(settings);
        self
    }

    pub fn build(self) -> Result<MsmConfig, ConfigError> {
        let msm = MsmSettings {
            enabled: true,
            ..self.msm.unwrap_or_default()
        };
        validate_settings(&msm, &CurationSettings::default(), &FitSettings::default())?;
        Ok(MsmConfig {
            force_field: ForceFieldSource {
                name: self
                    .initial_force_field
                    .ok_or(ConfigError::MissingParameter("initial_force_field"))?,
                search_dirs: self.force_field_search_dirs,
            },
            optimization_dataset: self
                .optimization_dataset
                .ok_or(ConfigError::MissingParameter("optimization_dataset"))?,
            output_force_field: self
                .output_force_field
                .ok_or(ConfigError::MissingParameter("output_force_field"))?,
            working_directory: self.working_directory,
            msm,
        })
    }
}
