use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "valfit developers",
    version,
    about = "valfit - curate QC datasets, seed bonds and angles from Hessians, and write ForceBalance inputs for SMIRNOFF valence refits.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Number of threads for labeling and Hessian estimation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Curate the datasets, optionally seed from Hessians, and write a ForceBalance job.
    Prepare(PrepareArgs),
    /// Seed the bonds and angles of a force field from Hessians with the modified Seminario method.
    Msm(MsmArgs),
}

/// Arguments for the `prepare` subcommand.
#[derive(Args, Debug, Default)]
pub struct PrepareArgs {
    /// Path to the configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    // --- Input Overrides ---
    /// Initial force field: an OFFXML path or a built-in name such as 'openff-2.1.0'.
    #[arg(short = 'f', long, value_name = "NAME_OR_PATH")]
    pub initial_force_field: Option<String>,

    /// Directory searched for built-in force field names. Can be used multiple times.
    #[arg(long = "force-field-dir", value_name = "DIR")]
    pub force_field_dirs: Vec<PathBuf>,

    /// Optimization result collection (JSON). Exactly one is supported.
    #[arg(long = "optimization-dataset", value_name = "PATH")]
    pub optimization_datasets: Vec<PathBuf>,

    /// Torsion-drive result collection (JSON). Exactly one is supported.
    #[arg(long = "torsion-dataset", value_name = "PATH")]
    pub torsion_datasets: Vec<PathBuf>,

    /// File of ring-torsion parameter ids that are always eligible.
    #[arg(long, value_name = "PATH")]
    pub ring_torsions: Option<PathBuf>,

    /// File of SMARTS patterns whose matching terms are excluded.
    #[arg(long, value_name = "PATH")]
    pub smarts_to_exclude: Option<PathBuf>,

    /// File of SMILES whose molecules are excluded.
    #[arg(long, value_name = "PATH")]
    pub smiles_to_exclude: Option<PathBuf>,

    // --- Output Overrides ---
    /// Directory receiving the fit bundle.
    #[arg(short, long, value_name = "DIR")]
    pub output_directory: Option<PathBuf>,

    /// Where the seeded force field is written.
    #[arg(long, value_name = "PATH")]
    pub output_force_field: Option<PathBuf>,

    /// Name of the optimization, used for the job directory and schema file.
    #[arg(short, long, value_name = "NAME")]
    pub tag: Option<String>,

    // --- Pipeline Overrides ---
    /// Minimum number of records exercising a parameter for it to be fitted.
    #[arg(long, value_name = "INT")]
    pub min_coverage: Option<usize>,

    /// Override `msm.enabled` from the config file.
    #[command(flatten)]
    pub msm: MsmToggle,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S fit.max-iterations=10
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Mutually exclusive flags for the modified Seminario seeding step.
#[derive(Args, Debug, Clone, Copy, Default)]
#[group(required = false, multiple = false)]
pub struct MsmToggle {
    /// Seed bonds and angles from the Hessians of the optimization dataset.
    #[arg(long = "msm")]
    pub with_msm: bool,
    /// Keep the initial bond and angle parameters.
    #[arg(long)]
    pub no_msm: bool,
}

/// Arguments for the `msm` subcommand.
#[derive(Args, Debug)]
pub struct MsmArgs {
    /// Initial force field: an OFFXML path or a built-in name.
    #[arg(short = 'f', long, required = true, value_name = "NAME_OR_PATH")]
    pub initial_force_field: String,

    /// Where the seeded force field is written.
    #[arg(short, long = "output", required = true, value_name = "PATH")]
    pub output_force_field: PathBuf,

    /// Optimization result collection (JSON) with Hessians.
    #[arg(short = 'd', long, required = true, value_name = "PATH")]
    pub optimization_dataset: PathBuf,

    /// Directory for intermediate files (guesses and errored records).
    #[arg(short, long, value_name = "DIR")]
    pub working_directory: Option<PathBuf>,

    /// Directory searched for built-in force field names. Can be used multiple times.
    #[arg(long = "force-field-dir", value_name = "DIR")]
    pub force_field_dirs: Vec<PathBuf>,

    /// Frequency scaling factor; force constants are scaled by its square.
    #[arg(long, value_name = "FLOAT")]
    pub vibrational_scaling: Option<f64>,

    /// Use every record instead of the lowest-energy conformer of each molecule.
    #[arg(long)]
    pub all_conformers: bool,
}
