use std::path::PathBuf;

/// Environment variable listing extra directories searched for built-in force field names.
pub const FORCE_FIELD_PATH_ENV: &str = "VALFIT_FORCE_FIELD_PATH";

/// Values used when neither the command line nor the config file provides one.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultsConfig {
    pub initial_force_field: String,
    pub output_directory: PathBuf,
    pub force_field_dirs: Vec<PathBuf>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            initial_force_field: "openff-2.1.0".to_string(),
            output_directory: PathBuf::from("output"),
            force_field_dirs: Vec::new(),
        }
    }
}

impl DefaultsConfig {
    /// Defaults plus the search directories named in `VALFIT_FORCE_FIELD_PATH`.
    pub fn from_env() -> Self {
        let force_field_dirs = std::env::var_os(FORCE_FIELD_PATH_ENV)
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();
        Self {
            force_field_dirs,
            ..Self::default()
        }
    }
}
