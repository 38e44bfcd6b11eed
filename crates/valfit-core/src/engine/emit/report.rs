use crate::core::forcefield::params::ForceField;
use crate::core::models::term::TermKind;
use crate::engine::curation::CuratedDatasets;
use crate::engine::error::EngineError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const OPT_SMIRKS_FILE: &str = "opt-smirks.json";
pub const TD_SMIRKS_FILE: &str = "td-smirks.json";
pub const COVERAGE_FILE: &str = "coverage.csv";

/// Selected SMIRKS keyed by handler name; every requested handler is present.
pub fn selected_smirks(
    force_field: &ForceField,
    curated: &CuratedDatasets,
    kinds: &[TermKind],
) -> BTreeMap<&'static str, Vec<String>> {
    kinds
        .iter()
        .map(|&kind| {
            let smirks = curated
                .selected
                .get(&kind)
                .into_iter()
                .flatten()
                .filter_map(|id| force_field.parameter(kind, id))
                .map(|p| p.smirks)
                .collect();
            (kind.handler_name(), smirks)
        })
        .collect()
}

pub fn write_smirks_json(path: &Path, smirks: &BTreeMap<&'static str, Vec<String>>) -> Result<(), EngineError> {
    let text = serde_json::to_string_pretty(smirks).map_err(|e| EngineError::Serialization {
        path: path.to_string_lossy().to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(path, text).map_err(|e| EngineError::io(path, e))
}

#[derive(Debug, Serialize)]
struct CoverageRow<'a> {
    id: &'a str,
    handler: &'static str,
    smirks: &'a str,
    coverage: usize,
    selected: bool,
}

/// One row per parameter of every valence handler, in force-field order.
pub fn write_coverage_csv(path: &Path, force_field: &ForceField, curated: &CuratedDatasets) -> Result<(), EngineError> {
    let csv_error = |e: csv::Error| EngineError::Serialization {
        path: path.to_string_lossy().to_string(),
        message: e.to_string(),
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    for kind in TermKind::ALL {
        for parameter in force_field.parameters(kind) {
            writer
                .serialize(CoverageRow {
                    id: &parameter.id,
                    handler: kind.handler_name(),
                    smirks: &parameter.smirks,
                    coverage: curated.coverage_of(kind, &parameter.id),
                    selected: curated.is_selected(kind, &parameter.id),
                })
                .map_err(csv_error)?;
        }
    }
    writer.flush().map_err(|e| EngineError::io(path, e))
}
