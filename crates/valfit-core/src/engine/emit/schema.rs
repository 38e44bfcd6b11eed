//! The optimization schema: a self-contained JSON description of the fit.

use crate::core::forcefield::params::{ForceField, ForceFieldError, Parameter};
use crate::core::models::term::TermKind;
use crate::engine::config::FitSettings;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Angle SMIRKS whose equilibrium stays fixed at 180°; only `k` is fitted.
pub const LINEAR_ANGLE_SMIRKS: [&str; 4] = [
    "[*:1]~[#6X2:2]~[*:3]",
    "[*:1]~[#7X2:2]~[*:3]",
    "[*:1]~[#7X2:2]~[#7X1:3]",
    "[*:1]=[#16X2:2]=[*:3]",
];

/// Handler order of the `parameters` list.
const PARAMETER_ORDER: [TermKind; 4] = [
    TermKind::Angle,
    TermKind::Bond,
    TermKind::ProperTorsion,
    TermKind::ImproperTorsion,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetParameter {
    #[serde(rename = "type")]
    pub schema_type: &'static str,
    pub smirks: String,
    pub attributes: Vec<String>,
    #[serde(skip)]
    pub kind: TermKind,
    #[serde(skip)]
    pub id: String,
}

fn schema_type(kind: TermKind) -> &'static str {
    match kind {
        TermKind::Bond => "BondSMIRKS",
        TermKind::Angle => "AngleSMIRKS",
        TermKind::ProperTorsion => "ProperTorsionSMIRKS",
        TermKind::ImproperTorsion => "ImproperTorsionSMIRKS",
    }
}

/// Attributes of a parameter that the fit may change.
pub fn fitted_attributes(parameter: &Parameter) -> Vec<String> {
    match parameter.kind {
        TermKind::Bond => vec!["k".to_string(), "length".to_string()],
        TermKind::Angle if LINEAR_ANGLE_SMIRKS.contains(&parameter.smirks.as_str()) => {
            vec!["k".to_string()]
        }
        TermKind::Angle => vec!["k".to_string(), "angle".to_string()],
        TermKind::ProperTorsion | TermKind::ImproperTorsion => (1..=parameter.fourier_term_count())
            .map(|i| format!("k{}", i))
            .collect(),
    }
}

/// Resolves selected ids to fitted parameters, angles first, then bonds and torsions.
pub fn target_parameters(
    force_field: &ForceField,
    selected: &BTreeMap<TermKind, Vec<String>>,
) -> Result<Vec<TargetParameter>, ForceFieldError> {
    let mut parameters = Vec::new();
    for kind in PARAMETER_ORDER {
        for id in selected.get(&kind).into_iter().flatten() {
            let parameter =
                force_field
                    .parameter(kind, id)
                    .ok_or_else(|| ForceFieldError::UnknownParameter {
                        handler: kind.handler_name(),
                        id: id.clone(),
                    })?;
            let attributes = fitted_attributes(&parameter);
            if attributes.is_empty() {
                continue;
            }
            parameters.push(TargetParameter {
                schema_type: schema_type(kind),
                smirks: parameter.smirks,
                attributes,
                kind,
                id: parameter.id,
            });
        }
    }
    Ok(parameters)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizerSchema {
    #[serde(rename = "type")]
    pub schema_type: &'static str,
    pub max_iterations: u32,
    pub step_convergence_threshold: f64,
    pub objective_convergence_threshold: f64,
    pub gradient_convergence_threshold: f64,
    pub n_criteria: u32,
    pub initial_trust_radius: f64,
    pub minimum_trust_radius: f64,
    pub finite_difference_h: f64,
    pub eigenvalue_lower_bound: f64,
    pub penalty_type: String,
    pub extras: BTreeMap<String, String>,
}

impl OptimizerSchema {
    pub fn from_settings(settings: &FitSettings) -> Self {
        let flag = |b: bool| (if b { "1" } else { "0" }).to_string();
        let extras = BTreeMap::from([
            ("wq_port".to_string(), settings.port.to_string()),
            (
                "asynchronous".to_string(),
                (if settings.asynchronous { "True" } else { "False" }).to_string(),
            ),
            ("search_tolerance".to_string(), settings.search_tolerance.to_string()),
            ("backup".to_string(), flag(settings.backup)),
            ("retain_micro_outputs".to_string(), flag(settings.retain_micro_outputs)),
        ]);
        Self {
            schema_type: "ForceBalance",
            max_iterations: settings.max_iterations,
            step_convergence_threshold: settings.step_convergence_threshold,
            objective_convergence_threshold: settings.objective_convergence_threshold,
            gradient_convergence_threshold: settings.gradient_convergence_threshold,
            n_criteria: settings.n_criteria,
            initial_trust_radius: settings.initial_trust_radius,
            minimum_trust_radius: settings.minimum_trust_radius,
            finite_difference_h: settings.finite_difference_h,
            eigenvalue_lower_bound: settings.eigenvalue_lower_bound,
            penalty_type: settings.penalty_type.clone(),
            extras,
        }
    }
}

/// Records a target is built from, by dataset file and record id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceData {
    #[serde(rename = "type")]
    pub schema_type: &'static str,
    pub path: String,
    pub record_ids: Vec<String>,
}

impl ReferenceData {
    pub fn local(path: &Path, record_ids: Vec<String>) -> Self {
        Self {
            schema_type: "local",
            path: path.to_string_lossy().to_string(),
            record_ids,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TargetSchema {
    TorsionProfile {
        weight: f64,
        reference_data: ReferenceData,
        energy_denominator: f64,
        energy_cutoff: f64,
        extras: BTreeMap<String, String>,
    },
    OptGeo {
        weight: f64,
        reference_data: ReferenceData,
        bond_denominator: f64,
        angle_denominator: f64,
        dihedral_denominator: f64,
        improper_denominator: f64,
        extras: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hyperparameters {
    #[serde(rename = "type")]
    pub schema_type: &'static str,
    pub priors: BTreeMap<&'static str, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSchema {
    pub optimizer: OptimizerSchema,
    pub targets: Vec<TargetSchema>,
    pub parameters: Vec<TargetParameter>,
    pub parameter_hyperparameters: Vec<Hyperparameters>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationSchema {
    #[serde(rename = "type")]
    pub schema_type: &'static str,
    pub id: String,
    pub initial_force_field: String,
    pub stages: Vec<StageSchema>,
}

fn hyperparameters(settings: &FitSettings) -> Vec<Hyperparameters> {
    let priors = &settings.priors;
    vec![
        Hyperparameters {
            schema_type: "AngleHyperparameters",
            priors: BTreeMap::from([("k", priors.angle_k), ("angle", priors.angle_angle)]),
        },
        Hyperparameters {
            schema_type: "BondHyperparameters",
            priors: BTreeMap::from([("k", priors.bond_k), ("length", priors.bond_length)]),
        },
        Hyperparameters {
            schema_type: "ProperTorsionHyperparameters",
            priors: BTreeMap::from([("k", priors.proper_k)]),
        },
        Hyperparameters {
            schema_type: "ImproperTorsionHyperparameters",
            priors: BTreeMap::from([("k", priors.improper_k)]),
        },
    ]
}

pub fn build_schema(
    settings: &FitSettings,
    initial_force_field: &str,
    parameters: Vec<TargetParameter>,
    torsion_data: ReferenceData,
    optimization_data: ReferenceData,
) -> OptimizationSchema {
    let remote = || BTreeMap::from([("remote".to_string(), "1".to_string())]);
    let mut optgeo_extras = remote();
    optgeo_extras.insert("batch_size".to_string(), settings.batch_size.to_string());

    let targets = vec![
        TargetSchema::TorsionProfile {
            weight: settings.torsion_weight,
            reference_data: torsion_data,
            energy_denominator: settings.torsion_energy_denominator,
            energy_cutoff: settings.torsion_energy_cutoff,
            extras: remote(),
        },
        TargetSchema::OptGeo {
            weight: settings.opt_geo_weight,
            reference_data: optimization_data,
            bond_denominator: settings.bond_denominator,
            angle_denominator: settings.angle_denominator,
            dihedral_denominator: settings.dihedral_denominator,
            improper_denominator: settings.improper_denominator,
            extras: optgeo_extras,
        },
    ];

    OptimizationSchema {
        schema_type: "optimization",
        id: settings.tag.clone(),
        initial_force_field: initial_force_field.to_string(),
        stages: vec![StageSchema {
            optimizer: OptimizerSchema::from_settings(settings),
            targets,
            parameters,
            parameter_hyperparameters: hyperparameters(settings),
        }],
    }
}

/// The absolute path of an existing force-field file, otherwise the name as given.
pub fn initial_force_field_reference(name: &str) -> String {
    let path = Path::new(name);
    if path.is_file() {
        if let Ok(absolute) = std::fs::canonicalize(path) {
            return absolute.to_string_lossy().to_string();
        }
    }
    name.to_string()
}
