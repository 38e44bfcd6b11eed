use super::config::{CapStrategy, CurationSettings, TorsionCap};
use super::error::EngineError;
use super::exclusion::ExclusionSet;
use super::progress::{Progress, ProgressReporter};
use crate::core::chem::molecule::Molecule;
use crate::core::forcefield::labeling::Labeler;
use crate::core::forcefield::params::ForceField;
use crate::core::models::records::{DataError, OptimizationRecord, TorsionDriveRecord};
use crate::core::models::term::{TermKind, ValenceTerm};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const OPTIMIZATION_KINDS: [TermKind; 2] = [TermKind::Bond, TermKind::Angle];
const TORSION_KINDS: [TermKind; 2] = [TermKind::ProperTorsion, TermKind::ImproperTorsion];

/// Parameter id → number of retained records exercising it, per handler.
pub type Coverage = BTreeMap<TermKind, BTreeMap<String, usize>>;

#[derive(Debug, Clone)]
pub struct CuratedOptimization {
    pub record: OptimizationRecord,
    /// Eligible bond and angle terms.
    pub terms: Vec<ValenceTerm>,
}

#[derive(Debug, Clone)]
pub struct CuratedTorsionDrive {
    pub record: TorsionDriveRecord,
    /// Eligible torsion terms around the scanned bond.
    pub terms: Vec<ValenceTerm>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurationReport {
    pub optimizations_in: usize,
    pub optimizations_kept: usize,
    pub optimization_duplicates: usize,
    pub optimizations_invalid: usize,
    pub optimizations_without_terms: usize,
    pub torsion_drives_in: usize,
    pub torsion_drives_kept: usize,
    pub torsion_drive_duplicates: usize,
    pub torsion_drives_without_samples: usize,
    pub torsion_drives_without_terms: usize,
    pub torsion_drives_capped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CuratedDatasets {
    pub optimizations: Vec<CuratedOptimization>,
    pub torsion_drives: Vec<CuratedTorsionDrive>,
    pub coverage: Coverage,
    /// Selected parameter ids per handler, in force-field order.
    pub selected: BTreeMap<TermKind, Vec<String>>,
    pub report: CurationReport,
    pub errors: Vec<DataError>,
}

impl CuratedDatasets {
    pub fn is_selected(&self, kind: TermKind, id: &str) -> bool {
        self.selected
            .get(&kind)
            .is_some_and(|ids| ids.iter().any(|s| s == id))
    }

    pub fn selected_ids(&self) -> BTreeSet<&str> {
        self.selected
            .values()
            .flat_map(|ids| ids.iter().map(String::as_str))
            .collect()
    }

    pub fn coverage_of(&self, kind: TermKind, id: &str) -> usize {
        self.coverage
            .get(&kind)
            .and_then(|c| c.get(id))
            .copied()
            .unwrap_or(0)
    }
}

/// Filters both collections down to the records and parameters worth fitting.
///
/// Per-record problems are collected in [`CuratedDatasets::errors`] and never abort the run.
#[instrument(skip_all, name = "curation_task")]
pub fn curate(
    optimizations: Vec<OptimizationRecord>,
    torsion_drives: Vec<TorsionDriveRecord>,
    force_field: &ForceField,
    exclusions: &ExclusionSet,
    settings: &CurationSettings,
    reporter: &ProgressReporter,
) -> Result<CuratedDatasets, EngineError> {
    let mut curated = CuratedDatasets::default();
    curated.report.optimizations_in = optimizations.len();
    curated.report.torsion_drives_in = torsion_drives.len();

    // === Phase 1: Optimization records ===
    let (optimizations, duplicates) = dedupe_optimizations(optimizations);
    curated.report.optimization_duplicates = duplicates;

    let mut valid = Vec::with_capacity(optimizations.len());
    for record in optimizations {
        match record.validate_geometry() {
            Ok(()) => valid.push(record),
            Err(e) => {
                warn!("{}", e);
                curated.report.optimizations_invalid += 1;
                curated.errors.push(e);
            }
        }
    }

    if !valid.is_empty() {
        let labeler = Labeler::new(force_field, &OPTIMIZATION_KINDS)?;
        let labels = label_molecules(&labeler, valid.iter().map(|r| &r.molecule), reporter);
        for record in valid {
            let terms: Vec<ValenceTerm> = labels[&molecule_key(&record.molecule)]
                .iter()
                .filter(|t| exclusions.is_eligible(t))
                .cloned()
                .collect();
            if terms.is_empty() {
                debug!(record = %record.id, "No eligible bond or angle terms");
                curated.report.optimizations_without_terms += 1;
                continue;
            }
            curated.optimizations.push(CuratedOptimization { record, terms });
        }
    }

    // === Phase 2: Torsion drives ===
    let (torsion_drives, duplicates) = dedupe_torsion_drives(torsion_drives);
    curated.report.torsion_drive_duplicates = duplicates;

    let mut scanned = Vec::with_capacity(torsion_drives.len());
    for mut record in torsion_drives {
        if clean_samples(&mut record) == 0 {
            let error = DataError::NoValidSamples {
                record: record.id.clone(),
            };
            warn!("{}", error);
            curated.report.torsion_drives_without_samples += 1;
            curated.errors.push(error);
            continue;
        }
        scanned.push(record);
    }

    if !scanned.is_empty() {
        let labeler = Labeler::new(force_field, &TORSION_KINDS)?;
        let labels = label_molecules(&labeler, scanned.iter().map(|r| &r.molecule), reporter);
        for record in scanned {
            let terms = scanned_torsion_terms(&record, &labels[&molecule_key(&record.molecule)], exclusions);
            if terms.is_empty() {
                debug!(record = %record.id, "No eligible torsion terms around the scanned bond");
                curated.report.torsion_drives_without_terms += 1;
                continue;
            }
            curated.torsion_drives.push(CuratedTorsionDrive { record, terms });
        }
    }

    if let Some(cap) = &settings.torsion_cap {
        let before = curated.torsion_drives.len();
        curated.torsion_drives = cap_torsions(std::mem::take(&mut curated.torsion_drives), cap);
        curated.report.torsion_drives_capped = before - curated.torsion_drives.len();
    }

    // === Phase 3: Coverage and selection ===
    curated.coverage = coverage(
        curated
            .optimizations
            .iter()
            .map(|c| c.terms.as_slice())
            .chain(curated.torsion_drives.iter().map(|c| c.terms.as_slice())),
    );
    curated.selected = select_parameters(force_field, &curated.coverage, settings.min_coverage);
    curated.report.optimizations_kept = curated.optimizations.len();
    curated.report.torsion_drives_kept = curated.torsion_drives.len();

    info!(
        optimizations = curated.report.optimizations_kept,
        torsion_drives = curated.report.torsion_drives_kept,
        selected = curated.selected.values().map(Vec::len).sum::<usize>(),
        dropped = curated.errors.len(),
        "Curation complete."
    );
    Ok(curated)
}

fn molecule_key(molecule: &Arc<Molecule>) -> usize {
    Arc::as_ptr(molecule) as usize
}

/// Labels each distinct molecule once.
fn label_molecules<'m>(
    labeler: &Labeler,
    molecules: impl Iterator<Item = &'m Arc<Molecule>>,
    reporter: &ProgressReporter,
) -> HashMap<usize, Vec<ValenceTerm>> {
    let mut seen = HashSet::new();
    let unique: Vec<&Arc<Molecule>> = molecules.filter(|m| seen.insert(molecule_key(m))).collect();

    reporter.report(Progress::TaskStart {
        total_steps: unique.len() as u64,
    });

    #[cfg(not(feature = "parallel"))]
    let iterator = unique.iter();

    #[cfg(feature = "parallel")]
    let iterator = unique.par_iter();

    let labels: Vec<(usize, Vec<ValenceTerm>)> = iterator
        .map(|molecule| {
            let terms = labeler.label(molecule);
            reporter.report(Progress::TaskIncrement);
            (molecule_key(molecule), terms)
        })
        .collect();

    reporter.report(Progress::TaskFinish);
    labels.into_iter().collect()
}

/// Drops records repeating an earlier id, or an earlier molecule with identical geometry.
fn dedupe_optimizations(records: Vec<OptimizationRecord>) -> (Vec<OptimizationRecord>, usize) {
    let mut ids = HashSet::new();
    let mut by_molecule: HashMap<String, Vec<usize>> = HashMap::new();
    let mut kept: Vec<OptimizationRecord> = Vec::with_capacity(records.len());
    let mut duplicates = 0;
    for record in records {
        let key = record.molecule.canonical_key().to_string();
        let repeated = !ids.insert(record.id.clone())
            || by_molecule
                .get(&key)
                .is_some_and(|idx| idx.iter().any(|&i| kept[i].is_duplicate_of(&record)));
        if repeated {
            debug!(record = %record.id, "Dropping duplicate optimization record");
            duplicates += 1;
            continue;
        }
        by_molecule.entry(key).or_default().push(kept.len());
        kept.push(record);
    }
    (kept, duplicates)
}

fn same_scan(a: &TorsionDriveRecord, b: &TorsionDriveRecord) -> bool {
    a.molecule.canonical_key() == b.molecule.canonical_key()
        && a.dihedrals == b.dihedrals
        && a.samples.len() == b.samples.len()
        && a.samples
            .iter()
            .zip(&b.samples)
            .all(|(x, y)| x.angle == y.angle && x.coordinates == y.coordinates)
}

fn dedupe_torsion_drives(records: Vec<TorsionDriveRecord>) -> (Vec<TorsionDriveRecord>, usize) {
    let mut ids = HashSet::new();
    let mut kept: Vec<TorsionDriveRecord> = Vec::with_capacity(records.len());
    let mut duplicates = 0;
    for record in records {
        if !ids.insert(record.id.clone()) || kept.iter().any(|k| same_scan(k, &record)) {
            debug!(record = %record.id, "Dropping duplicate torsion drive");
            duplicates += 1;
            continue;
        }
        kept.push(record);
    }
    (kept, duplicates)
}

/// Removes failed samples, keeps the lowest energy per angle and sorts by angle.
///
/// Returns the number of samples left.
pub fn clean_samples(record: &mut TorsionDriveRecord) -> usize {
    let molecule = record.molecule.clone();
    record.samples.retain(|s| s.is_valid(&molecule));
    record
        .samples
        .sort_by(|a, b| a.angle.total_cmp(&b.angle).then(a.energy.total_cmp(&b.energy)));
    record.samples.dedup_by(|later, earlier| later.angle == earlier.angle);
    record.samples.len()
}

/// Eligible torsion terms of a torsion drive.
///
/// Only terms around the scanned bond count. Torsions lying entirely in rings are skipped
/// unless their parameter is whitelisted.
pub fn scanned_torsion_terms(
    record: &TorsionDriveRecord,
    labels: &[ValenceTerm],
    exclusions: &ExclusionSet,
) -> Vec<ValenceTerm> {
    let Some(scanned) = record.central_bond() else {
        return Vec::new();
    };
    labels
        .iter()
        .filter(|t| t.central_bond() == Some(scanned))
        .filter(|t| !t.is_ring_torsion() || exclusions.is_whitelisted_torsion(t))
        .filter(|t| exclusions.is_eligible(t))
        .cloned()
        .collect()
}

/// Limits the number of torsion drives kept per proper-torsion parameter.
///
/// A drive survives only when one of its proper parameters picks it, so drives that
/// exercise improper torsions alone are dropped while a cap is active.
pub fn cap_torsions(drives: Vec<CuratedTorsionDrive>, cap: &TorsionCap) -> Vec<CuratedTorsionDrive> {
    let mut by_parameter: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, drive) in drives.iter().enumerate() {
        let ids: BTreeSet<&str> = drive
            .terms
            .iter()
            .filter(|t| t.kind == TermKind::ProperTorsion)
            .map(|t| t.parameter_id.as_str())
            .collect();
        for id in ids {
            by_parameter.entry(id).or_default().push(index);
        }
    }

    let mut rng = match cap.strategy {
        CapStrategy::PickRandom { seed } => Some(StdRng::seed_from_u64(seed)),
        _ => None,
    };
    let mut keep: HashSet<usize> = HashSet::new();
    let mut capped_parameters = 0;
    for (id, mut indices) in by_parameter {
        if indices.len() > cap.max_per_parameter {
            capped_parameters += 1;
            debug!(parameter = id, records = indices.len(), cap = cap.max_per_parameter, "Capping torsion drives");
            let heavy = |i: &usize| drives[*i].record.molecule.heavy_atom_count();
            match (&cap.strategy, rng.as_mut()) {
                (CapStrategy::PickHeavy, _) => indices.sort_by_key(|i| std::cmp::Reverse(heavy(i))),
                (CapStrategy::PickLight, _) => indices.sort_by_key(heavy),
                (CapStrategy::PickRandom { .. }, Some(rng)) => indices.shuffle(rng),
                (CapStrategy::PickRandom { .. }, None) => {}
            }
            indices.truncate(cap.max_per_parameter);
        }
        keep.extend(indices);
    }
    if capped_parameters > 0 {
        info!(parameters = capped_parameters, "Applied torsion-drive cap.");
    }

    drives
        .into_iter()
        .enumerate()
        .filter(|(index, _)| keep.contains(index))
        .map(|(_, drive)| drive)
        .collect()
}

/// Keeps the lowest-energy record of each molecule, in first-seen order.
///
/// Records with an energy win over records without one; ties keep the earlier record.
pub fn lowest_energy_per_molecule(records: Vec<OptimizationRecord>) -> Vec<OptimizationRecord> {
    let mut best: Vec<OptimizationRecord> = Vec::new();
    let mut slot: HashMap<String, usize> = HashMap::new();
    for record in records {
        let key = record.molecule.canonical_key().to_string();
        match slot.get(&key) {
            Some(&i) => {
                let better = match (record.energy, best[i].energy) {
                    (Some(new), Some(old)) => new < old,
                    (Some(_), None) => true,
                    _ => false,
                };
                if better {
                    best[i] = record;
                }
            }
            None => {
                slot.insert(key, best.len());
                best.push(record);
            }
        }
    }
    best
}

fn coverage<'t>(records: impl Iterator<Item = &'t [ValenceTerm]>) -> Coverage {
    let mut coverage = Coverage::new();
    for terms in records {
        let distinct: BTreeSet<(TermKind, &str)> = terms
            .iter()
            .map(|t| (t.kind, t.parameter_id.as_str()))
            .collect();
        for (kind, id) in distinct {
            *coverage.entry(kind).or_default().entry(id.to_string()).or_default() += 1;
        }
    }
    coverage
}

fn select_parameters(
    force_field: &ForceField,
    coverage: &Coverage,
    min_coverage: usize,
) -> BTreeMap<TermKind, Vec<String>> {
    let mut selected = BTreeMap::new();
    for (kind, counts) in coverage {
        let ids: Vec<String> = force_field
            .parameters(*kind)
            .into_iter()
            .filter(|p| counts.get(&p.id).is_some_and(|&c| c >= min_coverage))
            .map(|p| p.id)
            .collect();
        if !ids.is_empty() {
            selected.insert(*kind, ids);
        }
    }
    selected
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::chem::smiles::parse_smiles;
    use crate::core::forcefield::params::tests::MINI_FF;
    use crate::core::models::records::TorsionSample;
    use crate::core::patterns::SmartsSet;
    use nalgebra::Point3;

    pub(crate) const ETHANOL: &str =
        "[C:1]([H:4])([H:5])([H:6])[C:2]([H:7])([H:8])[O:3][H:9]";

    pub(crate) fn coordinates(n: usize, offset: f64) -> Vec<Point3<f64>> {
        (0..n)
            .map(|i| Point3::new(i as f64 + offset, (i * i) as f64 * 0.1, 0.0))
            .collect()
    }

    pub(crate) fn optimization(id: &str, molecule: &Arc<Molecule>, energy: Option<f64>) -> OptimizationRecord {
        OptimizationRecord {
            id: id.into(),
            molecule: molecule.clone(),
            coordinates: coordinates(molecule.atom_count(), 0.0),
            energy,
            hessian: None,
        }
    }

    pub(crate) fn torsion_drive(id: &str, molecule: &Arc<Molecule>, dihedral: [usize; 4], angles: &[f64]) -> TorsionDriveRecord {
        TorsionDriveRecord {
            id: id.into(),
            molecule: molecule.clone(),
            dihedrals: vec![dihedral],
            grid_spacing: vec![15.0],
            dihedral_range: None,
            samples: angles
                .iter()
                .map(|&angle| TorsionSample {
                    angle,
                    energy: -154.0 + angle.abs() * 1e-4,
                    coordinates: coordinates(molecule.atom_count(), angle),
                })
                .collect(),
        }
    }

    fn run(
        optimizations: Vec<OptimizationRecord>,
        torsion_drives: Vec<TorsionDriveRecord>,
        exclusions: &ExclusionSet,
        settings: &CurationSettings,
    ) -> CuratedDatasets {
        let ff = ForceField::parse(MINI_FF).unwrap();
        curate(optimizations, torsion_drives, &ff, exclusions, settings, &ProgressReporter::new()).unwrap()
    }

    fn ethanol() -> Arc<Molecule> {
        Arc::new(parse_smiles(ETHANOL).unwrap())
    }

    #[test]
    fn empty_collections_curate_to_empty_sets() {
        let curated = run(vec![], vec![], &ExclusionSet::default(), &CurationSettings::default());
        assert!(curated.optimizations.is_empty());
        assert!(curated.torsion_drives.is_empty());
        assert!(curated.selected.is_empty());
        assert!(curated.errors.is_empty());
        assert_eq!(curated.report, CurationReport::default());
    }

    #[test]
    fn optimization_records_select_bond_and_angle_parameters() {
        let mol = ethanol();
        let curated = run(
            vec![optimization("1", &mol, Some(-154.0))],
            vec![],
            &ExclusionSet::default(),
            &CurationSettings::default(),
        );
        assert_eq!(curated.optimizations.len(), 1);
        assert!(curated.is_selected(TermKind::Bond, "b1"));
        assert!(curated.is_selected(TermKind::Bond, "b87"));
        assert!(curated.is_selected(TermKind::Angle, "a2"));
        assert!(!curated.is_selected(TermKind::Angle, "a16"));
        assert!(!curated.selected.contains_key(&TermKind::ProperTorsion));
        assert_eq!(curated.coverage_of(TermKind::Bond, "b83"), 1);
    }

    #[test]
    fn duplicates_are_dropped_but_conformers_kept() {
        let mol = ethanol();
        let mut conformer = optimization("3", &mol, Some(-154.1));
        conformer.coordinates = coordinates(mol.atom_count(), 0.5);
        let curated = run(
            vec![
                optimization("1", &mol, Some(-154.0)),
                optimization("1", &mol, Some(-154.0)),
                optimization("2", &mol, Some(-154.0)),
                conformer,
            ],
            vec![],
            &ExclusionSet::default(),
            &CurationSettings::default(),
        );
        assert_eq!(curated.report.optimization_duplicates, 2);
        assert_eq!(curated.optimizations.len(), 2);
        assert_eq!(curated.coverage_of(TermKind::Bond, "b1"), 2);
    }

    #[test]
    fn torsion_drive_without_valid_samples_is_dropped_once() {
        let mol = ethanol();
        let mut broken = torsion_drive("td-1", &mol, [0, 1, 2, 8], &[-60.0, 60.0]);
        for sample in &mut broken.samples {
            sample.energy = f64::NAN;
        }
        let curated = run(vec![], vec![broken], &ExclusionSet::default(), &CurationSettings::default());
        assert!(curated.torsion_drives.is_empty());
        assert_eq!(curated.report.torsion_drives_without_samples, 1);
        assert_eq!(curated.errors.len(), 1);
        assert!(matches!(curated.errors[0], DataError::NoValidSamples { .. }));
    }

    #[test]
    fn torsion_terms_are_restricted_to_the_scanned_bond() {
        let mol = ethanol();
        let drive = torsion_drive("td-1", &mol, [0, 1, 2, 8], &[0.0, 15.0, -15.0]);
        let curated = run(vec![], vec![drive], &ExclusionSet::default(), &CurationSettings::default());
        assert_eq!(curated.torsion_drives.len(), 1);
        let terms = &curated.torsion_drives[0].terms;
        assert!(!terms.is_empty());
        assert!(terms.iter().all(|t| t.central_bond() == Some((1, 2))));
        assert!(curated.is_selected(TermKind::ProperTorsion, "t85"));
        let angles: Vec<f64> = curated.torsion_drives[0].record.samples.iter().map(|s| s.angle).collect();
        assert_eq!(angles, vec![-15.0, 0.0, 15.0]);
    }

    #[test]
    fn ring_torsions_need_the_whitelist() {
        let mol = Arc::new(parse_smiles("C1CCCCC1").unwrap());
        let drive = || torsion_drive("td-ring", &mol, [0, 1, 2, 3], &[30.0, 60.0]);

        let plain = run(vec![], vec![drive()], &ExclusionSet::default(), &CurationSettings::default());
        assert!(plain.torsion_drives.is_empty());
        assert_eq!(plain.report.torsion_drives_without_terms, 1);

        let whitelist = ExclusionSet {
            ring_torsion_whitelist: ["t4".to_string()].into_iter().collect(),
            ..ExclusionSet::default()
        };
        let kept = run(vec![], vec![drive()], &whitelist, &CurationSettings::default());
        assert_eq!(kept.torsion_drives.len(), 1);
        assert!(kept.is_selected(TermKind::ProperTorsion, "t4"));
    }

    #[test]
    fn smarts_exclusions_drop_terms_and_empty_records() {
        let mol = ethanol();
        let exclusions = ExclusionSet {
            smarts: SmartsSet::parse(&["[*:1]~[*:2]", "[*:1]~[*:2]~[*:3]"]).unwrap(),
            ..ExclusionSet::default()
        };
        let curated = run(
            vec![optimization("1", &mol, None)],
            vec![],
            &exclusions,
            &CurationSettings::default(),
        );
        assert!(curated.optimizations.is_empty());
        assert_eq!(curated.report.optimizations_without_terms, 1);
    }

    #[test]
    fn min_coverage_filters_rarely_seen_parameters() {
        let mol = ethanol();
        let settings = CurationSettings {
            min_coverage: 2,
            ..CurationSettings::default()
        };
        let curated = run(vec![optimization("1", &mol, None)], vec![], &ExclusionSet::default(), &settings);
        assert_eq!(curated.optimizations.len(), 1);
        assert!(curated.selected.is_empty());
    }

    #[test]
    fn cap_keeps_the_heaviest_or_lightest_drives() {
        let ethane = Arc::new(parse_smiles("[C:1]([H:3])([H:4])([H:5])[C:2]([H:6])([H:7])[H:8]").unwrap());
        let propane = Arc::new(
            parse_smiles("[C:1]([H:4])([H:5])([H:6])[C:2]([H:7])([H:8])[C:3]([H:9])([H:10])[H:11]").unwrap(),
        );
        let drives = || {
            vec![
                torsion_drive("ethane", &ethane, [2, 0, 1, 5], &[0.0]),
                torsion_drive("propane", &propane, [0, 1, 2, 8], &[0.0]),
            ]
        };
        let cap = |strategy| CurationSettings {
            torsion_cap: Some(TorsionCap {
                max_per_parameter: 1,
                strategy,
            }),
            ..CurationSettings::default()
        };
        let exclusions = ExclusionSet::default();
        let ids = |c: &CuratedDatasets| c.torsion_drives.iter().map(|d| d.record.id.clone()).collect::<Vec<_>>();

        let uncapped = run(vec![], drives(), &exclusions, &CurationSettings::default());
        assert_eq!(uncapped.coverage_of(TermKind::ProperTorsion, "t1"), 2);

        let heavy = run(vec![], drives(), &exclusions, &cap(CapStrategy::PickHeavy));
        assert_eq!(ids(&heavy), vec!["propane"]);
        assert_eq!(heavy.report.torsion_drives_capped, 1);
        let light = run(vec![], drives(), &exclusions, &cap(CapStrategy::PickLight));
        assert_eq!(ids(&light), vec!["ethane"]);

        let first = run(vec![], drives(), &exclusions, &cap(CapStrategy::PickRandom { seed: 7 }));
        let second = run(vec![], drives(), &exclusions, &cap(CapStrategy::PickRandom { seed: 7 }));
        assert_eq!(first.torsion_drives.len(), 1);
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn capped_drives_need_a_proper_torsion() {
        let mol = ethanol();
        let proper = CuratedTorsionDrive {
            record: torsion_drive("proper", &mol, [0, 1, 2, 8], &[0.0]),
            terms: vec![ValenceTerm::new(TermKind::ProperTorsion, &[0, 1, 2, 8], "t85", mol.clone())],
        };
        let improper_only = CuratedTorsionDrive {
            record: torsion_drive("improper", &mol, [3, 0, 1, 6], &[0.0]),
            terms: vec![ValenceTerm::new(TermKind::ImproperTorsion, &[3, 0, 4, 5], "i1", mol.clone())],
        };
        let cap = TorsionCap {
            max_per_parameter: 5,
            strategy: CapStrategy::PickHeavy,
        };
        let kept = cap_torsions(vec![proper, improper_only], &cap);
        let ids: Vec<&str> = kept.iter().map(|d| d.record.id.as_str()).collect();
        assert_eq!(ids, vec!["proper"]);
    }

    #[test]
    fn lowest_energy_record_wins_per_molecule() {
        let mol = ethanol();
        let water = Arc::new(parse_smiles("[O:1]([H:2])[H:3]").unwrap());
        let records = vec![
            optimization("a", &mol, Some(-154.0)),
            optimization("w", &water, None),
            optimization("b", &mol, Some(-154.2)),
            optimization("c", &mol, None),
        ];
        let best = lowest_energy_per_molecule(records);
        let ids: Vec<&str> = best.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "w"]);
    }

    #[test]
    fn samples_are_deduplicated_by_angle_keeping_lowest_energy() {
        let mol = ethanol();
        let mut drive = torsion_drive("td", &mol, [0, 1, 2, 8], &[30.0, -30.0, 30.0]);
        drive.samples[2].energy = -200.0;
        drive.samples[1].coordinates.pop();
        assert_eq!(clean_samples(&mut drive), 1);
        assert_eq!(drive.samples[0].energy, -200.0);
    }
}
