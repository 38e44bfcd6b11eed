//! Plain-text exclusion lists: one entry per line, blank lines and `#` comments ignored.

use crate::core::chem::smiles::SmilesError;
use crate::core::patterns::smarts::{SmartsError, SmartsPattern};
use crate::core::patterns::{SmartsSet, SmilesSet};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path}:{line}: invalid SMARTS '{pattern}': {source}")]
    Smarts {
        path: PathBuf,
        line: usize,
        pattern: String,
        source: SmartsError,
    },
    #[error("{path}:{line}: invalid SMILES '{pattern}': {source}")]
    Smiles {
        path: PathBuf,
        line: usize,
        pattern: String,
        source: SmilesError,
    },
}

/// Non-empty, non-comment lines with their 1-based line numbers.
pub fn parse_entries(content: &str) -> Vec<(usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

fn read(path: &Path) -> Result<String, PatternError> {
    std::fs::read_to_string(path).map_err(|e| PatternError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parameter ids of the ring-torsion whitelist; entries may also be whitespace separated.
pub fn load_ring_torsions(path: &Path) -> Result<BTreeSet<String>, PatternError> {
    let content = read(path)?;
    Ok(parse_entries(&content)
        .into_iter()
        .flat_map(|(_, line)| line.split_whitespace())
        .map(str::to_string)
        .collect())
}

pub fn load_smarts(path: &Path) -> Result<SmartsSet, PatternError> {
    let content = read(path)?;
    let mut patterns = Vec::new();
    for (line, entry) in parse_entries(&content) {
        let pattern = SmartsPattern::parse(entry).map_err(|source| PatternError::Smarts {
            path: path.to_path_buf(),
            line,
            pattern: entry.to_string(),
            source,
        })?;
        patterns.push(pattern);
    }
    Ok(SmartsSet::new(patterns))
}

pub fn load_smiles(path: &Path) -> Result<SmilesSet, PatternError> {
    let content = read(path)?;
    let mut set = SmilesSet::default();
    for (line, entry) in parse_entries(&content) {
        set.insert(entry).map_err(|source| PatternError::Smiles {
            path: path.to_path_buf(),
            line,
            pattern: entry.to_string(),
            source,
        })?;
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let entries = parse_entries("# header\n\n  [#6:1]-[#8:2]  \n#x\nCCO\n");
        assert_eq!(entries, vec![(3, "[#6:1]-[#8:2]"), (5, "CCO")]);
    }

    #[test]
    fn loads_each_kind_of_list() {
        let dir = tempdir().unwrap();
        let ring = dir.path().join("ring.txt");
        let smarts = dir.path().join("smarts.txt");
        let smiles = dir.path().join("smiles.txt");
        std::fs::write(&ring, "t4 t5\nt6\n").unwrap();
        std::fs::write(&smarts, "[#16:1]~[*:2]\n\n[r3]\n").unwrap();
        std::fs::write(&smiles, "CCO\nc1ccccc1\n").unwrap();

        let ids = load_ring_torsions(&ring).unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["t4", "t5", "t6"]);
        assert_eq!(load_smarts(&smarts).unwrap().len(), 2);
        assert_eq!(load_smiles(&smiles).unwrap().len(), 2);
    }

    #[test]
    fn empty_files_mean_no_exclusions() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "").unwrap();
        assert!(load_ring_torsions(&empty).unwrap().is_empty());
        assert!(load_smarts(&empty).unwrap().is_empty());
        assert!(load_smiles(&empty).unwrap().is_empty());
    }

    #[test]
    fn bad_patterns_report_file_and_line() {
        let dir = tempdir().unwrap();
        let smarts = dir.path().join("smarts.txt");
        std::fs::write(&smarts, "[#6:1]\n[#6\n").unwrap();
        match load_smarts(&smarts) {
            Err(PatternError::Smarts { line, pattern, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(pattern, "[#6");
            }
            other => panic!("unexpected result {:?}", other.map(|s| s.len())),
        }
        let missing = dir.path().join("missing.txt");
        assert!(matches!(load_smiles(&missing), Err(PatternError::Io { .. })));
    }
}
