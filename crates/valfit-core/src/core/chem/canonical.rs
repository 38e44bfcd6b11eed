//! Canonical structural keys.
//!
//! Hydrogens bonded to exactly one heavy atom are folded into their parent's hydrogen
//! count, so explicit-hydrogen mapped SMILES and plain SMILES of the same compound
//! yield the same key. Atoms are ranked by iterative neighborhood refinement with
//! deterministic tie-breaking. Stereochemistry is not part of the key.
//!
//! Ties left after refinement are broken by individualizing the first atom of the first
//! tied class, without backtracking over the other members. The key is therefore exact
//! only when every tied class is an orbit of the graph's automorphisms, which holds for
//! trees and for common ring systems but not for some highly regular graphs (for example
//! strongly regular or certain fused cage graphs). Such compounds may receive different
//! keys for different atom orders; they are then treated as distinct molecules, so
//! deduplication and the SMILES blacklist can miss them but never merge different
//! compounds.

use super::molecule::{Atom, Bond};
use std::fmt::Write;

pub(crate) fn canonical_key(atoms: &[Atom], bonds: &[Bond], adjacency: &[Vec<(usize, usize)>]) -> String {
    let folded: Vec<bool> = (0..atoms.len())
        .map(|i| is_foldable_hydrogen(i, atoms, adjacency))
        .collect();
    let kept: Vec<usize> = (0..atoms.len()).filter(|&i| !folded[i]).collect();
    let mut position = vec![usize::MAX; atoms.len()];
    for (p, &atom) in kept.iter().enumerate() {
        position[atom] = p;
    }

    let hydrogens: Vec<usize> = kept
        .iter()
        .map(|&atom| {
            atoms[atom].implicit_hydrogens as usize
                + adjacency[atom].iter().filter(|&&(n, _)| folded[n]).count()
        })
        .collect();

    // Reduced graph over kept atoms: (neighbor position, bond order code).
    let graph: Vec<Vec<(usize, u8)>> = kept
        .iter()
        .map(|&atom| {
            adjacency[atom]
                .iter()
                .filter(|&&(n, _)| !folded[n])
                .map(|&(n, b)| (position[n], bonds[b].order.code()))
                .collect()
        })
        .collect();

    let invariants: Vec<(u8, i8, bool, usize, usize)> = kept
        .iter()
        .enumerate()
        .map(|(p, &atom)| {
            let a = &atoms[atom];
            (a.atomic_number, a.formal_charge, a.is_aromatic, hydrogens[p], graph[p].len())
        })
        .collect();

    let mut classes = dense_ranks(&invariants);
    refine(&mut classes, &graph);
    while let Some(tied) = first_tied_atom(&classes) {
        let class = classes[tied];
        let split: Vec<(usize, usize)> = classes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                if i == tied {
                    (c, 0)
                } else if c == class {
                    (c, 1)
                } else {
                    (c, 0)
                }
            })
            .collect();
        classes = dense_ranks(&split);
        refine(&mut classes, &graph);
    }

    let mut order: Vec<usize> = (0..kept.len()).collect();
    order.sort_by_key(|&p| classes[p]);

    let mut key = String::new();
    for &p in &order {
        let (z, charge, aromatic, h, _) = invariants[p];
        let _ = write!(key, "{}{}{}h{};", z, if aromatic { "a" } else { "" }, charge_label(charge), h);
    }
    key.push('|');

    let mut edges: Vec<(usize, usize, u8)> = Vec::new();
    for (p, neighbors) in graph.iter().enumerate() {
        for &(q, code) in neighbors {
            let (a, b) = (classes[p], classes[q]);
            if a < b {
                edges.push((a, b, code));
            }
        }
    }
    edges.sort_unstable();
    for (a, b, code) in edges {
        let _ = write!(key, "{}-{}:{};", a, b, code);
    }
    key
}

fn is_foldable_hydrogen(atom: usize, atoms: &[Atom], adjacency: &[Vec<(usize, usize)>]) -> bool {
    let a = &atoms[atom];
    a.is_hydrogen()
        && a.formal_charge == 0
        && adjacency[atom].len() == 1
        && !atoms[adjacency[atom][0].0].is_hydrogen()
}

fn charge_label(charge: i8) -> String {
    match charge {
        0 => String::new(),
        c if c > 0 => format!("+{}", c),
        c => format!("{}", c),
    }
}

/// Replaces each value with its rank among the distinct values.
fn dense_ranks<T: Ord + Clone>(values: &[T]) -> Vec<usize> {
    let mut distinct: Vec<T> = values.to_vec();
    distinct.sort();
    distinct.dedup();
    values
        .iter()
        .map(|v| distinct.binary_search(v).unwrap_or(0))
        .collect()
}

fn class_count(classes: &[usize]) -> usize {
    let mut distinct = classes.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    distinct.len()
}

fn refine(classes: &mut Vec<usize>, graph: &[Vec<(usize, u8)>]) {
    loop {
        let signatures: Vec<(usize, Vec<(usize, u8)>)> = graph
            .iter()
            .enumerate()
            .map(|(p, neighbors)| {
                let mut env: Vec<(usize, u8)> =
                    neighbors.iter().map(|&(q, code)| (classes[q], code)).collect();
                env.sort_unstable();
                (classes[p], env)
            })
            .collect();
        let next = dense_ranks(&signatures);
        let settled = class_count(&next) == class_count(classes);
        *classes = next;
        if settled {
            break;
        }
    }
}

fn first_tied_atom(classes: &[usize]) -> Option<usize> {
    let mut counts = vec![0usize; classes.len()];
    for &c in classes {
        counts[c] += 1;
    }
    let class = (0..counts.len()).find(|&c| counts[c] > 1)?;
    classes.iter().position(|&c| c == class)
}

#[cfg(test)]
mod tests {
    use crate::core::chem::smiles::parse_smiles;

    fn key(smiles: &str) -> String {
        parse_smiles(smiles).unwrap().canonical_key().to_string()
    }

    #[test]
    fn key_is_independent_of_atom_order() {
        assert_eq!(key("OCC"), key("CCO"));
        assert_eq!(key("C(C)(C)O"), key("CC(O)C"));
        assert_eq!(key("c1ccncc1"), key("n1ccccc1"));
    }

    #[test]
    fn explicit_and_implicit_hydrogens_give_the_same_key() {
        let mapped = "[C:1]([H:4])([H:5])([H:6])[C:2]([H:7])([H:8])[O:3][H:9]";
        assert_eq!(key(mapped), key("CCO"));
    }

    #[test]
    fn different_compounds_get_different_keys() {
        assert_ne!(key("CCO"), key("COC"));
        assert_ne!(key("CC=O"), key("CCO"));
        assert_ne!(key("C[NH3+]"), key("CN"));
        assert_ne!(key("c1ccccc1"), key("C1CCCCC1"));
    }

    #[test]
    fn symmetric_molecules_are_stable_under_reordering() {
        assert_eq!(key("C1CC1C1CC1"), key("C2CC2C1CC1"));
        assert_eq!(key("OC(=O)CC(=O)O"), key("O=C(O)CC(O)=O"));
    }

    #[test]
    fn fused_rings_are_stable_under_reordering() {
        assert_eq!(key("C1CCC2CCCCC2C1"), key("C1CCC2C(C1)CCCC2"));
        assert_eq!(key("c1ccc2ccccc2c1"), key("c1cc2ccccc2cc1"));
    }
}
