use super::element;
use super::molecule::{Atom, Bond, BondOrder, Molecule, MoleculeError};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SmilesError {
    #[error("Empty SMILES string")]
    Empty,
    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },
    #[error("Unknown element symbol '{symbol}' at position {position}")]
    UnknownElement { symbol: String, position: usize },
    #[error("Unterminated bracket atom starting at position {0}")]
    UnterminatedBracket(usize),
    #[error("Unbalanced parenthesis at position {0}")]
    UnbalancedBranch(usize),
    #[error("Ring closure {0} is never closed")]
    UnclosedRing(u16),
    #[error("Bond at position {0} is not followed by an atom")]
    DanglingBond(usize),
    #[error("Invalid structure: {0}")]
    Structure(#[from] MoleculeError),
}

/// Parses a SMILES string into a [`Molecule`].
///
/// Organic-subset atoms receive implicit hydrogens from their standard valences;
/// bracket atoms carry exactly the hydrogens they declare. When every atom carries a
/// distinct map index `1..=N` the atoms are reordered so that atom `i` is the one
/// mapped to `i + 1`, which is the atom order of QC records.
pub fn parse_smiles(smiles: &str) -> Result<Molecule, SmilesError> {
    let text = smiles.split_whitespace().next().unwrap_or("");
    if text.is_empty() {
        return Err(SmilesError::Empty);
    }
    let mut parser = SmilesParser::new(text);
    parser.parse()?;
    parser.finish()
}

struct PendingBond {
    order: BondOrder,
    position: usize,
}

struct SmilesParser<'a> {
    input: &'a [u8],
    pos: usize,
    atoms: Vec<Atom>,
    bracket: Vec<bool>,
    bonds: Vec<(usize, usize, Option<BondOrder>)>,
    stack: Vec<(usize, usize)>,
    prev_atom: Option<usize>,
    pending_bond: Option<PendingBond>,
    ring_closures: BTreeMap<u16, (usize, Option<BondOrder>)>,
}

impl<'a> SmilesParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            atoms: Vec::new(),
            bracket: Vec::new(),
            bonds: Vec::new(),
            stack: Vec::new(),
            prev_atom: None,
            pending_bond: None,
            ring_closures: BTreeMap::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn unexpected(&self, position: usize) -> SmilesError {
        SmilesError::UnexpectedCharacter {
            ch: self.input.get(position).map(|&c| c as char).unwrap_or('\0'),
            position,
        }
    }

    fn parse(&mut self) -> Result<(), SmilesError> {
        while let Some(ch) = self.peek() {
            match ch {
                b'(' => {
                    let prev = self.prev_atom.ok_or_else(|| self.unexpected(self.pos))?;
                    self.stack.push((prev, self.pos));
                    self.advance();
                }
                b')' => {
                    if let Some(pending) = &self.pending_bond {
                        return Err(SmilesError::DanglingBond(pending.position));
                    }
                    let (atom, _) = self
                        .stack
                        .pop()
                        .ok_or(SmilesError::UnbalancedBranch(self.pos))?;
                    self.prev_atom = Some(atom);
                    self.advance();
                }
                b'-' | b'=' | b'#' | b':' | b'/' | b'\\' => {
                    let order = match ch {
                        b'=' => BondOrder::Double,
                        b'#' => BondOrder::Triple,
                        b':' => BondOrder::Aromatic,
                        _ => BondOrder::Single,
                    };
                    if self.pending_bond.is_some() || self.prev_atom.is_none() {
                        return Err(self.unexpected(self.pos));
                    }
                    self.pending_bond = Some(PendingBond {
                        order,
                        position: self.pos,
                    });
                    self.advance();
                }
                b'.' => {
                    if let Some(pending) = &self.pending_bond {
                        return Err(SmilesError::DanglingBond(pending.position));
                    }
                    self.prev_atom = None;
                    self.advance();
                }
                b'%' => {
                    let start = self.pos;
                    self.advance();
                    let (Some(d1), Some(d2)) = (self.advance(), self.advance()) else {
                        return Err(self.unexpected(start));
                    };
                    if !d1.is_ascii_digit() || !d2.is_ascii_digit() {
                        return Err(self.unexpected(start));
                    }
                    let number = (d1 - b'0') as u16 * 10 + (d2 - b'0') as u16;
                    self.ring_closure(number, start)?;
                }
                b'0'..=b'9' => {
                    let start = self.pos;
                    self.advance();
                    self.ring_closure((ch - b'0') as u16, start)?;
                }
                b'[' => self.parse_bracket_atom()?,
                b'*' => {
                    self.advance();
                    self.add_atom(Atom::new(0), false);
                }
                _ => self.parse_organic_atom()?,
            }
        }
        Ok(())
    }

    fn parse_organic_atom(&mut self) -> Result<(), SmilesError> {
        let start = self.pos;
        let Some(ch) = self.advance() else {
            return Err(SmilesError::Empty);
        };
        let (atomic_number, aromatic) = match ch {
            b'B' if self.peek() == Some(b'r') => {
                self.advance();
                (35, false)
            }
            b'C' if self.peek() == Some(b'l') => {
                self.advance();
                (17, false)
            }
            b'B' => (5, false),
            b'C' => (6, false),
            b'N' => (7, false),
            b'O' => (8, false),
            b'P' => (15, false),
            b'S' => (16, false),
            b'F' => (9, false),
            b'I' => (53, false),
            b'b' => (5, true),
            b'c' => (6, true),
            b'n' => (7, true),
            b'o' => (8, true),
            b'p' => (15, true),
            b's' => (16, true),
            _ => return Err(self.unexpected(start)),
        };
        let mut atom = Atom::new(atomic_number);
        atom.is_aromatic = aromatic;
        self.add_atom(atom, false);
        Ok(())
    }

    fn parse_bracket_atom(&mut self) -> Result<(), SmilesError> {
        let start = self.pos;
        self.advance();

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        let symbol_pos = self.pos;
        let (atomic_number, aromatic) = match self.peek() {
            Some(b'*') => {
                self.advance();
                (0, false)
            }
            Some(c) if c.is_ascii_uppercase() => {
                self.advance();
                let one = (c as char).to_string();
                match self.peek() {
                    Some(n) if n.is_ascii_lowercase() => {
                        let two = format!("{}{}", c as char, n as char);
                        if let Some(z) = element::atomic_number(&two) {
                            self.advance();
                            (z, false)
                        } else {
                            let z = element::atomic_number(&one).ok_or(
                                SmilesError::UnknownElement {
                                    symbol: one.clone(),
                                    position: symbol_pos,
                                },
                            )?;
                            (z, false)
                        }
                    }
                    _ => {
                        let z = element::atomic_number(&one).ok_or(SmilesError::UnknownElement {
                            symbol: one.clone(),
                            position: symbol_pos,
                        })?;
                        (z, false)
                    }
                }
            }
            Some(c) if c.is_ascii_lowercase() => {
                let two = self
                    .peek_at(1)
                    .map(|n| format!("{}{}", c as char, n as char));
                match two.as_deref() {
                    Some("se") => {
                        self.pos += 2;
                        (34, true)
                    }
                    Some("as") => {
                        self.pos += 2;
                        (33, true)
                    }
                    Some("te") => {
                        self.pos += 2;
                        (52, true)
                    }
                    _ => {
                        self.advance();
                        let z = match c {
                            b'b' => 5,
                            b'c' => 6,
                            b'n' => 7,
                            b'o' => 8,
                            b'p' => 15,
                            b's' => 16,
                            _ => {
                                return Err(SmilesError::UnknownElement {
                                    symbol: (c as char).to_string(),
                                    position: symbol_pos,
                                });
                            }
                        };
                        (z, true)
                    }
                }
            }
            Some(_) => return Err(self.unexpected(self.pos)),
            None => return Err(SmilesError::UnterminatedBracket(start)),
        };

        // Chirality is accepted and discarded.
        while self.peek() == Some(b'@') {
            self.advance();
        }
        if let (Some(a), Some(b)) = (self.peek(), self.peek_at(1)) {
            let class = [a, b];
            if self.input.get(self.pos.wrapping_sub(1)) == Some(&b'@')
                && matches!(&class, b"TH" | b"AL" | b"SP" | b"TB" | b"OH")
            {
                self.pos += 2;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let mut hydrogens = 0u8;
        if self.peek() == Some(b'H') {
            self.advance();
            hydrogens = self.parse_digits().map(|n| n as u8).unwrap_or(1);
        }

        let mut charge: i8 = 0;
        while let Some(sign @ (b'+' | b'-')) = self.peek() {
            self.advance();
            let unit: i8 = if sign == b'+' { 1 } else { -1 };
            match self.parse_digits() {
                Some(n) => charge += unit * n as i8,
                None => charge += unit,
            }
        }

        let mut map_index = None;
        if self.peek() == Some(b':') {
            self.advance();
            map_index = Some(
                self.parse_digits()
                    .ok_or_else(|| self.unexpected(self.pos))?,
            );
        }

        if self.advance() != Some(b']') {
            return Err(SmilesError::UnterminatedBracket(start));
        }

        let atom = Atom {
            atomic_number,
            formal_charge: charge,
            is_aromatic: aromatic,
            implicit_hydrogens: hydrogens,
            map_index,
        };
        self.add_atom(atom, true);
        Ok(())
    }

    fn parse_digits(&mut self) -> Option<u32> {
        let mut value: Option<u32> = None;
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
            self.advance();
            value = Some(value.unwrap_or(0) * 10 + (c - b'0') as u32);
        }
        value
    }

    fn add_atom(&mut self, atom: Atom, bracket: bool) {
        let index = self.atoms.len();
        self.atoms.push(atom);
        self.bracket.push(bracket);
        if let Some(prev) = self.prev_atom {
            let order = self.pending_bond.take().map(|p| p.order);
            self.bonds.push((prev, index, order));
        }
        self.pending_bond = None;
        self.prev_atom = Some(index);
    }

    fn ring_closure(&mut self, number: u16, position: usize) -> Result<(), SmilesError> {
        let current = self.prev_atom.ok_or_else(|| self.unexpected(position))?;
        let order = self.pending_bond.take().map(|p| p.order);
        if let Some((open, open_order)) = self.ring_closures.remove(&number) {
            self.bonds.push((open, current, order.or(open_order)));
        } else {
            self.ring_closures.insert(number, (current, order));
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Molecule, SmilesError> {
        if let Some(pending) = &self.pending_bond {
            return Err(SmilesError::DanglingBond(pending.position));
        }
        if let Some(&(_, position)) = self.stack.last() {
            return Err(SmilesError::UnbalancedBranch(position));
        }
        if let Some((&number, _)) = self.ring_closures.iter().next() {
            return Err(SmilesError::UnclosedRing(number));
        }
        if self.atoms.is_empty() {
            return Err(SmilesError::Empty);
        }

        let bonds: Vec<Bond> = self
            .bonds
            .iter()
            .map(|&(a, b, order)| {
                let order = order.unwrap_or(
                    if self.atoms[a].is_aromatic && self.atoms[b].is_aromatic {
                        BondOrder::Aromatic
                    } else {
                        BondOrder::Single
                    },
                );
                Bond::new(a, b, order)
            })
            .collect();

        for index in 0..self.atoms.len() {
            if !self.bracket[index] {
                let hydrogens = implicit_hydrogens(&self.atoms[index], index, &bonds);
                self.atoms[index].implicit_hydrogens = hydrogens;
            }
        }

        let (atoms, bonds) = apply_atom_map_order(self.atoms, bonds);
        Ok(Molecule::new(atoms, bonds)?)
    }
}

fn implicit_hydrogens(atom: &Atom, index: usize, bonds: &[Bond]) -> u8 {
    let mut sum = 0u8;
    let mut has_aromatic_bond = false;
    for bond in bonds.iter().filter(|b| b.contains(index)) {
        sum += bond.order.valence_contribution();
        has_aromatic_bond |= bond.order == BondOrder::Aromatic;
    }
    let valences = element::default_valences(atom.atomic_number);
    if atom.is_aromatic && has_aromatic_bond {
        if valences.contains(&sum) {
            return 0;
        }
        sum += 1;
    }
    valences
        .iter()
        .find(|&&v| v >= sum)
        .map(|&v| v - sum)
        .unwrap_or(0)
}

fn apply_atom_map_order(atoms: Vec<Atom>, bonds: Vec<Bond>) -> (Vec<Atom>, Vec<Bond>) {
    let n = atoms.len();
    let mut target = vec![usize::MAX; n];
    for (index, atom) in atoms.iter().enumerate() {
        match atom.map_index {
            Some(m) if m >= 1 && (m as usize) <= n && target[index] == usize::MAX => {
                target[index] = m as usize - 1;
            }
            _ => return (atoms, bonds),
        }
    }
    let mut taken = vec![false; n];
    for &t in &target {
        if taken[t] {
            return (atoms, bonds);
        }
        taken[t] = true;
    }

    let mut reordered: Vec<Option<Atom>> = vec![None; n];
    for (index, atom) in atoms.into_iter().enumerate() {
        reordered[target[index]] = Some(atom);
    }
    let atoms = reordered.into_iter().flatten().collect();
    let bonds = bonds
        .into_iter()
        .map(|b| Bond::new(target[b.atom1], target[b.atom2], b.order))
        .collect();
    (atoms, bonds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organic_subset_gets_implicit_hydrogens() {
        let mol = parse_smiles("CC(=O)O").unwrap();
        let h: Vec<u8> = mol.atoms().iter().map(|a| a.implicit_hydrogens).collect();
        assert_eq!(h, vec![3, 0, 0, 1]);
        assert_eq!(mol.bond_between(1, 2).unwrap().order, BondOrder::Double);
    }

    #[test]
    fn aromatic_atoms_get_hydrogens_from_the_pi_system() {
        let pyridine = parse_smiles("c1ccncc1").unwrap();
        assert_eq!(pyridine.atoms()[0].implicit_hydrogens, 1);
        assert_eq!(pyridine.atoms()[3].implicit_hydrogens, 0);
        let thiophene = parse_smiles("c1ccsc1").unwrap();
        assert_eq!(thiophene.atoms()[3].implicit_hydrogens, 0);
        let pyrrole = parse_smiles("c1cc[nH]c1").unwrap();
        assert_eq!(pyrrole.atoms()[3].implicit_hydrogens, 1);
        assert!(pyrrole.atoms()[3].is_aromatic);
    }

    #[test]
    fn bracket_atoms_parse_charge_hydrogens_and_maps() {
        let mol = parse_smiles("[NH4+]").unwrap();
        assert_eq!(mol.atoms()[0].formal_charge, 1);
        assert_eq!(mol.atoms()[0].implicit_hydrogens, 4);
        let mol = parse_smiles("[O-:7]").unwrap();
        assert_eq!(mol.atoms()[0].formal_charge, -1);
        assert_eq!(mol.atoms()[0].map_index, Some(7));
        let mol = parse_smiles("[Fe++]").unwrap();
        assert_eq!(mol.atoms()[0].formal_charge, 2);
        let mol = parse_smiles("[C@@H](F)(Cl)Br").unwrap();
        assert_eq!(mol.atoms()[0].implicit_hydrogens, 1);
        assert_eq!(mol.atom_count(), 4);
    }

    #[test]
    fn fully_mapped_smiles_is_reordered_by_map_index() {
        let mol = parse_smiles("[O:3]([C:2][C:1]([H:4])([H:5])[H:6])[H:7]").unwrap();
        assert_eq!(mol.atoms()[0].atomic_number, 6);
        assert_eq!(mol.atoms()[1].atomic_number, 6);
        assert_eq!(mol.atoms()[2].atomic_number, 8);
        assert!(mol.are_bonded(0, 1));
        assert!(mol.are_bonded(1, 2));
        assert!(mol.are_bonded(0, 3));
        assert!(mol.are_bonded(2, 6));
        assert!(mol.is_fully_mapped());
    }

    #[test]
    fn ring_closures_support_two_digit_labels_and_bond_symbols() {
        let mol = parse_smiles("C%10CCCC%10").unwrap();
        assert!(mol.are_bonded(0, 4));
        let mol = parse_smiles("C=1CCCC1").unwrap();
        assert_eq!(mol.bond_between(0, 4).unwrap().order, BondOrder::Double);
    }

    #[test]
    fn disconnected_components_are_allowed() {
        let mol = parse_smiles("[Na+].[Cl-]").unwrap();
        assert_eq!(mol.atom_count(), 2);
        assert_eq!(mol.bond_count(), 0);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert_eq!(parse_smiles("").unwrap_err(), SmilesError::Empty);
        assert!(matches!(parse_smiles("C1CC"), Err(SmilesError::UnclosedRing(1))));
        assert!(matches!(parse_smiles("C(C"), Err(SmilesError::UnbalancedBranch(1))));
        assert!(matches!(parse_smiles("CC)"), Err(SmilesError::UnbalancedBranch(2))));
        assert!(matches!(parse_smiles("[C"), Err(SmilesError::UnterminatedBracket(0))));
        assert!(matches!(parse_smiles("[Xx]"), Err(SmilesError::UnknownElement { .. })));
        assert!(matches!(parse_smiles("CC="), Err(SmilesError::DanglingBond(2))));
        assert!(matches!(parse_smiles("C?"), Err(SmilesError::UnexpectedCharacter { ch: '?', position: 1 })));
    }

    #[test]
    fn trailing_name_after_whitespace_is_ignored() {
        let mol = parse_smiles("CCO ethanol").unwrap();
        assert_eq!(mol.atom_count(), 3);
    }
}
