//! SMARTS and SMIRKS pattern parsing.
//!
//! SMIRKS as used by SMIRNOFF force fields is SMARTS with atom-map tags (`[#6:1]`)
//! marking the atoms of the valence term being typed, so one parser covers both.

use crate::core::chem::element;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SmartsError {
    #[error("Empty SMARTS pattern")]
    Empty,
    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },
    #[error("Unexpected end of pattern")]
    UnexpectedEnd,
    #[error("Unknown element symbol '{symbol}' at position {position}")]
    UnknownElement { symbol: String, position: usize },
    #[error("Unbalanced parenthesis at position {0}")]
    UnbalancedBranch(usize),
    #[error("Ring closure {0} is never closed")]
    UnclosedRing(u16),
    #[error("Bond at position {0} is not followed by an atom")]
    DanglingBond(usize),
}

/// A primitive atom query.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomPrimitive {
    /// Any atom (`*`).
    Wildcard,
    /// Atomic number regardless of aromaticity (`#6`).
    AtomicNumber(u8),
    /// Element with a fixed aromaticity (`C` aliphatic, `c` aromatic).
    Element { atomic_number: u8, aromatic: bool },
    /// Any aromatic atom (`a`).
    Aromatic,
    /// Any aliphatic atom (`A`).
    Aliphatic,
    /// Explicit connections (`D2`).
    Degree(u8),
    /// Total attached hydrogens (`H1`).
    TotalHydrogens(u8),
    /// Implicit hydrogens only (`h1`).
    ImplicitHydrogens(u8),
    /// Total connections including implicit hydrogens (`X4`).
    Connectivity(u8),
    /// Ring bonds on the atom (`x2`).
    RingConnectivity(u8),
    /// Member of any ring (`R`, `r`, `x`).
    InRing,
    /// Member of exactly `n` rings (`R2`); zero means acyclic.
    RingCount(u8),
    /// Smallest ring size (`r5`); zero means acyclic.
    RingSize(u8),
    /// Total bond order plus implicit hydrogens (`v4`).
    Valence(u8),
    /// Formal charge (`+1`, `-`, `+0`).
    Charge(i8),
    /// Recursive environment (`$(...)`); the first atom of the inner pattern is the anchor.
    Recursive(Box<SmartsPattern>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AtomExpr {
    Primitive(AtomPrimitive),
    Not(Box<AtomExpr>),
    And(Vec<AtomExpr>),
    Or(Vec<AtomExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondPrimitive {
    /// No explicit bond: single or aromatic.
    Implicit,
    Single,
    Double,
    Triple,
    Aromatic,
    Any,
    Ring,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BondExpr {
    Primitive(BondPrimitive),
    Not(Box<BondExpr>),
    And(Vec<BondExpr>),
    Or(Vec<BondExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmartsAtom {
    pub expr: AtomExpr,
    pub map_index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmartsBond {
    pub atom1: usize,
    pub atom2: usize,
    pub expr: BondExpr,
}

/// A parsed SMARTS/SMIRKS pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct SmartsPattern {
    source: String,
    atoms: Vec<SmartsAtom>,
    bonds: Vec<SmartsBond>,
    adjacency: Vec<Vec<(usize, usize)>>,
}

impl SmartsPattern {
    /// Parses a SMARTS or SMIRKS string.
    pub fn parse(smarts: &str) -> Result<Self, SmartsError> {
        let text = smarts.trim();
        if text.is_empty() {
            return Err(SmartsError::Empty);
        }
        let mut parser = SmartsParser::new(text);
        parser.parse()?;
        parser.finish(text)
    }

    fn new(source: &str, atoms: Vec<SmartsAtom>, bonds: Vec<SmartsBond>) -> Self {
        let mut adjacency = vec![Vec::new(); atoms.len()];
        for (index, bond) in bonds.iter().enumerate() {
            adjacency[bond.atom1].push((bond.atom2, index));
            adjacency[bond.atom2].push((bond.atom1, index));
        }
        Self {
            source: source.to_string(),
            atoms,
            bonds,
            adjacency,
        }
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn atoms(&self) -> &[SmartsAtom] {
        &self.atoms
    }

    #[inline]
    pub fn bonds(&self) -> &[SmartsBond] {
        &self.bonds
    }

    #[inline]
    pub fn adjacency(&self, atom: usize) -> &[(usize, usize)] {
        &self.adjacency[atom]
    }

    /// Pattern atoms carrying a map tag, ordered by tag value.
    pub fn tagged_atoms(&self) -> Vec<usize> {
        let mut tagged: Vec<(u32, usize)> = self
            .atoms
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.map_index.map(|m| (m, i)))
            .collect();
        tagged.sort_unstable();
        tagged.into_iter().map(|(_, i)| i).collect()
    }
}

struct SmartsParser<'a> {
    input: &'a [u8],
    pos: usize,
    atoms: Vec<SmartsAtom>,
    bonds: Vec<SmartsBond>,
    stack: Vec<(usize, usize)>,
    prev_atom: Option<usize>,
    pending_bond: Option<(BondExpr, usize)>,
    ring_closures: BTreeMap<u16, (usize, Option<BondExpr>)>,
}

impl<'a> SmartsParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            atoms: Vec::new(),
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

    fn unexpected(&self) -> SmartsError {
        match self.peek() {
            Some(c) => SmartsError::UnexpectedCharacter {
                ch: c as char,
                position: self.pos,
            },
            None => SmartsError::UnexpectedEnd,
        }
    }

    fn parse(&mut self) -> Result<(), SmartsError> {
        while let Some(ch) = self.peek() {
            match ch {
                b'(' => {
                    let prev = self.prev_atom.ok_or_else(|| self.unexpected())?;
                    self.stack.push((prev, self.pos));
                    self.advance();
                }
                b')' => {
                    if let Some((_, position)) = &self.pending_bond {
                        return Err(SmartsError::DanglingBond(*position));
                    }
                    let (atom, _) = self
                        .stack
                        .pop()
                        .ok_or(SmartsError::UnbalancedBranch(self.pos))?;
                    self.prev_atom = Some(atom);
                    self.advance();
                }
                b'.' => {
                    if let Some((_, position)) = &self.pending_bond {
                        return Err(SmartsError::DanglingBond(*position));
                    }
                    self.prev_atom = None;
                    self.advance();
                }
                b'%' => {
                    self.advance();
                    let (Some(d1), Some(d2)) = (self.advance(), self.advance()) else {
                        return Err(SmartsError::UnexpectedEnd);
                    };
                    if !d1.is_ascii_digit() || !d2.is_ascii_digit() {
                        self.pos -= 2;
                        return Err(self.unexpected());
                    }
                    self.ring_closure((d1 - b'0') as u16 * 10 + (d2 - b'0') as u16)?;
                }
                b'0'..=b'9' => {
                    self.advance();
                    self.ring_closure((ch - b'0') as u16)?;
                }
                b'[' => {
                    self.advance();
                    let expr = self.parse_atom_low_and()?;
                    let mut map_index = None;
                    if self.peek() == Some(b':') {
                        self.advance();
                        map_index = Some(self.parse_number().ok_or_else(|| self.unexpected())?);
                    }
                    if self.peek() != Some(b']') {
                        return Err(self.unexpected());
                    }
                    self.advance();
                    self.add_atom(expr, map_index);
                }
                c if is_bond_start(c) => {
                    if self.prev_atom.is_none() || self.pending_bond.is_some() {
                        return Err(self.unexpected());
                    }
                    let position = self.pos;
                    let expr = self.parse_bond_low_and()?;
                    self.pending_bond = Some((expr, position));
                }
                _ => {
                    let expr = self.parse_unbracketed_atom()?;
                    self.add_atom(expr, None);
                }
            }
        }
        Ok(())
    }

    fn finish(self, source: &str) -> Result<SmartsPattern, SmartsError> {
        if let Some((_, position)) = self.pending_bond {
            return Err(SmartsError::DanglingBond(position));
        }
        if let Some(&(_, position)) = self.stack.last() {
            return Err(SmartsError::UnbalancedBranch(position));
        }
        if let Some((&number, _)) = self.ring_closures.iter().next() {
            return Err(SmartsError::UnclosedRing(number));
        }
        if self.atoms.is_empty() {
            return Err(SmartsError::Empty);
        }
        Ok(SmartsPattern::new(source, self.atoms, self.bonds))
    }

    fn add_atom(&mut self, expr: AtomExpr, map_index: Option<u32>) {
        let index = self.atoms.len();
        self.atoms.push(SmartsAtom { expr, map_index });
        if let Some(prev) = self.prev_atom {
            let expr = self
                .pending_bond
                .take()
                .map(|(e, _)| e)
                .unwrap_or(BondExpr::Primitive(BondPrimitive::Implicit));
            self.bonds.push(SmartsBond {
                atom1: prev,
                atom2: index,
                expr,
            });
        }
        self.pending_bond = None;
        self.prev_atom = Some(index);
    }

    fn ring_closure(&mut self, number: u16) -> Result<(), SmartsError> {
        let current = self.prev_atom.ok_or_else(|| self.unexpected())?;
        let expr = self.pending_bond.take().map(|(e, _)| e);
        if let Some((open, open_expr)) = self.ring_closures.remove(&number) {
            let expr = expr
                .or(open_expr)
                .unwrap_or(BondExpr::Primitive(BondPrimitive::Implicit));
            self.bonds.push(SmartsBond {
                atom1: open,
                atom2: current,
                expr,
            });
        } else {
            self.ring_closures.insert(number, (current, expr));
        }
        Ok(())
    }

    fn parse_unbracketed_atom(&mut self) -> Result<AtomExpr, SmartsError> {
        let position = self.pos;
        let Some(ch) = self.advance() else {
            return Err(SmartsError::UnexpectedEnd);
        };
        let element = |atomic_number, aromatic| {
            AtomExpr::Primitive(AtomPrimitive::Element {
                atomic_number,
                aromatic,
            })
        };
        Ok(match ch {
            b'*' => AtomExpr::Primitive(AtomPrimitive::Wildcard),
            b'a' => AtomExpr::Primitive(AtomPrimitive::Aromatic),
            b'A' => AtomExpr::Primitive(AtomPrimitive::Aliphatic),
            b'B' if self.peek() == Some(b'r') => {
                self.advance();
                element(35, false)
            }
            b'C' if self.peek() == Some(b'l') => {
                self.advance();
                element(17, false)
            }
            b'B' => element(5, false),
            b'C' => element(6, false),
            b'N' => element(7, false),
            b'O' => element(8, false),
            b'P' => element(15, false),
            b'S' => element(16, false),
            b'F' => element(9, false),
            b'I' => element(53, false),
            b'b' => element(5, true),
            b'c' => element(6, true),
            b'n' => element(7, true),
            b'o' => element(8, true),
            b'p' => element(15, true),
            b's' => element(16, true),
            _ => {
                self.pos = position;
                return Err(self.unexpected());
            }
        })
    }

    // Atom expression precedence, loosest first:
    //   low_and = or (';' or)*
    //   or      = and (',' and)*
    //   and     = not (('&')? not)*
    //   not     = '!'* primitive

    fn parse_atom_low_and(&mut self) -> Result<AtomExpr, SmartsError> {
        let mut terms = vec![self.parse_atom_or()?];
        while self.peek() == Some(b';') {
            self.advance();
            terms.push(self.parse_atom_or()?);
        }
        Ok(collapse(terms, AtomExpr::And))
    }

    fn parse_atom_or(&mut self) -> Result<AtomExpr, SmartsError> {
        let mut terms = vec![self.parse_atom_and()?];
        while self.peek() == Some(b',') {
            self.advance();
            terms.push(self.parse_atom_and()?);
        }
        Ok(collapse(terms, AtomExpr::Or))
    }

    fn parse_atom_and(&mut self) -> Result<AtomExpr, SmartsError> {
        let mut terms = vec![self.parse_atom_not()?];
        loop {
            match self.peek() {
                Some(b'&') => {
                    self.advance();
                    terms.push(self.parse_atom_not()?);
                }
                Some(c) if is_atom_primitive_start(c) => terms.push(self.parse_atom_not()?),
                _ => break,
            }
        }
        Ok(collapse(terms, AtomExpr::And))
    }

    fn parse_atom_not(&mut self) -> Result<AtomExpr, SmartsError> {
        if self.peek() == Some(b'!') {
            self.advance();
            let inner = self.parse_atom_not()?;
            return Ok(AtomExpr::Not(Box::new(inner)));
        }
        self.parse_atom_primitive().map(AtomExpr::Primitive)
    }

    fn parse_atom_primitive(&mut self) -> Result<AtomPrimitive, SmartsError> {
        let position = self.pos;
        let at_bracket_start = self.input.get(position.wrapping_sub(1)) == Some(&b'[');
        let Some(ch) = self.peek() else {
            return Err(SmartsError::UnexpectedEnd);
        };

        match ch {
            b'*' => {
                self.advance();
                Ok(AtomPrimitive::Wildcard)
            }
            b'#' => {
                self.advance();
                let n = self.parse_number().ok_or_else(|| self.unexpected())?;
                Ok(AtomPrimitive::AtomicNumber(n as u8))
            }
            b'$' => self.parse_recursive(),
            b'@' => {
                // Chirality is accepted and ignored.
                while self.peek() == Some(b'@') {
                    self.advance();
                }
                if let (Some(a), Some(b)) = (self.peek(), self.peek_at(1)) {
                    if matches!(&[a, b], b"TH" | b"AL" | b"SP" | b"TB" | b"OH") {
                        self.pos += 2;
                        self.parse_number();
                    }
                }
                if self.peek() == Some(b'?') {
                    self.advance();
                }
                Ok(AtomPrimitive::Wildcard)
            }
            b'+' | b'-' => {
                self.advance();
                let unit: i8 = if ch == b'+' { 1 } else { -1 };
                if let Some(n) = self.parse_number() {
                    return Ok(AtomPrimitive::Charge(unit * n as i8));
                }
                let mut charge = unit;
                while self.peek() == Some(ch) {
                    self.advance();
                    charge += unit;
                }
                Ok(AtomPrimitive::Charge(charge))
            }
            b'0'..=b'9' => {
                // Isotope labels do not constrain matching.
                self.parse_number();
                Ok(AtomPrimitive::Wildcard)
            }
            b'H' => {
                self.advance();
                let next = self.peek();
                if let Some(n) = next.filter(|c| c.is_ascii_lowercase()) {
                    let two = format!("H{}", n as char);
                    if let Some(z) = element::atomic_number(&two) {
                        self.advance();
                        return Ok(AtomPrimitive::Element {
                            atomic_number: z,
                            aromatic: false,
                        });
                    }
                }
                if at_bracket_start && matches!(next, Some(b']' | b'+' | b'-' | b':' | b';' | b',' | b'&')) {
                    return Ok(AtomPrimitive::AtomicNumber(1));
                }
                Ok(AtomPrimitive::TotalHydrogens(
                    self.parse_number().unwrap_or(1) as u8,
                ))
            }
            b'D' => {
                self.advance();
                Ok(AtomPrimitive::Degree(self.parse_number().unwrap_or(1) as u8))
            }
            b'h' => {
                self.advance();
                Ok(AtomPrimitive::ImplicitHydrogens(
                    self.parse_number().unwrap_or(1) as u8,
                ))
            }
            b'X' => {
                self.advance();
                Ok(AtomPrimitive::Connectivity(
                    self.parse_number().unwrap_or(1) as u8,
                ))
            }
            b'x' => {
                self.advance();
                Ok(match self.parse_number() {
                    Some(n) => AtomPrimitive::RingConnectivity(n as u8),
                    None => AtomPrimitive::InRing,
                })
            }
            b'v' => {
                self.advance();
                Ok(AtomPrimitive::Valence(self.parse_number().unwrap_or(1) as u8))
            }
            b'R' => {
                self.advance();
                Ok(match self.parse_number() {
                    Some(n) => AtomPrimitive::RingCount(n as u8),
                    None => AtomPrimitive::InRing,
                })
            }
            b'r' => {
                self.advance();
                Ok(match self.parse_number() {
                    Some(n) => AtomPrimitive::RingSize(n as u8),
                    None => AtomPrimitive::InRing,
                })
            }
            b'a' => {
                if self.peek_at(1) == Some(b's') {
                    self.pos += 2;
                    return Ok(AtomPrimitive::Element {
                        atomic_number: 33,
                        aromatic: true,
                    });
                }
                self.advance();
                Ok(AtomPrimitive::Aromatic)
            }
            b'A' => {
                self.advance();
                if let Some(n) = self.peek().filter(|c| c.is_ascii_lowercase()) {
                    let two = format!("A{}", n as char);
                    if let Some(z) = element::atomic_number(&two) {
                        self.advance();
                        return Ok(AtomPrimitive::Element {
                            atomic_number: z,
                            aromatic: false,
                        });
                    }
                }
                Ok(AtomPrimitive::Aliphatic)
            }
            c if c.is_ascii_uppercase() => {
                self.advance();
                if let Some(n) = self.peek().filter(|c| c.is_ascii_lowercase()) {
                    let two = format!("{}{}", c as char, n as char);
                    if let Some(z) = element::atomic_number(&two) {
                        self.advance();
                        return Ok(AtomPrimitive::Element {
                            atomic_number: z,
                            aromatic: false,
                        });
                    }
                }
                let one = (c as char).to_string();
                let z = element::atomic_number(&one).ok_or(SmartsError::UnknownElement {
                    symbol: one,
                    position,
                })?;
                Ok(AtomPrimitive::Element {
                    atomic_number: z,
                    aromatic: false,
                })
            }
            c if c.is_ascii_lowercase() => {
                if self.peek_at(1) == Some(b'e') && c == b's' {
                    self.pos += 2;
                    return Ok(AtomPrimitive::Element {
                        atomic_number: 34,
                        aromatic: true,
                    });
                }
                self.advance();
                let z = match c {
                    b'b' => 5,
                    b'c' => 6,
                    b'n' => 7,
                    b'o' => 8,
                    b'p' => 15,
                    b's' => 16,
                    _ => {
                        return Err(SmartsError::UnknownElement {
                            symbol: (c as char).to_string(),
                            position,
                        });
                    }
                };
                Ok(AtomPrimitive::Element {
                    atomic_number: z,
                    aromatic: true,
                })
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_recursive(&mut self) -> Result<AtomPrimitive, SmartsError> {
        self.advance();
        if self.peek() != Some(b'(') {
            return Err(self.unexpected());
        }
        self.advance();
        let start = self.pos;
        let mut depth = 1usize;
        while let Some(c) = self.peek() {
            match c {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            self.advance();
        }
        if depth != 0 {
            return Err(SmartsError::UnbalancedBranch(start - 1));
        }
        let inner = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| SmartsError::UnexpectedEnd)?;
        let pattern = SmartsPattern::parse(inner).map_err(|e| match e {
            SmartsError::UnexpectedCharacter { ch, position } => {
                SmartsError::UnexpectedCharacter {
                    ch,
                    position: position + start,
                }
            }
            other => other,
        })?;
        self.advance();
        Ok(AtomPrimitive::Recursive(Box::new(pattern)))
    }

    fn parse_bond_low_and(&mut self) -> Result<BondExpr, SmartsError> {
        let mut terms = vec![self.parse_bond_or()?];
        while self.peek() == Some(b';') {
            self.advance();
            terms.push(self.parse_bond_or()?);
        }
        Ok(collapse(terms, BondExpr::And))
    }

    fn parse_bond_or(&mut self) -> Result<BondExpr, SmartsError> {
        let mut terms = vec![self.parse_bond_and()?];
        while self.peek() == Some(b',') {
            self.advance();
            terms.push(self.parse_bond_and()?);
        }
        Ok(collapse(terms, BondExpr::Or))
    }

    fn parse_bond_and(&mut self) -> Result<BondExpr, SmartsError> {
        let mut terms = vec![self.parse_bond_not()?];
        loop {
            match self.peek() {
                Some(b'&') => {
                    self.advance();
                    terms.push(self.parse_bond_not()?);
                }
                Some(c) if is_bond_primitive(c) || c == b'!' => terms.push(self.parse_bond_not()?),
                _ => break,
            }
        }
        Ok(collapse(terms, BondExpr::And))
    }

    fn parse_bond_not(&mut self) -> Result<BondExpr, SmartsError> {
        if self.peek() == Some(b'!') {
            self.advance();
            let inner = self.parse_bond_not()?;
            return Ok(BondExpr::Not(Box::new(inner)));
        }
        let primitive = match self.peek() {
            Some(b'-') => BondPrimitive::Single,
            Some(b'=') => BondPrimitive::Double,
            Some(b'#') => BondPrimitive::Triple,
            Some(b':') => BondPrimitive::Aromatic,
            Some(b'~') => BondPrimitive::Any,
            Some(b'@') => BondPrimitive::Ring,
            Some(b'/') | Some(b'\\') => {
                self.advance();
                if self.peek() == Some(b'?') {
                    self.advance();
                }
                return Ok(BondExpr::Primitive(BondPrimitive::Single));
            }
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(BondExpr::Primitive(primitive))
    }

    fn parse_number(&mut self) -> Option<u32> {
        let mut value: Option<u32> = None;
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
            self.advance();
            value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add((c - b'0') as u32));
        }
        value
    }
}

fn collapse<T>(mut terms: Vec<T>, combine: fn(Vec<T>) -> T) -> T {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        combine(terms)
    }
}

fn is_bond_primitive(c: u8) -> bool {
    matches!(c, b'-' | b'=' | b'#' | b':' | b'~' | b'@' | b'/' | b'\\')
}

fn is_bond_start(c: u8) -> bool {
    is_bond_primitive(c) || c == b'!'
}

fn is_atom_primitive_start(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'#' | b'*' | b'!' | b'$' | b'+' | b'-' | b'@')
}
