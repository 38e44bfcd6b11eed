use super::offxml::{OffxmlError, XmlDocument, XmlElement};
use crate::core::models::term::TermKind;
use crate::core::patterns::smarts::SmartsError;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const BOND_FORCE_CONSTANT_UNIT: &str = "angstrom**-2 * mole**-1 * kilocalorie";
pub const BOND_LENGTH_UNIT: &str = "angstrom";
pub const ANGLE_FORCE_CONSTANT_UNIT: &str = "mole**-1 * radian**-2 * kilocalorie";
pub const ANGLE_UNIT: &str = "degree";

#[derive(Debug, Error)]
pub enum ForceFieldError {
    #[error(transparent)]
    Offxml(#[from] OffxmlError),
    #[error("Force field '{name}' not found (searched: {searched:?})")]
    NotFound { name: String, searched: Vec<PathBuf> },
    #[error("Root element is '{0}', expected 'SMIRNOFF'")]
    NotSmirnoff(String),
    #[error("Force field has no '{0}' handler")]
    MissingHandler(&'static str),
    #[error("No parameter with id '{id}' in the '{handler}' handler")]
    UnknownParameter { handler: &'static str, id: String },
    #[error("Parameter '{id}' has no '{attribute}' attribute")]
    MissingAttribute { id: String, attribute: String },
    #[error("Cannot parse quantity '{0}'")]
    InvalidQuantity(String),
    #[error("Invalid SMIRKS for parameter '{id}': {source}")]
    InvalidSmirks { id: String, source: SmartsError },
}

/// A snapshot of one parameter element of a valence handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub kind: TermKind,
    pub id: String,
    pub smirks: String,
    pub attributes: Vec<(String, String)>,
}

impl Parameter {
    fn from_element(kind: TermKind, element: &XmlElement) -> Self {
        Self {
            kind,
            id: element.attribute("id").unwrap_or_default().to_string(),
            smirks: element.attribute("smirks").unwrap_or_default().to_string(),
            attributes: element.attributes.clone(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Magnitude of a unit-bearing attribute such as `"1.09 * angstrom"`.
    pub fn quantity(&self, key: &str) -> Result<f64, ForceFieldError> {
        let raw = self
            .attribute(key)
            .ok_or_else(|| ForceFieldError::MissingAttribute {
                id: self.id.clone(),
                attribute: key.to_string(),
            })?;
        parse_quantity(raw)
    }

    /// Number of Fourier terms (`k1`, `k2`, ...) of a torsion parameter.
    pub fn fourier_term_count(&self) -> usize {
        (1..)
            .take_while(|i| self.attribute(&format!("k{}", i)).is_some())
            .count()
    }
}

pub fn parse_quantity(raw: &str) -> Result<f64, ForceFieldError> {
    raw.split('*')
        .next()
        .map(str::trim)
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| ForceFieldError::InvalidQuantity(raw.to_string()))
}

pub fn format_quantity(value: f64, unit: &str) -> String {
    format!("{} * {}", value, unit)
}

/// A SMIRNOFF force field backed by its full OFFXML document.
#[derive(Debug, Clone, PartialEq)]
pub struct ForceField {
    document: XmlDocument,
}

impl ForceField {
    pub fn from_document(document: XmlDocument) -> Result<Self, ForceFieldError> {
        if document.root.name != "SMIRNOFF" {
            return Err(ForceFieldError::NotSmirnoff(document.root.name.clone()));
        }
        Ok(Self { document })
    }

    pub fn parse(content: &str) -> Result<Self, ForceFieldError> {
        Self::from_document(XmlDocument::parse(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ForceFieldError> {
        Self::from_document(XmlDocument::read(path)?)
    }

    /// Locates a force field given either a path or a built-in name.
    ///
    /// Names are looked up in `search_dirs` in order, with `.offxml` appended when the
    /// name does not already end with it.
    pub fn resolve(name: &str, search_dirs: &[PathBuf]) -> Result<PathBuf, ForceFieldError> {
        let direct = PathBuf::from(name);
        if direct.is_file() {
            return Ok(direct);
        }
        let file_name = if name.ends_with(".offxml") {
            name.to_string()
        } else {
            format!("{}.offxml", name)
        };
        let searched: Vec<PathBuf> = search_dirs.iter().map(|d| d.join(&file_name)).collect();
        searched
            .iter()
            .find(|p| p.is_file())
            .cloned()
            .ok_or_else(|| ForceFieldError::NotFound {
                name: name.to_string(),
                searched,
            })
    }

    pub fn load_named(name: &str, search_dirs: &[PathBuf]) -> Result<Self, ForceFieldError> {
        Self::load(&Self::resolve(name, search_dirs)?)
    }

    #[inline]
    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    pub fn has_handler(&self, kind: TermKind) -> bool {
        self.document.root.child(kind.handler_name()).is_some()
    }

    fn handler(&self, kind: TermKind) -> Option<&XmlElement> {
        self.document.root.child(kind.handler_name())
    }

    /// Parameters of a handler in file order; empty when the handler is absent.
    pub fn parameters(&self, kind: TermKind) -> Vec<Parameter> {
        self.handler(kind)
            .map(|h| {
                h.elements()
                    .filter(|e| e.name == kind.parameter_tag())
                    .map(|e| Parameter::from_element(kind, e))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn parameter(&self, kind: TermKind, id: &str) -> Option<Parameter> {
        self.handler(kind)?
            .elements()
            .find(|e| e.name == kind.parameter_tag() && e.attribute("id") == Some(id))
            .map(|e| Parameter::from_element(kind, e))
    }

    fn parameter_mut(&mut self, kind: TermKind, id: &str) -> Result<&mut XmlElement, ForceFieldError> {
        let handler = self
            .document
            .root
            .child_mut(kind.handler_name())
            .ok_or(ForceFieldError::MissingHandler(kind.handler_name()))?;
        handler
            .elements_mut()
            .find(|e| e.name == kind.parameter_tag() && e.attribute("id") == Some(id))
            .ok_or_else(|| ForceFieldError::UnknownParameter {
                handler: kind.handler_name(),
                id: id.to_string(),
            })
    }

    pub fn set_parameter_attribute(
        &mut self,
        kind: TermKind,
        id: &str,
        key: &str,
        value: impl Into<String>,
    ) -> Result<(), ForceFieldError> {
        self.parameter_mut(kind, id)?.set_attribute(key, value);
        Ok(())
    }

    /// Removes a handler by tag name; returns false when it was not present.
    pub fn remove_handler(&mut self, name: &str) -> bool {
        self.document.root.remove_children(name) > 0
    }

    pub fn to_offxml_string(&self) -> Result<String, ForceFieldError> {
        Ok(self.document.to_xml_string()?)
    }

    pub fn write(&self, path: &Path) -> Result<(), ForceFieldError> {
        Ok(self.document.write(path)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    pub(crate) const MINI_FF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<SMIRNOFF version="0.3" aromaticity_model="OEAroModel_MDL">
    <Bonds version="0.4" potential="harmonic" fractional_bondorder_method="AM1-Wiberg">
        <Bond smirks="[#6X4:1]-[#6X4:2]" id="b1" length="1.527 * angstrom" k="520.0 * angstrom**-2 * mole**-1 * kilocalorie"></Bond>
        <Bond smirks="[#6:1]-[#1:2]" id="b83" length="1.09 * angstrom" k="740.0 * angstrom**-2 * mole**-1 * kilocalorie"></Bond>
        <Bond smirks="[#6:1]-[#8:2]" id="b9" length="1.42 * angstrom" k="600.0 * angstrom**-2 * mole**-1 * kilocalorie"></Bond>
        <Bond smirks="[#8:1]-[#1:2]" id="b87" length="0.97 * angstrom" k="1100.0 * angstrom**-2 * mole**-1 * kilocalorie"></Bond>
    </Bonds>
    <Angles version="0.3" potential="harmonic">
        <Angle smirks="[*:1]~[#6X4:2]-[*:3]" id="a1" angle="109.5 * degree" k="100.0 * mole**-1 * radian**-2 * kilocalorie"></Angle>
        <Angle smirks="[#1:1]-[#6X4:2]-[#1:3]" id="a2" angle="107.8 * degree" k="75.0 * mole**-1 * radian**-2 * kilocalorie"></Angle>
        <Angle smirks="[*:1]-[#8:2]-[*:3]" id="a28" angle="110.3 * degree" k="130.0 * mole**-1 * radian**-2 * kilocalorie"></Angle>
        <Angle smirks="[*:1]~[#6X2:2]~[*:3]" id="a16" angle="180.0 * degree" k="50.0 * mole**-1 * radian**-2 * kilocalorie"></Angle>
    </Angles>
    <ProperTorsions version="0.4" potential="k*(1+cos(periodicity*theta-phase))" default_idivf="auto">
        <Proper smirks="[*:1]-[#6X4:2]-[#6X4:3]-[*:4]" id="t1" periodicity1="3" phase1="0.0 * degree" k1="0.15 * mole**-1 * kilocalorie" idivf1="1.0"></Proper>
        <Proper smirks="[#6X4:1]-[#6X4:2]-[#6X4:3]-[#6X4:4]" id="t2" periodicity1="3" phase1="0.0 * degree" k1="0.2 * mole**-1 * kilocalorie" periodicity2="2" phase2="180.0 * degree" k2="0.25 * mole**-1 * kilocalorie" idivf1="1.0" idivf2="1.0"></Proper>
        <Proper smirks="[*:1]-[#6X4:2]-[#8X2:3]-[#1:4]" id="t85" periodicity1="3" phase1="0.0 * degree" k1="0.6 * mole**-1 * kilocalorie" idivf1="1.0"></Proper>
        <Proper smirks="[*:1]@[#6X4;r6:2]@[#6X4;r6:3]@[*:4]" id="t4" periodicity1="3" phase1="0.0 * degree" k1="0.3 * mole**-1 * kilocalorie" idivf1="1.0"></Proper>
    </ProperTorsions>
    <ImproperTorsions version="0.3" potential="k*(1+cos(periodicity*theta-phase))" default_idivf="auto">
        <Improper smirks="[*:1]~[#6X3:2](~[*:3])~[*:4]" id="i1" periodicity1="2" phase1="180.0 * degree" k1="5.0 * mole**-1 * kilocalorie"></Improper>
    </ImproperTorsions>
    <Constraints version="0.3">
        <Constraint smirks="[#1:1]-[*:2]" id="c1"></Constraint>
    </Constraints>
    <vdW version="0.3" potential="Lennard-Jones-12-6" combining_rules="Lorentz-Berthelot" scale12="0.0" scale13="0.0" scale14="0.5" scale15="1.0" cutoff="9.0 * angstrom" switch_width="1.0 * angstrom" method="cutoff">
        <Atom smirks="[#1:1]" epsilon="0.0157 * mole**-1 * kilocalorie" id="n1" rmin_half="0.6 * angstrom"></Atom>
    </vdW>
</SMIRNOFF>
"#;

    #[test]
    fn reads_handlers_in_file_order() {
        let ff = ForceField::parse(MINI_FF).unwrap();
        let bonds = ff.parameters(TermKind::Bond);
        assert_eq!(
            bonds.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["b1", "b83", "b9", "b87"]
        );
        assert_eq!(bonds[1].quantity("length").unwrap(), 1.09);
        assert_eq!(bonds[1].quantity("k").unwrap(), 740.0);
        assert!(ff.has_handler(TermKind::ImproperTorsion));
    }

    #[test]
    fn counts_fourier_terms() {
        let ff = ForceField::parse(MINI_FF).unwrap();
        assert_eq!(ff.parameter(TermKind::ProperTorsion, "t1").unwrap().fourier_term_count(), 1);
        assert_eq!(ff.parameter(TermKind::ProperTorsion, "t2").unwrap().fourier_term_count(), 2);
    }

    #[test]
    fn setting_unknown_parameter_fails() {
        let mut ff = ForceField::parse(MINI_FF).unwrap();
        let err = ff
            .set_parameter_attribute(TermKind::Bond, "b999", "k", "1 * angstrom")
            .unwrap_err();
        assert!(matches!(err, ForceFieldError::UnknownParameter { handler: "Bonds", .. }));
        ff.set_parameter_attribute(TermKind::Bond, "b1", "k", format_quantity(12.5, BOND_FORCE_CONSTANT_UNIT))
            .unwrap();
        assert_eq!(ff.parameter(TermKind::Bond, "b1").unwrap().quantity("k").unwrap(), 12.5);
    }

    #[test]
    fn non_smirnoff_documents_are_rejected() {
        assert!(matches!(
            ForceField::parse("<ForceField/>"),
            Err(ForceFieldError::NotSmirnoff(_))
        ));
    }

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity("109.5 * degree").unwrap(), 109.5);
        assert_eq!(parse_quantity("3").unwrap(), 3.0);
        assert!(parse_quantity("degree").is_err());
        assert_eq!(format_quantity(1.5, BOND_LENGTH_UNIT), "1.5 * angstrom");
    }

    #[test]
    fn resolves_names_against_search_directories() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("mini-1.0.0.offxml"), MINI_FF).unwrap();
        let dirs = vec![PathBuf::from("/nonexistent"), dir.path().to_path_buf()];
        let found = ForceField::resolve("mini-1.0.0", &dirs).unwrap();
        assert_eq!(found, dir.path().join("mini-1.0.0.offxml"));
        let same = ForceField::resolve("mini-1.0.0.offxml", &dirs).unwrap();
        assert_eq!(found, same);
        assert!(ForceField::load_named("mini-1.0.0", &dirs).is_ok());
        assert!(matches!(
            ForceField::resolve("missing", &dirs),
            Err(ForceFieldError::NotFound { .. })
        ));
    }
}
