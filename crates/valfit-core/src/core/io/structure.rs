//! Writers for the coordinate files fitting targets consume: MDL SDF for topology plus
//! geometry and multi-frame XYZ for scans.

use crate::core::chem::element;
use crate::core::chem::molecule::Molecule;
use nalgebra::Point3;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

fn symbol(molecule: &Molecule, atom: usize) -> &'static str {
    molecule
        .atom(atom)
        .and_then(|a| element::symbol(a.atomic_number))
        .unwrap_or("X")
}

/// MDL charge field code for a formal charge (0 when out of range).
fn charge_code(charge: i8) -> u8 {
    match charge {
        3 => 1,
        2 => 2,
        1 => 3,
        -1 => 5,
        -2 => 6,
        -3 => 7,
        _ => 0,
    }
}

/// Writes one V2000 molfile record followed by `$$$$`.
pub fn write_sdf(
    molecule: &Molecule,
    coordinates: &[Point3<f64>],
    title: &str,
    writer: &mut impl Write,
) -> io::Result<()> {
    writeln!(writer, "{}", title)?;
    writeln!(writer, "  valfit")?;
    writeln!(writer)?;
    writeln!(
        writer,
        "{:>3}{:>3}  0  0  0  0  0  0  0  0999 V2000",
        molecule.atom_count(),
        molecule.bond_count()
    )?;
    for (index, position) in coordinates.iter().enumerate() {
        let charge = molecule.atom(index).map_or(0, |a| charge_code(a.formal_charge));
        writeln!(
            writer,
            "{:>10.4}{:>10.4}{:>10.4} {:<3} 0{:>3}  0  0  0  0  0  0  0  0  0  0",
            position.x,
            position.y,
            position.z,
            symbol(molecule, index),
            charge
        )?;
    }
    for bond in molecule.bonds() {
        writeln!(
            writer,
            "{:>3}{:>3}{:>3}  0",
            bond.atom1 + 1,
            bond.atom2 + 1,
            bond.order.code()
        )?;
    }
    for (index, atom) in molecule.atoms().iter().enumerate() {
        if atom.formal_charge != 0 {
            writeln!(writer, "M  CHG  1 {:>3} {:>3}", index + 1, atom.formal_charge)?;
        }
    }
    writeln!(writer, "M  END")?;
    writeln!(writer, "$$$$")?;
    Ok(())
}

/// Writes consecutive XYZ frames, one comment line per frame.
pub fn write_xyz<'a>(
    molecule: &Molecule,
    frames: impl IntoIterator<Item = (String, &'a [Point3<f64>])>,
    writer: &mut impl Write,
) -> io::Result<()> {
    for (comment, coordinates) in frames {
        writeln!(writer, "{}", coordinates.len())?;
        writeln!(writer, "{}", comment)?;
        for (index, p) in coordinates.iter().enumerate() {
            writeln!(
                writer,
                "{:<2} {:>15.10} {:>15.10} {:>15.10}",
                symbol(molecule, index),
                p.x,
                p.y,
                p.z
            )?;
        }
    }
    Ok(())
}

pub fn write_sdf_to_path(
    molecule: &Molecule,
    coordinates: &[Point3<f64>],
    title: &str,
    path: &Path,
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_sdf(molecule, coordinates, title, &mut writer)?;
    writer.flush()
}

pub fn write_xyz_to_path<'a>(
    molecule: &Molecule,
    frames: impl IntoIterator<Item = (String, &'a [Point3<f64>])>,
    path: &Path,
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_xyz(molecule, frames, &mut writer)?;
    writer.flush()
}
