use nalgebra::{Point3, Vector3};

pub const BOHR_TO_ANGSTROM: f64 = 0.529177210903;
pub const HARTREE_TO_KCAL_PER_MOL: f64 = 627.509474;
/// Converts Hessian elements from Hartree/bohr² to kcal/mol/Å².
pub const HESSIAN_AU_TO_KCAL_PER_MOL_ANGSTROM2: f64 =
    HARTREE_TO_KCAL_PER_MOL / (BOHR_TO_ANGSTROM * BOHR_TO_ANGSTROM);

#[inline]
pub fn distance(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (b - a).norm()
}

/// Unit vector pointing from `from` to `to`.
#[inline]
pub fn unit_vector(from: &Point3<f64>, to: &Point3<f64>) -> Vector3<f64> {
    (to - from).normalize()
}

/// Angle a-b-c in degrees.
pub fn angle_degrees(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let u = unit_vector(b, a);
    let v = unit_vector(b, c);
    u.dot(&v).clamp(-1.0, 1.0).acos().to_degrees()
}

pub fn is_finite_point(p: &Point3<f64>) -> bool {
    p.iter().all(|v| v.is_finite())
}
