use nalgebra::{Matrix3, Point3, Rotation3, SymmetricEigen, Unit, Vector3};
use std::f64::consts::PI;
use thiserror::Error;

/// Tolerance used by [`angle_between`] to snap nearly parallel vectors to exact angles.
pub const DEFAULT_ANGLE_EPSILON: f64 = 1e-9;

// Singular values at or below this fraction of the largest one are treated as zero.
const DEGENERATE_SINGULAR_RATIO: f64 = 1e-8;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Vector has zero length")]
    DegenerateVector,

    #[error("Point sets differ in size: {left} vs {right}")]
    ShapeMismatch { left: usize, right: usize },

    #[error("Point set is empty")]
    Empty,

    #[error("Best superposition is a reflection; the point sets are mirror images")]
    Reflection,

    #[error("Total mass is zero")]
    ZeroMass,
}

pub fn rotation_to_align(from: &Vector3<f64>, to: &Vector3<f64>) -> Option<Rotation3<f64>> {
    Rotation3::rotation_between(from, to)
}

pub fn rotation_from_axis_angle(axis: &Vector3<f64>, angle_degrees: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Unit::new_normalize(*axis), angle_degrees.to_radians())
}

/// Angle between two vectors in radians, within `[0, π]`.
///
/// Uses [`DEFAULT_ANGLE_EPSILON`]; see [`angle_between_with_tolerance`].
pub fn angle_between(v1: &Vector3<f64>, v2: &Vector3<f64>) -> Result<f64, GeometryError> {
    angle_between_with_tolerance(v1, v2, DEFAULT_ANGLE_EPSILON)
}

/// Angle between two vectors in radians, within `[0, π]`.
///
/// The cosine is clamped to `[-1, 1]` before `acos`. When it lies within `eps` of
/// `1` the result is exactly `0.0`, and within `eps` of `-1` exactly `π`.
pub fn angle_between_with_tolerance(
    v1: &Vector3<f64>,
    v2: &Vector3<f64>,
    eps: f64,
) -> Result<f64, GeometryError> {
    let norms = v1.norm() * v2.norm();
    if norms == 0.0 {
        return Err(GeometryError::DegenerateVector);
    }
    let cos = (v1.dot(v2) / norms).clamp(-1.0, 1.0);
    if (cos - 1.0).abs() <= eps {
        Ok(0.0)
    } else if (cos + 1.0).abs() <= eps {
        Ok(PI)
    } else {
        Ok(cos.acos())
    }
}

/// Builds the rotation that maps `target` onto the +Z axis.
///
/// The rotation is `Ry(-θ)·Rz(-φ)` with `θ = atan2(‖xy‖, z)` and `φ = atan2(y, x)`,
/// so a vector already on +Z yields the identity without any special casing.
pub fn rotation_aligning_z(target: &Vector3<f64>) -> Result<Rotation3<f64>, GeometryError> {
    if target.norm() == 0.0 {
        return Err(GeometryError::DegenerateVector);
    }
    let theta = target.x.hypot(target.y).atan2(target.z);
    let phi = target.y.atan2(target.x);
    let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), -phi);
    let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), -theta);
    Ok(ry * rz)
}

/// Signed dihedral angle in radians, within `(-π, π]`, defined by four points.
pub fn dihedral(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
) -> Result<f64, GeometryError> {
    let b1 = b - a;
    let b2 = c - b;
    let b3 = d - c;
    let n1 = b1.cross(&b2);
    let n2 = b2.cross(&b3);
    if n1.norm() == 0.0 || n2.norm() == 0.0 {
        return Err(GeometryError::DegenerateVector);
    }
    let y = b2.norm() * b1.dot(&n2);
    let x = n1.dot(&n2);
    Ok(y.atan2(x))
}

pub fn centroid(points: &[Point3<f64>]) -> Result<Point3<f64>, GeometryError> {
    if points.is_empty() {
        return Err(GeometryError::Empty);
    }
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    Ok(Point3::from(sum / points.len() as f64))
}

/// Root-mean-square deviation between two equally sized point sets.
pub fn rmsd(a: &[Point3<f64>], b: &[Point3<f64>]) -> Result<f64, GeometryError> {
    if a.len() != b.len() {
        return Err(GeometryError::ShapeMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(GeometryError::Empty);
    }
    let squared_dist_sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(p1, p2)| (p1 - p2).norm_squared())
        .sum();
    Ok((squared_dist_sum / a.len() as f64).sqrt())
}

/// Rigid-body transform that best maps one point set onto another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Superposition {
    pub rotation: Rotation3<f64>,
    pub mobile_centroid: Point3<f64>,
    pub reference_centroid: Point3<f64>,
}

impl Superposition {
    pub fn apply(&self, point: &Point3<f64>) -> Point3<f64> {
        self.reference_centroid + self.rotation * (point - self.mobile_centroid)
    }

    pub fn apply_all(&self, points: &mut [Point3<f64>]) {
        for p in points.iter_mut() {
            *p = self.apply(p);
        }
    }

    /// Translation applied after rotating about the origin.
    pub fn translation(&self) -> Vector3<f64> {
        self.reference_centroid.coords - self.rotation * self.mobile_centroid.coords
    }
}

/// Least-squares superposition of `mobile` onto `reference` (Kabsch).
///
/// When the optimal orthogonal transform has a negative determinant the result
/// depends on the smallest singular value of the cross-covariance matrix. If it
/// is degenerate (planar or collinear input) the matching singular vector is
/// flipped, which is still a proper rotation of the data. Otherwise the point sets
/// are genuine mirror images and [`GeometryError::Reflection`] is returned.
pub fn superpose(
    mobile: &[Point3<f64>],
    reference: &[Point3<f64>],
) -> Result<Superposition, GeometryError> {
    if mobile.len() != reference.len() {
        return Err(GeometryError::ShapeMismatch {
            left: mobile.len(),
            right: reference.len(),
        });
    }
    let mobile_centroid = centroid(mobile)?;
    let reference_centroid = centroid(reference)?;

    let h = mobile
        .iter()
        .zip(reference.iter())
        .fold(Matrix3::zeros(), |acc, (f, t)| {
            acc + (t - reference_centroid) * (f - mobile_centroid).transpose()
        });

    let svd = h.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(GeometryError::DegenerateVector),
    };

    let mut correction = Matrix3::identity();
    if (u * v_t).determinant() < 0.0 {
        let values = svd.singular_values;
        let (min_index, min_value) = values
            .iter()
            .copied()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .unwrap_or((2, 0.0));
        if min_value > DEGENERATE_SINGULAR_RATIO * values.max() {
            return Err(GeometryError::Reflection);
        }
        correction[(min_index, min_index)] = -1.0;
    }

    let rotation = Rotation3::from_matrix_unchecked(u * correction * v_t);
    Ok(Superposition {
        rotation,
        mobile_centroid,
        reference_centroid,
    })
}

/// Mass-weighted center of a point set.
pub fn center_of_mass(
    points: &[Point3<f64>],
    masses: &[f64],
) -> Result<Point3<f64>, GeometryError> {
    if points.len() != masses.len() {
        return Err(GeometryError::ShapeMismatch {
            left: points.len(),
            right: masses.len(),
        });
    }
    if points.is_empty() {
        return Err(GeometryError::Empty);
    }
    let total: f64 = masses.iter().sum();
    if total == 0.0 {
        return Err(GeometryError::ZeroMass);
    }
    let weighted: Vector3<f64> = points
        .iter()
        .zip(masses.iter())
        .map(|(p, m)| p.coords * *m)
        .sum();
    Ok(Point3::from(weighted / total))
}

/// Gyration tensor about the geometric center: `S = 1/N Σ r rᵀ`.
pub fn gyration_tensor(points: &[Point3<f64>]) -> Result<Matrix3<f64>, GeometryError> {
    let center = centroid(points)?;
    let sum = points.iter().fold(Matrix3::zeros(), |acc, p| {
        let r = p - center;
        acc + r * r.transpose()
    });
    Ok(sum / points.len() as f64)
}

/// Moment of inertia tensor about the center of mass.
pub fn inertia_tensor(
    points: &[Point3<f64>],
    masses: &[f64],
) -> Result<Matrix3<f64>, GeometryError> {
    let com = center_of_mass(points, masses)?;
    Ok(points
        .iter()
        .zip(masses.iter())
        .fold(Matrix3::zeros(), |acc, (p, m)| {
            let r = p - com;
            acc + (Matrix3::identity() * r.norm_squared() - r * r.transpose()) * *m
        }))
}

/// Eigen-decomposition of a symmetric tensor, sorted by ascending eigenvalue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrincipalMoments {
    pub values: Vector3<f64>,
    /// Principal axes as columns, in the same order as `values`.
    pub axes: Matrix3<f64>,
}

pub fn principal_moments(tensor: &Matrix3<f64>) -> PrincipalMoments {
    let eigen = SymmetricEigen::new(*tensor);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| eigen.eigenvalues[i].total_cmp(&eigen.eigenvalues[j]));

    let values = Vector3::new(
        eigen.eigenvalues[order[0]],
        eigen.eigenvalues[order[1]],
        eigen.eigenvalues[order[2]],
    );
    let axes = Matrix3::from_columns(&[
        eigen.eigenvectors.column(order[0]).into_owned(),
        eigen.eigenvectors.column(order[1]).into_owned(),
        eigen.eigenvectors.column(order[2]).into_owned(),
    ]);
    PrincipalMoments { values, axes }
}

/// Shape descriptors derived from the principal moments of the gyration tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeDescriptors {
    pub radius_of_gyration: f64,
    pub asphericity: f64,
    pub acylindricity: f64,
    /// Relative shape anisotropy, `0` for spherical and `1` for linear arrangements.
    pub anisotropy: f64,
}

impl ShapeDescriptors {
    pub fn from_points(points: &[Point3<f64>]) -> Result<Self, GeometryError> {
        Ok(Self::from_gyration(&gyration_tensor(points)?))
    }

    pub fn from_gyration(tensor: &Matrix3<f64>) -> Self {
        let l = principal_moments(tensor).values;
        let rg2 = l.sum();
        let asphericity = l[2] - 0.5 * (l[0] + l[1]);
        let acylindricity = l[1] - l[0];
        let anisotropy = if rg2 > 0.0 {
            (asphericity.powi(2) + 0.75 * acylindricity.powi(2)) / rg2.powi(2)
        } else {
            0.0
        };
        Self {
            radius_of_gyration: rg2.max(0.0).sqrt(),
            asphericity,
            acylindricity,
            anisotropy,
        }
    }
}
