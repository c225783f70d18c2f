use std::ops::Mul;

use serde::{Deserialize, Serialize};
use ultraviolet::{Mat3, Mat4, Vec3, Vec4};

/// Tolerance used when deciding whether a bake transform is the identity.
pub const IDENTITY_EPSILON: f32 = 1e-5;

/// `|det|` below this fraction of the product of the column lengths counts as singular.
const SINGULAR_EPSILON: f32 = 1e-6;
const AXIS_EPSILON: f32 = 1e-12;
const POLAR_MAX_ITERATIONS: usize = 32;
const POLAR_TOLERANCE: f32 = 1e-6;

/// An affine transform with column vectors: `p' = linear * p + translation`.
/// The homogeneous row is always `[0, 0, 0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(from = "AffineRepr", into = "AffineRepr")]
pub struct Affine {
    pub linear: Mat3,
    pub translation: Vec3,
}

impl Affine {
    pub fn identity() -> Self {
        Self {
            linear: Mat3::identity(),
            translation: Vec3::zero(),
        }
    }

    pub fn from_linear(linear: Mat3, translation: Vec3) -> Self {
        Self {
            linear,
            translation,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            linear: Mat3::identity(),
            translation,
        }
    }

    pub fn from_scale(scale: Vec3) -> Self {
        Self::from_linear(Mat3::from_nonuniform_scale(scale), Vec3::zero())
    }

    /// The "3x4" form used by CAD SDKs: a row-major 3x3 rotation/scale block
    /// followed by the translation.
    pub fn from_3x4(m: [f32; 12]) -> Self {
        let linear = Mat3::new(
            Vec3::new(m[0], m[3], m[6]),
            Vec3::new(m[1], m[4], m[7]),
            Vec3::new(m[2], m[5], m[8]),
        );
        Self::from_linear(linear, Vec3::new(m[9], m[10], m[11]))
    }

    pub fn to_3x4(&self) -> [f32; 12] {
        let [c0, c1, c2] = self.linear.cols;
        let t = self.translation;
        [
            c0.x, c1.x, c2.x, //
            c0.y, c1.y, c2.y, //
            c0.z, c1.z, c2.z, //
            t.x, t.y, t.z,
        ]
    }

    /// Column-major 4x4, the layout glTF uses for node matrices.
    /// The bottom row is assumed to be `[0, 0, 0, 1]` and ignored.
    pub fn from_cols_array(cols: [[f32; 4]; 4]) -> Self {
        let column = |c: [f32; 4]| Vec3::new(c[0], c[1], c[2]);
        Self::from_linear(
            Mat3::new(column(cols[0]), column(cols[1]), column(cols[2])),
            column(cols[3]),
        )
    }

    pub fn to_cols_array(&self) -> [[f32; 4]; 4] {
        let [c0, c1, c2] = self.linear.cols;
        let t = self.translation;
        [
            [c0.x, c0.y, c0.z, 0.0],
            [c1.x, c1.y, c1.z, 0.0],
            [c2.x, c2.y, c2.z, 0.0],
            [t.x, t.y, t.z, 1.0],
        ]
    }

    pub fn to_mat4(&self) -> Mat4 {
        let [c0, c1, c2, c3] = self.to_cols_array();
        Mat4::new(
            Vec4::new(c0[0], c0[1], c0[2], c0[3]),
            Vec4::new(c1[0], c1[1], c1[2], c1[3]),
            Vec4::new(c2[0], c2[1], c2[2], c2[3]),
            Vec4::new(c3[0], c3[1], c3[2], c3[3]),
        )
    }

    /// Determinant of the linear part. Negative means the transform mirrors.
    pub fn determinant(&self) -> f32 {
        self.linear.determinant()
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.linear * point + self.translation
    }

    /// Applies only the linear part.
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.linear * vector
    }

    /// Inverse-transpose of the linear part, `None` for singular transforms.
    pub fn normal_matrix(&self) -> Option<Mat3> {
        inverse3(&self.linear).map(|inverse| inverse.transposed())
    }

    pub fn inversed(&self) -> Option<Affine> {
        let linear = inverse3(&self.linear)?;
        let translation = Vec3::zero() - linear * self.translation;
        Some(Self::from_linear(linear, translation))
    }

    pub fn approx_eq(&self, other: &Affine, epsilon: f32) -> bool {
        let linear_close = self
            .linear
            .cols
            .iter()
            .zip(other.linear.cols.iter())
            .all(|(a, b)| max_abs_component(*a - *b) <= epsilon);
        linear_close && max_abs_component(self.translation - other.translation) <= epsilon
    }

    pub fn is_identity(&self, epsilon: f32) -> bool {
        self.approx_eq(&Affine::identity(), epsilon)
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul<Affine> for Affine {
    type Output = Affine;

    fn mul(self, rhs: Affine) -> Self::Output {
        Affine {
            linear: self.linear * rhs.linear,
            translation: self.linear * rhs.translation + self.translation,
        }
    }
}

impl Mul<Affine> for &Affine {
    type Output = Affine;

    fn mul(self, rhs: Affine) -> Self::Output {
        *self * rhs
    }
}

impl From<Affine> for Mat4 {
    fn from(affine: Affine) -> Self {
        affine.to_mat4()
    }
}

#[derive(Clone, Copy, Deserialize, Serialize)]
struct AffineRepr {
    linear: [Vec3; 3],
    translation: Vec3,
}

impl From<AffineRepr> for Affine {
    fn from(repr: AffineRepr) -> Self {
        let [c0, c1, c2] = repr.linear;
        Affine::from_linear(Mat3::new(c0, c1, c2), repr.translation)
    }
}

impl From<Affine> for AffineRepr {
    fn from(affine: Affine) -> Self {
        AffineRepr {
            linear: affine.linear.cols,
            translation: affine.translation,
        }
    }
}

/// A transform split into the part that can be stored on a node and the part
/// that has to be applied to vertex data.
///
/// `representable * bake` reproduces the source transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decomposition {
    /// Orientation preserving, with a non-negative axis scale.
    pub representable: Affine,
    /// Residual that absorbs reflections and skew. Identity when nothing needs baking.
    pub bake: Affine,
}

impl Decomposition {
    pub fn unchanged(transform: Affine) -> Self {
        Self {
            representable: transform,
            bake: Affine::identity(),
        }
    }

    /// Meshes referenced through a transform that needs baking cannot be shared
    /// with other instances.
    pub fn needs_baking(&self) -> bool {
        !self.bake.is_identity(IDENTITY_EPSILON)
    }
}

/// Splits `transform` into a representable node transform and a bake transform.
///
/// Orientation preserving transforms are returned unchanged. Mirroring ones get
/// their rotation extracted, their remaining scale forced to a positive diagonal,
/// and everything else moved into the bake transform.
pub fn decompose(transform: &Affine) -> Decomposition {
    let m = transform.linear;
    let det = m.determinant();
    if det > 0.0 {
        return Decomposition::unchanged(*transform);
    }

    let Some(rotation) = polar_rotation(&m) else {
        log::warn!("Cannot decompose a singular transform, storing it unchanged");
        return Decomposition::unchanged(*transform);
    };

    let stretch = rotation.transposed() * m;
    let [s0, s1, s2] = stretch.cols;
    let sanitized = Mat3::from_nonuniform_scale(Vec3::new(s0.x.abs(), s1.y.abs(), s2.z.abs()));

    let representable = Affine::from_linear(rotation * sanitized, transform.translation);
    match representable.inversed() {
        Some(inverse) => Decomposition {
            representable,
            bake: inverse * *transform,
        },
        None => {
            log::warn!("Sanitized transform is singular, storing it unchanged");
            Decomposition::unchanged(*transform)
        }
    }
}

/// The proper rotation of the polar decomposition `m = Q * P`.
///
/// For mirroring input the orthogonal factor `Q` is improper. The mirror is then
/// removed along `Q`'s reflection axis, which keeps the rotation as close to `Q`
/// as possible and yields the identity for pure axis mirrors.
fn polar_rotation(m: &Mat3) -> Option<Mat3> {
    let mut q = *m;
    for _ in 0..POLAR_MAX_ITERATIONS {
        let inverse_transpose = inverse3(&q)?.transposed();
        let next = Mat3::new(
            (q.cols[0] + inverse_transpose.cols[0]) * 0.5,
            (q.cols[1] + inverse_transpose.cols[1]) * 0.5,
            (q.cols[2] + inverse_transpose.cols[2]) * 0.5,
        );
        let delta: f32 = (0..3).map(|i| (next.cols[i] - q.cols[i]).mag_sq()).sum();
        q = next;
        if delta.sqrt() < POLAR_TOLERANCE {
            break;
        }
    }

    if q.determinant() > 0.0 {
        return Some(q);
    }
    let axis = reflection_axis(&q);
    Some(q * householder(axis))
}

/// Eigenvector of an improper orthogonal matrix for the eigenvalue -1.
fn reflection_axis(q: &Mat3) -> Vec3 {
    // Null space of (Q + I), found from the rows of that matrix.
    let shifted = Mat3::new(
        q.cols[0] + Vec3::unit_x(),
        q.cols[1] + Vec3::unit_y(),
        q.cols[2] + Vec3::unit_z(),
    );
    let rows = shifted.transposed().cols;
    let candidates = [
        rows[0].cross(rows[1]),
        rows[1].cross(rows[2]),
        rows[2].cross(rows[0]),
    ];
    let best = candidates
        .into_iter()
        .max_by(|a, b| a.mag_sq().total_cmp(&b.mag_sq()))
        .unwrap_or_else(Vec3::unit_x);

    if best.mag_sq() > AXIS_EPSILON {
        best.normalized()
    } else {
        // Q == -I, every axis is mirrored.
        Vec3::unit_x()
    }
}

/// Reflection across the plane orthogonal to the unit vector `axis`.
fn householder(axis: Vec3) -> Mat3 {
    Mat3::new(
        Vec3::unit_x() - axis * (2.0 * axis.x),
        Vec3::unit_y() - axis * (2.0 * axis.y),
        Vec3::unit_z() - axis * (2.0 * axis.z),
    )
}

/// Inverse of `m`, `None` when `m` is singular relative to its own scale.
pub(crate) fn inverse3(m: &Mat3) -> Option<Mat3> {
    if is_singular(m) {
        return None;
    }
    Some(m.inversed())
}

fn is_singular(m: &Mat3) -> bool {
    let scale: f32 = m.cols.iter().map(|c| c.mag()).product();
    m.determinant().abs() <= SINGULAR_EPSILON * scale
}

fn max_abs_component(v: Vec3) -> f32 {
    v.x.abs().max(v.y.abs()).max(v.z.abs())
}
