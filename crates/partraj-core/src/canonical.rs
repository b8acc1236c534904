//! Reduction of an arbitrary lattice matrix to canonical box form.
//!
//! The raw matrix is factored as `Q·R`. When `Q` is not already the identity
//! on the active dimensions, every vector field is re-expressed in the frame
//! of `R` and every quaternion field is rotated along with it. Fields that do
//! not need rotation are handed back borrowed.

use std::borrow::Cow;

use nalgebra::Matrix3;

use crate::box3::{Box3, LZ_2D};
use crate::error::{TrajError, TrajResult};
use crate::quat::{self, Quat};

/// Absolute tolerance for identity and zero tests.
pub const CANONICAL_TOL: f64 = 1e-6;

const SINGULAR_TOL: f64 = 1e-12;

#[derive(Clone, Copy, Debug, Default)]
pub struct VectorFields<'a> {
    pub positions: Option<&'a [[f64; 3]]>,
    pub velocities: Option<&'a [[f64; 3]]>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct QuatFields<'a> {
    pub orientations: Option<&'a [Quat]>,
    pub angmom: Option<&'a [Quat]>,
}

#[derive(Clone, Debug)]
pub struct Canonical<'a> {
    pub box3: Box3,
    pub positions: Option<Cow<'a, [[f64; 3]]>>,
    pub velocities: Option<Cow<'a, [[f64; 3]]>>,
    pub orientations: Option<Cow<'a, [Quat]>>,
    pub angmom: Option<Cow<'a, [Quat]>>,
    /// Whether a rotation was applied. When false every field is borrowed.
    pub rotated: bool,
}

pub fn canonicalize<'a>(
    raw: &[[f64; 3]; 3],
    dimensions: u8,
    vectors: VectorFields<'a>,
    quats: QuatFields<'a>,
) -> TrajResult<Canonical<'a>> {
    if !matches!(dimensions, 2 | 3) {
        return Err(TrajError::Parse(format!(
            "box dimensions must be 2 or 3, got {dimensions}"
        )));
    }
    if raw.iter().flatten().any(|v| !v.is_finite()) {
        return Err(TrajError::Parse("box matrix contains non-finite values".into()));
    }
    let raw = if dimensions == 2 { planar(raw) } else { *raw };
    let m = Matrix3::from_fn(|i, j| raw[i][j]);

    let qr = m.qr();
    let mut q = qr.q();
    let mut r = qr.r();
    for i in 0..3 {
        if r[(i, i)].abs() < SINGULAR_TOL {
            return Err(TrajError::Parse(format!(
                "box matrix is singular: {raw:?}"
            )));
        }
        // Householder signs are arbitrary; fix them so R has a positive
        // diagonal before comparing Q against the identity.
        if r[(i, i)] < 0.0 {
            for k in 0..3 {
                q[(k, i)] = -q[(k, i)];
                r[(i, k)] = -r[(i, k)];
            }
        }
    }

    let d = dimensions as usize;
    let is_identity = (0..d).all(|i| (0..d).all(|j| {
        let expected = if i == j { 1.0 } else { 0.0 };
        (q[(i, j)] - expected).abs() <= CANONICAL_TOL
    }));
    if is_identity {
        let box3 = decompose(&raw, dimensions)?;
        return Ok(Canonical {
            box3,
            positions: vectors.positions.map(Cow::Borrowed),
            velocities: vectors.velocities.map(Cow::Borrowed),
            orientations: quats.orientations.map(Cow::Borrowed),
            angmom: quats.angmom.map(Cow::Borrowed),
            rotated: false,
        });
    }

    if q.determinant() < 0.0 {
        if dimensions == 2 {
            // The reflection lives in the xy block; flip the second in-plane
            // axis so the rotation stays about z.
            for k in 0..3 {
                q[(k, 1)] = -q[(k, 1)];
                r[(1, k)] = -r[(1, k)];
            }
        } else {
            q = -q;
            r = -r;
        }
    }

    let signs: [f64; 3] = [0usize, 1, 2].map(|i| if r[(i, i)] < 0.0 { -1.0 } else { 1.0 });
    // Row vectors transform as v' = v·Q·S.
    let transform: [[f64; 3]; 3] = [0usize, 1, 2].map(|i| [0usize, 1, 2].map(|j| q[(i, j)] * signs[j]));
    let canonical: [[f64; 3]; 3] = [0usize, 1, 2].map(|i| [0usize, 1, 2].map(|j| r[(i, j)] * signs[j]));

    let qt = q.transpose();
    let rotation = quat::from_matrix(&[0usize, 1, 2].map(|i| [0usize, 1, 2].map(|j| qt[(i, j)])));

    let box3 = decompose(&canonical, dimensions)?;
    tracing::debug!(?rotation, "rotated frame into canonical box orientation");
    Ok(Canonical {
        box3,
        positions: vectors.positions.map(|v| Cow::Owned(apply_vectors(v, &transform))),
        velocities: vectors.velocities.map(|v| Cow::Owned(apply_vectors(v, &transform))),
        orientations: quats.orientations.map(|x| Cow::Owned(apply_quats(x, rotation))),
        angmom: quats.angmom.map(|x| Cow::Owned(apply_quats(x, rotation))),
        rotated: true,
    })
}

/// Canonicalizes a matrix without any particle fields attached.
pub fn canonical_box(raw: &[[f64; 3]; 3], dimensions: u8) -> TrajResult<Box3> {
    Ok(canonicalize(raw, dimensions, VectorFields::default(), QuatFields::default())?.box3)
}

// 2-D lattices live in the xy plane; the z axis is completed with the
// conventional length so the factorization never mixes it in.
fn planar(raw: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let lz = if raw[2][2].abs() <= CANONICAL_TOL {
        LZ_2D
    } else {
        raw[2][2].abs()
    };
    [
        [raw[0][0], raw[0][1], 0.0],
        [raw[1][0], raw[1][1], 0.0],
        [0.0, 0.0, lz],
    ]
}

fn decompose(m: &[[f64; 3]; 3], dimensions: u8) -> TrajResult<Box3> {
    let (lx, ly, lz) = (m[0][0], m[1][1], m[2][2]);
    if lx <= 0.0 || ly <= 0.0 || lz <= 0.0 {
        return Err(TrajError::Parse(format!(
            "box matrix has non-positive diagonal ({lx}, {ly}, {lz})"
        )));
    }
    let mut b = Box3 {
        lx,
        ly,
        lz,
        xy: m[0][1] / ly,
        xz: m[0][2] / lz,
        yz: m[1][2] / lz,
        dimensions,
    };
    if dimensions == 2 {
        b.xz = 0.0;
        b.yz = 0.0;
    }
    Ok(b)
}

fn apply_vectors(values: &[[f64; 3]], t: &[[f64; 3]; 3]) -> Vec<[f64; 3]> {
    values
        .iter()
        .map(|v| {
            [0usize, 1, 2].map(|j| v[0] * t[0][j] + v[1] * t[1][j] + v[2] * t[2][j])
        })
        .collect()
}

fn apply_quats(values: &[Quat], rotation: Quat) -> Vec<Quat> {
    values.iter().map(|&x| quat::multiply(rotation, x)).collect()
}
