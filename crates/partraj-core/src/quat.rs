//! Quaternion helpers on plain `[w, x, y, z]` arrays.
//!
//! Per-particle orientations and angular momenta are stored as `[f64; 4]`
//! rows, so the math here works on arrays directly instead of wrapping each
//! row in a type.

use nalgebra::{Quaternion as NaQuaternion, UnitQuaternion};

pub type Quat = [f64; 4];

pub const IDENTITY: Quat = [1.0, 0.0, 0.0, 0.0];

pub fn multiply(a: Quat, b: Quat) -> Quat {
    let [aw, ax, ay, az] = a;
    let [bw, bx, by, bz] = b;
    [
        aw * bw - ax * bx - ay * by - az * bz,
        aw * bx + ax * bw + ay * bz - az * by,
        aw * by - ax * bz + ay * bw + az * bx,
        aw * bz + ax * by - ay * bx + az * bw,
    ]
}

pub fn conjugate(q: Quat) -> Quat {
    [q[0], -q[1], -q[2], -q[3]]
}

pub fn inverse(q: Quat) -> Quat {
    let n2 = q.iter().map(|v| v * v).sum::<f64>();
    if n2 == 0.0 {
        return IDENTITY;
    }
    let c = conjugate(q);
    [c[0] / n2, c[1] / n2, c[2] / n2, c[3] / n2]
}

pub fn normalize(q: Quat) -> Quat {
    let norm = q.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        [q[0] / norm, q[1] / norm, q[2] / norm, q[3] / norm]
    } else {
        IDENTITY
    }
}

/// Rotates `v` by the unit quaternion `q`.
pub fn rotate(q: Quat, v: [f64; 3]) -> [f64; 3] {
    let s = q[0];
    let u = [q[1], q[2], q[3]];
    let uv = dot(u, v);
    let uu = dot(u, u);
    let c = cross(u, v);
    [
        2.0 * uv * u[0] + (s * s - uu) * v[0] + 2.0 * s * c[0],
        2.0 * uv * u[1] + (s * s - uu) * v[1] + 2.0 * s * c[1],
        2.0 * uv * u[2] + (s * s - uu) * v[2] + 2.0 * s * c[2],
    ]
}

pub fn to_matrix(q: Quat) -> [[f64; 3]; 3] {
    let [w, x, y, z] = q;
    let (xx, yy, zz) = (x * x, y * y, z * z);
    let (xy, xz, yz) = (x * y, x * z, y * z);
    let (wx, wy, wz) = (w * x, w * y, w * z);
    [
        [1.0 - 2.0 * (yy + zz), 2.0 * (xy - wz), 2.0 * (xz + wy)],
        [2.0 * (xy + wz), 1.0 - 2.0 * (xx + zz), 2.0 * (yz - wx)],
        [2.0 * (xz - wy), 2.0 * (yz + wx), 1.0 - 2.0 * (xx + yy)],
    ]
}

/// Unit quaternion of a proper rotation matrix. The sign is chosen so that
/// `w >= 0` where possible.
pub fn from_matrix(m: &[[f64; 3]; 3]) -> Quat {
    let trace = m[0][0] + m[1][1] + m[2][2];
    let q = if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        [
            0.25 * s,
            (m[2][1] - m[1][2]) / s,
            (m[0][2] - m[2][0]) / s,
            (m[1][0] - m[0][1]) / s,
        ]
    } else if m[0][0] > m[1][1] && m[0][0] > m[2][2] {
        let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt() * 2.0;
        [
            (m[2][1] - m[1][2]) / s,
            0.25 * s,
            (m[0][1] + m[1][0]) / s,
            (m[0][2] + m[2][0]) / s,
        ]
    } else if m[1][1] > m[2][2] {
        let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt() * 2.0;
        [
            (m[0][2] - m[2][0]) / s,
            (m[0][1] + m[1][0]) / s,
            0.25 * s,
            (m[1][2] + m[2][1]) / s,
        ]
    } else {
        let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt() * 2.0;
        [
            (m[1][0] - m[0][1]) / s,
            (m[0][2] + m[2][0]) / s,
            (m[1][2] + m[2][1]) / s,
            0.25 * s,
        ]
    };
    let q = normalize(q);
    if q[0] < 0.0 {
        [-q[0], -q[1], -q[2], -q[3]]
    } else {
        q
    }
}

/// Extrinsic X-Y-Z Euler angles in degrees to a unit quaternion.
pub fn from_euler_xyz_degrees(angles: [f64; 3]) -> Quat {
    let uq = UnitQuaternion::from_euler_angles(
        angles[0].to_radians(),
        angles[1].to_radians(),
        angles[2].to_radians(),
    );
    let q = uq.quaternion();
    [q.w, q.i, q.j, q.k]
}

/// Inverse of [`from_euler_xyz_degrees`].
pub fn to_euler_xyz_degrees(q: Quat) -> [f64; 3] {
    let uq = UnitQuaternion::from_quaternion(NaQuaternion::new(q[0], q[1], q[2], q[3]));
    let (roll, pitch, yaw) = uq.euler_angles();
    [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()]
}

pub(crate) fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}
