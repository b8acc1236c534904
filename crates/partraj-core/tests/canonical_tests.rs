mod common;

use common::{distance, random_lattice, random_positions, rng};
use partraj_core::canonical::{canonical_box, canonicalize, QuatFields, VectorFields, CANONICAL_TOL};
use partraj_core::quat;

fn det(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

#[test]
fn canonicalization_is_idempotent() {
    let mut rng = rng(7);
    for _ in 0..50 {
        let raw = random_lattice(&mut rng);
        let once = canonical_box(&raw, 3).unwrap();
        let again = canonicalize(
            &once.matrix(),
            3,
            VectorFields::default(),
            QuatFields::default(),
        )
        .unwrap();
        assert!(!again.rotated);
        assert!(again.box3.is_close(&once, 1e-9));
    }
}

#[test]
fn canonical_box_is_upper_triangular_and_right_handed() {
    let mut rng = rng(11);
    for _ in 0..50 {
        let raw = random_lattice(&mut rng);
        let b = canonical_box(&raw, 3).unwrap();
        let m = b.matrix();
        assert!(b.lx > 0.0 && b.ly > 0.0 && b.lz > 0.0);
        assert_eq!((m[1][0], m[2][0], m[2][1]), (0.0, 0.0, 0.0));
        assert!((b.volume() - det(&raw).abs()).abs() < 1e-8 * b.volume());
    }
}

#[test]
fn rotation_preserves_distances() {
    let mut rng = rng(23);
    for _ in 0..20 {
        let raw = random_lattice(&mut rng);
        let positions = random_positions(&mut rng, 6);
        let orientations: Vec<_> = (0..6)
            .map(|i| quat::from_euler_xyz_degrees([10.0 * i as f64, 5.0, -20.0]))
            .collect();
        let out = canonicalize(
            &raw,
            3,
            VectorFields {
                positions: Some(positions.as_slice()),
                velocities: None,
            },
            QuatFields {
                orientations: Some(orientations.as_slice()),
                angmom: None,
            },
        )
        .unwrap();
        let moved = out.positions.unwrap();
        for i in 0..positions.len() {
            for j in 0..positions.len() {
                let before = distance(positions[i], positions[j]);
                let after = distance(moved[i], moved[j]);
                assert!((before - after).abs() < 1e-9);
            }
            assert!((distance(positions[i], [0.0; 3]) - distance(moved[i], [0.0; 3])).abs() < 1e-9);
        }
        for q in out.orientations.unwrap().iter() {
            let norm: f64 = q.iter().map(|v| v * v).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }
}

#[test]
fn particle_lattice_coordinates_survive() {
    // A particle sitting on the first lattice vector stays on it.
    let mut rng = rng(5);
    for _ in 0..20 {
        let raw = random_lattice(&mut rng);
        let a = [raw[0][0], raw[1][0], raw[2][0]];
        let positions = vec![a];
        let out = canonicalize(
            &raw,
            3,
            VectorFields {
                positions: Some(positions.as_slice()),
                velocities: None,
            },
            QuatFields::default(),
        )
        .unwrap();
        let p = out.positions.unwrap()[0];
        assert!((p[0] - out.box3.lx).abs() < 1e-9);
        assert!(p[1].abs() < 1e-9 && p[2].abs() < 1e-9);
    }
}

#[test]
fn near_identity_factor_is_not_rotated() {
    let raw = [[5.0, 1.0, 0.5], [0.0, 4.0, 0.25], [0.0, 0.0, 3.0]];
    let positions = vec![[1.0, 1.0, 1.0]];
    let out = canonicalize(
        &raw,
        3,
        VectorFields {
            positions: Some(positions.as_slice()),
            velocities: None,
        },
        QuatFields::default(),
    )
    .unwrap();
    assert!(!out.rotated);
    assert!((out.box3.xy - 0.25).abs() < CANONICAL_TOL);
    assert_eq!(out.positions.unwrap()[0], [1.0, 1.0, 1.0]);
}
