#![allow(dead_code)]

use partraj_core::{Box3, Frame, RawFrameRecord, ShapeVariant};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Well-conditioned lattice with arbitrary orientation and handedness.
pub fn random_lattice(rng: &mut StdRng) -> [[f64; 3]; 3] {
    let mut m = [[0.0; 3]; 3];
    for row in m.iter_mut() {
        for v in row.iter_mut() {
            *v = rng.gen_range(-2.0..2.0);
        }
    }
    let scale = rng.gen_range(4.0..9.0);
    let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
    for (i, row) in m.iter_mut().enumerate() {
        row[i] += sign * scale;
    }
    m
}

pub fn random_positions(rng: &mut StdRng, n: usize) -> Vec<[f64; 3]> {
    (0..n)
        .map(|_| [0usize, 1, 2].map(|_| rng.gen_range(-3.0..3.0)))
        .collect()
}

pub fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// Frame of `n` particles of two types in a cubic box of edge 10.
pub fn sample_raw(n: usize) -> RawFrameRecord {
    RawFrameRecord {
        box_matrix: Some(Box3::cubic(10.0).matrix()),
        types: vec!["A".into(), "B".into()],
        type_shapes: vec![
            ShapeVariant::default(),
            ShapeVariant::Sphere {
                diameter: 2.0,
                color: Some("FF0000FF".into()),
            },
        ],
        typeid: (0..n).map(|i| (i % 2) as u32).collect(),
        position: Some((0..n).map(|i| [i as f64, 0.5, -0.5]).collect()),
        orientation: Some(vec![[0.0, 0.0, 1.0, 0.0]; n]),
        velocity: Some(vec![[0.25, 0.0, 0.0]; n]),
        mass: Some(vec![3.0; n]),
        charge: Some(vec![-1.0; n]),
        diameter: Some(vec![0.5; n]),
        moment_inertia: Some(vec![[2.0, 2.0, 2.0]; n]),
        angmom: Some(vec![[0.0, 0.0, 0.0, 1.0]; n]),
        image: Some(vec![[1, 0, -1]; n]),
        ..Default::default()
    }
}

pub fn sample_frame(n: usize) -> Frame {
    Frame::from_raw(sample_raw(n))
}
