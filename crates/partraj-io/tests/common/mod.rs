#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use partraj_core::quat::IDENTITY;
use partraj_core::{Box3, Dtype, Frame, RawFrameRecord, ShapeVariant, Trajectory};
use tempfile::TempDir;

pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("create temp dir")
}

pub fn write_text(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write temp file");
    path
}

pub fn read_text(path: &Path) -> String {
    fs::read_to_string(path).expect("read temp file")
}

/// Routes `tracing` output to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Frame with an ellipsoid type `A` and a sphere type `B`.
pub fn mixed_frame(step: usize, box3: Box3) -> Frame {
    let n = 4;
    let offset = step as f64 * 0.25;
    let half = 0.3f64;
    Frame::from_raw(RawFrameRecord {
        box_matrix: Some(box3.matrix()),
        box_dimensions: box3.dimensions,
        types: vec!["A".into(), "B".into()],
        type_shapes: vec![
            ShapeVariant::Ellipsoid {
                a: 0.5,
                b: 0.25,
                c: 0.125,
                color: Some("FF0000FF".into()),
            },
            ShapeVariant::Sphere {
                diameter: 2.0,
                color: Some("005984FF".into()),
            },
        ],
        typeid: vec![0, 1, 0, 1],
        position: Some(
            (0..n)
                .map(|i| [i as f64 + offset, -(i as f64) * 0.5, 1.0 + offset])
                .collect(),
        ),
        orientation: Some(vec![
            IDENTITY,
            IDENTITY,
            [half.cos(), 0.0, half.sin(), 0.0],
            IDENTITY,
        ]),
        ..Default::default()
    })
    .with_dtype(Dtype::Float64)
    .expect("dtype")
}

pub fn mixed_trajectory(frames: usize) -> Trajectory {
    (0..frames)
        .map(|step| mixed_frame(step, Box3::orthorhombic(10.0, 11.0, 12.0)))
        .collect()
}
