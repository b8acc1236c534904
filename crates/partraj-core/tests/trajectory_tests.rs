mod common;

use common::{sample_frame, sample_raw};
use partraj_core::trajectory::fill;
use partraj_core::{Dtype, Frame, FrameData, Property, TrajError, Trajectory};

#[test]
fn padding_uses_documented_fill_values() {
    let mut traj: Trajectory = [2usize, 5, 3].into_iter().map(sample_frame).collect();
    traj.load_arrays().unwrap();
    assert_eq!(traj.n_max().unwrap(), 5);
    assert_eq!(traj.n_per_frame().unwrap(), vec![2, 5, 3]);

    let pos = traj.positions().unwrap();
    assert_eq!(pos.n_frames(), 3);
    assert_eq!(pos.frame(0).unwrap()[1], [1.0, 0.5, -0.5]);
    assert!(pos.frame(0).unwrap()[2..].iter().all(|&p| p == fill::POSITION));
    assert!(traj.velocities().unwrap().frame(0).unwrap()[2..]
        .iter()
        .all(|&v| v == fill::VELOCITY));
    assert!(traj.orientations().unwrap().frame(0).unwrap()[2..]
        .iter()
        .all(|&q| q == [1.0, 0.0, 0.0, 0.0]));
    assert!(traj.angmom().unwrap().frame(0).unwrap()[2..]
        .iter()
        .all(|&q| q == [1.0, 0.0, 0.0, 0.0]));
    assert_eq!(&traj.mass().unwrap().frame(0).unwrap()[2..], &[1.0; 3]);
    assert_eq!(&traj.diameter().unwrap().frame(0).unwrap()[2..], &[1.0; 3]);
    assert_eq!(&traj.charge().unwrap().frame(0).unwrap()[2..], &[0.0; 3]);
    assert!(traj.moment_inertia().unwrap().frame(0).unwrap()[2..]
        .iter()
        .all(|&m| m == [1.0, 1.0, 1.0]));
    assert!(traj.image().unwrap().frame(0).unwrap()[2..]
        .iter()
        .all(|&i| i == [0, 0, 0]));
    assert_eq!(traj.mass().unwrap().frame(2).unwrap(), &[3.0, 3.0, 3.0, 1.0, 1.0]);
    assert_eq!(traj.type_ids().unwrap().frame(0).unwrap(), &[0, 1, 0, 0, 0]);
}

#[test]
fn missing_property_in_one_frame_hides_it_from_the_trajectory() {
    let mut raw = sample_raw(3);
    raw.charge = None;
    let mut traj = Trajectory::new(vec![sample_frame(2), Frame::from_raw(raw)]);
    traj.load_arrays().unwrap();
    assert!(matches!(traj.charge(), Err(TrajError::NotAvailable(_))));
    assert!(traj.mass().is_ok());
    let first = traj.frame(0).unwrap().data().unwrap();
    assert!(first.has(Property::Charge));
    assert_eq!(first.charge().unwrap(), &[-1.0, -1.0]);
}

#[test]
fn lazy_and_eager_frames_agree() {
    for dtype in [Dtype::Float32, Dtype::Float64] {
        let lazy = sample_frame(4).with_dtype(dtype).unwrap();
        let eager = Frame::from_data(FrameData::from_raw(sample_raw(4), dtype).unwrap());
        assert!(!lazy.is_loaded());
        assert!(eager.is_loaded());
        assert_eq!(lazy, eager);

        let mut traj = Trajectory::with_dtype(vec![sample_frame(4)], dtype).unwrap();
        traj.load_arrays().unwrap();
        assert!(!traj.frame(0).unwrap().is_loaded());
        let stacked = traj.positions().unwrap().frame(0).unwrap().to_vec();
        assert_eq!(stacked, eager.data().unwrap().position().unwrap().to_vec());
    }
}

#[test]
fn lazy_iteration_matches_iteration_after_load() {
    let mut traj: Trajectory = [3usize, 1, 4].into_iter().map(sample_frame).collect();
    let lazy: Vec<_> = traj.iter().map(|f| f.data().unwrap()).collect();
    assert!(traj.frames().iter().all(|f| !f.is_loaded()));

    traj.load().unwrap();
    let eager: Vec<_> = traj.iter().map(|f| f.data().unwrap()).collect();
    assert!(traj.frames().iter().all(Frame::is_loaded));
    assert_eq!(lazy.len(), eager.len());
    for (a, b) in lazy.iter().zip(&eager) {
        assert_eq!(**a, **b);
    }
}

#[test]
fn full_load_keeps_frames_resident() {
    let mut traj: Trajectory = (1..4).map(sample_frame).collect();
    traj.load().unwrap();
    assert!(traj.frames().iter().all(Frame::is_loaded));
    assert!(traj.arrays_loaded());
    assert!(traj.set_dtype(Dtype::Float64).is_err());
}

#[test]
fn empty_trajectory_materializes_nothing() {
    let mut traj = Trajectory::default();
    traj.load_arrays().unwrap();
    assert_eq!(traj.n_per_frame().unwrap(), Vec::<usize>::new());
    assert!(matches!(traj.positions(), Err(TrajError::NotAvailable(_))));
    assert!(traj.iter().next().is_none());
}
