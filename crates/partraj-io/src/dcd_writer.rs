//! DCD output: positions plus a CHARMM-layout unit cell per frame.

use std::io::Write;

use partraj_core::error::{TrajError, TrajResult};
use partraj_core::{Box3, FrameData, Trajectory};

const CHARMM_VERSION: i32 = 24;

fn write_record<W: Write + ?Sized>(out: &mut W, payload: &[u8]) -> TrajResult<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| TrajError::Validation("DCD record exceeds 4 GiB".into()))?;
    out.write_all(&len.to_le_bytes())?;
    out.write_all(payload)?;
    out.write_all(&len.to_le_bytes())?;
    Ok(())
}

fn f32_record(values: impl Iterator<Item = f64>) -> Vec<u8> {
    values.flat_map(|v| (v as f32).to_le_bytes()).collect()
}

/// `[A, cos gamma, B, cos beta, cos alpha, C]`
fn unit_cell(b: &Box3) -> [f64; 6] {
    let m = b.matrix();
    let col = |j: usize| [m[0][j], m[1][j], m[2][j]];
    let (a, bv, c) = (col(0), col(1), col(2));
    let norm = |v: [f64; 3]| (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    let dot = |u: [f64; 3], v: [f64; 3]| u[0] * v[0] + u[1] * v[1] + u[2] * v[2];
    let (la, lb, lc) = (norm(a), norm(bv), norm(c));
    [
        la,
        dot(a, bv) / (la * lb),
        lb,
        dot(a, c) / (la * lc),
        dot(bv, c) / (lb * lc),
        lc,
    ]
}

/// Third coordinate for a 2-D frame: the in-plane rotation angle.
fn planar_angles(data: &FrameData) -> Vec<f64> {
    match data.orientation() {
        Ok(q) => q.iter().map(|q| 2.0 * q[3].atan2(q[0])).collect(),
        Err(_) => vec![0.0; data.n_particles()],
    }
}

/// Writes every frame of `traj`. All frames must hold the same number of
/// particles and carry positions.
pub fn write_dcd<W: Write + ?Sized>(traj: &Trajectory, out: &mut W) -> TrajResult<()> {
    let n_frames = i32::try_from(traj.len())
        .map_err(|_| TrajError::Validation("too many frames for DCD".into()))?;
    let mut n_atoms = None;
    let mut header_written = false;

    for (i, frame) in traj.iter().enumerate() {
        let data = frame.data()?;
        let n = data.n_particles();
        match n_atoms {
            None => n_atoms = Some(n),
            Some(expected) if expected != n => {
                return Err(TrajError::Validation(format!(
                    "DCD needs a constant particle count; frame {i} has {n}, expected {expected}"
                )))
            }
            Some(_) => {}
        }
        if !header_written {
            write_header(out, n_frames, n)?;
            header_written = true;
        }

        let cell: Vec<u8> = unit_cell(data.box3()).iter().flat_map(|v| v.to_le_bytes()).collect();
        write_record(out, &cell)?;
        let positions = data.position()?;
        write_record(out, &f32_record(positions.iter().map(|p| p[0])))?;
        write_record(out, &f32_record(positions.iter().map(|p| p[1])))?;
        if data.box3().dimensions == 2 {
            write_record(out, &f32_record(planar_angles(&data).into_iter()))?;
        } else {
            write_record(out, &f32_record(positions.iter().map(|p| p[2])))?;
        }
    }
    if !header_written {
        return Err(TrajError::Validation("cannot write an empty trajectory as DCD".into()));
    }
    tracing::info!(frames = n_frames, "wrote dcd trajectory");
    Ok(())
}

fn write_header<W: Write + ?Sized>(out: &mut W, n_frames: i32, n_atoms: usize) -> TrajResult<()> {
    let n_atoms = i32::try_from(n_atoms)
        .map_err(|_| TrajError::Validation("too many particles for DCD".into()))?;
    let mut icntrl = [0i32; 20];
    icntrl[0] = n_frames;
    icntrl[2] = 1;
    icntrl[3] = n_frames;
    icntrl[10] = 1;
    icntrl[19] = CHARMM_VERSION;
    let mut header = Vec::with_capacity(84);
    header.extend_from_slice(b"CORD");
    for value in icntrl {
        header.extend_from_slice(&value.to_le_bytes());
    }
    write_record(out, &header)?;

    let mut title = Vec::with_capacity(84);
    title.extend_from_slice(&1i32.to_le_bytes());
    let mut line = [b' '; 80];
    let text = b"Created by partraj";
    line[..text.len()].copy_from_slice(text);
    title.extend_from_slice(&line);
    write_record(out, &title)?;

    write_record(out, &n_atoms.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::dcd::{read_dcd, DcdTopology};
    use partraj_core::quat::IDENTITY;
    use partraj_core::{Dtype, Frame, RawFrameRecord, ShapeVariant};

    fn frame(n: usize, box3: Box3, orientation: Option<Vec<[f64; 4]>>) -> Frame {
        Frame::from_raw(RawFrameRecord {
            box_matrix: Some(box3.matrix()),
            box_dimensions: box3.dimensions,
            types: vec!["A".into()],
            type_shapes: vec![ShapeVariant::default()],
            typeid: vec![0; n],
            position: Some((0..n).map(|i| [i as f64, 0.5 * i as f64, if box3.dimensions == 2 { 0.0 } else { 1.0 }]).collect()),
            orientation,
            ..Default::default()
        })
        .with_dtype(Dtype::Float64)
        .unwrap()
    }

    #[test]
    fn triclinic_cell_round_trips() {
        let box3 = Box3 {
            xy: 0.3,
            xz: -0.2,
            yz: 0.1,
            ..Box3::orthorhombic(8.0, 9.0, 10.0)
        };
        let traj: Trajectory = vec![frame(3, box3, None), frame(3, box3, None)].into_iter().collect();
        let mut bytes = Vec::new();
        write_dcd(&traj, &mut bytes).unwrap();

        let back = read_dcd(Cursor::new(bytes), DcdTopology::default()).unwrap();
        assert_eq!(back.len(), 2);
        let data = back.frame(1).unwrap().data().unwrap();
        assert!(data.box3().is_close(&box3, 1e-5));
        assert_eq!(data.position().unwrap()[2], [2.0, 1.0, 1.0]);
    }

    #[test]
    fn ragged_particle_counts_are_rejected() {
        let traj: Trajectory = vec![
            frame(2, Box3::cubic(5.0), None),
            frame(3, Box3::cubic(5.0), None),
        ]
        .into_iter()
        .collect();
        let mut bytes = Vec::new();
        assert!(matches!(write_dcd(&traj, &mut bytes), Err(TrajError::Validation(_))));
        assert!(matches!(
            write_dcd(&Trajectory::default(), &mut Vec::new()),
            Err(TrajError::Validation(_))
        ));
    }

    #[test]
    fn planar_orientation_becomes_the_third_coordinate() {
        let half = std::f64::consts::FRAC_PI_8;
        let q = [half.cos(), 0.0, 0.0, half.sin()];
        let f = frame(2, Box3::square(6.0, 6.0, 0.0), Some(vec![q, IDENTITY]));
        let traj: Trajectory = std::iter::once(f).collect();
        let mut bytes = Vec::new();
        write_dcd(&traj, &mut bytes).unwrap();

        let template = traj.frame(0).unwrap().data().unwrap();
        let back = read_dcd(Cursor::new(bytes), DcdTopology::Template(template)).unwrap();
        let data = back.frame(0).unwrap().data().unwrap();
        assert_eq!(data.box3().dimensions, 2);
        assert_eq!(data.position().unwrap()[1][2], 0.0);
        let read = data.orientation().unwrap()[0];
        for k in 0..4 {
            assert!((read[k] - q[k]).abs() < 1e-6);
        }
    }
}
