//! Writer for the textual POS dialect.

use std::io::Write;

use partraj_core::box3::round_to;
use partraj_core::error::TrajResult;
use partraj_core::quat::{self, Quat, IDENTITY};
use partraj_core::{FrameData, ShapeVariant, Trajectory};

use crate::config::{WriteOptions, POS_FLOAT_DIGITS};

/// Integral values print without a fractional part, everything else is
/// rounded to the digits the reader keeps.
fn num(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        // +0.0 folds a rounded -0.0 into 0
        format!("{}", round_to(value, POS_FLOAT_DIGITS) + 0.0)
    }
}

fn join(values: impl IntoIterator<Item = f64>) -> String {
    values.into_iter().map(num).collect::<Vec<_>>().join(" ")
}

pub fn write_pos<W: Write + ?Sized>(traj: &Trajectory, out: &mut W, options: &WriteOptions) -> TrajResult<()> {
    if options.rotate {
        tracing::warn!("baking the view rotation into coordinates loses numerical precision");
    }
    let mut written = 0usize;
    for (i, frame) in traj.iter().enumerate() {
        let data = frame.data()?;
        write_frame(&data, out, options.rotate)?;
        tracing::debug!(frame = i, "wrote pos frame");
        written += 1;
    }
    tracing::info!(frames = written, "wrote pos trajectory");
    Ok(())
}

/// Serializes `traj` into a string.
pub fn dump_pos(traj: &Trajectory, options: &WriteOptions) -> TrajResult<String> {
    let mut buf = Vec::new();
    write_pos(traj, &mut buf, options)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn write_frame<W: Write + ?Sized>(data: &FrameData, out: &mut W, rotate: bool) -> TrajResult<()> {
    if let Some(table) = data.metadata() {
        writeln!(out, "#[data] {}", table.columns().join(" "))?;
        for row in table.rows() {
            writeln!(out, "{}", row.join(" "))?;
        }
        writeln!(out, "#[done]")?;
    }

    // Positions are written in the view frame; the reader undoes the rotation.
    let view = data.view_rotation();
    let mut matrix = data.box3().matrix();
    match view {
        Some(q) if rotate => {
            for col in 0..3 {
                let v = quat::rotate(q, [matrix[0][col], matrix[1][col], matrix[2][col]]);
                for (row, value) in v.into_iter().enumerate() {
                    matrix[row][col] = value;
                }
            }
        }
        Some(q) => writeln!(out, "rotation {}", join(quat::to_euler_xyz_degrees(q)))?,
        None => {}
    }
    writeln!(out, "boxMatrix {}", join(matrix.into_iter().flatten()))?;

    for (name, shape) in data.types().iter().zip(data.type_shapes()) {
        writeln!(out, "def {name} \"{}\"", shape.render())?;
    }

    let positions = data.position()?;
    let orientations = data.orientation().ok();
    for (i, (&typeid, &pos)) in data.typeid().iter().zip(positions).enumerate() {
        let name = &data.types()[typeid as usize];
        let mut q: Quat = orientations.map_or(IDENTITY, |o| o[i]);
        let pos = match view {
            Some(v) => {
                if rotate {
                    q = quat::multiply(v, q);
                }
                quat::rotate(v, pos)
            }
            None => pos,
        };
        let fields = match &data.type_shapes()[typeid as usize] {
            ShapeVariant::Sphere { .. } => join(pos),
            ShapeVariant::Arrow { .. } => join(pos.into_iter().chain(q[..3].iter().copied())),
            _ => join(pos.into_iter().chain(q)),
        };
        writeln!(out, "{name} {fields}")?;
    }
    writeln!(out, "eof")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::config::ReadOptions;
    use crate::pos::read_pos;
    use partraj_core::{Box3, Dtype, Frame, MetadataTable, RawFrameRecord};

    fn frame(shape: ShapeVariant, view_rotation: Option<Quat>) -> Frame {
        Frame::from_raw(RawFrameRecord {
            box_matrix: Some(Box3::orthorhombic(10.0, 12.0, 14.0).matrix()),
            types: vec!["A".into()],
            type_shapes: vec![shape],
            typeid: vec![0, 0],
            position: Some(vec![[1.0, 2.0, 3.0], [-0.25, 0.5, 1.5]]),
            orientation: Some(vec![IDENTITY, [0.0, 1.0, 0.0, 0.0]]),
            view_rotation,
            ..Default::default()
        })
        .with_dtype(Dtype::Float64)
        .unwrap()
    }

    fn dump(frames: Vec<Frame>, rotate: bool) -> String {
        let traj: Trajectory = frames.into_iter().collect();
        dump_pos(&traj, &WriteOptions { rotate, ..Default::default() }).unwrap()
    }

    #[test]
    fn integral_numbers_drop_the_fraction() {
        assert_eq!(num(3.0), "3");
        assert_eq!(num(-0.0), "0");
        assert_eq!(num(0.1 + 0.2), "0.3");
        assert_eq!(num(1.5), "1.5");
    }

    #[test]
    fn spheres_write_positions_only() {
        let text = dump(vec![frame(ShapeVariant::default(), None)], false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "boxMatrix 10 0 0 0 12 0 0 0 14",
                "def A \"sphere 1 005984FF\"",
                "A 1 2 3",
                "A -0.25 0.5 1.5",
                "eof",
            ]
        );
    }

    #[test]
    fn arrows_and_polyhedra_carry_orientation() {
        let arrow = ShapeVariant::Arrow {
            thickness: 0.2,
            color: None,
        };
        let text = dump(vec![frame(arrow, None)], false);
        assert!(text.contains("\nA -0.25 0.5 1.5 0 1 0\n"));

        let ellipsoid = ShapeVariant::Ellipsoid {
            a: 1.0,
            b: 2.0,
            c: 3.0,
            color: None,
        };
        let text = dump(vec![frame(ellipsoid, None)], false);
        assert!(text.contains("\nA 1 2 3 1 0 0 0\n"));
        assert!(text.contains("\nA -0.25 0.5 1.5 0 1 0 0\n"));
    }

    #[test]
    fn metadata_block_precedes_the_box() {
        let mut f = frame(ShapeVariant::default(), None);
        let mut table = MetadataTable::new(["id", "tag"]);
        table.push_row(&["1", "x"]);
        table.push_row(&["2", "y"]);
        f.set_metadata(Some(table)).unwrap();
        let text = dump(vec![f], false);
        assert!(text.starts_with("#[data] id tag\n1 x\n2 y\n#[done]\nboxMatrix"));
    }

    #[test]
    fn view_rotation_survives_a_round_trip() {
        let view = quat::from_euler_xyz_degrees([0.0, 0.0, 90.0]);
        let text = dump(vec![frame(ShapeVariant::default(), Some(view))], false);
        assert!(text.starts_with("rotation 0 0 90\n"));

        let traj = read_pos(Cursor::new(text.into_bytes()), &ReadOptions {
            dtype: Dtype::Float64,
            ..Default::default()
        })
        .unwrap();
        let data = traj.frame(0).unwrap().data().unwrap();
        let expected = [[1.0, 2.0, 3.0], [-0.25, 0.5, 1.5]];
        for (p, e) in data.position().unwrap().iter().zip(expected) {
            for k in 0..3 {
                assert!((p[k] - e[k]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn rotate_mode_bakes_the_view_into_the_box() {
        let view = quat::from_euler_xyz_degrees([0.0, 0.0, 90.0]);
        let text = dump(vec![frame(ShapeVariant::default(), Some(view))], true);
        assert!(!text.contains("rotation"));
        let box_line = text.lines().find(|l| l.starts_with("boxMatrix")).unwrap();
        let values: Vec<f64> = box_line
            .split_whitespace()
            .skip(1)
            .map(|t| t.parse().unwrap())
            .collect();
        // a = (10, 0, 0) becomes (0, 10, 0)
        assert!(values[0].abs() < 1e-9 && (values[3] - 10.0).abs() < 1e-9);
    }
}
