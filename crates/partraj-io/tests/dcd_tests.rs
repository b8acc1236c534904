use std::fs::File;
use std::rc::Rc;

use partraj_core::{Box3, TrajError};
use partraj_io::{read_dcd, read_path, write_path, DcdReader, DcdTopology, Format, ReadOptions, TrajectoryDecoder, WriteOptions};

mod common;
use common::{init_tracing, mixed_frame, temp_dir, write_text};

fn triclinic() -> Box3 {
    Box3 {
        xy: 0.2,
        xz: 0.1,
        yz: -0.3,
        ..Box3::orthorhombic(9.0, 10.0, 11.0)
    }
}

#[test]
fn positions_and_triclinic_box_survive_a_round_trip() {
    init_tracing();
    let dir = temp_dir();
    let traj: partraj_core::Trajectory = (0..3).map(|step| mixed_frame(step, triclinic())).collect();
    let path = dir.path().join("run.dcd");
    write_path(&traj, &path, &WriteOptions::default()).unwrap();

    let back = read_path(&path, &ReadOptions::default()).unwrap();
    assert_eq!(back.len(), 3);
    for (a, b) in traj.iter().zip(back.iter()) {
        let (a, b) = (a.data().unwrap(), b.data().unwrap());
        assert!(b.box3().is_close(a.box3(), 1e-5));
        for (p, q) in a.position().unwrap().iter().zip(b.position().unwrap()) {
            for k in 0..3 {
                assert!((p[k] - q[k]).abs() < 1e-5, "{p:?} vs {q:?}");
            }
        }
        assert_eq!(b.types(), &["A".to_string()]);
    }
}

#[test]
fn template_supplies_types_and_shapes() {
    let dir = temp_dir();
    let traj: partraj_core::Trajectory = (0..2).map(|step| mixed_frame(step, Box3::cubic(8.0))).collect();
    let path = dir.path().join("run.dcd");
    write_path(&traj, &path, &WriteOptions::default()).unwrap();

    let template = traj.frame(0).unwrap().data().unwrap();
    let reader = DcdReader::new(File::open(&path).unwrap(), DcdTopology::Template(Rc::clone(&template))).unwrap();
    assert_eq!(reader.n_frames(), 2);
    assert_eq!(reader.n_atoms(), 4);
    let second = reader.frame(1).unwrap().data().unwrap();
    assert_eq!(second.types(), template.types());
    assert_eq!(second.type_shapes(), template.type_shapes());
    assert_eq!(second.typeid(), template.typeid());
    assert!((second.position().unwrap()[3][0] - 3.25).abs() < 1e-6);
}

#[test]
fn default_type_comes_from_read_options() {
    let dir = temp_dir();
    let traj: partraj_core::Trajectory = std::iter::once(mixed_frame(0, Box3::cubic(8.0))).collect();
    let path = dir.path().join("frames.bin");
    write_path(
        &traj,
        &path,
        &WriteOptions {
            format: Some(Format::Dcd),
            ..Default::default()
        },
    )
    .unwrap();
    let options_path = write_text(&dir, "read.json", r#"{"format": "dcd", "default_type": "P"}"#);
    let options = ReadOptions::from_path(&options_path).unwrap();
    let back = read_path(&path, &options).unwrap();
    assert_eq!(back.frame(0).unwrap().data().unwrap().types(), &["P".to_string()]);
}

#[test]
fn garbage_is_not_a_dcd_file() {
    let dir = temp_dir();
    let path = write_text(&dir, "bad.dcd", "this is not a binary trajectory");
    assert!(read_path(&path, &ReadOptions::default()).is_err());
    let err = read_dcd(std::io::Cursor::new(Vec::new()), DcdTopology::default());
    assert!(matches!(err, Err(TrajError::Parse(_))));
}

#[test]
fn hoomd_xml_template_names_the_particles() {
    init_tracing();
    let dir = temp_dir();
    let traj: partraj_core::Trajectory = (0..2).map(|step| mixed_frame(step, Box3::cubic(8.0))).collect();
    let path = dir.path().join("run.dcd");
    write_path(&traj, &path, &WriteOptions::default()).unwrap();
    let template = write_text(
        &dir,
        "init.xml",
        r#"<?xml version="1.0"?>
<hoomd_xml version="1.6">
<configuration time_step="0" dimensions="3">
<box lx="8" ly="8" lz="8"/>
<position num="4">
0 0 0
1 0 0
2 0 0
3 0 0
</position>
<type num="4">
R
S
R
S
</type>
</configuration>
</hoomd_xml>
"#,
    );

    let options = ReadOptions {
        template: Some(template),
        ..Default::default()
    };
    let back = read_path(&path, &options).unwrap();
    assert_eq!(back.len(), 2);
    let second = back.frame(1).unwrap().data().unwrap();
    assert_eq!(second.types(), &["R".to_string(), "S".to_string()]);
    assert_eq!(second.typeid(), &[0, 1, 0, 1]);
}

#[test]
fn read_only_dialects_refuse_writes() {
    let dir = temp_dir();
    let traj: partraj_core::Trajectory = std::iter::once(mixed_frame(0, Box3::cubic(8.0))).collect();
    for name in ["out.cif", "out.xml"] {
        let err = write_path(&traj, dir.path().join(name), &WriteOptions::default());
        assert!(matches!(err, Err(TrajError::Unsupported(_))), "{name}");
    }
}
