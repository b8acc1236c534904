//! Copying frames in and out of simulation-engine particle snapshots.

use crate::box3::Box3;
use crate::error::{TrajError, TrajResult};
use crate::frame::Frame;
use crate::quat::Quat;
use crate::record::{Dtype, FrameData, Property, RawFrameRecord};
use crate::shapes::ShapeVariant;

/// One per-particle property column.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Vector(Vec<[f64; 3]>),
    Quaternion(Vec<Quat>),
    Scalar(Vec<f64>),
    Image(Vec<[i32; 3]>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Vector(v) => v.len(),
            Column::Quaternion(v) => v.len(),
            Column::Scalar(v) => v.len(),
            Column::Image(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Particle container owned by a simulation engine.
///
/// Properties the engine does not track report `None` from
/// [`ParticleSnapshot::column`] and are skipped in both copy directions.
pub trait ParticleSnapshot {
    fn n_particles(&self) -> usize;

    /// Resizes every tracked column, discarding previous contents.
    fn resize(&mut self, n: usize);

    fn box3(&self) -> Box3;
    fn set_box3(&mut self, box3: Box3);

    fn types(&self) -> &[String];
    fn set_types(&mut self, types: Vec<String>);

    fn typeid(&self) -> &[u32];
    fn set_typeid(&mut self, typeid: Vec<u32>) -> TrajResult<()>;

    fn column(&self, property: Property) -> Option<Column>;
    fn set_column(&mut self, property: Property, column: Column) -> TrajResult<()>;
}

/// Snapshot kept in plain vectors. Every property is tracked once set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemorySnapshot {
    n: usize,
    box3: Box3,
    types: Vec<String>,
    typeid: Vec<u32>,
    columns: Vec<(Property, Column)>,
}

impl MemorySnapshot {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            typeid: vec![0; n],
            ..Default::default()
        }
    }
}

impl ParticleSnapshot for MemorySnapshot {
    fn n_particles(&self) -> usize {
        self.n
    }

    fn resize(&mut self, n: usize) {
        self.n = n;
        self.typeid = vec![0; n];
        self.columns.clear();
    }

    fn box3(&self) -> Box3 {
        self.box3
    }

    fn set_box3(&mut self, box3: Box3) {
        self.box3 = box3;
    }

    fn types(&self) -> &[String] {
        &self.types
    }

    fn set_types(&mut self, types: Vec<String>) {
        self.types = types;
    }

    fn typeid(&self) -> &[u32] {
        &self.typeid
    }

    fn set_typeid(&mut self, typeid: Vec<u32>) -> TrajResult<()> {
        if typeid.len() != self.n {
            return Err(TrajError::Validation(format!(
                "typeid has {} rows, snapshot holds {}",
                typeid.len(),
                self.n
            )));
        }
        self.typeid = typeid;
        Ok(())
    }

    fn column(&self, property: Property) -> Option<Column> {
        self.columns
            .iter()
            .find(|(p, _)| *p == property)
            .map(|(_, c)| c.clone())
    }

    fn set_column(&mut self, property: Property, column: Column) -> TrajResult<()> {
        if column.len() != self.n {
            return Err(TrajError::Validation(format!(
                "{property} has {} rows, snapshot holds {}",
                column.len(),
                self.n
            )));
        }
        match self.columns.iter_mut().find(|(p, _)| *p == property) {
            Some(slot) => slot.1 = column,
            None => self.columns.push((property, column)),
        }
        Ok(())
    }
}

fn frame_column(data: &FrameData, property: Property) -> TrajResult<Column> {
    Ok(match property {
        Property::Position => Column::Vector(data.position()?.to_vec()),
        Property::Velocity => Column::Vector(data.velocity()?.to_vec()),
        Property::MomentInertia => Column::Vector(data.moment_inertia()?.to_vec()),
        Property::Orientation => Column::Quaternion(data.orientation()?.to_vec()),
        Property::Angmom => Column::Quaternion(data.angmom()?.to_vec()),
        Property::Mass => Column::Scalar(data.mass()?.to_vec()),
        Property::Charge => Column::Scalar(data.charge()?.to_vec()),
        Property::Diameter => Column::Scalar(data.diameter()?.to_vec()),
        Property::Image => Column::Image(data.image()?.to_vec()),
    })
}

fn mismatch(property: Property) -> TrajError {
    TrajError::Validation(format!("snapshot column for {property} has the wrong element kind"))
}

fn store_column(raw: &mut RawFrameRecord, property: Property, column: Column) -> TrajResult<()> {
    match (property, column) {
        (Property::Position, Column::Vector(v)) => raw.position = Some(v),
        (Property::Velocity, Column::Vector(v)) => raw.velocity = Some(v),
        (Property::MomentInertia, Column::Vector(v)) => raw.moment_inertia = Some(v),
        (Property::Orientation, Column::Quaternion(v)) => raw.orientation = Some(v),
        (Property::Angmom, Column::Quaternion(v)) => raw.angmom = Some(v),
        (Property::Mass, Column::Scalar(v)) => raw.mass = Some(v),
        (Property::Charge, Column::Scalar(v)) => raw.charge = Some(v),
        (Property::Diameter, Column::Scalar(v)) => raw.diameter = Some(v),
        (Property::Image, Column::Image(v)) => raw.image = Some(v),
        (p, _) => return Err(mismatch(p)),
    }
    Ok(())
}

/// Writes the frame into `snapshot`. Properties the frame lacks are left
/// out of the snapshot.
pub fn copy_to_snapshot<S: ParticleSnapshot + ?Sized>(frame: &Frame, snapshot: &mut S) -> TrajResult<()> {
    let data = frame.data()?;
    snapshot.resize(data.n_particles());
    snapshot.set_box3(*data.box3());
    snapshot.set_types(data.types().to_vec());
    snapshot.set_typeid(data.typeid().to_vec())?;
    for property in Property::ALL {
        if data.has(property) {
            snapshot.set_column(property, frame_column(&data, property)?)?;
        }
    }
    Ok(())
}

/// Replaces `frame` with the contents of `snapshot`.
///
/// Properties the snapshot does not track keep the frame's values when the
/// particle count is unchanged and are dropped otherwise. Shapes of type
/// names the frame already knows are kept; new names get the default
/// shape. On error the frame is left untouched.
pub fn copy_from_snapshot<S: ParticleSnapshot + ?Sized>(snapshot: &S, frame: &mut Frame) -> TrajResult<()> {
    let current = frame.data()?;
    let n = snapshot.n_particles();
    let mut raw = if current.n_particles() == n {
        RawFrameRecord::from_frame_data(&current)
    } else {
        RawFrameRecord {
            metadata: current.metadata().cloned(),
            view_rotation: current.view_rotation(),
            ..Default::default()
        }
    };

    let box3 = snapshot.box3();
    raw.box_matrix = Some(box3.matrix());
    raw.box_dimensions = box3.dimensions;
    raw.types = snapshot.types().to_vec();
    raw.type_shapes = raw
        .types
        .iter()
        .map(|t| current.shape_of(t).cloned().unwrap_or_default())
        .collect::<Vec<ShapeVariant>>();
    raw.typeid = snapshot.typeid().to_vec();
    for property in Property::ALL {
        if let Some(column) = snapshot.column(property) {
            store_column(&mut raw, property, column)?;
        }
    }

    let dtype: Dtype = frame.dtype();
    let data = FrameData::from_raw(raw, dtype).map_err(|err| match err {
        TrajError::Parse(msg) => TrajError::Validation(msg),
        other => other,
    })?;
    *frame = Frame::from_data(data);
    Ok(())
}
