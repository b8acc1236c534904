use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::box3::Box3;
use crate::canonical::{canonicalize, QuatFields, VectorFields};
use crate::error::{TrajError, TrajResult};
use crate::quat::Quat;
use crate::shapes::ShapeVariant;

/// Tolerance for treating a z component as zero in 2-D frames.
pub const PLANAR_TOL: f64 = 1e-7;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    #[default]
    Float32,
    Float64,
}

impl Dtype {
    pub fn quantize(self, value: f64) -> f64 {
        match self {
            Dtype::Float32 => value as f32 as f64,
            Dtype::Float64 => value,
        }
    }
}

/// Optional per-particle properties, in the order engines usually list them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Property {
    Position,
    Orientation,
    Velocity,
    Mass,
    Charge,
    Diameter,
    MomentInertia,
    Angmom,
    Image,
}

impl Property {
    pub const ALL: [Property; 9] = [
        Property::Position,
        Property::Orientation,
        Property::Velocity,
        Property::Mass,
        Property::Charge,
        Property::Diameter,
        Property::MomentInertia,
        Property::Angmom,
        Property::Image,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Property::Position => "position",
            Property::Orientation => "orientation",
            Property::Velocity => "velocity",
            Property::Mass => "mass",
            Property::Charge => "charge",
            Property::Diameter => "diameter",
            Property::MomentInertia => "moment_inertia",
            Property::Angmom => "angmom",
            Property::Image => "image",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Free-form table carried alongside a frame. Values stay as text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataTable {
    columns: Vec<String>,
    values: Vec<Vec<String>>,
}

impl MetadataTable {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let values = vec![Vec::new(); columns.len()];
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.values[i].as_slice())
    }

    pub fn n_rows(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    /// Appends one row. Rows whose width differs from the column count are
    /// rejected and the table is left untouched.
    pub fn push_row<S: AsRef<str>>(&mut self, row: &[S]) -> bool {
        if row.len() != self.columns.len() {
            return false;
        }
        for (col, value) in self.values.iter_mut().zip(row) {
            col.push(value.as_ref().to_string());
        }
        true
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&str>> + '_ {
        (0..self.n_rows()).map(move |r| self.values.iter().map(|c| c[r].as_str()).collect())
    }
}

/// Decoder output for one frame, before any validation or canonicalization.
///
/// `None` means the property was not provided. `Some(vec![])` is a present
/// property of a zero-particle frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFrameRecord {
    pub box_matrix: Option<[[f64; 3]; 3]>,
    pub box_dimensions: u8,
    pub types: Vec<String>,
    pub type_shapes: Vec<ShapeVariant>,
    pub typeid: Vec<u32>,
    pub position: Option<Vec<[f64; 3]>>,
    pub orientation: Option<Vec<Quat>>,
    pub velocity: Option<Vec<[f64; 3]>>,
    pub mass: Option<Vec<f64>>,
    pub charge: Option<Vec<f64>>,
    pub diameter: Option<Vec<f64>>,
    pub moment_inertia: Option<Vec<[f64; 3]>>,
    pub angmom: Option<Vec<Quat>>,
    pub image: Option<Vec<[i32; 3]>>,
    pub metadata: Option<MetadataTable>,
    pub view_rotation: Option<Quat>,
}

impl Default for RawFrameRecord {
    fn default() -> Self {
        Self {
            box_matrix: None,
            box_dimensions: 3,
            types: Vec::new(),
            type_shapes: Vec::new(),
            typeid: Vec::new(),
            position: None,
            orientation: None,
            velocity: None,
            mass: None,
            charge: None,
            diameter: None,
            moment_inertia: None,
            angmom: None,
            image: None,
            metadata: None,
            view_rotation: None,
        }
    }
}

impl RawFrameRecord {
    /// Row count of every present per-particle array.
    pub fn n_particles(&self) -> usize {
        self.position.as_ref().map_or(self.typeid.len(), Vec::len)
    }

    /// Raw record that reproduces `data` exactly when decoded again.
    pub fn from_frame_data(data: &FrameData) -> Self {
        Self {
            box_matrix: Some(data.box3.matrix()),
            box_dimensions: data.box3.dimensions,
            types: data.types.clone(),
            type_shapes: data.type_shapes.clone(),
            typeid: data.typeid.clone(),
            position: data.position.clone(),
            orientation: data.orientation.clone(),
            velocity: data.velocity.clone(),
            mass: data.mass.clone(),
            charge: data.charge.clone(),
            diameter: data.diameter.clone(),
            moment_inertia: data.moment_inertia.clone(),
            angmom: data.angmom.clone(),
            image: data.image.clone(),
            metadata: data.metadata.clone(),
            view_rotation: data.view_rotation,
        }
    }
}

/// Canonicalized and validated frame contents.
#[derive(Clone, Debug)]
pub struct FrameData {
    dtype: Dtype,
    n: usize,
    box3: Box3,
    types: Vec<String>,
    type_shapes: Vec<ShapeVariant>,
    typeid: Vec<u32>,
    position: Option<Vec<[f64; 3]>>,
    orientation: Option<Vec<Quat>>,
    velocity: Option<Vec<[f64; 3]>>,
    mass: Option<Vec<f64>>,
    charge: Option<Vec<f64>>,
    diameter: Option<Vec<f64>>,
    moment_inertia: Option<Vec<[f64; 3]>>,
    angmom: Option<Vec<Quat>>,
    image: Option<Vec<[i32; 3]>>,
    metadata: Option<MetadataTable>,
    view_rotation: Option<Quat>,
}

impl FrameData {
    pub fn from_raw(raw: RawFrameRecord, dtype: Dtype) -> TrajResult<Self> {
        let matrix = raw
            .box_matrix
            .ok_or_else(|| TrajError::Parse("frame is missing box information".into()))?;
        let n = raw.n_particles();
        check_rows(n, "typeid", Some(raw.typeid.len()))?;
        check_rows(n, "orientation", raw.orientation.as_ref().map(Vec::len))?;
        check_rows(n, "velocity", raw.velocity.as_ref().map(Vec::len))?;
        check_rows(n, "mass", raw.mass.as_ref().map(Vec::len))?;
        check_rows(n, "charge", raw.charge.as_ref().map(Vec::len))?;
        check_rows(n, "diameter", raw.diameter.as_ref().map(Vec::len))?;
        check_rows(n, "moment_inertia", raw.moment_inertia.as_ref().map(Vec::len))?;
        check_rows(n, "angmom", raw.angmom.as_ref().map(Vec::len))?;
        check_rows(n, "image", raw.image.as_ref().map(Vec::len))?;
        if raw.types.len() != raw.type_shapes.len() {
            return Err(TrajError::Parse(format!(
                "{} types but {} type shapes",
                raw.types.len(),
                raw.type_shapes.len()
            )));
        }
        if let Some(&bad) = raw.typeid.iter().find(|&&t| t as usize >= raw.types.len()) {
            return Err(TrajError::Parse(format!(
                "typeid {bad} out of range for {} types",
                raw.types.len()
            )));
        }

        let canon = canonicalize(
            &matrix,
            raw.box_dimensions,
            VectorFields {
                positions: raw.position.as_deref(),
                velocities: raw.velocity.as_deref(),
            },
            QuatFields {
                orientations: raw.orientation.as_deref(),
                angmom: raw.angmom.as_deref(),
            },
        )?;
        let box3 = canon.box3;
        let new_position = rotated(canon.positions);
        let new_velocity = rotated(canon.velocities);
        let new_orientation = rotated(canon.orientations);
        let new_angmom = rotated(canon.angmom);

        let mut data = Self {
            dtype,
            n,
            box3,
            types: raw.types,
            type_shapes: raw.type_shapes,
            typeid: raw.typeid,
            position: new_position.or(raw.position),
            orientation: new_orientation.or(raw.orientation),
            velocity: new_velocity.or(raw.velocity),
            mass: raw.mass,
            charge: raw.charge,
            diameter: raw.diameter,
            moment_inertia: raw.moment_inertia,
            angmom: new_angmom.or(raw.angmom),
            image: raw.image,
            metadata: raw.metadata,
            view_rotation: raw.view_rotation,
        };
        data.quantize();
        Ok(data)
    }

    fn quantize(&mut self) {
        if self.dtype == Dtype::Float64 {
            return;
        }
        let d = self.dtype;
        let b = &mut self.box3;
        for v in [&mut b.lx, &mut b.ly, &mut b.lz, &mut b.xy, &mut b.xz, &mut b.yz] {
            *v = d.quantize(*v);
        }
        quantize_rows(&mut self.position, d);
        quantize_rows(&mut self.orientation, d);
        quantize_rows(&mut self.velocity, d);
        quantize_rows(&mut self.moment_inertia, d);
        quantize_rows(&mut self.angmom, d);
        for values in [&mut self.mass, &mut self.charge, &mut self.diameter]
            .into_iter()
            .flatten()
        {
            for v in values.iter_mut() {
                *v = d.quantize(*v);
            }
        }
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn n_particles(&self) -> usize {
        self.n
    }

    pub fn box3(&self) -> &Box3 {
        &self.box3
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn type_shapes(&self) -> &[ShapeVariant] {
        &self.type_shapes
    }

    pub fn typeid(&self) -> &[u32] {
        &self.typeid
    }

    pub fn position(&self) -> TrajResult<&[[f64; 3]]> {
        available(&self.position, Property::Position)
    }

    pub fn orientation(&self) -> TrajResult<&[Quat]> {
        available(&self.orientation, Property::Orientation)
    }

    pub fn velocity(&self) -> TrajResult<&[[f64; 3]]> {
        available(&self.velocity, Property::Velocity)
    }

    pub fn mass(&self) -> TrajResult<&[f64]> {
        available(&self.mass, Property::Mass)
    }

    pub fn charge(&self) -> TrajResult<&[f64]> {
        available(&self.charge, Property::Charge)
    }

    pub fn diameter(&self) -> TrajResult<&[f64]> {
        available(&self.diameter, Property::Diameter)
    }

    pub fn moment_inertia(&self) -> TrajResult<&[[f64; 3]]> {
        available(&self.moment_inertia, Property::MomentInertia)
    }

    pub fn angmom(&self) -> TrajResult<&[Quat]> {
        available(&self.angmom, Property::Angmom)
    }

    pub fn image(&self) -> TrajResult<&[[i32; 3]]> {
        available(&self.image, Property::Image)
    }

    pub fn metadata(&self) -> Option<&MetadataTable> {
        self.metadata.as_ref()
    }

    pub fn view_rotation(&self) -> Option<Quat> {
        self.view_rotation
    }

    pub fn has(&self, property: Property) -> bool {
        match property {
            Property::Position => self.position.is_some(),
            Property::Orientation => self.orientation.is_some(),
            Property::Velocity => self.velocity.is_some(),
            Property::Mass => self.mass.is_some(),
            Property::Charge => self.charge.is_some(),
            Property::Diameter => self.diameter.is_some(),
            Property::MomentInertia => self.moment_inertia.is_some(),
            Property::Angmom => self.angmom.is_some(),
            Property::Image => self.image.is_some(),
        }
    }

    /// Shape registered for the named type.
    pub fn shape_of(&self, type_name: &str) -> Option<&ShapeVariant> {
        self.types
            .iter()
            .position(|t| t == type_name)
            .and_then(|i| self.type_shapes.get(i))
    }

    pub fn set_box(&mut self, box3: Box3) -> TrajResult<()> {
        box3.validate()?;
        if box3.dimensions == 2 {
            self.check_planar(self.position.as_deref(), "position")?;
            self.check_planar(self.velocity.as_deref(), "velocity")?;
        }
        self.box3 = box3;
        self.quantize();
        Ok(())
    }

    pub fn set_types(&mut self, types: Vec<String>, type_shapes: Vec<ShapeVariant>) -> TrajResult<()> {
        if types.len() != type_shapes.len() {
            return Err(TrajError::Validation(format!(
                "{} types but {} type shapes",
                types.len(),
                type_shapes.len()
            )));
        }
        if let Some(&bad) = self.typeid.iter().find(|&&t| t as usize >= types.len()) {
            return Err(TrajError::Validation(format!(
                "existing typeid {bad} out of range for {} types",
                types.len()
            )));
        }
        self.types = types;
        self.type_shapes = type_shapes;
        Ok(())
    }

    pub fn set_typeid(&mut self, typeid: Vec<u32>) -> TrajResult<()> {
        self.check_len("typeid", typeid.len())?;
        if let Some(&bad) = typeid.iter().find(|&&t| t as usize >= self.types.len()) {
            return Err(TrajError::Validation(format!(
                "typeid {bad} out of range for {} types",
                self.types.len()
            )));
        }
        self.typeid = typeid;
        Ok(())
    }

    pub fn set_position(&mut self, values: Option<Vec<[f64; 3]>>) -> TrajResult<()> {
        if let Some(v) = &values {
            self.check_vectors(v, "position")?;
        }
        self.position = values;
        self.quantize();
        Ok(())
    }

    pub fn set_velocity(&mut self, values: Option<Vec<[f64; 3]>>) -> TrajResult<()> {
        if let Some(v) = &values {
            self.check_vectors(v, "velocity")?;
        }
        self.velocity = values;
        self.quantize();
        Ok(())
    }

    pub fn set_orientation(&mut self, values: Option<Vec<Quat>>) -> TrajResult<()> {
        if let Some(v) = &values {
            self.check_len("orientation", v.len())?;
            check_finite(v.iter().flatten().copied(), "orientation")?;
        }
        self.orientation = values;
        self.quantize();
        Ok(())
    }

    pub fn set_angmom(&mut self, values: Option<Vec<Quat>>) -> TrajResult<()> {
        if let Some(v) = &values {
            self.check_len("angmom", v.len())?;
            check_finite(v.iter().flatten().copied(), "angmom")?;
        }
        self.angmom = values;
        self.quantize();
        Ok(())
    }

    pub fn set_moment_inertia(&mut self, values: Option<Vec<[f64; 3]>>) -> TrajResult<()> {
        if let Some(v) = &values {
            self.check_len("moment_inertia", v.len())?;
            check_finite(v.iter().flatten().copied(), "moment_inertia")?;
        }
        self.moment_inertia = values;
        self.quantize();
        Ok(())
    }

    pub fn set_mass(&mut self, values: Option<Vec<f64>>) -> TrajResult<()> {
        self.check_scalars(values.as_deref(), "mass")?;
        self.mass = values;
        self.quantize();
        Ok(())
    }

    pub fn set_charge(&mut self, values: Option<Vec<f64>>) -> TrajResult<()> {
        self.check_scalars(values.as_deref(), "charge")?;
        self.charge = values;
        self.quantize();
        Ok(())
    }

    pub fn set_diameter(&mut self, values: Option<Vec<f64>>) -> TrajResult<()> {
        self.check_scalars(values.as_deref(), "diameter")?;
        self.diameter = values;
        self.quantize();
        Ok(())
    }

    pub fn set_image(&mut self, values: Option<Vec<[i32; 3]>>) -> TrajResult<()> {
        if let Some(v) = &values {
            self.check_len("image", v.len())?;
        }
        self.image = values;
        Ok(())
    }

    pub fn set_metadata(&mut self, metadata: Option<MetadataTable>) {
        self.metadata = metadata;
    }

    pub fn set_view_rotation(&mut self, rotation: Option<Quat>) -> TrajResult<()> {
        if let Some(q) = rotation {
            check_finite(q.iter().copied(), "view rotation")?;
        }
        self.view_rotation = rotation;
        Ok(())
    }

    /// Structural comparison with a per-value tolerance on floating data.
    pub fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.n == other.n
            && self.box3.is_close(&other.box3, tol)
            && self.types == other.types
            && self.type_shapes == other.type_shapes
            && self.typeid == other.typeid
            && close_rows(&self.position, &other.position, tol)
            && close_rows(&self.orientation, &other.orientation, tol)
            && close_rows(&self.velocity, &other.velocity, tol)
            && close_rows(&self.moment_inertia, &other.moment_inertia, tol)
            && close_rows(&self.angmom, &other.angmom, tol)
            && close_scalars(&self.mass, &other.mass, tol)
            && close_scalars(&self.charge, &other.charge, tol)
            && close_scalars(&self.diameter, &other.diameter, tol)
            && self.image == other.image
            && self.metadata == other.metadata
    }

    fn check_len(&self, name: &str, len: usize) -> TrajResult<()> {
        if len != self.n {
            return Err(TrajError::Validation(format!(
                "{name} has {len} rows, expected {}",
                self.n
            )));
        }
        Ok(())
    }

    fn check_vectors(&self, values: &[[f64; 3]], name: &str) -> TrajResult<()> {
        self.check_len(name, values.len())?;
        check_finite(values.iter().flatten().copied(), name)?;
        if self.box3.dimensions == 2 {
            self.check_planar(Some(values), name)?;
        }
        Ok(())
    }

    fn check_planar(&self, values: Option<&[[f64; 3]]>, name: &str) -> TrajResult<()> {
        if values.is_some_and(|v| v.iter().any(|r| r[2].abs() > PLANAR_TOL)) {
            return Err(TrajError::Validation(format!(
                "{name} must have zero z components in a 2-D frame"
            )));
        }
        Ok(())
    }

    fn check_scalars(&self, values: Option<&[f64]>, name: &str) -> TrajResult<()> {
        if let Some(v) = values {
            self.check_len(name, v.len())?;
            check_finite(v.iter().copied(), name)?;
        }
        Ok(())
    }
}

/// View rotation is presentation state and does not take part in equality.
impl PartialEq for FrameData {
    fn eq(&self, other: &Self) -> bool {
        self.n == other.n
            && self.box3 == other.box3
            && self.types == other.types
            && self.type_shapes == other.type_shapes
            && self.typeid == other.typeid
            && self.position == other.position
            && self.orientation == other.orientation
            && self.velocity == other.velocity
            && self.mass == other.mass
            && self.charge == other.charge
            && self.diameter == other.diameter
            && self.moment_inertia == other.moment_inertia
            && self.angmom == other.angmom
            && self.image == other.image
            && self.metadata == other.metadata
    }
}

fn rotated<T: Clone>(field: Option<Cow<'_, [T]>>) -> Option<Vec<T>> {
    match field {
        Some(Cow::Owned(v)) => Some(v),
        _ => None,
    }
}

fn available<'a, T>(field: &'a Option<Vec<T>>, property: Property) -> TrajResult<&'a [T]> {
    field
        .as_deref()
        .ok_or_else(|| TrajError::NotAvailable(property.name().to_string()))
}

fn check_rows(n: usize, name: &str, len: Option<usize>) -> TrajResult<()> {
    match len {
        Some(len) if len != n => Err(TrajError::Parse(format!(
            "{name} has {len} rows, expected {n}"
        ))),
        _ => Ok(()),
    }
}

fn check_finite(values: impl Iterator<Item = f64>, name: &str) -> TrajResult<()> {
    let mut values = values;
    if values.any(|v| !v.is_finite()) {
        return Err(TrajError::Validation(format!(
            "{name} contains non-finite values"
        )));
    }
    Ok(())
}

fn quantize_rows<const K: usize>(rows: &mut Option<Vec<[f64; K]>>, dtype: Dtype) {
    if let Some(rows) = rows {
        for row in rows.iter_mut() {
            for v in row.iter_mut() {
                *v = dtype.quantize(*v);
            }
        }
    }
}

fn close_rows<const K: usize>(a: &Option<Vec<[f64; K]>>, b: &Option<Vec<[f64; K]>>, tol: f64) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|(x, y)| x.iter().zip(y).all(|(p, q)| (p - q).abs() <= tol))
        }
        _ => false,
    }
}

fn close_scalars(a: &Option<Vec<f64>>, b: &Option<Vec<f64>>, tol: f64) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.len() == b.len() && a.iter().zip(b).all(|(p, q)| (p - q).abs() <= tol),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quat::IDENTITY;

    fn raw_two_particles() -> RawFrameRecord {
        RawFrameRecord {
            box_matrix: Some(Box3::cubic(10.0).matrix()),
            types: vec!["A".into()],
            type_shapes: vec![ShapeVariant::default()],
            typeid: vec![0, 0],
            position: Some(vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]),
            ..Default::default()
        }
    }

    #[test]
    fn missing_box_is_parse_error() {
        let mut raw = raw_two_particles();
        raw.box_matrix = None;
        assert!(matches!(
            FrameData::from_raw(raw, Dtype::Float64),
            Err(TrajError::Parse(_))
        ));
    }

    #[test]
    fn row_count_mismatch_is_rejected() {
        let mut raw = raw_two_particles();
        raw.mass = Some(vec![1.0]);
        assert!(matches!(
            FrameData::from_raw(raw, Dtype::Float64),
            Err(TrajError::Parse(_))
        ));
    }

    #[test]
    fn absent_and_empty_are_distinct() {
        let raw = RawFrameRecord {
            box_matrix: Some(Box3::cubic(1.0).matrix()),
            position: Some(Vec::new()),
            ..Default::default()
        };
        let data = FrameData::from_raw(raw, Dtype::Float64).unwrap();
        assert_eq!(data.position().unwrap().len(), 0);
        assert!(matches!(data.orientation(), Err(TrajError::NotAvailable(_))));
    }

    #[test]
    fn float32_quantizes_values() {
        let mut raw = raw_two_particles();
        raw.position = Some(vec![[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]);
        let data = FrameData::from_raw(raw, Dtype::Float32).unwrap();
        assert_eq!(data.position().unwrap()[0][0], 0.1f32 as f64);
    }

    #[test]
    fn setters_validate_without_side_effects() {
        let mut data = FrameData::from_raw(raw_two_particles(), Dtype::Float64).unwrap();
        assert!(data.set_mass(Some(vec![1.0])).is_err());
        assert!(data.set_mass(Some(vec![1.0, f64::NAN])).is_err());
        assert!(matches!(data.mass(), Err(TrajError::NotAvailable(_))));
        assert!(data.set_typeid(vec![0, 3]).is_err());
        assert_eq!(data.typeid(), &[0, 0]);
        data.set_orientation(Some(vec![IDENTITY; 2])).unwrap();
        assert_eq!(data.orientation().unwrap()[1], IDENTITY);
    }

    #[test]
    fn planar_frames_reject_out_of_plane_positions() {
        let raw = RawFrameRecord {
            box_matrix: Some(Box3::square(5.0, 5.0, 0.0).matrix()),
            box_dimensions: 2,
            types: vec!["A".into()],
            type_shapes: vec![ShapeVariant::default()],
            typeid: vec![0],
            position: Some(vec![[1.0, 1.0, 0.0]]),
            ..Default::default()
        };
        let mut data = FrameData::from_raw(raw, Dtype::Float64).unwrap();
        assert_eq!(data.box3().dimensions, 2);
        assert!(data.set_position(Some(vec![[1.0, 1.0, 0.5]])).is_err());
        assert_eq!(data.position().unwrap()[0], [1.0, 1.0, 0.0]);
    }

    #[test]
    fn equality_ignores_view_rotation() {
        let a = FrameData::from_raw(raw_two_particles(), Dtype::Float64).unwrap();
        let mut raw = raw_two_particles();
        raw.view_rotation = Some([0.0, 1.0, 0.0, 0.0]);
        let b = FrameData::from_raw(raw, Dtype::Float64).unwrap();
        assert_eq!(a, b);
        assert!(a.approx_eq(&b, 0.0));
    }

    #[test]
    fn metadata_rows_must_match_columns() {
        let mut table = MetadataTable::new(["id", "label"]);
        assert!(table.push_row(&["1", "a"]));
        assert!(!table.push_row(&["2"]));
        assert_eq!(table.n_rows(), 1);
        assert_eq!(table.column("label").unwrap(), &["a".to_string()]);
        assert_eq!(table.rows().next().unwrap(), vec!["1", "a"]);
    }
}
