use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::box3::Box3;
use crate::error::{ParseWarning, TrajError, TrajResult};
use crate::quat::Quat;
use crate::record::{Dtype, FrameData, MetadataTable, RawFrameRecord};
use crate::shapes::ShapeVariant;

/// Something that can produce the raw record of one frame on demand.
///
/// File-backed sources re-seek and re-read on every call, so decoding the
/// same frame twice yields equal records.
pub trait FrameSource {
    fn decode_raw(&self, warnings: &mut Vec<ParseWarning>) -> TrajResult<RawFrameRecord>;

    fn describe(&self) -> String {
        "in-memory frame".to_string()
    }
}

impl FrameSource for RawFrameRecord {
    fn decode_raw(&self, _warnings: &mut Vec<ParseWarning>) -> TrajResult<RawFrameRecord> {
        Ok(self.clone())
    }
}

/// Lazily decoded frame.
///
/// The frame holds at most one [`FrameData`], created by [`Frame::load`] and
/// released by [`Frame::unload`]. Clones share the source and, while loaded,
/// the cached data.
pub struct Frame {
    source: Rc<dyn FrameSource>,
    dtype: Dtype,
    data: RefCell<Option<Rc<FrameData>>>,
    warnings: RefCell<Vec<ParseWarning>>,
}

impl Frame {
    pub fn new(source: Rc<dyn FrameSource>) -> Self {
        Self {
            source,
            dtype: Dtype::default(),
            data: RefCell::new(None),
            warnings: RefCell::new(Vec::new()),
        }
    }

    pub fn from_raw(raw: RawFrameRecord) -> Self {
        Self::new(Rc::new(raw))
    }

    /// Loaded frame backed by already canonical data.
    pub fn from_data(data: FrameData) -> Self {
        let frame = Self {
            source: Rc::new(RawFrameRecord::from_frame_data(&data)),
            dtype: data.dtype(),
            data: RefCell::new(None),
            warnings: RefCell::new(Vec::new()),
        };
        *frame.data.borrow_mut() = Some(Rc::new(data));
        frame
    }

    pub fn with_dtype(mut self, dtype: Dtype) -> TrajResult<Self> {
        self.set_dtype(dtype)?;
        Ok(self)
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn set_dtype(&mut self, dtype: Dtype) -> TrajResult<()> {
        if dtype == self.dtype {
            return Ok(());
        }
        if self.is_loaded() {
            return Err(TrajError::Validation(
                "cannot change dtype of a loaded frame; unload it first".into(),
            ));
        }
        self.dtype = dtype;
        Ok(())
    }

    /// Takes `dtype` unless the frame is loaded.
    pub(crate) fn adopt_dtype(&mut self, dtype: Dtype) {
        if !self.is_loaded() {
            self.dtype = dtype;
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.data.borrow().is_some()
    }

    pub fn load(&self) -> TrajResult<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let mut warnings = Vec::new();
        let raw = self.source.decode_raw(&mut warnings)?;
        let data = FrameData::from_raw(raw, self.dtype)?;
        tracing::debug!(
            source = %self.source.describe(),
            n_particles = data.n_particles(),
            warnings = warnings.len(),
            "loaded frame"
        );
        *self.warnings.borrow_mut() = warnings;
        *self.data.borrow_mut() = Some(Rc::new(data));
        Ok(())
    }

    /// Releases this frame's reference to its data. Other holders of the
    /// `Rc` keep their copy.
    pub fn unload(&self) {
        if self.data.borrow_mut().take().is_some() {
            tracing::debug!(source = %self.source.describe(), "unloaded frame");
        }
    }

    /// Loads if needed and returns the frame data.
    pub fn data(&self) -> TrajResult<Rc<FrameData>> {
        self.load()?;
        self.data
            .borrow()
            .clone()
            .ok_or_else(|| TrajError::Parse("frame data missing after load".into()))
    }

    /// Warnings reported by the most recent decode.
    pub fn warnings(&self) -> Vec<ParseWarning> {
        self.warnings.borrow().clone()
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    pub fn n_particles(&self) -> TrajResult<usize> {
        Ok(self.data()?.n_particles())
    }

    /// Applies `f` to the loaded data, copying it first if it is shared.
    /// Edits live in the cached data and are discarded by `unload`.
    pub fn modify<F>(&mut self, f: F) -> TrajResult<()>
    where
        F: FnOnce(&mut FrameData) -> TrajResult<()>,
    {
        self.load()?;
        let mut slot = self.data.borrow_mut();
        let rc = slot
            .as_mut()
            .ok_or_else(|| TrajError::Parse("frame data missing after load".into()))?;
        f(Rc::make_mut(rc))
    }

    pub fn set_box(&mut self, box3: Box3) -> TrajResult<()> {
        self.modify(|d| d.set_box(box3))
    }

    pub fn set_types(&mut self, types: Vec<String>, shapes: Vec<ShapeVariant>) -> TrajResult<()> {
        self.modify(|d| d.set_types(types, shapes))
    }

    pub fn set_typeid(&mut self, typeid: Vec<u32>) -> TrajResult<()> {
        self.modify(|d| d.set_typeid(typeid))
    }

    pub fn set_positions(&mut self, values: Option<Vec<[f64; 3]>>) -> TrajResult<()> {
        self.modify(|d| d.set_position(values))
    }

    pub fn set_velocities(&mut self, values: Option<Vec<[f64; 3]>>) -> TrajResult<()> {
        self.modify(|d| d.set_velocity(values))
    }

    pub fn set_orientations(&mut self, values: Option<Vec<Quat>>) -> TrajResult<()> {
        self.modify(|d| d.set_orientation(values))
    }

    pub fn set_angmom(&mut self, values: Option<Vec<Quat>>) -> TrajResult<()> {
        self.modify(|d| d.set_angmom(values))
    }

    pub fn set_mass(&mut self, values: Option<Vec<f64>>) -> TrajResult<()> {
        self.modify(|d| d.set_mass(values))
    }

    pub fn set_charge(&mut self, values: Option<Vec<f64>>) -> TrajResult<()> {
        self.modify(|d| d.set_charge(values))
    }

    pub fn set_diameter(&mut self, values: Option<Vec<f64>>) -> TrajResult<()> {
        self.modify(|d| d.set_diameter(values))
    }

    pub fn set_moment_inertia(&mut self, values: Option<Vec<[f64; 3]>>) -> TrajResult<()> {
        self.modify(|d| d.set_moment_inertia(values))
    }

    pub fn set_image(&mut self, values: Option<Vec<[i32; 3]>>) -> TrajResult<()> {
        self.modify(|d| d.set_image(values))
    }

    pub fn set_metadata(&mut self, metadata: Option<MetadataTable>) -> TrajResult<()> {
        self.modify(|d| {
            d.set_metadata(metadata);
            Ok(())
        })
    }

    pub fn set_view_rotation(&mut self, rotation: Option<Quat>) -> TrajResult<()> {
        self.modify(|d| d.set_view_rotation(rotation))
    }

    /// Loads both frames and compares their data structurally.
    pub fn try_eq(&self, other: &Frame) -> TrajResult<bool> {
        Ok(*self.data()? == *other.data()?)
    }
}

impl Clone for Frame {
    fn clone(&self) -> Self {
        Self {
            source: Rc::clone(&self.source),
            dtype: self.dtype,
            data: RefCell::new(self.data.borrow().clone()),
            warnings: RefCell::new(self.warnings.borrow().clone()),
        }
    }
}

/// Frames that fail to decode compare unequal.
impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.try_eq(other).unwrap_or(false)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("source", &self.source.describe())
            .field("dtype", &self.dtype)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
