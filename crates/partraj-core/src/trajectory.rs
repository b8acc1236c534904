//! Ordered frames plus homogeneous multi-frame arrays.
//!
//! Frames can hold different particle counts. [`Trajectory::load_arrays`]
//! pads every frame to the largest count so each property becomes one
//! `(M, N)` array; the true counts are kept in [`Trajectory::n_per_frame`].

use std::collections::BTreeSet;
use std::ops::Range;
use std::rc::Rc;

use crate::error::{ParseWarning, TrajError, TrajResult};
use crate::frame::Frame;
use crate::quat::{Quat, IDENTITY};
use crate::record::{Dtype, FrameData, Property};

/// Row-major `(frames, stride)` view into a shared buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Stacked<T> {
    data: Rc<Vec<T>>,
    first: usize,
    frames: usize,
    stride: usize,
}

impl<T> Stacked<T> {
    fn new(data: Vec<T>, frames: usize, stride: usize) -> Self {
        Self {
            data: Rc::new(data),
            first: 0,
            frames,
            stride,
        }
    }

    pub fn n_frames(&self) -> usize {
        self.frames
    }

    /// Rows per frame.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn frame(&self, index: usize) -> Option<&[T]> {
        if index >= self.frames {
            return None;
        }
        let start = (self.first + index) * self.stride;
        self.data.get(start..start + self.stride)
    }

    pub fn get(&self, frame: usize, row: usize) -> Option<&T> {
        self.frame(frame).and_then(|rows| rows.get(row))
    }

    pub fn iter(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.frames).filter_map(move |i| self.frame(i))
    }

    /// View over a contiguous frame range sharing the same buffer.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let start = range.start.min(self.frames);
        let end = range.end.clamp(start, self.frames);
        Self {
            data: Rc::clone(&self.data),
            first: self.first + start,
            frames: end - start,
            stride: self.stride,
        }
    }
}

impl<T: Clone> Stacked<T> {
    pub fn to_vec(&self) -> Vec<Vec<T>> {
        self.iter().map(<[T]>::to_vec).collect()
    }
}

/// Padding used for rows beyond a frame's particle count.
pub mod fill {
    pub const POSITION: [f64; 3] = [0.0; 3];
    pub const VELOCITY: [f64; 3] = [0.0; 3];
    pub const ORIENTATION: [f64; 4] = super::IDENTITY;
    pub const ANGMOM: [f64; 4] = super::IDENTITY;
    pub const MASS: f64 = 1.0;
    pub const DIAMETER: f64 = 1.0;
    pub const MOMENT_INERTIA: [f64; 3] = [1.0; 3];
    pub const CHARGE: f64 = 0.0;
    pub const IMAGE: [i32; 3] = [0; 3];
}

#[derive(Clone, Debug)]
struct TrajectoryArrays {
    n: Stacked<usize>,
    type_names: Rc<Vec<String>>,
    type_ids: Stacked<u32>,
    position: Option<Stacked<[f64; 3]>>,
    orientation: Option<Stacked<Quat>>,
    velocity: Option<Stacked<[f64; 3]>>,
    mass: Option<Stacked<f64>>,
    charge: Option<Stacked<f64>>,
    diameter: Option<Stacked<f64>>,
    moment_inertia: Option<Stacked<[f64; 3]>>,
    angmom: Option<Stacked<Quat>>,
    image: Option<Stacked<[i32; 3]>>,
}

impl TrajectoryArrays {
    fn build(frames: &[Rc<FrameData>]) -> Self {
        let m = frames.len();
        let n_max = frames.iter().map(|d| d.n_particles()).max().unwrap_or(0);
        let counts: Vec<usize> = frames.iter().map(|d| d.n_particles()).collect();

        let names: BTreeSet<&str> = frames
            .iter()
            .flat_map(|d| d.types().iter().map(String::as_str))
            .collect();
        let type_names: Vec<String> = names.into_iter().map(str::to_string).collect();
        let mut type_ids = Vec::with_capacity(m * n_max);
        for d in frames {
            let remap: Vec<u32> = d
                .types()
                .iter()
                .map(|t| type_names.binary_search(t).map_or(0, |i| i as u32))
                .collect();
            type_ids.extend(d.typeid().iter().map(|&t| remap[t as usize]));
            type_ids.resize(type_ids.len() + n_max - d.n_particles(), 0);
        }

        let every = |p: Property| !frames.is_empty() && frames.iter().all(|d| d.has(p));
        Self {
            n: Stacked::new(counts, m, 1),
            type_names: Rc::new(type_names),
            type_ids: Stacked::new(type_ids, m, n_max),
            position: every(Property::Position)
                .then(|| stack(frames, n_max, fill::POSITION, |d| d.position())),
            orientation: every(Property::Orientation)
                .then(|| stack(frames, n_max, fill::ORIENTATION, |d| d.orientation())),
            velocity: every(Property::Velocity)
                .then(|| stack(frames, n_max, fill::VELOCITY, |d| d.velocity())),
            mass: every(Property::Mass).then(|| stack(frames, n_max, fill::MASS, |d| d.mass())),
            charge: every(Property::Charge)
                .then(|| stack(frames, n_max, fill::CHARGE, |d| d.charge())),
            diameter: every(Property::Diameter)
                .then(|| stack(frames, n_max, fill::DIAMETER, |d| d.diameter())),
            moment_inertia: every(Property::MomentInertia)
                .then(|| stack(frames, n_max, fill::MOMENT_INERTIA, |d| d.moment_inertia())),
            angmom: every(Property::Angmom)
                .then(|| stack(frames, n_max, fill::ANGMOM, |d| d.angmom())),
            image: every(Property::Image).then(|| stack(frames, n_max, fill::IMAGE, |d| d.image())),
        }
    }

    fn slice(&self, range: Range<usize>) -> Self {
        Self {
            n: self.n.slice(range.clone()),
            type_names: Rc::clone(&self.type_names),
            type_ids: self.type_ids.slice(range.clone()),
            position: self.position.as_ref().map(|v| v.slice(range.clone())),
            orientation: self.orientation.as_ref().map(|v| v.slice(range.clone())),
            velocity: self.velocity.as_ref().map(|v| v.slice(range.clone())),
            mass: self.mass.as_ref().map(|v| v.slice(range.clone())),
            charge: self.charge.as_ref().map(|v| v.slice(range.clone())),
            diameter: self.diameter.as_ref().map(|v| v.slice(range.clone())),
            moment_inertia: self.moment_inertia.as_ref().map(|v| v.slice(range.clone())),
            angmom: self.angmom.as_ref().map(|v| v.slice(range.clone())),
            image: self.image.as_ref().map(|v| v.slice(range.clone())),
        }
    }
}

fn stack<T: Copy>(
    frames: &[Rc<FrameData>],
    n_max: usize,
    pad: T,
    get: impl Fn(&FrameData) -> TrajResult<&[T]>,
) -> Stacked<T> {
    let mut out = Vec::with_capacity(frames.len() * n_max);
    for d in frames {
        let rows = get(&**d).unwrap_or(&[]);
        out.extend_from_slice(rows);
        out.resize(out.len() + n_max - rows.len(), pad);
    }
    Stacked::new(out, frames.len(), n_max)
}

#[derive(Clone, Debug, Default)]
pub struct Trajectory {
    frames: Vec<Frame>,
    dtype: Dtype,
    arrays: Option<TrajectoryArrays>,
}

impl Trajectory {
    /// Builds a trajectory with the dtype of the first frame. Frames that are
    /// not loaded adopt it; loaded frames keep theirs until [`set_dtype`].
    ///
    /// [`set_dtype`]: Trajectory::set_dtype
    pub fn new(mut frames: Vec<Frame>) -> Self {
        let dtype = frames.first().map(Frame::dtype).unwrap_or_default();
        for frame in &mut frames {
            frame.adopt_dtype(dtype);
        }
        Self {
            frames,
            dtype,
            arrays: None,
        }
    }

    pub fn with_dtype(frames: Vec<Frame>, dtype: Dtype) -> TrajResult<Self> {
        let mut traj = Self::new(frames);
        traj.set_dtype(dtype)?;
        Ok(traj)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Fails if any frame is loaded. Resets materialized arrays.
    pub fn set_dtype(&mut self, dtype: Dtype) -> TrajResult<()> {
        let blocked = self
            .frames
            .iter()
            .position(|f| f.is_loaded() && f.dtype() != dtype);
        if let Some(i) = blocked {
            return Err(TrajError::Validation(format!(
                "cannot change dtype while frame {i} is loaded"
            )));
        }
        for frame in &mut self.frames {
            frame.adopt_dtype(dtype);
        }
        self.dtype = dtype;
        self.arrays = None;
        Ok(())
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frame_mut(&mut self, index: usize) -> Option<&mut Frame> {
        self.arrays = None;
        self.frames.get_mut(index)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn iter(&self) -> TrajectoryIter<'_> {
        TrajectoryIter {
            frames: &self.frames,
            next: 0,
            pending_unload: None,
        }
    }

    /// Sub-trajectory over `range`. Materialized arrays are carried over as
    /// views without decoding anything.
    pub fn slice(&self, range: Range<usize>) -> TrajResult<Self> {
        if range.start > range.end || range.end > self.frames.len() {
            return Err(TrajError::Validation(format!(
                "slice {}..{} out of bounds for {} frames",
                range.start,
                range.end,
                self.frames.len()
            )));
        }
        Ok(Self {
            frames: self.frames[range.clone()].to_vec(),
            dtype: self.dtype,
            arrays: self.arrays.as_ref().map(|a| a.slice(range)),
        })
    }

    /// Warnings from the most recent decode of every frame, in frame order.
    pub fn warnings(&self) -> Vec<ParseWarning> {
        self.frames.iter().flat_map(Frame::warnings).collect()
    }

    /// Materializes all per-particle properties into `(M, N)` arrays.
    ///
    /// Either every array is rebuilt or, on failure, none is available.
    /// Frames that had to be loaded for this are unloaded again.
    pub fn load_arrays(&mut self) -> TrajResult<()> {
        self.arrays = None;
        let mut loaded_here = Vec::new();
        let mut datas = Vec::with_capacity(self.frames.len());
        let mut failure = None;
        for (i, frame) in self.frames.iter().enumerate() {
            if !frame.is_loaded() {
                loaded_here.push(i);
            }
            match frame.data() {
                Ok(d) => datas.push(d),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        for &i in &loaded_here {
            self.frames[i].unload();
        }
        if let Some(err) = failure {
            return Err(err);
        }
        let arrays = TrajectoryArrays::build(&datas);
        tracing::debug!(
            frames = datas.len(),
            n_max = arrays.type_ids.stride(),
            "materialized trajectory arrays"
        );
        self.arrays = Some(arrays);
        Ok(())
    }

    /// Materializes arrays and loads every frame.
    pub fn load(&mut self) -> TrajResult<()> {
        self.load_arrays()?;
        for frame in &self.frames {
            frame.load()?;
        }
        Ok(())
    }

    pub fn unload(&mut self) {
        for frame in &self.frames {
            frame.unload();
        }
    }

    pub fn arrays_loaded(&self) -> bool {
        self.arrays.is_some()
    }

    fn arrays(&self) -> TrajResult<&TrajectoryArrays> {
        self.arrays.as_ref().ok_or(TrajError::NotMaterialized)
    }

    /// True particle count of each frame.
    pub fn n_per_frame(&self) -> TrajResult<Vec<usize>> {
        Ok(self.arrays()?.n.iter().flatten().copied().collect())
    }

    /// Padded particle count `N`.
    pub fn n_max(&self) -> TrajResult<usize> {
        Ok(self.arrays()?.type_ids.stride())
    }

    /// Sorted union of type names over all frames.
    pub fn type_names(&self) -> TrajResult<&[String]> {
        Ok(self.arrays()?.type_names.as_slice())
    }

    /// Per-particle indices into [`Trajectory::type_names`].
    pub fn type_ids(&self) -> TrajResult<&Stacked<u32>> {
        Ok(&self.arrays()?.type_ids)
    }

    pub fn positions(&self) -> TrajResult<&Stacked<[f64; 3]>> {
        traj_available(&self.arrays()?.position, Property::Position)
    }

    pub fn orientations(&self) -> TrajResult<&Stacked<Quat>> {
        traj_available(&self.arrays()?.orientation, Property::Orientation)
    }

    pub fn velocities(&self) -> TrajResult<&Stacked<[f64; 3]>> {
        traj_available(&self.arrays()?.velocity, Property::Velocity)
    }

    pub fn mass(&self) -> TrajResult<&Stacked<f64>> {
        traj_available(&self.arrays()?.mass, Property::Mass)
    }

    pub fn charge(&self) -> TrajResult<&Stacked<f64>> {
        traj_available(&self.arrays()?.charge, Property::Charge)
    }

    pub fn diameter(&self) -> TrajResult<&Stacked<f64>> {
        traj_available(&self.arrays()?.diameter, Property::Diameter)
    }

    pub fn moment_inertia(&self) -> TrajResult<&Stacked<[f64; 3]>> {
        traj_available(&self.arrays()?.moment_inertia, Property::MomentInertia)
    }

    pub fn angmom(&self) -> TrajResult<&Stacked<Quat>> {
        traj_available(&self.arrays()?.angmom, Property::Angmom)
    }

    pub fn image(&self) -> TrajResult<&Stacked<[i32; 3]>> {
        traj_available(&self.arrays()?.image, Property::Image)
    }
}

fn traj_available<T>(field: &Option<Stacked<T>>, property: Property) -> TrajResult<&Stacked<T>> {
    field
        .as_ref()
        .ok_or_else(|| TrajError::NotAvailable(property.name().to_string()))
}

impl FromIterator<Frame> for Trajectory {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a Frame;
    type IntoIter = TrajectoryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Single-pass cursor over a trajectory's frames.
///
/// When advancing, the previously yielded frame is unloaded if it was not
/// loaded at the moment it was yielded.
pub struct TrajectoryIter<'a> {
    frames: &'a [Frame],
    next: usize,
    pending_unload: Option<&'a Frame>,
}

impl<'a> Iterator for TrajectoryIter<'a> {
    type Item = &'a Frame;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(prev) = self.pending_unload.take() {
            prev.unload();
        }
        let frame = self.frames.get(self.next)?;
        self.next += 1;
        if !frame.is_loaded() {
            self.pending_unload = Some(frame);
        }
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.frames.len() - self.next;
        (left, Some(left))
    }
}

impl Drop for TrajectoryIter<'_> {
    fn drop(&mut self) {
        if let Some(prev) = self.pending_unload.take() {
            prev.unload();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::box3::Box3;
    use crate::record::RawFrameRecord;
    use crate::shapes::ShapeVariant;

    fn frame_with(n: usize, type_name: &str) -> Frame {
        Frame::from_raw(RawFrameRecord {
            box_matrix: Some(Box3::cubic(10.0).matrix()),
            types: vec![type_name.to_string()],
            type_shapes: vec![ShapeVariant::default()],
            typeid: vec![0; n],
            position: Some((0..n).map(|i| [i as f64, 0.0, 0.0]).collect()),
            orientation: Some(vec![[0.0, 1.0, 0.0, 0.0]; n]),
            mass: Some(vec![2.0; n]),
            ..Default::default()
        })
    }

    #[test]
    fn accessors_require_materialization() {
        let traj = Trajectory::new(vec![frame_with(1, "A")]);
        assert!(matches!(traj.positions(), Err(TrajError::NotMaterialized)));
        assert!(matches!(traj.n_per_frame(), Err(TrajError::NotMaterialized)));
    }

    #[test]
    fn iteration_unloads_frames_it_loaded() {
        let traj = Trajectory::new(vec![frame_with(1, "A"), frame_with(2, "A")]);
        traj.frames()[1].load().unwrap();
        let mut it = traj.iter();
        let first = it.next().unwrap();
        first.load().unwrap();
        assert!(first.is_loaded());
        let second = it.next().unwrap();
        assert!(!traj.frames()[0].is_loaded());
        assert!(second.is_loaded());
        assert!(it.next().is_none());
        drop(it);
        assert!(traj.frames()[1].is_loaded());
    }

    #[test]
    fn partial_property_is_not_available() {
        let mut bare = RawFrameRecord {
            box_matrix: Some(Box3::cubic(10.0).matrix()),
            types: vec!["A".into()],
            type_shapes: vec![ShapeVariant::default()],
            typeid: vec![0],
            position: Some(vec![[0.0; 3]]),
            ..Default::default()
        };
        bare.charge = None;
        let mut traj = Trajectory::new(vec![frame_with(2, "A"), Frame::from_raw(bare)]);
        traj.load_arrays().unwrap();
        assert!(traj.positions().is_ok());
        assert!(matches!(traj.mass(), Err(TrajError::NotAvailable(_))));
        assert!(traj.frames()[0].data().unwrap().mass().is_ok());
    }

    #[test]
    fn type_ids_index_sorted_union() {
        let mut traj = Trajectory::new(vec![frame_with(1, "B"), frame_with(2, "A")]);
        traj.load_arrays().unwrap();
        assert_eq!(traj.type_names().unwrap(), &["A".to_string(), "B".to_string()]);
        let ids = traj.type_ids().unwrap();
        assert_eq!(ids.frame(0).unwrap(), &[1, 0]);
        assert_eq!(ids.frame(1).unwrap(), &[0, 0]);
    }

    #[test]
    fn failed_load_arrays_resets_everything() {
        let broken = Frame::from_raw(RawFrameRecord::default());
        let mut traj = Trajectory::new(vec![frame_with(1, "A")]);
        traj.load_arrays().unwrap();
        assert!(traj.arrays_loaded());
        traj.frames.push(broken);
        assert!(traj.load_arrays().is_err());
        assert!(matches!(traj.positions(), Err(TrajError::NotMaterialized)));
        assert!(!traj.frames()[0].is_loaded());
    }

    #[test]
    fn slice_carries_array_views() {
        let mut traj: Trajectory = [1, 3, 2].iter().map(|&n| frame_with(n, "A")).collect();
        traj.load_arrays().unwrap();
        let sub = traj.slice(1..3).unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.n_per_frame().unwrap(), vec![3, 2]);
        assert_eq!(sub.positions().unwrap().frame(0).unwrap()[2], [2.0, 0.0, 0.0]);
        assert!(traj.slice(2..5).is_err());
    }

    #[test]
    fn unloaded_frames_adopt_the_first_dtype() {
        let first = frame_with(1, "A").with_dtype(Dtype::Float64).unwrap();
        let traj = Trajectory::new(vec![first, frame_with(2, "A")]);
        assert_eq!(traj.dtype(), Dtype::Float64);
        assert!(traj.frames().iter().all(|f| f.dtype() == Dtype::Float64));
    }

    #[test]
    fn dtype_change_is_all_or_nothing() {
        let mut traj = Trajectory::new(vec![frame_with(1, "A"), frame_with(2, "A")]);
        traj.frames()[1].load().unwrap();
        assert!(traj.set_dtype(Dtype::Float64).is_err());
        assert!(traj.frames().iter().all(|f| f.dtype() == Dtype::Float32));
        assert_eq!(traj.dtype(), Dtype::Float32);
    }

    #[test]
    fn dtype_change_blocked_by_loaded_frame() {
        let mut traj = Trajectory::new(vec![frame_with(1, "A")]);
        traj.frames()[0].load().unwrap();
        assert!(traj.set_dtype(Dtype::Float64).is_err());
        traj.unload();
        traj.set_dtype(Dtype::Float64).unwrap();
        assert_eq!(traj.frames()[0].dtype(), Dtype::Float64);
    }
}
