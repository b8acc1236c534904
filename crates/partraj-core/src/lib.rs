#![forbid(unsafe_code)]

pub mod box3;
pub mod canonical;
pub mod error;
pub mod frame;
pub mod quat;
pub mod record;
pub mod shapes;
pub mod snapshot;
pub mod trajectory;

pub use box3::Box3;
pub use canonical::{canonical_box, canonicalize, Canonical, QuatFields, VectorFields};
pub use error::{ParseWarning, TrajError, TrajResult, WarningKind};
pub use frame::{Frame, FrameSource};
pub use quat::Quat;
pub use record::{Dtype, FrameData, MetadataTable, Property, RawFrameRecord};
pub use shapes::{ShapeError, ShapeVariant};
pub use snapshot::{copy_from_snapshot, copy_to_snapshot, Column, MemorySnapshot, ParticleSnapshot};
pub use trajectory::{Stacked, Trajectory, TrajectoryIter};
