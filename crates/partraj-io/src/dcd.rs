//! Reader for CHARMM/NAMD style DCD files.
//!
//! DCD frames carry coordinates and, optionally, a unit cell. Everything
//! else comes from a [`DcdTopology`]: either a template frame whose
//! properties are copied into every decoded frame, or a single type name.

use std::cell::RefCell;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::rc::Rc;

use partraj_core::error::{ParseWarning, TrajError, TrajResult, WarningKind};
use partraj_core::quat::IDENTITY;
use partraj_core::{Frame, FrameData, FrameSource, RawFrameRecord, ShapeVariant, Trajectory};

use crate::{ReadSeek, SharedStream, TrajectoryDecoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitCellLayout {
    StandardAbcAngles,
    CharmmAgBcAngles,
}

/// What a DCD file cannot encode itself.
#[derive(Clone, Debug)]
pub enum DcdTopology {
    /// Every particle gets this type and the default shape.
    DefaultType(String),
    /// Types, shapes and per-particle properties are copied from the
    /// template. A 2-D template makes the third coordinate an in-plane
    /// rotation angle.
    Template(Rc<FrameData>),
}

impl Default for DcdTopology {
    fn default() -> Self {
        DcdTopology::DefaultType("A".to_string())
    }
}

#[derive(Debug, Clone, Copy)]
struct DcdHeader {
    endian: Endian,
    marker_size: usize,
    n_atoms: usize,
    n_frames_hint: Option<usize>,
    layout: UnitCellLayout,
}

pub struct DcdReader {
    stream: SharedStream,
    header: DcdHeader,
    offsets: Vec<u64>,
    topology: Rc<DcdTopology>,
}

impl DcdReader {
    pub fn new<R: Read + Seek + 'static>(stream: R, topology: DcdTopology) -> TrajResult<Self> {
        Self::from_boxed(Box::new(stream), topology)
    }

    pub fn from_boxed(stream: Box<dyn ReadSeek>, topology: DcdTopology) -> TrajResult<Self> {
        let stream: SharedStream = Rc::new(RefCell::new(stream));
        let (header, offsets) = {
            let mut guard = stream.borrow_mut();
            let mut reader = BufReader::new(&mut **guard);
            let header = read_header(&mut reader).map_err(|err| match err {
                TrajError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                    TrajError::Parse("truncated DCD header".into())
                }
                other => other,
            })?;
            let offsets = scan_frames(&mut reader, &header)?;
            (header, offsets)
        };
        if let DcdTopology::Template(template) = &topology {
            if template.n_particles() != header.n_atoms {
                return Err(TrajError::Parse(format!(
                    "template has {} particles, DCD file has {}",
                    template.n_particles(),
                    header.n_atoms
                )));
            }
            if template.box3().dimensions == 2 {
                tracing::info!("2-dimensional template; third coordinate is read as a rotation angle");
            }
        }
        if let Some(hint) = header.n_frames_hint {
            if hint != offsets.len() {
                tracing::debug!(header = hint, found = offsets.len(), "DCD frame count differs from header");
            }
        }
        tracing::info!(frames = offsets.len(), atoms = header.n_atoms, "indexed dcd frames");
        Ok(Self {
            stream,
            header,
            offsets,
            topology: Rc::new(topology),
        })
    }

    pub fn n_atoms(&self) -> usize {
        self.header.n_atoms
    }

    /// Byte offset of each frame's first record.
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}

impl TrajectoryDecoder for DcdReader {
    fn n_frames(&self) -> usize {
        self.offsets.len()
    }

    fn frame(&self, index: usize) -> Option<Frame> {
        let offset = *self.offsets.get(index)?;
        Some(Frame::new(Rc::new(DcdFrameSource {
            stream: Rc::clone(&self.stream),
            header: self.header,
            index,
            offset,
            topology: Rc::clone(&self.topology),
        })))
    }
}

/// Reads and indexes a DCD stream.
pub fn read_dcd<R: Read + Seek + 'static>(stream: R, topology: DcdTopology) -> TrajResult<Trajectory> {
    Ok(DcdReader::new(stream, topology)?.into_trajectory())
}

struct DcdFrameSource {
    stream: SharedStream,
    header: DcdHeader,
    index: usize,
    offset: u64,
    topology: Rc<DcdTopology>,
}

impl FrameSource for DcdFrameSource {
    fn decode_raw(&self, _warnings: &mut Vec<ParseWarning>) -> TrajResult<RawFrameRecord> {
        let (cell, coords) = {
            let mut guard = self.stream.borrow_mut();
            guard.seek(SeekFrom::Start(self.offset))?;
            let mut reader = BufReader::new(&mut **guard);
            read_frame(&mut reader, &self.header)?
        };
        let n = self.header.n_atoms;
        let mut positions: Vec<[f64; 3]> = (0..n)
            .map(|i| [coords[0][i] as f64, coords[1][i] as f64, coords[2][i] as f64])
            .collect();

        let mut raw = match self.topology.as_ref() {
            DcdTopology::DefaultType(name) => RawFrameRecord {
                types: vec![name.clone()],
                type_shapes: vec![ShapeVariant::default()],
                typeid: vec![0; n],
                ..Default::default()
            },
            DcdTopology::Template(template) => RawFrameRecord::from_frame_data(template),
        };
        let orientation = if raw.box_dimensions == 2 {
            positions
                .iter_mut()
                .map(|p| {
                    let angle = std::mem::replace(&mut p[2], 0.0);
                    [(angle * 0.5).cos(), 0.0, 0.0, (angle * 0.5).sin()]
                })
                .collect()
        } else {
            vec![IDENTITY; n]
        };
        if let Some(matrix) = cell {
            raw.box_matrix = Some(matrix);
        }
        if raw.box_matrix.is_none() {
            return Err(TrajError::Parse(format!(
                "DCD frame {} has no unit cell and no template box",
                self.index
            )));
        }
        raw.position = Some(positions);
        raw.orientation = Some(orientation);
        Ok(raw)
    }

    fn describe(&self) -> String {
        format!("dcd frame {} (offset {})", self.index, self.offset)
    }
}

fn read_header(file: &mut (impl Read + Seek)) -> TrajResult<DcdHeader> {
    let (endian, marker_size, header_len) = detect_header_marker(file)?;
    let header_len = usize::try_from(header_len)
        .map_err(|_| TrajError::Parse("DCD header length too large".into()))?;
    let mut header = vec![0u8; header_len];
    file.read_exact(&mut header)?;
    let trailer = read_marker(file, endian, marker_size)?;
    if trailer != header_len as u64 {
        return Err(TrajError::Parse("DCD header record length mismatch".into()));
    }
    if &header[0..4] != b"CORD" {
        return Err(TrajError::Parse("DCD header does not start with CORD".into()));
    }
    let n_frames_hint = parse_n_frames(&header, endian);
    let layout = parse_unitcell_layout(&header, endian);

    skip_record(file, endian, marker_size)?;

    let natoms_len = read_marker(file, endian, marker_size)?;
    if natoms_len != 4 {
        return Err(TrajError::Parse("unexpected natoms record length".into()));
    }
    let natoms = read_i32(file, endian)?;
    if read_marker(file, endian, marker_size)? != natoms_len {
        return Err(TrajError::Parse("natoms record length mismatch".into()));
    }
    if natoms <= 0 {
        return Err(TrajError::Parse(format!("invalid natoms {natoms}")));
    }
    Ok(DcdHeader {
        endian,
        marker_size,
        n_atoms: natoms as usize,
        n_frames_hint,
        layout,
    })
}

fn scan_frames(file: &mut (impl Read + Seek), header: &DcdHeader) -> TrajResult<Vec<u64>> {
    let mut offsets = Vec::new();
    loop {
        let offset = file.stream_position()?;
        match skip_frame(file, header) {
            Ok(true) => offsets.push(offset),
            Ok(false) => break,
            Err(TrajError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                ParseWarning::emit(
                    WarningKind::UnterminatedFrame,
                    format!("truncated DCD frame at byte {offset}; ignored"),
                );
                break;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(offsets)
}

fn skip_frame(file: &mut (impl Read + Seek), header: &DcdHeader) -> TrajResult<bool> {
    let expected_len = (header.n_atoms * 4) as u64;
    let Some(mut len) = read_marker_opt(file, header.endian, header.marker_size)? else {
        return Ok(false);
    };
    if len != expected_len && is_unitcell_len(len) {
        seek_record_with_len(file, header, len)?;
        len = read_marker(file, header.endian, header.marker_size)?;
    }
    for axis in 0..3 {
        if axis > 0 {
            len = read_marker(file, header.endian, header.marker_size)?;
        }
        if len != expected_len {
            return Err(TrajError::Parse(
                "unexpected DCD coordinate record length".into(),
            ));
        }
        seek_record_with_len(file, header, len)?;
    }
    Ok(true)
}

fn seek_record_with_len(file: &mut (impl Read + Seek), header: &DcdHeader, len: u64) -> TrajResult<()> {
    let step = i64::try_from(len).map_err(|_| TrajError::Parse("DCD record too large".into()))?;
    file.seek(SeekFrom::Current(step))?;
    if read_marker(file, header.endian, header.marker_size)? != len {
        return Err(TrajError::Parse("record length mismatch".into()));
    }
    Ok(())
}

type Axes = [Vec<f32>; 3];

fn read_frame(file: &mut impl Read, header: &DcdHeader) -> TrajResult<(Option<[[f64; 3]; 3]>, Axes)> {
    let (endian, marker_size, n) = (header.endian, header.marker_size, header.n_atoms);
    let expected_len = (n * 4) as u64;
    let mut len = read_marker(file, endian, marker_size)?;
    let mut cell = None;
    if len != expected_len && is_unitcell_len(len) {
        cell = read_unitcell_with_len(file, endian, marker_size, len, header.layout)?;
        len = read_marker(file, endian, marker_size)?;
    }
    let mut buf = Vec::new();
    let mut axes: Axes = [Vec::new(), Vec::new(), Vec::new()];
    for (i, axis) in axes.iter_mut().enumerate() {
        if i > 0 {
            len = read_marker(file, endian, marker_size)?;
        }
        read_axis_payload_into_buffer(file, endian, marker_size, n, len, &mut buf, axis)?;
    }
    Ok((cell, axes))
}

fn read_axis_payload_into_buffer(
    file: &mut impl Read,
    endian: Endian,
    marker_size: usize,
    count: usize,
    len: u64,
    axis_buf: &mut Vec<u8>,
    axis_f32: &mut Vec<f32>,
) -> TrajResult<()> {
    let expected_len = (count * 4) as u64;
    if len != expected_len {
        return Err(TrajError::Parse("unexpected float record length".into()));
    }
    axis_f32.resize(count, 0.0);
    if little_endian_fast_path(endian) {
        let dst = bytemuck::cast_slice_mut(&mut axis_f32[..count]);
        file.read_exact(dst)?;
    } else {
        axis_buf.resize(count * 4, 0);
        file.read_exact(axis_buf)?;
        for (dst, chunk) in axis_f32.iter_mut().zip(axis_buf.chunks_exact(4)) {
            let bytes = [chunk[0], chunk[1], chunk[2], chunk[3]];
            *dst = match endian {
                Endian::Little => f32::from_le_bytes(bytes),
                Endian::Big => f32::from_be_bytes(bytes),
            };
        }
    }
    if read_marker(file, endian, marker_size)? != len {
        return Err(TrajError::Parse("float record length mismatch".into()));
    }
    Ok(())
}

#[inline]
fn little_endian_fast_path(endian: Endian) -> bool {
    cfg!(target_endian = "little") && matches!(endian, Endian::Little)
}

fn detect_header_marker(file: &mut (impl Read + Seek)) -> TrajResult<(Endian, usize, u64)> {
    let start = file.stream_position()?;
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    let len64_le = u64::from_le_bytes(buf);
    let len64_be = u64::from_be_bytes(buf);
    if is_header_len(len64_le) {
        return Ok((Endian::Little, 8, len64_le));
    }
    if is_header_len(len64_be) {
        return Ok((Endian::Big, 8, len64_be));
    }
    file.seek(SeekFrom::Start(start + 4))?;
    let len_le = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64;
    let len_be = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64;
    if is_header_len(len_le) {
        Ok((Endian::Little, 4, len_le))
    } else if is_header_len(len_be) {
        Ok((Endian::Big, 4, len_be))
    } else {
        Err(TrajError::Unsupported("unsupported DCD record marker".into()))
    }
}

fn is_header_len(len: u64) -> bool {
    matches!(len, 84 | 164)
}

fn is_unitcell_len(len: u64) -> bool {
    matches!(len, 48 | 24)
}

fn read_marker(file: &mut impl Read, endian: Endian, marker_size: usize) -> TrajResult<u64> {
    read_marker_opt(file, endian, marker_size)?
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into())
}

fn read_marker_opt(file: &mut impl Read, endian: Endian, marker_size: usize) -> TrajResult<Option<u64>> {
    let mut buf = [0u8; 8];
    let buf = match marker_size {
        4 | 8 => &mut buf[..marker_size],
        _ => return Err(TrajError::Unsupported("unsupported DCD marker size".into())),
    };
    match file.read_exact(buf) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    Ok(Some(match (marker_size, endian) {
        (4, Endian::Little) => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64,
        (4, Endian::Big) => u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64,
        (_, Endian::Little) => u64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]),
        (_, Endian::Big) => u64::from_be_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]),
    }))
}

fn read_i32(file: &mut impl Read, endian: Endian) -> TrajResult<i32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(match endian {
        Endian::Little => i32::from_le_bytes(buf),
        Endian::Big => i32::from_be_bytes(buf),
    })
}

fn read_f32(file: &mut impl Read, endian: Endian) -> TrajResult<f32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(match endian {
        Endian::Little => f32::from_le_bytes(buf),
        Endian::Big => f32::from_be_bytes(buf),
    })
}

fn read_f64(file: &mut impl Read, endian: Endian) -> TrajResult<f64> {
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    Ok(match endian {
        Endian::Little => f64::from_le_bytes(buf),
        Endian::Big => f64::from_be_bytes(buf),
    })
}

fn skip_record(file: &mut impl Read, endian: Endian, marker_size: usize) -> TrajResult<()> {
    let len = read_marker(file, endian, marker_size)?;
    let copied = std::io::copy(&mut file.by_ref().take(len), &mut std::io::sink())?;
    if copied != len {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    if read_marker(file, endian, marker_size)? != len {
        return Err(TrajError::Parse("record length mismatch".into()));
    }
    Ok(())
}

fn read_unitcell_with_len(
    file: &mut impl Read,
    endian: Endian,
    marker_size: usize,
    len: u64,
    layout: UnitCellLayout,
) -> TrajResult<Option<[[f64; 3]; 3]>> {
    let mut values = [0.0f64; 6];
    for v in values.iter_mut() {
        *v = if len == 24 {
            read_f32(file, endian)? as f64
        } else {
            read_f64(file, endian)?
        };
    }
    if read_marker(file, endian, marker_size)? != len {
        return Err(TrajError::Parse("unitcell record length mismatch".into()));
    }
    let alternate = match layout {
        UnitCellLayout::StandardAbcAngles => UnitCellLayout::CharmmAgBcAngles,
        UnitCellLayout::CharmmAgBcAngles => UnitCellLayout::StandardAbcAngles,
    };
    Ok(lattice_from_values(values, layout).or_else(|| lattice_from_values(values, alternate)))
}

/// Lattice matrix (columns `a`, `b`, `c`) from cell lengths and angles.
fn lattice_from_values(values: [f64; 6], layout: UnitCellLayout) -> Option<[[f64; 3]; 3]> {
    let (a, b, c, alpha_raw, beta_raw, gamma_raw) = match layout {
        UnitCellLayout::StandardAbcAngles => (
            values[0], values[1], values[2], values[3], values[4], values[5],
        ),
        // [A, gamma, B, beta, alpha, C]
        UnitCellLayout::CharmmAgBcAngles => (
            values[0], values[2], values[5], values[4], values[3], values[1],
        ),
    };
    let min_len = 1e-6;
    if [a, b, c].iter().any(|l| !l.is_finite() || *l <= min_len) {
        return None;
    }
    let alpha = unitcell_angle_to_radians(alpha_raw);
    let beta = unitcell_angle_to_radians(beta_raw);
    let gamma = unitcell_angle_to_radians(gamma_raw);
    if !alpha.is_finite() || !beta.is_finite() || !gamma.is_finite() {
        return None;
    }
    let sin_gamma = gamma.sin();
    if sin_gamma.abs() < 1e-8 {
        return None;
    }
    let bx = b * gamma.cos();
    let by = b * sin_gamma;
    let cx = c * beta.cos();
    let cy = c * (alpha.cos() - beta.cos() * gamma.cos()) / sin_gamma;
    let cz_sq = c * c - cx * cx - cy * cy;
    if !cz_sq.is_finite() || cz_sq <= 0.0 {
        return None;
    }
    Some([[a, bx, cx], [0.0, by, cy], [0.0, 0.0, cz_sq.sqrt()]])
}

/// Angles are stored either as cosines or in degrees.
fn unitcell_angle_to_radians(value: f64) -> f64 {
    if value.abs() <= 1.0 {
        value.clamp(-1.0, 1.0).acos()
    } else {
        value.to_radians()
    }
}

fn parse_n_frames(header: &[u8], endian: Endian) -> Option<usize> {
    if header.len() < 8 || &header[0..4] != b"CORD" {
        return None;
    }
    let raw = [header[4], header[5], header[6], header[7]];
    let n = match endian {
        Endian::Little => i32::from_le_bytes(raw),
        Endian::Big => i32::from_be_bytes(raw),
    };
    (n > 0).then_some(n as usize)
}

fn parse_unitcell_layout(header: &[u8], endian: Endian) -> UnitCellLayout {
    // icntrl[19] holds the CHARMM version.
    if header.len() >= 84 {
        let raw = [header[80], header[81], header[82], header[83]];
        let version = match endian {
            Endian::Little => i32::from_le_bytes(raw),
            Endian::Big => i32::from_be_bytes(raw),
        };
        if version > 0 {
            return UnitCellLayout::CharmmAgBcAngles;
        }
    }
    UnitCellLayout::StandardAbcAngles
}
