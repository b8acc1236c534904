//! Reader for the textual POS dialect.
//!
//! Opening a file only indexes it: the byte span of every frame is recorded
//! and each [`Frame`] decodes its own span on first access.

use std::cell::RefCell;
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::rc::Rc;

use fxhash::FxHashMap;
use partraj_core::box3::round_to;
use partraj_core::error::{ParseWarning, TrajError, TrajResult, WarningKind};
use partraj_core::quat::{self, Quat, IDENTITY};
use partraj_core::record::PLANAR_TOL;
use partraj_core::shapes::{self, ShapeVariant};
use partraj_core::{Frame, FrameSource, MetadataTable, RawFrameRecord, Trajectory};

use crate::config::ReadOptions;
use crate::{ReadSeek, SharedStream, TrajectoryDecoder};

const SKIP_TOKENS: [&str; 5] = [
    "translation",
    "antiAliasing",
    "zoomFactor",
    "showEdges",
    "connection",
];

fn is_comment(line: &str) -> bool {
    line.starts_with("//")
}

/// Byte range `[start, end)` of one frame inside the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSpan {
    pub start: u64,
    pub end: u64,
}

pub struct PosReader {
    stream: SharedStream,
    spans: Vec<FrameSpan>,
    precision: u32,
    default_type: Rc<str>,
}

impl PosReader {
    pub fn new<R: Read + Seek + 'static>(stream: R, options: &ReadOptions) -> TrajResult<Self> {
        Self::from_boxed(Box::new(stream), options)
    }

    pub fn from_boxed(stream: Box<dyn ReadSeek>, options: &ReadOptions) -> TrajResult<Self> {
        options.validate()?;
        let stream: SharedStream = Rc::new(RefCell::new(stream));
        let spans = {
            let mut guard = stream.borrow_mut();
            scan(&mut **guard)?
        };
        if spans.is_empty() {
            return Err(TrajError::Parse("did not read a single complete frame".into()));
        }
        tracing::info!(frames = spans.len(), "indexed pos frames");
        Ok(Self {
            stream,
            spans,
            precision: options.precision,
            default_type: Rc::from(options.default_type.as_str()),
        })
    }

    pub fn spans(&self) -> &[FrameSpan] {
        &self.spans
    }

    pub fn source(&self, index: usize) -> Option<PosFrameSource> {
        let span = *self.spans.get(index)?;
        Some(PosFrameSource {
            stream: Rc::clone(&self.stream),
            index,
            span,
            precision: self.precision,
            default_type: Rc::clone(&self.default_type),
        })
    }
}

impl TrajectoryDecoder for PosReader {
    fn n_frames(&self) -> usize {
        self.spans.len()
    }

    fn frame(&self, index: usize) -> Option<Frame> {
        let source = self.source(index)?;
        Some(Frame::new(Rc::new(source)))
    }
}

/// Reads and indexes a POS stream.
pub fn read_pos<R: Read + Seek + 'static>(stream: R, options: &ReadOptions) -> TrajResult<Trajectory> {
    let mut traj = PosReader::new(stream, options)?.into_trajectory();
    traj.set_dtype(options.dtype)?;
    Ok(traj)
}

fn scan(stream: &mut dyn ReadSeek) -> TrajResult<Vec<FrameSpan>> {
    stream.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(stream);
    let mut spans = Vec::new();
    let mut line = Vec::new();
    let mut start = 0u64;
    let mut offset = 0u64;
    let mut saw_box = false;
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line)?;
        if read == 0 {
            break;
        }
        offset += read as u64;
        if line.starts_with(b"eof") {
            spans.push(FrameSpan { start, end: offset });
            start = offset;
            saw_box = false;
        } else if line.starts_with(b"box") {
            saw_box = true;
        }
    }
    if offset > start {
        if saw_box {
            spans.push(FrameSpan { start, end: offset });
        } else {
            ParseWarning::emit(
                WarningKind::UnterminatedFrame,
                format!("unexpected end of file after byte {start}; trailing data ignored"),
            );
        }
    }
    tracing::debug!(frames = spans.len(), bytes = offset, "scanned pos stream");
    Ok(spans)
}

/// Decodes one frame span of a POS stream.
pub struct PosFrameSource {
    stream: SharedStream,
    index: usize,
    span: FrameSpan,
    precision: u32,
    default_type: Rc<str>,
}

impl FrameSource for PosFrameSource {
    fn decode_raw(&self, warnings: &mut Vec<ParseWarning>) -> TrajResult<RawFrameRecord> {
        let mut guard = self.stream.borrow_mut();
        let stream: &mut dyn ReadSeek = &mut **guard;
        stream.seek(SeekFrom::Start(self.span.start))?;
        let reader = BufReader::new(stream.take(self.span.end - self.span.start));
        let mut parser = FrameParser::new(self.precision, &self.default_type);
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| match err.kind() {
                ErrorKind::InvalidData => TrajError::Parse(format!(
                    "line #{} of {} is not valid UTF-8",
                    i + 1,
                    self.describe()
                )),
                _ => TrajError::Io(err),
            })?;
            if parser.feed(i + 1, &line, warnings)? == Flow::Done {
                break;
            }
        }
        parser.finish(warnings)
    }

    fn describe(&self) -> String {
        format!(
            "pos frame {} (bytes {}..{})",
            self.index, self.span.start, self.span.end
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Neutral,
    InFrame,
    InMetadata,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Done,
}

struct FrameParser<'a> {
    precision: u32,
    default_type: &'a str,
    state: State,
    resume: State,
    monotype: bool,
    box_matrix: Option<[[f64; 3]; 3]>,
    rotation: Option<Quat>,
    types: Vec<String>,
    shapes: Vec<ShapeVariant>,
    lookup: FxHashMap<String, u32>,
    typeid: Vec<u32>,
    positions: Vec<[f64; 3]>,
    orientations: Vec<Option<Quat>>,
    metadata: Option<MetadataTable>,
}

impl<'a> FrameParser<'a> {
    fn new(precision: u32, default_type: &'a str) -> Self {
        Self {
            precision,
            default_type,
            state: State::Neutral,
            resume: State::Neutral,
            monotype: false,
            box_matrix: None,
            rotation: None,
            types: Vec::new(),
            shapes: Vec::new(),
            lookup: FxHashMap::default(),
            typeid: Vec::new(),
            positions: Vec::new(),
            orientations: Vec::new(),
            metadata: None,
        }
    }

    fn feed(&mut self, line_no: usize, line: &str, warnings: &mut Vec<ParseWarning>) -> TrajResult<Flow> {
        if is_comment(line) {
            return Ok(Flow::Continue);
        }
        if self.state == State::InMetadata {
            return self.feed_metadata(line, warnings);
        }
        let fail = || TrajError::Parse(format!("failed to read line #{line_no}: {line}"));

        if line.starts_with('#') {
            if !line.starts_with("#[data]") {
                return Err(fail());
            }
            if self.metadata.is_some() {
                return Err(TrajError::Parse(format!(
                    "second metadata block on line #{line_no}"
                )));
            }
            self.metadata = Some(MetadataTable::new(line.split_whitespace().skip(1)));
            self.resume = self.state;
            self.state = State::InMetadata;
            return Ok(Flow::Continue);
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&head) = tokens.first() else {
            return Ok(Flow::Continue);
        };
        if SKIP_TOKENS.contains(&head) {
            return Ok(Flow::Continue);
        }
        self.state = State::InFrame;
        match head {
            "eof" => return Ok(Flow::Done),
            "def" => {
                let parts: Vec<&str> = line.trim().split('"').collect();
                let [definition, spec, rest] = parts.as_slice() else {
                    return Err(fail());
                };
                if !rest.is_empty() {
                    return Err(fail());
                }
                let name = definition.split_whitespace().nth(1).ok_or_else(fail)?;
                let shape = self.lenient_shape(spec, warnings);
                self.define(name, shape, warnings);
            }
            "shape" => {
                let spec = line.split('"').nth(1).ok_or_else(fail)?;
                let shape = self.lenient_shape(spec, warnings);
                let name = self.default_type.to_string();
                self.register(name, shape);
                if self.shapes.len() != 1 {
                    return Err(fail());
                }
                self.monotype = true;
            }
            "boxMatrix" | "box" => {
                let values = self.numbers(&tokens[1..], line_no, line)?;
                self.box_matrix = Some(match values.len() {
                    9 => [
                        [values[0], values[1], values[2]],
                        [values[3], values[4], values[5]],
                        [values[6], values[7], values[8]],
                    ],
                    3 => [
                        [values[0], 0.0, 0.0],
                        [0.0, values[1], 0.0],
                        [0.0, 0.0, values[2]],
                    ],
                    _ => return Err(fail()),
                });
            }
            "rotation" => {
                let angles = parse_floats(&tokens[1..]).ok_or_else(fail)?;
                let [x, y, z] = angles.as_slice() else {
                    return Err(fail());
                };
                self.rotation = Some(quat::from_euler_xyz_degrees([*x, *y, *z]));
            }
            _ => self.particle(&tokens, line_no, line)?,
        }
        Ok(Flow::Continue)
    }

    fn feed_metadata(&mut self, line: &str, warnings: &mut Vec<ParseWarning>) -> TrajResult<Flow> {
        if line.starts_with("#[done]") {
            self.state = self.resume;
            return Ok(Flow::Continue);
        }
        if line.starts_with("eof") {
            warnings.push(ParseWarning::emit(
                WarningKind::TruncatedMetadata,
                "frame ended inside a metadata block",
            ));
            self.state = self.resume;
            return Ok(Flow::Done);
        }
        let values: Vec<&str> = line.split_whitespace().collect();
        if values.is_empty() {
            return Ok(Flow::Continue);
        }
        if let Some(table) = self.metadata.as_mut() {
            if !table.push_row(&values) {
                warnings.push(ParseWarning::emit(
                    WarningKind::RowCountMismatch,
                    format!(
                        "metadata row has {} values for {} columns; row skipped",
                        values.len(),
                        table.columns().len()
                    ),
                ));
            }
        }
        Ok(Flow::Continue)
    }

    fn lenient_shape(&self, spec: &str, warnings: &mut Vec<ParseWarning>) -> ShapeVariant {
        let (shape, warning) = shapes::parse_lenient(spec);
        warnings.extend(warning);
        shape
    }

    fn register(&mut self, name: String, shape: ShapeVariant) -> u32 {
        let id = self.types.len() as u32;
        self.lookup.insert(name.clone(), id);
        self.types.push(name);
        self.shapes.push(shape);
        id
    }

    fn define(&mut self, name: &str, shape: ShapeVariant, warnings: &mut Vec<ParseWarning>) {
        match self.lookup.get(name) {
            Some(&id) => {
                self.shapes[id as usize] = shape;
                warnings.push(ParseWarning::emit(
                    WarningKind::TypeRedefinition,
                    format!("redefinition of type '{name}'"),
                ));
            }
            None => {
                self.register(name.to_string(), shape);
            }
        }
    }

    fn particle(&mut self, tokens: &[&str], line_no: usize, line: &str) -> TrajResult<()> {
        let id = if self.monotype {
            self.lookup.get(self.default_type).copied().unwrap_or(0)
        } else {
            let name = tokens[0];
            match self.lookup.get(name) {
                Some(&id) => id,
                None => {
                    // Undeclared types may carry their shape inline, as in
                    // `sphere 1 ff0000ff x y z`.
                    let inline = tokens[..tokens.len().min(3)].join(" ");
                    let shape = shapes::parse(&inline).unwrap_or_else(|_| ShapeVariant::default());
                    self.register(name.to_string(), shape)
                }
            }
        };
        let is_arrow = self.shapes.get(id as usize).is_some_and(ShapeVariant::is_arrow);
        // Monotype lines carry no type name.
        let fields = if self.monotype { tokens } else { &tokens[1..] };
        let n = fields.len();
        let (xyz, rot): (&[&str], Option<Quat>) = if is_arrow && n == 6 {
            let d = self.numbers(&fields[3..6], line_no, line)?;
            (&fields[..3], Some([d[0], d[1], d[2], 0.0]))
        } else if is_arrow && n == 5 {
            let d = self.numbers(&fields[3..5], line_no, line)?;
            (&fields[..3], Some([d[0], d[1], 0.0, 0.0]))
        } else if n >= 7 {
            let q = self.numbers(&fields[n - 4..], line_no, line)?;
            (&fields[n - 7..n - 4], Some([q[0], q[1], q[2], q[3]]))
        } else if n >= 3 {
            (&fields[n - 3..], None)
        } else {
            return Err(TrajError::Parse(format!(
                "failed to read line #{line_no}: {line}"
            )));
        };
        let p = self.numbers(xyz, line_no, line)?;
        self.typeid.push(id);
        self.positions.push([p[0], p[1], p[2]]);
        self.orientations.push(rot);
        Ok(())
    }

    fn numbers(&self, tokens: &[&str], line_no: usize, line: &str) -> TrajResult<Vec<f64>> {
        let values = parse_floats(tokens).ok_or_else(|| {
            TrajError::Parse(format!("failed to read line #{line_no}: {line}"))
        })?;
        Ok(values.into_iter().map(|v| round_to(v, self.precision)).collect())
    }

    fn finish(self, warnings: &mut Vec<ParseWarning>) -> TrajResult<RawFrameRecord> {
        if self.state == State::InMetadata {
            warnings.push(ParseWarning::emit(
                WarningKind::TruncatedMetadata,
                "stream ended inside a metadata block",
            ));
        }
        let positions: Vec<[f64; 3]> = match self.rotation {
            Some(q) => {
                let inv = quat::inverse(q);
                self.positions.iter().map(|&p| quat::rotate(inv, p)).collect()
            }
            None => self.positions,
        };
        let planar = !positions.is_empty() && positions.iter().all(|p| p[2].abs() <= PLANAR_TOL);
        let orientation = if self.orientations.iter().all(Option::is_none) {
            None
        } else {
            Some(
                self.orientations
                    .iter()
                    .map(|q| q.unwrap_or(IDENTITY))
                    .collect(),
            )
        };
        if let Some(table) = &self.metadata {
            if table.n_rows() != positions.len() {
                warnings.push(ParseWarning::emit(
                    WarningKind::RowCountMismatch,
                    format!(
                        "metadata has {} rows for {} particles",
                        table.n_rows(),
                        positions.len()
                    ),
                ));
            }
        }
        Ok(RawFrameRecord {
            box_matrix: self.box_matrix,
            box_dimensions: if planar { 2 } else { 3 },
            types: self.types,
            type_shapes: self.shapes,
            typeid: self.typeid,
            position: Some(positions),
            orientation,
            metadata: self.metadata,
            view_rotation: self.rotation,
            ..Default::default()
        })
    }
}

fn parse_floats(tokens: &[&str]) -> Option<Vec<f64>> {
    tokens.iter().map(|t| t.parse::<f64>().ok()).collect()
}
