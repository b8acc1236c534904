//! Reader for HOOMD-blue XML snapshots.
//!
//! A file holds a single `<configuration>`. The document is checked for
//! well-formedness when the reader is built; properties are extracted when
//! the frame is first loaded. The usual use is as the topology template of a
//! DCD trajectory.

use std::io::{Read, Seek, SeekFrom};
use std::rc::Rc;
use std::str::FromStr;

use partraj_core::error::{ParseWarning, TrajError, TrajResult, WarningKind};
use partraj_core::{Frame, FrameSource, RawFrameRecord, ShapeVariant, Trajectory};
use roxmltree::{Document, Node};

use crate::config::ReadOptions;
use crate::{type_table, ReadSeek, TrajectoryDecoder};

pub struct HoomdXmlReader {
    text: Rc<str>,
    default_type: Rc<str>,
}

impl HoomdXmlReader {
    pub fn new<R: Read + Seek + 'static>(stream: R, options: &ReadOptions) -> TrajResult<Self> {
        Self::from_boxed(Box::new(stream), options)
    }

    pub fn from_boxed(mut stream: Box<dyn ReadSeek>, options: &ReadOptions) -> TrajResult<Self> {
        stream.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| TrajError::Parse(format!("HOOMD XML is not valid UTF-8: {e}")))?;
        {
            let doc = parse_document(&text)?;
            configuration(&doc)?;
        }
        tracing::info!(bytes = text.len(), "read hoomd xml snapshot");
        Ok(Self {
            text: text.into(),
            default_type: options.default_type.as_str().into(),
        })
    }
}

impl TrajectoryDecoder for HoomdXmlReader {
    fn n_frames(&self) -> usize {
        1
    }

    fn frame(&self, index: usize) -> Option<Frame> {
        (index == 0).then(|| {
            Frame::new(Rc::new(HoomdXmlFrameSource {
                text: Rc::clone(&self.text),
                default_type: Rc::clone(&self.default_type),
            }))
        })
    }
}

pub fn read_hoomdxml<R: Read + Seek + 'static>(stream: R, options: &ReadOptions) -> TrajResult<Trajectory> {
    let mut traj = HoomdXmlReader::new(stream, options)?.into_trajectory();
    traj.set_dtype(options.dtype)?;
    Ok(traj)
}

struct HoomdXmlFrameSource {
    text: Rc<str>,
    default_type: Rc<str>,
}

impl FrameSource for HoomdXmlFrameSource {
    fn decode_raw(&self, warnings: &mut Vec<ParseWarning>) -> TrajResult<RawFrameRecord> {
        let doc = parse_document(&self.text)?;
        let config = configuration(&doc)?;
        let dimensions = match config.attribute("dimensions") {
            Some(v) => v
                .trim()
                .parse::<u8>()
                .map_err(|_| TrajError::Parse(format!("invalid dimensions attribute '{v}'")))?,
            None => 3,
        };
        let box_node = child(config, "box")
            .ok_or_else(|| TrajError::Parse("configuration has no <box> element".into()))?;

        let position = vectors::<f64, 3>(config, "position", warnings)?
            .ok_or_else(|| TrajError::Parse("configuration has no <position> element".into()))?;
        let n = position.len();
        let (types, typeid) = match child(config, "type") {
            Some(node) => {
                let names: Vec<&str> = node.text().unwrap_or("").split_whitespace().collect();
                check_count(node, "type", names.len(), warnings);
                type_table(&names)
            }
            None => (vec![self.default_type.to_string()], vec![0; n]),
        };
        let type_shapes = vec![ShapeVariant::default(); types.len()];

        Ok(RawFrameRecord {
            box_matrix: Some(box_matrix(box_node)?),
            box_dimensions: dimensions,
            types,
            type_shapes,
            typeid,
            position: Some(position),
            orientation: vectors::<f64, 4>(config, "orientation", warnings)?,
            velocity: vectors::<f64, 3>(config, "velocity", warnings)?,
            mass: scalars(config, "mass", warnings)?,
            charge: scalars(config, "charge", warnings)?,
            diameter: scalars(config, "diameter", warnings)?,
            moment_inertia: vectors::<f64, 3>(config, "moment_inertia", warnings)?,
            angmom: vectors::<f64, 4>(config, "angmom", warnings)?,
            image: vectors::<i32, 3>(config, "image", warnings)?,
            ..Default::default()
        })
    }

    fn describe(&self) -> String {
        "hoomd xml configuration".to_string()
    }
}

fn parse_document(text: &str) -> TrajResult<Document<'_>> {
    Document::parse(text).map_err(|e| TrajError::Parse(format!("invalid HOOMD XML: {e}")))
}

fn configuration<'a, 'input>(doc: &'a Document<'input>) -> TrajResult<Node<'a, 'input>> {
    child(doc.root_element(), "configuration")
        .ok_or_else(|| TrajError::Parse("HOOMD XML has no <configuration> element".into()))
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(name))
}

fn box_matrix(node: Node<'_, '_>) -> TrajResult<[[f64; 3]; 3]> {
    let get = |name: &str, default: Option<f64>| -> TrajResult<f64> {
        match node.attribute(name) {
            Some(v) => v
                .trim()
                .parse::<f64>()
                .map_err(|_| TrajError::Parse(format!("invalid box attribute {name}='{v}'"))),
            None => default.ok_or_else(|| TrajError::Parse(format!("box is missing '{name}'"))),
        }
    };
    let (lx, ly, lz) = (get("lx", None)?, get("ly", None)?, get("lz", None)?);
    let (xy, xz, yz) = (get("xy", Some(0.0))?, get("xz", Some(0.0))?, get("yz", Some(0.0))?);
    Ok([
        [lx, xy * ly, xz * lz],
        [0.0, ly, yz * lz],
        [0.0, 0.0, lz],
    ])
}

/// Whitespace-separated rows of `N` values, or `None` when the element is
/// absent.
fn vectors<T, const N: usize>(
    config: Node<'_, '_>,
    name: &str,
    warnings: &mut Vec<ParseWarning>,
) -> TrajResult<Option<Vec<[T; N]>>>
where
    T: FromStr + Copy + Default,
{
    let Some(node) = child(config, name) else {
        return Ok(None);
    };
    let values = node
        .text()
        .unwrap_or("")
        .split_whitespace()
        .map(|t| {
            t.parse::<T>()
                .map_err(|_| TrajError::Parse(format!("invalid value '{t}' in <{name}>")))
        })
        .collect::<TrajResult<Vec<T>>>()?;
    if values.len() % N != 0 {
        return Err(TrajError::Parse(format!(
            "<{name}> holds {} values, not a multiple of {N}",
            values.len()
        )));
    }
    let rows: Vec<[T; N]> = values
        .chunks_exact(N)
        .map(|c| {
            let mut row = [T::default(); N];
            row.copy_from_slice(c);
            row
        })
        .collect();
    check_count(node, name, rows.len(), warnings);
    Ok(Some(rows))
}

fn scalars(
    config: Node<'_, '_>,
    name: &str,
    warnings: &mut Vec<ParseWarning>,
) -> TrajResult<Option<Vec<f64>>> {
    Ok(vectors::<f64, 1>(config, name, warnings)?.map(|rows| rows.into_iter().map(|[v]| v).collect()))
}

fn check_count(node: Node<'_, '_>, name: &str, found: usize, warnings: &mut Vec<ParseWarning>) {
    let declared = node.attribute("num").and_then(|v| v.trim().parse::<usize>().ok());
    if let Some(declared) = declared.filter(|&d| d != found) {
        warnings.push(ParseWarning::emit(
            WarningKind::RowCountMismatch,
            format!("<{name}> declares {declared} entries but holds {found}"),
        ));
    }
}
