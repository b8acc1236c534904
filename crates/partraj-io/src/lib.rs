#![forbid(unsafe_code)]

pub mod cif;
pub mod config;
pub mod dcd;
pub mod dcd_writer;
pub mod hoomdxml;
pub mod pos;
pub mod pos_writer;

use std::cell::RefCell;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use std::rc::Rc;
use std::str::FromStr;

use partraj_core::error::{TrajError, TrajResult};
use partraj_core::{Frame, Trajectory};
use serde::{Deserialize, Serialize};

pub use cif::{read_cif, CifReader};
pub use config::{ReadOptions, WriteOptions};
pub use dcd::{read_dcd, DcdReader, DcdTopology};
pub use dcd_writer::write_dcd;
pub use hoomdxml::{read_hoomdxml, HoomdXmlReader};
pub use pos::{read_pos, FrameSpan, PosFrameSource, PosReader};
pub use pos_writer::{dump_pos, write_pos};

/// Seekable byte stream a decoder can hold on to.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Stream shared by every frame decoded from one file.
pub(crate) type SharedStream = Rc<RefCell<Box<dyn ReadSeek>>>;

/// A scanned file whose frames decode on demand.
pub trait TrajectoryDecoder {
    fn n_frames(&self) -> usize;

    /// Lazy frame for `index`, or `None` past the end.
    fn frame(&self, index: usize) -> Option<Frame>;

    fn into_trajectory(self) -> Trajectory
    where
        Self: Sized,
    {
        (0..self.n_frames()).filter_map(|i| self.frame(i)).collect()
    }
}

/// Unique names in order of first appearance and the per-particle index.
pub(crate) fn type_table(names: &[&str]) -> (Vec<String>, Vec<u32>) {
    let mut types: Vec<String> = Vec::new();
    let typeid = names
        .iter()
        .map(|name| match types.iter().position(|t| t == name) {
            Some(id) => id as u32,
            None => {
                types.push(name.to_string());
                (types.len() - 1) as u32
            }
        })
        .collect();
    (types, typeid)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Pos,
    Dcd,
    HoomdXml,
    Cif,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::Pos, Format::Dcd, Format::HoomdXml, Format::Cif];

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Pos => "pos",
            Format::Dcd => "dcd",
            Format::HoomdXml => "hoomdxml",
            Format::Cif => "cif",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        FORMATS
            .iter()
            .find(|entry| entry.extensions.contains(&ext.as_str()))
            .map(|entry| entry.format)
    }

    pub fn from_path(path: &Path) -> TrajResult<Self> {
        path.extension()
            .and_then(|s| s.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| {
                TrajError::Unsupported(format!(
                    "cannot infer trajectory format from {}",
                    path.display()
                ))
            })
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = TrajError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_ascii_lowercase();
        Format::ALL
            .into_iter()
            .find(|f| f.as_str() == name)
            .ok_or_else(|| TrajError::Unsupported(format!("unknown format '{name}'")))
    }
}

pub type DecodeFn = fn(Box<dyn ReadSeek>, &ReadOptions) -> TrajResult<Trajectory>;
pub type EncodeFn = fn(&Trajectory, &mut dyn Write, &WriteOptions) -> TrajResult<()>;

pub struct FormatEntry {
    pub format: Format,
    pub extensions: &'static [&'static str],
    pub decode: DecodeFn,
    /// `None` for read-only dialects.
    pub encode: Option<EncodeFn>,
}

impl fmt::Debug for FormatEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatEntry")
            .field("format", &self.format)
            .field("extensions", &self.extensions)
            .finish()
    }
}

fn decode_pos(stream: Box<dyn ReadSeek>, options: &ReadOptions) -> TrajResult<Trajectory> {
    let mut traj = PosReader::from_boxed(stream, options)?.into_trajectory();
    traj.set_dtype(options.dtype)?;
    Ok(traj)
}

fn encode_pos(traj: &Trajectory, out: &mut dyn Write, options: &WriteOptions) -> TrajResult<()> {
    write_pos(traj, out, options)
}

fn decode_dcd(stream: Box<dyn ReadSeek>, options: &ReadOptions) -> TrajResult<Trajectory> {
    let topology = match &options.template {
        Some(path) => {
            let template_options = ReadOptions {
                format: None,
                template: None,
                ..options.clone()
            };
            let frames = read_path(path, &template_options)?;
            let first = frames.frame(0).ok_or_else(|| {
                TrajError::Validation(format!("template {} holds no frame", path.display()))
            })?;
            DcdTopology::Template(first.data()?)
        }
        None => DcdTopology::DefaultType(options.default_type.clone()),
    };
    let mut traj = DcdReader::from_boxed(stream, topology)?.into_trajectory();
    traj.set_dtype(options.dtype)?;
    Ok(traj)
}

fn encode_dcd(traj: &Trajectory, out: &mut dyn Write, _options: &WriteOptions) -> TrajResult<()> {
    write_dcd(traj, out)
}

fn decode_hoomdxml(stream: Box<dyn ReadSeek>, options: &ReadOptions) -> TrajResult<Trajectory> {
    let mut traj = HoomdXmlReader::from_boxed(stream, options)?.into_trajectory();
    traj.set_dtype(options.dtype)?;
    Ok(traj)
}

fn decode_cif(stream: Box<dyn ReadSeek>, options: &ReadOptions) -> TrajResult<Trajectory> {
    let mut traj = CifReader::from_boxed(stream, options)?.into_trajectory();
    traj.set_dtype(options.dtype)?;
    Ok(traj)
}

pub static FORMATS: [FormatEntry; 4] = [
    FormatEntry {
        format: Format::Pos,
        extensions: &["pos"],
        decode: decode_pos,
        encode: Some(encode_pos),
    },
    FormatEntry {
        format: Format::Dcd,
        extensions: &["dcd"],
        decode: decode_dcd,
        encode: Some(encode_dcd),
    },
    FormatEntry {
        format: Format::HoomdXml,
        extensions: &["xml"],
        decode: decode_hoomdxml,
        encode: None,
    },
    FormatEntry {
        format: Format::Cif,
        extensions: &["cif"],
        decode: decode_cif,
        encode: None,
    },
];

pub fn format_entry(format: Format) -> &'static FormatEntry {
    match format {
        Format::Pos => &FORMATS[0],
        Format::Dcd => &FORMATS[1],
        Format::HoomdXml => &FORMATS[2],
        Format::Cif => &FORMATS[3],
    }
}

/// Opens `path` and scans it. Frames decode lazily and keep the file open.
pub fn read_path(path: impl AsRef<Path>, options: &ReadOptions) -> TrajResult<Trajectory> {
    let path = path.as_ref();
    options.validate()?;
    let format = match options.format {
        Some(format) => format,
        None => Format::from_path(path)?,
    };
    let file = File::open(path)?;
    tracing::debug!(path = %path.display(), %format, "reading trajectory");
    (format_entry(format).decode)(Box::new(BufReader::new(file)), options)
}

pub fn write_path(traj: &Trajectory, path: impl AsRef<Path>, options: &WriteOptions) -> TrajResult<()> {
    let path = path.as_ref();
    let format = match options.format {
        Some(format) => format,
        None => Format::from_path(path)?,
    };
    let encode = format_entry(format)
        .encode
        .ok_or_else(|| TrajError::Unsupported(format!("{format} files are read-only")))?;
    let mut out = BufWriter::new(File::create(path)?);
    encode(traj, &mut out, options)?;
    out.flush()?;
    tracing::debug!(path = %path.display(), %format, frames = traj.len(), "wrote trajectory");
    Ok(())
}
