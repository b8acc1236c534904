//! Reader for crystallographic CIF files.
//!
//! Every `data_` block becomes one frame, in block-name order. Atom sites are
//! given in fractional coordinates; when the block lists symmetry operations
//! each site is replicated by every operation, wrapped into the unit cell and
//! merged with images that land on the same spot. Fractional coordinates are
//! shifted by one half so the cell origin sits at a box corner.

use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::rc::Rc;

use fxhash::FxHashMap;
use partraj_core::box3::round_to;
use partraj_core::error::{ParseWarning, TrajError, TrajResult, WarningKind};
use partraj_core::{Frame, FrameSource, RawFrameRecord, ShapeVariant, Trajectory};

use crate::config::ReadOptions;
use crate::{type_table, ReadSeek, TrajectoryDecoder};

/// Fractional distance below which two symmetry images are the same site.
pub const CIF_SYMMETRY_TOL: f64 = 1e-5;

const SYMMETRY_TAGS: [&str; 2] = ["_symmetry_equiv_pos_as_xyz", "_space_group_symop_operation_xyz"];

pub struct CifReader {
    blocks: Vec<Rc<CifBlock>>,
    precision: u32,
    default_type: Rc<str>,
    tolerance: f64,
}

impl CifReader {
    pub fn new<R: Read + Seek + 'static>(stream: R, options: &ReadOptions) -> TrajResult<Self> {
        Self::from_boxed(Box::new(stream), options)
    }

    pub fn from_boxed(mut stream: Box<dyn ReadSeek>, options: &ReadOptions) -> TrajResult<Self> {
        stream.seek(SeekFrom::Start(0))?;
        let lines = BufReader::new(stream)
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TrajError::Parse(format!("unreadable CIF text: {e}")))?;
        let mut blocks = parse_blocks(&lines)?;
        if blocks.is_empty() {
            return Err(TrajError::Parse("CIF file has no data_ block".into()));
        }
        blocks.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::info!(frames = blocks.len(), "indexed cif data blocks");
        Ok(Self {
            blocks: blocks.into_iter().map(Rc::new).collect(),
            precision: options.precision,
            default_type: options.default_type.as_str().into(),
            tolerance: CIF_SYMMETRY_TOL,
        })
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn block_names(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.name.as_str()).collect()
    }

    /// Fractional coordinates of the unique sites of frame `index`, before
    /// the half-cell shift.
    pub fn fractional_coordinates(&self, index: usize) -> TrajResult<Vec<[f64; 3]>> {
        let source = self
            .source(index)
            .ok_or_else(|| TrajError::Validation(format!("no CIF block {index}")))?;
        let mut warnings = Vec::new();
        Ok(source.sites(&mut warnings)?.0)
    }

    fn source(&self, index: usize) -> Option<CifFrameSource> {
        Some(CifFrameSource {
            block: Rc::clone(self.blocks.get(index)?),
            precision: self.precision,
            default_type: Rc::clone(&self.default_type),
            tolerance: self.tolerance,
        })
    }
}

impl TrajectoryDecoder for CifReader {
    fn n_frames(&self) -> usize {
        self.blocks.len()
    }

    fn frame(&self, index: usize) -> Option<Frame> {
        Some(Frame::new(Rc::new(self.source(index)?)))
    }
}

pub fn read_cif<R: Read + Seek + 'static>(stream: R, options: &ReadOptions) -> TrajResult<Trajectory> {
    let mut traj = CifReader::new(stream, options)?.into_trajectory();
    traj.set_dtype(options.dtype)?;
    Ok(traj)
}

/// Tag/value pairs of one data block. Loop columns hold one value per row;
/// plain items hold exactly one.
#[derive(Debug, Default)]
struct CifBlock {
    name: String,
    items: FxHashMap<String, Vec<String>>,
}

impl CifBlock {
    fn column(&self, tag: &str) -> Option<&[String]> {
        self.items.get(tag).map(Vec::as_slice)
    }

    fn numbers(&self, tag: &str, precision: u32) -> TrajResult<Vec<f64>> {
        self.column(tag)
            .ok_or_else(|| TrajError::Parse(format!("data block '{}' has no {tag}", self.name)))?
            .iter()
            .map(|v| parse_number(v, precision))
            .collect()
    }

    fn number(&self, tag: &str, precision: u32) -> TrajResult<f64> {
        match self.numbers(tag, precision)?.as_slice() {
            [v] => Ok(*v),
            values => Err(TrajError::Parse(format!(
                "{tag} holds {} values in data block '{}'",
                values.len(),
                self.name
            ))),
        }
    }
}

/// Reads the leading number of a value, ignoring a standard uncertainty
/// suffix such as `1.3141(2)`.
fn parse_number(value: &str, precision: u32) -> TrajResult<f64> {
    let digits = value.find('(').map_or(value, |i| &value[..i]);
    digits
        .trim()
        .parse::<f64>()
        .map(|v| round_to(v, precision))
        .map_err(|_| TrajError::Parse(format!("invalid CIF number '{value}'")))
}

struct CifFrameSource {
    block: Rc<CifBlock>,
    precision: u32,
    default_type: Rc<str>,
    tolerance: f64,
}

impl CifFrameSource {
    /// Unique fractional sites and their type names.
    fn sites(&self, warnings: &mut Vec<ParseWarning>) -> TrajResult<(Vec<[f64; 3]>, Vec<String>)> {
        let block = &self.block;
        let xs = block.numbers("_atom_site_fract_x", self.precision)?;
        let ys = block.numbers("_atom_site_fract_y", self.precision)?;
        let zs = block.numbers("_atom_site_fract_z", self.precision)?;
        if xs.len() != ys.len() || xs.len() != zs.len() {
            return Err(TrajError::Parse(format!(
                "fractional coordinate columns differ in length in data block '{}'",
                block.name
            )));
        }
        let fractions: Vec<[f64; 3]> = (0..xs.len()).map(|i| [xs[i], ys[i], zs[i]]).collect();

        let types: Vec<String> = if let Some(symbols) = block.column("_atom_site_type_symbol") {
            symbols.to_vec()
        } else if let Some(labels) = block.column("_atom_site_label") {
            labels.iter().map(|l| element_of(l, &self.default_type)).collect()
        } else {
            vec![self.default_type.to_string(); fractions.len()]
        };
        if types.len() != fractions.len() {
            return Err(TrajError::Parse(format!(
                "{} site types for {} sites in data block '{}'",
                types.len(),
                fractions.len(),
                block.name
            )));
        }

        let ops = match SYMMETRY_TAGS.iter().find_map(|tag| block.column(tag)) {
            Some(ops) if !ops.is_empty() => ops.iter().map(|op| SymOp::parse(op)).collect::<TrajResult<Vec<_>>>()?,
            _ => return Ok((fractions, types)),
        };
        Ok(expand(&fractions, &types, &ops, self.tolerance, &self.default_type, warnings))
    }

    /// Upper-triangular lattice from cell lengths and angles.
    fn cell_matrix(&self) -> TrajResult<[[f64; 3]; 3]> {
        let get = |name: &str| self.block.number(&format!("_cell_{name}"), self.precision);
        let (a, b, c) = (get("length_a")?, get("length_b")?, get("length_c")?);
        let (alpha, beta, gamma) = (
            get("angle_alpha")?.to_radians(),
            get("angle_beta")?.to_radians(),
            get("angle_gamma")?.to_radians(),
        );
        let lx = a;
        let xy = b * gamma.cos();
        let xz = c * beta.cos();
        let ly = (b * b - xy * xy).sqrt();
        let yz = (b * c * alpha.cos() - xy * xz) / ly;
        let lz = (c * c - xz * xz - yz * yz).sqrt();
        if !(lx > 0.0 && ly > 0.0 && lz > 0.0) {
            return Err(TrajError::Parse(format!(
                "cell parameters of data block '{}' do not span a lattice",
                self.block.name
            )));
        }
        Ok([[lx, xy, xz], [0.0, ly, yz], [0.0, 0.0, lz]])
    }
}

impl FrameSource for CifFrameSource {
    fn decode_raw(&self, warnings: &mut Vec<ParseWarning>) -> TrajResult<RawFrameRecord> {
        let m = self.cell_matrix()?;
        let (fractions, names) = self.sites(warnings)?;
        let position = fractions
            .iter()
            .map(|f| {
                let s = [f[0] - 0.5, f[1] - 0.5, f[2] - 0.5];
                [0usize, 1, 2].map(|i| m[i][0] * s[0] + m[i][1] * s[1] + m[i][2] * s[2])
            })
            .collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let (types, typeid) = type_table(&names);
        let type_shapes = vec![ShapeVariant::default(); types.len()];
        Ok(RawFrameRecord {
            box_matrix: Some(m),
            types,
            type_shapes,
            typeid,
            position: Some(position),
            ..Default::default()
        })
    }

    fn describe(&self) -> String {
        format!("cif data block '{}'", self.block.name)
    }
}

/// First run of letters in a site label, e.g. `Fe` in `Fe2a`.
fn element_of(label: &str, default_type: &str) -> String {
    let name: String = label
        .chars()
        .skip_while(|c| !c.is_ascii_alphabetic())
        .take_while(char::is_ascii_alphabetic)
        .collect();
    if name.is_empty() {
        default_type.to_string()
    } else {
        name
    }
}

fn wrap(v: [f64; 3]) -> [f64; 3] {
    v.map(|x| x - x.floor())
}

/// Shortest periodic displacement from `b` to `a`.
fn periodic_delta(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [0usize, 1, 2].map(|i| {
        let d = a[i] - b[i];
        d - d.round()
    })
}

fn expand(
    sites: &[[f64; 3]],
    types: &[String],
    ops: &[SymOp],
    tolerance: f64,
    default_type: &str,
    warnings: &mut Vec<ParseWarning>,
) -> (Vec<[f64; 3]>, Vec<String>) {
    let images: Vec<([f64; 3], usize)> = sites
        .iter()
        .enumerate()
        .flat_map(|(i, &site)| ops.iter().map(move |op| (wrap(op.apply(site)), i)))
        .collect();
    let mut merged = vec![false; images.len()];
    let mut points = Vec::new();
    let mut names = Vec::new();
    let mut conflict = false;
    for i in 0..images.len() {
        if merged[i] {
            continue;
        }
        let (reference, site) = images[i];
        let mut shift = [0.0; 3];
        let mut count = 1.0;
        for j in i + 1..images.len() {
            if merged[j] {
                continue;
            }
            let d = periodic_delta(images[j].0, reference);
            if d.iter().all(|v| v.abs() <= tolerance) {
                merged[j] = true;
                count += 1.0;
                for k in 0..3 {
                    shift[k] += d[k];
                }
                conflict |= types[images[j].1] != types[site];
            }
        }
        points.push(wrap([0usize, 1, 2].map(|k| reference[k] + shift[k] / count)));
        names.push(types[site].clone());
    }
    tracing::debug!(sites = sites.len(), ops = ops.len(), unique = points.len(), "expanded cif sites");
    if conflict {
        warnings.push(ParseWarning::emit(
            WarningKind::SiteConflict,
            "distinct sites merged into one position; all particles get the default type",
        ));
        names = vec![default_type.to_string(); points.len()];
    }
    (points, names)
}

/// Affine symmetry operation `f' = W·f + w` on fractional coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
struct SymOp {
    rows: [Affine; 3],
}

impl SymOp {
    fn parse(text: &str) -> TrajResult<Self> {
        let cleaned: String = text
            .chars()
            .map(|c| c.to_ascii_lowercase())
            .filter(|c| c.is_ascii_digit() || "+-*/.,()xyz".contains(*c))
            .collect();
        let parts: Vec<&str> = cleaned.split(',').collect();
        let [x, y, z] = parts.as_slice() else {
            return Err(TrajError::Parse(format!(
                "symmetry operation '{text}' does not have three components"
            )));
        };
        let component = |part: &str| {
            ExprParser::new(part)
                .parse()
                .map_err(|reason| TrajError::Parse(format!("symmetry operation '{text}': {reason}")))
        };
        Ok(Self {
            rows: [component(x)?, component(y)?, component(z)?],
        })
    }

    fn apply(&self, f: [f64; 3]) -> [f64; 3] {
        self.rows.map(|row| row.eval(f))
    }
}

/// `c[0]·x + c[1]·y + c[2]·z + c[3]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Affine([f64; 4]);

impl Affine {
    fn constant(v: f64) -> Self {
        Self([0.0, 0.0, 0.0, v])
    }

    fn axis(i: usize) -> Self {
        let mut c = [0.0; 4];
        c[i] = 1.0;
        Self(c)
    }

    fn as_constant(&self) -> Option<f64> {
        self.0[..3].iter().all(|&c| c == 0.0).then_some(self.0[3])
    }

    fn combine(self, other: Self, sign: f64) -> Self {
        Self([0usize, 1, 2, 3].map(|i| self.0[i] + sign * other.0[i]))
    }

    fn scale(self, k: f64) -> Self {
        Self(self.0.map(|c| c * k))
    }

    fn eval(&self, f: [f64; 3]) -> f64 {
        self.0[0] * f[0] + self.0[1] * f[1] + self.0[2] * f[2] + self.0[3]
    }
}

struct ExprParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Affine, String> {
        let value = self.expr()?;
        match self.peek() {
            None => Ok(value),
            Some(c) => Err(format!("unexpected '{}'", c as char)),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<Affine, String> {
        let mut value = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = value.combine(rhs, if op == b'+' { 1.0 } else { -1.0 });
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<Affine, String> {
        let mut value = self.unary()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match (op, value.as_constant(), rhs.as_constant()) {
                (b'*', _, Some(k)) => value.scale(k),
                (b'*', Some(k), None) => rhs.scale(k),
                (b'/', _, Some(k)) if k != 0.0 => value.scale(1.0 / k),
                (b'/', _, Some(_)) => return Err("division by zero".into()),
                _ => return Err("expression is not affine".into()),
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<Affine, String> {
        match self.peek() {
            Some(b'+') => {
                self.pos += 1;
                self.unary()
            }
            Some(b'-') => {
                self.pos += 1;
                Ok(self.unary()?.scale(-1.0))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Affine, String> {
        match self.peek() {
            Some(c @ (b'x' | b'y' | b'z')) => {
                self.pos += 1;
                Ok(Affine::axis((c - b'x') as usize))
            }
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(b')') {
                    return Err("unbalanced parenthesis".into());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_digit() || c == b'.') {
                    self.pos += 1;
                }
                let digits = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
                digits
                    .parse::<f64>()
                    .map(Affine::constant)
                    .map_err(|_| format!("invalid number '{digits}'"))
            }
            Some(c) => Err(format!("unexpected '{}'", c as char)),
            None => Err("unexpected end of expression".into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Token {
    text: String,
    quoted: bool,
}

/// Splits one line into whitespace-separated tokens. Quotes close only in
/// front of whitespace, so `'O'Brien'` is one value; `#` starts a comment.
fn tokenize(line: &str) -> Vec<Token> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            break;
        }
        if c == '\'' || c == '"' {
            let mut j = i + 1;
            while j < chars.len() && !(chars[j] == c && chars.get(j + 1).map_or(true, |n| n.is_whitespace())) {
                j += 1;
            }
            tokens.push(Token {
                text: chars[i + 1..j.min(chars.len())].iter().collect(),
                quoted: true,
            });
            i = j + 1;
            continue;
        }
        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() {
            i += 1;
        }
        tokens.push(Token {
            text: chars[start..i].iter().collect(),
            quoted: false,
        });
    }
    tokens
}

/// Tags are matched case-insensitively, and DDL2 style `_cat.item` names
/// are treated like `_cat_item`.
fn normalize_tag(tag: &str) -> String {
    tag.to_ascii_lowercase().replace('.', "_")
}

#[derive(Default)]
struct LoopState {
    columns: Vec<String>,
    values: Vec<String>,
}

impl LoopState {
    fn flush(self, block: &mut CifBlock) -> TrajResult<()> {
        let width = self.columns.len();
        if width == 0 {
            return Ok(());
        }
        if self.values.len() % width != 0 {
            return Err(TrajError::Parse(format!(
                "loop over {} in data block '{}' has {} values for {width} columns",
                self.columns[0],
                block.name,
                self.values.len()
            )));
        }
        for (i, column) in self.columns.into_iter().enumerate() {
            let values = self.values.iter().skip(i).step_by(width).cloned().collect();
            block.items.insert(column, values);
        }
        Ok(())
    }
}

#[derive(Default)]
struct BlockParser {
    blocks: Vec<CifBlock>,
    block: Option<CifBlock>,
    looping: Option<LoopState>,
    pending_tag: Option<String>,
}

impl BlockParser {
    fn block_mut(&mut self, line_no: usize) -> TrajResult<&mut CifBlock> {
        self.block
            .as_mut()
            .ok_or_else(|| TrajError::Parse(format!("line #{line_no}: data before the first data_ block")))
    }

    fn end_loop(&mut self, line_no: usize) -> TrajResult<()> {
        if let Some(state) = self.looping.take() {
            state.flush(self.block_mut(line_no)?)?;
        }
        Ok(())
    }

    fn token(&mut self, token: Token, line_no: usize) -> TrajResult<()> {
        if let Some(tag) = self.pending_tag.take() {
            self.block_mut(line_no)?.items.insert(tag, vec![token.text]);
            return Ok(());
        }
        let lower = token.text.to_ascii_lowercase();
        if !token.quoted && lower.starts_with("data_") {
            self.end_loop(line_no)?;
            self.blocks.extend(self.block.take());
            self.block = Some(CifBlock {
                name: token.text[5..].to_string(),
                items: FxHashMap::default(),
            });
        } else if !token.quoted && lower == "loop_" {
            self.end_loop(line_no)?;
            self.block_mut(line_no)?;
            self.looping = Some(LoopState::default());
        } else if !token.quoted && token.text.starts_with('_') {
            match self.looping.as_mut() {
                Some(state) if state.values.is_empty() => state.columns.push(normalize_tag(&token.text)),
                _ => {
                    self.end_loop(line_no)?;
                    self.block_mut(line_no)?;
                    self.pending_tag = Some(normalize_tag(&token.text));
                }
            }
        } else {
            match self.looping.as_mut() {
                Some(state) if !state.columns.is_empty() => state.values.push(token.text),
                _ => {
                    return Err(TrajError::Parse(format!(
                        "line #{line_no}: value '{}' has no tag",
                        token.text
                    )))
                }
            }
        }
        Ok(())
    }

    fn finish(mut self, line_no: usize) -> TrajResult<Vec<CifBlock>> {
        if let Some(tag) = self.pending_tag.take() {
            return Err(TrajError::Parse(format!("tag {tag} has no value")));
        }
        self.end_loop(line_no)?;
        self.blocks.extend(self.block.take());
        Ok(self.blocks)
    }
}

fn parse_blocks(lines: &[String]) -> TrajResult<Vec<CifBlock>> {
    let mut parser = BlockParser::default();
    let mut i = 0usize;
    while i < lines.len() {
        let line_no = i + 1;
        if lines[i].starts_with(';') {
            // Multi-line text field, closed by the next line starting with ';'.
            let mut text = lines[i][1..].trim_end().to_string();
            i += 1;
            while i < lines.len() && !lines[i].starts_with(';') {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(lines[i].trim_end());
                i += 1;
            }
            if i == lines.len() {
                return Err(TrajError::Parse(format!("line #{line_no}: unterminated text field")));
            }
            parser.token(Token { text, quoted: true }, line_no)?;
            i += 1;
            continue;
        }
        for token in tokenize(&lines[i]) {
            parser.token(token, line_no)?;
        }
        i += 1;
    }
    parser.finish(lines.len())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const ROCKSALT: &str = "\
# two sites, no symmetry
data_NaCl
_cell_length_a 4.0
_cell_length_b 4.0
_cell_length_c 4.0
_cell_angle_alpha 90
_cell_angle_beta 90
_cell_angle_gamma 90
loop_
_atom_site_label
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
Na1 0.0 0.0 0.0
Cl1 0.5 0.5 0.5
";

    const IRON: &str = "\
data_Fe
_chemical_name_common 'alpha iron'
_cell_length_a 2.8665(2)
_cell_length_b 2.8665(2)
_cell_length_c 2.8665(2)
_cell_angle_alpha 90.0
_cell_angle_beta 90.0
_cell_angle_gamma 90.0
_publ_section_title
;
Body-centred cubic iron
;
loop_
_symmetry_equiv_pos_as_xyz
'x, y, z'
'-x, -y, -z'
'x+1/2, y+1/2, z+1/2'
loop_
_atom_site_label
_atom_site_type_symbol
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
Fe1 Fe 0 0 0
";

    fn reader(text: &str) -> TrajResult<CifReader> {
        CifReader::new(Cursor::new(text.as_bytes().to_vec()), &ReadOptions::default())
    }

    fn decode(text: &str) -> (TrajResult<RawFrameRecord>, Vec<ParseWarning>) {
        let mut warnings = Vec::new();
        let raw = reader(text).and_then(|r| {
            let source = r.source(0).ok_or_else(|| TrajError::Parse("no frame".into()))?;
            source.decode_raw(&mut warnings)
        });
        (raw, warnings)
    }

    fn close(a: [f64; 3], b: [f64; 3]) -> bool {
        (0..3).all(|i| (a[i] - b[i]).abs() < 1e-9)
    }

    #[test]
    fn plain_sites_are_shifted_into_the_box() {
        let (raw, warnings) = decode(ROCKSALT);
        let raw = raw.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(raw.types, vec!["Na".to_string(), "Cl".to_string()]);
        assert_eq!(raw.typeid, vec![0, 1]);
        let p = raw.position.unwrap();
        assert!(close(p[0], [-2.0, -2.0, -2.0]));
        assert!(close(p[1], [0.0, 0.0, 0.0]));
        let m = raw.box_matrix.unwrap();
        assert!((m[0][0] - 4.0).abs() < 1e-12 && m[0][1].abs() < 1e-12);
    }

    #[test]
    fn symmetry_images_are_merged() {
        let r = reader(IRON).unwrap();
        assert_eq!(r.block_names(), vec!["Fe"]);
        let fractions = r.fractional_coordinates(0).unwrap();
        assert_eq!(fractions.len(), 2);
        assert!(close(fractions[0], [0.0, 0.0, 0.0]));
        assert!(close(fractions[1], [0.5, 0.5, 0.5]));

        let (raw, _) = decode(IRON);
        let raw = raw.unwrap();
        assert_eq!(raw.types, vec!["Fe".to_string()]);
        assert_eq!(raw.typeid, vec![0, 0]);
        assert!(close(raw.position.unwrap()[0], [-1.43325; 3]));
    }

    #[test]
    fn merged_sites_of_different_types_fall_back() {
        let text = ROCKSALT
            .replace("Cl1 0.5 0.5 0.5", "Cl1 0.0 0.0 0.0")
            .replace("loop_\n_atom_site_label", "loop_\n_symmetry_equiv_pos_as_xyz\nx,y,z\nloop_\n_atom_site_label");
        let (raw, warnings) = decode(&text);
        let raw = raw.unwrap();
        assert_eq!(raw.types, vec!["A".to_string()]);
        assert_eq!(raw.position.unwrap().len(), 1);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::SiteConflict);
    }

    #[test]
    fn hexagonal_cell_tilts_b() {
        let text = ROCKSALT
            .replace("_cell_length_c 4.0", "_cell_length_c 8.0")
            .replace("_cell_angle_gamma 90", "_cell_angle_gamma 120");
        let (raw, _) = decode(&text);
        let m = raw.unwrap().box_matrix.unwrap();
        assert!((m[0][1] + 2.0).abs() < 1e-9);
        assert!((m[1][1] - 12f64.sqrt()).abs() < 1e-9);
        assert!((m[2][2] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn blocks_are_frames_in_name_order() {
        let text = format!("{}\n{}", IRON, ROCKSALT);
        let r = reader(&text).unwrap();
        assert_eq!(r.block_names(), vec!["Fe", "NaCl"]);
        let traj = r.into_trajectory();
        assert_eq!(traj.len(), 2);
        assert_eq!(traj.frame(1).unwrap().data().unwrap().n_particles(), 2);
    }

    #[test]
    fn symmetry_operations_are_affine() {
        let op = SymOp::parse("-y+1/2, x-y, z+0.25").unwrap();
        let f = op.apply([0.1, 0.2, 0.3]);
        assert!(close(f, [0.3, -0.1, 0.55]));
        let op = SymOp::parse("'2*(x+1/4)', -Y, 1/2-z").unwrap();
        assert!(close(op.apply([0.0, 0.5, 0.5]), [0.5, -0.5, 0.0]));
        assert!(SymOp::parse("x*y, y, z").is_err());
        assert!(SymOp::parse("x/0, y, z").is_err());
        assert!(SymOp::parse("x, y").is_err());
    }

    #[test]
    fn tokens_respect_quotes_and_comments() {
        let tokens = tokenize("_name 'O'Brien' \"a b\" plain # note");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["_name", "O'Brien", "a b", "plain"]);
        assert!(tokens[1].quoted && !tokens[3].quoted);
    }

    #[test]
    fn malformed_files_are_parse_errors() {
        for text in [
            "",
            "_cell_length_a 1\n",
            "data_x\nloose\n",
            "data_x\nloop_\n_a\n_b\n1 2 3\n",
            "data_x\n_cell_length_a\n",
            "data_x\n_t\n;\nnever closed\n",
        ] {
            assert!(matches!(reader(text), Err(TrajError::Parse(_))), "{text:?}");
        }
        let (raw, _) = decode("data_x\n_cell_length_a 1\n");
        assert!(matches!(raw, Err(TrajError::Parse(_))));
    }
}
