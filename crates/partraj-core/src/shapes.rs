//! Shape definitions attached to particle types.
//!
//! The textual form is a keyword followed by a fixed-arity or count-prefixed
//! token list and an optional trailing color, e.g. `sphere 1.0 ff0000ff` or
//! `poly3d 3 0 0 0 1 0 0 0 1 0`. [`parse`] and [`render`] are inverse up to
//! color normalization: an absent color is written as [`DEFAULT_COLOR`].
//! The one exception is [`ShapeVariant::Spheropolygon`], which is written as
//! `spoly3d` with zero z and reads back as a convex spheropolyhedron.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::error::{ParseWarning, TrajError, WarningKind};
use crate::quat::Quat;

pub const DEFAULT_COLOR: &str = "005984FF";

#[derive(Debug, Error, Clone, PartialEq)]
#[error("invalid shape definition '{spec}': {reason}")]
pub struct ShapeError {
    pub spec: String,
    pub reason: String,
}

impl From<ShapeError> for TrajError {
    fn from(err: ShapeError) -> Self {
        TrajError::Parse(err.to_string())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ShapeVariant {
    Sphere {
        diameter: f64,
        color: Option<String>,
    },
    Arrow {
        thickness: f64,
        color: Option<String>,
    },
    SphereUnion {
        diameters: Vec<f64>,
        centers: Vec<[f64; 3]>,
        colors: Vec<Option<String>>,
    },
    Polygon {
        vertices: Vec<[f64; 2]>,
        color: Option<String>,
    },
    Spheropolygon {
        vertices: Vec<[f64; 2]>,
        rounding_radius: f64,
        color: Option<String>,
    },
    ConvexPolyhedron {
        vertices: Vec<[f64; 3]>,
        color: Option<String>,
    },
    ConvexPolyhedronUnion {
        vertices: Vec<Vec<[f64; 3]>>,
        centers: Vec<[f64; 3]>,
        orientations: Vec<Quat>,
        colors: Vec<Option<String>>,
    },
    ConvexSpheropolyhedron {
        vertices: Vec<[f64; 3]>,
        rounding_radius: f64,
        color: Option<String>,
    },
    GeneralPolyhedron {
        vertices: Vec<[f64; 3]>,
        faces: Vec<Vec<usize>>,
        color: Option<String>,
    },
    Ellipsoid {
        a: f64,
        b: f64,
        c: f64,
        color: Option<String>,
    },
    /// Definition that could not be interpreted, kept verbatim.
    Fallback(String),
}

impl Default for ShapeVariant {
    fn default() -> Self {
        ShapeVariant::Sphere {
            diameter: 1.0,
            color: None,
        }
    }
}

impl ShapeVariant {
    pub fn keyword(&self) -> &'static str {
        match self {
            ShapeVariant::Sphere { .. } => "sphere",
            ShapeVariant::Arrow { .. } => "arrow",
            ShapeVariant::SphereUnion { .. } => "sphere_union",
            ShapeVariant::Polygon { .. } | ShapeVariant::ConvexPolyhedron { .. } => "poly3d",
            ShapeVariant::Spheropolygon { .. } | ShapeVariant::ConvexSpheropolyhedron { .. } => {
                "spoly3d"
            }
            ShapeVariant::ConvexPolyhedronUnion { .. } => "poly3d_union",
            ShapeVariant::GeneralPolyhedron { .. } => "polyV",
            ShapeVariant::Ellipsoid { .. } => "ellipsoid",
            ShapeVariant::Fallback(_) => "fallback",
        }
    }

    pub fn is_arrow(&self) -> bool {
        matches!(self, ShapeVariant::Arrow { .. })
    }

    pub fn is_sphere(&self) -> bool {
        matches!(self, ShapeVariant::Sphere { .. })
    }

    pub fn render(&self) -> String {
        render(self)
    }

    /// Copy with every absent color replaced by [`DEFAULT_COLOR`].
    pub fn with_default_colors(&self) -> Self {
        let mut out = self.clone();
        match &mut out {
            ShapeVariant::Sphere { color, .. }
            | ShapeVariant::Arrow { color, .. }
            | ShapeVariant::Polygon { color, .. }
            | ShapeVariant::Spheropolygon { color, .. }
            | ShapeVariant::ConvexPolyhedron { color, .. }
            | ShapeVariant::ConvexSpheropolyhedron { color, .. }
            | ShapeVariant::GeneralPolyhedron { color, .. }
            | ShapeVariant::Ellipsoid { color, .. } => *color = Some(color_or_default(color)),
            ShapeVariant::SphereUnion { colors, .. }
            | ShapeVariant::ConvexPolyhedronUnion { colors, .. } => {
                for c in colors.iter_mut() {
                    *c = Some(color_or_default(c));
                }
            }
            ShapeVariant::Fallback(_) => {}
        }
        out
    }

    /// Shape as a JSON object following the GSD shape visualization schema.
    /// Variants the schema has no entry for only carry their `type`.
    pub fn type_shape(&self) -> Value {
        match self {
            ShapeVariant::Sphere { diameter, .. } => json!({
                "type": "Sphere",
                "diameter": diameter,
            }),
            ShapeVariant::Ellipsoid { a, b, c, .. } => json!({
                "type": "Ellipsoid",
                "a": a,
                "b": b,
                "c": c,
            }),
            ShapeVariant::Polygon { vertices, .. } => json!({
                "type": "Polygon",
                "rounding_radius": 0.0,
                "vertices": vertices,
            }),
            ShapeVariant::Spheropolygon {
                vertices,
                rounding_radius,
                ..
            } => json!({
                "type": "Polygon",
                "rounding_radius": rounding_radius,
                "vertices": vertices,
            }),
            ShapeVariant::ConvexPolyhedron { vertices, .. } => json!({
                "type": "ConvexPolyhedron",
                "rounding_radius": 0.0,
                "vertices": vertices,
            }),
            ShapeVariant::ConvexSpheropolyhedron {
                vertices,
                rounding_radius,
                ..
            } => json!({
                "type": "ConvexPolyhedron",
                "rounding_radius": rounding_radius,
                "vertices": vertices,
            }),
            ShapeVariant::GeneralPolyhedron {
                vertices, faces, ..
            } => json!({
                "type": "Mesh",
                "vertices": vertices,
                "indices": faces,
            }),
            ShapeVariant::SphereUnion {
                diameters, centers, ..
            } => json!({
                "type": "SphereUnion",
                "diameters": diameters,
                "centers": centers,
            }),
            other => json!({ "type": other.keyword() }),
        }
    }
}

pub fn parse(spec: &str) -> Result<ShapeVariant, ShapeError> {
    let mut cur = Cursor::new(spec);
    let keyword = cur.word("shape keyword")?.to_lowercase();
    let shape = match keyword.as_str() {
        "sphere" => ShapeVariant::Sphere {
            diameter: cur.float("diameter")?,
            color: cur.trailing_color()?,
        },
        "arrow" => ShapeVariant::Arrow {
            thickness: cur.float("thickness")?,
            color: cur.trailing_color()?,
        },
        "sphere_union" => {
            let n = cur.count("sphere count", 5)?;
            let mut diameters = Vec::with_capacity(n);
            let mut centers = Vec::with_capacity(n);
            let mut colors = Vec::with_capacity(n);
            for _ in 0..n {
                diameters.push(cur.float("diameter")?);
                centers.push(cur.vec3("center")?);
                colors.push(Some(cur.word("color")?.to_string()));
            }
            cur.finish()?;
            ShapeVariant::SphereUnion {
                diameters,
                centers,
                colors,
            }
        }
        "poly3d" => {
            let n = cur.count("vertex count", 3)?;
            let vertices = cur.vertices(n)?;
            let color = cur.trailing_color()?;
            match planar_vertices(&vertices) {
                Some(vertices) => ShapeVariant::Polygon { vertices, color },
                None => ShapeVariant::ConvexPolyhedron { vertices, color },
            }
        }
        // A rounded shape with flat vertices is still a solid, so `spoly3d`
        // never reads back as a spheropolygon.
        "spoly3d" => {
            let rounding_radius = cur.float("rounding radius")?;
            let n = cur.count("vertex count", 3)?;
            let vertices = cur.vertices(n)?;
            ShapeVariant::ConvexSpheropolyhedron {
                vertices,
                rounding_radius,
                color: cur.trailing_color()?,
            }
        }
        "cyl" => {
            let diameter = cur.float("diameter")?;
            let height = cur.float("height")?;
            let vertices = if height > 0.0 {
                vec![[-height / 2.0, 0.0, 0.0], [height / 2.0, 0.0, 0.0]]
            } else {
                vec![[0.0, 0.0, 0.0]]
            };
            ShapeVariant::ConvexSpheropolyhedron {
                vertices,
                rounding_radius: diameter / 2.0,
                color: cur.trailing_color()?,
            }
        }
        "poly3d_union" => {
            let n = cur.count("polyhedron count", 12)?;
            let mut vertices = Vec::with_capacity(n);
            let mut centers = Vec::with_capacity(n);
            let mut orientations = Vec::with_capacity(n);
            let mut colors = Vec::with_capacity(n);
            for _ in 0..n {
                let nv = cur.count("vertex count", 3)?;
                vertices.push(cur.vertices(nv)?);
                centers.push(cur.vec3("center")?);
                orientations.push([
                    cur.float("orientation")?,
                    cur.float("orientation")?,
                    cur.float("orientation")?,
                    cur.float("orientation")?,
                ]);
                colors.push(Some(cur.word("color")?.to_string()));
            }
            cur.finish()?;
            ShapeVariant::ConvexPolyhedronUnion {
                vertices,
                centers,
                orientations,
                colors,
            }
        }
        "polyv" => {
            let nv = cur.count("vertex count", 3)?;
            let vertices = cur.vertices(nv)?;
            let nf = cur.count("face count", 1)?;
            let mut faces = Vec::with_capacity(nf);
            for _ in 0..nf {
                let k = cur.count("face size", 1)?;
                let mut face = Vec::with_capacity(k);
                for _ in 0..k {
                    let idx = cur.index("face index")?;
                    if idx >= nv {
                        return Err(cur.error(format!(
                            "face index {idx} out of range for {nv} vertices"
                        )));
                    }
                    face.push(idx);
                }
                faces.push(face);
            }
            ShapeVariant::GeneralPolyhedron {
                vertices,
                faces,
                color: cur.trailing_color()?,
            }
        }
        "ellipsoid" => ShapeVariant::Ellipsoid {
            a: cur.float("a")?,
            b: cur.float("b")?,
            c: cur.float("c")?,
            color: cur.trailing_color()?,
        },
        other => return Err(cur.error(format!("unknown shape class '{other}'"))),
    };
    Ok(shape)
}

/// Like [`parse`], but never fails: malformed definitions become
/// [`ShapeVariant::Fallback`] together with one warning.
pub fn parse_lenient(spec: &str) -> (ShapeVariant, Option<ParseWarning>) {
    match parse(spec) {
        Ok(shape) => (shape, None),
        Err(err) => {
            let warning = ParseWarning::emit(
                WarningKind::MalformedShape,
                format!("{err}; using fallback shape"),
            );
            (ShapeVariant::Fallback(spec.to_string()), Some(warning))
        }
    }
}

pub fn render(shape: &ShapeVariant) -> String {
    let mut out: Vec<String> = vec![shape.keyword().to_string()];
    match shape {
        ShapeVariant::Sphere { diameter, color } => {
            out.push(num(*diameter));
            out.push(color_or_default(color));
        }
        ShapeVariant::Arrow { thickness, color } => {
            out.push(num(*thickness));
            out.push(color_or_default(color));
        }
        ShapeVariant::SphereUnion {
            diameters,
            centers,
            colors,
        } => {
            out.push(centers.len().to_string());
            for (i, (d, c)) in diameters.iter().zip(centers).enumerate() {
                out.push(num(*d));
                out.extend(c.iter().map(|v| num(*v)));
                out.push(color_or_default(colors.get(i).unwrap_or(&None)));
            }
        }
        ShapeVariant::Polygon { vertices, color } => {
            out.push(vertices.len().to_string());
            for v in vertices {
                out.extend([num(v[0]), num(v[1]), "0".to_string()]);
            }
            out.push(color_or_default(color));
        }
        ShapeVariant::Spheropolygon {
            vertices,
            rounding_radius,
            color,
        } => {
            out.push(num(*rounding_radius));
            out.push(vertices.len().to_string());
            for v in vertices {
                out.extend([num(v[0]), num(v[1]), "0".to_string()]);
            }
            out.push(color_or_default(color));
        }
        ShapeVariant::ConvexPolyhedron { vertices, color } => {
            out.push(vertices.len().to_string());
            push_vertices(&mut out, vertices);
            out.push(color_or_default(color));
        }
        ShapeVariant::ConvexSpheropolyhedron {
            vertices,
            rounding_radius,
            color,
        } => {
            out.push(num(*rounding_radius));
            out.push(vertices.len().to_string());
            push_vertices(&mut out, vertices);
            out.push(color_or_default(color));
        }
        ShapeVariant::ConvexPolyhedronUnion {
            vertices,
            centers,
            orientations,
            colors,
        } => {
            out.push(centers.len().to_string());
            for (i, ((verts, c), q)) in vertices.iter().zip(centers).zip(orientations).enumerate()
            {
                out.push(verts.len().to_string());
                push_vertices(&mut out, verts);
                out.extend(c.iter().map(|v| num(*v)));
                out.extend(q.iter().map(|v| num(*v)));
                out.push(color_or_default(colors.get(i).unwrap_or(&None)));
            }
        }
        ShapeVariant::GeneralPolyhedron {
            vertices,
            faces,
            color,
        } => {
            out.push(vertices.len().to_string());
            push_vertices(&mut out, vertices);
            out.push(faces.len().to_string());
            for face in faces {
                out.push(face.len().to_string());
                out.extend(face.iter().map(|i| i.to_string()));
            }
            out.push(color_or_default(color));
        }
        ShapeVariant::Ellipsoid { a, b, c, color } => {
            out.extend([num(*a), num(*b), num(*c)]);
            out.push(color_or_default(color));
        }
        ShapeVariant::Fallback(raw) => return raw.clone(),
    }
    out.join(" ")
}

#[derive(Deserialize)]
struct SpherePayload {
    diameter: Option<f64>,
    rounding_radius: Option<f64>,
}

#[derive(Deserialize)]
struct EllipsoidPayload {
    a: f64,
    b: f64,
    c: f64,
}

#[derive(Deserialize)]
struct VerticesPayload {
    vertices: Vec<Vec<f64>>,
    #[serde(default)]
    rounding_radius: f64,
}

#[derive(Deserialize)]
struct MeshPayload {
    vertices: Vec<[f64; 3]>,
    #[serde(alias = "faces")]
    indices: Vec<Vec<usize>>,
}

#[derive(Deserialize)]
struct SphereUnionPayload {
    diameters: Vec<f64>,
    centers: Vec<[f64; 3]>,
}

/// Reads a shape from its JSON form. Unknown or malformed payloads become
/// [`ShapeVariant::Fallback`] holding the serialized JSON, with a warning.
pub fn from_type_shape(value: &Value) -> (ShapeVariant, Option<ParseWarning>) {
    let is_empty = match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if is_empty {
        return (ShapeVariant::Fallback(String::new()), None);
    }
    match shape_from_json(value) {
        Ok(shape) => (shape, None),
        Err(reason) => {
            let warning = ParseWarning::emit(
                WarningKind::MalformedShape,
                format!("failed to read shape definition: {reason}; using fallback shape"),
            );
            (ShapeVariant::Fallback(value.to_string()), Some(warning))
        }
    }
}

fn shape_from_json(value: &Value) -> Result<ShapeVariant, String> {
    let type_name = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing 'type' field".to_string())?
        .to_lowercase();
    let shape = match type_name.as_str() {
        // "disk" is the older name some producers still write.
        "sphere" | "disk" => {
            let p: SpherePayload = payload(value)?;
            ShapeVariant::Sphere {
                diameter: p
                    .diameter
                    .unwrap_or_else(|| 2.0 * p.rounding_radius.unwrap_or(0.5)),
                color: None,
            }
        }
        "ellipsoid" => {
            let p: EllipsoidPayload = payload(value)?;
            ShapeVariant::Ellipsoid {
                a: p.a,
                b: p.b,
                c: p.c,
                color: None,
            }
        }
        "polygon" => {
            let p: VerticesPayload = payload(value)?;
            let vertices = p
                .vertices
                .iter()
                .map(|v| match v.as_slice() {
                    [x, y, ..] => Ok([*x, *y]),
                    _ => Err("polygon vertex needs two coordinates".to_string()),
                })
                .collect::<Result<Vec<_>, _>>()?;
            if p.rounding_radius == 0.0 {
                ShapeVariant::Polygon {
                    vertices,
                    color: None,
                }
            } else {
                ShapeVariant::Spheropolygon {
                    vertices,
                    rounding_radius: p.rounding_radius,
                    color: None,
                }
            }
        }
        "convexpolyhedron" => {
            let p: VerticesPayload = payload(value)?;
            let vertices = p
                .vertices
                .iter()
                .map(|v| match v.as_slice() {
                    [x, y, z] => Ok([*x, *y, *z]),
                    _ => Err("polyhedron vertex needs three coordinates".to_string()),
                })
                .collect::<Result<Vec<_>, _>>()?;
            if p.rounding_radius == 0.0 {
                ShapeVariant::ConvexPolyhedron {
                    vertices,
                    color: None,
                }
            } else {
                ShapeVariant::ConvexSpheropolyhedron {
                    vertices,
                    rounding_radius: p.rounding_radius,
                    color: None,
                }
            }
        }
        "mesh" | "polyhedron" => {
            let p: MeshPayload = payload(value)?;
            ShapeVariant::GeneralPolyhedron {
                vertices: p.vertices,
                faces: p.indices,
                color: None,
            }
        }
        "sphereunion" => {
            let p: SphereUnionPayload = payload(value)?;
            let colors = vec![None; p.centers.len()];
            ShapeVariant::SphereUnion {
                diameters: p.diameters,
                centers: p.centers,
                colors,
            }
        }
        other => return Err(format!("shape type '{other}' not supported")),
    };
    Ok(shape)
}

fn payload<T: DeserializeOwned>(value: &Value) -> Result<T, String> {
    T::deserialize(value).map_err(|e| e.to_string())
}

fn planar_vertices(vertices: &[[f64; 3]]) -> Option<Vec<[f64; 2]>> {
    vertices
        .iter()
        .all(|v| v[2] == 0.0)
        .then(|| vertices.iter().map(|v| [v[0], v[1]]).collect())
}

fn push_vertices(out: &mut Vec<String>, vertices: &[[f64; 3]]) {
    for v in vertices {
        out.extend(v.iter().map(|c| num(*c)));
    }
}

fn color_or_default(color: &Option<String>) -> String {
    color.clone().unwrap_or_else(|| DEFAULT_COLOR.to_string())
}

/// Shortest representation that reads back to the same value.
pub(crate) fn num(value: f64) -> String {
    format!("{value}")
}

struct Cursor<'a> {
    spec: &'a str,
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(spec: &'a str) -> Self {
        Self {
            spec,
            tokens: spec.split_whitespace().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> ShapeError {
        ShapeError {
            spec: self.spec.to_string(),
            reason: reason.into(),
        }
    }

    fn remaining(&self) -> usize {
        self.tokens.len() - self.pos
    }

    fn word(&mut self, what: &str) -> Result<&'a str, ShapeError> {
        let token = self
            .tokens
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error(format!("missing {what}")))?;
        self.pos += 1;
        Ok(token)
    }

    fn float(&mut self, what: &str) -> Result<f64, ShapeError> {
        let token = self.word(what)?;
        token
            .parse::<f64>()
            .map_err(|_| self.error(format!("invalid {what} '{token}'")))
    }

    fn index(&mut self, what: &str) -> Result<usize, ShapeError> {
        let token = self.word(what)?;
        token
            .parse::<usize>()
            .map_err(|_| self.error(format!("invalid {what} '{token}'")))
    }

    /// Reads a count and checks that enough tokens remain for `n` items of at
    /// least `min_tokens` each.
    fn count(&mut self, what: &str, min_tokens: usize) -> Result<usize, ShapeError> {
        let n = self.index(what)?;
        if n.saturating_mul(min_tokens) > self.remaining() {
            return Err(self.error(format!(
                "{what} {n} exceeds the remaining {} tokens",
                self.remaining()
            )));
        }
        Ok(n)
    }

    fn vec3(&mut self, what: &str) -> Result<[f64; 3], ShapeError> {
        Ok([self.float(what)?, self.float(what)?, self.float(what)?])
    }

    fn vertices(&mut self, n: usize) -> Result<Vec<[f64; 3]>, ShapeError> {
        (0..n).map(|_| self.vec3("vertex")).collect()
    }

    fn trailing_color(&mut self) -> Result<Option<String>, ShapeError> {
        match self.remaining() {
            0 => Ok(None),
            1 => Ok(Some(self.word("color")?.to_string())),
            n => Err(self.error(format!("{n} unexpected trailing tokens"))),
        }
    }

    fn finish(&self) -> Result<(), ShapeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(self.error(format!("{n} unexpected trailing tokens"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(shape: ShapeVariant) {
        let text = render(&shape);
        let back = parse(&text).unwrap_or_else(|e| panic!("{text}: {e}"));
        assert_eq!(back, shape.with_default_colors(), "{text}");
    }

    #[test]
    fn every_variant_roundtrips() {
        roundtrip(ShapeVariant::Sphere {
            diameter: 1.5,
            color: Some("ff0000ff".into()),
        });
        roundtrip(ShapeVariant::Arrow {
            thickness: 0.1,
            color: None,
        });
        roundtrip(ShapeVariant::SphereUnion {
            diameters: vec![0.5, 1.0],
            centers: vec![[0.0, 0.0, 1.0], [1.0, 0.0, 0.0]],
            colors: vec![Some("aaaaaaff".into()), None],
        });
        roundtrip(ShapeVariant::Polygon {
            vertices: vec![[-0.5, -0.5], [0.5, -0.5], [0.5, 0.5]],
            color: None,
        });
        let tetra = vec![
            [0.5, 0.5, 0.5],
            [0.5, -0.5, -0.5],
            [-0.5, 0.5, -0.5],
            [-0.5, -0.5, 0.5],
        ];
        roundtrip(ShapeVariant::ConvexPolyhedron {
            vertices: tetra.clone(),
            color: Some("00ff00ff".into()),
        });
        roundtrip(ShapeVariant::ConvexSpheropolyhedron {
            vertices: tetra.clone(),
            rounding_radius: 0.25,
            color: None,
        });
        roundtrip(ShapeVariant::ConvexPolyhedronUnion {
            vertices: vec![tetra.clone(), tetra.clone()],
            centers: vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]],
            orientations: vec![[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]],
            colors: vec![None, Some("123456ff".into())],
        });
        roundtrip(ShapeVariant::GeneralPolyhedron {
            vertices: tetra,
            faces: vec![vec![0, 1, 2], vec![0, 1, 3], vec![0, 2, 3], vec![1, 2, 3]],
            color: None,
        });
        roundtrip(ShapeVariant::Ellipsoid {
            a: 7.0,
            b: 5.0,
            c: 3.0,
            color: None,
        });
        roundtrip(parse("cyl 1 2").unwrap());
        roundtrip(parse("cyl 1 0 ffffffff").unwrap());
        roundtrip(parse("spoly3d 0.1 3 0 0 0 1 0 0 0 1 0").unwrap());
    }

    #[test]
    fn spheropolygon_reads_back_as_flat_spheropolyhedron() {
        let flat = ShapeVariant::Spheropolygon {
            vertices: vec![[-0.5, -0.5], [0.5, -0.5], [0.5, 0.5]],
            rounding_radius: 0.1,
            color: None,
        };
        let text = render(&flat);
        assert_eq!(text, "spoly3d 0.1 3 -0.5 -0.5 0 0.5 -0.5 0 0.5 0.5 0 005984FF");
        assert_eq!(
            parse(&text).unwrap(),
            ShapeVariant::ConvexSpheropolyhedron {
                vertices: vec![[-0.5, -0.5, 0.0], [0.5, -0.5, 0.0], [0.5, 0.5, 0.0]],
                rounding_radius: 0.1,
                color: Some(DEFAULT_COLOR.into()),
            }
        );
    }

    #[test]
    fn keyword_is_case_insensitive() {
        let shape = parse("SPHERE 2").unwrap();
        assert_eq!(
            shape,
            ShapeVariant::Sphere {
                diameter: 2.0,
                color: None
            }
        );
        assert!(matches!(
            parse("PolyV 3 0 0 0 1 0 0 0 1 0 1 3 0 1 2").unwrap(),
            ShapeVariant::GeneralPolyhedron { .. }
        ));
    }

    #[test]
    fn planar_poly3d_becomes_polygon() {
        let flat = parse("poly3d 3 0 0 0 1 0 0 0 1 0").unwrap();
        assert!(matches!(flat, ShapeVariant::Polygon { .. }));
        let solid = parse("poly3d 3 0 0 0 1 0 0 0 1 1").unwrap();
        assert!(matches!(solid, ShapeVariant::ConvexPolyhedron { .. }));
    }

    #[test]
    fn cylinder_is_spheropolyhedron() {
        let shape = parse("cyl 1.0 2.0 ffffffff").unwrap();
        assert_eq!(
            shape,
            ShapeVariant::ConvexSpheropolyhedron {
                vertices: vec![[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
                rounding_radius: 0.5,
                color: Some("ffffffff".into()),
            }
        );
    }

    #[test]
    fn bogus_definition_falls_back_with_one_warning() {
        let (shape, warning) = parse_lenient("bogus nonsense");
        assert_eq!(shape, ShapeVariant::Fallback("bogus nonsense".into()));
        let warning = warning.unwrap();
        assert_eq!(warning.kind, WarningKind::MalformedShape);
        assert_eq!(render(&shape), "bogus nonsense");
    }

    #[test]
    fn malformed_counts_are_rejected() {
        assert!(parse("").is_err());
        assert!(parse("sphere").is_err());
        assert!(parse("sphere 1 red extra").is_err());
        assert!(parse("poly3d 1000000 0 0 0").is_err());
        assert!(parse("polyV 3 0 0 0 1 0 0 0 1 0 1 3 0 1 7").is_err());
    }

    #[test]
    fn type_shape_json_roundtrip() {
        let shape = ShapeVariant::ConvexSpheropolyhedron {
            vertices: vec![[0.0, 0.0, 1.0], [1.0, 0.0, 0.0]],
            rounding_radius: 0.1,
            color: None,
        };
        let json = shape.type_shape();
        assert_eq!(json["type"], "ConvexPolyhedron");
        let (back, warning) = from_type_shape(&json);
        assert!(warning.is_none());
        assert_eq!(back, shape);

        let (disk, _) = from_type_shape(&json!({"type": "Disk", "rounding_radius": 1.5}));
        assert_eq!(
            disk,
            ShapeVariant::Sphere {
                diameter: 3.0,
                color: None
            }
        );

        let (unknown, warning) = from_type_shape(&json!({"type": "Blob"}));
        assert!(matches!(unknown, ShapeVariant::Fallback(_)));
        assert!(warning.is_some());
    }
}
