//! Binary glTF 2.0 (GLB) container writer.
//!
//! [`GlbBuilder`] accumulates primitives of a single mesh and serializes them
//! as one GLB: a 12-byte header, a JSON chunk padded with spaces and a BIN
//! chunk padded with zeros, both 4-byte aligned.
//!
//! Every primitive gets its own material so viewers can restyle faces, edges
//! and vertices independently at runtime.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::{Value, json};

use yacv_types::geometry::Point3;

/// `glTF` in little-endian.
pub const GLB_MAGIC: [u8; 4] = *b"glTF";

const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;
const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

const COMPONENT_UNSIGNED_INT: u32 = 5125;
const COMPONENT_FLOAT: u32 = 5126;
const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;
const FILTER_NEAREST: u32 = 9728;

/// 2x2 checkerboard PNG used as the base texture of faces.
const CHECKERBOARD_PNG: [u8; 80] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x02, 0x08, 0x02, 0x00, 0x00, 0x00, 0xfd, 0xd4, 0x9a,
    0x73, 0x00, 0x00, 0x00, 0x17, 0x49, 0x44, 0x41, 0x54, 0x08, 0xd7, 0x63, 0x78, 0xf4, 0xe8, 0xd1,
    0xff, 0xff, 0xff, 0x19, 0xff, 0xff, 0xff, 0xff, 0xf8, 0xf1, 0x63, 0x00, 0x4f, 0x05, 0x0b, 0x4b,
    0xcb, 0x5c, 0xca, 0x3f, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Errors while writing a GLB container.
#[derive(Debug, thiserror::Error)]
pub enum GlbError {
    /// A count or length does not fit the 32-bit fields of the format.
    #[error("{what} exceeds the 32-bit limit of the GLB format")]
    TooLarge {
        /// Which quantity overflowed.
        what: &'static str,
    },

    /// An index points past the end of the position list.
    #[error("index {index} out of range for {count} positions")]
    IndexOutOfRange {
        /// The offending index.
        index: u32,
        /// Number of positions in the primitive.
        count: usize,
    },

    /// The JSON chunk could not be serialized.
    #[error("failed to serialize glTF JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// glTF primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMode {
    /// One point per index.
    Points,
    /// A connected polyline.
    LineStrip,
    /// Independent triangles.
    Triangles,
}

impl PrimitiveMode {
    const fn code(self) -> u32 {
        match self {
            Self::Points => 0,
            Self::LineStrip => 3,
            Self::Triangles => 4,
        }
    }
}

/// Style of a primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Material name, read by viewers to identify the element kind.
    pub name: &'static str,
    /// Linear RGBA base colour.
    pub base_color: [f32; 4],
    /// Whether the checkerboard texture is applied.
    pub textured: bool,
}

impl Material {
    /// Faces: light yellow over the checkerboard.
    pub const FACE: Self = Self {
        name: "face",
        base_color: [1.0, 1.0, 0.5, 1.0],
        textured: true,
    };
    /// Edges: dark blue.
    pub const EDGE: Self = Self {
        name: "edge",
        base_color: [0.0, 0.0, 0.5, 1.0],
        textured: false,
    };
    /// Vertices: dark green.
    pub const VERTEX: Self = Self {
        name: "vertex",
        base_color: [0.0, 0.2, 0.0, 1.0],
        textured: false,
    };
}

/// Incrementally builds a single-mesh GLB.
#[derive(Debug, Default)]
pub struct GlbBuilder {
    bin: Vec<u8>,
    buffer_views: Vec<Value>,
    accessors: Vec<Value>,
    materials: Vec<Value>,
    primitives: Vec<Value>,
    texture: Option<usize>,
}

fn to_u32(value: usize, what: &'static str) -> Result<u32, GlbError> {
    u32::try_from(value).map_err(|_overflow| GlbError::TooLarge { what })
}

/// Component-wise bounds of a set of points, as required for `POSITION`.
fn bounds<const N: usize>(points: &[[f32; N]]) -> ([f32; N], [f32; N]) {
    let mut min = [f32::INFINITY; N];
    let mut max = [f32::NEG_INFINITY; N];
    for point in points {
        for ((lo, hi), value) in min.iter_mut().zip(max.iter_mut()).zip(point) {
            *lo = lo.min(*value);
            *hi = hi.max(*value);
        }
    }
    (min, max)
}

fn pad_to_four(buffer: &mut Vec<u8>, fill: u8) {
    while buffer.len() % 4 != 0 {
        buffer.push(fill);
    }
}

impl GlbBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of primitives added so far.
    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    fn push_view(&mut self, data: &[u8], target: Option<u32>) -> usize {
        pad_to_four(&mut self.bin, 0);
        let mut view = json!({
            "buffer": 0,
            "byteOffset": self.bin.len(),
            "byteLength": data.len(),
        });
        if let (Some(target), Some(map)) = (target, view.as_object_mut()) {
            map.insert("target".to_owned(), json!(target));
        }
        self.bin.extend_from_slice(data);
        self.buffer_views.push(view);
        self.buffer_views.len().saturating_sub(1)
    }

    fn push_accessor(&mut self, accessor: Value) -> usize {
        self.accessors.push(accessor);
        self.accessors.len().saturating_sub(1)
    }

    fn texture_index(&mut self) -> usize {
        if let Some(index) = self.texture {
            return index;
        }
        // One image, sampler and texture shared by every face material.
        let view = self.push_view(&CHECKERBOARD_PNG, None);
        self.texture = Some(view);
        view
    }

    fn push_material(&mut self, material: Material) -> usize {
        let mut pbr = json!({
            "baseColorFactor": material.base_color,
            "metallicFactor": 0.0,
        });
        if material.textured {
            self.texture_index();
            if let Some(map) = pbr.as_object_mut() {
                map.insert("baseColorTexture".to_owned(), json!({ "index": 0 }));
            }
        }
        self.materials.push(json!({
            "name": material.name,
            "pbrMetallicRoughness": pbr,
        }));
        self.materials.len().saturating_sub(1)
    }

    /// Append a primitive to the mesh.
    ///
    /// `uvs` is ignored unless it has one entry per position, and a
    /// textured material without usable `uvs` is added untextured. An
    /// empty `positions` list adds nothing.
    pub fn add_primitive(
        &mut self,
        mode: PrimitiveMode,
        positions: &[Point3],
        indices: &[u32],
        uvs: &[[f32; 2]],
        material: Material,
    ) -> Result<(), GlbError> {
        if positions.is_empty() || indices.is_empty() {
            return Ok(());
        }
        let position_count = to_u32(positions.len(), "position count")?;
        let index_count = to_u32(indices.len(), "index count")?;
        if let Some(&index) = indices.iter().find(|&&index| index >= position_count) {
            return Err(GlbError::IndexOutOfRange {
                index,
                count: positions.len(),
            });
        }
        let has_uvs = !uvs.is_empty() && uvs.len() == positions.len();
        let material = Material {
            textured: material.textured && has_uvs,
            ..material
        };
        if material.textured {
            self.texture_index();
        }

        let index_bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        let index_view = self.push_view(&index_bytes, Some(TARGET_ELEMENT_ARRAY_BUFFER));
        let (index_min, index_max) = (
            indices.iter().min().copied().unwrap_or_default(),
            indices.iter().max().copied().unwrap_or_default(),
        );
        let index_accessor = self.push_accessor(json!({
            "bufferView": index_view,
            "componentType": COMPONENT_UNSIGNED_INT,
            "count": index_count,
            "type": "SCALAR",
            "min": [index_min],
            "max": [index_max],
        }));

        let position_bytes: Vec<u8> = positions
            .iter()
            .flatten()
            .flat_map(|c| c.to_le_bytes())
            .collect();
        let position_view = self.push_view(&position_bytes, Some(TARGET_ARRAY_BUFFER));
        let (min, max) = bounds(positions);
        let position_accessor = self.push_accessor(json!({
            "bufferView": position_view,
            "componentType": COMPONENT_FLOAT,
            "count": position_count,
            "type": "VEC3",
            "min": min,
            "max": max,
        }));

        let mut attributes = json!({ "POSITION": position_accessor });
        if has_uvs {
            let uv_bytes: Vec<u8> = uvs.iter().flatten().flat_map(|c| c.to_le_bytes()).collect();
            let uv_view = self.push_view(&uv_bytes, Some(TARGET_ARRAY_BUFFER));
            let (min, max) = bounds(uvs);
            let uv_accessor = self.push_accessor(json!({
                "bufferView": uv_view,
                "componentType": COMPONENT_FLOAT,
                "count": position_count,
                "type": "VEC2",
                "min": min,
                "max": max,
            }));
            if let Some(map) = attributes.as_object_mut() {
                map.insert("TEXCOORD_0".to_owned(), json!(uv_accessor));
            }
        }

        let material = self.push_material(material);
        self.primitives.push(json!({
            "attributes": attributes,
            "indices": index_accessor,
            "mode": mode.code(),
            "material": material,
        }));
        Ok(())
    }

    fn document(&self) -> Value {
        let asset = json!({
            "version": "2.0",
            "generator": concat!("yacv@", env!("CARGO_PKG_VERSION")),
        });
        if self.primitives.is_empty() {
            return json!({
                "asset": asset,
                "scene": 0,
                "scenes": [{ "nodes": [] }],
            });
        }
        let mut document = json!({
            "asset": asset,
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0 }],
            "meshes": [{ "primitives": self.primitives }],
            "materials": self.materials,
            "accessors": self.accessors,
            "bufferViews": self.buffer_views,
            "buffers": [{ "byteLength": self.bin.len() }],
        });
        if let (Some(view), Some(map)) = (self.texture, document.as_object_mut()) {
            map.insert(
                "images".to_owned(),
                json!([{ "bufferView": view, "mimeType": "image/png" }]),
            );
            map.insert(
                "samplers".to_owned(),
                json!([{ "magFilter": FILTER_NEAREST }]),
            );
            map.insert(
                "textures".to_owned(),
                json!([{ "source": 0, "sampler": 0 }]),
            );
        }
        document
    }

    /// Serialize the container.
    pub fn finish(self) -> Result<Bytes, GlbError> {
        let mut json_chunk = serde_json::to_vec(&self.document())?;
        pad_to_four(&mut json_chunk, b' ');
        let mut bin_chunk = if self.primitives.is_empty() {
            Vec::new()
        } else {
            self.bin
        };
        pad_to_four(&mut bin_chunk, 0);

        let mut total = HEADER_LEN
            .saturating_add(CHUNK_HEADER_LEN)
            .saturating_add(json_chunk.len());
        if !bin_chunk.is_empty() {
            total = total
                .saturating_add(CHUNK_HEADER_LEN)
                .saturating_add(bin_chunk.len());
        }
        let total_len = to_u32(total, "container length")?;

        let mut out = BytesMut::with_capacity(total);
        out.put_slice(&GLB_MAGIC);
        out.put_u32_le(GLB_VERSION);
        out.put_u32_le(total_len);
        out.put_u32_le(to_u32(json_chunk.len(), "JSON chunk")?);
        out.put_u32_le(CHUNK_JSON);
        out.put_slice(&json_chunk);
        if !bin_chunk.is_empty() {
            out.put_u32_le(to_u32(bin_chunk.len(), "BIN chunk")?);
            out.put_u32_le(CHUNK_BIN);
            out.put_slice(&bin_chunk);
        }
        Ok(out.freeze())
    }
}

/// Whether `bytes` starts with the GLB magic.
pub fn has_glb_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(&GLB_MAGIC)
}
