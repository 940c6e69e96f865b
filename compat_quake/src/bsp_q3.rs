use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// id Tech 3 BSP (IBSP v46/v47) parsing into a serializable map document.

const LUMP_COUNT: usize = 17;
const Q3_BSP_SUPPORTED_VERSIONS: [u32; 2] = [46, 47];
const LIGHTMAP_SIZE: u32 = 128 * 128 * 3;
const NAME_LEN: usize = 64;

#[derive(Debug)]
pub enum BspError {
    InvalidHeader,
    Truncated,
    UnsupportedVersion(u32),
    LumpOutOfBounds {
        lump: LumpType,
    },
    InvalidLumpSize {
        lump: LumpType,
        size: u32,
        stride: u32,
    },
    LumpTooLarge {
        lump: LumpType,
        count: usize,
    },
    InvalidEntities(String),
}

impl fmt::Display for BspError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BspError::InvalidHeader => write!(f, "invalid q3 bsp header"),
            BspError::Truncated => write!(f, "q3 bsp data is truncated"),
            BspError::UnsupportedVersion(version) => {
                write!(f, "unsupported q3 bsp version {}", version)
            }
            BspError::LumpOutOfBounds { lump } => {
                write!(f, "q3 bsp lump out of bounds: {}", lump.name())
            }
            BspError::InvalidLumpSize { lump, size, stride } => write!(
                f,
                "q3 bsp lump has invalid size: {} (size {}, stride {})",
                lump.name(),
                size,
                stride
            ),
            BspError::LumpTooLarge { lump, count } => {
                write!(
                    f,
                    "q3 bsp lump is too large: {} (count {})",
                    lump.name(),
                    count
                )
            }
            BspError::InvalidEntities(message) => {
                write!(f, "q3 bsp entities are malformed: {}", message)
            }
        }
    }
}

impl std::error::Error for BspError {}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BspHeader {
    pub version: u32,
    pub lumps: [Lump; LUMP_COUNT],
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lump {
    pub offset: u32,
    pub length: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LumpType {
    Entities = 0,
    Shaders = 1,
    Planes = 2,
    Nodes = 3,
    Leafs = 4,
    LeafFaces = 5,
    LeafBrushes = 6,
    Models = 7,
    Brushes = 8,
    BrushSides = 9,
    Vertices = 10,
    MeshVerts = 11,
    Effects = 12,
    Faces = 13,
    Lightmaps = 14,
    LightVols = 15,
    VisData = 16,
}

impl LumpType {
    fn from_index(index: usize) -> Self {
        match index {
            0 => LumpType::Entities,
            1 => LumpType::Shaders,
            2 => LumpType::Planes,
            3 => LumpType::Nodes,
            4 => LumpType::Leafs,
            5 => LumpType::LeafFaces,
            6 => LumpType::LeafBrushes,
            7 => LumpType::Models,
            8 => LumpType::Brushes,
            9 => LumpType::BrushSides,
            10 => LumpType::Vertices,
            11 => LumpType::MeshVerts,
            12 => LumpType::Effects,
            13 => LumpType::Faces,
            14 => LumpType::Lightmaps,
            15 => LumpType::LightVols,
            16 => LumpType::VisData,
            _ => LumpType::Entities,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LumpType::Entities => "entities",
            LumpType::Shaders => "shaders",
            LumpType::Planes => "planes",
            LumpType::Nodes => "nodes",
            LumpType::Leafs => "leafs",
            LumpType::LeafFaces => "leaf_faces",
            LumpType::LeafBrushes => "leaf_brushes",
            LumpType::Models => "models",
            LumpType::Brushes => "brushes",
            LumpType::BrushSides => "brush_sides",
            LumpType::Vertices => "vertices",
            LumpType::MeshVerts => "meshverts",
            LumpType::Effects => "effects",
            LumpType::Faces => "faces",
            LumpType::Lightmaps => "lightmaps",
            LumpType::LightVols => "lightvols",
            LumpType::VisData => "visdata",
        }
    }
}

/// Key/value pairs of one `{ ... }` block in the entities lump.
pub type Entity = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceShader {
    pub name: String,
    pub flags: i32,
    pub contents: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: [f32; 3],
    pub dist: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub mins: [f32; 3],
    pub maxs: [f32; 3],
    pub face_start: i32,
    pub face_count: i32,
    pub brush_start: i32,
    pub brush_count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brush {
    pub side_start: i32,
    pub side_count: i32,
    pub shader: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrushSide {
    pub plane: i32,
    pub shader: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 3],
    pub texcoord: [f32; 2],
    pub lightmap_coord: [f32; 2],
    pub normal: [f32; 3],
    pub color: [u8; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub name: String,
    pub brush: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub shader: i32,
    pub effect: i32,
    pub face_type: i32,
    pub vertex_start: i32,
    pub vertex_count: i32,
    pub meshvert_start: i32,
    pub meshvert_count: i32,
    pub lightmap_index: i32,
    pub lightmap_start: [i32; 2],
    pub lightmap_size: [i32; 2],
    pub lightmap_origin: [f32; 3],
    pub lightmap_vecs: [[f32; 3]; 2],
    pub normal: [f32; 3],
    pub patch_size: [i32; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bsp {
    pub header: BspHeader,
    pub entities: Vec<Entity>,
    pub shaders: Vec<SurfaceShader>,
    pub planes: Vec<Plane>,
    pub models: Vec<Model>,
    pub brushes: Vec<Brush>,
    pub brush_sides: Vec<BrushSide>,
    pub vertices: Vec<Vertex>,
    pub meshverts: Vec<i32>,
    pub effects: Vec<Effect>,
    pub faces: Vec<Face>,
    pub lightmap_count: u32,
}

impl Bsp {
    /// First lump holding a NaN or infinite float. Such values have no
    /// JSON representation.
    pub fn non_finite_lump(&self) -> Option<LumpType> {
        if !self
            .planes
            .iter()
            .all(|plane| all_finite(&plane.normal) && plane.dist.is_finite())
        {
            return Some(LumpType::Planes);
        }
        if !self
            .models
            .iter()
            .all(|model| all_finite(&model.mins) && all_finite(&model.maxs))
        {
            return Some(LumpType::Models);
        }
        if !self.vertices.iter().all(|vertex| {
            all_finite(&vertex.position)
                && all_finite(&vertex.texcoord)
                && all_finite(&vertex.lightmap_coord)
                && all_finite(&vertex.normal)
        }) {
            return Some(LumpType::Vertices);
        }
        if !self.faces.iter().all(|face| {
            all_finite(&face.lightmap_origin)
                && face.lightmap_vecs.iter().all(|vec| all_finite(vec))
                && all_finite(&face.normal)
        }) {
            return Some(LumpType::Faces);
        }
        None
    }
}

fn all_finite(values: &[f32]) -> bool {
    values.iter().all(|value| value.is_finite())
}

pub fn parse_bsp(data: &[u8]) -> Result<Bsp, BspError> {
    let header = parse_header(data)?;
    let lumps = &header.lumps;

    let entities = parse_entities(lump_slice(data, lumps[LumpType::Entities as usize]))?;
    let shaders = parse_records(data, lumps, LumpType::Shaders, 72, 100_000, |chunk| {
        SurfaceShader {
            name: read_name(&chunk[0..NAME_LEN]),
            flags: read_i32_le(&chunk[64..68]),
            contents: read_i32_le(&chunk[68..72]),
        }
    })?;
    let planes = parse_records(data, lumps, LumpType::Planes, 16, 1_000_000, |chunk| Plane {
        normal: read_vec3(&chunk[0..12]),
        dist: read_f32_le(&chunk[12..16]),
    })?;
    let models = parse_records(data, lumps, LumpType::Models, 40, 100_000, |chunk| Model {
        mins: read_vec3(&chunk[0..12]),
        maxs: read_vec3(&chunk[12..24]),
        face_start: read_i32_le(&chunk[24..28]),
        face_count: read_i32_le(&chunk[28..32]),
        brush_start: read_i32_le(&chunk[32..36]),
        brush_count: read_i32_le(&chunk[36..40]),
    })?;
    let brushes = parse_records(data, lumps, LumpType::Brushes, 12, 1_000_000, |chunk| Brush {
        side_start: read_i32_le(&chunk[0..4]),
        side_count: read_i32_le(&chunk[4..8]),
        shader: read_i32_le(&chunk[8..12]),
    })?;
    let brush_sides = parse_records(data, lumps, LumpType::BrushSides, 8, 4_000_000, |chunk| {
        BrushSide {
            plane: read_i32_le(&chunk[0..4]),
            shader: read_i32_le(&chunk[4..8]),
        }
    })?;
    let vertices = parse_records(data, lumps, LumpType::Vertices, 44, 2_000_000, |chunk| {
        Vertex {
            position: read_vec3(&chunk[0..12]),
            texcoord: [read_f32_le(&chunk[12..16]), read_f32_le(&chunk[16..20])],
            lightmap_coord: [read_f32_le(&chunk[20..24]), read_f32_le(&chunk[24..28])],
            normal: read_vec3(&chunk[28..40]),
            color: [chunk[40], chunk[41], chunk[42], chunk[43]],
        }
    })?;
    let meshverts = parse_records(data, lumps, LumpType::MeshVerts, 4, 4_000_000, |chunk| {
        read_i32_le(&chunk[0..4])
    })?;
    let effects = parse_records(data, lumps, LumpType::Effects, 72, 100_000, |chunk| Effect {
        name: read_name(&chunk[0..NAME_LEN]),
        brush: read_i32_le(&chunk[64..68]),
    })?;
    let faces = parse_records(data, lumps, LumpType::Faces, 104, 1_000_000, parse_face)?;

    let lightmaps = lumps[LumpType::Lightmaps as usize];
    if lightmaps.length % LIGHTMAP_SIZE != 0 {
        return Err(BspError::InvalidLumpSize {
            lump: LumpType::Lightmaps,
            size: lightmaps.length,
            stride: LIGHTMAP_SIZE,
        });
    }
    let lightmap_count = lightmaps.length / LIGHTMAP_SIZE;

    Ok(Bsp {
        header,
        entities,
        shaders,
        planes,
        models,
        brushes,
        brush_sides,
        vertices,
        meshverts,
        effects,
        faces,
        lightmap_count,
    })
}

fn parse_header(data: &[u8]) -> Result<BspHeader, BspError> {
    if data.len() < 8 {
        return Err(BspError::Truncated);
    }
    if &data[0..4] != b"IBSP" {
        return Err(BspError::InvalidHeader);
    }
    let version = read_u32_le(&data[4..8]);
    if !Q3_BSP_SUPPORTED_VERSIONS.contains(&version) {
        return Err(BspError::UnsupportedVersion(version));
    }

    let header_len = 8 + LUMP_COUNT * 8;
    if data.len() < header_len {
        return Err(BspError::Truncated);
    }

    let mut lumps = [Lump {
        offset: 0,
        length: 0,
    }; LUMP_COUNT];
    for (i, lump) in lumps.iter_mut().enumerate() {
        let base = 8 + i * 8;
        let offset = read_u32_le(&data[base..base + 4]);
        let length = read_u32_le(&data[base + 4..base + 8]);
        let end = offset
            .checked_add(length)
            .ok_or(BspError::LumpOutOfBounds {
                lump: LumpType::from_index(i),
            })?;
        if end as usize > data.len() {
            return Err(BspError::LumpOutOfBounds {
                lump: LumpType::from_index(i),
            });
        }
        *lump = Lump { offset, length };
    }

    Ok(BspHeader { version, lumps })
}

fn parse_records<T>(
    data: &[u8],
    lumps: &[Lump; LUMP_COUNT],
    lump_type: LumpType,
    stride: usize,
    max_elements: usize,
    read: impl Fn(&[u8]) -> T,
) -> Result<Vec<T>, BspError> {
    let lump = lumps[lump_type as usize];
    if lump.length == 0 {
        return Ok(Vec::new());
    }
    if lump.length % stride as u32 != 0 {
        return Err(BspError::InvalidLumpSize {
            lump: lump_type,
            size: lump.length,
            stride: stride as u32,
        });
    }
    let slice = lump_slice(data, lump);
    let count = slice.len() / stride;
    if count > max_elements {
        return Err(BspError::LumpTooLarge {
            lump: lump_type,
            count,
        });
    }
    Ok(slice.chunks_exact(stride).map(read).collect())
}

fn parse_face(chunk: &[u8]) -> Face {
    Face {
        shader: read_i32_le(&chunk[0..4]),
        effect: read_i32_le(&chunk[4..8]),
        face_type: read_i32_le(&chunk[8..12]),
        vertex_start: read_i32_le(&chunk[12..16]),
        vertex_count: read_i32_le(&chunk[16..20]),
        meshvert_start: read_i32_le(&chunk[20..24]),
        meshvert_count: read_i32_le(&chunk[24..28]),
        lightmap_index: read_i32_le(&chunk[28..32]),
        lightmap_start: [read_i32_le(&chunk[32..36]), read_i32_le(&chunk[36..40])],
        lightmap_size: [read_i32_le(&chunk[40..44]), read_i32_le(&chunk[44..48])],
        lightmap_origin: read_vec3(&chunk[48..60]),
        lightmap_vecs: [read_vec3(&chunk[60..72]), read_vec3(&chunk[72..84])],
        normal: read_vec3(&chunk[84..96]),
        patch_size: [read_i32_le(&chunk[96..100]), read_i32_le(&chunk[100..104])],
    }
}

fn parse_entities(raw: &[u8]) -> Result<Vec<Entity>, BspError> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let text = String::from_utf8_lossy(&raw[..end]);
    let mut chars = text.chars().peekable();
    let mut entities = Vec::new();
    let mut current: Option<Entity> = None;
    let mut pending_key: Option<String> = None;

    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                if current.is_some() {
                    return Err(BspError::InvalidEntities("nested '{'".to_string()));
                }
                current = Some(Entity::new());
            }
            '}' => {
                let Some(entity) = current.take() else {
                    return Err(BspError::InvalidEntities("unmatched '}'".to_string()));
                };
                if pending_key.is_some() {
                    return Err(BspError::InvalidEntities("key without value".to_string()));
                }
                entities.push(entity);
            }
            '"' => {
                let mut token = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '"' {
                        closed = true;
                        break;
                    }
                    token.push(next);
                }
                if !closed {
                    return Err(BspError::InvalidEntities("unterminated string".to_string()));
                }
                let Some(entity) = current.as_mut() else {
                    return Err(BspError::InvalidEntities(
                        "string outside of entity".to_string(),
                    ));
                };
                match pending_key.take() {
                    Some(key) => {
                        entity.insert(key, token);
                    }
                    None => pending_key = Some(token),
                }
            }
            ch if ch.is_whitespace() => {}
            other => {
                return Err(BspError::InvalidEntities(format!(
                    "unexpected character '{}'",
                    other
                )))
            }
        }
    }
    if current.is_some() {
        return Err(BspError::InvalidEntities("unterminated entity".to_string()));
    }
    Ok(entities)
}

fn lump_slice(data: &[u8], lump: Lump) -> &[u8] {
    let start = lump.offset as usize;
    let end = start + lump.length as usize;
    &data[start..end]
}

fn read_name(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

fn read_vec3(bytes: &[u8]) -> [f32; 3] {
    [
        read_f32_le(&bytes[0..4]),
        read_f32_le(&bytes[4..8]),
        read_f32_le(&bytes[8..12]),
    ]
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_i32_le(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_f32_le(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
