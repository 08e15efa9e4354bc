//! FLVER mesh files.
//!
//! The header holds counts for every section; each section is a run of
//! fixed-size records starting at 0x80, in this order: bones, materials,
//! parts, mesh info, face sets, vertex info, stream layouts, material
//! parameters. Index and vertex data live in a separate data region whose
//! base the header also records.
//!
//! Decoding is split into a structural pass over those tables and an optional
//! bulk pass that reads indices and vertices, followed by binding material
//! parameters and resolving each mesh's stream layout.

use bon::Builder;
use rootcause::Report;
use thiserror::Error;
use tracing::{debug, warn};

use crate::Rc;
use crate::data::cursor::Cursor;
use crate::data::parser_utils::{BoundingBox, Vec3, be_u16_field, decode_be_array};
use crate::data::source::ByteSource;
use crate::error::ReadError;
use crate::models::DecodeWarning;
use crate::models::material::{Material, MaterialError, MaterialParameter, TextureSlots, bind_parameters};
use crate::models::vertex_format::{
    Argb, AttributeStreams, POSITION_SIZE, StreamLayout, VertexAttributes, resolve_stream_layout,
};

pub const FLVER_MAGIC: &[u8; 6] = b"FLVER\0";

/// Offset of the first section.
const SECTIONS_OFFSET: u64 = 0x80;

const BONE_WORDS: usize = 16;
const BONE_SIZE: u64 = 64;
const MATERIAL_SIZE: u64 = 32;
const PART_SIZE: u64 = 128;
const MESH_INFO_SIZE: u64 = 48;
const FACE_SET_SIZE: u64 = 32;
const VERTEX_INFO_SIZE: u64 = 32;
const LAYOUT_SIZE: u64 = 16;
const PARAMETER_SIZE: u64 = 32;

#[derive(Debug, Error)]
pub enum FlverError {
    #[error("read error")]
    Read(#[from] ReadError),
    #[error("{count} {section} records cannot fit in a {size} byte file")]
    TableTooLarge {
        section: &'static str,
        count: u32,
        size: u64,
    },
    #[error("mesh {mesh}: vertex size {vertex_size} is smaller than a position")]
    VertexSizeTooSmall { mesh: usize, vertex_size: u32 },
    #[error("mesh {mesh}: stream layout {index} does not exist ({count} layouts)")]
    LayoutIndexOutOfRange { mesh: usize, index: u32, count: usize },
    #[error("mesh {mesh}: material {index} does not exist ({count} materials)")]
    MaterialIndexOutOfRange { mesh: usize, index: u32, count: usize },
    #[error("material binding failed")]
    Material(#[from] MaterialError),
}

#[derive(Debug, Clone, Builder)]
pub struct ParseOptions {
    /// Read index and vertex data. Without it only the tables are decoded.
    #[builder(default = true)]
    pub load_data: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FlverHeader {
    pub magic_ok: bool,
    pub endian: [u8; 2],
    pub version: u32,
    /// Base that index and vertex buffer offsets are relative to.
    pub data_offset: u32,
    pub data_size: u32,
    pub bone_count: u32,
    pub material_count: u32,
    pub part_count: u32,
    pub unknown_count: u32,
    pub mesh_count: u32,
    pub bounding_box: BoundingBox,
    pub unknown_count2: u32,
    pub layout_count: u32,
    pub parameter_count: u32,
}

impl FlverHeader {
    pub fn read<S: ByteSource + ?Sized>(source: &S) -> Result<Self, ReadError> {
        let magic_ok = source.bytes_at(0, FLVER_MAGIC.len() as u64)? == FLVER_MAGIC;
        if !magic_ok {
            warn!("missing FLVER magic, decoding anyway");
        }
        let endian = source.bytes_at(6, 2)?;

        let mut cursor = Cursor::at(source, 0x08);
        let version = cursor.read_u32()?;
        let data_offset = cursor.read_u32()?;
        let data_size = cursor.read_u32()?;
        let [bone_count, material_count, part_count, unknown_count, mesh_count] =
            cursor.read_words::<5>()?;
        let bounding_box = BoundingBox {
            min: cursor.read_vec3()?,
            max: cursor.read_vec3()?,
        };
        cursor.skip(4 * 4);
        let [unknown_count2, layout_count, parameter_count] = cursor.read_words::<3>()?;

        Ok(FlverHeader {
            magic_ok,
            endian: [endian[0], endian[1]],
            version,
            data_offset,
            data_size,
            bone_count,
            material_count,
            part_count,
            unknown_count,
            mesh_count,
            bounding_box,
            unknown_count2,
            layout_count,
            parameter_count,
        })
    }
}

/// Raw bone record; the layout has not been worked out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Bone {
    pub words: [u32; BONE_WORDS],
}

/// A static placement record.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Part {
    pub name: String,
    pub translation: Vec3,
    pub euler: Vec3,
    pub scale: Vec3,
    pub bounding_box: BoundingBox,
    pub unknown: [u32; 3],
}

impl Part {
    fn read<S: ByteSource + ?Sized>(cursor: &mut Cursor<'_, S>) -> Result<Self, ReadError> {
        let translation = cursor.read_vec3()?;
        let name = cursor.read_ptr_wide_string()?;
        let euler = cursor.read_vec3()?;
        let unknown0 = cursor.read_u32()?;
        let scale = cursor.read_vec3()?;
        let unknown1 = cursor.read_u32()?;
        let min = cursor.read_vec3()?;
        let unknown2 = cursor.read_u32()?;
        let max = cursor.read_vec3()?;
        cursor.read_reserved("part", 1 + 12)?;

        Ok(Part {
            name,
            translation,
            euler,
            scale,
            bounding_box: BoundingBox { min, max },
            unknown: [unknown0, unknown1, unknown2],
        })
    }
}

/// One index buffer of a mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FaceSet {
    pub unknown0: u32,
    pub unknown1: u32,
    pub index_count: u32,
    /// Absolute file offset of the indices.
    pub index_offset: u64,
    /// Empty unless data was loaded.
    pub indices: Vec<u16>,
}

impl FaceSet {
    fn read<S: ByteSource + ?Sized>(
        cursor: &mut Cursor<'_, S>,
        data_offset: u32,
    ) -> Result<Self, ReadError> {
        let unknown0 = cursor.read_u32()?;
        let unknown1 = cursor.read_u32()?;
        let index_count = cursor.read_u32()?;
        let index_offset = cursor.read_u32()? as u64 + data_offset as u64;
        // Repeats the index count.
        cursor.skip(4);
        cursor.read_reserved("faceset", 3)?;

        Ok(FaceSet {
            unknown0,
            unknown1,
            index_count,
            index_offset,
            indices: Vec::new(),
        })
    }

    fn load_indices<S: ByteSource + ?Sized>(&mut self, source: &S) -> Result<(), ReadError> {
        let len = self.index_count as u64 * 2;
        let bytes = source.bytes_at(self.index_offset, len)?;
        self.indices = decode_be_array(bytes, self.index_offset, self.index_count as usize, be_u16_field)?;
        Ok(())
    }
}

struct MeshInfo {
    info: [u32; 7],
    unknown: [u32; 3],
    face_set_count: u32,
}

impl MeshInfo {
    fn read<S: ByteSource + ?Sized>(cursor: &mut Cursor<'_, S>) -> Result<Self, ReadError> {
        let info = cursor.read_words::<7>()?;
        let unknown0 = cursor.read_ptr_u32()?;
        let face_set_count = cursor.read_u32()?;
        let unknown1 = cursor.read_ptr_u32()?;
        cursor.skip(4);
        let unknown2 = cursor.read_ptr_u32()?;

        Ok(MeshInfo {
            info,
            unknown: [unknown0, unknown1, unknown2],
            face_set_count,
        })
    }
}

struct VertexInfo {
    layout_index: u32,
    vertex_size: u32,
    vertex_count: u32,
    buffer_size: u32,
    buffer_offset: u64,
}

impl VertexInfo {
    fn read<S: ByteSource + ?Sized>(
        cursor: &mut Cursor<'_, S>,
        data_offset: u32,
    ) -> Result<Self, ReadError> {
        cursor.read_reserved("vertexinfo", 1)?;
        let layout_index = cursor.read_u32()?;
        let vertex_size = cursor.read_u32()?;
        let vertex_count = cursor.read_u32()?;
        cursor.read_reserved("vertexinfo", 2)?;
        let buffer_size = cursor.read_u32()?;
        let buffer_offset = cursor.read_u32()? as u64 + data_offset as u64;

        Ok(VertexInfo {
            layout_index,
            vertex_size,
            vertex_count,
            buffer_size,
            buffer_offset,
        })
    }
}

/// One renderable sub-object.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Mesh {
    /// Raw mesh info words; word 1 is the material index.
    pub info: [u32; 7],
    pub material_index: u32,
    pub material: Rc<Material>,
    /// Three words the mesh info points at indirectly.
    pub unknown: [u32; 3],
    pub face_sets: Vec<FaceSet>,
    pub layout_index: u32,
    pub vertex_size: u32,
    pub vertex_count: u32,
    pub vertex_buffer_size: u32,
    /// Absolute file offset of the first vertex record.
    pub vertex_buffer_offset: u64,
    /// Empty unless data was loaded.
    pub positions: Vec<Vec3>,
    /// Empty unless data was loaded.
    pub attributes: VertexAttributes,
    pub streams: AttributeStreams,
    pub textures: TextureSlots,
}

impl Mesh {
    /// 16-bit attribute words following the position in each vertex record.
    pub fn attribute_stride(&self) -> usize {
        VertexAttributes::stride_for(self.vertex_size)
    }

    pub fn data_loaded(&self) -> bool {
        self.positions.len() == self.vertex_count as usize
    }

    pub fn texture_config(&self) -> String {
        self.textures.config_string()
    }

    pub fn uv(&self, channel: usize, vertex: usize) -> Option<(f32, f32)> {
        self.streams.uv.get(channel)?.uv(&self.attributes, vertex)
    }

    pub fn argb(&self, semantic: u32, vertex: usize) -> Option<Argb> {
        self.streams.argb.get(&semantic)?.argb(&self.attributes, vertex)
    }

    pub fn bone_weights(&self, vertex: usize) -> Option<[u16; 2]> {
        self.streams.bone_weights?.weights(&self.attributes, vertex)
    }

    fn load_vertices<S: ByteSource + ?Sized>(&mut self, source: &S) -> Result<(), ReadError> {
        let record = self.vertex_size as u64;
        let bytes = source.bytes_at(self.vertex_buffer_offset, self.vertex_count as u64 * record)?;
        let stride = self.attribute_stride();

        let mut positions = Vec::with_capacity(self.vertex_count as usize);
        let mut words = Vec::with_capacity(self.vertex_count as usize * stride);
        for vertex in 0..self.vertex_count as u64 {
            let at = vertex * record;
            positions.push(bytes.read_vec3(at)?);
            let row = bytes.bytes_at(at + POSITION_SIZE as u64, stride as u64 * 2)?;
            words.extend(decode_be_array(
                row,
                self.vertex_buffer_offset + at + POSITION_SIZE as u64,
                stride,
                be_u16_field,
            )?);
        }

        self.positions = positions;
        self.attributes = VertexAttributes { stride, words };
        Ok(())
    }
}

/// A decoded FLVER file.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Flver {
    pub header: FlverHeader,
    pub bones: Vec<Bone>,
    pub materials: Vec<Rc<Material>>,
    pub parts: Vec<Part>,
    pub meshes: Vec<Mesh>,
    pub layouts: Vec<StreamLayout>,
    pub parameters: Vec<MaterialParameter>,
    pub warnings: Vec<DecodeWarning>,
}

/// Decode a FLVER file.
pub fn parse_flver<S: ByteSource + ?Sized>(
    source: &S,
    options: &ParseOptions,
) -> Result<Flver, Report<FlverError>> {
    Ok(decode(source, options)?)
}

/// Read `count` records of `stride` bytes each with `read`, after checking
/// that they could possibly fit in the source.
fn read_table<S, T>(
    cursor: &mut Cursor<'_, S>,
    section: &'static str,
    count: u32,
    stride: u64,
    mut read: impl FnMut(&mut Cursor<'_, S>) -> Result<T, ReadError>,
) -> Result<Vec<T>, FlverError>
where
    S: ByteSource + ?Sized,
{
    let size = cursor.source().size();
    if count as u64 * stride > size {
        return Err(FlverError::TableTooLarge {
            section,
            count,
            size,
        });
    }
    debug!("{section}: {count} records @ 0x{:X}", cursor.offset());

    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        records.push(read(cursor)?);
    }
    Ok(records)
}

pub(crate) fn decode<S: ByteSource + ?Sized>(
    source: &S,
    options: &ParseOptions,
) -> Result<Flver, FlverError> {
    let header = FlverHeader::read(source)?;
    let data_offset = header.data_offset;

    let mut cursor = Cursor::at(source, SECTIONS_OFFSET);
    let bones = read_table(&mut cursor, "bone", header.bone_count, BONE_SIZE, |c| {
        Ok(Bone {
            words: c.read_words::<BONE_WORDS>()?,
        })
    })?;
    let mut materials = read_table(
        &mut cursor,
        "material",
        header.material_count,
        MATERIAL_SIZE,
        Material::read,
    )?;
    let parts = read_table(&mut cursor, "part", header.part_count, PART_SIZE, Part::read)?;
    let mesh_infos = read_table(
        &mut cursor,
        "mesh info",
        header.mesh_count,
        MESH_INFO_SIZE,
        MeshInfo::read,
    )?;

    let mut face_sets = Vec::with_capacity(mesh_infos.len());
    for info in &mesh_infos {
        face_sets.push(read_table(
            &mut cursor,
            "face set",
            info.face_set_count,
            FACE_SET_SIZE,
            |c| FaceSet::read(c, data_offset),
        )?);
    }

    let vertex_infos = read_table(
        &mut cursor,
        "vertex info",
        header.mesh_count,
        VERTEX_INFO_SIZE,
        |c| VertexInfo::read(c, data_offset),
    )?;
    let layouts = read_table(
        &mut cursor,
        "stream layout",
        header.layout_count,
        LAYOUT_SIZE,
        StreamLayout::read,
    )?;
    let parameters = read_table(
        &mut cursor,
        "material parameter",
        header.parameter_count,
        PARAMETER_SIZE,
        MaterialParameter::read,
    )?;

    bind_parameters(&mut materials, &parameters)?;
    let materials: Vec<Rc<Material>> = materials.into_iter().map(Rc::new).collect();

    let mut warnings = Vec::new();
    let mut meshes = Vec::with_capacity(mesh_infos.len());
    for (index, ((info, vertex), face_sets)) in mesh_infos
        .into_iter()
        .zip(vertex_infos)
        .zip(face_sets)
        .enumerate()
    {
        if vertex.vertex_size < POSITION_SIZE {
            return Err(FlverError::VertexSizeTooSmall {
                mesh: index,
                vertex_size: vertex.vertex_size,
            });
        }

        let material_index = info.info[1];
        let material = materials
            .get(material_index as usize)
            .cloned()
            .ok_or(FlverError::MaterialIndexOutOfRange {
                mesh: index,
                index: material_index,
                count: materials.len(),
            })?;
        let layout = layouts
            .get(vertex.layout_index as usize)
            .ok_or(FlverError::LayoutIndexOutOfRange {
                mesh: index,
                index: vertex.layout_index,
                count: layouts.len(),
            })?;

        let (streams, layout_warnings) =
            resolve_stream_layout(layout, index, vertex.layout_index as usize);
        warnings.extend(layout_warnings);

        let mut mesh = Mesh {
            info: info.info,
            material_index,
            textures: TextureSlots::resolve(&material),
            material,
            unknown: info.unknown,
            face_sets,
            layout_index: vertex.layout_index,
            vertex_size: vertex.vertex_size,
            vertex_count: vertex.vertex_count,
            vertex_buffer_size: vertex.buffer_size,
            vertex_buffer_offset: vertex.buffer_offset,
            positions: Vec::new(),
            attributes: VertexAttributes::default(),
            streams,
        };

        if options.load_data {
            for face_set in &mut mesh.face_sets {
                face_set.load_indices(source)?;
            }
            mesh.load_vertices(source)?;
            warnings.extend(check_indices(&mesh, index));
        }

        meshes.push(mesh);
    }

    for warning in &warnings {
        warn!("{warning}");
    }

    Ok(Flver {
        header,
        bones,
        materials,
        parts,
        meshes,
        layouts,
        parameters,
        warnings,
    })
}

fn check_indices(mesh: &Mesh, mesh_index: usize) -> Vec<DecodeWarning> {
    mesh.face_sets
        .iter()
        .enumerate()
        .filter_map(|(face_set, set)| {
            let bad: Vec<u16> = set
                .indices
                .iter()
                .copied()
                .filter(|&i| i as u32 >= mesh.vertex_count)
                .collect();
            let max_index = bad.iter().copied().max()?;
            Some(DecodeWarning::IndexOutOfRange {
                mesh: mesh_index,
                face_set,
                count: bad.len(),
                max_index,
                vertex_count: mesh.vertex_count,
            })
        })
        .collect()
}
