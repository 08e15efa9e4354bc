//! Collision meshes from HKX physics files.
//!
//! Only one packfile layout is understood, and its sections are located at
//! fixed offsets rather than through the packfile's own tables. Files with a
//! different layout decode to garbage or fail with an out-of-range read.

use rootcause::Report;
use thiserror::Error;
use tracing::debug;

use crate::data::source::ByteSource;
use crate::error::ReadError;

const TRANSFORM_OFFSET: u64 = 0x3F0;
const SECTION_POINTER_OFFSET: u64 = 0x594;
const SECTION_BASE_ADJUST: u64 = 0x5A0;
const CHUNK_COUNT_OFFSET: u64 = 0xBC;
const FIRST_CHUNK_OFFSET: u64 = 0x220;
const CHUNK_HEADER_SIZE: u64 = 0x70;
const VERTEX_STRIDE: u64 = 0x10;
const TRIANGLE_STRIDE: u64 = 8;

#[derive(Debug, Error)]
pub enum HkxError {
    #[error("read error")]
    Read(#[from] ReadError),
}

/// A 4x4 matrix stored as four columns of four floats.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Transform {
    pub columns: [[f32; 4]; 4],
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        columns: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn read<S: ByteSource + ?Sized>(source: &S, offset: u64) -> Result<Self, ReadError> {
        let mut columns = [[0.0; 4]; 4];
        for (j, column) in columns.iter_mut().enumerate() {
            for (i, value) in column.iter_mut().enumerate() {
                *value = source.read_f32(offset + j as u64 * 16 + i as u64 * 4)?;
            }
        }
        Ok(Transform { columns })
    }

    /// Transform a point, treating it as `(x, y, z, 1)`.
    pub fn apply(&self, p: [f32; 3]) -> [f32; 3] {
        let c = &self.columns;
        let row = |i: usize| p[0] * c[0][i] + p[1] * c[1][i] + p[2] * c[2][i] + c[3][i];
        [row(0), row(1), row(2)]
    }
}

/// One collision chunk: transformed points and triangle indices.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CollisionMesh {
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[u16; 3]>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CollisionGeometry {
    pub transform: Transform,
    pub meshes: Vec<CollisionMesh>,
}

pub fn parse_hkx<S: ByteSource + ?Sized>(source: &S) -> Result<CollisionGeometry, Report<HkxError>> {
    Ok(decode(source)?)
}

fn decode<S: ByteSource + ?Sized>(source: &S) -> Result<CollisionGeometry, HkxError> {
    let transform = Transform::read(source, TRANSFORM_OFFSET)?;
    let base = source.read_u32(SECTION_POINTER_OFFSET)? as u64 + SECTION_BASE_ADJUST;
    let chunk_count = source.read_u32(base + CHUNK_COUNT_OFFSET)? as u64;
    debug!("collision section @ 0x{base:X}, {chunk_count} chunks");

    let mut meshes = Vec::new();
    if chunk_count == 0 {
        return Ok(CollisionGeometry { transform, meshes });
    }

    let mut vbase = base + FIRST_CHUNK_OFFSET + (chunk_count - 1) * CHUNK_HEADER_SIZE;
    for _ in 0..chunk_count {
        // Empty slots precede a chunk's vertices. A read past the end stops this.
        let mut vertex_count = source.read_u32(vbase - CHUNK_HEADER_SIZE + 0x0C)? as u64;
        while vertex_count == 0 {
            vbase += VERTEX_STRIDE;
            vertex_count = source.read_u32(vbase - CHUNK_HEADER_SIZE + 0x0C)? as u64;
        }
        source.ensure_range(vbase, vertex_count * VERTEX_STRIDE)?;

        let mut vertices = Vec::with_capacity(vertex_count as usize);
        for i in 0..vertex_count {
            let at = vbase + i * VERTEX_STRIDE;
            let p = [
                source.read_f32(at)?,
                source.read_f32(at + 4)?,
                source.read_f32(at + 8)?,
            ];
            vertices.push(transform.apply(p));
        }

        let triangle_count = source.read_u32(vbase - CHUNK_HEADER_SIZE + 0x24)? as u64 / 4;
        let tbase = vbase + vertex_count * VERTEX_STRIDE;
        source.ensure_range(tbase, triangle_count * TRIANGLE_STRIDE)?;

        let mut triangles = Vec::with_capacity(triangle_count as usize);
        for i in 0..triangle_count {
            let at = tbase + i * TRIANGLE_STRIDE;
            triangles.push([
                source.read_u16(at)?,
                source.read_u16(at + 2)?,
                source.read_u16(at + 4)?,
            ]);
        }

        meshes.push(CollisionMesh {
            vertices,
            triangles,
        });

        vbase = tbase + triangle_count * TRIANGLE_STRIDE + CHUNK_HEADER_SIZE;
        if vbase % 16 != 0 {
            vbase += 8;
        }
    }

    Ok(CollisionGeometry { transform, meshes })
}
