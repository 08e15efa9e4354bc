//! Stream layout tables and per-vertex attribute unpacking for FLVER meshes.
//!
//! A vertex record is a 12 byte position followed by 16-bit attribute words.
//! Which words mean what is not fixed: each mesh selects a stream layout table
//! from the file, and walking that table in order yields the word offset of
//! every UV pair, packed color and bone-weight pair.

use std::collections::BTreeMap;
use std::fmt;

use crate::data::cursor::Cursor;
use crate::data::source::ByteSource;
use crate::error::ReadError;
use crate::models::DecodeWarning;
use crate::recognized::Recognized;

/// Divisor applied to signed 16-bit texture coordinates.
pub const UV_SCALE: f32 = 1024.0;

/// Bytes of a vertex record taken by the position.
pub const POSITION_SIZE: u32 = 12;

const DESCRIPTOR_SIZE: u64 = 5 * 4;

/// Datatype tags of stream descriptors that are understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum StreamDatatype {
    /// Already decoded as the record's leading position.
    Position,
    /// Two words, each holding two 8-bit bone indices.
    BoneWeights,
    /// Two words packing alpha/red and green/blue bytes.
    Argb,
    /// One quantized texture coordinate pair.
    Uv,
    /// Two consecutive texture coordinate pairs.
    DualUv,
    /// Known to occupy four words; contents unknown.
    Opaque,
}

impl StreamDatatype {
    const ALL: [StreamDatatype; 6] = [
        StreamDatatype::Position,
        StreamDatatype::BoneWeights,
        StreamDatatype::Argb,
        StreamDatatype::Uv,
        StreamDatatype::DualUv,
        StreamDatatype::Opaque,
    ];

    /// Raw tag stored in a stream descriptor.
    pub fn tag(self) -> u32 {
        match self {
            StreamDatatype::Position => 0x02,
            StreamDatatype::BoneWeights => 0x11,
            StreamDatatype::Argb => 0x13,
            StreamDatatype::Uv => 0x15,
            StreamDatatype::DualUv => 0x16,
            StreamDatatype::Opaque => 0x1A,
        }
    }

    /// Number of attribute words a stream of this type occupies.
    pub fn words(self) -> usize {
        match self {
            StreamDatatype::Position => 0,
            StreamDatatype::BoneWeights | StreamDatatype::Argb | StreamDatatype::Uv => 2,
            StreamDatatype::DualUv | StreamDatatype::Opaque => 4,
        }
    }
}

impl TryFrom<u32> for StreamDatatype {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        StreamDatatype::ALL
            .into_iter()
            .find(|datatype| datatype.tag() == value)
            .ok_or(value)
    }
}

impl fmt::Display for StreamDatatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamDatatype::Position => "position",
            StreamDatatype::BoneWeights => "bone-weights",
            StreamDatatype::Argb => "argb",
            StreamDatatype::Uv => "uv",
            StreamDatatype::DualUv => "uv2",
            StreamDatatype::Opaque => "opaque",
        };
        f.write_str(name)
    }
}

/// One 20-byte entry of a stream layout table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VertexStreamDescriptor {
    pub unknown0: u32,
    /// Byte offset within the vertex record, as recorded by the file.
    pub offset: u32,
    pub datatype: Recognized<StreamDatatype>,
    pub semantic: u32,
    pub index: u32,
}

/// A stream layout table, selected per mesh by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StreamLayout {
    /// Absolute offset of the descriptor array.
    pub offset: u32,
    pub descriptors: Vec<VertexStreamDescriptor>,
}

impl StreamLayout {
    /// Read one 16-byte layout record at the cursor and the descriptors it points to.
    pub fn read<S: ByteSource + ?Sized>(cursor: &mut Cursor<'_, S>) -> Result<Self, ReadError> {
        let count = cursor.read_u32()?;
        cursor.skip(2 * 4);
        let offset = cursor.read_u32()?;

        let source = cursor.source();
        source.ensure_range(offset as u64, count as u64 * DESCRIPTOR_SIZE)?;

        let mut descriptors = Vec::with_capacity(count as usize);
        for i in 0..count as u64 {
            let at = offset as u64 + i * DESCRIPTOR_SIZE;
            descriptors.push(VertexStreamDescriptor {
                unknown0: source.read_u32(at)?,
                offset: source.read_u32(at + 4)?,
                datatype: Recognized::from_raw(source.read_u32(at + 8)?),
                semantic: source.read_u32(at + 12)?,
                index: source.read_u32(at + 16)?,
            });
        }

        Ok(StreamLayout {
            offset,
            descriptors,
        })
    }
}

/// The 16-bit attribute words of every vertex, vertex-major.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VertexAttributes {
    /// Words per vertex.
    pub stride: usize,
    pub words: Vec<u16>,
}

impl VertexAttributes {
    /// Attribute words per vertex for a record of `vertex_size` bytes.
    pub fn stride_for(vertex_size: u32) -> usize {
        (vertex_size.saturating_sub(POSITION_SIZE) / 2) as usize
    }

    pub fn word(&self, vertex: usize, offset: usize) -> Option<u16> {
        self.words.get(vertex * self.stride + offset).copied()
    }
}

/// Unpacked color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Argb {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Argb {
    pub fn from_words(ar: u16, gb: u16) -> Self {
        Argb {
            a: (ar >> 8) as u8,
            r: (ar & 0xFF) as u8,
            g: (gb >> 8) as u8,
            b: (gb & 0xFF) as u8,
        }
    }
}

pub fn dequantize_uv(raw: u16) -> f32 {
    raw as i16 as f32 / UV_SCALE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UvBuffer {
    pub offset: usize,
}

impl UvBuffer {
    pub fn uv(&self, attributes: &VertexAttributes, vertex: usize) -> Option<(f32, f32)> {
        let u = attributes.word(vertex, self.offset)?;
        let v = attributes.word(vertex, self.offset + 1)?;
        Some((dequantize_uv(u), dequantize_uv(v)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ArgbBuffer {
    pub offset: usize,
    pub semantic: u32,
}

impl ArgbBuffer {
    pub fn argb(&self, attributes: &VertexAttributes, vertex: usize) -> Option<Argb> {
        Some(Argb::from_words(
            attributes.word(vertex, self.offset)?,
            attributes.word(vertex, self.offset + 1)?,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BoneWeightBuffer {
    pub offset: usize,
    pub semantic: u32,
}

impl BoneWeightBuffer {
    pub fn weights(&self, attributes: &VertexAttributes, vertex: usize) -> Option<[u16; 2]> {
        Some([
            attributes.word(vertex, self.offset)?,
            attributes.word(vertex, self.offset + 1)?,
        ])
    }
}

/// A typed view over part of each vertex's attribute words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeBuffer {
    Uv(UvBuffer),
    Argb(ArgbBuffer),
    BoneWeights(BoneWeightBuffer),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeValue {
    Uv(f32, f32),
    Argb(Argb),
    BoneWeights([u16; 2]),
}

impl AttributeBuffer {
    pub fn value(&self, attributes: &VertexAttributes, vertex: usize) -> Option<AttributeValue> {
        match self {
            AttributeBuffer::Uv(b) => b.uv(attributes, vertex).map(|(u, v)| AttributeValue::Uv(u, v)),
            AttributeBuffer::Argb(b) => b.argb(attributes, vertex).map(AttributeValue::Argb),
            AttributeBuffer::BoneWeights(b) => {
                b.weights(attributes, vertex).map(AttributeValue::BoneWeights)
            }
        }
    }
}

/// Every attribute buffer bound for one mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AttributeStreams {
    pub uv: Vec<UvBuffer>,
    /// Keyed by descriptor semantic; a repeated semantic replaces the earlier buffer.
    pub argb: BTreeMap<u32, ArgbBuffer>,
    pub bone_weights: Option<BoneWeightBuffer>,
}

impl AttributeStreams {
    fn bind(&mut self, buffer: AttributeBuffer) {
        match buffer {
            AttributeBuffer::Uv(b) => self.uv.push(b),
            AttributeBuffer::Argb(b) => {
                self.argb.insert(b.semantic, b);
            }
            AttributeBuffer::BoneWeights(b) => self.bone_weights = Some(b),
        }
    }

    /// All bound buffers: UVs in table order, then colors by semantic, then bone weights.
    pub fn buffers(&self) -> impl Iterator<Item = AttributeBuffer> + '_ {
        self.uv
            .iter()
            .copied()
            .map(AttributeBuffer::Uv)
            .chain(self.argb.values().copied().map(AttributeBuffer::Argb))
            .chain(self.bone_weights.map(AttributeBuffer::BoneWeights))
    }
}

/// Walk `layout` in table order, binding a buffer for every understood
/// datatype at the running word offset.
///
/// An unknown datatype advances the offset by nothing. Every buffer bound after
/// it may therefore be misaligned, which the returned warning records by
/// counting the descriptors that follow.
pub fn resolve_stream_layout(
    layout: &StreamLayout,
    mesh: usize,
    layout_index: usize,
) -> (AttributeStreams, Vec<DecodeWarning>) {
    let mut streams = AttributeStreams::default();
    let mut warnings = Vec::new();
    let mut offset = 0usize;

    for (position, descriptor) in layout.descriptors.iter().enumerate() {
        let datatype = match descriptor.datatype {
            Recognized::Known(datatype) => datatype,
            Recognized::Unknown(tag) => {
                warnings.push(DecodeWarning::UnrecognizedStreamDatatype {
                    mesh,
                    layout: layout_index,
                    datatype: tag,
                    semantic: descriptor.semantic,
                    trailing: layout.descriptors.len() - position - 1,
                });
                continue;
            }
        };

        let semantic = descriptor.semantic;
        match datatype {
            StreamDatatype::Position | StreamDatatype::Opaque => {}
            StreamDatatype::BoneWeights => {
                streams.bind(AttributeBuffer::BoneWeights(BoneWeightBuffer { offset, semantic }))
            }
            StreamDatatype::Argb => streams.bind(AttributeBuffer::Argb(ArgbBuffer { offset, semantic })),
            StreamDatatype::Uv => streams.bind(AttributeBuffer::Uv(UvBuffer { offset })),
            StreamDatatype::DualUv => {
                streams.bind(AttributeBuffer::Uv(UvBuffer { offset }));
                streams.bind(AttributeBuffer::Uv(UvBuffer { offset: offset + 2 }));
            }
        }
        offset += datatype.words();
    }

    (streams, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_util::BlobWriter;

    fn descriptor(datatype: u32, semantic: u32) -> VertexStreamDescriptor {
        VertexStreamDescriptor {
            unknown0: 0,
            offset: 0,
            datatype: Recognized::from_raw(datatype),
            semantic,
            index: 0,
        }
    }

    fn layout(descriptors: &[(u32, u32)]) -> StreamLayout {
        StreamLayout {
            offset: 0,
            descriptors: descriptors
                .iter()
                .map(|&(datatype, semantic)| descriptor(datatype, semantic))
                .collect(),
        }
    }

    #[test]
    fn stride_formula() {
        assert_eq!(VertexAttributes::stride_for(12), 0);
        assert_eq!(VertexAttributes::stride_for(16), 2);
        assert_eq!(VertexAttributes::stride_for(36), 12);
        assert_eq!(VertexAttributes::stride_for(37), 12);
    }

    #[test]
    fn walks_offsets_in_table_order() {
        let (streams, warnings) = resolve_stream_layout(
            &layout(&[(0x02, 0), (0x11, 9), (0x13, 0x0A), (0x16, 5), (0x1A, 0), (0x15, 5)]),
            0,
            0,
        );
        assert!(warnings.is_empty());
        assert_eq!(
            streams.bone_weights,
            Some(BoneWeightBuffer {
                offset: 0,
                semantic: 9
            })
        );
        assert_eq!(streams.argb[&0x0A].offset, 2);
        let uv_offsets: Vec<usize> = streams.uv.iter().map(|b| b.offset).collect();
        assert_eq!(uv_offsets, vec![4, 6, 12]);
        assert_eq!(streams.buffers().count(), 5);
    }

    #[test]
    fn unknown_datatype_consumes_nothing_and_warns() {
        let (streams, warnings) =
            resolve_stream_layout(&layout(&[(0x15, 0), (0x99, 7), (0x15, 0), (0x13, 3)]), 4, 1);
        assert_eq!(
            warnings,
            vec![DecodeWarning::UnrecognizedStreamDatatype {
                mesh: 4,
                layout: 1,
                datatype: 0x99,
                semantic: 7,
                trailing: 2,
            }]
        );
        assert_eq!(streams.uv[1].offset, 2);
        assert_eq!(streams.argb[&3].offset, 4);
    }

    #[test]
    fn repeated_argb_semantic_replaces() {
        let (streams, _) = resolve_stream_layout(&layout(&[(0x13, 6), (0x13, 6)]), 0, 0);
        assert_eq!(streams.argb.len(), 1);
        assert_eq!(streams.argb[&6].offset, 2);
    }

    #[test]
    fn uv_scale_and_round_trip() {
        let attributes = VertexAttributes {
            stride: 2,
            words: vec![1024, (-1024i16) as u16, 512, (-256i16) as u16],
        };
        let buffer = UvBuffer { offset: 0 };
        assert_eq!(buffer.uv(&attributes, 0), Some((1.0, -1.0)));
        assert_eq!(buffer.uv(&attributes, 1), Some((0.5, -0.25)));
        assert_eq!(buffer.uv(&attributes, 2), None);

        for value in [-31.5f32, -1.0, -0.0007, 0.0, 0.123, 0.999, 7.77, 31.99] {
            let raw = (value * UV_SCALE).round() as i16 as u16;
            assert!((dequantize_uv(raw) - value).abs() <= 1.0 / UV_SCALE);
        }
    }

    #[test]
    fn argb_masks_are_exact() {
        assert_eq!(
            Argb::from_words(0xAB12, 0x34CD),
            Argb {
                a: 0xAB,
                r: 0x12,
                g: 0x34,
                b: 0xCD
            }
        );
        let attributes = VertexAttributes {
            stride: 3,
            words: vec![0, 0xFF00, 0x00FF, 0, 0x0102, 0x0304],
        };
        let buffer = ArgbBuffer {
            offset: 1,
            semantic: 0x0A,
        };
        assert_eq!(
            buffer.argb(&attributes, 0),
            Some(Argb {
                a: 0xFF,
                r: 0,
                g: 0,
                b: 0xFF
            })
        );
        assert_eq!(
            AttributeBuffer::Argb(buffer).value(&attributes, 1),
            Some(AttributeValue::Argb(Argb {
                a: 1,
                r: 2,
                g: 3,
                b: 4
            }))
        );
    }

    #[test]
    fn reads_layout_record_and_descriptors() {
        let mut blob = BlobWriter::new(0x40);
        blob.put_u32(0, 2).put_u32(12, 0x10);
        blob.put_u32(0x10 + 4, 12).put_u32(0x10 + 8, 0x15).put_u32(0x10 + 12, 1);
        blob.put_u32(0x24 + 8, 0x42).put_u32(0x24 + 16, 3);
        let data = blob.into_inner();

        let mut cursor = Cursor::new(&data);
        let layout = StreamLayout::read(&mut cursor).unwrap();
        assert_eq!(cursor.offset(), 16);
        assert_eq!(layout.offset, 0x10);
        assert_eq!(layout.descriptors.len(), 2);
        assert_eq!(layout.descriptors[0].offset, 12);
        assert_eq!(
            layout.descriptors[0].datatype,
            Recognized::Known(StreamDatatype::Uv)
        );
        assert_eq!(layout.descriptors[1].datatype, Recognized::Unknown(0x42));
        assert_eq!(layout.descriptors[1].index, 3);
    }

    #[test]
    fn datatype_tags_classify_back() {
        assert_eq!(StreamDatatype::Uv.tag(), 0x15);
        assert_eq!(StreamDatatype::Opaque.tag(), 0x1A);
        for datatype in StreamDatatype::ALL {
            assert_eq!(StreamDatatype::try_from(datatype.tag()), Ok(datatype));
        }
        assert_eq!(StreamDatatype::try_from(0x12), Err(0x12));
    }
}
