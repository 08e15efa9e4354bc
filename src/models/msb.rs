//! MSB scene placement files.
//!
//! The file is a chain of tables. Each table names its section, lists the
//! offsets of its records and ends with the offset of the next table. The
//! section name picks the record parser.

use rootcause::Report;
use thiserror::Error;
use tracing::debug;

use crate::data::cursor::Cursor;
use crate::data::parser_utils::Vec3;
use crate::data::source::ByteSource;
use crate::error::ReadError;

#[derive(Debug, Error)]
pub enum MsbError {
    #[error("read error")]
    Read(#[from] ReadError),
    #[error("unrecognized section {name:?} at 0x{offset:X}")]
    UnrecognizedSectionName { name: String, offset: u64 },
    #[error("section {name} at 0x{offset:X} has an empty offset table")]
    EmptyTable { name: String, offset: u64 },
    #[error("part {part} references model {index}, but only {count} models precede it")]
    ModelIndexOutOfRange { part: usize, index: u32, count: usize },
    #[error("table at 0x{0:X} was already visited")]
    TableCycle(u64),
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ModelParam {
    pub name: String,
    pub file_name: String,
    pub model_type: u32,
    pub local_id: u32,
    pub instance_count: u32,
    /// Indices into [`Scene::parts`] of the parts placing this model.
    pub instances: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PartParam {
    pub name: String,
    pub part_type: u32,
    pub local_id: u32,
    /// Index into [`Scene::models`].
    pub model: usize,
    pub translation: Vec3,
    pub euler: Vec3,
    pub scale: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PointParam {
    pub name: String,
    pub id: u32,
    pub position: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Scene {
    pub models: Vec<ModelParam>,
    pub parts: Vec<PartParam>,
    pub points: Vec<PointParam>,
}

type RecordParser<S> = fn(&mut Cursor<'_, S>, &mut Scene) -> Result<(), MsbError>;

/// Record parser for a section name, if the section is understood.
fn section_parser<S: ByteSource + ?Sized>(name: &str) -> Option<RecordParser<S>> {
    let parser: RecordParser<S> = match name {
        "MODEL_PARAM_ST" => read_model,
        "EVENT_PARAM_ST" => skip_event,
        "POINT_PARAM_ST" => read_point,
        "PARTS_PARAM_ST" => read_part,
        _ => return None,
    };
    Some(parser)
}

fn read_model<S: ByteSource + ?Sized>(
    cursor: &mut Cursor<'_, S>,
    scene: &mut Scene,
) -> Result<(), MsbError> {
    let name = cursor.read_rel_cstring()?;
    let model_type = cursor.read_u32()?;
    let local_id = cursor.read_u32()?;
    let file_name = cursor.read_rel_cstring()?;
    let instance_count = cursor.read_u32()?;

    scene.models.push(ModelParam {
        name,
        file_name,
        model_type,
        local_id,
        instance_count,
        instances: Vec::new(),
    });
    Ok(())
}

fn skip_event<S: ByteSource + ?Sized>(
    _cursor: &mut Cursor<'_, S>,
    _scene: &mut Scene,
) -> Result<(), MsbError> {
    Ok(())
}

fn read_point<S: ByteSource + ?Sized>(
    cursor: &mut Cursor<'_, S>,
    scene: &mut Scene,
) -> Result<(), MsbError> {
    let name = cursor.read_rel_cstring()?;
    cursor.skip(4);
    let id = cursor.read_u32()?;
    cursor.skip(4);
    let position = cursor.read_vec3()?;

    scene.points.push(PointParam { name, id, position });
    Ok(())
}

fn read_part<S: ByteSource + ?Sized>(
    cursor: &mut Cursor<'_, S>,
    scene: &mut Scene,
) -> Result<(), MsbError> {
    let name = cursor.read_rel_cstring()?;
    let part_type = cursor.read_u32()?;
    let local_id = cursor.read_u32()?;
    let model_index = cursor.read_u32()?;
    cursor.skip(4);
    let translation = cursor.read_vec3()?;
    let euler = cursor.read_vec3()?;
    let scale = cursor.read_vec3()?;

    let part = scene.parts.len();
    let count = scene.models.len();
    let model = scene
        .models
        .get_mut(model_index as usize)
        .ok_or(MsbError::ModelIndexOutOfRange {
            part,
            index: model_index,
            count,
        })?;
    model.instances.push(part);

    scene.parts.push(PartParam {
        name,
        part_type,
        local_id,
        model: model_index as usize,
        translation,
        euler,
        scale,
    });
    Ok(())
}

pub fn parse_msb<S: ByteSource + ?Sized>(source: &S) -> Result<Scene, Report<MsbError>> {
    Ok(decode(source)?)
}

fn decode<S: ByteSource + ?Sized>(source: &S) -> Result<Scene, MsbError> {
    let mut scene = Scene::default();
    let mut visited = Vec::new();
    let mut table = 0u64;

    loop {
        if visited.contains(&table) {
            return Err(MsbError::TableCycle(table));
        }
        visited.push(table);

        let mut cursor = Cursor::at(source, table);
        cursor.skip(4);
        let name = cursor.read_ptr_cstring()?;
        let parser = section_parser::<S>(&name).ok_or_else(|| MsbError::UnrecognizedSectionName {
            name: name.clone(),
            offset: table,
        })?;

        let count = cursor.read_u32()? as u64;
        if count == 0 {
            return Err(MsbError::EmptyTable {
                name,
                offset: table,
            });
        }
        let offsets_at = cursor.offset();
        source.ensure_range(offsets_at, count * 4)?;
        debug!("{name} @ 0x{table:X}: {} records", count - 1);

        for i in 0..count - 1 {
            let record = source.read_u32(offsets_at + i * 4)?;
            cursor.seek(record as u64);
            parser(&mut cursor, &mut scene)?;
        }

        let next = source.read_u32(offsets_at + (count - 1) * 4)?;
        if next == 0 {
            return Ok(scene);
        }
        table = next as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_util::BlobWriter;

    /// Write a table at `at` naming `section` (name stored at `name_at`),
    /// pointing at `records` and then `next`.
    fn put_table(
        b: &mut BlobWriter,
        at: usize,
        name_at: usize,
        section: &str,
        records: &[u32],
        next: u32,
    ) {
        b.put_u32(at + 4, name_at as u32);
        b.put_cstring(name_at, section.as_bytes());
        b.put_u32(at + 8, records.len() as u32 + 1);
        for (i, &r) in records.iter().enumerate() {
            b.put_u32(at + 12 + i * 4, r);
        }
        b.put_u32(at + 12 + records.len() * 4, next);
    }

    /// A record whose first word is a name relative to the record start.
    fn put_rel_name(b: &mut BlobWriter, field: usize, name_at: usize, name: &str) {
        b.put_u32(field, (name_at - field) as u32);
        b.put_cstring(name_at, name.as_bytes());
    }

    fn build_scene() -> BlobWriter {
        let mut b = BlobWriter::new(0x400);
        put_table(&mut b, 0x00, 0x20, "MODEL_PARAM_ST", &[0x100], 0x40);
        put_table(&mut b, 0x40, 0x60, "EVENT_PARAM_ST", &[0x3F0], 0x80);
        put_table(&mut b, 0x80, 0xA0, "POINT_PARAM_ST", &[0x180], 0xC0);
        put_table(&mut b, 0xC0, 0xE0, "PARTS_PARAM_ST", &[0x200, 0x280], 0);

        // model @0x100
        put_rel_name(&mut b, 0x100, 0x140, "m1000B0");
        b.put_u32(0x104, 1).put_u32(0x108, 7);
        put_rel_name(&mut b, 0x10C, 0x150, "N:\\map\\m1000B0.sib");
        b.put_u32(0x110, 2);

        // point @0x180
        put_rel_name(&mut b, 0x180, 0x1C0, "c1000_spawn");
        b.put_u32(0x188, 0x42);
        b.put_vec3(0x190, Vec3::new(1.0, 2.0, 3.0));

        // parts @0x200 and @0x280
        for (at, name) in [(0x200, "p_a"), (0x280, "p_b")] {
            put_rel_name(&mut b, at, at + 0x60, name);
            b.put_u32(at + 4, 3).put_u32(at + 8, 9).put_u32(at + 12, 0);
            b.put_vec3(at + 20, Vec3::new(10.0, 0.0, -10.0));
            b.put_vec3(at + 32, Vec3::new(0.0, 90.0, 0.0));
            b.put_vec3(at + 44, Vec3::new(1.0, 1.0, 1.0));
        }
        b
    }

    #[test]
    fn parses_table_chain() {
        let scene = parse_msb(&build_scene().into_inner()).unwrap();

        assert_eq!(scene.models.len(), 1);
        let model = &scene.models[0];
        assert_eq!(model.name, "m1000B0");
        assert_eq!(model.file_name, "N:\\map\\m1000B0.sib");
        assert_eq!((model.model_type, model.local_id, model.instance_count), (1, 7, 2));
        assert_eq!(model.instances, vec![0, 1]);

        assert_eq!(scene.points[0].name, "c1000_spawn");
        assert_eq!(scene.points[0].id, 0x42);
        assert_eq!(scene.points[0].position, Vec3::new(1.0, 2.0, 3.0));

        assert_eq!(scene.parts.len(), 2);
        assert_eq!(scene.parts[1].name, "p_b");
        assert_eq!(scene.parts[1].model, 0);
        assert_eq!(scene.parts[1].translation, Vec3::new(10.0, 0.0, -10.0));
        assert_eq!(scene.parts[1].euler, Vec3::new(0.0, 90.0, 0.0));
    }

    #[test]
    fn unknown_section_is_an_error() {
        let mut b = build_scene();
        b.put_cstring(0xA0, b"LIGHT_PARAM_ST");
        let err = decode(&b.into_inner()).unwrap_err();
        assert!(matches!(
            err,
            MsbError::UnrecognizedSectionName { ref name, offset: 0x80 } if name == "LIGHT_PARAM_ST"
        ));
    }

    #[test]
    fn structural_errors() {
        let mut b = build_scene();
        b.put_u32(0x20C, 5);
        assert!(matches!(
            decode(&b.into_inner()),
            Err(MsbError::ModelIndexOutOfRange { part: 0, index: 5, count: 1 })
        ));

        let mut b = build_scene();
        b.put_u32(0x48, 0);
        assert!(matches!(
            decode(&b.into_inner()),
            Err(MsbError::EmptyTable { offset: 0x40, .. })
        ));

        let mut b = build_scene();
        // next-table word of the parts table
        b.put_u32(0xD4, 0x40);
        assert!(matches!(decode(&b.into_inner()), Err(MsbError::TableCycle(0x40))));
    }
}
