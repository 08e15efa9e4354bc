//! Text listings of decoded files, one record per line.
//!
//! Numbers that identify things (indices, offsets, flags) are printed in
//! upper-case hex; counts are decimal.

use std::io::{self, Write};

use crate::data::bdf::{ExtractReport, ResolvedArchive};
use crate::models::flver::{Flver, Mesh};
use crate::models::hkx::CollisionGeometry;
use crate::models::msb::Scene;
use crate::models::tpf::TextureContainer;
use crate::models::vertex_format::{AttributeBuffer, AttributeValue};

/// Width of the signed position fields, e.g. `+000.000`.
const POSITION_WIDTH: usize = 8;

fn hex_words(words: &[u32]) -> String {
    words
        .iter()
        .map(|w| format!("{w:08X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Structure listing: bones, parts, mesh info, materials, face sets,
/// material parameters, bone assignment counts, then decode warnings.
pub fn dump_flver(flver: &Flver, out: &mut impl Write) -> io::Result<()> {
    for (i, bone) in flver.bones.iter().enumerate() {
        writeln!(out, "bone{i:02X} {}", hex_words(&bone.words))?;
    }

    for (i, part) in flver.parts.iter().enumerate() {
        let [u0, u1, u2] = part.unknown;
        writeln!(
            out,
            "part{i:02X} part {u0:08X} {u1:08X} {u2:08X} [t={}, r={}, s={} {} {}] {}",
            part.translation,
            part.euler,
            part.scale,
            part.bounding_box.min,
            part.bounding_box.max,
            part.name
        )?;
    }

    for (i, mesh) in flver.meshes.iter().enumerate() {
        let [u0, u1, u2] = mesh.unknown;
        writeln!(
            out,
            "mesh{i:02X} meshinfo {} {u0:08X} {u1:08X} {u2:08X} sz={:02X} argb#={} uv#={} {}",
            mesh.texture_config(),
            mesh.vertex_size,
            mesh.streams.argb.len(),
            mesh.streams.uv.len(),
            hex_words(&mesh.info)
        )?;
    }

    for (i, mesh) in flver.meshes.iter().enumerate() {
        writeln!(
            out,
            "mesh{i:02X} material {:08X} {}",
            mesh.material.unknown0, mesh.material.shader
        )?;
    }

    for (i, mesh) in flver.meshes.iter().enumerate() {
        for face_set in &mesh.face_sets {
            writeln!(
                out,
                "mesh{i:02X} faceset {:08X} {:08X} {} indices",
                face_set.unknown0, face_set.unknown1, face_set.index_count
            )?;
        }
    }

    for (i, mesh) in flver.meshes.iter().enumerate() {
        for param in mesh.material.params.values() {
            writeln!(
                out,
                "mesh{i:02X} matparam {:07.3} {:07.3} {:08X} {:08X} {}={}",
                param.unknown0,
                param.unknown1,
                param.unknown2,
                param.unknown3,
                param.name,
                param.value
            )?;
        }
    }

    for (i, mesh) in flver.meshes.iter().enumerate() {
        let Some(counts) = bone_assignments(mesh) else {
            continue;
        };
        let used: Vec<String> = counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(bone, count)| format!("{bone:02X}:{count}"))
            .collect();
        writeln!(out, "mesh{i:02X} boneasn {}", used.join("  "))?;
    }

    for warning in &flver.warnings {
        writeln!(out, "warning {warning}")?;
    }
    Ok(())
}

/// How often each bone index is referenced by the mesh's vertices. Each
/// vertex packs four bone indices into the bytes of its two weight words.
///
/// `None` when the mesh has no bone weights or its vertex data isn't loaded.
pub fn bone_assignments(mesh: &Mesh) -> Option<[u32; 256]> {
    mesh.streams.bone_weights?;
    if !mesh.data_loaded() {
        return None;
    }

    let mut counts = [0u32; 256];
    for vertex in 0..mesh.vertex_count as usize {
        let Some(words) = mesh.bone_weights(vertex) else {
            continue;
        };
        for word in words {
            for byte in word.to_be_bytes() {
                counts[byte as usize] += 1;
            }
        }
    }
    Some(counts)
}

/// Per-vertex listing: position, then every UV, color and bone weight
/// stream bound for the mesh.
pub fn dump_flver_vertices(name: &str, flver: &Flver, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "flv {name}")?;
    writeln!(out, "  parts = {}", flver.parts.len())?;

    for (i, mesh) in flver.meshes.iter().enumerate() {
        writeln!(
            out,
            "mesh {i}, {} face-sets, tex-config: {}",
            mesh.face_sets.len(),
            mesh.texture_config()
        )?;

        for (vertex, position) in mesh.positions.iter().enumerate() {
            write!(out, "  vertex {}", position.format_signed(",", POSITION_WIDTH))?;
            for buffer in mesh.streams.buffers() {
                match (buffer, buffer.value(&mesh.attributes, vertex)) {
                    (_, Some(AttributeValue::Uv(u, v))) => write!(out, " uv={u:+07.3},{v:+07.3}")?,
                    (AttributeBuffer::Argb(b), Some(AttributeValue::Argb(c))) => write!(
                        out,
                        " argb[{:02X}]={:02X},{:02X},{:02X},{:02X}",
                        b.semantic, c.a, c.r, c.g, c.b
                    )?,
                    (_, Some(AttributeValue::BoneWeights([w0, w1]))) => {
                        write!(out, " bones={w0:04X},{w1:04X}")?
                    }
                    _ => {}
                }
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

/// One line per texture. The `bpp` column is bits per pixel, not bytes, so a
/// DXT5 texture reads 8.00. See [`Texture::bits_per_pixel`].
///
/// [`Texture::bits_per_pixel`]: crate::models::tpf::Texture::bits_per_pixel
pub fn dump_tpf(name: &str, tpf: &TextureContainer, out: &mut impl Write) -> io::Result<()> {
    let count = tpf.textures.len();
    for (i, texture) in tpf.textures.iter().enumerate() {
        writeln!(
            out,
            "{name:<40} {i:>2}/{count:>2} type={:08X} dofs={:08X} dlen={:08X} {:>4}x{:<4} {:>7.2} bpp {}",
            texture.format_tag(),
            texture.data_offset,
            texture.data_len,
            texture.width,
            texture.height,
            texture.bits_per_pixel(),
            texture.name
        )?;
    }
    Ok(())
}

/// Models with the parts placing them, then points.
pub fn dump_msb(scene: &Scene, out: &mut impl Write) -> io::Result<()> {
    for (index, model) in scene.models.iter().enumerate() {
        writeln!(
            out,
            "model      {index:04X} {:<20} type={:04X} localid={:04X} instance-count={} {}",
            model.name, model.model_type, model.local_id, model.instance_count, model.file_name
        )?;
        for (instance, part) in model
            .instances
            .iter()
            .filter_map(|&p| scene.parts.get(p))
            .enumerate()
        {
            writeln!(
                out,
                "  instance {instance:04X} {:<20} type={:04X} localid={:04X} trafo={} {} {}",
                part.name,
                part.part_type,
                part.local_id,
                part.translation.format_signed(", ", POSITION_WIDTH),
                part.euler.format_signed(", ", POSITION_WIDTH),
                part.scale.format_signed(", ", POSITION_WIDTH)
            )?;
        }
    }

    for (index, point) in scene.points.iter().enumerate() {
        writeln!(
            out,
            "point {index:04X} {:04X} {} {}",
            point.id,
            point.position.format_signed(", ", POSITION_WIDTH),
            point.name
        )?;
    }
    Ok(())
}

pub fn dump_hkx(name: &str, geometry: &CollisionGeometry, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "hkx {name}")?;
    for (j, column) in geometry.transform.columns.iter().enumerate() {
        let [a, b, c, d] = column;
        writeln!(out, "  column{j} {a:+.3} {b:+.3} {c:+.3} {d:+.3}")?;
    }
    for (i, mesh) in geometry.meshes.iter().enumerate() {
        writeln!(
            out,
            "chunk{i:02X} {} vertices {} triangles",
            mesh.vertices.len(),
            mesh.triangles.len()
        )?;
    }
    Ok(())
}

/// One line per extracted entry, in the form
/// `<archive> <index> <offset> size= zsbhf= zsbdf= (<difference>) <name> <output name>`,
/// followed by the entries that failed.
pub fn dump_extract_report(
    archive: &ResolvedArchive,
    report: &ExtractReport,
    out: &mut impl Write,
) -> io::Result<()> {
    if let Some(header) = &archive.header {
        writeln!(out, "found match {header}")?;
    }
    for extracted in &report.extracted {
        let entry = &extracted.entry;
        writeln!(
            out,
            "{:<16} {:>4} {:08X} size={:08X} zsbhf={:08X} zsbdf={:08X} ({:02X}) {} {}",
            archive.name,
            entry.index,
            entry.offset,
            entry.size,
            entry.compressed_size_header,
            entry.compressed_size_data,
            entry
                .compressed_size_header
                .wrapping_sub(entry.compressed_size_data),
            entry.name,
            extracted.output_name
        )?;
    }
    for failure in &report.failures {
        writeln!(out, "{:<16} failed: {failure}", archive.name)?;
    }
    Ok(())
}
