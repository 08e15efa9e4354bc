use thiserror::Error;

/// FLVER mesh files
pub mod flver;
/// HKX collision geometry
pub mod hkx;
/// Materials, their parameters and texture roles
pub mod material;
/// MSB scene placement files
pub mod msb;
/// TPF texture containers
pub mod tpf;
/// Stream layout tables and vertex attribute unpacking
pub mod vertex_format;

/// A problem found while decoding that leaves the rest of the result usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DecodeWarning {
    #[error(
        "mesh {mesh}: layout {layout} has unrecognized datatype 0x{datatype:02X} (semantic 0x{semantic:02X}); {trailing} later streams may be misaligned"
    )]
    UnrecognizedStreamDatatype {
        mesh: usize,
        layout: usize,
        datatype: u32,
        semantic: u32,
        /// Descriptors that follow the unrecognized one in the same table.
        trailing: usize,
    },
    #[error(
        "mesh {mesh}: face set {face_set} has {count} indices >= vertex count {vertex_count} (max {max_index})"
    )]
    IndexOutOfRange {
        mesh: usize,
        face_set: usize,
        count: usize,
        max_index: u16,
        vertex_count: u32,
    },
}
