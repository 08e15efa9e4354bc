//! FLVER materials and the parameters that name their textures.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::data::cursor::Cursor;
use crate::data::parser_utils::file_stem;
use crate::data::source::ByteSource;
use crate::error::ReadError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaterialError {
    #[error(
        "material {material} uses parameters {start}..{start}+{count}, but only {available} exist"
    )]
    ParameterRangeOutOfBounds {
        material: usize,
        start: u32,
        count: u32,
        available: usize,
    },
}

/// A named value attached to a material, usually a texture path.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MaterialParameter {
    pub name: String,
    pub value: String,
    pub unknown0: f32,
    pub unknown1: f32,
    pub unknown2: u32,
    pub unknown3: u32,
}

impl MaterialParameter {
    /// Read one 32-byte parameter record.
    pub fn read<S: ByteSource + ?Sized>(cursor: &mut Cursor<'_, S>) -> Result<Self, ReadError> {
        let value = cursor.read_ptr_wide_string()?;
        let name = cursor.read_ptr_wide_string()?;
        let unknown0 = cursor.read_f32()?;
        let unknown1 = cursor.read_f32()?;
        let unknown2 = cursor.read_u32()?;
        let unknown3 = cursor.read_u32()?;
        cursor.read_reserved("matparam", 2)?;

        Ok(MaterialParameter {
            name,
            value,
            unknown0,
            unknown1,
            unknown2,
            unknown3,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Material {
    pub name: String,
    /// Shader definition (`.mtd`) path.
    pub shader: String,
    pub param_count: u32,
    pub param_start: u32,
    pub unknown0: u32,
    /// Parameters by name, filled in by [`bind_parameters`].
    pub params: BTreeMap<String, MaterialParameter>,
}

impl Material {
    /// Read one 32-byte material record.
    pub fn read<S: ByteSource + ?Sized>(cursor: &mut Cursor<'_, S>) -> Result<Self, ReadError> {
        let name = cursor.read_ptr_wide_string()?;
        let shader = cursor.read_ptr_wide_string()?;
        let param_count = cursor.read_u32()?;
        let param_start = cursor.read_u32()?;
        let unknown0 = cursor.read_u32()?;
        cursor.read_reserved("material", 3)?;

        Ok(Material {
            name,
            shader,
            param_count,
            param_start,
            unknown0,
            params: BTreeMap::new(),
        })
    }

    pub fn param_value(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|p| p.value.as_str())
    }
}

/// Give every material a by-name view of its slice of `params`.
///
/// When a name repeats within a slice the later parameter wins.
pub fn bind_parameters(
    materials: &mut [Material],
    params: &[MaterialParameter],
) -> Result<(), MaterialError> {
    for (index, material) in materials.iter_mut().enumerate() {
        let start = material.param_start as usize;
        let slice = start
            .checked_add(material.param_count as usize)
            .and_then(|end| params.get(start..end))
            .ok_or(MaterialError::ParameterRangeOutOfBounds {
                material: index,
                start: material.param_start,
                count: material.param_count,
                available: params.len(),
            })?;

        material.params = slice
            .iter()
            .map(|p| (p.name.clone(), p.clone()))
            .collect();
    }
    Ok(())
}

/// Texture parameters the tools know how to interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TextureRole {
    Diffuse,
    Diffuse2,
    Bumpmap,
    Bumpmap2,
    Lightmap,
}

impl TextureRole {
    /// In summary-string order.
    pub const ALL: [TextureRole; 5] = [
        TextureRole::Diffuse,
        TextureRole::Bumpmap,
        TextureRole::Diffuse2,
        TextureRole::Bumpmap2,
        TextureRole::Lightmap,
    ];

    pub fn param_name(self) -> &'static str {
        match self {
            TextureRole::Diffuse => "g_Diffuse",
            TextureRole::Diffuse2 => "g_Diffuse_2",
            TextureRole::Bumpmap => "g_Bumpmap",
            TextureRole::Bumpmap2 => "g_Bumpmap_2",
            TextureRole::Lightmap => "g_Lightmap",
        }
    }

    /// Marker used in [`TextureSlots::config_string`].
    pub fn marker(self) -> &'static str {
        match self {
            TextureRole::Diffuse => "D1",
            TextureRole::Diffuse2 => "D2",
            TextureRole::Bumpmap => "B1",
            TextureRole::Bumpmap2 => "B2",
            TextureRole::Lightmap => "L",
        }
    }
}

impl fmt::Display for TextureRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.param_name())
    }
}

/// Texture file stems per role; `None` when the material has no such texture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TextureSlots {
    pub diffuse: Option<String>,
    pub diffuse2: Option<String>,
    pub bumpmap: Option<String>,
    pub bumpmap2: Option<String>,
    pub lightmap: Option<String>,
}

impl TextureSlots {
    pub fn resolve(material: &Material) -> Self {
        let stem = |role: TextureRole| {
            material
                .param_value(role.param_name())
                .map(|path| file_stem(path).to_string())
        };
        TextureSlots {
            diffuse: stem(TextureRole::Diffuse),
            diffuse2: stem(TextureRole::Diffuse2),
            bumpmap: stem(TextureRole::Bumpmap),
            bumpmap2: stem(TextureRole::Bumpmap2),
            lightmap: stem(TextureRole::Lightmap),
        }
    }

    pub fn get(&self, role: TextureRole) -> Option<&str> {
        let slot = match role {
            TextureRole::Diffuse => &self.diffuse,
            TextureRole::Diffuse2 => &self.diffuse2,
            TextureRole::Bumpmap => &self.bumpmap,
            TextureRole::Bumpmap2 => &self.bumpmap2,
            TextureRole::Lightmap => &self.lightmap,
        };
        slot.as_deref()
    }

    /// Fixed-width summary of which roles are filled, e.g. `[D1  D2    ]`.
    pub fn config_string(&self) -> String {
        let mut out = String::from("[");
        for role in TextureRole::ALL {
            let marker = role.marker();
            if self.get(role).is_some() {
                out.push_str(marker);
            } else {
                out.extend(std::iter::repeat_n(' ', marker.len()));
            }
        }
        out.push(']');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, value: &str) -> MaterialParameter {
        MaterialParameter {
            name: name.to_string(),
            value: value.to_string(),
            ..Default::default()
        }
    }

    fn material(param_start: u32, param_count: u32) -> Material {
        Material {
            param_start,
            param_count,
            ..Default::default()
        }
    }

    #[test]
    fn later_duplicates_win() {
        let params = vec![
            param("g_Diffuse", "a.tga"),
            param("g_Bumpmap", "b.tga"),
            param("g_Diffuse", "c.tga"),
            param("g_Lightmap", "outside.tga"),
        ];
        let mut materials = vec![material(0, 3)];
        bind_parameters(&mut materials, &params).unwrap();

        let bound = &materials[0].params;
        assert_eq!(bound.len(), 2);
        assert_eq!(materials[0].param_value("g_Diffuse"), Some("c.tga"));
        assert!(!bound.contains_key("g_Lightmap"));
    }

    #[test]
    fn slice_past_end_is_an_error() {
        let params = vec![param("a", "")];
        let mut materials = vec![material(0, 1), material(1, 1)];
        assert_eq!(
            bind_parameters(&mut materials, &params),
            Err(MaterialError::ParameterRangeOutOfBounds {
                material: 1,
                start: 1,
                count: 1,
                available: 1
            })
        );
        let mut overflowing = vec![material(u32::MAX, u32::MAX)];
        assert!(bind_parameters(&mut overflowing, &params).is_err());
    }

    #[test]
    fn texture_slots_use_stems() {
        let params = vec![
            param("g_Diffuse", "N:\\FRPG\\data\\Model\\map\\tex\\m10_wall_01.tga"),
            param("g_Lightmap", "tex/m10_lit.dds"),
        ];
        let mut materials = vec![material(0, 2)];
        bind_parameters(&mut materials, &params).unwrap();

        let slots = TextureSlots::resolve(&materials[0]);
        assert_eq!(slots.get(TextureRole::Diffuse), Some("m10_wall_01"));
        assert_eq!(slots.lightmap.as_deref(), Some("m10_lit"));
        assert_eq!(slots.bumpmap, None);
        assert_eq!(slots.config_string(), "[D1      L]");
    }

    #[test]
    fn config_string_layout() {
        assert_eq!(TextureSlots::default().config_string(), "[         ]");
        let only_diffuse = TextureSlots {
            diffuse: Some("x".into()),
            ..Default::default()
        };
        assert_eq!(only_diffuse.config_string(), "[D1       ]");
        let all = TextureSlots {
            diffuse: Some("a".into()),
            diffuse2: Some("b".into()),
            bumpmap: Some("c".into()),
            bumpmap2: Some("d".into()),
            lightmap: Some("e".into()),
        };
        assert_eq!(all.config_string(), "[D1B1D2B2L]");
    }
}
