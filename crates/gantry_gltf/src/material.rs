//! Material assembly.
//!
//! Each document material picks a shader variant from the fixed
//! {alpha mode} × {shading model} matrix, binds already-decoded textures
//! (carrying the orientation flag forward as a UV flip), and receives a
//! generated, de-duplicated, filesystem-safe name.

use std::collections::HashSet;

use thiserror::Error;
use tracing::warn;

use crate::cache::{ImportedTexture, Slot};
use crate::document::extensions::{
    ExtensionData, KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS, KHR_MATERIALS_UNLIT,
    KHR_TEXTURE_TRANSFORM, SpecularGlossiness,
};
use crate::document::{AlphaMode, Material, TextureInfo};
use crate::host::{MaterialSpec, ShaderVariant, TexCoordTransform, TextureBinding};

#[derive(Error, Debug)]
pub enum MaterialError {
    #[error("material references texture {index}, which does not exist")]
    TextureOutOfRange { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadingModel {
    MetallicRoughness,
    SpecularGlossiness,
    Unlit,
}

/// The shading model a material asks for, by extension probe. Unlit wins
/// over specular-glossiness when both are declared.
pub fn shading_model(material: &Material) -> ShadingModel {
    if material.extensions.contains(KHR_MATERIALS_UNLIT) {
        ShadingModel::Unlit
    } else if material
        .extensions
        .contains(KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS)
    {
        ShadingModel::SpecularGlossiness
    } else {
        ShadingModel::MetallicRoughness
    }
}

/// The policy matrix: {opaque, mask, blend} × {metallic, specular, unlit}.
pub fn shader_variant(alpha: AlphaMode, shading: ShadingModel) -> ShaderVariant {
    match (shading, alpha) {
        (ShadingModel::MetallicRoughness, AlphaMode::Opaque) => ShaderVariant::Metallic,
        (ShadingModel::MetallicRoughness, AlphaMode::Mask) => ShaderVariant::MetallicMask,
        (ShadingModel::MetallicRoughness, AlphaMode::Blend) => ShaderVariant::MetallicBlend,
        (ShadingModel::SpecularGlossiness, AlphaMode::Opaque) => ShaderVariant::Specular,
        (ShadingModel::SpecularGlossiness, AlphaMode::Mask) => ShaderVariant::SpecularMask,
        (ShadingModel::SpecularGlossiness, AlphaMode::Blend) => ShaderVariant::SpecularBlend,
        (ShadingModel::Unlit, AlphaMode::Opaque) => ShaderVariant::Unlit,
        (ShadingModel::Unlit, AlphaMode::Mask) => ShaderVariant::UnlitMask,
        (ShadingModel::Unlit, AlphaMode::Blend) => ShaderVariant::UnlitBlend,
    }
}

/// Strips characters that cannot appear in asset file names.
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_control() || "/\\?%*:|\"<>".contains(c) {
                '_'
            } else {
                c
            }
        })
        .collect();
    let trimmed = cleaned.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        "Material".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Hands out unique names by suffixing duplicates.
#[derive(Debug, Default)]
pub struct NameDeduper {
    used: HashSet<String>,
}

impl NameDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique(&mut self, base: &str) -> String {
        if self.used.insert(base.to_string()) {
            return base.to_string();
        }
        let mut counter = 1;
        loop {
            let candidate = format!("{base} ({counter})");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

fn transform_of(info: &TextureInfo) -> Option<TexCoordTransform> {
    match info.extensions.get(KHR_TEXTURE_TRANSFORM) {
        Some(ExtensionData::TextureTransform(t)) => Some(TexCoordTransform {
            offset: t.offset,
            rotation: t.rotation,
            scale: t.scale,
        }),
        _ => None,
    }
}

fn uv_set_of(info: &TextureInfo) -> usize {
    match info.extensions.get(KHR_TEXTURE_TRANSFORM) {
        Some(ExtensionData::TextureTransform(t)) => t.tex_coord.unwrap_or(info.tex_coord),
        _ => info.tex_coord,
    }
}

fn bind<'a, T>(
    info: Option<&'a TextureInfo>,
    textures: &'a [Slot<ImportedTexture<T>>],
    material_name: &str,
) -> Result<Option<TextureBinding<'a, T>>, MaterialError> {
    let Some(info) = info else {
        return Ok(None);
    };
    let slot = textures
        .get(info.index)
        .ok_or(MaterialError::TextureOutOfRange { index: info.index })?;
    let Some(imported) = slot.ready() else {
        // The texture soft-failed earlier; the material renders untextured.
        warn!("material '{material_name}' refers to texture {} which failed to load", info.index);
        return Ok(None);
    };
    Ok(Some(TextureBinding {
        texture: &imported.texture,
        uv_set: uv_set_of(info),
        flip_v: imported.flipped,
        transform: transform_of(info),
    }))
}

/// Builds the host-facing spec for one material. The name must already be
/// sanitized and de-duplicated by the caller.
pub fn build_material<'a, T>(
    material: &'a Material,
    name: &'a str,
    textures: &'a [Slot<ImportedTexture<T>>],
) -> Result<MaterialSpec<'a, T>, MaterialError> {
    let shading = shading_model(material);
    let shader = shader_variant(material.alpha_mode, shading);

    let pbr = material.pbr_metallic_roughness.as_ref();
    let specgloss = match material.extensions.get(KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS) {
        Some(ExtensionData::SpecularGlossiness(ext)) => Some(ext),
        _ => None,
    };

    let mut spec = MaterialSpec {
        name,
        shader,
        double_sided: material.double_sided,
        alpha_cutoff: (material.alpha_mode == AlphaMode::Mask).then_some(material.alpha_cutoff),
        base_color: pbr.map_or([1.0; 4], |p| p.base_color_factor),
        metallic: pbr.map_or(1.0, |p| p.metallic_factor),
        roughness: pbr.map_or(1.0, |p| p.roughness_factor),
        specular: [1.0; 3],
        glossiness: 1.0,
        emissive: material.emissive_factor,
        base_color_texture: bind(
            pbr.and_then(|p| p.base_color_texture.as_ref()),
            textures,
            name,
        )?,
        metallic_roughness_texture: bind(
            pbr.and_then(|p| p.metallic_roughness_texture.as_ref()),
            textures,
            name,
        )?,
        specular_glossiness_texture: None,
        normal_texture: bind(
            material.normal_texture.as_ref().map(|n| &n.info),
            textures,
            name,
        )?,
        normal_scale: material.normal_texture.as_ref().map_or(1.0, |n| n.scale),
        occlusion_texture: bind(
            material.occlusion_texture.as_ref().map(|o| &o.info),
            textures,
            name,
        )?,
        occlusion_strength: material.occlusion_texture.as_ref().map_or(1.0, |o| o.strength),
        emissive_texture: bind(material.emissive_texture.as_ref(), textures, name)?,
    };

    if let Some(ext) = specgloss {
        apply_specular_glossiness(&mut spec, ext, textures, name)?;
    }
    Ok(spec)
}

fn apply_specular_glossiness<'a, T>(
    spec: &mut MaterialSpec<'a, T>,
    ext: &'a SpecularGlossiness,
    textures: &'a [Slot<ImportedTexture<T>>],
    name: &str,
) -> Result<(), MaterialError> {
    spec.base_color = ext.diffuse_factor;
    spec.specular = ext.specular_factor;
    spec.glossiness = ext.glossiness_factor;
    if let Some(binding) = bind(ext.diffuse_texture.as_ref(), textures, name)? {
        spec.base_color_texture = Some(binding);
    }
    spec.specular_glossiness_texture =
        bind(ext.specular_glossiness_texture.as_ref(), textures, name)?;
    Ok(())
}
