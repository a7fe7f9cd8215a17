//! The parsed glTF document graph.
//!
//! A thin typed mirror of the glTF 2.0 JSON schema, restricted to what the
//! import pipeline consumes. Cross-references are integer indices into the
//! document's own arrays; the stage that dereferences an index is the one
//! that fails when it is out of range. The underlying JSON library error is
//! wrapped in [`DocumentError`] so callers never depend on it.

pub mod extensions;

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::accessor::{ComponentType, ElementType};
use extensions::{ExtensionMap, ExtensionRegistry};

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("malformed glTF JSON: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("document has no default scene")]
    MissingScene,
    #[error("{what} index {index} out of range (length {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    #[error("accessor {accessor} reads past the end of its buffer view")]
    AccessorOutOfBounds { accessor: usize },
    #[error("accessor {accessor} is not {expected}")]
    AccessorShape {
        accessor: usize,
        expected: &'static str,
    },
    #[error("buffer {index} is not loaded")]
    BufferUnavailable { index: usize },
    #[error("extension {name}: {source}")]
    Extension {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Range-checked index lookup into one of the document arrays.
pub fn get<'a, T>(items: &'a [T], index: usize, what: &'static str) -> Result<&'a T, DocumentError> {
    items.get(index).ok_or(DocumentError::IndexOutOfRange {
        what,
        index,
        len: items.len(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub asset: Asset,
    pub scene: Option<usize>,
    pub scenes: Vec<Scene>,
    pub nodes: Vec<Node>,
    pub buffers: Vec<Buffer>,
    pub buffer_views: Vec<BufferView>,
    pub accessors: Vec<Accessor>,
    pub images: Vec<Image>,
    pub samplers: Vec<Sampler>,
    pub textures: Vec<Texture>,
    pub materials: Vec<Material>,
    pub meshes: Vec<Mesh>,
    pub skins: Vec<Skin>,
    pub animations: Vec<Animation>,
    pub extensions_used: Vec<String>,
    pub extensions_required: Vec<String>,
}

impl Document {
    /// Parses JSON bytes and resolves extension payloads through the
    /// registry. Unregistered extension names are preserved opaquely.
    pub fn parse(json: &[u8], registry: &ExtensionRegistry) -> Result<Self, DocumentError> {
        let mut document: Document = serde_json::from_slice(json).map_err(DocumentError::Parse)?;
        if document.scenes.is_empty() {
            return Err(DocumentError::MissingScene);
        }
        document.resolve_extensions(registry)?;
        Ok(document)
    }

    /// The default scene. An absent `scene` field falls back to scene 0;
    /// an out-of-range index is a structural error.
    pub fn default_scene(&self) -> Result<&Scene, DocumentError> {
        let index = self.scene.unwrap_or(0);
        get(&self.scenes, index, "scene").map_err(|_| DocumentError::MissingScene)
    }

    fn resolve_extensions(&mut self, registry: &ExtensionRegistry) -> Result<(), DocumentError> {
        for texture in &mut self.textures {
            texture.extensions.resolve(registry)?;
        }
        for material in &mut self.materials {
            material.extensions.resolve(registry)?;
            if let Some(pbr) = &mut material.pbr_metallic_roughness {
                for info in [&mut pbr.base_color_texture, &mut pbr.metallic_roughness_texture] {
                    if let Some(info) = info {
                        info.extensions.resolve(registry)?;
                    }
                }
            }
            if let Some(info) = &mut material.normal_texture {
                info.info.extensions.resolve(registry)?;
            }
            if let Some(info) = &mut material.occlusion_texture {
                info.info.extensions.resolve(registry)?;
            }
            if let Some(info) = &mut material.emissive_texture {
                info.extensions.resolve(registry)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Asset {
    pub version: String,
    pub generator: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Scene {
    pub name: Option<String>,
    pub nodes: Vec<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Node {
    pub name: Option<String>,
    pub children: Vec<usize>,
    pub mesh: Option<usize>,
    pub skin: Option<usize>,
    pub translation: Option<[f32; 3]>,
    pub rotation: Option<[f32; 4]>,
    pub scale: Option<[f32; 3]>,
    pub matrix: Option<[f32; 16]>,
    pub weights: Vec<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Buffer {
    pub uri: Option<String>,
    pub byte_length: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferView {
    pub buffer: usize,
    #[serde(default)]
    pub byte_offset: usize,
    pub byte_length: usize,
    pub byte_stride: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessor {
    pub buffer_view: Option<usize>,
    #[serde(default)]
    pub byte_offset: usize,
    pub component_type: ComponentType,
    #[serde(default)]
    pub normalized: bool,
    pub count: usize,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub sparse: Option<Sparse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sparse {
    pub count: usize,
    pub indices: SparseIndices,
    pub values: SparseValues,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparseIndices {
    pub buffer_view: usize,
    #[serde(default)]
    pub byte_offset: usize,
    pub component_type: ComponentType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparseValues {
    pub buffer_view: usize,
    #[serde(default)]
    pub byte_offset: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Image {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub mime_type: Option<String>,
    pub buffer_view: Option<usize>,
}

/// glTF sampler filter/wrap constants.
pub mod sampler_values {
    pub const NEAREST: u32 = 9728;
    pub const LINEAR: u32 = 9729;
    pub const NEAREST_MIPMAP_NEAREST: u32 = 9984;
    pub const LINEAR_MIPMAP_NEAREST: u32 = 9985;
    pub const NEAREST_MIPMAP_LINEAR: u32 = 9986;
    pub const LINEAR_MIPMAP_LINEAR: u32 = 9987;
    pub const CLAMP_TO_EDGE: u32 = 33071;
    pub const MIRRORED_REPEAT: u32 = 33648;
    pub const REPEAT: u32 = 10497;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sampler {
    pub mag_filter: Option<u32>,
    pub min_filter: Option<u32>,
    #[serde(default = "default_wrap")]
    pub wrap_s: u32,
    #[serde(default = "default_wrap")]
    pub wrap_t: u32,
}

fn default_wrap() -> u32 {
    sampler_values::REPEAT
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Texture {
    pub name: Option<String>,
    pub sampler: Option<usize>,
    pub source: Option<usize>,
    pub extensions: ExtensionMap,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextureInfo {
    pub index: usize,
    pub tex_coord: usize,
    pub extensions: ExtensionMap,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalTextureInfo {
    #[serde(flatten)]
    pub info: TextureInfo,
    #[serde(default = "one")]
    pub scale: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcclusionTextureInfo {
    #[serde(flatten)]
    pub info: TextureInfo,
    #[serde(default = "one")]
    pub strength: f32,
}

fn one() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum AlphaMode {
    #[default]
    #[serde(rename = "OPAQUE")]
    Opaque,
    #[serde(rename = "MASK")]
    Mask,
    #[serde(rename = "BLEND")]
    Blend,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Material {
    pub name: Option<String>,
    pub pbr_metallic_roughness: Option<PbrMetallicRoughness>,
    pub normal_texture: Option<NormalTextureInfo>,
    pub occlusion_texture: Option<OcclusionTextureInfo>,
    pub emissive_texture: Option<TextureInfo>,
    pub emissive_factor: [f32; 3],
    pub alpha_mode: AlphaMode,
    #[serde(default = "default_alpha_cutoff")]
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub extensions: ExtensionMap,
}

fn default_alpha_cutoff() -> f32 {
    0.5
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PbrMetallicRoughness {
    #[serde(default = "default_base_color")]
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<TextureInfo>,
    #[serde(default = "one")]
    pub metallic_factor: f32,
    #[serde(default = "one")]
    pub roughness_factor: f32,
    pub metallic_roughness_texture: Option<TextureInfo>,
}

fn default_base_color() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

impl Default for PbrMetallicRoughness {
    fn default() -> Self {
        Self {
            base_color_factor: default_base_color(),
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
    pub weights: Vec<f32>,
    pub extras: Option<serde_json::Value>,
}

impl Mesh {
    /// Morph target names from `extras.targetNames`, the de-facto
    /// convention exporters use.
    pub fn target_names(&self) -> Option<Vec<String>> {
        let names = self.extras.as_ref()?.get("targetNames")?.as_array()?;
        Some(
            names
                .iter()
                .enumerate()
                .map(|(i, v)| v.as_str().map(str::to_string).unwrap_or_else(|| format!("morph{i}")))
                .collect(),
        )
    }
}

/// glTF primitive topology values; only `TRIANGLES` produces geometry.
pub const MODE_TRIANGLES: u32 = 4;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Primitive {
    pub attributes: BTreeMap<String, usize>,
    pub indices: Option<usize>,
    pub material: Option<usize>,
    #[serde(default = "default_mode")]
    pub mode: u32,
    #[serde(default)]
    pub targets: Vec<BTreeMap<String, usize>>,
}

fn default_mode() -> u32 {
    MODE_TRIANGLES
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Skin {
    pub name: Option<String>,
    pub inverse_bind_matrices: Option<usize>,
    pub skeleton: Option<usize>,
    pub joints: Vec<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Animation {
    pub name: Option<String>,
    pub channels: Vec<Channel>,
    pub samplers: Vec<AnimationSampler>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub sampler: usize,
    pub target: ChannelTarget,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelTarget {
    pub node: Option<usize>,
    pub path: TargetPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPath {
    Translation,
    Rotation,
    Scale,
    Weights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Interpolation {
    #[default]
    #[serde(rename = "LINEAR")]
    Linear,
    #[serde(rename = "STEP")]
    Step,
    #[serde(rename = "CUBICSPLINE")]
    CubicSpline,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationSampler {
    pub input: usize,
    pub output: usize,
    #[serde(default)]
    pub interpolation: Interpolation,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> Vec<u8> {
        serde_json::json!({
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "name": "root" }]
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn parses_a_minimal_document() {
        let doc = Document::parse(&minimal_json(), &ExtensionRegistry::default()).unwrap();
        assert_eq!(doc.asset.version, "2.0");
        assert_eq!(doc.default_scene().unwrap().nodes, [0]);
        assert_eq!(doc.nodes[0].name.as_deref(), Some("root"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = Document::parse(b"{ not json", &ExtensionRegistry::default()).unwrap_err();
        assert!(matches!(err, DocumentError::Parse(_)));
    }

    #[test]
    fn missing_scenes_is_structural() {
        let json = serde_json::json!({ "asset": { "version": "2.0" } })
            .to_string()
            .into_bytes();
        let err = Document::parse(&json, &ExtensionRegistry::default()).unwrap_err();
        assert!(matches!(err, DocumentError::MissingScene));
    }

    #[test]
    fn absent_scene_index_falls_back_to_zero() {
        let json = serde_json::json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [] }]
        })
        .to_string()
        .into_bytes();
        let doc = Document::parse(&json, &ExtensionRegistry::default()).unwrap();
        assert!(doc.default_scene().is_ok());
    }

    #[test]
    fn material_defaults_follow_the_schema() {
        let json = serde_json::json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [] }],
            "materials": [{}]
        })
        .to_string()
        .into_bytes();
        let doc = Document::parse(&json, &ExtensionRegistry::default()).unwrap();
        let material = &doc.materials[0];
        assert_eq!(material.alpha_mode, AlphaMode::Opaque);
        assert_eq!(material.alpha_cutoff, 0.5);
        assert!(!material.double_sided);
    }

    #[test]
    fn out_of_range_lookup_names_the_array() {
        let doc = Document::parse(&minimal_json(), &ExtensionRegistry::default()).unwrap();
        let err = get(&doc.nodes, 5, "node").unwrap_err();
        assert!(matches!(
            err,
            DocumentError::IndexOutOfRange { what: "node", index: 5, len: 1 }
        ));
    }

    #[test]
    fn target_names_come_from_extras() {
        let json = serde_json::json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [] }],
            "meshes": [{
                "primitives": [],
                "extras": { "targetNames": ["smile", "frown"] }
            }]
        })
        .to_string()
        .into_bytes();
        let doc = Document::parse(&json, &ExtensionRegistry::default()).unwrap();
        assert_eq!(doc.meshes[0].target_names().unwrap(), ["smile", "frown"]);
    }
}
