//! Typed glTF extensions plus the opaque pass-through for everything else.
//!
//! Extension payloads arrive as raw JSON subtrees keyed by extension name.
//! Known names are deserialized into typed variants through a name→factory
//! registry; unregistered names are preserved as [`ExtensionData::Unknown`]
//! without interpretation, so downstream tooling can still see them.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::{DocumentError, TextureInfo};

pub const KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS: &str = "KHR_materials_pbrSpecularGlossiness";
pub const KHR_MATERIALS_UNLIT: &str = "KHR_materials_unlit";
pub const KHR_TEXTURE_BASISU: &str = "KHR_texture_basisu";
pub const KHR_TEXTURE_TRANSFORM: &str = "KHR_texture_transform";

/// `KHR_materials_pbrSpecularGlossiness` payload.
///
/// The defaults below are the spec values. The extension's published JSON
/// schema ships wrong defaults (zeroed factors, which black out any
/// material that omits them); encoding the corrected values here is the
/// one-time data correction; nothing is patched per document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecularGlossiness {
    #[serde(default = "default_diffuse")]
    pub diffuse_factor: [f32; 4],
    pub diffuse_texture: Option<TextureInfo>,
    #[serde(default = "default_specular")]
    pub specular_factor: [f32; 3],
    #[serde(default = "default_glossiness")]
    pub glossiness_factor: f32,
    pub specular_glossiness_texture: Option<TextureInfo>,
}

fn default_diffuse() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

fn default_specular() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_glossiness() -> f32 {
    1.0
}

/// `KHR_texture_basisu` payload: redirects a texture to a KTX2 image.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureBasisu {
    pub source: usize,
}

/// `KHR_texture_transform` payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureTransform {
    #[serde(default)]
    pub offset: [f32; 2],
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_scale")]
    pub scale: [f32; 2],
    pub tex_coord: Option<usize>,
}

fn default_scale() -> [f32; 2] {
    [1.0, 1.0]
}

/// A resolved extension: a typed known variant, or the raw subtree.
#[derive(Debug)]
pub enum ExtensionData {
    SpecularGlossiness(SpecularGlossiness),
    Unlit,
    TextureBasisu(TextureBasisu),
    TextureTransform(TextureTransform),
    Unknown(Value),
}

pub type ExtensionFactory = fn(Value) -> Result<ExtensionData, serde_json::Error>;

/// Name→factory registry for extension deserialization. New variants can
/// be registered at startup; unregistered names fall through to the opaque
/// pass-through.
pub struct ExtensionRegistry {
    factories: HashMap<&'static str, ExtensionFactory>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS, |value| {
            Ok(ExtensionData::SpecularGlossiness(serde_json::from_value(value)?))
        });
        registry.register(KHR_MATERIALS_UNLIT, |_| Ok(ExtensionData::Unlit));
        registry.register(KHR_TEXTURE_BASISU, |value| {
            Ok(ExtensionData::TextureBasisu(serde_json::from_value(value)?))
        });
        registry.register(KHR_TEXTURE_TRANSFORM, |value| {
            Ok(ExtensionData::TextureTransform(serde_json::from_value(value)?))
        });
        registry
    }
}

impl ExtensionRegistry {
    pub fn register(&mut self, name: &'static str, factory: ExtensionFactory) {
        self.factories.insert(name, factory);
    }

    fn deserialize(&self, name: &str, value: Value) -> Result<ExtensionData, DocumentError> {
        match self.factories.get(name) {
            Some(factory) => factory(value).map_err(|source| DocumentError::Extension {
                name: name.to_string(),
                source,
            }),
            None => Ok(ExtensionData::Unknown(value)),
        }
    }
}

/// Per-element extension storage. Deserializes as the raw name→subtree
/// map; [`resolve`](ExtensionMap::resolve) turns it into typed entries.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct ExtensionMap {
    raw: HashMap<String, Value>,
    #[serde(skip)]
    entries: HashMap<String, ExtensionData>,
}

impl ExtensionMap {
    pub(crate) fn resolve(&mut self, registry: &ExtensionRegistry) -> Result<(), DocumentError> {
        for (name, value) in self.raw.drain() {
            let data = registry.deserialize(&name, value)?;
            self.entries.insert(name, data);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionData> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.raw.is_empty()
    }
}
