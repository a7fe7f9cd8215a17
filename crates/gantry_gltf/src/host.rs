//! The host collaborator surface.
//!
//! The importer never talks to a rendering engine directly. Everything it
//! builds (textures, materials, geometry, nodes, animation clips) goes
//! through [`SceneHost`], a trait the embedding engine implements with its
//! own object model behind lightweight handles. The data carriers in this
//! module are the complete vocabulary crossing that boundary.
//!
//! [`record::RecordingHost`] is an in-memory implementation primarily
//! intended for unit tests.

pub mod record;

use glam::{Mat4, Quat, Vec3};
use thiserror::Error;

/// An error reported by the host while creating or attaching an object.
/// Hosts wrap their own failure details in a message; the importer treats
/// any host error on an optional entity as a soft failure.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Local translation/rotation/scale of a scene node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Axis-aligned bounding box, used for the auto-scale pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn union(self, other: Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Longest edge of the box.
    pub fn max_extent(&self) -> f32 {
        let size = self.max - self.min;
        size.x.max(size.y).max(size.z)
    }
}

/// Texture coordinate wrapping, mapped from the glTF sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapMode {
    ClampToEdge,
    #[default]
    Repeat,
    MirroredRepeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplerSettings {
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
}

/// A decoded image ready for host upload, always RGBA8.
///
/// `flipped` is the decode backend's orientation report: `true` means rows
/// are ordered opposite to what samplers expect, and consumers must either
/// flip texture coordinates at sampling time or bake a pixel flip with
/// [`flip_vertical`](DecodedImage::flip_vertical).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba8: Vec<u8>,
    pub flipped: bool,
}

impl DecodedImage {
    /// Reverses the row order in place and clears the orientation flag.
    /// Used once when the destination is a permanent serialized asset.
    pub fn flip_vertical(&mut self) {
        let row = self.width as usize * 4;
        if row == 0 {
            self.flipped = false;
            return;
        }
        let rows: Vec<&[u8]> = self.rgba8.chunks_exact(row).rev().collect();
        self.rgba8 = rows.concat();
        self.flipped = false;
    }
}

/// Triangle indices at the width chosen by the mesh builder: 16-bit for
/// vertex counts up to 65535, 32-bit above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indices {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Indices {
    pub fn len(&self) -> usize {
        match self {
            Indices::U16(v) => v.len(),
            Indices::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        let u16_iter = match self {
            Indices::U16(v) => Some(v.iter().map(|i| u32::from(*i))),
            Indices::U32(_) => None,
        };
        let u32_iter = match self {
            Indices::U16(_) => None,
            Indices::U32(v) => Some(v.iter().copied()),
        };
        u16_iter.into_iter().flatten().chain(u32_iter.into_iter().flatten())
    }
}

pub const MAX_UV_SETS: usize = 4;

/// Raw vertex and index arrays for one primitive, already in host
/// coordinate conventions, with bone weights renormalized.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub tangents: Option<Vec<[f32; 4]>>,
    pub uvs: [Option<Vec<[f32; 2]>>; MAX_UV_SETS],
    pub colors: Option<Vec<[f32; 4]>>,
    pub joints: Option<Vec<[u16; 4]>>,
    pub weights: Option<Vec<[f32; 4]>>,
    pub indices: Indices,
}

impl GeometryData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// One named blend-shape frame: per-vertex deltas against the base
/// geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendFrame {
    pub name: String,
    pub position_deltas: Vec<[f32; 3]>,
    pub normal_deltas: Option<Vec<[f32; 3]>>,
}

/// Joints and bind poses for one skin attachment. Slices are parallel:
/// `joints[i]` pairs with `inverse_bind_matrices[i]`.
pub struct SkinBinding<'a, N> {
    pub joints: &'a [N],
    pub inverse_bind_matrices: &'a [Mat4],
}

/// How animation clips will be consumed, which decides what the host may
/// assume about them (a persistent serialized asset cannot carry
/// runtime-only curve shortcuts, and texture orientation must be baked).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipFlavor {
    PersistentAsset,
    #[default]
    RuntimeOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveProperty {
    Translation,
    Rotation,
    Scale,
    BlendWeights,
}

/// One keyframe of one scalar component curve. Tangents follow the source
/// interpolation: supplied for cubic-spline input, secant slopes for
/// linear, infinite for step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
    pub in_tangent: f32,
    pub out_tangent: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentCurve {
    pub keys: Vec<Keyframe>,
}

/// Curves for one animated property of one node, addressed by its
/// slash-joined path from the imported root.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveData {
    pub node_path: String,
    pub property: CurveProperty,
    pub components: Vec<ComponentCurve>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClipData {
    pub name: String,
    pub duration: f32,
    pub flavor: ClipFlavor,
    pub curves: Vec<CurveData>,
}

/// Fixed enumeration of shader variants the material builder selects from:
/// {opaque, mask, blend} × {metallic-roughness, specular-glossiness,
/// unlit}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderVariant {
    Metallic,
    MetallicMask,
    MetallicBlend,
    Specular,
    SpecularMask,
    SpecularBlend,
    Unlit,
    UnlitMask,
    UnlitBlend,
}

impl ShaderVariant {
    pub fn shader_name(self) -> &'static str {
        match self {
            ShaderVariant::Metallic => "gantry/Standard (Metallic)",
            ShaderVariant::MetallicMask => "gantry/Standard Mask (Metallic)",
            ShaderVariant::MetallicBlend => "gantry/Standard Blend (Metallic)",
            ShaderVariant::Specular => "gantry/Standard (Specular)",
            ShaderVariant::SpecularMask => "gantry/Standard Mask (Specular)",
            ShaderVariant::SpecularBlend => "gantry/Standard Blend (Specular)",
            ShaderVariant::Unlit => "gantry/Unlit",
            ShaderVariant::UnlitMask => "gantry/Unlit Mask",
            ShaderVariant::UnlitBlend => "gantry/Unlit Blend",
        }
    }
}

/// UV transform from `KHR_texture_transform`, applied by the host at
/// sampling time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexCoordTransform {
    pub offset: [f32; 2],
    pub rotation: f32,
    pub scale: [f32; 2],
}

/// A material's reference to an already-created host texture.
///
/// `flip_v` carries the decoder orientation report forward: the host
/// corrects it with a texture-coordinate flip, never a pixel re-encode.
pub struct TextureBinding<'a, T> {
    pub texture: &'a T,
    pub uv_set: usize,
    pub flip_v: bool,
    pub transform: Option<TexCoordTransform>,
}

/// Everything the host needs to create one material.
pub struct MaterialSpec<'a, T> {
    pub name: &'a str,
    pub shader: ShaderVariant,
    pub double_sided: bool,
    /// Present only for mask-mode materials.
    pub alpha_cutoff: Option<f32>,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub specular: [f32; 3],
    pub glossiness: f32,
    pub emissive: [f32; 3],
    pub base_color_texture: Option<TextureBinding<'a, T>>,
    pub metallic_roughness_texture: Option<TextureBinding<'a, T>>,
    pub specular_glossiness_texture: Option<TextureBinding<'a, T>>,
    pub normal_texture: Option<TextureBinding<'a, T>>,
    pub normal_scale: f32,
    pub occlusion_texture: Option<TextureBinding<'a, T>>,
    pub occlusion_strength: f32,
    pub emissive_texture: Option<TextureBinding<'a, T>>,
}

/// The engine-side object model, behind handles.
///
/// Handles are cheap identifiers; the host owns the real resources. The
/// importer releases every handle it still holds, via the `release_*`
/// methods and [`destroy_node`](SceneHost::destroy_node) on the root, when
/// an import is aborted or fails, and hands everything over untouched on
/// success.
///
/// The per-node render contract is one geometry plus one material:
/// [`attach_primitive`](SceneHost::attach_primitive) is called at most once
/// per node, and multi-primitive meshes get sibling nodes.
pub trait SceneHost {
    type Texture;
    type Material;
    type Geometry;
    type Node: Clone;
    type Clip;

    fn create_texture(
        &mut self,
        name: &str,
        image: &DecodedImage,
        sampler: &SamplerSettings,
    ) -> Result<Self::Texture, HostError>;
    fn release_texture(&mut self, texture: Self::Texture);

    fn create_material(
        &mut self,
        spec: &MaterialSpec<'_, Self::Texture>,
    ) -> Result<Self::Material, HostError>;
    fn release_material(&mut self, material: Self::Material);

    fn create_geometry(&mut self, name: &str, data: &GeometryData)
    -> Result<Self::Geometry, HostError>;
    fn add_blend_frame(
        &mut self,
        geometry: &mut Self::Geometry,
        frame: &BlendFrame,
    ) -> Result<(), HostError>;
    fn release_geometry(&mut self, geometry: Self::Geometry);

    fn create_node(
        &mut self,
        name: &str,
        parent: Option<&Self::Node>,
        transform: &Transform,
    ) -> Result<Self::Node, HostError>;
    fn attach_primitive(
        &mut self,
        node: &Self::Node,
        geometry: &Self::Geometry,
        material: Option<&Self::Material>,
    ) -> Result<(), HostError>;
    fn attach_skin(
        &mut self,
        node: &Self::Node,
        binding: &SkinBinding<'_, Self::Node>,
    ) -> Result<(), HostError>;
    /// Marks a node's renderer as blend-shape capable and applies the
    /// model's declared default weights as its static pose.
    fn attach_morph_state(
        &mut self,
        node: &Self::Node,
        default_weights: &[f32],
    ) -> Result<(), HostError>;

    fn create_clip(&mut self, clip: &ClipData) -> Result<Self::Clip, HostError>;
    fn release_clip(&mut self, clip: Self::Clip);

    fn set_visible(&mut self, node: &Self::Node, visible: bool);
    fn set_uniform_scale(&mut self, node: &Self::Node, scale: f32);
    /// Union of renderer bounds in the subtree rooted at `node`, if any
    /// renderers exist.
    fn render_bounds(&self, node: &Self::Node) -> Option<Aabb>;
    /// Destroys the node and its whole subtree.
    fn destroy_node(&mut self, node: &Self::Node);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_vertical_reverses_rows_once() {
        let mut image = DecodedImage {
            width: 1,
            height: 3,
            rgba8: vec![
                1, 1, 1, 1, //
                2, 2, 2, 2, //
                3, 3, 3, 3,
            ],
            flipped: true,
        };
        image.flip_vertical();
        assert!(!image.flipped);
        assert_eq!(image.rgba8, [3, 3, 3, 3, 2, 2, 2, 2, 1, 1, 1, 1]);
    }

    #[test]
    fn indices_iterate_uniformly_as_u32() {
        assert_eq!(
            Indices::U16(vec![0, 1, 2]).iter().collect::<Vec<_>>(),
            Indices::U32(vec![0, 1, 2]).iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn aabb_union_and_extent() {
        let a = Aabb {
            min: Vec3::new(-1.0, 0.0, 0.0),
            max: Vec3::new(1.0, 1.0, 1.0),
        };
        let b = Aabb {
            min: Vec3::new(0.0, -2.0, 0.0),
            max: Vec3::new(0.5, 0.5, 3.0),
        };
        let joined = a.union(b);
        assert_eq!(joined.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(joined.max, Vec3::new(1.0, 1.0, 3.0));
        assert_eq!(joined.max_extent(), 3.0);
    }
}
