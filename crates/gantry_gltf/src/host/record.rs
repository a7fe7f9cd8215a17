//! An in-memory [`SceneHost`] that records every call, primarily intended
//! for unit tests. Handles are indices into the recording vectors.

use glam::Vec3;

use super::{
    Aabb, BlendFrame, ClipData, CurveProperty, DecodedImage, GeometryData, HostError, Indices,
    MaterialSpec, SamplerSettings, SceneHost, SkinBinding, Transform,
};

#[derive(Debug, Clone)]
pub struct RecordedTexture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub flipped: bool,
    pub sampler: SamplerSettings,
}

#[derive(Debug, Clone)]
pub struct RecordedMaterial {
    pub name: String,
    pub shader: &'static str,
    pub base_color: [f32; 4],
    pub has_base_color_texture: bool,
    pub base_color_flip_v: Option<bool>,
    pub double_sided: bool,
    pub alpha_cutoff: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct RecordedGeometry {
    pub name: String,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub wide_indices: bool,
    pub weights: Option<Vec<[f32; 4]>>,
    pub blend_frames: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RecordedNode {
    pub name: String,
    pub parent: Option<usize>,
    pub transform: Transform,
    pub visible: bool,
    pub uniform_scale: Option<f32>,
    pub primitive: Option<(usize, Option<usize>)>,
    pub skin_joint_count: Option<usize>,
    pub morph_weights: Option<Vec<f32>>,
    pub destroyed: bool,
}

#[derive(Debug, Clone)]
pub struct RecordedClip {
    pub name: String,
    pub duration: f32,
    pub curves: Vec<(String, CurveProperty)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Released {
    pub textures: usize,
    pub materials: usize,
    pub geometries: usize,
    pub clips: usize,
}

/// Records the imported object graph instead of uploading it anywhere.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub textures: Vec<RecordedTexture>,
    pub materials: Vec<RecordedMaterial>,
    pub geometries: Vec<RecordedGeometry>,
    pub nodes: Vec<RecordedNode>,
    pub clips: Vec<RecordedClip>,
    pub released: Released,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn children_of(&self, parent: usize) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].parent == Some(parent))
            .collect()
    }

    /// Live (not destroyed) nodes.
    pub fn live_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| !n.destroyed).count()
    }

    fn subtree(&self, root: usize) -> Vec<usize> {
        let mut out = vec![root];
        let mut walk = 0;
        while walk < out.len() {
            let parent = out[walk];
            walk += 1;
            out.extend(self.children_of(parent));
        }
        out
    }
}

impl SceneHost for RecordingHost {
    type Texture = usize;
    type Material = usize;
    type Geometry = usize;
    type Node = usize;
    type Clip = usize;

    fn create_texture(
        &mut self,
        name: &str,
        image: &DecodedImage,
        sampler: &SamplerSettings,
    ) -> Result<usize, HostError> {
        self.textures.push(RecordedTexture {
            name: name.to_string(),
            width: image.width,
            height: image.height,
            flipped: image.flipped,
            sampler: *sampler,
        });
        Ok(self.textures.len() - 1)
    }

    fn release_texture(&mut self, _texture: usize) {
        self.released.textures += 1;
    }

    fn create_material(&mut self, spec: &MaterialSpec<'_, usize>) -> Result<usize, HostError> {
        self.materials.push(RecordedMaterial {
            name: spec.name.to_string(),
            shader: spec.shader.shader_name(),
            base_color: spec.base_color,
            has_base_color_texture: spec.base_color_texture.is_some(),
            base_color_flip_v: spec.base_color_texture.as_ref().map(|b| b.flip_v),
            double_sided: spec.double_sided,
            alpha_cutoff: spec.alpha_cutoff,
        });
        Ok(self.materials.len() - 1)
    }

    fn release_material(&mut self, _material: usize) {
        self.released.materials += 1;
    }

    fn create_geometry(&mut self, name: &str, data: &GeometryData) -> Result<usize, HostError> {
        self.geometries.push(RecordedGeometry {
            name: name.to_string(),
            vertex_count: data.vertex_count(),
            triangle_count: data.triangle_count(),
            wide_indices: matches!(data.indices, Indices::U32(_)),
            weights: data.weights.clone(),
            blend_frames: Vec::new(),
        });
        Ok(self.geometries.len() - 1)
    }

    fn add_blend_frame(
        &mut self,
        geometry: &mut usize,
        frame: &BlendFrame,
    ) -> Result<(), HostError> {
        self.geometries[*geometry].blend_frames.push(frame.name.clone());
        Ok(())
    }

    fn release_geometry(&mut self, _geometry: usize) {
        self.released.geometries += 1;
    }

    fn create_node(
        &mut self,
        name: &str,
        parent: Option<&usize>,
        transform: &Transform,
    ) -> Result<usize, HostError> {
        self.nodes.push(RecordedNode {
            name: name.to_string(),
            parent: parent.copied(),
            transform: *transform,
            visible: true,
            uniform_scale: None,
            primitive: None,
            skin_joint_count: None,
            morph_weights: None,
            destroyed: false,
        });
        Ok(self.nodes.len() - 1)
    }

    fn attach_primitive(
        &mut self,
        node: &usize,
        geometry: &usize,
        material: Option<&usize>,
    ) -> Result<(), HostError> {
        let node = &mut self.nodes[*node];
        if node.primitive.is_some() {
            return Err(HostError::new("node already has a renderer"));
        }
        node.primitive = Some((*geometry, material.copied()));
        Ok(())
    }

    fn attach_skin(
        &mut self,
        node: &usize,
        binding: &SkinBinding<'_, usize>,
    ) -> Result<(), HostError> {
        self.nodes[*node].skin_joint_count = Some(binding.joints.len());
        Ok(())
    }

    fn attach_morph_state(
        &mut self,
        node: &usize,
        default_weights: &[f32],
    ) -> Result<(), HostError> {
        self.nodes[*node].morph_weights = Some(default_weights.to_vec());
        Ok(())
    }

    fn create_clip(&mut self, clip: &ClipData) -> Result<usize, HostError> {
        self.clips.push(RecordedClip {
            name: clip.name.clone(),
            duration: clip.duration,
            curves: clip
                .curves
                .iter()
                .map(|c| (c.node_path.clone(), c.property))
                .collect(),
        });
        Ok(self.clips.len() - 1)
    }

    fn release_clip(&mut self, _clip: usize) {
        self.released.clips += 1;
    }

    fn set_visible(&mut self, node: &usize, visible: bool) {
        self.nodes[*node].visible = visible;
    }

    fn set_uniform_scale(&mut self, node: &usize, scale: f32) {
        self.nodes[*node].uniform_scale = Some(scale);
    }

    fn render_bounds(&self, node: &usize) -> Option<Aabb> {
        // Every renderer contributes a unit box centered at the origin.
        self.subtree(*node)
            .iter()
            .any(|&i| self.nodes[i].primitive.is_some())
            .then_some(Aabb {
                min: Vec3::splat(-0.5),
                max: Vec3::splat(0.5),
            })
    }

    fn destroy_node(&mut self, node: &usize) {
        for index in self.subtree(*node) {
            self.nodes[index].destroyed = true;
        }
    }
}
