//! The mutable working set of one import.
//!
//! Parallel arrays keyed by the document's own indices, populated
//! monotonically stage by stage. A slot is either unpopulated, a terminal
//! value, or an explicit failure marker; downstream stages treat a failed
//! slot as "use a default / skip this component", never as a crash. The
//! cache is exclusively owned by one import task and torn down (host
//! objects released) on abort or failure.

use fixedbitset::FixedBitSet;

use crate::document::Document;
use crate::host::SceneHost;

/// Tri-state cache slot for one optional entity.
#[derive(Debug, Default)]
pub enum Slot<T> {
    #[default]
    Empty,
    Ready(T),
    Failed,
}

impl<T> Slot<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Slot::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn ready_mut(&mut self) -> Option<&mut T> {
        match self {
            Slot::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Slot::Failed)
    }

    pub fn take(&mut self) -> Option<T> {
        match std::mem::replace(self, Slot::Empty) {
            Slot::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// A texture handle plus the orientation report from its decode backend.
#[derive(Debug)]
pub struct ImportedTexture<T> {
    pub texture: T,
    pub flipped: bool,
}

/// One built primitive: host geometry plus the document index of its
/// material (resolved against the material slots at attach time).
#[derive(Debug)]
pub struct ImportedPrimitive<G> {
    pub geometry: G,
    pub material: Option<usize>,
    pub has_morph_targets: bool,
}

pub struct ImportCache<H: SceneHost> {
    pub buffers: Vec<Slot<Vec<u8>>>,
    /// Raw fetched image payloads, keyed by image index.
    pub images: Vec<Slot<Vec<u8>>>,
    pub textures: Vec<Slot<ImportedTexture<H::Texture>>>,
    pub materials: Vec<Slot<H::Material>>,
    pub meshes: Vec<Slot<Vec<ImportedPrimitive<H::Geometry>>>>,
    pub clips: Vec<Slot<H::Clip>>,
    pub nodes: Vec<Option<H::Node>>,
    /// Document node index → host nodes carrying that node's primitives
    /// (the node itself first, then the synthesized siblings).
    pub render_nodes: Vec<Vec<H::Node>>,
    /// Mesh index → owning node indices.
    pub mesh_owners: Vec<Vec<usize>>,
    /// Skin index → owning node indices.
    pub skin_owners: Vec<Vec<usize>>,
    /// Meshes carrying morph-target data, flagged for the second pass.
    pub morphed_meshes: FixedBitSet,
    /// Slash-joined node paths from the imported root, for animation
    /// targeting.
    pub node_paths: Vec<String>,
    pub root: Option<H::Node>,
}

impl<H: SceneHost> Default for ImportCache<H> {
    fn default() -> Self {
        Self {
            buffers: Vec::new(),
            images: Vec::new(),
            textures: Vec::new(),
            materials: Vec::new(),
            meshes: Vec::new(),
            clips: Vec::new(),
            nodes: Vec::new(),
            render_nodes: Vec::new(),
            mesh_owners: Vec::new(),
            skin_owners: Vec::new(),
            morphed_meshes: FixedBitSet::new(),
            node_paths: Vec::new(),
            root: None,
        }
    }
}

impl<H: SceneHost> ImportCache<H> {
    /// Sizes every slot array to the document it will be filled from.
    pub fn for_document(document: &Document) -> Self {
        let mut cache = Self::default();
        cache.buffers.resize_with(document.buffers.len(), Slot::default);
        cache.images.resize_with(document.images.len(), Slot::default);
        cache.textures.resize_with(document.textures.len(), Slot::default);
        cache.materials.resize_with(document.materials.len(), Slot::default);
        cache.meshes.resize_with(document.meshes.len(), Slot::default);
        cache.clips.clear();
        cache.nodes.resize_with(document.nodes.len(), || None);
        cache.render_nodes.resize_with(document.nodes.len(), Vec::new);
        cache.mesh_owners.resize_with(document.meshes.len(), Vec::new);
        cache.skin_owners.resize_with(document.skins.len(), Vec::new);
        cache.morphed_meshes = FixedBitSet::with_capacity(document.meshes.len());
        cache.node_paths = vec![String::new(); document.nodes.len()];
        cache
    }

    /// Releases every host object the import still owns. Safe to call at
    /// any stage, including before anything was created; callers guarantee
    /// it runs at most once per import.
    pub fn teardown(&mut self, host: &mut H) {
        if let Some(root) = self.root.take() {
            host.destroy_node(&root);
        }
        self.nodes.clear();
        self.render_nodes.clear();
        for slot in &mut self.textures {
            if let Some(imported) = slot.take() {
                host.release_texture(imported.texture);
            }
        }
        for slot in &mut self.materials {
            if let Some(material) = slot.take() {
                host.release_material(material);
            }
        }
        for slot in &mut self.meshes {
            if let Some(primitives) = slot.take() {
                for primitive in primitives {
                    host.release_geometry(primitive.geometry);
                }
            }
        }
        for slot in &mut self.clips {
            if let Some(clip) = slot.take() {
                host.release_clip(clip);
            }
        }
        self.buffers.clear();
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::record::RecordingHost;
    use crate::host::{SceneHost as _, Transform};

    #[test]
    fn slot_lifecycle() {
        let mut slot: Slot<u32> = Slot::default();
        assert!(slot.ready().is_none());
        slot = Slot::Ready(3);
        assert_eq!(slot.ready(), Some(&3));
        assert_eq!(slot.take(), Some(3));
        assert!(matches!(slot, Slot::Empty));
        let failed: Slot<u32> = Slot::Failed;
        assert!(failed.is_failed());
        assert!(failed.ready().is_none());
    }

    #[test]
    fn teardown_releases_everything_and_destroys_the_root() {
        let mut host = RecordingHost::new();
        let root = host.create_node("root", None, &Transform::IDENTITY).unwrap();
        let child = host.create_node("child", Some(&root), &Transform::IDENTITY).unwrap();
        let _ = child;

        let mut cache: ImportCache<RecordingHost> = ImportCache::default();
        cache.root = Some(root);
        cache.textures.push(Slot::Ready(ImportedTexture {
            texture: 0,
            flipped: false,
        }));
        cache.materials.push(Slot::Ready(0));
        cache.materials.push(Slot::Failed);
        cache.meshes.push(Slot::Ready(vec![ImportedPrimitive {
            geometry: 0,
            material: Some(0),
            has_morph_targets: false,
        }]));
        cache.clips.push(Slot::Ready(0));

        cache.teardown(&mut host);
        assert_eq!(host.live_nodes(), 0);
        assert_eq!(host.released.textures, 1);
        assert_eq!(host.released.materials, 1);
        assert_eq!(host.released.geometries, 1);
        assert_eq!(host.released.clips, 1);

        // A second teardown has nothing left to release.
        cache.teardown(&mut host);
        assert_eq!(host.released.textures, 1);
    }
}
