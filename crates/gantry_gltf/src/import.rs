//! The import task: context, options, and the stage steps.
//!
//! One [`ImportTask`] owns one [`ImportCache`] and one task queue. The
//! queue runs the stage sequence (parse, buffers, textures, materials,
//! meshes, scene, morph targets, skins, scale, animations, finalize) in
//! strict enqueue order; dependency ordering between
//! stages is exactly this sequence, not a dependency graph. The driving
//! loop calls [`advance`](ImportTask::advance) until a terminal state.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, warn};

use gantry_asset::{
    ChunkPump, DataUri, DefaultProvider, Endpoint, SourceProvider, TransferProgress,
};
use gantry_tasks::{InterleavedSet, Progress, QueueState, Step, TaskQueue, TimeBudget};

use crate::accessor::AccessorReader;
use crate::animation::{build_clip, build_static_pose};
use crate::cache::{ImportCache, ImportedPrimitive, ImportedTexture, Slot};
use crate::container::{Container, read_container};
use crate::document::extensions::{ExtensionData, ExtensionRegistry, KHR_TEXTURE_BASISU};
use crate::document::{Document, get};
use crate::error::{BufferLoadError, ImportError};
use crate::host::{ClipFlavor, SceneHost, SkinBinding, Transform};
use crate::material::{NameDeduper, build_material, sanitize_name};
use crate::mesh::{build_primitive, extract_blend_frames};
use crate::scene::{auto_scale_factor, node_name, node_transform};
use crate::skin::build_skin;
use crate::texture::{
    DecodePoll, ImageEncoding, ImagePixelDecoder, PixelDecoder, SupercompressedDecoder,
    TextureFailure, decode_supercompressed, sampler_settings, sniff,
};
use crate::uri::{ImportSource, ResolvedLocation, SourcePolicy, resolve};

/// Stage reported through the progress callback, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImportStage {
    Parse,
    Buffers,
    Textures,
    Materials,
    Meshes,
    Scene,
    MorphTargets,
    Skins,
    Scale,
    Animations,
    Finalize,
}

/// Where the import runs. Editor imports decode synchronously for batch
/// speed and bake texture orientation into pixels (the destination is a
/// persistent serialized asset); runtime imports defer decodes across
/// yields and carry orientation as a sampling flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    #[default]
    Runtime,
    Editor,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Make the imported root visible once the import completes.
    pub auto_show: bool,
    pub auto_scale: bool,
    pub auto_scale_target_size: f32,
    pub import_animations: bool,
    pub clip_flavor: ClipFlavor,
    /// Upper bound on unyielded work per `advance` call.
    pub frame_budget: Duration,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            auto_show: true,
            auto_scale: false,
            auto_scale_target_size: 1.0,
            import_animations: true,
            clip_flavor: ClipFlavor::default(),
            frame_budget: TimeBudget::DEFAULT_LIMIT,
        }
    }
}

pub type ProgressFn = Box<dyn FnMut(ImportStage, usize, usize)>;
pub type PixelDecoderFactory = Box<dyn Fn() -> Box<dyn PixelDecoder>>;

/// Everything the stage steps accumulate into. Exclusively owned by one
/// [`ImportTask`]; nothing here is shared across concurrent imports.
pub struct ImportContext<H: SceneHost> {
    pub host: H,
    pub options: ImportOptions,
    pub mode: ImportMode,
    pub policy: SourcePolicy,
    pub provider: Box<dyn SourceProvider>,
    pub registry: ExtensionRegistry,
    pub supercompressed: Option<Box<dyn SupercompressedDecoder>>,
    pub pixel_decoders: PixelDecoderFactory,
    pub source: ImportSource,
    pub input: Option<Vec<u8>>,
    pub container: Option<Container>,
    pub document: Option<Document>,
    pub cache: ImportCache<H>,
    pub progress: Option<ProgressFn>,
    pub transfer: TransferProgress,
    stage_counter: usize,
}

impl<H: SceneHost> ImportContext<H> {
    fn teardown(&mut self) {
        let Self { host, cache, .. } = self;
        cache.teardown(host);
    }
}

fn report(progress: &mut Option<ProgressFn>, stage: ImportStage, done: usize, total: usize) {
    if let Some(callback) = progress.as_mut() {
        callback(stage, done, total);
    }
}

fn parsed<'a, T>(value: Option<&'a T>, what: &'static str) -> Result<&'a T, ImportError> {
    value.ok_or(ImportError::Internal(what))
}

/// A resumable glTF import against one host.
pub struct ImportTask<H: SceneHost + 'static> {
    queue: TaskQueue<ImportContext<H>, H::Node, ImportError>,
    cx: ImportContext<H>,
}

impl<H: SceneHost + 'static> ImportTask<H> {
    /// Imports from bytes already in memory. Relative external resources
    /// resolve against `source`; pass [`ImportSource::Memory`] for
    /// self-contained `.glb`/`.zip` payloads.
    pub fn from_bytes(
        bytes: Vec<u8>,
        source: ImportSource,
        host: H,
        options: ImportOptions,
    ) -> Self {
        Self::new(host, options, source, Some(bytes), None)
    }

    /// Imports a local `.gltf`/`.glb`/`.zip` file.
    pub fn from_file(path: impl Into<PathBuf>, host: H, options: ImportOptions) -> Self {
        let path = path.into();
        Self::new(
            host,
            options,
            ImportSource::File(path.clone()),
            None,
            Some(Endpoint::Path(path)),
        )
    }

    /// Imports from a remote URL (requires a provider with network
    /// support, e.g. the `http` feature).
    pub fn from_url(url: impl Into<String>, host: H, options: ImportOptions) -> Self {
        let url = url.into();
        Self::new(
            host,
            options,
            ImportSource::Remote(url.clone()),
            None,
            Some(Endpoint::Url(url)),
        )
    }

    fn new(
        host: H,
        options: ImportOptions,
        source: ImportSource,
        input: Option<Vec<u8>>,
        fetch: Option<Endpoint>,
    ) -> Self {
        let mut queue = TaskQueue::new(TimeBudget::new(options.frame_budget));
        queue.on_aborted(ImportContext::teardown);
        queue.on_failed(|cx: &mut ImportContext<H>, _| cx.teardown());

        if let Some(endpoint) = fetch {
            queue.push_back(FetchInputStep {
                endpoint,
                pump: None,
            });
        }
        queue.push_back(ParseStep);
        queue.push_back(BuffersStep {
            index: 0,
            pump: None,
        });
        queue.push_back(TexturesStep::<H> {
            phase: TexturesPhase::FetchImages {
                index: 0,
                pump: None,
            },
        });
        queue.push_back(MaterialsStep {
            index: 0,
            names: NameDeduper::new(),
        });
        queue.push_back(MeshesStep { index: 0 });
        queue.push_back(SceneStep::<H> {
            started: false,
            visited: 0,
            stack: Vec::new(),
        });
        queue.push_back(MorphStep { index: 0 });
        queue.push_back(SkinsStep { index: 0 });
        queue.push_back(ScaleStep);
        queue.push_back(AnimationsStep { index: 0 });
        queue.push_back(FinalizeStep);

        let cx = ImportContext {
            host,
            options,
            mode: ImportMode::default(),
            policy: SourcePolicy::host_default(),
            provider: Box::new(DefaultProvider),
            registry: ExtensionRegistry::default(),
            supercompressed: None,
            pixel_decoders: Box::new(|| Box::new(ImagePixelDecoder::new())),
            source,
            input,
            container: None,
            document: None,
            cache: ImportCache::default(),
            progress: None,
            transfer: TransferProgress::default(),
            stage_counter: 0,
        };
        Self { queue, cx }
    }

    pub fn with_mode(mut self, mode: ImportMode) -> Self {
        self.cx.mode = mode;
        self
    }

    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        self.cx.policy = policy;
        self
    }

    pub fn with_provider(mut self, provider: impl SourceProvider + 'static) -> Self {
        self.cx.provider = Box::new(provider);
        self
    }

    pub fn with_registry(mut self, registry: ExtensionRegistry) -> Self {
        self.cx.registry = registry;
        self
    }

    pub fn with_supercompressed(
        mut self,
        decoder: impl SupercompressedDecoder + 'static,
    ) -> Self {
        self.cx.supercompressed = Some(Box::new(decoder));
        self
    }

    pub fn with_pixel_decoders(
        mut self,
        factory: impl Fn() -> Box<dyn PixelDecoder> + 'static,
    ) -> Self {
        self.cx.pixel_decoders = Box::new(factory);
        self
    }

    pub fn on_progress(&mut self, callback: impl FnMut(ImportStage, usize, usize) + 'static) {
        self.cx.progress = Some(Box::new(callback));
    }

    /// Fires exactly once, with the imported scene root.
    pub fn on_completed(&mut self, callback: impl FnOnce(H::Node) + 'static) {
        self.queue.on_completed(move |_, value| {
            if let Some(root) = value {
                callback(root);
            }
        });
    }

    pub fn on_aborted(&mut self, callback: impl FnMut() + 'static) {
        let mut callback = callback;
        self.queue.on_aborted(move |_| callback());
    }

    pub fn on_failed(&mut self, callback: impl FnMut(&ImportError) + 'static) {
        let mut callback = callback;
        self.queue.on_failed(move |_, error| callback(error));
    }

    /// Keeps failures out of [`advance`](ImportTask::advance)'s return
    /// value; the failure callback becomes the only error channel.
    pub fn suppress_failures(&mut self) {
        self.queue.suppress_failures();
    }

    /// Runs import work until the time budget is spent or the import
    /// reaches a terminal state.
    pub fn advance(&mut self) -> Result<QueueState, ImportError> {
        self.queue.advance(&mut self.cx)
    }

    /// Cooperative cancellation: cleanup callbacks run exactly once, and
    /// aborting an already-terminal import is a no-op.
    pub fn abort(&mut self) {
        self.queue.abort(&mut self.cx);
    }

    /// Appends extra work after the import, e.g. per-file steps of a
    /// multi-file import.
    pub fn push_step(&mut self, step: impl Step<ImportContext<H>, H::Node, ImportError> + 'static) {
        self.queue.push_back(step);
    }

    /// Inserts priority work ahead of everything pending.
    pub fn push_priority_step(
        &mut self,
        step: impl Step<ImportContext<H>, H::Node, ImportError> + 'static,
    ) {
        self.queue.push_front(step);
    }

    pub fn state(&self) -> QueueState {
        self.queue.state()
    }

    /// Byte progress of the transfer currently in flight.
    pub fn transfer_progress(&self) -> TransferProgress {
        self.cx.transfer
    }

    /// Longest single step resumption so far, for diagnostics.
    pub fn longest_resume(&self) -> Duration {
        self.queue.longest_resume()
    }

    /// Hands the host back after completion (or abandonment).
    pub fn into_host(self) -> H {
        self.cx.host
    }
}

// ---------------------------------------------------------------------------
// Stage steps
// ---------------------------------------------------------------------------

struct FetchInputStep {
    endpoint: Endpoint,
    pump: Option<ChunkPump>,
}

impl<H: SceneHost> Step<ImportContext<H>, H::Node, ImportError> for FetchInputStep {
    fn resume(
        &mut self,
        cx: &mut ImportContext<H>,
        budget: &TimeBudget,
    ) -> Result<Progress<H::Node>, ImportError> {
        let mut pump = match self.pump.take() {
            Some(pump) => pump,
            None => {
                let source = cx
                    .provider
                    .open(&self.endpoint)
                    .map_err(|source| ImportError::Input { source })?;
                ChunkPump::new(source)
            }
        };
        loop {
            let done = pump.pump().map_err(|source| ImportError::Input { source })?;
            cx.transfer = pump.progress();
            if done {
                cx.input = Some(pump.into_bytes());
                return Ok(Progress::Done);
            }
            if budget.exhausted() {
                self.pump = Some(pump);
                return Ok(Progress::Yielded);
            }
        }
    }

    fn label(&self) -> &'static str {
        "fetch-input"
    }
}

struct ParseStep;

impl<H: SceneHost> Step<ImportContext<H>, H::Node, ImportError> for ParseStep {
    fn resume(
        &mut self,
        cx: &mut ImportContext<H>,
        _budget: &TimeBudget,
    ) -> Result<Progress<H::Node>, ImportError> {
        let bytes = cx
            .input
            .take()
            .ok_or(ImportError::Internal("no input bytes to parse"))?;
        let container = read_container(bytes)?;
        let document = Document::parse(&container.json, &cx.registry)?;
        cx.cache = ImportCache::for_document(&document);
        cx.container = Some(container);
        cx.document = Some(document);
        report(&mut cx.progress, ImportStage::Parse, 1, 1);
        Ok(Progress::Done)
    }

    fn label(&self) -> &'static str {
        "parse"
    }
}

struct BuffersStep {
    index: usize,
    pump: Option<ChunkPump>,
}

impl BuffersStep {
    fn finish_buffer<H: SceneHost>(
        cx: &mut ImportContext<H>,
        index: usize,
        mut bytes: Vec<u8>,
    ) -> Result<(), ImportError> {
        let document = parsed(cx.document.as_ref(), "buffers need a parsed document")?;
        let declared = document.buffers[index].byte_length as usize;
        // Embedded chunks are 4-byte padded; the declared length trims it.
        if declared > 0 && bytes.len() > declared {
            bytes.truncate(declared);
        }
        cx.cache.buffers[index] = Slot::Ready(bytes);
        report(
            &mut cx.progress,
            ImportStage::Buffers,
            index + 1,
            document.buffers.len(),
        );
        Ok(())
    }
}

impl<H: SceneHost> Step<ImportContext<H>, H::Node, ImportError> for BuffersStep {
    fn resume(
        &mut self,
        cx: &mut ImportContext<H>,
        budget: &TimeBudget,
    ) -> Result<Progress<H::Node>, ImportError> {
        loop {
            // Drain a transfer in flight before anything else.
            if let Some(mut pump) = self.pump.take() {
                let done = pump.pump().map_err(|source| ImportError::Buffer {
                    index: self.index,
                    source: source.into(),
                })?;
                cx.transfer = pump.progress();
                if !done {
                    self.pump = Some(pump);
                    if budget.exhausted() {
                        return Ok(Progress::Yielded);
                    }
                    continue;
                }
                Self::finish_buffer(cx, self.index, pump.into_bytes())?;
                self.index += 1;
            }

            let document = parsed(cx.document.as_ref(), "buffers need a parsed document")?;
            let total = document.buffers.len();
            if self.index >= total {
                return Ok(Progress::Done);
            }
            let index = self.index;
            let wrap = |source: BufferLoadError| ImportError::Buffer { index, source };

            let buffer = &document.buffers[index];
            match &buffer.uri {
                // No URI: the embedded binary chunk at this index.
                None => {
                    let container = parsed(cx.container.as_ref(), "buffers need a container")?;
                    let chunk = container
                        .binary_chunk(index)
                        .ok_or_else(|| wrap(BufferLoadError::MissingBinaryChunk))?
                        .to_vec();
                    Self::finish_buffer(cx, index, chunk)?;
                    self.index += 1;
                }
                Some(uri) => {
                    let archive_dir = cx
                        .container
                        .as_ref()
                        .and_then(|c| c.archive.as_ref())
                        .map(|a| a.inner_dir.clone());
                    match resolve(uri, &cx.source, archive_dir.as_deref(), &cx.policy)? {
                        ResolvedLocation::Data(uri) => {
                            let bytes = DataUri::parse(&uri)
                                .and_then(|data| data.decode())
                                .map_err(|e| wrap(e.into()))?;
                            Self::finish_buffer(cx, index, bytes)?;
                            self.index += 1;
                        }
                        ResolvedLocation::ArchiveEntry(entry) => {
                            let archive = cx
                                .container
                                .as_mut()
                                .and_then(|c| c.archive.as_mut())
                                .ok_or(ImportError::Internal("archive entry without archive"))?;
                            let bytes = archive.extract(&entry).map_err(|e| wrap(e.into()))?;
                            Self::finish_buffer(cx, index, bytes)?;
                            self.index += 1;
                        }
                        ResolvedLocation::Endpoint(endpoint) => {
                            let source =
                                cx.provider.open(&endpoint).map_err(|e| wrap(e.into()))?;
                            self.pump = Some(ChunkPump::new(source));
                        }
                    }
                }
            }
            if budget.exhausted() {
                return Ok(Progress::Yielded);
            }
        }
    }

    fn label(&self) -> &'static str {
        "buffers"
    }
}

enum TexturesPhase<H: SceneHost + 'static> {
    FetchImages {
        index: usize,
        pump: Option<ChunkPump>,
    },
    Decode {
        set: InterleavedSet<ImportContext<H>, H::Node, ImportError>,
    },
}

struct TexturesStep<H: SceneHost + 'static> {
    phase: TexturesPhase<H>,
}

impl<H: SceneHost + 'static> TexturesStep<H> {
    /// Fetches raw image payloads one at a time. Image failures are soft:
    /// the textures over them fail individually later.
    fn fetch_images(
        cx: &mut ImportContext<H>,
        index: &mut usize,
        pump: &mut Option<ChunkPump>,
        budget: &TimeBudget,
    ) -> Result<bool, ImportError> {
        loop {
            if let Some(mut live) = pump.take() {
                match live.pump() {
                    Err(e) => {
                        warn!("image {} failed to download: {e}", *index);
                        cx.cache.images[*index] = Slot::Failed;
                        *index += 1;
                    }
                    Ok(false) => {
                        cx.transfer = live.progress();
                        *pump = Some(live);
                        if budget.exhausted() {
                            return Ok(false);
                        }
                        continue;
                    }
                    Ok(true) => {
                        cx.cache.images[*index] = Slot::Ready(live.into_bytes());
                        *index += 1;
                    }
                }
            }

            let document = parsed(cx.document.as_ref(), "textures need a parsed document")?;
            if *index >= document.images.len() {
                return Ok(true);
            }
            let image = &document.images[*index];

            if let Some(view_index) = image.buffer_view {
                let slot = match Self::slice_view(cx, view_index) {
                    Ok(bytes) => Slot::Ready(bytes),
                    Err(e) => {
                        warn!("image {} could not be read from its buffer view: {e}", *index);
                        Slot::Failed
                    }
                };
                cx.cache.images[*index] = slot;
                *index += 1;
            } else if let Some(uri) = image.uri.clone() {
                let archive_dir = cx
                    .container
                    .as_ref()
                    .and_then(|c| c.archive.as_ref())
                    .map(|a| a.inner_dir.clone());
                match resolve(&uri, &cx.source, archive_dir.as_deref(), &cx.policy)? {
                    ResolvedLocation::Data(uri) => {
                        let slot = match DataUri::parse(&uri).and_then(|d| d.decode()) {
                            Ok(bytes) => Slot::Ready(bytes),
                            Err(e) => {
                                warn!("image {} has an invalid data URI: {e}", *index);
                                Slot::Failed
                            }
                        };
                        cx.cache.images[*index] = slot;
                        *index += 1;
                    }
                    ResolvedLocation::ArchiveEntry(entry) => {
                        let archive = cx
                            .container
                            .as_mut()
                            .and_then(|c| c.archive.as_mut())
                            .ok_or(ImportError::Internal("archive entry without archive"))?;
                        let slot = match archive.extract(&entry) {
                            Ok(bytes) => Slot::Ready(bytes),
                            Err(e) => {
                                warn!("image {} missing from archive: {e}", *index);
                                Slot::Failed
                            }
                        };
                        cx.cache.images[*index] = slot;
                        *index += 1;
                    }
                    ResolvedLocation::Endpoint(endpoint) => match cx.provider.open(&endpoint) {
                        Ok(source) => *pump = Some(ChunkPump::new(source)),
                        Err(e) => {
                            warn!("image {} could not be opened: {e}", *index);
                            cx.cache.images[*index] = Slot::Failed;
                            *index += 1;
                        }
                    },
                }
            } else {
                warn!("image {} has neither a URI nor a buffer view", *index);
                cx.cache.images[*index] = Slot::Failed;
                *index += 1;
            }

            if budget.exhausted() {
                return Ok(false);
            }
        }
    }

    fn slice_view(cx: &ImportContext<H>, view_index: usize) -> Result<Vec<u8>, ImportError> {
        let document = parsed(cx.document.as_ref(), "textures need a parsed document")?;
        let view = get(&document.buffer_views, view_index, "buffer view")?;
        let buffer = cx.cache.buffers[view.buffer]
            .ready()
            .ok_or(crate::document::DocumentError::BufferUnavailable { index: view.buffer })?;
        let bytes = buffer
            .get(view.byte_offset..view.byte_offset + view.byte_length)
            .ok_or(crate::document::DocumentError::AccessorOutOfBounds {
                accessor: view_index,
            })?;
        Ok(bytes.to_vec())
    }

    fn decode_set(
        cx: &mut ImportContext<H>,
    ) -> Result<InterleavedSet<ImportContext<H>, H::Node, ImportError>, ImportError> {
        let document = parsed(cx.document.as_ref(), "textures need a parsed document")?;
        let total = document.textures.len();
        cx.stage_counter = 0;
        report(&mut cx.progress, ImportStage::Textures, 0, total);
        let mut set = InterleavedSet::new();
        for index in 0..total {
            set.push(
                TextureTask {
                    index,
                    decoder: None,
                },
                move |cx: &mut ImportContext<H>, _| {
                    cx.stage_counter += 1;
                    let done = cx.stage_counter;
                    report(&mut cx.progress, ImportStage::Textures, done, total);
                },
            );
        }
        Ok(set)
    }
}

impl<H: SceneHost + 'static> Step<ImportContext<H>, H::Node, ImportError> for TexturesStep<H> {
    fn resume(
        &mut self,
        cx: &mut ImportContext<H>,
        budget: &TimeBudget,
    ) -> Result<Progress<H::Node>, ImportError> {
        loop {
            match &mut self.phase {
                TexturesPhase::FetchImages { index, pump } => {
                    if !Self::fetch_images(cx, index, pump, budget)? {
                        return Ok(Progress::Yielded);
                    }
                    self.phase = TexturesPhase::Decode {
                        set: Self::decode_set(cx)?,
                    };
                }
                TexturesPhase::Decode { set } => return set.resume(cx, budget),
            }
        }
    }

    fn label(&self) -> &'static str {
        "textures"
    }
}

/// Decodes one texture and creates its host object. Every failure in here
/// is soft: log, mark the slot failed, keep importing.
struct TextureTask {
    index: usize,
    decoder: Option<Box<dyn PixelDecoder>>,
}

impl TextureTask {
    fn create<H: SceneHost>(&self, cx: &mut ImportContext<H>, mut image: crate::host::DecodedImage) {
        let ImportContext {
            host,
            cache,
            document,
            mode,
            ..
        } = cx;
        let Some(document) = document.as_ref() else {
            return;
        };
        let texture = &document.textures[self.index];
        if *mode == ImportMode::Editor && image.flipped {
            // Persistent destination: bake the orientation once and drop
            // the flag.
            image.flip_vertical();
        }
        let sampler = sampler_settings(
            texture
                .sampler
                .and_then(|index| document.samplers.get(index)),
        );
        let name = texture
            .name
            .clone()
            .unwrap_or_else(|| format!("Texture{}", self.index));
        cache.textures[self.index] = match host.create_texture(&name, &image, &sampler) {
            Ok(created) => Slot::Ready(ImportedTexture {
                texture: created,
                flipped: image.flipped,
            }),
            Err(e) => {
                warn!("host rejected texture {}: {e}", self.index);
                Slot::Failed
            }
        };
    }

    fn fail<H: SceneHost>(&self, cx: &mut ImportContext<H>, failure: &TextureFailure) {
        match failure {
            TextureFailure::BackendMissing => error!(
                "texture {} is supercompressed (KTX2) but no supercompressed decode backend is \
                 installed; enable one (e.g. the basis-universal feature) to import it",
                self.index
            ),
            TextureFailure::BackendOutdated { found, required } => error!(
                "texture {} needs supercompressed backend version {required} but {found} is \
                 installed; update the backend to import it",
                self.index
            ),
            TextureFailure::Decode(e) => warn!("texture {} failed to decode: {e}", self.index),
        }
        cx.cache.textures[self.index] = Slot::Failed;
    }
}

impl<H: SceneHost> Step<ImportContext<H>, H::Node, ImportError> for TextureTask {
    fn resume(
        &mut self,
        cx: &mut ImportContext<H>,
        _budget: &TimeBudget,
    ) -> Result<Progress<H::Node>, ImportError> {
        // Poll a decode already in flight.
        if let Some(decoder) = self.decoder.as_mut() {
            return match decoder.poll() {
                Ok(DecodePoll::Pending) => Ok(Progress::Yielded),
                Ok(DecodePoll::Ready(mut image)) => {
                    image.flipped = decoder.flips_vertically();
                    self.decoder = None;
                    self.create(cx, image);
                    Ok(Progress::Done)
                }
                Err(e) => {
                    self.decoder = None;
                    self.fail(cx, &TextureFailure::Decode(e));
                    Ok(Progress::Done)
                }
            };
        }

        let document = parsed(cx.document.as_ref(), "textures need a parsed document")?;
        let texture = &document.textures[self.index];
        // KHR_texture_basisu redirects to a KTX2 image.
        let source = match texture.extensions.get(KHR_TEXTURE_BASISU) {
            Some(ExtensionData::TextureBasisu(ext)) => Some(ext.source),
            _ => texture.source,
        };
        let Some(image_index) = source else {
            warn!("texture {} has no image source", self.index);
            cx.cache.textures[self.index] = Slot::Failed;
            return Ok(Progress::Done);
        };
        let Some(bytes) = cx
            .cache
            .images
            .get(image_index)
            .and_then(|slot| slot.ready())
        else {
            warn!(
                "texture {} refers to image {image_index}, which is unavailable",
                self.index
            );
            cx.cache.textures[self.index] = Slot::Failed;
            return Ok(Progress::Done);
        };

        match sniff(bytes) {
            ImageEncoding::Ktx2 => {
                let bytes = bytes.clone();
                let result = decode_supercompressed(cx.supercompressed.as_deref_mut(), &bytes);
                match result {
                    Ok(image) => self.create(cx, image),
                    Err(failure) => self.fail(cx, &failure),
                }
                Ok(Progress::Done)
            }
            ImageEncoding::Standard => {
                let bytes = bytes.to_vec();
                let mut decoder = (cx.pixel_decoders)();
                if let Err(e) = decoder.begin(bytes) {
                    self.fail(cx, &TextureFailure::Decode(e));
                    return Ok(Progress::Done);
                }
                match cx.mode {
                    // Editor imports decode synchronously for speed.
                    ImportMode::Editor => loop {
                        match decoder.poll() {
                            Ok(DecodePoll::Pending) => continue,
                            Ok(DecodePoll::Ready(mut image)) => {
                                image.flipped = decoder.flips_vertically();
                                self.create(cx, image);
                                return Ok(Progress::Done);
                            }
                            Err(e) => {
                                self.fail(cx, &TextureFailure::Decode(e));
                                return Ok(Progress::Done);
                            }
                        }
                    },
                    // Runtime imports yield between begin and poll so a
                    // host decoder can run off-thread.
                    ImportMode::Runtime => {
                        self.decoder = Some(decoder);
                        Ok(Progress::Yielded)
                    }
                }
            }
        }
    }

    fn label(&self) -> &'static str {
        "texture-decode"
    }
}

struct MaterialsStep {
    index: usize,
    names: NameDeduper,
}

impl<H: SceneHost> Step<ImportContext<H>, H::Node, ImportError> for MaterialsStep {
    fn resume(
        &mut self,
        cx: &mut ImportContext<H>,
        budget: &TimeBudget,
    ) -> Result<Progress<H::Node>, ImportError> {
        loop {
            let ImportContext {
                host,
                document,
                cache,
                progress,
                ..
            } = cx;
            let document = parsed(document.as_ref(), "materials need a parsed document")?;
            let total = document.materials.len();
            if self.index >= total {
                return Ok(Progress::Done);
            }
            let index = self.index;
            let material = &document.materials[index];
            let base = sanitize_name(
                &material
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Material{index}")),
            );
            let name = self.names.unique(&base);
            cache.materials[index] = match build_material(material, &name, &cache.textures) {
                Ok(spec) => match host.create_material(&spec) {
                    Ok(created) => Slot::Ready(created),
                    Err(e) => {
                        warn!("host rejected material '{name}': {e}");
                        Slot::Failed
                    }
                },
                Err(e) => {
                    error!("material '{name}' failed to build: {e}");
                    Slot::Failed
                }
            };
            report(progress, ImportStage::Materials, index + 1, total);
            self.index += 1;
            if budget.exhausted() {
                return Ok(Progress::Yielded);
            }
        }
    }

    fn label(&self) -> &'static str {
        "materials"
    }
}

struct MeshesStep {
    index: usize,
}

impl<H: SceneHost> Step<ImportContext<H>, H::Node, ImportError> for MeshesStep {
    fn resume(
        &mut self,
        cx: &mut ImportContext<H>,
        budget: &TimeBudget,
    ) -> Result<Progress<H::Node>, ImportError> {
        loop {
            let ImportContext {
                host,
                document,
                cache,
                progress,
                ..
            } = cx;
            let document = parsed(document.as_ref(), "meshes need a parsed document")?;
            let total = document.meshes.len();
            if self.index >= total {
                return Ok(Progress::Done);
            }
            let index = self.index;
            let mesh = &document.meshes[index];
            let mesh_name = mesh.name.clone().unwrap_or_else(|| format!("Mesh{index}"));
            let target_names = mesh.target_names();

            let buffers: &Vec<Slot<Vec<u8>>> = &cache.buffers;
            let reader = AccessorReader::new(document, |i| {
                buffers.get(i).and_then(|slot| slot.ready()).map(Vec::as_slice)
            });

            let mut built = Vec::with_capacity(mesh.primitives.len());
            let mut morphed = false;
            for (p, primitive) in mesh.primitives.iter().enumerate() {
                let name = if mesh.primitives.len() > 1 {
                    format!("{mesh_name}.{p}")
                } else {
                    mesh_name.clone()
                };
                let geometry = match build_primitive(&reader, primitive) {
                    Ok(geometry) => geometry,
                    Err(e) => {
                        warn!("primitive '{name}' skipped: {e}");
                        continue;
                    }
                };
                let mut created = match host.create_geometry(&name, &geometry) {
                    Ok(created) => created,
                    Err(e) => {
                        warn!("host rejected geometry '{name}': {e}");
                        continue;
                    }
                };
                let frames = match extract_blend_frames(&reader, primitive, target_names.as_deref())
                {
                    Ok(frames) => frames,
                    Err(e) => {
                        warn!("morph targets of '{name}' skipped: {e}");
                        Vec::new()
                    }
                };
                let has_morph_targets = !frames.is_empty();
                for frame in &frames {
                    if let Err(e) = host.add_blend_frame(&mut created, frame) {
                        warn!("blend frame '{}' of '{name}' rejected: {e}", frame.name);
                    }
                }
                if has_morph_targets {
                    morphed = true;
                }
                built.push(ImportedPrimitive {
                    geometry: created,
                    material: primitive.material,
                    has_morph_targets,
                });
            }

            if morphed {
                cache.morphed_meshes.insert(index);
            }
            cache.meshes[index] = if built.is_empty() && !mesh.primitives.is_empty() {
                error!("mesh '{mesh_name}' has no importable primitives");
                Slot::Failed
            } else {
                Slot::Ready(built)
            };
            report(progress, ImportStage::Meshes, index + 1, total);
            self.index += 1;
            if budget.exhausted() {
                return Ok(Progress::Yielded);
            }
        }
    }

    fn label(&self) -> &'static str {
        "meshes"
    }
}

struct StackEntry<N> {
    node: usize,
    parent: N,
    parent_path: String,
}

struct SceneStep<H: SceneHost> {
    started: bool,
    visited: usize,
    stack: Vec<StackEntry<H::Node>>,
}

impl<H: SceneHost> SceneStep<H> {
    fn root_name(source: &ImportSource, scene_name: Option<&str>) -> String {
        let from_source = match source {
            ImportSource::File(path) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned()),
            ImportSource::Remote(url) => url
                .rsplit('/')
                .next()
                .and_then(|name| name.split('.').next())
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            ImportSource::Memory => None,
        };
        from_source
            .or_else(|| scene_name.map(str::to_string))
            .unwrap_or_else(|| "Scene".to_string())
    }
}

impl<H: SceneHost> Step<ImportContext<H>, H::Node, ImportError> for SceneStep<H> {
    fn resume(
        &mut self,
        cx: &mut ImportContext<H>,
        budget: &TimeBudget,
    ) -> Result<Progress<H::Node>, ImportError> {
        if !self.started {
            let ImportContext {
                host,
                document,
                cache,
                source,
                ..
            } = cx;
            let document = parsed(document.as_ref(), "scene needs a parsed document")?;
            let scene = document.default_scene()?;
            let name = Self::root_name(source, scene.name.as_deref());
            let root = host.create_node(&name, None, &Transform::IDENTITY)?;
            // Keep the partially built model unobservable until finalize.
            host.set_visible(&root, false);
            for &node in scene.nodes.iter().rev() {
                self.stack.push(StackEntry {
                    node,
                    parent: root.clone(),
                    parent_path: String::new(),
                });
            }
            cache.root = Some(root);
            self.started = true;
        }

        loop {
            let ImportContext {
                host,
                document,
                cache,
                progress,
                ..
            } = cx;
            let document = parsed(document.as_ref(), "scene needs a parsed document")?;
            let Some(entry) = self.stack.pop() else {
                return Ok(Progress::Done);
            };
            let node = get(&document.nodes, entry.node, "node")?;
            if cache.nodes[entry.node].is_some() {
                warn!("node {} appears twice in the hierarchy; skipping repeat", entry.node);
                continue;
            }
            let name = node_name(node, entry.node);
            let path = if entry.parent_path.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", entry.parent_path, name)
            };
            let transform = node_transform(node);
            let created = host.create_node(&name, Some(&entry.parent), &transform)?;
            cache.nodes[entry.node] = Some(created.clone());
            cache.node_paths[entry.node] = path.clone();

            if let Some(mesh_index) = node.mesh {
                get(&document.meshes, mesh_index, "mesh")?;
                cache.mesh_owners[mesh_index].push(entry.node);
                if let Some(primitives) = cache.meshes[mesh_index].ready() {
                    for (p, primitive) in primitives.iter().enumerate() {
                        // One geometry+material per node: primitives past
                        // the first get sibling nodes.
                        let target = if p == 0 {
                            created.clone()
                        } else {
                            host.create_node(
                                &format!("{name}.{p}"),
                                Some(&entry.parent),
                                &transform,
                            )?
                        };
                        let material = primitive
                            .material
                            .and_then(|m| cache.materials.get(m))
                            .and_then(|slot| slot.ready());
                        if let Err(e) = host.attach_primitive(&target, &primitive.geometry, material)
                        {
                            warn!("renderer for node '{name}' rejected: {e}");
                        }
                        cache.render_nodes[entry.node].push(target);
                    }
                }
            }
            if let Some(skin_index) = node.skin {
                get(&document.skins, skin_index, "skin")?;
                cache.skin_owners[skin_index].push(entry.node);
            }

            for &child in node.children.iter().rev() {
                self.stack.push(StackEntry {
                    node: child,
                    parent: created.clone(),
                    parent_path: path.clone(),
                });
            }
            self.visited += 1;
            report(progress, ImportStage::Scene, self.visited, document.nodes.len());
            if budget.exhausted() {
                return Ok(Progress::Yielded);
            }
        }
    }

    fn label(&self) -> &'static str {
        "scene"
    }
}

struct MorphStep {
    index: usize,
}

impl<H: SceneHost> Step<ImportContext<H>, H::Node, ImportError> for MorphStep {
    fn resume(
        &mut self,
        cx: &mut ImportContext<H>,
        budget: &TimeBudget,
    ) -> Result<Progress<H::Node>, ImportError> {
        loop {
            let ImportContext {
                host,
                document,
                cache,
                progress,
                ..
            } = cx;
            let document = parsed(document.as_ref(), "morph targets need a parsed document")?;
            let total = document.meshes.len();
            if self.index >= total {
                return Ok(Progress::Done);
            }
            let index = self.index;
            if cache.morphed_meshes.contains(index) {
                let mesh = &document.meshes[index];
                let target_count = mesh
                    .primitives
                    .iter()
                    .map(|p| p.targets.len())
                    .max()
                    .unwrap_or(0);
                let mut weights = mesh.weights.clone();
                weights.resize(target_count, 0.0);
                for &owner in &cache.mesh_owners[index] {
                    for node in &cache.render_nodes[owner] {
                        if let Err(e) = host.attach_morph_state(node, &weights) {
                            warn!("morph state for mesh {index} rejected: {e}");
                        }
                    }
                }
            }
            report(progress, ImportStage::MorphTargets, index + 1, total);
            self.index += 1;
            if budget.exhausted() {
                return Ok(Progress::Yielded);
            }
        }
    }

    fn label(&self) -> &'static str {
        "morph-targets"
    }
}

struct SkinsStep {
    index: usize,
}

impl<H: SceneHost> Step<ImportContext<H>, H::Node, ImportError> for SkinsStep {
    fn resume(
        &mut self,
        cx: &mut ImportContext<H>,
        budget: &TimeBudget,
    ) -> Result<Progress<H::Node>, ImportError> {
        loop {
            let ImportContext {
                host,
                document,
                cache,
                progress,
                ..
            } = cx;
            let document = parsed(document.as_ref(), "skins need a parsed document")?;
            let total = document.skins.len();
            if self.index >= total {
                return Ok(Progress::Done);
            }
            let index = self.index;

            let buffers: &Vec<Slot<Vec<u8>>> = &cache.buffers;
            let reader = AccessorReader::new(document, |i| {
                buffers.get(i).and_then(|slot| slot.ready()).map(Vec::as_slice)
            });
            match build_skin(&reader, document, index) {
                Ok(data) => {
                    let joints: Option<Vec<H::Node>> = data
                        .joints
                        .iter()
                        .map(|&j| cache.nodes.get(j).and_then(Clone::clone))
                        .collect();
                    match joints {
                        Some(joints) => {
                            let binding = SkinBinding {
                                joints: &joints,
                                inverse_bind_matrices: &data.inverse_bind_matrices,
                            };
                            for &owner in &cache.skin_owners[index] {
                                for node in &cache.render_nodes[owner] {
                                    if let Err(e) = host.attach_skin(node, &binding) {
                                        warn!("skin {index} rejected on a node: {e}");
                                    }
                                }
                            }
                        }
                        None => error!("skin {index} references nodes outside the scene; skipped"),
                    }
                }
                Err(e) => error!("skin {index} skipped: {e}"),
            }
            report(progress, ImportStage::Skins, index + 1, total);
            self.index += 1;
            if budget.exhausted() {
                return Ok(Progress::Yielded);
            }
        }
    }

    fn label(&self) -> &'static str {
        "skins"
    }
}

struct ScaleStep;

impl<H: SceneHost> Step<ImportContext<H>, H::Node, ImportError> for ScaleStep {
    fn resume(
        &mut self,
        cx: &mut ImportContext<H>,
        _budget: &TimeBudget,
    ) -> Result<Progress<H::Node>, ImportError> {
        let ImportContext {
            host,
            cache,
            options,
            progress,
            ..
        } = cx;
        if options.auto_scale {
            if let Some(root) = cache.root.as_ref() {
                let bounds = host.render_bounds(root);
                match auto_scale_factor(bounds, options.auto_scale_target_size) {
                    Some(factor) => host.set_uniform_scale(root, factor),
                    None => debug!("auto-scale skipped: no renderers or degenerate bounds"),
                }
            }
        }
        report(progress, ImportStage::Scale, 1, 1);
        Ok(Progress::Done)
    }

    fn label(&self) -> &'static str {
        "auto-scale"
    }
}

struct AnimationsStep {
    index: usize,
}

impl<H: SceneHost> Step<ImportContext<H>, H::Node, ImportError> for AnimationsStep {
    fn resume(
        &mut self,
        cx: &mut ImportContext<H>,
        budget: &TimeBudget,
    ) -> Result<Progress<H::Node>, ImportError> {
        loop {
            let ImportContext {
                host,
                document,
                cache,
                options,
                progress,
                ..
            } = cx;
            let document = parsed(document.as_ref(), "animations need a parsed document")?;
            if !options.import_animations {
                report(progress, ImportStage::Animations, 0, 0);
                return Ok(Progress::Done);
            }
            let total = document.animations.len();
            if self.index > total {
                return Ok(Progress::Done);
            }
            // After all real clips: the synthetic static pose.
            if self.index == total {
                let morphed = &cache.morphed_meshes;
                let clip = build_static_pose(
                    document,
                    &cache.node_paths,
                    |node| {
                        let mesh = document.nodes[node].mesh?;
                        if !morphed.contains(mesh) {
                            return None;
                        }
                        let target_count = document.meshes[mesh]
                            .primitives
                            .iter()
                            .map(|p| p.targets.len())
                            .max()
                            .unwrap_or(0);
                        let mut weights = document.meshes[mesh].weights.clone();
                        weights.resize(target_count, 0.0);
                        Some(weights)
                    },
                    options.clip_flavor,
                );
                let slot = match host.create_clip(&clip) {
                    Ok(created) => Slot::Ready(created),
                    Err(e) => {
                        warn!("host rejected the static pose clip: {e}");
                        Slot::Failed
                    }
                };
                cache.clips.push(slot);
                self.index += 1;
                return Ok(Progress::Done);
            }

            let index = self.index;
            let buffers: &Vec<Slot<Vec<u8>>> = &cache.buffers;
            let reader = AccessorReader::new(document, |i| {
                buffers.get(i).and_then(|slot| slot.ready()).map(Vec::as_slice)
            });
            let slot = match build_clip(
                &reader,
                document,
                index,
                &cache.node_paths,
                options.clip_flavor,
            ) {
                Ok(clip) => match host.create_clip(&clip) {
                    Ok(created) => Slot::Ready(created),
                    Err(e) => {
                        warn!("host rejected animation {index}: {e}");
                        Slot::Failed
                    }
                },
                Err(e) => {
                    // Fatal to this animation only.
                    error!("animation {index} failed to import: {e}");
                    Slot::Failed
                }
            };
            cache.clips.push(slot);
            report(progress, ImportStage::Animations, index + 1, total);
            self.index += 1;
            if budget.exhausted() {
                return Ok(Progress::Yielded);
            }
        }
    }

    fn label(&self) -> &'static str {
        "animations"
    }
}

struct FinalizeStep;

impl<H: SceneHost> Step<ImportContext<H>, H::Node, ImportError> for FinalizeStep {
    fn resume(
        &mut self,
        cx: &mut ImportContext<H>,
        _budget: &TimeBudget,
    ) -> Result<Progress<H::Node>, ImportError> {
        let root = cx
            .cache
            .root
            .clone()
            .ok_or(ImportError::Internal("finalize without a scene root"))?;
        if cx.options.auto_show {
            cx.host.set_visible(&root, true);
        }
        report(&mut cx.progress, ImportStage::Finalize, 1, 1);
        Ok(Progress::DoneWith(root))
    }

    fn label(&self) -> &'static str {
        "finalize"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_name_prefers_the_file_stem() {
        let source = ImportSource::File(PathBuf::from("/models/helmet.glb"));
        assert_eq!(
            SceneStep::<crate::host::record::RecordingHost>::root_name(&source, Some("scene0")),
            "helmet"
        );
        assert_eq!(
            SceneStep::<crate::host::record::RecordingHost>::root_name(
                &ImportSource::Memory,
                Some("scene0")
            ),
            "scene0"
        );
        assert_eq!(
            SceneStep::<crate::host::record::RecordingHost>::root_name(&ImportSource::Memory, None),
            "Scene"
        );
    }
}
