#![forbid(unsafe_code)]

//! Incremental glTF 2.0 import for real-time hosts.
//!
//! The importer parses a glTF document (`.gltf`, `.glb`, or a `.zip`
//! containing one), resolves and decodes its buffers and images, and
//! builds nodes, meshes, materials, textures, skins, morph targets and
//! animation clips against a host engine, without ever blocking the
//! host's own loop. Work is sliced into resumable steps driven by
//! [`ImportTask::advance`] under a per-call time budget, so a large model
//! streams in across frames.
//!
//! The engine side is the [`SceneHost`](host::SceneHost) trait; the
//! importer has no rendering code of its own. A minimal session:
//!
//! ```no_run
//! use gantry_gltf::{ImportOptions, ImportTask};
//! use gantry_gltf::host::record::RecordingHost;
//!
//! let mut task = ImportTask::from_file(
//!     "models/helmet.glb",
//!     RecordingHost::new(),
//!     ImportOptions::default(),
//! );
//! task.on_completed(|root| println!("imported scene root {root}"));
//! loop {
//!     // One slice of work per host frame.
//!     if task.advance().unwrap().is_terminal() {
//!         break;
//!     }
//! }
//! ```
//!
//! Failure semantics follow the container/entity split: structural
//! problems (malformed JSON, out-of-range cross-references, unresolvable
//! URIs) abort the import through the failure callback, while per-entity
//! problems (one broken texture, material or animation) are logged,
//! recorded as failed cache slots, and skipped.

pub mod accessor;
pub mod animation;
pub mod cache;
pub mod container;
mod convert_coordinates;
pub mod document;
mod error;
pub mod host;
mod import;
pub mod material;
pub mod mesh;
pub mod scene;
pub mod skin;
pub mod texture;
pub mod uri;

pub use error::{BufferLoadError, ImportError};
pub use gantry_tasks::QueueState;
pub use import::{
    ImportContext, ImportMode, ImportOptions, ImportStage, ImportTask, PixelDecoderFactory,
    ProgressFn,
};
pub use uri::{ImportSource, SourcePolicy};
