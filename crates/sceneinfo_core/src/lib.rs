//! Core types shared by the sceneinfo crates.
//!
//! - [`ScenePath`]: absolute node paths
//! - [`InfoCacheSettings`]: policy knobs
//! - [`errors`]: error types
//! - [`stage`]: the interfaces the cache reads the live tree through
//! - [`memory`]: an in-memory stage

pub mod errors;
pub mod interner;
pub mod memory;
pub mod path;
pub mod settings;
pub mod stage;

pub use errors::{InfoCacheError, PathError, Result};
pub use interner::TypeTag;
pub use memory::{MemoryStage, NodeDesc};
pub use path::ScenePath;
pub use settings::{GeometryCacheSettings, InfoCacheSettings};
pub use stage::{
    CollectionBinding, CompositionInspector, GeometryAccessor, InstancerInfo, MaterialSlot,
    NodeKind, PrototypeRef, Purpose, SceneHierarchy, SlotAssignment, Stage,
};
