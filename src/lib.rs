#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! Scene-graph metadata cache.
//!
//! Re-exports [`sceneinfo_core`] (paths, settings, stage interfaces) and
//! [`sceneinfo_cache`] (the cache itself), plus their common items at the
//! crate root. Most users only need the prelude:
//!
//! ```rust,ignore
//! use sceneinfo::prelude::*;
//!
//! let cache = InfoCache::new(InfoCacheSettings::default())?;
//! cache.rebuild_all(&stage);
//! ```

pub use sceneinfo_cache;
pub use sceneinfo_core;

pub use sceneinfo_cache::{
    CapabilityRegistry, CollapsingGroupCapability, GeometryCacheState, InfoCache, NodeRecord,
    PermissiveCapability, SchemaCapability, SchemaQuery, StandaloneCapability,
};
pub use sceneinfo_core::{
    CollectionBinding, GeometryCacheSettings, InfoCacheError, InfoCacheSettings, InstancerInfo,
    MaterialSlot, MemoryStage, NodeDesc, NodeKind, PrototypeRef, Purpose, Result, ScenePath,
    SlotAssignment, Stage, TypeTag,
};

pub mod prelude {
    pub use sceneinfo_cache::{CapabilityRegistry, InfoCache, SchemaCapability, SchemaQuery};
    pub use sceneinfo_core::{
        GeometryAccessor, InfoCacheSettings, MaterialSlot, MemoryStage, NodeDesc, NodeKind,
        ScenePath, SceneHierarchy, CompositionInspector, Stage,
    };
}
