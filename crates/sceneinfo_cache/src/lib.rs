//! Concurrent, incrementally rebuildable metadata cache for scene trees.
//!
//! The cache mirrors a live scene hierarchy (any [`Stage`](sceneinfo_core::Stage))
//! and precomputes what a translator needs before it turns nodes into
//! assets:
//!
//! - subtree vertex counts and material slots
//! - which subtrees collapse into a single asset
//! - which subtrees form animated geometry caches
//! - which nodes must be re-translated when another one changes
//!
//! Start with [`InfoCache`].

mod aggregate;
mod builder;
pub mod cache;
pub mod capability;
mod collapse;
mod context;
pub mod dependency;
mod geometry_cache;
mod instancing;
mod invalidation;
pub mod locks;
mod materials;
pub mod record;
mod snapshot;
pub mod store;

pub use cache::InfoCache;
pub use capability::{
    CapabilityFactory, CapabilityRegistry, CollapsingGroupCapability, PermissiveCapability,
    ResolvedCapabilities, SchemaCapability, SchemaQuery, StandaloneCapability,
};
pub use dependency::{register_auxiliary, register_material_users};
pub use locks::{NodeReadGuard, NodeWriteGuard, ShardedLockPool};
pub use record::{GeometryCacheState, NodeIndex, NodeRecord};
pub use store::{NodeStore, StoreIndex, StoreRead, StoreView, StoreWrite};
