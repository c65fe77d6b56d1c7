//! Stage Interfaces
//!
//! The cache never parses a scene description itself. It reads the live tree
//! through three narrow interfaces, all of which must be callable from many
//! worker threads at once:
//!
//! - [`SceneHierarchy`]: which nodes exist, in what order, and what they are.
//! - [`GeometryAccessor`]: per-node geometry facts (vertex counts, material
//!   slots, visibility, instancing, bindings, external references).
//! - [`CompositionInspector`]: native instancing and composition arcs.
//!
//! [`Stage`] bundles the three and is blanket-implemented for any type that
//! provides them. [`MemoryStage`](crate::memory::MemoryStage) is the
//! in-memory implementation used by tests and tools.

use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::interner::TypeTag;
use crate::path::ScenePath;

// ─── Node classification ───────────────────────────────────────────────────

/// Coarse classification of a node, as far as the cache cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeKind {
    /// The absolute root.
    Root,
    /// Transformable grouping node.
    Xform,
    /// Pure grouping node without a transform.
    Scope,
    /// Polygon mesh.
    Mesh,
    /// Any other renderable primitive (cube, sphere, curves...).
    Primitive,
    /// Face subset of a mesh.
    GeomSubset,
    /// Point instancer: stamps prototypes many times.
    Instancer,
    /// Root of a skeletal hierarchy.
    SkelRoot,
    /// Material definition.
    Material,
    /// Imageable node that produces no geometry (camera, light...).
    Imageable,
    /// Anything else: shaders, animation sources, plain containers.
    #[default]
    Other,
}

impl NodeKind {
    /// Whether the node participates in the imageable hierarchy.
    #[must_use]
    pub fn is_imageable(self) -> bool {
        matches!(
            self,
            Self::Xform
                | Self::Scope
                | Self::Mesh
                | Self::Primitive
                | Self::Instancer
                | Self::SkelRoot
                | Self::Imageable
        )
    }

    /// Whether the node carries its own vertices.
    #[must_use]
    pub fn is_renderable(self) -> bool {
        matches!(self, Self::Mesh | Self::Primitive)
    }
}

bitflags! {
    /// Render purposes. A node whose purpose is not in the configured set is
    /// treated as invisible.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Purpose: u8 {
        const DEFAULT = 0x01;
        const PROXY   = 0x02;
        const RENDER  = 0x04;
        const GUIDE   = 0x08;
    }
}

impl Default for Purpose {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ─── Material slots ────────────────────────────────────────────────────────

/// How a material slot was assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SlotAssignment {
    /// Bound to a material node in the scene.
    #[default]
    MaterialPath,
    /// Derived from display color / opacity primvars.
    DisplayColor,
    /// Direct reference to an engine-native material asset.
    AssetReference,
}

/// One material slot contributed by a renderable node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialSlot {
    /// Material path, color description or asset reference.
    pub source: Arc<str>,
    pub assignment: SlotAssignment,
    pub double_sided: bool,
}

impl MaterialSlot {
    #[must_use]
    pub fn new(source: &str, assignment: SlotAssignment) -> Self {
        Self {
            source: Arc::from(source),
            assignment,
            double_sided: false,
        }
    }

    /// Slot bound to a material node.
    #[must_use]
    pub fn material(path: &str) -> Self {
        Self::new(path, SlotAssignment::MaterialPath)
    }

    #[must_use]
    pub fn with_double_sided(mut self, double_sided: bool) -> Self {
        self.double_sided = double_sided;
        self
    }
}

// ─── Instancing & bindings ─────────────────────────────────────────────────

/// A prototype stamped by an instancer, with how many times it is stamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrototypeRef {
    pub path: ScenePath,
    pub repeat_count: u64,
}

/// What an instancer stamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstancerInfo {
    pub prototypes: Vec<PrototypeRef>,
}

impl InstancerInfo {
    /// Tallies a per-instance prototype index list against the prototype
    /// targets. Out-of-range indices are ignored.
    #[must_use]
    pub fn from_proto_indices(targets: &[ScenePath], indices: &[usize]) -> Self {
        let mut counts = vec![0u64; targets.len()];
        for &index in indices {
            if let Some(count) = counts.get_mut(index) {
                *count += 1;
            }
        }
        Self {
            prototypes: targets
                .iter()
                .zip(counts)
                .map(|(path, repeat_count)| PrototypeRef {
                    path: path.clone(),
                    repeat_count,
                })
                .collect(),
        }
    }

    /// Paths of every prototype target, stamped or not.
    pub fn prototype_paths(&self) -> impl Iterator<Item = &ScenePath> {
        self.prototypes.iter().map(|p| &p.path)
    }
}

/// A material bound to an explicit collection of nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionBinding {
    pub material: ScenePath,
    pub members: Vec<ScenePath>,
}

// ─── Interfaces ────────────────────────────────────────────────────────────

/// The live tree.
pub trait SceneHierarchy: Send + Sync {
    /// Whether a node exists at `path`.
    fn contains(&self, path: &ScenePath) -> bool;

    /// Children in source order. Empty for unknown paths.
    fn children(&self, path: &ScenePath) -> Vec<ScenePath>;

    fn kind(&self, path: &ScenePath) -> NodeKind;

    /// Declared schema type, used to pick a capability provider.
    fn type_tag(&self, path: &ScenePath) -> Option<TypeTag>;
}

/// Per-node geometry facts.
pub trait GeometryAccessor: Send + Sync {
    /// Vertices carried by this node alone. Zero for non-renderable nodes.
    fn vertex_count(&self, path: &ScenePath) -> u64;

    /// Slots carried by this node alone.
    fn material_slots(&self, path: &ScenePath) -> Vec<MaterialSlot>;

    /// Mesh whose points are time-sampled.
    fn is_animated_mesh(&self, path: &ScenePath) -> bool;

    /// Mesh bound to a skeleton.
    fn is_skinned(&self, _path: &ScenePath) -> bool {
        false
    }

    /// Explicitly hidden.
    fn is_invisible(&self, path: &ScenePath) -> bool;

    fn purpose(&self, _path: &ScenePath) -> Purpose {
        Purpose::DEFAULT
    }

    /// Prototype references for instancer nodes.
    fn instancer(&self, path: &ScenePath) -> Option<InstancerInfo>;

    /// Asset paths of the node's own references and payloads.
    fn external_references(&self, path: &ScenePath) -> Vec<String>;

    /// Material bound directly on this node. Descendants inherit it.
    fn direct_material_binding(&self, _path: &ScenePath) -> Option<ScenePath> {
        None
    }

    /// Collection bindings authored on this node.
    fn collection_bindings(&self, _path: &ScenePath) -> Vec<CollectionBinding> {
        Vec::new()
    }
}

/// Native instancing and composition.
pub trait CompositionInspector: Send + Sync {
    /// Source paths of the node's local, non-root composition arcs
    /// (references, payloads, inherits, specializes) within this stage.
    fn local_arc_sources(&self, path: &ScenePath) -> Vec<ScenePath>;

    /// Every prototype shared by native instances, in stable order.
    fn prototypes(&self) -> Vec<ScenePath>;

    /// Native instances of `prototype`, in stable order.
    fn instances(&self, prototype: &ScenePath) -> Vec<ScenePath>;

    /// Prototype of a native instance, `None` for anything else.
    fn prototype_of(&self, path: &ScenePath) -> Option<ScenePath>;
}

/// Everything the cache reads from the live tree.
pub trait Stage: SceneHierarchy + GeometryAccessor + CompositionInspector {}

impl<T: SceneHierarchy + GeometryAccessor + CompositionInspector> Stage for T {}
