//! In-Memory Stage
//!
//! [`MemoryStage`] is a plain map-backed implementation of [`Stage`]. It is
//! what the test suites and benchmarks build scenes with, and it doubles as a
//! reference for hosts wiring up a real scene description.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut stage = MemoryStage::new();
//! stage.define("/A", NodeDesc::xform())?;
//! stage.define("/A/B", NodeDesc::mesh(100).with_slots([MaterialSlot::material("/M1")]))?;
//! stage.remove("/A/B");
//! ```

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::errors::PathError;
use crate::interner::TypeTag;
use crate::path::ScenePath;
use crate::stage::{
    CollectionBinding, CompositionInspector, GeometryAccessor, InstancerInfo, MaterialSlot,
    NodeKind, Purpose, SceneHierarchy,
};

/// Authored description of one node.
#[derive(Debug, Clone, Default)]
pub struct NodeDesc {
    pub kind: NodeKind,
    /// Overrides the type name derived from `kind`.
    pub type_name: Option<TypeTag>,
    pub vertex_count: u64,
    pub material_slots: Vec<MaterialSlot>,
    pub animated: bool,
    pub skinned: bool,
    pub invisible: bool,
    pub purpose: Purpose,
    pub instancer: Option<InstancerInfo>,
    pub external_references: Vec<String>,
    pub material_binding: Option<ScenePath>,
    pub collection_bindings: Vec<CollectionBinding>,
    pub arc_sources: Vec<ScenePath>,
    /// Set on native instances.
    pub prototype: Option<ScenePath>,
}

impl NodeDesc {
    #[must_use]
    pub fn of_kind(kind: NodeKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn xform() -> Self {
        Self::of_kind(NodeKind::Xform)
    }

    #[must_use]
    pub fn scope() -> Self {
        Self::of_kind(NodeKind::Scope)
    }

    #[must_use]
    pub fn mesh(vertex_count: u64) -> Self {
        Self {
            vertex_count,
            ..Self::of_kind(NodeKind::Mesh)
        }
    }

    #[must_use]
    pub fn material() -> Self {
        Self::of_kind(NodeKind::Material)
    }

    #[must_use]
    pub fn instancer(info: InstancerInfo) -> Self {
        Self {
            instancer: Some(info),
            ..Self::of_kind(NodeKind::Instancer)
        }
    }

    #[must_use]
    pub fn with_type_name(mut self, name: &str) -> Self {
        self.type_name = Some(TypeTag::new(name));
        self
    }

    #[must_use]
    pub fn with_slots(mut self, slots: impl IntoIterator<Item = MaterialSlot>) -> Self {
        self.material_slots = slots.into_iter().collect();
        self
    }

    #[must_use]
    pub fn animated(mut self) -> Self {
        self.animated = true;
        self
    }

    #[must_use]
    pub fn skinned(mut self) -> Self {
        self.skinned = true;
        self
    }

    #[must_use]
    pub fn invisible(mut self) -> Self {
        self.invisible = true;
        self
    }

    #[must_use]
    pub fn with_purpose(mut self, purpose: Purpose) -> Self {
        self.purpose = purpose;
        self
    }

    #[must_use]
    pub fn with_reference(mut self, asset_path: &str) -> Self {
        self.external_references.push(asset_path.to_string());
        self
    }

    #[must_use]
    pub fn bound_to(mut self, material: ScenePath) -> Self {
        self.material_binding = Some(material);
        self
    }

    #[must_use]
    pub fn with_collection_binding(mut self, binding: CollectionBinding) -> Self {
        self.collection_bindings.push(binding);
        self
    }

    #[must_use]
    pub fn with_arc_source(mut self, source: ScenePath) -> Self {
        self.arc_sources.push(source);
        self
    }

    /// Marks the node as a native instance of `prototype`.
    #[must_use]
    pub fn instance_of(mut self, prototype: ScenePath) -> Self {
        self.prototype = Some(prototype);
        self
    }

    fn resolved_type_tag(&self) -> Option<TypeTag> {
        if self.type_name.is_some() {
            return self.type_name;
        }
        let name = match self.kind {
            NodeKind::Root | NodeKind::Other => return None,
            NodeKind::Xform => "Xform",
            NodeKind::Scope => "Scope",
            NodeKind::Mesh => "Mesh",
            NodeKind::Primitive => "Cube",
            NodeKind::GeomSubset => "GeomSubset",
            NodeKind::Instancer => "PointInstancer",
            NodeKind::SkelRoot => "SkelRoot",
            NodeKind::Material => "Material",
            NodeKind::Imageable => "Camera",
        };
        Some(TypeTag::new(name))
    }
}

#[derive(Debug, Clone)]
struct MemoryNode {
    desc: NodeDesc,
    children: Vec<ScenePath>,
}

/// Map-backed stage. Children keep their definition order.
#[derive(Debug, Clone)]
pub struct MemoryStage {
    nodes: FxHashMap<ScenePath, MemoryNode>,
}

impl Default for MemoryStage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStage {
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = FxHashMap::default();
        nodes.insert(
            ScenePath::root(),
            MemoryNode {
                desc: NodeDesc::of_kind(NodeKind::Root),
                children: Vec::new(),
            },
        );
        Self { nodes }
    }

    /// Defines or redefines a node. Missing ancestors are created as typeless
    /// nodes. Redefining keeps the existing children.
    pub fn define(&mut self, path: impl AsRef<str>, desc: NodeDesc) -> Result<ScenePath, PathError> {
        let path = ScenePath::parse(path.as_ref())?;
        if let Some(node) = self.nodes.get_mut(&path) {
            node.desc = desc;
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            if !self.nodes.contains_key(&parent) {
                log::debug!("MemoryStage: creating typeless ancestor {parent}");
                self.define(parent.as_str(), NodeDesc::default())?;
            }
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.push(path.clone());
            }
        }
        self.nodes.insert(
            path.clone(),
            MemoryNode {
                desc,
                children: Vec::new(),
            },
        );
        Ok(path)
    }

    /// Removes a node and its whole subtree. The root cannot be removed.
    pub fn remove(&mut self, path: &ScenePath) -> bool {
        if path.is_root() || !self.nodes.contains_key(path) {
            return false;
        }
        if let Some(parent) = path.parent().and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| c != path);
        }
        let mut pending = vec![path.clone()];
        while let Some(current) = pending.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                pending.extend(node.children);
            }
        }
        true
    }

    #[must_use]
    pub fn get(&self, path: &ScenePath) -> Option<&NodeDesc> {
        self.nodes.get(path).map(|n| &n.desc)
    }

    pub fn get_mut(&mut self, path: &ScenePath) -> Option<&mut NodeDesc> {
        self.nodes.get_mut(path).map(|n| &mut n.desc)
    }

    /// Number of nodes including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Every path, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<ScenePath> {
        let mut paths: Vec<_> = self.nodes.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn desc(&self, path: &ScenePath) -> Option<&NodeDesc> {
        self.nodes.get(path).map(|n| &n.desc)
    }
}

impl SceneHierarchy for MemoryStage {
    fn contains(&self, path: &ScenePath) -> bool {
        self.nodes.contains_key(path)
    }

    fn children(&self, path: &ScenePath) -> Vec<ScenePath> {
        self.nodes
            .get(path)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn kind(&self, path: &ScenePath) -> NodeKind {
        self.desc(path).map(|d| d.kind).unwrap_or_default()
    }

    fn type_tag(&self, path: &ScenePath) -> Option<TypeTag> {
        self.desc(path).and_then(NodeDesc::resolved_type_tag)
    }
}

impl GeometryAccessor for MemoryStage {
    fn vertex_count(&self, path: &ScenePath) -> u64 {
        self.desc(path)
            .filter(|d| d.kind.is_renderable())
            .map_or(0, |d| d.vertex_count)
    }

    fn material_slots(&self, path: &ScenePath) -> Vec<MaterialSlot> {
        self.desc(path)
            .filter(|d| d.kind.is_renderable())
            .map(|d| d.material_slots.clone())
            .unwrap_or_default()
    }

    fn is_animated_mesh(&self, path: &ScenePath) -> bool {
        self.desc(path)
            .is_some_and(|d| d.kind == NodeKind::Mesh && d.animated)
    }

    fn is_skinned(&self, path: &ScenePath) -> bool {
        self.desc(path).is_some_and(|d| d.skinned)
    }

    fn is_invisible(&self, path: &ScenePath) -> bool {
        self.desc(path).is_some_and(|d| d.invisible)
    }

    fn purpose(&self, path: &ScenePath) -> Purpose {
        self.desc(path).map(|d| d.purpose).unwrap_or_default()
    }

    fn instancer(&self, path: &ScenePath) -> Option<InstancerInfo> {
        self.desc(path).and_then(|d| d.instancer.clone())
    }

    fn external_references(&self, path: &ScenePath) -> Vec<String> {
        self.desc(path)
            .map(|d| d.external_references.clone())
            .unwrap_or_default()
    }

    fn direct_material_binding(&self, path: &ScenePath) -> Option<ScenePath> {
        self.desc(path).and_then(|d| d.material_binding.clone())
    }

    fn collection_bindings(&self, path: &ScenePath) -> Vec<CollectionBinding> {
        self.desc(path)
            .map(|d| d.collection_bindings.clone())
            .unwrap_or_default()
    }
}

impl CompositionInspector for MemoryStage {
    fn local_arc_sources(&self, path: &ScenePath) -> Vec<ScenePath> {
        self.desc(path)
            .map(|d| d.arc_sources.clone())
            .unwrap_or_default()
    }

    fn prototypes(&self) -> Vec<ScenePath> {
        let unique: BTreeSet<ScenePath> = self
            .nodes
            .values()
            .filter_map(|n| n.desc.prototype.clone())
            .collect();
        unique.into_iter().collect()
    }

    fn instances(&self, prototype: &ScenePath) -> Vec<ScenePath> {
        let mut instances: Vec<ScenePath> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.desc.prototype.as_ref() == Some(prototype))
            .map(|(path, _)| path.clone())
            .collect();
        instances.sort();
        instances
    }

    fn prototype_of(&self, path: &ScenePath) -> Option<ScenePath> {
        self.desc(path).and_then(|d| d.prototype.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> ScenePath {
        ScenePath::parse(s).unwrap()
    }

    #[test]
    fn define_keeps_source_order_and_creates_ancestors() {
        let mut stage = MemoryStage::new();
        stage.define("/A/B", NodeDesc::mesh(10)).unwrap();
        stage.define("/A/C", NodeDesc::mesh(20)).unwrap();
        assert_eq!(stage.kind(&p("/A")), NodeKind::Other);
        assert_eq!(stage.children(&p("/A")), vec![p("/A/B"), p("/A/C")]);

        stage.define("/A", NodeDesc::xform()).unwrap();
        assert_eq!(stage.kind(&p("/A")), NodeKind::Xform);
        assert_eq!(stage.children(&p("/A")).len(), 2);
    }

    #[test]
    fn remove_drops_whole_subtree() {
        let mut stage = MemoryStage::new();
        stage.define("/A", NodeDesc::xform()).unwrap();
        stage.define("/A/B", NodeDesc::mesh(10)).unwrap();
        stage.define("/A/B/C", NodeDesc::mesh(10)).unwrap();
        assert!(stage.remove(&p("/A/B")));
        assert!(!stage.contains(&p("/A/B/C")));
        assert!(stage.children(&p("/A")).is_empty());
        assert!(!stage.remove(&ScenePath::root()));
    }

    #[test]
    fn non_renderable_nodes_report_no_geometry() {
        let mut stage = MemoryStage::new();
        stage
            .define("/X", NodeDesc { vertex_count: 99, ..NodeDesc::xform() })
            .unwrap();
        assert_eq!(stage.vertex_count(&p("/X")), 0);
        assert_eq!(stage.type_tag(&p("/X")), Some(TypeTag::new("Xform")));
    }

    #[test]
    fn instances_group_by_prototype() {
        let mut stage = MemoryStage::new();
        let proto = p("/__Proto_1");
        stage.define("/I2", NodeDesc::xform().instance_of(proto.clone())).unwrap();
        stage.define("/I1", NodeDesc::xform().instance_of(proto.clone())).unwrap();
        assert_eq!(stage.prototypes(), vec![proto.clone()]);
        assert_eq!(stage.instances(&proto), vec![p("/I1"), p("/I2")]);
        assert_eq!(stage.prototype_of(&p("/I1")), Some(proto));
    }
}
