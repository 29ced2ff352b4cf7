//! Persistent selection tree.
//!
//! Project → Module | External dependency → Package → File → Class →
//! Method, stored as an id arena with parent back-references. File and
//! class nodes carry an [`Inclusion`]: `Whole` means everything inside,
//! with nothing materialized below; `Partial` lists exactly what is
//! included. Removing something from a `Whole` node first downgrades it,
//! materializing the surviving siblings by qualified name or method
//! signature, then drops the target.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

use crate::graph::DependencyGraph;
use crate::model::{SymbolId, SymbolKind, SymbolStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

#[derive(Error, Debug)]
pub enum SelectionError {
    /// A stored entry no longer resolves against the current sources.
    #[error("stale reference: {0}")]
    StaleReference(String),
    /// Identity matching found zero-or-many candidates where exactly one
    /// is required; the operation refuses to guess.
    #[error("ambiguous target: {0}")]
    AmbiguousTarget(String),
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
}

/// Whole carries no member list by construction; only Partial can name
/// children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inclusion {
    Whole,
    Partial(Vec<NodeId>),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExternalCoord {
    Maven { group: String, artifact: String, version: String },
    /// Archive paths the coordinate regex cannot parse still get grouped
    /// rather than dropped.
    Unclassified,
}

impl ExternalCoord {
    pub fn label(&self) -> String {
        match self {
            ExternalCoord::Maven { group, artifact, version } => {
                format!("{group}:{artifact}:{version}")
            }
            ExternalCoord::Unclassified => "unclassified".to_string(),
        }
    }
}

pub fn is_external_path(path: &str) -> bool {
    path.contains(".jar!/")
}

/// `.../repository/<group-as-dirs>/<artifact>/<version>/<name>.jar!/...`
pub fn parse_external_coord(path: &str) -> Option<ExternalCoord> {
    if !is_external_path(path) {
        return None;
    }
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r".*/repository/(.+)/([^/]+)/([^/]+)/[^/]+\.jar!/.*")
            .unwrap_or_else(|e| panic!("invalid coordinate regex: {e}"))
    });
    match re.captures(path) {
        Some(caps) => Some(ExternalCoord::Maven {
            group: caps[1].replace('/', "."),
            artifact: caps[2].to_string(),
            version: caps[3].to_string(),
        }),
        None => Some(ExternalCoord::Unclassified),
    }
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Project { name: String, children: Vec<NodeId> },
    Module { name: String, children: Vec<NodeId> },
    External { coord: ExternalCoord, children: Vec<NodeId> },
    Package { name: String, children: Vec<NodeId> },
    File { path: String, inclusion: Inclusion },
    Class { qualified_name: String, inclusion: Inclusion },
    Method { name: String, param_types: Vec<String> },
}

#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

impl Node {
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Project { children, .. }
            | NodeKind::Module { children, .. }
            | NodeKind::External { children, .. }
            | NodeKind::Package { children, .. } => children,
            NodeKind::File { inclusion, .. } | NodeKind::Class { inclusion, .. } => match inclusion {
                Inclusion::Partial(children) => children,
                Inclusion::Whole => &[],
            },
            NodeKind::Method { .. } => &[],
        }
    }

    /// Modules sort before externals; everything else sorts by display
    /// identity within its level.
    fn sort_key(&self) -> (u8, String) {
        match &self.kind {
            NodeKind::Project { name, .. } => (0, name.clone()),
            NodeKind::Module { name, .. } => (0, name.clone()),
            NodeKind::External { coord, .. } => (1, coord.label()),
            NodeKind::Package { name, .. } => (0, name.clone()),
            NodeKind::File { path, .. } => (0, path.clone()),
            NodeKind::Class { qualified_name, .. } => (0, qualified_name.clone()),
            NodeKind::Method { name, param_types } => {
                (0, format!("{name}({})", param_types.join(", ")))
            }
        }
    }
}

pub struct SelectionTree {
    nodes: BTreeMap<NodeId, Node>,
    next: u32,
    root: NodeId,
}

impl SelectionTree {
    pub fn new(project_name: &str) -> Self {
        let root = NodeId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            root,
            Node {
                id: root,
                parent: None,
                kind: NodeKind::Project { name: project_name.to_string(), children: vec![] },
            },
        );
        Self { nodes, next: 1, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn project_name(&self) -> &str {
        match &self.nodes[&self.root].kind {
            NodeKind::Project { name, .. } => name,
            _ => "",
        }
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, SelectionError> {
        self.nodes.get(&id).ok_or(SelectionError::UnknownNode(id))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[&self.root].children().is_empty()
    }

    // ── arena plumbing ────────────────────────────────────────────────

    fn alloc(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        self.nodes.insert(id, Node { id, parent: Some(parent), kind });
        self.attach(parent, id);
        id
    }

    fn children_mut(&mut self, id: NodeId) -> Option<&mut Vec<NodeId>> {
        match &mut self.nodes.get_mut(&id)?.kind {
            NodeKind::Project { children, .. }
            | NodeKind::Module { children, .. }
            | NodeKind::External { children, .. }
            | NodeKind::Package { children, .. } => Some(children),
            NodeKind::File { inclusion, .. } | NodeKind::Class { inclusion, .. } => {
                match inclusion {
                    Inclusion::Partial(children) => Some(children),
                    Inclusion::Whole => None,
                }
            }
            NodeKind::Method { .. } => None,
        }
    }

    /// Sorted insertion by display key.
    fn attach(&mut self, parent: NodeId, child: NodeId) {
        let key = self.nodes[&child].sort_key();
        let keys: Vec<(u8, String)> = {
            let Some(children) = self.children_mut(parent) else { return };
            children.clone()
        }
        .iter()
        .map(|c| self.nodes[c].sort_key())
        .collect();
        let pos = keys.partition_point(|k| *k <= key);
        if let Some(children) = self.children_mut(parent) {
            children.insert(pos, child);
        }
    }

    /// Drop a subtree from the arena and unlink it from its parent.
    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes.get(&id).and_then(|n| n.parent) {
            if let Some(children) = self.children_mut(parent) {
                children.retain(|c| *c != id);
            }
        }
        self.drop_subtree(id);
    }

    fn drop_subtree(&mut self, id: NodeId) {
        let children: Vec<NodeId> = self
            .nodes
            .get(&id)
            .map(|n| n.children().to_vec())
            .unwrap_or_default();
        for child in children {
            self.drop_subtree(child);
        }
        self.nodes.remove(&id);
    }

    /// Containers emptied by a removal disappear, up to (never including)
    /// the project root.
    fn gc_upwards(&mut self, mut id: NodeId) {
        loop {
            let Some(node) = self.nodes.get(&id) else { return };
            let Some(parent) = node.parent else { return };
            let empty = match &node.kind {
                NodeKind::Project { .. } => false,
                NodeKind::File { inclusion, .. } | NodeKind::Class { inclusion, .. } => {
                    matches!(inclusion, Inclusion::Partial(c) if c.is_empty())
                }
                _ => node.children().is_empty(),
            };
            if !empty {
                return;
            }
            self.detach(id);
            id = parent;
        }
    }

    // ── container resolution ──────────────────────────────────────────

    fn find_or_create_module(&mut self, name: &str) -> NodeId {
        let root = self.root;
        let existing = self.nodes[&root].children().iter().copied().find(|c| {
            matches!(&self.nodes[c].kind, NodeKind::Module { name: n, .. } if n == name)
        });
        existing.unwrap_or_else(|| {
            self.alloc(root, NodeKind::Module { name: name.to_string(), children: vec![] })
        })
    }

    fn find_or_create_external(&mut self, coord: ExternalCoord) -> NodeId {
        let root = self.root;
        let existing = self.nodes[&root].children().iter().copied().find(|c| {
            matches!(&self.nodes[c].kind, NodeKind::External { coord: c2, .. } if *c2 == coord)
        });
        existing.unwrap_or_else(|| self.alloc(root, NodeKind::External { coord, children: vec![] }))
    }

    fn find_or_create_package(&mut self, parent: NodeId, name: &str) -> NodeId {
        let existing = self.nodes[&parent].children().iter().copied().find(|c| {
            matches!(&self.nodes[c].kind, NodeKind::Package { name: n, .. } if n == name)
        });
        existing.unwrap_or_else(|| {
            self.alloc(parent, NodeKind::Package { name: name.to_string(), children: vec![] })
        })
    }

    /// Module name for project files: leading path segment when there is
    /// one, otherwise the project name.
    fn module_name_for(&self, path: &str) -> String {
        let mut parts = path.split('/');
        let first = parts.next().unwrap_or_default();
        if parts.next().is_some() && !first.is_empty() {
            first.to_string()
        } else {
            self.project_name().to_string()
        }
    }

    fn container_for_file(&mut self, store: &SymbolStore, file: SymbolId) -> NodeId {
        let f = store.file(file);
        let group = match parse_external_coord(&f.path) {
            Some(coord) => self.find_or_create_external(coord),
            None => {
                let module = self.module_name_for(&f.path);
                self.find_or_create_module(&module)
            }
        };
        let package = f.package.clone().unwrap_or_else(|| "(default)".to_string());
        self.find_or_create_package(group, &package)
    }

    pub fn find_file_node(&self, path: &str) -> Option<NodeId> {
        self.nodes.values().find_map(|n| match &n.kind {
            NodeKind::File { path: p, .. } if p == path => Some(n.id),
            _ => None,
        })
    }

    fn find_class_node(&self, file_node: NodeId, qualified_name: &str) -> Result<Option<NodeId>, SelectionError> {
        let matches: Vec<NodeId> = self.nodes[&file_node]
            .children()
            .iter()
            .copied()
            .filter(|c| {
                matches!(&self.nodes[c].kind,
                         NodeKind::Class { qualified_name: q, .. } if q == qualified_name)
            })
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0])),
            _ => Err(SelectionError::AmbiguousTarget(format!(
                "class {qualified_name} matches {} nodes",
                matches.len()
            ))),
        }
    }

    // ── add ───────────────────────────────────────────────────────────

    pub fn add_file(
        &mut self,
        store: &SymbolStore,
        file: SymbolId,
        whole: bool,
    ) -> Result<NodeId, SelectionError> {
        let path = store.file(file).path.clone();
        let package = self.container_for_file(store, file);
        if let Some(existing) = self.find_file_node(&path) {
            if whole {
                self.set_whole(existing);
            }
            return Ok(existing);
        }
        let inclusion = if whole { Inclusion::Whole } else { Inclusion::Partial(vec![]) };
        Ok(self.alloc(package, NodeKind::File { path, inclusion }))
    }

    /// Ensures the file is present (partial unless already whole). When
    /// the file is already whole the class is covered and the file node
    /// is returned unchanged.
    pub fn add_class(
        &mut self,
        store: &SymbolStore,
        class: SymbolId,
        whole: bool,
    ) -> Result<NodeId, SelectionError> {
        let file = store.file_of(class);
        let file_node = self.add_file(store, file, false)?;
        if self.is_whole(file_node) {
            return Ok(file_node);
        }
        let qualified = store.class(class).qualified_name.clone();
        if let Some(existing) = self.find_class_node(file_node, &qualified)? {
            if whole {
                self.set_whole(existing);
            }
            return Ok(existing);
        }
        let inclusion = if whole { Inclusion::Whole } else { Inclusion::Partial(vec![]) };
        Ok(self.alloc(file_node, NodeKind::Class { qualified_name: qualified, inclusion }))
    }

    /// Deduplicated by (name, ordered parameter types). A whole class or
    /// whole file already covers the method.
    pub fn add_method(&mut self, store: &SymbolStore, method: SymbolId) -> Result<NodeId, SelectionError> {
        let m = store.method(method);
        let (name, param_types) = (m.name.clone(), m.param_types.clone());
        let class_node = self.add_class(store, m.class, false)?;
        if self.is_whole(class_node) {
            return Ok(class_node);
        }
        let existing = self.nodes[&class_node].children().iter().copied().find(|c| {
            matches!(&self.nodes[c].kind,
                     NodeKind::Method { name: n, param_types: p } if *n == name && *p == param_types)
        });
        if let Some(existing) = existing {
            return Ok(existing);
        }
        Ok(self.alloc(class_node, NodeKind::Method { name, param_types }))
    }

    fn is_whole(&self, id: NodeId) -> bool {
        matches!(
            &self.nodes[&id].kind,
            NodeKind::File { inclusion: Inclusion::Whole, .. }
                | NodeKind::Class { inclusion: Inclusion::Whole, .. }
        )
    }

    /// Upgrade to whole, dropping any materialized children.
    fn set_whole(&mut self, id: NodeId) {
        let children: Vec<NodeId> = self.nodes[&id].children().to_vec();
        for child in children {
            self.drop_subtree(child);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            if let NodeKind::File { inclusion, .. } | NodeKind::Class { inclusion, .. } = &mut node.kind {
                *inclusion = Inclusion::Whole;
            }
        }
    }

    // ── remove (downgrade-then-remove) ────────────────────────────────

    pub fn remove_file(&mut self, path: &str) -> Result<(), SelectionError> {
        let Some(file_node) = self.find_file_node(path) else {
            return Ok(());
        };
        let parent = self.nodes[&file_node].parent;
        self.detach(file_node);
        if let Some(parent) = parent {
            self.gc_upwards(parent);
        }
        Ok(())
    }

    pub fn remove_class(&mut self, store: &SymbolStore, class: SymbolId) -> Result<(), SelectionError> {
        let file = store.file_of(class);
        let path = store.file(file).path.clone();
        let Some(file_node) = self.find_file_node(&path) else {
            return Ok(());
        };
        let target_q = store.class(class).qualified_name.clone();

        if self.is_whole(file_node) {
            let top_level = store.file(file).classes.clone();
            if !top_level.contains(&class) {
                return Err(SelectionError::AmbiguousTarget(format!(
                    "{target_q} is nested; removing it from a whole file would orphan its enclosing class"
                )));
            }
            // Downgrade: surviving top-level classes materialize whole.
            if let Some(node) = self.nodes.get_mut(&file_node) {
                if let NodeKind::File { inclusion, .. } = &mut node.kind {
                    *inclusion = Inclusion::Partial(vec![]);
                }
            }
            for sibling in top_level {
                let q = store.class(sibling).qualified_name.clone();
                if q != target_q {
                    self.alloc(file_node, NodeKind::Class { qualified_name: q, inclusion: Inclusion::Whole });
                }
            }
            self.gc_upwards(file_node);
            return Ok(());
        }

        if let Some(class_node) = self.find_class_node(file_node, &target_q)? {
            self.detach(class_node);
            self.gc_upwards(file_node);
        }
        Ok(())
    }

    pub fn remove_method(&mut self, store: &SymbolStore, method: SymbolId) -> Result<(), SelectionError> {
        let m = store.method(method);
        let class = m.class;
        let (name, param_types) = (m.name.clone(), m.param_types.clone());
        let file = store.file_of(method);
        let path = store.file(file).path.clone();
        let Some(file_node) = self.find_file_node(&path) else {
            return Ok(());
        };
        let class_q = store.class(class).qualified_name.clone();

        // Whole file: downgrade the file first, then fall through to the
        // (now materialized) class.
        if self.is_whole(file_node) {
            let top_level = store.file(file).classes.clone();
            let owner = top_level.iter().copied().find(|c| *c == class);
            if owner.is_none() {
                return Err(SelectionError::AmbiguousTarget(format!(
                    "{class_q}#{name} lives in a nested class; downgrade the file explicitly first"
                )));
            }
            if let Some(node) = self.nodes.get_mut(&file_node) {
                if let NodeKind::File { inclusion, .. } = &mut node.kind {
                    *inclusion = Inclusion::Partial(vec![]);
                }
            }
            for sibling in top_level {
                let q = store.class(sibling).qualified_name.clone();
                let inclusion = if sibling == class {
                    Inclusion::Partial(vec![])
                } else {
                    Inclusion::Whole
                };
                self.alloc(file_node, NodeKind::Class { qualified_name: q, inclusion });
            }
            // The target's class starts partial-empty; materialize its
            // surviving methods below.
            let class_node = self
                .find_class_node(file_node, &class_q)?
                .ok_or_else(|| SelectionError::AmbiguousTarget(class_q.clone()))?;
            self.materialize_surviving_methods(store, class_node, class, &name, &param_types)?;
            self.gc_upwards(class_node);
            return Ok(());
        }

        let Some(class_node) = self.find_class_node(file_node, &class_q)? else {
            return Ok(());
        };

        if self.is_whole(class_node) {
            if let Some(node) = self.nodes.get_mut(&class_node) {
                if let NodeKind::Class { inclusion, .. } = &mut node.kind {
                    *inclusion = Inclusion::Partial(vec![]);
                }
            }
            self.materialize_surviving_methods(store, class_node, class, &name, &param_types)?;
            self.gc_upwards(class_node);
            return Ok(());
        }

        let matches: Vec<NodeId> = self.nodes[&class_node]
            .children()
            .iter()
            .copied()
            .filter(|c| {
                matches!(&self.nodes[c].kind,
                         NodeKind::Method { name: n, param_types: p } if *n == name && *p == param_types)
            })
            .collect();
        if matches.len() > 1 {
            return Err(SelectionError::AmbiguousTarget(format!(
                "{class_q}#{name}({}) matches {} nodes",
                param_types.join(", "),
                matches.len()
            )));
        }
        if let Some(method_node) = matches.first() {
            self.detach(*method_node);
            self.gc_upwards(class_node);
        }
        Ok(())
    }

    /// Every method of the class except the removal target, matched by
    /// signature. Zero or multiple signature matches refuse the guess.
    fn materialize_surviving_methods(
        &mut self,
        store: &SymbolStore,
        class_node: NodeId,
        class: SymbolId,
        target_name: &str,
        target_params: &[String],
    ) -> Result<(), SelectionError> {
        let methods = store.class(class).methods.clone();
        let hits = methods
            .iter()
            .filter(|id| {
                let m = store.method(**id);
                m.name == target_name && m.param_types == target_params
            })
            .count();
        if hits != 1 {
            return Err(SelectionError::AmbiguousTarget(format!(
                "{target_name}({}) matches {hits} methods",
                target_params.join(", ")
            )));
        }
        for id in methods {
            let m = store.method(id);
            if m.name == target_name && m.param_types == target_params {
                continue;
            }
            self.alloc(
                class_node,
                NodeKind::Method { name: m.name.clone(), param_types: m.param_types.clone() },
            );
        }
        Ok(())
    }

    // ── build from an extraction ──────────────────────────────────────

    /// Ingest a dependency walk: a visited class becomes whole when every
    /// one of its non-constructor methods was visited, otherwise only the
    /// visited methods are added.
    pub fn absorb_graph(&mut self, store: &SymbolStore, graph: &DependencyGraph) -> Result<(), SelectionError> {
        for class in &graph.visited_classes {
            let methods = store.class(*class).methods.clone();
            let all_used = methods
                .iter()
                .filter(|m| !store.method(**m).is_constructor)
                .all(|m| graph.visited_symbols.contains(m));
            if all_used && !methods.is_empty() {
                self.add_class(store, *class, true)?;
                continue;
            }
            for m in methods {
                if graph.visited_symbols.contains(&m) {
                    self.add_method(store, m)?;
                }
            }
        }
        // Whole symbols with no methods at all (marker classes) still
        // deserve their class entry.
        for symbol in &graph.visited_symbols {
            if store.kind(*symbol) == SymbolKind::Class && store.class(*symbol).methods.is_empty() {
                self.add_class(store, *symbol, true)?;
            }
        }
        Ok(())
    }

    // ── iteration for rendering/persistence ───────────────────────────

    /// File nodes in stable render order: modules (sorted) before
    /// externals (sorted), packages and files lexicographic inside.
    pub fn files_in_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for group in self.nodes[&self.root].children() {
            for package in self.nodes[group].children() {
                out.extend(self.nodes[package].children().iter().copied());
            }
        }
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────
