//! Session persistence.
//!
//! The selection tree serializes to a plain tree of strings and booleans,
//! no symbol handles. Whole files persist with no class list; whole
//! classes persist with every method materialized. Rehydration accepts
//! both transit forms and re-resolves each entry against a freshly
//! indexed symbol model; entries that no longer resolve are reported as
//! stale and their subtree dropped, never silently and never fatally.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::debug_log;
use crate::model::{SymbolId, SymbolStore};
use crate::tree::{
    ExternalCoord, Inclusion, NodeId, NodeKind, SelectionError, SelectionTree,
};

// ─────────────────────────────────────────────────────────────────────────
// Wire shape
// ─────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializableSelection {
    pub project_name: String,
    #[serde(default)]
    pub modules: Vec<SerializableModule>,
    #[serde(default)]
    pub external_dependencies: Vec<SerializableExternal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializableModule {
    pub module_name: String,
    #[serde(default)]
    pub packages: Vec<SerializablePackage>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializableExternal {
    /// Empty strings mean the unclassified bucket.
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub artifact: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub packages: Vec<SerializablePackage>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializablePackage {
    pub package_name: String,
    #[serde(default)]
    pub files: Vec<SerializableFile>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializableFile {
    pub file_path: String,
    pub whole: bool,
    #[serde(default)]
    pub classes: Vec<SerializableClass>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializableClass {
    pub class_name: String,
    pub whole: bool,
    #[serde(default)]
    pub methods: Vec<SerializableMethod>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializableMethod {
    pub method_name: String,
    #[serde(default)]
    pub parameter_types: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────
// Tree → wire
// ─────────────────────────────────────────────────────────────────────────

pub fn to_serializable(tree: &SelectionTree, store: &SymbolStore) -> Result<SerializableSelection> {
    let mut modules = Vec::new();
    let mut externals = Vec::new();
    let root = tree.node(tree.root())?;
    for group_id in root.children() {
        let group = tree.node(*group_id)?;
        match &group.kind {
            NodeKind::Module { name, .. } => modules.push(SerializableModule {
                module_name: name.clone(),
                packages: serialize_packages(tree, store, *group_id)?,
            }),
            NodeKind::External { coord, .. } => {
                let (group_s, artifact, version) = match coord {
                    ExternalCoord::Maven { group, artifact, version } => {
                        (group.clone(), artifact.clone(), version.clone())
                    }
                    ExternalCoord::Unclassified => (String::new(), String::new(), String::new()),
                };
                externals.push(SerializableExternal {
                    group: group_s,
                    artifact,
                    version,
                    packages: serialize_packages(tree, store, *group_id)?,
                });
            }
            _ => {}
        }
    }
    Ok(SerializableSelection {
        project_name: tree.project_name().to_string(),
        modules,
        external_dependencies: externals,
    })
}

fn serialize_packages(
    tree: &SelectionTree,
    store: &SymbolStore,
    group: NodeId,
) -> Result<Vec<SerializablePackage>> {
    let mut out = Vec::new();
    for package_id in tree.node(group)?.children() {
        let package = tree.node(*package_id)?;
        let NodeKind::Package { name, .. } = &package.kind else { continue };
        let mut files = Vec::new();
        for file_id in package.children() {
            files.push(serialize_file(tree, store, *file_id)?);
        }
        out.push(SerializablePackage { package_name: name.clone(), files });
    }
    Ok(out)
}

fn serialize_file(tree: &SelectionTree, store: &SymbolStore, file_id: NodeId) -> Result<SerializableFile> {
    let node = tree.node(file_id)?;
    let NodeKind::File { path, inclusion } = &node.kind else {
        anyhow::bail!("expected file node");
    };
    match inclusion {
        // Whole files persist unmaterialized.
        Inclusion::Whole => Ok(SerializableFile { file_path: path.clone(), whole: true, classes: vec![] }),
        Inclusion::Partial(children) => {
            let file_sym = store.find_file(path);
            let mut classes = Vec::new();
            for class_id in children {
                let class_node = tree.node(*class_id)?;
                let NodeKind::Class { qualified_name, inclusion } = &class_node.kind else {
                    continue;
                };
                let methods = match inclusion {
                    // Whole classes persist with every method materialized,
                    // when the symbol model can still supply them.
                    Inclusion::Whole => materialize_methods(store, file_sym, qualified_name),
                    Inclusion::Partial(method_ids) => {
                        let mut out = Vec::new();
                        for m in method_ids {
                            if let NodeKind::Method { name, param_types } = &tree.node(*m)?.kind {
                                out.push(SerializableMethod {
                                    method_name: name.clone(),
                                    parameter_types: param_types.clone(),
                                });
                            }
                        }
                        out
                    }
                };
                classes.push(SerializableClass {
                    class_name: qualified_name.clone(),
                    whole: matches!(inclusion, Inclusion::Whole),
                    methods,
                });
            }
            Ok(SerializableFile { file_path: path.clone(), whole: false, classes })
        }
    }
}

fn materialize_methods(
    store: &SymbolStore,
    file_sym: Option<SymbolId>,
    qualified_name: &str,
) -> Vec<SerializableMethod> {
    let Some(file) = file_sym else { return vec![] };
    let Some(class) = store.find_class(file, qualified_name) else { return vec![] };
    store
        .class(class)
        .methods
        .iter()
        .map(|m| {
            let m = store.method(*m);
            SerializableMethod { method_name: m.name.clone(), parameter_types: m.param_types.clone() }
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────
// Wire → tree
// ─────────────────────────────────────────────────────────────────────────

/// Rebuild a live tree by re-resolving every stored entry. Stale entries
/// are collected and their subtrees dropped; everything else survives.
pub fn rehydrate(
    ser: &SerializableSelection,
    store: &SymbolStore,
) -> Result<(SelectionTree, Vec<SelectionError>), SelectionError> {
    let mut tree = SelectionTree::new(&ser.project_name);
    let mut stale = Vec::new();

    let packages = ser
        .modules
        .iter()
        .flat_map(|m| m.packages.iter())
        .chain(ser.external_dependencies.iter().flat_map(|e| e.packages.iter()));

    for package in packages {
        for file in &package.files {
            rehydrate_file(&mut tree, store, file, &mut stale)?;
        }
    }
    Ok((tree, stale))
}

fn rehydrate_file(
    tree: &mut SelectionTree,
    store: &SymbolStore,
    file: &SerializableFile,
    stale: &mut Vec<SelectionError>,
) -> Result<(), SelectionError> {
    let Some(file_sym) = store.find_file(&file.file_path) else {
        stale.push(SelectionError::StaleReference(format!("file {}", file.file_path)));
        return Ok(());
    };
    if file.whole {
        tree.add_file(store, file_sym, true)?;
        return Ok(());
    }
    for class in &file.classes {
        let Some(class_sym) = store.find_class(file_sym, &class.class_name) else {
            stale.push(SelectionError::StaleReference(format!(
                "class {} in {}",
                class.class_name, file.file_path
            )));
            continue;
        };
        if class.whole {
            // Both transit forms arrive here: an empty method list and a
            // fully materialized one mean the same thing.
            tree.add_class(store, class_sym, true)?;
            continue;
        }
        tree.add_class(store, class_sym, false)?;
        for method in &class.methods {
            let Some(method_sym) =
                store.find_method(class_sym, &method.method_name, &method.parameter_types)
            else {
                stale.push(SelectionError::StaleReference(format!(
                    "method {}#{}({})",
                    class.class_name,
                    method.method_name,
                    method.parameter_types.join(", ")
                )));
                continue;
            };
            tree.add_method(store, method_sym)?;
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────
// Disk
// ─────────────────────────────────────────────────────────────────────────

pub fn save_session(path: &Path, ser: &SerializableSelection) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(ser)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    debug_log!("session saved to {}", path.display());
    Ok(())
}

pub fn load_session(path: &Path) -> Result<SerializableSelection> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

// ─────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────
