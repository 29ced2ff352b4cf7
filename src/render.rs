//! Selection → prompt text.
//!
//! Walks the selection tree in its stable order (modules before external
//! dependencies, lexicographic within each level) and emits one fenced
//! block per included file. Whole files emit their full text; partial
//! files re-run the dependency walk from the selected symbols and emit
//! the minimized slice. Fences are sized to beat any backtick run
//! already present in the content.

use anyhow::{Context, Result};
use std::collections::BTreeSet;

use crate::classify::Classifier;
use crate::graph::{DependencyGraph, Explorer};
use crate::model::{SymbolId, SymbolStore};
use crate::slicer;
use crate::tree::{Inclusion, NodeId, NodeKind, SelectionTree};

/// Fence length: one longer than the longest backtick run anywhere in the
/// body (indented and mid-line runs can still close a fence), never
/// shorter than three.
pub fn fence_len(body: &str) -> usize {
    let mut longest = 0usize;
    let mut run = 0usize;
    for b in body.bytes() {
        if b == b'`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    (longest + 1).max(3)
}

pub fn render(
    tree: &SelectionTree,
    store: &SymbolStore,
    classifier: &Classifier,
    max_depth: usize,
) -> Result<String> {
    let mut out = String::new();
    for file_node in tree.files_in_order() {
        let node = tree.node(file_node)?;
        let NodeKind::File { path, inclusion } = &node.kind else { continue };
        let file = store
            .find_file(path)
            .with_context(|| format!("selected file {path} is not in the symbol model"))?;

        let body = match inclusion {
            Inclusion::Whole => store.file(file).source.clone(),
            Inclusion::Partial(_) => {
                let keep = keep_set(tree, store, classifier, max_depth, file_node, file)?;
                slicer::slice(store, file, &keep)?
            }
        };

        let fence = "`".repeat(fence_len(&body));
        out.push_str(path);
        out.push('\n');
        out.push_str(&fence);
        out.push('\n');
        out.push_str(&body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&fence);
        out.push_str("\n\n");
    }
    Ok(out)
}

/// Re-derive the kept symbols for one partially included file: seed the
/// walk with every selected method (all methods for a whole class),
/// bounded to this file, and keep everything the walk visits. A whole
/// class additionally keeps its fields and nested classes outright.
fn keep_set(
    tree: &SelectionTree,
    store: &SymbolStore,
    classifier: &Classifier,
    max_depth: usize,
    file_node: NodeId,
    file: SymbolId,
) -> Result<BTreeSet<SymbolId>> {
    let explorer = Explorer::new(store, classifier).with_depth_budget(max_depth);
    let mut graph = DependencyGraph::default();
    let mut keep: BTreeSet<SymbolId> = BTreeSet::new();

    for class_node in tree.node(file_node)?.children() {
        let class_kind = &tree.node(*class_node)?.kind;
        let NodeKind::Class { qualified_name, inclusion } = class_kind else { continue };
        let class = store
            .find_class(file, qualified_name)
            .with_context(|| format!("selected class {qualified_name} is not in the symbol model"))?;
        keep.insert(class);

        match inclusion {
            Inclusion::Whole => {
                keep_class_outright(store, class, &mut keep);
                for method in &store.class(class).methods {
                    explorer.explore(*method, &mut graph, file);
                }
            }
            Inclusion::Partial(methods) => {
                for method_node in methods {
                    let NodeKind::Method { name, param_types } = &tree.node(*method_node)?.kind
                    else {
                        continue;
                    };
                    let method = store
                        .find_method(class, name, param_types)
                        .with_context(|| {
                            format!("selected method {qualified_name}#{name} is not in the symbol model")
                        })?;
                    explorer.explore(method, &mut graph, file);
                }
            }
        }
    }

    keep.extend(graph.visited_symbols.iter().copied());
    keep.extend(graph.visited_classes.iter().copied());
    Ok(keep)
}

fn keep_class_outright(store: &SymbolStore, class: SymbolId, keep: &mut BTreeSet<SymbolId>) {
    let c = store.class(class);
    keep.extend(c.fields.iter().copied());
    keep.extend(c.methods.iter().copied());
    for nested in &c.nested {
        keep.insert(*nested);
        keep_class_outright(store, *nested, keep);
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::index_source;
    use crate::graph::DEFAULT_DEPTH_BUDGET;

    const SRC: &str = r#"package com.app;

public class Greeter {
    public String greet() { return helper(); }

    private String helper() { return "hi"; }

    public void unused() {}
}
"#;

    fn setup() -> (SymbolStore, SymbolId) {
        let mut store = SymbolStore::default();
        let file = index_source(&mut store, "app/com/app/Greeter.java", SRC.into()).unwrap();
        (store, file)
    }

    // ── fences ────────────────────────────────────────────────────────

    #[test]
    fn fence_is_at_least_three_and_beats_content_runs() {
        assert_eq!(fence_len("plain text"), 3);
        assert_eq!(fence_len("``` nested fence"), 4);
        assert_eq!(fence_len("`````"), 6);
        // Indented and mid-line runs can still terminate a fence.
        assert_eq!(fence_len("  ```"), 4);
        assert_eq!(fence_len("String s = \"````\";"), 5);
    }

    #[test]
    fn rendered_file_is_wrapped_and_headed_by_its_path() {
        let (store, file) = setup();
        let mut tree = SelectionTree::new("app");
        tree.add_file(&store, file, true).unwrap();
        let out = render(&tree, &store, &Classifier::default(), DEFAULT_DEPTH_BUDGET).unwrap();
        assert!(out.starts_with("app/com/app/Greeter.java\n```\n"));
        assert!(out.contains("public void unused()"));
        assert!(out.trim_end().ends_with("```"));
    }

    // ── whole vs partial ──────────────────────────────────────────────

    #[test]
    fn partial_file_renders_the_walked_slice() {
        let (store, file) = setup();
        let greeter = store.find_class(file, "Greeter").unwrap();
        let greet = store.find_method(greeter, "greet", &[]).unwrap();
        let mut tree = SelectionTree::new("app");
        tree.add_method(&store, greet).unwrap();
        let out = render(&tree, &store, &Classifier::default(), DEFAULT_DEPTH_BUDGET).unwrap();
        // greet() pulls helper() through the walk; unused() stays out.
        assert!(out.contains("public String greet()"));
        assert!(out.contains("private String helper()"));
        assert!(!out.contains("unused"));
    }

    #[test]
    fn whole_class_renders_every_member() {
        let (store, file) = setup();
        let greeter = store.find_class(file, "Greeter").unwrap();
        let mut tree = SelectionTree::new("app");
        tree.add_class(&store, greeter, true).unwrap();
        let out = render(&tree, &store, &Classifier::default(), DEFAULT_DEPTH_BUDGET).unwrap();
        assert!(out.contains("greet"));
        assert!(out.contains("helper"));
        assert!(out.contains("unused"));
    }

    #[test]
    fn files_render_in_stable_order() {
        let mut store = SymbolStore::default();
        let b = index_source(&mut store, "app/com/app/B.java", "package com.app;\nclass B {}\n".into()).unwrap();
        let a = index_source(&mut store, "app/com/app/A.java", "package com.app;\nclass A {}\n".into()).unwrap();
        let mut tree = SelectionTree::new("app");
        tree.add_file(&store, b, true).unwrap();
        tree.add_file(&store, a, true).unwrap();
        let out = render(&tree, &store, &Classifier::default(), DEFAULT_DEPTH_BUDGET).unwrap();
        let a_pos = out.find("A.java").unwrap();
        let b_pos = out.find("B.java").unwrap();
        assert!(a_pos < b_pos);
    }
}
