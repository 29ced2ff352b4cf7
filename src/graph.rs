//! Transitive dependency discovery.
//!
//! One polymorphic visitor walks references out of a root symbol, bounded
//! to a single file for expansion: cross-file targets are recorded as
//! edges but never entered. Alongside the graph it builds a per-root call
//! tree whose nodes carry infrastructure flags; subtrees that never touch
//! infrastructure are pruned so the tree shows only the calls worth
//! telling the model about.

use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashSet;

use crate::classify::{CallCategory, Classifier};
use crate::debug_log;
use crate::model::{Resolver, Span, SymbolId, SymbolKind};

pub const DEFAULT_DEPTH_BUDGET: usize = 512;

// ─────────────────────────────────────────────────────────────────────────
// Graph
// ─────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: SymbolId,
    pub to: SymbolId,
    /// First use site that produced this edge.
    pub site: Span,
}

/// Accumulated state of one extraction. Re-running the same roots against
/// the same store is a no-op thanks to the visited sets.
#[derive(Default)]
pub struct DependencyGraph {
    pub visited_symbols: BTreeSet<SymbolId>,
    pub visited_files: BTreeSet<SymbolId>,
    pub visited_classes: BTreeSet<SymbolId>,
    pub edges_out: BTreeMap<SymbolId, Vec<Edge>>,
    pub edges_in: BTreeMap<SymbolId, Vec<Edge>>,
}

impl DependencyGraph {
    /// Returns false when the symbol was already visited.
    fn mark_visited<R: Resolver>(&mut self, resolver: &R, id: SymbolId) -> bool {
        if !self.visited_symbols.insert(id) {
            return false;
        }
        self.visited_files.insert(resolver.owning_file(id));
        if let Some(class) = resolver.owning_class(id) {
            self.visited_classes.insert(class);
        }
        true
    }

    /// One logical edge per (from, to); later sites are dropped.
    fn record_edge(&mut self, from: SymbolId, to: SymbolId, site: Span) {
        let out = self.edges_out.entry(from).or_default();
        if out.iter().any(|e| e.to == to) {
            return;
        }
        let edge = Edge { from, to, site };
        out.push(edge);
        self.edges_in.entry(to).or_default().push(edge);
    }

    pub fn edge_count(&self) -> usize {
        self.edges_out.values().map(Vec::len).sum()
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Call tree
// ─────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CallFlags {
    pub rpc: bool,
    pub persistence: bool,
    pub queue: bool,
    pub cache: bool,
    pub template: bool,
    pub log: bool,
}

impl CallFlags {
    pub fn set(&mut self, category: CallCategory) {
        match category {
            CallCategory::Rpc => self.rpc = true,
            CallCategory::Persistence => self.persistence = true,
            CallCategory::Queue => self.queue = true,
            CallCategory::Cache => self.cache = true,
            CallCategory::Template => self.template = true,
            CallCategory::Log => self.log = true,
        }
    }

    pub fn merge(&mut self, other: CallFlags) {
        self.rpc |= other.rpc;
        self.persistence |= other.persistence;
        self.queue |= other.queue;
        self.cache |= other.cache;
        self.template |= other.template;
        self.log |= other.log;
    }

    pub fn any(&self) -> bool {
        self.rpc || self.persistence || self.queue || self.cache || self.template || self.log
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CallNode {
    pub symbol: SymbolId,
    pub name: String,
    /// Infrastructure this symbol's own body touches.
    pub flags: CallFlags,
    /// OR over everything below it.
    pub child_flags: CallFlags,
    pub children: Vec<CallNode>,
}

impl CallNode {
    fn new(symbol: SymbolId, name: String) -> Self {
        Self { symbol, name, flags: CallFlags::default(), child_flags: CallFlags::default(), children: vec![] }
    }

    pub fn has_any_flag(&self) -> bool {
        self.flags.any() || self.child_flags.any()
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Explorer
// ─────────────────────────────────────────────────────────────────────────

pub struct Explorer<'a, R: Resolver> {
    resolver: &'a R,
    classifier: &'a Classifier,
    max_depth: usize,
}

impl<'a, R: Resolver> Explorer<'a, R> {
    pub fn new(resolver: &'a R, classifier: &'a Classifier) -> Self {
        Self { resolver, classifier, max_depth: DEFAULT_DEPTH_BUDGET }
    }

    pub fn with_depth_budget(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Walk everything reachable from `root`, expanding only symbols that
    /// live in `boundary_file`. Returns the root's call tree; the root
    /// node itself is kept even when nothing below it touches
    /// infrastructure.
    pub fn explore(
        &self,
        root: SymbolId,
        graph: &mut DependencyGraph,
        boundary_file: SymbolId,
    ) -> CallNode {
        let mut node = CallNode::new(root, self.resolver.display_of(root));
        self.visit(root, graph, &mut node, boundary_file, 0);
        node
    }

    fn visit(
        &self,
        symbol: SymbolId,
        graph: &mut DependencyGraph,
        node: &mut CallNode,
        boundary_file: SymbolId,
        depth: usize,
    ) {
        if depth > self.max_depth {
            debug_log!("depth budget exhausted at {}", self.resolver.display_of(symbol));
            return;
        }
        if !graph.mark_visited(self.resolver, symbol) {
            return;
        }

        // Class members are explored into the class's own node: a class
        // "touches" whatever its members touch.
        if self.resolver.kind_of(symbol) == SymbolKind::Class {
            for member in self.resolver.members_of(symbol) {
                self.visit(member, graph, node, boundary_file, depth + 1);
            }
        }

        let mut classified_calls: HashSet<Span> = HashSet::new();
        for reference in self.resolver.references_in(symbol) {
            // Classification is independent of resolution: the calls that
            // matter most are exactly the ones whose targets have no
            // source here.
            if let Some(call_span) = reference.call_span {
                if classified_calls.insert(call_span) {
                    if let Some(field) = self.resolver.receiver_field(&reference) {
                        let declared = self.resolver.declared_type(field).unwrap_or_default();
                        let annotations = self.resolver.annotations_of(field);
                        if let Some(category) = self.classifier.classify(&declared, &annotations) {
                            node.flags.set(category);
                        }
                    }
                }
            }

            let Some(target) = self.resolver.resolve(&reference) else {
                continue;
            };
            if target == symbol {
                // Direct recursion: keep the edge for the reverse index,
                // skip only the re-expansion.
                graph.record_edge(symbol, target, reference.site);
                continue;
            }
            let eligible = match self.resolver.kind_of(target) {
                SymbolKind::Method | SymbolKind::Field => true,
                SymbolKind::Class => self.resolver.is_data_only_class(target),
                SymbolKind::File => false,
            };
            if !eligible {
                continue;
            }

            graph.record_edge(symbol, target, reference.site);

            if self.resolver.owning_file(target) != boundary_file {
                continue;
            }
            if graph.visited_symbols.contains(&target) {
                continue;
            }
            let mut child = CallNode::new(target, self.resolver.display_of(target));
            self.visit(target, graph, &mut child, boundary_file, depth + 1);
            node.child_flags.merge(child.flags);
            node.child_flags.merge(child.child_flags);
            if child.has_any_flag() {
                node.children.push(child);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::index_source;
    use crate::model::SymbolStore;

    const SHOP_JAVA: &str = r#"package com.shop;

import org.apache.dubbo.config.annotation.DubboReference;
import com.shop.remote.InventoryClient;

public class OrderService {
    @DubboReference
    private InventoryClient inventoryClient;

    private PricingEngine pricing;

    public void place(Order order) {
        int total = pricing.total(order);
        order.setAmount(total);
        inventoryClient.reserve(order);
    }

    public void housekeeping() {
        pricing.recalibrate();
    }
}

class PricingEngine {
    int total(Order order) {
        return order.getAmount() * 2;
    }

    void recalibrate() {}
}

class Order {
    private int amount;

    public int getAmount() { return amount; }

    public void setAmount(int amount) { this.amount = amount; }
}
"#;

    fn setup() -> (SymbolStore, SymbolId, SymbolId) {
        let mut store = SymbolStore::default();
        let file = index_source(&mut store, "com/shop/OrderService.java", SHOP_JAVA.into()).unwrap();
        let service = store.find_class(file, "OrderService").unwrap();
        let place = store.find_method(service, "place", &["Order".to_string()]).unwrap();
        (store, file, place)
    }

    // ── flags & pruning ───────────────────────────────────────────────

    #[test]
    fn rpc_call_sets_own_flag_on_the_calling_node() {
        let (store, file, place) = setup();
        let classifier = Classifier::default();
        let explorer = Explorer::new(&store, &classifier);
        let mut graph = DependencyGraph::default();
        let tree = explorer.explore(place, &mut graph, file);
        assert!(tree.flags.rpc);
        assert!(!tree.flags.persistence);
    }

    #[test]
    fn flagless_subtrees_are_pruned_but_the_root_survives() {
        let (store, file, _) = setup();
        let service = store.find_class(file, "OrderService").unwrap();
        let housekeeping = store.find_method(service, "housekeeping", &[]).unwrap();
        let classifier = Classifier::default();
        let explorer = Explorer::new(&store, &classifier);
        let mut graph = DependencyGraph::default();
        // recalibrate() touches nothing: no children survive, root stays.
        let tree = explorer.explore(housekeeping, &mut graph, file);
        assert!(!tree.has_any_flag());
        assert!(tree.children.is_empty());
        // But the walk still happened.
        let recalibrate = store
            .find_method(store.find_class(file, "PricingEngine").unwrap(), "recalibrate", &[])
            .unwrap();
        assert!(graph.visited_symbols.contains(&recalibrate));
    }

    #[test]
    fn child_flags_propagate_up_a_three_level_chain() {
        let mut store = SymbolStore::default();
        let src = r#"package p;

import org.slf4j.Logger;
import org.slf4j.LoggerFactory;

class A {
    B b = new B();
    void a() { b.callB(); }
}
class B {
    C c = new C();
    void callB() { c.callC(); }
}
class C {
    private static final Logger log = LoggerFactory.getLogger(C.class);
    void callC() { log.info("hi"); }
}
"#;
        let file = index_source(&mut store, "p/A.java", src.into()).unwrap();
        let a = store.find_class(file, "A").unwrap();
        let a_method = store.find_method(a, "a", &[]).unwrap();
        let classifier = Classifier::default();
        let explorer = Explorer::new(&store, &classifier);
        let mut graph = DependencyGraph::default();
        let tree = explorer.explore(a_method, &mut graph, file);

        assert!(tree.child_flags.log);
        assert!(!tree.flags.log);
        // callB survives pruning because callC below it logs.
        let call_b = tree.children.iter().find(|c| c.name.contains("callB")).unwrap();
        assert!(call_b.child_flags.log);
        let call_c = call_b.children.iter().find(|c| c.name.contains("callC")).unwrap();
        assert!(call_c.flags.log);
    }

    // ── traversal properties ──────────────────────────────────────────

    #[test]
    fn traversal_is_idempotent() {
        let (store, file, place) = setup();
        let classifier = Classifier::default();
        let explorer = Explorer::new(&store, &classifier);

        let mut g1 = DependencyGraph::default();
        explorer.explore(place, &mut g1, file);
        let mut g2 = DependencyGraph::default();
        explorer.explore(place, &mut g2, file);
        assert_eq!(g1.visited_symbols, g2.visited_symbols);
        assert_eq!(g1.edge_count(), g2.edge_count());

        // Re-exploring into the same graph changes nothing.
        let before = (g1.visited_symbols.clone(), g1.edge_count());
        explorer.explore(place, &mut g1, file);
        assert_eq!(before, (g1.visited_symbols.clone(), g1.edge_count()));
    }

    #[test]
    fn cycles_terminate_with_single_visitation() {
        let mut store = SymbolStore::default();
        let src = r#"
class A {
    B b;
    void ping() { b.pong(); }
}
class B {
    A a;
    void pong() { a.ping(); }
}
"#;
        let file = index_source(&mut store, "A.java", src.into()).unwrap();
        let a = store.find_class(file, "A").unwrap();
        let ping = store.find_method(a, "ping", &[]).unwrap();
        let classifier = Classifier::default();
        let explorer = Explorer::new(&store, &classifier);
        let mut graph = DependencyGraph::default();
        explorer.explore(ping, &mut graph, file);
        let pong = store.find_method(store.find_class(file, "B").unwrap(), "pong", &[]).unwrap();
        assert!(graph.visited_symbols.contains(&ping));
        assert!(graph.visited_symbols.contains(&pong));
        // Exactly one logical edge each way.
        assert_eq!(graph.edges_out.get(&ping).map(Vec::len), Some(1));
        assert_eq!(graph.edges_out.get(&pong).map(Vec::len), Some(1));
    }

    #[test]
    fn data_only_classes_are_entered_and_expanded() {
        let (store, file, place) = setup();
        let classifier = Classifier::default();
        let explorer = Explorer::new(&store, &classifier);
        let mut graph = DependencyGraph::default();
        explorer.explore(place, &mut graph, file);

        let order = store.find_class(file, "Order").unwrap();
        assert!(store.is_data_only_class(order));
        assert!(graph.visited_classes.contains(&order));
        // Its getter was reached through PricingEngine.total.
        let get_amount = store.find_method(order, "getAmount", &[]).unwrap();
        assert!(graph.visited_symbols.contains(&get_amount));
    }

    #[test]
    fn cross_file_targets_get_edges_but_no_expansion() {
        let mut store = SymbolStore::default();
        let remote = r#"package com.shop.remote;

public class InventoryClient {
    public void reserve(Object order) {}
    public void cancel(Object order) {}
}
"#;
        let remote_file =
            index_source(&mut store, "com/shop/remote/InventoryClient.java", remote.into()).unwrap();
        let file = index_source(&mut store, "com/shop/OrderService.java", SHOP_JAVA.into()).unwrap();
        let service = store.find_class(file, "OrderService").unwrap();
        let place = store.find_method(service, "place", &["Order".to_string()]).unwrap();

        let classifier = Classifier::default();
        let explorer = Explorer::new(&store, &classifier);
        let mut graph = DependencyGraph::default();
        explorer.explore(place, &mut graph, file);

        let client = store.find_class(remote_file, "InventoryClient").unwrap();
        let reserve = store
            .find_method(client, "reserve", &["Object".to_string()])
            .unwrap();
        let edges = graph.edges_out.get(&place).cloned().unwrap_or_default();
        assert!(edges.iter().any(|e| e.to == reserve));
        // Recorded but never entered: stays out of the visited set.
        assert!(!graph.visited_symbols.contains(&reserve));
        assert!(!graph.visited_files.contains(&remote_file));
    }

    #[test]
    fn self_recursive_methods_record_their_own_edge() {
        let mut store = SymbolStore::default();
        let src = r#"
class Math {
    int fact(int n) {
        if (n <= 1) return 1;
        return n * fact(n - 1);
    }
}
"#;
        let file = index_source(&mut store, "Math.java", src.into()).unwrap();
        let math = store.find_class(file, "Math").unwrap();
        let fact = store.find_method(math, "fact", &["int".to_string()]).unwrap();
        let classifier = Classifier::default();
        let explorer = Explorer::new(&store, &classifier);
        let mut graph = DependencyGraph::default();
        explorer.explore(fact, &mut graph, file);

        let out = graph.edges_out.get(&fact).cloned().unwrap_or_default();
        assert!(out.iter().any(|e| e.to == fact));
        let inbound = graph.edges_in.get(&fact).cloned().unwrap_or_default();
        assert!(inbound.iter().any(|e| e.from == fact));
        // Still visited exactly once.
        assert!(graph.visited_symbols.contains(&fact));
    }

    #[test]
    fn depth_budget_stops_runaway_expansion() {
        let (store, file, place) = setup();
        let classifier = Classifier::default();
        let explorer = Explorer::new(&store, &classifier).with_depth_budget(0);
        let mut graph = DependencyGraph::default();
        explorer.explore(place, &mut graph, file);
        // Root visited, nothing expanded below it.
        assert!(graph.visited_symbols.contains(&place));
        assert_eq!(graph.visited_symbols.len(), 1);
    }
}
