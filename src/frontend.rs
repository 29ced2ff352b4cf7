use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::Path;
use tree_sitter::{Language, Node, Parser};

use crate::debug_log;
use crate::model::{
    ClassSymbol, FieldSymbol, FileSymbol, Import, MethodSymbol, Receiver, Reference, Resolver, Span,
    Symbol, SymbolId, SymbolStore,
};

fn java_language() -> Language {
    tree_sitter_java::LANGUAGE.into()
}

fn node_text<'a>(source: &'a [u8], node: Node) -> &'a str {
    std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).unwrap_or("")
}

fn span_of(node: Node) -> Span {
    Span { start: node.start_byte(), end: node.end_byte() }
}

/// Collapse whitespace runs so `List < String >` and `List<String>` compare
/// equal as parameter types.
fn normalize_type_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip generics and array suffixes: `Map<String, List<Foo>>[]` → `Map`.
fn type_erasure(text: &str) -> String {
    let t = text.trim();
    let t = t.split('<').next().unwrap_or(t).trim();
    t.trim_end_matches("[]").trim().to_string()
}

/// Resolve a simple type/annotation name through the file's single-type
/// imports. Already-qualified names pass through; unresolvable simple
/// names stay simple (java.lang, same package, or on-demand imports).
fn resolve_type_name(name: &str, imports: &[Import]) -> String {
    let base = type_erasure(name);
    if base.contains('.') {
        return base;
    }
    for imp in imports {
        if !imp.is_static && !imp.on_demand && imp.simple_name() == base {
            return imp.path.clone();
        }
    }
    base
}

// ─────────────────────────────────────────────────────────────────────────
// Indexing
// ─────────────────────────────────────────────────────────────────────────

/// Index every `.java` file under `root` (gitignore-aware) into one store.
pub fn index_repo(root: &Path) -> Result<SymbolStore> {
    let mut paths: Vec<std::path::PathBuf> = Vec::new();
    let walker = WalkBuilder::new(root).standard_filters(true).build();
    for item in walker {
        let dent = match item {
            Ok(d) => d,
            Err(_) => continue,
        };
        if !dent.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = dent.into_path();
        if path.extension().and_then(|e| e.to_str()) == Some("java") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut store = SymbolStore::default();
    for path in &paths {
        if let Err(e) = index_file(&mut store, root, path) {
            debug_log!("skipping {}: {e:#}", path.display());
        }
    }
    Ok(store)
}

pub fn index_file(store: &mut SymbolStore, repo_root: &Path, path: &Path) -> Result<SymbolId> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let rel = path
        .strip_prefix(repo_root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    index_source(store, &rel, source)
}

/// Parse one compilation unit into the store and return its file symbol.
pub fn index_source(store: &mut SymbolStore, rel_path: &str, source: String) -> Result<SymbolId> {
    let language = java_language();
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .context("Failed to set tree-sitter Java language")?;
    let tree = parser
        .parse(source.as_bytes(), None)
        .with_context(|| format!("Failed to parse {rel_path}"))?;
    let root = tree.root_node();
    let bytes = source.as_bytes();

    let mut package = None;
    let mut imports = Vec::new();
    for i in 0..root.named_child_count() {
        let Some(child) = root.named_child(i) else { continue };
        match child.kind() {
            "package_declaration" => {
                for j in 0..child.named_child_count() {
                    let Some(p) = child.named_child(j) else { continue };
                    if matches!(p.kind(), "scoped_identifier" | "identifier") {
                        package = Some(node_text(bytes, p).to_string());
                    }
                }
            }
            "import_declaration" => {
                if let Some(imp) = parse_import(child, bytes) {
                    imports.push(imp);
                }
            }
            _ => {}
        }
    }

    let file_id = store.alloc(Symbol::File(FileSymbol {
        path: rel_path.to_string(),
        package: package.clone(),
        source: source.clone(),
        imports: imports.clone(),
        classes: vec![],
    }));

    let ctx = FileCtx { bytes, package, imports };
    let mut top_level = Vec::new();
    for i in 0..root.named_child_count() {
        let Some(child) = root.named_child(i) else { continue };
        if is_type_declaration(child.kind()) {
            top_level.push(index_class(store, &ctx, file_id, None, child)?);
        }
    }

    if let Symbol::File(f) = store.get_mut(file_id) {
        f.classes = top_level;
    }
    Ok(file_id)
}

struct FileCtx<'a> {
    bytes: &'a [u8],
    package: Option<String>,
    imports: Vec<Import>,
}

fn is_type_declaration(kind: &str) -> bool {
    matches!(
        kind,
        "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration"
    )
}

fn parse_import(node: Node, bytes: &[u8]) -> Option<Import> {
    let mut path = None;
    let mut is_static = false;
    let mut on_demand = false;
    for i in 0..node.child_count() {
        let child = node.child(i)?;
        match child.kind() {
            "static" => is_static = true,
            "asterisk" => on_demand = true,
            "scoped_identifier" | "identifier" => {
                path = Some(node_text(bytes, child).to_string());
            }
            _ => {}
        }
    }
    Some(Import { path: path?, is_static, on_demand, span: span_of(node) })
}

fn annotations_in_modifiers(node: Node, bytes: &[u8], imports: &[Import]) -> Vec<String> {
    let mut out = Vec::new();
    for i in 0..node.named_child_count() {
        let Some(modifiers) = node.named_child(i) else { continue };
        if modifiers.kind() != "modifiers" {
            continue;
        }
        for j in 0..modifiers.named_child_count() {
            let Some(ann) = modifiers.named_child(j) else { continue };
            if matches!(ann.kind(), "annotation" | "marker_annotation") {
                if let Some(name) = ann.child_by_field_name("name") {
                    out.push(resolve_type_name(node_text(bytes, name), imports));
                }
            }
        }
    }
    out
}

fn index_class(
    store: &mut SymbolStore,
    ctx: &FileCtx,
    file: SymbolId,
    parent: Option<(SymbolId, String)>,
    node: Node,
) -> Result<SymbolId> {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(ctx.bytes, n).to_string())
        .unwrap_or_default();
    let qualified_name = match (&parent, &ctx.package) {
        (Some((_, outer)), _) => format!("{outer}.{name}"),
        (None, Some(pkg)) => format!("{pkg}.{name}"),
        (None, None) => name.clone(),
    };

    let body = node.child_by_field_name("body");
    let body_start = body.map(|b| b.start_byte()).unwrap_or(node.end_byte());

    let class_id = store.alloc(Symbol::Class(ClassSymbol {
        name,
        qualified_name: qualified_name.clone(),
        file,
        parent_class: parent.as_ref().map(|(id, _)| *id),
        annotations: annotations_in_modifiers(node, ctx.bytes, &ctx.imports),
        fields: vec![],
        methods: vec![],
        nested: vec![],
        span: span_of(node),
        body_start,
        refs: vec![],
    }));

    // Supertype references (extends / implements).
    let mut refs = Vec::new();
    for i in 0..node.named_child_count() {
        let Some(child) = node.named_child(i) else { continue };
        if matches!(child.kind(), "superclass" | "super_interfaces" | "extends_interfaces") {
            collect_type_identifiers(class_id, child, ctx.bytes, &mut refs);
        }
    }

    let mut fields = Vec::new();
    let mut methods = Vec::new();
    let mut nested = Vec::new();
    if let Some(body) = body {
        index_members(store, ctx, file, class_id, &qualified_name, body, &mut fields, &mut methods, &mut nested)?;
    }

    if let Symbol::Class(c) = store.get_mut(class_id) {
        c.fields = fields;
        c.methods = methods;
        c.nested = nested;
        c.refs = refs;
    }
    Ok(class_id)
}

#[allow(clippy::too_many_arguments)]
fn index_members(
    store: &mut SymbolStore,
    ctx: &FileCtx,
    file: SymbolId,
    class_id: SymbolId,
    qualified_name: &str,
    body: Node,
    fields: &mut Vec<SymbolId>,
    methods: &mut Vec<SymbolId>,
    nested: &mut Vec<SymbolId>,
) -> Result<()> {
    for i in 0..body.named_child_count() {
        let Some(member) = body.named_child(i) else { continue };
        match member.kind() {
            "field_declaration" => {
                fields.extend(index_field_declaration(store, ctx, file, class_id, member));
            }
            "method_declaration" => {
                methods.push(index_method(store, ctx, file, class_id, member, false));
            }
            "constructor_declaration" => {
                methods.push(index_method(store, ctx, file, class_id, member, true));
            }
            // Enum members live one level down.
            "enum_body_declarations" => {
                index_members(store, ctx, file, class_id, qualified_name, member, fields, methods, nested)?;
            }
            kind if is_type_declaration(kind) => {
                nested.push(index_class(
                    store,
                    ctx,
                    file,
                    Some((class_id, qualified_name.to_string())),
                    member,
                )?);
            }
            _ => {}
        }
    }
    Ok(())
}

/// One declaration can declare several variables; each becomes its own
/// field symbol sharing the declaration span.
fn index_field_declaration(
    store: &mut SymbolStore,
    ctx: &FileCtx,
    file: SymbolId,
    class: SymbolId,
    node: Node,
) -> Vec<SymbolId> {
    let declared_type = node
        .child_by_field_name("type")
        .map(|t| resolve_type_name(node_text(ctx.bytes, t), &ctx.imports))
        .unwrap_or_default();
    let annotations = annotations_in_modifiers(node, ctx.bytes, &ctx.imports);

    let mut out = Vec::new();
    for i in 0..node.named_child_count() {
        let Some(decl) = node.named_child(i) else { continue };
        if decl.kind() != "variable_declarator" {
            continue;
        }
        let Some(name_node) = decl.child_by_field_name("name") else { continue };
        let field_id = store.alloc(Symbol::Field(FieldSymbol {
            name: node_text(ctx.bytes, name_node).to_string(),
            class,
            file,
            declared_type: declared_type.clone(),
            annotations: annotations.clone(),
            span: span_of(node),
            refs: vec![],
        }));
        let mut refs = Vec::new();
        if let Some(value) = decl.child_by_field_name("value") {
            let locals = HashSet::new();
            collect_refs(field_id, value, ctx.bytes, &locals, &mut refs);
        }
        if let Symbol::Field(f) = store.get_mut(field_id) {
            f.refs = refs;
        }
        out.push(field_id);
    }
    out
}

fn index_method(
    store: &mut SymbolStore,
    ctx: &FileCtx,
    file: SymbolId,
    class: SymbolId,
    node: Node,
    is_constructor: bool,
) -> SymbolId {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(ctx.bytes, n).to_string())
        .unwrap_or_default();

    let mut param_types = Vec::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        for i in 0..params.named_child_count() {
            let Some(p) = params.named_child(i) else { continue };
            if !matches!(p.kind(), "formal_parameter" | "spread_parameter") {
                continue;
            }
            if let Some(t) = p.child_by_field_name("type") {
                let mut ty = normalize_type_text(node_text(ctx.bytes, t));
                if p.kind() == "spread_parameter" {
                    ty.push_str("...");
                }
                param_types.push(ty);
            }
        }
    }

    let return_type = if is_constructor {
        None
    } else {
        node.child_by_field_name("type")
            .map(|t| normalize_type_text(node_text(ctx.bytes, t)))
    };

    let mut locals = Vec::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        collect_locals(params, ctx.bytes, &ctx.imports, &mut locals);
    }
    if let Some(body) = node.child_by_field_name("body") {
        collect_locals(body, ctx.bytes, &ctx.imports, &mut locals);
    }
    let local_names: HashSet<String> = locals.iter().map(|(n, _)| n.clone()).collect();
    let local_types: Vec<(String, String)> = locals
        .into_iter()
        .filter_map(|(n, t)| t.map(|t| (n, t)))
        .collect();

    let method_id = store.alloc(Symbol::Method(MethodSymbol {
        name,
        class,
        file,
        param_types,
        return_type,
        is_constructor,
        span: span_of(node),
        local_types,
        refs: vec![],
    }));

    let mut refs = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        collect_refs(method_id, body, ctx.bytes, &local_names, &mut refs);
    }
    if let Symbol::Method(m) = store.get_mut(method_id) {
        m.refs = refs;
    }
    method_id
}

fn collect_type_identifiers(from: SymbolId, node: Node, bytes: &[u8], refs: &mut Vec<Reference>) {
    if node.kind() == "type_identifier" {
        refs.push(Reference {
            from,
            name: node_text(bytes, node).to_string(),
            receiver: Receiver::Implicit,
            arg_count: None,
            site: span_of(node),
            call_span: None,
        });
        return;
    }
    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            collect_type_identifiers(from, child, bytes, refs);
        }
    }
}

/// Names that shadow fields within a body (parameters, local variables,
/// catch parameters, for-each variables, lambda parameters), with their
/// declared types where the syntax carries one.
fn collect_locals(
    node: Node,
    bytes: &[u8],
    imports: &[Import],
    locals: &mut Vec<(String, Option<String>)>,
) {
    match node.kind() {
        "formal_parameter" | "spread_parameter" | "enhanced_for_statement" => {
            if let Some(name) = node.child_by_field_name("name") {
                let ty = node
                    .child_by_field_name("type")
                    .map(|t| resolve_type_name(node_text(bytes, t), imports));
                locals.push((node_text(bytes, name).to_string(), ty));
            }
        }
        "catch_formal_parameter" => {
            if let Some(name) = node.child_by_field_name("name") {
                locals.push((node_text(bytes, name).to_string(), None));
            }
        }
        "local_variable_declaration" => {
            let ty = node
                .child_by_field_name("type")
                .map(|t| resolve_type_name(node_text(bytes, t), imports));
            for i in 0..node.named_child_count() {
                let Some(decl) = node.named_child(i) else { continue };
                if decl.kind() == "variable_declarator" {
                    if let Some(name) = decl.child_by_field_name("name") {
                        locals.push((node_text(bytes, name).to_string(), ty.clone()));
                    }
                }
            }
        }
        "lambda_expression" => {
            if let Some(params) = node.child_by_field_name("parameters") {
                match params.kind() {
                    "identifier" => {
                        locals.push((node_text(bytes, params).to_string(), None));
                    }
                    "inferred_parameters" => {
                        for i in 0..params.named_child_count() {
                            if let Some(p) = params.named_child(i) {
                                if p.kind() == "identifier" {
                                    locals.push((node_text(bytes, p).to_string(), None));
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            collect_locals(child, bytes, imports, locals);
        }
    }
}

fn receiver_of(object: Option<Node>, bytes: &[u8]) -> Receiver {
    match object {
        None => Receiver::Implicit,
        Some(obj) => match obj.kind() {
            "this" => Receiver::This,
            "identifier" => Receiver::Named(node_text(bytes, obj).to_string()),
            "field_access" => {
                let is_this_qualified = obj
                    .child_by_field_name("object")
                    .map(|o| o.kind() == "this")
                    .unwrap_or(false);
                match (is_this_qualified, obj.child_by_field_name("field")) {
                    (true, Some(f)) => Receiver::Named(node_text(bytes, f).to_string()),
                    _ => Receiver::Expr,
                }
            }
            _ => Receiver::Expr,
        },
    }
}

fn collect_refs(
    from: SymbolId,
    node: Node,
    bytes: &[u8],
    locals: &HashSet<String>,
    refs: &mut Vec<Reference>,
) {
    match node.kind() {
        "method_invocation" => {
            let object = node.child_by_field_name("object");
            let arguments = node.child_by_field_name("arguments");
            if let Some(name) = node.child_by_field_name("name") {
                let arity = arguments.map(|a| a.named_child_count()).unwrap_or(0);
                refs.push(Reference {
                    from,
                    name: node_text(bytes, name).to_string(),
                    receiver: receiver_of(object, bytes),
                    arg_count: Some(arity),
                    site: span_of(name),
                    call_span: Some(span_of(node)),
                });
            }
            if let Some(obj) = object {
                collect_refs(from, obj, bytes, locals, refs);
            }
            if let Some(args) = arguments {
                collect_refs(from, args, bytes, locals, refs);
            }
        }
        "object_creation_expression" => {
            if let Some(ty) = node.child_by_field_name("type") {
                let simple = type_erasure(node_text(bytes, ty));
                let simple = simple.rsplit('.').next().unwrap_or(&simple).to_string();
                let arity = node
                    .child_by_field_name("arguments")
                    .map(|a| a.named_child_count())
                    .unwrap_or(0);
                refs.push(Reference {
                    from,
                    name: simple,
                    receiver: Receiver::Implicit,
                    arg_count: Some(arity),
                    site: span_of(ty),
                    call_span: Some(span_of(node)),
                });
            }
            if let Some(args) = node.child_by_field_name("arguments") {
                collect_refs(from, args, bytes, locals, refs);
            }
        }
        "field_access" => {
            let object = node.child_by_field_name("object");
            if let Some(field) = node.child_by_field_name("field") {
                refs.push(Reference {
                    from,
                    name: node_text(bytes, field).to_string(),
                    receiver: receiver_of(object, bytes),
                    arg_count: None,
                    site: span_of(field),
                    call_span: None,
                });
            }
            if let Some(obj) = object {
                if obj.kind() != "this" {
                    collect_refs(from, obj, bytes, locals, refs);
                }
            }
        }
        "identifier" => {
            let name = node_text(bytes, node);
            if !locals.contains(name) {
                refs.push(Reference {
                    from,
                    name: name.to_string(),
                    receiver: Receiver::Implicit,
                    arg_count: None,
                    site: span_of(node),
                    call_span: None,
                });
            }
        }
        "type_identifier" => {
            refs.push(Reference {
                from,
                name: node_text(bytes, node).to_string(),
                receiver: Receiver::Implicit,
                arg_count: None,
                site: span_of(node),
                call_span: None,
            });
        }
        _ => {
            for i in 0..node.named_child_count() {
                if let Some(child) = node.named_child(i) {
                    collect_refs(from, child, bytes, locals, refs);
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Resolution (single-file scope + import table)
// ─────────────────────────────────────────────────────────────────────────

impl SymbolStore {
    /// Enclosing class of `from`, then its parents outward.
    fn class_chain(&self, from: SymbolId) -> Vec<SymbolId> {
        let mut out = Vec::new();
        let mut cur = self.enclosing_class(from);
        while let Some(c) = cur {
            out.push(c);
            cur = self.class(c).parent_class;
        }
        out
    }

    fn class_by_qualified(&self, qualified: &str) -> Option<SymbolId> {
        self.files()
            .iter()
            .flat_map(|f| self.classes_in_file(*f))
            .find(|id| self.class(*id).qualified_name == qualified)
    }

    /// Same file first, then store-wide through the file's imports.
    fn class_by_name(&self, file: SymbolId, name: &str) -> Option<SymbolId> {
        let local = self.classes_in_file(file).into_iter().find(|id| {
            let c = self.class(*id);
            c.name == name || c.qualified_name == name
        });
        if local.is_some() {
            return local;
        }
        let resolved = resolve_type_name(name, &self.file(file).imports);
        if resolved.contains('.') {
            return self.class_by_qualified(&resolved);
        }
        None
    }

    fn field_in_chain(&self, from: SymbolId, name: &str) -> Option<SymbolId> {
        self.class_chain(from)
            .into_iter()
            .find_map(|c| self.find_field(c, name))
    }

    /// Declared type of a parameter or local named `name` in the body
    /// that contains the reference.
    fn local_type_of(&self, from: SymbolId, name: &str) -> Option<String> {
        match self.get(from) {
            Symbol::Method(m) => m
                .local_types
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, t)| t.clone()),
            _ => None,
        }
    }

    /// Declared type → class in the same file, then anywhere in the
    /// store by qualified name. Cross-file hits give the walk an edge to
    /// record without expanding past the boundary file.
    fn class_of_type(&self, file: SymbolId, declared_type: &str) -> Option<SymbolId> {
        let erased = type_erasure(declared_type);
        self.classes_in_file(file)
            .into_iter()
            .find(|id| {
                let c = self.class(*id);
                c.qualified_name == erased || c.name == erased
            })
            .or_else(|| {
                if erased.contains('.') {
                    self.class_by_qualified(&erased)
                } else {
                    None
                }
            })
    }

    /// Arity match preferred; falls back to the first name match so
    /// varargs calls still resolve.
    fn method_by_arity(&self, class: SymbolId, name: &str, arity: usize) -> Option<SymbolId> {
        let c = self.class(class);
        c.methods
            .iter()
            .copied()
            .find(|id| {
                let m = self.method(*id);
                !m.is_constructor && m.name == name && m.param_types.len() == arity
            })
            .or_else(|| {
                c.methods.iter().copied().find(|id| {
                    let m = self.method(*id);
                    !m.is_constructor && m.name == name
                })
            })
    }

    fn constructor_by_arity(&self, class: SymbolId, arity: usize) -> Option<SymbolId> {
        let c = self.class(class);
        c.methods
            .iter()
            .copied()
            .find(|id| {
                let m = self.method(*id);
                m.is_constructor && m.param_types.len() == arity
            })
            .or_else(|| c.methods.iter().copied().find(|id| self.method(*id).is_constructor))
    }

    fn resolve_call(&self, file: SymbolId, r: &Reference, arity: usize) -> Option<SymbolId> {
        match &r.receiver {
            Receiver::Implicit | Receiver::This => self
                .class_chain(r.from)
                .into_iter()
                .find_map(|c| self.method_by_arity(c, &r.name, arity))
                .or_else(|| {
                    // `new Foo(...)` arrives as an implicit call named Foo.
                    self.class_by_name(file, &r.name)
                        .and_then(|c| self.constructor_by_arity(c, arity))
                }),
            Receiver::Named(n) => {
                // Locals shadow fields, fields shadow type names.
                if let Some(ty) = self.local_type_of(r.from, n) {
                    return self
                        .class_of_type(file, &ty)
                        .and_then(|c| self.method_by_arity(c, &r.name, arity));
                }
                if let Some(field) = self.field_in_chain(r.from, n) {
                    let ty = self.field(field).declared_type.clone();
                    return self
                        .class_of_type(file, &ty)
                        .and_then(|c| self.method_by_arity(c, &r.name, arity));
                }
                self.class_by_name(file, n)
                    .and_then(|c| self.method_by_arity(c, &r.name, arity))
            }
            Receiver::Expr => None,
        }
    }

    fn resolve_value(&self, file: SymbolId, r: &Reference) -> Option<SymbolId> {
        match &r.receiver {
            Receiver::Implicit => self
                .field_in_chain(r.from, &r.name)
                .map(Some)
                .unwrap_or_else(|| self.class_by_name(file, &r.name)),
            Receiver::This => self.field_in_chain(r.from, &r.name),
            Receiver::Named(n) => {
                if let Some(ty) = self.local_type_of(r.from, n) {
                    return self
                        .class_of_type(file, &ty)
                        .and_then(|c| self.find_field(c, &r.name));
                }
                if let Some(field) = self.field_in_chain(r.from, n) {
                    let ty = self.field(field).declared_type.clone();
                    return self
                        .class_of_type(file, &ty)
                        .and_then(|c| self.find_field(c, &r.name));
                }
                self.class_by_name(file, n)
                    .and_then(|c| self.find_field(c, &r.name))
            }
            Receiver::Expr => None,
        }
    }
}

impl Resolver for SymbolStore {
    fn resolve(&self, reference: &Reference) -> Option<SymbolId> {
        let file = self.file_of(reference.from);
        match reference.arg_count {
            Some(arity) => self.resolve_call(file, reference, arity),
            None => self.resolve_value(file, reference),
        }
    }

    fn receiver_field(&self, reference: &Reference) -> Option<SymbolId> {
        match &reference.receiver {
            // A local shadowing the name means the call is not through
            // the field, so it does not classify.
            Receiver::Named(n) if self.local_type_of(reference.from, n).is_none() => {
                self.field_in_chain(reference.from, n)
            }
            _ => None,
        }
    }

    fn members_of(&self, class: SymbolId) -> Vec<SymbolId> {
        let c = self.class(class);
        let mut out = Vec::with_capacity(c.fields.len() + c.methods.len() + c.nested.len());
        out.extend_from_slice(&c.fields);
        out.extend_from_slice(&c.methods);
        out.extend_from_slice(&c.nested);
        out
    }

    fn declared_type(&self, field: SymbolId) -> Option<String> {
        Some(self.field(field).declared_type.clone())
    }

    /// The field's own annotations plus, when the declared type is a
    /// class in the same file, that class's annotations. A bare
    /// `@DubboReference` field and a field of a `@DubboService` type
    /// both classify as RPC this way.
    fn annotations_of(&self, field: SymbolId) -> Vec<String> {
        let f = self.field(field);
        let mut out = f.annotations.clone();
        if let Some(class) = self.class_of_type(f.file, &f.declared_type) {
            out.extend(self.class(class).annotations.iter().cloned());
        }
        out
    }

    fn references_in(&self, symbol: SymbolId) -> Vec<Reference> {
        match self.get(symbol) {
            Symbol::File(_) => vec![],
            Symbol::Class(c) => c.refs.clone(),
            Symbol::Method(m) => m.refs.clone(),
            Symbol::Field(f) => f.refs.clone(),
        }
    }

    fn kind_of(&self, symbol: SymbolId) -> crate::model::SymbolKind {
        self.kind(symbol)
    }

    fn owning_file(&self, symbol: SymbolId) -> SymbolId {
        self.file_of(symbol)
    }

    fn owning_class(&self, symbol: SymbolId) -> Option<SymbolId> {
        match self.get(symbol) {
            Symbol::File(_) => None,
            Symbol::Class(_) => Some(symbol),
            Symbol::Method(m) => Some(m.class),
            Symbol::Field(f) => Some(f.class),
        }
    }

    fn display_of(&self, symbol: SymbolId) -> String {
        self.display_name(symbol)
    }

    fn is_data_only_class(&self, class: SymbolId) -> bool {
        let c = self.class(class);
        if c.fields.is_empty() {
            return false;
        }
        c.methods.iter().all(|id| {
            let m = self.method(*id);
            m.is_constructor || m.is_getter() || m.is_setter() || m.is_standard()
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER_JAVA: &str = r#"package com.shop.order;

import com.shop.inventory.InventoryClient;
import org.slf4j.Logger;
import org.slf4j.LoggerFactory;

public class OrderService {
    private static final Logger log = LoggerFactory.getLogger(OrderService.class);

    private InventoryClient inventoryClient;
    private OrderValidator validator;

    public void place(Order order) {
        log.info("placing");
        validator.validate(order);
        inventoryClient.reserve(order);
    }

    public int total(Order order) {
        int sum = order.getAmount();
        return sum;
    }
}

class OrderValidator {
    void validate(Order order) {
        if (order == null) {
            throw new IllegalArgumentException("order");
        }
    }
}

class Order {
    private int amount;

    public int getAmount() { return amount; }

    public void setAmount(int amount) { this.amount = amount; }
}
"#;

    fn indexed() -> (SymbolStore, SymbolId) {
        let mut store = SymbolStore::default();
        let file = index_source(&mut store, "com/shop/order/OrderService.java", ORDER_JAVA.into())
            .unwrap();
        (store, file)
    }

    // ── structure extraction ──────────────────────────────────────────

    #[test]
    fn extracts_package_imports_and_top_level_classes() {
        let (store, file) = indexed();
        let f = store.file(file);
        assert_eq!(f.package.as_deref(), Some("com.shop.order"));
        assert_eq!(f.imports.len(), 3);
        assert_eq!(f.imports[0].path, "com.shop.inventory.InventoryClient");
        assert!(!f.imports[0].on_demand);
        let names: Vec<&str> = f.classes.iter().map(|c| store.class(*c).name.as_str()).collect();
        assert_eq!(names, vec!["OrderService", "OrderValidator", "Order"]);
        assert_eq!(
            store.class(f.classes[0]).qualified_name,
            "com.shop.order.OrderService"
        );
    }

    #[test]
    fn extracts_fields_with_import_resolved_types() {
        let (store, file) = indexed();
        let service = store.find_class(file, "OrderService").unwrap();
        let client = store.find_field(service, "inventoryClient").unwrap();
        assert_eq!(store.field(client).declared_type, "com.shop.inventory.InventoryClient");
        let logger = store.find_field(service, "log").unwrap();
        assert_eq!(store.field(logger).declared_type, "org.slf4j.Logger");
        // No import for OrderValidator: stays simple.
        let validator = store.find_field(service, "validator").unwrap();
        assert_eq!(store.field(validator).declared_type, "OrderValidator");
    }

    #[test]
    fn extracts_methods_with_param_types() {
        let (store, file) = indexed();
        let service = store.find_class(file, "OrderService").unwrap();
        let place = store
            .find_method(service, "place", &["Order".to_string()])
            .unwrap();
        assert_eq!(store.method_signature(place), "place(Order)");
        assert_eq!(store.method(place).return_type.as_deref(), Some("void"));
    }

    // ── reference collection & resolution ─────────────────────────────

    #[test]
    fn resolves_field_receiver_calls_within_the_file() {
        let (store, file) = indexed();
        let service = store.find_class(file, "OrderService").unwrap();
        let place = store.find_method(service, "place", &["Order".to_string()]).unwrap();
        let refs = store.references_in(place);

        let validate = refs
            .iter()
            .find(|r| r.name == "validate" && r.arg_count.is_some())
            .unwrap();
        let target = store.resolve(validate).unwrap();
        assert_eq!(store.display_name(target), "OrderValidator#validate(Order)");

        // Cross-file type: recorded but unresolvable here.
        let reserve = refs
            .iter()
            .find(|r| r.name == "reserve" && r.arg_count.is_some())
            .unwrap();
        assert_eq!(store.resolve(reserve), None);
        // But its receiver field is known, so it can still classify.
        let field = store.receiver_field(reserve).unwrap();
        assert_eq!(store.field(field).name, "inventoryClient");
    }

    #[test]
    fn locals_do_not_resolve_as_fields() {
        let (store, file) = indexed();
        let service = store.find_class(file, "OrderService").unwrap();
        let total = store.find_method(service, "total", &["Order".to_string()]).unwrap();
        let refs = store.references_in(total);
        // `sum` is a local; it must not appear as a reference at all.
        assert!(refs.iter().all(|r| r.name != "sum"));
        // `order.getAmount()` resolves through the parameter's declared
        // type, not the field table, and never classifies.
        let get_amount = refs.iter().find(|r| r.name == "getAmount").unwrap();
        assert_eq!(get_amount.receiver, Receiver::Named("order".into()));
        let target = store.resolve(get_amount).unwrap();
        assert_eq!(store.display_name(target), "Order#getAmount()");
        assert_eq!(store.receiver_field(get_amount), None);
    }

    #[test]
    fn constructor_calls_resolve_to_constructors() {
        let mut store = SymbolStore::default();
        let src = r#"
class A {
    B make() { return new B(1); }
}
class B {
    int v;
    B(int v) { this.v = v; }
}
"#;
        let file = index_source(&mut store, "A.java", src.into()).unwrap();
        let a = store.find_class(file, "A").unwrap();
        let make = store.find_method(a, "make", &[]).unwrap();
        let refs = store.references_in(make);
        let ctor_call = refs.iter().find(|r| r.name == "B" && r.arg_count == Some(1)).unwrap();
        let target = store.resolve(ctor_call).unwrap();
        assert!(store.method(target).is_constructor);
    }

    #[test]
    fn nested_classes_get_qualified_names_and_parent_links() {
        let mut store = SymbolStore::default();
        let src = r#"package p;
class Outer {
    class Inner {
        void run() {}
    }
}
"#;
        let file = index_source(&mut store, "p/Outer.java", src.into()).unwrap();
        let outer = store.find_class(file, "Outer").unwrap();
        let inner = store.find_class(file, "p.Outer.Inner").unwrap();
        assert_eq!(store.class(inner).parent_class, Some(outer));
        assert_eq!(store.classes_in_file(file), vec![outer, inner]);
    }

    #[test]
    fn field_annotations_include_declared_type_class_annotations() {
        let mut store = SymbolStore::default();
        let src = r#"package p;

import org.apache.dubbo.config.annotation.DubboService;

@DubboService
class RemoteApi {
    void ping() {}
}

class Caller {
    private RemoteApi api;
    void go() { api.ping(); }
}
"#;
        let file = index_source(&mut store, "p/RemoteApi.java", src.into()).unwrap();
        let caller = store.find_class(file, "Caller").unwrap();
        let api = store.find_field(caller, "api").unwrap();
        let anns = store.annotations_of(api);
        assert!(anns.contains(&"org.apache.dubbo.config.annotation.DubboService".to_string()));
    }
}
