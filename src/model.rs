use serde::Serialize;

/// Stable handle into a [`SymbolStore`]. Ids are never reused within a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SymbolId(pub u32);

/// Half-open byte range into a file's source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    File,
    Class,
    Method,
    Field,
}

/// What a qualified use site is qualified by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Receiver {
    /// Bare identifier, no qualifier (`place(x)`).
    Implicit,
    /// Explicit `this.` qualifier.
    This,
    /// Single-identifier qualifier (`client` in `client.place(x)`); a
    /// field name or a class name, decided at resolve time.
    Named(String),
    /// Any more complex qualifying expression (`lookup().place(x)`);
    /// unresolvable without type inference.
    Expr,
}

/// A use-site inside some symbol's body: the trailing identifier of the
/// referencing expression plus enough context to resolve and classify it.
#[derive(Clone, Debug)]
pub struct Reference {
    /// Symbol whose body contains this use site.
    pub from: SymbolId,
    /// Trailing identifier at the use site (`place` in `client.place(x)`).
    pub name: String,
    pub receiver: Receiver,
    /// `Some(arity)` when the use site is a call expression.
    pub arg_count: Option<usize>,
    /// Span of the identifier itself.
    pub site: Span,
    /// Span of the whole enclosing call expression, when this is a call.
    /// Two references with the same call span are the same physical call.
    pub call_span: Option<Span>,
}

#[derive(Clone, Debug)]
pub struct Import {
    /// Dotted path as written, without the trailing `.*` for on-demand.
    pub path: String,
    pub is_static: bool,
    pub on_demand: bool,
    /// Whole `import ...;` statement, including the keyword.
    pub span: Span,
}

impl Import {
    /// Last path segment; the simple name this import introduces.
    pub fn simple_name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    /// Identity for duplicate detection: same resolved target regardless
    /// of spelling (whitespace, static-ness kept distinct, `.*` kept
    /// distinct).
    pub fn normalized(&self) -> String {
        let mut key = String::with_capacity(self.path.len() + 8);
        if self.is_static {
            key.push_str("static ");
        }
        key.push_str(&self.path);
        if self.on_demand {
            key.push_str(".*");
        }
        key
    }
}

#[derive(Clone, Debug)]
pub struct FileSymbol {
    /// Repo-relative, '/'-separated. External archive entries keep their
    /// full archive path (`.../repository/...jar!/com/x/Y.java`).
    pub path: String,
    pub package: Option<String>,
    pub source: String,
    pub imports: Vec<Import>,
    /// Top-level classes only; nested classes hang off their parent.
    pub classes: Vec<SymbolId>,
}

#[derive(Clone, Debug)]
pub struct ClassSymbol {
    pub name: String,
    /// `package.Outer.Inner` style; just the name chain when no package.
    pub qualified_name: String,
    pub file: SymbolId,
    pub parent_class: Option<SymbolId>,
    /// Annotation names on the class declaration, import-resolved.
    pub annotations: Vec<String>,
    pub fields: Vec<SymbolId>,
    pub methods: Vec<SymbolId>,
    pub nested: Vec<SymbolId>,
    /// Whole declaration, annotations through closing brace.
    pub span: Span,
    /// Byte offset of the `{` opening the class body. Everything before
    /// it is the signature the slicer keeps for shelled classes.
    pub body_start: usize,
    /// Supertype references (`extends` / `implements` type names).
    pub refs: Vec<Reference>,
}

#[derive(Clone, Debug)]
pub struct MethodSymbol {
    pub name: String,
    pub class: SymbolId,
    pub file: SymbolId,
    pub param_types: Vec<String>,
    /// `None` for constructors.
    pub return_type: Option<String>,
    pub is_constructor: bool,
    pub span: Span,
    /// Declared types of parameters and locals, import-resolved, in
    /// declaration order. Named receivers resolve through this before
    /// the field table because locals shadow fields.
    pub local_types: Vec<(String, String)>,
    pub refs: Vec<Reference>,
}

impl MethodSymbol {
    pub fn is_getter(&self) -> bool {
        self.name.starts_with("get")
            && self.param_types.is_empty()
            && self.return_type.as_deref().is_some_and(|t| t != "void")
    }

    pub fn is_setter(&self) -> bool {
        self.name.starts_with("set")
            && self.param_types.len() == 1
            && self.return_type.as_deref() == Some("void")
    }

    /// `equals`/`hashCode`/`toString`/`canEqual` — the boilerplate a
    /// data-carrier class generates.
    pub fn is_standard(&self) -> bool {
        matches!(self.name.as_str(), "equals" | "hashCode" | "toString" | "canEqual")
    }
}

#[derive(Clone, Debug)]
pub struct FieldSymbol {
    pub name: String,
    pub class: SymbolId,
    pub file: SymbolId,
    /// Declared type, resolved through the file's imports to a qualified
    /// name when possible, otherwise the simple name as written.
    pub declared_type: String,
    /// Annotation names on the declaration, import-resolved the same way.
    pub annotations: Vec<String>,
    pub span: Span,
    pub refs: Vec<Reference>,
}

#[derive(Clone, Debug)]
pub enum Symbol {
    File(FileSymbol),
    Class(ClassSymbol),
    Method(MethodSymbol),
    Field(FieldSymbol),
}

/// Arena of symbols for one indexing pass. Symbols reference each other
/// by id, parents and children both, so there are no ownership cycles.
#[derive(Default)]
pub struct SymbolStore {
    symbols: Vec<Symbol>,
    files: Vec<SymbolId>,
}

impl SymbolStore {
    pub fn alloc(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        if matches!(symbol, Symbol::File(_)) {
            self.files.push(id);
        }
        self.symbols.push(symbol);
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    pub fn kind(&self, id: SymbolId) -> SymbolKind {
        match self.get(id) {
            Symbol::File(_) => SymbolKind::File,
            Symbol::Class(_) => SymbolKind::Class,
            Symbol::Method(_) => SymbolKind::Method,
            Symbol::Field(_) => SymbolKind::Field,
        }
    }

    pub fn files(&self) -> &[SymbolId] {
        &self.files
    }

    // ── typed accessors (arena invariant: the id was allocated with
    //    the matching variant; a mismatch is a bug in the caller) ──────

    pub fn file(&self, id: SymbolId) -> &FileSymbol {
        match self.get(id) {
            Symbol::File(f) => f,
            other => panic!("symbol {id:?} is not a file: {other:?}"),
        }
    }

    pub fn class(&self, id: SymbolId) -> &ClassSymbol {
        match self.get(id) {
            Symbol::Class(c) => c,
            other => panic!("symbol {id:?} is not a class: {other:?}"),
        }
    }

    pub fn method(&self, id: SymbolId) -> &MethodSymbol {
        match self.get(id) {
            Symbol::Method(m) => m,
            other => panic!("symbol {id:?} is not a method: {other:?}"),
        }
    }

    pub fn field(&self, id: SymbolId) -> &FieldSymbol {
        match self.get(id) {
            Symbol::Field(f) => f,
            other => panic!("symbol {id:?} is not a field: {other:?}"),
        }
    }

    pub fn as_class(&self, id: SymbolId) -> Option<&ClassSymbol> {
        match self.get(id) {
            Symbol::Class(c) => Some(c),
            _ => None,
        }
    }

    // ── navigation ────────────────────────────────────────────────────

    /// File that owns the symbol (the symbol itself when it is a file).
    pub fn file_of(&self, id: SymbolId) -> SymbolId {
        match self.get(id) {
            Symbol::File(_) => id,
            Symbol::Class(c) => c.file,
            Symbol::Method(m) => m.file,
            Symbol::Field(f) => f.file,
        }
    }

    pub fn enclosing_class(&self, id: SymbolId) -> Option<SymbolId> {
        match self.get(id) {
            Symbol::File(_) => None,
            Symbol::Class(c) => c.parent_class,
            Symbol::Method(m) => Some(m.class),
            Symbol::Field(f) => Some(f.class),
        }
    }

    pub fn span_of(&self, id: SymbolId) -> Option<Span> {
        match self.get(id) {
            Symbol::File(_) => None,
            Symbol::Class(c) => Some(c.span),
            Symbol::Method(m) => Some(m.span),
            Symbol::Field(f) => Some(f.span),
        }
    }

    /// Short human-readable label: file path, qualified class name,
    /// `Class#method(T, U)` or `Class.field`.
    pub fn display_name(&self, id: SymbolId) -> String {
        match self.get(id) {
            Symbol::File(f) => f.path.clone(),
            Symbol::Class(c) => c.qualified_name.clone(),
            Symbol::Method(m) => {
                format!("{}#{}", self.class(m.class).name, self.method_signature(id))
            }
            Symbol::Field(f) => format!("{}.{}", self.class(f.class).name, f.name),
        }
    }

    /// `name(T1, T2)` — method identity within its class.
    pub fn method_signature(&self, id: SymbolId) -> String {
        let m = self.method(id);
        format!("{}({})", m.name, m.param_types.join(", "))
    }

    /// All classes in a file, top-level first, nested in declaration order.
    pub fn classes_in_file(&self, file: SymbolId) -> Vec<SymbolId> {
        let mut out = Vec::new();
        let mut stack: Vec<SymbolId> = self.file(file).classes.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            for nested in self.class(id).nested.iter().rev() {
                stack.push(*nested);
            }
        }
        out
    }

    // ── name lookups (session rehydration, CLI addressing) ────────────

    pub fn find_file(&self, path: &str) -> Option<SymbolId> {
        self.files.iter().copied().find(|id| self.file(*id).path == path)
    }

    /// Matches the qualified name first, then the simple name.
    pub fn find_class(&self, file: SymbolId, name: &str) -> Option<SymbolId> {
        let classes = self.classes_in_file(file);
        classes
            .iter()
            .copied()
            .find(|id| self.class(*id).qualified_name == name)
            .or_else(|| classes.iter().copied().find(|id| self.class(*id).name == name))
    }

    pub fn find_method(&self, class: SymbolId, name: &str, param_types: &[String]) -> Option<SymbolId> {
        self.class(class).methods.iter().copied().find(|id| {
            let m = self.method(*id);
            m.name == name && m.param_types == param_types
        })
    }

    pub fn find_field(&self, class: SymbolId, name: &str) -> Option<SymbolId> {
        self.class(class)
            .fields
            .iter()
            .copied()
            .find(|id| self.field(*id).name == name)
    }
}

/// Resolve capability the dependency walk needs. Implemented by the
/// tree-sitter front-end; anything that can answer these questions can
/// drive the walk.
pub trait Resolver {
    /// Resolve a use site to a symbol in the store. `None` means the
    /// target has no source here (library call, unresolvable name) and
    /// the walk skips it silently.
    fn resolve(&self, reference: &Reference) -> Option<SymbolId>;

    /// Field the call receiver names, when the receiver is a field of a
    /// class in the same file. Classification keys off this field's
    /// declared type and annotations.
    fn receiver_field(&self, reference: &Reference) -> Option<SymbolId>;

    /// Fields, methods, then nested classes, in declaration order.
    fn members_of(&self, class: SymbolId) -> Vec<SymbolId>;

    fn declared_type(&self, field: SymbolId) -> Option<String>;

    fn annotations_of(&self, field: SymbolId) -> Vec<String>;

    fn references_in(&self, symbol: SymbolId) -> Vec<Reference>;

    fn kind_of(&self, symbol: SymbolId) -> SymbolKind;

    fn owning_file(&self, symbol: SymbolId) -> SymbolId;

    /// Class the symbol belongs to; a class owns itself, files own nothing.
    fn owning_class(&self, symbol: SymbolId) -> Option<SymbolId>;

    fn display_of(&self, symbol: SymbolId) -> String;

    /// True for data-carrier classes: at least one field, and every
    /// non-constructor method is a getter, setter, or generated
    /// boilerplate (`equals`/`hashCode`/`toString`/`canEqual`).
    fn is_data_only_class(&self, class: SymbolId) -> bool;
}

// ─────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────
