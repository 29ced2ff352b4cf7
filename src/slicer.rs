//! Minimized single-file rewrite.
//!
//! Given the set of symbols worth keeping, produce a syntactically valid
//! copy of the file with everything else deleted: unkept classes vanish,
//! partially-kept classes shrink to signature shells around their kept
//! members, and imports nothing references any more are dropped. The
//! original text is never modified; edits are byte-range deletions
//! applied back-to-front so earlier offsets stay valid.

use anyhow::{ensure, Result};
use std::collections::BTreeSet;

use crate::model::{Span, SymbolId, SymbolKind, SymbolStore};

/// Render the minimized rewrite of `file` keeping exactly `keep`.
///
/// A class id in `keep` retains the class declaration (its members are
/// still pruned individually); member ids retain members. Classes with
/// nothing kept inside and no id in `keep` are deleted whole.
pub fn slice(store: &SymbolStore, file: SymbolId, keep: &BTreeSet<SymbolId>) -> Result<String> {
    ensure!(
        store.kind(file) == SymbolKind::File,
        "slice target must be a file symbol"
    );
    let f = store.file(file);
    let source = f.source.as_str();

    let mut deletions: Vec<Span> = Vec::new();
    let mut kept_spans: Vec<Span> = Vec::new();
    for class in &f.classes {
        prune_class(store, *class, keep, source, &mut deletions, &mut kept_spans);
    }
    // A deletion that would take a kept member with it (fields sharing
    // one declaration) is invalid and skipped.
    deletions.retain(|d| !kept_spans.iter().any(|k| overlaps(k, d)));

    // Import pruning runs against the text that survives member deletion,
    // with the import block itself blanked out of the search space.
    let mut probe = deletions.clone();
    for imp in &f.imports {
        probe.push(with_trailing_newline(source, imp.span));
    }
    let core_text = apply_deletions(source, probe);

    let mut seen_imports: BTreeSet<String> = BTreeSet::new();
    for imp in &f.imports {
        let duplicate = !seen_imports.insert(imp.normalized());
        let used = imp.on_demand || word_present(&core_text, imp.simple_name());
        if duplicate || !used {
            deletions.push(with_trailing_newline(source, imp.span));
        }
    }

    Ok(tidy(&apply_deletions(source, deletions)))
}

/// Prune one class. Kept-or-containing classes become shells: signature
/// and braces stay, unkept members go. Anything else is deleted whole.
fn prune_class(
    store: &SymbolStore,
    class: SymbolId,
    keep: &BTreeSet<SymbolId>,
    source: &str,
    deletions: &mut Vec<Span>,
    kept_spans: &mut Vec<Span>,
) {
    let c = store.class(class);
    if !keep.contains(&class) && !has_kept_descendant(store, class, keep) {
        deletions.push(with_trailing_newline(source, c.span));
        return;
    }

    for field in &c.fields {
        let span = store.field(*field).span;
        if keep.contains(field) {
            kept_spans.push(span);
        } else {
            deletions.push(with_trailing_newline(source, span));
        }
    }
    for method in &c.methods {
        let span = store.method(*method).span;
        if keep.contains(method) {
            kept_spans.push(span);
        } else {
            deletions.push(with_trailing_newline(source, span));
        }
    }
    for nested in &c.nested {
        prune_class(store, *nested, keep, source, deletions, kept_spans);
    }
}

fn has_kept_descendant(store: &SymbolStore, class: SymbolId, keep: &BTreeSet<SymbolId>) -> bool {
    let c = store.class(class);
    c.fields.iter().any(|f| keep.contains(f))
        || c.methods.iter().any(|m| keep.contains(m))
        || c.nested
            .iter()
            .any(|n| keep.contains(n) || has_kept_descendant(store, *n, keep))
}

fn overlaps(a: &Span, b: &Span) -> bool {
    a.start < b.end && b.start < a.end
}

/// Extend a deletion through trailing horizontal whitespace and one
/// newline so removed members do not leave blank debris behind.
fn with_trailing_newline(source: &str, span: Span) -> Span {
    let bytes = source.as_bytes();
    let mut end = span.end;
    while end < bytes.len() && matches!(bytes[end], b' ' | b'\t' | b'\r') {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'\n' {
        end += 1;
    }
    Span { start: span.start, end }
}

/// Sorted, deduped, applied end-to-start; a range overlapping one that
/// was already applied is skipped rather than corrupting offsets.
fn apply_deletions(source: &str, mut spans: Vec<Span>) -> String {
    spans.sort();
    spans.dedup();
    let mut out = source.to_string();
    let mut prev_start = usize::MAX;
    for span in spans.iter().rev() {
        if span.end > prev_start || span.end > out.len() || span.start >= span.end {
            continue;
        }
        out.replace_range(span.start..span.end, "");
        prev_start = span.start;
    }
    out
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Whole-word occurrence check, Java identifier boundaries. The rescan
/// advances one whole character at a time; identifiers may start with
/// multibyte characters and a byte-wise advance would split them.
fn word_present(text: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(pos) = text[from..].find(word) {
        let start = from + pos;
        let end = start + word.len();
        let before_ok = start == 0 || !is_ident_byte(bytes[start - 1]);
        let after_ok = end >= bytes.len() || !is_ident_byte(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        from = start + text[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}

/// Trim line-end whitespace and collapse runs of blank lines to one.
fn tidy(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    while out.ends_with("\n\n") {
        out.pop();
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────
