use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use depslice::classify::Classifier;
use depslice::config::{load_config, Config};
use depslice::frontend::index_repo;
use depslice::graph::{DependencyGraph, Explorer};
use depslice::model::{SymbolId, SymbolStore};
use depslice::persist::{load_session, rehydrate, save_session, to_serializable};
use depslice::render::render;
use depslice::slicer::slice;
use depslice::tree::SelectionTree;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "depslice")]
#[command(version)]
#[command(about = "Curated Java source context for LLM prompts (dependency-sliced)")]
struct Cli {
    /// Repository root (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Walk dependencies from one method and print the classified call tree as JSON
    Calls {
        /// Java file, relative to the repo root
        file: PathBuf,
        /// Root symbol, e.g. "OrderService#place(Order)" or "OrderService#place"
        #[arg(long)]
        at: String,
    },
    /// Print the minimized rewrite of one file keeping the given roots
    Slice {
        file: PathBuf,
        /// Root symbol; repeatable
        #[arg(long = "at", required = true)]
        at: Vec<String>,
    },
    /// Add a file, class, or method to the session selection
    Add {
        file: PathBuf,
        /// "Class" or "Class#method(paramTypes)"; omit to add the whole file
        symbol: Option<String>,
        /// Add a class as an empty partial selection instead of whole
        #[arg(long)]
        partial: bool,
    },
    /// Remove a file, class, or method from the session selection
    Remove {
        file: PathBuf,
        symbol: Option<String>,
    },
    /// Walk dependencies from one method and add everything visited to the session
    Pick {
        file: PathBuf,
        #[arg(long)]
        at: String,
    },
    /// Print the persisted session JSON
    Show,
    /// Render the whole selection to prompt text
    Render,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let repo_root = match cli.root {
        Some(r) => r,
        None => std::env::current_dir().context("Failed to get current dir")?,
    };
    let cfg = load_config(&repo_root);
    let store = index_repo(&repo_root)?;
    let classifier = Classifier::with_rules(
        cfg.classification.rules.clone(),
        cfg.classification.use_builtin,
    );

    match cli.cmd {
        Command::Calls { file, at } => {
            let file_sym = resolve_file(&store, &file)?;
            let root = resolve_symbol(&store, file_sym, &at)?;
            let explorer = Explorer::new(&store, &classifier).with_depth_budget(cfg.depth_budget);
            let mut graph = DependencyGraph::default();
            let node = explorer.explore(root, &mut graph, file_sym);
            println!("{}", serde_json::to_string_pretty(&node)?);
        }
        Command::Slice { file, at } => {
            let file_sym = resolve_file(&store, &file)?;
            let explorer = Explorer::new(&store, &classifier).with_depth_budget(cfg.depth_budget);
            let mut graph = DependencyGraph::default();
            for target in &at {
                let root = resolve_symbol(&store, file_sym, target)?;
                explorer.explore(root, &mut graph, file_sym);
            }
            let mut keep: BTreeSet<SymbolId> = graph.visited_symbols.clone();
            keep.extend(graph.visited_classes.iter().copied());
            print!("{}", slice(&store, file_sym, &keep)?);
        }
        Command::Add { file, symbol, partial } => {
            let mut tree = open_session(&repo_root, &cfg, &store)?;
            let file_sym = resolve_file(&store, &file)?;
            match symbol.as_deref() {
                None => {
                    tree.add_file(&store, file_sym, true)?;
                }
                Some(target) => match resolve_symbol(&store, file_sym, target)? {
                    id if store.as_class(id).is_some() => {
                        tree.add_class(&store, id, !partial)?;
                    }
                    id => {
                        tree.add_method(&store, id)?;
                    }
                },
            }
            close_session(&repo_root, &cfg, &store, &tree)?;
        }
        Command::Remove { file, symbol } => {
            let mut tree = open_session(&repo_root, &cfg, &store)?;
            let file_sym = resolve_file(&store, &file)?;
            match symbol.as_deref() {
                None => tree.remove_file(&store.file(file_sym).path)?,
                Some(target) => match resolve_symbol(&store, file_sym, target)? {
                    id if store.as_class(id).is_some() => tree.remove_class(&store, id)?,
                    id => tree.remove_method(&store, id)?,
                },
            }
            close_session(&repo_root, &cfg, &store, &tree)?;
        }
        Command::Pick { file, at } => {
            let mut tree = open_session(&repo_root, &cfg, &store)?;
            let file_sym = resolve_file(&store, &file)?;
            let root = resolve_symbol(&store, file_sym, &at)?;
            let explorer = Explorer::new(&store, &classifier).with_depth_budget(cfg.depth_budget);
            let mut graph = DependencyGraph::default();
            explorer.explore(root, &mut graph, file_sym);
            tree.absorb_graph(&store, &graph)?;
            close_session(&repo_root, &cfg, &store, &tree)?;
        }
        Command::Show => {
            let tree = open_session(&repo_root, &cfg, &store)?;
            let ser = to_serializable(&tree, &store)?;
            println!("{}", serde_json::to_string_pretty(&ser)?);
        }
        Command::Render => {
            let tree = open_session(&repo_root, &cfg, &store)?;
            let text = render(&tree, &store, &classifier, cfg.depth_budget)?;
            let out_dir = repo_root.join(&cfg.output_dir);
            std::fs::create_dir_all(&out_dir)?;
            std::fs::write(out_dir.join("context.md"), &text)?;
            print!("{text}");
        }
    }
    Ok(())
}

fn session_path(repo_root: &Path, cfg: &Config) -> PathBuf {
    repo_root.join(&cfg.output_dir).join("session.json")
}

/// Load and rehydrate the persisted session, or start a fresh one named
/// after the repo root. Stale entries are reported on stderr and dropped.
fn open_session(repo_root: &Path, cfg: &Config, store: &SymbolStore) -> Result<SelectionTree> {
    let path = session_path(repo_root, cfg);
    if !path.exists() {
        return Ok(SelectionTree::new(&project_name(repo_root)));
    }
    let ser = load_session(&path)?;
    let (tree, stale) = rehydrate(&ser, store)?;
    for entry in &stale {
        eprintln!("warning: dropped {entry}");
    }
    Ok(tree)
}

fn close_session(
    repo_root: &Path,
    cfg: &Config,
    store: &SymbolStore,
    tree: &SelectionTree,
) -> Result<()> {
    let ser = to_serializable(tree, store)?;
    save_session(&session_path(repo_root, cfg), &ser)
}

fn project_name(repo_root: &Path) -> String {
    repo_root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string())
}

fn resolve_file(store: &SymbolStore, file: &Path) -> Result<SymbolId> {
    let rel = file.to_string_lossy().replace('\\', "/");
    store
        .find_file(&rel)
        .with_context(|| format!("no indexed Java file at {rel}"))
}

/// Resolve "Class" or "Class#method" or "Class#method(T1, T2)" inside one
/// file. A parenless method reference must be unambiguous across
/// overloads.
fn resolve_symbol(store: &SymbolStore, file: SymbolId, target: &str) -> Result<SymbolId> {
    let (class_name, method_part) = match target.split_once('#') {
        Some((c, m)) => (c.trim(), Some(m.trim())),
        None => (target.trim(), None),
    };
    let class = store
        .find_class(file, class_name)
        .with_context(|| format!("no class named {class_name} in this file"))?;
    let Some(method_part) = method_part else {
        return Ok(class);
    };

    if let Some(open) = method_part.find('(') {
        let name = method_part[..open].trim();
        let inner = method_part[open..]
            .trim_start_matches('(')
            .trim_end_matches(')');
        let params: Vec<String> = if inner.trim().is_empty() {
            vec![]
        } else {
            inner.split(',').map(|p| p.trim().to_string()).collect()
        };
        return store
            .find_method(class, name, &params)
            .with_context(|| format!("no method {name}({}) on {class_name}", params.join(", ")));
    }

    let matches: Vec<SymbolId> = store
        .class(class)
        .methods
        .iter()
        .copied()
        .filter(|m| store.method(*m).name == method_part)
        .collect();
    match matches.as_slice() {
        [] => bail!("no method named {method_part} on {class_name}"),
        [one] => Ok(*one),
        many => bail!(
            "{} overloads of {class_name}#{method_part}; spell out the parameter types",
            many.len()
        ),
    }
}
