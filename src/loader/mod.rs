//! Directive-resolving tree loader
//!
//! Turns parsed documents into configuration trees and accumulates several
//! documents into one. Nested mappings become child nodes; directives are
//! interpreted while building:
//!
//! - `!include` loads another document and merges it into the node under
//!   construction (relative paths resolve against the including file)
//! - `!using` wraps the node in a chain of ancestors named by the prefix
//!   segments, at most once per node
//! - `!remove_node` / `!remove_value` queue tombstone controls applied at
//!   merge time (their target may not exist yet in isolation)
//! - `!mux` marks the node as a multiplex domain
//!
//! Structural failures are deterministic and abort the load; trees already
//! accumulated from earlier documents are not rolled back, the caller
//! discards the accumulator.

pub mod yaml;

use std::path::Path;

use serde_yaml::Value;

use crate::tree::{Control, Multiplex, NodeId, Tree};

/// Load failure, carrying the offending source locator.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid multiplex file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid multiplex file '{path}': {detail}")]
    Malformed { path: String, detail: String },

    #[error("file '{included}' included from '{from}' does not exist")]
    MissingInclude { included: String, from: String },

    #[error("'!using' can only be used once per node ({path}:{node})")]
    DuplicateUsing { path: String, node: String },

    #[error("injection '{spec}' requires at least key:value")]
    Injection { spec: String },
}

/// One entry of a parsed document: a value, an empty child, a child with
/// its own document, or a directive sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum DocEntry {
    Scalar { key: String, value: Value },
    Empty { key: String },
    Nested { key: String, entries: Vec<DocEntry> },
    Directive(Directive),
}

/// Directive sentinels recognized by the document parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Include(String),
    Using(String),
    RemoveNode(String),
    RemoveValue(String),
    Mux,
}

struct LoadCtx<'a> {
    /// File being resolved; include targets resolve against its directory.
    file: &'a Path,
    /// Value provenance, recorded only in debug mode.
    debug: bool,
}

impl LoadCtx<'_> {
    fn origin(&self) -> Option<String> {
        self.debug.then(|| self.file.display().to_string())
    }
}

/// Load several locators in order into one accumulator tree. Later
/// documents override earlier ones on conflicting values and flags.
pub fn load_documents<I, S>(locators: I, debug: bool) -> Result<Tree, LoadError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut accumulator = Tree::new();
    for locator in locators {
        accumulator.merge(load_document(locator.as_ref(), debug)?);
    }
    Ok(accumulator)
}

/// Load one `prefix:path` locator into a tree, wrapping the document in
/// the synthetic ancestor chain the prefix names (`run` by default).
pub fn load_document(locator: &str, debug: bool) -> Result<Tree, LoadError> {
    let (prefix, path) = yaml::split_locator(locator);
    let mut tree = load_file(&path, debug)?;
    apply_prefix(&mut tree, &prefix);
    Ok(tree)
}

/// Load a document with no prefix wrapping; also used for `!include`.
fn load_file(path: &Path, debug: bool) -> Result<Tree, LoadError> {
    let entries = yaml::document_entries(path)?;
    let ctx = LoadCtx { file: path, debug };
    let mut tree = Tree::new();
    let root = build_subtree(&mut tree, String::new(), &entries, &ctx)?;
    tree.set_root(root);
    Ok(tree)
}

/// Build a node named `name` from its document entries, returning the
/// outermost node (which differs from the built node when `!using` wraps
/// it in ancestors).
fn build_subtree(
    tree: &mut Tree,
    name: String,
    entries: &[DocEntry],
    ctx: &LoadCtx<'_>,
) -> Result<NodeId, LoadError> {
    let node = tree.alloc(name.clone());
    let mut using: Option<String> = None;

    for entry in entries {
        match entry {
            DocEntry::Scalar { key, value } => {
                tree.set_value(node, key.clone(), value.clone(), ctx.origin());
            }
            DocEntry::Empty { key } => {
                let child = tree.alloc(key.clone());
                tree.attach_or_merge(node, child);
            }
            DocEntry::Nested { key, entries } => {
                let child = build_subtree(tree, key.clone(), entries, ctx)?;
                tree.attach_or_merge(node, child);
            }
            DocEntry::Directive(Directive::Include(target)) => {
                let resolved = resolve_include(ctx.file, target);
                if !resolved.exists() {
                    return Err(LoadError::MissingInclude {
                        included: resolved.display().to_string(),
                        from: ctx.file.display().to_string(),
                    });
                }
                let included = load_file(&resolved, ctx.debug)?;
                tree.merge_from(node, &included, included.root());
            }
            DocEntry::Directive(Directive::Using(prefix)) => {
                if using.is_some() {
                    return Err(LoadError::DuplicateUsing {
                        path: ctx.file.display().to_string(),
                        node: name.clone(),
                    });
                }
                using = Some(strip_separators(prefix).to_string());
            }
            DocEntry::Directive(Directive::RemoveNode(target)) => {
                tree.push_control(node, Control::RemoveNode(target.clone()));
            }
            DocEntry::Directive(Directive::RemoveValue(key)) => {
                tree.push_control(node, Control::RemoveValue(key.clone()));
            }
            DocEntry::Directive(Directive::Mux) => {
                tree.set_multiplex(node, Multiplex::Enabled);
            }
        }
    }

    match using {
        None => Ok(node),
        Some(prefix) => Ok(wrap_using(tree, node, &name, &prefix)),
    }
}

/// Strip at most one leading and one trailing separator.
fn strip_separators(prefix: &str) -> &str {
    let prefix = prefix.strip_prefix('/').unwrap_or(prefix);
    prefix.strip_suffix('/').unwrap_or(prefix)
}

/// Wrap `node` in a chain of single-child ancestors named by the prefix
/// segments, innermost segment closest to the node. A document root keeps
/// its empty name at the top of the chain. Empty segments are dropped (the
/// root is the only empty-named node); a prefix without any segment left
/// wraps nothing.
fn wrap_using(tree: &mut Tree, node: NodeId, name: &str, prefix: &str) -> NodeId {
    let segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
    if !name.is_empty() {
        let mut outer = node;
        for segment in segments.iter().rev() {
            let wrapper = tree.alloc(segment.to_string());
            tree.attach(wrapper, outer);
            outer = wrapper;
        }
        outer
    } else {
        let (last, rest) = match segments.split_last() {
            Some(split) => split,
            None => return node,
        };
        tree.rename(node, last.to_string());
        let mut outer = node;
        for segment in rest.iter().rev() {
            let wrapper = tree.alloc(segment.to_string());
            tree.attach(wrapper, outer);
            outer = wrapper;
        }
        let root = tree.alloc(String::new());
        tree.attach(root, outer);
        root
    }
}

fn resolve_include(from: &Path, target: &str) -> std::path::PathBuf {
    let target = Path::new(target);
    if target.is_absolute() {
        target.to_path_buf()
    } else {
        from.parent().unwrap_or(Path::new("")).join(target)
    }
}

/// Wrap a loaded document in its locator prefix chain under a fresh
/// empty-named root.
fn apply_prefix(tree: &mut Tree, prefix: &[String]) {
    let (last, rest) = match prefix.split_last() {
        Some(split) => split,
        None => return,
    };
    tree.rename(tree.root(), last.clone());
    for segment in rest.iter().rev() {
        tree.wrap_root(segment.clone());
    }
    tree.wrap_root(String::new());
}
