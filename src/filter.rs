//! Path-based tree filtering
//!
//! Prunes a tree with "only" and "exclude" path rules before variants are
//! enumerated. Exclude is stronger than only: a node excluded by path can
//! never be brought back by an only rule. Invalid rules are inert, they
//! simply never match.

use crate::tree::{NodeId, Tree};

/// Parent path of a node path (`/run/os/linux` -> `/run/os`). The parent
/// of a top-level path is `/`.
pub fn path_parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Prune the tree in place.
///
/// Traversal is preorder. Every node is kept by default. An `only` rule
/// keeps the nodes whose path matches it exactly and drops that node's
/// siblings (nodes whose parent path equals the rule's parent path);
/// nodes elsewhere in the tree are unaffected. An `exclude` rule drops the
/// node whose path matches it exactly, subtree included, regardless of any
/// `only` rule. Trailing slashes are stripped from rules, empty rules are
/// ignored. Filtering an already-filtered tree with the same rules is a
/// no-op.
pub fn apply_filters(tree: &mut Tree, only: &[String], exclude: &[String]) {
    let only: Vec<&str> = only
        .iter()
        .map(|p| p.trim_end_matches('/'))
        .filter(|p| !p.is_empty())
        .collect();
    let exclude: Vec<&str> = exclude
        .iter()
        .map(|p| p.trim_end_matches('/'))
        .filter(|p| !p.is_empty())
        .collect();

    let mut stack: Vec<NodeId> = tree.children(tree.root()).iter().rev().copied().collect();
    while let Some(node) = stack.pop() {
        if keep_node(tree, node, &only, &exclude) {
            stack.extend(tree.children(node).iter().rev().copied());
        } else {
            // Detaching removes the whole subtree; its children are never
            // visited.
            tree.detach(node);
        }
    }
}

fn keep_node(tree: &Tree, node: NodeId, only: &[&str], exclude: &[&str]) -> bool {
    let path = tree.path(node);
    let parent_path = tree.parent(node).map(|p| tree.path(p));

    let mut keep = true;
    for rule in only {
        if path == *rule {
            keep = true;
            break;
        }
        if parent_path.as_deref() == Some(path_parent(rule)) {
            keep = false;
        }
    }
    for rule in exclude {
        if path == *rule {
            keep = false;
            break;
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    fn sample_tree() -> Tree {
        let mut tree = Tree::new();
        for (path, key, value) in [
            ("/run/os/linux", "pkg", "rpm"),
            ("/run/os/bsd", "pkg", "pkg"),
            ("/run/timeout", "seconds", "30"),
        ] {
            let node = tree.get_node(path, true).unwrap();
            tree.set_value(node, key, Value::from(value), None);
        }
        tree
    }

    fn paths(tree: &Tree) -> Vec<String> {
        tree.preorder(tree.root())
            .into_iter()
            .map(|id| tree.path(id))
            .collect()
    }

    #[test]
    fn test_path_parent() {
        assert_eq!(path_parent("/run/os/linux"), "/run/os");
        assert_eq!(path_parent("/run"), "/");
        assert_eq!(path_parent("run"), "/");
    }

    #[test]
    fn test_no_rules_keeps_everything() {
        let mut tree = sample_tree();
        apply_filters(&mut tree, &[], &[]);
        assert_eq!(
            paths(&tree),
            vec!["/run", "/run/os", "/run/os/linux", "/run/os/bsd", "/run/timeout"]
        );
    }

    #[test]
    fn test_exclude_removes_subtree() {
        let mut tree = sample_tree();
        apply_filters(&mut tree, &[], &["/run/os".to_string()]);
        assert_eq!(paths(&tree), vec!["/run", "/run/timeout"]);
    }

    #[test]
    fn test_only_drops_siblings_of_target() {
        let mut tree = sample_tree();
        apply_filters(&mut tree, &["/run/os/linux".to_string()], &[]);
        assert_eq!(
            paths(&tree),
            vec!["/run", "/run/os", "/run/os/linux", "/run/timeout"]
        );
    }

    #[test]
    fn test_exclude_wins_over_only() {
        let mut tree = sample_tree();
        apply_filters(
            &mut tree,
            &["/run/os/linux".to_string()],
            &["/run/os/linux".to_string()],
        );
        assert!(tree.find_node("/run/os/linux").is_none());
        assert!(tree.find_node("/run/os/bsd").is_none());
    }

    #[test]
    fn test_trailing_slash_and_empty_rules_ignored() {
        let mut tree = sample_tree();
        apply_filters(
            &mut tree,
            &[],
            &["".to_string(), "/run/os/bsd/".to_string()],
        );
        assert!(tree.find_node("/run/os/bsd").is_none());
        assert!(tree.find_node("/run/os/linux").is_some());
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let only = vec!["/run/os/linux".to_string()];
        let exclude = vec!["/run/timeout".to_string()];

        let mut tree = sample_tree();
        apply_filters(&mut tree, &only, &exclude);
        let first = paths(&tree);

        apply_filters(&mut tree, &only, &exclude);
        assert_eq!(paths(&tree), first);
    }

    #[test]
    fn test_unmatched_rules_are_inert() {
        let mut tree = sample_tree();
        apply_filters(
            &mut tree,
            &[],
            &["/no/such/path".to_string(), "not-a-path".to_string()],
        );
        assert_eq!(paths(&tree).len(), 5);
    }
}
