//! Variant identity and the runner-facing façade
//!
//! A variant's identifier is derived from its leaves sorted by path: the
//! dash-joined leaf names plus a 4-hex-character suffix of the SHA-256
//! digest over the concatenated leaf fingerprints. The suffix only exists
//! to tell apart variants whose leaf-name sequence collides while the
//! underlying values differ.
//!
//! [`Varianter`] is what the job runner consumes: it takes the filtered
//! mux tree, absorbs a defaults tree, and yields
//! `{variant_id, leaves, mux_path}` per variant. Ids are computed from the
//! mux tree itself and cached; enumerated leaves come from the
//! defaults+tree combination.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::loader::LoadError;
use crate::mux::PoolSet;
use crate::tree::{NodeId, Tree};

/// Length of the hex hash suffix on variant ids.
const ID_HASH_LEN: usize = 4;

/// Default lookup-path priority list handed to the runner when none is
/// configured. The engine carries it opaquely.
pub const DEFAULT_MUX_PATH: &str = "/run/*";

/// Snapshot of one leaf inside a variant.
#[derive(Debug, Clone, Serialize)]
pub struct VariantLeaf {
    pub name: String,
    pub path: String,
    pub values: serde_json::Map<String, serde_json::Value>,
    /// Source locators per value key; populated only in debug mode.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub origins: serde_json::Map<String, serde_json::Value>,
}

/// One enumerated variant as handed to the runner.
#[derive(Debug, Clone, Serialize)]
pub struct VariantSpec {
    pub variant_id: String,
    pub leaves: Vec<VariantLeaf>,
    pub mux_path: Vec<String>,
}

/// Produces variants for the job runner.
#[derive(Debug, Clone)]
pub struct Varianter {
    root: Tree,
    defaults: Option<Tree>,
    combination: Tree,
    mux_path: Vec<String>,
    variant_ids: Vec<String>,
}

impl Varianter {
    /// Build from a loaded, filtered mux tree. `mux_path` falls back to
    /// [`DEFAULT_MUX_PATH`] when not configured. Variant ids are computed
    /// once here and cached; they do not change when defaults arrive.
    pub fn new(root: Tree, mux_path: Option<Vec<String>>) -> Self {
        let mux_path = mux_path.unwrap_or_else(|| vec![DEFAULT_MUX_PATH.to_string()]);
        let variant_ids = compute_variant_ids(&root);
        let combination = root.clone();
        Self {
            root,
            defaults: None,
            combination,
            mux_path,
            variant_ids,
        }
    }

    /// Merge a defaults tree in. Later defaults win over earlier ones; the
    /// mux tree's own values win over any default. The combination tree
    /// that is actually enumerated is rebuilt on every call.
    pub fn update_defaults(&mut self, defaults: Tree) {
        match &mut self.defaults {
            Some(existing) => existing.merge(defaults),
            None => self.defaults = Some(defaults),
        }
        let mut combination = match &self.defaults {
            Some(defaults) => defaults.clone(),
            None => Tree::new(),
        };
        combination.merge(self.root.clone());
        self.combination = combination;
    }

    /// Total variant count.
    pub fn len(&self) -> usize {
        self.variant_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variant_ids.is_empty()
    }

    pub fn variant_ids(&self) -> &[String] {
        &self.variant_ids
    }

    pub fn mux_path(&self) -> &[String] {
        &self.mux_path
    }

    /// Iterate the variants, pairing each cached id with the leaves of the
    /// defaults+tree combination. Restartable; enumeration holds no
    /// per-variant resources, abandoning it early needs no cleanup.
    pub fn iter(&self) -> impl Iterator<Item = VariantSpec> + '_ {
        let variants = if self.combination.is_empty() {
            None
        } else {
            Some(PoolSet::partition(&self.combination, self.combination.root())
                .variants(&self.combination))
        };
        self.variant_ids
            .iter()
            .zip(variants.into_iter().flatten())
            .map(|(id, leaves)| VariantSpec {
                variant_id: id.clone(),
                leaves: leaves
                    .into_iter()
                    .map(|leaf| leaf_snapshot(&self.combination, leaf))
                    .collect(),
                mux_path: self.mux_path.clone(),
            })
    }
}

/// Apply a `[path:]key:value` injection to the tree, creating the node
/// when missing. Fewer than two fields is an error; with two, the path
/// defaults to the root.
pub fn inject_value(tree: &mut Tree, spec: &str) -> Result<(), LoadError> {
    let fields: Vec<&str> = spec.splitn(3, ':').collect();
    let (path, key, value) = match fields.as_slice() {
        [key, value] => ("", *key, *value),
        [path, key, value] => (*path, *key, *value),
        _ => return Err(LoadError::Injection { spec: spec.to_string() }),
    };
    let node = tree.ensure_node(path);
    tree.set_value(node, key, serde_yaml::Value::from(value), None);
    Ok(())
}

fn compute_variant_ids(tree: &Tree) -> Vec<String> {
    if tree.is_empty() {
        return Vec::new();
    }
    PoolSet::partition(tree, tree.root())
        .variants(tree)
        .map(|mut leaves| {
            leaves.sort_by_key(|&id| tree.path(id));
            variant_id(tree, &leaves)
        })
        .collect()
}

/// `<name>-<name>-...-<hash>` over the path-sorted leaves.
fn variant_id(tree: &Tree, leaves: &[NodeId]) -> String {
    let joined = leaves
        .iter()
        .map(|&id| fingerprint(tree, id))
        .collect::<Vec<_>>()
        .join("-");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    let digest = hex::encode(hasher.finalize());

    let mut id = leaves
        .iter()
        .map(|&id| tree.name(id).to_string())
        .collect::<Vec<_>>()
        .join("-");
    id.push('-');
    id.push_str(&digest[..ID_HASH_LEN]);
    id
}

/// Stable representation of a leaf: its path plus the canonical JSON
/// (RFC 8785) of its value mapping. Provenance is left out so debug mode
/// does not change ids.
fn fingerprint(tree: &Tree, id: NodeId) -> String {
    let mut map = serde_json::Map::new();
    for entry in tree.values(id) {
        map.insert(entry.key.clone(), yaml_to_json(entry.value.clone()));
    }
    let values = match serde_json_canonicalizer::to_vec(&serde_json::Value::Object(map)) {
        // Canonical JSON is valid UTF-8.
        Ok(canonical) => String::from_utf8_lossy(&canonical).into_owned(),
        // Unreachable for values produced by yaml_to_json; keep the
        // fingerprint deterministic anyway.
        Err(_) => format!("{:?}", tree.values(id)),
    };
    format!("{}{}", tree.path(id), values)
}

/// Convert a yaml value to JSON. Non-finite floats become null, mapping
/// keys are stringified, tagged values collapse to their inner value.
pub(crate) fn yaml_to_json(value: serde_yaml::Value) -> serde_json::Value {
    match value {
        serde_yaml::Value::Null => serde_json::Value::Null,
        serde_yaml::Value::Bool(b) => serde_json::Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                serde_json::Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
        }
        serde_yaml::Value::String(s) => serde_json::Value::String(s),
        serde_yaml::Value::Sequence(seq) => {
            serde_json::Value::Array(seq.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let map: serde_json::Map<String, serde_json::Value> = mapping
                .into_iter()
                .map(|(k, v)| (yaml_key_string(&k), yaml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key_string(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => format!("{other:?}"),
    }
}

fn leaf_snapshot(tree: &Tree, id: NodeId) -> VariantLeaf {
    let mut values = serde_json::Map::new();
    let mut origins = serde_json::Map::new();
    for entry in tree.values(id) {
        values.insert(entry.key.clone(), yaml_to_json(entry.value.clone()));
        if let Some(origin) = &entry.origin {
            origins.insert(entry.key.clone(), serde_json::Value::String(origin.clone()));
        }
    }
    VariantLeaf {
        name: tree.name(id).to_string(),
        path: tree.path(id),
        values,
        origins,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Multiplex;
    use serde_yaml::Value;

    fn sample_mux_tree() -> Tree {
        let mut tree = Tree::new();
        for (path, key, value) in [
            ("/run/os/linux", "pkg", "rpm"),
            ("/run/os/bsd", "pkg", "pkg"),
            ("/run/timeout", "seconds", "30"),
        ] {
            let node = tree.get_node(path, true).unwrap();
            tree.set_value(node, key, Value::from(value), None);
        }
        let os = tree.find_node("/run/os").unwrap();
        tree.set_multiplex(os, Multiplex::Enabled);
        tree
    }

    #[test]
    fn test_ids_are_sorted_names_plus_hash_suffix() {
        let varianter = Varianter::new(sample_mux_tree(), None);

        assert_eq!(varianter.len(), 2);
        for id in varianter.variant_ids() {
            let (names, hash) = id.rsplit_once('-').unwrap();
            assert_eq!(hash.len(), 4);
            assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(names == "linux-timeout" || names == "bsd-timeout");
        }
    }

    #[test]
    fn test_colliding_names_get_distinct_hashes() {
        // Same leaf names, different values: only the suffix tells them
        // apart.
        let mut a = sample_mux_tree();
        let linux = a.find_node("/run/os/linux").unwrap();
        a.set_value(linux, "pkg", Value::from("dnf"), None);

        let a_ids = Varianter::new(a, None);
        let b_ids = Varianter::new(sample_mux_tree(), None);
        assert_ne!(a_ids.variant_ids()[0], b_ids.variant_ids()[0]);

        let strip = |id: &str| id.rsplit_once('-').map(|(n, _)| n.to_string()).unwrap();
        assert_eq!(
            strip(&a_ids.variant_ids()[0]),
            strip(&b_ids.variant_ids()[0])
        );
    }

    #[test]
    fn test_value_insertion_order_does_not_change_ids() {
        // Fingerprints are canonical JSON, so key order is irrelevant.
        let mut a = Tree::new();
        let env = a.get_node("/run/env", true).unwrap();
        a.set_value(env, "x", Value::from(1), None);
        a.set_value(env, "y", Value::from(2), None);

        let mut b = Tree::new();
        let env = b.get_node("/run/env", true).unwrap();
        b.set_value(env, "y", Value::from(2), None);
        b.set_value(env, "x", Value::from(1), None);

        assert_eq!(
            Varianter::new(a, None).variant_ids(),
            Varianter::new(b, None).variant_ids()
        );
    }

    #[test]
    fn test_ids_deterministic_across_passes() {
        let first = Varianter::new(sample_mux_tree(), None);
        let second = Varianter::new(sample_mux_tree(), None);
        assert_eq!(first.variant_ids(), second.variant_ids());
    }

    #[test]
    fn test_debug_origins_do_not_change_ids() {
        let mut with_origin = sample_mux_tree();
        let linux = with_origin.find_node("/run/os/linux").unwrap();
        with_origin.set_value(
            linux,
            "pkg",
            Value::from("rpm"),
            Some("main.yaml".to_string()),
        );

        let a = Varianter::new(with_origin, None);
        let b = Varianter::new(sample_mux_tree(), None);
        assert_eq!(a.variant_ids(), b.variant_ids());
    }

    #[test]
    fn test_iteration_yields_id_leaves_and_mux_path() {
        let varianter = Varianter::new(sample_mux_tree(), None);
        let specs: Vec<VariantSpec> = varianter.iter().collect();

        assert_eq!(specs.len(), 2);
        for spec in &specs {
            assert_eq!(spec.mux_path, vec![DEFAULT_MUX_PATH.to_string()]);
            assert_eq!(spec.leaves.len(), 2);
            let paths: Vec<&str> = spec.leaves.iter().map(|l| l.path.as_str()).collect();
            assert!(paths.contains(&"/run/timeout"));
        }
    }

    #[test]
    fn test_update_defaults_later_defaults_win() {
        let mut varianter = Varianter::new(sample_mux_tree(), None);

        let mut first = Tree::new();
        let node = first.get_node("/run/timeout", true).unwrap();
        first.set_value(node, "retries", Value::from(1), None);
        varianter.update_defaults(first);

        let mut second = Tree::new();
        let node = second.get_node("/run/timeout", true).unwrap();
        second.set_value(node, "retries", Value::from(5), None);
        varianter.update_defaults(second);

        let spec = varianter.iter().next().unwrap();
        let timeout = spec
            .leaves
            .iter()
            .find(|l| l.path == "/run/timeout")
            .unwrap();
        assert_eq!(timeout.values["retries"], serde_json::json!(5));
        // The mux tree's own value survives the defaults merge.
        assert_eq!(timeout.values["seconds"], serde_json::json!("30"));
    }

    #[test]
    fn test_empty_tree_yields_zero_variants() {
        let varianter = Varianter::new(Tree::new(), None);
        assert_eq!(varianter.len(), 0);
        assert!(varianter.is_empty());
        assert_eq!(varianter.iter().count(), 0);
    }

    #[test]
    fn test_inject_value_with_and_without_path() {
        let mut tree = sample_mux_tree();
        inject_value(&mut tree, "/run/timeout:retries:3").unwrap();
        inject_value(&mut tree, "rootkey:rootval").unwrap();

        let timeout = tree.find_node("/run/timeout").unwrap();
        assert_eq!(
            tree.get_value(timeout, "retries"),
            Some(&Value::from("3"))
        );
        assert_eq!(
            tree.get_value(tree.root(), "rootkey"),
            Some(&Value::from("rootval"))
        );
    }

    #[test]
    fn test_inject_value_creates_missing_path() {
        let mut tree = Tree::new();
        inject_value(&mut tree, "/run/new/node:key:v").unwrap();

        let node = tree.find_node("/run/new/node").unwrap();
        assert_eq!(tree.get_value(node, "key"), Some(&Value::from("v")));
    }

    #[test]
    fn test_inject_value_requires_key_and_value() {
        let mut tree = Tree::new();
        let err = inject_value(&mut tree, "loner").unwrap_err();
        assert!(matches!(err, LoadError::Injection { .. }));
    }

    #[test]
    fn test_custom_mux_path_is_carried() {
        let varianter = Varianter::new(
            sample_mux_tree(),
            Some(vec!["/run/os/*".to_string(), "/run/*".to_string()]),
        );
        let spec = varianter.iter().next().unwrap();
        assert_eq!(spec.mux_path.len(), 2);
    }
}
