//! YAML document adapter
//!
//! serde_yaml is the external structured-document parser; this module maps
//! its tagged value model onto the loader's [`DocEntry`] sequences and
//! handles the `prefix:path` source-locator syntax. Directive tags are
//! `!include`, `!using`, `!remove_node`, `!remove_value` and `!mux`.

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::value::TaggedValue;
use serde_yaml::Value;

use super::{DocEntry, Directive, LoadError};

/// Split a source locator into its synthetic-prefix segments and the file
/// path. The separator is the first `:` not escaped as `\:`. Without a
/// prefix the document lands under a single `run` node; a relative prefix
/// is also anchored under `run`; an absolute prefix (`/a/b:file.yaml`)
/// names the whole ancestor chain itself.
pub fn split_locator(locator: &str) -> (Vec<String>, PathBuf) {
    match split_unescaped_colon(locator) {
        None => (vec!["run".to_string()], PathBuf::from(unescape(locator))),
        Some((prefix, path)) => {
            let mut segments: Vec<String> = unescape(prefix)
                .trim_matches('/')
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !prefix.starts_with('/') {
                segments.insert(0, "run".to_string());
            }
            (segments, PathBuf::from(unescape(path)))
        }
    }
}

fn split_unescaped_colon(s: &str) -> Option<(&str, &str)> {
    let bytes = s.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b':' && (i == 0 || bytes[i - 1] != b'\\') {
            return Some((&s[..i], &s[i + 1..]));
        }
    }
    None
}

fn unescape(s: &str) -> String {
    s.replace("\\:", ":")
}

/// Read and parse one document into entries. A null document yields no
/// entries.
pub fn document_entries(path: &Path) -> Result<Vec<DocEntry>, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_yaml::from_str(&text).map_err(|source| LoadError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    entries_from_value(value, path)
}

/// Convert a parsed node body into entries. Bodies are mappings (possibly
/// behind a `!mux` tag) or null for an empty node.
pub(super) fn entries_from_value(value: Value, path: &Path) -> Result<Vec<DocEntry>, LoadError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Mapping(mapping) => {
            let mut entries = Vec::new();
            for (key, val) in mapping {
                match key {
                    Value::Tagged(tagged) => entries.push(directive_entry(*tagged, val, path)?),
                    key => entries.push(plain_entry(key, val, path)?),
                }
            }
            Ok(entries)
        }
        Value::Tagged(tagged) if tag_name(&tagged) == "mux" => {
            let mut entries = entries_from_value(tagged.value, path)?;
            entries.push(DocEntry::Directive(Directive::Mux));
            Ok(entries)
        }
        other => Err(malformed(
            path,
            format!("node body must be a mapping or null, got {}", kind(&other)),
        )),
    }
}

/// A tagged mapping key is a directive; its mapping value is the argument.
fn directive_entry(key: TaggedValue, arg: Value, path: &Path) -> Result<DocEntry, LoadError> {
    let name = tag_name(&key);
    let directive = match name.as_str() {
        "include" => Directive::Include(string_arg(&name, arg, path)?),
        "using" => Directive::Using(string_arg(&name, arg, path)?),
        "remove_node" => Directive::RemoveNode(string_arg(&name, arg, path)?),
        "remove_value" => Directive::RemoveValue(string_arg(&name, arg, path)?),
        "mux" => Directive::Mux,
        other => {
            return Err(malformed(path, format!("unknown directive tag '!{other}'")));
        }
    };
    Ok(DocEntry::Directive(directive))
}

fn plain_entry(key: Value, val: Value, path: &Path) -> Result<DocEntry, LoadError> {
    let key = scalar_key(key, path)?;
    match val {
        Value::Null => Ok(DocEntry::Empty { key }),
        Value::Mapping(_) => Ok(DocEntry::Nested {
            entries: entries_from_value(val, path)?,
            key,
        }),
        Value::Tagged(tagged) if tag_name(&tagged) == "mux" => {
            let mut entries = entries_from_value(tagged.value, path)?;
            entries.push(DocEntry::Directive(Directive::Mux));
            Ok(DocEntry::Nested { key, entries })
        }
        Value::Tagged(tagged) => Err(malformed(
            path,
            format!(
                "unknown tag '{}' on value of '{}'",
                tagged.tag, key
            ),
        )),
        value => Ok(DocEntry::Scalar { key, value }),
    }
}

fn scalar_key(key: Value, path: &Path) -> Result<String, LoadError> {
    match key {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(malformed(
            path,
            format!("node name must be a scalar, got {}", kind(&other)),
        )),
    }
}

fn string_arg(directive: &str, arg: Value, path: &Path) -> Result<String, LoadError> {
    match arg {
        Value::String(s) => Ok(s),
        other => Err(malformed(
            path,
            format!("'!{directive}' expects a string, got {}", kind(&other)),
        )),
    }
}

fn tag_name(tagged: &TaggedValue) -> String {
    tagged.tag.to_string().trim_start_matches('!').to_string()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn malformed(path: &Path, detail: String) -> LoadError {
    LoadError::Malformed {
        path: path.display().to_string(),
        detail,
    }
}
