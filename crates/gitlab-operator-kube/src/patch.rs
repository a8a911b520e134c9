//! Three-way patch computation
//!
//! A three-way patch is built from:
//! - `original`: the configuration last applied, read from the object's
//!   annotation,
//! - `modified`: the configuration being applied now,
//! - `current`: the live object.
//!
//! Fields removed between `original` and `modified` are deleted. Fields that
//! differ between `current` and `modified` are set. Everything the server
//! (or anyone else) added on its own is left alone.

use serde_json::{Map, Value};

use crate::error::{KubeError, Result};
use crate::scheme::{child_path, PatchMeta};

const DIRECTIVE_MARKER: &str = "$patch";
const DELETE_DIRECTIVE: &str = "delete";
const SET_ELEMENT_ORDER_PREFIX: &str = "$setElementOrder/";

/// Metadata keys that are owned by the server and never patched
const IGNORED_METADATA_KEYS: &[&str] = &["creationTimestamp"];

/// Which side of a diff to keep
#[derive(Debug, Clone, Copy, Default)]
struct DiffOptions {
    ignore_deletions: bool,
    ignore_changes_and_additions: bool,
}

impl DiffOptions {
    fn deletions_only() -> Self {
        Self {
            ignore_deletions: false,
            ignore_changes_and_additions: true,
        }
    }

    fn changes_only() -> Self {
        Self {
            ignore_deletions: true,
            ignore_changes_and_additions: false,
        }
    }
}

/// `{}` and `{"metadata":{}}` change nothing
pub fn is_empty_patch(patch: &Value) -> bool {
    match patch.as_object() {
        Some(map) if map.is_empty() => true,
        Some(map) if map.len() == 1 => map
            .get("metadata")
            .and_then(Value::as_object)
            .is_some_and(Map::is_empty),
        _ => false,
    }
}

// JSON merge patch (RFC 7386)

/// Three-way JSON merge patch
///
/// Lists are replaced wholesale. Fails with `PreconditionFailed` when the
/// patch would change apiVersion, kind or metadata.name.
pub fn three_way_json_merge_patch(
    original: Option<&Value>,
    modified: &Value,
    current: &Value,
) -> Result<Value> {
    let empty = Value::Object(Map::new());
    let original = original.unwrap_or(&empty);

    let deletions = keep_deletions(&json_merge_diff(original, modified));
    let changes = drop_deletions(&json_merge_diff(current, modified));

    let mut patch = deletions;
    merge_patches(&mut patch, &changes, None, "");
    strip_ignored_metadata(&mut patch);
    require_identity_unchanged(&patch, modified)?;

    Ok(Value::Object(patch))
}

/// Apply a JSON merge patch to `target`
pub fn apply_json_merge_patch(target: &Value, patch: &Value) -> Value {
    let mut result = target.clone();
    json_merge(&mut result, patch);
    result
}

fn json_merge(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                json_merge(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// The merge patch that turns `from` into `to`
fn json_merge_diff(from: &Value, to: &Value) -> Map<String, Value> {
    let mut patch = Map::new();
    let (Value::Object(from), Value::Object(to)) = (from, to) else {
        return patch;
    };

    for (key, to_value) in to {
        match (from.get(key), to_value) {
            (Some(Value::Object(_)), Value::Object(_)) => {
                let nested = json_merge_diff(&from[key], to_value);
                if !nested.is_empty() {
                    patch.insert(key.clone(), Value::Object(nested));
                }
            }
            (Some(from_value), _) if from_value == to_value => {}
            _ => {
                patch.insert(key.clone(), to_value.clone());
            }
        }
    }
    for key in from.keys() {
        if !to.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }

    patch
}

fn keep_deletions(patch: &Map<String, Value>) -> Map<String, Value> {
    let mut result = Map::new();
    for (key, value) in patch {
        match value {
            Value::Null => {
                result.insert(key.clone(), Value::Null);
            }
            Value::Object(nested) => {
                let nested = keep_deletions(nested);
                if !nested.is_empty() {
                    result.insert(key.clone(), Value::Object(nested));
                }
            }
            _ => {}
        }
    }
    result
}

fn drop_deletions(patch: &Map<String, Value>) -> Map<String, Value> {
    let mut result = Map::new();
    for (key, value) in patch {
        match value {
            Value::Null => {}
            Value::Object(nested) => {
                let nested = drop_deletions(nested);
                if !nested.is_empty() {
                    result.insert(key.clone(), Value::Object(nested));
                }
            }
            _ => {
                result.insert(key.clone(), value.clone());
            }
        }
    }
    result
}

// Strategic merge patch

/// Three-way strategic merge patch
///
/// Lists with a merge key are patched element by element. Elements removed
/// since `original` get a `$patch: delete` directive and the element order of
/// `modified` is recorded under `$setElementOrder/<field>`.
///
/// Without `overwrite`, a patch that touches a field changed on the server
/// since `original` fails with `Conflict`.
pub fn three_way_strategic_merge_patch(
    original: Option<&Value>,
    modified: &Value,
    current: &Value,
    meta: &PatchMeta,
    overwrite: bool,
) -> Result<Value> {
    let empty = Map::new();
    let original_map = original.and_then(Value::as_object).unwrap_or(&empty);
    let modified_map = as_object(modified, "modified")?;
    let current_map = as_object(current, "current")?;

    let changes = diff_maps(current_map, modified_map, DiffOptions::changes_only(), meta, "");
    let deletions = diff_maps(original_map, modified_map, DiffOptions::deletions_only(), meta, "");

    let mut patch = deletions;
    merge_patches(&mut patch, &changes, Some(meta), "");

    if !overwrite {
        let drift = diff_maps(original_map, current_map, DiffOptions::default(), meta, "");
        if let Some(path) = first_conflict(&patch, &drift, "") {
            return Err(KubeError::Conflict {
                object: object_key(modified),
                message: format!("field {} was changed on the server", path),
            });
        }
    }

    strip_ignored_metadata(&mut patch);
    Ok(Value::Object(patch))
}

/// Apply a strategic merge patch to `target`
pub fn apply_strategic_merge_patch(target: &Value, patch: &Value, meta: &PatchMeta) -> Value {
    let mut result = match target {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    match patch {
        Value::Object(patch) => {
            strategic_merge_map(&mut result, patch, meta, "");
            Value::Object(result)
        }
        other => other.clone(),
    }
}

fn diff_maps(
    from: &Map<String, Value>,
    to: &Map<String, Value>,
    options: DiffOptions,
    meta: &PatchMeta,
    path: &str,
) -> Map<String, Value> {
    let mut patch = Map::new();

    for (key, to_value) in to {
        let Some(from_value) = from.get(key) else {
            if !options.ignore_changes_and_additions {
                patch.insert(key.clone(), to_value.clone());
            }
            continue;
        };

        match (from_value, to_value) {
            (Value::Object(f), Value::Object(t)) => {
                let nested = diff_maps(f, t, options, meta, &child_path(path, key));
                if !nested.is_empty() {
                    patch.insert(key.clone(), Value::Object(nested));
                }
            }
            (Value::Array(f), Value::Array(t)) => {
                diff_lists(key, &child_path(path, key), f, t, options, meta, &mut patch);
            }
            _ => {
                if from_value != to_value && !options.ignore_changes_and_additions {
                    patch.insert(key.clone(), to_value.clone());
                }
            }
        }
    }

    if !options.ignore_deletions {
        for key in from.keys() {
            if !to.contains_key(key) {
                patch.insert(key.clone(), Value::Null);
            }
        }
    }

    patch
}

fn diff_lists(
    field: &str,
    path: &str,
    from: &[Value],
    to: &[Value],
    options: DiffOptions,
    meta: &PatchMeta,
    patch: &mut Map<String, Value>,
) {
    let Some(merge_key) = meta.merge_key(path, to.iter().chain(from)) else {
        if from != to && !options.ignore_changes_and_additions {
            patch.insert(field.to_string(), Value::Array(to.to_vec()));
        }
        return;
    };

    let key_of = |item: &Value| item.get(merge_key).cloned();
    let mut items = Vec::new();

    for to_item in to {
        let key = key_of(to_item);
        let from_item = from.iter().find(|f| key.is_some() && key_of(*f) == key);
        match (from_item, to_item) {
            (Some(Value::Object(f)), Value::Object(t)) => {
                let mut nested = diff_maps(f, t, options, meta, path);
                if !nested.is_empty() {
                    if let Some(key) = key {
                        nested.insert(merge_key.to_string(), key);
                    }
                    items.push(Value::Object(nested));
                }
            }
            (Some(f), t) if f == t => {}
            _ if options.ignore_changes_and_additions => {}
            _ => items.push(to_item.clone()),
        }
    }

    if !options.ignore_deletions {
        for from_item in from {
            let key = key_of(from_item);
            if key.is_some() && !to.iter().any(|t| key_of(t) == key) {
                let mut directive = Map::new();
                directive.insert(
                    DIRECTIVE_MARKER.to_string(),
                    Value::String(DELETE_DIRECTIVE.to_string()),
                );
                if let Some(key) = key {
                    directive.insert(merge_key.to_string(), key);
                }
                items.push(Value::Object(directive));
            }
        }
    }

    let order: Vec<Value> = to.iter().filter_map(key_of).collect();
    let reordered = {
        let shared: Vec<Value> = from
            .iter()
            .filter_map(key_of)
            .filter(|k| order.contains(k))
            .collect();
        let expected: Vec<&Value> = order.iter().filter(|k| shared.contains(k)).collect();
        shared.iter().collect::<Vec<_>>() != expected
    };

    if !items.is_empty() {
        patch.insert(field.to_string(), Value::Array(items));
    }
    if !options.ignore_changes_and_additions && (patch.contains_key(field) || reordered) {
        let order = order
            .into_iter()
            .map(|k| {
                let mut entry = Map::new();
                entry.insert(merge_key.to_string(), k);
                Value::Object(entry)
            })
            .collect();
        patch.insert(
            format!("{}{}", SET_ELEMENT_ORDER_PREFIX, field),
            Value::Array(order),
        );
    }
}

fn strategic_merge_map(
    target: &mut Map<String, Value>,
    patch: &Map<String, Value>,
    meta: &PatchMeta,
    path: &str,
) {
    for (key, value) in patch {
        if key.starts_with('$') {
            continue;
        }
        match value {
            Value::Null => {
                target.remove(key);
            }
            Value::Object(nested) => {
                let entry = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                if let Value::Object(entry) = entry {
                    strategic_merge_map(entry, nested, meta, &child_path(path, key));
                }
            }
            Value::Array(items) => {
                let existing = target.get(key).and_then(Value::as_array);
                let list_path = child_path(path, key);
                let merge_key = meta
                    .merge_key(&list_path, items.iter().chain(existing.into_iter().flatten()))
                    .map(str::to_string);
                match merge_key {
                    Some(merge_key) => {
                        let mut list = match target.remove(key) {
                            Some(Value::Array(list)) => list,
                            _ => Vec::new(),
                        };
                        merge_list(&mut list, items, &merge_key, meta, &list_path);
                        target.insert(key.clone(), Value::Array(list));
                    }
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    for (key, order) in patch {
        let Some(field) = key.strip_prefix(SET_ELEMENT_ORDER_PREFIX) else {
            continue;
        };
        let (Some(Value::Array(list)), Value::Array(order)) = (target.get_mut(field), order) else {
            continue;
        };
        let Some(merge_key) = meta.merge_key(&child_path(path, field), order.iter()) else {
            continue;
        };
        reorder(list, order, merge_key);
    }
}

fn merge_list(
    list: &mut Vec<Value>,
    items: &[Value],
    merge_key: &str,
    meta: &PatchMeta,
    path: &str,
) {
    for item in items {
        let Value::Object(patch_item) = item else {
            list.push(item.clone());
            continue;
        };
        let key = patch_item.get(merge_key);
        let position = key.and_then(|key| list.iter().position(|e| e.get(merge_key) == Some(key)));

        let is_delete =
            patch_item.get(DIRECTIVE_MARKER).and_then(Value::as_str) == Some(DELETE_DIRECTIVE);
        match (is_delete, position) {
            (true, Some(position)) => {
                list.remove(position);
            }
            (true, None) => {}
            (false, Some(position)) => {
                if let Value::Object(existing) = &mut list[position] {
                    strategic_merge_map(existing, patch_item, meta, path);
                }
            }
            (false, None) => {
                let mut created = Map::new();
                strategic_merge_map(&mut created, patch_item, meta, path);
                list.push(Value::Object(created));
            }
        }
    }
}

/// Move elements named in `order` to the front, in that order
fn reorder(list: &mut Vec<Value>, order: &[Value], merge_key: &str) {
    let mut sorted = Vec::with_capacity(list.len());
    for entry in order {
        let Some(key) = entry.get(merge_key) else {
            continue;
        };
        if let Some(position) = list.iter().position(|e| e.get(merge_key) == Some(key)) {
            sorted.push(list.remove(position));
        }
    }
    sorted.append(list);
    *list = sorted;
}

// Shared helpers

/// Merge `overlay` into `base`
///
/// Lists present in both are joined; elements sharing a merge key are merged
/// into one.
fn merge_patches(
    base: &mut Map<String, Value>,
    overlay: &Map<String, Value>,
    meta: Option<&PatchMeta>,
    path: &str,
) {
    for (key, value) in overlay {
        let field_path = child_path(path, key);
        match (base.get_mut(key), value) {
            (Some(Value::Object(b)), Value::Object(o)) => merge_patches(b, o, meta, &field_path),
            (Some(Value::Array(b)), Value::Array(o)) if !key.starts_with('$') => {
                let merge_key = meta
                    .and_then(|m| m.merge_key(&field_path, b.iter().chain(o)))
                    .map(str::to_string);
                for item in o {
                    let position = merge_key.as_deref().and_then(|mk| {
                        let k = item.get(mk)?;
                        b.iter().position(|e| e.get(mk) == Some(k))
                    });
                    match (position, item) {
                        (Some(p), Value::Object(i)) if b[p].is_object() => {
                            if let Some(existing) = b[p].as_object_mut() {
                                merge_patches(existing, i, meta, &field_path);
                            }
                        }
                        _ => b.push(item.clone()),
                    }
                }
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn strip_ignored_metadata(patch: &mut Map<String, Value>) {
    if let Some(Value::Object(metadata)) = patch.get_mut("metadata") {
        for key in IGNORED_METADATA_KEYS {
            metadata.remove(*key);
        }
    }
}

fn require_identity_unchanged(patch: &Map<String, Value>, modified: &Value) -> Result<()> {
    let name_changed = patch
        .get("metadata")
        .and_then(Value::as_object)
        .is_some_and(|m| m.contains_key("name"));

    if patch.contains_key("apiVersion") || patch.contains_key("kind") || name_changed {
        return Err(KubeError::PreconditionFailed {
            object: object_key(modified),
        });
    }
    Ok(())
}

/// First path present in both patches with different values
fn first_conflict(
    patch: &Map<String, Value>,
    drift: &Map<String, Value>,
    prefix: &str,
) -> Option<String> {
    for (key, value) in patch {
        if key.starts_with('$') {
            continue;
        }
        let Some(other) = drift.get(key) else {
            continue;
        };
        let path = format!("{}.{}", prefix, key);
        match (value, other) {
            (Value::Object(a), Value::Object(b)) => {
                if let Some(path) = first_conflict(a, b, &path) {
                    return Some(path);
                }
            }
            _ if value != other => return Some(path),
            _ => {}
        }
    }
    None
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| KubeError::Serialization(format!("{} configuration is not an object", what)))
}

fn object_key(object: &Value) -> String {
    let metadata = object.get("metadata");
    let name = metadata
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    match metadata
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
    {
        Some(namespace) => format!("{}/{}", namespace, name),
        None => name.to_string(),
    }
}
