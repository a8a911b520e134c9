//! Values tree with Helm-style dotted paths and deep merge support

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Largest list index accepted by the path grammar.
pub const MAX_INDEX: usize = 65536;

/// Values container with deep merge capability
///
/// The root is always a mapping. Leaves are strings, numbers, booleans,
/// nulls or lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Default for Values {
    fn default() -> Self {
        Self::new()
    }
}

/// One step of a parsed dotted path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{}", k.replace('.', "\\.")),
            Segment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

fn render_path(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 && matches!(seg, Segment::Key(_)) {
            out.push('.');
        }
        out.push_str(&seg.to_string());
    }
    out
}

/// Parse a Helm dotted path such as `a.b[0].c` or `annotations.foo\.bar/baz`
pub fn parse_path(path: &str) -> Result<Vec<Segment>> {
    let invalid = |message: &str| CoreError::InvalidPath {
        path: path.to_string(),
        message: message.to_string(),
    };

    if path.is_empty() {
        return Err(invalid("empty path"));
    }

    let mut segments = Vec::new();
    let mut key = String::new();
    let mut chars = path.chars().peekable();
    // Set right after a `]` so that `a[0].b` and `a[0][1]` are accepted.
    let mut after_index = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or_else(|| invalid("dangling escape"))?;
                key.push(escaped);
                after_index = false;
            }
            '.' => {
                if key.is_empty() {
                    if !after_index {
                        return Err(invalid("empty key"));
                    }
                } else {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
                after_index = false;
                if chars.peek().is_none() {
                    return Err(invalid("path ends with a dot"));
                }
            }
            '[' => {
                if key.is_empty() && !after_index {
                    return Err(invalid("list index without a key"));
                }
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }

                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) if d.is_ascii_digit() => digits.push(d),
                        Some(_) => return Err(invalid("list index must be a number")),
                        None => return Err(invalid("unclosed list index")),
                    }
                }
                let index: usize = digits
                    .parse()
                    .map_err(|_| invalid("list index must be a number"))?;
                if index > MAX_INDEX {
                    return Err(invalid(&format!("list index exceeds {}", MAX_INDEX)));
                }
                segments.push(Segment::Index(index));
                after_index = true;

                match chars.peek() {
                    None | Some('.') | Some('[') => {}
                    Some(_) => return Err(invalid("unexpected character after list index")),
                }
            }
            _ => {
                if after_index {
                    return Err(invalid("unexpected character after list index"));
                }
                key.push(c);
            }
        }
    }

    if !key.is_empty() {
        segments.push(Segment::Key(key));
    }

    Ok(segments)
}

/// Best-effort scalar coercion used by `--set` style assignments
pub fn coerce_scalar(raw: &str) -> JsonValue {
    match raw {
        "true" => return JsonValue::Bool(true),
        "false" => return JsonValue::Bool(false),
        "null" => return JsonValue::Null,
        _ => {}
    }

    if let Some(inner) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        if inner.is_empty() {
            return JsonValue::Array(Vec::new());
        }
        return JsonValue::Array(inner.split(',').map(coerce_scalar).collect());
    }

    // "007" stays a string, the same way Helm keeps zero-padded values
    let zero_padded = raw.len() > 1 && raw.starts_with('0');
    if !zero_padded {
        if let Ok(n) = raw.parse::<i64>() {
            return JsonValue::Number(n.into());
        }
    }

    JsonValue::String(raw.to_string())
}

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(Map::new()))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut values = Self::new();
        values.add_from_yaml_file(path)?;
        Ok(values)
    }

    /// Parse values from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut values = Self::new();
        values.add_from_yaml(yaml)?;
        Ok(values)
    }

    /// Wrap an existing JSON mapping
    pub fn from_json_value(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Object(_) => Ok(Self(value)),
            JsonValue::Null => Ok(Self::new()),
            other => Err(CoreError::ValuesFile {
                file: "<inline>".to_string(),
                message: format!("expected a mapping, got {}", kind_name(&other)),
            }),
        }
    }

    /// Assign `value` at `path`, coercing it to bool, integer, null or list
    pub fn add_keyed_value(&mut self, path: &str, value: &str) -> Result<()> {
        let segments = parse_path(path)?;
        set_segments(&mut self.0, &segments, coerce_scalar(value));
        Ok(())
    }

    /// Assign `value` at `path`, always as a string
    pub fn add_string_value(&mut self, path: &str, value: &str) -> Result<()> {
        let segments = parse_path(path)?;
        set_segments(&mut self.0, &segments, JsonValue::String(value.to_string()));
        Ok(())
    }

    /// Assign the content of `file` at `path` as a string
    pub fn add_file_value<P: AsRef<Path>>(&mut self, path: &str, file: P) -> Result<()> {
        let segments = parse_path(path)?;
        let content =
            std::fs::read_to_string(file.as_ref()).map_err(|e| CoreError::ValuesFile {
                file: file.as_ref().display().to_string(),
                message: e.to_string(),
            })?;
        set_segments(&mut self.0, &segments, JsonValue::String(content));
        Ok(())
    }

    /// Deep merge a YAML file into the tree
    pub fn add_from_yaml_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let name = file.as_ref().display().to_string();
        let content = std::fs::read_to_string(file.as_ref()).map_err(|e| CoreError::ValuesFile {
            file: name.clone(),
            message: e.to_string(),
        })?;
        self.merge_yaml(&content, &name)
    }

    /// Deep merge a YAML document into the tree
    pub fn add_from_yaml(&mut self, yaml: &str) -> Result<()> {
        self.merge_yaml(yaml, "<inline>")
    }

    fn merge_yaml(&mut self, yaml: &str, source: &str) -> Result<()> {
        let parsed: JsonValue = serde_yaml::from_str(yaml).map_err(|e| CoreError::ValuesFile {
            file: source.to_string(),
            message: e.to_string(),
        })?;

        match parsed {
            JsonValue::Null => Ok(()),
            JsonValue::Object(_) => {
                deep_merge(&mut self.0, &parsed);
                Ok(())
            }
            other => Err(CoreError::ValuesFile {
                file: source.to_string(),
                message: format!("expected a mapping, got {}", kind_name(&other)),
            }),
        }
    }

    /// Look up a value, reporting where the traversal stopped
    pub fn get_value(&self, path: &str) -> Result<&JsonValue> {
        let segments = parse_path(path)?;
        let mut current = &self.0;

        for (i, seg) in segments.iter().enumerate() {
            let next = match (seg, current) {
                (Segment::Key(k), JsonValue::Object(map)) => map.get(k),
                (Segment::Index(idx), JsonValue::Array(list)) => list.get(*idx),
                _ => {
                    return Err(CoreError::ValueLookup {
                        message: format!(
                            "Leaf element at {} for {} key",
                            render_path(&segments[..i]),
                            path
                        ),
                    });
                }
            };

            current = next.ok_or_else(|| CoreError::ValueLookup {
                message: format!(
                    "Missing element at {} for {} key",
                    render_path(&segments[..=i]),
                    path
                ),
            })?;
        }

        Ok(current)
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        self.get_value(path).ok()
    }

    /// String leaf at `path`, or `default` when missing or not a string
    pub fn get_string(&self, path: &str, default: &str) -> String {
        match self.get(path) {
            Some(JsonValue::String(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    /// Boolean leaf at `path`, or `default` when missing or not a boolean
    pub fn get_bool(&self, path: &str, default: bool) -> bool {
        match self.get(path) {
            Some(JsonValue::Bool(b)) => *b,
            _ => default,
        }
    }

    /// Set a value by dotted path, without coercion
    pub fn set_value(&mut self, path: &str, value: impl Into<JsonValue>) -> Result<()> {
        if path.is_empty() {
            return Err(CoreError::InvalidPath {
                path: String::new(),
                message: "Can not set the root element".to_string(),
            });
        }
        let segments = parse_path(path)?;
        set_segments(&mut self.0, &segments, value.into());
        Ok(())
    }

    /// Deep merge another Values into this one
    ///
    /// Maps merge recursively, anything else on the right replaces the left.
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Fill keys that are missing here with `defaults`, recursively
    ///
    /// Existing values win. A `null` here removes the key, which is how a
    /// user switches off a chart default.
    pub fn coalesce_with(&mut self, defaults: &Values) {
        if let (JsonValue::Object(dst), JsonValue::Object(src)) = (&mut self.0, &defaults.0) {
            coalesce_maps(dst, src);
        }
    }

    /// The underlying tree
    pub fn as_map(&self) -> &Map<String, JsonValue> {
        match &self.0 {
            JsonValue::Object(map) => map,
            _ => empty_map(),
        }
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Serialize the tree as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        self.as_map().is_empty()
    }

    /// Scope values for a sub-chart
    ///
    /// The sub-chart sees `global` unchanged and the `<name>` subtree as its
    /// root values.
    pub fn scope_for_subchart(&self, subchart_name: &str) -> Values {
        let mut scoped = Map::new();
        let parent = self.as_map();

        if let Some(global) = parent.get("global") {
            scoped.insert("global".to_string(), global.clone());
        }

        if let Some(JsonValue::Object(subchart)) = parent.get(subchart_name) {
            for (k, v) in subchart {
                if k != "global" {
                    scoped.insert(k.clone(), v.clone());
                }
            }
        }

        Values(JsonValue::Object(scoped))
    }
}

fn empty_map() -> &'static Map<String, JsonValue> {
    static EMPTY: once_cell::sync::Lazy<Map<String, JsonValue>> =
        once_cell::sync::Lazy::new(Map::new);
    &EMPTY
}

fn kind_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "a mapping",
    }
}

/// Deep merge two JSON values
pub fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn coalesce_maps(dst: &mut Map<String, JsonValue>, src: &Map<String, JsonValue>) {
    for (key, default) in src {
        match dst.get_mut(key) {
            None => {
                dst.insert(key.clone(), default.clone());
            }
            Some(JsonValue::Null) => {
                dst.remove(key);
            }
            Some(JsonValue::Object(nested)) => {
                if let JsonValue::Object(default_nested) = default {
                    coalesce_maps(nested, default_nested);
                }
            }
            Some(_) => {}
        }
    }
}

fn set_segments(target: &mut JsonValue, segments: &[Segment], value: JsonValue) {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return;
    };

    match head {
        Segment::Key(key) => {
            if !target.is_object() {
                *target = JsonValue::Object(Map::new());
            }
            if let JsonValue::Object(map) = target {
                let slot = map.entry(key.clone()).or_insert(JsonValue::Null);
                set_segments(slot, rest, value);
            }
        }
        Segment::Index(index) => {
            if !target.is_array() {
                *target = JsonValue::Array(Vec::new());
            }
            if let JsonValue::Array(list) = target {
                if list.len() <= *index {
                    list.resize(index + 1, JsonValue::Null);
                }
                set_segments(&mut list[*index], rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_merge() {
        let mut base = Values::from_yaml(
            r#"
image:
  repository: registry.gitlab.com/gitlab-org/build/cng/gitlab-webservice-ee
  tag: "15.0.0"
replicas: 1
"#,
        )
        .unwrap();

        let overlay = Values::from_yaml(
            r#"
image:
  tag: "15.1.0"
  pullPolicy: Always
replicas: 3
"#,
        )
        .unwrap();

        base.merge(&overlay);

        assert_eq!(
            base.get("image.repository").unwrap(),
            "registry.gitlab.com/gitlab-org/build/cng/gitlab-webservice-ee"
        );
        assert_eq!(base.get("image.tag").unwrap(), "15.1.0");
        assert_eq!(base.get("image.pullPolicy").unwrap(), "Always");
        assert_eq!(base.get("replicas").unwrap(), 3);
    }

    #[test]
    fn test_scalar_replaces_map() {
        let mut base = Values::from_yaml("a:\n  b: 1\n").unwrap();
        base.merge(&Values::from_yaml("a: flat\n").unwrap());
        assert_eq!(base.get("a").unwrap(), "flat");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut once = Values::from_yaml("global:\n  hosts:\n    domain: example.com\n").unwrap();
        let update = Values::from_yaml("global:\n  hosts:\n    https: false\nredis:\n  install: true\n").unwrap();

        once.merge(&update);
        let mut twice = once.clone();
        twice.merge(&update);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_add_keyed_value_coercion() {
        let mut values = Values::new();
        values.add_keyed_value("gitlab.webservice.enabled", "false").unwrap();
        values.add_keyed_value("gitlab.webservice.replicas", "3").unwrap();
        values.add_keyed_value("global.edition", "ce").unwrap();
        values.add_keyed_value("global.psql.port", "05432").unwrap();
        values.add_keyed_value("global.empty", "null").unwrap();
        values.add_keyed_value("global.hosts.list", "{a,b,3}").unwrap();

        assert_eq!(values.get("gitlab.webservice.enabled").unwrap(), false);
        assert_eq!(values.get("gitlab.webservice.replicas").unwrap(), 3);
        assert_eq!(values.get("global.edition").unwrap(), "ce");
        assert_eq!(values.get("global.psql.port").unwrap(), "05432");
        assert!(values.get("global.empty").unwrap().is_null());
        assert_eq!(values.get("global.hosts.list").unwrap(), &json!(["a", "b", 3]));
    }

    #[test]
    fn test_add_keyed_value_with_index() {
        let mut values = Values::new();
        values.add_keyed_value("servers[2].port", "80").unwrap();
        values.add_keyed_value("servers[0].name", "first").unwrap();

        assert_eq!(
            values.inner(),
            &json!({"servers": [{"name": "first"}, null, {"port": 80}]})
        );
        assert_eq!(values.get("servers[2].port").unwrap(), 80);
    }

    #[test]
    fn test_add_keyed_value_escaped_dot() {
        let mut values = Values::new();
        values
            .add_keyed_value("annotations.kubernetes\\.io/ingress\\.class", "nginx")
            .unwrap();

        let annotations = values.get("annotations").unwrap();
        assert_eq!(annotations["kubernetes.io/ingress.class"], "nginx");
    }

    #[test]
    fn test_add_string_value_keeps_string() {
        let mut values = Values::new();
        values.add_string_value("global.gitlabVersion", "15").unwrap();
        values.add_string_value("flag", "true").unwrap();

        assert_eq!(values.get("global.gitlabVersion").unwrap(), "15");
        assert_eq!(values.get("flag").unwrap(), "true");
    }

    #[test]
    fn test_add_file_value() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("license.txt");
        std::fs::write(&file, "LICENSE-DATA\n").unwrap();

        let mut values = Values::new();
        values.add_file_value("global.license", &file).unwrap();

        assert_eq!(values.get("global.license").unwrap(), "LICENSE-DATA\n");
    }

    #[test]
    fn test_add_file_value_missing_file() {
        let mut values = Values::new();
        let err = values
            .add_file_value("global.license", "/does/not/exist.txt")
            .unwrap_err();

        assert!(err.to_string().contains("/does/not/exist.txt"));
    }

    #[test]
    fn test_invalid_paths() {
        let mut values = Values::new();
        for path in ["", "a..b", "a.", "[0]", "a[x]", "a[1", "a[1]b", "a[70000]"] {
            let err = values.add_keyed_value(path, "1").unwrap_err();
            assert!(
                matches!(err, CoreError::InvalidPath { .. }),
                "expected invalid path for {:?}",
                path
            );
        }
    }

    #[test]
    fn test_add_from_yaml_reports_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.yaml");
        std::fs::write(&file, "a: [unclosed\n").unwrap();

        let mut values = Values::new();
        let err = values.add_from_yaml_file(&file).unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));

        let err = values.add_from_yaml("- just\n- a list\n").unwrap_err();
        assert!(err.to_string().contains("expected a mapping"));
    }

    #[test]
    fn test_get_value_errors() {
        let values = Values::from_yaml("global:\n  hosts:\n    domain: example.com\n").unwrap();

        let missing = values.get_value("global.ingress.class").unwrap_err();
        assert_eq!(
            missing.to_string(),
            "Missing element at global.ingress for global.ingress.class key"
        );

        let leaf = values.get_value("global.hosts.domain.name").unwrap_err();
        assert_eq!(
            leaf.to_string(),
            "Leaf element at global.hosts.domain for global.hosts.domain.name key"
        );
    }

    #[test]
    fn test_typed_getters_fall_back_to_default() {
        let values = Values::from_yaml(
            r#"
global:
  hosts:
    externalIP: 10.0.0.1
  ingress:
    configureCertmanager: "yes"
redis:
  install: false
"#,
        )
        .unwrap();

        assert_eq!(values.get_string("global.hosts.externalIP", ""), "10.0.0.1");
        assert_eq!(values.get_string("global.hosts.domain", "example.com"), "example.com");
        assert!(!values.get_bool("redis.install", true));
        // wrong leaf type
        assert!(values.get_bool("global.ingress.configureCertmanager", true));
        assert!(!values.get_bool("postgresql.install", false));
    }

    #[test]
    fn test_set_value() {
        let mut values = Values::new();
        values.set_value("global.hosts.domain", "example.com").unwrap();
        values.set_value("global.replicas", 2).unwrap();
        values.set_value("global.raw", json!({"a": [1, 2]})).unwrap();

        assert_eq!(values.get("global.hosts.domain").unwrap(), "example.com");
        assert_eq!(values.get("global.replicas").unwrap(), 2);
        assert_eq!(values.get("global.raw.a").unwrap(), &json!([1, 2]));

        let err = values.set_value("", "x").unwrap_err();
        assert!(err.to_string().contains("Can not set the root element"));
    }

    #[test]
    fn test_coalesce_with_defaults() {
        let mut user = Values::from_yaml(
            r#"
global:
  hosts:
    domain: example.com
  grafana:
    enabled: null
redis:
  install: false
"#,
        )
        .unwrap();

        let defaults = Values::from_yaml(
            r#"
global:
  hosts:
    domain: gitlab.example.com
    https: true
  grafana:
    enabled: false
redis:
  install: true
  metrics:
    enabled: true
"#,
        )
        .unwrap();

        user.coalesce_with(&defaults);

        assert_eq!(user.get("global.hosts.domain").unwrap(), "example.com");
        assert_eq!(user.get("global.hosts.https").unwrap(), true);
        assert!(user.get("global.grafana.enabled").is_none());
        assert_eq!(user.get("redis.install").unwrap(), false);
        assert_eq!(user.get("redis.metrics.enabled").unwrap(), true);
    }

    #[test]
    fn test_yaml_round_trip() {
        let values = Values::from_yaml(
            r#"
global:
  hosts:
    domain: example.com
  ports: [80, 443]
certmanager-issuer:
  email: admin@example.com
"#,
        )
        .unwrap();

        let again = Values::from_yaml(&values.to_yaml().unwrap()).unwrap();
        assert_eq!(values, again);
    }

    #[test]
    fn test_scope_for_subchart() {
        let parent = Values::from_yaml(
            r#"
global:
  hosts:
    domain: example.com
redis:
  install: true
  architecture: standalone
postgresql:
  install: false
"#,
        )
        .unwrap();

        let scoped = parent.scope_for_subchart("redis");

        assert_eq!(scoped.get("global.hosts.domain").unwrap(), "example.com");
        assert_eq!(scoped.get("install").unwrap(), true);
        assert_eq!(scoped.get("architecture").unwrap(), "standalone");
        assert!(scoped.get("postgresql").is_none());
        assert!(scoped.get("redis").is_none());
    }

    #[test]
    fn test_parse_path_segments() {
        let segments = parse_path("gitlab.webservice.deployments[1].ingress").unwrap();
        insta::assert_snapshot!(render_path(&segments), @"gitlab.webservice.deployments[1].ingress");
        assert_eq!(segments.len(), 5);
        assert_eq!(segments[3], Segment::Index(1));
    }
}
