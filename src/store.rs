use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::{MapperError, Result};
use crate::expression::Expression;
use crate::value::{ConfigValue, ValueMap};

/// Suffix marking a key whose string value holds an expression.
pub const EXPRESSION_MARKER: &str = "$";

/// A path-addressable configuration tree. The empty path addresses the root.
pub trait ConfigStore {
    fn get(&self, path: &str) -> Option<ConfigValue>;
    /// Stores `value` so that `get` returns it unchanged, except that setting
    /// [`ConfigValue::Null`] removes the key and a later `get` yields `None`.
    fn set(&mut self, path: &str, value: ConfigValue);
    /// Removes a key together with all of its children.
    fn remove(&mut self, path: &str);
    fn exists(&self, path: &str) -> bool;
    /// Attaches comment lines either to the key itself or to its value.
    fn attach_comment(&mut self, path: &str, lines: Vec<String>, targets_key: bool);
    /// Reads attached comment lines; `None` if the path or the comment is absent.
    fn read_comment(&self, path: &str, targets_key: bool) -> Option<Vec<String>>;
}

/// In-memory configuration tree.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    root: ValueMap,
    comments: HashMap<(String, bool), Vec<String>>,
    marker: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::with_marker(EXPRESSION_MARKER)
    }
    pub fn with_marker(marker: &str) -> Self {
        Self { root: ValueMap::new(), comments: HashMap::new(), marker: marker.to_string() }
    }
    pub fn from_map(root: ValueMap) -> Self {
        Self { root, ..Self::new() }
    }
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        Self::new().load_json(json)
    }
    /// Loads every source of a layered `config::Config` (files, strings, environment).
    pub fn from_source(source: config::Config) -> Result<Self> {
        let json: serde_json::Value = source.try_deserialize()?;
        Self::from_json(&json)
    }
    /// Replaces the tree with the given JSON object; keys carrying the expression
    /// marker have it stripped and their string values parsed as expressions.
    pub fn load_json(mut self, json: &serde_json::Value) -> Result<Self> {
        self.root = match self.convert(json, false)? {
            ConfigValue::Map(map) => map,
            ConfigValue::Null => ValueMap::new(),
            other => {
                return Err(MapperError::Config(format!(
                    "Expected an object at the configuration root, found {}",
                    other.kind()
                )));
            }
        };
        self.comments.clear();
        debug!(keys = self.root.len(), "loaded configuration tree");
        Ok(self)
    }
    /// Writes the tree back out, expressions as their source text under marked keys.
    pub fn to_json(&self) -> serde_json::Value {
        self.export(&ConfigValue::Map(self.root.clone()))
    }
    pub fn root(&self) -> &ValueMap {
        &self.root
    }
    pub fn marker(&self) -> &str {
        &self.marker
    }

    fn convert(&self, json: &serde_json::Value, expression: bool) -> Result<ConfigValue> {
        use serde_json::Value;
        Ok(match json {
            Value::Null => ConfigValue::Null,
            Value::Bool(b) => ConfigValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(l) => ConfigValue::Long(l),
                None => ConfigValue::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) if expression => ConfigValue::Expression(Expression::parse(s)?),
            Value::String(s) => ConfigValue::String(s.clone()),
            Value::Array(items) => {
                ConfigValue::List(items.iter().map(|i| self.convert(i, expression)).collect::<Result<_>>()?)
            }
            Value::Object(entries) => {
                let mut map = ValueMap::new();
                for (key, value) in entries {
                    match key.strip_suffix(self.marker.as_str()).filter(|_| !self.marker.is_empty()) {
                        Some(stripped) => map.insert(stripped.to_string(), self.convert(value, true)?),
                        None => map.insert(key.clone(), self.convert(value, false)?),
                    };
                }
                ConfigValue::Map(map)
            }
        })
    }

    fn export(&self, value: &ConfigValue) -> serde_json::Value {
        use serde_json::Value;
        match value {
            ConfigValue::Null => Value::Null,
            ConfigValue::Bool(b) => Value::from(*b),
            ConfigValue::Long(l) => Value::from(*l),
            ConfigValue::Double(d) => Value::from(*d),
            ConfigValue::String(s) => Value::from(s.as_str()),
            ConfigValue::Expression(e) => Value::from(e.source()),
            ConfigValue::List(items) | ConfigValue::Set(items) => {
                Value::Array(items.iter().map(|i| self.export(i)).collect())
            }
            ConfigValue::Map(map) => {
                let mut object = serde_json::Map::new();
                for (key, value) in map {
                    let deferred = match value {
                        ConfigValue::Expression(_) => true,
                        ConfigValue::List(items) => items.iter().any(|i| matches!(i, ConfigValue::Expression(_))),
                        _ => false,
                    };
                    let key = if deferred { format!("{}{}", key, self.marker) } else { key.clone() };
                    object.insert(key, self.export(value));
                }
                Value::Object(object)
            }
        }
    }

    fn segments(path: &str) -> Vec<&str> {
        path.split('.').filter(|s| !s.is_empty()).collect()
    }

    fn normalize(path: &str) -> String {
        Self::segments(path).join(".")
    }

    fn lookup(&self, path: &str) -> Option<&ConfigValue> {
        let segments = Self::segments(path);
        let (last, parents) = segments.split_last()?;
        let mut current = &self.root;
        for segment in parents {
            match current.get(*segment) {
                Some(ConfigValue::Map(next)) => current = next,
                _ => return None,
            }
        }
        current.get(*last)
    }
}

impl ConfigStore for MemoryConfig {
    fn get(&self, path: &str) -> Option<ConfigValue> {
        if Self::segments(path).is_empty() {
            return Some(ConfigValue::Map(self.root.clone()));
        }
        self.lookup(path).cloned()
    }

    fn set(&mut self, path: &str, value: ConfigValue) {
        trace!(path, "setting value");
        if value.is_null() {
            self.remove(path);
            return;
        }
        let segments = Self::segments(path);
        let Some((last, parents)) = segments.split_last() else {
            if let ConfigValue::Map(map) = value {
                self.root = map;
            }
            return;
        };
        let mut current = &mut self.root;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| ConfigValue::Map(ValueMap::new()));
            if !matches!(entry, ConfigValue::Map(_)) {
                *entry = ConfigValue::Map(ValueMap::new());
            }
            let ConfigValue::Map(next) = entry else { return };
            current = next;
        }
        current.insert(last.to_string(), value);
    }

    fn remove(&mut self, path: &str) {
        trace!(path, "removing value");
        let normalized = Self::normalize(path);
        if normalized.is_empty() {
            self.root.clear();
            self.comments.clear();
            return;
        }
        let segments = Self::segments(path);
        let Some((last, parents)) = segments.split_last() else { return };
        let mut current = &mut self.root;
        for segment in parents {
            match current.get_mut(*segment) {
                Some(ConfigValue::Map(next)) => current = next,
                _ => return,
            }
        }
        current.remove(*last);
        let prefix = format!("{}.", normalized);
        self.comments.retain(|(key, _), _| key != &normalized && !key.starts_with(&prefix));
    }

    fn exists(&self, path: &str) -> bool {
        Self::segments(path).is_empty() || self.lookup(path).is_some()
    }

    fn attach_comment(&mut self, path: &str, lines: Vec<String>, targets_key: bool) {
        if !self.exists(path) {
            trace!(path, "not attaching a comment to an absent path");
            return;
        }
        self.comments.insert((Self::normalize(path), targets_key), lines);
    }

    fn read_comment(&self, path: &str, targets_key: bool) -> Option<Vec<String>> {
        if !self.exists(path) {
            return None;
        }
        self.comments.get(&(Self::normalize(path), targets_key)).cloned()
    }
}
