use tracing::trace;

use crate::error::{MapperError, Result};
use crate::store::ConfigStore;
use crate::value::{ConfigValue, ValueMap};

/// Joins two dotted paths without doubling or dropping the separator.
/// A missing or blank side yields the other side unchanged.
pub fn join_paths(a: Option<&str>, b: Option<&str>) -> String {
    let a = a.filter(|a| !a.trim().is_empty());
    let b = b.filter(|b| !b.trim().is_empty());
    match (a, b) {
        (None, None) => String::new(),
        (None, Some(b)) => b.to_string(),
        (Some(a), None) => a.to_string(),
        (Some(a), Some(b)) => match (a.ends_with('.'), b.starts_with('.')) {
            (true, true) => format!("{}{}", a, &b[1..]),
            (true, false) | (false, true) => format!("{}{}", a, b),
            (false, false) => format!("{}.{}", a, b),
        },
    }
}

/// Looks a path up either in the store or, when given, in an already fetched map.
///
/// Walking a map stops with `None` as soon as an intermediate segment is not a
/// map itself. The empty path addresses the whole source.
pub fn resolve_path(store: &dyn ConfigStore, path: &str, source: Option<&ValueMap>) -> Result<Option<ConfigValue>> {
    let Some(mut current) = source else {
        trace!(path, "no resolving source provided, looking up in config");
        return Ok(store.get(path));
    };
    trace!(path, "resolving source provided, walking map");
    let mut rest = path;
    while !rest.is_empty() {
        let (key, remainder) = rest.split_once('.').unwrap_or((rest, ""));
        if key.trim().is_empty() {
            return Err(MapperError::Mapping(format!("Cannot resolve a blank key in '{}'", path)));
        }
        let value = current.get(key);
        if remainder.is_empty() {
            return Ok(value.cloned());
        }
        match value {
            Some(ConfigValue::Map(next)) => current = next,
            _ => {
                trace!(key, "path part wasn't a map, returning none");
                return Ok(None);
            }
        }
        rest = remainder;
    }
    Ok(Some(ConfigValue::Map(current.clone())))
}
