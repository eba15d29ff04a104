use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use sectionmap::{ConfigMapper, ConfigValue, Fields, Interpreter, MapperError, MemoryConfig, Resolved, Section};

fn setup(json: serde_json::Value) -> ConfigMapper<MemoryConfig> {
    ConfigMapper::new(MemoryConfig::from_json(&json).expect("valid configuration"), Arc::new(Interpreter))
}

#[derive(Debug)]
struct Inventory {
    counts: HashMap<String, i64>,
    ids: HashSet<i64>,
    flags: BTreeMap<String, bool>,
    coords: [f64; 2],
    weights: Vec<f64>,
    grid: Vec<Vec<i64>>,
    extras: Vec<ConfigValue>,
}

impl Section for Inventory {
    fn construct() -> Option<Self> {
        Some(Self {
            counts: HashMap::new(),
            ids: HashSet::new(),
            flags: BTreeMap::new(),
            coords: [0.0; 2],
            weights: vec![9.0],
            grid: Vec::new(),
            extras: Vec::new(),
        })
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new()
            .field("counts", |s: &mut Self, v: HashMap<String, i64>| s.counts = v)
            .field("ids", |s: &mut Self, v: HashSet<i64>| s.ids = v)
            .field("flags", |s: &mut Self, v: BTreeMap<String, bool>| s.flags = v)
            .field("coords", |s: &mut Self, v: [f64; 2]| s.coords = v)
            .field("weights", |s: &mut Self, v: Vec<f64>| s.weights = v)
            .field("grid", |s: &mut Self, v: Vec<Vec<i64>>| s.grid = v)
            .field("extras", |s: &mut Self, v: Vec<ConfigValue>| s.extras = v)
    }
}

#[test]
fn map_entries_may_hold_expressions() {
    let mapper = setup(serde_json::json!({ "inventory": { "counts": { "k$": "5" } } }));
    let inventory: Inventory = mapper.map_section(Some("inventory")).unwrap();
    assert_eq!(inventory.counts, HashMap::from([("k".to_string(), 5)]));
}

#[test]
fn sets_and_ordered_maps() {
    let mapper = setup(serde_json::json!({
        "inventory": { "ids": [1, "1", 2], "flags": { "b": "no", "a": true } }
    }));
    let inventory: Inventory = mapper.map_section(Some("inventory")).unwrap();
    assert_eq!(inventory.ids, HashSet::from([1, 2]));
    let flags: Vec<(&str, bool)> = inventory.flags.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    assert_eq!(flags, vec![("a", true), ("b", false)]);
}

#[test]
fn fixed_size_arrays() {
    let mapper = setup(serde_json::json!({ "inventory": { "coords": [1, "2.5"] } }));
    let inventory: Inventory = mapper.map_section(Some("inventory")).unwrap();
    assert_eq!(inventory.coords, [1.0, 2.5]);

    let mapper = setup(serde_json::json!({ "inventory": { "coords": [1] } }));
    let err = mapper.map_section::<Inventory>(Some("inventory")).unwrap_err();
    assert_eq!(err.path(), Some("inventory.coords"));
    assert!(matches!(err.root_cause(), MapperError::TypeMismatch { .. }));
}

#[test]
fn list_expressions_are_evaluated_first() {
    let mapper = setup(serde_json::json!({ "inventory": { "weights$": "[1, 2 * 2]" } }));
    let inventory: Inventory = mapper.map_section(Some("inventory")).unwrap();
    assert_eq!(inventory.weights, vec![1.0, 4.0]);
}

#[test]
fn non_list_value_yields_an_empty_list() {
    let mapper = setup(serde_json::json!({ "inventory": { "weights": "heavy", "counts": 3 } }));
    let inventory: Inventory = mapper.map_section(Some("inventory")).unwrap();
    assert!(inventory.weights.is_empty());
    assert!(inventory.counts.is_empty());
}

#[test]
fn nested_lists_and_raw_elements() {
    let mapper = setup(serde_json::json!({
        "inventory": { "grid": [[1, 2], [3]], "extras": [1, "a", { "k": true }] }
    }));
    let inventory: Inventory = mapper.map_section(Some("inventory")).unwrap();
    assert_eq!(inventory.grid, vec![vec![1, 2], vec![3]]);
    assert_eq!(inventory.extras.len(), 3);
    assert_eq!(inventory.extras[1], ConfigValue::from("a"));
    assert!(matches!(inventory.extras[2], ConfigValue::Map(_)));
}

#[test]
fn element_errors_name_index_and_key() {
    let mapper = setup(serde_json::json!({ "inventory": { "weights": [1, "heavy", 3] } }));
    let err = mapper.map_section::<Inventory>(Some("inventory")).unwrap_err();
    assert_eq!(err.path(), Some("inventory.weights[1]"));

    let mapper = setup(serde_json::json!({ "inventory": { "counts": { "k": "x" } } }));
    let err = mapper.map_section::<Inventory>(Some("inventory")).unwrap_err();
    assert_eq!(err.path(), Some("inventory.counts.k"));

    let mapper = setup(serde_json::json!({ "inventory": { "counts": { "": "x" } } }));
    let err = mapper.map_section::<Inventory>(Some("inventory")).unwrap_err();
    assert_eq!(err.path(), Some("inventory.counts[\"\"]"));

    let mapper = setup(serde_json::json!({ "inventory": { "counts": { "[0]": "x" } } }));
    let err = mapper.map_section::<Inventory>(Some("inventory")).unwrap_err();
    assert_eq!(err.path(), Some("inventory.counts[\"[0]\"]"));

    let mapper = setup(serde_json::json!({ "inventory": { "grid": [[1], [2, "z"]] } }));
    let err = mapper.map_section::<Inventory>(Some("inventory")).unwrap_err();
    assert_eq!(err.path(), Some("inventory.grid[1][1]"));
}

#[derive(Debug, PartialEq)]
struct Endpoint {
    url: String,
    port: i64,
}

impl Section for Endpoint {
    fn construct() -> Option<Self> {
        Some(Self { url: String::new(), port: 443 })
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new()
            .field("url", |s: &mut Self, v: String| s.url = v)
            .field("port", |s: &mut Self, v: i64| s.port = v)
    }
}

#[derive(Debug, Default)]
struct Cluster {
    endpoints: Vec<Endpoint>,
    routes: HashMap<String, Endpoint>,
}

impl Section for Cluster {
    fn construct() -> Option<Self> {
        Some(Self::default())
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new()
            .field("endpoints", |s: &mut Self, v: Vec<Endpoint>| s.endpoints = v)
            .field("routes", |s: &mut Self, v: HashMap<String, Endpoint>| s.routes = v)
    }
}

#[test]
fn list_elements_may_be_sections() {
    let mapper = setup(serde_json::json!({
        "cluster": { "endpoints": [{ "url": "a", "port": 1 }, { "url": "b" }, "junk"] }
    }));
    let cluster: Cluster = mapper.map_section(Some("cluster")).unwrap();
    assert_eq!(
        cluster.endpoints,
        vec![
            Endpoint { url: "a".to_string(), port: 1 },
            Endpoint { url: "b".to_string(), port: 443 },
            Endpoint { url: String::new(), port: 443 },
        ]
    );
}

#[test]
fn map_values_may_be_sections() {
    let mapper = setup(serde_json::json!({ "cluster": { "routes": { "api": { "url": "x", "port": "8443" } } } }));
    let cluster: Cluster = mapper.map_section(Some("cluster")).unwrap();
    assert_eq!(cluster.routes["api"], Endpoint { url: "x".to_string(), port: 8443 });
}

#[test]
fn section_element_errors_are_located() {
    let mapper = setup(serde_json::json!({ "cluster": { "endpoints": [{}, { "port": "x" }] } }));
    let err = mapper.map_section::<Cluster>(Some("cluster")).unwrap_err();
    assert_eq!(err.path(), Some("cluster.endpoints[1].port"));
}

#[derive(Debug, Default)]
struct Loose {
    items: Vec<Resolved>,
}

impl Section for Loose {
    fn construct() -> Option<Self> {
        Some(Self::default())
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new().field("items", |s: &mut Self, v: Vec<Resolved>| s.items = v)
    }
}

#[test]
fn undecided_element_shapes_are_rejected() {
    for json in [serde_json::json!({ "items": [1] }), serde_json::json!({ "items": [] }), serde_json::json!({})] {
        let mapper = setup(json);
        let err = mapper.map_section::<Loose>(None).unwrap_err();
        assert!(matches!(err.root_cause(), MapperError::GenericTypeMissing(_)), "got {err}");
        assert_eq!(err.path(), Some("items"));
    }
}

#[derive(Debug, Default)]
struct LooseLookup {
    entries: HashMap<String, Vec<Resolved>>,
}

impl Section for LooseLookup {
    fn construct() -> Option<Self> {
        Some(Self::default())
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new().field("entries", |s: &mut Self, v: HashMap<String, Vec<Resolved>>| s.entries = v)
    }
}

#[test]
fn nested_undecided_element_shapes_are_rejected() {
    let mapper = setup(serde_json::json!({ "lookup": { "entries": {} } }));
    let err = mapper.map_section::<LooseLookup>(Some("lookup")).unwrap_err();
    assert!(matches!(err.root_cause(), MapperError::GenericTypeMissing(_)), "got {err}");
    assert_eq!(err.path(), Some("lookup.entries"));
}
