use std::sync::Arc;

use sectionmap::{
    ConfigMapper, ConfigStore, ConfigValue, Environment, Evaluable, FieldDescriptor, Fields, Interpreter, MapperError,
    MemoryConfig, Section, Shape,
};
use tracing_subscriber::EnvFilter;

fn setup(json: serde_json::Value) -> ConfigMapper<MemoryConfig> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    ConfigMapper::new(MemoryConfig::from_json(&json).expect("valid configuration"), Arc::new(Interpreter))
}

#[derive(Debug, Default)]
struct Profile {
    name: String,
    tags: Vec<String>,
}

impl Section for Profile {
    fn construct() -> Option<Self> {
        Some(Self::default())
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new()
            .field("name", |s: &mut Self, v: String| s.name = v)
            .field("tags", |s: &mut Self, v: Vec<String>| s.tags = v)
    }
}

#[derive(Debug)]
struct Limits {
    connections: i64,
    verbose: bool,
}

impl Section for Limits {
    fn construct() -> Option<Self> {
        Some(Self { connections: 10, verbose: false })
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new()
            .field("connections", |s: &mut Self, v: i64| s.connections = v)
            .field("verbose", |s: &mut Self, v: bool| s.verbose = v)
    }
}

#[derive(Debug)]
struct Server {
    host: String,
    port: i32,
    limits: Limits,
}

impl Section for Server {
    fn construct() -> Option<Self> {
        Some(Self { host: "0.0.0.0".to_string(), port: 80, limits: Limits { connections: 10, verbose: false } })
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new()
            .field("host", |s: &mut Self, v: String| s.host = v)
            .field("port", |s: &mut Self, v: i32| s.port = v)
            .field("limits", |s: &mut Self, v: Limits| s.limits = v)
    }
}

#[test]
fn maps_scalars_and_lists_at_the_root() {
    let mapper = setup(serde_json::json!({ "name": "x", "tags": ["a", "b"] }));
    let profile: Profile = mapper.map_section(None).unwrap();
    assert_eq!(profile.name, "x");
    assert_eq!(profile.tags, vec!["a", "b"]);
}

#[test]
fn maps_below_a_root_path() {
    let mapper = setup(serde_json::json!({
        "servers": { "main": { "host": "example.org", "port": "8080", "limits": { "connections": 50 } } }
    }));
    let server: Server = mapper.map_section(Some("servers.main")).unwrap();
    assert_eq!(server.host, "example.org");
    assert_eq!(server.port, 8080);
    assert_eq!(server.limits.connections, 50);
    assert!(!server.limits.verbose);
}

#[test]
fn absent_fields_keep_constructed_values() {
    let mapper = setup(serde_json::json!({ "server": { "host": "localhost" } }));
    let server: Server = mapper.map_section(Some("server")).unwrap();
    assert_eq!(server.host, "localhost");
    assert_eq!(server.port, 80);
    assert_eq!(server.limits.connections, 10);
}

#[test]
fn null_values_count_as_absent() {
    let mapper = setup(serde_json::json!({ "server": { "port": null } }));
    let server: Server = mapper.map_section(Some("server")).unwrap();
    assert_eq!(server.port, 80);
}

struct Counter {
    count: i64,
    label: String,
}

impl Section for Counter {
    fn construct() -> Option<Self> {
        Some(Self { count: 99, label: "unset".to_string() })
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new()
            .push(FieldDescriptor::new("count", |s: &mut Self, v: i64| s.count = v).always())
            .field("label", |s: &mut Self, v: String| s.label = v)
    }
}

#[test]
fn always_fields_are_coerced_from_null() {
    let mapper = setup(serde_json::json!({}));
    let counter: Counter = mapper.map_section(None).unwrap();
    assert_eq!(counter.count, 0);
    assert_eq!(counter.label, "unset");
}

struct Strict {
    retries: i64,
    name: String,
}

impl Section for Strict {
    fn construct() -> Option<Self> {
        Some(Self { retries: 5, name: "x".to_string() })
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new()
            .field("retries", |s: &mut Self, v: i64| s.retries = v)
            .field("name", |s: &mut Self, v: String| s.name = v)
    }
    fn always() -> bool {
        true
    }
}

#[test]
fn section_level_always_applies_to_every_field() {
    let mapper = setup(serde_json::json!({ "strict": { "name": "kept" } }));
    let strict: Strict = mapper.map_section(Some("strict")).unwrap();
    assert_eq!(strict.retries, 0);
    assert_eq!(strict.name, "kept");
}

#[derive(Debug)]
struct Flattened {
    title: String,
    limits: Limits,
}

impl Section for Flattened {
    fn construct() -> Option<Self> {
        Some(Self { title: String::new(), limits: Limits { connections: 10, verbose: false } })
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new()
            .field("title", |s: &mut Self, v: String| s.title = v)
            .push(FieldDescriptor::new("limits", |s: &mut Self, v: Limits| s.limits = v).inlined())
    }
}

#[test]
fn inlined_fields_reuse_the_parent_path() {
    let mapper = setup(serde_json::json!({ "site": { "title": "t", "connections": 3, "verbose": "yes" } }));
    let flattened: Flattened = mapper.map_section(Some("site")).unwrap();
    assert_eq!(flattened.title, "t");
    assert_eq!(flattened.limits.connections, 3);
    assert!(flattened.limits.verbose);
}

#[test]
fn inlined_errors_are_located_below_the_parent() {
    let mapper = setup(serde_json::json!({ "site": { "connections": "many" } }));
    let err = mapper.map_section::<Flattened>(Some("site")).unwrap_err();
    assert_eq!(err.path(), Some("site.connections"));
}

#[derive(Debug, Default)]
struct Identified {
    id: i64,
}

impl Section for Identified {
    fn construct() -> Option<Self> {
        Some(Self::default())
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new().field("id", |s: &mut Self, v: i64| s.id = v)
    }
}

#[derive(Debug, Default)]
struct Account {
    base: Identified,
    owner: String,
    secret: String,
}

impl Section for Account {
    fn construct() -> Option<Self> {
        Some(Self::default())
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new()
            .field("owner", |s: &mut Self, v: String| s.owner = v)
            .push(FieldDescriptor::new("secret", |s: &mut Self, v: String| s.secret = v).ignored())
            .inherit::<Identified>(|s| &mut s.base)
    }
}

#[test]
fn inherited_fields_are_mapped() {
    let mapper = setup(serde_json::json!({ "account": { "id": 7, "owner": "ann", "secret": "hunter2" } }));
    let account: Account = mapper.map_section(Some("account")).unwrap();
    assert_eq!(account.base.id, 7);
    assert_eq!(account.owner, "ann");
    assert_eq!(account.secret, "");
}

#[derive(Debug)]
struct Stamped {
    version: i64,
}

impl Section for Stamped {
    fn construct() -> Option<Self> {
        Some(Self { version: 3 })
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new().field("version", |s: &mut Self, v: i64| s.version = v)
    }
    fn always() -> bool {
        true
    }
}

#[derive(Debug)]
struct Document {
    stamp: Stamped,
    body: String,
}

impl Section for Document {
    fn construct() -> Option<Self> {
        Some(Self { stamp: Stamped { version: 3 }, body: "empty".to_string() })
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new()
            .field("body", |s: &mut Self, v: String| s.body = v)
            .inherit::<Stamped>(|s| &mut s.stamp)
    }
}

#[test]
fn always_of_an_inherited_section_sticks() {
    let mapper = setup(serde_json::json!({ "doc": {} }));
    let document: Document = mapper.map_section(Some("doc")).unwrap();
    assert_eq!(document.stamp.version, 0);
    assert_eq!(document.body, "empty");
}

#[derive(Debug)]
struct Looping;

impl Section for Looping {
    fn construct() -> Option<Self> {
        Some(Looping)
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new().push(FieldDescriptor::with_shape(
            "parent",
            Shape::section::<Looping>(),
            |_: &mut Self, _: ConfigValue| {},
        ))
    }
}

#[test]
fn self_referencing_fields_are_rejected() {
    let mapper = setup(serde_json::json!({}));
    let err = mapper.map_section::<Looping>(None).unwrap_err();
    assert!(matches!(err.root_cause(), MapperError::Mapping(message) if message.contains("self-referencing")));
}

#[derive(Debug)]
struct Unbuildable;

impl Section for Unbuildable {
    fn construct() -> Option<Self> {
        None
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new()
    }
}

#[test]
fn sections_without_constructor_fail() {
    let mapper = setup(serde_json::json!({}));
    let err = mapper.map_section::<Unbuildable>(None).unwrap_err();
    assert!(matches!(err, MapperError::NoDefaultConstructor(name) if name.ends_with("Unbuildable")), "got {err}");
}

#[test]
fn errors_carry_the_full_path() {
    let mapper = setup(serde_json::json!({
        "servers": { "main": { "port": "eighty", "limits": { "connections": "many" } } }
    }));
    let err = mapper.map_section::<Server>(Some("servers.main")).unwrap_err();
    assert_eq!(err.path(), Some("servers.main.port"));
    assert!(matches!(err.root_cause(), MapperError::Coercion { expected: "i64", .. }));
    assert!(err.to_string().contains("(at path 'servers.main.port')"), "got {err}");

    let mapper = setup(serde_json::json!({ "server": { "limits": { "connections": "many" } } }));
    let err = mapper.map_section::<Server>(Some("server")).unwrap_err();
    assert_eq!(err.path(), Some("server.limits.connections"));
}

#[derive(Debug, Default)]
struct Greeting {
    message: Option<Evaluable>,
    timeout: i64,
}

impl Section for Greeting {
    fn construct() -> Option<Self> {
        Some(Self::default())
    }
    fn describe_fields() -> Fields<Self> {
        Fields::new()
            .field("message", |s: &mut Self, v: Option<Evaluable>| s.message = v)
            .field("timeout", |s: &mut Self, v: i64| s.timeout = v)
    }
}

#[test]
fn evaluable_fields_defer_evaluation() {
    let mapper = setup(serde_json::json!({ "message$": "\"Hello, \" & user", "timeout$": "base * 2" }))
        .with_environment(Environment::new().with("base", 4i64));
    let greeting: Greeting = mapper.map_section(None).unwrap();
    assert_eq!(greeting.timeout, 8);

    let message = greeting.message.expect("message is mapped");
    let runtime = Environment::new().with("user", "Ann");
    assert_eq!(message.as_scalar::<String>(&runtime).unwrap(), "Hello, Ann");
    assert!(message.as_scalar::<String>(&Environment::default()).is_err());
}

#[test]
fn mapping_time_evaluation_without_bindings_fails() {
    let mapper = setup(serde_json::json!({ "timeout$": "base * 2" }));
    let err = mapper.map_section::<Greeting>(None).unwrap_err();
    assert_eq!(err.path(), Some("timeout"));
    assert!(matches!(err.root_cause(), MapperError::Expression(_)));
}

#[test]
fn store_changes_show_up_in_the_next_mapping() {
    let mut mapper = setup(serde_json::json!({ "name": "x" }));
    mapper.config_mut().set("name", ConfigValue::from("y"));
    let profile: Profile = mapper.map_section(None).unwrap();
    assert_eq!(profile.name, "y");
    assert!(mapper.config().exists("name"));
}
