//! Sectionmap – maps loosely typed configuration trees onto strongly typed sections.
//!
//! A configuration tree is made of [`value::ConfigValue`]s: scalars, lists,
//! sets, maps and deferred expressions. Mapping it onto Rust types centers on
//! the *section* concept:
//! * A [`section::Section`] is a type the mapper can construct and populate.
//!   It lists its fields in a [`section::Fields`] table instead of relying on
//!   reflection.
//! * A [`section::FieldDescriptor`] carries the field's name, its declared
//!   [`section::Shape`] and the markers `always`, `inlined` and `ignored`.
//! * A [`section::Target`] is any Rust type a field can be declared with;
//!   scalars, collections, nested sections, evaluables and raw values are built in.
//!
//! ## Modules
//! * [`datatype`] – The scalar registry: the [`datatype::ScalarType`] trait and
//!   the coercion rules for strings, integers, decimals and booleans.
//! * [`evaluable`] – [`evaluable::Evaluable`], interpreting a raw value as a
//!   scalar, list, set or map, evaluating deferred expressions on demand.
//! * [`expression`] – A small expression language (pest grammar in
//!   `expression.pest`) and the [`expression::Interpreter`] evaluating it.
//! * [`converter`] – Pluggable type substitution through [`converter::ConverterRegistry`].
//! * [`mapper`] – The [`mapper::ConfigMapper`] field resolution engine.
//! * [`path`] – Dotted path joining and resolution.
//! * [`store`] – The [`store::ConfigStore`] contract and the in-memory
//!   [`store::MemoryConfig`], loadable from JSON or any `config` crate source.
//!
//! ## Deferred Values
//! Keys suffixed with `$` hold expressions. They are parsed when the tree is
//! loaded but only evaluated when a field demands their value, so a field typed
//! as [`evaluable::Evaluable`] can postpone evaluation until runtime bindings exist.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use sectionmap::{ConfigMapper, Fields, Interpreter, MemoryConfig, Section};
//!
//! #[derive(Default)]
//! struct Server {
//!     host: String,
//!     ports: Vec<i64>,
//! }
//!
//! impl Section for Server {
//!     fn construct() -> Option<Self> {
//!         Some(Self::default())
//!     }
//!     fn describe_fields() -> Fields<Self> {
//!         Fields::new()
//!             .field("host", |s: &mut Self, v: String| s.host = v)
//!             .field("ports", |s: &mut Self, v: Vec<i64>| s.ports = v)
//!     }
//! }
//!
//! let json = serde_json::json!({
//!     "server": { "host": "localhost", "ports$": "[8080, 8000 + 81]" }
//! });
//! let mapper = ConfigMapper::new(MemoryConfig::from_json(&json).unwrap(), Arc::new(Interpreter));
//! let server: Server = mapper.map_section(Some("server")).unwrap();
//! assert_eq!(server.host, "localhost");
//! assert_eq!(server.ports, vec![8080, 8081]);
//! ```
//!
//! ## Errors
//! Every failure is a [`error::MapperError`]. Errors raised while mapping a
//! field are wrapped with the dotted path of the offending value, list indices
//! and map keys included, e.g. `servers[2].port`.

pub mod converter;
pub mod datatype;
pub mod error;
pub mod evaluable;
pub mod expression;
pub mod mapper;
pub mod path;
pub mod section;
pub mod store;
pub mod value;

pub use converter::{ConverterRegistry, ConverterTable, ValueConverter};
pub use datatype::{Scalar, ScalarKind, ScalarType};
pub use error::{MapperError, Result};
pub use evaluable::Evaluable;
pub use expression::{Environment, Evaluator, Expression, Interpreter};
pub use mapper::ConfigMapper;
pub use section::{Fields, FieldDescriptor, Resolved, Section, Shape, Target};
pub use store::{ConfigStore, MemoryConfig};
pub use value::{ConfigValue, ValueMap};
