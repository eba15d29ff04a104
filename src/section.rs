//! Describing mappable sections without reflection.
//!
//! Every mappable type implements [`Section`] and lists its fields in
//! [`Section::describe_fields`]. A field's declared [`Shape`] is derived from
//! its Rust type through [`Target`], which also turns the engine's untyped
//! [`Resolved`] result back into that Rust type. Fields whose type is
//! [`Resolved`] itself have the `Any` shape, their concrete shape is decided
//! per instance through [`Section::runtime_decide`].

use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use crate::datatype::{Scalar, ScalarKind, ScalarType};
use crate::error::{MapperError, Result};
use crate::evaluable::Evaluable;
use crate::mapper::MappingEngine;
use crate::value::{ConfigValue, ValueMap};

pub(crate) type MapFn = fn(&MappingEngine<'_>, &str, Option<&ValueMap>) -> Result<Box<dyn Any>>;

/// Type tag of a section type, able to map a fresh instance of it.
#[derive(Clone, Copy)]
pub struct SectionRef {
    type_id: TypeId,
    name: &'static str,
    map: MapFn,
}

fn map_boxed<T: Section>(engine: &MappingEngine<'_>, root: &str, source: Option<&ValueMap>) -> Result<Box<dyn Any>> {
    Ok(Box::new(engine.map_section_sub::<T>(root, source)?))
}

impl SectionRef {
    pub fn of<T: Section>() -> Self {
        Self { type_id: TypeId::of::<T>(), name: type_name::<T>(), map: map_boxed::<T> }
    }
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
    pub fn name(&self) -> &'static str {
        self.name
    }
    pub(crate) fn map(&self, engine: &MappingEngine<'_>, root: &str, source: Option<&ValueMap>) -> Result<Box<dyn Any>> {
        (self.map)(engine, root, source)
    }
}

impl PartialEq for SectionRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl fmt::Debug for SectionRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SectionRef({})", self.name)
    }
}

/// Type tag of a user type produced by a converter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CustomRef {
    type_id: TypeId,
    name: &'static str,
}

impl CustomRef {
    pub fn of<T: 'static>() -> Self {
        Self { type_id: TypeId::of::<T>(), name: type_name::<T>() }
    }
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// The declared shape of a field, or of an element inside a container.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Scalar(ScalarKind),
    List(Box<Shape>),
    Set(Box<Shape>),
    Map(Box<Shape>, Box<Shape>),
    Array(Box<Shape>),
    Section(SectionRef),
    /// Kept unevaluated for evaluation against a later environment.
    Evaluable,
    /// Plain pass-through of the raw value.
    Raw,
    /// Decided per instance by [`Section::runtime_decide`].
    Any,
    Custom(CustomRef),
}

impl Shape {
    pub fn of<T: Target>() -> Shape {
        T::shape()
    }
    pub fn section<T: Section>() -> Shape {
        Shape::Section(SectionRef::of::<T>())
    }
    pub fn custom<T: 'static>() -> Shape {
        Shape::Custom(CustomRef::of::<T>())
    }
    pub fn list(element: Shape) -> Shape {
        Shape::List(Box::new(element))
    }
    pub fn set(element: Shape) -> Shape {
        Shape::Set(Box::new(element))
    }
    pub fn map(key: Shape, value: Shape) -> Shape {
        Shape::Map(Box::new(key), Box::new(value))
    }
    pub fn array(element: Shape) -> Shape {
        Shape::Array(Box::new(element))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Shape::Scalar(kind) => write!(f, "{}", kind),
            Shape::List(element) => write!(f, "List<{}>", element),
            Shape::Set(element) => write!(f, "Set<{}>", element),
            Shape::Map(key, value) => write!(f, "Map<{}, {}>", key, value),
            Shape::Array(element) => write!(f, "[{}]", element),
            Shape::Section(section) => write!(f, "{}", section.name()),
            Shape::Evaluable => write!(f, "Evaluable"),
            Shape::Raw => write!(f, "Raw"),
            Shape::Any => write!(f, "Any"),
            Shape::Custom(custom) => write!(f, "{}", custom.name()),
        }
    }
}

/// A value produced by the mapping engine, before it is turned into a field's type.
pub enum Resolved {
    Scalar(Scalar),
    List(Vec<Resolved>),
    Set(Vec<Resolved>),
    Map(Vec<(Resolved, Resolved)>),
    Array(Vec<Resolved>),
    Section(Box<dyn Any>),
    Evaluable(Evaluable),
    Raw(ConfigValue),
    Custom(Box<dyn Any>),
}

impl Resolved {
    pub fn custom<T: 'static>(value: T) -> Resolved {
        Resolved::Custom(Box::new(value))
    }
    pub fn into_target<T: Target>(self) -> Result<T> {
        T::from_resolved(self)
    }
    pub fn downcast_custom<T: 'static>(self) -> Result<T> {
        match self {
            Resolved::Custom(boxed) => boxed
                .downcast::<T>()
                .map(|b| *b)
                .map_err(|_| MapperError::mismatch(type_name::<T>(), "another custom type")),
            other => Err(MapperError::mismatch(type_name::<T>(), other.kind())),
        }
    }
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Resolved::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }
    /// Structural equality. Sections, custom values and evaluables are opaque
    /// and never equal to anything.
    pub fn same_value(&self, other: &Resolved) -> bool {
        fn all_same(a: &[Resolved], b: &[Resolved]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_value(y))
        }
        match (self, other) {
            (Resolved::Scalar(a), Resolved::Scalar(b)) => a == b,
            (Resolved::Raw(a), Resolved::Raw(b)) => a == b,
            (Resolved::List(a), Resolved::List(b))
            | (Resolved::Set(a), Resolved::Set(b))
            | (Resolved::Array(a), Resolved::Array(b)) => all_same(a, b),
            (Resolved::Map(a), Resolved::Map(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|((ak, av), (bk, bv))| ak.same_value(bk) && av.same_value(bv))
            }
            _ => false,
        }
    }
    pub fn kind(&self) -> &'static str {
        match self {
            Resolved::Scalar(_) => "scalar",
            Resolved::List(_) => "list",
            Resolved::Set(_) => "set",
            Resolved::Map(_) => "map",
            Resolved::Array(_) => "array",
            Resolved::Section(_) => "section",
            Resolved::Evaluable(_) => "evaluable",
            Resolved::Raw(_) => "raw value",
            Resolved::Custom(_) => "custom value",
        }
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Resolved::Scalar(scalar) => write!(f, "Scalar({:?})", scalar),
            Resolved::List(items) => f.debug_tuple("List").field(items).finish(),
            Resolved::Set(items) => f.debug_tuple("Set").field(items).finish(),
            Resolved::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Resolved::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Resolved::Section(_) => write!(f, "Section(..)"),
            Resolved::Evaluable(evaluable) => write!(f, "Evaluable({:?})", evaluable.raw()),
            Resolved::Raw(value) => write!(f, "Raw({:?})", value),
            Resolved::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl From<Scalar> for Resolved {
    fn from(scalar: Scalar) -> Self { Resolved::Scalar(scalar) }
}
impl From<String> for Resolved {
    fn from(s: String) -> Self { Resolved::Scalar(Scalar::String(s)) }
}
impl From<&str> for Resolved {
    fn from(s: &str) -> Self { Resolved::Scalar(Scalar::String(s.to_string())) }
}
impl From<i64> for Resolved {
    fn from(l: i64) -> Self { Resolved::Scalar(Scalar::Long(l)) }
}
impl From<f64> for Resolved {
    fn from(d: f64) -> Self { Resolved::Scalar(Scalar::Double(d)) }
}
impl From<bool> for Resolved {
    fn from(b: bool) -> Self { Resolved::Scalar(Scalar::Boolean(b)) }
}

/// A Rust type a field can be declared with.
pub trait Target: Sized + 'static {
    fn shape() -> Shape;
    fn from_resolved(value: Resolved) -> Result<Self>;
}

macro_rules! scalar_target {
    ($($native:ty),*) => {
        $(
            impl Target for $native {
                fn shape() -> Shape {
                    Shape::Scalar(<$native as ScalarType>::KIND)
                }
                fn from_resolved(value: Resolved) -> Result<Self> {
                    match value {
                        Resolved::Scalar(scalar) => <$native as ScalarType>::from_scalar(scalar),
                        other => Err(MapperError::mismatch(<$native as ScalarType>::DATA_TYPE, other.kind())),
                    }
                }
            }
        )*
    };
}

scalar_target!(String, i64, i32, f64, f32, bool);

fn elements(value: Resolved, expected: &str) -> Result<Vec<Resolved>> {
    match value {
        Resolved::List(items) | Resolved::Set(items) | Resolved::Array(items) => Ok(items),
        other => Err(MapperError::mismatch(expected, other.kind())),
    }
}

impl<T: Target> Target for Vec<T> {
    fn shape() -> Shape {
        Shape::list(T::shape())
    }
    fn from_resolved(value: Resolved) -> Result<Self> {
        elements(value, "list")?.into_iter().map(T::from_resolved).collect()
    }
}

impl<T: Target + Eq + Hash> Target for HashSet<T> {
    fn shape() -> Shape {
        Shape::set(T::shape())
    }
    fn from_resolved(value: Resolved) -> Result<Self> {
        elements(value, "set")?.into_iter().map(T::from_resolved).collect()
    }
}

impl<T: Target + Ord> Target for BTreeSet<T> {
    fn shape() -> Shape {
        Shape::set(T::shape())
    }
    fn from_resolved(value: Resolved) -> Result<Self> {
        elements(value, "set")?.into_iter().map(T::from_resolved).collect()
    }
}

impl<T: Target, const N: usize> Target for [T; N] {
    fn shape() -> Shape {
        Shape::array(T::shape())
    }
    fn from_resolved(value: Resolved) -> Result<Self> {
        let items = elements(value, "array")?
            .into_iter()
            .map(T::from_resolved)
            .collect::<Result<Vec<T>>>()?;
        let len = items.len();
        items
            .try_into()
            .map_err(|_| MapperError::mismatch(format!("array of {} elements", N), format!("{} elements", len)))
    }
}

fn entries(value: Resolved) -> Result<Vec<(Resolved, Resolved)>> {
    match value {
        Resolved::Map(entries) => Ok(entries),
        other => Err(MapperError::mismatch("map", other.kind())),
    }
}

impl<K: Target + Eq + Hash, V: Target> Target for HashMap<K, V> {
    fn shape() -> Shape {
        Shape::map(K::shape(), V::shape())
    }
    fn from_resolved(value: Resolved) -> Result<Self> {
        entries(value)?
            .into_iter()
            .map(|(k, v)| -> Result<(K, V)> { Ok((K::from_resolved(k)?, V::from_resolved(v)?)) })
            .collect()
    }
}

impl<K: Target + Ord, V: Target> Target for BTreeMap<K, V> {
    fn shape() -> Shape {
        Shape::map(K::shape(), V::shape())
    }
    fn from_resolved(value: Resolved) -> Result<Self> {
        entries(value)?
            .into_iter()
            .map(|(k, v)| -> Result<(K, V)> { Ok((K::from_resolved(k)?, V::from_resolved(v)?)) })
            .collect()
    }
}

impl<T: Target> Target for Option<T> {
    fn shape() -> Shape {
        T::shape()
    }
    fn from_resolved(value: Resolved) -> Result<Self> {
        T::from_resolved(value).map(Some)
    }
}

impl Target for Evaluable {
    fn shape() -> Shape {
        Shape::Evaluable
    }
    fn from_resolved(value: Resolved) -> Result<Self> {
        match value {
            Resolved::Evaluable(evaluable) => Ok(evaluable),
            other => Err(MapperError::mismatch("evaluable", other.kind())),
        }
    }
}

impl Target for ConfigValue {
    fn shape() -> Shape {
        Shape::Raw
    }
    fn from_resolved(value: Resolved) -> Result<Self> {
        match value {
            Resolved::Raw(raw) => Ok(raw),
            Resolved::Scalar(scalar) => Ok(scalar.into_value()),
            Resolved::Evaluable(evaluable) => Ok(evaluable.raw().clone()),
            other => Err(MapperError::mismatch("raw value", other.kind())),
        }
    }
}

impl Target for Resolved {
    fn shape() -> Shape {
        Shape::Any
    }
    fn from_resolved(value: Resolved) -> Result<Self> {
        Ok(value)
    }
}

impl<T: Section> Target for T {
    fn shape() -> Shape {
        Shape::section::<T>()
    }
    fn from_resolved(value: Resolved) -> Result<Self> {
        match value {
            Resolved::Section(boxed) => boxed
                .downcast::<T>()
                .map(|b| *b)
                .map_err(|_| MapperError::mismatch(type_name::<T>(), "another section")),
            other => Err(MapperError::mismatch(type_name::<T>(), other.kind())),
        }
    }
}

type Assign<S> = Box<dyn Fn(&mut S, Resolved) -> Result<()>>;

/// One mappable field of a section.
pub struct FieldDescriptor<S> {
    name: String,
    shape: Shape,
    always: bool,
    inlined: bool,
    ignored: bool,
    assign: Assign<S>,
}

impl<S: 'static> FieldDescriptor<S> {
    pub fn new<T, F>(name: &str, setter: F) -> Self
    where
        T: Target,
        F: Fn(&mut S, T) + 'static,
    {
        Self::with_shape(name, T::shape(), setter)
    }
    /// Declares a field with an explicit shape instead of the one its type implies.
    pub fn with_shape<T, F>(name: &str, shape: Shape, setter: F) -> Self
    where
        T: Target,
        F: Fn(&mut S, T) + 'static,
    {
        Self {
            name: name.to_string(),
            shape,
            always: false,
            inlined: false,
            ignored: false,
            assign: Box::new(move |instance: &mut S, value: Resolved| -> Result<()> {
                setter(instance, T::from_resolved(value)?);
                Ok(())
            }),
        }
    }
    /// Resolve the field even if its path is absent.
    pub fn always(mut self) -> Self {
        self.always = true;
        self
    }
    /// Read the field from the parent's path instead of appending its name.
    pub fn inlined(mut self) -> Self {
        self.inlined = true;
        self
    }
    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn shape(&self) -> &Shape {
        &self.shape
    }
    pub fn is_always(&self) -> bool {
        self.always
    }
    pub fn is_inlined(&self) -> bool {
        self.inlined
    }
    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub(crate) fn assign(&self, instance: &mut S, value: Resolved) -> Result<()> {
        (self.assign)(instance, value)
    }
    pub(crate) fn mark_always(&mut self) {
        self.always = true;
    }

    fn lift<P: 'static>(self, project: fn(&mut P) -> &mut S, always: bool) -> FieldDescriptor<P> {
        let assign = self.assign;
        FieldDescriptor {
            name: self.name,
            shape: self.shape,
            always: self.always || always,
            inlined: self.inlined,
            ignored: self.ignored,
            assign: Box::new(move |instance: &mut P, value: Resolved| assign(project(instance), value)),
        }
    }
}

impl<S> fmt::Debug for FieldDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("always", &self.always)
            .field("inlined", &self.inlined)
            .field("ignored", &self.ignored)
            .finish()
    }
}

/// The field table of a section, own fields first, then inherited ones.
pub struct Fields<S> {
    fields: Vec<FieldDescriptor<S>>,
}

impl<S: Section> Default for Fields<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Section> Fields<S> {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }
    pub fn field<T, F>(self, name: &str, setter: F) -> Self
    where
        T: Target,
        F: Fn(&mut S, T) + 'static,
    {
        self.push(FieldDescriptor::new(name, setter))
    }
    pub fn push(mut self, field: FieldDescriptor<S>) -> Self {
        self.fields.push(field);
        self
    }
    /// Appends the fields of an embedded base section, reached through `project`.
    pub fn inherit<B: Section>(mut self, project: fn(&mut S) -> &mut B) -> Self {
        let always = B::always();
        for field in B::describe_fields().into_vec() {
            self.fields.push(field.lift(project, always));
        }
        self
    }
    pub fn len(&self) -> usize {
        self.fields.len()
    }
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
    pub fn into_vec(self) -> Vec<FieldDescriptor<S>> {
        self.fields
    }
}

/// A type the mapper can instantiate and populate.
///
/// Only `construct` and `describe_fields` are required, the remaining hooks
/// default to doing nothing.
pub trait Section: Sized + 'static {
    /// Creates the instance fields are assigned onto; `None` makes the type unmappable.
    fn construct() -> Option<Self>;
    fn describe_fields() -> Fields<Self>;
    /// Marks every field of this section as always resolved.
    fn always() -> bool {
        false
    }
    /// Decides the concrete shape of an `Any` field. Such fields are resolved
    /// after all others, so already assigned siblings can be inspected.
    fn runtime_decide(&self, _field: &str) -> Option<Shape> {
        None
    }
    /// Supplies a value for a field whose resolution came up empty.
    fn default_for(&self, _shape: &Shape, _field: &str) -> Option<Resolved> {
        None
    }
    /// Called once every field was processed, no further changes follow.
    fn after_parsing(&mut self, _fields: &[FieldDescriptor<Self>]) -> Result<()> {
        Ok(())
    }
}
