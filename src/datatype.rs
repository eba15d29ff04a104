// used to look up registered native types
use std::any::{type_name, TypeId};
use std::collections::HashMap;
// used to print out readable forms of a scalar
use std::fmt;

use lazy_static::lazy_static;
// used to recognize numeric and boolean literals inside strings
use regex::Regex;

use crate::error::{MapperError, Result};
use crate::expression::Environment;
use crate::value::ConfigValue;

lazy_static! {
    static ref INTEGER: Regex = Regex::new(r"^[+-]?\d+$").unwrap();
    static ref DECIMAL: Regex = Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap();
    static ref TRUTHY: Regex = Regex::new(r"^(?i)(true|yes|on|1)$").unwrap();
    static ref FALSY: Regex = Regex::new(r"^(?i)(false|no|off|0)$").unwrap();
    // native types that map onto a scalar kind, narrower ones share a descriptor
    static ref REGISTRY: HashMap<TypeId, ScalarKind> = {
        let mut registry = HashMap::new();
        registry.insert(TypeId::of::<String>(), ScalarKind::String);
        registry.insert(TypeId::of::<i64>(), ScalarKind::Long);
        registry.insert(TypeId::of::<i32>(), ScalarKind::Long);
        registry.insert(TypeId::of::<f64>(), ScalarKind::Double);
        registry.insert(TypeId::of::<f32>(), ScalarKind::Double);
        registry.insert(TypeId::of::<bool>(), ScalarKind::Boolean);
        registry
    };
}

static DESCRIPTORS: [ScalarDescriptor; 4] = [
    ScalarDescriptor { kind: ScalarKind::String, native: "String", coerce: coerce_string },
    ScalarDescriptor { kind: ScalarKind::Long, native: "i64", coerce: coerce_long },
    ScalarDescriptor { kind: ScalarKind::Double, native: "f64", coerce: coerce_double },
    ScalarDescriptor { kind: ScalarKind::Boolean, native: "bool", coerce: coerce_boolean },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Long,
    Double,
    Boolean,
}

impl ScalarKind {
    /// Looks up the kind registered for a native type.
    pub fn of<T: 'static>() -> Result<ScalarKind> {
        REGISTRY
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or_else(|| MapperError::UnsupportedType(type_name::<T>().to_string()))
    }
    pub fn descriptor(&self) -> &'static ScalarDescriptor {
        match self {
            Self::String => &DESCRIPTORS[0],
            Self::Long => &DESCRIPTORS[1],
            Self::Double => &DESCRIPTORS[2],
            Self::Boolean => &DESCRIPTORS[3],
        }
    }
    pub fn name(&self) -> &'static str {
        self.descriptor().native
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub struct ScalarDescriptor {
    kind: ScalarKind,
    native: &'static str,
    coerce: fn(&ConfigValue, &Environment) -> Result<Scalar>,
}

impl ScalarDescriptor {
    pub fn kind(&self) -> ScalarKind {
        self.kind
    }
    pub fn native(&self) -> &'static str {
        self.native
    }
    /// Returns the value untouched when it already has the native representation.
    pub fn matching(&self, value: &ConfigValue) -> Option<Scalar> {
        match (self.kind, value) {
            (ScalarKind::String, ConfigValue::String(s)) => Some(Scalar::String(s.clone())),
            (ScalarKind::Long, ConfigValue::Long(l)) => Some(Scalar::Long(*l)),
            (ScalarKind::Double, ConfigValue::Double(d)) => Some(Scalar::Double(*d)),
            (ScalarKind::Boolean, ConfigValue::Bool(b)) => Some(Scalar::Boolean(*b)),
            _ => None,
        }
    }
    pub fn coerce(&self, value: &ConfigValue, env: &Environment) -> Result<Scalar> {
        (self.coerce)(value, env)
    }
}

fn coerce_string(value: &ConfigValue, _env: &Environment) -> Result<Scalar> {
    match value {
        ConfigValue::Null => Ok(Scalar::String(String::new())),
        ConfigValue::Bool(_) | ConfigValue::Long(_) | ConfigValue::Double(_) | ConfigValue::String(_) => {
            Ok(Scalar::String(value.to_string()))
        }
        other => Err(MapperError::coercion("String", other.kind())),
    }
}

fn coerce_long(value: &ConfigValue, _env: &Environment) -> Result<Scalar> {
    match value {
        ConfigValue::Null => Ok(Scalar::Long(0)),
        ConfigValue::Bool(b) => Ok(Scalar::Long(*b as i64)),
        ConfigValue::Long(l) => Ok(Scalar::Long(*l)),
        ConfigValue::Double(d) if d.is_finite() => truncate(*d).map(Scalar::Long),
        ConfigValue::String(s) => {
            let s = s.trim();
            if INTEGER.is_match(s) {
                s.parse::<i64>()
                    .map(Scalar::Long)
                    .map_err(|_| MapperError::coercion("i64", format!("out of range '{}'", s)))
            } else if DECIMAL.is_match(s) {
                let d = s.parse::<f64>().map_err(|_| MapperError::coercion("i64", format!("'{}'", s)))?;
                truncate(d).map(Scalar::Long)
            } else {
                Err(MapperError::coercion("i64", format!("'{}'", s)))
            }
        }
        other => Err(MapperError::coercion("i64", other.kind())),
    }
}

// 2^63, the first integral double above i64::MAX
const LONG_LIMIT: f64 = 9_223_372_036_854_775_808.0;

fn truncate(d: f64) -> Result<i64> {
    let t = d.trunc();
    if t >= -LONG_LIMIT && t < LONG_LIMIT {
        Ok(t as i64)
    } else {
        Err(MapperError::coercion("i64", format!("out of range {}", d)))
    }
}

fn coerce_double(value: &ConfigValue, _env: &Environment) -> Result<Scalar> {
    match value {
        ConfigValue::Null => Ok(Scalar::Double(0.0)),
        ConfigValue::Bool(b) => Ok(Scalar::Double(if *b { 1.0 } else { 0.0 })),
        ConfigValue::Long(l) => Ok(Scalar::Double(*l as f64)),
        ConfigValue::Double(d) => Ok(Scalar::Double(*d)),
        ConfigValue::String(s) if INTEGER.is_match(s.trim()) || DECIMAL.is_match(s.trim()) => s
            .trim()
            .parse::<f64>()
            .map(Scalar::Double)
            .map_err(|_| MapperError::coercion("f64", format!("'{}'", s))),
        ConfigValue::String(s) => Err(MapperError::coercion("f64", format!("'{}'", s))),
        other => Err(MapperError::coercion("f64", other.kind())),
    }
}

fn coerce_boolean(value: &ConfigValue, _env: &Environment) -> Result<Scalar> {
    match value {
        ConfigValue::Null => Ok(Scalar::Boolean(false)),
        ConfigValue::Bool(b) => Ok(Scalar::Boolean(*b)),
        ConfigValue::Long(l) => Ok(Scalar::Boolean(*l != 0)),
        ConfigValue::Double(d) => Ok(Scalar::Boolean(*d != 0.0)),
        ConfigValue::String(s) if TRUTHY.is_match(s.trim()) => Ok(Scalar::Boolean(true)),
        ConfigValue::String(s) if FALSY.is_match(s.trim()) => Ok(Scalar::Boolean(false)),
        ConfigValue::String(s) => Err(MapperError::coercion("bool", format!("'{}'", s))),
        other => Err(MapperError::coercion("bool", other.kind())),
    }
}

/// A resolved scalar in one of the registered native representations.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::String(_) => ScalarKind::String,
            Self::Long(_) => ScalarKind::Long,
            Self::Double(_) => ScalarKind::Double,
            Self::Boolean(_) => ScalarKind::Boolean,
        }
    }
    pub fn into_value(self) -> ConfigValue {
        match self {
            Self::String(s) => ConfigValue::String(s),
            Self::Long(l) => ConfigValue::Long(l),
            Self::Double(d) => ConfigValue::Double(d),
            Self::Boolean(b) => ConfigValue::Bool(b),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Long(l) => write!(f, "{}", l),
            Self::Double(d) => write!(f, "{}", d),
            Self::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Binds a native type to the scalar kind it is interpreted through.
pub trait ScalarType: Sized + 'static {
    const KIND: ScalarKind;
    const DATA_TYPE: &'static str;
    fn from_scalar(scalar: Scalar) -> Result<Self>;
    // instance callable with pre-made implementation
    fn data_type(&self) -> &'static str {
        Self::DATA_TYPE
    }
}

fn unexpected<T>(expected: &'static str, scalar: Scalar) -> Result<T> {
    Err(MapperError::mismatch(expected, scalar.kind()))
}

// ------------- Scalar Types --------------
impl ScalarType for String {
    const KIND: ScalarKind = ScalarKind::String;
    const DATA_TYPE: &'static str = "String";
    fn from_scalar(scalar: Scalar) -> Result<String> {
        match scalar {
            Scalar::String(s) => Ok(s),
            other => unexpected(Self::DATA_TYPE, other),
        }
    }
}
impl ScalarType for i64 {
    const KIND: ScalarKind = ScalarKind::Long;
    const DATA_TYPE: &'static str = "i64";
    fn from_scalar(scalar: Scalar) -> Result<i64> {
        match scalar {
            Scalar::Long(l) => Ok(l),
            other => unexpected(Self::DATA_TYPE, other),
        }
    }
}
impl ScalarType for i32 {
    const KIND: ScalarKind = ScalarKind::Long;
    const DATA_TYPE: &'static str = "i32";
    fn from_scalar(scalar: Scalar) -> Result<i32> {
        match scalar {
            Scalar::Long(l) => i32::try_from(l).map_err(|_| MapperError::coercion(Self::DATA_TYPE, l)),
            other => unexpected(Self::DATA_TYPE, other),
        }
    }
}
impl ScalarType for f64 {
    const KIND: ScalarKind = ScalarKind::Double;
    const DATA_TYPE: &'static str = "f64";
    fn from_scalar(scalar: Scalar) -> Result<f64> {
        match scalar {
            Scalar::Double(d) => Ok(d),
            other => unexpected(Self::DATA_TYPE, other),
        }
    }
}
impl ScalarType for f32 {
    const KIND: ScalarKind = ScalarKind::Double;
    const DATA_TYPE: &'static str = "f32";
    fn from_scalar(scalar: Scalar) -> Result<f32> {
        match scalar {
            Scalar::Double(d) if d.is_finite() && d.abs() > f32::MAX as f64 => {
                Err(MapperError::coercion(Self::DATA_TYPE, format!("out of range {}", d)))
            }
            Scalar::Double(d) => Ok(d as f32),
            other => unexpected(Self::DATA_TYPE, other),
        }
    }
}
impl ScalarType for bool {
    const KIND: ScalarKind = ScalarKind::Boolean;
    const DATA_TYPE: &'static str = "bool";
    fn from_scalar(scalar: Scalar) -> Result<bool> {
        match scalar {
            Scalar::Boolean(b) => Ok(b),
            other => unexpected(Self::DATA_TYPE, other),
        }
    }
}
