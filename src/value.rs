// used to print out readable forms of a value
use std::fmt;
use std::collections::BTreeMap;

use crate::expression::Expression;

pub type ValueMap = BTreeMap<String, ConfigValue>;

/// A raw value as it lives in the configuration tree.
///
/// Expressions are kept unevaluated until a typed read demands them. An
/// expression is never a container itself, but containers may hold expressions.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConfigValue {
    #[default]
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    Expression(Expression),
    List(Vec<ConfigValue>),
    Set(Vec<ConfigValue>),
    Map(ValueMap),
}

impl ConfigValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
    pub fn is_container(&self) -> bool {
        matches!(self, Self::List(_) | Self::Set(_) | Self::Map(_))
    }
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
    /// Items of a list or set, in stored order.
    pub fn items(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::List(items) | Self::Set(items) => Some(items),
            _ => None,
        }
    }
    /// Builds a set, dropping duplicates while keeping first occurrences.
    pub fn set_of(values: impl IntoIterator<Item = ConfigValue>) -> Self {
        let mut unique: Vec<ConfigValue> = Vec::new();
        for value in values {
            if !unique.contains(&value) {
                unique.push(value);
            }
        }
        Self::Set(unique)
    }
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Expression(_) => "expression",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Long(l) => write!(f, "{}", l),
            Self::Double(d) => write!(f, "{}", d),
            Self::String(s) => write!(f, "{}", s),
            Self::Expression(e) => write!(f, "{}", e),
            Self::List(items) | Self::Set(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self { Self::Bool(b) }
}
impl From<i64> for ConfigValue {
    fn from(l: i64) -> Self { Self::Long(l) }
}
impl From<i32> for ConfigValue {
    fn from(i: i32) -> Self { Self::Long(i as i64) }
}
impl From<f64> for ConfigValue {
    fn from(d: f64) -> Self { Self::Double(d) }
}
impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self { Self::String(s.to_string()) }
}
impl From<String> for ConfigValue {
    fn from(s: String) -> Self { Self::String(s) }
}
impl From<Expression> for ConfigValue {
    fn from(e: Expression) -> Self { Self::Expression(e) }
}
impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(items: Vec<T>) -> Self { Self::List(items.into_iter().map(Into::into).collect()) }
}
impl From<ValueMap> for ConfigValue {
    fn from(map: ValueMap) -> Self { Self::Map(map) }
}
