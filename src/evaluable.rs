use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use tracing::trace;

use crate::datatype::{Scalar, ScalarKind, ScalarType};
use crate::error::{MapperError, Result};
use crate::expression::{Environment, Evaluator};
use crate::value::ConfigValue;

/// A raw configuration value paired with the evaluator its expressions need.
///
/// Nothing is evaluated up front. Every typed read evaluates a deferred
/// expression exactly once, against the environment handed to that read, and
/// then interprets the outcome as the requested shape. Sections may keep an
/// `Evaluable` as a field to defer evaluation until runtime bindings exist.
#[derive(Clone)]
pub struct Evaluable {
    value: ConfigValue,
    evaluator: Option<Arc<dyn Evaluator>>,
}

impl Evaluable {
    pub fn new(value: ConfigValue, evaluator: Option<Arc<dyn Evaluator>>) -> Self {
        Self { value, evaluator }
    }
    pub fn raw(&self) -> &ConfigValue {
        &self.value
    }

    pub fn as_scalar<T: ScalarType>(&self, env: &Environment) -> Result<T> {
        T::from_scalar(self.scalar(T::KIND, env)?)
    }
    pub fn as_list<T: ScalarType>(&self, env: &Environment) -> Result<Vec<T>> {
        self.list(T::KIND, env)?.into_iter().map(T::from_scalar).collect()
    }
    pub fn as_set<T: ScalarType + Eq + Hash>(&self, env: &Environment) -> Result<HashSet<T>> {
        self.set(T::KIND, env)?.into_iter().map(T::from_scalar).collect()
    }
    pub fn as_map<K, V>(&self, env: &Environment) -> Result<HashMap<K, V>>
    where
        K: ScalarType + Eq + Hash,
        V: ScalarType,
    {
        self.map(K::KIND, V::KIND, env)?
            .into_iter()
            .map(|(k, v)| -> Result<(K, V)> { Ok((K::from_scalar(k)?, V::from_scalar(v)?)) })
            .collect()
    }
    /// Evaluates a top-level expression, otherwise hands back the raw value.
    pub fn as_raw_object(&self, env: &Environment) -> Result<ConfigValue> {
        Ok(self.resolve(&self.value, env)?.into_owned())
    }

    pub fn scalar(&self, kind: ScalarKind, env: &Environment) -> Result<Scalar> {
        self.interpret_scalar(&self.value, kind, env)
    }

    /// Interprets the value as a list of scalars.
    ///
    /// Elements that evaluate to a list or set are expanded in place, one level
    /// deep, so an expression yielding a sequence contributes its items rather
    /// than a single element. A non-container value becomes a single element.
    pub fn list(&self, kind: ScalarKind, env: &Environment) -> Result<Vec<Scalar>> {
        let input = self.resolve(&self.value, env)?;
        let items = match input.items() {
            Some(items) => items,
            None => return Ok(vec![self.interpret_scalar(&input, kind, env)?]),
        };
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let item = self.resolve(item, env)?;
            match item.items() {
                Some(inner) => {
                    trace!(len = inner.len(), "flattening nested collection");
                    for sub_item in inner {
                        results.push(self.interpret_scalar(sub_item, kind, env)?);
                    }
                }
                None => results.push(self.interpret_scalar(&item, kind, env)?),
            }
        }
        Ok(results)
    }

    /// Same as [`Evaluable::list`], keeping only the first of equal elements.
    pub fn set(&self, kind: ScalarKind, env: &Environment) -> Result<Vec<Scalar>> {
        let mut unique: Vec<Scalar> = Vec::new();
        for scalar in self.list(kind, env)? {
            if !unique.contains(&scalar) {
                unique.push(scalar);
            }
        }
        Ok(unique)
    }

    pub fn map(&self, key: ScalarKind, value: ScalarKind, env: &Environment) -> Result<Vec<(Scalar, Scalar)>> {
        let input = self.resolve(&self.value, env)?;
        match input.as_ref() {
            ConfigValue::Null => Ok(Vec::new()),
            ConfigValue::Map(map) => map
                .iter()
                .map(|(k, v)| -> Result<(Scalar, Scalar)> {
                    Ok((
                        self.interpret_scalar(&ConfigValue::String(k.clone()), key, env)?,
                        self.interpret_scalar(v, value, env)?,
                    ))
                })
                .collect(),
            other => Err(MapperError::mismatch("map", other.kind())),
        }
    }

    fn interpret_scalar(&self, input: &ConfigValue, kind: ScalarKind, env: &Environment) -> Result<Scalar> {
        let descriptor = kind.descriptor();
        if let Some(scalar) = descriptor.matching(input) {
            return Ok(scalar);
        }
        let input = self.resolve(input, env)?;
        match descriptor.matching(&input) {
            Some(scalar) => Ok(scalar),
            None => descriptor.coerce(&input, env),
        }
    }

    fn resolve<'v>(&self, input: &'v ConfigValue, env: &Environment) -> Result<Cow<'v, ConfigValue>> {
        match (input, &self.evaluator) {
            (ConfigValue::Expression(expression), Some(evaluator)) => {
                trace!(expression = expression.source(), "evaluating deferred value");
                Ok(Cow::Owned(evaluator.evaluate(expression, env)?))
            }
            _ => Ok(Cow::Borrowed(input)),
        }
    }
}

impl PartialEq for Evaluable {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl fmt::Debug for Evaluable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Evaluable").field("value", &self.value).finish()
    }
}

impl fmt::Display for Evaluable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
