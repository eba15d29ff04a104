use std::any::{type_name, TypeId};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::converter::{ConverterRegistry, ValueConverter};
use crate::error::{MapperError, Result};
use crate::evaluable::Evaluable;
use crate::expression::{Environment, Evaluator};
use crate::path::{join_paths, resolve_path};
use crate::section::{FieldDescriptor, Resolved, Section, Shape};
use crate::store::ConfigStore;
use crate::value::{ConfigValue, ValueMap};

/// Maps the tree held by a [`ConfigStore`] onto [`Section`] types.
///
/// Every call to [`ConfigMapper::map_section`] walks the field tables again,
/// nothing is cached between calls.
pub struct ConfigMapper<C: ConfigStore> {
    config: C,
    evaluator: Arc<dyn Evaluator>,
    converters: Option<Box<dyn ConverterRegistry>>,
    environment: Environment,
}

impl<C: ConfigStore> ConfigMapper<C> {
    pub fn new(config: C, evaluator: Arc<dyn Evaluator>) -> Self {
        Self { config, evaluator, converters: None, environment: Environment::default() }
    }
    pub fn with_converters(mut self, converters: impl ConverterRegistry + 'static) -> Self {
        self.converters = Some(Box::new(converters));
        self
    }
    /// Bindings visible to expressions evaluated while mapping; empty unless set.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn config(&self) -> &C {
        &self.config
    }
    pub fn config_mut(&mut self) -> &mut C {
        &mut self.config
    }
    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Instantiates `T` and populates it from the subtree at `root`, or from
    /// the whole tree when no root is given. Errors carry the dotted path of
    /// the offending value.
    pub fn map_section<T: Section>(&self, root: Option<&str>) -> Result<T> {
        let root = root.unwrap_or("");
        debug!(root, section = type_name::<T>(), "at the entry point of mapping");
        let engine = MappingEngine {
            store: &self.config,
            evaluator: &self.evaluator,
            converters: self.converters.as_deref(),
            environment: &self.environment,
        };
        engine.map_section_sub::<T>(root, None).map_err(|e| e.within(root))
    }
}

/// Borrowed state of one `map_section` call, shared by every recursion level.
pub(crate) struct MappingEngine<'m> {
    store: &'m dyn ConfigStore,
    evaluator: &'m Arc<dyn Evaluator>,
    converters: Option<&'m dyn ConverterRegistry>,
    environment: &'m Environment,
}

impl MappingEngine<'_> {
    /// Maps one section below `root`. With a `source` map given, paths are
    /// resolved inside that map rather than in the store.
    pub(crate) fn map_section_sub<T: Section>(&self, root: &str, source: Option<&ValueMap>) -> Result<T> {
        trace!(root, section = type_name::<T>(), from_source = source.is_some(), "mapping section");
        let mut instance = T::construct().ok_or(MapperError::NoDefaultConstructor(type_name::<T>()))?;
        let fields = find_applicable_fields::<T>()?;

        // fields of undecided shape go last so runtime_decide sees their siblings
        let mut order: Vec<usize> = (0..fields.len()).collect();
        order.sort_by_key(|i| matches!(fields[*i].shape(), Shape::Any));

        for index in order {
            let field = &fields[index];
            self.map_field(&mut instance, field, root, source).map_err(|e| {
                if field.is_inlined() { e } else { e.within(field.name()) }
            })?;
        }

        instance.after_parsing(&fields)?;
        Ok(instance)
    }

    fn map_field<T: Section>(
        &self,
        instance: &mut T,
        field: &FieldDescriptor<T>,
        root: &str,
        source: Option<&ValueMap>,
    ) -> Result<()> {
        let name = field.name();
        let mut shape = field.shape().clone();
        trace!(field = name, shape = %shape, "processing field");

        if shape == Shape::Any {
            shape = instance
                .runtime_decide(name)
                .ok_or_else(|| MapperError::Mapping("Requesting plain objects is disallowed".to_string()))?;
            trace!(field = name, decided = %shape, "called runtime_decide");
        }

        let (effective, converter) = self.substitute(&shape);
        let mut value = self.resolve_field_value(field, root, source, &effective)?;
        if let Some(converter) = converter {
            value = value.map(|v| converter(v, self.evaluator.as_ref())).transpose()?;
        }

        if value.is_none() {
            value = instance.default_for(&shape, name);
            if value.is_some() {
                trace!(field = name, "using default value");
            }
        }

        match value {
            Some(value) => field.assign(instance, value),
            None => {
                trace!(field = name, "leaving field untouched");
                Ok(())
            }
        }
    }

    fn resolve_field_value<T: 'static>(
        &self,
        field: &FieldDescriptor<T>,
        root: &str,
        source: Option<&ValueMap>,
        shape: &Shape,
    ) -> Result<Option<Resolved>> {
        let path = if field.is_inlined() { root.to_string() } else { join_paths(Some(root), Some(field.name())) };
        trace!(field = field.name(), path = %path, "resolving value");

        let value = match resolve_path(self.store, &path, source)? {
            Some(value) if !value.is_null() => value,
            _ if !field.is_always() => {
                trace!(path = %path, "returning none for absent path");
                return Ok(None);
            }
            _ => ConfigValue::Null,
        };

        match shape {
            Shape::Section(section) => {
                trace!(path = %path, "value is another section");
                Ok(Some(Resolved::Section(section.map(self, &path, source)?)))
            }
            _ => self.interpret(value, shape).map(Some),
        }
    }

    /// Swaps in the required shape when the registry knows both a required
    /// shape and a converter. The converter is returned either way.
    fn substitute(&self, shape: &Shape) -> (Shape, Option<ValueConverter>) {
        let Some(registry) = self.converters else {
            return (shape.clone(), None);
        };
        let converter = registry.converter_for(shape);
        match registry.required_shape_for(shape) {
            Some(required) if converter.is_some() => {
                trace!(shape = %shape, required = %required, "using custom converter");
                (required, converter)
            }
            _ => (shape.clone(), converter),
        }
    }

    /// Converts an already fetched value into `shape`. Sections are mapped
    /// from the value itself, an empty section when it is not a map.
    fn interpret(&self, value: ConfigValue, shape: &Shape) -> Result<Resolved> {
        match shape {
            Shape::Raw | Shape::Any => Ok(Resolved::Raw(value)),
            Shape::Evaluable => Ok(Resolved::Evaluable(self.evaluable(value))),
            Shape::Scalar(kind) => Ok(Resolved::Scalar(self.evaluable(value).scalar(*kind, self.environment)?)),
            Shape::List(element) => Ok(Resolved::List(self.convert_items(value, element)?)),
            Shape::Set(element) => {
                let mut unique: Vec<Resolved> = Vec::new();
                for item in self.convert_items(value, element)? {
                    if !unique.iter().any(|u| u.same_value(&item)) {
                        unique.push(item);
                    }
                }
                Ok(Resolved::Set(unique))
            }
            Shape::Array(element) => Ok(Resolved::Array(self.convert_items(value, element)?)),
            Shape::Map(key, element) => Ok(Resolved::Map(self.convert_entries(value, key, element)?)),
            Shape::Section(section) => {
                let empty = ValueMap::new();
                let source = value.as_map().unwrap_or(&empty);
                if value.as_map().is_none() {
                    trace!(found = value.kind(), "not a map, falling back on an empty section");
                }
                Ok(Resolved::Section(section.map(self, "", Some(source))?))
            }
            Shape::Custom(custom) => Err(MapperError::UnsupportedType(custom.name().to_string())),
        }
    }

    fn convert_element(&self, value: ConfigValue, shape: &Shape) -> Result<Resolved> {
        if *shape == Shape::Any {
            return Err(MapperError::GenericTypeMissing(
                "container elements need a concrete shape".to_string(),
            ));
        }
        let (effective, converter) = self.substitute(shape);
        let resolved = self.interpret(value, &effective)?;
        match converter {
            Some(converter) => converter(resolved, self.evaluator.as_ref()),
            None => Ok(resolved),
        }
    }

    fn convert_items(&self, value: ConfigValue, element: &Shape) -> Result<Vec<Resolved>> {
        let items = match self.evaluate(value)? {
            ConfigValue::List(items) | ConfigValue::Set(items) => items,
            other => {
                trace!(found = other.kind(), "not a list, returning an empty one");
                return Ok(Vec::new());
            }
        };
        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| self.convert_element(item, element).map_err(|e| e.within(&format!("[{}]", i))))
            .collect()
    }

    fn convert_entries(&self, value: ConfigValue, key: &Shape, element: &Shape) -> Result<Vec<(Resolved, Resolved)>> {
        let map = match self.evaluate(value)? {
            ConfigValue::Map(map) => map,
            other => {
                trace!(found = other.kind(), "not a map, returning an empty one");
                return Ok(Vec::new());
            }
        };
        map.into_iter()
            .map(|(k, v)| -> Result<(Resolved, Resolved)> {
                let resolved_key = self
                    .convert_element(ConfigValue::String(k.clone()), key)
                    .map_err(|e| e.within_key(&k))?;
                let resolved_value = self.convert_element(v, element).map_err(|e| e.within_key(&k))?;
                Ok((resolved_key, resolved_value))
            })
            .collect()
    }

    fn evaluate(&self, value: ConfigValue) -> Result<ConfigValue> {
        match value {
            ConfigValue::Expression(expression) => {
                trace!(expression = expression.source(), "evaluating container expression");
                self.evaluator.evaluate(&expression, self.environment)
            }
            other => Ok(other),
        }
    }

    fn evaluable(&self, value: ConfigValue) -> Evaluable {
        Evaluable::new(value, Some(Arc::clone(self.evaluator)))
    }
}

/// Collects the mappable fields of `T`, own and inherited, minus ignored ones.
fn find_applicable_fields<T: Section>() -> Result<Vec<FieldDescriptor<T>>> {
    let always = T::always();
    let mut fields = Vec::new();
    for mut field in T::describe_fields().into_vec() {
        if field.is_ignored() {
            trace!(field = field.name(), "skipping ignored field");
            continue;
        }
        if let Shape::Section(section) = field.shape() {
            if section.type_id() == TypeId::of::<T>() {
                return Err(MapperError::Mapping(format!(
                    "Sections cannot use self-referencing fields ({}, {})",
                    type_name::<T>(),
                    field.name()
                )));
            }
        }
        if has_untyped_elements(field.shape()) {
            return Err(MapperError::GenericTypeMissing(format!(
                "container elements need a concrete shape ({})",
                field.shape()
            ))
            .within(field.name()));
        }
        if always {
            field.mark_always();
        }
        fields.push(field);
    }
    Ok(fields)
}

/// True when a container shape leaves its elements, keys or values undecided.
fn has_untyped_elements(shape: &Shape) -> bool {
    match shape {
        Shape::List(element) | Shape::Set(element) | Shape::Array(element) => {
            **element == Shape::Any || has_untyped_elements(element)
        }
        Shape::Map(key, value) => {
            **key == Shape::Any || **value == Shape::Any || has_untyped_elements(key) || has_untyped_elements(value)
        }
        _ => false,
    }
}
