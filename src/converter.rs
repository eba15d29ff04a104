use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::expression::Evaluator;
use crate::section::{Resolved, Shape};

/// Transforms a value resolved under the required shape into the target shape.
pub type ValueConverter = Arc<dyn Fn(Resolved, &dyn Evaluator) -> Result<Resolved>>;

/// Pluggable type substitution consulted for every field and container element.
///
/// When both a required shape and a converter are known for a target shape,
/// the value is resolved as the required shape and then handed to the converter.
pub trait ConverterRegistry {
    fn required_shape_for(&self, target: &Shape) -> Option<Shape>;
    fn converter_for(&self, target: &Shape) -> Option<ValueConverter>;
}

struct Registration {
    target: Shape,
    required: Option<Shape>,
    converter: ValueConverter,
}

/// A converter registry backed by a list of registrations, matched by shape equality.
#[derive(Default)]
pub struct ConverterTable {
    registrations: Vec<Registration>,
}

impl ConverterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a converter for `target`, read from configuration as `required`.
    /// A later registration for the same target replaces the earlier one.
    pub fn register<F>(&mut self, target: Shape, required: Option<Shape>, converter: F)
    where
        F: Fn(Resolved, &dyn Evaluator) -> Result<Resolved> + 'static,
    {
        trace!(shape = %target, "registering converter");
        self.registrations.retain(|r| r.target != target);
        self.registrations.push(Registration { target, required, converter: Arc::new(converter) });
    }

    pub fn with<F>(mut self, target: Shape, required: Option<Shape>, converter: F) -> Self
    where
        F: Fn(Resolved, &dyn Evaluator) -> Result<Resolved> + 'static,
    {
        self.register(target, required, converter);
        self
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    fn find(&self, target: &Shape) -> Option<&Registration> {
        self.registrations.iter().find(|r| &r.target == target)
    }
}

impl ConverterRegistry for ConverterTable {
    fn required_shape_for(&self, target: &Shape) -> Option<Shape> {
        self.find(target).and_then(|r| r.required.clone())
    }
    fn converter_for(&self, target: &Shape) -> Option<ValueConverter> {
        self.find(target).map(|r| r.converter.clone())
    }
}
