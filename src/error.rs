use thiserror::Error;

use crate::expression::Rule;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),
    #[error("Cannot coerce {found} into {expected}")]
    Coercion { expected: &'static str, found: String },
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("Please specify a default constructor on {0}")]
    NoDefaultConstructor(&'static str),
    #[error("Mapping error: {0}")]
    Mapping(String),
    #[error("Missing generic type: {0}")]
    GenericTypeMissing(String),
    #[error("Expression error: {0}")]
    Expression(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("{source} (at path '{path}')")]
    Located {
        path: String,
        #[source]
        source: Box<MapperError>,
    },
}

pub type Result<T> = std::result::Result<T, MapperError>;

impl MapperError {
    pub fn coercion(expected: &'static str, found: impl ToString) -> Self {
        Self::Coercion { expected, found: found.to_string() }
    }
    pub fn mismatch(expected: impl ToString, found: impl ToString) -> Self {
        Self::TypeMismatch { expected: expected.to_string(), found: found.to_string() }
    }

    /// Prefixes the location of this error with one more path segment.
    /// Segments starting with `[` (list indices) attach without a dot.
    pub fn within(self, segment: &str) -> Self {
        if segment.is_empty() {
            return self;
        }
        match self {
            Self::Located { path, source } => {
                let path = if path.starts_with('[') {
                    format!("{segment}{path}")
                } else {
                    crate::path::join_paths(Some(segment), Some(&path))
                };
                Self::Located { path, source }
            }
            other => Self::Located { path: segment.to_string(), source: Box::new(other) },
        }
    }

    /// Like [`within`](Self::within) for a map key. Keys that would not read
    /// back as a single dotted segment are bracketed and quoted, `counts[""]`.
    pub fn within_key(self, key: &str) -> Self {
        if key.is_empty() || key.contains(['.', '[', ']', '"']) || key.trim() != key {
            self.within(&format!("[{:?}]", key))
        } else {
            self.within(key)
        }
    }

    /// The dotted path this error was annotated with, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Located { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The innermost error, below all path annotations.
    pub fn root_cause(&self) -> &MapperError {
        match self {
            Self::Located { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

// Helper conversions
impl From<config::ConfigError> for MapperError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<pest::error::Error<Rule>> for MapperError {
    fn from(e: pest::error::Error<Rule>) -> Self { Self::Expression(e.to_string()) }
}
