//! The deferred expression language embedded in configuration values.
//!
//! Expressions are parsed once when a configuration is loaded and evaluated
//! later, whenever a typed read demands their value, against an
//! [`Environment`] of named bindings supplied by the caller. The mapping
//! engine only ever sees the [`Evaluator`] trait; [`Interpreter`] is the
//! evaluator shipped with the crate.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use tracing::trace;

use crate::error::{MapperError, Result};
use crate::value::ConfigValue;

#[derive(Parser)]
#[grammar = "expression.pest"]
struct ExpressionParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(ConfigValue),
    Variable(String),
    List(Vec<Node>),
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
}

/// A parsed but unevaluated expression, remembering the text it came from.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Arc<Node>,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Expression> {
        let mut pairs = ExpressionParser::parse(Rule::expression, source)?;
        let expression = pairs
            .next()
            .ok_or_else(|| MapperError::Expression(format!("Empty expression '{}'", source)))?;
        let body = expression
            .into_inner()
            .next()
            .ok_or_else(|| MapperError::Expression(format!("Empty expression '{}'", source)))?;
        Ok(Expression { source: source.to_string(), root: Arc::new(build(body)?) })
    }
    pub fn from_node(source: impl Into<String>, root: Node) -> Expression {
        Expression { source: source.into(), root: Arc::new(root) }
    }
    pub fn source(&self) -> &str {
        &self.source
    }
    pub fn root(&self) -> &Node {
        &self.root
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn build(pair: Pair<Rule>) -> Result<Node> {
    match pair.as_rule() {
        Rule::disjunction
        | Rule::conjunction
        | Rule::comparison
        | Rule::concatenation
        | Rule::additive
        | Rule::multiplicative => {
            let mut inner = pair.into_inner();
            let first = inner.next().ok_or_else(|| incomplete("operand"))?;
            let mut node = build(first)?;
            while let Some(op) = inner.next() {
                let operator = binary_op(op.as_str())?;
                let right = inner.next().ok_or_else(|| incomplete("right operand"))?;
                node = Node::Binary(operator, Box::new(node), Box::new(build(right)?));
            }
            Ok(node)
        }
        Rule::unary => {
            let mut operators = Vec::new();
            let mut operand = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::unary_op => operators.push(match inner.as_str() {
                        "-" => UnaryOp::Negate,
                        _ => UnaryOp::Not,
                    }),
                    _ => operand = Some(build(inner)?),
                }
            }
            let mut node = operand.ok_or_else(|| incomplete("unary operand"))?;
            // innermost operator applies first
            for operator in operators.into_iter().rev() {
                node = Node::Unary(operator, Box::new(node));
            }
            Ok(node)
        }
        Rule::list => Ok(Node::List(pair.into_inner().map(build).collect::<Result<Vec<_>>>()?)),
        Rule::identifier => Ok(Node::Variable(pair.as_str().to_string())),
        Rule::integer => pair
            .as_str()
            .parse::<i64>()
            .map(|l| Node::Literal(ConfigValue::Long(l)))
            .map_err(|e| MapperError::Expression(format!("Invalid integer '{}': {}", pair.as_str(), e))),
        Rule::float => pair
            .as_str()
            .parse::<f64>()
            .map(|d| Node::Literal(ConfigValue::Double(d)))
            .map_err(|e| MapperError::Expression(format!("Invalid decimal '{}': {}", pair.as_str(), e))),
        Rule::string => {
            let text = pair.into_inner().next().map(|t| t.as_str()).unwrap_or_default();
            Ok(Node::Literal(ConfigValue::String(unescape(text))))
        }
        Rule::boolean => Ok(Node::Literal(ConfigValue::Bool(pair.as_str() == "true"))),
        Rule::null => Ok(Node::Literal(ConfigValue::Null)),
        other => Err(MapperError::Expression(format!("Unexpected grammar rule {:?}", other))),
    }
}

fn binary_op(op: &str) -> Result<BinaryOp> {
    Ok(match op {
        "or" | "||" => BinaryOp::Or,
        "and" | "&&" => BinaryOp::And,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "&" => BinaryOp::Concat,
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        other => return Err(MapperError::Expression(format!("Unknown operator '{}'", other))),
    })
}

fn incomplete(what: &str) -> MapperError {
    MapperError::Expression(format!("Incomplete expression, missing {}", what))
}

fn unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}

/// Named bindings an expression is evaluated against.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: HashMap<String, ConfigValue>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with(mut self, name: &str, value: impl Into<ConfigValue>) -> Self {
        self.bind(name, value);
        self
    }
    pub fn bind(&mut self, name: &str, value: impl Into<ConfigValue>) {
        self.bindings.insert(name.to_string(), value.into());
    }
    pub fn lookup(&self, name: &str) -> Option<&ConfigValue> {
        self.bindings.get(name)
    }
}

pub trait Evaluator {
    fn evaluate(&self, expression: &Expression, env: &Environment) -> Result<ConfigValue>;
}

/// Tree-walking evaluator for parsed expressions.
#[derive(Debug, Default, Clone, Copy)]
pub struct Interpreter;

impl Evaluator for Interpreter {
    fn evaluate(&self, expression: &Expression, env: &Environment) -> Result<ConfigValue> {
        trace!(expression = expression.source(), "evaluating");
        eval(expression.root(), env).map_err(|e| match e {
            MapperError::Expression(message) => {
                MapperError::Expression(format!("{} (in '{}')", message, expression.source()))
            }
            other => other,
        })
    }
}

fn eval(node: &Node, env: &Environment) -> Result<ConfigValue> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Variable(name) => env
            .lookup(name)
            .cloned()
            .ok_or_else(|| MapperError::Expression(format!("Unknown variable '{}'", name))),
        Node::List(items) => Ok(ConfigValue::List(items.iter().map(|i| eval(i, env)).collect::<Result<_>>()?)),
        Node::Unary(UnaryOp::Not, operand) => Ok(ConfigValue::Bool(!truthy(&eval(operand, env)?))),
        Node::Unary(UnaryOp::Negate, operand) => match eval(operand, env)? {
            ConfigValue::Long(l) => l
                .checked_neg()
                .map(ConfigValue::Long)
                .ok_or_else(|| MapperError::Expression("Integer overflow".to_string())),
            ConfigValue::Double(d) => Ok(ConfigValue::Double(-d)),
            other => Err(MapperError::Expression(format!("Cannot negate a {}", other.kind()))),
        },
        Node::Binary(BinaryOp::Or, left, right) => {
            Ok(ConfigValue::Bool(truthy(&eval(left, env)?) || truthy(&eval(right, env)?)))
        }
        Node::Binary(BinaryOp::And, left, right) => {
            Ok(ConfigValue::Bool(truthy(&eval(left, env)?) && truthy(&eval(right, env)?)))
        }
        Node::Binary(op, left, right) => {
            let left = eval(left, env)?;
            let right = eval(right, env)?;
            match op {
                BinaryOp::Concat => Ok(ConfigValue::String(format!("{}{}", left, right))),
                BinaryOp::Eq => Ok(ConfigValue::Bool(equals(&left, &right))),
                BinaryOp::Ne => Ok(ConfigValue::Bool(!equals(&left, &right))),
                BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                    let ordering = compare(&left, &right).ok_or_else(|| {
                        MapperError::Expression(format!("Cannot compare {} with {}", left.kind(), right.kind()))
                    })?;
                    Ok(ConfigValue::Bool(match op {
                        BinaryOp::Lt => ordering == Ordering::Less,
                        BinaryOp::Le => ordering != Ordering::Greater,
                        BinaryOp::Gt => ordering == Ordering::Greater,
                        _ => ordering != Ordering::Less,
                    }))
                }
                _ => arithmetic(*op, &left, &right),
            }
        }
    }
}

fn truthy(value: &ConfigValue) -> bool {
    match value {
        ConfigValue::Null => false,
        ConfigValue::Bool(b) => *b,
        ConfigValue::Long(l) => *l != 0,
        ConfigValue::Double(d) => *d != 0.0,
        ConfigValue::String(s) => !s.is_empty(),
        ConfigValue::List(items) | ConfigValue::Set(items) => !items.is_empty(),
        ConfigValue::Map(map) => !map.is_empty(),
        ConfigValue::Expression(_) => true,
    }
}

fn number(value: &ConfigValue) -> Option<f64> {
    match value {
        ConfigValue::Long(l) => Some(*l as f64),
        ConfigValue::Double(d) => Some(*d),
        _ => None,
    }
}

fn equals(left: &ConfigValue, right: &ConfigValue) -> bool {
    match (number(left), number(right)) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn compare(left: &ConfigValue, right: &ConfigValue) -> Option<Ordering> {
    match (left, right) {
        (ConfigValue::Long(l), ConfigValue::Long(r)) => Some(l.cmp(r)),
        (ConfigValue::String(l), ConfigValue::String(r)) => Some(l.cmp(r)),
        _ => number(left)?.partial_cmp(&number(right)?),
    }
}

fn arithmetic(op: BinaryOp, left: &ConfigValue, right: &ConfigValue) -> Result<ConfigValue> {
    if let (ConfigValue::Long(l), ConfigValue::Long(r)) = (left, right) {
        let (l, r) = (*l, *r);
        if matches!(op, BinaryOp::Div | BinaryOp::Rem) && r == 0 {
            return Err(MapperError::Expression("Division by zero".to_string()));
        }
        let result = match op {
            BinaryOp::Add => l.checked_add(r),
            BinaryOp::Sub => l.checked_sub(r),
            BinaryOp::Mul => l.checked_mul(r),
            BinaryOp::Div => l.checked_div(r),
            _ => l.checked_rem(r),
        };
        return result
            .map(ConfigValue::Long)
            .ok_or_else(|| MapperError::Expression("Integer overflow".to_string()));
    }
    match (number(left), number(right)) {
        (Some(l), Some(r)) => Ok(ConfigValue::Double(match op {
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Mul => l * r,
            BinaryOp::Div => l / r,
            _ => l % r,
        })),
        _ => Err(MapperError::Expression(format!(
            "Cannot apply {:?} to {} and {}",
            op,
            left.kind(),
            right.kind()
        ))),
    }
}
