//! Sandboxed interpreter for the runtime script language.
//!
//! Values are plain data (no functions, no object identity): arrays and
//! objects are owned trees and compare structurally. Instance state is
//! reached through the [`Scope`] trait, which is the only way a script can
//! observe or change anything outside its own locals.

use serde::{Serialize, Serializer};
use std::cell::RefCell;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::expr::{
    BinaryOp, Expr, Literal, LogicalOp, MemberProperty, ParseError,
    Stmt, TemplatePart, UnaryOp,
};

/// Nested method calls allowed before a script is aborted.
pub const MAX_CALL_DEPTH: usize = 64;

/// Largest array length or string length a script may create.
pub const MAX_COLLECTION_LENGTH: usize = 1 << 24;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("syntax error: {0}")]
    Parse(#[from] ParseError),
    #[error("{0} is not defined")]
    Reference(String),
    #[error("{0} is not a function")]
    NotCallable(String),
    #[error("Cannot read properties of {base} (reading '{property}')")]
    NullAccess { base: String, property: String },
    #[error("Cannot set properties of {base} (setting '{property}')")]
    NullWrite { base: String, property: String },
    #[error("invalid assignment target")]
    InvalidTarget,
    #[error("maximum call depth of {0} exceeded")]
    CallDepth(usize),
    #[error("{0}")]
    Type(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    /// Insertion-ordered properties.
    Object(Vec<(String, Value)>),
}

impl Value {
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
        }
    }

    /// `String(value)`
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_js_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
        }
    }

    /// Text placed into a live text node: `undefined` renders as nothing.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => String::new(),
            other => other.to_js_string(),
        }
    }

    /// `Number(value)`
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => Value::String(single.to_js_string()).to_number(),
                _ => f64::NAN,
            },
            Value::Object(_) => f64::NAN,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .filter(|(_, v)| *v != Value::Undefined)
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// JS `Number.prototype.toString()` formatting.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        let s = format!("{:e}", n);
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        };
    }
    if n.fract() == 0.0 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    if t
        .chars()
        .any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
    {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

fn parse_int(s: &str, radix: Option<u32>) -> f64 {
    let t = s.trim_start();
    let (negative, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let (radix, t) = match radix {
        Some(16) | None if t.starts_with("0x") || t.starts_with("0X") => (16, &t[2..]),
        Some(r) if (2..=36).contains(&r) => (r, t),
        Some(_) => return f64::NAN,
        None => (10, t),
    };
    let digits: String = t.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let mut value = 0f64;
    for c in digits.chars() {
        value = value * radix as f64 + c.to_digit(radix).unwrap_or(0) as f64;
    }
    if negative {
        -value
    } else {
        value
    }
}

fn parse_float(s: &str) -> f64 {
    let t = s.trim_start();
    for special in ["Infinity", "+Infinity"] {
        if t.starts_with(special) {
            return f64::INFINITY;
        }
    }
    if t.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    // Longest prefix that parses.
    let mut best = f64::NAN;
    for (i, _) in t.char_indices().skip(1).chain(std::iter::once((t.len(), ' '))) {
        if let Ok(n) = t[..i].parse::<f64>() {
            if !t[..i].contains(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
                best = n;
            }
        }
    }
    best
}

pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => a == b,
        _ => false,
    }
}

pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            a.to_number() == b.to_number()
        }
        (Value::Bool(_), _) => loose_equals(&Value::Number(a.to_number()), b),
        (_, Value::Bool(_)) => loose_equals(a, &Value::Number(b.to_number())),
        (Value::Array(_) | Value::Object(_), Value::String(_) | Value::Number(_)) => {
            loose_equals(&Value::String(a.to_js_string()), b)
        }
        (Value::String(_) | Value::Number(_), Value::Array(_) | Value::Object(_)) => {
            loose_equals(a, &Value::String(b.to_js_string()))
        }
        _ => strict_equals(a, b),
    }
}

pub fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let stringy = |v: &Value| {
                matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_))
            };
            if stringy(left) || stringy(right) {
                Value::String(format!("{}{}", left.to_js_string(), right.to_js_string()))
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            let result = match ordering {
                None => false,
                Some(ord) => match op {
                    BinaryOp::Lt => ord.is_lt(),
                    BinaryOp::Gt => ord.is_gt(),
                    BinaryOp::LtEq => ord.is_le(),
                    _ => ord.is_ge(),
                },
            };
            Value::Bool(result)
        }
        BinaryOp::Eq => Value::Bool(loose_equals(left, right)),
        BinaryOp::NotEq => Value::Bool(!loose_equals(left, right)),
        BinaryOp::StrictEq => Value::Bool(strict_equals(left, right)),
        BinaryOp::StrictNotEq => Value::Bool(!strict_equals(left, right)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Instance state visible to a script.
pub trait Scope {
    /// Current value of a data field.
    fn lookup(&self, name: &str) -> Option<Value>;
    /// Top-level write of a data field; observers are notified.
    fn assign(&self, name: &str, value: Value);
    /// Write-back after an in-place nested mutation; observers are not notified.
    fn replace_quietly(&self, name: &str, value: Value);
    fn has_method(&self, _name: &str) -> bool {
        false
    }
    fn call_method(&self, name: &str, _args: Vec<Value>) -> Result<Value, EvalError> {
        Err(EvalError::NotCallable(name.to_string()))
    }
    /// `this` used as a value.
    fn snapshot(&self) -> Value;
}

/// A plain ordered map of values, used while evaluating data initializers.
#[derive(Debug, Default)]
pub struct ValuesScope {
    values: RefCell<Vec<(String, Value)>>,
}

impl ValuesScope {
    pub fn new(values: Vec<(String, Value)>) -> Self {
        ValuesScope {
            values: RefCell::new(values),
        }
    }

    pub fn into_values(self) -> Vec<(String, Value)> {
        self.values.into_inner()
    }

    /// Adds or overwrites a value.
    pub fn define(&self, name: &str, value: Value) {
        let mut values = self.values.borrow_mut();
        match values.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => values.push((name.to_string(), value)),
        }
    }
}

impl Scope for ValuesScope {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.values
            .borrow()
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    fn assign(&self, name: &str, value: Value) {
        self.define(name, value);
    }

    fn replace_quietly(&self, name: &str, value: Value) {
        self.define(name, value);
    }

    fn snapshot(&self) -> Value {
        Value::Object(self.values.borrow().clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERPRETER
// ═══════════════════════════════════════════════════════════════════════════════

enum Flow {
    Normal,
    Return(Value),
}

enum Root {
    Local(usize, String),
    Data(String),
}

pub struct Interpreter<'s> {
    scope: &'s dyn Scope,
    frames: Vec<HashMap<String, Value>>,
}

impl<'s> Interpreter<'s> {
    pub fn new(scope: &'s dyn Scope) -> Self {
        Interpreter {
            scope,
            frames: vec![HashMap::new()],
        }
    }

    pub fn with_locals(scope: &'s dyn Scope, locals: Vec<(String, Value)>) -> Self {
        Interpreter {
            scope,
            frames: vec![locals.into_iter().collect()],
        }
    }

    /// Runs a statement list, returning the value of a `return` statement.
    pub fn run(&mut self, stmts: &[Stmt]) -> Result<Value, EvalError> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec(stmt)? {
                return Ok(value);
            }
        }
        Ok(Value::Undefined)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, EvalError> {
        match stmt {
            Stmt::Empty => Ok(Flow::Normal),
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Let(decls) => {
                for (name, init) in decls {
                    let value = match init {
                        Some(expr) => self.eval(expr)?,
                        None => Value::Undefined,
                    };
                    if let Some(frame) = self.frames.last_mut() {
                        frame.insert(name.clone(), value);
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.exec(consequent)
                } else if let Some(alternate) = alternate {
                    self.exec(alternate)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Block(body) => {
                self.frames.push(HashMap::new());
                let mut flow = Ok(Flow::Normal);
                for stmt in body {
                    match self.exec(stmt) {
                        Ok(Flow::Normal) => continue,
                        other => {
                            flow = other;
                            break;
                        }
                    }
                }
                self.frames.pop();
                flow
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Undefined => Value::Undefined,
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
            }),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expr(expr) => out.push_str(&self.eval(expr)?.to_js_string()),
                    }
                }
                Ok(Value::String(out))
            }
            Expr::Ident(name) => self.lookup_name(name),
            Expr::This => Ok(self.scope.snapshot()),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::Array(values))
            }
            Expr::Object(props) => {
                let mut entries: Vec<(String, Value)> = Vec::with_capacity(props.len());
                for (key, value) in props {
                    let value = self.eval(value)?;
                    match entries.iter_mut().find(|(k, _)| k == key) {
                        Some(slot) => slot.1 = value,
                        None => entries.push((key.clone(), value)),
                    }
                }
                Ok(Value::Object(entries))
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                if let Expr::This = object.as_ref() {
                    let key = self.property_key(property)?;
                    return Ok(self.scope.lookup(&key).unwrap_or_default());
                }
                if let Some(namespace) = self.builtin_namespace(object) {
                    let key = self.property_key(property)?;
                    return Ok(namespace_constant(namespace, &key));
                }
                let target = self.eval(object)?;
                if *optional && target.is_nullish() {
                    return Ok(Value::Undefined);
                }
                let key = self.property_key(property)?;
                get_member(&target, &key)
            }
            Expr::Call { callee, args } => self.call(callee, args),
            Expr::Unary { op, arg } => {
                if *op == UnaryOp::TypeOf {
                    if let Expr::Ident(name) = arg.as_ref() {
                        if !self.is_bound(name) {
                            return Ok(Value::String("undefined".to_string()));
                        }
                    }
                }
                let value = self.eval(arg)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::TypeOf => Value::String(value.type_of().to_string()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(binary_op(*op, &left, &right))
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Assign { op, target, value } => {
                let value = match op.binary() {
                    None => self.eval(value)?,
                    Some(binary) => {
                        let current = self.eval(target)?;
                        let rhs = self.eval(value)?;
                        binary_op(binary, &current, &rhs)
                    }
                };
                self.store(target, value.clone(), true)?;
                Ok(value)
            }
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let old = self.eval(target)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.store(target, Value::Number(new), true)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
        }
    }

    // ─── names ────────────────────────────────────────────────────────────────

    fn local_frame(&self, name: &str) -> Option<usize> {
        self.frames.iter().rposition(|frame| frame.contains_key(name))
    }

    fn is_bound(&self, name: &str) -> bool {
        self.local_frame(name).is_some() || self.scope.lookup(name).is_some()
    }

    fn lookup_name(&self, name: &str) -> Result<Value, EvalError> {
        if let Some(idx) = self.local_frame(name) {
            return Ok(self.frames[idx].get(name).cloned().unwrap_or_default());
        }
        if let Some(value) = self.scope.lookup(name) {
            return Ok(value);
        }
        match name {
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            _ => Err(EvalError::Reference(name.to_string())),
        }
    }

    fn builtin_namespace(&self, expr: &Expr) -> Option<&'static str> {
        let Expr::Ident(name) = expr else {
            return None;
        };
        if self.is_bound(name) {
            return None;
        }
        match name.as_str() {
            "Math" => Some("Math"),
            "console" => Some("console"),
            "JSON" => Some("JSON"),
            _ => None,
        }
    }

    fn property_key(&mut self, property: &MemberProperty) -> Result<String, EvalError> {
        match property {
            MemberProperty::Static(name) => Ok(name.clone()),
            MemberProperty::Computed(expr) => Ok(self.eval(expr)?.to_js_string()),
        }
    }

    // ─── assignment ───────────────────────────────────────────────────────────

    fn resolve_target(&mut self, target: &Expr) -> Result<(Root, Vec<String>), EvalError> {
        match target {
            Expr::Ident(name) => {
                if let Some(idx) = self.local_frame(name) {
                    Ok((Root::Local(idx, name.clone()), Vec::new()))
                } else if self.scope.lookup(name).is_some() {
                    Ok((Root::Data(name.clone()), Vec::new()))
                } else {
                    Err(EvalError::Reference(name.clone()))
                }
            }
            Expr::Member {
                object, property, ..
            } => {
                if let Expr::This = object.as_ref() {
                    let key = self.property_key(property)?;
                    return Ok((Root::Data(key), Vec::new()));
                }
                let (root, mut path) = self.resolve_target(object)?;
                path.push(self.property_key(property)?);
                Ok((root, path))
            }
            _ => Err(EvalError::InvalidTarget),
        }
    }

    /// Writes `value` to `target`. A top-level data write notifies observers
    /// when `notify` is set; nested writes never do.
    fn store(&mut self, target: &Expr, value: Value, notify: bool) -> Result<(), EvalError> {
        let (root, path) = self.resolve_target(target)?;

        if path.is_empty() {
            match root {
                Root::Local(idx, name) => {
                    self.frames[idx].insert(name, value);
                }
                Root::Data(name) if notify => self.scope.assign(&name, value),
                Root::Data(name) => self.scope.replace_quietly(&name, value),
            }
            return Ok(());
        }

        let (mut current, root_name) = match &root {
            Root::Local(idx, name) => (
                self.frames[*idx].get(name).cloned().unwrap_or_default(),
                name.clone(),
            ),
            Root::Data(name) => (self.scope.lookup(name).unwrap_or_default(), name.clone()),
        };
        set_path(&mut current, &root_name, &path, value)?;
        match root {
            Root::Local(idx, name) => {
                self.frames[idx].insert(name, current);
            }
            Root::Data(name) => self.scope.replace_quietly(&name, current),
        }
        Ok(())
    }

    // ─── calls ────────────────────────────────────────────────────────────────

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, EvalError> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value, EvalError> {
        match callee {
            Expr::Ident(name) => {
                let args = self.eval_args(args)?;
                if self.local_frame(name).is_some() {
                    return Err(EvalError::NotCallable(name.clone()));
                }
                if self.scope.has_method(name) {
                    return self.scope.call_method(name, args);
                }
                global_function(name, &args)
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let method = self.property_key(property)?;
                if let Expr::This = object.as_ref() {
                    let args = self.eval_args(args)?;
                    if self.scope.has_method(&method) {
                        return self.scope.call_method(&method, args);
                    }
                    return Err(EvalError::NotCallable(format!("this.{}", method)));
                }
                if let Some(namespace) = self.builtin_namespace(object) {
                    let args = self.eval_args(args)?;
                    return namespace_call(namespace, &method, &args);
                }

                let receiver = self.eval(object)?;
                if *optional && receiver.is_nullish() {
                    return Ok(Value::Undefined);
                }
                let args = self.eval_args(args)?;
                if let Value::Array(_) = receiver {
                    if MUTATING_ARRAY_METHODS.contains(&method.as_str()) {
                        let mut array = receiver;
                        let result = mutate_array(&mut array, &method, args)?;
                        if object.is_assignable() {
                            self.store(object, array, false)?;
                        }
                        return Ok(result);
                    }
                }
                value_method(&receiver, &method, &args)
            }
            _ => Err(EvalError::NotCallable("expression".to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTY ACCESS
// ═══════════════════════════════════════════════════════════════════════════════

fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse::<usize>().ok()
}

pub fn get_member(target: &Value, key: &str) -> Result<Value, EvalError> {
    match target {
        Value::Undefined | Value::Null => Err(EvalError::NullAccess {
            base: target.to_js_string(),
            property: key.to_string(),
        }),
        Value::Array(items) => Ok(if key == "length" {
            Value::Number(items.len() as f64)
        } else {
            array_index(key)
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default()
        }),
        Value::String(s) => Ok(if key == "length" {
            Value::Number(s.encode_utf16().count() as f64)
        } else {
            array_index(key)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default()
        }),
        Value::Object(_) => Ok(target.get(key).cloned().unwrap_or_default()),
        _ => Ok(Value::Undefined),
    }
}

fn set_path(target: &mut Value, base: &str, path: &[String], value: Value) -> Result<(), EvalError> {
    let Some((key, rest)) = path.split_first() else {
        *target = value;
        return Ok(());
    };
    match target {
        Value::Undefined | Value::Null => Err(EvalError::NullWrite {
            base: format!("{} ({})", target.to_js_string(), base),
            property: key.clone(),
        }),
        Value::Array(items) => {
            if key == "length" && rest.is_empty() {
                let len = value.to_number();
                if len < 0.0 || len.fract() != 0.0 || len > MAX_COLLECTION_LENGTH as f64 {
                    return Err(EvalError::Type("Invalid array length".to_string()));
                }
                items.resize(len as usize, Value::Undefined);
                return Ok(());
            }
            let Some(index) = array_index(key) else {
                return Ok(());
            };
            if index >= MAX_COLLECTION_LENGTH {
                return Err(EvalError::Type("Invalid array length".to_string()));
            }
            if index >= items.len() {
                items.resize(index + 1, Value::Undefined);
            }
            set_path(&mut items[index], key, rest, value)
        }
        Value::Object(entries) => {
            let idx = match entries.iter().position(|(k, _)| k == key) {
                Some(idx) => idx,
                None => {
                    entries.push((key.clone(), Value::Undefined));
                    entries.len() - 1
                }
            };
            set_path(&mut entries[idx].1, key, rest, value)
        }
        // Writes to primitive properties are ignored.
        _ => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILTINS
// ═══════════════════════════════════════════════════════════════════════════════

const MUTATING_ARRAY_METHODS: &[&str] = &["push", "pop", "shift", "unshift", "reverse", "splice"];

fn number_arg(args: &[Value], i: usize) -> f64 {
    args.get(i).map_or(f64::NAN, Value::to_number)
}

fn global_function(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    let first = args.first().cloned().unwrap_or_default();
    match name {
        "String" => Ok(Value::String(if args.is_empty() {
            String::new()
        } else {
            first.to_js_string()
        })),
        "Number" => Ok(Value::Number(if args.is_empty() { 0.0 } else { first.to_number() })),
        "Boolean" => Ok(Value::Bool(first.is_truthy())),
        "parseInt" => {
            let radix = args.get(1).map(|r| r.to_number()).filter(|r| *r != 0.0 && !r.is_nan());
            Ok(Value::Number(parse_int(&first.to_js_string(), radix.map(|r| r as u32))))
        }
        "parseFloat" => Ok(Value::Number(parse_float(&first.to_js_string()))),
        "isNaN" => Ok(Value::Bool(first.to_number().is_nan())),
        "alert" => {
            info!(target: "olova::console", "alert: {}", first.to_js_string());
            Ok(Value::Undefined)
        }
        _ => Err(EvalError::Reference(name.to_string())),
    }
}

fn namespace_constant(namespace: &str, key: &str) -> Value {
    match (namespace, key) {
        ("Math", "PI") => Value::Number(std::f64::consts::PI),
        ("Math", "E") => Value::Number(std::f64::consts::E),
        ("Math", "LN2") => Value::Number(std::f64::consts::LN_2),
        ("Math", "LN10") => Value::Number(std::f64::consts::LN_10),
        ("Math", "SQRT2") => Value::Number(std::f64::consts::SQRT_2),
        _ => Value::Undefined,
    }
}

fn namespace_call(namespace: &str, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    match namespace {
        "Math" => math_call(method, args),
        "console" => {
            let text = args
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    Value::Array(_) | Value::Object(_) => v.to_json().to_string(),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(" ");
            match method {
                "log" | "info" => info!(target: "olova::console", message = %text),
                "warn" => warn!(target: "olova::console", message = %text),
                "error" => error!(target: "olova::console", message = %text),
                "debug" => debug!(target: "olova::console", message = %text),
                _ => return Err(EvalError::NotCallable(format!("console.{}", method))),
            }
            Ok(Value::Undefined)
        }
        "JSON" => match method {
            "stringify" => Ok(Value::String(
                args.first().cloned().unwrap_or_default().to_json().to_string(),
            )),
            "parse" => {
                let text = args.first().cloned().unwrap_or_default().to_js_string();
                serde_json::from_str::<serde_json::Value>(&text)
                    .map(Value::from)
                    .map_err(|e| EvalError::Type(format!("JSON.parse: {}", e)))
            }
            _ => Err(EvalError::NotCallable(format!("JSON.{}", method))),
        },
        _ => Err(EvalError::NotCallable(format!("{}.{}", namespace, method))),
    }
}

fn math_call(method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let x = number_arg(args, 0);
    let n = match method {
        "max" => args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, |acc, v| {
            if acc.is_nan() || v.is_nan() {
                f64::NAN
            } else {
                acc.max(v)
            }
        }),
        "min" => args.iter().map(Value::to_number).fold(f64::INFINITY, |acc, v| {
            if acc.is_nan() || v.is_nan() {
                f64::NAN
            } else {
                acc.min(v)
            }
        }),
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "round" => (x + 0.5).floor(),
        "trunc" => x.trunc(),
        "abs" => x.abs(),
        "sqrt" => x.sqrt(),
        "sign" => {
            if x.is_nan() || x == 0.0 {
                x
            } else {
                x.signum()
            }
        }
        "pow" => x.powf(number_arg(args, 1)),
        _ => return Err(EvalError::NotCallable(format!("Math.{}", method))),
    };
    Ok(Value::Number(n))
}

/// Resolves a possibly negative index against `len`, clamped to `[0, len]`.
fn relative_index(value: Option<&Value>, len: usize, default: usize) -> usize {
    let Some(value) = value.filter(|v| **v != Value::Undefined) else {
        return default;
    };
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

fn mutate_array(array: &mut Value, method: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    let Value::Array(items) = array else {
        return Err(EvalError::NotCallable(method.to_string()));
    };
    match method {
        "push" => {
            items.extend(args);
            Ok(Value::Number(items.len() as f64))
        }
        "pop" => Ok(items.pop().unwrap_or_default()),
        "shift" => Ok(if items.is_empty() {
            Value::Undefined
        } else {
            items.remove(0)
        }),
        "unshift" => {
            for (i, arg) in args.into_iter().enumerate() {
                items.insert(i, arg);
            }
            Ok(Value::Number(items.len() as f64))
        }
        "reverse" => {
            items.reverse();
            Ok(Value::Array(items.clone()))
        }
        "splice" => {
            let len = items.len();
            let start = relative_index(args.first(), len, 0);
            let delete = match args.get(1) {
                None => len - start,
                Some(v) => {
                    let n = v.to_number();
                    if n.is_nan() || n < 0.0 {
                        0
                    } else {
                        (n as usize).min(len - start)
                    }
                }
            };
            let removed: Vec<Value> = items
                .splice(start..start + delete, args.into_iter().skip(2))
                .collect();
            Ok(Value::Array(removed))
        }
        _ => Err(EvalError::NotCallable(method.to_string())),
    }
}

fn value_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
    match (receiver, method) {
        (Value::Undefined | Value::Null, _) => Err(EvalError::NullAccess {
            base: receiver.to_js_string(),
            property: method.to_string(),
        }),
        (_, "toString") => Ok(Value::String(receiver.to_js_string())),

        (Value::Array(items), "includes") => {
            let needle = arg(0);
            Ok(Value::Bool(items.iter().any(|item| {
                strict_equals(item, &needle)
                    || matches!((item, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
            })))
        }
        (Value::Array(items), "indexOf") => {
            let needle = arg(0);
            Ok(Value::Number(
                items
                    .iter()
                    .position(|item| strict_equals(item, &needle))
                    .map_or(-1.0, |i| i as f64),
            ))
        }
        (Value::Array(items), "join") => {
            let sep = match arg(0) {
                Value::Undefined => ",".to_string(),
                other => other.to_js_string(),
            };
            Ok(Value::String(
                items
                    .iter()
                    .map(|item| {
                        if item.is_nullish() {
                            String::new()
                        } else {
                            item.to_js_string()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(&sep),
            ))
        }
        (Value::Array(items), "slice") => {
            let start = relative_index(args.first(), items.len(), 0);
            let end = relative_index(args.get(1), items.len(), items.len());
            Ok(Value::Array(if start < end {
                items[start..end].to_vec()
            } else {
                Vec::new()
            }))
        }
        (Value::Array(items), "concat") => {
            let mut out = items.clone();
            for extra in args {
                match extra {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::Array(out))
        }

        (Value::String(s), "toUpperCase") => Ok(Value::String(s.to_uppercase())),
        (Value::String(s), "toLowerCase") => Ok(Value::String(s.to_lowercase())),
        (Value::String(s), "trim") => Ok(Value::String(s.trim().to_string())),
        (Value::String(s), "includes") => Ok(Value::Bool(s.contains(&arg(0).to_js_string()))),
        (Value::String(s), "startsWith") => Ok(Value::Bool(s.starts_with(&arg(0).to_js_string()))),
        (Value::String(s), "endsWith") => Ok(Value::Bool(s.ends_with(&arg(0).to_js_string()))),
        (Value::String(s), "indexOf") => {
            let needle = arg(0).to_js_string();
            Ok(Value::Number(
                s.find(&needle)
                    .map_or(-1.0, |byte| s[..byte].chars().count() as f64),
            ))
        }
        (Value::String(s), "charAt") => {
            let i = number_arg(args, 0);
            let i = if i.is_nan() { 0 } else { i as usize };
            Ok(Value::String(s.chars().nth(i).map(String::from).unwrap_or_default()))
        }
        (Value::String(s), "slice") => {
            let chars: Vec<char> = s.chars().collect();
            let start = relative_index(args.first(), chars.len(), 0);
            let end = relative_index(args.get(1), chars.len(), chars.len());
            Ok(Value::String(if start < end {
                chars[start..end].iter().collect()
            } else {
                String::new()
            }))
        }
        (Value::String(s), "split") => Ok(Value::Array(match arg(0) {
            Value::Undefined => vec![Value::String(s.clone())],
            sep => {
                let sep = sep.to_js_string();
                if sep.is_empty() {
                    s.chars().map(|c| Value::String(c.to_string())).collect()
                } else {
                    s.split(sep.as_str()).map(Value::from).collect()
                }
            }
        })),
        (Value::String(s), "replace") => Ok(Value::String(s.replacen(
            &arg(0).to_js_string(),
            &arg(1).to_js_string(),
            1,
        ))),
        (Value::String(s), "repeat") => {
            let count = number_arg(args, 0);
            if count.is_nan() || count < 0.0 || count.is_infinite() {
                return Err(EvalError::Type("Invalid count value".to_string()));
            }
            let count = count as usize;
            if count.saturating_mul(s.len()) > MAX_COLLECTION_LENGTH {
                return Err(EvalError::Type("Invalid string length".to_string()));
            }
            Ok(Value::String(s.repeat(count)))
        }

        (Value::Number(n), "toFixed") => {
            let digits = number_arg(args, 0);
            let digits = if digits.is_nan() { 0 } else { digits as usize };
            Ok(Value::String(format!("{:.*}", digits.min(100), n)))
        }

        _ => Err(EvalError::NotCallable(format!(
            "{}.{}",
            receiver.type_of(),
            method
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_string_conversions() {
        assert_eq!(Value::Undefined.to_display_string(), "");
        assert_eq!(Value::Null.to_display_string(), "null");
        assert_eq!(
            Value::Array(vec![1.into(), Value::Null, "x".into()]).to_js_string(),
            "1,,x"
        );
        assert_eq!(Value::object([("a", Value::from(1))]).to_js_string(), "[object Object]");
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::from(" 42 ").to_number(), 42.0);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert!(Value::from("inf").to_number().is_nan());
        assert_eq!(Value::from("0x1f").to_number(), 31.0);
        assert_eq!(Value::Bool(true).to_number(), 1.0);
        assert!(Value::Undefined.to_number().is_nan());
    }

    #[test]
    fn test_equality() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(loose_equals(&Value::from("1"), &Value::from(1)));
        assert!(loose_equals(&Value::Bool(true), &Value::from(1)));
        assert!(!strict_equals(&Value::from("1"), &Value::from(1)));
        assert!(!strict_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    fn test_parse_int_and_float() {
        assert_eq!(parse_int("  12px", None), 12.0);
        assert_eq!(parse_int("-0x10", None), -16.0);
        assert_eq!(parse_int("101", Some(2)), 5.0);
        assert!(parse_int("px", None).is_nan());
        assert_eq!(parse_float("3.25em"), 3.25);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert!(parse_float("abc").is_nan());
    }

    #[test]
    fn test_json_round_trip_of_nested_value() {
        let json = serde_json::json!({"name": "Ada", "tags": ["a", "b"], "age": 36});
        let value = Value::from(json.clone());
        assert_eq!(value.to_json(), json);
        assert_eq!(serde_json::to_string(&Value::from(1.5)).unwrap(), "1.5");
    }
}
