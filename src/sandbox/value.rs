use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::render::Node;

use super::ir::FunctionDef;
use super::machine::{Machine, RuntimeError, Scope};

/// Nested arrays deeper than this are not joined by `String(value)`.
const MAX_JOIN_DEPTH: usize = 128;

/// Cap for host-side conversions that have no machine to report to.
const DISPLAY_LIMIT: usize = 1 << 24;

const MAX_JSON_DEPTH: usize = 128;

/// Host-implemented function callable from sandboxed code.
pub type NativeFn = Arc<dyn Fn(&mut Machine, &[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// Runtime value inside the sandbox.
///
/// Values are reference counted and never leave the thread that created them;
/// anything handed back to the host is converted to a [`Node`] or JSON first.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<Object>>),
    Function(Rc<Function>),
    Element(Rc<Element>),
    /// Already-rendered output injected by the host (layout `children`).
    Node(Rc<Node>),
}

pub enum Function {
    Closure { def: Rc<FunctionDef>, env: Rc<Scope> },
    Native { name: String, func: NativeFn },
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Closure { def, .. } => def.name.as_deref().unwrap_or("anonymous"),
            Function::Native { name, .. } => name,
        }
    }
}

/// Result of an element-factory call: a type (tag name or component) plus props.
/// Children live under `props.children`.
pub struct Element {
    pub ty: Value,
    pub props: Object,
}

/// Insertion-ordered property bag.
#[derive(Clone, Default)]
pub struct Object {
    entries: IndexMap<String, Value>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Overwriting keeps the key's original position.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut obj = Object::new();
        for (k, v) in iter {
            obj.set(k, v);
        }
        obj
    }
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(obj: Object) -> Self {
        Value::Object(Rc::new(RefCell::new(obj)))
    }

    pub fn native(
        name: impl Into<String>,
        func: impl Fn(&mut Machine, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Value::Function(Rc::new(Function::Native {
            name: name.into(),
            func: Arc::new(func),
        }))
    }

    pub fn from_native(name: impl Into<String>, func: NativeFn) -> Self {
        Value::Function(Rc::new(Function::Native {
            name: name.into(),
            func,
        }))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Element(_) | Value::Node(_) => {
                "object"
            }
        }
    }

    /// `String(value)` semantics. Arrays that would join past an internal
    /// display cap are cut short; sandboxed code goes through
    /// [`Machine::stringify`] instead.
    pub fn to_js_string(&self) -> String {
        let mut out = String::new();
        let _ = self.write_js_string(&mut out, DISPLAY_LIMIT, &mut Vec::new());
        out
    }

    /// `String(value)`, or `None` once the result would exceed `limit` bytes
    /// or arrays nest too deeply to join. Arrays that contain themselves join
    /// as empty, as in JS.
    pub fn to_js_string_within(&self, limit: usize) -> Option<String> {
        let mut out = String::new();
        self.write_js_string(&mut out, limit, &mut Vec::new())
            .then_some(out)
    }

    fn write_js_string(
        &self,
        out: &mut String,
        limit: usize,
        joining: &mut Vec<*const RefCell<Vec<Value>>>,
    ) -> bool {
        let text = match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => return push_within(out, s, limit),
            Value::Array(items) => {
                let ptr = Rc::as_ptr(items);
                if joining.contains(&ptr) {
                    return true;
                }
                if joining.len() >= MAX_JOIN_DEPTH {
                    return false;
                }
                joining.push(ptr);
                let mut complete = true;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 && !push_within(out, ",", limit) {
                        complete = false;
                        break;
                    }
                    if !item.is_nullish() && !item.write_js_string(out, limit, joining) {
                        complete = false;
                        break;
                    }
                }
                joining.pop();
                return complete;
            }
            Value::Function(f) => format!("function {}() {{ [code] }}", f.name()),
            Value::Object(_) | Value::Element(_) | Value::Node(_) => "[object Object]".into(),
        };
        push_within(out, &text, limit)
    }

    /// `Number(value)` semantics.
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
            Value::String(s) => parse_number(s),
            Value::Array(items) => {
                // Only `[]` and single-element arrays can join to a number.
                let items = items.borrow();
                match items.as_slice() {
                    [] => 0.0,
                    [only] if only.is_nullish() => 0.0,
                    [Value::Array(_)] => match items[0].to_js_string_within(64) {
                        Some(text) => parse_number(&text),
                        None => f64::NAN,
                    },
                    [Value::Number(n)] => *n,
                    [Value::String(s)] => parse_number(s),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Element(a), Value::Element(b)) => Rc::ptr_eq(a, b),
            (Value::Node(a), Value::Node(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                let (a, b) = (self.to_number(), other.to_number());
                a == b
            }
            _ => self.strict_equals(other),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::string(s),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// `JSON.stringify` shape. Functions and undefined become `None`, as JS
    /// drops them. Conversion stops with a `RangeError` once `max_bytes` of
    /// string data and values have been visited, and with a `TypeError` on
    /// cycles.
    pub fn to_json(&self, max_bytes: usize) -> Result<Option<serde_json::Value>, RuntimeError> {
        let mut budget = max_bytes;
        self.json_within(&mut budget, 0)
    }

    fn json_within(
        &self,
        budget: &mut usize,
        depth: usize,
    ) -> Result<Option<serde_json::Value>, RuntimeError> {
        let cost = match self {
            Value::String(s) => s.len() + 2,
            _ => 4,
        };
        *budget = budget.checked_sub(cost).ok_or_else(|| {
            RuntimeError::Range("invalid string length: value is too large to serialize".into())
        })?;
        if depth > MAX_JSON_DEPTH {
            return Err(RuntimeError::type_error(
                "converting circular or too deeply nested structure to JSON",
            ));
        }
        Ok(match self {
            Value::Undefined | Value::Function(_) => None,
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Number(n) => Some(
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            ),
            Value::String(s) => Some(serde_json::Value::String(s.to_string())),
            Value::Array(items) => {
                let mut out = Vec::new();
                for item in items.borrow().iter() {
                    let json = item.json_within(budget, depth + 1)?;
                    out.push(json.unwrap_or(serde_json::Value::Null));
                }
                Some(serde_json::Value::Array(out))
            }
            Value::Object(obj) => {
                let mut out = serde_json::Map::new();
                for (key, item) in obj.borrow().iter() {
                    *budget = budget.saturating_sub(key.len());
                    if let Some(json) = item.json_within(budget, depth + 1)? {
                        out.insert(key.to_string(), json);
                    }
                }
                Some(serde_json::Value::Object(out))
            }
            Value::Element(_) | Value::Node(_) => Some(serde_json::Value::Object(Default::default())),
        })
    }
}

fn push_within(out: &mut String, text: &str, limit: usize) -> bool {
    if out.len().saturating_add(text.len()) > limit {
        return false;
    }
    out.push_str(text);
    true
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => write!(f, "[{}]", Value::Array(Rc::clone(items)).to_js_string()),
            Value::Object(obj) => f.debug_set().entries(obj.borrow().keys()).finish(),
            Value::Function(func) => write!(f, "[Function {}]", func.name()),
            Value::Element(el) => write!(f, "<{}>", el.ty.to_js_string()),
            Value::Node(_) => write!(f, "[Node]"),
            other => write!(f, "{}", other.to_js_string()),
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let label = if n > 0.0 { "Infinity" } else { "-Infinity" };
        label.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}
