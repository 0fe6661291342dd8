//! Property access and the intrinsic methods of arrays, strings and numbers.
//!
//! Sandboxed code has no prototypes. Method calls on these receivers are
//! dispatched here by name; everything else must come in through the
//! capability namespace.
//!
//! Anything that builds a string or an array asks the machine first, so the
//! size is checked before memory is reserved.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use super::machine::{Machine, RuntimeError};
use super::value::{format_number, Value};

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTY ACCESS
// ═══════════════════════════════════════════════════════════════════════════════

fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

pub fn get_property(object: &Value, key: &str) -> Result<Value, RuntimeError> {
    Ok(match object {
        Value::Undefined | Value::Null => {
            return Err(RuntimeError::type_error(format!(
                "cannot read properties of {} (reading '{}')",
                object.to_js_string(),
                key
            )))
        }
        Value::Object(obj) => obj.borrow().get(key).cloned().unwrap_or(Value::Undefined),
        Value::Array(items) => {
            let items = items.borrow();
            if key == "length" {
                Value::Number(items.len() as f64)
            } else {
                parse_index(key)
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or(Value::Undefined)
            }
        }
        Value::String(s) => {
            if key == "length" {
                Value::Number(s.chars().count() as f64)
            } else {
                parse_index(key)
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::string(c.to_string()))
                    .unwrap_or(Value::Undefined)
            }
        }
        Value::Element(el) => match key {
            "type" => el.ty.clone(),
            "props" => Value::object(el.props.clone()),
            _ => Value::Undefined,
        },
        Value::Function(func) if key == "name" => Value::string(func.name()),
        _ => Value::Undefined,
    })
}

pub fn set_property(
    machine: &mut Machine,
    object: &Value,
    key: &str,
    value: Value,
) -> Result<(), RuntimeError> {
    match object {
        Value::Object(obj) => {
            obj.borrow_mut().set(key, value);
            Ok(())
        }
        Value::Array(items) => {
            let mut items = items.borrow_mut();
            if key == "length" {
                let len = value.to_number();
                if !(len >= 0.0 && len.fract() == 0.0 && len <= usize::MAX as f64) {
                    return Err(RuntimeError::Range("invalid array length".into()));
                }
                let len = len as usize;
                if len > items.len() {
                    machine.reserve_array(len)?;
                }
                items.resize(len, Value::Undefined);
                return Ok(());
            }
            let Some(index) = parse_index(key) else {
                return Err(RuntimeError::type_error(format!(
                    "cannot set property '{}' on an array",
                    key
                )));
            };
            if index >= items.len() {
                let len = index
                    .checked_add(1)
                    .ok_or_else(|| RuntimeError::Range("invalid array length".into()))?;
                machine.reserve_array(len)?;
                items.resize(len, Value::Undefined);
            }
            items[index] = value;
            Ok(())
        }
        other => Err(RuntimeError::type_error(format!(
            "cannot set property '{}' of {}",
            key,
            other.to_js_string()
        ))),
    }
}

/// Enumerable own keys, in insertion (or index) order.
pub fn own_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(obj) => obj.borrow().keys().map(str::to_string).collect(),
        Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
        Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Values produced by `for…of` and spread.
pub fn iterate(value: &Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::Array(items) => Ok(items.borrow().clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
        other => Err(RuntimeError::type_error(format!(
            "{} is not iterable",
            other.to_js_string()
        ))),
    }
}

pub fn has_intrinsic_methods(value: &Value) -> bool {
    matches!(
        value,
        Value::Array(_) | Value::String(_) | Value::Number(_) | Value::Bool(_)
    )
}

pub fn call_method(
    machine: &mut Machine,
    receiver: &Value,
    key: &str,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    match receiver {
        Value::Array(items) => {
            machine.charge(items.borrow().len())?;
            array_method(machine, receiver, items, key, args)
        }
        Value::String(s) => {
            machine.charge(s.len())?;
            string_method(machine, s, key, args)
        }
        Value::Number(n) => number_method(*n, key, args),
        Value::Bool(b) if key == "toString" => Ok(Value::string(b.to_string())),
        other => Err(not_a_function(other, key)),
    }
}

fn not_a_function(receiver: &Value, key: &str) -> RuntimeError {
    RuntimeError::type_error(format!("{}.{} is not a function", receiver.type_of(), key))
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

/// Resolves a possibly negative relative index against `len`.
fn relative_index(value: Option<&Value>, len: usize, default: usize) -> usize {
    match value {
        None | Some(Value::Undefined) => default,
        Some(v) => {
            let n = v.to_number();
            if n.is_nan() {
                0
            } else if n < 0.0 {
                (len as f64 + n.trunc()).max(0.0) as usize
            } else {
                (n.trunc() as usize).min(len)
            }
        }
    }
}

fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_equals(b),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARRAY
// ═══════════════════════════════════════════════════════════════════════════════

fn array_method(
    m: &mut Machine,
    receiver: &Value,
    cell: &Rc<RefCell<Vec<Value>>>,
    key: &str,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let snapshot = || cell.borrow().clone();
    let callback = arg(args, 0);
    let visit = |m: &mut Machine, item: &Value, i: usize| {
        m.call(&callback, &[item.clone(), Value::Number(i as f64), receiver.clone()])
    };

    Ok(match key {
        "map" => {
            let mut out = Vec::new();
            for (i, item) in snapshot().iter().enumerate() {
                out.push(visit(m, item, i)?);
            }
            Value::array(out)
        }
        "filter" => {
            let mut out = Vec::new();
            for (i, item) in snapshot().iter().enumerate() {
                if visit(m, item, i)?.truthy() {
                    out.push(item.clone());
                }
            }
            Value::array(out)
        }
        "forEach" => {
            for (i, item) in snapshot().iter().enumerate() {
                visit(m, item, i)?;
            }
            Value::Undefined
        }
        "flatMap" => {
            let mut out = Vec::new();
            for (i, item) in snapshot().iter().enumerate() {
                match visit(m, item, i)? {
                    Value::Array(inner) => {
                        let inner = inner.borrow();
                        m.grow_array(out.len(), inner.len())?;
                        out.extend(inner.iter().cloned());
                    }
                    other => {
                        m.grow_array(out.len(), 1)?;
                        out.push(other);
                    }
                }
            }
            Value::array(out)
        }
        "find" | "findIndex" => {
            for (i, item) in snapshot().iter().enumerate() {
                if visit(m, item, i)?.truthy() {
                    return Ok(if key == "find" {
                        item.clone()
                    } else {
                        Value::Number(i as f64)
                    });
                }
            }
            if key == "find" {
                Value::Undefined
            } else {
                Value::Number(-1.0)
            }
        }
        "some" => {
            for (i, item) in snapshot().iter().enumerate() {
                if visit(m, item, i)?.truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Value::Bool(false)
        }
        "every" => {
            for (i, item) in snapshot().iter().enumerate() {
                if !visit(m, item, i)?.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Value::Bool(true)
        }
        "reduce" => {
            let items = snapshot();
            let mut iter = items.iter().enumerate();
            let mut acc = match args.get(1) {
                Some(init) => init.clone(),
                None => match iter.next() {
                    Some((_, first)) => first.clone(),
                    None => {
                        return Err(RuntimeError::type_error(
                            "reduce of empty array with no initial value",
                        ))
                    }
                },
            };
            for (i, item) in iter {
                acc = m.call(
                    &callback,
                    &[acc, item.clone(), Value::Number(i as f64), receiver.clone()],
                )?;
            }
            acc
        }
        "includes" => {
            let needle = arg(args, 0);
            Value::Bool(snapshot().iter().any(|v| same_value_zero(v, &needle)))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            let pos = snapshot().iter().position(|v| v.strict_equals(&needle));
            Value::Number(pos.map_or(-1.0, |p| p as f64))
        }
        "join" | "toString" => {
            let separator = match args.first() {
                Some(sep) if key == "join" && !matches!(sep, Value::Undefined) => m.stringify(sep)?,
                _ => ",".to_string(),
            };
            let mut out = String::new();
            for (i, item) in snapshot().iter().enumerate() {
                if i > 0 {
                    m.grow_string(out.len(), separator.len())?;
                    out.push_str(&separator);
                }
                if !item.is_nullish() {
                    let text = m.stringify(item)?;
                    m.grow_string(out.len(), text.len())?;
                    out.push_str(&text);
                }
            }
            Value::string(out)
        }
        "slice" => {
            let items = snapshot();
            let len = items.len();
            let start = relative_index(args.first(), len, 0);
            let end = relative_index(args.get(1), len, len);
            Value::array(if start < end {
                items[start..end].to_vec()
            } else {
                Vec::new()
            })
        }
        "at" => {
            let items = snapshot();
            let n = arg(args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let index = if n < 0.0 { items.len() as f64 + n } else { n };
            if index < 0.0 {
                Value::Undefined
            } else {
                items.get(index as usize).cloned().unwrap_or(Value::Undefined)
            }
        }
        "concat" => {
            let mut out = snapshot();
            for value in args {
                match value {
                    Value::Array(inner) => {
                        let inner = inner.borrow();
                        m.grow_array(out.len(), inner.len())?;
                        out.extend(inner.iter().cloned());
                    }
                    other => {
                        m.grow_array(out.len(), 1)?;
                        out.push(other.clone());
                    }
                }
            }
            Value::array(out)
        }
        "flat" => {
            let depth = match args.first() {
                None | Some(Value::Undefined) => 1.0,
                Some(d) => d.to_number(),
            };
            let mut out = Vec::new();
            flatten_into(m, &snapshot(), depth, &mut out)?;
            Value::array(out)
        }
        "push" => {
            let len = cell.borrow().len();
            m.grow_array(len, args.len())?;
            let mut items = cell.borrow_mut();
            items.extend(args.iter().cloned());
            Value::Number(items.len() as f64)
        }
        "pop" => cell.borrow_mut().pop().unwrap_or(Value::Undefined),
        "shift" => {
            let mut items = cell.borrow_mut();
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        }
        "unshift" => {
            let len = cell.borrow().len();
            m.grow_array(len, args.len())?;
            m.charge(len.saturating_mul(args.len()))?;
            let mut items = cell.borrow_mut();
            for (i, value) in args.iter().enumerate() {
                items.insert(i, value.clone());
            }
            Value::Number(items.len() as f64)
        }
        "reverse" => {
            cell.borrow_mut().reverse();
            receiver.clone()
        }
        "sort" => {
            let mut items = snapshot();
            let mut failure = None;
            if callback.is_function() {
                items.sort_by(|a, b| {
                    if failure.is_some() {
                        return Ordering::Equal;
                    }
                    match m.call(&callback, &[a.clone(), b.clone()]) {
                        Ok(v) => v.to_number().partial_cmp(&0.0).unwrap_or(Ordering::Equal),
                        Err(err) => {
                            failure = Some(err);
                            Ordering::Equal
                        }
                    }
                });
            } else {
                let mut keyed = Vec::with_capacity(items.len());
                for item in items.drain(..) {
                    let key = match item {
                        Value::Undefined => None,
                        ref other => Some(m.stringify(other)?),
                    };
                    keyed.push((key, item));
                }
                keyed.sort_by(|(a, _), (b, _)| match (a, b) {
                    (None, None) => Ordering::Equal,
                    (None, _) => Ordering::Greater,
                    (_, None) => Ordering::Less,
                    (Some(a), Some(b)) => a.cmp(b),
                });
                items = keyed.into_iter().map(|(_, item)| item).collect();
            }
            if let Some(err) = failure {
                return Err(err);
            }
            *cell.borrow_mut() = items;
            receiver.clone()
        }
        _ => return Err(not_a_function(receiver, key)),
    })
}

fn flatten_into(
    m: &mut Machine,
    items: &[Value],
    depth: f64,
    out: &mut Vec<Value>,
) -> Result<(), RuntimeError> {
    for item in items {
        m.tick()?;
        match item {
            Value::Array(inner) if depth >= 1.0 => {
                let inner = inner.borrow().clone();
                m.nested(|m| flatten_into(m, &inner, depth - 1.0, out))?;
            }
            other => {
                m.grow_array(out.len(), 1)?;
                out.push(other.clone());
            }
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRING
// ═══════════════════════════════════════════════════════════════════════════════

fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Upper bound on the bytes `s.replace(needle, with)` can produce.
fn replaced_len(s: &str, needle: &str, with: &str, limit: usize) -> Option<usize> {
    let hits = if needle.is_empty() {
        s.chars().count() + 1
    } else {
        s.matches(needle).count()
    };
    s.len().checked_add(with.len().checked_mul(hits.min(limit))?)
}

fn string_method(m: &mut Machine, s: &str, key: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    let len = s.chars().count();
    let text = |m: &mut Machine, i: usize| m.stringify(&arg(args, i));

    Ok(match key {
        "toUpperCase" => {
            let upper = s.to_uppercase();
            m.reserve_string(upper.len())?;
            Value::string(upper)
        }
        "toLowerCase" => Value::string(s.to_lowercase()),
        "trim" => Value::string(s.trim()),
        "trimStart" => Value::string(s.trim_start()),
        "trimEnd" => Value::string(s.trim_end()),
        "toString" | "valueOf" => Value::string(s),
        "startsWith" => Value::Bool(s.starts_with(&text(m, 0)?)),
        "endsWith" => Value::Bool(s.ends_with(&text(m, 0)?)),
        "includes" => Value::Bool(s.contains(&text(m, 0)?)),
        "indexOf" => {
            let needle = text(m, 0)?;
            Value::Number(match s.find(&needle) {
                Some(byte) => s[..byte].chars().count() as f64,
                None => -1.0,
            })
        }
        "charAt" => {
            let i = arg(args, 0).to_number();
            let i = if i.is_nan() { 0.0 } else { i };
            Value::string(
                s.chars()
                    .nth(i.max(0.0) as usize)
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
            )
        }
        "at" => {
            let n = arg(args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let index = if n < 0.0 { len as f64 + n } else { n };
            if index < 0.0 {
                Value::Undefined
            } else {
                s.chars()
                    .nth(index as usize)
                    .map(|c| Value::string(c.to_string()))
                    .unwrap_or(Value::Undefined)
            }
        }
        "slice" => {
            let start = relative_index(args.first(), len, 0);
            let end = relative_index(args.get(1), len, len);
            Value::string(char_slice(s, start, end))
        }
        "substring" => {
            let clamp = |v: Option<&Value>, default: usize| match v {
                None | Some(Value::Undefined) => default,
                Some(v) => {
                    let n = v.to_number();
                    if n.is_nan() {
                        0
                    } else {
                        (n.max(0.0) as usize).min(len)
                    }
                }
            };
            let (a, b) = (clamp(args.first(), 0), clamp(args.get(1), len));
            Value::string(char_slice(s, a.min(b), a.max(b)))
        }
        "split" => {
            let limit = match args.get(1) {
                None | Some(Value::Undefined) => usize::MAX,
                Some(l) => l.to_number().max(0.0) as usize,
            };
            // One past the cap is enough to report the overflow.
            let take = limit.min(m.limits().max_array_length.saturating_add(1));
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::string(s)],
                Some(sep) => {
                    let sep = m.stringify(sep)?;
                    if sep.is_empty() {
                        s.chars().take(take).map(|c| Value::string(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).take(take).map(Value::string).collect()
                    }
                }
            };
            m.reserve_array(parts.len())?;
            Value::array(parts)
        }
        "replace" | "replaceAll" => {
            let (needle, with) = (text(m, 0)?, text(m, 1)?);
            let limit = if key == "replace" { 1 } else { usize::MAX };
            let bound = replaced_len(s, &needle, &with, limit)
                .ok_or_else(|| RuntimeError::Range("invalid string length".into()))?;
            m.reserve_string(bound)?;
            if key == "replace" {
                Value::string(s.replacen(&needle, &with, 1))
            } else {
                Value::string(s.replace(&needle, &with))
            }
        }
        "repeat" => {
            let count = arg(args, 0).to_number();
            if !(count >= 0.0 && count.is_finite()) {
                return Err(RuntimeError::Range(format!(
                    "invalid count value: {}",
                    format_number(count)
                )));
            }
            let bytes = if count >= usize::MAX as f64 {
                None
            } else {
                s.len().checked_mul(count as usize)
            };
            match bytes {
                Some(bytes) => m.reserve_string(bytes)?,
                None if s.is_empty() => {}
                None => return Err(RuntimeError::Range("invalid string length".into())),
            }
            Value::string(s.repeat(if s.is_empty() { 0 } else { count as usize }))
        }
        "padStart" | "padEnd" => {
            let target = arg(args, 0).to_number();
            let target = if target.is_nan() { 0.0 } else { target.max(0.0) };
            let filler = match args.get(1) {
                None | Some(Value::Undefined) => " ".to_string(),
                Some(f) => m.stringify(f)?,
            };
            if target <= len as f64 || filler.is_empty() {
                Value::string(s)
            } else {
                // Every char is at least one byte, so the char target bounds the result.
                if target > m.limits().max_string_length as f64 {
                    return Err(RuntimeError::Range("invalid string length".into()));
                }
                let missing = target as usize - len;
                let pad: String = filler.chars().cycle().take(missing).collect();
                m.grow_string(s.len(), pad.len())?;
                if key == "padStart" {
                    Value::string(format!("{}{}", pad, s))
                } else {
                    Value::string(format!("{}{}", s, pad))
                }
            }
        }
        "concat" => {
            let mut out = s.to_string();
            for value in args {
                let text = m.stringify(value)?;
                m.grow_string(out.len(), text.len())?;
                out.push_str(&text);
            }
            Value::string(out)
        }
        "localeCompare" => Value::Number(match s.cmp(text(m, 0)?.as_str()) {
            Ordering::Less => -1.0,
            Ordering::Equal => 0.0,
            Ordering::Greater => 1.0,
        }),
        _ => return Err(not_a_function(&Value::string(s), key)),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// NUMBER
// ═══════════════════════════════════════════════════════════════════════════════

fn number_method(n: f64, key: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(match key {
        "toString" | "valueOf" => Value::string(format_number(n)),
        "toFixed" => {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits as usize };
            if digits > 100 {
                return Err(RuntimeError::type_error("toFixed() digits out of range"));
            }
            if n.is_finite() {
                Value::string(format!("{:.*}", digits, n))
            } else {
                Value::string(format_number(n))
            }
        }
        "toLocaleString" => Value::string(group_thousands(n)),
        _ => return Err(not_a_function(&Value::Number(n), key)),
    })
}

/// en-US style grouping with at most three fraction digits.
pub fn group_thousands(n: f64) -> String {
    if !n.is_finite() {
        return format_number(n);
    }
    let rounded = format!("{:.3}", n.abs());
    let (int_part, frac_part) = rounded.split_once('.').unwrap_or((&rounded, ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if !frac_part.is_empty() {
        grouped.push('.');
        grouped.push_str(frac_part);
    }
    if n < 0.0 && grouped.chars().any(|c| c.is_ascii_digit() && c != '0') {
        grouped.insert(0, '-');
    }
    grouped
}
