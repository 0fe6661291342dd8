//! Standard capability kit.
//!
//! Generated pages are written against a React + shadcn/ui + lucide +
//! recharts vocabulary. The kit provides static stand-ins for that
//! vocabulary: hooks that return their initial state, UI primitives that
//! render semantic tags tagged with `data-ui`, icons as inert `<svg>`s and
//! charts as labelled placeholders. `Date` is the one constructor sandboxed
//! code may `new`. Hosts extend or replace entries through
//! [`CapabilityNamespace::insert`].

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Timelike, Utc};

use crate::capability::{Capability, CapabilityNamespace};
use crate::render::create_element;
use crate::sandbox::builtins::group_thousands;
use crate::sandbox::{Machine, Object, RuntimeError, Value};

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn props_of(args: &[Value]) -> Object {
    match args.first() {
        Some(Value::Object(obj)) => obj.borrow().clone(),
        _ => Object::new(),
    }
}

fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// STYLING
// ═══════════════════════════════════════════════════════════════════════════════

fn collect_classes(m: &mut Machine, value: &Value, out: &mut Vec<String>) -> Result<(), RuntimeError> {
    m.tick()?;
    match value {
        Value::String(s) => {
            m.charge(s.len())?;
            out.extend(s.split_whitespace().map(str::to_string));
        }
        Value::Number(n) if *n != 0.0 && !n.is_nan() => out.push(value.to_js_string()),
        Value::Array(items) => {
            let items = items.borrow().clone();
            m.nested(|m| {
                for item in &items {
                    collect_classes(m, item, out)?;
                }
                Ok(())
            })?;
        }
        Value::Object(obj) => {
            for (key, enabled) in obj.borrow().iter() {
                if enabled.truthy() {
                    out.push(key.to_string());
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// `clsx`-style class joining; later duplicates of a token are dropped.
pub fn class_names(m: &mut Machine, args: &[Value]) -> Result<String, RuntimeError> {
    let mut tokens = Vec::new();
    for value in args {
        collect_classes(m, value, &mut tokens)?;
    }
    let mut seen = HashSet::with_capacity(tokens.len());
    let mut out = String::new();
    for token in tokens {
        if seen.contains(&token) {
            continue;
        }
        let sep = usize::from(!out.is_empty());
        m.grow_string(out.len(), token.len() + sep)?;
        if sep == 1 {
            out.push(' ');
        }
        out.push_str(&token);
        seen.insert(token);
    }
    Ok(out)
}

fn cn(m: &mut Machine, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::string(class_names(m, args)?))
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOOKS
// ═══════════════════════════════════════════════════════════════════════════════

fn noop(_: &mut Machine, _: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Undefined)
}

fn use_state(m: &mut Machine, args: &[Value]) -> Result<Value, RuntimeError> {
    let initial = match args.first() {
        Some(init) if init.is_function() => m.call(init, &[])?,
        Some(init) => init.clone(),
        None => Value::Undefined,
    };
    Ok(Value::array(vec![initial, Value::native("setState", noop)]))
}

fn use_reducer(m: &mut Machine, args: &[Value]) -> Result<Value, RuntimeError> {
    let initial = match args.get(2) {
        Some(init) if init.is_function() => m.call(init, &[arg(args, 1)])?,
        _ => arg(args, 1),
    };
    Ok(Value::array(vec![initial, Value::native("dispatch", noop)]))
}

fn use_memo(m: &mut Machine, args: &[Value]) -> Result<Value, RuntimeError> {
    m.call(&arg(args, 0), &[])
}

fn use_callback(_: &mut Machine, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(arg(args, 0))
}

fn use_ref(_: &mut Machine, args: &[Value]) -> Result<Value, RuntimeError> {
    let mut obj = Object::new();
    obj.set("current", arg(args, 0));
    Ok(Value::object(obj))
}

fn hooks() -> Vec<(&'static str, Capability)> {
    vec![
        ("useState", Capability::function(use_state)),
        ("useReducer", Capability::function(use_reducer)),
        ("useEffect", Capability::function(noop)),
        ("useLayoutEffect", Capability::function(noop)),
        ("useMemo", Capability::function(use_memo)),
        ("useCallback", Capability::function(use_callback)),
        ("useRef", Capability::function(use_ref)),
    ]
}

// ═══════════════════════════════════════════════════════════════════════════════
// LANGUAGE MODULES
// ═══════════════════════════════════════════════════════════════════════════════

fn math_unary(f: fn(f64) -> f64) -> Capability {
    Capability::function(move |_, args| Ok(Value::Number(f(arg(args, 0).to_number()))))
}

/// `Math.random` stand-in: deterministic per render so output is reproducible.
fn pseudo_random(m: &mut Machine, _: &[Value]) -> Result<Value, RuntimeError> {
    let mut x = m.steps().wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    Ok(Value::Number((x >> 11) as f64 / (1u64 << 53) as f64))
}

fn math() -> Capability {
    let fold = |init: f64, pick: fn(f64, f64) -> f64| {
        Capability::function(move |_, args| {
            let mut acc = init;
            for value in args {
                let n = value.to_number();
                if n.is_nan() {
                    return Ok(Value::Number(f64::NAN));
                }
                acc = pick(acc, n);
            }
            Ok(Value::Number(acc))
        })
    };

    Capability::module([
        ("abs", math_unary(f64::abs)),
        ("ceil", math_unary(f64::ceil)),
        ("floor", math_unary(f64::floor)),
        ("round", math_unary(|n| (n + 0.5).floor())),
        ("trunc", math_unary(f64::trunc)),
        ("sign", math_unary(|n| if n == 0.0 || n.is_nan() { n } else { n.signum() })),
        ("sqrt", math_unary(f64::sqrt)),
        ("log", math_unary(f64::ln)),
        ("log10", math_unary(f64::log10)),
        ("sin", math_unary(f64::sin)),
        ("cos", math_unary(f64::cos)),
        ("max", fold(f64::NEG_INFINITY, f64::max)),
        ("min", fold(f64::INFINITY, f64::min)),
        (
            "pow",
            Capability::function(|_, args| {
                Ok(Value::Number(arg(args, 0).to_number().powf(arg(args, 1).to_number())))
            }),
        ),
        ("random", Capability::function(pseudo_random)),
        ("PI", Capability::Constant(serde_json::json!(std::f64::consts::PI))),
        ("E", Capability::Constant(serde_json::json!(std::f64::consts::E))),
    ])
}

fn object_entries(m: &mut Machine, value: &Value) -> Result<Vec<(String, Value)>, RuntimeError> {
    let entries: Vec<(String, Value)> = match value {
        Value::Object(obj) => obj
            .borrow()
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        _ => Vec::new(),
    };
    m.charge(entries.len())?;
    Ok(entries)
}

fn object() -> Capability {
    Capability::module([
        (
            "keys",
            Capability::function(|m, args| {
                Ok(Value::array(
                    object_entries(m, &arg(args, 0))?
                        .into_iter()
                        .map(|(k, _)| Value::string(k))
                        .collect(),
                ))
            }),
        ),
        (
            "values",
            Capability::function(|m, args| {
                Ok(Value::array(
                    object_entries(m, &arg(args, 0))?.into_iter().map(|(_, v)| v).collect(),
                ))
            }),
        ),
        (
            "entries",
            Capability::function(|m, args| {
                Ok(Value::array(
                    object_entries(m, &arg(args, 0))?
                        .into_iter()
                        .map(|(k, v)| Value::array(vec![Value::string(k), v]))
                        .collect(),
                ))
            }),
        ),
        (
            "fromEntries",
            Capability::function(|m, args| {
                let mut obj = Object::new();
                if let Value::Array(pairs) = arg(args, 0) {
                    for pair in pairs.borrow().iter() {
                        if let Value::Array(kv) = pair {
                            let (key, value) = {
                                let kv = kv.borrow();
                                (arg(&kv, 0), arg(&kv, 1))
                            };
                            obj.set(m.stringify(&key)?, value);
                        }
                    }
                }
                Ok(Value::object(obj))
            }),
        ),
        (
            "assign",
            Capability::function(|m, args| {
                let target = arg(args, 0);
                let Value::Object(obj) = &target else {
                    return Err(RuntimeError::type_error("Object.assign target must be an object"));
                };
                for source in args.iter().skip(1) {
                    for (k, v) in object_entries(m, source)? {
                        obj.borrow_mut().set(k, v);
                    }
                }
                Ok(target)
            }),
        ),
        ("freeze", Capability::function(|_, args| Ok(arg(args, 0)))),
    ])
}

fn array() -> Capability {
    Capability::module([
        (
            "isArray",
            Capability::function(|_, args| Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))),
        ),
        ("of", Capability::function(|_, args| Ok(Value::array(args.to_vec())))),
        (
            "from",
            Capability::function(|m, args| {
                let source = arg(args, 0);
                let items = match &source {
                    Value::Array(items) => items.borrow().clone(),
                    Value::String(s) => {
                        m.reserve_array(s.chars().count())?;
                        s.chars().map(|c| Value::string(c.to_string())).collect()
                    }
                    Value::Object(obj) => {
                        let len = obj
                            .borrow()
                            .get("length")
                            .map(Value::to_number)
                            .unwrap_or(0.0);
                        if !(len >= 0.0 && len.fract() == 0.0 && len <= usize::MAX as f64) {
                            return Err(RuntimeError::Range("invalid array length".into()));
                        }
                        m.reserve_array(len as usize)?;
                        vec![Value::Undefined; len as usize]
                    }
                    _ => Vec::new(),
                };
                let mapper = arg(args, 1);
                if !mapper.is_function() {
                    return Ok(Value::array(items));
                }
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    out.push(m.call(&mapper, &[item, Value::Number(i as f64)])?);
                }
                Ok(Value::array(out))
            }),
        ),
    ])
}

fn json() -> Capability {
    Capability::module([
        (
            "stringify",
            Capability::function(|m, args| {
                let budget = m.limits().max_string_length;
                let Some(json) = arg(args, 0).to_json(budget)? else {
                    return Ok(Value::Undefined);
                };
                let pretty = match args.get(2) {
                    Some(Value::Number(n)) => *n > 0.0,
                    Some(Value::String(s)) => !s.is_empty(),
                    _ => false,
                };
                let text = if pretty {
                    serde_json::to_string_pretty(&json)
                } else {
                    serde_json::to_string(&json)
                };
                let text = text.map_err(|e| RuntimeError::type_error(e.to_string()))?;
                m.reserve_string(text.len())?;
                Ok(Value::string(text))
            }),
        ),
        (
            "parse",
            Capability::function(|m, args| {
                let text = m.stringify(&arg(args, 0))?;
                let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                    RuntimeError::Thrown(Value::string(format!("SyntaxError: {}", e)))
                })?;
                Ok(Value::from_json(&json))
            }),
        ),
    ])
}

fn console() -> Capability {
    let level = |level: &'static str| {
        Capability::function(move |m, args| {
            let line = args
                .iter()
                .map(|value| m.stringify(value))
                .collect::<Result<Vec<_>, _>>()?
                .join(" ");
            tracing::debug!(target: "sandbox::console", level, "{}", line);
            Ok(Value::Undefined)
        })
    };
    Capability::module([
        ("log", level("log")),
        ("info", level("info")),
        ("warn", level("warn")),
        ("error", level("error")),
    ])
}

fn parse_int(m: &mut Machine, args: &[Value]) -> Result<Value, RuntimeError> {
    let text = m.stringify(&arg(args, 0))?;
    let text = text.trim();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, text.strip_prefix('+').unwrap_or(text)),
    };
    let leading: String = digits.chars().take_while(char::is_ascii_digit).collect();
    Ok(Value::Number(match leading.parse::<f64>() {
        Ok(n) => sign * n,
        Err(_) => f64::NAN,
    }))
}

/// Longest numeric literal `parseFloat` looks at.
const MAX_FLOAT_LITERAL: usize = 512;

fn parse_float(m: &mut Machine, args: &[Value]) -> Result<Value, RuntimeError> {
    let text = m.stringify(&arg(args, 0))?;
    let text = text.trim_start();
    let literal = text
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')))
        .map_or(text.len(), |(i, _)| i)
        .min(MAX_FLOAT_LITERAL);
    let text = text.get(..literal).unwrap_or_default();
    let mut end = 0;
    for (i, _) in text.char_indices().skip(1).chain(std::iter::once((text.len(), ' '))) {
        if text[..i].parse::<f64>().is_ok() {
            end = i;
        }
    }
    Ok(Value::Number(if end == 0 {
        f64::NAN
    } else {
        text[..end].parse().unwrap_or(f64::NAN)
    }))
}

fn conversions() -> Vec<(&'static str, Capability)> {
    vec![
        (
            "String",
            Capability::function(|m, args| match args.first() {
                Some(value) => Ok(Value::string(m.stringify(value)?)),
                None => Ok(Value::string("")),
            }),
        ),
        (
            "Number",
            Capability::function(|_, args| {
                Ok(Value::Number(args.first().map_or(0.0, Value::to_number)))
            }),
        ),
        (
            "Boolean",
            Capability::function(|_, args| Ok(Value::Bool(arg(args, 0).truthy()))),
        ),
        ("parseInt", Capability::function(parse_int)),
        ("parseFloat", Capability::function(parse_float)),
        (
            "isNaN",
            Capability::function(|_, args| Ok(Value::Bool(arg(args, 0).to_number().is_nan()))),
        ),
        (
            "formatNumber",
            Capability::function(|_, args| Ok(Value::string(group_thousands(arg(args, 0).to_number())))),
        ),
    ]
}

// ═══════════════════════════════════════════════════════════════════════════════
// DATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Largest distance from the epoch a JS date can hold, in milliseconds.
const MAX_TIME_MS: f64 = 8.64e15;

const DATE_NUMBER_GETTERS: &[&str] = &[
    "getFullYear",
    "getMonth",
    "getDate",
    "getDay",
    "getHours",
    "getMinutes",
    "getSeconds",
    "getMilliseconds",
    "getTime",
    "valueOf",
];

fn from_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() || ms.abs() > MAX_TIME_MS {
        return None;
    }
    Utc.timestamp_millis_opt(ms.trunc() as i64).single()
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(text, format) {
            return Some(at.and_utc());
        }
    }
    let day = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    Some(day.and_hms_opt(0, 0, 0)?.and_utc())
}

/// `new Date(year, monthIndex, day?, hours?, minutes?, seconds?, ms?)`, with
/// out-of-range fields carried into the next unit.
fn from_components(parts: &[f64]) -> Option<DateTime<Utc>> {
    if parts.iter().any(|p| !p.is_finite()) {
        return None;
    }
    let field = |i: usize, default: f64| parts.get(i).map_or(default, |p| p.trunc());
    let mut year = field(0, f64::NAN);
    if (0.0..=99.0).contains(&year) {
        year += 1900.0;
    }
    let month = field(1, 0.0);
    let year = year + (month / 12.0).floor();
    if year.abs() > 300_000.0 {
        return None;
    }
    let first = NaiveDate::from_ymd_opt(year as i32, month.rem_euclid(12.0) as u32 + 1, 1)?;
    let base = first.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis() as f64;
    let offset = (field(2, 1.0) - 1.0) * 86_400_000.0
        + field(3, 0.0) * 3_600_000.0
        + field(4, 0.0) * 60_000.0
        + field(5, 0.0) * 1_000.0
        + field(6, 0.0);
    from_millis(base + offset)
}

fn date_number(at: &DateTime<Utc>, getter: &str) -> f64 {
    match getter {
        "getFullYear" => at.year() as f64,
        "getMonth" => at.month0() as f64,
        "getDate" => at.day() as f64,
        "getDay" => at.weekday().num_days_from_sunday() as f64,
        "getHours" => at.hour() as f64,
        "getMinutes" => at.minute() as f64,
        "getSeconds" => at.second() as f64,
        "getMilliseconds" => at.timestamp_subsec_millis() as f64,
        _ => at.timestamp_millis() as f64,
    }
}

/// A date as a plain object of getters. Times are UTC.
fn date_value(at: Option<DateTime<Utc>>) -> Value {
    let mut obj = Object::new();
    for &getter in DATE_NUMBER_GETTERS {
        let method = Value::native(getter, move |_, _| {
            Ok(Value::Number(at.as_ref().map_or(f64::NAN, |at| date_number(at, getter))))
        });
        obj.set(getter, method);
    }
    let iso = move || at.map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true));
    obj.set(
        "toISOString",
        Value::native("toISOString", move |_, _| match iso() {
            Some(text) => Ok(Value::string(text)),
            None => Err(RuntimeError::Range("invalid time value".into())),
        }),
    );
    obj.set(
        "toJSON",
        Value::native("toJSON", move |_, _| Ok(iso().map_or(Value::Null, Value::string))),
    );
    let formatted = move |name: &'static str, format: fn(&DateTime<Utc>) -> String| {
        Value::native(name, move |_, _| {
            Ok(Value::string(at.as_ref().map_or_else(|| "Invalid Date".to_string(), format)))
        })
    };
    obj.set("toDateString", formatted("toDateString", |at| at.format("%a %b %d %Y").to_string()));
    obj.set(
        "toLocaleDateString",
        formatted("toLocaleDateString", |at| format!("{}/{}/{}", at.month(), at.day(), at.year())),
    );
    obj.set(
        "toString",
        formatted("toString", |at| {
            at.format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)")
                .to_string()
        }),
    );
    Value::object(obj)
}

fn date(m: &mut Machine, args: &[Value]) -> Result<Value, RuntimeError> {
    let at = match args {
        [] => Some(Utc::now()),
        [Value::String(text)] => parse_date(text),
        [Value::Object(obj)] => {
            // Copying another date goes through its `getTime`.
            let time = obj.borrow().get("getTime").cloned();
            match time {
                Some(getter) if getter.is_function() => from_millis(m.call(&getter, &[])?.to_number()),
                _ => None,
            }
        }
        [single] => from_millis(single.to_number()),
        parts => from_components(&parts.iter().map(Value::to_number).collect::<Vec<_>>()),
    };
    Ok(date_value(at))
}

// ═══════════════════════════════════════════════════════════════════════════════
// UI PRIMITIVES
// ═══════════════════════════════════════════════════════════════════════════════

/// `(name, tag, base classes)` of the shadcn/ui-like primitives.
const UI_PRIMITIVES: &[(&str, &str, &str)] = &[
    ("Button", "button", "inline-flex items-center justify-center rounded-md text-sm font-medium"),
    ("Card", "div", "rounded-lg border bg-card text-card-foreground shadow-sm"),
    ("CardHeader", "div", "flex flex-col space-y-1.5 p-6"),
    ("CardTitle", "h3", "text-2xl font-semibold leading-none tracking-tight"),
    ("CardDescription", "p", "text-sm text-muted-foreground"),
    ("CardContent", "div", "p-6 pt-0"),
    ("CardFooter", "div", "flex items-center p-6 pt-0"),
    ("Badge", "span", "inline-flex items-center rounded-full border px-2.5 py-0.5 text-xs font-semibold"),
    ("Input", "input", "flex h-10 w-full rounded-md border px-3 py-2 text-sm"),
    ("Textarea", "textarea", "flex min-h-[80px] w-full rounded-md border px-3 py-2 text-sm"),
    ("Label", "label", "text-sm font-medium leading-none"),
    ("Separator", "div", "shrink-0 bg-border h-[1px] w-full"),
    ("Avatar", "span", "relative flex h-10 w-10 shrink-0 overflow-hidden rounded-full"),
    ("AvatarImage", "img", "aspect-square h-full w-full"),
    ("AvatarFallback", "span", "flex h-full w-full items-center justify-center rounded-full bg-muted"),
    ("Alert", "div", "relative w-full rounded-lg border p-4"),
    ("AlertTitle", "h5", "mb-1 font-medium leading-none tracking-tight"),
    ("AlertDescription", "div", "text-sm"),
    ("Tabs", "div", ""),
    ("TabsList", "div", "inline-flex h-10 items-center justify-center rounded-md bg-muted p-1"),
    ("TabsTrigger", "button", "inline-flex items-center justify-center rounded-sm px-3 py-1.5 text-sm"),
    ("TabsContent", "div", "mt-2"),
    ("Table", "table", "w-full caption-bottom text-sm"),
    ("TableHeader", "thead", ""),
    ("TableBody", "tbody", ""),
    ("TableRow", "tr", "border-b"),
    ("TableHead", "th", "h-12 px-4 text-left align-middle font-medium"),
    ("TableCell", "td", "p-4 align-middle"),
    ("Progress", "div", "relative h-4 w-full overflow-hidden rounded-full bg-secondary"),
    ("Skeleton", "div", "animate-pulse rounded-md bg-muted"),
    ("ScrollArea", "div", "relative overflow-hidden"),
    ("Switch", "button", "peer inline-flex h-6 w-11 shrink-0 items-center rounded-full"),
    ("Checkbox", "button", "peer h-4 w-4 shrink-0 rounded-sm border"),
];

/// Props consumed by primitives rather than forwarded to the DOM.
const VARIANT_PROPS: &[(&str, &str)] = &[("variant", "data-variant"), ("size", "data-size")];

fn ui_primitive(name: &'static str, tag: &'static str, base: &'static str) -> Capability {
    Capability::component(move |m, args| {
        let source = props_of(args);
        let mut props = Object::new();
        props.set("data-ui", Value::string(kebab_case(name)));
        for (key, value) in source.iter() {
            if key == "asChild" {
                continue;
            }
            match VARIANT_PROPS.iter().find(|(prop, _)| *prop == key) {
                Some((_, attribute)) => props.set(*attribute, value.clone()),
                None => props.set(key, value.clone()),
            }
        }
        let class = class_names(
            m,
            &[
                Value::string(base),
                source.get("className").cloned().unwrap_or(Value::Undefined),
            ],
        )?;
        if class.is_empty() {
            props.remove("className");
        } else {
            props.set("className", Value::string(class));
        }
        create_element(m, &[Value::string(tag), Value::object(props)])
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// ICONS
// ═══════════════════════════════════════════════════════════════════════════════

const ICONS: &[&str] = &[
    "Activity", "AlertCircle", "ArrowLeft", "ArrowRight", "BarChart3", "Bell", "Bookmark",
    "Calendar", "Check", "CheckCircle", "ChevronDown", "ChevronLeft", "ChevronRight", "ChevronUp",
    "Clock", "Copy", "CreditCard", "DollarSign", "Download", "Edit", "ExternalLink", "Eye", "File",
    "Filter", "Github", "Globe", "Heart", "Home", "Image", "Info", "Loader2", "Lock", "LogOut",
    "Mail", "MapPin", "Menu", "MessageSquare", "Minus", "Moon", "MoreHorizontal", "Package",
    "Phone", "Plus", "Search", "Send", "Settings", "Share", "ShoppingCart", "Star", "Sun", "Trash",
    "TrendingDown", "TrendingUp", "Upload", "User", "Users", "X", "Zap",
];

fn icon(name: &'static str) -> Capability {
    Capability::component(move |m, args| {
        let source = props_of(args);
        let size = source
            .get("size")
            .cloned()
            .unwrap_or(Value::Number(24.0));
        let mut props = Object::new();
        props.set("data-icon", Value::string(kebab_case(name)));
        props.set("aria-hidden", Value::Bool(true));
        props.set("width", size.clone());
        props.set("height", size);
        props.set("viewBox", Value::string("0 0 24 24"));
        props.set("fill", Value::string("none"));
        props.set("stroke", source.get("color").cloned().unwrap_or(Value::string("currentColor")));
        props.set(
            "stroke-width",
            source.get("strokeWidth").cloned().unwrap_or(Value::Number(2.0)),
        );
        if let Some(class) = source.get("className") {
            props.set("className", class.clone());
        }
        create_element(m, &[Value::string("svg"), Value::object(props)])
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHARTS
// ═══════════════════════════════════════════════════════════════════════════════

const CHART_CONTAINERS: &[&str] = &["AreaChart", "BarChart", "LineChart", "PieChart", "RadarChart"];
const CHART_SERIES: &[&str] = &["Area", "Bar", "Line", "Pie", "Radar"];
const CHART_PARTS: &[&str] = &["CartesianGrid", "Cell", "Legend", "PolarGrid", "Tooltip", "XAxis", "YAxis"];

fn chart_container(name: &'static str) -> Capability {
    Capability::component(move |m, args| {
        let source = props_of(args);
        let mut props = Object::new();
        props.set("data-chart", Value::string(kebab_case(name)));
        if let Some(Value::Array(data)) = source.get("data") {
            props.set("data-points", Value::Number(data.borrow().len() as f64));
        }
        for key in ["width", "height", "className"] {
            if let Some(value) = source.get(key) {
                props.set(key, value.clone());
            }
        }
        if let Some(children) = source.get("children") {
            props.set("children", children.clone());
        }
        create_element(m, &[Value::string("div"), Value::object(props)])
    })
}

fn chart_element(attribute: &'static str, name: &'static str) -> Capability {
    Capability::component(move |m, args| {
        let source = props_of(args);
        let mut props = Object::new();
        props.set(attribute, Value::string(kebab_case(name)));
        for (key, attr) in [("dataKey", "data-key"), ("name", "data-name"), ("fill", "fill"), ("stroke", "stroke")] {
            if let Some(value) = source.get(key) {
                props.set(attr, value.clone());
            }
        }
        if let Some(children) = source.get("children") {
            props.set("children", children.clone());
        }
        create_element(m, &[Value::string("g"), Value::object(props)])
    })
}

fn responsive_container(m: &mut Machine, args: &[Value]) -> Result<Value, RuntimeError> {
    let source = props_of(args);
    let mut props = Object::new();
    props.set("data-chart", Value::string("responsive-container"));
    if let Some(children) = source.get("children") {
        props.set("children", children.clone());
    }
    create_element(m, &[Value::string("div"), Value::object(props)])
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAMESPACE
// ═══════════════════════════════════════════════════════════════════════════════

fn react() -> Capability {
    let mut members: BTreeMap<String, Capability> = hooks()
        .into_iter()
        .map(|(name, cap)| (name.to_string(), cap))
        .collect();
    members.insert("createElement".to_string(), Capability::ElementFactory);
    members.insert("Fragment".to_string(), Capability::Fragment);
    Capability::Module(members)
}

/// Every capability the kit offers, keyed by the identifier generated code
/// uses for it.
pub fn standard_entries() -> Vec<(String, Capability)> {
    let mut entries: Vec<(String, Capability)> = vec![
        ("h".to_string(), Capability::ElementFactory),
        ("Fragment".to_string(), Capability::Fragment),
        ("React".to_string(), react()),
        ("cn".to_string(), Capability::function(cn)),
        ("clsx".to_string(), Capability::function(cn)),
        ("Math".to_string(), math()),
        ("Object".to_string(), object()),
        ("Array".to_string(), array()),
        ("JSON".to_string(), json()),
        ("Date".to_string(), Capability::function(date)),
        ("console".to_string(), console()),
        ("ResponsiveContainer".to_string(), Capability::component(responsive_container)),
    ];
    entries.extend(hooks().into_iter().map(|(n, c)| (n.to_string(), c)));
    entries.extend(conversions().into_iter().map(|(n, c)| (n.to_string(), c)));
    entries.extend(
        UI_PRIMITIVES
            .iter()
            .map(|&(name, tag, base)| (name.to_string(), ui_primitive(name, tag, base))),
    );
    entries.extend(ICONS.iter().map(|&name| (name.to_string(), icon(name))));
    entries.extend(
        CHART_CONTAINERS
            .iter()
            .map(|&name| (name.to_string(), chart_container(name))),
    );
    entries.extend(
        CHART_SERIES
            .iter()
            .map(|&name| (name.to_string(), chart_element("data-series", name))),
    );
    entries.extend(
        CHART_PARTS
            .iter()
            .map(|&name| (name.to_string(), chart_element("data-chart-part", name))),
    );
    entries
}

/// The default namespace: the whole kit.
pub fn standard_namespace() -> CapabilityNamespace {
    let mut namespace = CapabilityNamespace::new();
    for (name, capability) in standard_entries() {
        if let Err(err) = namespace.insert(name, capability) {
            tracing::warn!(error = %err, "skipping kit entry");
        }
    }
    namespace
}
