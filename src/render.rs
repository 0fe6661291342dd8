//! Render tree.
//!
//! Sandboxed components produce [`Value::Element`]s; this module drives
//! function components to completion and converts the result into plain,
//! thread-safe [`Node`] data that the host can serialise or print as HTML.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::sandbox::value::format_number;
use crate::sandbox::{Element, Machine, Object, RuntimeError, Value};

// ═══════════════════════════════════════════════════════════════════════════════
// NODES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Node {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
        children: Vec<Node>,
    },
    Text {
        value: String,
    },
    Fragment {
        children: Vec<Node>,
    },
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text {
            value: value.into(),
        }
    }

    pub fn element(tag: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Element {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children,
        }
    }

    /// Collapses a rendered child list into one root node.
    pub fn from_children(mut children: Vec<Node>) -> Self {
        if children.len() == 1 {
            children.remove(0)
        } else {
            Node::Fragment { children }
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Node::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        match self {
            Node::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element { children, .. } | Node::Fragment { children } => children,
            Node::Text { .. } => &[],
        }
    }

    pub fn text_content(&self) -> String {
        match self {
            Node::Text { value } => value.clone(),
            other => other.children().iter().map(Node::text_content).collect(),
        }
    }

    /// First element with `tag`, depth first.
    pub fn find(&self, tag: &str) -> Option<&Node> {
        if self.tag() == Some(tag) {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(tag))
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Node::Text { value } => out.push_str(&escape_html(value)),
            Node::Fragment { children } => {
                for child in children {
                    child.write_html(out);
                }
            }
            Node::Element {
                tag,
                attributes,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_html(value));
                    out.push('"');
                }
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Output of one successful resolution: the files that took part plus the
/// rendered nesting (layouts outermost first around the page).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedTree {
    pub page: String,
    pub layouts: Vec<String>,
    pub root: Node,
}

impl ComposedTree {
    pub fn to_html(&self) -> String {
        self.root.to_html()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENT FACTORY
// ═══════════════════════════════════════════════════════════════════════════════

/// `h(type, props, ...children)`. A single child is stored as-is under
/// `props.children`, several as an array; `key` is dropped.
pub fn create_element(_: &mut Machine, args: &[Value]) -> Result<Value, RuntimeError> {
    let ty = args.first().cloned().unwrap_or(Value::Undefined);
    if !matches!(ty, Value::String(_) | Value::Function(_)) {
        return Err(RuntimeError::type_error(format!(
            "element type is invalid: expected a tag name or a component but got {}",
            ty.to_js_string()
        )));
    }

    let mut props = match args.get(1) {
        Some(Value::Object(obj)) => obj.borrow().clone(),
        _ => Object::new(),
    };
    props.remove("key");

    let children = args.get(2..).unwrap_or(&[]);
    match children {
        [] => {}
        [only] => props.set("children", only.clone()),
        many => props.set("children", Value::array(many.to_vec())),
    }

    Ok(Value::Element(Rc::new(Element { ty, props })))
}

/// Fragment component: renders its children in place.
pub fn fragment(_: &mut Machine, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(match args.first() {
        Some(Value::Object(props)) => props
            .borrow()
            .get("children")
            .cloned()
            .unwrap_or(Value::Undefined),
        _ => Value::Undefined,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDERING
// ═══════════════════════════════════════════════════════════════════════════════

/// Renders `value` into a flat child list, calling function components.
/// Each level of children or component output counts against the machine's
/// nesting limit, and rendered text against its step budget.
pub fn render_value(machine: &mut Machine, value: &Value) -> Result<Vec<Node>, RuntimeError> {
    let mut out = Vec::new();
    render_into(machine, value, &mut out)?;
    Ok(out)
}

fn push_text(out: &mut Vec<Node>, text: String) {
    if let Some(Node::Text { value }) = out.last_mut() {
        value.push_str(&text);
    } else {
        out.push(Node::Text { value: text });
    }
}

fn render_into(machine: &mut Machine, value: &Value, out: &mut Vec<Node>) -> Result<(), RuntimeError> {
    machine.nested(|machine| render_nested(machine, value, out))
}

fn render_nested(machine: &mut Machine, value: &Value, out: &mut Vec<Node>) -> Result<(), RuntimeError> {
    machine.tick()?;
    match value {
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Function(_) => {}
        Value::Number(n) => push_text(out, format_number(*n)),
        Value::String(s) => {
            machine.charge(s.len())?;
            push_text(out, s.to_string());
        }
        Value::Array(items) => {
            let items = items.borrow().clone();
            machine.charge(items.len())?;
            for item in &items {
                render_into(machine, item, out)?;
            }
        }
        Value::Node(node) => match node.as_ref() {
            Node::Fragment { children } => out.extend(children.iter().cloned()),
            other => out.push(other.clone()),
        },
        Value::Object(_) => {
            return Err(RuntimeError::type_error(
                "objects are not valid as a child; render an element or an array instead",
            ))
        }
        Value::Element(element) => match &element.ty {
            Value::String(tag) => {
                let children = match element.props.get("children") {
                    Some(children) => render_value(machine, children)?,
                    None => Vec::new(),
                };
                out.push(Node::Element {
                    tag: tag.to_string(),
                    attributes: attributes(machine, &element.props)?,
                    children,
                });
            }
            component => {
                let props = Value::object(element.props.clone());
                let rendered = machine.call(component, &[props])?;
                render_into(machine, &rendered, out)?;
            }
        },
    }
    Ok(())
}

fn attributes(machine: &mut Machine, props: &Object) -> Result<BTreeMap<String, String>, RuntimeError> {
    let mut out = BTreeMap::new();
    for (key, value) in props.iter() {
        if matches!(key, "children" | "key" | "ref" | "dangerouslySetInnerHTML") {
            continue;
        }
        let name = match key {
            "className" => "class",
            "htmlFor" => "for",
            other => other,
        };
        let keeps_booleans = name.starts_with("aria-") || name.starts_with("data-");
        let rendered = match value {
            Value::Undefined | Value::Null | Value::Function(_) => continue,
            Value::Bool(b) if keeps_booleans => b.to_string(),
            Value::Bool(true) => String::new(),
            Value::Bool(false) => continue,
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Object(style) if key == "style" => {
                let style = style.borrow().clone();
                let css = style_to_css(machine, &style)?;
                if css.is_empty() {
                    continue;
                }
                css
            }
            other => machine.stringify(other)?,
        };
        out.insert(name.to_string(), rendered);
    }
    Ok(out)
}

const UNITLESS_PROPERTIES: &[&str] = &[
    "animationIterationCount",
    "aspectRatio",
    "columnCount",
    "columns",
    "fillOpacity",
    "flex",
    "flexGrow",
    "flexShrink",
    "floodOpacity",
    "fontWeight",
    "gridColumn",
    "gridRow",
    "lineClamp",
    "lineHeight",
    "opacity",
    "order",
    "orphans",
    "stopOpacity",
    "strokeDashoffset",
    "strokeMiterlimit",
    "strokeOpacity",
    "strokeWidth",
    "tabSize",
    "widows",
    "zIndex",
    "zoom",
];

fn kebab_case(property: &str) -> String {
    if property.starts_with("--") {
        return property.to_string();
    }
    let mut out = String::with_capacity(property.len() + 4);
    for c in property.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    if out.starts_with("ms-") {
        out.insert(0, '-');
    }
    out
}

fn style_to_css(machine: &mut Machine, style: &Object) -> Result<String, RuntimeError> {
    let mut decls = Vec::new();
    for (property, value) in style.iter() {
        let value = match value {
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Function(_) => continue,
            Value::Number(n) if *n != 0.0 && !UNITLESS_PROPERTIES.contains(&property) && !property.starts_with("--") => {
                format!("{}px", format_number(*n))
            }
            other => machine.stringify(other)?,
        };
        decls.push(format!("{}:{}", kebab_case(property), value));
    }
    Ok(decls.join(";"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::stack::with_sandbox_stack;
    use crate::sandbox::Limits;
    use pretty_assertions::assert_eq;

    fn props(entries: &[(&str, Value)]) -> Value {
        Value::object(entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    fn h(m: &mut Machine, args: &[Value]) -> Value {
        create_element(m, args).unwrap()
    }

    #[test]
    fn test_create_element_children_shapes() {
        let mut m = Machine::new(Limits::default());
        let none = h(&mut m, &[Value::string("div"), Value::Null]);
        let one = h(&mut m, &[Value::string("div"), Value::Null, Value::string("a")]);
        let many = h(
            &mut m,
            &[Value::string("div"), Value::Null, Value::string("a"), Value::string("b")],
        );

        let children = |v: &Value| match v {
            Value::Element(el) => el.props.get("children").cloned(),
            _ => None,
        };
        assert!(children(&none).is_none());
        assert!(matches!(children(&one), Some(Value::String(_))));
        assert!(matches!(children(&many), Some(Value::Array(_))));
    }

    #[test]
    fn test_invalid_element_type() {
        let mut m = Machine::new(Limits::default());
        assert!(create_element(&mut m, &[Value::Undefined]).is_err());
    }

    #[test]
    fn test_renders_attributes_and_merges_text() {
        let mut m = Machine::new(Limits::default());
        let style = props(&[
            ("marginTop", Value::Number(4.0)),
            ("opacity", Value::Number(0.5)),
            ("backgroundColor", Value::string("red")),
        ]);
        let el = h(
            &mut m,
            &[
                Value::string("label"),
                props(&[
                    ("className", Value::string("x")),
                    ("htmlFor", Value::string("name")),
                    ("style", style),
                    ("onClick", Value::native("onClick", |_, _| Ok(Value::Undefined))),
                    ("hidden", Value::Bool(false)),
                    ("disabled", Value::Bool(true)),
                    ("aria-hidden", Value::Bool(true)),
                    ("key", Value::string("k")),
                ]),
                Value::string("Hello, "),
                Value::string("<you>"),
                Value::Number(3.0),
            ],
        );
        let nodes = render_value(&mut m, &el).unwrap();
        assert_eq!(
            Node::from_children(nodes).to_html(),
            "<label aria-hidden=\"true\" class=\"x\" disabled=\"\" for=\"name\" \
             style=\"margin-top:4px;opacity:0.5;background-color:red\">Hello, &lt;you&gt;3</label>"
        );
    }

    #[test]
    fn test_function_components_and_fragments() {
        let mut m = Machine::new(Limits::default());
        let greet = Value::native("Greet", |m, args| {
            let name = match args.first() {
                Some(Value::Object(p)) => p.borrow().get("name").cloned().unwrap_or(Value::Undefined),
                _ => Value::Undefined,
            };
            create_element(m, &[Value::string("b"), Value::Null, name])
        });
        let frag = Value::native("Fragment", fragment);
        let inner = h(&mut m, &[greet, props(&[("name", Value::string("Ada"))])]);
        let tree = h(&mut m, &[frag, Value::Null, Value::string("Hi "), inner]);

        let root = Node::from_children(render_value(&mut m, &tree).unwrap());
        assert_eq!(root.to_html(), "Hi <b>Ada</b>");
        assert_eq!(root.text_content(), "Hi Ada");
        assert!(root.find("b").is_some());
    }

    #[test]
    fn test_void_elements_and_objects_as_children() {
        let mut m = Machine::new(Limits::default());
        let br = h(&mut m, &[Value::string("br"), Value::Null]);
        assert_eq!(
            Node::from_children(render_value(&mut m, &br).unwrap()).to_html(),
            "<br/>"
        );
        assert!(render_value(&mut m, &props(&[])).is_err());
    }

    #[test]
    fn test_injected_nodes_are_spliced() {
        let mut m = Machine::new(Limits::default());
        let injected = Node::Fragment {
            children: vec![Node::text("a"), Node::element("i", vec![])],
        };
        let el = h(
            &mut m,
            &[Value::string("main"), Value::Null, Value::Node(Rc::new(injected))],
        );
        let root = Node::from_children(render_value(&mut m, &el).unwrap());
        assert_eq!(root.to_html(), "<main>a<i></i></main>");
    }

    #[test]
    fn test_deeply_nested_children_hit_nesting_limit() {
        let message = with_sandbox_stack(|| {
            let mut m = Machine::new(Limits::default());
            let mut nested = Value::string("leaf");
            for _ in 0..100_000 {
                nested = Value::array(vec![nested]);
            }
            let el = h(&mut m, &[Value::string("p"), Value::Null, nested]);
            let err = render_value(&mut m, &el).unwrap_err();
            assert!(!err.is_catchable());
            err.to_string()
        })
        .unwrap();
        assert_eq!(message, "nesting depth limit of 4096 exceeded");
    }

    #[test]
    fn test_self_referencing_children_do_not_recurse_forever() {
        let hit_limit = with_sandbox_stack(|| {
            let mut m = Machine::new(Limits::default());
            let children = Value::array(vec![Value::string("x")]);
            if let Value::Array(items) = &children {
                items.borrow_mut().push(children.clone());
            }
            let el = h(&mut m, &[Value::string("p"), Value::Null, children]);
            matches!(
                render_value(&mut m, &el),
                Err(RuntimeError::NestingTooDeep(4096))
            )
        })
        .unwrap();
        assert!(hit_limit);
    }

    #[test]
    fn test_rendered_text_is_charged_to_step_budget() {
        let mut m = Machine::new(Limits {
            max_steps: 1_000,
            ..Limits::default()
        });
        let chunk = Value::string("x".repeat(1 << 16));
        let el = h(
            &mut m,
            &[Value::string("p"), Value::Null, Value::array(vec![chunk; 10])],
        );
        assert!(matches!(
            render_value(&mut m, &el),
            Err(RuntimeError::StepBudgetExceeded(1_000))
        ));
    }

    #[test]
    fn test_node_serde_shape() {
        let node = Node::element("p", vec![Node::text("x")]);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "element",
                "tag": "p",
                "attributes": {},
                "children": [{"type": "text", "value": "x"}]
            })
        );
    }
}
