//! Capability namespace and preamble generation.
//!
//! The namespace is the complete, closed set of names generated code may
//! reference. It is plain `Send + Sync` data; sandbox values are created from
//! it afresh every time a component is materialized.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::CapabilityError;
use crate::render;
use crate::sandbox::{Machine, NativeFn, Object, RuntimeError, Value};

/// Parameter name the factory receives the namespace object under.
pub const SCOPE_PARAM: &str = "__scope";
/// Name of the synthesised factory function.
pub const FACTORY_NAME: &str = "__factory";

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
}

const RESERVED_WORDS: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let", "new",
    "null", "package", "private", "protected", "public", "return", "static", "super", "switch",
    "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name) && !RESERVED_WORDS.contains(&name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CAPABILITIES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub enum Capability {
    /// Host-rendered component, used as an element type.
    Component(NativeFn),
    /// Plain callable (hooks, utilities).
    Function(NativeFn),
    /// The JSX element factory (`h`).
    ElementFactory,
    /// The JSX fragment marker.
    Fragment,
    Constant(serde_json::Value),
    /// Object of further capabilities (`React`, `Math`, …).
    Module(BTreeMap<String, Capability>),
}

impl Capability {
    pub fn component(
        func: impl Fn(&mut Machine, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Capability::Component(Arc::new(func))
    }

    pub fn function(
        func: impl Fn(&mut Machine, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Capability::Function(Arc::new(func))
    }

    pub fn module<I, K>(members: I) -> Self
    where
        I: IntoIterator<Item = (K, Capability)>,
        K: Into<String>,
    {
        Capability::Module(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Capability::Component(_) => "component",
            Capability::Function(_) => "function",
            Capability::ElementFactory => "element-factory",
            Capability::Fragment => "fragment",
            Capability::Constant(_) => "constant",
            Capability::Module(_) => "module",
        }
    }

    /// Creates the sandbox value bound under `name`.
    pub fn to_value(&self, name: &str) -> Value {
        match self {
            Capability::Component(func) | Capability::Function(func) => {
                Value::from_native(name, Arc::clone(func))
            }
            Capability::ElementFactory => Value::native(name, render::create_element),
            Capability::Fragment => Value::native("Fragment", render::fragment),
            Capability::Constant(json) => Value::from_json(json),
            Capability::Module(members) => Value::object(
                members
                    .iter()
                    .map(|(key, member)| (key.clone(), member.to_value(key)))
                    .collect::<Object>(),
            ),
        }
    }

    fn fingerprint_into(&self, hasher: &mut Sha256) {
        hasher.update(self.kind().as_bytes());
        match self {
            Capability::Constant(json) => hasher.update(json.to_string().as_bytes()),
            Capability::Module(members) => {
                for (key, member) in members {
                    hasher.update(key.as_bytes());
                    member.fingerprint_into(hasher);
                }
            }
            _ => {}
        }
        hasher.update([0u8]);
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Constant(json) => write!(f, "Constant({})", json),
            Capability::Module(members) => f.debug_map().entries(members.iter()).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAMESPACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered identifier → capability map handed to every compilation.
#[derive(Clone, Default, Debug)]
pub struct CapabilityNamespace {
    entries: BTreeMap<String, Capability>,
}

impl CapabilityNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, capability: Capability) -> Result<(), CapabilityError> {
        let name = name.into();
        if name == SCOPE_PARAM || name == FACTORY_NAME {
            return Err(CapabilityError::Reserved(name));
        }
        if !is_valid_identifier(&name) {
            return Err(CapabilityError::InvalidName(name));
        }
        self.entries.insert(name, capability);
        Ok(())
    }

    pub fn with(mut self, name: impl Into<String>, capability: Capability) -> Result<Self, CapabilityError> {
        self.insert(name, capability)?;
        Ok(self)
    }

    pub fn remove(&mut self, name: &str) -> Option<Capability> {
        self.entries.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds every entry of `other`, replacing same-named entries.
    pub fn merge(&mut self, other: CapabilityNamespace) {
        self.entries.extend(other.entries);
    }

    /// Stable digest of the namespace shape (names, kinds, constants).
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, capability) in &self.entries {
            hasher.update(name.as_bytes());
            capability.fingerprint_into(&mut hasher);
        }
        format!("{:x}", hasher.finalize())
    }

    /// The object passed to the factory as `__scope`.
    pub fn scope_object(&self) -> Value {
        Value::object(
            self.entries
                .iter()
                .map(|(name, capability)| (name.clone(), capability.to_value(name)))
                .collect(),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PREAMBLE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    pub keys: Vec<String>,
    pub source: String,
}

impl Preamble {
    fn from_keys(keys: Vec<String>) -> Self {
        let source = if keys.is_empty() {
            String::new()
        } else {
            format!("const {{ {} }} = {};", keys.join(", "), SCOPE_PARAM)
        };
        Preamble { keys, source }
    }

    /// Drops the keys a module declares at its top level; the module's own
    /// binding shadows the capability.
    pub fn without(&self, declared: &BTreeSet<String>) -> Preamble {
        Preamble::from_keys(
            self.keys
                .iter()
                .filter(|key| !declared.contains(*key))
                .cloned()
                .collect(),
        )
    }
}

/// `const { A, B, … } = __scope;` over the namespace keys, in namespace order.
pub fn build_preamble(namespace: &CapabilityNamespace) -> Preamble {
    Preamble::from_keys(namespace.keys().map(str::to_string).collect())
}
