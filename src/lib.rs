//! # Sandbox Native
//!
//! Compiles generated TSX pages into rendered, layout-composed component
//! trees without ever handing untrusted code an ambient scope.
//!
//! ## Pipeline
//!
//! 1. **Normalize** (`normalize`): strip imports and export modifiers, find
//!    the exported component, make it accept `children`.
//! 2. **Transpile** (`transpile`): prepend the capability preamble and turn
//!    TSX into plain JavaScript calling the configured JSX factory.
//! 3. **Bind** (`binder::materialize`): wrap the code in a factory, lower it
//!    into the sandbox IR and evaluate it with the capability namespace.
//!    Every identifier must resolve lexically; there are no globals.
//! 4. **Compose** (`driver`): resolve `app/**/page.tsx` plus its layouts,
//!    compile root layout to page, then render page-first with each layout
//!    wrapping the previous result as `children`.
//!
//! ## Invariants
//!
//! - The capability namespace is a closed allow-list. `eval`, `require`,
//!   `window` and anything else not declared or injected fails at bind time.
//! - Code only becomes callable inside `materialize`, and only after the
//!   synthesized factory re-parses as a single function declaration.
//! - Rendering is metered (`maxSteps`, `maxCallDepth`); budget errors cannot
//!   be caught by sandboxed code.
//! - A superseded request never commits state (last request wins).

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod binder;
pub mod cache;
pub mod capability;
pub mod component;
pub mod driver;
pub mod error;
pub mod kit;
pub mod layout;
pub mod normalize;
pub mod options;
pub mod render;
pub mod sandbox;
pub mod scope;
pub mod source;
pub mod transpile;

#[cfg(test)]
mod safety_tests;

pub use binder::materialize;
pub use cache::{ExecutableModule, TranspileCache};
pub use capability::{build_preamble, Capability, CapabilityNamespace, Preamble};
pub use component::{compile, CompiledComponent, Compiler};
pub use driver::{
    compose_route, CompositionDriver, RequestSnapshot, RequestState, RequestTicket,
    ResolutionResult,
};
pub use error::{
    CapabilityError, CompilationError, ComponentConstructionError, ErrorKind, StageError,
};
pub use kit::standard_namespace;
pub use layout::{resolve, ResolvedRoute};
pub use normalize::{normalize, NormalizedSource};
pub use options::{EngineOptions, JsxPragma};
pub use render::{ComposedTree, Node};
pub use source::{SourceFile, SourceTree};
pub use transpile::transpile;

/// Node host entry point: resolves `segments_json` (a JSON string array)
/// against `tree_json` (a JSON array of `{ path, content }`) with the
/// standard kit and returns the `ResolutionResult` as JSON.
#[cfg(feature = "napi")]
#[napi]
pub fn compose_route_native(
    tree_json: String,
    segments_json: String,
    options_json: Option<String>,
) -> napi::Result<String> {
    let tree: SourceTree = serde_json::from_str(&tree_json)
        .map_err(|e| napi::Error::from_reason(format!("invalid source tree: {}", e)))?;
    let segments: Vec<String> = serde_json::from_str(&segments_json)
        .map_err(|e| napi::Error::from_reason(format!("invalid route: {}", e)))?;
    let options = match options_json {
        Some(json) => EngineOptions::from_json(&json)
            .map_err(|e| napi::Error::from_reason(format!("invalid options: {}", e)))?,
        None => EngineOptions::default(),
    };

    let result = compose_route(&tree, &segments, &standard_namespace(), &options);
    let state = RequestState::from(result);
    serde_json::to_string(&state).map_err(|e| napi::Error::from_reason(e.to_string()))
}
