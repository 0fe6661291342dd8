//! TSX → plain JavaScript.
//!
//! Runs the oxc pipeline (parse, semantic, TypeScript + classic JSX
//! transform, codegen) over `preamble + body`. Output is ESNext with JSX
//! turned into calls to the configured factory; nothing partial is returned
//! on failure.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_transformer::{JsxOptions, JsxRuntime, TransformOptions, Transformer};

use crate::capability::Preamble;
use crate::error::StageError;
use crate::normalize::{describe_errors, source_type};
use crate::options::JsxPragma;
use crate::scope;

fn transform_options(jsx: &JsxPragma) -> TransformOptions {
    TransformOptions {
        jsx: JsxOptions {
            runtime: JsxRuntime::Classic,
            pragma: Some(jsx.factory.clone()),
            pragma_frag: Some(jsx.fragment.clone()),
            jsx_plugin: true,
            display_name_plugin: false,
            development: false,
            ..JsxOptions::default()
        },
        ..TransformOptions::default()
    }
}

pub fn transpile(preamble: &Preamble, body: &str, jsx: &JsxPragma) -> Result<String, StageError> {
    let allocator = Allocator::default();

    // Top-level declarations shadow same-named capabilities.
    let declared = {
        let ret = Parser::new(&allocator, body, source_type()).parse();
        if ret.panicked || !ret.errors.is_empty() {
            return Err(StageError::transpile(describe_errors(&ret.errors)));
        }
        scope::top_level_declarations(&ret.program.body)
    };
    let preamble = preamble.without(&declared);

    let source = if preamble.source.is_empty() {
        body.to_string()
    } else {
        format!("{}\n{}", preamble.source, body)
    };

    let ret = Parser::new(&allocator, &source, source_type()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(StageError::transpile(describe_errors(&ret.errors)));
    }
    let mut program = ret.program;

    let semantic = SemanticBuilder::new()
        .with_check_syntax_error(true)
        .build(&program);
    if !semantic.errors.is_empty() {
        return Err(StageError::transpile(describe_errors(&semantic.errors)));
    }
    let scoping = semantic.semantic.into_scoping();

    let options = transform_options(jsx);
    let transformed = Transformer::new(&allocator, Path::new("component.tsx"), &options)
        .build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return Err(StageError::transpile(describe_errors(&transformed.errors)));
    }

    let code = Codegen::new().build(&program).code;
    tracing::debug!(bytes = code.len(), "transpiled component");
    Ok(code)
}
