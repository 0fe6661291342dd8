//! Component factory.
//!
//! `normalize → preamble → transpile → materialize`, with every failure
//! wrapped as a [`ComponentConstructionError`] naming the file. The normalize
//! and transpile half is pure text work and is cached by content; binding
//! always runs again so each compilation yields a fresh component.
//!
//! Compiling and rendering run on a dedicated sandbox thread (see
//! [`with_sandbox_stack`]) so the interpreter's depth limits hold no matter
//! how small the caller's stack is.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use rayon::prelude::*;

use crate::binder::{limits, materialize};
use crate::cache::{ExecutableModule, TranspileCache};
use crate::capability::{build_preamble, CapabilityNamespace};
use crate::error::{ComponentConstructionError, StageError};
use crate::normalize::normalize;
use crate::options::EngineOptions;
use crate::render::{create_element, render_value, Node};
use crate::sandbox::stack::{sandbox_pool, with_sandbox_stack};
use crate::sandbox::{Machine, Object, Value};
use crate::source::SourceFile;
use crate::transpile::transpile;

/// A compiled component, invocable with optional children.
///
/// Keeps the checked executable module instead of sandbox values, so it can
/// move between threads. Every render binds a fresh instance.
#[derive(Clone)]
pub struct CompiledComponent {
    path: String,
    name: String,
    module: ExecutableModule,
    namespace: Arc<CapabilityNamespace>,
    options: EngineOptions,
}

impl fmt::Debug for CompiledComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledComponent")
            .field("path", &self.path)
            .field("name", &self.name)
            .finish()
    }
}

impl CompiledComponent {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders the component with `children` as its `children` prop. Each
    /// call gets a fresh step budget.
    pub fn render(&self, children: Option<Node>) -> Result<Node, ComponentConstructionError> {
        with_sandbox_stack(|| self.render_in_sandbox(children))
            .unwrap_or_else(|e| Err(StageError::render(format!("cannot start sandbox thread: {}", e))))
            .map_err(|cause| ComponentConstructionError::new(self.path.clone(), cause))
    }

    fn render_in_sandbox(&self, children: Option<Node>) -> Result<Node, StageError> {
        let component = materialize(&self.namespace, &self.module.code, &self.name, &self.options)?;
        let mut machine = Machine::new(limits(&self.options));
        let mut props = Object::new();
        if let Some(children) = children {
            props.set("children", Value::Node(Rc::new(children)));
        }

        let rendered = create_element(&mut machine, &[component, Value::object(props)])
            .and_then(|element| render_value(&mut machine, &element))
            .map_err(|e| StageError::render(e.to_string()))?;

        tracing::debug!(path = %self.path, steps = machine.steps(), "rendered component");
        Ok(Node::from_children(rendered))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Compiler {
    options: EngineOptions,
    cache: Option<Arc<TranspileCache>>,
}

impl Compiler {
    pub fn new(options: EngineOptions) -> Self {
        let cache = options.cache.then(|| Arc::new(TranspileCache::new()));
        Self { options, cache }
    }

    /// Shares an existing cache between compilers.
    pub fn with_cache(options: EngineOptions, cache: Arc<TranspileCache>) -> Self {
        Self {
            options,
            cache: Some(cache),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn cache(&self) -> Option<&Arc<TranspileCache>> {
        self.cache.as_ref()
    }

    fn cache_key(&self, file: &SourceFile, namespace: &CapabilityNamespace) -> String {
        let pragma = format!("{}/{}", self.options.jsx.factory, self.options.jsx.fragment);
        TranspileCache::key(&file.path, &file.content, &namespace.fingerprint(), &pragma)
    }

    /// Normalizes and transpiles `file`, consulting the cache.
    pub fn prepare(
        &self,
        file: &SourceFile,
        namespace: &CapabilityNamespace,
    ) -> Result<ExecutableModule, StageError> {
        let key = self.cache.as_ref().map(|_| self.cache_key(file, namespace));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(module) = cache.get(key) {
                tracing::debug!(path = %file.path, "transpile cache hit");
                return Ok(module);
            }
        }

        let normalized = normalize(&file.content)?;
        let preamble = build_preamble(namespace);
        let code = transpile(&preamble, &normalized.body, &self.options.jsx)?;
        let module = ExecutableModule {
            component_name: normalized.component_name,
            code,
        };

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.set(key, module.clone());
        }
        Ok(module)
    }

    pub fn compile(
        &self,
        file: &SourceFile,
        namespace: &CapabilityNamespace,
    ) -> Result<CompiledComponent, ComponentConstructionError> {
        let wrap = |cause: StageError| {
            tracing::warn!(path = %file.path, error = %cause, "component construction failed");
            ComponentConstructionError::new(file.path.clone(), cause)
        };

        let module = with_sandbox_stack(|| self.check(file, namespace))
            .unwrap_or_else(|e| Err(StageError::binding(format!("cannot start sandbox thread: {}", e))))
            .map_err(wrap)?;

        Ok(CompiledComponent {
            path: file.path.clone(),
            name: module.component_name.clone(),
            module,
            namespace: Arc::new(namespace.clone()),
            options: self.options.clone(),
        })
    }

    /// Prepares `file` and binds it once, so a module that cannot become a
    /// component fails here rather than at render time.
    fn check(
        &self,
        file: &SourceFile,
        namespace: &CapabilityNamespace,
    ) -> Result<ExecutableModule, StageError> {
        let module = self.prepare(file, namespace)?;
        materialize(namespace, &module.code, &module.component_name, &self.options)?;
        Ok(module)
    }

    /// Fills the cache for `files` in parallel. Returns how many files
    /// prepared successfully; failures are left for `compile` to report.
    pub fn prewarm(&self, files: &[SourceFile], namespace: &CapabilityNamespace) -> usize {
        if self.cache.is_none() {
            return 0;
        }
        let pool = match sandbox_pool() {
            Ok(pool) => pool,
            Err(err) => {
                tracing::warn!(error = %err, "cannot start prewarm workers");
                return 0;
            }
        };
        pool.install(|| {
            files
                .par_iter()
                .filter(|file| self.prepare(file, namespace).is_ok())
                .count()
        })
    }
}

/// One-shot compilation without a cache.
pub fn compile(
    file: &SourceFile,
    namespace: &CapabilityNamespace,
    options: &EngineOptions,
) -> Result<CompiledComponent, ComponentConstructionError> {
    let options = EngineOptions {
        cache: false,
        ..options.clone()
    };
    Compiler::new(options).compile(file, namespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::kit::standard_namespace;
    use pretty_assertions::assert_eq;

    fn file(content: &str) -> SourceFile {
        SourceFile::new("app/page.tsx", content)
    }

    #[test]
    fn test_compile_and_render_page() {
        let component = compile(
            &file(
                "import { Badge } from '@/components/ui/badge';\n\
export default function Home() {\n\
  const items = ['a', 'b'];\n\
  return <ul>{items.map((item) => <li key={item}>{item.toUpperCase()}</li>)}</ul>;\n\
}",
            ),
            &standard_namespace(),
            &EngineOptions::default(),
        )
        .unwrap();
        assert_eq!(component.name(), "Home");
        assert_eq!(
            component.render(None).unwrap().to_html(),
            "<ul><li>A</li><li>B</li></ul>"
        );
    }

    #[test]
    fn test_children_are_injected() {
        let layout = compile(
            &SourceFile::new(
                "app/layout.tsx",
                "export default function RootLayout() { return <body>{children}</body>; }",
            ),
            &standard_namespace(),
            &EngineOptions::default(),
        )
        .unwrap();
        let out = layout.render(Some(Node::text("page"))).unwrap();
        assert_eq!(out.to_html(), "<body>page</body>");
    }

    #[test]
    fn test_errors_carry_path() {
        let err = compile(
            &file("export default function Home() { return <div>{eval('1')}</div>; }"),
            &standard_namespace(),
            &EngineOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.path, "app/page.tsx");
        assert_eq!(err.cause.kind(), ErrorKind::Binding);
    }

    #[test]
    fn test_runtime_failure_is_render_error() {
        let component = compile(
            &file("export default function Home() { const x = null; return <p>{x.y}</p>; }"),
            &standard_namespace(),
            &EngineOptions::default(),
        )
        .unwrap();
        let err = component.render(None).unwrap_err();
        assert_eq!(err.cause.kind(), ErrorKind::Render);
    }

    #[test]
    fn test_cache_hit_matches_miss() {
        let compiler = Compiler::new(EngineOptions::default());
        let namespace = standard_namespace();
        let source = file("export const Page = () => <Card><CardTitle>Hi</CardTitle></Card>;");

        let first = compiler.compile(&source, &namespace).unwrap().render(None).unwrap();
        let second = compiler.compile(&source, &namespace).unwrap().render(None).unwrap();
        assert_eq!(first, second);

        let stats = compiler.cache().unwrap().stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn test_compiled_component_renders_on_another_thread() {
        let component = compile(
            &file("export default function Home() { return <p>{[1, 2].join('-')}</p>; }"),
            &standard_namespace(),
            &EngineOptions::default(),
        )
        .unwrap();
        let html = std::thread::spawn(move || component.render(None).unwrap().to_html())
            .join()
            .unwrap();
        assert_eq!(html, "<p>1-2</p>");
    }

    #[test]
    fn test_prewarm_fills_cache() {
        let compiler = Compiler::new(EngineOptions::default());
        let files = vec![
            SourceFile::new("app/page.tsx", "export const A = () => <p />;"),
            SourceFile::new("app/b/page.tsx", "export const B = () => <p />;"),
            SourceFile::new("app/c/page.tsx", "no export here"),
        ];
        assert_eq!(compiler.prewarm(&files, &standard_namespace()), 2);
        assert_eq!(compiler.cache().unwrap().len(), 2);
    }
}
