//! Composition driver.
//!
//! Owns the per-request state machine `idle → loading → ready | error` and
//! enforces last-request-wins: every request carries a generation, and a
//! result is committed only while its generation is still the current one.
//! The check and the commit happen inside one `watch` critical section.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::component::{CompiledComponent, Compiler};
use crate::capability::CapabilityNamespace;
use crate::error::CompilationError;
use crate::layout::resolve;
use crate::options::EngineOptions;
use crate::render::{ComposedTree, Node};
use crate::source::SourceTree;

pub type ResolutionResult = Result<ComposedTree, CompilationError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum RequestState {
    #[default]
    Idle,
    Loading,
    Ready(ComposedTree),
    Error(CompilationError),
}

impl RequestState {
    pub fn is_settled(&self) -> bool {
        matches!(self, RequestState::Ready(_) | RequestState::Error(_))
    }
}

impl From<ResolutionResult> for RequestState {
    fn from(result: ResolutionResult) -> Self {
        match result {
            Ok(tree) => RequestState::Ready(tree),
            Err(err) => RequestState::Error(err),
        }
    }
}

/// What observers see: the state of the most recent request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    pub generation: u64,
    pub requested_path: Vec<String>,
    pub state: RequestState,
}

/// Identity of one issued request.
#[derive(Debug, Clone)]
pub struct RequestTicket {
    generation: u64,
    tree: Arc<SourceTree>,
    requested_path: Vec<String>,
}

impl RequestTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn requested_path(&self) -> &[String] {
        &self.requested_path
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPOSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolves, compiles and nests one route with `compiler`.
pub fn compose_with(
    compiler: &Compiler,
    tree: &SourceTree,
    requested_path: &[String],
    namespace: &CapabilityNamespace,
) -> ResolutionResult {
    let route = resolve(tree, requested_path)?;
    tracing::debug!(page = %route.page, layouts = route.layout_chain.len(), "resolved route");

    let mut layouts: Vec<CompiledComponent> = Vec::with_capacity(route.layout_chain.len());
    for path in route.layout_chain.iter() {
        layouts.push(compile_path(compiler, tree, path, namespace)?);
    }
    let page = compile_path(compiler, tree, &route.page, namespace)?;

    let mut root: Node = page.render(None)?;
    for layout in layouts.iter().rev() {
        root = layout.render(Some(root))?;
    }

    Ok(ComposedTree {
        page: route.page,
        layouts: route.layout_chain,
        root,
    })
}

fn compile_path(
    compiler: &Compiler,
    tree: &SourceTree,
    path: &str,
    namespace: &CapabilityNamespace,
) -> Result<CompiledComponent, CompilationError> {
    let file = tree.get(path).ok_or_else(|| CompilationError::PageNotFound {
        requested_path: path.split('/').map(str::to_string).collect(),
    })?;
    Ok(compiler.compile(file, namespace)?)
}

/// One-shot synchronous resolution of `requested_path`.
pub fn compose_route(
    tree: &SourceTree,
    requested_path: &[String],
    namespace: &CapabilityNamespace,
    options: &EngineOptions,
) -> ResolutionResult {
    compose_with(&Compiler::new(options.clone()), tree, requested_path, namespace)
}

// ═══════════════════════════════════════════════════════════════════════════════
// DRIVER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct CompositionDriver {
    namespace: Arc<CapabilityNamespace>,
    compiler: Compiler,
    state: watch::Sender<RequestSnapshot>,
}

impl CompositionDriver {
    pub fn new(namespace: Arc<CapabilityNamespace>, options: EngineOptions) -> Self {
        let (state, _) = watch::channel(RequestSnapshot::default());
        Self {
            namespace,
            compiler: Compiler::new(options),
            state,
        }
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    /// Starts a request: supersedes whatever was in flight and enters
    /// `loading` before returning.
    pub fn begin(&self, tree: Arc<SourceTree>, requested_path: Vec<String>) -> RequestTicket {
        let mut generation = 0;
        self.state.send_modify(|snapshot| {
            snapshot.generation += 1;
            generation = snapshot.generation;
            snapshot.requested_path = requested_path.clone();
            snapshot.state = RequestState::Loading;
        });
        tracing::debug!(generation, path = ?requested_path, "request loading");
        RequestTicket {
            generation,
            tree,
            requested_path,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.borrow().generation == generation
    }

    /// Does the work for `ticket` and commits the outcome. Returns `None`
    /// when a newer request superseded this one, in which case nothing is
    /// committed.
    pub fn run(&self, ticket: RequestTicket) -> Option<ResolutionResult> {
        if !self.is_current(ticket.generation) {
            tracing::debug!(generation = ticket.generation, "request superseded before start");
            return None;
        }

        let result = compose_with(
            &self.compiler,
            &ticket.tree,
            &ticket.requested_path,
            &self.namespace,
        );

        let committed = self.state.send_if_modified(|snapshot| {
            if snapshot.generation != ticket.generation {
                return false;
            }
            snapshot.state = result.clone().into();
            true
        });

        if !committed {
            tracing::warn!(generation = ticket.generation, "discarding stale result");
            return None;
        }
        if let Err(err) = &result {
            tracing::warn!(generation = ticket.generation, path = ?err.path(), error = %err, "request failed");
        }
        Some(result)
    }

    /// `begin`, one cooperative yield at the request boundary, then `run`.
    pub async fn request(
        &self,
        tree: Arc<SourceTree>,
        requested_path: Vec<String>,
    ) -> Option<ResolutionResult> {
        let ticket = self.begin(tree, requested_path);
        tokio::task::yield_now().await;
        self.run(ticket)
    }

    pub fn state(&self) -> RequestState {
        self.state.borrow().state.clone()
    }

    pub fn snapshot(&self) -> RequestSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestSnapshot> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::kit::standard_namespace;
    use pretty_assertions::assert_eq;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    fn blog_tree() -> SourceTree {
        SourceTree::new()
            .with_file(
                "app/layout.tsx",
                "export default function RootLayout({ children }) { return <html><body>{children}</body></html>; }",
            )
            .with_file(
                "app/blog/layout.tsx",
                "export default function BlogLayout() { return <section>{children}</section>; }",
            )
            .with_file(
                "app/blog/page.tsx",
                "export default function BlogPage() { return <h1>Blog</h1>; }",
            )
            .with_file("app/page.tsx", "export const Home = () => <h1>Home</h1>;")
    }

    fn driver() -> CompositionDriver {
        CompositionDriver::new(Arc::new(standard_namespace()), EngineOptions::default())
    }

    #[test]
    fn test_compose_nests_layouts_root_to_leaf() {
        let composed = compose_route(
            &blog_tree(),
            &path(&["blog"]),
            &standard_namespace(),
            &EngineOptions::default(),
        )
        .unwrap();
        assert_eq!(composed.page, "app/blog/page.tsx");
        assert_eq!(composed.layouts, vec!["app/layout.tsx", "app/blog/layout.tsx"]);
        assert_eq!(
            composed.to_html(),
            "<html><body><section><h1>Blog</h1></section></body></html>"
        );
    }

    #[test]
    fn test_broken_layout_short_circuits() {
        let tree = blog_tree().with_file("app/blog/layout.tsx", "export default function Broken( {");
        let err = compose_route(&tree, &path(&["blog"]), &standard_namespace(), &EngineOptions::default())
            .unwrap_err();
        assert_eq!(err.path(), Some("app/blog/layout.tsx"));
        assert_eq!(err.kind(), ErrorKind::Transpile);
    }

    #[test]
    fn test_broken_layout_stops_before_later_files_are_compiled() {
        let compiler = Compiler::new(EngineOptions::default());
        let namespace = standard_namespace();
        let tree = blog_tree().with_file("app/blog/layout.tsx", "export default function Broken( {");

        let err = compose_with(&compiler, &tree, &path(&["blog"]), &namespace).unwrap_err();
        assert_eq!(err.path(), Some("app/blog/layout.tsx"));

        // Root layout prepared and cached, blog layout failed, page never reached.
        let stats = compiler.cache().unwrap().stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (0, 2, 1));

        let page = tree.get("app/blog/page.tsx").unwrap();
        compiler.prepare(page, &namespace).unwrap();
        let stats = compiler.cache().unwrap().stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (0, 3, 2));
    }

    #[test]
    fn test_begin_enters_loading_synchronously() {
        let driver = driver();
        assert_eq!(driver.state(), RequestState::Idle);
        let ticket = driver.begin(Arc::new(blog_tree()), path(&[]));
        assert_eq!(driver.state(), RequestState::Loading);
        assert!(driver.run(ticket).is_some());
        assert!(matches!(driver.state(), RequestState::Ready(_)));
    }

    #[test]
    fn test_superseded_ticket_is_discarded() {
        let driver = driver();
        let tree = Arc::new(blog_tree());
        let a = driver.begin(tree.clone(), path(&["missing"]));
        let b = driver.begin(tree, path(&["blog"]));

        assert!(driver.run(b).is_some());
        assert!(driver.run(a).is_none());

        let snapshot = driver.snapshot();
        assert_eq!(snapshot.generation, 2);
        assert_eq!(snapshot.requested_path, path(&["blog"]));
        assert!(matches!(snapshot.state, RequestState::Ready(_)));
    }

    #[tokio::test]
    async fn test_concurrent_requests_last_wins() {
        let driver = driver();
        let tree = Arc::new(blog_tree());
        let (a, b) = tokio::join!(
            driver.request(tree.clone(), path(&["blog"])),
            driver.request(tree.clone(), path(&["missing"])),
        );
        assert!(a.is_none());
        assert!(matches!(b, Some(Err(CompilationError::PageNotFound { .. }))));
        assert!(matches!(driver.state(), RequestState::Error(_)));
    }

    #[tokio::test]
    async fn test_subscribers_see_settled_state() {
        let driver = driver();
        let mut rx = driver.subscribe();
        driver.request(Arc::new(blog_tree()), path(&[])).await;
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.generation, 1);
        assert!(snapshot.state.is_settled());
    }
}
