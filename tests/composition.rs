use std::sync::Arc;

use pretty_assertions::assert_eq;
use sandbox_native::{
    compile, compose_route, standard_namespace, Capability, CapabilityNamespace, CompilationError,
    CompositionDriver, EngineOptions, ErrorKind, RequestState, SourceFile, SourceTree,
};

fn route(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

const DASHBOARD: &str = r#"// Path: app/layout.tsx
import { ReactNode } from "react";

export default function RootLayout({ children }: { children: ReactNode }) {
  return (
    <html lang="en">
      <body className="min-h-screen">{children}</body>
    </html>
  );
}
// Path: app/dashboard/layout.tsx
export default function DashboardLayout() {
  return (
    <div className="flex">
      <aside>Menu</aside>
      <main>{children}</main>
    </div>
  );
}
// Path: app/dashboard/page.tsx
"use client";
import { useState } from "react";
import { Card, CardHeader, CardTitle, CardContent } from "@/components/ui/card";
import { TrendingUp } from "lucide-react";

type Stat = { label: string; value: number };

const stats: Stat[] = [
  { label: "Revenue", value: 45231.89 },
  { label: "Users", value: 2350 },
];

export default function Dashboard() {
  const [range] = useState<"week" | "month">("month");
  return (
    <>
      <h1 className={cn("text-2xl", range === "month" && "font-bold")}>Overview</h1>
      {stats.map(({ label, value }) => (
        <Card key={label}>
          <CardHeader>
            <CardTitle>{label}</CardTitle>
            <TrendingUp size={16} />
          </CardHeader>
          <CardContent>{value.toLocaleString()}</CardContent>
        </Card>
      ))}
    </>
  );
}
"#;

#[test]
fn test_bundle_composes_into_nested_tree() {
    let tree = SourceTree::from_bundle(DASHBOARD);
    assert_eq!(tree.len(), 3);

    let composed = compose_route(
        &tree,
        &route(&["dashboard"]),
        &standard_namespace(),
        &EngineOptions::default(),
    )
    .unwrap();

    assert_eq!(composed.layouts, vec!["app/layout.tsx", "app/dashboard/layout.tsx"]);
    assert_eq!(composed.page, "app/dashboard/page.tsx");

    let html = composed.root.find("html").unwrap();
    assert_eq!(html.attribute("lang"), Some("en"));
    let main = composed.root.find("main").unwrap();
    let title = main.find("h1").unwrap();
    assert_eq!(title.attribute("class"), Some("text-2xl font-bold"));
    assert_eq!(main.find("svg").unwrap().attribute("data-icon"), Some("trending-up"));

    let text = main.text_content();
    assert!(text.contains("Revenue45,231.89"), "{}", text);
    assert!(text.contains("Users2,350"), "{}", text);
}

#[test]
fn test_single_page_equals_direct_instantiation() {
    let source = "export default function Home() { return <section><p>Hello</p></section>; }";
    let tree = SourceTree::new().with_file("app/page.tsx", source);
    let namespace = standard_namespace();

    let composed = compose_route(&tree, &[], &namespace, &EngineOptions::default()).unwrap();
    let direct = compile(
        &SourceFile::new("app/page.tsx", source),
        &namespace,
        &EngineOptions::default(),
    )
    .unwrap()
    .render(None)
    .unwrap();

    assert_eq!(composed.root, direct);
    assert!(composed.layouts.is_empty());
}

#[test]
fn test_missing_route_reports_requested_path() {
    let tree = SourceTree::new().with_file("app/page.tsx", "export const Home = () => null;");
    let err = compose_route(
        &tree,
        &route(&["missing"]),
        &standard_namespace(),
        &EngineOptions::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        CompilationError::PageNotFound {
            requested_path: route(&["missing"])
        }
    );
    assert_eq!(err.code(), "SBX-ERR-ROUTE-404");
}

#[test]
fn test_source_without_export() {
    let tree = SourceTree::new().with_file("app/page.tsx", "function Home() { return null; }");
    let err = compose_route(&tree, &[], &standard_namespace(), &EngineOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoExportedComponent);
    assert_eq!(err.path(), Some("app/page.tsx"));
}

#[test]
fn test_resolution_is_idempotent() {
    let tree = SourceTree::from_bundle(DASHBOARD);
    let namespace = standard_namespace();
    let options = EngineOptions::default();
    let first = compose_route(&tree, &route(&["dashboard"]), &namespace, &options).unwrap();
    let second = compose_route(&tree, &route(&["dashboard"]), &namespace, &options).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_host_supplied_capabilities() {
    let namespace = CapabilityNamespace::new()
        .with("h", Capability::ElementFactory)
        .unwrap()
        .with("Fragment", Capability::Fragment)
        .unwrap()
        .with("SITE", Capability::Constant(serde_json::json!({ "name": "Acme" })))
        .unwrap();
    let tree = SourceTree::new().with_file(
        "app/page.tsx",
        "export default function Home() { return <h1>{SITE.name}</h1>; }",
    );
    let composed = compose_route(&tree, &[], &namespace, &EngineOptions::default()).unwrap();
    assert_eq!(composed.to_html(), "<h1>Acme</h1>");

    // The kit is not ambient: a namespace without `Button` cannot render one.
    let tree = SourceTree::new().with_file(
        "app/page.tsx",
        "export default function Home() { return <Button>Go</Button>; }",
    );
    let err = compose_route(&tree, &[], &namespace, &EngineOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Binding);
}

#[tokio::test]
async fn test_driver_last_request_wins() {
    let driver = CompositionDriver::new(Arc::new(standard_namespace()), EngineOptions::default());
    let old_tree = Arc::new(SourceTree::new().with_file(
        "app/page.tsx",
        "export default function Home() { return <p>old</p>; }",
    ));
    let new_tree = Arc::new(SourceTree::new().with_file(
        "app/page.tsx",
        "export default function Home() { return <p>new</p>; }",
    ));

    let (a, b) = tokio::join!(
        driver.request(old_tree, Vec::new()),
        driver.request(new_tree, Vec::new()),
    );
    assert!(a.is_none());
    assert_eq!(b.unwrap().unwrap().to_html(), "<p>new</p>");

    match driver.state() {
        RequestState::Ready(tree) => assert_eq!(tree.to_html(), "<p>new</p>"),
        other => panic!("unexpected state {:?}", other),
    }
}

#[test]
fn test_load_dir_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("app/about")).unwrap();
    std::fs::write(
        dir.path().join("app/about/page.tsx"),
        "export const About = () => <p>About us</p>;",
    )
    .unwrap();

    let tree = SourceTree::load_dir(dir.path()).unwrap();
    let composed = compose_route(
        &tree,
        &route(&["about"]),
        &standard_namespace(),
        &EngineOptions::default(),
    )
    .unwrap();
    assert_eq!(composed.to_html(), "<p>About us</p>");
}
