//! Page/layout resolution over the `app/` directory convention.

use serde::{Deserialize, Serialize};

use crate::error::CompilationError;
use crate::source::SourceTree;

pub const APP_DIR: &str = "app";
pub const PAGE_FILE: &str = "page.tsx";
pub const LAYOUT_FILE: &str = "layout.tsx";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRoute {
    pub page: String,
    /// Root first, leaf last.
    pub layout_chain: Vec<String>,
}

fn file_under(segments: &[&str], file: &str) -> String {
    let mut path = String::from(APP_DIR);
    for segment in segments {
        path.push('/');
        path.push_str(segment);
    }
    path.push('/');
    path.push_str(file);
    path
}

/// Maps a route to its page and the layouts wrapping it.
pub fn resolve(tree: &SourceTree, requested_path: &[String]) -> Result<ResolvedRoute, CompilationError> {
    let segments: Vec<&str> = requested_path
        .iter()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .collect();

    let page = file_under(&segments, PAGE_FILE);
    if !tree.contains(&page) {
        return Err(CompilationError::PageNotFound {
            requested_path: requested_path.to_vec(),
        });
    }

    let layout_chain = (0..=segments.len())
        .map(|depth| file_under(&segments[..depth], LAYOUT_FILE))
        .filter(|path| tree.contains(path))
        .collect();

    Ok(ResolvedRoute { page, layout_chain })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn route(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    fn tree(paths: &[&str]) -> SourceTree {
        paths
            .iter()
            .fold(SourceTree::new(), |tree, path| tree.with_file(*path, ""))
    }

    #[test]
    fn test_root_page() {
        let resolved = resolve(&tree(&["app/page.tsx", "app/layout.tsx"]), &[]).unwrap();
        assert_eq!(
            resolved,
            ResolvedRoute {
                page: "app/page.tsx".to_string(),
                layout_chain: vec!["app/layout.tsx".to_string()],
            }
        );
    }

    #[test]
    fn test_nested_layouts_skip_missing_levels() {
        let files = tree(&[
            "app/layout.tsx",
            "app/docs/guides/layout.tsx",
            "app/docs/guides/intro/page.tsx",
        ]);
        let resolved = resolve(&files, &route(&["docs", "guides", "intro"])).unwrap();
        assert_eq!(resolved.page, "app/docs/guides/intro/page.tsx");
        assert_eq!(
            resolved.layout_chain,
            vec!["app/layout.tsx", "app/docs/guides/layout.tsx"]
        );
    }

    #[test]
    fn test_empty_segments_are_ignored() {
        let resolved = resolve(&tree(&["app/blog/page.tsx"]), &route(&["", "blog", ""])).unwrap();
        assert_eq!(resolved.page, "app/blog/page.tsx");
        assert!(resolved.layout_chain.is_empty());
    }

    #[test]
    fn test_missing_page() {
        let err = resolve(&tree(&["app/layout.tsx"]), &route(&["missing"])).unwrap_err();
        assert_eq!(
            err,
            CompilationError::PageNotFound {
                requested_path: route(&["missing"])
            }
        );
    }
}
