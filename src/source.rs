//! Source tree model.
//!
//! A `SourceTree` is one generated project snapshot keyed by logical path
//! (`app/blog/layout.tsx`). The engine only ever reads it.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

lazy_static! {
    /// First-line path marker emitted by the page generator: `// Path: app/page.tsx`
    static ref PATH_MARKER: Regex = Regex::new(r"(?m)^[ \t]*//[ \t]*Path:[ \t]*(\S+)[ \t]*$").unwrap();
}

const SOURCE_EXTENSIONS: &[&str] = &["tsx", "jsx", "ts", "js"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SourceFile>", into = "Vec<SourceFile>")]
pub struct SourceTree {
    files: BTreeMap<String, SourceFile>,
}

impl SourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, replacing any previous file at the same path.
    pub fn insert(&mut self, file: SourceFile) -> Option<SourceFile> {
        self.files.insert(file.path.clone(), file)
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(SourceFile::new(path, content));
        self
    }

    pub fn get(&self, path: &str) -> Option<&SourceFile> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Splits concatenated generator output on `// Path: <path>` markers.
    /// Text before the first marker is dropped.
    pub fn from_bundle(text: &str) -> Self {
        let mut tree = SourceTree::new();
        let markers: Vec<_> = PATH_MARKER.captures_iter(text).collect();

        for (i, cap) in markers.iter().enumerate() {
            let (Some(whole), Some(path)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            let end = markers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(text.len(), |m| m.start());
            let content = text[whole.end()..end].trim_matches(|c| c == '\n' || c == '\r');
            let content = strip_code_fence(content);
            tree.insert(SourceFile::new(normalize_path(path.as_str()), content));
        }

        tree
    }

    /// Loads every source file under `root`, keyed by its `/`-separated
    /// path relative to `root`.
    pub fn load_dir(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        let mut tree = SourceTree::new();

        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let has_source_ext = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext));
            if !has_source_ext {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let logical = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let content = fs::read_to_string(path)?;
            tree.insert(SourceFile::new(logical, content));
        }

        Ok(tree)
    }
}

impl From<Vec<SourceFile>> for SourceTree {
    fn from(files: Vec<SourceFile>) -> Self {
        let mut tree = SourceTree::new();
        for file in files {
            tree.insert(file);
        }
        tree
    }
}

impl From<SourceTree> for Vec<SourceFile> {
    fn from(tree: SourceTree) -> Self {
        tree.files.into_values().collect()
    }
}

impl FromIterator<SourceFile> for SourceTree {
    fn from_iter<I: IntoIterator<Item = SourceFile>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

fn normalize_path(path: &str) -> String {
    path.trim_start_matches("./")
        .trim_start_matches('/')
        .replace('\\', "/")
}

/// Generators sometimes wrap each file in a markdown fence.
fn strip_code_fence(content: &str) -> String {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return content.to_string();
    }
    let without_open = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => "",
    };
    without_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_bundle_splits_on_path_markers() {
        let bundle = "Here are your files.\n\
// Path: app/layout.tsx\n\
export default function RootLayout() { return <html />; }\n\
// Path: app/page.tsx\n\
export default function Home() { return <main />; }\n";

        let tree = SourceTree::from_bundle(bundle);
        assert_eq!(
            tree.paths().collect::<Vec<_>>(),
            vec!["app/layout.tsx", "app/page.tsx"]
        );
        assert_eq!(
            tree.get("app/page.tsx").unwrap().content,
            "export default function Home() { return <main />; }"
        );
    }

    #[test]
    fn test_from_bundle_strips_fences_and_leading_slash() {
        let bundle = "// Path: /app/page.tsx\n```tsx\nexport const Page = () => <p />;\n```\n";
        let tree = SourceTree::from_bundle(bundle);
        assert_eq!(
            tree.get("app/page.tsx").unwrap().content,
            "export const Page = () => <p />;"
        );
    }

    #[test]
    fn test_load_dir_uses_relative_slash_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app/blog")).unwrap();
        fs::write(dir.path().join("app/page.tsx"), "export const A = 1;").unwrap();
        fs::write(dir.path().join("app/blog/page.tsx"), "export const B = 2;").unwrap();
        fs::write(dir.path().join("app/notes.md"), "# ignored").unwrap();

        let tree = SourceTree::load_dir(dir.path()).unwrap();
        assert_eq!(
            tree.paths().collect::<Vec<_>>(),
            vec!["app/blog/page.tsx", "app/page.tsx"]
        );
    }

    #[test]
    fn test_serde_roundtrip_as_file_list() {
        let tree = SourceTree::new().with_file("app/page.tsx", "x");
        let json = serde_json::to_string(&tree).unwrap();
        assert_eq!(json, r#"[{"path":"app/page.tsx","content":"x"}]"#);
        let back: SourceTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }
}
