//! Error taxonomy for the compilation pipeline.
//!
//! Every stage reports a [`StageError`]. The component factory wraps it into a
//! [`ComponentConstructionError`] carrying the originating file path, and the
//! composition driver surfaces either that or a route miss as a
//! [`CompilationError`]. Nothing below the factory boundary escapes untyped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_NO_EXPORTED_COMPONENT: &str = "SBX-ERR-NORMALIZE-001";
pub const ERR_UNRESOLVABLE_COMPONENT_NAME: &str = "SBX-ERR-NORMALIZE-002";
pub const ERR_TRANSPILE: &str = "SBX-ERR-TRANSPILE-001";
pub const ERR_BINDING: &str = "SBX-ERR-BIND-001";
pub const ERR_RENDER: &str = "SBX-ERR-RENDER-001";
pub const ERR_PAGE_NOT_FOUND: &str = "SBX-ERR-ROUTE-404";

/// Discriminant exposed to hosts so they can pick a fallback UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NoExportedComponent,
    UnresolvableComponentName,
    Transpile,
    Binding,
    Render,
    PageNotFound,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NoExportedComponent => ERR_NO_EXPORTED_COMPONENT,
            ErrorKind::UnresolvableComponentName => ERR_UNRESOLVABLE_COMPONENT_NAME,
            ErrorKind::Transpile => ERR_TRANSPILE,
            ErrorKind::Binding => ERR_BINDING,
            ErrorKind::Render => ERR_RENDER,
            ErrorKind::PageNotFound => ERR_PAGE_NOT_FOUND,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure raised by a single pipeline stage, before a path is attached.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StageError {
    #[error("no exported component declaration found")]
    NoExportedComponent,

    #[error("cannot determine the exported component name: {reason}")]
    UnresolvableComponentName { reason: String },

    #[error("transpile failed: {message}")]
    Transpile { message: String },

    #[error("binding failed: {message}")]
    Binding { message: String },

    #[error("render failed: {message}")]
    Render { message: String },
}

impl StageError {
    pub fn transpile(message: impl Into<String>) -> Self {
        StageError::Transpile {
            message: message.into(),
        }
    }

    pub fn binding(message: impl Into<String>) -> Self {
        StageError::Binding {
            message: message.into(),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        StageError::Render {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::NoExportedComponent => ErrorKind::NoExportedComponent,
            StageError::UnresolvableComponentName { .. } => ErrorKind::UnresolvableComponentName,
            StageError::Transpile { .. } => ErrorKind::Transpile,
            StageError::Binding { .. } => ErrorKind::Binding,
            StageError::Render { .. } => ErrorKind::Render,
        }
    }
}

/// Umbrella error of the component factory. Always names the source file.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("failed to construct component `{path}`: {cause}")]
pub struct ComponentConstructionError {
    pub path: String,
    pub cause: StageError,
}

impl ComponentConstructionError {
    pub fn new(path: impl Into<String>, cause: StageError) -> Self {
        Self {
            path: path.into(),
            cause,
        }
    }
}

/// Error type of a whole resolution request.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CompilationError {
    #[error("no page matches /{}", .requested_path.join("/"))]
    PageNotFound {
        #[serde(rename = "requestedPath")]
        requested_path: Vec<String>,
    },

    #[error(transparent)]
    Construction(#[from] ComponentConstructionError),
}

impl CompilationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompilationError::PageNotFound { .. } => ErrorKind::PageNotFound,
            CompilationError::Construction(err) => err.cause.kind(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Path of the source file that failed, if the failure was file-specific.
    pub fn path(&self) -> Option<&str> {
        match self {
            CompilationError::PageNotFound { .. } => None,
            CompilationError::Construction(err) => Some(&err.path),
        }
    }

    pub fn message(&self) -> String {
        match self {
            CompilationError::PageNotFound { .. } => self.to_string(),
            CompilationError::Construction(err) => err.cause.to_string(),
        }
    }
}

/// Rejected capability registration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("`{0}` is not a valid identifier")]
    InvalidName(String),

    #[error("`{0}` is reserved by the sandbox")]
    Reserved(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_error_exposes_path_and_code() {
        let err: CompilationError = ComponentConstructionError::new(
            "app/blog/layout.tsx",
            StageError::binding("`eval` is not bound"),
        )
        .into();

        assert_eq!(err.kind(), ErrorKind::Binding);
        assert_eq!(err.code(), ERR_BINDING);
        assert_eq!(err.path(), Some("app/blog/layout.tsx"));
        assert_eq!(err.message(), "binding failed: `eval` is not bound");
    }

    #[test]
    fn test_page_not_found_message() {
        let err = CompilationError::PageNotFound {
            requested_path: vec!["missing".to_string()],
        };
        assert_eq!(err.to_string(), "no page matches /missing");
        assert_eq!(err.path(), None);
        assert_eq!(err.code(), ERR_PAGE_NOT_FOUND);
    }

    #[test]
    fn test_serializes_with_kind_tags() {
        let err = CompilationError::Construction(ComponentConstructionError::new(
            "app/page.tsx",
            StageError::NoExportedComponent,
        ));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "construction");
        assert_eq!(json["path"], "app/page.tsx");
        assert_eq!(json["cause"]["kind"], "noExportedComponent");
    }
}
